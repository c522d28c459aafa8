//! 健壮事件总线（RobustEventBus）
//!
//! 在进程内将一次发布扇出到该事件名下的全部处理器：
//! - 处理器之间相互隔离，一个失败不影响其他处理器；
//! - 每个处理器的尝试串行执行，受单次超时与指数退避约束；
//! - 耗尽重试（或遇到毒消息）时升级到死信写入端，写入失败只记录日志与指标；
//! - Await 模式等待全部处理器结束，Decoupled 模式在受跟踪的任务中分发，`flush` 等待其完成。
//!
use super::failure::{DispatchFailures, FailureKind, HandlerFailure};
use super::handler::{EventHandler, NamedEventHandler, invoke_with_timeout};
use super::registry::{HandlerRegistry, RegisteredHandler};
use super::retry::RetryPolicy;
use crate::dead_letter::{DeadLetterSink, NewDeadLetter};
use crate::domain_event::{DispatchMode, EventCatalog, EventEnvelope, EventPayload, PublishOptions};
use crate::error::{DomainError, DomainResult};
use crate::metrics::MetricsContext;
use bon::Builder;
use chrono::Utc;
use futures_util::future::join_all;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// 事件总线配置
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Builder)]
pub struct EventBusConfig {
    #[builder(default)]
    pub retry: RetryPolicy,
}

struct BusInner {
    catalog: EventCatalog,
    registry: HandlerRegistry,
    dead_letters: Option<Arc<dyn DeadLetterSink>>,
    metrics: Arc<MetricsContext>,
    config: EventBusConfig,
    tracker: TaskTracker,
    // close/wait/reopen 必须整体执行
    flush_lock: Mutex<()>,
}

/// 克隆后共享同一份登记表、指标与后台任务
#[derive(Clone)]
pub struct RobustEventBus {
    inner: Arc<BusInner>,
}

#[bon::bon]
impl RobustEventBus {
    #[builder]
    pub fn new(
        catalog: EventCatalog,
        registry: HandlerRegistry,
        metrics: Arc<MetricsContext>,
        dead_letters: Option<Arc<dyn DeadLetterSink>>,
        #[builder(default)] config: EventBusConfig,
    ) -> Self {
        Self {
            inner: Arc::new(BusInner {
                catalog,
                registry,
                dead_letters,
                metrics,
                config,
                tracker: TaskTracker::new(),
                flush_lock: Mutex::new(()),
            }),
        }
    }
}

impl RobustEventBus {
    /// 以 (事件名, 处理器 ID) 订阅；同键重复订阅时原位替换
    pub fn subscribe(
        &self,
        event_name: &str,
        handler_id: &str,
        handler: Arc<dyn EventHandler>,
    ) -> DomainResult<()> {
        self.ensure_known(event_name)?;

        if self.inner.registry.insert(event_name, handler_id, handler) {
            warn!(event_name, handler_id, "handler replaced");
        } else {
            debug!(event_name, handler_id, "handler subscribed");
        }
        Ok(())
    }

    /// 按处理器自带的元信息订阅其声明的全部事件名
    pub fn register<H>(&self, handler: Arc<H>) -> DomainResult<()>
    where
        H: NamedEventHandler + 'static,
    {
        let handled = handler.handled_event_type();
        // 先整体校验，避免部分订阅
        for name in handled.names() {
            self.ensure_known(name)?;
        }

        let handler_id = handler.handler_id().to_string();
        for name in handled.names() {
            self.subscribe(name, &handler_id, handler.clone())?;
        }
        Ok(())
    }

    pub fn unsubscribe(&self, event_name: &str, handler_id: &str) -> bool {
        let removed = self.inner.registry.remove(event_name, handler_id);
        if removed {
            debug!(event_name, handler_id, "handler unsubscribed");
        }
        removed
    }

    pub fn handler(&self, event_name: &str, handler_id: &str) -> Option<Arc<dyn EventHandler>> {
        self.inner.registry.get(event_name, handler_id)
    }

    pub fn handler_count(&self, event_name: &str) -> usize {
        self.inner.registry.handler_count(event_name)
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.inner.registry
    }

    pub fn catalog(&self) -> &EventCatalog {
        &self.inner.catalog
    }

    pub fn config(&self) -> &EventBusConfig {
        &self.inner.config
    }

    /// 发布事件，返回事件 ID
    ///
    /// Await 模式下若有处理器最终失败，返回 `DomainError::Dispatch`；
    /// 此时每个失败处理器的死信写入都已尝试过。
    pub async fn publish(
        &self,
        event_name: &str,
        payload: Value,
        opts: PublishOptions,
    ) -> DomainResult<String> {
        self.inner.catalog.validate(event_name, &payload)?;

        let envelope = Arc::new(
            EventEnvelope::builder()
                .id(opts
                    .event_id
                    .unwrap_or_else(|| Uuid::new_v4().to_string()))
                .name(event_name.to_string())
                .payload(payload)
                .maybe_correlation_id(opts.correlation_id)
                .maybe_source_id(opts.source_id)
                .occurred_at(Utc::now())
                .build(),
        );
        let event_id = envelope.id().to_string();
        self.inner.metrics.events().record_published(event_name);

        match opts.mode {
            DispatchMode::Await => self.inner.dispatch(envelope).await.map(|_| event_id),
            DispatchMode::Decoupled => {
                let inner = self.inner.clone();
                self.inner.tracker.spawn(async move {
                    if let Err(err) = inner.dispatch(envelope).await {
                        debug!(error = %err, "decoupled dispatch finished with failures");
                    }
                });
                Ok(event_id)
            }
        }
    }

    /// 强类型发布
    pub async fn publish_event<E: EventPayload>(
        &self,
        event: &E,
        opts: PublishOptions,
    ) -> DomainResult<String> {
        let payload = serde_json::to_value(event)?;
        self.publish(E::NAME, payload, opts).await
    }

    /// 等待所有 Decoupled 分发结束；并发调用依次执行
    pub async fn flush(&self) {
        let _guard = self.inner.flush_lock.lock().await;
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        self.inner.tracker.reopen();
    }

    fn ensure_known(&self, event_name: &str) -> DomainResult<()> {
        if self.inner.catalog.contains(event_name) {
            Ok(())
        } else {
            Err(DomainError::UnknownEvent {
                event_name: event_name.to_string(),
            })
        }
    }
}

impl BusInner {
    async fn dispatch(&self, envelope: Arc<EventEnvelope>) -> DomainResult<()> {
        let handlers = self.registry.handlers_for(envelope.name());
        if handlers.is_empty() {
            debug!(
                event_id = envelope.id(),
                event_name = envelope.name(),
                "no handlers subscribed"
            );
            return Ok(());
        }

        // join_all 按登记顺序首次轮询，全部结束后才返回
        let outcomes = join_all(handlers.iter().map(|h| self.deliver(&envelope, h))).await;
        let failures: Vec<HandlerFailure> = outcomes.into_iter().filter_map(Result::err).collect();

        if failures.is_empty() {
            return Ok(());
        }

        Err(DomainError::Dispatch(DispatchFailures {
            event_id: envelope.id().to_string(),
            event_name: envelope.name().to_string(),
            failures,
        }))
    }

    async fn deliver(
        &self,
        envelope: &EventEnvelope,
        registered: &RegisteredHandler,
    ) -> Result<(), HandlerFailure> {
        let policy = self.config.retry;
        let max_attempts = policy.attempts();
        let event_name = envelope.name();
        let handler_id = registered.handler_id.as_str();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let err = match invoke_with_timeout(
                registered.handler.as_ref(),
                envelope,
                policy.attempt_timeout,
            )
            .await
            {
                Ok(()) => {
                    self.metrics.events().record_succeeded(event_name);
                    debug!(event_id = envelope.id(), event_name, handler_id, attempt, "handled");
                    return Ok(());
                }
                Err(err) => err,
            };

            let kind = FailureKind::classify(&err);
            if kind == FailureKind::Permanent || attempt >= max_attempts {
                return Err(self.escalate(envelope, handler_id, kind, attempt, err).await);
            }

            self.metrics.events().record_retried(event_name);
            let delay = policy.delay_for(attempt - 1);
            warn!(
                event_id = envelope.id(),
                event_name,
                handler_id,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "handler attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// 记录最终失败并写入死信
    async fn escalate(
        &self,
        envelope: &EventEnvelope,
        handler_id: &str,
        kind: FailureKind,
        attempts: u32,
        err: anyhow::Error,
    ) -> HandlerFailure {
        let event_name = envelope.name();
        self.metrics.events().record_failed(event_name);

        // 毒消息未经重试，retry_count 记为 0
        let retry_count = match kind {
            FailureKind::Permanent => 0,
            FailureKind::Transient => attempts,
        };
        let message = err.to_string();

        warn!(
            event_id = envelope.id(),
            event_name,
            handler_id,
            attempts,
            kind = ?kind,
            error = %err,
            "handler failed, escalating to dead letter queue"
        );

        let dead_lettered = match &self.dead_letters {
            Some(sink) => {
                let record = NewDeadLetter::builder()
                    .event_id(envelope.id().to_string())
                    .event_name(event_name.to_string())
                    .event_data(envelope.payload().clone())
                    .handler_id(handler_id.to_string())
                    .error_message(message.clone())
                    .error_stack(format!("{err:?}"))
                    .retry_count(retry_count)
                    .maybe_correlation_id(envelope.correlation_id().map(str::to_string))
                    .maybe_source_id(envelope.source_id().map(str::to_string))
                    .build();

                match sink.store(record).await {
                    Ok(entry) => {
                        self.metrics.events().record_dead_lettered(event_name);
                        info!(
                            dead_letter_id = %entry.id,
                            event_id = envelope.id(),
                            event_name,
                            handler_id,
                            retry_count = entry.retry_count,
                            "dead letter stored"
                        );
                        true
                    }
                    Err(store_err) => {
                        self.metrics
                            .events()
                            .record_dead_letter_store_failure(event_name);
                        error!(
                            event_id = envelope.id(),
                            event_name,
                            handler_id,
                            handler_error = %message,
                            error = %store_err,
                            "failed to store dead letter"
                        );
                        false
                    }
                }
            }
            None => {
                warn!(event_name, handler_id, "no dead letter sink configured");
                false
            }
        };

        HandlerFailure {
            handler_id: handler_id.to_string(),
            kind,
            attempts,
            message,
            dead_lettered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dead_letter::{
        DeadLetterConfig, DeadLetterEntry, DeadLetterFilter, DeadLetterQueueService,
        InMemoryDeadLetterRepository, Pagination,
    };
    use crate::eventing::{PoisonEvent, handler_fn};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Fixture {
        bus: RobustEventBus,
        dlq: Arc<DeadLetterQueueService>,
        metrics: Arc<MetricsContext>,
    }

    fn fixture(retry: RetryPolicy) -> Fixture {
        let catalog = EventCatalog::new();
        catalog.register_untyped("Ping");
        let registry = HandlerRegistry::new();
        let metrics = MetricsContext::new();
        let dlq = Arc::new(DeadLetterQueueService::new(
            Arc::new(InMemoryDeadLetterRepository::new()),
            registry.clone(),
            DeadLetterConfig::default(),
        ));
        let bus = RobustEventBus::builder()
            .catalog(catalog)
            .registry(registry)
            .metrics(metrics.clone())
            .dead_letters(dlq.clone())
            .config(EventBusConfig { retry })
            .build();
        Fixture { bus, dlq, metrics }
    }

    fn counting(calls: Arc<AtomicUsize>, fail: bool) -> Arc<dyn EventHandler> {
        handler_fn(move |_ev| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                if fail {
                    anyhow::bail!("boom");
                }
                Ok(())
            }
        })
    }

    async fn all_dead_letters(dlq: &DeadLetterQueueService) -> Vec<DeadLetterEntry> {
        dlq.list(&DeadLetterFilter::default(), Pagination::default())
            .await
            .unwrap()
            .entries
    }

    #[tokio::test(start_paused = true)]
    async fn failing_handler_is_isolated_and_dead_lettered_once() {
        let f = fixture(RetryPolicy::default());
        let ok_a = Arc::new(AtomicUsize::new(0));
        let bad = Arc::new(AtomicUsize::new(0));
        let ok_c = Arc::new(AtomicUsize::new(0));
        f.bus.subscribe("Ping", "a", counting(ok_a.clone(), false)).unwrap();
        f.bus.subscribe("Ping", "b", counting(bad.clone(), true)).unwrap();
        f.bus.subscribe("Ping", "c", counting(ok_c.clone(), false)).unwrap();

        let err = f
            .bus
            .publish("Ping", json!({"n": 1}), PublishOptions::default())
            .await
            .unwrap_err();

        let DomainError::Dispatch(failures) = err else {
            panic!("expected dispatch failure, got {err:?}");
        };
        assert_eq!(failures.handler_ids(), vec!["b"]);
        assert_eq!(failures.failures[0].attempts, 3);
        assert!(failures.failures[0].dead_lettered);

        assert_eq!(ok_a.load(Ordering::SeqCst), 1);
        assert_eq!(ok_c.load(Ordering::SeqCst), 1);
        assert_eq!(bad.load(Ordering::SeqCst), 3);

        let entries = all_dead_letters(&f.dlq).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].handler_id, "b");
        assert_eq!(entries[0].retry_count, 3);
        assert_eq!(entries[0].error_message, "boom");
        assert_eq!(entries[0].event_data, json!({"n": 1}));

        let counters = f.metrics.events().event("Ping");
        assert_eq!(counters.published, 1);
        assert_eq!(counters.succeeded, 2);
        assert_eq!(counters.failed, 1);
        assert_eq!(counters.retried, 2);
        assert_eq!(counters.dead_lettered, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn poison_skips_retries() {
        let f = fixture(RetryPolicy::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        f.bus
            .subscribe(
                "Ping",
                "strict",
                handler_fn(move |_ev| {
                    let seen = seen.clone();
                    async move {
                        seen.fetch_add(1, Ordering::SeqCst);
                        Err::<(), anyhow::Error>(PoisonEvent::new("missing field").into())
                    }
                }),
            )
            .unwrap();

        let _ = f.bus.publish("Ping", json!({}), PublishOptions::default()).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let entries = all_dead_letters(&f.dlq).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].retry_count, 0);
        assert_eq!(f.metrics.events().event("Ping").retried, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_handler_times_out_and_is_dead_lettered() {
        let f = fixture(
            RetryPolicy::builder()
                .max_attempts(2)
                .attempt_timeout(Duration::from_secs(1))
                .build(),
        );
        f.bus
            .subscribe(
                "Ping",
                "slow",
                handler_fn(|_ev| async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok::<(), anyhow::Error>(())
                }),
            )
            .unwrap();

        let err = f
            .bus
            .publish("Ping", json!({}), PublishOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Dispatch(_)));

        let entries = all_dead_letters(&f.dlq).await;
        assert_eq!(entries[0].retry_count, 2);
        assert!(entries[0].error_message.contains("timed out"));
    }

    struct BrokenSink;

    #[async_trait]
    impl DeadLetterSink for BrokenSink {
        async fn store(&self, _record: NewDeadLetter) -> DomainResult<DeadLetterEntry> {
            Err(DomainError::store_unavailable("connection refused"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn dead_letter_store_failure_is_only_logged_and_counted() {
        let catalog = EventCatalog::new();
        catalog.register_untyped("Ping");
        let metrics = MetricsContext::new();
        let bus = RobustEventBus::builder()
            .catalog(catalog)
            .registry(HandlerRegistry::new())
            .metrics(metrics.clone())
            .dead_letters(Arc::new(BrokenSink))
            .build();
        bus.subscribe("Ping", "bad", counting(Arc::new(AtomicUsize::new(0)), true))
            .unwrap();

        let err = bus
            .publish("Ping", json!({}), PublishOptions::default())
            .await
            .unwrap_err();

        let DomainError::Dispatch(failures) = err else {
            panic!("expected dispatch failure, got {err:?}");
        };
        assert!(!failures.failures[0].dead_lettered);
        let counters = metrics.events().event("Ping");
        assert_eq!(counters.dead_letter_store_failures, 1);
        assert_eq!(counters.dead_lettered, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn decoupled_publish_returns_before_handlers_settle() {
        let f = fixture(RetryPolicy::default());
        let calls = Arc::new(AtomicUsize::new(0));
        f.bus.subscribe("Ping", "bad", counting(calls.clone(), true)).unwrap();

        let event_id = f
            .bus
            .publish("Ping", json!({}), PublishOptions::decoupled())
            .await
            .unwrap();
        assert!(!event_id.is_empty());

        f.bus.flush().await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let entries = all_dead_letters(&f.dlq).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event_id, event_id);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_flushes_each_wait_and_leave_the_bus_open() {
        let f = fixture(RetryPolicy::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let slow_calls = calls.clone();
        f.bus
            .subscribe(
                "Ping",
                "slow",
                handler_fn(move |_ev| {
                    let calls = slow_calls.clone();
                    async move {
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok::<(), anyhow::Error>(())
                    }
                }),
            )
            .unwrap();

        f.bus
            .publish("Ping", json!({}), PublishOptions::decoupled())
            .await
            .unwrap();
        tokio::join!(f.bus.flush(), f.bus.flush());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!f.bus.inner.tracker.is_closed());

        f.bus
            .publish("Ping", json!({}), PublishOptions::decoupled())
            .await
            .unwrap();
        f.bus.flush().await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unknown_names_and_bad_payloads_are_rejected() {
        #[derive(serde::Deserialize)]
        struct Shaped {
            #[allow(dead_code)]
            id: String,
        }

        let f = fixture(RetryPolicy::default());
        f.bus.catalog().register_schema::<Shaped>("Shaped");

        let err = f
            .bus
            .subscribe("Nope", "a", counting(Arc::new(AtomicUsize::new(0)), false))
            .unwrap_err();
        assert!(matches!(err, DomainError::UnknownEvent { .. }));

        let err = f
            .bus
            .publish("Nope", json!({}), PublishOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::UnknownEvent { .. }));

        let err = f
            .bus
            .publish("Shaped", json!({"id": 7}), PublishOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidPayload { .. }));
        assert_eq!(f.metrics.events().event("Shaped").published, 0);
    }

    #[tokio::test]
    async fn zero_subscribers_succeeds_with_explicit_event_id() {
        let f = fixture(RetryPolicy::default());
        let opts = PublishOptions::builder()
            .event_id("evt-42".to_string())
            .correlation_id("cor-1".to_string())
            .build();

        let event_id = f.bus.publish("Ping", json!({}), opts).await.unwrap();
        assert_eq!(event_id, "evt-42");
        assert_eq!(f.metrics.events().event("Ping").published, 1);
    }

    #[tokio::test]
    async fn resubscribing_replaces_in_place_and_keeps_order() {
        let f = fixture(RetryPolicy::default());
        let order = Arc::new(Mutex::new(Vec::new()));
        let recorder = |tag: &'static str| {
            let order = order.clone();
            handler_fn(move |_ev| {
                let order = order.clone();
                async move {
                    order.lock().unwrap().push(tag);
                    Ok::<(), anyhow::Error>(())
                }
            })
        };

        f.bus.subscribe("Ping", "first", recorder("first-v1")).unwrap();
        f.bus.subscribe("Ping", "second", recorder("second")).unwrap();
        f.bus.subscribe("Ping", "first", recorder("first-v2")).unwrap();
        assert_eq!(f.bus.handler_count("Ping"), 2);

        f.bus
            .publish("Ping", json!({}), PublishOptions::default())
            .await
            .unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["first-v2", "second"]);

        assert!(f.bus.unsubscribe("Ping", "second"));
        assert!(f.bus.handler("Ping", "second").is_none());
    }
}

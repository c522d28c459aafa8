//! 事件处理器（EventHandler）
//!
//! 定义消费某个事件名的处理逻辑。处理器以 `anyhow::Result` 报告失败，
//! 需要跳过重试时在错误链中携带 [`PoisonEvent`](super::PoisonEvent)。
//!
use super::failure::HandlerTimeout;
use crate::domain_event::EventEnvelope;
use async_trait::async_trait;
use futures_util::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandledEventType {
    One(String),
    Many(Vec<String>),
}

impl HandledEventType {
    pub fn names(&self) -> &[String] {
        match self {
            HandledEventType::One(name) => std::slice::from_ref(name),
            HandledEventType::Many(names) => names,
        }
    }
}

/// 事件处理器：处理某一事件名的事件
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// 处理事件；应当幂等（至少一次投递）
    async fn handle(&self, event: &EventEnvelope) -> anyhow::Result<()>;
}

/// 自带订阅元信息的处理器，可通过 `RobustEventBus::register` 一次性订阅
pub trait NamedEventHandler: EventHandler {
    /// 处理器 ID（死信去重与重放的键）
    fn handler_id(&self) -> &str;
    /// 该处理器订阅的事件名
    fn handled_event_type(&self) -> HandledEventType;
}

/// 闭包处理器适配
pub struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(EventEnvelope) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn handle(&self, event: &EventEnvelope) -> anyhow::Result<()> {
        (self.f)(event.clone()).await
    }
}

/// 以闭包构造处理器
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(EventEnvelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnHandler { f })
}

/// 在超时约束下执行一次处理；超时与 panic 都转换为普通错误
pub(crate) async fn invoke_with_timeout(
    handler: &dyn EventHandler,
    event: &EventEnvelope,
    timeout: Duration,
) -> anyhow::Result<()> {
    let attempt = AssertUnwindSafe(handler.handle(event)).catch_unwind();

    match tokio::time::timeout(timeout, attempt).await {
        Ok(Ok(result)) => result,
        Ok(Err(panic)) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(anyhow::anyhow!("handler panicked: {reason}"))
        }
        Err(_) => Err(HandlerTimeout { after: timeout }.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eventing::{FailureKind, PoisonEvent};
    use chrono::Utc;
    use serde_json::json;

    fn envelope() -> EventEnvelope {
        EventEnvelope::builder()
            .id("e-1".to_string())
            .name("Ping".to_string())
            .payload(json!({}))
            .occurred_at(Utc::now())
            .build()
    }

    #[tokio::test]
    async fn closure_handler_receives_envelope() {
        let h = handler_fn(|ev: EventEnvelope| async move {
            anyhow::ensure!(ev.name() == "Ping", "unexpected event");
            Ok(())
        });
        assert!(invoke_with_timeout(h.as_ref(), &envelope(), Duration::from_secs(1))
            .await
            .is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_handler_times_out_as_transient() {
        let h = handler_fn(|_ev| async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        });
        let err = invoke_with_timeout(h.as_ref(), &envelope(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.is::<HandlerTimeout>());
        assert_eq!(FailureKind::classify(&err), FailureKind::Transient);
    }

    #[tokio::test]
    async fn panicking_handler_becomes_error() {
        let h = handler_fn(|_ev| async move {
            if true {
                panic!("kaboom");
            }
            Ok(())
        });
        let err = invoke_with_timeout(h.as_ref(), &envelope(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("kaboom"));
    }

    #[tokio::test]
    async fn poison_error_is_permanent() {
        let h = handler_fn(|_ev| async move {
            Err::<(), anyhow::Error>(PoisonEvent::new("bad shape").into())
        });
        let err = invoke_with_timeout(h.as_ref(), &envelope(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(FailureKind::classify(&err), FailureKind::Permanent);
    }
}

//! 死信回收器（DeadLetterReclaimer）
//!
//! 长驻的周期任务：按固定间隔对 pending 死信执行 `retry_all`，
//! 通过 `EngineHandle` 优雅关闭。
//!
use super::entry::DeadLetterFilter;
use super::service::DeadLetterQueueService;
use crate::error::DomainResult;
use bon::Builder;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

#[derive(Debug, Clone, Builder)]
pub struct ReclaimerConfig {
    #[builder(default = Duration::from_secs(60))]
    pub interval: Duration,
    /// 仅回收匹配的 pending 记录
    #[builder(default)]
    pub filter: DeadLetterFilter,
}

impl Default for ReclaimerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            filter: DeadLetterFilter::default(),
        }
    }
}

pub struct DeadLetterReclaimer {
    service: Arc<DeadLetterQueueService>,
    config: ReclaimerConfig,
}

impl DeadLetterReclaimer {
    pub fn new(service: Arc<DeadLetterQueueService>, config: ReclaimerConfig) -> Self {
        Self { service, config }
    }

    /// 启动回收任务，返回可用于关闭/等待的句柄
    pub fn start(self: Arc<Self>) -> EngineHandle {
        let token = CancellationToken::new();
        let interval = self.config.interval;

        let task = Self::spawn_periodic(token.clone(), interval, move || {
            let this = self.clone();
            async move {
                if let Err(err) = this.reclaim_once().await {
                    error!(error = %err, "dead letter reclaim pass failed");
                }
            }
        });

        EngineHandle {
            token,
            task: Some(task),
        }
    }

    /// 执行一轮回收
    pub async fn reclaim_once(&self) -> DomainResult<()> {
        let summary = self.service.retry_all(&self.config.filter).await?;
        debug!(
            attempted = summary.attempted,
            succeeded = summary.succeeded,
            "dead letter reclaim pass"
        );
        Ok(())
    }

    fn spawn_periodic<F, Fut>(
        token: CancellationToken,
        interval: Duration,
        mut f: F,
    ) -> JoinHandle<()>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // 首个 tick 立即完成，跳过以避免启动即回收
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => f().await,
                }
            }
        })
    }
}

/// 运行句柄：用于优雅关闭与等待任务结束
pub struct EngineHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl EngineHandle {
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub async fn join(mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dead_letter::{
        DeadLetterConfig, DeadLetterStatus, InMemoryDeadLetterRepository, NewDeadLetter,
    };
    use crate::eventing::{HandlerRegistry, handler_fn};
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn periodic_pass_resolves_pending_entries() {
        let registry = HandlerRegistry::new();
        registry.insert(
            "UserUpdated",
            "audit",
            handler_fn(|_ev| async { Ok::<(), anyhow::Error>(()) }),
        );
        let service = Arc::new(DeadLetterQueueService::new(
            Arc::new(InMemoryDeadLetterRepository::new()),
            registry,
            DeadLetterConfig::default(),
        ));
        let stored = service
            .store(
                NewDeadLetter::builder()
                    .event_id("e-1".into())
                    .event_name("UserUpdated".into())
                    .event_data(json!({"userId": "u1"}))
                    .handler_id("audit".into())
                    .error_message("boom".into())
                    .retry_count(3)
                    .build(),
            )
            .await
            .unwrap();

        let reclaimer = Arc::new(DeadLetterReclaimer::new(
            service.clone(),
            ReclaimerConfig::builder()
                .interval(Duration::from_secs(5))
                .build(),
        ));
        let handle = reclaimer.start();

        tokio::time::sleep(Duration::from_secs(6)).await;
        let entry = service.get(stored.id).await.unwrap();
        assert_eq!(entry.status, DeadLetterStatus::Resolved);

        handle.shutdown();
        handle.join().await;
    }
}

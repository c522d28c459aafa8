//! 死信队列服务（DeadLetterQueueService）
//!
//! 失败尝试的持久化记录与围绕它的运维流程：
//! - `store`：pending 窗口内幂等，重复失败只累加 retry_count；
//! - `list`：按条件分页查询；
//! - `retry` / `retry_all`：以存储的载荷重新调用原处理器；
//! - `resolve` / `remove`：人工判定与删除。
//!
//! 同一记录的重放在进程内串行执行；所有写入都是仓储端的条件写入，
//! 条件不再成立（记录已被他人处置）时返回 `InvalidState`，状态不会回退。
//!
use super::entry::{
    DeadLetterEntry, DeadLetterFilter, DeadLetterPage, DeadLetterStatus, NewDeadLetter,
    Pagination, RetryAllSummary, RetryFailure,
};
use super::repository::DeadLetterRepository;
use crate::error::{DomainError, DomainResult};
use crate::eventing::handler::invoke_with_timeout;
use crate::eventing::{FailureKind, HandlerRegistry};
use async_trait::async_trait;
use bon::Builder;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 死信写入端：总线只依赖该接口
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn store(&self, record: NewDeadLetter) -> DomainResult<DeadLetterEntry>;
}

/// 死信服务配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Builder)]
pub struct DeadLetterConfig {
    /// retry_count 超过该上限时状态变为 exhausted
    #[builder(default = 10)]
    pub max_retry_count: u32,
    /// 重放时单次调用的超时
    #[builder(default = Duration::from_secs(30))]
    pub attempt_timeout: Duration,
}

impl Default for DeadLetterConfig {
    fn default() -> Self {
        Self {
            max_retry_count: 10,
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

pub struct DeadLetterQueueService {
    repository: Arc<dyn DeadLetterRepository>,
    registry: HandlerRegistry,
    config: DeadLetterConfig,
    in_flight: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl DeadLetterQueueService {
    pub fn new(
        repository: Arc<dyn DeadLetterRepository>,
        registry: HandlerRegistry,
        config: DeadLetterConfig,
    ) -> Self {
        Self {
            repository,
            registry,
            config,
            in_flight: DashMap::new(),
        }
    }

    pub fn config(&self) -> &DeadLetterConfig {
        &self.config
    }

    /// 记录一次耗尽的尝试
    pub async fn store(&self, record: NewDeadLetter) -> DomainResult<DeadLetterEntry> {
        let stored = self
            .repository
            .upsert_pending(record.into_entry(Utc::now()))
            .await
            .map_err(|e| DomainError::store_unavailable(e.to_string()))?;

        if !(stored.is_pending() && stored.retry_count > self.config.max_retry_count) {
            return Ok(stored);
        }

        let exhausted = self
            .repository
            .transition(stored.id, DeadLetterStatus::Pending, DeadLetterStatus::Exhausted)
            .await
            .map_err(|e| DomainError::store_unavailable(e.to_string()))?;
        let Some(entry) = exhausted else {
            // 已被并发处置，保留对方写入的状态
            return self.get(stored.id).await;
        };

        warn!(
            dead_letter_id = %entry.id,
            event_name = %entry.event_name,
            handler_id = %entry.handler_id,
            retry_count = entry.retry_count,
            "dead letter exhausted"
        );
        Ok(entry)
    }

    pub async fn get(&self, id: Uuid) -> DomainResult<DeadLetterEntry> {
        self.repository
            .get(id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("dead letter {id}")))
    }

    pub async fn list(
        &self,
        filter: &DeadLetterFilter,
        page: Pagination,
    ) -> DomainResult<DeadLetterPage> {
        let page = page.normalized();
        let (entries, total) = self.repository.list(filter, page).await?;
        Ok(DeadLetterPage {
            entries,
            total,
            limit: page.limit,
            offset: page.offset,
        })
    }

    /// 以存储的载荷重新调用原处理器
    ///
    /// - 成功：状态变为 resolved；
    /// - 失败：retry_count + 1，超过上限或遇到毒消息时变为 exhausted；
    /// - 处理器已注销：返回 `HandlerUnavailable`，记录保持不变；
    /// - 重放期间记录被人工处置或删除：返回 `InvalidState` / `NotFound`，不覆盖对方的写入。
    pub async fn retry(&self, id: Uuid) -> DomainResult<DeadLetterEntry> {
        let lock = self.in_flight.entry(id).or_default().value().clone();
        let result = {
            let _guard = lock.lock().await;
            self.retry_exclusive(id).await
        };
        drop(lock);
        self.in_flight
            .remove_if(&id, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    async fn retry_exclusive(&self, id: Uuid) -> DomainResult<DeadLetterEntry> {
        let entry = self.get(id).await?;

        if entry.status == DeadLetterStatus::Resolved {
            return Err(DomainError::InvalidState {
                reason: format!("dead letter {id} is already resolved"),
            });
        }

        let Some(handler) = self.registry.get(&entry.event_name, &entry.handler_id) else {
            warn!(
                dead_letter_id = %id,
                event_name = %entry.event_name,
                handler_id = %entry.handler_id,
                "handler no longer registered, leaving dead letter untouched"
            );
            return Err(DomainError::HandlerUnavailable {
                event_name: entry.event_name,
                handler_id: entry.handler_id,
            });
        };

        // 代码修复后的显式重试：exhausted 重新回到 pending
        let entry = if entry.status == DeadLetterStatus::Exhausted {
            match self
                .repository
                .transition(id, DeadLetterStatus::Exhausted, DeadLetterStatus::Pending)
                .await?
            {
                Some(reopened) => reopened,
                None => return Err(self.lost_race(id).await),
            }
        } else {
            entry
        };

        let envelope = entry.to_envelope();
        let outcome =
            invoke_with_timeout(handler.as_ref(), &envelope, self.config.attempt_timeout).await;

        match outcome {
            Ok(()) => {
                let Some(resolved) = self
                    .repository
                    .transition(id, DeadLetterStatus::Pending, DeadLetterStatus::Resolved)
                    .await?
                else {
                    return Err(self.lost_race(id).await);
                };
                info!(
                    dead_letter_id = %id,
                    event_name = %resolved.event_name,
                    handler_id = %resolved.handler_id,
                    "dead letter resolved by retry"
                );
                Ok(resolved)
            }
            Err(err) => {
                let failure = RetryFailure {
                    error_message: err.to_string(),
                    error_stack: Some(format!("{err:?}")),
                    permanent: FailureKind::classify(&err) == FailureKind::Permanent,
                    max_retry_count: self.config.max_retry_count,
                };
                let Some(failed) = self.repository.record_retry_failure(id, &failure).await?
                else {
                    return Err(self.lost_race(id).await);
                };
                warn!(
                    dead_letter_id = %id,
                    event_name = %failed.event_name,
                    handler_id = %failed.handler_id,
                    retry_count = failed.retry_count,
                    status = %failed.status,
                    error = %err,
                    "dead letter retry failed"
                );
                Ok(failed)
            }
        }
    }

    /// 条件写入失败后的错误：记录已删除为 NotFound，否则为 InvalidState
    async fn lost_race(&self, id: Uuid) -> DomainError {
        match self.repository.get(id).await {
            Ok(Some(current)) => DomainError::InvalidState {
                reason: format!("dead letter {id} changed concurrently, now {}", current.status),
            },
            Ok(None) => DomainError::not_found(format!("dead letter {id}")),
            Err(err) => err,
        }
    }

    /// 对全部匹配的 pending 记录执行 `retry`
    ///
    /// 未指定 status 时按 pending 处理；指定了其他状态时没有可重试的记录。
    pub async fn retry_all(&self, filter: &DeadLetterFilter) -> DomainResult<RetryAllSummary> {
        if filter.status.is_some_and(|status| status != DeadLetterStatus::Pending) {
            debug!(filter = ?filter, "retry-all filter excludes pending entries");
            return Ok(RetryAllSummary::default());
        }
        let filter = DeadLetterFilter {
            status: Some(DeadLetterStatus::Pending),
            ..filter.clone()
        };

        // 先收集再重试，避免状态变化影响分页
        let mut candidates = Vec::new();
        let mut offset = 0u32;
        loop {
            let page = Pagination::new(Pagination::MAX_LIMIT, offset);
            let (entries, _) = self.repository.list(&filter, page).await?;
            let fetched = entries.len() as u32;
            candidates.extend(entries.into_iter().map(|e| e.id));
            if fetched < page.limit {
                break;
            }
            offset += fetched;
        }

        let mut summary = RetryAllSummary::default();
        for id in candidates {
            summary.attempted += 1;
            match self.retry(id).await {
                Ok(entry) if entry.status == DeadLetterStatus::Resolved => summary.succeeded += 1,
                Ok(_) => summary.failed += 1,
                Err(err) => {
                    warn!(dead_letter_id = %id, error = %err, "retry-all entry failed");
                    summary.failed += 1;
                }
            }
        }

        info!(
            attempted = summary.attempted,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "dead letter retry-all finished"
        );
        Ok(summary)
    }

    /// 人工判定为已解决，不重新调用处理器；已解决的记录原样返回
    pub async fn resolve(&self, id: Uuid) -> DomainResult<DeadLetterEntry> {
        let entry = self.get(id).await?;
        if entry.status == DeadLetterStatus::Resolved {
            return Ok(entry);
        }

        let Some(resolved) = self
            .repository
            .transition(id, entry.status, DeadLetterStatus::Resolved)
            .await?
        else {
            return Err(self.lost_race(id).await);
        };
        info!(dead_letter_id = %id, "dead letter resolved by operator");
        Ok(resolved)
    }

    pub async fn remove(&self, id: Uuid) -> DomainResult<()> {
        if !self.repository.delete(id).await? {
            return Err(DomainError::not_found(format!("dead letter {id}")));
        }
        info!(dead_letter_id = %id, "dead letter removed");
        Ok(())
    }
}

#[async_trait]
impl DeadLetterSink for DeadLetterQueueService {
    async fn store(&self, record: NewDeadLetter) -> DomainResult<DeadLetterEntry> {
        DeadLetterQueueService::store(self, record).await
    }
}

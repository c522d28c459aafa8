//! 内存版死信仓储（InMemoryDeadLetterRepository）
//!
//! 基于 `tokio::sync::RwLock<Vec<_>>` 的轻量实现，满足 `DeadLetterRepository` 协议；
//! 典型用途：测试环境、示例与本地开发。
//!
use super::entry::{DeadLetterEntry, DeadLetterFilter, DeadLetterStatus, Pagination, RetryFailure};
use super::repository::DeadLetterRepository;
use crate::error::{DomainError, DomainResult as Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Clone, Default)]
pub struct InMemoryDeadLetterRepository {
    rows: Arc<RwLock<Vec<DeadLetterEntry>>>,
}

impl InMemoryDeadLetterRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl DeadLetterRepository for InMemoryDeadLetterRepository {
    async fn upsert_pending(&self, entry: DeadLetterEntry) -> Result<DeadLetterEntry> {
        let mut rows = self.rows.write().await;

        if let Some(existing) = rows.iter_mut().find(|row| {
            row.is_pending() && row.event_id == entry.event_id && row.handler_id == entry.handler_id
        }) {
            existing.retry_count += 1;
            existing.error_message = entry.error_message;
            existing.error_stack = entry.error_stack;
            existing.last_retry_at = Some(Utc::now());
            return Ok(existing.clone());
        }

        rows.push(entry.clone());
        Ok(entry)
    }

    async fn get(&self, id: Uuid) -> Result<Option<DeadLetterEntry>> {
        Ok(self.rows.read().await.iter().find(|r| r.id == id).cloned())
    }

    async fn transition(
        &self,
        id: Uuid,
        from: DeadLetterStatus,
        to: DeadLetterStatus,
    ) -> Result<Option<DeadLetterEntry>> {
        let mut rows = self.rows.write().await;
        let Some(index) = rows.iter().position(|r| r.id == id && r.status == from) else {
            return Ok(None);
        };

        if to == DeadLetterStatus::Pending {
            let target = &rows[index];
            let clash = rows.iter().any(|r| {
                r.id != id
                    && r.is_pending()
                    && r.event_id == target.event_id
                    && r.handler_id == target.handler_id
            });
            if clash {
                return Err(DomainError::InvalidState {
                    reason: format!("another pending dead letter exists for {id}"),
                });
            }
        }

        let row = &mut rows[index];
        row.status = to;
        Ok(Some(row.clone()))
    }

    async fn record_retry_failure(
        &self,
        id: Uuid,
        failure: &RetryFailure,
    ) -> Result<Option<DeadLetterEntry>> {
        let mut rows = self.rows.write().await;
        let Some(row) = rows.iter_mut().find(|r| r.id == id && r.is_pending()) else {
            return Ok(None);
        };

        row.retry_count += 1;
        row.error_message = failure.error_message.clone();
        row.error_stack = failure.error_stack.clone();
        row.last_retry_at = Some(Utc::now());
        if failure.exhausts(row.retry_count) {
            row.status = DeadLetterStatus::Exhausted;
        }
        Ok(Some(row.clone()))
    }

    async fn list(
        &self,
        filter: &DeadLetterFilter,
        page: Pagination,
    ) -> Result<(Vec<DeadLetterEntry>, u64)> {
        let page = page.normalized();
        let rows = self.rows.read().await;

        let mut matching: Vec<&DeadLetterEntry> = rows.iter().filter(|r| filter.matches(r)).collect();
        // 后插入者在前，created_at 相同时保持插入倒序
        matching.reverse();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as u64;
        let entries = matching
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .cloned()
            .collect();

        Ok((entries, total))
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|r| r.id != id);
        Ok(rows.len() != before)
    }
}

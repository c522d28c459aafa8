//! 死信仓储协议
//!
//! 死信服务通过该窄接口访问持久化存储；实现需保证 `upsert_pending` 的原子性，
//! 以维持“每个 (event_id, handler_id) 至多一条 pending 记录”的不变式。
//!
//! 记录只通过条件写入变更：状态迁移以当前状态为前提，retry_count 在存储端相对累加，
//! 并发的重放、入队与人工处置不会互相覆盖。
//!
use super::entry::{DeadLetterEntry, DeadLetterFilter, DeadLetterStatus, Pagination, RetryFailure};
use crate::error::DomainResult as Result;
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

#[async_trait]
pub trait DeadLetterRepository: Send + Sync {
    /// 插入新记录；若同一 (event_id, handler_id) 已有 pending 记录，
    /// 则在其上 retry_count + 1 并刷新错误信息与 last_retry_at，返回最终记录
    async fn upsert_pending(&self, entry: DeadLetterEntry) -> Result<DeadLetterEntry>;

    async fn get(&self, id: Uuid) -> Result<Option<DeadLetterEntry>>;

    /// 仅当当前状态为 `from` 时改为 `to`，返回更新后的记录；
    /// 记录不存在或状态不符时返回 None。
    /// 迁回 pending 时若同键已有另一条 pending 记录，返回 InvalidState
    async fn transition(
        &self,
        id: Uuid,
        from: DeadLetterStatus,
        to: DeadLetterStatus,
    ) -> Result<Option<DeadLetterEntry>>;

    /// 记录一次失败的重放：仅对 pending 记录生效，retry_count + 1 并刷新错误信息与 last_retry_at；
    /// 毒消息或计数超过上限时转为 exhausted。条件不满足时返回 None
    async fn record_retry_failure(
        &self,
        id: Uuid,
        failure: &RetryFailure,
    ) -> Result<Option<DeadLetterEntry>>;

    /// 按 created_at 倒序分页查询，同时返回过滤后的总数
    async fn list(
        &self,
        filter: &DeadLetterFilter,
        page: Pagination,
    ) -> Result<(Vec<DeadLetterEntry>, u64)>;

    /// 删除记录，返回是否存在
    async fn delete(&self, id: Uuid) -> Result<bool>;
}

#[async_trait]
impl<T> DeadLetterRepository for Arc<T>
where
    T: DeadLetterRepository + ?Sized,
{
    async fn upsert_pending(&self, entry: DeadLetterEntry) -> Result<DeadLetterEntry> {
        (**self).upsert_pending(entry).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<DeadLetterEntry>> {
        (**self).get(id).await
    }

    async fn transition(
        &self,
        id: Uuid,
        from: DeadLetterStatus,
        to: DeadLetterStatus,
    ) -> Result<Option<DeadLetterEntry>> {
        (**self).transition(id, from, to).await
    }

    async fn record_retry_failure(
        &self,
        id: Uuid,
        failure: &RetryFailure,
    ) -> Result<Option<DeadLetterEntry>> {
        (**self).record_retry_failure(id, failure).await
    }

    async fn list(
        &self,
        filter: &DeadLetterFilter,
        page: Pagination,
    ) -> Result<(Vec<DeadLetterEntry>, u64)> {
        (**self).list(filter, page).await
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        (**self).delete(id).await
    }
}

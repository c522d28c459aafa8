use super::commands::{
    InvalidateCache, RemoveDeadLetter, ResetCacheMetrics, ResolveDeadLetter, RetryAllDeadLetters,
    RetryDeadLetter,
};
use super::queries::{GetCacheMetrics, ListDeadLetters};
use crate::command_handler::CommandHandler;
use crate::context::AppContext;
use crate::error::AppError;
use crate::inmemory_command_bus::InMemoryCommandBus;
use crate::inmemory_query_bus::InMemoryQueryBus;
use crate::query_handler::QueryHandler;
use async_trait::async_trait;
use backbone_domain::cache::{CacheInvalidationManager, InvalidationMetricsSnapshot};
use backbone_domain::dead_letter::{
    DeadLetterEntry, DeadLetterPage, DeadLetterQueueService, RetryAllSummary,
};
use std::sync::Arc;
use tracing::info;

/// 死信队列的运维处理器
pub struct DeadLetterAdmin {
    service: Arc<DeadLetterQueueService>,
}

impl DeadLetterAdmin {
    pub fn new(service: Arc<DeadLetterQueueService>) -> Arc<Self> {
        Arc::new(Self { service })
    }
}

#[async_trait]
impl CommandHandler<RetryDeadLetter> for DeadLetterAdmin {
    async fn handle(
        &self,
        ctx: &AppContext,
        cmd: RetryDeadLetter,
    ) -> Result<DeadLetterEntry, AppError> {
        info!(dead_letter_id = %cmd.id, actor_id = ?ctx.actor_id, "operator retry");
        Ok(self.service.retry(cmd.id).await?)
    }
}

#[async_trait]
impl CommandHandler<RetryAllDeadLetters> for DeadLetterAdmin {
    async fn handle(
        &self,
        ctx: &AppContext,
        cmd: RetryAllDeadLetters,
    ) -> Result<RetryAllSummary, AppError> {
        info!(actor_id = ?ctx.actor_id, filter = ?cmd.filter, "operator retry-all");
        Ok(self.service.retry_all(&cmd.filter).await?)
    }
}

#[async_trait]
impl CommandHandler<ResolveDeadLetter> for DeadLetterAdmin {
    async fn handle(
        &self,
        ctx: &AppContext,
        cmd: ResolveDeadLetter,
    ) -> Result<DeadLetterEntry, AppError> {
        info!(dead_letter_id = %cmd.id, actor_id = ?ctx.actor_id, "operator resolve");
        Ok(self.service.resolve(cmd.id).await?)
    }
}

#[async_trait]
impl CommandHandler<RemoveDeadLetter> for DeadLetterAdmin {
    async fn handle(&self, ctx: &AppContext, cmd: RemoveDeadLetter) -> Result<(), AppError> {
        info!(dead_letter_id = %cmd.id, actor_id = ?ctx.actor_id, "operator remove");
        Ok(self.service.remove(cmd.id).await?)
    }
}

#[async_trait]
impl QueryHandler<ListDeadLetters> for DeadLetterAdmin {
    async fn handle(&self, _ctx: &AppContext, q: ListDeadLetters) -> Result<DeadLetterPage, AppError> {
        let (filter, page) = q.into_parts()?;
        Ok(self.service.list(&filter, page).await?)
    }
}

/// 缓存失效的运维处理器
pub struct CacheAdmin {
    manager: Arc<CacheInvalidationManager>,
}

impl CacheAdmin {
    pub fn new(manager: Arc<CacheInvalidationManager>) -> Arc<Self> {
        Arc::new(Self { manager })
    }
}

#[async_trait]
impl CommandHandler<InvalidateCache> for CacheAdmin {
    async fn handle(&self, ctx: &AppContext, cmd: InvalidateCache) -> Result<(), AppError> {
        match cmd {
            InvalidateCache::Entity {
                entity_type,
                entity_id,
            } => {
                if entity_type.trim().is_empty() || entity_id.trim().is_empty() {
                    return Err(AppError::Validation(
                        "entityType and entityId must not be empty".into(),
                    ));
                }
                info!(%entity_type, %entity_id, actor_id = ?ctx.actor_id, "manual cache invalidation");
                self.manager.invalidate(&entity_type, &entity_id).await;
            }
            InvalidateCache::Pattern { pattern } => {
                if pattern.trim().is_empty() {
                    return Err(AppError::Validation("pattern must not be empty".into()));
                }
                info!(%pattern, actor_id = ?ctx.actor_id, "manual cache pattern invalidation");
                self.manager.invalidate_pattern(&pattern).await;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CommandHandler<ResetCacheMetrics> for CacheAdmin {
    async fn handle(&self, ctx: &AppContext, _cmd: ResetCacheMetrics) -> Result<(), AppError> {
        info!(actor_id = ?ctx.actor_id, "cache metrics reset");
        self.manager.reset_metrics();
        Ok(())
    }
}

#[async_trait]
impl QueryHandler<GetCacheMetrics> for CacheAdmin {
    async fn handle(
        &self,
        _ctx: &AppContext,
        _q: GetCacheMetrics,
    ) -> Result<InvalidationMetricsSnapshot, AppError> {
        Ok(self.manager.metrics())
    }
}

/// 在命令/查询总线上注册全部运维处理器
pub fn register_admin_handlers(
    commands: &InMemoryCommandBus,
    queries: &InMemoryQueryBus,
    dead_letters: Arc<DeadLetterQueueService>,
    cache: Arc<CacheInvalidationManager>,
) -> Result<(), AppError> {
    let dlq = DeadLetterAdmin::new(dead_letters);
    commands.register::<RetryDeadLetter, _>(dlq.clone())?;
    commands.register::<RetryAllDeadLetters, _>(dlq.clone())?;
    commands.register::<ResolveDeadLetter, _>(dlq.clone())?;
    commands.register::<RemoveDeadLetter, _>(dlq.clone())?;
    queries.register::<ListDeadLetters, _>(dlq)?;

    let cache = CacheAdmin::new(cache);
    commands.register::<InvalidateCache, _>(cache.clone())?;
    commands.register::<ResetCacheMetrics, _>(cache.clone())?;
    queries.register::<GetCacheMetrics, _>(cache)?;

    Ok(())
}

//! 缓存失效管理器（CacheInvalidationManager）
//!
//! `invalidate(entity_type, id)` 删除实体的规范键 `{entity_type}:{id}`，
//! 并按登记的依赖模板删除相关模式（支持跨领域一致性）。
//! 后端错误在此处被吞掉：计入 `failed_invalidations` 并记录日志，永不向调用方传播。
//!
use super::backend::CacheBackend;
use super::metrics::InvalidationMetricsSnapshot;
use super::pattern::render_template;
use crate::metrics::MetricsContext;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct CacheInvalidationManager {
    backend: Arc<dyn CacheBackend>,
    dependencies: DashMap<String, Vec<String>>,
    metrics: Arc<MetricsContext>,
}

impl CacheInvalidationManager {
    pub fn new(backend: Arc<dyn CacheBackend>, metrics: Arc<MetricsContext>) -> Self {
        Self {
            backend,
            dependencies: DashMap::new(),
            metrics,
        }
    }

    /// 实体的规范缓存键
    pub fn canonical_key(entity_type: &str, entity_id: &str) -> String {
        format!("{entity_type}:{entity_id}")
    }

    /// 声明失效 `entity_type` 时需要连带驱逐的模式模板（重复登记被忽略）
    pub fn register_dependency(&self, entity_type: &str, template: impl Into<String>) {
        let template = template.into();
        let mut list = self.dependencies.entry(entity_type.to_string()).or_default();
        if !list.contains(&template) {
            list.push(template);
        }
    }

    pub fn dependencies(&self, entity_type: &str) -> Vec<String> {
        self.dependencies
            .get(entity_type)
            .map(|list| list.value().clone())
            .unwrap_or_default()
    }

    pub async fn invalidate(&self, entity_type: &str, entity_id: &str) {
        self.metrics.cache().record_entity(entity_type);

        let key = Self::canonical_key(entity_type, entity_id);
        self.evict_key(&key).await;

        for template in self.dependencies(entity_type) {
            let pattern = render_template(&template, entity_type, entity_id);
            self.evict_pattern(&pattern).await;
        }

        debug!(entity_type, entity_id, "cache invalidated");
    }

    pub async fn invalidate_pattern(&self, pattern: &str) {
        self.metrics.cache().touch();
        self.evict_pattern(pattern).await;
    }

    pub fn metrics(&self) -> InvalidationMetricsSnapshot {
        self.metrics.cache().snapshot()
    }

    pub fn reset_metrics(&self) {
        self.metrics.cache().reset();
    }

    async fn evict_key(&self, key: &str) {
        match self.backend.delete(key).await {
            Ok(()) => self.metrics.cache().record_key(),
            Err(err) => {
                self.metrics.cache().record_failure();
                warn!(key, error = %err, "cache key eviction failed");
            }
        }
    }

    async fn evict_pattern(&self, pattern: &str) {
        match self.backend.delete_by_pattern(pattern).await {
            Ok(()) => self.metrics.cache().record_pattern(),
            Err(err) => {
                self.metrics.cache().record_failure();
                warn!(pattern, error = %err, "cache pattern eviction failed");
            }
        }
    }
}

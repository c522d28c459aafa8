use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// 缓存失效指标（进程级，由 `MetricsContext` 持有）
#[derive(Default)]
pub struct InvalidationMetrics {
    by_entity_type: DashMap<String, u64>,
    pattern_invalidations: AtomicU64,
    key_invalidations: AtomicU64,
    failed_invalidations: AtomicU64,
    /// 最近一次失效的毫秒时间戳，0 表示尚未发生
    last_invalidation_ms: AtomicI64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidationMetricsSnapshot {
    pub invalidations_by_entity_type: BTreeMap<String, u64>,
    pub pattern_invalidations: u64,
    pub key_invalidations: u64,
    pub failed_invalidations: u64,
    pub last_invalidation: Option<DateTime<Utc>>,
}

impl InvalidationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_entity(&self, entity_type: &str) {
        *self
            .by_entity_type
            .entry(entity_type.to_string())
            .or_insert(0) += 1;
        self.touch();
    }

    pub fn record_key(&self) {
        self.key_invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pattern(&self) {
        self.pattern_invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed_invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn touch(&self) {
        self.last_invalidation_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> InvalidationMetricsSnapshot {
        let last_ms = self.last_invalidation_ms.load(Ordering::Relaxed);
        InvalidationMetricsSnapshot {
            invalidations_by_entity_type: self
                .by_entity_type
                .iter()
                .map(|e| (e.key().clone(), *e.value()))
                .collect(),
            pattern_invalidations: self.pattern_invalidations.load(Ordering::Relaxed),
            key_invalidations: self.key_invalidations.load(Ordering::Relaxed),
            failed_invalidations: self.failed_invalidations.load(Ordering::Relaxed),
            last_invalidation: if last_ms == 0 {
                None
            } else {
                DateTime::from_timestamp_millis(last_ms)
            },
        }
    }

    pub fn reset(&self) {
        self.by_entity_type.clear();
        self.pattern_invalidations.store(0, Ordering::Relaxed);
        self.key_invalidations.store(0, Ordering::Relaxed);
        self.failed_invalidations.store(0, Ordering::Relaxed);
        self.last_invalidation_ms.store(0, Ordering::Relaxed);
    }
}

//! 事件总线指标
//!
//! 按事件名累计计数，所有计数器均为原子操作，可在并发分发中安全递增。
//!
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
struct EventCounters {
    published: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
    dead_lettered: AtomicU64,
    dead_letter_store_failures: AtomicU64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventCountersSnapshot {
    pub published: u64,
    /// 处理器最终成功的次数
    pub succeeded: u64,
    /// 处理器最终失败的次数
    pub failed: u64,
    /// 触发重试的次数
    pub retried: u64,
    pub dead_lettered: u64,
    /// 死信写入本身失败，仅保留在指标中
    pub dead_letter_store_failures: u64,
}

#[derive(Default)]
pub struct EventMetrics {
    by_event: DashMap<String, Arc<EventCounters>>,
}

impl EventMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn counters(&self, event_name: &str) -> Arc<EventCounters> {
        if let Some(c) = self.by_event.get(event_name) {
            return c.value().clone();
        }
        self.by_event
            .entry(event_name.to_string())
            .or_default()
            .value()
            .clone()
    }

    pub fn record_published(&self, event_name: &str) {
        self.counters(event_name)
            .published
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_succeeded(&self, event_name: &str) {
        self.counters(event_name)
            .succeeded
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self, event_name: &str) {
        self.counters(event_name)
            .failed
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retried(&self, event_name: &str) {
        self.counters(event_name)
            .retried
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dead_lettered(&self, event_name: &str) {
        self.counters(event_name)
            .dead_lettered
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dead_letter_store_failure(&self, event_name: &str) {
        self.counters(event_name)
            .dead_letter_store_failures
            .fetch_add(1, Ordering::Relaxed);
    }

    /// 单个事件名的计数快照；未出现过的事件名返回全零
    pub fn event(&self, event_name: &str) -> EventCountersSnapshot {
        self.by_event
            .get(event_name)
            .map(|c| Self::snapshot_of(&c))
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> BTreeMap<String, EventCountersSnapshot> {
        self.by_event
            .iter()
            .map(|e| (e.key().clone(), Self::snapshot_of(e.value())))
            .collect()
    }

    pub fn reset(&self) {
        self.by_event.clear();
    }

    fn snapshot_of(c: &EventCounters) -> EventCountersSnapshot {
        EventCountersSnapshot {
            published: c.published.load(Ordering::Relaxed),
            succeeded: c.succeeded.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            retried: c.retried.load(Ordering::Relaxed),
            dead_lettered: c.dead_lettered.load(Ordering::Relaxed),
            dead_letter_store_failures: c.dead_letter_store_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::task::JoinSet;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_are_not_lost() {
        let metrics = Arc::new(EventMetrics::new());
        let mut set = JoinSet::new();
        for _ in 0..100 {
            let metrics = metrics.clone();
            set.spawn(async move {
                metrics.record_published("UserUpdated");
                metrics.record_failed("UserUpdated");
            });
        }
        while let Some(res) = set.join_next().await {
            res.unwrap();
        }

        let snap = metrics.event("UserUpdated");
        assert_eq!(snap.published, 100);
        assert_eq!(snap.failed, 100);
        assert_eq!(snap.succeeded, 0);
    }

    #[test]
    fn unknown_event_snapshot_is_zero_and_reset_clears() {
        let metrics = EventMetrics::new();
        assert_eq!(metrics.event("Nope"), EventCountersSnapshot::default());

        metrics.record_dead_lettered("E");
        assert_eq!(metrics.snapshot().len(), 1);
        metrics.reset();
        assert!(metrics.snapshot().is_empty());
    }
}

//! 指标上下文
//!
//! 由启动流程显式构造一次，并以 `Arc<MetricsContext>` 注入事件总线与缓存失效管理器；
//! 生命周期与进程一致，仅能通过显式调用重置。
//!
use crate::cache::InvalidationMetrics;
use crate::eventing::EventMetrics;
use std::sync::Arc;

#[derive(Default)]
pub struct MetricsContext {
    events: EventMetrics,
    cache: InvalidationMetrics,
}

impl MetricsContext {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> &EventMetrics {
        &self.events
    }

    pub fn cache(&self) -> &InvalidationMetrics {
        &self.cache
    }
}

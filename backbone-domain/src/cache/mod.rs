//! 缓存失效（cache）
//!
//! 将实体变更翻译为缓存驱逐，与具体缓存后端解耦：
//! - `CacheBackend`：后端能力接口（按键删除、按模式删除）；
//! - `CacheInvalidationManager`：规范键 + 依赖模式驱逐，失败只计数与记录日志，从不外抛；
//! - `CacheInvalidationHandler`：将知名领域事件绑定到失效调用的总线消费者；
//! - `InvalidationMetrics`：失效计数。
//!
//! 缓存新鲜度是尽力而为的，任何驱逐失败都不能影响触发它的写操作或事件处理。
//!
mod backend;
mod handlers;
mod manager;
mod metrics;
mod pattern;

pub use backend::{CacheBackend, InMemoryCacheBackend};
pub use handlers::{
    CACHE_INVALIDATION_HANDLER_ID, CacheInvalidationHandler, register_default_dependencies,
};
pub use manager::CacheInvalidationManager;
pub use metrics::{InvalidationMetrics, InvalidationMetricsSnapshot};
pub use pattern::{escape_glob, glob_match, render_template};

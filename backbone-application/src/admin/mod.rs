//! 运维接口（admin）
//!
//! 死信队列与缓存失效的运维命令/查询。消息均实现 `serde::Deserialize`，
//! 接口层可直接从请求绑定：
//!
//! | 路由 | 消息 |
//! |---|---|
//! | `GET /dlq` | [`ListDeadLetters`] |
//! | `POST /dlq/:id/retry` | [`RetryDeadLetter`] |
//! | `POST /dlq/retry-all` | [`RetryAllDeadLetters`] |
//! | `DELETE /dlq/:id` | [`RemoveDeadLetter`] |
//! | `PUT /dlq/:id/resolve` | [`ResolveDeadLetter`] |
//! | `GET /cache/metrics` | [`GetCacheMetrics`] |
//! | `POST /cache/invalidate` | [`InvalidateCache`] |
//! | `POST /cache/reset-metrics` | [`ResetCacheMetrics`] |
//!
mod commands;
mod handlers;
mod queries;

pub use commands::{
    InvalidateCache, RemoveDeadLetter, ResetCacheMetrics, ResolveDeadLetter,
    RetryAllDeadLetters, RetryDeadLetter,
};
pub use handlers::{CacheAdmin, DeadLetterAdmin, register_admin_handlers};
pub use queries::{GetCacheMetrics, ListDeadLetters};

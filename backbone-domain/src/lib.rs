//! 领域事件骨干（backbone-domain）
//!
//! 为业务模块之间的解耦提供异步事件基础设施：
//! - 事件信封与事件目录（`domain_event`）：事件名到载荷模式的显式登记与校验；
//! - 健壮事件总线（`eventing`）：处理器隔离、有界重试与退避、超时、失败升级到死信；
//! - 死信队列（`dead_letter`）：失败尝试的持久化记录、查询、重放与运维流程；
//! - 缓存失效（`cache`）：消费领域事件，按实体与依赖模式驱逐缓存，尽力而为；
//! - 指标上下文（`metrics`）：由启动流程显式构造并注入，而非全局单例。
//!
//! 本 crate 仅依赖窄接口（`DeadLetterRepository`、`CacheBackend`）访问存储与缓存，
//! 便于在不同基础设施（Postgres、Redis 等）上进行适配实现。
//!
//! 典型装配顺序：
//! 1. 构造 `MetricsContext` 与 `EventCatalog`，登记事件模式；
//! 2. 构造共享的 `HandlerRegistry` 与 `DeadLetterQueueService`；
//! 3. 以上述依赖构造 `RobustEventBus`；
//! 4. 构造 `CacheInvalidationManager` 并订阅 `CacheInvalidationHandler`。
//!
pub mod cache;
pub mod dead_letter;
pub mod domain_event;
pub mod error;
pub mod eventing;
pub mod metrics;

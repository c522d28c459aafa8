//! 死信队列（Dead Letter Queue）
//!
//! - `entry`：死信记录、状态、过滤与分页模型；
//! - `repository`：持久化协议，附内存与 Postgres（`infra-sqlx`）实现；
//! - `service`：存储、查询、重试、判定与删除；
//! - `reclaimer`：周期性自动重试 pending 记录的长驻任务。
//!
mod entry;
mod reclaimer;
mod repository;
mod repository_inmemory;
#[cfg(feature = "infra-sqlx")]
mod repository_postgres;
mod service;

pub use entry::{
    DeadLetterEntry, DeadLetterFilter, DeadLetterPage, DeadLetterStatus, NewDeadLetter,
    Pagination, RetryAllSummary, RetryFailure,
};
pub use reclaimer::{DeadLetterReclaimer, EngineHandle, ReclaimerConfig};
pub use repository::DeadLetterRepository;
pub use repository_inmemory::InMemoryDeadLetterRepository;
#[cfg(feature = "infra-sqlx")]
pub use repository_postgres::PgDeadLetterRepository;
pub use service::{DeadLetterConfig, DeadLetterQueueService, DeadLetterSink};

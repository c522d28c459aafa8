//! 领域层统一错误定义
//!
//! 聚焦事件目录、事件分发、死信队列与持久化等最小必要集合，
//! 便于在各实现层统一转换为 `DomainError`。
//!
use crate::eventing::DispatchFailures;
use thiserror::Error;

/// 统一错误类型（基础库最小必要集）
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DomainError {
    // --- 序列化 ---
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },
    #[error("parse error: {reason}")]
    Parse { reason: String },

    // --- 事件目录/事件系统 ---
    #[error("unknown event: {event_name}")]
    UnknownEvent { event_name: String },
    #[error("invalid payload: event={event_name}, reason={reason}")]
    InvalidPayload { event_name: String, reason: String },
    #[error("{0}")]
    Dispatch(DispatchFailures),

    // --- 死信队列 ---
    #[error("handler unavailable: event={event_name}, handler={handler_id}")]
    HandlerUnavailable {
        event_name: String,
        handler_id: String,
    },
    #[error("dead letter store unavailable: {reason}")]
    StoreUnavailable { reason: String },

    // --- 仓储/持久化 ---
    #[error("database error: {reason}")]
    Database { reason: String },

    // --- 状态校验 ---
    #[error("invalid state: {reason}")]
    InvalidState { reason: String },
    #[error("invalid value: {reason}")]
    InvalidValue { reason: String },
    #[error("not found: {reason}")]
    NotFound { reason: String },
}

impl DomainError {
    pub fn not_found(reason: impl Into<String>) -> Self {
        DomainError::NotFound {
            reason: reason.into(),
        }
    }

    pub fn store_unavailable(reason: impl Into<String>) -> Self {
        DomainError::StoreUnavailable {
            reason: reason.into(),
        }
    }
}

/// 统一 Result 类型别名
pub type DomainResult<T> = Result<T, DomainError>;

// ---- Cross-crate conversions for infrastructure convenience ----
// 允许在基础设施层直接使用 `?` 将 sqlx/uuid 等错误转换为 DomainError

#[cfg(feature = "infra-sqlx")]
impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DomainError::NotFound {
                reason: "row not found".to_string(),
            },
            other => DomainError::Database {
                reason: other.to_string(),
            },
        }
    }
}

impl From<uuid::Error> for DomainError {
    fn from(err: uuid::Error) -> Self {
        DomainError::Parse {
            reason: err.to_string(),
        }
    }
}

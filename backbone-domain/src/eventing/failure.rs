//! 处理失败的分类与聚合
//!
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// 毒消息：载荷结构性错误，重试永远无法成功
#[derive(Debug, Clone, Error)]
#[error("poison event: {reason}")]
pub struct PoisonEvent {
    reason: String,
}

impl PoisonEvent {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// 单次尝试超时
#[derive(Debug, Clone, Copy, Error)]
#[error("handler attempt timed out after {after:?}")]
pub struct HandlerTimeout {
    pub after: Duration,
}

/// 失败类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// 可重试（网络抖动、超时等）；未分类错误默认归为此类
    Transient,
    /// 不可重试，直接进入死信
    Permanent,
}

impl FailureKind {
    pub fn classify(err: &anyhow::Error) -> Self {
        if err.chain().any(|cause| cause.is::<PoisonEvent>()) {
            FailureKind::Permanent
        } else {
            FailureKind::Transient
        }
    }
}

/// 单个处理器的最终失败
#[derive(Debug, Clone)]
pub struct HandlerFailure {
    pub handler_id: String,
    pub kind: FailureKind,
    /// 实际执行的尝试次数
    pub attempts: u32,
    pub message: String,
    /// 是否已成功写入死信
    pub dead_lettered: bool,
}

/// 同一次发布中所有失败处理器的聚合错误
#[derive(Debug, Clone)]
pub struct DispatchFailures {
    pub event_id: String,
    pub event_name: String,
    pub failures: Vec<HandlerFailure>,
}

impl DispatchFailures {
    pub fn handler_ids(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.handler_id.as_str()).collect()
    }
}

impl fmt::Display for DispatchFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} handler(s) failed for event {} ({}): ",
            self.failures.len(),
            self.event_name,
            self.event_id
        )?;
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(
                f,
                "{} after {} attempt(s): {}",
                failure.handler_id, failure.attempts, failure.message
            )?;
        }
        Ok(())
    }
}

impl std::error::Error for DispatchFailures {}

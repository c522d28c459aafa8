//! 死信记录模型
//!
use crate::domain_event::EventEnvelope;
use crate::error::DomainError;
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// 死信状态：只能 pending→resolved 或 pending→exhausted；
/// 显式重试可将 exhausted 重置为 pending
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeadLetterStatus {
    #[default]
    Pending,
    Resolved,
    Exhausted,
}

impl DeadLetterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeadLetterStatus::Pending => "pending",
            DeadLetterStatus::Resolved => "resolved",
            DeadLetterStatus::Exhausted => "exhausted",
        }
    }
}

impl fmt::Display for DeadLetterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeadLetterStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DeadLetterStatus::Pending),
            "resolved" => Ok(DeadLetterStatus::Resolved),
            "exhausted" => Ok(DeadLetterStatus::Exhausted),
            other => Err(DomainError::InvalidValue {
                reason: format!("unknown dead letter status: {other}"),
            }),
        }
    }
}

/// 一条失败的 (事件, 处理器) 尝试
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterEntry {
    pub id: Uuid,
    pub event_id: String,
    pub event_name: String,
    pub event_data: Value,
    pub handler_id: String,
    pub error_message: String,
    pub error_stack: Option<String>,
    pub retry_count: u32,
    pub last_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub status: DeadLetterStatus,
    pub correlation_id: Option<String>,
    pub source_id: Option<String>,
}

impl DeadLetterEntry {
    /// 以存储的载荷重建事件信封，用于重放
    pub fn to_envelope(&self) -> EventEnvelope {
        EventEnvelope::builder()
            .id(self.event_id.clone())
            .name(self.event_name.clone())
            .payload(self.event_data.clone())
            .maybe_correlation_id(self.correlation_id.clone())
            .maybe_source_id(self.source_id.clone())
            .occurred_at(self.created_at)
            .build()
    }

    pub fn is_pending(&self) -> bool {
        self.status == DeadLetterStatus::Pending
    }
}

/// 总线耗尽重试后提交的失败记录
#[derive(Debug, Clone, Builder)]
pub struct NewDeadLetter {
    pub event_id: String,
    pub event_name: String,
    pub event_data: Value,
    pub handler_id: String,
    pub error_message: String,
    pub error_stack: Option<String>,
    pub retry_count: u32,
    pub correlation_id: Option<String>,
    pub source_id: Option<String>,
}

impl NewDeadLetter {
    pub fn into_entry(self, now: DateTime<Utc>) -> DeadLetterEntry {
        DeadLetterEntry {
            id: Uuid::new_v4(),
            event_id: self.event_id,
            event_name: self.event_name,
            event_data: self.event_data,
            handler_id: self.handler_id,
            error_message: self.error_message,
            error_stack: self.error_stack,
            retry_count: self.retry_count,
            last_retry_at: None,
            created_at: now,
            status: DeadLetterStatus::Pending,
            correlation_id: self.correlation_id,
            source_id: self.source_id,
        }
    }
}

/// 列表过滤条件（日期区间为闭区间）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterFilter {
    pub event_name: Option<String>,
    pub status: Option<DeadLetterStatus>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
}

impl DeadLetterFilter {
    pub fn pending() -> Self {
        Self {
            status: Some(DeadLetterStatus::Pending),
            ..Self::default()
        }
    }

    pub fn matches(&self, entry: &DeadLetterEntry) -> bool {
        self.event_name
            .as_deref()
            .is_none_or(|name| entry.event_name == name)
            && self.status.is_none_or(|status| entry.status == status)
            && self.from_date.is_none_or(|from| entry.created_at >= from)
            && self.to_date.is_none_or(|to| entry.created_at <= to)
    }
}

/// 分页参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: u32,
    pub offset: u32,
}

impl Pagination {
    pub const DEFAULT_LIMIT: u32 = 50;
    pub const MAX_LIMIT: u32 = 500;

    pub fn new(limit: u32, offset: u32) -> Self {
        Self { limit, offset }.normalized()
    }

    /// 将 limit 限制在 [1, MAX_LIMIT]
    pub fn normalized(self) -> Self {
        Self {
            limit: self.limit.clamp(1, Self::MAX_LIMIT),
            offset: self.offset,
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: Self::DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

/// 分页结果，条目按 created_at 倒序
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterPage {
    pub entries: Vec<DeadLetterEntry>,
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
}

/// 批量重试汇总：succeeded + failed == attempted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryAllSummary {
    pub attempted: u32,
    pub succeeded: u32,
    pub failed: u32,
}

/// 一次失败的重放，由仓储以相对增量写入
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryFailure {
    pub error_message: String,
    pub error_stack: Option<String>,
    /// 毒消息：不论计数直接 exhausted
    pub permanent: bool,
    /// retry_count 超过该值时 exhausted
    pub max_retry_count: u32,
}

impl RetryFailure {
    /// 累加后的计数是否使记录进入 exhausted
    pub fn exhausts(&self, retry_count: u32) -> bool {
        self.permanent || retry_count > self.max_retry_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn entry() -> DeadLetterEntry {
        NewDeadLetter::builder()
            .event_id("e-1".into())
            .event_name("UserUpdated".into())
            .event_data(json!({"userId": "u1"}))
            .handler_id("audit".into())
            .error_message("boom".into())
            .retry_count(3)
            .correlation_id("cor-1".into())
            .build()
            .into_entry(Utc::now())
    }

    #[test]
    fn status_parses_and_serializes_lowercase() {
        assert_eq!(
            "exhausted".parse::<DeadLetterStatus>().unwrap(),
            DeadLetterStatus::Exhausted
        );
        assert!("gone".parse::<DeadLetterStatus>().is_err());
        assert_eq!(
            serde_json::to_value(DeadLetterStatus::Pending).unwrap(),
            json!("pending")
        );
    }

    #[test]
    fn filter_matches_on_every_criterion() {
        let e = entry();
        assert!(DeadLetterFilter::default().matches(&e));
        assert!(DeadLetterFilter::pending().matches(&e));

        let by_name = DeadLetterFilter {
            event_name: Some("Other".into()),
            ..Default::default()
        };
        assert!(!by_name.matches(&e));

        let window = DeadLetterFilter {
            from_date: Some(e.created_at - Duration::minutes(1)),
            to_date: Some(e.created_at),
            ..Default::default()
        };
        assert!(window.matches(&e));

        let future = DeadLetterFilter {
            from_date: Some(e.created_at + Duration::minutes(1)),
            ..Default::default()
        };
        assert!(!future.matches(&e));
    }

    #[test]
    fn envelope_is_rebuilt_from_row() {
        let e = entry();
        let env = e.to_envelope();
        assert_eq!(env.id(), "e-1");
        assert_eq!(env.name(), "UserUpdated");
        assert_eq!(env.correlation_id(), Some("cor-1"));
        assert_eq!(env.payload(), &json!({"userId": "u1"}));
    }

    #[test]
    fn pagination_is_clamped() {
        assert_eq!(Pagination::new(0, 5).limit, 1);
        assert_eq!(Pagination::new(10_000, 0).limit, Pagination::MAX_LIMIT);
        assert_eq!(Pagination::default().limit, 50);
    }
}

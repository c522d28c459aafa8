use bon::Builder;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 事件信封：一次发布调用在分发过程中的不可变表示
///
/// 仅当某个处理器耗尽重试时才会随死信记录持久化，其余情况下在全部处理器结束后丢弃。
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// 事件唯一标识（死信去重键的一部分）
    id: String,
    /// 事件名，如 `UserUpdated`
    name: String,
    /// 事件载荷
    payload: Value,
    /// 关联 ID，用于将多个事件关联到同一个业务操作
    correlation_id: Option<String>,
    /// 来源标识（发布方模块或请求）
    source_id: Option<String>,
    /// 事件发生时间
    occurred_at: DateTime<Utc>,
}

impl EventEnvelope {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub fn source_id(&self) -> Option<&str> {
        self.source_id.as_deref()
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    /// 将载荷反序列化为具体类型
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

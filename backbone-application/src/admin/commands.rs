use crate::command::Command;
use backbone_domain::dead_letter::{DeadLetterEntry, DeadLetterFilter, RetryAllSummary};
use serde::Deserialize;
use uuid::Uuid;

/// 以存储的载荷重放单条死信
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RetryDeadLetter {
    pub id: Uuid,
}

impl Command for RetryDeadLetter {
    const NAME: &'static str = "RetryDeadLetter";
    type Output = DeadLetterEntry;
}

/// 重放全部匹配的 pending 死信（未指定 status 时按 pending；其他 status 不匹配任何记录）
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RetryAllDeadLetters {
    #[serde(default)]
    pub filter: DeadLetterFilter,
}

impl Command for RetryAllDeadLetters {
    const NAME: &'static str = "RetryAllDeadLetters";
    type Output = RetryAllSummary;
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResolveDeadLetter {
    pub id: Uuid,
}

impl Command for ResolveDeadLetter {
    const NAME: &'static str = "ResolveDeadLetter";
    type Output = DeadLetterEntry;
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoveDeadLetter {
    pub id: Uuid,
}

impl Command for RemoveDeadLetter {
    const NAME: &'static str = "RemoveDeadLetter";
    type Output = ();
}

/// 手动失效缓存：按实体或按模式
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum InvalidateCache {
    #[serde(rename_all = "camelCase")]
    Entity {
        entity_type: String,
        entity_id: String,
    },
    Pattern { pattern: String },
}

impl Command for InvalidateCache {
    const NAME: &'static str = "InvalidateCache";
    type Output = ();
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct ResetCacheMetrics;

impl Command for ResetCacheMetrics {
    const NAME: &'static str = "ResetCacheMetrics";
    type Output = ();
}

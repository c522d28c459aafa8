//! 事件目录（EventCatalog）
//!
//! 事件名到载荷模式的显式登记表。发布与订阅未登记的事件名属于装配错误，
//! 在启动或测试阶段即被拒绝，而不是在生产中悄然丢失。
//!
use crate::error::{DomainError, DomainResult};
use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

/// 具名事件载荷：一个事件名对应一个强类型载荷
pub trait EventPayload: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// 稳定的事件名（不随重构变化）
    const NAME: &'static str;
}

type PayloadValidator = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

/// 事件目录，克隆后共享同一份登记表
#[derive(Clone, Default)]
pub struct EventCatalog {
    schemas: Arc<DashMap<String, PayloadValidator>>,
}

impl EventCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记强类型事件
    pub fn register<E: EventPayload>(&self) {
        self.register_schema::<E>(E::NAME);
    }

    /// 以任意可反序列化类型作为事件名的载荷模式
    pub fn register_schema<T: DeserializeOwned + 'static>(&self, event_name: impl Into<String>) {
        let validator: PayloadValidator = Arc::new(|payload: &Value| {
            serde_json::from_value::<T>(payload.clone())
                .map(|_| ())
                .map_err(|e| e.to_string())
        });
        self.schemas.insert(event_name.into(), validator);
    }

    /// 登记不限载荷形态的事件名
    pub fn register_untyped(&self, event_name: impl Into<String>) {
        self.schemas
            .insert(event_name.into(), Arc::new(|_: &Value| Ok(())));
    }

    pub fn contains(&self, event_name: &str) -> bool {
        self.schemas.contains_key(event_name)
    }

    /// 校验事件名已登记且载荷满足模式
    pub fn validate(&self, event_name: &str, payload: &Value) -> DomainResult<()> {
        let Some(validator) = self.schemas.get(event_name).map(|v| v.value().clone()) else {
            return Err(DomainError::UnknownEvent {
                event_name: event_name.to_string(),
            });
        };

        validator(payload).map_err(|reason| DomainError::InvalidPayload {
            event_name: event_name.to_string(),
            reason,
        })
    }

    /// 已登记的事件名（按字典序）
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.schemas.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

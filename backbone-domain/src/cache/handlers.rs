//! 缓存失效事件处理器
//!
//! 在启动时将各限界上下文的知名事件绑定到 `CacheInvalidationManager`。
//! 载荷结构不合法时记录日志并直接返回成功：这类毒消息重试永远不会成功，
//! 不应消耗重试预算。
//!
use super::manager::CacheInvalidationManager;
use crate::domain_event::{
    ChallengeChanged, EntityKind, EvaluationChanged, EventEnvelope, PersonalityProfileChanged,
    UserChanged, WellKnownEvent,
};
use crate::error::DomainResult;
use crate::eventing::{EventHandler, HandledEventType, NamedEventHandler, RobustEventBus};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::warn;

pub const CACHE_INVALIDATION_HANDLER_ID: &str = "cache-invalidation";

pub struct CacheInvalidationHandler {
    manager: Arc<CacheInvalidationManager>,
}

impl CacheInvalidationHandler {
    pub fn new(manager: Arc<CacheInvalidationManager>) -> Arc<Self> {
        Arc::new(Self { manager })
    }

    /// 订阅全部知名事件
    pub fn subscribe(self: &Arc<Self>, bus: &RobustEventBus) -> DomainResult<()> {
        bus.register(self.clone())
    }

    fn decode<T: DeserializeOwned>(event: &EventEnvelope) -> Option<T> {
        match event.payload_as::<T>() {
            Ok(payload) => Some(payload),
            Err(err) => {
                warn!(
                    event_id = event.id(),
                    event_name = event.name(),
                    error = %err,
                    "malformed payload, skipping cache invalidation"
                );
                None
            }
        }
    }

    async fn invalidate_user(&self, user_id: Option<&str>) {
        if let Some(user_id) = user_id {
            self.manager
                .invalidate(EntityKind::User.cache_type(), user_id)
                .await;
        }
    }
}

#[async_trait]
impl EventHandler for CacheInvalidationHandler {
    async fn handle(&self, event: &EventEnvelope) -> anyhow::Result<()> {
        let Some(kind) = WellKnownEvent::from_name(event.name()) else {
            warn!(event_name = event.name(), "not a cache-relevant event");
            return Ok(());
        };

        match kind.entity() {
            EntityKind::User => {
                let Some(p) = Self::decode::<UserChanged>(event) else {
                    return Ok(());
                };
                self.invalidate_user(Some(&p.user_id)).await;
            }
            EntityKind::Challenge => {
                let Some(p) = Self::decode::<ChallengeChanged>(event) else {
                    return Ok(());
                };
                self.manager
                    .invalidate(EntityKind::Challenge.cache_type(), &p.challenge_id)
                    .await;
                self.invalidate_user(p.user_id.as_deref()).await;
            }
            EntityKind::Evaluation => {
                let Some(p) = Self::decode::<EvaluationChanged>(event) else {
                    return Ok(());
                };
                self.manager
                    .invalidate(EntityKind::Evaluation.cache_type(), &p.evaluation_id)
                    .await;
                // 评估完成会改变父挑战的展示数据
                self.manager
                    .invalidate(EntityKind::Challenge.cache_type(), &p.challenge_id)
                    .await;
                self.invalidate_user(p.user_id.as_deref()).await;
            }
            EntityKind::PersonalityProfile => {
                let Some(p) = Self::decode::<PersonalityProfileChanged>(event) else {
                    return Ok(());
                };
                self.manager
                    .invalidate(EntityKind::PersonalityProfile.cache_type(), &p.profile_id)
                    .await;
                self.invalidate_user(Some(&p.user_id)).await;
            }
        }

        Ok(())
    }
}

impl NamedEventHandler for CacheInvalidationHandler {
    fn handler_id(&self) -> &str {
        CACHE_INVALIDATION_HANDLER_ID
    }

    fn handled_event_type(&self) -> HandledEventType {
        HandledEventType::Many(
            WellKnownEvent::ALL
                .iter()
                .map(|event| event.name().to_string())
                .collect(),
        )
    }
}

/// 默认依赖模式
pub fn register_default_dependencies(manager: &CacheInvalidationManager) {
    manager.register_dependency(EntityKind::User.cache_type(), "user:{id}:*");
    manager.register_dependency(EntityKind::Challenge.cache_type(), "challenge:{id}:*");
    manager.register_dependency(EntityKind::Challenge.cache_type(), "challenges:list:*");
    manager.register_dependency(EntityKind::Evaluation.cache_type(), "evaluation:{id}:*");
    manager.register_dependency(
        EntityKind::PersonalityProfile.cache_type(),
        "personality:{id}:*",
    );
}

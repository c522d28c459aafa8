//! 各限界上下文的知名事件
//!
//! 每个事件名是一个带显式载荷模式的标签变体：`WellKnownEvent` 枚举列出全部事件名，
//! 同名的新类型结构体（如 `UserUpdated`）实现 `EventPayload` 以支持强类型发布。
//!
use super::catalog::{EventCatalog, EventPayload};
use serde::{Deserialize, Serialize};

/// 事件所属的实体种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    User,
    Challenge,
    Evaluation,
    PersonalityProfile,
}

impl EntityKind {
    /// 缓存键使用的实体类型名
    pub fn cache_type(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Challenge => "challenge",
            EntityKind::Evaluation => "evaluation",
            EntityKind::PersonalityProfile => "personality",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserChanged {
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeChanged {
    pub challenge_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationChanged {
    pub evaluation_id: String,
    /// 父挑战，评估变更需要连带失效挑战缓存
    pub challenge_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalityProfileChanged {
    pub profile_id: String,
    pub user_id: String,
}

macro_rules! well_known_events {
    ($($event:ident($payload:ty) => $entity:ident,)+) => {
        /// 知名事件名
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum WellKnownEvent {
            $($event,)+
        }

        impl WellKnownEvent {
            pub const ALL: &'static [WellKnownEvent] = &[$(WellKnownEvent::$event,)+];

            pub fn name(&self) -> &'static str {
                match self {
                    $(WellKnownEvent::$event => stringify!($event),)+
                }
            }

            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $(stringify!($event) => Some(WellKnownEvent::$event),)+
                    _ => None,
                }
            }

            pub fn entity(&self) -> EntityKind {
                match self {
                    $(WellKnownEvent::$event => EntityKind::$entity,)+
                }
            }

            fn register(&self, catalog: &EventCatalog) {
                match self {
                    $(WellKnownEvent::$event => catalog.register::<$event>(),)+
                }
            }
        }

        $(
            #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
            #[serde(transparent)]
            pub struct $event(pub $payload);

            impl EventPayload for $event {
                const NAME: &'static str = stringify!($event);
            }
        )+
    };
}

well_known_events! {
    UserCreated(UserChanged) => User,
    UserUpdated(UserChanged) => User,
    UserDeleted(UserChanged) => User,
    ChallengeCreated(ChallengeChanged) => Challenge,
    ChallengeUpdated(ChallengeChanged) => Challenge,
    ChallengeDeleted(ChallengeChanged) => Challenge,
    EvaluationCreated(EvaluationChanged) => Evaluation,
    EvaluationCompleted(EvaluationChanged) => Evaluation,
    EvaluationDeleted(EvaluationChanged) => Evaluation,
    PersonalityProfileCreated(PersonalityProfileChanged) => PersonalityProfile,
    PersonalityProfileUpdated(PersonalityProfileChanged) => PersonalityProfile,
    PersonalityProfileDeleted(PersonalityProfileChanged) => PersonalityProfile,
}

/// 在事件目录中登记全部知名事件
pub fn register_well_known_events(catalog: &EventCatalog) {
    for event in WellKnownEvent::ALL {
        event.register(catalog);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn names_roundtrip_through_from_name() {
        for event in WellKnownEvent::ALL {
            assert_eq!(WellKnownEvent::from_name(event.name()), Some(*event));
        }
        assert_eq!(WellKnownEvent::from_name("Unknown"), None);
        assert_eq!(WellKnownEvent::EvaluationCompleted.entity(), EntityKind::Evaluation);
    }

    #[test]
    fn registered_schemas_validate_payloads() {
        let catalog = EventCatalog::new();
        register_well_known_events(&catalog);

        assert_eq!(catalog.names().len(), WellKnownEvent::ALL.len());
        assert!(catalog.validate("UserUpdated", &json!({"userId": "u1"})).is_ok());
        assert!(catalog.validate("UserUpdated", &json!({"user": "u1"})).is_err());
        assert!(
            catalog
                .validate(
                    "EvaluationCompleted",
                    &json!({"evaluationId": "e1", "challengeId": "c1"})
                )
                .is_ok()
        );
    }

    #[test]
    fn typed_event_serializes_as_bare_payload() {
        let ev = UserUpdated(UserChanged {
            user_id: "u1".into(),
        });
        assert_eq!(serde_json::to_value(&ev).unwrap(), json!({"userId": "u1"}));
        assert_eq!(UserUpdated::NAME, "UserUpdated");
    }
}

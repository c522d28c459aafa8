//! 领域事件（Domain Event）与事件目录
//!
//! 定义一次发布调用在内存中的表示（`EventEnvelope`）、发布选项（`PublishOptions`），
//! 以及事件名到载荷模式的登记表（`EventCatalog`）与各限界上下文的知名事件。

mod catalog;
mod event_envelope;
mod publish_options;
mod well_known;

pub use catalog::{EventCatalog, EventPayload};
pub use event_envelope::EventEnvelope;
pub use publish_options::{DispatchMode, PublishOptions};
pub use well_known::{
    ChallengeChanged, ChallengeCreated, ChallengeDeleted, ChallengeUpdated, EntityKind,
    EvaluationChanged, EvaluationCompleted, EvaluationCreated, EvaluationDeleted,
    PersonalityProfileChanged, PersonalityProfileCreated, PersonalityProfileDeleted,
    PersonalityProfileUpdated, UserChanged, UserCreated, UserDeleted, UserUpdated,
    WellKnownEvent, register_well_known_events,
};

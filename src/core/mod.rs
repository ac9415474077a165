//! 核心：错误、状态、信号、Actor 与编排器

pub mod actor;
pub mod error;
pub mod orchestrator;
pub mod signals;
pub mod state;

pub use actor::Monologue;
pub use error::HiveError;
pub use orchestrator::{InjectionHook, Orchestrator, QuestionHook};
pub use signals::{ReplyRouter, WakeSignals};
pub use state::{
    ActorId, ActorSummary, InjectionEvent, KillOutcome, MessagePayload, MonologueState,
    RegistrySnapshot, RoleClass,
};

//! Alert event lifecycle engine.
//!
//! Evaluator output enters through an [`EngineHandle`]. Each observation is
//! fingerprinted, run through the per-hash state machine in [`lifecycle`],
//! enriched by [`template`] rendering and the [`mute`] gate, persisted via
//! [`n9e_storage::Store::persist`] and finally handed to the notification
//! emitter, once for the rule itself and once per matching [`subscribe`]
//! rule.

pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod mute;
mod processor;
pub mod registry;
pub mod subscribe;
pub mod template;

#[cfg(test)]
mod tests;

pub use engine::{Engine, EngineContext, EngineHandle, DEFAULT_QUEUE_DEPTH};
pub use error::{AlertError, Result};
pub use lifecycle::{HashState, Lifecycle, Plan, Step};
pub use mute::{is_muted, matching_mute, CompiledMute};
pub use processor::IngestSummary;
pub use registry::{Registry, RegistrySnapshot, RegistrySource, RuleSource};
pub use subscribe::{route, CompiledSubscription};
pub use template::{HandlebarsRenderer, Renderer, TemplateContext, TemplateError};

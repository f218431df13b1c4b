//! Failure policy and the engine that applies it.

mod engine;
mod rules;

pub use engine::{EngineHandle, EngineMessage, PolicyEngine};
pub use rules::{Action, FailurePolicy, PolicyConfig};

//! Helpers shared by the backends and the orchestrator.

pub mod pipeline;
pub mod retention;

//! Module lifecycle orchestrator.
//!
//! Owns the guest module instances (one cognitive shell, one active
//! model), sequences their loading, exposes the unified `process_input`
//! entry point, and degrades to an in-process fallback engine when
//! loading fails. The system always answers `process_input` once
//! started — availability over fidelity.

mod config;
mod error;
mod fallback;
mod orchestrator;

pub use config::{ModelFileEntry, RuntimeConfig};
pub use error::RuntimeError;
pub use fallback::FallbackEngine;
pub use orchestrator::{
    ModelConfig, ModuleOrchestrator, ModuleSource, OrchestratorOptions, OrchestratorState,
    ReadyMode, RuntimeSnapshot,
};

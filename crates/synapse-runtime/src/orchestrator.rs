//! The module lifecycle orchestrator.

use crate::config::RuntimeConfig;
use crate::error::RuntimeError;
use crate::fallback::FallbackEngine;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use synapse_bridge::{Bridge, BridgeConfig, GuestModule};
use synapse_events::EventBroadcaster;
use synapse_types::call::{CallContext, CognitiveResponse, ResponseSource, SensoryInput};
use synapse_types::event::EventKind;
use synapse_types::module::{ModuleInfo, ModuleRole};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Which loading path produced a ready orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyMode {
    /// Both the cognitive shell and the default model loaded.
    Full,
    /// Exactly one of the two loaded.
    Partial,
    /// Neither loaded; the in-process fallback engine answers.
    Fallback,
}

/// Orchestrator lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Uninitialized,
    Initializing,
    Ready(ReadyMode),
    ShuttingDown,
    Disposed,
}

impl std::fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Initializing => write!(f, "initializing"),
            Self::Ready(ReadyMode::Full) => write!(f, "ready(full)"),
            Self::Ready(ReadyMode::Partial) => write!(f, "ready(partial)"),
            Self::Ready(ReadyMode::Fallback) => write!(f, "ready(fallback)"),
            Self::ShuttingDown => write!(f, "shutting_down"),
            Self::Disposed => write!(f, "disposed"),
        }
    }
}

/// Where a module artifact comes from.
#[derive(Debug, Clone)]
pub enum ModuleSource {
    /// Read from the filesystem at load time.
    Path(PathBuf),
    /// Provided inline (tests, embedded artifacts).
    Bytes(Vec<u8>),
}

impl ModuleSource {
    /// Fetch the module bytes.
    pub async fn load(&self) -> Result<Vec<u8>, RuntimeError> {
        match self {
            Self::Path(path) => Ok(tokio::fs::read(path).await?),
            Self::Bytes(bytes) => Ok(bytes.clone()),
        }
    }
}

/// A model module to load.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Identifier reported in events and snapshots.
    pub model_id: String,
    /// The module artifact.
    pub source: ModuleSource,
}

/// Construction options for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// The cognitive-shell artifact, if configured.
    pub shell: Option<ModuleSource>,
    /// The default model, if configured.
    pub model: Option<ModelConfig>,
    /// Bridge engine configuration.
    pub bridge: BridgeConfig,
    /// Whether total load failure degrades to fallback mode.
    pub fallback_enabled: bool,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            shell: None,
            model: None,
            bridge: BridgeConfig::default(),
            fallback_enabled: true,
        }
    }
}

impl OrchestratorOptions {
    /// Map a loaded configuration file onto options.
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self {
            shell: config.shell_module.clone().map(ModuleSource::Path),
            model: config.default_model.clone().map(|m| ModelConfig {
                model_id: m.model_id,
                source: ModuleSource::Path(m.path),
            }),
            bridge: BridgeConfig {
                fuel_limit: config.fuel_limit,
            },
            fallback_enabled: config.fallback_enabled,
        }
    }
}

/// Snapshot of the orchestrator for callers.
#[derive(Debug, Clone, Serialize)]
pub struct RuntimeSnapshot {
    /// Lifecycle state.
    pub state: String,
    /// Whether `start()` has been accepted.
    pub running: bool,
    /// The loaded cognitive-shell module, if any.
    pub shell: Option<ModuleInfo>,
    /// The active model module, if any.
    pub model: Option<ModuleInfo>,
    /// The shell's self-reported status payload, when it answered the
    /// probe.
    pub shell_status: Option<serde_json::Value>,
    /// The model's self-reported status payload, when it answered the
    /// probe.
    pub model_status: Option<serde_json::Value>,
    /// Identifier of the active model.
    pub active_model_id: Option<String>,
    /// Inputs answered by the fallback engine.
    pub fallback_processed: u64,
}

/// Owns the guest modules and sequences their lifecycle.
pub struct ModuleOrchestrator {
    bridge: Bridge,
    events: Arc<EventBroadcaster>,
    options: OrchestratorOptions,
    state: std::sync::RwLock<OrchestratorState>,
    running: AtomicBool,
    shell: tokio::sync::RwLock<Option<Arc<GuestModule>>>,
    model: tokio::sync::RwLock<Option<Arc<GuestModule>>>,
    active_model_id: tokio::sync::RwLock<Option<String>>,
    fallback: FallbackEngine,
    session_id: String,
}

impl ModuleOrchestrator {
    /// Create an orchestrator. No module is loaded until `initialize()`.
    pub fn new(
        options: OrchestratorOptions,
        events: Arc<EventBroadcaster>,
    ) -> Result<Self, RuntimeError> {
        let bridge = Bridge::new(options.bridge.clone(), events.clone())?;
        Ok(Self {
            bridge,
            events,
            options,
            state: std::sync::RwLock::new(OrchestratorState::Uninitialized),
            running: AtomicBool::new(false),
            shell: tokio::sync::RwLock::new(None),
            model: tokio::sync::RwLock::new(None),
            active_model_id: tokio::sync::RwLock::new(None),
            fallback: FallbackEngine::new(),
            session_id: Uuid::new_v4().to_string(),
        })
    }

    fn state(&self) -> OrchestratorState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, next: OrchestratorState) {
        *self.state.write().unwrap_or_else(|e| e.into_inner()) = next;
    }

    /// Load the configured modules.
    ///
    /// Each load failure is caught and logged individually; neither
    /// blocks the other. If both fail (or nothing is configured) the
    /// orchestrator enters fallback mode and still reports ready, so
    /// that downstream callers observe a uniformly working system.
    pub async fn initialize(&self) -> Result<ReadyMode, RuntimeError> {
        let current = self.state();
        if current != OrchestratorState::Uninitialized {
            return Err(RuntimeError::InvalidState {
                current: current.to_string(),
                operation: "initialize".to_string(),
            });
        }
        self.set_state(OrchestratorState::Initializing);

        let shell_loaded = if let Some(source) = self.options.shell.clone() {
            match self.load_shell(&source).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "Cognitive shell load failed");
                    false
                }
            }
        } else {
            debug!("No cognitive shell configured");
            false
        };

        let model_loaded = if let Some(config) = self.options.model.clone() {
            match self.load_model(config).await {
                Ok(_) => true,
                Err(e) => {
                    warn!(error = %e, "Default model load failed");
                    false
                }
            }
        } else {
            debug!("No default model configured");
            false
        };

        let mode = match (shell_loaded, model_loaded) {
            (true, true) => ReadyMode::Full,
            (false, false) => {
                if !self.options.fallback_enabled {
                    self.set_state(OrchestratorState::Uninitialized);
                    return Err(RuntimeError::ModuleLoad(
                        "no module loaded and fallback is disabled".to_string(),
                    ));
                }
                // Force readiness so downstream observers see a ready
                // system regardless of which loading path succeeded.
                self.events
                    .emit(EventKind::CognitiveShellLoaded {
                        module_id: None,
                        dialect: None,
                        synthetic: true,
                    })
                    .await;
                info!("All module loads failed; entering fallback mode");
                ReadyMode::Fallback
            }
            _ => ReadyMode::Partial,
        };

        self.set_state(OrchestratorState::Ready(mode));
        info!(mode = ?mode, "Orchestrator initialized");
        Ok(mode)
    }

    async fn load_shell(&self, source: &ModuleSource) -> Result<(), RuntimeError> {
        let bytes = source.load().await?;
        let module = self
            .bridge
            .instantiate(&bytes, ModuleRole::CognitiveShell)
            .await?;
        let id = module.id();
        let dialect = module.dialect();
        *self.shell.write().await = Some(Arc::new(module));
        self.events
            .emit(EventKind::CognitiveShellLoaded {
                module_id: Some(id),
                dialect: Some(dialect),
                synthetic: false,
            })
            .await;
        Ok(())
    }

    /// Load a model module, replacing the active one. The cognitive
    /// shell is not touched.
    pub async fn load_model(&self, config: ModelConfig) -> Result<ModuleInfo, RuntimeError> {
        let current = self.state();
        if matches!(
            current,
            OrchestratorState::ShuttingDown | OrchestratorState::Disposed
        ) {
            return Err(RuntimeError::InvalidState {
                current: current.to_string(),
                operation: "load_model".to_string(),
            });
        }

        let bytes = config.source.load().await?;
        let module = self.bridge.instantiate(&bytes, ModuleRole::Model).await?;
        let info = module.info();
        *self.model.write().await = Some(Arc::new(module));
        *self.active_model_id.write().await = Some(config.model_id.clone());
        self.events
            .emit(EventKind::ModelLoaded {
                module_id: info.id,
                model_id: config.model_id.clone(),
                dialect: info.dialect,
            })
            .await;
        info!(model = %config.model_id, dialect = %info.dialect, "Model loaded");
        Ok(info)
    }

    /// Replace the active model at runtime.
    pub async fn switch_model(&self, config: ModelConfig) -> Result<ModuleInfo, RuntimeError> {
        let previous = self.active_model_id.read().await.clone();
        debug!(previous = ?previous, next = %config.model_id, "Switching model");
        self.load_model(config).await
    }

    /// Accept input processing. Requires a prior successful `initialize()`.
    pub async fn start(&self) -> Result<(), RuntimeError> {
        let current = self.state();
        if !matches!(current, OrchestratorState::Ready(_)) {
            return Err(RuntimeError::InvalidState {
                current: current.to_string(),
                operation: "start".to_string(),
            });
        }
        if !self.running.swap(true, Ordering::AcqRel) {
            self.events.emit(EventKind::OrchestratorStarted).await;
        }
        Ok(())
    }

    /// Stop accepting input. Idempotent.
    pub async fn stop(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            self.events.emit(EventKind::OrchestratorStopped).await;
        }
    }

    /// Process one sensory input through the best available path.
    ///
    /// A guest-side fault does not propagate as an error: the caller
    /// always gets a `CognitiveResponse`, possibly with `success=false`
    /// and the trap detail attached. Only lifecycle misuse
    /// (`NotRunning`) is an `Err`.
    pub async fn process_input(
        &self,
        input: &SensoryInput,
    ) -> Result<CognitiveResponse, RuntimeError> {
        if !matches!(self.state(), OrchestratorState::Ready(_))
            || !self.running.load(Ordering::Acquire)
        {
            return Err(RuntimeError::NotRunning);
        }

        let started = std::time::Instant::now();
        let module = {
            let shell = self.shell.read().await.clone();
            if shell.is_some() {
                shell
            } else {
                self.model.read().await.clone()
            }
        };

        let Some(module) = module else {
            let mut response = self.fallback.process(input);
            response.processing_time_ms = started.elapsed().as_millis() as u64;
            return Ok(response);
        };

        let ctx = CallContext::new(self.session_id.clone());
        let value = serde_json::to_value(input).map_err(synapse_bridge::BridgeError::from)?;
        let response = match module.execute(&value, &ctx).await {
            Ok(payload) => {
                let confidence = extract_confidence(&payload);
                CognitiveResponse {
                    success: true,
                    payload,
                    error: None,
                    confidence,
                    processing_time_ms: started.elapsed().as_millis() as u64,
                    source: ResponseSource::Module,
                }
            }
            Err(e) => {
                warn!(module = %module.id(), error = %e, "Guest call failed");
                let mut response =
                    CognitiveResponse::failure(e.to_string(), ResponseSource::Module);
                response.processing_time_ms = started.elapsed().as_millis() as u64;
                response
            }
        };
        Ok(response)
    }

    /// Dispose all modules and stop. Idempotent.
    pub async fn shutdown(&self) {
        {
            let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
            if matches!(
                *state,
                OrchestratorState::ShuttingDown | OrchestratorState::Disposed
            ) {
                return;
            }
            *state = OrchestratorState::ShuttingDown;
        }
        self.stop().await;

        if self.shell.write().await.take().is_some() {
            self.events
                .emit(EventKind::ModuleDisposed {
                    role: ModuleRole::CognitiveShell,
                })
                .await;
        }
        if self.model.write().await.take().is_some() {
            self.events
                .emit(EventKind::ModuleDisposed {
                    role: ModuleRole::Model,
                })
                .await;
        }
        *self.active_model_id.write().await = None;

        self.set_state(OrchestratorState::Disposed);
        info!("Orchestrator disposed");
    }

    /// Snapshot the orchestrator and its modules.
    ///
    /// Each loaded module's `get_status` is probed so the snapshot
    /// carries the guest's self-reported state (name, initialized,
    /// memory size) alongside the host-side view; a module that fails
    /// the probe just leaves its status field empty.
    pub async fn module_info(&self) -> RuntimeSnapshot {
        let shell = self.shell.read().await.clone();
        let model = self.model.read().await.clone();

        let mut shell_status = None;
        if let Some(module) = &shell {
            shell_status = module.status().await.ok();
        }
        let mut model_status = None;
        if let Some(module) = &model {
            model_status = module.status().await.ok();
        }

        RuntimeSnapshot {
            state: self.state().to_string(),
            running: self.running.load(Ordering::Acquire),
            shell: shell.as_ref().map(|m| m.info()),
            model: model.as_ref().map(|m| m.info()),
            shell_status,
            model_status,
            active_model_id: self.active_model_id.read().await.clone(),
            fallback_processed: self.fallback.processed(),
        }
    }
}

fn extract_confidence(payload: &serde_json::Value) -> f32 {
    payload
        .get("confidence")
        .or_else(|| payload.get("result").and_then(|r| r.get("confidence")))
        .and_then(|v| v.as_f64())
        .map(|v| v as f32)
        .unwrap_or(0.5)
}

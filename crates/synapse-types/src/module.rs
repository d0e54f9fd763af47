//! Guest module identity and metadata.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a loaded guest module instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleId(pub Uuid);

impl ModuleId {
    /// Create a new random ModuleId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ModuleId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ModuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role a guest module plays in the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModuleRole {
    /// The cognitive-shell module: owns the reasoning loop.
    CognitiveShell,
    /// A model module: provides inference behind the shell.
    Model,
}

impl std::fmt::Display for ModuleRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CognitiveShell => write!(f, "cognitive-shell"),
            Self::Model => write!(f, "model"),
        }
    }
}

/// The calling convention a guest module was compiled against,
/// detected from its export table at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Dialect {
    /// Plain `alloc`/`dealloc` memory management and the uniform
    /// capability exports.
    Standard,
    /// Managed-runtime convention: `__new`/`__pin`/`__unpin` memory
    /// management with runtime type info.
    AlternateRuntime,
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Standard => write!(f, "standard"),
            Self::AlternateRuntime => write!(f, "alternate-runtime"),
        }
    }
}

/// Snapshot of a loaded module, safe to hand to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleInfo {
    /// Instance identifier.
    pub id: ModuleId,
    /// Role this module was loaded for.
    pub role: ModuleRole,
    /// Detected calling convention.
    pub dialect: Dialect,
    /// Human-readable name, if the module reported one.
    pub name: Option<String>,
    /// Whether the module is believed healthy: cleared after a trap,
    /// refreshed from the guest's self-reported status.
    pub ready: bool,
    /// Capabilities that resolved to a real export (the rest are mocked).
    pub native_capabilities: Vec<String>,
}

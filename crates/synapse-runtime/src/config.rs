//! Runtime configuration.

use crate::error::RuntimeError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default per-call fuel budget, shared with the bridge default.
const DEFAULT_FUEL_LIMIT: u64 = 1_000_000;

/// TOML-loadable runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Path to the cognitive-shell module artifact.
    pub shell_module: Option<PathBuf>,
    /// The default model module loaded during `initialize()`.
    pub default_model: Option<ModelFileEntry>,
    /// Fuel budget per guest call. 0 = unlimited.
    pub fuel_limit: u64,
    /// Whether total load failure degrades to the in-process fallback
    /// engine instead of failing `initialize()`.
    pub fallback_enabled: bool,
}

/// A model artifact referenced from configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelFileEntry {
    /// Identifier reported in events and snapshots.
    pub model_id: String,
    /// Path to the module artifact.
    pub path: PathBuf,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            shell_module: None,
            default_model: None,
            fuel_limit: DEFAULT_FUEL_LIMIT,
            fallback_enabled: true,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, RuntimeError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| RuntimeError::Config(format!("{}: {e}", path.display())))?;
        toml::from_str(&text).map_err(|e| RuntimeError::Config(format!("{}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert!(config.shell_module.is_none());
        assert_eq!(config.fuel_limit, 1_000_000);
        assert!(config.fallback_enabled);
    }

    #[test]
    fn test_load_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            shell_module = "/opt/synapse/shell.wasm"
            fuel_limit = 500000

            [default_model]
            model_id = "hrm-27m"
            path = "/opt/synapse/hrm.wasm"
            "#
        )
        .unwrap();

        let config = RuntimeConfig::load(file.path()).unwrap();
        assert_eq!(
            config.shell_module.as_deref(),
            Some(Path::new("/opt/synapse/shell.wasm"))
        );
        assert_eq!(config.fuel_limit, 500_000);
        assert_eq!(config.default_model.unwrap().model_id, "hrm-27m");
        // Unspecified fields keep defaults.
        assert!(config.fallback_enabled);
    }

    #[test]
    fn test_load_missing_file() {
        let err = RuntimeConfig::load(Path::new("/nonexistent/synapse.toml")).unwrap_err();
        assert!(matches!(err, RuntimeError::Config(_)));
    }
}

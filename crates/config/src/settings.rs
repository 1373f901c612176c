// Engine settings
// Loaded from ~/.config/checkgrid/engine.toml

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// How a `REF_ERROR` travels past the cell that first observed the deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefErrorPolicy {
    /// Dependents mirror `REF_ERROR` like any other value (default)
    #[default]
    Cascade,
    /// Only the direct dependent of a deleted cell turns into `REF_ERROR`
    OneHop,
}

impl RefErrorPolicy {
    /// Returns true if a `REF_ERROR` received through an update is mirrored further
    pub fn cascades(&self) -> bool {
        matches!(self, RefErrorPolicy::Cascade)
    }
}

/// Event bus settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusSettings {
    /// Upper bound on events drained by a single run
    pub max_events: usize,

    /// Skip an event whose id was already processed in the same run
    pub skip_duplicate_events: bool,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            max_events: 1_000_000,
            skip_duplicate_events: true,
        }
    }
}

/// Reactive propagation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropagationSettings {
    pub ref_error: RefErrorPolicy,

    /// Don't enqueue an update for a dependent whose value did not change
    pub skip_unchanged: bool,
}

impl Default for PropagationSettings {
    fn default() -> Self {
        Self {
            ref_error: RefErrorPolicy::Cascade,
            skip_unchanged: true,
        }
    }
}

/// Checker-sheet derivation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckerSettings {
    /// Start value of the editable input cells
    pub input_default: i64,

    /// Value of checker-row cells that sit under a frozen column
    pub blank_value: String,

    /// Background applied to computed checker cells
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
}

impl Default for CheckerSettings {
    fn default() -> Self {
        Self {
            input_default: 0,
            blank_value: String::new(),
            background: None,
        }
    }
}

/// Display sizes for newly created rows and columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructureSettings {
    pub default_row_size: u32,
    pub default_col_size: u32,
}

impl Default for StructureSettings {
    fn default() -> Self {
        Self {
            default_row_size: 24,
            default_col_size: 80,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub bus: BusSettings,
    pub propagation: PropagationSettings,
    pub checker: CheckerSettings,
    pub structure: StructureSettings,
}

impl EngineSettings {
    /// Get the settings file path
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("checkgrid");
        config_dir.join("engine.toml")
    }

    /// Parse and validate settings from a TOML document
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let settings: Self = toml::from_str(contents)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a specific file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    /// Load settings from the default location, falling back to defaults
    pub fn load() -> Self {
        let path = Self::config_path();

        if !path.exists() {
            return Self::default();
        }

        match Self::load_from(&path) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Error loading {}: {}", path.display(), e);
                log::warn!("Using default settings");
                Self::default()
            }
        }
    }

    /// Save settings to a specific file
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        // Ensure directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let contents = toml::to_string_pretty(self)?;

        fs::write(path, contents).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bus.max_events == 0 {
            return Err(ConfigError::Invalid("bus.max_events must be at least 1".into()));
        }
        if self.structure.default_row_size == 0 || self.structure.default_col_size == 0 {
            return Err(ConfigError::Invalid(
                "structure sizes must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

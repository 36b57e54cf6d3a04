//! Settings management

use memlens_env::{MemoryMode, ProcessMemory};
use memlens_metrics::{DataFormatter, MeasureLayout, MemoryLedger};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Prefix for environment overrides, e.g. `MEMLENS_REAL_USAGE=1`.
pub const ENV_PREFIX: &str = "MEMLENS_";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings from {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid settings: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid value '{value}' for {key}")]
    InvalidOverride { key: String, value: String },
}

/// What helper calls do when a measure was never started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Hand the error to the error sink and carry on.
    #[default]
    Report,
    /// Return the error to the caller.
    Propagate,
}

/// Toolbar settings
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub memory: MemorySettings,
    pub error_policy: ErrorPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySettings {
    pub enabled: bool,
    /// Read allocated pages instead of bytes in use.
    pub real_usage: bool,
    pub layout: MeasureLayout,
    /// Decimal places in formatted byte counts.
    pub precision: usize,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            real_usage: false,
            layout: MeasureLayout::Timeline,
            precision: DataFormatter::DEFAULT_PRECISION,
        }
    }
}

impl Settings {
    pub fn from_json_str(text: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Applies `MEMLENS_*` variables from the process environment.
    pub fn apply_env(&mut self) -> Result<(), SettingsError> {
        self.apply_overrides(std::env::vars())
    }

    /// Applies `MEMLENS_ENABLED`, `MEMLENS_REAL_USAGE`, `MEMLENS_LAYOUT`,
    /// `MEMLENS_PRECISION` and `MEMLENS_ERROR_POLICY`; other keys are ignored.
    pub fn apply_overrides<I, K, V>(&mut self, vars: I) -> Result<(), SettingsError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let (key, value) = (key.as_ref(), value.as_ref());
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let invalid = || SettingsError::InvalidOverride {
                key: key.to_string(),
                value: value.to_string(),
            };
            match name {
                "ENABLED" => self.memory.enabled = parse_flag(value).ok_or_else(invalid)?,
                "REAL_USAGE" => self.memory.real_usage = parse_flag(value).ok_or_else(invalid)?,
                "PRECISION" => self.memory.precision = value.trim().parse().map_err(|_| invalid())?,
                "LAYOUT" => {
                    self.memory.layout = match value.trim().to_ascii_lowercase().as_str() {
                        "timeline" => MeasureLayout::Timeline,
                        "by_label" | "label" => MeasureLayout::ByLabel,
                        _ => return Err(invalid()),
                    }
                }
                "ERROR_POLICY" => {
                    self.error_policy = match value.trim().to_ascii_lowercase().as_str() {
                        "report" => ErrorPolicy::Report,
                        "propagate" => ErrorPolicy::Propagate,
                        _ => return Err(invalid()),
                    }
                }
                _ => continue,
            }
            tracing::debug!(key, value, "settings override applied");
        }
        Ok(())
    }

    pub fn memory_mode(&self) -> MemoryMode {
        MemoryMode::from_real_usage(self.memory.real_usage)
    }

    /// Builds a ledger reading this process with these settings.
    pub fn build_ledger(&self) -> MemoryLedger {
        MemoryLedger::with_source(ProcessMemory, self.memory_mode())
            .with_layout(self.memory.layout)
            .with_formatter(DataFormatter::new(self.memory.precision))
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

//! # Settings
//!
//! Configuration for one invocation, merged from an optional `amilayer.toml`
//! and command line flags. Flags win over the file.
//!
//! ```toml
//! deployment = true
//! strict_duplicates = false
//! ```

use amilayer_core::{AmiLayerError, DuplicatePolicy, EmitOptions, PlanOptions};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Maximum size of a settings file (64 KB).
const MAX_SETTINGS_FILE_SIZE: u64 = 64 * 1024;

/// Invocation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Running in a deployment context: builders carry no AWS profile.
    pub deployment: bool,
    /// Fail on duplicate image names instead of keeping the last one.
    pub strict_duplicates: bool,
}

impl Settings {
    /// Parse settings from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, AmiLayerError> {
        toml::from_str(text).map_err(|e| AmiLayerError::DeserializationError(e.to_string()))
    }

    /// Load settings from `path`, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, AmiLayerError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let metadata = std::fs::metadata(path).map_err(|e| {
            AmiLayerError::IoError(format!("Cannot read settings '{}': {}", path.display(), e))
        })?;
        if metadata.len() > MAX_SETTINGS_FILE_SIZE {
            return Err(AmiLayerError::IoError(format!(
                "Settings file {} bytes exceeds maximum allowed {} bytes",
                metadata.len(),
                MAX_SETTINGS_FILE_SIZE
            )));
        }

        let text = std::fs::read_to_string(path)
            .map_err(|e| AmiLayerError::IoError(format!("Read settings: {}", e)))?;
        tracing::debug!("Loaded settings from {}", path.display());
        Self::from_toml(&text)
    }

    /// Apply command line overrides. A set flag always turns a switch on.
    #[must_use]
    pub fn with_overrides(mut self, deployment: bool, strict_duplicates: bool) -> Self {
        self.deployment |= deployment;
        self.strict_duplicates |= strict_duplicates;
        self
    }

    /// Options handed to the core for one plan.
    #[must_use]
    pub fn plan_options(&self) -> PlanOptions {
        PlanOptions {
            emit: EmitOptions {
                deployment: self.deployment,
            },
            duplicates: if self.strict_duplicates {
                DuplicatePolicy::Reject
            } else {
                DuplicatePolicy::Overwrite
            },
        }
    }
}

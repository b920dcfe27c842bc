//! Loading a schema document with its detection, render, hook and engine
//! sections.

use crate::detect::DetectionConfig;
use crate::engine::EngineOptions;
use crate::error::ConfigError;
use crate::hooks::HookManifest;
use crate::render::RenderConfig;
use crate::schema::CanonicalSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A complete configuration document.
///
/// ```yaml
/// fields:
///   - name: email
///     synonyms: [e-mail, mail]
///     validators:
///       - type: email
/// mapping_threshold: 0.6
/// detection:
///   header_rows: 2
/// hooks:
///   on_table_written:
///     - hook: highlight_issues
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaConfig {
    #[serde(flatten)]
    pub schema: CanonicalSchema,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub hooks: HookManifest,
    #[serde(default)]
    pub engine: EngineOptions,
}

impl SchemaConfig {
    /// Config with default sections around a schema.
    #[must_use]
    pub fn new(schema: CanonicalSchema) -> Self {
        Self {
            schema,
            detection: DetectionConfig::default(),
            render: RenderConfig::default(),
            hooks: HookManifest::default(),
            engine: EngineOptions::default(),
        }
    }

    /// Load a `.yaml`, `.yml` or `.json` file.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or parsed, has an
    /// unknown extension, or describes an invalid schema.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let config = match extension.as_str() {
            "yaml" | "yml" => Self::from_yaml_str(&text)?,
            "json" => Self::from_json_str(&text)?,
            other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
        };
        tracing::debug!(path = %path.display(), fields = config.schema.fields.len(), "loaded config");
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns an error when the document is not a valid config.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.schema.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns an error when the document is not a valid config.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.schema.validate()?;
        Ok(config)
    }
}

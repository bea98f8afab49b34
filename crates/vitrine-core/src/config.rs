//! Configuration for Vitrine services.
//!
//! Provides the [`VitrineConfig`] struct that loads from TOML files,
//! environment variables, and defaults using the `confyg` crate.
//!
//! # Loading Priority
//!
//! 1. Explicit config path argument
//! 2. `VITRINE_CONFIG` environment variable
//! 3. XDG default: `~/.config/vitrine/config.toml`
//! 4. Built-in defaults
//!
//! `VITRINE_<SECTION>_<KEY>` environment variables overlay file values.
//!
//! Shop-level settings (languages, feature gate) are *not* configuration:
//! they are resolved per shop and passed explicitly into every operation.

use confyg::{Confygery, env};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::types::{Lang, ModelVersion};
use crate::{Error, Result};

// ============================================================================
// Configuration structs
// ============================================================================

/// Main configuration for a Vitrine deployment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VitrineConfig {
    /// Catalog defaults.
    pub catalog: CatalogConfig,

    /// Embedding model and provider retry policy.
    pub embedding: EmbeddingConfig,

    /// Retrieval defaults.
    pub retrieval: RetrievalConfig,

    /// Sync orchestration settings.
    pub sync: SyncConfig,
}

/// Catalog configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Default source language for shops without explicit settings.
    pub default_language: String,
}

/// Embedding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Embedding model identifier.
    pub model: String,

    /// Vector dimension produced by `model`.
    #[serde(deserialize_with = "number_or_string")]
    pub dimension: usize,

    /// Total provider attempts before a record is marked FAILED.
    #[serde(deserialize_with = "number_or_string")]
    pub max_attempts: u32,

    /// First backoff delay in milliseconds.
    #[serde(deserialize_with = "number_or_string")]
    pub initial_backoff_ms: u64,

    /// Backoff ceiling in milliseconds.
    #[serde(deserialize_with = "number_or_string")]
    pub max_backoff_ms: u64,
}

/// Retrieval configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Deadline for one retrieval call in milliseconds.
    #[serde(deserialize_with = "number_or_string")]
    pub deadline_ms: u64,

    /// Result count used when the caller does not pass one.
    #[serde(deserialize_with = "number_or_string")]
    pub default_limit: usize,
}

/// Sync configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// How long tombstoned snapshots and embeddings are retained.
    #[serde(deserialize_with = "number_or_string")]
    pub retention_hours: u64,
}

/// Accept a number or its decimal string form.
///
/// File values arrive as TOML integers, `VITRINE_*` environment overrides
/// arrive as strings.
fn number_or_string<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + FromStr,
    T::Err: Display,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw<N> {
        Number(N),
        Text(String),
    }

    match Raw::<T>::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(text) => text
            .trim()
            .parse()
            .map_err(|e| serde::de::Error::custom(format!("invalid number {text:?}: {e}"))),
    }
}

// ============================================================================
// Default implementations
// ============================================================================

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            default_language: "en".to_string(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "bge-small-en-v1.5@1".to_string(),
            dimension: 384,
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 10_000,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            deadline_ms: 2_000,
            default_limit: 10,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            retention_hours: 24 * 7,
        }
    }
}

// ============================================================================
// Derived values
// ============================================================================

impl CatalogConfig {
    /// The default language as a normalized [`Lang`].
    pub fn default_lang(&self) -> Lang {
        Lang::new(&self.default_language)
    }
}

impl EmbeddingConfig {
    /// The configured model version.
    pub fn model_version(&self) -> ModelVersion {
        ModelVersion::new(self.model.clone(), self.dimension)
    }

    /// First backoff delay.
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    /// Backoff ceiling.
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

impl RetrievalConfig {
    /// Deadline for one retrieval call.
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

impl SyncConfig {
    /// Tombstone retention window.
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::hours(self.retention_hours as i64)
    }
}

// ============================================================================
// Config loading
// ============================================================================

impl VitrineConfig {
    /// Load configuration from file, environment, and defaults.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder =
            Confygery::new().map_err(|e| Error::config(format!("config init: {e}")))?;

        if let Some(path) = Self::resolve_config_path(config_path) {
            if path.exists() {
                log::debug!("Loading configuration from {}", path.display());
                builder
                    .add_file(&path.to_string_lossy())
                    .map_err(|e| Error::config(format!("config file: {e}")))?;
            }
        }

        let mut env_opts = env::Options::with_top_level("VITRINE");
        env_opts.add_section("catalog");
        env_opts.add_section("embedding");
        env_opts.add_section("retrieval");
        env_opts.add_section("sync");
        builder
            .add_env(env_opts)
            .map_err(|e| Error::config(format!("config env: {e}")))?;

        let config: Self = builder
            .build()
            .map_err(|e| Error::config(format!("config build: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values no component can work with.
    pub fn validate(&self) -> Result<()> {
        if self.catalog.default_lang().as_str().is_empty() {
            return Err(Error::config("catalog.default_language must not be empty"));
        }
        if self.embedding.dimension == 0 {
            return Err(Error::config("embedding.dimension must be positive"));
        }
        if self.embedding.max_attempts == 0 {
            return Err(Error::config("embedding.max_attempts must be at least 1"));
        }
        if self.embedding.initial_backoff_ms > self.embedding.max_backoff_ms {
            return Err(Error::config(
                "embedding.initial_backoff_ms exceeds embedding.max_backoff_ms",
            ));
        }
        if self.retrieval.deadline_ms == 0 {
            return Err(Error::config("retrieval.deadline_ms must be positive"));
        }
        Ok(())
    }

    /// Resolve the config file path from explicit argument, env var, or XDG default.
    pub fn resolve_config_path(explicit: Option<&str>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(PathBuf::from(path));
        }

        if let Ok(path) = std::env::var("VITRINE_CONFIG") {
            return Some(PathBuf::from(path));
        }

        Self::default_config_path()
    }

    /// Return the XDG default config path.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("vitrine").join("config.toml"))
    }

    /// Serialize this config to a pretty-printed TOML string.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::config(e.to_string()))
    }
}

// ============================================================================
// Tests
// ============================================================================

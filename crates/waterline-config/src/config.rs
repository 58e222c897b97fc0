// crates/waterline-config/src/config.rs
// ============================================================================
// Module: Waterline Configuration
// Description: Configuration loading and validation for Waterline hosts.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: waterline-core, waterline-store-sqlite, serde, toml, url
// ============================================================================

//! ## Overview
//! Configuration resolves from an explicit path, the `WATERLINE_CONFIG`
//! environment variable, or `waterline.toml` in the working directory, in
//! that order. Files are size-capped, unknown keys are rejected, and every
//! numeric limit is range-checked before the config is handed to the engine.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

use waterline_core::EngineConfig;
use waterline_store_sqlite::SqliteJournalMode;
use waterline_store_sqlite::SqliteStoreConfig;
use waterline_store_sqlite::SqliteSyncMode;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "waterline.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "WATERLINE_CONFIG";
/// Maximum configuration file size in bytes.
const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum fan-out generation depth accepted.
const MAX_FAN_OUT_DEPTH: u32 = 8;
/// Minimum step timeout in milliseconds.
const MIN_STEP_TIMEOUT_MS: u64 = 1_000;
/// Maximum step timeout in milliseconds (LLM-backed analysis ceiling).
const MAX_STEP_TIMEOUT_MS: u64 = 300_000;
/// Maximum entities accepted per submission.
const MAX_ENTITIES_PER_SUBMISSION: usize = 10_000;
/// Minimum store busy timeout in milliseconds.
const MIN_BUSY_TIMEOUT_MS: u64 = 100;
/// Maximum store busy timeout in milliseconds.
const MAX_BUSY_TIMEOUT_MS: u64 = 60_000;
/// Minimum dispatcher timeout in milliseconds.
const MIN_DISPATCH_TIMEOUT_MS: u64 = 1_000;
/// Maximum dispatcher timeout in milliseconds.
const MAX_DISPATCH_TIMEOUT_MS: u64 = 60_000;
/// Maximum HTTP response size accepted, in bytes.
const MAX_HTTP_RESPONSE_BYTES: usize = 8 * 1024 * 1024;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("config io error: {0}")]
    Io(String),
    /// Configuration file failed to parse.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Configuration is invalid.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Sections
// ============================================================================

/// Engine section.
///
/// # Invariants
/// - `max_fan_out_depth` is 1..=8.
/// - `default_step_timeout_ms` is 1s..=300s.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineSection {
    /// Maximum fan-out generation depth per submission.
    #[serde(default = "default_fan_out_depth")]
    pub max_fan_out_depth: u32,
    /// Executor timeout applied when an operation declares none.
    #[serde(default = "default_step_timeout_ms")]
    pub default_step_timeout_ms: u64,
    /// Maximum seed entities accepted per submission.
    #[serde(default = "default_entities_per_submission")]
    pub max_entities_per_submission: usize,
}

/// Default fan-out depth bound.
const fn default_fan_out_depth() -> u32 {
    3
}

/// Default step timeout.
const fn default_step_timeout_ms() -> u64 {
    30_000
}

/// Default submission entity cap.
const fn default_entities_per_submission() -> usize {
    1_000
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            max_fan_out_depth: default_fan_out_depth(),
            default_step_timeout_ms: default_step_timeout_ms(),
            max_entities_per_submission: default_entities_per_submission(),
        }
    }
}

impl EngineSection {
    /// Converts the section into the engine configuration.
    #[must_use]
    pub const fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_fan_out_depth: self.max_fan_out_depth,
            default_step_timeout_ms: self.default_step_timeout_ms,
            max_entities_per_submission: self.max_entities_per_submission,
        }
    }

    /// Validates section ranges.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_fan_out_depth == 0 || self.max_fan_out_depth > MAX_FAN_OUT_DEPTH {
            return Err(ConfigError::Invalid(format!(
                "engine.max_fan_out_depth out of range: {} (1..={MAX_FAN_OUT_DEPTH})",
                self.max_fan_out_depth
            )));
        }
        if !(MIN_STEP_TIMEOUT_MS..=MAX_STEP_TIMEOUT_MS).contains(&self.default_step_timeout_ms) {
            return Err(ConfigError::Invalid(format!(
                "engine.default_step_timeout_ms out of range: {}",
                self.default_step_timeout_ms
            )));
        }
        if self.max_entities_per_submission == 0
            || self.max_entities_per_submission > MAX_ENTITIES_PER_SUBMISSION
        {
            return Err(ConfigError::Invalid(format!(
                "engine.max_entities_per_submission out of range: {}",
                self.max_entities_per_submission
            )));
        }
        Ok(())
    }
}

/// Store section.
///
/// # Invariants
/// - `path` must name a file, not a directory.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreSection {
    /// Path to the `SQLite` database file.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteJournalMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

/// Default store path.
fn default_store_path() -> PathBuf {
    PathBuf::from("waterline.db")
}

/// Default busy timeout.
const fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            journal_mode: SqliteJournalMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

impl StoreSection {
    /// Converts the section into the store configuration.
    #[must_use]
    pub fn store_config(&self) -> SqliteStoreConfig {
        SqliteStoreConfig {
            path: self.path.clone(),
            busy_timeout_ms: self.busy_timeout_ms,
            journal_mode: self.journal_mode,
            sync_mode: self.sync_mode,
        }
    }

    /// Validates section ranges.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.path.as_os_str().is_empty() || self.path.is_dir() {
            return Err(ConfigError::Invalid("store.path must name a file".to_string()));
        }
        if !(MIN_BUSY_TIMEOUT_MS..=MAX_BUSY_TIMEOUT_MS).contains(&self.busy_timeout_ms) {
            return Err(ConfigError::Invalid(format!(
                "store.busy_timeout_ms out of range: {}",
                self.busy_timeout_ms
            )));
        }
        Ok(())
    }
}

/// Task dispatcher mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatcherMode {
    /// In-process queue drained by the host.
    #[default]
    Local,
    /// External HTTP task runner.
    Http,
}

/// Dispatcher section.
///
/// # Invariants
/// - `http` mode requires an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DispatcherSection {
    /// Dispatcher mode.
    #[serde(default)]
    pub mode: DispatcherMode,
    /// Task runner trigger endpoint (`http` mode).
    #[serde(default)]
    pub endpoint: Option<Url>,
    /// Environment variable holding the runner bearer secret.
    #[serde(default)]
    pub secret_env: Option<String>,
    /// Dispatch timeout in milliseconds.
    #[serde(default = "default_dispatch_timeout_ms")]
    pub timeout_ms: u64,
}

/// Default dispatch timeout.
const fn default_dispatch_timeout_ms() -> u64 {
    20_000
}

impl Default for DispatcherSection {
    fn default() -> Self {
        Self {
            mode: DispatcherMode::default(),
            endpoint: None,
            secret_env: None,
            timeout_ms: default_dispatch_timeout_ms(),
        }
    }
}

impl DispatcherSection {
    /// Validates mode requirements and ranges.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.mode == DispatcherMode::Http && self.endpoint.is_none() {
            return Err(ConfigError::Invalid(
                "dispatcher.endpoint is required for http mode".to_string(),
            ));
        }
        if !(MIN_DISPATCH_TIMEOUT_MS..=MAX_DISPATCH_TIMEOUT_MS).contains(&self.timeout_ms) {
            return Err(ConfigError::Invalid(format!(
                "dispatcher.timeout_ms out of range: {}",
                self.timeout_ms
            )));
        }
        Ok(())
    }
}

/// Operation HTTP client section.
///
/// # Invariants
/// - `max_response_bytes` is bounded by [`MAX_HTTP_RESPONSE_BYTES`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpSection {
    /// Default request timeout in milliseconds.
    #[serde(default = "default_step_timeout_ms")]
    pub timeout_ms: u64,
    /// User agent for outbound requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Maximum response size in bytes.
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,
    /// Allow cleartext HTTP providers (disabled by default).
    #[serde(default)]
    pub allow_http: bool,
}

/// Default user agent.
fn default_user_agent() -> String {
    "waterline/0.1".to_string()
}

/// Default response size cap.
const fn default_max_response_bytes() -> usize {
    1024 * 1024
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            timeout_ms: default_step_timeout_ms(),
            user_agent: default_user_agent(),
            max_response_bytes: default_max_response_bytes(),
            allow_http: false,
        }
    }
}

impl HttpSection {
    /// Validates section ranges.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_STEP_TIMEOUT_MS..=MAX_STEP_TIMEOUT_MS).contains(&self.timeout_ms) {
            return Err(ConfigError::Invalid(format!(
                "http.timeout_ms out of range: {}",
                self.timeout_ms
            )));
        }
        if self.max_response_bytes == 0 || self.max_response_bytes > MAX_HTTP_RESPONSE_BYTES {
            return Err(ConfigError::Invalid(format!(
                "http.max_response_bytes out of range: {}",
                self.max_response_bytes
            )));
        }
        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::Invalid("http.user_agent must not be empty".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Root Config
// ============================================================================

/// Waterline host configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WaterlineConfig {
    /// Engine configuration.
    #[serde(default)]
    pub engine: EngineSection,
    /// Store configuration.
    #[serde(default)]
    pub store: StoreSection,
    /// Dispatcher configuration.
    #[serde(default)]
    pub dispatcher: DispatcherSection,
    /// Operation HTTP client configuration.
    #[serde(default)]
    pub http: HttpSection,
}

impl WaterlineConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading, parsing, or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path);
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|err| ConfigError::Parse(format!("config is not utf-8: {err}")))?;
        Self::from_toml(content)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every section.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when any value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate()?;
        self.store.validate()?;
        self.dispatcher.validate()?;
        self.http.validate()?;
        Ok(())
    }
}

/// Resolves the configuration path: explicit argument, environment override,
/// then the default filename in the working directory.
fn resolve_path(path: Option<&Path>) -> PathBuf {
    if let Some(path) = path {
        return path.to_path_buf();
    }
    if let Ok(from_env) = env::var(CONFIG_ENV_VAR)
        && !from_env.trim().is_empty()
    {
        return PathBuf::from(from_env);
    }
    PathBuf::from(DEFAULT_CONFIG_NAME)
}

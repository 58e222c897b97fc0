// crates/waterline-config/src/lib.rs
// ============================================================================
// Module: Waterline Config Library
// Description: Configuration loading and validation for Waterline hosts.
// Purpose: Expose strict, fail-closed TOML configuration parsing.
// Dependencies: crate::config
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size limits and
//! range validation. Missing or invalid configuration fails closed; every
//! section has conservative defaults so an empty file is a valid
//! configuration.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::CONFIG_ENV_VAR;
pub use config::ConfigError;
pub use config::DispatcherMode;
pub use config::DispatcherSection;
pub use config::EngineSection;
pub use config::HttpSection;
pub use config::StoreSection;
pub use config::WaterlineConfig;

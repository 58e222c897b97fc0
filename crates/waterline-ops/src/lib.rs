// crates/waterline-ops/src/lib.rs
// ============================================================================
// Module: Waterline Ops Library
// Description: Operation registry, input extraction, and built-in executors.
// Purpose: Implement the provider adapter contract over the core interfaces.
// Dependencies: waterline-core, reqwest, serde, serde_json, thiserror, url
// ============================================================================

//! ## Overview
//! This crate hosts the process-wide operation registry and the built-in
//! executors: a generic HTTP JSON adapter embodying the provider contract,
//! and the change-signal executors exposing on-demand snapshot diffs.
//! Concrete third-party integrations register here as interchangeable
//! instances of the same executor interface.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod extract;
pub mod http;
pub mod registry;
pub mod signal;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use extract::InputResolver;
pub use extract::aliases;
pub use http::HttpExecutorError;
pub use http::HttpJsonExecutor;
pub use http::HttpMethod;
pub use http::HttpOperationConfig;
pub use http::RequiredInput;
pub use registry::OperationRegistry;
pub use registry::RegistryError;
pub use signal::ChangeSignalExecutor;
pub use signal::register_change_signals;

// crates/waterline-core/src/core/envelope.rs
// ============================================================================
// Module: Waterline Adapter Envelope
// Description: Normalized result envelope returned by every operation executor.
// Purpose: Collapse heterogeneous provider outcomes into one uniform shape.
// Dependencies: crate::core::{context, identifiers}, serde, serde_json, uuid
// ============================================================================

//! ## Overview
//! Every operation executor returns this envelope instead of raising errors:
//! expected failure modes (missing inputs, provider errors, timeouts, absent
//! credentials) normalize into `status` plus per-provider attempt telemetry.
//! The runtime never branches on operation identity, only on the envelope.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::core::context::ContextMap;
use crate::core::identifiers::OperationId;

// ============================================================================
// SECTION: Error Codes
// ============================================================================

/// Stable envelope error codes used across the runtime.
pub mod error_codes {
    /// Required inputs could not be resolved.
    pub const MISSING_INPUTS: &str = "missing_inputs";
    /// The operation identifier is not registered.
    pub const UNKNOWN_OPERATION: &str = "unknown_operation";
    /// The provider call exceeded its timeout.
    pub const TIMEOUT: &str = "timeout";
    /// The provider responded with an HTTP error status.
    pub const PROVIDER_HTTP_ERROR: &str = "provider_http_error";
    /// The provider response failed contract validation.
    pub const OUTPUT_VALIDATION_FAILED: &str = "output_validation_failed";
    /// The entity upsert lost an optimistic-concurrency race.
    pub const VERSION_CONFLICT: &str = "entity_version_conflict";
    /// The entity state store reported an error.
    pub const ENTITY_STATE_ERROR: &str = "entity_state_error";
}

// ============================================================================
// SECTION: Status
// ============================================================================

/// Outcome status for operations and individual provider attempts.
///
/// # Invariants
/// - `skipped` means no external provider was called.
/// - `failed` means the provider was called and errored, timed out, or the
///   output failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    /// Provider responded with at least one record.
    Found,
    /// Provider responded successfully with no records.
    NotFound,
    /// Provider call or validation failed.
    Failed,
    /// The operation did not call its provider.
    Skipped,
}

impl OperationStatus {
    /// Returns true when this status terminates the pipeline run.
    #[must_use]
    pub const fn is_fatal(self) -> bool {
        matches!(self, Self::Failed)
    }
}

// ============================================================================
// SECTION: Provider Attempts
// ============================================================================

/// Telemetry for one provider call attempt within an operation.
///
/// # Invariants
/// - Attempts are appended in call order; a primary-then-fallback operation
///   yields multiple entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderAttempt {
    /// Provider name.
    pub provider: String,
    /// Provider action attempted.
    pub action: String,
    /// Attempt outcome.
    pub status: OperationStatus,
    /// HTTP status code, when an HTTP exchange happened.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    /// Wall-clock duration of the attempt in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Error description for failed attempts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Skip reason for skipped attempts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    /// Raw provider response, when retained for debugging.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<Value>,
}

impl ProviderAttempt {
    /// Creates an attempt record with the given outcome and no extras.
    #[must_use]
    pub fn new(
        provider: impl Into<String>,
        action: impl Into<String>,
        status: OperationStatus,
    ) -> Self {
        Self {
            provider: provider.into(),
            action: action.into(),
            status,
            http_status: None,
            duration_ms: None,
            error: None,
            skip_reason: None,
            raw_response: None,
        }
    }

    /// Creates a skipped attempt with a reason.
    #[must_use]
    pub fn skipped(
        provider: impl Into<String>,
        action: impl Into<String>,
        skip_reason: impl Into<String>,
    ) -> Self {
        let mut attempt = Self::new(provider, action, OperationStatus::Skipped);
        attempt.skip_reason = Some(skip_reason.into());
        attempt
    }

    /// Creates a failed attempt with an error description.
    #[must_use]
    pub fn failed(
        provider: impl Into<String>,
        action: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        let mut attempt = Self::new(provider, action, OperationStatus::Failed);
        attempt.error = Some(error.into());
        attempt
    }
}

// ============================================================================
// SECTION: Operation Error
// ============================================================================

/// Structured error attached to failed envelopes.
///
/// # Invariants
/// - `code` is a stable identifier from [`error_codes`] or a provider-specific
///   extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationError {
    /// Stable error code.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

impl OperationError {
    /// Creates a new operation error.
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

// ============================================================================
// SECTION: Envelope
// ============================================================================

/// Uniform result envelope produced by every operation executor.
///
/// # Invariants
/// - `run_id` is fresh per executor invocation and unrelated to the pipeline
///   run identifier.
/// - `output` is present when `status` is `found` or `not_found`.
/// - `missing_inputs` is present only for input-resolution failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationEnvelope {
    /// Fresh invocation identifier.
    pub run_id: Uuid,
    /// Operation that produced this envelope.
    pub operation_id: OperationId,
    /// Operation outcome.
    pub status: OperationStatus,
    /// Mapped output for found / not-found outcomes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<ContextMap>,
    /// Parameters that could not be resolved, for input failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_inputs: Option<Vec<String>>,
    /// Structured error for validation or internal failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationError>,
    /// Per-provider attempt telemetry in call order.
    pub provider_attempts: Vec<ProviderAttempt>,
}

impl OperationEnvelope {
    /// Creates a base envelope with a fresh invocation identifier.
    fn base(operation_id: OperationId, status: OperationStatus) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            operation_id,
            status,
            output: None,
            missing_inputs: None,
            error: None,
            provider_attempts: Vec::new(),
        }
    }

    /// Builds a `found` envelope carrying mapped output.
    #[must_use]
    pub fn found(
        operation_id: OperationId,
        output: ContextMap,
        attempts: Vec<ProviderAttempt>,
    ) -> Self {
        let mut envelope = Self::base(operation_id, OperationStatus::Found);
        envelope.output = Some(output);
        envelope.provider_attempts = attempts;
        envelope
    }

    /// Builds a `not_found` envelope; output is retained for telemetry.
    #[must_use]
    pub fn not_found(
        operation_id: OperationId,
        output: ContextMap,
        attempts: Vec<ProviderAttempt>,
    ) -> Self {
        let mut envelope = Self::base(operation_id, OperationStatus::NotFound);
        envelope.output = Some(output);
        envelope.provider_attempts = attempts;
        envelope
    }

    /// Builds a `failed` envelope with a structured error.
    #[must_use]
    pub fn failed(
        operation_id: OperationId,
        error: OperationError,
        attempts: Vec<ProviderAttempt>,
    ) -> Self {
        let mut envelope = Self::base(operation_id, OperationStatus::Failed);
        envelope.error = Some(error);
        envelope.provider_attempts = attempts;
        envelope
    }

    /// Builds a `failed` envelope for unresolved required inputs.
    #[must_use]
    pub fn missing_inputs(
        operation_id: OperationId,
        missing: Vec<String>,
        attempts: Vec<ProviderAttempt>,
    ) -> Self {
        let message = format!("missing required inputs: {}", missing.join(", "));
        let mut envelope = Self::failed(
            operation_id,
            OperationError::new(error_codes::MISSING_INPUTS, message),
            attempts,
        );
        envelope.missing_inputs = Some(missing);
        envelope
    }

    /// Builds a `skipped` envelope (provider not called).
    #[must_use]
    pub fn skipped(operation_id: OperationId, attempts: Vec<ProviderAttempt>) -> Self {
        let mut envelope = Self::base(operation_id, OperationStatus::Skipped);
        envelope.provider_attempts = attempts;
        envelope
    }

    /// Returns the error message when the envelope failed.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(|error| format!("{}: {}", error.code, error.message))
    }
}

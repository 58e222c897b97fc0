// crates/waterline-ops/src/registry.rs
// ============================================================================
// Module: Operation Registry
// Description: Process-wide mapping from operation identifiers to executors.
// Purpose: Route step execution by operation identifier with shape validation.
// Dependencies: waterline-core, thiserror
// ============================================================================

//! ## Overview
//! The operation registry resolves step execution by dotted operation
//! identifier (`<family>.<verb>.<topic>`). It is populated at process start
//! and read-only afterwards; the runtime holds it behind the core
//! [`waterline_core::OperationRouter`] interface and never branches on
//! operation identity itself.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

use waterline_core::OperationId;
use waterline_core::interfaces::OperationExecutor;
use waterline_core::interfaces::OperationRouter;
use waterline_core::interfaces::OperationSpec;
use waterline_core::interfaces::RoutedOperation;

// ============================================================================
// SECTION: Identifier Shape
// ============================================================================

/// Families accepted in operation identifiers.
pub const FAMILIES: &[&str] = &["company", "person", "job", "entity"];

/// Verbs accepted in operation identifiers.
pub const VERBS: &[&str] =
    &["search", "enrich", "research", "resolve", "derive", "signal", "validate"];

/// Registry errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The operation identifier is already registered.
    #[error("operation already registered: {0}")]
    DuplicateOperation(String),
    /// The operation identifier violates the dotted shape.
    #[error("invalid operation id: {0}")]
    InvalidOperationId(String),
}

/// Validates the `<family>.<verb>[.<topic>]` identifier shape.
fn validate_operation_id(operation_id: &OperationId) -> Result<(), RegistryError> {
    let segments: Vec<&str> = operation_id.as_str().split('.').collect();
    if !(2..=3).contains(&segments.len()) || segments.iter().any(|segment| segment.is_empty()) {
        return Err(RegistryError::InvalidOperationId(operation_id.to_string()));
    }
    if !FAMILIES.contains(&segments[0]) || !VERBS.contains(&segments[1]) {
        return Err(RegistryError::InvalidOperationId(operation_id.to_string()));
    }
    Ok(())
}

// ============================================================================
// SECTION: Operation Registry
// ============================================================================

/// Process-wide operation registry.
///
/// # Invariants
/// - Operation identifiers are unique within the registry.
/// - Registered executors are `Send + Sync` behind shared handles.
#[derive(Default)]
pub struct OperationRegistry {
    /// Routed operations keyed by identifier string.
    operations: BTreeMap<String, RoutedOperation>,
}

impl OperationRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an operation with its executor.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when the identifier is malformed or already
    /// registered.
    pub fn register(
        &mut self,
        spec: OperationSpec,
        executor: impl OperationExecutor + 'static,
    ) -> Result<(), RegistryError> {
        self.register_shared(spec, Arc::new(executor))
    }

    /// Registers an operation with a shared executor handle.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when the identifier is malformed or already
    /// registered.
    pub fn register_shared(
        &mut self,
        spec: OperationSpec,
        executor: Arc<dyn OperationExecutor>,
    ) -> Result<(), RegistryError> {
        validate_operation_id(&spec.operation_id)?;
        let key = spec.operation_id.as_str().to_string();
        if self.operations.contains_key(&key) {
            return Err(RegistryError::DuplicateOperation(key));
        }
        self.operations.insert(
            key,
            RoutedOperation {
                spec,
                executor,
            },
        );
        Ok(())
    }

    /// Returns true when the identifier is registered.
    #[must_use]
    pub fn contains(&self, operation_id: &OperationId) -> bool {
        self.operations.contains_key(operation_id.as_str())
    }

    /// Returns the number of registered operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns true when no operations are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Returns the registered identifiers in lexicographic order.
    #[must_use]
    pub fn operation_ids(&self) -> Vec<&str> {
        self.operations.keys().map(String::as_str).collect()
    }
}

impl OperationRouter for OperationRegistry {
    fn resolve_operation(&self, operation_id: &OperationId) -> Option<RoutedOperation> {
        self.operations.get(operation_id.as_str()).cloned()
    }
}

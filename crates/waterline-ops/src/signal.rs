// crates/waterline-ops/src/signal.rs
// ============================================================================
// Module: Change Signal Executors
// Description: On-demand snapshot diffs exposed as registry operations.
// Purpose: Let blueprints request change detection as an ordinary step.
// Dependencies: waterline-core, serde_json
// ============================================================================

//! ## Overview
//! Change detection runs only when a step explicitly requests it. These
//! executors expose the core change detector under `<family>.signal.changes`
//! operation identifiers; the diff report becomes the step output so
//! downstream steps can react to detected changes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;

use waterline_core::ChangeDetector;
use waterline_core::ContextMap;
use waterline_core::EntityId;
use waterline_core::EntityStateService;
use waterline_core::EntityType;
use waterline_core::OperationEnvelope;
use waterline_core::OperationError;
use waterline_core::OperationId;
use waterline_core::OperationStatus;
use waterline_core::OrgId;
use waterline_core::ProviderAttempt;
use waterline_core::error_codes;
use waterline_core::interfaces::EntityTableStore;
use waterline_core::interfaces::OperationExecutor;
use waterline_core::interfaces::OperationInput;
use waterline_core::interfaces::OperationSpec;

use crate::extract::InputResolver;
use crate::registry::OperationRegistry;
use crate::registry::RegistryError;

// ============================================================================
// SECTION: Executor
// ============================================================================

/// Shared entity store handle used by signal executors.
type SharedEntityStore = Arc<dyn EntityTableStore>;

/// Executor serving `<family>.signal.changes` for one entity type.
pub struct ChangeSignalExecutor {
    /// Operation identifier served.
    operation_id: OperationId,
    /// Entity type diffed by this executor.
    entity_type: EntityType,
    /// Change detector over the shared entity store.
    detector: ChangeDetector<SharedEntityStore>,
}

impl ChangeSignalExecutor {
    /// Creates the change-signal executor for an entity type.
    #[must_use]
    pub fn new(store: SharedEntityStore, entity_type: EntityType) -> Self {
        Self {
            operation_id: OperationId::new(format!("{entity_type}.signal.changes")),
            entity_type,
            detector: ChangeDetector::new(store),
        }
    }

    /// Returns the registry metadata for this executor.
    #[must_use]
    pub fn operation_spec(&self) -> OperationSpec {
        OperationSpec {
            operation_id: self.operation_id.clone(),
            entity_type: None,
            fan_out_collections: Vec::new(),
            timeout_ms: 15_000,
        }
    }

    /// Resolves the target entity identifier: explicit `entity_id` wins,
    /// else deterministic derivation from the cumulative context.
    fn resolve_entity_id(&self, input: &OperationInput, org_id: &OrgId) -> EntityId {
        let resolver = InputResolver::new(input);
        resolver
            .text("entity_id")
            .and_then(|raw| EntityId::parse(&raw))
            .unwrap_or_else(|| {
                EntityStateService::<SharedEntityStore>::resolve(
                    org_id,
                    self.entity_type,
                    &input.cumulative_context,
                    None,
                )
            })
    }
}

#[async_trait]
impl OperationExecutor for ChangeSignalExecutor {
    async fn execute(&self, input: &OperationInput) -> OperationEnvelope {
        let resolver = InputResolver::new(input);
        let Some(org_id) = resolver.text("org_id").and_then(|raw| OrgId::parse(&raw)) else {
            return OperationEnvelope::missing_inputs(
                self.operation_id.clone(),
                vec!["org_id".to_string()],
                Vec::new(),
            );
        };
        let entity_id = self.resolve_entity_id(input, &org_id);
        let fields_to_watch = resolver.string_list("fields_to_watch");

        let attempt_base = || ProviderAttempt::new("entity_state", "detect_changes", OperationStatus::Found);
        match self
            .detector
            .detect(&org_id, self.entity_type, &entity_id, fields_to_watch.as_deref())
            .await
        {
            Ok(report) => {
                let has_changes = report.has_changes;
                let output = serde_json::to_value(&report)
                    .map(ContextMap::from_json)
                    .unwrap_or_default();
                if has_changes {
                    OperationEnvelope::found(
                        self.operation_id.clone(),
                        output,
                        vec![attempt_base()],
                    )
                } else {
                    let mut attempt = attempt_base();
                    attempt.status = OperationStatus::NotFound;
                    OperationEnvelope::not_found(self.operation_id.clone(), output, vec![attempt])
                }
            }
            Err(error) => {
                let message = format!("change detection failed: {error}");
                OperationEnvelope::failed(
                    self.operation_id.clone(),
                    OperationError::new(error_codes::ENTITY_STATE_ERROR, message.clone()),
                    vec![ProviderAttempt::failed("entity_state", "detect_changes", message)],
                )
            }
        }
    }
}

// ============================================================================
// SECTION: Registration
// ============================================================================

/// Registers the change-signal operations for every entity type.
///
/// # Errors
///
/// Returns [`RegistryError`] when an identifier is already registered.
pub fn register_change_signals(
    registry: &mut OperationRegistry,
    store: SharedEntityStore,
) -> Result<(), RegistryError> {
    for entity_type in [EntityType::Company, EntityType::Person, EntityType::Job] {
        let executor = ChangeSignalExecutor::new(Arc::clone(&store), entity_type);
        let spec = executor.operation_spec();
        registry.register(spec, executor)?;
    }
    Ok(())
}

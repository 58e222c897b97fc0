// crates/waterline-ops/tests/registry.rs
// ============================================================================
// Module: Operation Registry Tests
// Description: Identifier validation, duplicate rejection, and routing.
// ============================================================================
//! ## Overview
//! Validates registry population rules and the change-signal registration
//! bundle.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use waterline_core::ContextMap;
use waterline_core::InMemoryEntityStore;
use waterline_core::OperationEnvelope;
use waterline_core::OperationId;
use waterline_core::OperationStatus;
use waterline_core::interfaces::EntityTableStore;
use waterline_core::interfaces::OperationExecutor;
use waterline_core::interfaces::OperationInput;
use waterline_core::interfaces::OperationRouter;
use waterline_core::interfaces::OperationSpec;
use waterline_ops::OperationRegistry;
use waterline_ops::RegistryError;
use waterline_ops::register_change_signals;

struct EchoExecutor;

#[async_trait]
impl OperationExecutor for EchoExecutor {
    async fn execute(&self, input: &OperationInput) -> OperationEnvelope {
        OperationEnvelope::found(input.operation_id.clone(), ContextMap::new(), Vec::new())
    }
}

fn spec(operation_id: &str) -> OperationSpec {
    OperationSpec {
        operation_id: OperationId::new(operation_id),
        entity_type: None,
        fan_out_collections: Vec::new(),
        timeout_ms: 5_000,
    }
}

#[test]
fn registration_routes_by_identifier() {
    let mut registry = OperationRegistry::new();
    registry.register(spec("company.enrich.tech_stack"), EchoExecutor).unwrap();
    registry.register(spec("person.search"), EchoExecutor).unwrap();

    assert_eq!(registry.len(), 2);
    assert!(registry.contains(&OperationId::new("company.enrich.tech_stack")));
    assert!(registry.resolve_operation(&OperationId::new("person.search")).is_some());
    assert!(registry.resolve_operation(&OperationId::new("person.enrich")).is_none());
}

#[test]
fn duplicate_registration_is_rejected() {
    let mut registry = OperationRegistry::new();
    registry.register(spec("company.enrich.tech_stack"), EchoExecutor).unwrap();
    let error = registry.register(spec("company.enrich.tech_stack"), EchoExecutor).unwrap_err();
    assert_eq!(
        error,
        RegistryError::DuplicateOperation("company.enrich.tech_stack".to_string())
    );
}

#[test]
fn malformed_identifiers_are_rejected() {
    let mut registry = OperationRegistry::new();
    for bad in ["company", "alien.enrich.x", "company.sings.x", "company..x", "a.b.c.d"] {
        let error = registry.register(spec(bad), EchoExecutor).unwrap_err();
        assert!(
            matches!(error, RegistryError::InvalidOperationId(_)),
            "expected rejection for {bad}"
        );
    }
    assert!(registry.is_empty());
}

#[test]
fn operation_ids_are_sorted() {
    let mut registry = OperationRegistry::new();
    registry.register(spec("person.search"), EchoExecutor).unwrap();
    registry.register(spec("company.enrich.tech_stack"), EchoExecutor).unwrap();
    assert_eq!(registry.operation_ids(), vec!["company.enrich.tech_stack", "person.search"]);
}

#[tokio::test]
async fn change_signals_register_for_every_entity_type() {
    let store: Arc<dyn EntityTableStore> = Arc::new(InMemoryEntityStore::new());
    let mut registry = OperationRegistry::new();
    register_change_signals(&mut registry, store).unwrap();

    for operation in ["company.signal.changes", "person.signal.changes", "job.signal.changes"] {
        assert!(registry.contains(&OperationId::new(operation)), "missing {operation}");
    }

    // Without history the signal reports not-found with a reason.
    let routed =
        registry.resolve_operation(&OperationId::new("company.signal.changes")).unwrap();
    let input = OperationInput {
        operation_id: OperationId::new("company.signal.changes"),
        direct: ContextMap::from_json(
            json!({"org_id": "11111111-1111-1111-1111-111111111111"}),
        ),
        cumulative_context: ContextMap::from_json(json!({"company_domain": "acme.com"})),
        step_config: ContextMap::new(),
    };
    let envelope = routed.executor.execute(&input).await;
    assert_eq!(envelope.status, OperationStatus::NotFound);
    let output = envelope.output.unwrap();
    assert_eq!(output.get_bool("has_changes"), Some(false));
    assert_eq!(output.get_text("reason"), Some("insufficient_history"));
}

#[tokio::test]
async fn change_signal_requires_org_id() {
    let store: Arc<dyn EntityTableStore> = Arc::new(InMemoryEntityStore::new());
    let mut registry = OperationRegistry::new();
    register_change_signals(&mut registry, store).unwrap();

    let routed =
        registry.resolve_operation(&OperationId::new("company.signal.changes")).unwrap();
    let input = OperationInput {
        operation_id: OperationId::new("company.signal.changes"),
        direct: ContextMap::new(),
        cumulative_context: ContextMap::new(),
        step_config: ContextMap::new(),
    };
    let envelope = routed.executor.execute(&input).await;
    assert_eq!(envelope.status, OperationStatus::Failed);
    assert_eq!(envelope.missing_inputs, Some(vec!["org_id".to_string()]));
}

#[test]
fn entity_family_is_accepted_for_internal_operations() {
    let mut registry = OperationRegistry::new();
    registry.register(spec("entity.derive.identity"), EchoExecutor).unwrap();
    assert!(registry.contains(&OperationId::new("entity.derive.identity")));
}

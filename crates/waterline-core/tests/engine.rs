// crates/waterline-core/tests/engine.rs
// ============================================================================
// Module: Pipeline Engine Tests
// Description: End-to-end run execution over in-memory collaborators.
// ============================================================================
//! ## Overview
//! Validates the execution loop contract: waterfall context propagation,
//! freshness short-circuits, failure policy, fan-out with dedup, idempotent
//! re-dispatch, cancellation, and status rollups.

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

use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use waterline_core::Blueprint;
use waterline_core::BlueprintId;
use waterline_core::BlueprintStep;
use waterline_core::CollectionBinding;
use waterline_core::CompanyId;
use waterline_core::ContextMap;
use waterline_core::DispatchError;
use waterline_core::EngineConfig;
use waterline_core::EngineError;
use waterline_core::EntityType;
use waterline_core::FreshnessPolicy;
use waterline_core::InMemoryEntityStore;
use waterline_core::InMemoryRunStore;
use waterline_core::OperationEnvelope;
use waterline_core::OperationError;
use waterline_core::OperationExecutor;
use waterline_core::OperationId;
use waterline_core::OperationInput;
use waterline_core::OperationRouter;
use waterline_core::OperationSpec;
use waterline_core::OperationStatus;
use waterline_core::OrgId;
use waterline_core::PipelineEngine;
use waterline_core::PipelineRunId;
use waterline_core::ProviderAttempt;
use waterline_core::RoutedOperation;
use waterline_core::RunStatus;
use waterline_core::RunStore;
use waterline_core::RunTask;
use waterline_core::StepStatus;
use waterline_core::SubmissionStatus;
use waterline_core::SubmitBatchRequest;
use waterline_core::TaskDispatcher;
use waterline_core::TaskId;
use waterline_core::TaskReceipt;
use waterline_core::Timestamp;
use waterline_core::UpsertRequest;

// ----------------------------------------------------------------------------
// Test collaborators
// ----------------------------------------------------------------------------

struct StaticExecutor {
    output: ContextMap,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl OperationExecutor for StaticExecutor {
    async fn execute(&self, input: &OperationInput) -> OperationEnvelope {
        self.calls.fetch_add(1, Ordering::SeqCst);
        OperationEnvelope::found(
            input.operation_id.clone(),
            self.output.clone(),
            vec![ProviderAttempt::new("static", "lookup", OperationStatus::Found)],
        )
    }
}

struct ContextProbeExecutor {
    key: String,
}

#[async_trait]
impl OperationExecutor for ContextProbeExecutor {
    async fn execute(&self, input: &OperationInput) -> OperationEnvelope {
        input.cumulative_context.get_text(&self.key).map_or_else(
            || {
                OperationEnvelope::missing_inputs(
                    input.operation_id.clone(),
                    vec![self.key.clone()],
                    Vec::new(),
                )
            },
            |value| {
                let mut output = ContextMap::new();
                output.insert("observed", value.into());
                OperationEnvelope::found(
                    input.operation_id.clone(),
                    output,
                    vec![ProviderAttempt::new("probe", "read", OperationStatus::Found)],
                )
            },
        )
    }
}

struct FailingExecutor;

#[async_trait]
impl OperationExecutor for FailingExecutor {
    async fn execute(&self, input: &OperationInput) -> OperationEnvelope {
        OperationEnvelope::failed(
            input.operation_id.clone(),
            OperationError::new("provider_http_error", "upstream returned 500"),
            vec![ProviderAttempt::failed("flaky", "lookup", "http 500")],
        )
    }
}

struct NotFoundExecutor;

#[async_trait]
impl OperationExecutor for NotFoundExecutor {
    async fn execute(&self, input: &OperationInput) -> OperationEnvelope {
        OperationEnvelope::not_found(
            input.operation_id.clone(),
            ContextMap::new(),
            vec![ProviderAttempt::new("empty", "lookup", OperationStatus::NotFound)],
        )
    }
}

struct SlowExecutor;

#[async_trait]
impl OperationExecutor for SlowExecutor {
    async fn execute(&self, input: &OperationInput) -> OperationEnvelope {
        tokio::time::sleep(Duration::from_millis(500)).await;
        OperationEnvelope::found(input.operation_id.clone(), ContextMap::new(), Vec::new())
    }
}

#[derive(Default)]
struct TestRouter {
    operations: BTreeMap<String, RoutedOperation>,
}

impl TestRouter {
    fn register(
        &mut self,
        spec: OperationSpec,
        executor: impl OperationExecutor + 'static,
    ) {
        self.operations.insert(
            spec.operation_id.as_str().to_string(),
            RoutedOperation {
                spec,
                executor: Arc::new(executor),
            },
        );
    }
}

impl OperationRouter for TestRouter {
    fn resolve_operation(&self, operation_id: &OperationId) -> Option<RoutedOperation> {
        self.operations.get(operation_id.as_str()).cloned()
    }
}

#[derive(Default)]
struct RecordingDispatcher {
    tasks: Mutex<Vec<RunTask>>,
}

impl RecordingDispatcher {
    fn drain(&self) -> Vec<RunTask> {
        self.tasks.lock().unwrap().drain(..).collect()
    }
}

#[async_trait]
impl TaskDispatcher for RecordingDispatcher {
    async fn dispatch(&self, task: &RunTask) -> Result<TaskReceipt, DispatchError> {
        let mut guard = self.tasks.lock().unwrap();
        guard.push(task.clone());
        Ok(TaskReceipt {
            task_id: task.task_id.clone(),
            runner_run_id: Some(TaskId::new(format!("runner-{}", guard.len()))),
            accepted_at: Timestamp::now_utc(),
        })
    }
}

// ----------------------------------------------------------------------------
// Fixtures
// ----------------------------------------------------------------------------

type TestEngine =
    PipelineEngine<InMemoryEntityStore, InMemoryRunStore, Arc<RecordingDispatcher>, TestRouter>;

fn org() -> OrgId {
    OrgId::parse("11111111-1111-1111-1111-111111111111").unwrap()
}

fn company() -> CompanyId {
    CompanyId::parse("22222222-2222-2222-2222-222222222222").unwrap()
}

fn spec(operation_id: &str, entity_type: Option<EntityType>) -> OperationSpec {
    OperationSpec {
        operation_id: OperationId::new(operation_id),
        entity_type,
        fan_out_collections: Vec::new(),
        timeout_ms: 5_000,
    }
}

fn step(position: u32, operation_id: &str) -> BlueprintStep {
    BlueprintStep {
        position: NonZeroU32::new(position).unwrap(),
        operation_id: OperationId::new(operation_id),
        step_config: ContextMap::new(),
        fan_out: false,
        is_enabled: true,
        skip_if_fresh: None,
    }
}

fn blueprint(steps: Vec<BlueprintStep>) -> Blueprint {
    Blueprint {
        blueprint_id: BlueprintId::generate(),
        org_id: org(),
        name: "test recipe".to_string(),
        description: None,
        is_active: true,
        steps,
    }
}

struct Harness {
    engine: TestEngine,
    run_store: InMemoryRunStore,
    dispatcher: Arc<RecordingDispatcher>,
}

fn harness_with(router: TestRouter, config: EngineConfig) -> Harness {
    let entity_store = InMemoryEntityStore::new();
    let run_store = InMemoryRunStore::new();
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let engine = PipelineEngine::new(
        entity_store,
        run_store.clone(),
        Arc::clone(&dispatcher),
        router,
        config,
    );
    Harness {
        engine,
        run_store,
        dispatcher,
    }
}

async fn submit(
    harness: &Harness,
    blueprint: Blueprint,
    entities: Vec<serde_json::Value>,
) -> waterline_core::SubmissionReceipt {
    harness.engine.run_store().save_blueprint(&blueprint).await.unwrap();
    harness
        .engine
        .submit_batch(SubmitBatchRequest {
            org_id: org(),
            company_id: company(),
            blueprint_id: blueprint.blueprint_id,
            entities: entities.into_iter().map(ContextMap::from_json).collect(),
        })
        .await
        .unwrap()
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[tokio::test]
async fn waterfall_context_flows_between_steps() {
    let mut router = TestRouter::default();
    let mut output = ContextMap::new();
    output.insert("domain", "acme.com".into());
    router.register(
        spec("company.resolve.domain", None),
        StaticExecutor {
            output,
            calls: Arc::new(AtomicUsize::new(0)),
        },
    );
    router.register(
        spec("company.research.describe", None),
        ContextProbeExecutor {
            key: "domain".to_string(),
        },
    );

    let harness = harness_with(router, EngineConfig::default());
    let receipt = submit(
        &harness,
        blueprint(vec![
            step(1, "company.resolve.domain"),
            step(2, "company.research.describe"),
        ]),
        vec![json!({"entity_type": "company", "name": "Acme"})],
    )
    .await;

    let status = harness.engine.execute_run(&receipt.run_ids[0]).await.unwrap();
    assert_eq!(status, RunStatus::Succeeded);

    let results = harness.run_store.list_step_results(&receipt.run_ids[0]).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[1].status, StepStatus::Succeeded);
    assert_eq!(
        results[1].output_payload.as_ref().unwrap().get_text("observed"),
        Some("acme.com")
    );

    let run =
        harness.run_store.load_pipeline_run(&receipt.run_ids[0]).await.unwrap().unwrap();
    assert_eq!(run.cumulative_context.get_text("domain"), Some("acme.com"));
    assert!(run.trigger_run_id.is_some(), "dispatch receipt handle is recorded");
}

#[tokio::test]
async fn missing_context_key_fails_with_missing_inputs() {
    let mut router = TestRouter::default();
    router.register(
        spec("company.research.describe", None),
        ContextProbeExecutor {
            key: "domain".to_string(),
        },
    );
    let harness = harness_with(router, EngineConfig::default());
    let receipt = submit(
        &harness,
        blueprint(vec![step(1, "company.research.describe")]),
        vec![json!({"entity_type": "company", "name": "Acme"})],
    )
    .await;

    let status = harness.engine.execute_run(&receipt.run_ids[0]).await.unwrap();
    assert_eq!(status, RunStatus::Failed);

    let results = harness.run_store.list_step_results(&receipt.run_ids[0]).await.unwrap();
    assert_eq!(results[0].status, StepStatus::Failed);
    assert!(results[0].error_message.as_ref().unwrap().contains("missing_inputs"));
}

#[tokio::test]
async fn freshness_short_circuit_skips_the_provider() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut router = TestRouter::default();
    router.register(
        spec("company.enrich.firmographics", Some(EntityType::Company)),
        StaticExecutor {
            output: ContextMap::new(),
            calls: Arc::clone(&calls),
        },
    );
    router.register(
        spec("company.research.describe", None),
        ContextProbeExecutor {
            key: "industry".to_string(),
        },
    );

    let harness = harness_with(router, EngineConfig::default());

    // Enrich the entity 24 hours ago so a 72-hour window is fresh.
    let enriched_at = Timestamp::from_unix_seconds(
        Timestamp::now_utc().as_datetime().unix_timestamp() - 24 * 3600,
    )
    .unwrap();
    harness
        .engine
        .entity_state()
        .upsert(
            UpsertRequest {
                org_id: org(),
                company_id: Some(company()),
                entity_type: EntityType::Company,
                canonical_fields: ContextMap::from_json(
                    json!({"domain": "acme.com", "industry": "Software"}),
                ),
                entity_id: None,
                last_operation_id: None,
                last_run_id: None,
                incoming_record_version: None,
            },
            enriched_at,
        )
        .await
        .unwrap();

    let mut fresh_step = step(1, "company.enrich.firmographics");
    fresh_step.skip_if_fresh = Some(FreshnessPolicy {
        max_age_hours: 72.0,
        identity_fields: vec!["company_domain".to_string()],
    });
    let receipt = submit(
        &harness,
        blueprint(vec![fresh_step, step(2, "company.research.describe")]),
        vec![json!({"entity_type": "company", "company_domain": "acme.com"})],
    )
    .await;

    let status = harness.engine.execute_run(&receipt.run_ids[0]).await.unwrap();
    assert_eq!(status, RunStatus::Succeeded);
    assert_eq!(calls.load(Ordering::SeqCst), 0, "fresh entity must not call the provider");

    let results = harness.run_store.list_step_results(&receipt.run_ids[0]).await.unwrap();
    assert_eq!(results[0].status, StepStatus::Skipped);
    assert_eq!(results[0].skip_reason.as_deref(), Some("entity_state_fresh"));

    // The canonical payload flowed into the context, and the next step ran.
    assert_eq!(results[1].status, StepStatus::Succeeded);
    assert_eq!(
        results[1].output_payload.as_ref().unwrap().get_text("observed"),
        Some("Software")
    );
}

#[tokio::test]
async fn failed_step_terminates_the_run() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut router = TestRouter::default();
    router.register(spec("company.enrich.flaky", None), FailingExecutor);
    router.register(
        spec("company.enrich.after", None),
        StaticExecutor {
            output: ContextMap::new(),
            calls: Arc::clone(&calls),
        },
    );
    let harness = harness_with(router, EngineConfig::default());
    let receipt = submit(
        &harness,
        blueprint(vec![step(1, "company.enrich.flaky"), step(2, "company.enrich.after")]),
        vec![json!({"entity_type": "company", "domain": "acme.com"})],
    )
    .await;

    let status = harness.engine.execute_run(&receipt.run_ids[0]).await.unwrap();
    assert_eq!(status, RunStatus::Failed);
    assert_eq!(calls.load(Ordering::SeqCst), 0, "subsequent steps must not execute");

    let run =
        harness.run_store.load_pipeline_run(&receipt.run_ids[0]).await.unwrap().unwrap();
    assert!(run.error_message.as_ref().unwrap().contains("provider_http_error"));

    let batch = harness.engine.batch_status(&receipt.submission_id).await.unwrap();
    assert_eq!(batch.status, SubmissionStatus::Failed);
    assert_eq!(batch.summary.failed, 1);
}

#[tokio::test]
async fn not_found_steps_are_non_fatal() {
    let mut router = TestRouter::default();
    router.register(spec("company.search.permits", None), NotFoundExecutor);
    router.register(
        spec("company.enrich.after", None),
        StaticExecutor {
            output: ContextMap::new(),
            calls: Arc::new(AtomicUsize::new(0)),
        },
    );
    let harness = harness_with(router, EngineConfig::default());
    let receipt = submit(
        &harness,
        blueprint(vec![step(1, "company.search.permits"), step(2, "company.enrich.after")]),
        vec![json!({"entity_type": "company", "domain": "acme.com"})],
    )
    .await;

    let status = harness.engine.execute_run(&receipt.run_ids[0]).await.unwrap();
    assert_eq!(status, RunStatus::Succeeded);

    let results = harness.run_store.list_step_results(&receipt.run_ids[0]).await.unwrap();
    assert_eq!(results[0].status, StepStatus::NotFound);
    assert_eq!(results[1].status, StepStatus::Succeeded);
}

#[tokio::test]
async fn not_found_results_still_refresh_entity_state() {
    let mut router = TestRouter::default();
    router.register(
        spec("company.search.permits", Some(EntityType::Company)),
        NotFoundExecutor,
    );
    let harness = harness_with(router, EngineConfig::default());
    let receipt = submit(
        &harness,
        blueprint(vec![step(1, "company.search.permits")]),
        vec![json!({"entity_type": "company", "company_domain": "acme.com"})],
    )
    .await;

    let status = harness.engine.execute_run(&receipt.run_ids[0]).await.unwrap();
    assert_eq!(status, RunStatus::Succeeded);

    // A provider-confirmed empty result still advances the entity's
    // enrichment clock, so freshness checks can short-circuit later runs.
    let identifiers = ContextMap::from_json(json!({"company_domain": "acme.com"}));
    let record = harness
        .engine
        .entity_state()
        .lookup_by_natural_key(&org(), EntityType::Company, &identifiers)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.record_version, 1);
    assert_eq!(record.last_run_id, Some(receipt.run_ids[0]));

    let report = harness
        .engine
        .entity_state()
        .check_freshness(&org(), EntityType::Company, &identifiers, 72.0, Timestamp::now_utc())
        .await
        .unwrap();
    assert!(report.fresh);
}

#[tokio::test]
async fn disabled_steps_are_skipped() {
    let mut router = TestRouter::default();
    router.register(
        spec("company.enrich.after", None),
        StaticExecutor {
            output: ContextMap::new(),
            calls: Arc::new(AtomicUsize::new(0)),
        },
    );
    let harness = harness_with(router, EngineConfig::default());

    let mut disabled = step(1, "company.enrich.unregistered");
    disabled.is_enabled = false;
    let receipt = submit(
        &harness,
        blueprint(vec![disabled, step(2, "company.enrich.after")]),
        vec![json!({"entity_type": "company", "domain": "acme.com"})],
    )
    .await;

    let status = harness.engine.execute_run(&receipt.run_ids[0]).await.unwrap();
    assert_eq!(status, RunStatus::Succeeded);
    let results = harness.run_store.list_step_results(&receipt.run_ids[0]).await.unwrap();
    assert_eq!(results[0].status, StepStatus::Skipped);
    assert_eq!(results[0].skip_reason.as_deref(), Some("disabled"));
}

#[tokio::test]
async fn unknown_operation_fails_the_run() {
    let harness = harness_with(TestRouter::default(), EngineConfig::default());
    let receipt = submit(
        &harness,
        blueprint(vec![step(1, "company.enrich.ghost")]),
        vec![json!({"entity_type": "company", "domain": "acme.com"})],
    )
    .await;

    let status = harness.engine.execute_run(&receipt.run_ids[0]).await.unwrap();
    assert_eq!(status, RunStatus::Failed);
    let results = harness.run_store.list_step_results(&receipt.run_ids[0]).await.unwrap();
    assert!(results[0].error_message.as_ref().unwrap().contains("unknown_operation"));
}

#[tokio::test]
async fn entity_typed_operations_upsert_into_the_state_store() {
    let mut router = TestRouter::default();
    let mut output = ContextMap::new();
    output.insert("industry", "Software".into());
    router.register(
        spec("company.enrich.firmographics", Some(EntityType::Company)),
        StaticExecutor {
            output,
            calls: Arc::new(AtomicUsize::new(0)),
        },
    );
    let harness = harness_with(router, EngineConfig::default());
    let receipt = submit(
        &harness,
        blueprint(vec![step(1, "company.enrich.firmographics")]),
        vec![json!({"entity_type": "company", "company_domain": "acme.com"})],
    )
    .await;
    harness.engine.execute_run(&receipt.run_ids[0]).await.unwrap();

    let identifiers = ContextMap::from_json(json!({"company_domain": "acme.com"}));
    let record = harness
        .engine
        .entity_state()
        .lookup_by_natural_key(&org(), EntityType::Company, &identifiers)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.record_version, 1);
    assert_eq!(record.canonical_payload.get_text("industry"), Some("Software"));
    assert_eq!(
        record.last_operation_id.as_ref().map(waterline_core::OperationId::as_str),
        Some("company.enrich.firmographics")
    );
    assert_eq!(record.last_run_id, Some(receipt.run_ids[0]));
}

#[tokio::test]
async fn fan_out_dedups_and_spawns_children() {
    let mut router = TestRouter::default();
    let output = ContextMap::from_json(json!({
        "champions": [
            {"linkedin_url": "https://linkedin.com/in/alex"},
            {"linkedin_url": "https://linkedin.com/in/alex/"},
            {"linkedin_url": "https://linkedin.com/in/bianca"},
        ],
    }));
    let mut search_spec = spec("company.search.champions", None);
    search_spec.fan_out_collections = vec![CollectionBinding {
        key: "champions".to_string(),
        entity_type: EntityType::Person,
    }];
    router.register(
        search_spec,
        StaticExecutor {
            output,
            calls: Arc::new(AtomicUsize::new(0)),
        },
    );
    router.register(
        spec("person.enrich.profile", Some(EntityType::Person)),
        StaticExecutor {
            output: ContextMap::new(),
            calls: Arc::new(AtomicUsize::new(0)),
        },
    );

    let harness = harness_with(router, EngineConfig::default());
    let mut fan_out_step = step(1, "company.search.champions");
    fan_out_step.fan_out = true;
    let receipt = submit(
        &harness,
        blueprint(vec![fan_out_step, step(2, "person.enrich.profile")]),
        vec![json!({"entity_type": "company", "company_domain": "acme.com"})],
    )
    .await;

    // Drain the parent dispatch before executing so only children remain.
    let parent_tasks = harness.dispatcher.drain();
    assert_eq!(parent_tasks.len(), 1);

    let status = harness.engine.execute_run(&receipt.run_ids[0]).await.unwrap();
    assert_eq!(status, RunStatus::Succeeded, "fan-out parents terminate succeeded");

    let results = harness.run_store.list_step_results(&receipt.run_ids[0]).await.unwrap();
    assert_eq!(results[0].children_spawned, Some(2));
    assert_eq!(results[0].skipped_duplicates_count, Some(1));
    assert_eq!(
        results[0].skipped_duplicate_identifiers,
        vec!["person:linkedin:https://linkedin.com/in/alex".to_string()]
    );

    let child_tasks = harness.dispatcher.drain();
    assert_eq!(child_tasks.len(), 2);
    for task in &child_tasks {
        let child =
            harness.run_store.load_pipeline_run(&task.run_id).await.unwrap().unwrap();
        assert_eq!(child.parent_run_id, Some(receipt.run_ids[0]));
        assert_eq!(child.current_position, 2, "children resume after the fan-out position");
        assert_eq!(child.fan_out_depth, 1);
        assert_eq!(
            child.cumulative_context.get_text("company_domain"),
            Some("acme.com"),
            "children inherit the parent context"
        );
        assert_eq!(child.entity_input.get_text("entity_type"), Some("person"));

        let child_status = harness.engine.execute_run(&task.run_id).await.unwrap();
        assert_eq!(child_status, RunStatus::Succeeded);
    }

    let batch = harness.engine.batch_status(&receipt.submission_id).await.unwrap();
    assert_eq!(batch.status, SubmissionStatus::Completed);
    assert_eq!(batch.summary.total, 3);
    assert_eq!(batch.summary.completed, 3);
}

#[tokio::test]
async fn fan_out_depth_is_bounded() {
    let mut router = TestRouter::default();
    let output = ContextMap::from_json(json!({"champions": [{"full_name": "Alex"}]}));
    let mut search_spec = spec("company.search.champions", None);
    search_spec.fan_out_collections = vec![CollectionBinding {
        key: "champions".to_string(),
        entity_type: EntityType::Person,
    }];
    router.register(
        search_spec,
        StaticExecutor {
            output,
            calls: Arc::new(AtomicUsize::new(0)),
        },
    );

    let config = EngineConfig {
        max_fan_out_depth: 0,
        ..EngineConfig::default()
    };
    let harness = harness_with(router, config);
    let mut fan_out_step = step(1, "company.search.champions");
    fan_out_step.fan_out = true;
    let receipt = submit(
        &harness,
        blueprint(vec![fan_out_step]),
        vec![json!({"entity_type": "company", "company_domain": "acme.com"})],
    )
    .await;

    let status = harness.engine.execute_run(&receipt.run_ids[0]).await.unwrap();
    assert_eq!(status, RunStatus::Succeeded);
    let results = harness.run_store.list_step_results(&receipt.run_ids[0]).await.unwrap();
    assert_eq!(results[0].status, StepStatus::Skipped);
    assert_eq!(results[0].children_spawned, Some(0));
    assert_eq!(results[0].skip_reason.as_deref(), Some("fan_out_depth_exceeded"));

    let batch = harness.engine.batch_status(&receipt.submission_id).await.unwrap();
    assert_eq!(batch.summary.total, 1, "no children were spawned");
}

#[tokio::test]
async fn terminal_runs_ignore_duplicate_dispatches() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut router = TestRouter::default();
    router.register(
        spec("company.enrich.firmographics", None),
        StaticExecutor {
            output: ContextMap::new(),
            calls: Arc::clone(&calls),
        },
    );
    let harness = harness_with(router, EngineConfig::default());
    let receipt = submit(
        &harness,
        blueprint(vec![step(1, "company.enrich.firmographics")]),
        vec![json!({"entity_type": "company", "domain": "acme.com"})],
    )
    .await;

    let first = harness.engine.execute_run(&receipt.run_ids[0]).await.unwrap();
    let second = harness.engine.execute_run(&receipt.run_ids[0]).await.unwrap();
    assert_eq!(first, RunStatus::Succeeded);
    assert_eq!(second, RunStatus::Succeeded);
    assert_eq!(calls.load(Ordering::SeqCst), 1, "re-dispatch must not re-execute steps");

    let results = harness.run_store.list_step_results(&receipt.run_ids[0]).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].attempt_number, 1);
}

#[tokio::test]
async fn operation_timeout_fails_the_step() {
    let mut router = TestRouter::default();
    let mut slow_spec = spec("company.research.deep", None);
    slow_spec.timeout_ms = 50;
    router.register(slow_spec, SlowExecutor);
    let harness = harness_with(router, EngineConfig::default());
    let receipt = submit(
        &harness,
        blueprint(vec![step(1, "company.research.deep")]),
        vec![json!({"entity_type": "company", "domain": "acme.com"})],
    )
    .await;

    let status = harness.engine.execute_run(&receipt.run_ids[0]).await.unwrap();
    assert_eq!(status, RunStatus::Failed);
    let results = harness.run_store.list_step_results(&receipt.run_ids[0]).await.unwrap();
    assert!(results[0].error_message.as_ref().unwrap().contains("timeout"));
    assert_eq!(results[0].provider_attempts[0].error.as_deref(), Some("timeout"));
}

#[tokio::test]
async fn cancelled_submissions_stop_at_the_step_boundary() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut router = TestRouter::default();
    router.register(
        spec("company.enrich.firmographics", None),
        StaticExecutor {
            output: ContextMap::new(),
            calls: Arc::clone(&calls),
        },
    );
    let harness = harness_with(router, EngineConfig::default());
    let receipt = submit(
        &harness,
        blueprint(vec![step(1, "company.enrich.firmographics")]),
        vec![json!({"entity_type": "company", "domain": "acme.com"})],
    )
    .await;

    harness.engine.cancel_submission(&receipt.submission_id).await.unwrap();
    let status = harness.engine.execute_run(&receipt.run_ids[0]).await.unwrap();
    assert_eq!(status, RunStatus::Skipped);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let batch = harness.engine.batch_status(&receipt.submission_id).await.unwrap();
    assert_eq!(batch.status, SubmissionStatus::Cancelled);
}

#[tokio::test]
async fn submission_validation_rejects_bad_seeds() {
    let harness = harness_with(TestRouter::default(), EngineConfig::default());
    let blueprint = blueprint(vec![step(1, "company.enrich.firmographics")]);
    harness.engine.run_store().save_blueprint(&blueprint).await.unwrap();

    let submit_with = |entities: Vec<serde_json::Value>| SubmitBatchRequest {
        org_id: org(),
        company_id: company(),
        blueprint_id: blueprint.blueprint_id,
        entities: entities.into_iter().map(ContextMap::from_json).collect(),
    };

    let empty = harness.engine.submit_batch(submit_with(Vec::new())).await;
    assert!(matches!(empty, Err(EngineError::InvalidSubmission(_))));

    let unknown_type =
        harness.engine.submit_batch(submit_with(vec![json!({"entity_type": "alien"})])).await;
    assert!(matches!(unknown_type, Err(EngineError::InvalidSubmission(_))));

    let no_identifier =
        harness.engine.submit_batch(submit_with(vec![json!({"entity_type": "company"})])).await;
    assert!(matches!(no_identifier, Err(EngineError::InvalidSubmission(_))));
}

#[tokio::test]
async fn inactive_or_missing_blueprints_are_rejected() {
    let harness = harness_with(TestRouter::default(), EngineConfig::default());

    let mut inactive = blueprint(vec![step(1, "company.enrich.firmographics")]);
    inactive.is_active = false;
    harness.engine.run_store().save_blueprint(&inactive).await.unwrap();

    let request = SubmitBatchRequest {
        org_id: org(),
        company_id: company(),
        blueprint_id: inactive.blueprint_id,
        entities: vec![ContextMap::from_json(
            json!({"entity_type": "company", "domain": "acme.com"}),
        )],
    };
    let rejected = harness.engine.submit_batch(request.clone()).await;
    assert!(matches!(rejected, Err(EngineError::BlueprintInactive(_))));

    let missing = SubmitBatchRequest {
        blueprint_id: BlueprintId::generate(),
        ..request
    };
    let not_found = harness.engine.submit_batch(missing).await;
    assert!(matches!(not_found, Err(EngineError::BlueprintNotFound(_))));
}

#[tokio::test]
async fn missing_run_is_an_engine_error() {
    let harness = harness_with(TestRouter::default(), EngineConfig::default());
    let error = harness.engine.execute_run(&PipelineRunId::generate()).await.unwrap_err();
    assert!(matches!(error, EngineError::RunNotFound(_)));
}

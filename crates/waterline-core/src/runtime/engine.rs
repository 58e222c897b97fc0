// crates/waterline-core/src/runtime/engine.rs
// ============================================================================
// Module: Waterline Pipeline Engine
// Description: Submission intake, step sequencing, fan-out, and status rollup.
// Purpose: Execute blueprint snapshots one entity at a time with a growing context.
// Dependencies: crate::{core, interfaces, runtime}, thiserror, tokio, tracing
// ============================================================================

//! ## Overview
//! The pipeline engine is the single canonical execution path for Waterline.
//! One pipeline run is one logical task: steps execute strictly in ascending
//! position order, each step's mapped output deep-merges into the cumulative
//! context, a fan-out step expands its collection output into child runs and
//! terminates the parent, and submission status rolls up from run counts.
//!
//! Duplicate dispatches from the task runner are tolerated: a terminal run
//! exits early, and step results carry attempt numbers so re-entry appends
//! rather than rewrites.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use thiserror::Error;

use crate::core::BatchStatus;
use crate::core::BlueprintError;
use crate::core::BlueprintId;
use crate::core::BlueprintSnapshot;
use crate::core::BlueprintStep;
use crate::core::CompanyId;
use crate::core::ContextMap;
use crate::core::ContextValue;
use crate::core::EntityType;
use crate::core::OperationEnvelope;
use crate::core::OperationError;
use crate::core::OperationStatus;
use crate::core::OrgId;
use crate::core::PipelineRun;
use crate::core::PipelineRunId;
use crate::core::ProviderAttempt;
use crate::core::RunStatus;
use crate::core::RunStatusRow;
use crate::core::StepResult;
use crate::core::StepStatus;
use crate::core::Submission;
use crate::core::SubmissionId;
use crate::core::SubmissionStatus;
use crate::core::SubmissionSummary;
use crate::core::TaskId;
use crate::core::Timestamp;
use crate::core::error_codes;
use crate::core::seed_entity_type;
use crate::core::seed_has_identifier;
use crate::interfaces::EntityTableStore;
use crate::interfaces::OperationInput;
use crate::interfaces::OperationRouter;
use crate::interfaces::RoutedOperation;
use crate::interfaces::RunStore;
use crate::interfaces::RunStoreError;
use crate::interfaces::RunTask;
use crate::interfaces::TaskDispatcher;
use crate::runtime::entity_state::EntityStateError;
use crate::runtime::entity_state::EntityStateService;
use crate::runtime::entity_state::UpsertRequest;
use crate::runtime::entity_state::has_identity_values;
use crate::runtime::entity_state::identity_slice;
use crate::runtime::fanout::dedup_fan_out;
use crate::runtime::fanout::expand_collections;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Pipeline engine configuration.
///
/// # Invariants
/// - `max_fan_out_depth` bounds recursive fan-out generations per submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum fan-out generation depth.
    pub max_fan_out_depth: u32,
    /// Executor timeout applied when an operation declares none.
    pub default_step_timeout_ms: u64,
    /// Maximum seed entities accepted per submission.
    pub max_entities_per_submission: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_fan_out_depth: 3,
            default_step_timeout_ms: 30_000,
            max_entities_per_submission: 1_000,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Pipeline engine errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Referenced blueprint does not exist for the tenant.
    #[error("blueprint not found: {0}")]
    BlueprintNotFound(BlueprintId),
    /// Referenced blueprint does not accept submissions.
    #[error("blueprint is inactive: {0}")]
    BlueprintInactive(BlueprintId),
    /// Blueprint failed validation.
    #[error("invalid blueprint: {0}")]
    InvalidBlueprint(#[from] BlueprintError),
    /// Submission payload failed validation.
    #[error("invalid submission: {0}")]
    InvalidSubmission(String),
    /// Referenced submission does not exist.
    #[error("submission not found: {0}")]
    SubmissionNotFound(SubmissionId),
    /// Referenced pipeline run does not exist.
    #[error("pipeline run not found: {0}")]
    RunNotFound(PipelineRunId),
    /// Run store failure.
    #[error(transparent)]
    RunStore(#[from] RunStoreError),
}

// ============================================================================
// SECTION: Requests and Receipts
// ============================================================================

/// Batch submission request.
#[derive(Debug, Clone)]
pub struct SubmitBatchRequest {
    /// Owning tenant.
    pub org_id: OrgId,
    /// Workspace company the batch belongs to.
    pub company_id: CompanyId,
    /// Blueprint to execute.
    pub blueprint_id: BlueprintId,
    /// Seed entities, each carrying `entity_type` plus identifying fields.
    pub entities: Vec<ContextMap>,
}

/// Receipt for an accepted batch submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionReceipt {
    /// Created submission identifier.
    pub submission_id: SubmissionId,
    /// Parent pipeline runs, one per seed entity in order.
    pub run_ids: Vec<PipelineRunId>,
}

/// Control flow outcome of one step execution.
enum StepFlow {
    /// Advance to the next position.
    Advance,
    /// The run fails at this step.
    RunFailed(String),
    /// The parent terminated at a fan-out position; children await dispatch.
    FannedOut(Vec<PipelineRun>),
}

// ============================================================================
// SECTION: Pipeline Engine
// ============================================================================

/// Pipeline engine generic over its collaborator interfaces.
pub struct PipelineEngine<S, R, D, O> {
    /// Entity state service over the entity row store.
    entity_state: EntityStateService<S>,
    /// Run, submission, and step-result store.
    runs: R,
    /// External task dispatcher.
    dispatcher: D,
    /// Operation registry lookup.
    router: O,
    /// Engine configuration.
    config: EngineConfig,
}

impl<S, R, D, O> PipelineEngine<S, R, D, O>
where
    S: EntityTableStore,
    R: RunStore,
    D: TaskDispatcher,
    O: OperationRouter,
{
    /// Creates a new pipeline engine.
    #[must_use]
    pub const fn new(
        entity_store: S,
        runs: R,
        dispatcher: D,
        router: O,
        config: EngineConfig,
    ) -> Self {
        Self {
            entity_state: EntityStateService::new(entity_store),
            runs,
            dispatcher,
            router,
            config,
        }
    }

    /// Returns the entity state service backing this engine.
    #[must_use]
    pub const fn entity_state(&self) -> &EntityStateService<S> {
        &self.entity_state
    }

    /// Returns the run store backing this engine.
    #[must_use]
    pub const fn run_store(&self) -> &R {
        &self.runs
    }

    // ------------------------------------------------------------------
    // Submission intake
    // ------------------------------------------------------------------

    /// Validates a batch, snapshots its blueprint, creates one queued parent
    /// run per seed entity, and dispatches each run to the task runner.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when validation or persistence fails. A
    /// dispatch failure marks the affected run `failed` without failing the
    /// whole submission.
    pub async fn submit_batch(
        &self,
        request: SubmitBatchRequest,
    ) -> Result<SubmissionReceipt, EngineError> {
        if request.entities.is_empty() {
            return Err(EngineError::InvalidSubmission("no entities submitted".to_string()));
        }
        if request.entities.len() > self.config.max_entities_per_submission {
            return Err(EngineError::InvalidSubmission(format!(
                "submission exceeds entity limit ({} > {})",
                request.entities.len(),
                self.config.max_entities_per_submission
            )));
        }
        for (index, entity) in request.entities.iter().enumerate() {
            if seed_entity_type(entity).is_none() {
                return Err(EngineError::InvalidSubmission(format!(
                    "entity {index} is missing a valid entity_type"
                )));
            }
            if !seed_has_identifier(entity) {
                return Err(EngineError::InvalidSubmission(format!(
                    "entity {index} carries no identifying field"
                )));
            }
        }

        let blueprint = self
            .runs
            .load_blueprint(&request.org_id, &request.blueprint_id)
            .await?
            .ok_or(EngineError::BlueprintNotFound(request.blueprint_id))?;
        if !blueprint.is_active {
            return Err(EngineError::BlueprintInactive(request.blueprint_id));
        }
        blueprint.validate()?;
        let snapshot = BlueprintSnapshot::capture(&blueprint);

        let now = Timestamp::now_utc();
        let submission = Submission {
            submission_id: SubmissionId::generate(),
            org_id: request.org_id,
            company_id: request.company_id,
            blueprint_id: request.blueprint_id,
            entities: request.entities.clone(),
            status: SubmissionStatus::Pending,
            cancel_requested: false,
            created_at: now,
            updated_at: now,
        };
        self.runs.create_submission(&submission).await?;

        let mut created: Vec<PipelineRun> = Vec::with_capacity(request.entities.len());
        for (index, entity) in request.entities.iter().enumerate() {
            let run = PipelineRun {
                run_id: PipelineRunId::generate(),
                org_id: request.org_id,
                company_id: Some(request.company_id),
                submission_id: submission.submission_id,
                parent_run_id: None,
                trigger_run_id: None,
                blueprint_snapshot: snapshot.clone(),
                entity_input: entity.clone(),
                cumulative_context: entity.clone(),
                current_position: 1,
                fan_out_depth: 0,
                entity_index: u32::try_from(index).unwrap_or(u32::MAX),
                status: RunStatus::Queued,
                error_message: None,
                created_at: now,
                updated_at: now,
            };
            self.runs.create_pipeline_run(&run).await?;
            created.push(run);
        }

        self.runs
            .update_submission_status(
                &submission.submission_id,
                SubmissionStatus::Processing,
                Timestamp::now_utc(),
            )
            .await?;

        let mut run_ids = Vec::with_capacity(created.len());
        for run in &mut created {
            run_ids.push(run.run_id);
            self.dispatch_run(run).await?;
        }

        tracing::info!(
            submission_id = %submission.submission_id,
            runs = run_ids.len(),
            "submission accepted"
        );
        Ok(SubmissionReceipt {
            submission_id: submission.submission_id,
            run_ids,
        })
    }

    /// Dispatches one run to the task runner, recording the runner handle on
    /// success and failing the run on rejection.
    async fn dispatch_run(&self, run: &mut PipelineRun) -> Result<(), EngineError> {
        let task = RunTask {
            task_id: TaskId::new(run.run_id.to_string()),
            run_id: run.run_id,
            org_id: run.org_id,
            submission_id: run.submission_id,
        };
        match self.dispatcher.dispatch(&task).await {
            Ok(receipt) => {
                run.trigger_run_id = receipt.runner_run_id;
                run.updated_at = Timestamp::now_utc();
                self.runs.save_pipeline_run(run).await?;
            }
            Err(error) => {
                tracing::warn!(run_id = %run.run_id, %error, "run dispatch failed");
                run.status = RunStatus::Failed;
                run.error_message = Some(format!("dispatch failed: {error}"));
                run.updated_at = Timestamp::now_utc();
                self.runs.save_pipeline_run(run).await?;
                self.rollup_submission(&run.submission_id).await?;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Run execution
    // ------------------------------------------------------------------

    /// Executes a pipeline run from its current position to a terminal state.
    ///
    /// Safe to call more than once for the same run: terminal runs return
    /// immediately, and re-entry resumes at the persisted position.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the run does not exist or the run store
    /// fails. Step-level failures terminate the run as `failed` and are not
    /// engine errors.
    pub async fn execute_run(&self, run_id: &PipelineRunId) -> Result<RunStatus, EngineError> {
        let Some(mut run) = self.runs.load_pipeline_run(run_id).await? else {
            return Err(EngineError::RunNotFound(*run_id));
        };
        if run.status.is_terminal() {
            return Ok(run.status);
        }

        run.status = RunStatus::Running;
        run.updated_at = Timestamp::now_utc();
        self.runs.save_pipeline_run(&run).await?;
        tracing::info!(run_id = %run.run_id, position = run.current_position, "run started");

        let last_position = run.blueprint_snapshot.last_position();
        while run.current_position <= last_position {
            if self.submission_cancelled(&run.submission_id).await? {
                return self
                    .finish_run(run, RunStatus::Skipped, Some("submission cancelled".to_string()))
                    .await;
            }
            let Some(step) = run.blueprint_snapshot.step_at(run.current_position).cloned() else {
                let current_position = run.current_position;
                return self
                    .finish_run(
                        run,
                        RunStatus::Failed,
                        Some(format!("no step at position {current_position}")),
                    )
                    .await;
            };
            match self.run_step(&mut run, &step).await? {
                StepFlow::Advance => {
                    run.current_position = run.current_position.saturating_add(1);
                    run.updated_at = Timestamp::now_utc();
                    self.runs.save_pipeline_run(&run).await?;
                }
                StepFlow::RunFailed(message) => {
                    return self.finish_run(run, RunStatus::Failed, Some(message)).await;
                }
                StepFlow::FannedOut(children) => {
                    let status = self.finish_run(run, RunStatus::Succeeded, None).await?;
                    self.dispatch_children(children).await?;
                    return Ok(status);
                }
            }
        }
        self.finish_run(run, RunStatus::Succeeded, None).await
    }

    /// Executes one step of a run and decides the resulting control flow.
    #[allow(
        clippy::too_many_lines,
        reason = "Single linear flow mirrors the step contract ordering for auditability."
    )]
    async fn run_step(
        &self,
        run: &mut PipelineRun,
        step: &BlueprintStep,
    ) -> Result<StepFlow, EngineError> {
        let position = step.position.get();
        let now = Timestamp::now_utc();
        let attempt_number =
            self.runs.step_attempt_count(&run.run_id, position).await?.saturating_add(1);

        if !step.is_enabled {
            let result = skipped_result(run, step, attempt_number, "disabled", now);
            self.runs.append_step_result(&result).await?;
            return Ok(StepFlow::Advance);
        }

        let step_entity_type = step
            .operation_id
            .family()
            .and_then(EntityType::parse)
            .or_else(|| run.seed_entity_type());

        if let Some(policy) = &step.skip_if_fresh
            && let Some(entity_type) = step_entity_type
        {
            let slice = identity_slice(&run.cumulative_context, &policy.identity_fields);
            if has_identity_values(&slice) {
                match self
                    .entity_state
                    .check_freshness(&run.org_id, entity_type, &slice, policy.max_age_hours, now)
                    .await
                {
                    Ok(report) if report.fresh => {
                        if let Some(payload) = &report.canonical_payload {
                            run.cumulative_context.merge_deep(payload);
                        }
                        let result =
                            skipped_result(run, step, attempt_number, "entity_state_fresh", now);
                        self.runs.append_step_result(&result).await?;
                        return Ok(StepFlow::Advance);
                    }
                    Ok(_) => {}
                    Err(error) => {
                        let message = format!("freshness check failed: {error}");
                        let result =
                            failed_result(run, step, attempt_number, message.clone(), now);
                        self.runs.append_step_result(&result).await?;
                        return Ok(StepFlow::RunFailed(message));
                    }
                }
            }
        }

        let Some(routed) = self.router.resolve_operation(&step.operation_id) else {
            let message = format!("unknown operation: {}", step.operation_id);
            let mut result = failed_result(run, step, attempt_number, message.clone(), now);
            result.error_message =
                Some(format!("{}: {message}", error_codes::UNKNOWN_OPERATION));
            self.runs.append_step_result(&result).await?;
            return Ok(StepFlow::RunFailed(message));
        };

        let input_payload = step_input_payload(run, step);
        let envelope = self.invoke_executor(run, step, &routed).await;

        let mut status = StepStatus::from(envelope.status);
        let mut error_message = envelope.error_message();
        let mut skip_reason = envelope
            .provider_attempts
            .iter()
            .find_map(|attempt| attempt.skip_reason.clone())
            .filter(|_| envelope.status == OperationStatus::Skipped);
        let mut children_spawned = None;
        let mut skipped_duplicates_count = None;
        let mut skipped_duplicate_identifiers = Vec::new();
        let mut flow = StepFlow::Advance;

        if !envelope.status.is_fatal() {
            if let Some(output) = &envelope.output {
                run.cumulative_context.merge_deep(output);
            }

            if let Some(entity_type) = routed.spec.entity_type {
                let request = UpsertRequest {
                    org_id: run.org_id,
                    company_id: run.company_id,
                    entity_type,
                    canonical_fields: run.cumulative_context.clone(),
                    entity_id: None,
                    last_operation_id: Some(step.operation_id.clone()),
                    last_run_id: Some(run.run_id),
                    incoming_record_version: None,
                };
                match self.entity_state.upsert(request, now).await {
                    Ok(_) => {}
                    Err(EntityStateError::VersionConflict(message)) => {
                        status = StepStatus::Failed;
                        error_message =
                            Some(format!("{}: {message}", error_codes::VERSION_CONFLICT));
                    }
                    Err(EntityStateError::Store(error)) => {
                        status = StepStatus::Failed;
                        error_message =
                            Some(format!("{}: {error}", error_codes::ENTITY_STATE_ERROR));
                    }
                }
            }

            if status != StepStatus::Failed
                && step.fan_out
                && !routed.spec.fan_out_collections.is_empty()
                && let Some(output) = &envelope.output
            {
                if run.fan_out_depth.saturating_add(1) > self.config.max_fan_out_depth {
                    status = StepStatus::Skipped;
                    skip_reason = Some("fan_out_depth_exceeded".to_string());
                    children_spawned = Some(0);
                    flow = StepFlow::FannedOut(Vec::new());
                } else {
                    let expansion = expand_collections(output, &routed.spec.fan_out_collections);
                    if expansion.collection_key.is_some() {
                        let outcome = dedup_fan_out(expansion.entities);
                        let mut children = Vec::with_capacity(outcome.unique.len());
                        for child_entity in outcome.unique {
                            let mut child_context = run.cumulative_context.clone();
                            child_context.merge_deep(&child_entity.fields);
                            let mut child_input = child_entity.fields;
                            child_input.insert(
                                "entity_type",
                                ContextValue::from(child_entity.entity_type.as_str()),
                            );
                            let child = PipelineRun {
                                run_id: PipelineRunId::generate(),
                                org_id: run.org_id,
                                company_id: run.company_id,
                                submission_id: run.submission_id,
                                parent_run_id: Some(run.run_id),
                                trigger_run_id: None,
                                blueprint_snapshot: run.blueprint_snapshot.clone(),
                                entity_input: child_input,
                                cumulative_context: child_context,
                                current_position: position.saturating_add(1),
                                fan_out_depth: run.fan_out_depth.saturating_add(1),
                                entity_index: run.entity_index,
                                status: RunStatus::Queued,
                                error_message: None,
                                created_at: now,
                                updated_at: now,
                            };
                            self.runs.create_pipeline_run(&child).await?;
                            children.push(child);
                        }
                        children_spawned = Some(u32::try_from(children.len()).unwrap_or(u32::MAX));
                        skipped_duplicates_count = Some(outcome.skipped_duplicates_count);
                        skipped_duplicate_identifiers = outcome.skipped_duplicate_identifiers;
                        flow = StepFlow::FannedOut(children);
                    }
                }
            }
        }

        let result = StepResult {
            run_id: run.run_id,
            position,
            attempt_number,
            operation_id: step.operation_id.clone(),
            status,
            input_payload: Some(input_payload),
            output_payload: envelope.output.clone(),
            provider_attempts: envelope.provider_attempts.clone(),
            error_message: error_message.clone(),
            skip_reason,
            children_spawned,
            skipped_duplicates_count,
            skipped_duplicate_identifiers,
            recorded_at: now,
        };
        self.runs.append_step_result(&result).await?;

        if status == StepStatus::Failed {
            return Ok(StepFlow::RunFailed(
                error_message.unwrap_or_else(|| format!("step {position} failed")),
            ));
        }
        Ok(flow)
    }

    /// Invokes the executor under its declared timeout, normalizing a
    /// timeout into a failed envelope.
    async fn invoke_executor(
        &self,
        run: &PipelineRun,
        step: &BlueprintStep,
        routed: &RoutedOperation,
    ) -> OperationEnvelope {
        let mut direct = step.step_config.clone();
        direct.insert("org_id", ContextValue::from(run.org_id.to_string()));
        let input = OperationInput {
            operation_id: step.operation_id.clone(),
            direct,
            cumulative_context: run.cumulative_context.clone(),
            step_config: step.step_config.clone(),
        };
        let timeout_ms = if routed.spec.timeout_ms == 0 {
            self.config.default_step_timeout_ms
        } else {
            routed.spec.timeout_ms
        };
        let deadline = Duration::from_millis(timeout_ms);
        match tokio::time::timeout(deadline, routed.executor.execute(&input)).await {
            Ok(envelope) => envelope,
            Err(_) => OperationEnvelope::failed(
                step.operation_id.clone(),
                OperationError::new(
                    error_codes::TIMEOUT,
                    format!("operation timed out after {timeout_ms}ms"),
                ),
                vec![ProviderAttempt::failed(
                    step.operation_id.family().unwrap_or("runtime"),
                    "execute",
                    "timeout",
                )],
            ),
        }
    }

    /// Dispatches fan-out children after the parent's terminal state write.
    async fn dispatch_children(&self, children: Vec<PipelineRun>) -> Result<(), EngineError> {
        for mut child in children {
            self.dispatch_run(&mut child).await?;
        }
        Ok(())
    }

    /// Writes a run's terminal state and rolls the submission status up.
    async fn finish_run(
        &self,
        mut run: PipelineRun,
        status: RunStatus,
        error_message: Option<String>,
    ) -> Result<RunStatus, EngineError> {
        run.status = status;
        run.error_message = error_message;
        run.updated_at = Timestamp::now_utc();
        self.runs.save_pipeline_run(&run).await?;
        tracing::info!(run_id = %run.run_id, status = ?status, "run terminal");
        self.rollup_submission(&run.submission_id).await?;
        Ok(status)
    }

    /// Returns true when the run's submission has cancellation requested.
    async fn submission_cancelled(
        &self,
        submission_id: &SubmissionId,
    ) -> Result<bool, EngineError> {
        Ok(self
            .runs
            .load_submission(submission_id)
            .await?
            .is_some_and(|submission| submission.cancel_requested))
    }

    /// Recomputes submission status once every run is terminal.
    async fn rollup_submission(&self, submission_id: &SubmissionId) -> Result<(), EngineError> {
        let runs = self.runs.list_runs_for_submission(submission_id).await?;
        let summary = SubmissionSummary::tally(runs.iter().map(|run| run.status));
        if !summary.all_terminal() {
            return Ok(());
        }
        let Some(submission) = self.runs.load_submission(submission_id).await? else {
            return Ok(());
        };
        let final_status = if submission.cancel_requested {
            SubmissionStatus::Cancelled
        } else if summary.failed > 0 {
            SubmissionStatus::Failed
        } else {
            SubmissionStatus::Completed
        };
        if submission.status != final_status {
            self.runs
                .update_submission_status(submission_id, final_status, Timestamp::now_utc())
                .await?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Status queries
    // ------------------------------------------------------------------

    /// Computes the batch status report for a submission at query time.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SubmissionNotFound`] when the submission does
    /// not exist.
    pub async fn batch_status(
        &self,
        submission_id: &SubmissionId,
    ) -> Result<BatchStatus, EngineError> {
        let Some(submission) = self.runs.load_submission(submission_id).await? else {
            return Err(EngineError::SubmissionNotFound(*submission_id));
        };
        let mut runs = self.runs.list_runs_for_submission(submission_id).await?;
        runs.sort_by(|a, b| {
            a.entity_index
                .cmp(&b.entity_index)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.run_id.cmp(&b.run_id))
        });
        let summary = SubmissionSummary::tally(runs.iter().map(|run| run.status));
        let rows = runs
            .iter()
            .map(|run| RunStatusRow {
                entity_index: run.entity_index,
                entity_type: run.seed_entity_type(),
                pipeline_run_id: run.run_id,
                status: run.status,
                error_message: run.error_message.clone(),
            })
            .collect();
        Ok(BatchStatus {
            submission_id: *submission_id,
            status: submission.status,
            summary,
            runs: rows,
        })
    }

    /// Requests cancellation of a submission; in-flight runs stop at their
    /// next step boundary.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SubmissionNotFound`] when the submission does
    /// not exist.
    pub async fn cancel_submission(
        &self,
        submission_id: &SubmissionId,
    ) -> Result<(), EngineError> {
        if self.runs.load_submission(submission_id).await?.is_none() {
            return Err(EngineError::SubmissionNotFound(*submission_id));
        }
        self.runs.request_cancellation(submission_id, Timestamp::now_utc()).await?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Step Result Builders
// ============================================================================

/// Builds the recorded input payload: step config plus the cumulative context.
fn step_input_payload(run: &PipelineRun, step: &BlueprintStep) -> ContextMap {
    let mut payload = step.step_config.clone();
    payload.insert("cumulative_context", ContextValue::Map(run.cumulative_context.clone()));
    payload
}

/// Builds a skipped step result row.
fn skipped_result(
    run: &PipelineRun,
    step: &BlueprintStep,
    attempt_number: u32,
    skip_reason: &str,
    now: Timestamp,
) -> StepResult {
    StepResult {
        run_id: run.run_id,
        position: step.position.get(),
        attempt_number,
        operation_id: step.operation_id.clone(),
        status: StepStatus::Skipped,
        input_payload: None,
        output_payload: None,
        provider_attempts: Vec::new(),
        error_message: None,
        skip_reason: Some(skip_reason.to_string()),
        children_spawned: None,
        skipped_duplicates_count: None,
        skipped_duplicate_identifiers: Vec::new(),
        recorded_at: now,
    }
}

/// Builds a failed step result row.
fn failed_result(
    run: &PipelineRun,
    step: &BlueprintStep,
    attempt_number: u32,
    message: String,
    now: Timestamp,
) -> StepResult {
    StepResult {
        run_id: run.run_id,
        position: step.position.get(),
        attempt_number,
        operation_id: step.operation_id.clone(),
        status: StepStatus::Failed,
        input_payload: Some(step_input_payload(run, step)),
        output_payload: None,
        provider_attempts: Vec::new(),
        error_message: Some(message),
        skip_reason: None,
        children_spawned: None,
        skipped_duplicates_count: None,
        skipped_duplicate_identifiers: Vec::new(),
        recorded_at: now,
    }
}

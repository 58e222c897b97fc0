// crates/waterline-core/src/interfaces/mod.rs
// ============================================================================
// Module: Waterline Interfaces
// Description: Backend-agnostic interfaces for storage, dispatch, and operations.
// Purpose: Define the contract surfaces used by the Waterline runtime.
// Dependencies: crate::core, async-trait, serde, thiserror
// ============================================================================

//! ## Overview
//! Interfaces define how the runtime integrates with its collaborators (the
//! row-oriented datastore, the external task runner, and the operation
//! registry) without embedding backend-specific details. Every method that
//! touches external state is async so the scheduler can advance other runs
//! while I/O is in flight.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::Blueprint;
use crate::core::BlueprintId;
use crate::core::CompanyId;
use crate::core::ContextMap;
use crate::core::EntityId;
use crate::core::EntityRecord;
use crate::core::EntitySnapshot;
use crate::core::EntityType;
use crate::core::NaturalKey;
use crate::core::OperationEnvelope;
use crate::core::OperationId;
use crate::core::OrgId;
use crate::core::PipelineRun;
use crate::core::PipelineRunId;
use crate::core::StepResult;
use crate::core::Submission;
use crate::core::SubmissionId;
use crate::core::SubmissionStatus;
use crate::core::TaskId;
use crate::core::Timestamp;

// ============================================================================
// SECTION: Pagination
// ============================================================================

/// Page request with clamped bounds for entity listings.
///
/// # Invariants
/// - `page` is 1-based; `per_page` clamps to 1..=100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// 1-based page number.
    pub page: u32,
    /// Rows per page.
    pub per_page: u32,
}

impl PageRequest {
    /// Maximum rows per page.
    pub const MAX_PER_PAGE: u32 = 100;

    /// Creates a clamped page request.
    #[must_use]
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, Self::MAX_PER_PAGE),
        }
    }

    /// Returns the row offset for this page.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        (self.page as u64).saturating_sub(1).saturating_mul(self.per_page as u64)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, 50)
    }
}

/// One page of entity rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityPage {
    /// Rows on this page.
    pub records: Vec<EntityRecord>,
    /// Total matching rows.
    pub total: u64,
    /// 1-based page number served.
    pub page: u32,
    /// Rows per page served.
    pub per_page: u32,
    /// Total pages for the query.
    pub total_pages: u64,
}

impl EntityPage {
    /// Assembles a page from rows and totals.
    #[must_use]
    pub fn assemble(records: Vec<EntityRecord>, total: u64, request: PageRequest) -> Self {
        let per_page = u64::from(request.per_page).max(1);
        let total_pages = total.div_ceil(per_page);
        Self {
            records,
            total,
            page: request.page,
            per_page: request.per_page,
            total_pages,
        }
    }
}

// ============================================================================
// SECTION: Entity Table Store
// ============================================================================

/// Entity store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum EntityStoreError {
    /// Store I/O error.
    #[error("entity store io error: {0}")]
    Io(String),
    /// Store data is invalid.
    #[error("entity store invalid data: {0}")]
    Invalid(String),
    /// Store reported an error.
    #[error("entity store error: {0}")]
    Store(String),
}

/// Row-oriented datastore surface for canonical entities and snapshots.
///
/// Implementations provide primitive row operations only; merge and version
/// logic lives in the runtime's entity state service.
#[async_trait]
pub trait EntityTableStore: Send + Sync {
    /// Loads an entity row by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`EntityStoreError`] when the load fails.
    async fn load_entity(
        &self,
        org_id: &OrgId,
        entity_type: EntityType,
        entity_id: &EntityId,
    ) -> Result<Option<EntityRecord>, EntityStoreError>;

    /// Looks an entity up by a projected natural-key column.
    ///
    /// # Errors
    ///
    /// Returns [`EntityStoreError`] when the lookup fails.
    async fn lookup_by_natural_key(
        &self,
        org_id: &OrgId,
        key: &NaturalKey,
    ) -> Result<Option<EntityRecord>, EntityStoreError>;

    /// Inserts a new entity row.
    ///
    /// # Errors
    ///
    /// Returns [`EntityStoreError`] when the insert fails.
    async fn insert_entity(&self, record: &EntityRecord) -> Result<(), EntityStoreError>;

    /// Conditionally updates an entity row where `record_version` matches
    /// `expected_version`, returning the number of affected rows.
    ///
    /// # Errors
    ///
    /// Returns [`EntityStoreError`] when the update fails.
    async fn update_entity_versioned(
        &self,
        record: &EntityRecord,
        expected_version: u32,
    ) -> Result<u64, EntityStoreError>;

    /// Appends an immutable entity snapshot row.
    ///
    /// # Errors
    ///
    /// Returns [`EntityStoreError`] when the append fails.
    async fn append_snapshot(&self, snapshot: &EntitySnapshot) -> Result<(), EntityStoreError>;

    /// Returns the most recent snapshots for an entity, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`EntityStoreError`] when the query fails.
    async fn recent_snapshots(
        &self,
        org_id: &OrgId,
        entity_type: EntityType,
        entity_id: &EntityId,
        limit: usize,
    ) -> Result<Vec<EntitySnapshot>, EntityStoreError>;

    /// Lists entity rows for a tenant with pagination.
    ///
    /// # Errors
    ///
    /// Returns [`EntityStoreError`] when the query fails.
    async fn list_entities(
        &self,
        org_id: &OrgId,
        entity_type: EntityType,
        company_id: Option<&CompanyId>,
        page: PageRequest,
    ) -> Result<EntityPage, EntityStoreError>;
}

#[async_trait]
impl<T: EntityTableStore + ?Sized> EntityTableStore for Arc<T> {
    async fn load_entity(
        &self,
        org_id: &OrgId,
        entity_type: EntityType,
        entity_id: &EntityId,
    ) -> Result<Option<EntityRecord>, EntityStoreError> {
        (**self).load_entity(org_id, entity_type, entity_id).await
    }

    async fn lookup_by_natural_key(
        &self,
        org_id: &OrgId,
        key: &NaturalKey,
    ) -> Result<Option<EntityRecord>, EntityStoreError> {
        (**self).lookup_by_natural_key(org_id, key).await
    }

    async fn insert_entity(&self, record: &EntityRecord) -> Result<(), EntityStoreError> {
        (**self).insert_entity(record).await
    }

    async fn update_entity_versioned(
        &self,
        record: &EntityRecord,
        expected_version: u32,
    ) -> Result<u64, EntityStoreError> {
        (**self).update_entity_versioned(record, expected_version).await
    }

    async fn append_snapshot(&self, snapshot: &EntitySnapshot) -> Result<(), EntityStoreError> {
        (**self).append_snapshot(snapshot).await
    }

    async fn recent_snapshots(
        &self,
        org_id: &OrgId,
        entity_type: EntityType,
        entity_id: &EntityId,
        limit: usize,
    ) -> Result<Vec<EntitySnapshot>, EntityStoreError> {
        (**self).recent_snapshots(org_id, entity_type, entity_id, limit).await
    }

    async fn list_entities(
        &self,
        org_id: &OrgId,
        entity_type: EntityType,
        company_id: Option<&CompanyId>,
        page: PageRequest,
    ) -> Result<EntityPage, EntityStoreError> {
        (**self).list_entities(org_id, entity_type, company_id, page).await
    }
}

// ============================================================================
// SECTION: Run Store
// ============================================================================

/// Run store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum RunStoreError {
    /// Store I/O error.
    #[error("run store io error: {0}")]
    Io(String),
    /// Referenced row does not exist.
    #[error("run store row not found: {0}")]
    NotFound(String),
    /// Store data is invalid.
    #[error("run store invalid data: {0}")]
    Invalid(String),
    /// Store reported an error.
    #[error("run store error: {0}")]
    Store(String),
}

/// Row-oriented datastore surface for blueprints, submissions, runs, and
/// step results.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Persists a blueprint row (insert or replace).
    ///
    /// # Errors
    ///
    /// Returns [`RunStoreError`] when the write fails.
    async fn save_blueprint(&self, blueprint: &Blueprint) -> Result<(), RunStoreError>;

    /// Loads a blueprint row scoped to its tenant.
    ///
    /// # Errors
    ///
    /// Returns [`RunStoreError`] when the load fails.
    async fn load_blueprint(
        &self,
        org_id: &OrgId,
        blueprint_id: &BlueprintId,
    ) -> Result<Option<Blueprint>, RunStoreError>;

    /// Inserts a submission row.
    ///
    /// # Errors
    ///
    /// Returns [`RunStoreError`] when the insert fails.
    async fn create_submission(&self, submission: &Submission) -> Result<(), RunStoreError>;

    /// Loads a submission row.
    ///
    /// # Errors
    ///
    /// Returns [`RunStoreError`] when the load fails.
    async fn load_submission(
        &self,
        submission_id: &SubmissionId,
    ) -> Result<Option<Submission>, RunStoreError>;

    /// Updates a submission's lifecycle status.
    ///
    /// # Errors
    ///
    /// Returns [`RunStoreError`] when the update fails.
    async fn update_submission_status(
        &self,
        submission_id: &SubmissionId,
        status: SubmissionStatus,
        updated_at: Timestamp,
    ) -> Result<(), RunStoreError>;

    /// Marks a submission as cancellation-requested.
    ///
    /// # Errors
    ///
    /// Returns [`RunStoreError`] when the update fails.
    async fn request_cancellation(
        &self,
        submission_id: &SubmissionId,
        updated_at: Timestamp,
    ) -> Result<(), RunStoreError>;

    /// Inserts a pipeline run row.
    ///
    /// # Errors
    ///
    /// Returns [`RunStoreError`] when the insert fails.
    async fn create_pipeline_run(&self, run: &PipelineRun) -> Result<(), RunStoreError>;

    /// Loads a pipeline run row.
    ///
    /// # Errors
    ///
    /// Returns [`RunStoreError`] when the load fails.
    async fn load_pipeline_run(
        &self,
        run_id: &PipelineRunId,
    ) -> Result<Option<PipelineRun>, RunStoreError>;

    /// Replaces a pipeline run row with its updated state.
    ///
    /// # Errors
    ///
    /// Returns [`RunStoreError`] when the write fails.
    async fn save_pipeline_run(&self, run: &PipelineRun) -> Result<(), RunStoreError>;

    /// Lists every pipeline run for a submission.
    ///
    /// # Errors
    ///
    /// Returns [`RunStoreError`] when the query fails.
    async fn list_runs_for_submission(
        &self,
        submission_id: &SubmissionId,
    ) -> Result<Vec<PipelineRun>, RunStoreError>;

    /// Appends an immutable step result row.
    ///
    /// # Errors
    ///
    /// Returns [`RunStoreError`] when the append fails.
    async fn append_step_result(&self, result: &StepResult) -> Result<(), RunStoreError>;

    /// Counts recorded attempts for `(run_id, position)`.
    ///
    /// # Errors
    ///
    /// Returns [`RunStoreError`] when the query fails.
    async fn step_attempt_count(
        &self,
        run_id: &PipelineRunId,
        position: u32,
    ) -> Result<u32, RunStoreError>;

    /// Lists step results for a run in recording order.
    ///
    /// # Errors
    ///
    /// Returns [`RunStoreError`] when the query fails.
    async fn list_step_results(
        &self,
        run_id: &PipelineRunId,
    ) -> Result<Vec<StepResult>, RunStoreError>;
}

#[async_trait]
impl<T: RunStore + ?Sized> RunStore for Arc<T> {
    async fn save_blueprint(&self, blueprint: &Blueprint) -> Result<(), RunStoreError> {
        (**self).save_blueprint(blueprint).await
    }

    async fn load_blueprint(
        &self,
        org_id: &OrgId,
        blueprint_id: &BlueprintId,
    ) -> Result<Option<Blueprint>, RunStoreError> {
        (**self).load_blueprint(org_id, blueprint_id).await
    }

    async fn create_submission(&self, submission: &Submission) -> Result<(), RunStoreError> {
        (**self).create_submission(submission).await
    }

    async fn load_submission(
        &self,
        submission_id: &SubmissionId,
    ) -> Result<Option<Submission>, RunStoreError> {
        (**self).load_submission(submission_id).await
    }

    async fn update_submission_status(
        &self,
        submission_id: &SubmissionId,
        status: SubmissionStatus,
        updated_at: Timestamp,
    ) -> Result<(), RunStoreError> {
        (**self).update_submission_status(submission_id, status, updated_at).await
    }

    async fn request_cancellation(
        &self,
        submission_id: &SubmissionId,
        updated_at: Timestamp,
    ) -> Result<(), RunStoreError> {
        (**self).request_cancellation(submission_id, updated_at).await
    }

    async fn create_pipeline_run(&self, run: &PipelineRun) -> Result<(), RunStoreError> {
        (**self).create_pipeline_run(run).await
    }

    async fn load_pipeline_run(
        &self,
        run_id: &PipelineRunId,
    ) -> Result<Option<PipelineRun>, RunStoreError> {
        (**self).load_pipeline_run(run_id).await
    }

    async fn save_pipeline_run(&self, run: &PipelineRun) -> Result<(), RunStoreError> {
        (**self).save_pipeline_run(run).await
    }

    async fn list_runs_for_submission(
        &self,
        submission_id: &SubmissionId,
    ) -> Result<Vec<PipelineRun>, RunStoreError> {
        (**self).list_runs_for_submission(submission_id).await
    }

    async fn append_step_result(&self, result: &StepResult) -> Result<(), RunStoreError> {
        (**self).append_step_result(result).await
    }

    async fn step_attempt_count(
        &self,
        run_id: &PipelineRunId,
        position: u32,
    ) -> Result<u32, RunStoreError> {
        (**self).step_attempt_count(run_id, position).await
    }

    async fn list_step_results(
        &self,
        run_id: &PipelineRunId,
    ) -> Result<Vec<StepResult>, RunStoreError> {
        (**self).list_step_results(run_id).await
    }
}

// ============================================================================
// SECTION: Task Dispatcher
// ============================================================================

/// Dispatch errors for run tasks.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Dispatcher reported an error.
    #[error("dispatch error: {0}")]
    DispatchFailed(String),
}

/// Task payload dispatched to the external task runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTask {
    /// Task identifier for idempotency at the runner.
    pub task_id: TaskId,
    /// Pipeline run to execute.
    pub run_id: PipelineRunId,
    /// Owning tenant.
    pub org_id: OrgId,
    /// Submission the run belongs to.
    pub submission_id: SubmissionId,
}

/// Receipt returned by the task runner for a dispatched task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskReceipt {
    /// Echoed task identifier.
    pub task_id: TaskId,
    /// Runner-side run handle, when the runner assigns one.
    pub runner_run_id: Option<TaskId>,
    /// Acceptance timestamp.
    pub accepted_at: Timestamp,
}

/// Fire-and-forget dispatcher that hands run tasks to the external runner.
///
/// The runner provides no ordering or exactly-once guarantee; the runtime
/// tolerates duplicate dispatches by making step advancement idempotent.
#[async_trait]
pub trait TaskDispatcher: Send + Sync {
    /// Dispatches a run task.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] when the runner rejects the task.
    async fn dispatch(&self, task: &RunTask) -> Result<TaskReceipt, DispatchError>;
}

#[async_trait]
impl<T: TaskDispatcher + ?Sized> TaskDispatcher for Arc<T> {
    async fn dispatch(&self, task: &RunTask) -> Result<TaskReceipt, DispatchError> {
        (**self).dispatch(task).await
    }
}

// ============================================================================
// SECTION: Operation Executor
// ============================================================================

/// Input handed to an operation executor.
///
/// Parameter resolution searches `direct`, then `cumulative_context`, then
/// `step_config`, in that order. The runtime seeds `direct` with the step
/// configuration plus runtime-provided keys (`org_id`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationInput {
    /// Operation being executed.
    pub operation_id: OperationId,
    /// Direct input keys.
    pub direct: ContextMap,
    /// Cumulative context of the pipeline run.
    pub cumulative_context: ContextMap,
    /// Static step configuration.
    pub step_config: ContextMap,
}

/// Polymorphic operation executor: takes an input map, returns an envelope.
///
/// Executors never raise for expected failure modes; everything normalizes
/// into the envelope.
#[async_trait]
pub trait OperationExecutor: Send + Sync {
    /// Executes the operation against its provider.
    async fn execute(&self, input: &OperationInput) -> OperationEnvelope;
}

// ============================================================================
// SECTION: Operation Router
// ============================================================================

/// Binding from a fan-out collection key to the entity type it yields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionBinding {
    /// Output key holding the collection (e.g. `results`, `customers`).
    pub key: String,
    /// Entity type of the collection elements.
    pub entity_type: EntityType,
}

/// Registry metadata for one operation.
///
/// # Invariants
/// - `timeout_ms` bounds the executor call wall-clock time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationSpec {
    /// Operation identifier.
    pub operation_id: OperationId,
    /// Entity type the operation primarily produces, when any.
    pub entity_type: Option<EntityType>,
    /// Collection keys this operation may fan out on, in probe order.
    #[serde(default)]
    pub fan_out_collections: Vec<CollectionBinding>,
    /// Executor timeout in milliseconds.
    pub timeout_ms: u64,
}

/// Routed operation: metadata plus a shared executor handle.
#[derive(Clone)]
pub struct RoutedOperation {
    /// Operation metadata.
    pub spec: OperationSpec,
    /// Executor implementation.
    pub executor: Arc<dyn OperationExecutor>,
}

/// Read-only lookup from operation identifier to executor and metadata.
///
/// Populated at process start; read-only afterwards.
pub trait OperationRouter: Send + Sync {
    /// Resolves an operation identifier, when registered.
    fn resolve_operation(&self, operation_id: &OperationId) -> Option<RoutedOperation>;
}

impl<T: OperationRouter + ?Sized> OperationRouter for Arc<T> {
    fn resolve_operation(&self, operation_id: &OperationId) -> Option<RoutedOperation> {
        (**self).resolve_operation(operation_id)
    }
}

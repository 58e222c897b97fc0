// crates/waterline-core/src/core/run.rs
// ============================================================================
// Module: Waterline Run Records
// Description: Pipeline runs, step results, submissions, and status rollups.
// Purpose: Capture the per-entity run state machine and its append-only results.
// Dependencies: crate::core::{blueprint, context, entity, envelope, identifiers, time}
// ============================================================================

//! ## Overview
//! A pipeline run is one end-to-end traversal of a blueprint snapshot for one
//! entity. Step results are append-only and carry an attempt number so that
//! duplicate dispatches from the external task runner stay idempotent on
//! `(run_id, position, attempt_number)`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::blueprint::BlueprintSnapshot;
use crate::core::context::ContextMap;
use crate::core::entity::EntityType;
use crate::core::envelope::OperationStatus;
use crate::core::envelope::ProviderAttempt;
use crate::core::identifiers::BlueprintId;
use crate::core::identifiers::CompanyId;
use crate::core::identifiers::OperationId;
use crate::core::identifiers::OrgId;
use crate::core::identifiers::PipelineRunId;
use crate::core::identifiers::SubmissionId;
use crate::core::identifiers::TaskId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Run Status
// ============================================================================

/// Pipeline run lifecycle status.
///
/// # Invariants
/// - Once terminal, a run is never re-opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Created, awaiting execution.
    Queued,
    /// Currently executing steps.
    Running,
    /// All steps completed (or terminated at a fan-out position).
    Succeeded,
    /// A step failed fatally or runtime I/O failed.
    Failed,
    /// Stopped without executing (cancelled submission).
    Skipped,
}

impl RunStatus {
    /// Returns true when the status is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }
}

/// Step outcome status recorded per step result.
///
/// # Invariants
/// - Variants are stable for serialization and status rollups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Created, awaiting execution.
    Queued,
    /// Currently executing.
    Running,
    /// Provider responded with records.
    Succeeded,
    /// Provider responded with no records.
    NotFound,
    /// Provider call or validation failed.
    Failed,
    /// Step did not call its provider.
    Skipped,
}

impl From<OperationStatus> for StepStatus {
    fn from(status: OperationStatus) -> Self {
        match status {
            OperationStatus::Found => Self::Succeeded,
            OperationStatus::NotFound => Self::NotFound,
            OperationStatus::Failed => Self::Failed,
            OperationStatus::Skipped => Self::Skipped,
        }
    }
}

// ============================================================================
// SECTION: Pipeline Run
// ============================================================================

/// One end-to-end traversal of a blueprint snapshot for one entity.
///
/// # Invariants
/// - `blueprint_snapshot` never changes after creation.
/// - `current_position` only moves forward.
/// - A child run references a parent within the same org and submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    /// Run identifier.
    pub run_id: PipelineRunId,
    /// Owning tenant.
    pub org_id: OrgId,
    /// Workspace company the batch belongs to, when known.
    pub company_id: Option<CompanyId>,
    /// Submission this run belongs to.
    pub submission_id: SubmissionId,
    /// Parent run when this run was spawned by a fan-out step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_run_id: Option<PipelineRunId>,
    /// External task-runner handle for the dispatched task, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_run_id: Option<TaskId>,
    /// Value copy of the blueprint at submission time.
    pub blueprint_snapshot: BlueprintSnapshot,
    /// Seed entity fields this run started from.
    pub entity_input: ContextMap,
    /// Growing map of merged step outputs.
    pub cumulative_context: ContextMap,
    /// 1-based position of the next step to execute.
    pub current_position: u32,
    /// Fan-out generation depth (0 for submission-created parents).
    pub fan_out_depth: u32,
    /// Index of the seed entity within its submission.
    pub entity_index: u32,
    /// Lifecycle status.
    pub status: RunStatus,
    /// Error description for failed runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Creation timestamp.
    pub created_at: Timestamp,
    /// Last update timestamp.
    pub updated_at: Timestamp,
}

impl PipelineRun {
    /// Returns the declared entity type of the seed entity, when present.
    #[must_use]
    pub fn seed_entity_type(&self) -> Option<EntityType> {
        self.entity_input.get_text("entity_type").and_then(EntityType::parse)
    }
}

// ============================================================================
// SECTION: Step Results
// ============================================================================

/// Outcome of one step attempt within one pipeline run.
///
/// # Invariants
/// - Rows are append-only; `(run_id, position, attempt_number)` is unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// Owning pipeline run.
    pub run_id: PipelineRunId,
    /// 1-based step position.
    pub position: u32,
    /// 1-based attempt number for idempotent re-dispatch.
    pub attempt_number: u32,
    /// Operation executed at this step.
    pub operation_id: OperationId,
    /// Step outcome.
    pub status: StepStatus,
    /// Input payload handed to the executor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_payload: Option<ContextMap>,
    /// Mapped output payload from the envelope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_payload: Option<ContextMap>,
    /// Per-provider attempt telemetry.
    #[serde(default)]
    pub provider_attempts: Vec<ProviderAttempt>,
    /// Error description for failed steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Reason for skipped steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    /// Number of child runs spawned by a fan-out step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children_spawned: Option<u32>,
    /// Number of fan-out entities dropped as in-batch duplicates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped_duplicates_count: Option<u32>,
    /// Dedup keys of the dropped duplicates.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_duplicate_identifiers: Vec<String>,
    /// Timestamp the result row was recorded.
    pub recorded_at: Timestamp,
}

// ============================================================================
// SECTION: Submissions
// ============================================================================

/// Submission lifecycle status.
///
/// # Invariants
/// - Terminal once every pipeline run in the batch is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    /// Accepted, runs not yet dispatched.
    Pending,
    /// Runs dispatched and executing.
    Processing,
    /// Every run terminal with no failures.
    Completed,
    /// Every run terminal with at least one failure.
    Failed,
    /// Cancellation requested and honored.
    Cancelled,
}

/// A submitted batch of seed entities bound to a blueprint.
///
/// # Invariants
/// - `entities` is the batch as submitted; runs are created one per entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    /// Submission identifier.
    pub submission_id: SubmissionId,
    /// Owning tenant.
    pub org_id: OrgId,
    /// Workspace company the batch belongs to.
    pub company_id: CompanyId,
    /// Blueprint the batch executes.
    pub blueprint_id: BlueprintId,
    /// Seed entities as submitted.
    pub entities: Vec<ContextMap>,
    /// Lifecycle status.
    pub status: SubmissionStatus,
    /// Whether cancellation has been requested.
    #[serde(default)]
    pub cancel_requested: bool,
    /// Creation timestamp.
    pub created_at: Timestamp,
    /// Last update timestamp.
    pub updated_at: Timestamp,
}

// ============================================================================
// SECTION: Batch Status
// ============================================================================

/// Per-state run counts for one submission.
///
/// # Invariants
/// - `total` equals the sum of the per-state counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionSummary {
    /// Total pipeline runs in the batch.
    pub total: u32,
    /// Runs that succeeded.
    pub completed: u32,
    /// Runs that failed.
    pub failed: u32,
    /// Runs currently executing.
    pub running: u32,
    /// Runs still queued.
    pub pending: u32,
    /// Runs stopped without executing.
    pub skipped: u32,
}

impl SubmissionSummary {
    /// Tallies run statuses into a summary.
    #[must_use]
    pub fn tally(statuses: impl IntoIterator<Item = RunStatus>) -> Self {
        let mut summary = Self::default();
        for status in statuses {
            summary.total = summary.total.saturating_add(1);
            match status {
                RunStatus::Queued => summary.pending = summary.pending.saturating_add(1),
                RunStatus::Running => summary.running = summary.running.saturating_add(1),
                RunStatus::Succeeded => summary.completed = summary.completed.saturating_add(1),
                RunStatus::Failed => summary.failed = summary.failed.saturating_add(1),
                RunStatus::Skipped => summary.skipped = summary.skipped.saturating_add(1),
            }
        }
        summary
    }

    /// Returns true when every run in the batch is terminal.
    #[must_use]
    pub const fn all_terminal(&self) -> bool {
        self.pending == 0 && self.running == 0
    }
}

/// One run row in a batch status report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatusRow {
    /// Index of the seed entity within the submission.
    pub entity_index: u32,
    /// Declared entity type of the seed, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<EntityType>,
    /// Pipeline run identifier.
    pub pipeline_run_id: PipelineRunId,
    /// Current run status.
    pub status: RunStatus,
    /// Error description for failed runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Batch status report computed at query time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchStatus {
    /// Submission identifier.
    pub submission_id: SubmissionId,
    /// Submission lifecycle status.
    pub status: SubmissionStatus,
    /// Per-state run counts.
    pub summary: SubmissionSummary,
    /// Per-run rows ordered by entity index, parents before children.
    pub runs: Vec<RunStatusRow>,
}

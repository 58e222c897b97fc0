// crates/waterline-core/src/runtime/store.rs
// ============================================================================
// Module: Waterline In-Memory Stores
// Description: In-memory entity and run stores for tests and examples.
// Purpose: Provide deterministic store implementations without external deps.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Simple in-memory implementations of the datastore collaborator traits for
//! tests and local demos. Not intended for production use; the conditional
//! version update is serialized by a mutex rather than a database.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::Blueprint;
use crate::core::BlueprintId;
use crate::core::CompanyId;
use crate::core::EntityId;
use crate::core::EntityProjection;
use crate::core::EntityRecord;
use crate::core::EntitySnapshot;
use crate::core::EntityType;
use crate::core::NaturalKey;
use crate::core::OrgId;
use crate::core::PipelineRun;
use crate::core::PipelineRunId;
use crate::core::StepResult;
use crate::core::Submission;
use crate::core::SubmissionId;
use crate::core::SubmissionStatus;
use crate::core::Timestamp;
use crate::interfaces::EntityPage;
use crate::interfaces::EntityStoreError;
use crate::interfaces::EntityTableStore;
use crate::interfaces::PageRequest;
use crate::interfaces::RunStore;
use crate::interfaces::RunStoreError;

// ============================================================================
// SECTION: In-Memory Entity Store
// ============================================================================

/// Composite key for the in-memory entity table.
type EntityKey = (OrgId, EntityType, EntityId);

/// In-memory entity table store for tests and examples.
#[derive(Debug, Default, Clone)]
pub struct InMemoryEntityStore {
    /// Entity rows keyed by org, type, and id.
    entities: Arc<Mutex<BTreeMap<EntityKey, EntityRecord>>>,
    /// Append-only snapshot log.
    snapshots: Arc<Mutex<Vec<EntitySnapshot>>>,
    /// When true, snapshot appends fail (for snapshot-loss tests).
    fail_snapshots: Arc<Mutex<bool>>,
}

impl InMemoryEntityStore {
    /// Creates an empty in-memory entity store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent snapshot appends fail, to exercise the swallow path.
    pub fn fail_snapshot_writes(&self, fail: bool) {
        if let Ok(mut guard) = self.fail_snapshots.lock() {
            *guard = fail;
        }
    }

    /// Returns every stored snapshot in append order.
    #[must_use]
    pub fn all_snapshots(&self) -> Vec<EntitySnapshot> {
        self.snapshots.lock().map(|guard| guard.clone()).unwrap_or_default()
    }

    /// Locks the entity map, mapping poisoning to a store error.
    fn lock_entities(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, BTreeMap<EntityKey, EntityRecord>>, EntityStoreError>
    {
        self.entities
            .lock()
            .map_err(|_| EntityStoreError::Store("entity store mutex poisoned".to_string()))
    }
}

/// Returns true when the record's projection matches the natural key.
fn matches_natural_key(record: &EntityRecord, key: &NaturalKey) -> bool {
    match (&record.projection, key) {
        (EntityProjection::Company(fields), NaturalKey::CompanyDomain(domain)) => {
            fields.canonical_domain.as_deref() == Some(domain.as_str())
        }
        (EntityProjection::Company(fields), NaturalKey::CompanyLinkedin(url)) => {
            fields.linkedin_url.as_deref() == Some(url.as_str())
        }
        (EntityProjection::Person(fields), NaturalKey::PersonLinkedin(url)) => {
            fields.linkedin_url.as_deref() == Some(url.as_str())
        }
        (EntityProjection::Person(fields), NaturalKey::PersonEmail(email)) => {
            fields.work_email.as_deref() == Some(email.as_str())
        }
        (EntityProjection::Job(fields), NaturalKey::JobTheirstackId(job_id)) => {
            fields.theirstack_job_id == Some(*job_id)
        }
        _ => false,
    }
}

#[async_trait]
impl EntityTableStore for InMemoryEntityStore {
    async fn load_entity(
        &self,
        org_id: &OrgId,
        entity_type: EntityType,
        entity_id: &EntityId,
    ) -> Result<Option<EntityRecord>, EntityStoreError> {
        let guard = self.lock_entities()?;
        Ok(guard.get(&(*org_id, entity_type, *entity_id)).cloned())
    }

    async fn lookup_by_natural_key(
        &self,
        org_id: &OrgId,
        key: &NaturalKey,
    ) -> Result<Option<EntityRecord>, EntityStoreError> {
        let guard = self.lock_entities()?;
        Ok(guard
            .values()
            .find(|record| {
                record.org_id == *org_id
                    && record.entity_type() == key.entity_type()
                    && matches_natural_key(record, key)
            })
            .cloned())
    }

    async fn insert_entity(&self, record: &EntityRecord) -> Result<(), EntityStoreError> {
        let mut guard = self.lock_entities()?;
        let key = (record.org_id, record.entity_type(), record.entity_id);
        if guard.contains_key(&key) {
            return Err(EntityStoreError::Invalid(format!(
                "entity already exists: {}",
                record.entity_id
            )));
        }
        guard.insert(key, record.clone());
        Ok(())
    }

    async fn update_entity_versioned(
        &self,
        record: &EntityRecord,
        expected_version: u32,
    ) -> Result<u64, EntityStoreError> {
        let mut guard = self.lock_entities()?;
        let key = (record.org_id, record.entity_type(), record.entity_id);
        match guard.get(&key) {
            Some(existing) if existing.record_version == expected_version => {
                guard.insert(key, record.clone());
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn append_snapshot(&self, snapshot: &EntitySnapshot) -> Result<(), EntityStoreError> {
        let failing = self.fail_snapshots.lock().map(|guard| *guard).unwrap_or(false);
        if failing {
            return Err(EntityStoreError::Io("snapshot writes disabled".to_string()));
        }
        self.snapshots
            .lock()
            .map_err(|_| EntityStoreError::Store("snapshot store mutex poisoned".to_string()))?
            .push(snapshot.clone());
        Ok(())
    }

    async fn recent_snapshots(
        &self,
        org_id: &OrgId,
        entity_type: EntityType,
        entity_id: &EntityId,
        limit: usize,
    ) -> Result<Vec<EntitySnapshot>, EntityStoreError> {
        let guard = self
            .snapshots
            .lock()
            .map_err(|_| EntityStoreError::Store("snapshot store mutex poisoned".to_string()))?;
        let mut matching: Vec<EntitySnapshot> = guard
            .iter()
            .filter(|snapshot| {
                snapshot.org_id == *org_id
                    && snapshot.entity_type == entity_type
                    && snapshot.entity_id == *entity_id
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            b.captured_at
                .cmp(&a.captured_at)
                .then_with(|| b.record_version.cmp(&a.record_version))
        });
        matching.truncate(limit);
        Ok(matching)
    }

    async fn list_entities(
        &self,
        org_id: &OrgId,
        entity_type: EntityType,
        company_id: Option<&CompanyId>,
        page: PageRequest,
    ) -> Result<EntityPage, EntityStoreError> {
        let guard = self.lock_entities()?;
        let matching: Vec<EntityRecord> = guard
            .values()
            .filter(|record| {
                record.org_id == *org_id
                    && record.entity_type() == entity_type
                    && company_id.is_none_or(|company| record.company_id.as_ref() == Some(company))
            })
            .cloned()
            .collect();
        let total = u64::try_from(matching.len()).unwrap_or(u64::MAX);
        let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
        let records: Vec<EntityRecord> =
            matching.into_iter().skip(offset).take(page.per_page as usize).collect();
        Ok(EntityPage::assemble(records, total, page))
    }
}

// ============================================================================
// SECTION: In-Memory Run Store
// ============================================================================

/// In-memory run store for tests and examples.
#[derive(Debug, Default, Clone)]
pub struct InMemoryRunStore {
    /// Blueprint rows keyed by org and blueprint id.
    blueprints: Arc<Mutex<BTreeMap<(OrgId, BlueprintId), Blueprint>>>,
    /// Submission rows keyed by id.
    submissions: Arc<Mutex<BTreeMap<SubmissionId, Submission>>>,
    /// Pipeline run rows keyed by id.
    runs: Arc<Mutex<BTreeMap<PipelineRunId, PipelineRun>>>,
    /// Append-only step result log.
    step_results: Arc<Mutex<Vec<StepResult>>>,
}

impl InMemoryRunStore {
    /// Creates an empty in-memory run store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps a poisoned mutex to a run store error.
    fn poisoned() -> RunStoreError {
        RunStoreError::Store("run store mutex poisoned".to_string())
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn save_blueprint(&self, blueprint: &Blueprint) -> Result<(), RunStoreError> {
        self.blueprints
            .lock()
            .map_err(|_| Self::poisoned())?
            .insert((blueprint.org_id, blueprint.blueprint_id), blueprint.clone());
        Ok(())
    }

    async fn load_blueprint(
        &self,
        org_id: &OrgId,
        blueprint_id: &BlueprintId,
    ) -> Result<Option<Blueprint>, RunStoreError> {
        let guard = self.blueprints.lock().map_err(|_| Self::poisoned())?;
        Ok(guard.get(&(*org_id, *blueprint_id)).cloned())
    }

    async fn create_submission(&self, submission: &Submission) -> Result<(), RunStoreError> {
        self.submissions
            .lock()
            .map_err(|_| Self::poisoned())?
            .insert(submission.submission_id, submission.clone());
        Ok(())
    }

    async fn load_submission(
        &self,
        submission_id: &SubmissionId,
    ) -> Result<Option<Submission>, RunStoreError> {
        let guard = self.submissions.lock().map_err(|_| Self::poisoned())?;
        Ok(guard.get(submission_id).cloned())
    }

    async fn update_submission_status(
        &self,
        submission_id: &SubmissionId,
        status: SubmissionStatus,
        updated_at: Timestamp,
    ) -> Result<(), RunStoreError> {
        let mut guard = self.submissions.lock().map_err(|_| Self::poisoned())?;
        let submission = guard
            .get_mut(submission_id)
            .ok_or_else(|| RunStoreError::NotFound(submission_id.to_string()))?;
        submission.status = status;
        submission.updated_at = updated_at;
        Ok(())
    }

    async fn request_cancellation(
        &self,
        submission_id: &SubmissionId,
        updated_at: Timestamp,
    ) -> Result<(), RunStoreError> {
        let mut guard = self.submissions.lock().map_err(|_| Self::poisoned())?;
        let submission = guard
            .get_mut(submission_id)
            .ok_or_else(|| RunStoreError::NotFound(submission_id.to_string()))?;
        submission.cancel_requested = true;
        submission.updated_at = updated_at;
        Ok(())
    }

    async fn create_pipeline_run(&self, run: &PipelineRun) -> Result<(), RunStoreError> {
        self.runs.lock().map_err(|_| Self::poisoned())?.insert(run.run_id, run.clone());
        Ok(())
    }

    async fn load_pipeline_run(
        &self,
        run_id: &PipelineRunId,
    ) -> Result<Option<PipelineRun>, RunStoreError> {
        let guard = self.runs.lock().map_err(|_| Self::poisoned())?;
        Ok(guard.get(run_id).cloned())
    }

    async fn save_pipeline_run(&self, run: &PipelineRun) -> Result<(), RunStoreError> {
        self.runs.lock().map_err(|_| Self::poisoned())?.insert(run.run_id, run.clone());
        Ok(())
    }

    async fn list_runs_for_submission(
        &self,
        submission_id: &SubmissionId,
    ) -> Result<Vec<PipelineRun>, RunStoreError> {
        let guard = self.runs.lock().map_err(|_| Self::poisoned())?;
        Ok(guard.values().filter(|run| run.submission_id == *submission_id).cloned().collect())
    }

    async fn append_step_result(&self, result: &StepResult) -> Result<(), RunStoreError> {
        self.step_results.lock().map_err(|_| Self::poisoned())?.push(result.clone());
        Ok(())
    }

    async fn step_attempt_count(
        &self,
        run_id: &PipelineRunId,
        position: u32,
    ) -> Result<u32, RunStoreError> {
        let guard = self.step_results.lock().map_err(|_| Self::poisoned())?;
        let count = guard
            .iter()
            .filter(|result| result.run_id == *run_id && result.position == position)
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn list_step_results(
        &self,
        run_id: &PipelineRunId,
    ) -> Result<Vec<StepResult>, RunStoreError> {
        let guard = self.step_results.lock().map_err(|_| Self::poisoned())?;
        Ok(guard.iter().filter(|result| result.run_id == *run_id).cloned().collect())
    }
}

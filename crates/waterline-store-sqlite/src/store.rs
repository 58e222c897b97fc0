// crates/waterline-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Row Store
// Description: Durable EntityTableStore and RunStore backed by SQLite.
// Purpose: Persist canonical rows as JSON with projected natural-key columns.
// Dependencies: waterline-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Rows persist as canonical JSON documents beside the handful of projected
//! columns the runtime queries on: natural keys for entity lookup, statuses
//! for rollups, and submission membership for runs. The conditional entity
//! update matches on `record_version` and reports affected rows, which is
//! the optimistic-concurrency primitive the entity state service builds on.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::MutexGuard;

use async_trait::async_trait;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use waterline_core::Blueprint;
use waterline_core::BlueprintId;
use waterline_core::CompanyId;
use waterline_core::EntityId;
use waterline_core::EntityProjection;
use waterline_core::EntityRecord;
use waterline_core::EntitySnapshot;
use waterline_core::EntityType;
use waterline_core::NaturalKey;
use waterline_core::OrgId;
use waterline_core::PipelineRun;
use waterline_core::PipelineRunId;
use waterline_core::StepResult;
use waterline_core::Submission;
use waterline_core::SubmissionId;
use waterline_core::SubmissionStatus;
use waterline_core::Timestamp;
use waterline_core::interfaces::EntityPage;
use waterline_core::interfaces::EntityStoreError;
use waterline_core::interfaces::EntityTableStore;
use waterline_core::interfaces::PageRequest;
use waterline_core::interfaces::RunStore;
use waterline_core::interfaces::RunStoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Schema version recorded in `PRAGMA user_version`.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout in milliseconds.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Schema bootstrap statements.
const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS blueprints (
    org_id TEXT NOT NULL,
    blueprint_id TEXT NOT NULL,
    is_active INTEGER NOT NULL,
    blueprint_json TEXT NOT NULL,
    PRIMARY KEY (org_id, blueprint_id)
);
CREATE TABLE IF NOT EXISTS submissions (
    submission_id TEXT PRIMARY KEY,
    org_id TEXT NOT NULL,
    status TEXT NOT NULL,
    cancel_requested INTEGER NOT NULL DEFAULT 0,
    submission_json TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS pipeline_runs (
    run_id TEXT PRIMARY KEY,
    org_id TEXT NOT NULL,
    submission_id TEXT NOT NULL,
    status TEXT NOT NULL,
    run_json TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_pipeline_runs_submission
    ON pipeline_runs (submission_id);
CREATE TABLE IF NOT EXISTS step_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL,
    position INTEGER NOT NULL,
    attempt_number INTEGER NOT NULL,
    result_json TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_step_results_run
    ON step_results (run_id, position);
CREATE TABLE IF NOT EXISTS company_entities (
    org_id TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    company_id TEXT,
    record_version INTEGER NOT NULL,
    canonical_domain TEXT,
    linkedin_url TEXT,
    record_json TEXT NOT NULL,
    PRIMARY KEY (org_id, entity_id)
);
CREATE INDEX IF NOT EXISTS idx_company_entities_domain
    ON company_entities (org_id, canonical_domain);
CREATE INDEX IF NOT EXISTS idx_company_entities_linkedin
    ON company_entities (org_id, linkedin_url);
CREATE TABLE IF NOT EXISTS person_entities (
    org_id TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    company_id TEXT,
    record_version INTEGER NOT NULL,
    linkedin_url TEXT,
    work_email TEXT,
    record_json TEXT NOT NULL,
    PRIMARY KEY (org_id, entity_id)
);
CREATE INDEX IF NOT EXISTS idx_person_entities_linkedin
    ON person_entities (org_id, linkedin_url);
CREATE INDEX IF NOT EXISTS idx_person_entities_email
    ON person_entities (org_id, work_email);
CREATE TABLE IF NOT EXISTS job_posting_entities (
    org_id TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    company_id TEXT,
    record_version INTEGER NOT NULL,
    theirstack_job_id TEXT,
    job_url TEXT,
    record_json TEXT NOT NULL,
    PRIMARY KEY (org_id, entity_id)
);
CREATE INDEX IF NOT EXISTS idx_job_posting_entities_theirstack
    ON job_posting_entities (org_id, theirstack_job_id);
CREATE TABLE IF NOT EXISTS entity_snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    org_id TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    record_version INTEGER NOT NULL,
    captured_at_ms INTEGER NOT NULL,
    snapshot_json TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_entity_snapshots_entity
    ON entity_snapshots (org_id, entity_type, entity_id, captured_at_ms);
";

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteJournalMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteJournalMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` row store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteJournalMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// Stored data failed to decode.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Schema version is incompatible.
    #[error("sqlite store version mismatch: found {found}, supported {supported}")]
    VersionMismatch {
        /// Schema version found in the database.
        found: i64,
        /// Schema version supported by this build.
        supported: i64,
    },
    /// Store data is invalid.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
}

impl From<rusqlite::Error> for SqliteStoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<SqliteStoreError> for EntityStoreError {
    fn from(err: SqliteStoreError) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<SqliteStoreError> for RunStoreError {
    fn from(err: SqliteStoreError) -> Self {
        Self::Store(err.to_string())
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Durable row store backed by one `SQLite` database.
///
/// # Invariants
/// - Snapshot and step-result tables are append-only.
/// - Entity updates are conditional on the stored `record_version`.
pub struct SqliteStore {
    /// Database connection serialized behind a mutex.
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (and bootstraps) the store at the configured path.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened,
    /// configured, or migrated.
    pub fn open(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        let conn = Connection::open(&config.path)?;
        conn.pragma_update(None, "journal_mode", config.journal_mode.pragma_value())?;
        conn.pragma_update(None, "synchronous", config.sync_mode.pragma_value())?;
        conn.pragma_update(None, "busy_timeout", i64::try_from(config.busy_timeout_ms).unwrap_or(i64::MAX))?;

        let found: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        match found {
            0 => {
                conn.execute_batch(SCHEMA_SQL)?;
                conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
            }
            SCHEMA_VERSION => {}
            other => {
                return Err(SqliteStoreError::VersionMismatch {
                    found: other,
                    supported: SCHEMA_VERSION,
                });
            }
        }
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens an in-memory store (tests and demos).
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be created.
    pub fn open_in_memory() -> Result<Self, SqliteStoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Locks the connection, mapping poisoning to a store error.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        self.conn
            .lock()
            .map_err(|_| SqliteStoreError::Io("sqlite connection mutex poisoned".to_string()))
    }
}

// ============================================================================
// SECTION: Row Mapping Helpers
// ============================================================================

/// Serializes a row document as canonical JSON text.
fn encode<T: serde::Serialize>(value: &T) -> Result<String, SqliteStoreError> {
    serde_json::to_string(value).map_err(|err| SqliteStoreError::Invalid(err.to_string()))
}

/// Decodes a row document from JSON text.
fn decode<T: DeserializeOwned>(raw: &str) -> Result<T, SqliteStoreError> {
    serde_json::from_str(raw).map_err(|err| SqliteStoreError::Corrupt(err.to_string()))
}

/// Entity table name for a type.
const fn entity_table(entity_type: EntityType) -> &'static str {
    match entity_type {
        EntityType::Company => "company_entities",
        EntityType::Person => "person_entities",
        EntityType::Job => "job_posting_entities",
    }
}

/// Projected natural-key column values for a record: `(first, second)`.
///
/// Companies project `(canonical_domain, linkedin_url)`, persons
/// `(linkedin_url, work_email)`, job postings `(theirstack_job_id, NULL)`
/// rendered as text.
fn projected_columns(record: &EntityRecord) -> (Option<String>, Option<String>) {
    match &record.projection {
        EntityProjection::Company(fields) => {
            (fields.canonical_domain.clone(), fields.linkedin_url.clone())
        }
        EntityProjection::Person(fields) => {
            (fields.linkedin_url.clone(), fields.work_email.clone())
        }
        EntityProjection::Job(fields) => {
            (fields.theirstack_job_id.map(|id| id.to_string()), fields.job_url.clone())
        }
    }
}

/// SQL column names for the two projected slots of an entity table.
const fn projected_column_names(entity_type: EntityType) -> (&'static str, &'static str) {
    match entity_type {
        EntityType::Company => ("canonical_domain", "linkedin_url"),
        EntityType::Person => ("linkedin_url", "work_email"),
        EntityType::Job => ("theirstack_job_id", "job_url"),
    }
}

/// Milliseconds since the unix epoch for snapshot ordering.
fn timestamp_millis(timestamp: Timestamp) -> i64 {
    i64::try_from(timestamp.as_datetime().unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
}

// ============================================================================
// SECTION: Entity Table Store
// ============================================================================

#[async_trait]
impl EntityTableStore for SqliteStore {
    async fn load_entity(
        &self,
        org_id: &OrgId,
        entity_type: EntityType,
        entity_id: &EntityId,
    ) -> Result<Option<EntityRecord>, EntityStoreError> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT record_json FROM {} WHERE org_id = ?1 AND entity_id = ?2",
            entity_table(entity_type)
        );
        let raw: Option<String> = conn
            .query_row(&sql, params![org_id.to_string(), entity_id.to_string()], |row| {
                row.get(0)
            })
            .optional()
            .map_err(SqliteStoreError::from)?;
        raw.map(|raw| decode(&raw)).transpose().map_err(EntityStoreError::from)
    }

    async fn lookup_by_natural_key(
        &self,
        org_id: &OrgId,
        key: &NaturalKey,
    ) -> Result<Option<EntityRecord>, EntityStoreError> {
        let (table, column, value) = match key {
            NaturalKey::CompanyDomain(domain) => {
                ("company_entities", "canonical_domain", domain.clone())
            }
            NaturalKey::CompanyLinkedin(url) => ("company_entities", "linkedin_url", url.clone()),
            NaturalKey::PersonLinkedin(url) => ("person_entities", "linkedin_url", url.clone()),
            NaturalKey::PersonEmail(email) => ("person_entities", "work_email", email.clone()),
            NaturalKey::JobTheirstackId(job_id) => {
                ("job_posting_entities", "theirstack_job_id", job_id.to_string())
            }
        };
        let conn = self.lock()?;
        let sql = format!(
            "SELECT record_json FROM {table} WHERE org_id = ?1 AND {column} = ?2 LIMIT 1"
        );
        let raw: Option<String> = conn
            .query_row(&sql, params![org_id.to_string(), value], |row| row.get(0))
            .optional()
            .map_err(SqliteStoreError::from)?;
        raw.map(|raw| decode(&raw)).transpose().map_err(EntityStoreError::from)
    }

    async fn insert_entity(&self, record: &EntityRecord) -> Result<(), EntityStoreError> {
        let entity_type = record.entity_type();
        let (first, second) = projected_columns(record);
        let (first_name, second_name) = projected_column_names(entity_type);
        let json = encode(record)?;
        let conn = self.lock()?;
        let sql = format!(
            "INSERT INTO {} (org_id, entity_id, company_id, record_version, {first_name}, \
             {second_name}, record_json) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            entity_table(entity_type)
        );
        conn.execute(
            &sql,
            params![
                record.org_id.to_string(),
                record.entity_id.to_string(),
                record.company_id.map(|company| company.to_string()),
                i64::from(record.record_version),
                first,
                second,
                json,
            ],
        )
        .map_err(SqliteStoreError::from)?;
        Ok(())
    }

    async fn update_entity_versioned(
        &self,
        record: &EntityRecord,
        expected_version: u32,
    ) -> Result<u64, EntityStoreError> {
        let entity_type = record.entity_type();
        let (first, second) = projected_columns(record);
        let (first_name, second_name) = projected_column_names(entity_type);
        let json = encode(record)?;
        let conn = self.lock()?;
        let sql = format!(
            "UPDATE {} SET company_id = ?1, record_version = ?2, {first_name} = ?3, \
             {second_name} = ?4, record_json = ?5 \
             WHERE org_id = ?6 AND entity_id = ?7 AND record_version = ?8",
            entity_table(entity_type)
        );
        let affected = conn
            .execute(
                &sql,
                params![
                    record.company_id.map(|company| company.to_string()),
                    i64::from(record.record_version),
                    first,
                    second,
                    json,
                    record.org_id.to_string(),
                    record.entity_id.to_string(),
                    i64::from(expected_version),
                ],
            )
            .map_err(SqliteStoreError::from)?;
        Ok(u64::try_from(affected).unwrap_or(u64::MAX))
    }

    async fn append_snapshot(&self, snapshot: &EntitySnapshot) -> Result<(), EntityStoreError> {
        let json = encode(snapshot)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO entity_snapshots (org_id, entity_type, entity_id, record_version, \
             captured_at_ms, snapshot_json) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                snapshot.org_id.to_string(),
                snapshot.entity_type.as_str(),
                snapshot.entity_id.to_string(),
                i64::from(snapshot.record_version),
                timestamp_millis(snapshot.captured_at),
                json,
            ],
        )
        .map_err(SqliteStoreError::from)?;
        Ok(())
    }

    async fn recent_snapshots(
        &self,
        org_id: &OrgId,
        entity_type: EntityType,
        entity_id: &EntityId,
        limit: usize,
    ) -> Result<Vec<EntitySnapshot>, EntityStoreError> {
        let conn = self.lock()?;
        let mut statement = conn
            .prepare(
                "SELECT snapshot_json FROM entity_snapshots \
                 WHERE org_id = ?1 AND entity_type = ?2 AND entity_id = ?3 \
                 ORDER BY captured_at_ms DESC, record_version DESC LIMIT ?4",
            )
            .map_err(SqliteStoreError::from)?;
        let rows = statement
            .query_map(
                params![
                    org_id.to_string(),
                    entity_type.as_str(),
                    entity_id.to_string(),
                    i64::try_from(limit).unwrap_or(i64::MAX),
                ],
                |row| row.get::<_, String>(0),
            )
            .map_err(SqliteStoreError::from)?;
        let mut snapshots = Vec::new();
        for raw in rows {
            let raw = raw.map_err(SqliteStoreError::from)?;
            snapshots.push(decode(&raw)?);
        }
        Ok(snapshots)
    }

    async fn list_entities(
        &self,
        org_id: &OrgId,
        entity_type: EntityType,
        company_id: Option<&CompanyId>,
        page: PageRequest,
    ) -> Result<EntityPage, EntityStoreError> {
        let table = entity_table(entity_type);
        let conn = self.lock()?;
        let (total, records) = if let Some(company) = company_id {
            let total: i64 = conn
                .query_row(
                    &format!(
                        "SELECT COUNT(*) FROM {table} WHERE org_id = ?1 AND company_id = ?2"
                    ),
                    params![org_id.to_string(), company.to_string()],
                    |row| row.get(0),
                )
                .map_err(SqliteStoreError::from)?;
            let mut statement = conn
                .prepare(&format!(
                    "SELECT record_json FROM {table} WHERE org_id = ?1 AND company_id = ?2 \
                     ORDER BY entity_id LIMIT ?3 OFFSET ?4"
                ))
                .map_err(SqliteStoreError::from)?;
            let rows = statement
                .query_map(
                    params![
                        org_id.to_string(),
                        company.to_string(),
                        i64::from(page.per_page),
                        i64::try_from(page.offset()).unwrap_or(i64::MAX),
                    ],
                    |row| row.get::<_, String>(0),
                )
                .map_err(SqliteStoreError::from)?;
            let mut records = Vec::new();
            for raw in rows {
                let raw = raw.map_err(SqliteStoreError::from)?;
                records.push(decode(&raw)?);
            }
            (total, records)
        } else {
            let total: i64 = conn
                .query_row(
                    &format!("SELECT COUNT(*) FROM {table} WHERE org_id = ?1"),
                    params![org_id.to_string()],
                    |row| row.get(0),
                )
                .map_err(SqliteStoreError::from)?;
            let mut statement = conn
                .prepare(&format!(
                    "SELECT record_json FROM {table} WHERE org_id = ?1 \
                     ORDER BY entity_id LIMIT ?2 OFFSET ?3"
                ))
                .map_err(SqliteStoreError::from)?;
            let rows = statement
                .query_map(
                    params![
                        org_id.to_string(),
                        i64::from(page.per_page),
                        i64::try_from(page.offset()).unwrap_or(i64::MAX),
                    ],
                    |row| row.get::<_, String>(0),
                )
                .map_err(SqliteStoreError::from)?;
            let mut records = Vec::new();
            for raw in rows {
                let raw = raw.map_err(SqliteStoreError::from)?;
                records.push(decode(&raw)?);
            }
            (total, records)
        };
        Ok(EntityPage::assemble(records, u64::try_from(total).unwrap_or(0), page))
    }
}

// ============================================================================
// SECTION: Run Store
// ============================================================================

#[async_trait]
impl RunStore for SqliteStore {
    async fn save_blueprint(&self, blueprint: &Blueprint) -> Result<(), RunStoreError> {
        let json = encode(blueprint)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO blueprints (org_id, blueprint_id, is_active, blueprint_json) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT (org_id, blueprint_id) DO UPDATE SET \
             is_active = excluded.is_active, blueprint_json = excluded.blueprint_json",
            params![
                blueprint.org_id.to_string(),
                blueprint.blueprint_id.to_string(),
                i64::from(blueprint.is_active),
                json,
            ],
        )
        .map_err(SqliteStoreError::from)?;
        Ok(())
    }

    async fn load_blueprint(
        &self,
        org_id: &OrgId,
        blueprint_id: &BlueprintId,
    ) -> Result<Option<Blueprint>, RunStoreError> {
        let conn = self.lock()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT blueprint_json FROM blueprints WHERE org_id = ?1 AND blueprint_id = ?2",
                params![org_id.to_string(), blueprint_id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(SqliteStoreError::from)?;
        raw.map(|raw| decode(&raw)).transpose().map_err(RunStoreError::from)
    }

    async fn create_submission(&self, submission: &Submission) -> Result<(), RunStoreError> {
        let json = encode(submission)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO submissions (submission_id, org_id, status, cancel_requested, \
             submission_json) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                submission.submission_id.to_string(),
                submission.org_id.to_string(),
                status_text(submission.status),
                i64::from(submission.cancel_requested),
                json,
            ],
        )
        .map_err(SqliteStoreError::from)?;
        Ok(())
    }

    async fn load_submission(
        &self,
        submission_id: &SubmissionId,
    ) -> Result<Option<Submission>, RunStoreError> {
        let conn = self.lock()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT submission_json FROM submissions WHERE submission_id = ?1",
                params![submission_id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(SqliteStoreError::from)?;
        raw.map(|raw| decode(&raw)).transpose().map_err(RunStoreError::from)
    }

    async fn update_submission_status(
        &self,
        submission_id: &SubmissionId,
        status: SubmissionStatus,
        updated_at: Timestamp,
    ) -> Result<(), RunStoreError> {
        let Some(mut submission) = self.load_submission(submission_id).await? else {
            return Err(RunStoreError::NotFound(submission_id.to_string()));
        };
        submission.status = status;
        submission.updated_at = updated_at;
        let json = encode(&submission)?;
        let conn = self.lock()?;
        conn.execute(
            "UPDATE submissions SET status = ?1, submission_json = ?2 WHERE submission_id = ?3",
            params![status_text(status), json, submission_id.to_string()],
        )
        .map_err(SqliteStoreError::from)?;
        Ok(())
    }

    async fn request_cancellation(
        &self,
        submission_id: &SubmissionId,
        updated_at: Timestamp,
    ) -> Result<(), RunStoreError> {
        let Some(mut submission) = self.load_submission(submission_id).await? else {
            return Err(RunStoreError::NotFound(submission_id.to_string()));
        };
        submission.cancel_requested = true;
        submission.updated_at = updated_at;
        let json = encode(&submission)?;
        let conn = self.lock()?;
        conn.execute(
            "UPDATE submissions SET cancel_requested = 1, submission_json = ?1 \
             WHERE submission_id = ?2",
            params![json, submission_id.to_string()],
        )
        .map_err(SqliteStoreError::from)?;
        Ok(())
    }

    async fn create_pipeline_run(&self, run: &PipelineRun) -> Result<(), RunStoreError> {
        let json = encode(run)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO pipeline_runs (run_id, org_id, submission_id, status, run_json) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                run.run_id.to_string(),
                run.org_id.to_string(),
                run.submission_id.to_string(),
                run_status_text(run.status),
                json,
            ],
        )
        .map_err(SqliteStoreError::from)?;
        Ok(())
    }

    async fn load_pipeline_run(
        &self,
        run_id: &PipelineRunId,
    ) -> Result<Option<PipelineRun>, RunStoreError> {
        let conn = self.lock()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT run_json FROM pipeline_runs WHERE run_id = ?1",
                params![run_id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(SqliteStoreError::from)?;
        raw.map(|raw| decode(&raw)).transpose().map_err(RunStoreError::from)
    }

    async fn save_pipeline_run(&self, run: &PipelineRun) -> Result<(), RunStoreError> {
        let json = encode(run)?;
        let conn = self.lock()?;
        let affected = conn
            .execute(
                "UPDATE pipeline_runs SET status = ?1, run_json = ?2 WHERE run_id = ?3",
                params![run_status_text(run.status), json, run.run_id.to_string()],
            )
            .map_err(SqliteStoreError::from)?;
        if affected == 0 {
            return Err(RunStoreError::NotFound(run.run_id.to_string()));
        }
        Ok(())
    }

    async fn list_runs_for_submission(
        &self,
        submission_id: &SubmissionId,
    ) -> Result<Vec<PipelineRun>, RunStoreError> {
        let conn = self.lock()?;
        let mut statement = conn
            .prepare(
                "SELECT run_json FROM pipeline_runs WHERE submission_id = ?1 ORDER BY run_id",
            )
            .map_err(SqliteStoreError::from)?;
        let rows = statement
            .query_map(params![submission_id.to_string()], |row| row.get::<_, String>(0))
            .map_err(SqliteStoreError::from)?;
        let mut runs = Vec::new();
        for raw in rows {
            let raw = raw.map_err(SqliteStoreError::from)?;
            runs.push(decode(&raw)?);
        }
        Ok(runs)
    }

    async fn append_step_result(&self, result: &StepResult) -> Result<(), RunStoreError> {
        let json = encode(result)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO step_results (run_id, position, attempt_number, result_json) \
             VALUES (?1, ?2, ?3, ?4)",
            params![
                result.run_id.to_string(),
                i64::from(result.position),
                i64::from(result.attempt_number),
                json,
            ],
        )
        .map_err(SqliteStoreError::from)?;
        Ok(())
    }

    async fn step_attempt_count(
        &self,
        run_id: &PipelineRunId,
        position: u32,
    ) -> Result<u32, RunStoreError> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM step_results WHERE run_id = ?1 AND position = ?2",
                params![run_id.to_string(), i64::from(position)],
                |row| row.get(0),
            )
            .map_err(SqliteStoreError::from)?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn list_step_results(
        &self,
        run_id: &PipelineRunId,
    ) -> Result<Vec<StepResult>, RunStoreError> {
        let conn = self.lock()?;
        let mut statement = conn
            .prepare("SELECT result_json FROM step_results WHERE run_id = ?1 ORDER BY id")
            .map_err(SqliteStoreError::from)?;
        let rows = statement
            .query_map(params![run_id.to_string()], |row| row.get::<_, String>(0))
            .map_err(SqliteStoreError::from)?;
        let mut results = Vec::new();
        for raw in rows {
            let raw = raw.map_err(SqliteStoreError::from)?;
            results.push(decode(&raw)?);
        }
        Ok(results)
    }
}

// ============================================================================
// SECTION: Status Text
// ============================================================================

/// Stable status text for the submissions status column.
const fn status_text(status: SubmissionStatus) -> &'static str {
    match status {
        SubmissionStatus::Pending => "pending",
        SubmissionStatus::Processing => "processing",
        SubmissionStatus::Completed => "completed",
        SubmissionStatus::Failed => "failed",
        SubmissionStatus::Cancelled => "cancelled",
    }
}

/// Stable status text for the pipeline run status column.
const fn run_status_text(status: waterline_core::RunStatus) -> &'static str {
    match status {
        waterline_core::RunStatus::Queued => "queued",
        waterline_core::RunStatus::Running => "running",
        waterline_core::RunStatus::Succeeded => "succeeded",
        waterline_core::RunStatus::Failed => "failed",
        waterline_core::RunStatus::Skipped => "skipped",
    }
}

// crates/waterline-core/src/runtime/entity_state.rs
// ============================================================================
// Module: Waterline Entity State Service
// Description: Identity resolution, freshness checks, and versioned upserts.
// Purpose: Drive the datastore primitives with the canonical merge algorithm.
// Dependencies: crate::{core, interfaces}, thiserror, tracing
// ============================================================================

//! ## Overview
//! The entity state service owns the write path for canonical entities:
//! explicit-id or natural-key resolution, pre-image snapshot capture,
//! additive non-null payload merge, projected-column precedence, and the
//! optimistic-concurrency version check. The datastore itself only provides
//! primitive row operations.
//!
//! Snapshot writes are best-effort: a failed snapshot loses one generation of
//! diff history, never the live row, so the failure is logged and swallowed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::CompanyId;
use crate::core::ContextMap;
use crate::core::ContextValue;
use crate::core::EntityId;
use crate::core::EntityProjection;
use crate::core::EntityRecord;
use crate::core::EntitySnapshot;
use crate::core::EntityType;
use crate::core::OperationId;
use crate::core::OrgId;
use crate::core::PipelineRunId;
use crate::core::Timestamp;
use crate::core::identity::derive_entity_id;
use crate::core::normalize::coerce_string_list;
use crate::core::normalize::merge_string_lists;
use crate::interfaces::EntityStoreError;
use crate::interfaces::EntityTableStore;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Entity state errors surfaced from the write path.
///
/// # Invariants
/// - `VersionConflict` means the caller lost an optimistic-concurrency race
///   or supplied a non-monotonic version; there is no automatic retry.
#[derive(Debug, Error)]
pub enum EntityStateError {
    /// The incoming record version is not strictly greater than the stored one,
    /// or a concurrent writer committed first.
    #[error("entity record version conflict: {0}")]
    VersionConflict(String),
    /// The underlying store failed.
    #[error(transparent)]
    Store(#[from] EntityStoreError),
}

// ============================================================================
// SECTION: Requests and Reports
// ============================================================================

/// Upsert request for one canonical entity write.
#[derive(Debug, Clone)]
pub struct UpsertRequest {
    /// Owning tenant.
    pub org_id: OrgId,
    /// Workspace company, when known.
    pub company_id: Option<CompanyId>,
    /// Entity type being written.
    pub entity_type: EntityType,
    /// Canonical fields to merge (raw, pre-normalization).
    pub canonical_fields: ContextMap,
    /// Explicit entity identifier, when the caller already resolved one.
    pub entity_id: Option<EntityId>,
    /// Operation recorded as the writer.
    pub last_operation_id: Option<OperationId>,
    /// Pipeline run recorded as the writer.
    pub last_run_id: Option<PipelineRunId>,
    /// Explicit next version; defaults to stored version + 1.
    pub incoming_record_version: Option<u32>,
}

/// Result of a freshness check against the entity state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FreshnessReport {
    /// True when the entity exists and is within the freshness window.
    pub fresh: bool,
    /// Matched entity identifier, when fresh.
    pub entity_id: Option<EntityId>,
    /// Last enrichment timestamp of the matched entity.
    pub last_enriched_at: Option<Timestamp>,
    /// Computed age in hours.
    pub age_hours: Option<f64>,
    /// Canonical payload of the matched entity, when fresh.
    pub canonical_payload: Option<ContextMap>,
}

// ============================================================================
// SECTION: Entity State Service
// ============================================================================

/// Canonical entity write path over datastore primitives.
#[derive(Debug, Clone)]
pub struct EntityStateService<S> {
    /// Underlying row store.
    store: S,
}

impl<S: EntityTableStore> EntityStateService<S> {
    /// Creates a service over the given row store.
    #[must_use]
    pub const fn new(store: S) -> Self {
        Self {
            store,
        }
    }

    /// Returns the underlying row store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Resolves the entity identifier for canonical fields without touching
    /// the store: explicit identifier wins, else deterministic derivation.
    #[must_use]
    pub fn resolve(
        org_id: &OrgId,
        entity_type: EntityType,
        canonical_fields: &ContextMap,
        explicit_id: Option<EntityId>,
    ) -> EntityId {
        explicit_id.unwrap_or_else(|| {
            let projection = EntityProjection::from_context(entity_type, canonical_fields);
            derive_entity_id(org_id, &projection, canonical_fields)
        })
    }

    /// Looks an entity up by the natural keys derivable from `identifiers`.
    ///
    /// Candidates are probed in per-type priority order; the first hit wins.
    ///
    /// # Errors
    ///
    /// Returns [`EntityStateError`] when a store lookup fails.
    pub async fn lookup_by_natural_key(
        &self,
        org_id: &OrgId,
        entity_type: EntityType,
        identifiers: &ContextMap,
    ) -> Result<Option<EntityRecord>, EntityStateError> {
        let projection = EntityProjection::from_context(entity_type, identifiers);
        for key in projection.natural_keys() {
            if let Some(record) = self.store.lookup_by_natural_key(org_id, &key).await? {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Checks whether the entity identified by `identifiers` was enriched
    /// within `max_age_hours` of `now`. On a fresh hit the full canonical
    /// payload is returned so the caller can reuse it without a provider call.
    ///
    /// # Errors
    ///
    /// Returns [`EntityStateError`] when a store lookup fails.
    pub async fn check_freshness(
        &self,
        org_id: &OrgId,
        entity_type: EntityType,
        identifiers: &ContextMap,
        max_age_hours: f64,
        now: Timestamp,
    ) -> Result<FreshnessReport, EntityStateError> {
        let Some(record) = self.lookup_by_natural_key(org_id, entity_type, identifiers).await?
        else {
            return Ok(FreshnessReport::default());
        };
        let age_hours = record.last_enriched_at.age_hours_at(now);
        if age_hours > max_age_hours {
            return Ok(FreshnessReport::default());
        }
        Ok(FreshnessReport {
            fresh: true,
            entity_id: Some(record.entity_id),
            last_enriched_at: Some(record.last_enriched_at),
            age_hours: Some(age_hours),
            canonical_payload: Some(record.canonical_payload),
        })
    }

    /// Upserts a canonical entity with versioned optimistic concurrency.
    ///
    /// Algorithm: resolve identity (explicit id, then natural-key adoption,
    /// then deterministic derivation), compute the next version, capture the
    /// pre-image snapshot, additively merge the payload, merge projected
    /// columns with incoming-non-null precedence, and conditionally update or
    /// insert the row.
    ///
    /// # Errors
    ///
    /// Returns [`EntityStateError::VersionConflict`] when the version check
    /// fails, and [`EntityStateError::Store`] on datastore failures.
    pub async fn upsert(
        &self,
        request: UpsertRequest,
        now: Timestamp,
    ) -> Result<EntityRecord, EntityStateError> {
        let projection =
            EntityProjection::from_context(request.entity_type, &request.canonical_fields);

        let mut resolved_id = request.entity_id;
        let mut existing: Option<EntityRecord> = None;
        if let Some(entity_id) = resolved_id {
            existing =
                self.store.load_entity(&request.org_id, request.entity_type, &entity_id).await?;
        }
        if existing.is_none() {
            existing = self.adopt_by_natural_key(&request.org_id, &projection).await?;
            if let Some(record) = &existing {
                resolved_id = Some(record.entity_id);
            }
        }
        let entity_id = resolved_id.unwrap_or_else(|| {
            derive_entity_id(&request.org_id, &projection, &request.canonical_fields)
        });
        if existing.is_none() {
            existing =
                self.store.load_entity(&request.org_id, request.entity_type, &entity_id).await?;
        }

        let existing_version = existing.as_ref().map_or(0, |record| record.record_version);
        let next_version =
            request.incoming_record_version.unwrap_or_else(|| existing_version.saturating_add(1));
        if next_version <= existing_version {
            return Err(EntityStateError::VersionConflict(format!(
                "incoming record_version ({next_version}) must be greater than existing \
                 ({existing_version})"
            )));
        }

        if let Some(record) = &existing {
            self.capture_snapshot(record, request.last_run_id, now).await;
        }

        let mut canonical_payload =
            existing.as_ref().map(|record| record.canonical_payload.clone()).unwrap_or_default();
        canonical_payload.merge_non_null(&request.canonical_fields);

        let incoming_providers = request
            .canonical_fields
            .get("source_providers")
            .and_then(coerce_string_list)
            .unwrap_or_default();
        let existing_providers =
            existing.as_ref().map(|record| record.source_providers.clone()).unwrap_or_default();
        let source_providers = merge_string_lists(&existing_providers, &incoming_providers);

        let merged_projection = existing.as_ref().map_or_else(
            || with_insert_defaults(projection.clone()),
            |record| projection.merge_over(&record.projection),
        );

        let record = EntityRecord {
            org_id: request.org_id,
            company_id: request
                .company_id
                .or_else(|| existing.as_ref().and_then(|record| record.company_id)),
            entity_id,
            record_version: next_version,
            projection: merged_projection,
            canonical_payload,
            last_enriched_at: now,
            last_operation_id: request
                .last_operation_id
                .or_else(|| existing.as_ref().and_then(|record| record.last_operation_id.clone())),
            last_run_id: request
                .last_run_id
                .or_else(|| existing.as_ref().and_then(|record| record.last_run_id)),
            source_providers,
        };

        if existing.is_some() {
            let affected = self.store.update_entity_versioned(&record, existing_version).await?;
            if affected == 0 {
                return Err(EntityStateError::VersionConflict(format!(
                    "concurrent writer updated entity {entity_id} past version {existing_version}"
                )));
            }
        } else {
            self.store.insert_entity(&record).await?;
        }
        Ok(record)
    }

    /// Probes natural-key candidates and adopts the first existing row.
    async fn adopt_by_natural_key(
        &self,
        org_id: &OrgId,
        projection: &EntityProjection,
    ) -> Result<Option<EntityRecord>, EntityStateError> {
        for key in projection.natural_keys() {
            if let Some(record) = self.store.lookup_by_natural_key(org_id, &key).await? {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Captures the pre-image snapshot for an existing row. Failures are
    /// logged and swallowed: the cost is one generation of history, never
    /// corruption of the live row.
    async fn capture_snapshot(
        &self,
        existing: &EntityRecord,
        source_run_id: Option<PipelineRunId>,
        now: Timestamp,
    ) {
        let snapshot = EntitySnapshot {
            org_id: existing.org_id,
            entity_type: existing.entity_type(),
            entity_id: existing.entity_id,
            record_version: existing.record_version,
            canonical_payload: existing.canonical_payload.clone(),
            source_run_id,
            captured_at: now,
        };
        if let Err(error) = self.store.append_snapshot(&snapshot).await {
            tracing::warn!(
                org_id = %existing.org_id,
                entity_type = %existing.entity_type(),
                entity_id = %existing.entity_id,
                record_version = existing.record_version,
                %error,
                "failed to capture entity snapshot"
            );
        }
    }
}

// ============================================================================
// SECTION: Insert Defaults
// ============================================================================

/// Applies first-insert defaults to a projection.
fn with_insert_defaults(projection: EntityProjection) -> EntityProjection {
    match projection {
        EntityProjection::Job(mut fields) => {
            if fields.posting_status.is_none() {
                fields.posting_status = Some("active".to_string());
            }
            EntityProjection::Job(fields)
        }
        other => other,
    }
}

// ============================================================================
// SECTION: Identifier Extraction
// ============================================================================

/// Extracts the identity slice of a context for a freshness lookup.
///
/// When `identity_fields` is empty the whole context is used.
#[must_use]
pub fn identity_slice(context: &ContextMap, identity_fields: &[String]) -> ContextMap {
    if identity_fields.is_empty() {
        return context.clone();
    }
    context.restricted_to(identity_fields)
}

/// Returns true when the identity slice carries any non-null value.
#[must_use]
pub fn has_identity_values(slice: &ContextMap) -> bool {
    slice.iter().any(|(_, value)| !matches!(value, ContextValue::Null))
}

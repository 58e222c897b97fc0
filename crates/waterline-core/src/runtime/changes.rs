// crates/waterline-core/src/runtime/changes.rs
// ============================================================================
// Module: Waterline Change Detector
// Description: Field-level diffs over the two most recent entity snapshots.
// Purpose: Classify watched-field changes with magnitudes for numeric fields.
// Dependencies: crate::{core, interfaces}, serde
// ============================================================================

//! ## Overview
//! The change detector reads the two most recent snapshots of an entity and
//! classifies each watched field as added, removed, increased, decreased, or
//! changed. It runs only when a step explicitly requests it; snapshots are
//! produced as a side effect of every entity write.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

use crate::core::ContextMap;
use crate::core::ContextValue;
use crate::core::EntityId;
use crate::core::EntityType;
use crate::core::OrgId;
use crate::core::Timestamp;
use crate::interfaces::EntityStoreError;
use crate::interfaces::EntityTableStore;

// ============================================================================
// SECTION: Change Classification
// ============================================================================

/// Classification of one watched-field change.
///
/// # Invariants
/// - Variants are stable for serialization and downstream signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Field was null and is now non-null.
    Added,
    /// Field was non-null and is now null.
    Removed,
    /// Numeric field increased.
    Increased,
    /// Numeric field decreased.
    Decreased,
    /// Field changed in a non-numeric way.
    Changed,
}

/// Reason a report carries no changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    /// Fewer than two snapshots exist.
    InsufficientHistory,
    /// Every watched field is structurally equal.
    NoChanges,
}

/// One classified field change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    /// Watched field name.
    pub field: String,
    /// Value in the previous snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_value: Option<ContextValue>,
    /// Value in the current snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_value: Option<ContextValue>,
    /// Change classification.
    pub change_type: ChangeKind,
    /// Absolute numeric change magnitude.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub absolute_change: Option<f64>,
    /// Percent change relative to the previous value; omitted when the
    /// previous value was zero.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent_change: Option<f64>,
}

/// Diff report over the two most recent snapshots of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeReport {
    /// True when at least one watched field changed.
    pub has_changes: bool,
    /// Reason when no changes are reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<ChangeReason>,
    /// Diffed entity identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<EntityId>,
    /// Diffed entity type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<EntityType>,
    /// Capture time of the older snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_snapshot_at: Option<Timestamp>,
    /// Capture time of the newer snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_snapshot_at: Option<Timestamp>,
    /// Classified changes.
    #[serde(default)]
    pub changes: Vec<FieldChange>,
    /// Watched fields that were structurally equal.
    #[serde(default)]
    pub unchanged_fields: Vec<String>,
}

impl ChangeReport {
    /// Report for an entity with fewer than two snapshots.
    #[must_use]
    pub const fn insufficient_history() -> Self {
        Self {
            has_changes: false,
            reason: Some(ChangeReason::InsufficientHistory),
            entity_id: None,
            entity_type: None,
            previous_snapshot_at: None,
            current_snapshot_at: None,
            changes: Vec::new(),
            unchanged_fields: Vec::new(),
        }
    }
}

// ============================================================================
// SECTION: Change Detector
// ============================================================================

/// Change detector over an entity table store.
#[derive(Debug, Clone)]
pub struct ChangeDetector<S> {
    /// Underlying row store.
    store: S,
}

impl<S: EntityTableStore> ChangeDetector<S> {
    /// Creates a detector over the given row store.
    #[must_use]
    pub const fn new(store: S) -> Self {
        Self {
            store,
        }
    }

    /// Diffs the two most recent snapshots of an entity over the watched
    /// field set (explicit list, else the union of keys across both
    /// payloads).
    ///
    /// # Errors
    ///
    /// Returns [`EntityStoreError`] when the snapshot query fails.
    pub async fn detect(
        &self,
        org_id: &OrgId,
        entity_type: EntityType,
        entity_id: &EntityId,
        fields_to_watch: Option<&[String]>,
    ) -> Result<ChangeReport, EntityStoreError> {
        let snapshots = self.store.recent_snapshots(org_id, entity_type, entity_id, 2).await?;
        if snapshots.len() < 2 {
            return Ok(ChangeReport::insufficient_history());
        }
        let current = &snapshots[0];
        let previous = &snapshots[1];

        let watched = watched_fields(&current.canonical_payload, &previous.canonical_payload, fields_to_watch);

        let mut changes = Vec::new();
        let mut unchanged_fields = Vec::new();
        for field in watched {
            let previous_value = non_null_value(&previous.canonical_payload, &field);
            let current_value = non_null_value(&current.canonical_payload, &field);
            match classify(previous_value, current_value) {
                Classification::Unchanged => unchanged_fields.push(field),
                Classification::Change(change_type, absolute_change, percent_change) => {
                    changes.push(FieldChange {
                        field,
                        previous_value: previous_value.cloned(),
                        current_value: current_value.cloned(),
                        change_type,
                        absolute_change,
                        percent_change,
                    });
                }
            }
        }

        let has_changes = !changes.is_empty();
        Ok(ChangeReport {
            has_changes,
            reason: if has_changes {
                None
            } else {
                Some(ChangeReason::NoChanges)
            },
            entity_id: Some(*entity_id),
            entity_type: Some(entity_type),
            previous_snapshot_at: Some(previous.captured_at),
            current_snapshot_at: Some(current.captured_at),
            changes,
            unchanged_fields,
        })
    }
}

// ============================================================================
// SECTION: Classification Helpers
// ============================================================================

/// Internal classification outcome for one field.
enum Classification {
    /// Structurally equal values.
    Unchanged,
    /// A change with optional numeric magnitudes.
    Change(ChangeKind, Option<f64>, Option<f64>),
}

/// Resolves the watched field set: the explicit list when given (cleaned),
/// else the sorted union of keys across both payloads.
fn watched_fields(
    current: &ContextMap,
    previous: &ContextMap,
    fields_to_watch: Option<&[String]>,
) -> Vec<String> {
    if let Some(fields) = fields_to_watch
        && !fields.is_empty()
    {
        return fields
            .iter()
            .map(|field| field.trim())
            .filter(|field| !field.is_empty())
            .map(ToString::to_string)
            .collect();
    }
    let mut union: BTreeSet<String> = current.keys().cloned().collect();
    union.extend(previous.keys().cloned());
    union.into_iter().collect()
}

/// Returns the field value, treating explicit null as absent.
fn non_null_value<'a>(payload: &'a ContextMap, field: &str) -> Option<&'a ContextValue> {
    payload.get_non_null(field)
}

/// Classifies the transition between two optional values.
fn classify(previous: Option<&ContextValue>, current: Option<&ContextValue>) -> Classification {
    match (previous, current) {
        (None, None) => Classification::Unchanged,
        (None, Some(_)) => Classification::Change(ChangeKind::Added, None, None),
        (Some(_), None) => Classification::Change(ChangeKind::Removed, None, None),
        (Some(before), Some(after)) => {
            if before == after {
                return Classification::Unchanged;
            }
            if let (Some(old), Some(new)) = (before.as_number(), after.as_number()) {
                let change_type = if new > old {
                    ChangeKind::Increased
                } else {
                    ChangeKind::Decreased
                };
                let absolute_change = (new - old).abs();
                let percent_change = if old == 0.0 {
                    None
                } else {
                    Some((absolute_change / old.abs()) * 100.0)
                };
                return Classification::Change(
                    change_type,
                    Some(absolute_change),
                    percent_change,
                );
            }
            Classification::Change(ChangeKind::Changed, None, None)
        }
    }
}

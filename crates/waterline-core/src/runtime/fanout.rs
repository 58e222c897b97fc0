// crates/waterline-core/src/runtime/fanout.rs
// ============================================================================
// Module: Waterline Fan-Out Expansion
// Description: Collection expansion and in-batch dedup for fan-out steps.
// Purpose: Turn a step's collection output into unique child fan-out entities.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! When a fan-out step's output carries a declared collection key, each
//! element becomes a candidate child entity. Within one fan-out no two
//! children may share a dedup key; the second occurrence of a key is dropped
//! and its identifier recorded. Dedup across different fan-outs is the entity
//! state store's job at upsert time, not this module's.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use crate::core::ContextMap;
use crate::core::ContextValue;
use crate::core::EntityType;
use crate::core::fan_out_dedup_key;
use crate::core::seed_entity_type;
use crate::interfaces::CollectionBinding;

// ============================================================================
// SECTION: Expansion
// ============================================================================

/// One candidate child entity produced by a fan-out expansion.
#[derive(Debug, Clone, PartialEq)]
pub struct FanOutEntity {
    /// Entity type of the child.
    pub entity_type: EntityType,
    /// Child entity fields.
    pub fields: ContextMap,
}

/// Outcome of expanding a step output against declared collection bindings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FanOutExpansion {
    /// Candidate child entities in collection order.
    pub entities: Vec<FanOutEntity>,
    /// Collection key that matched, when any.
    pub collection_key: Option<String>,
    /// Elements dropped because they were not objects.
    pub invalid_entries: u32,
}

/// Expands a step output into fan-out candidates.
///
/// Bindings are probed in declaration order; the first binding whose key
/// holds a non-empty list wins. An element's own `entity_type` tag overrides
/// the binding's entity type when it parses.
#[must_use]
pub fn expand_collections(output: &ContextMap, bindings: &[CollectionBinding]) -> FanOutExpansion {
    for binding in bindings {
        let Some(items) = output.get_list(&binding.key) else {
            continue;
        };
        if items.is_empty() {
            continue;
        }
        let mut expansion = FanOutExpansion {
            collection_key: Some(binding.key.clone()),
            ..FanOutExpansion::default()
        };
        for item in items {
            match item {
                ContextValue::Map(fields) => {
                    let entity_type =
                        seed_entity_type(fields).unwrap_or(binding.entity_type);
                    expansion.entities.push(FanOutEntity {
                        entity_type,
                        fields: fields.clone(),
                    });
                }
                _ => {
                    expansion.invalid_entries = expansion.invalid_entries.saturating_add(1);
                }
            }
        }
        return expansion;
    }
    FanOutExpansion::default()
}

// ============================================================================
// SECTION: Dedup
// ============================================================================

/// Outcome of in-batch fan-out dedup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DedupOutcome {
    /// Unique entities in first-appearance order.
    pub unique: Vec<FanOutEntity>,
    /// Number of dropped duplicates.
    pub skipped_duplicates_count: u32,
    /// Dedup keys of the dropped duplicates, in drop order.
    pub skipped_duplicate_identifiers: Vec<String>,
}

/// Drops duplicate fan-out entities within one batch.
///
/// The dedup key is derived from normalized identity fields in per-type
/// priority order; the first occurrence of a key survives.
#[must_use]
pub fn dedup_fan_out(entities: Vec<FanOutEntity>) -> DedupOutcome {
    let mut outcome = DedupOutcome::default();
    let mut seen: BTreeSet<String> = BTreeSet::new();
    for entity in entities {
        let key = fan_out_dedup_key(entity.entity_type, &entity.fields);
        if seen.contains(&key) {
            outcome.skipped_duplicates_count = outcome.skipped_duplicates_count.saturating_add(1);
            outcome.skipped_duplicate_identifiers.push(key);
            continue;
        }
        seen.insert(key);
        outcome.unique.push(entity);
    }
    outcome
}

// crates/waterline-core/src/core/blueprint.rs
// ============================================================================
// Module: Waterline Blueprints
// Description: Named ordered recipes of enrichment steps and their snapshots.
// Purpose: Fix step semantics at submission time via value snapshots.
// Dependencies: crate::core::{context, identifiers}, serde, thiserror
// ============================================================================

//! ## Overview
//! A blueprint is an ordered recipe of enrichment operations. Each pipeline
//! run receives a value snapshot of its blueprint at submission time, so
//! later edits never mutate in-flight runs.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::num::NonZeroU32;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::context::ContextMap;
use crate::core::identifiers::BlueprintId;
use crate::core::identifiers::OperationId;
use crate::core::identifiers::OrgId;

// ============================================================================
// SECTION: Freshness Policy
// ============================================================================

/// Freshness short-circuit configuration for a step.
///
/// # Invariants
/// - `max_age_hours` is a positive duration.
/// - `identity_fields` names the context keys used to look the entity up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreshnessPolicy {
    /// Maximum entity age, in hours, considered fresh.
    pub max_age_hours: f64,
    /// Context keys carrying the entity identity for the lookup.
    pub identity_fields: Vec<String>,
}

// ============================================================================
// SECTION: Blueprint Steps
// ============================================================================

/// One position in a blueprint.
///
/// # Invariants
/// - `position` is 1-based and unique within its blueprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlueprintStep {
    /// 1-based position within the blueprint.
    pub position: NonZeroU32,
    /// Operation executed at this position.
    pub operation_id: OperationId,
    /// Static step configuration merged into the operation input.
    #[serde(default)]
    pub step_config: ContextMap,
    /// Whether a collection output expands into child runs.
    #[serde(default)]
    pub fan_out: bool,
    /// Whether the step executes at all.
    #[serde(default = "default_enabled")]
    pub is_enabled: bool,
    /// Optional freshness short-circuit policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_if_fresh: Option<FreshnessPolicy>,
}

/// Steps are enabled unless explicitly disabled.
const fn default_enabled() -> bool {
    true
}

// ============================================================================
// SECTION: Blueprint
// ============================================================================

/// Named ordered recipe of enrichment steps owned by a tenant.
///
/// # Invariants
/// - Steps are stored in ascending position order after validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blueprint {
    /// Blueprint identifier.
    pub blueprint_id: BlueprintId,
    /// Owning tenant.
    pub org_id: OrgId,
    /// Display name.
    pub name: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the blueprint accepts new submissions.
    pub is_active: bool,
    /// Ordered steps.
    pub steps: Vec<BlueprintStep>,
}

/// Blueprint validation errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BlueprintError {
    /// The blueprint has no steps.
    #[error("blueprint has no steps")]
    Empty,
    /// A position appears more than once.
    #[error("duplicate step position: {0}")]
    DuplicatePosition(u32),
    /// Positions do not form a contiguous 1..=N sequence.
    #[error("step positions must be contiguous from 1, found {0}")]
    NonContiguousPosition(u32),
}

impl Blueprint {
    /// Validates the step list: non-empty, unique, contiguous 1-based positions.
    ///
    /// # Errors
    ///
    /// Returns [`BlueprintError`] when the step list violates an invariant.
    pub fn validate(&self) -> Result<(), BlueprintError> {
        if self.steps.is_empty() {
            return Err(BlueprintError::Empty);
        }
        let mut positions: Vec<u32> = self.steps.iter().map(|step| step.position.get()).collect();
        positions.sort_unstable();
        let mut expected = 1u32;
        for position in positions {
            if position < expected {
                return Err(BlueprintError::DuplicatePosition(position));
            }
            if position > expected {
                return Err(BlueprintError::NonContiguousPosition(position));
            }
            expected = expected.saturating_add(1);
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Blueprint Snapshot
// ============================================================================

/// Value snapshot of a blueprint captured at submission time.
///
/// # Invariants
/// - Never changes after creation; step semantics are fixed at submission.
/// - Steps are sorted in ascending position order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlueprintSnapshot {
    /// Source blueprint identifier.
    pub blueprint_id: BlueprintId,
    /// Blueprint name at capture time.
    pub name: String,
    /// Ordered steps at capture time.
    pub steps: Vec<BlueprintStep>,
}

impl BlueprintSnapshot {
    /// Captures a value snapshot with steps sorted by position.
    #[must_use]
    pub fn capture(blueprint: &Blueprint) -> Self {
        let mut steps = blueprint.steps.clone();
        steps.sort_by_key(|step| step.position.get());
        Self {
            blueprint_id: blueprint.blueprint_id,
            name: blueprint.name.clone(),
            steps,
        }
    }

    /// Returns the step at the given 1-based position.
    #[must_use]
    pub fn step_at(&self, position: u32) -> Option<&BlueprintStep> {
        self.steps.iter().find(|step| step.position.get() == position)
    }

    /// Returns the highest position in the snapshot (0 when empty).
    #[must_use]
    pub fn last_position(&self) -> u32 {
        self.steps.iter().map(|step| step.position.get()).max().unwrap_or(0)
    }
}

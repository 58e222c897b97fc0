// crates/waterline-ops/src/extract.rs
// ============================================================================
// Module: Operation Input Extraction
// Description: Parameter resolution with direct / context / config precedence.
// Purpose: Give every executor one way to find its inputs and aliases.
// Dependencies: waterline-core
// ============================================================================

//! ## Overview
//! For each named parameter an executor searches, in priority order: the
//! direct input map, then the cumulative context, then the static step
//! configuration. Strings are trimmed and empty strings collapse to absent;
//! lists preserve empty-versus-absent; alias sets collapse to one canonical
//! key with first-non-empty-wins.

// ============================================================================
// SECTION: Imports
// ============================================================================

use waterline_core::ContextMap;
use waterline_core::ContextValue;
use waterline_core::core::normalize::coerce_bool;
use waterline_core::core::normalize::coerce_float;
use waterline_core::core::normalize::coerce_int;
use waterline_core::core::normalize::coerce_string_list;
use waterline_core::core::normalize::coerce_text;
use waterline_core::interfaces::OperationInput;

// ============================================================================
// SECTION: Alias Sets
// ============================================================================

/// Canonical alias sets shared across operations. The first entry of each
/// set is the canonical parameter name reported on missing-input failures.
pub mod aliases {
    /// Company domain spellings.
    pub const COMPANY_DOMAIN: &[&str] = &["company_domain", "domain", "canonical_domain"];
    /// Company name spellings.
    pub const COMPANY_NAME: &[&str] = &["company_name", "name", "canonical_name"];
    /// LinkedIn URL spellings.
    pub const LINKEDIN_URL: &[&str] = &["linkedin_url", "company_linkedin_url"];
    /// Work email spellings.
    pub const WORK_EMAIL: &[&str] = &["work_email", "email"];
    /// Person full-name spellings.
    pub const FULL_NAME: &[&str] = &["full_name"];
    /// TheirStack job identifier spellings.
    pub const JOB_ID: &[&str] = &["theirstack_job_id", "job_id"];
    /// Job URL spellings.
    pub const JOB_URL: &[&str] = &["job_url", "url"];
}

// ============================================================================
// SECTION: Input Resolver
// ============================================================================

/// Parameter resolver over one operation input.
///
/// # Invariants
/// - Lookup precedence is direct input, then cumulative context, then step
///   configuration; explicit nulls never match.
#[derive(Debug, Clone, Copy)]
pub struct InputResolver<'a> {
    /// Operation input being resolved.
    input: &'a OperationInput,
}

impl<'a> InputResolver<'a> {
    /// Creates a resolver over the given input.
    #[must_use]
    pub const fn new(input: &'a OperationInput) -> Self {
        Self {
            input,
        }
    }

    /// Resolves a raw value by precedence, treating explicit null as absent.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<&'a ContextValue> {
        self.input
            .direct
            .get_non_null(key)
            .or_else(|| self.input.cumulative_context.get_non_null(key))
            .or_else(|| self.input.step_config.get_non_null(key))
    }

    /// Resolves trimmed text; empty strings collapse to absent.
    #[must_use]
    pub fn text(&self, key: &str) -> Option<String> {
        self.value(key).and_then(coerce_text)
    }

    /// Resolves the first non-empty text among the aliases.
    #[must_use]
    pub fn first_text(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|key| self.text(key))
    }

    /// Resolves an integer parameter.
    #[must_use]
    pub fn integer(&self, key: &str) -> Option<i64> {
        self.value(key).and_then(coerce_int)
    }

    /// Resolves the first integer among the aliases.
    #[must_use]
    pub fn first_integer(&self, keys: &[&str]) -> Option<i64> {
        keys.iter().find_map(|key| self.integer(key))
    }

    /// Resolves a float parameter.
    #[must_use]
    pub fn float(&self, key: &str) -> Option<f64> {
        self.value(key).and_then(coerce_float)
    }

    /// Resolves a boolean parameter; only real booleans qualify.
    #[must_use]
    pub fn boolean(&self, key: &str) -> Option<bool> {
        self.value(key).and_then(coerce_bool)
    }

    /// Resolves a list parameter, preserving empty-versus-absent.
    #[must_use]
    pub fn list(&self, key: &str) -> Option<&'a [ContextValue]> {
        self.value(key).and_then(ContextValue::as_list)
    }

    /// Resolves a list of cleaned strings.
    #[must_use]
    pub fn string_list(&self, key: &str) -> Option<Vec<String>> {
        self.value(key).and_then(coerce_string_list)
    }

    /// Resolves a nested map parameter.
    #[must_use]
    pub fn map(&self, key: &str) -> Option<&'a ContextMap> {
        self.value(key).and_then(ContextValue::as_map)
    }

    /// Resolves a required alias set, recording the canonical name (the
    /// first alias) into `missing` when no alias yields a value.
    #[must_use]
    pub fn require_first_text(
        &self,
        keys: &[&str],
        missing: &mut Vec<String>,
    ) -> Option<String> {
        let resolved = self.first_text(keys);
        if resolved.is_none()
            && let Some(canonical) = keys.first()
        {
            missing.push((*canonical).to_string());
        }
        resolved
    }

    /// Resolves a required raw value, recording the canonical name into
    /// `missing` when absent.
    #[must_use]
    pub fn require_value(
        &self,
        keys: &[&str],
        missing: &mut Vec<String>,
    ) -> Option<&'a ContextValue> {
        let resolved = keys.iter().find_map(|key| self.value(key));
        if resolved.is_none()
            && let Some(canonical) = keys.first()
        {
            missing.push((*canonical).to_string());
        }
        resolved
    }
}

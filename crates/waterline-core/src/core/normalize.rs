// crates/waterline-core/src/core/normalize.rs
// ============================================================================
// Module: Waterline Normalization
// Description: Pure canonicalizers for identity-bearing fields.
// Purpose: Produce stable normalized forms for domains, emails, URLs, and names.
// Dependencies: crate::core::context
// ============================================================================

//! ## Overview
//! Pure functions, no I/O. Every identity derivation, natural-key lookup, and
//! dedup key in Waterline goes through these canonicalizers so the same input
//! spelled differently lands on the same normalized form.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::context::ContextValue;

// ============================================================================
// SECTION: Text Canonicalizers
// ============================================================================

/// Trims text and collapses empty strings to absent. Case is preserved.
#[must_use]
pub fn normalize_text(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Normalizes an email address: trimmed and lowercased.
#[must_use]
pub fn normalize_email(raw: &str) -> Option<String> {
    normalize_text(raw).map(|text| text.to_lowercase())
}

/// Normalizes a LinkedIn URL: trimmed, trailing slashes stripped, lowercased.
#[must_use]
pub fn normalize_linkedin_url(raw: &str) -> Option<String> {
    let text = normalize_text(raw)?;
    let stripped = text.trim_end_matches('/');
    if stripped.is_empty() {
        None
    } else {
        Some(stripped.to_lowercase())
    }
}

/// Normalizes a domain: lowercased, scheme stripped, leading `www.` stripped,
/// any path component dropped.
#[must_use]
pub fn normalize_domain(raw: &str) -> Option<String> {
    let text = normalize_text(raw)?;
    let mut candidate = text.to_lowercase();
    if let Some((_, rest)) = candidate.split_once("://") {
        candidate = rest.to_string();
    }
    let host = candidate.split('/').next().unwrap_or_default().trim();
    let host = host.strip_prefix("www.").unwrap_or(host);
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

// ============================================================================
// SECTION: Value Coercions
// ============================================================================

/// Coerces a context value to text: text is trimmed, numbers are formatted.
///
/// Booleans, lists, maps, and nulls are not text.
#[must_use]
pub fn coerce_text(value: &ContextValue) -> Option<String> {
    match value {
        ContextValue::Text(text) => normalize_text(text),
        ContextValue::Integer(number) => Some(number.to_string()),
        ContextValue::Float(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Coerces a context value to an integer.
///
/// Floats truncate toward zero; numeric text parses through `f64` first so
/// `"42.0"` coerces to `42`. Booleans are deliberately not integers.
#[must_use]
pub fn coerce_int(value: &ContextValue) -> Option<i64> {
    match value {
        ContextValue::Integer(number) => Some(*number),
        ContextValue::Float(number) => to_i64(*number),
        ContextValue::Text(text) => {
            normalize_text(text).and_then(|cleaned| cleaned.parse::<f64>().ok()).and_then(to_i64)
        }
        _ => None,
    }
}

/// Coerces a context value to a float. Booleans are deliberately not numeric.
#[must_use]
pub fn coerce_float(value: &ContextValue) -> Option<f64> {
    match value {
        ContextValue::Integer(number) => Some(*number as f64),
        ContextValue::Float(number) => Some(*number),
        ContextValue::Text(text) => {
            normalize_text(text).and_then(|cleaned| cleaned.parse::<f64>().ok())
        }
        _ => None,
    }
}

/// Coerces a context value to a boolean. Only real booleans qualify.
#[must_use]
pub const fn coerce_bool(value: &ContextValue) -> Option<bool> {
    match value {
        ContextValue::Bool(flag) => Some(*flag),
        _ => None,
    }
}

/// Coerces a context value to a list of cleaned strings.
///
/// Non-text elements and empty strings are dropped; an empty result is absent.
#[must_use]
pub fn coerce_string_list(value: &ContextValue) -> Option<Vec<String>> {
    let ContextValue::List(items) = value else {
        return None;
    };
    let cleaned: Vec<String> = items
        .iter()
        .filter_map(|item| item.as_text())
        .filter_map(normalize_text)
        .collect();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Union-merges two string lists preserving order of first appearance.
#[must_use]
pub fn merge_string_lists(existing: &[String], incoming: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(existing.len() + incoming.len());
    for value in existing.iter().chain(incoming) {
        if !merged.contains(value) {
            merged.push(value.clone());
        }
    }
    merged
}

/// Converts a float to `i64` when finite and in range.
fn to_i64(value: f64) -> Option<i64> {
    if value.is_finite() && value >= i64::MIN as f64 && value <= i64::MAX as f64 {
        #[allow(
            clippy::cast_possible_truncation,
            reason = "Range checked above; truncation toward zero is the documented coercion."
        )]
        Some(value as i64)
    } else {
        None
    }
}

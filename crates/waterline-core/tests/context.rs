// crates/waterline-core/tests/context.rs
// ============================================================================
// Module: Cumulative Context Tests
// Description: Typed accessors and merge semantics for the context map.
// ============================================================================
//! ## Overview
//! Validates deep last-writer-wins merges, null skipping, and JSON interop
//! for the cumulative context.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use serde_json::json;
use waterline_core::ContextMap;
use waterline_core::ContextValue;

#[test]
fn json_round_trip_preserves_typed_values() {
    let map = ContextMap::from_json(json!({
        "name": "Acme",
        "employee_count": 50,
        "confidence": 0.92,
        "remote": true,
        "tags": ["a", "b"],
        "nested": {"key": "value"},
    }));
    assert_eq!(map.get_text("name"), Some("Acme"));
    assert_eq!(map.get_integer("employee_count"), Some(50));
    assert_eq!(map.get_number("confidence"), Some(0.92));
    assert_eq!(map.get_bool("remote"), Some(true));
    assert_eq!(map.get_list("tags").map(<[ContextValue]>::len), Some(2));
    assert_eq!(map.get_map("nested").and_then(|nested| nested.get_text("key")), Some("value"));

    let round_tripped = ContextMap::from_json(map.to_json());
    assert_eq!(round_tripped, map);
}

#[test]
fn deep_merge_is_last_writer_wins_and_recursive() {
    let mut base = ContextMap::from_json(json!({
        "domain": "acme.com",
        "profile": {"industry": "Software", "hq": "Austin"},
    }));
    let update = ContextMap::from_json(json!({
        "domain": "acme.io",
        "profile": {"industry": "Fintech"},
        "score": 7,
    }));
    base.merge_deep(&update);

    assert_eq!(base.get_text("domain"), Some("acme.io"));
    assert_eq!(base.get_integer("score"), Some(7));
    let profile = base.get_map("profile").unwrap();
    assert_eq!(profile.get_text("industry"), Some("Fintech"));
    assert_eq!(profile.get_text("hq"), Some("Austin"));
}

#[test]
fn merges_never_erase_with_null() {
    let mut base = ContextMap::from_json(json!({"industry": "Software"}));
    let update = ContextMap::from_json(json!({"industry": null, "name": "New"}));

    base.merge_deep(&update);
    assert_eq!(base.get_text("industry"), Some("Software"));
    assert_eq!(base.get_text("name"), Some("New"));

    let mut additive = ContextMap::from_json(json!({"industry": "Software"}));
    additive.merge_non_null(&update);
    assert_eq!(additive.get_text("industry"), Some("Software"));
}

#[test]
fn null_values_deserialize_and_read_as_absent() {
    let map = ContextMap::from_json(json!({"gone": null, "there": 1}));
    assert!(map.contains_key("gone"));
    assert!(map.get_non_null("gone").is_none());
    assert!(map.get_non_null("there").is_some());
}

#[test]
fn restriction_keeps_only_requested_keys() {
    let map = ContextMap::from_json(json!({"a": 1, "b": 2, "c": null}));
    let restricted = map.restricted_to(&["a".to_string(), "c".to_string(), "d".to_string()]);
    assert_eq!(restricted.len(), 1);
    assert_eq!(restricted.get_integer("a"), Some(1));
}

#[test]
fn serde_round_trip_via_string() {
    let map = ContextMap::from_json(json!({"k": [1, 2.5, "x", {"deep": true}]}));
    let encoded = serde_json::to_string(&map).unwrap();
    let decoded: ContextMap = serde_json::from_str(&encoded).unwrap();
    assert_eq!(decoded, map);
}

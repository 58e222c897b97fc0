// crates/waterline-ops/tests/extract.rs
// ============================================================================
// Module: Input Extraction Tests
// Description: Precedence, trimming, alias collapse, and list semantics.
// ============================================================================
//! ## Overview
//! Validates the direct / context / config lookup order and the cleaning
//! rules every executor relies on.

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
use waterline_core::OperationId;
use waterline_core::interfaces::OperationInput;
use waterline_ops::InputResolver;
use waterline_ops::aliases;

fn input(
    direct: serde_json::Value,
    context: serde_json::Value,
    config: serde_json::Value,
) -> OperationInput {
    OperationInput {
        operation_id: OperationId::new("company.enrich.test"),
        direct: ContextMap::from_json(direct),
        cumulative_context: ContextMap::from_json(context),
        step_config: ContextMap::from_json(config),
    }
}

#[test]
fn direct_input_wins_over_context_and_config() {
    let input = input(
        json!({"domain": "direct.example"}),
        json!({"domain": "context.example"}),
        json!({"domain": "config.example"}),
    );
    let resolver = InputResolver::new(&input);
    assert_eq!(resolver.text("domain"), Some("direct.example".to_string()));
}

#[test]
fn context_wins_over_config() {
    let input = input(
        json!({}),
        json!({"domain": "context.example"}),
        json!({"domain": "config.example"}),
    );
    let resolver = InputResolver::new(&input);
    assert_eq!(resolver.text("domain"), Some("context.example".to_string()));
}

#[test]
fn config_is_the_final_fallback() {
    let input = input(json!({}), json!({}), json!({"limit": 25}));
    let resolver = InputResolver::new(&input);
    assert_eq!(resolver.integer("limit"), Some(25));
}

#[test]
fn empty_strings_collapse_to_absent_and_fall_through() {
    let input = input(
        json!({"domain": "   "}),
        json!({"domain": "context.example"}),
        json!({}),
    );
    let resolver = InputResolver::new(&input);
    assert_eq!(resolver.text("domain"), Some("context.example".to_string()));
}

#[test]
fn explicit_null_falls_through_to_the_next_source() {
    let input = input(json!({"domain": null}), json!({"domain": "context.example"}), json!({}));
    let resolver = InputResolver::new(&input);
    assert_eq!(resolver.text("domain"), Some("context.example".to_string()));
}

#[test]
fn alias_collapse_takes_the_first_non_empty() {
    let input = input(
        json!({"canonical_domain": "acme.com"}),
        json!({"company_domain": "other.example"}),
        json!({}),
    );
    let resolver = InputResolver::new(&input);
    // `company_domain` is probed first but absent from direct input; the
    // context value wins because precedence is evaluated per alias.
    assert_eq!(
        resolver.first_text(aliases::COMPANY_DOMAIN),
        Some("other.example".to_string())
    );
}

#[test]
fn lists_preserve_empty_versus_absent() {
    let input = input(json!({"tags": []}), json!({}), json!({}));
    let resolver = InputResolver::new(&input);
    assert_eq!(resolver.list("tags").map(<[waterline_core::ContextValue]>::len), Some(0));
    assert_eq!(resolver.list("missing"), None);
}

#[test]
fn required_lookup_records_the_canonical_name() {
    let input = input(json!({}), json!({}), json!({}));
    let resolver = InputResolver::new(&input);
    let mut missing = Vec::new();
    let resolved = resolver.require_first_text(aliases::COMPANY_DOMAIN, &mut missing);
    assert!(resolved.is_none());
    assert_eq!(missing, vec!["company_domain".to_string()]);
}

#[test]
fn boolean_and_map_lookups_are_typed() {
    let input = input(
        json!({"remote": true, "filters": {"country": "US"}}),
        json!({}),
        json!({}),
    );
    let resolver = InputResolver::new(&input);
    assert_eq!(resolver.boolean("remote"), Some(true));
    assert_eq!(
        resolver.map("filters").and_then(|filters| filters.get_text("country")),
        Some("US")
    );
}

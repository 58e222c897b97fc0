// crates/waterline-config/tests/config.rs
// ============================================================================
// Module: Configuration Tests
// Description: Parsing defaults, range validation, and fail-closed behavior.
// ============================================================================
//! ## Overview
//! Validates that an empty config is usable, that every section parses, and
//! that out-of-range or unknown values fail closed.

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

use std::io::Write;

use waterline_config::ConfigError;
use waterline_config::DispatcherMode;
use waterline_config::WaterlineConfig;

#[test]
fn empty_config_uses_defaults() {
    let config = WaterlineConfig::from_toml("").unwrap();
    assert_eq!(config.engine.max_fan_out_depth, 3);
    assert_eq!(config.engine.default_step_timeout_ms, 30_000);
    assert_eq!(config.store.busy_timeout_ms, 5_000);
    assert_eq!(config.dispatcher.mode, DispatcherMode::Local);
    assert!(!config.http.allow_http);

    let engine = config.engine.engine_config();
    assert_eq!(engine.max_fan_out_depth, 3);
}

#[test]
fn full_config_parses_every_section() {
    let config = WaterlineConfig::from_toml(
        r#"
        [engine]
        max_fan_out_depth = 2
        default_step_timeout_ms = 15000
        max_entities_per_submission = 50

        [store]
        path = "data/waterline.db"
        busy_timeout_ms = 2500
        journal_mode = "delete"
        sync_mode = "normal"

        [dispatcher]
        mode = "http"
        endpoint = "https://runner.example/api/v1/tasks/run-pipeline/trigger"
        secret_env = "RUNNER_SECRET"
        timeout_ms = 10000

        [http]
        timeout_ms = 20000
        user_agent = "waterline/0.1"
        max_response_bytes = 65536
        "#,
    )
    .unwrap();

    assert_eq!(config.engine.max_fan_out_depth, 2);
    assert_eq!(config.store.path.to_string_lossy(), "data/waterline.db");
    assert_eq!(config.dispatcher.mode, DispatcherMode::Http);
    assert!(config.dispatcher.endpoint.is_some());
    assert_eq!(config.http.max_response_bytes, 65_536);

    let store = config.store.store_config();
    assert_eq!(store.busy_timeout_ms, 2_500);
}

#[test]
fn unknown_keys_fail_closed() {
    let error = WaterlineConfig::from_toml("[engine]\nmystery_knob = 1\n").unwrap_err();
    assert!(matches!(error, ConfigError::Parse(_)));
}

#[test]
fn out_of_range_depth_is_rejected() {
    let error = WaterlineConfig::from_toml("[engine]\nmax_fan_out_depth = 99\n").unwrap_err();
    assert!(matches!(error, ConfigError::Invalid(_)));

    let zero = WaterlineConfig::from_toml("[engine]\nmax_fan_out_depth = 0\n").unwrap_err();
    assert!(matches!(zero, ConfigError::Invalid(_)));
}

#[test]
fn http_dispatcher_requires_an_endpoint() {
    let error = WaterlineConfig::from_toml("[dispatcher]\nmode = \"http\"\n").unwrap_err();
    assert!(matches!(error, ConfigError::Invalid(_)));
}

#[test]
fn timeout_ranges_are_enforced() {
    let too_small = WaterlineConfig::from_toml("[http]\ntimeout_ms = 10\n").unwrap_err();
    assert!(matches!(too_small, ConfigError::Invalid(_)));

    let too_large =
        WaterlineConfig::from_toml("[dispatcher]\ntimeout_ms = 600000\n").unwrap_err();
    assert!(matches!(too_large, ConfigError::Invalid(_)));
}

#[test]
fn load_reads_an_explicit_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("waterline.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "[engine]\nmax_fan_out_depth = 4").unwrap();

    let config = WaterlineConfig::load(Some(&path)).unwrap();
    assert_eq!(config.engine.max_fan_out_depth, 4);
}

#[test]
fn load_fails_on_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.toml");
    let error = WaterlineConfig::load(Some(&missing)).unwrap_err();
    assert!(matches!(error, ConfigError::Io(_)));
}

#[test]
fn empty_user_agent_is_rejected() {
    let error = WaterlineConfig::from_toml("[http]\nuser_agent = \"  \"\n").unwrap_err();
    assert!(matches!(error, ConfigError::Invalid(_)));
}

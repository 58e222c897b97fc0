// crates/waterline-ops/tests/http.rs
// ============================================================================
// Module: HTTP Executor Tests
// Description: Envelope normalization for the generic HTTP JSON adapter.
// ============================================================================
//! ## Overview
//! Validates status mapping (found / not-found / failed / skipped), attempt
//! telemetry, and fail-closed response validation against a local stub
//! server.

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

use std::thread;

use serde_json::json;
use url::Url;
use waterline_core::ContextMap;
use waterline_core::OperationId;
use waterline_core::OperationStatus;
use waterline_core::interfaces::OperationExecutor;
use waterline_core::interfaces::OperationInput;
use waterline_ops::HttpExecutorError;
use waterline_ops::HttpJsonExecutor;
use waterline_ops::HttpMethod;
use waterline_ops::HttpOperationConfig;
use waterline_ops::RequiredInput;

/// Serves one canned response on a local port and returns its base URL.
fn stub_server(status: u16, body: &'static str) -> Url {
    let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
    let port = server.server_addr().to_ip().unwrap().port();
    thread::spawn(move || {
        for request in server.incoming_requests() {
            let response = tiny_http::Response::from_string(body)
                .with_status_code(tiny_http::StatusCode(status));
            let _ = request.respond(response);
        }
    });
    Url::parse(&format!("http://127.0.0.1:{port}/")).unwrap()
}

fn config(endpoint: Url) -> HttpOperationConfig {
    HttpOperationConfig {
        operation_id: OperationId::new("company.search.by_tech_stack"),
        provider: "theirstack".to_string(),
        action: "company_search".to_string(),
        method: HttpMethod::Post,
        endpoint,
        api_key_env: None,
        api_key_header: None,
        required_inputs: vec![RequiredInput::new(
            "company_domain",
            &["domain", "canonical_domain"],
        )],
        optional_inputs: vec![RequiredInput::new("limit", &[])],
        records_key: Some("results".to_string()),
        timeout_ms: 5_000,
        max_response_bytes: 64 * 1024,
        user_agent: "waterline-test/0.1".to_string(),
        allow_http: true,
    }
}

fn input_with_domain() -> OperationInput {
    OperationInput {
        operation_id: OperationId::new("company.search.by_tech_stack"),
        direct: ContextMap::new(),
        cumulative_context: ContextMap::from_json(json!({"domain": "acme.com"})),
        step_config: ContextMap::from_json(json!({"limit": 25})),
    }
}

#[tokio::test]
async fn found_when_records_are_present() {
    let endpoint = stub_server(200, r#"{"results": [{"name": "Acme"}], "total": 1}"#);
    let executor = HttpJsonExecutor::new(config(endpoint)).unwrap();
    let envelope = executor.execute(&input_with_domain()).await;

    assert_eq!(envelope.status, OperationStatus::Found);
    let output = envelope.output.unwrap();
    assert_eq!(output.get_integer("total"), Some(1));

    assert_eq!(envelope.provider_attempts.len(), 1);
    let attempt = &envelope.provider_attempts[0];
    assert_eq!(attempt.provider, "theirstack");
    assert_eq!(attempt.http_status, Some(200));
    assert!(attempt.duration_ms.is_some());
    assert!(attempt.raw_response.is_some());
}

#[tokio::test]
async fn not_found_when_records_are_empty() {
    let endpoint = stub_server(200, r#"{"results": []}"#);
    let executor = HttpJsonExecutor::new(config(endpoint)).unwrap();
    let envelope = executor.execute(&input_with_domain()).await;

    assert_eq!(envelope.status, OperationStatus::NotFound);
    assert!(envelope.output.is_some(), "not_found retains the mapped output");
    assert_eq!(envelope.provider_attempts[0].status, OperationStatus::NotFound);
}

#[tokio::test]
async fn http_error_status_fails_the_envelope() {
    let endpoint = stub_server(500, r#"{"error": "boom"}"#);
    let executor = HttpJsonExecutor::new(config(endpoint)).unwrap();
    let envelope = executor.execute(&input_with_domain()).await;

    assert_eq!(envelope.status, OperationStatus::Failed);
    let error = envelope.error.unwrap();
    assert_eq!(error.code, "provider_http_error");
    assert_eq!(envelope.provider_attempts[0].http_status, Some(500));
}

#[tokio::test]
async fn invalid_json_fails_output_validation() {
    let endpoint = stub_server(200, "this is not json");
    let executor = HttpJsonExecutor::new(config(endpoint)).unwrap();
    let envelope = executor.execute(&input_with_domain()).await;

    assert_eq!(envelope.status, OperationStatus::Failed);
    assert_eq!(envelope.error.unwrap().code, "output_validation_failed");
}

#[tokio::test]
async fn missing_records_key_fails_output_validation() {
    let endpoint = stub_server(200, r#"{"rows": []}"#);
    let executor = HttpJsonExecutor::new(config(endpoint)).unwrap();
    let envelope = executor.execute(&input_with_domain()).await;

    assert_eq!(envelope.status, OperationStatus::Failed);
    assert_eq!(envelope.error.unwrap().code, "output_validation_failed");
}

#[tokio::test]
async fn missing_inputs_fail_without_calling_the_provider() {
    // No server: a network call would error differently than missing inputs.
    let endpoint = Url::parse("http://127.0.0.1:9/").unwrap();
    let executor = HttpJsonExecutor::new(config(endpoint)).unwrap();
    let input = OperationInput {
        operation_id: OperationId::new("company.search.by_tech_stack"),
        direct: ContextMap::new(),
        cumulative_context: ContextMap::new(),
        step_config: ContextMap::new(),
    };
    let envelope = executor.execute(&input).await;

    assert_eq!(envelope.status, OperationStatus::Failed);
    assert_eq!(envelope.missing_inputs, Some(vec!["company_domain".to_string()]));
    assert_eq!(
        envelope.provider_attempts[0].skip_reason.as_deref(),
        Some("missing_required_inputs")
    );
}

#[tokio::test]
async fn absent_api_key_skips_the_operation() {
    let endpoint = stub_server(200, r#"{"results": [{}]}"#);
    let mut config = config(endpoint);
    config.api_key_env = Some("WATERLINE_TEST_ABSENT_KEY".to_string());
    let executor = HttpJsonExecutor::new(config).unwrap();
    let envelope = executor.execute(&input_with_domain()).await;

    assert_eq!(envelope.status, OperationStatus::Skipped);
    assert!(envelope.output.is_none());
    assert!(
        envelope.provider_attempts[0]
            .skip_reason
            .as_deref()
            .unwrap()
            .starts_with("missing_api_key"),
    );
}

#[tokio::test]
async fn get_requests_carry_inputs_as_query_parameters() {
    let endpoint = stub_server(200, r#"{"results": [{"ok": true}]}"#);
    let mut config = config(endpoint);
    config.method = HttpMethod::Get;
    let executor = HttpJsonExecutor::new(config).unwrap();
    let envelope = executor.execute(&input_with_domain()).await;
    assert_eq!(envelope.status, OperationStatus::Found);
}

#[test]
fn cleartext_endpoints_require_the_opt_in() {
    let mut config = config(Url::parse("http://plain.example/").unwrap());
    config.allow_http = false;
    let error = HttpJsonExecutor::new(config).unwrap_err();
    assert!(matches!(error, HttpExecutorError::SchemeNotAllowed(_)));
}

#[tokio::test]
async fn connection_failure_is_a_provider_error() {
    // Port 9 (discard) is not listening; the connect fails fast.
    let endpoint = Url::parse("http://127.0.0.1:9/").unwrap();
    let executor = HttpJsonExecutor::new(config(endpoint)).unwrap();
    let envelope = executor.execute(&input_with_domain()).await;

    assert_eq!(envelope.status, OperationStatus::Failed);
    assert!(envelope.provider_attempts[0].error.is_some());
}

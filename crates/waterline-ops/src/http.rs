// crates/waterline-ops/src/http.rs
// ============================================================================
// Module: HTTP JSON Executor
// Description: Generic HTTP-backed operation executor with bounded responses.
// Purpose: Embody the provider adapter contract for JSON HTTP integrations.
// Dependencies: waterline-core, reqwest, serde, serde_json, thiserror, url
// ============================================================================

//! ## Overview
//! The HTTP JSON executor is the configurable adapter most provider
//! integrations instantiate: it resolves declared inputs through the
//! direct / context / config precedence, reads its API key from an
//! environment variable (absent key means the operation is skipped, not
//! failed), issues one bounded JSON request, and normalizes every outcome
//! into the operation envelope with per-attempt telemetry.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::redirect::Policy;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use waterline_core::ContextMap;
use waterline_core::ContextValue;
use waterline_core::OperationEnvelope;
use waterline_core::OperationError;
use waterline_core::OperationId;
use waterline_core::OperationStatus;
use waterline_core::ProviderAttempt;
use waterline_core::error_codes;
use waterline_core::interfaces::OperationExecutor;
use waterline_core::interfaces::OperationInput;

use crate::extract::InputResolver;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// HTTP method used by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HttpMethod {
    /// Inputs are sent as query parameters.
    Get,
    /// Inputs are sent as a JSON body.
    Post,
}

/// One declared input parameter with its alias set.
///
/// # Invariants
/// - The first alias is the canonical name reported on missing inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredInput {
    /// Canonical parameter name.
    pub name: String,
    /// Additional accepted aliases.
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl RequiredInput {
    /// Declares a parameter with aliases.
    #[must_use]
    pub fn new(name: impl Into<String>, aliases: &[&str]) -> Self {
        Self {
            name: name.into(),
            aliases: aliases.iter().map(ToString::to_string).collect(),
        }
    }

    /// Returns the full alias list, canonical name first.
    fn lookup_keys(&self) -> Vec<&str> {
        let mut keys = Vec::with_capacity(self.aliases.len() + 1);
        keys.push(self.name.as_str());
        keys.extend(self.aliases.iter().map(String::as_str));
        keys
    }
}

/// Configuration for one HTTP JSON operation.
///
/// # Invariants
/// - `endpoint` must be `https://` unless `allow_http` is set.
/// - `max_response_bytes` is a hard upper bound on response bodies.
/// - A configured `api_key_env` with no value at call time skips the
///   operation instead of failing it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HttpOperationConfig {
    /// Operation this executor serves.
    pub operation_id: OperationId,
    /// Provider name recorded in attempt telemetry.
    pub provider: String,
    /// Provider action recorded in attempt telemetry.
    pub action: String,
    /// HTTP method.
    pub method: HttpMethod,
    /// Endpoint URL.
    pub endpoint: Url,
    /// Environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Header carrying the API key; `Authorization: Bearer` when unset.
    #[serde(default)]
    pub api_key_header: Option<String>,
    /// Required inputs resolved before the call.
    #[serde(default)]
    pub required_inputs: Vec<RequiredInput>,
    /// Optional inputs forwarded when present.
    #[serde(default)]
    pub optional_inputs: Vec<RequiredInput>,
    /// Response key whose list emptiness decides found versus not-found.
    #[serde(default)]
    pub records_key: Option<String>,
    /// Request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Maximum response size in bytes.
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,
    /// User agent for outbound requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Allow cleartext HTTP endpoints (disabled by default).
    #[serde(default)]
    pub allow_http: bool,
}

/// Default request timeout.
const fn default_timeout_ms() -> u64 {
    30_000
}

/// Default response size cap.
const fn default_max_response_bytes() -> usize {
    1024 * 1024
}

/// Default user agent.
fn default_user_agent() -> String {
    "waterline/0.1".to_string()
}

/// Errors building an HTTP executor.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum HttpExecutorError {
    /// The endpoint scheme is not allowed by configuration.
    #[error("endpoint scheme not allowed: {0}")]
    SchemeNotAllowed(String),
    /// The HTTP client could not be constructed.
    #[error("http client build failed: {0}")]
    ClientBuild(String),
}

// ============================================================================
// SECTION: Executor
// ============================================================================

/// Generic HTTP JSON operation executor.
///
/// # Invariants
/// - Redirects are not followed.
/// - Responses exceeding the configured size cap fail validation.
#[derive(Debug)]
pub struct HttpJsonExecutor {
    /// Executor configuration.
    config: HttpOperationConfig,
    /// Shared HTTP client.
    client: Client,
}

impl HttpJsonExecutor {
    /// Creates an executor, validating the endpoint and building the client.
    ///
    /// # Errors
    ///
    /// Returns [`HttpExecutorError`] when the endpoint scheme is rejected or
    /// the client cannot be built.
    pub fn new(config: HttpOperationConfig) -> Result<Self, HttpExecutorError> {
        match config.endpoint.scheme() {
            "https" => {}
            "http" if config.allow_http => {}
            other => return Err(HttpExecutorError::SchemeNotAllowed(other.to_string())),
        }
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.clone())
            .redirect(Policy::none())
            .build()
            .map_err(|err| HttpExecutorError::ClientBuild(err.to_string()))?;
        Ok(Self {
            config,
            client,
        })
    }

    /// Returns the operation identifier this executor serves.
    #[must_use]
    pub const fn operation_id(&self) -> &OperationId {
        &self.config.operation_id
    }

    /// Resolves declared inputs into a parameter map, collecting missing
    /// canonical names.
    fn resolve_params(
        &self,
        resolver: &InputResolver<'_>,
        missing: &mut Vec<String>,
    ) -> ContextMap {
        let mut params = ContextMap::new();
        for input in &self.config.required_inputs {
            if let Some(value) = resolver.require_value(&input.lookup_keys(), missing) {
                params.insert(input.name.clone(), value.clone());
            }
        }
        for input in &self.config.optional_inputs {
            let keys = input.lookup_keys();
            if let Some(value) = keys.iter().find_map(|key| resolver.value(key)) {
                params.insert(input.name.clone(), value.clone());
            }
        }
        params
    }

    /// Reads the API key from the environment, when configured.
    ///
    /// `Ok(None)` means no key is required; `Err` carries the missing
    /// variable name.
    fn api_key(&self) -> Result<Option<String>, String> {
        let Some(env_name) = &self.config.api_key_env else {
            return Ok(None);
        };
        match env::var(env_name) {
            Ok(value) if !value.trim().is_empty() => Ok(Some(value)),
            _ => Err(env_name.clone()),
        }
    }

    /// Builds the outbound request for the resolved parameters.
    fn build_request(&self, params: &ContextMap, api_key: Option<&str>) -> reqwest::RequestBuilder {
        let mut request = match self.config.method {
            HttpMethod::Get => {
                let mut url = self.config.endpoint.clone();
                {
                    let mut pairs = url.query_pairs_mut();
                    for (key, value) in params {
                        if let Some(text) = context_value_text(value) {
                            pairs.append_pair(key, &text);
                        }
                    }
                }
                self.client.get(url)
            }
            HttpMethod::Post => {
                self.client.post(self.config.endpoint.clone()).json(&params.to_json())
            }
        };
        if let Some(key) = api_key {
            request = match &self.config.api_key_header {
                Some(header) => request.header(header.as_str(), key),
                None => request.bearer_auth(key),
            };
        }
        request
    }

    /// Classifies a parsed response object into found or not-found.
    fn classify_output(&self, output: &ContextMap) -> Result<OperationStatus, String> {
        if let Some(records_key) = &self.config.records_key {
            return match output.get(records_key) {
                Some(ContextValue::List(items)) => {
                    if items.is_empty() {
                        Ok(OperationStatus::NotFound)
                    } else {
                        Ok(OperationStatus::Found)
                    }
                }
                _ => Err(format!("response is missing list key: {records_key}")),
            };
        }
        if output.is_empty() {
            Ok(OperationStatus::NotFound)
        } else {
            Ok(OperationStatus::Found)
        }
    }
}

#[async_trait]
impl OperationExecutor for HttpJsonExecutor {
    #[allow(
        clippy::too_many_lines,
        reason = "Single linear flow keeps the attempt telemetry ordering auditable."
    )]
    async fn execute(&self, input: &OperationInput) -> OperationEnvelope {
        let operation_id = self.config.operation_id.clone();
        let resolver = InputResolver::new(input);

        let mut missing = Vec::new();
        let params = self.resolve_params(&resolver, &mut missing);
        if !missing.is_empty() {
            let attempt = ProviderAttempt::skipped(
                self.config.provider.clone(),
                self.config.action.clone(),
                "missing_required_inputs",
            );
            return OperationEnvelope::missing_inputs(operation_id, missing, vec![attempt]);
        }

        let api_key = match self.api_key() {
            Ok(key) => key,
            Err(env_name) => {
                let attempt = ProviderAttempt::skipped(
                    self.config.provider.clone(),
                    self.config.action.clone(),
                    format!("missing_api_key:{env_name}"),
                );
                return OperationEnvelope::skipped(operation_id, vec![attempt]);
            }
        };

        let started = Instant::now();
        let response =
            match self.build_request(&params, api_key.as_deref()).send().await {
                Ok(response) => response,
                Err(err) => {
                    let (code, message) = if err.is_timeout() {
                        (error_codes::TIMEOUT, "timeout".to_string())
                    } else {
                        (error_codes::PROVIDER_HTTP_ERROR, format!("request failed: {err}"))
                    };
                    let mut attempt = ProviderAttempt::failed(
                        self.config.provider.clone(),
                        self.config.action.clone(),
                        message.clone(),
                    );
                    attempt.duration_ms = Some(elapsed_ms(started));
                    return OperationEnvelope::failed(
                        operation_id,
                        OperationError::new(code, message),
                        vec![attempt],
                    );
                }
            };

        let http_status = response.status().as_u16();
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(err) => {
                let message = format!("failed to read response: {err}");
                let mut attempt = ProviderAttempt::failed(
                    self.config.provider.clone(),
                    self.config.action.clone(),
                    message.clone(),
                );
                attempt.http_status = Some(http_status);
                attempt.duration_ms = Some(elapsed_ms(started));
                return OperationEnvelope::failed(
                    operation_id,
                    OperationError::new(error_codes::PROVIDER_HTTP_ERROR, message),
                    vec![attempt],
                );
            }
        };
        let duration_ms = elapsed_ms(started);

        let mut attempt = ProviderAttempt::new(
            self.config.provider.clone(),
            self.config.action.clone(),
            OperationStatus::Found,
        );
        attempt.http_status = Some(http_status);
        attempt.duration_ms = Some(duration_ms);

        if http_status >= 400 {
            attempt.status = OperationStatus::Failed;
            attempt.error = Some(format!("http {http_status}"));
            return OperationEnvelope::failed(
                operation_id,
                OperationError::new(
                    error_codes::PROVIDER_HTTP_ERROR,
                    format!("provider returned http {http_status}"),
                ),
                vec![attempt],
            );
        }

        if body.len() > self.config.max_response_bytes {
            attempt.status = OperationStatus::Failed;
            attempt.error = Some("response exceeds size limit".to_string());
            return OperationEnvelope::failed(
                operation_id,
                OperationError::new(
                    error_codes::OUTPUT_VALIDATION_FAILED,
                    "response exceeds size limit",
                ),
                vec![attempt],
            );
        }

        let parsed: Value = match serde_json::from_slice(&body) {
            Ok(parsed) => parsed,
            Err(err) => {
                attempt.status = OperationStatus::Failed;
                attempt.error = Some(format!("invalid json: {err}"));
                return OperationEnvelope::failed(
                    operation_id,
                    OperationError::new(
                        error_codes::OUTPUT_VALIDATION_FAILED,
                        format!("response is not valid json: {err}"),
                    ),
                    vec![attempt],
                );
            }
        };
        if !parsed.is_object() {
            attempt.status = OperationStatus::Failed;
            attempt.error = Some("response is not an object".to_string());
            return OperationEnvelope::failed(
                operation_id,
                OperationError::new(
                    error_codes::OUTPUT_VALIDATION_FAILED,
                    "response is not a json object",
                ),
                vec![attempt],
            );
        }

        attempt.raw_response = Some(parsed.clone());
        let output = ContextMap::from_json(parsed);
        match self.classify_output(&output) {
            Ok(OperationStatus::Found) => {
                OperationEnvelope::found(operation_id, output, vec![attempt])
            }
            Ok(_) => {
                attempt.status = OperationStatus::NotFound;
                OperationEnvelope::not_found(operation_id, output, vec![attempt])
            }
            Err(message) => {
                attempt.status = OperationStatus::Failed;
                attempt.error = Some(message.clone());
                OperationEnvelope::failed(
                    operation_id,
                    OperationError::new(error_codes::OUTPUT_VALIDATION_FAILED, message),
                    vec![attempt],
                )
            }
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Milliseconds elapsed since `started`.
fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Renders a context value as query-parameter text.
fn context_value_text(value: &ContextValue) -> Option<String> {
    match value {
        ContextValue::Text(text) => Some(text.clone()),
        ContextValue::Integer(number) => Some(number.to_string()),
        ContextValue::Float(number) => Some(number.to_string()),
        ContextValue::Bool(flag) => Some(flag.to_string()),
        ContextValue::Null | ContextValue::List(_) | ContextValue::Map(_) => None,
    }
}

// crates/waterline-dispatch/src/http.rs
// ============================================================================
// Module: HTTP Task Dispatcher
// Description: Dispatcher POSTing run tasks to an external task runner.
// Purpose: Trigger fire-and-forget run execution with a bearer secret.
// Dependencies: waterline-core, reqwest, serde, serde_json, tokio, url
// ============================================================================

//! ## Overview
//! Hands each run task to an external task runner over HTTPS. The runner
//! eventually calls back into the engine with the task payload; this side
//! only records the runner's run handle. Rejections surface as dispatch
//! errors for the engine to mark the affected run failed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::redirect::Policy;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use url::Url;

use waterline_core::TaskId;
use waterline_core::Timestamp;
use waterline_core::interfaces::DispatchError;
use waterline_core::interfaces::RunTask;
use waterline_core::interfaces::TaskDispatcher;
use waterline_core::interfaces::TaskReceipt;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Configuration for the HTTP task dispatcher.
///
/// # Invariants
/// - `endpoint` must be `https://` unless `allow_http` is set.
/// - The bearer secret is read from `secret_env` at dispatch time and never
///   stored in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HttpDispatcherConfig {
    /// Task runner trigger endpoint.
    pub endpoint: Url,
    /// Environment variable holding the bearer secret.
    #[serde(default)]
    pub secret_env: Option<String>,
    /// Request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// User agent for outbound requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Allow cleartext HTTP endpoints (disabled by default).
    #[serde(default)]
    pub allow_http: bool,
}

/// Default dispatch timeout.
const fn default_timeout_ms() -> u64 {
    20_000
}

/// Default user agent.
fn default_user_agent() -> String {
    "waterline/0.1".to_string()
}

/// Errors building the HTTP dispatcher.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum HttpDispatcherError {
    /// The endpoint scheme is not allowed by configuration.
    #[error("endpoint scheme not allowed: {0}")]
    SchemeNotAllowed(String),
    /// The HTTP client could not be constructed.
    #[error("http client build failed: {0}")]
    ClientBuild(String),
}

// ============================================================================
// SECTION: Wire Shapes
// ============================================================================

/// Trigger request body sent to the task runner.
#[derive(Debug, Serialize)]
struct TriggerBody<'a> {
    /// Task payload delivered back to the engine.
    payload: &'a RunTask,
}

/// Trigger response body from the task runner.
#[derive(Debug, Deserialize)]
struct TriggerResponse {
    /// Runner-side run handle.
    id: Option<String>,
}

// ============================================================================
// SECTION: Dispatcher
// ============================================================================

/// Dispatcher POSTing run tasks to an external task runner.
#[derive(Debug)]
pub struct HttpTaskDispatcher {
    /// Dispatcher configuration.
    config: HttpDispatcherConfig,
    /// Shared HTTP client.
    client: Client,
}

impl HttpTaskDispatcher {
    /// Creates the dispatcher, validating the endpoint and building the
    /// client.
    ///
    /// # Errors
    ///
    /// Returns [`HttpDispatcherError`] when the endpoint scheme is rejected
    /// or the client cannot be built.
    pub fn new(config: HttpDispatcherConfig) -> Result<Self, HttpDispatcherError> {
        match config.endpoint.scheme() {
            "https" => {}
            "http" if config.allow_http => {}
            other => return Err(HttpDispatcherError::SchemeNotAllowed(other.to_string())),
        }
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.clone())
            .redirect(Policy::none())
            .build()
            .map_err(|err| HttpDispatcherError::ClientBuild(err.to_string()))?;
        Ok(Self {
            config,
            client,
        })
    }

    /// Reads the bearer secret from the environment, when configured.
    fn secret(&self) -> Result<Option<String>, DispatchError> {
        let Some(env_name) = &self.config.secret_env else {
            return Ok(None);
        };
        match env::var(env_name) {
            Ok(value) if !value.trim().is_empty() => Ok(Some(value)),
            _ => Err(DispatchError::DispatchFailed(format!(
                "dispatcher secret is not configured: {env_name}"
            ))),
        }
    }
}

#[async_trait]
impl TaskDispatcher for HttpTaskDispatcher {
    async fn dispatch(&self, task: &RunTask) -> Result<TaskReceipt, DispatchError> {
        let secret = self.secret()?;
        let mut request = self.client.post(self.config.endpoint.clone()).json(&TriggerBody {
            payload: task,
        });
        if let Some(secret) = secret {
            request = request.bearer_auth(secret);
        }

        let response = request.send().await.map_err(|err| {
            DispatchError::DispatchFailed(format!("task runner request failed: {err}"))
        })?;
        let status = response.status();
        if !status.is_success() {
            tracing::warn!(run_id = %task.run_id, status = status.as_u16(), "task runner rejected dispatch");
            return Err(DispatchError::DispatchFailed(format!(
                "task runner returned http {}",
                status.as_u16()
            )));
        }

        let body: TriggerResponse = response.json().await.map_err(|err| {
            DispatchError::DispatchFailed(format!("task runner response invalid: {err}"))
        })?;
        Ok(TaskReceipt {
            task_id: task.task_id.clone(),
            runner_run_id: body.id.map(TaskId::new),
            accepted_at: Timestamp::now_utc(),
        })
    }
}

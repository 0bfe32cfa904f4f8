//! HTTP client for the agent under test
//!
//! Sends a test case's input to the real agent endpoint and parses whatever
//! comes back: a JSON answer object, a Server-Sent Events stream dump, or
//! plain text. Only connect-level failures are retried; HTTP error statuses
//! are reported to the runner as results, not retried.

use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::config::AgentConfig;
use crate::retry::{RetryPolicy, with_retry};
use crate::{Error, Result};

/// LLM settings forwarded with every agent request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Model identifier
    pub model: String,
    /// Sampling temperature
    pub temperature: f64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4.1-mini-2025-04-14".to_string(),
            temperature: 0.0,
        }
    }
}

/// A request to the agent built from one test case.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    /// User input text
    pub user_input: String,
    /// Scenario variables
    pub variables: Option<serde_json::Map<String, Value>>,
    /// Session identifier, for harness-side tracking only
    pub session_id: String,
    /// LLM settings
    pub llm: LlmConfig,
}

impl AgentRequest {
    /// JSON payload sent to the agent. Fixture declarations and the session
    /// id are harness-internal and never forwarded.
    #[must_use]
    pub fn payload(&self) -> Value {
        let mut payload = json!({
            "userInput": self.user_input,
            "llm": {
                "model": self.llm.model,
                "temperature": self.llm.temperature,
            }
        });
        if let Some(vars) = &self.variables {
            if !vars.is_empty() {
                payload["variables"] = Value::Object(vars.clone());
            }
        }
        payload
    }
}

/// Raw reply from the agent endpoint.
#[derive(Debug, Clone)]
pub struct AgentReply {
    /// HTTP status code
    pub status: u16,
    /// Response body text
    pub body: String,
    /// Round-trip time in milliseconds
    pub response_time_ms: f64,
}

/// Parsed agent answer.
#[derive(Debug, Clone, Default)]
pub struct AgentResponse {
    /// The answer text
    pub answer: String,
    /// Session id reported by the agent, if any
    pub session_id: Option<String>,
    /// Tool calls the agent reports having made
    pub tool_calls_made: Option<Value>,
    /// Any additional metadata
    pub metadata: Option<Value>,
}

impl AgentResponse {
    /// Parse a response body: JSON object first, then SSE, then plain text.
    #[must_use]
    pub fn parse(body: &str) -> Self {
        if let Ok(Value::Object(data)) = serde_json::from_str::<Value>(body) {
            return Self {
                answer: data
                    .get("answer")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                session_id: data
                    .get("session_id")
                    .and_then(Value::as_str)
                    .map(String::from),
                tool_calls_made: data.get("tool_calls_made").cloned(),
                metadata: data.get("metadata").cloned(),
            };
        }

        if body.contains("event:") && body.contains("data:") {
            return Self {
                answer: parse_sse_answer(body),
                session_id: extract_sse_session(body),
                ..Self::default()
            };
        }

        Self {
            answer: body.to_string(),
            ..Self::default()
        }
    }
}

/// Accumulate the `data:` payloads of `event: text` frames into one answer.
fn parse_sse_answer(sse: &str) -> String {
    let lines: Vec<&str> = sse.lines().map(str::trim).collect();
    let mut answer = String::new();
    for window in lines.windows(2) {
        let [event, data] = window else { continue };
        if event.starts_with("event: text") {
            if let Some(content) = data.strip_prefix("data: ") {
                answer.push_str(content);
            }
        }
    }
    answer.trim().to_string()
}

/// Pull the session id out of an `event: session-started` frame.
fn extract_sse_session(sse: &str) -> Option<String> {
    let lines: Vec<&str> = sse.lines().map(str::trim).collect();
    for window in lines.windows(2) {
        let [event, data] = window else { continue };
        if !event.starts_with("event: session-started") {
            continue;
        }
        let content = data.strip_prefix("data: ")?;
        let parsed: Value = serde_json::from_str(content).ok()?;
        return parsed.get("sessionId").map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });
    }
    None
}

/// HTTP client bound to one agent configuration.
pub struct AgentClient {
    client: reqwest::Client,
    config: AgentConfig,
    policy: RetryPolicy,
}

impl AgentClient {
    /// Build a client with the agent's headers, auth, and timeout applied.
    pub fn new(config: AgentConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(extra) = &config.headers {
            for (name, value) in extra {
                let name = HeaderName::from_bytes(name.as_bytes())
                    .map_err(|e| Error::Config(format!("Invalid header name '{name}': {e}")))?;
                let value = HeaderValue::from_str(value)
                    .map_err(|e| Error::Config(format!("Invalid header value: {e}")))?;
                headers.insert(name, value);
            }
        }
        if let Some(auth) = &config.auth_header {
            headers.insert(
                reqwest::header::AUTHORIZATION,
                HeaderValue::from_str(auth)
                    .map_err(|e| Error::Config(format!("Invalid auth header: {e}")))?,
            );
        }
        if let Some(cookie) = &config.cookie_header {
            headers.insert(
                reqwest::header::COOKIE,
                HeaderValue::from_str(cookie)
                    .map_err(|e| Error::Config(format!("Invalid cookie header: {e}")))?,
            );
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        let policy = RetryPolicy::new(config.max_retries, config.retry_delay_seconds);
        debug!(agent = %config.agent_name, "Created agent HTTP client");
        Ok(Self {
            client,
            config,
            policy,
        })
    }

    /// POST a test query to the agent endpoint.
    pub async fn send_query(&self, request: &AgentRequest, test_name: &str) -> Result<AgentReply> {
        let url = self.config.endpoint_url()?;
        let payload = request.payload();

        let start = Instant::now();
        let response = with_retry(&self.policy, test_name, || {
            let req = self
                .client
                .post(url.clone())
                .header("Content-Type", "application/json")
                .header("Accept", "application/json")
                .header("X-Test-Case", test_name)
                .json(&payload);
            async move { req.send().await.map_err(Error::from) }
        })
        .await?;

        self.into_reply(response, start, test_name).await
    }

    /// GET the agent healthcheck endpoint.
    pub async fn send_healthcheck(&self, test_name: &str) -> Result<AgentReply> {
        let url = self.config.healthcheck_url()?;

        let start = Instant::now();
        let response = with_retry(&self.policy, test_name, || {
            let req = self
                .client
                .get(url.clone())
                .header("Accept", "application/json")
                .header("X-Test-Case", test_name)
                .header("X-Test-Mode", "healthcheck");
            async move { req.send().await.map_err(Error::from) }
        })
        .await?;

        self.into_reply(response, start, test_name).await
    }

    async fn into_reply(
        &self,
        response: reqwest::Response,
        start: Instant,
        test_name: &str,
    ) -> Result<AgentReply> {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let response_time_ms = start.elapsed().as_secs_f64() * 1000.0;

        info!(
            test = %test_name,
            status = status,
            elapsed_ms = format!("{response_time_ms:.1}"),
            "Agent request completed"
        );
        if status >= 400 {
            warn!(test = %test_name, status = status, "Agent returned an error status");
        }

        Ok(AgentReply {
            status,
            body,
            response_time_ms,
        })
    }
}

//! LLM Client — the provider boundary for bullet rewriting.
//!
//! The orchestrator depends only on [`TextGenerator`]; [`AnthropicClient`] is the
//! production adapter. Each call is a single attempt: retry lives in [`retry`].
//!
//! Model: claude-sonnet-4-5 (fixed; cached rewrites assume a single model)

use std::ops::AddAssign;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub mod prompts;
pub mod retry;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// The model used for all rewrite calls.
pub const MODEL: &str = "claude-sonnet-4-5";
const MAX_TOKENS: u32 = 512;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request timed out")]
    Timeout,

    #[error("rate limited: retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("provider error (status {status}): {message}")]
    Server { status: u16, message: String },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("quota exhausted: {0}")]
    QuotaExhausted(String),

    #[error("invalid request (status {status}): {message}")]
    InvalidRequest { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("LLM returned empty content")]
    EmptyContent,
}

impl LlmError {
    /// Transient failures are retried; everything else fails the call immediately.
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::Timeout | LlmError::RateLimited { .. } | LlmError::Server { .. } => true,
            LlmError::Http(e) => !e.is_decode() && !e.is_builder(),
            LlmError::Auth(_)
            | LlmError::QuotaExhausted(_)
            | LlmError::InvalidRequest { .. }
            | LlmError::Parse(_)
            | LlmError::EmptyContent => false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.input_tokens += rhs.input_tokens;
        self.output_tokens += rhs.output_tokens;
    }
}

/// One successful provider call.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    pub usage: TokenUsage,
}

/// The narrow capability the rewrite orchestrator needs from an AI provider.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn name(&self) -> &str;

    /// `prompt` is the per-bullet instruction; `context` is the job-level system context.
    async fn generate(&self, prompt: &str, context: &str) -> Result<Generation, LlmError>;
}

#[async_trait]
impl<T: TextGenerator + ?Sized> TextGenerator for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn generate(&self, prompt: &str, context: &str) -> Result<Generation, LlmError> {
        (**self).generate(prompt, context).await
    }
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    usage: TokenUsage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

impl AnthropicResponse {
    fn text(&self) -> Option<&str> {
        self.content
            .iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorBody,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    message: String,
}

/// Anthropic Messages API adapter.
#[derive(Clone)]
pub struct AnthropicClient {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl AnthropicClient {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self, LlmError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            api_key,
            endpoint: ANTHROPIC_API_URL.to_string(),
        })
    }

    /// Points the client at a different Messages endpoint (proxies, tests).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl TextGenerator for AnthropicClient {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn generate(&self, prompt: &str, context: &str) -> Result<Generation, LlmError> {
        let request_body = AnthropicRequest {
            model: MODEL,
            max_tokens: MAX_TOKENS,
            system: context,
            messages: vec![AnthropicMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| if e.is_timeout() { LlmError::Timeout } else { LlmError::Http(e) })?;

        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after_ms = parse_retry_after(
                response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok()),
            );
            return Err(LlmError::RateLimited { retry_after_ms });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<AnthropicError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(classify_status(status.as_u16(), message));
        }

        let body = response.text().await?;
        let parsed: AnthropicResponse = serde_json::from_str(&body)?;
        let text = parsed.text().ok_or(LlmError::EmptyContent)?;
        let text = clean_output(text);
        if text.is_empty() {
            return Err(LlmError::EmptyContent);
        }

        debug!(
            "LLM call succeeded: input_tokens={}, output_tokens={}",
            parsed.usage.input_tokens, parsed.usage.output_tokens
        );

        Ok(Generation {
            text: text.to_string(),
            usage: parsed.usage,
        })
    }
}

fn classify_status(status: u16, message: String) -> LlmError {
    match status {
        401 | 403 => LlmError::Auth(message),
        402 => LlmError::QuotaExhausted(message),
        400 if message.to_lowercase().contains("credit balance") => {
            LlmError::QuotaExhausted(message)
        }
        s if s >= 500 => LlmError::Server { status: s, message },
        s => LlmError::InvalidRequest { status: s, message },
    }
}

/// Strips code fences and wrapping quotes that models like to add around a one-line answer.
pub fn clean_output(text: &str) -> &str {
    let text = text.trim();
    let text = if let Some(stripped) = text.strip_prefix("```") {
        let stripped = stripped
            .split_once('\n')
            .map(|(_, rest)| rest)
            .unwrap_or(stripped);
        stripped.strip_suffix("```").unwrap_or(stripped).trim()
    } else {
        text
    };
    text.strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(text)
        .trim()
}

/// `retry-after` in whole seconds, as milliseconds. Missing or unparseable is 0.
fn parse_retry_after(header: Option<&str>) -> u64 {
    header
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|secs| secs.saturating_mul(1000))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> AnthropicClient {
        AnthropicClient::new("test-key".to_string(), Duration::from_secs(5))
            .unwrap()
            .with_endpoint(format!("{}/v1/messages", server.uri()))
    }

    #[test]
    fn test_clean_output_strips_fences() {
        assert_eq!(clean_output("```\nBuilt a cache\n```"), "Built a cache");
        assert_eq!(clean_output("```text\nBuilt a cache\n```"), "Built a cache");
    }

    #[test]
    fn test_clean_output_strips_quotes() {
        assert_eq!(clean_output("  \"Built a cache\"  "), "Built a cache");
        assert_eq!(clean_output("Built a \"fast\" cache"), "Built a \"fast\" cache");
    }

    #[test]
    fn test_transient_classification() {
        assert!(LlmError::Timeout.is_transient());
        assert!(LlmError::RateLimited { retry_after_ms: 0 }.is_transient());
        assert!(LlmError::Server {
            status: 503,
            message: "overloaded".into()
        }
        .is_transient());
        assert!(!LlmError::Auth("bad key".into()).is_transient());
        assert!(!LlmError::QuotaExhausted("no credit".into()).is_transient());
        assert!(!LlmError::InvalidRequest {
            status: 400,
            message: "bad".into()
        }
        .is_transient());
        assert!(!LlmError::EmptyContent.is_transient());
    }

    #[test]
    fn test_classify_status() {
        assert!(matches!(classify_status(401, "x".into()), LlmError::Auth(_)));
        assert!(matches!(classify_status(402, "x".into()), LlmError::QuotaExhausted(_)));
        assert!(matches!(
            classify_status(400, "Your credit balance is too low".into()),
            LlmError::QuotaExhausted(_)
        ));
        assert!(matches!(
            classify_status(529, "overloaded".into()),
            LlmError::Server { status: 529, .. }
        ));
        assert!(matches!(
            classify_status(422, "x".into()),
            LlmError::InvalidRequest { status: 422, .. }
        ));
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after(Some(" 2 ")), 2000);
        assert_eq!(parse_retry_after(Some("Wed, 21 Oct 2015 07:28:00 GMT")), 0);
        assert_eq!(parse_retry_after(None), 0);
        assert_eq!(parse_retry_after(Some(&u64::MAX.to_string())), u64::MAX);
    }

    #[test]
    fn test_token_usage_accumulates() {
        let mut total = TokenUsage::default();
        total += TokenUsage {
            input_tokens: 10,
            output_tokens: 4,
        };
        total += TokenUsage {
            input_tokens: 5,
            output_tokens: 1,
        };
        assert_eq!(total.input_tokens, 15);
        assert_eq!(total.total(), 20);
    }

    #[tokio::test]
    async fn test_generate_parses_text_and_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [{"type": "text", "text": "Cut p99 latency 40% with Rust caching"}],
                "usage": {"input_tokens": 120, "output_tokens": 14}
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let generation = client.generate("rewrite", "context").await.unwrap();
        assert_eq!(generation.text, "Cut p99 latency 40% with Rust caching");
        assert_eq!(generation.usage.input_tokens, 120);
        assert_eq!(generation.usage.output_tokens, 14);
    }

    #[tokio::test]
    async fn test_generate_maps_401_to_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"type": "authentication_error", "message": "invalid x-api-key"}
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).await.generate("p", "c").await.unwrap_err();
        match err {
            LlmError::Auth(message) => assert_eq!(message, "invalid x-api-key"),
            other => panic!("expected Auth, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_generate_maps_429_with_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "2"))
            .mount(&server)
            .await;

        let err = client_for(&server).await.generate("p", "c").await.unwrap_err();
        assert!(matches!(err, LlmError::RateLimited { retry_after_ms: 2000 }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_generate_maps_503_to_transient_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
            .mount(&server)
            .await;

        let err = client_for(&server).await.generate("p", "c").await.unwrap_err();
        assert!(matches!(err, LlmError::Server { status: 503, .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_generate_empty_text_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [{"type": "text", "text": "   "}],
                "usage": {"input_tokens": 1, "output_tokens": 0}
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).await.generate("p", "c").await.unwrap_err();
        assert!(matches!(err, LlmError::EmptyContent));
        assert!(!err.is_transient());
    }
}

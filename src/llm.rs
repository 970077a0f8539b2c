//! Text-completion client.
//!
//! [`CompletionClient`] is the seam the scoring engine depends on; [`LlmClient`]
//! implements it over HTTP for the Anthropic Messages API and for any
//! OpenAI-compatible `/chat/completions` endpoint.

use crate::config::{LlmConfig, Provider};
use crate::error::{Result, TrackerError};
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Request timeout in seconds
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Anthropic API version header value
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Generated text plus token accounting for one call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Completion {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// A remote (or stubbed) text-completion endpoint.
pub trait CompletionClient {
    /// Complete `prompt`, generating at most `max_tokens` output tokens.
    fn complete(&self, prompt: &str, max_tokens: u32) -> impl Future<Output = Result<Completion>> + Send;
}

/// HTTP completion client
pub struct LlmClient {
    config: LlmConfig,
    http: reqwest::Client,
}

// === Anthropic response structures ===

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    usage: Option<MessagesUsage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct MessagesUsage {
    input_tokens: u64,
    output_tokens: u64,
}

// === OpenAI-compatible response structures ===

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| TrackerError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        match self.config.provider {
            Provider::Anthropic => format!("{}/v1/messages", base),
            Provider::Openai => format!("{}/chat/completions", base),
        }
    }

    /// Both providers accept the same minimal single-turn body.
    fn request_body(&self, prompt: &str, max_tokens: u32) -> serde_json::Value {
        serde_json::json!({
            "model": self.config.model,
            "max_tokens": max_tokens,
            "messages": [
                {"role": "user", "content": prompt}
            ]
        })
    }

    async fn send(&self, prompt: &str, max_tokens: u32) -> Result<Completion> {
        let url = self.endpoint();
        debug!(url = %url, model = %self.config.model, "Sending completion request");

        let mut request = self
            .http
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&self.request_body(prompt, max_tokens));

        request = match self.config.provider {
            Provider::Anthropic => request
                .header("x-api-key", &self.config.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION),
            Provider::Openai => {
                request.header("Authorization", format!("Bearer {}", self.config.api_key))
            }
        };

        let response = request.send().await.map_err(TrackerError::Network)?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(60);
            return Err(TrackerError::RateLimited(retry_after));
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(TrackerError::Api {
                code: status.as_u16() as i32,
                message: format!("LLM API error: {} - {}", status, error_text),
            });
        }

        let body = response.text().await.map_err(TrackerError::Network)?;
        parse_completion(self.config.provider, &body)
    }
}

impl CompletionClient for LlmClient {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<Completion> {
        self.send(prompt, max_tokens).await
    }
}

/// Decode a provider response body.
///
/// A body that does not match the provider's schema is an API failure, not a
/// parse failure of the model's reply.
fn parse_completion(provider: Provider, body: &str) -> Result<Completion> {
    let malformed = |e: serde_json::Error| TrackerError::Api {
        code: 0,
        message: format!("Malformed completion response: {}", e),
    };

    match provider {
        Provider::Anthropic => {
            let resp: MessagesResponse = serde_json::from_str(body).map_err(malformed)?;
            let text = resp
                .content
                .iter()
                .filter(|b| b.kind == "text")
                .map(|b| b.text.as_str())
                .collect::<Vec<_>>()
                .join("");
            let (input_tokens, output_tokens) = resp
                .usage
                .map(|u| (u.input_tokens, u.output_tokens))
                .unwrap_or_default();
            Ok(Completion {
                text,
                input_tokens,
                output_tokens,
            })
        }
        Provider::Openai => {
            let resp: ChatCompletionResponse = serde_json::from_str(body).map_err(malformed)?;
            let text = resp
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .unwrap_or_default();
            let (input_tokens, output_tokens) = resp
                .usage
                .map(|u| (u.prompt_tokens, u.completion_tokens))
                .unwrap_or_default();
            Ok(Completion {
                text,
                input_tokens,
                output_tokens,
            })
        }
    }
}

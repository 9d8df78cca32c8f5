//! OpenAI implementation of the `Oracle` trait.
//!
//! Sends one chat completion per batch: the profile prompt as the system
//! message and the numbered items as the user message.
//!
//! # Example
//!
//! ```rust,ignore
//! use notice_extraction::ai::OpenAiOracle;
//!
//! let oracle = OpenAiOracle::new("sk-...").with_model("gpt-4o-mini");
//! let pipeline = Pipeline::new(store, oracle, config);
//! ```

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{OracleError, OracleResult, PipelineError, Result};
use crate::pipeline::prompts::{format_items, system_prompt};
use crate::traits::oracle::{Oracle, OracleRequest, OracleResponse};

const DEFAULT_MODEL: &str = "gpt-4o";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI-backed oracle.
#[derive(Clone)]
pub struct OpenAiOracle {
    client: Client,
    api_key: SecretString,
    model: String,
    base_url: String,
}

impl std::fmt::Debug for OpenAiOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiOracle")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl OpenAiOracle {
    /// Create a new client with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: SecretString::from(api_key.into()),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Create from environment variable `OPENAI_API_KEY`.
    ///
    /// `OPENAI_MODEL` overrides the default model when set.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| PipelineError::config("OPENAI_API_KEY not set"))?;
        let oracle = Self::new(api_key);
        Ok(match std::env::var("OPENAI_MODEL") {
            Ok(model) if !model.trim().is_empty() => oracle.with_model(model),
            _ => oracle,
        })
    }

    /// Set the chat model (default: gpt-4o).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set a custom base URL (for Azure, proxies, etc.).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request(&self, request: &OracleRequest) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system_prompt(request),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: format_items(&request.items),
                },
            ],
            temperature: 0.0,
            max_tokens: (request.max_output_tokens > 0).then_some(request.max_output_tokens),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct Usage {
    total_tokens: u32,
}

/// Map an HTTP status onto the oracle error taxonomy.
fn status_error(status: StatusCode, body: &str) -> OracleError {
    let message = format!("OpenAI returned {status}: {body}");
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        OracleError::Transient(message)
    } else {
        OracleError::Rejected(message)
    }
}

#[async_trait]
impl Oracle for OpenAiOracle {
    async fn complete(&self, request: &OracleRequest) -> OracleResult<OracleResponse> {
        debug!(
            model = %self.model,
            profile = request.profile.as_str(),
            items = request.items.len(),
            max_output_tokens = request.max_output_tokens,
            "Sending oracle batch"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&self.build_request(request))
            .send()
            .await
            .map_err(|e| OracleError::Transient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(status_error(status, &error_text));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| OracleError::Malformed(e.to_string()))?;

        let tokens = chat.usage.map(|u| u.total_tokens).unwrap_or(0);
        let body = chat
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| OracleError::Malformed("no choices in response".into()))?;

        Ok(OracleResponse::new(body, tokens))
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::oracle::{InstructionProfile, OracleItem};

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, ""),
            OracleError::Transient(_)
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, ""),
            OracleError::Transient(_)
        ));
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, "bad key"),
            OracleError::Rejected(_)
        ));
    }

    #[test]
    fn test_request_carries_prompt_and_budget() {
        let oracle = OpenAiOracle::new("sk-test").with_model("gpt-4o-mini");
        let request = OracleRequest::new(
            InstructionProfile::Classification,
            vec![OracleItem::new("a", "first"), OracleItem::new("b", "second")],
        )
        .with_max_output_tokens(1024);

        let body = serde_json::to_value(oracle.build_request(&request)).unwrap();
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["max_tokens"], 1024);
        assert!(body["messages"][0]["content"]
            .as_str()
            .unwrap()
            .contains("exactly 2 objects"));
        assert!(body["messages"][1]["content"].as_str().unwrap().contains("second"));
    }

    #[test]
    fn test_debug_hides_key() {
        let oracle = OpenAiOracle::new("sk-secret");
        assert!(!format!("{oracle:?}").contains("sk-secret"));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let oracle = OpenAiOracle::new("k").with_base_url("http://localhost:8080/v1/");
        assert_eq!(oracle.base_url, "http://localhost:8080/v1");
    }
}

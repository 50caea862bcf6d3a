//! Code-completion service access.
//!
//! The controller only sees [`CompletionService`]. [`OllamaClient`] talks to
//! an Ollama-compatible `/api/chat` endpoint; [`complete_with_deadline`]
//! bounds any service with an explicit timeout.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{ModelOptions, RepairConfig};
use crate::diagnostics::Diagnostic;
use crate::error::{RepairError, Result};
use crate::proposal::CODE_MARKER;

/// System instruction sent with every request.
pub const SYSTEM_PROMPT: &str =
    "You are an expert Python debugger. Provide clear explanations and working code fixes.";

/// A single request to the completion service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
}

impl CompletionRequest {
    /// Build the repair request for `source` failing with `diagnostic`.
    pub fn for_repair(source: &str, diagnostic: &Diagnostic) -> Self {
        Self {
            system: SYSTEM_PROMPT.to_string(),
            prompt: build_prompt(source, &diagnostic.text()),
        }
    }
}

/// User prompt asking for an `EXPLANATION:` / `CODE:` reply.
pub fn build_prompt(source: &str, diagnostic: &str) -> String {
    format!(
        "You are an expert Python debugger. Analyze and fix this code that produced the following error:\n\
         \n\
         ERROR:\n\
         {diagnostic}\n\
         \n\
         CODE:\n\
         {source}\n\
         \n\
         Provide your response in the following format:\n\
         EXPLANATION: Brief explanation of what's wrong and how to fix it\n\
         {CODE_MARKER} The corrected code (only pure Python, no markdown)"
    )
}

/// A synchronous request/response completion backend.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Return the raw reply text for `request`.
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// Run `service.complete` under `deadline`.
///
/// Expiry is reported as [`RepairError::ProposalServiceTimeout`].
pub async fn complete_with_deadline<S>(
    service: &S,
    request: &CompletionRequest,
    deadline: Duration,
) -> Result<String>
where
    S: CompletionService + ?Sized,
{
    match tokio::time::timeout(deadline, service.complete(request)).await {
        Ok(result) => result,
        Err(_elapsed) => {
            warn!(timeout_ms = deadline.as_millis() as u64, "completion request timed out");
            Err(RepairError::ProposalServiceTimeout {
                timeout_secs: deadline.as_secs(),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Ollama wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
    num_predict: u32,
    top_k: u32,
    top_p: f32,
}

impl From<&ModelOptions> for ChatOptions {
    fn from(model: &ModelOptions) -> Self {
        Self {
            temperature: model.temperature,
            num_predict: model.num_predict,
            top_k: model.top_k,
            top_p: model.top_p,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

// ---------------------------------------------------------------------------
// Ollama client
// ---------------------------------------------------------------------------

/// Client for an Ollama-compatible chat endpoint.
pub struct OllamaClient {
    base_url: String,
    model: ModelOptions,
    http_client: Client,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>, model: ModelOptions) -> Result<Self> {
        let http_client = Client::builder()
            .user_agent(concat!("autodebug/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RepairError::ProposalService(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into(),
            model,
            http_client,
        })
    }

    pub fn from_config(config: &RepairConfig) -> Result<Self> {
        Self::new(config.service.base_url.clone(), config.model.clone())
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url.trim_end_matches('/'))
    }

    fn chat_request<'a>(&'a self, request: &CompletionRequest) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model.name,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: request.system.clone(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: request.prompt.clone(),
                },
            ],
            stream: false,
            options: ChatOptions::from(&self.model),
        }
    }
}

#[async_trait]
impl CompletionService for OllamaClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let url = self.chat_url();
        debug!(%url, model = %self.model.name, prompt_len = request.prompt.len(), "requesting fix");

        let response = self
            .http_client
            .post(&url)
            .json(&self.chat_request(request))
            .send()
            .await
            .map_err(|e| RepairError::ProposalService(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RepairError::ProposalService(format!(
                "HTTP {status}: {}",
                body.trim()
            )));
        }

        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|e| RepairError::ProposalService(format!("malformed reply: {e}")))?;

        Ok(reply.message.content)
    }
}

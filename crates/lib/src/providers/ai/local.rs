//! OpenAI-compatible provider for local or self-hosted endpoints. These
//! endpoints have no server-side search tool, so tool-augmented requests
//! report [`LmError::SearchToolUnavailable`] and the client falls back to
//! plain completion.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client as ReqwestClient;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Completion, CompletionRequest, LmProvider};
use crate::errors::LmError;

#[derive(Serialize, Debug)]
struct ChatRequest<'a> {
    messages: Vec<ChatMessage<'a>>,
    model: &'a str,
    temperature: f32,
    stream: bool,
}

#[derive(Serialize, Debug)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize, Debug)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize, Debug)]
struct ChatResponseMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize, Debug)]
struct ChatUsage {
    #[serde(default)]
    total_tokens: u32,
}

/// A provider for a local or OpenAI-compatible API.
#[derive(Clone, Debug)]
pub struct LocalAiProvider {
    client: ReqwestClient,
    api_url: String,
    api_key: Option<String>,
}

impl LocalAiProvider {
    pub fn new(
        api_url: String,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, LmError> {
        let client = ReqwestClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LmError::InvalidRequest(e.to_string()))?;
        Ok(Self {
            client,
            api_url,
            api_key,
        })
    }
}

#[async_trait]
impl LmProvider for LocalAiProvider {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<Completion, LmError> {
        let body = ChatRequest {
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: request.system,
                },
                ChatMessage {
                    role: "user",
                    content: request.user,
                },
            ],
            model: request.model,
            temperature: request.temperature,
            stream: false,
        };

        debug!(model = request.model, api_url = %self.api_url, "calling local provider");
        let mut builder = self.client.post(&self.api_url);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let started = Instant::now();
        let response = builder
            .json(&body)
            .send()
            .await
            .map_err(LmError::from_transport)?;
        let latency_ms = started.elapsed().as_millis() as u64;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let error_text = response.text().await.unwrap_or_default();
            return Err(LmError::from_status(status, error_text));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LmError::InvalidRequest(format!("undecodable response: {e}")))?;

        Ok(Completion {
            text: parsed
                .choices
                .into_iter()
                .next()
                .map(|c| c.message.content)
                .unwrap_or_default(),
            token_count: parsed.usage.map(|u| u.total_tokens).unwrap_or(0),
            latency_ms,
            citations: Vec::new(),
            web_search_used: false,
            search_degraded: false,
        })
    }

    async fn complete_with_search(
        &self,
        _request: CompletionRequest<'_>,
    ) -> Result<Completion, LmError> {
        Err(LmError::SearchToolUnavailable)
    }
}

//! Gemini provider. Plain completion posts to `models/{model}:generateContent`;
//! tool-augmented completion attaches the `google_search` tool and harvests
//! grounding citations from the response.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client as ReqwestClient;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Citation, Completion, CompletionRequest, LmProvider};
use crate::errors::LmError;

const DEFAULT_API_ROOT: &str = "https://generativelanguage.googleapis.com/v1beta";

// --- Request structures ---

#[derive(Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "systemInstruction")]
    system_instruction: Content<'a>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Tool>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Serialize)]
struct Tool {
    google_search: serde_json::Value,
}

// --- Response structures ---

#[derive(Deserialize, Debug)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "usageMetadata", default)]
    usage: Option<UsageMetadata>,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    content: CandidateContent,
    #[serde(rename = "groundingMetadata", default)]
    grounding: Option<GroundingMetadata>,
}

#[derive(Deserialize, Debug)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize, Debug)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize, Debug)]
struct GroundingMetadata {
    #[serde(rename = "groundingChunks", default)]
    chunks: Vec<GroundingChunk>,
}

#[derive(Deserialize, Debug)]
struct GroundingChunk {
    #[serde(default)]
    web: Option<WebChunk>,
}

#[derive(Deserialize, Debug)]
struct WebChunk {
    #[serde(default)]
    uri: String,
    #[serde(default)]
    title: String,
}

#[derive(Deserialize, Debug)]
struct UsageMetadata {
    #[serde(rename = "totalTokenCount", default)]
    total_token_count: u32,
}

// --- Provider implementation ---

/// A provider for the Google Gemini API.
#[derive(Clone, Debug)]
pub struct GeminiProvider {
    client: ReqwestClient,
    api_root: String,
    api_key: String,
}

impl GeminiProvider {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self, LmError> {
        Self::with_api_root(DEFAULT_API_ROOT.to_string(), api_key, timeout)
    }

    /// Test seam: points the provider at a stand-in server.
    pub fn with_api_root(
        api_root: String,
        api_key: String,
        timeout: Duration,
    ) -> Result<Self, LmError> {
        let client = ReqwestClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LmError::InvalidRequest(e.to_string()))?;
        Ok(Self {
            client,
            api_root,
            api_key,
        })
    }

    async fn generate(
        &self,
        request: CompletionRequest<'_>,
        with_search: bool,
    ) -> Result<Completion, LmError> {
        let body = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part { text: request.user }],
            }],
            system_instruction: Content {
                parts: vec![Part {
                    text: request.system,
                }],
            },
            generation_config: GenerationConfig {
                temperature: request.temperature,
            },
            tools: with_search.then(|| {
                vec![Tool {
                    google_search: serde_json::json!({}),
                }]
            }),
        };

        let url = format!(
            "{}/models/{}:generateContent",
            self.api_root, request.model
        );
        debug!(model = request.model, with_search, "calling Gemini");

        let started = Instant::now();
        let response = self
            .client
            .post(&url)
            .query(&[("key", &self.api_key)])
            .json(&body)
            .send()
            .await
            .map_err(LmError::from_transport)?;
        let latency_ms = started.elapsed().as_millis() as u64;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let error_text = response.text().await.unwrap_or_default();
            // A 400 naming the search tool means this model/key combination
            // cannot ground; the client degrades to plain completion.
            if with_search
                && status == 400
                && (error_text.contains("google_search") || error_text.contains("Search"))
            {
                return Err(LmError::SearchToolUnavailable);
            }
            return Err(LmError::from_status(status, error_text));
        }

        let parsed: GeminiResponse = response
            .json()
            .await
            .map_err(|e| LmError::InvalidRequest(format!("undecodable response: {e}")))?;

        let first = parsed.candidates.into_iter().next();
        let text = first
            .as_ref()
            .map(|c| {
                c.content
                    .parts
                    .iter()
                    .map(|p| p.text.as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        let citations = first
            .and_then(|c| c.grounding)
            .map(|g| {
                g.chunks
                    .into_iter()
                    .filter_map(|chunk| chunk.web)
                    .map(|web| Citation {
                        title: web.title,
                        url: web.uri,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Completion {
            text,
            token_count: parsed.usage.map(|u| u.total_token_count).unwrap_or(0),
            latency_ms,
            citations,
            web_search_used: with_search,
            search_degraded: false,
        })
    }
}

#[async_trait]
impl LmProvider for GeminiProvider {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<Completion, LmError> {
        self.generate(request, false).await
    }

    async fn complete_with_search(
        &self,
        request: CompletionRequest<'_>,
    ) -> Result<Completion, LmError> {
        self.generate(request, true).await
    }
}

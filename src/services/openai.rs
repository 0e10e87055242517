use anyhow::Result;
use eventsource_stream::Eventsource;
use futures_util::{future, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::ai_service::{
    ChunkStream, InferenceConnector, InferenceRequest, InferenceService, StreamChunk,
};
use crate::models::Credential;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 1200;

const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ContentPart {
    Text {
        #[serde(rename = "type")]
        content_type: String,
        text: String,
    },
    ImageUrl {
        #[serde(rename = "type")]
        content_type: String,
        image_url: ImageData,
    },
}

#[derive(Debug, Serialize)]
struct ImageData {
    url: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    stream: bool,
}

impl From<&InferenceRequest> for ChatRequest {
    fn from(request: &InferenceRequest) -> Self {
        let messages = vec![ChatMessage {
            role: "user".to_string(),
            content: vec![
                ContentPart::Text {
                    content_type: "text".to_string(),
                    text: request.prompt.clone(),
                },
                ContentPart::ImageUrl {
                    content_type: "image_url".to_string(),
                    image_url: ImageData {
                        url: request.image_data_uri.clone(),
                    },
                },
            ],
        }];

        ChatRequest {
            model: request.model.clone(),
            messages,
            max_tokens: request.max_output_tokens,
            stream: request.stream,
        }
    }
}

/// One `data:` payload of a streamed chat completion
#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    delta: Option<ChunkDelta>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

fn parse_chunk(data: &str) -> Result<StreamChunk> {
    let chunk: ChatChunk = serde_json::from_str(data)
        .map_err(|e| anyhow::anyhow!("Malformed stream chunk ({}): {}", e, data))?;

    if let Some(error) = chunk.error {
        anyhow::bail!("OpenAI stream error: {}", error.message);
    }

    let delta = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta)
        .and_then(|delta| delta.content);

    Ok(StreamChunk { delta })
}

#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    pub base_url: String,
    pub request_timeout: Option<Duration>,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: None,
        }
    }
}

/// Chat-completions client bound to a single session's credential
pub struct OpenAIService {
    credential: Credential,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAIService {
    pub fn new(credential: Credential, base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            credential,
            base_url: base_url.into(),
            client,
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait::async_trait]
impl InferenceService for OpenAIService {
    async fn stream_completion(&self, request: &InferenceRequest) -> Result<ChunkStream> {
        let body = ChatRequest::from(request);

        log::info!("🤖 Sending streamed request with model: {}", body.model);
        log::debug!("📤 Request payload size: {} bytes", serde_json::to_string(&body)?.len());

        let response = self
            .client
            .post(self.completions_url())
            .header("Authorization", format!("Bearer {}", self.credential.expose()))
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await?;

        log::debug!("📥 Response status: {}", response.status());

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            log::error!("❌ OpenAI API error response: {}", error_text);
            anyhow::bail!("OpenAI API error ({}): {}", status, error_text);
        }

        let chunks = response
            .bytes_stream()
            .eventsource()
            .take_while(|event| {
                let done = matches!(event, Ok(e) if e.data.trim() == DONE_SENTINEL);
                future::ready(!done)
            })
            .filter_map(|event| async move {
                match event {
                    Ok(event) if event.data.trim().is_empty() => None,
                    Ok(event) => Some(parse_chunk(&event.data)),
                    Err(e) => Some(Err(anyhow::anyhow!("Stream error: {}", e))),
                }
            });

        Ok(Box::pin(chunks))
    }
}

/// Shares one HTTP connection pool across sessions while keeping
/// each session's credential inside its own service.
pub struct OpenAIConnector {
    config: OpenAIConfig,
    http: reqwest::Client,
}

impl OpenAIConnector {
    pub fn new(config: OpenAIConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            config,
            http: builder.build()?,
        })
    }
}

impl InferenceConnector for OpenAIConnector {
    fn connect(&self, credential: &Credential) -> Result<Box<dyn InferenceService>> {
        if credential.is_empty() {
            anyhow::bail!("An API key is required");
        }

        Ok(Box::new(OpenAIService::new(
            credential.clone(),
            self.config.base_url.clone(),
            self.http.clone(),
        )))
    }
}

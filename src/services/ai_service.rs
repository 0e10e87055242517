use anyhow::Result;
use futures_util::Stream;
use std::pin::Pin;

use crate::models::Credential;

/// One chat request carrying a text part and an image part
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceRequest {
    pub model: String,
    pub prompt: String,
    pub image_data_uri: String,
    pub max_output_tokens: u32,
    pub stream: bool,
}

/// An incremental piece of the response; `delta` is absent on
/// role-only or bookkeeping chunks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamChunk {
    pub delta: Option<String>,
}

impl StreamChunk {
    pub fn text(delta: impl Into<String>) -> Self {
        Self {
            delta: Some(delta.into()),
        }
    }
}

pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

/// Trait for multimodal inference backends (OpenAI, OpenRouter, etc.)
#[async_trait::async_trait]
pub trait InferenceService: Send + Sync {
    async fn stream_completion(&self, request: &InferenceRequest) -> Result<ChunkStream>;
}

/// Builds a backend bound to one session's credential
pub trait InferenceConnector: Send + Sync {
    fn connect(&self, credential: &Credential) -> Result<Box<dyn InferenceService>>;
}

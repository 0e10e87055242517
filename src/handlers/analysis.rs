use anyhow::Result;
use futures_util::StreamExt;
use std::sync::Arc;

use crate::models::{AnalysisInput, DisplayUpdate, UploadedImage, Warning, CURSOR_MARKER};
use crate::services::ai_service::{InferenceConnector, InferenceRequest};
use crate::services::image_encoding::{self, MediaTypeLabel};
use crate::services::openai::{DEFAULT_MAX_OUTPUT_TOKENS, DEFAULT_MODEL};
use crate::services::prompt;

pub const BUSY_MESSAGE: &str = "Analizando con amor y precisión 💭...";

/// Where display updates go: a terminal, an SSE channel, a test buffer
pub trait DisplaySink {
    fn render(&mut self, update: DisplayUpdate);

    /// Called once before the request goes out
    fn busy(&mut self, _status: &str) {}

    /// True once nobody is watching; streaming stops at the next chunk
    fn is_closed(&self) -> bool {
        false
    }
}

impl DisplaySink for Vec<DisplayUpdate> {
    fn render(&mut self, update: DisplayUpdate) {
        self.push(update);
    }
}

impl DisplaySink for tokio::sync::mpsc::UnboundedSender<DisplayUpdate> {
    fn render(&mut self, update: DisplayUpdate) {
        // Receiver gone means the viewer left; nothing left to show
        if self.send(update).is_err() {
            log::debug!("Display receiver dropped");
        }
    }

    fn is_closed(&self) -> bool {
        tokio::sync::mpsc::UnboundedSender::is_closed(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisOutcome {
    Described(String),
    Warned(Vec<Warning>),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub model: String,
    pub max_output_tokens: u32,
    pub media_type_label: MediaTypeLabel,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            media_type_label: MediaTypeLabel::default(),
        }
    }
}

pub struct ImageDescriptionClient {
    connector: Arc<dyn InferenceConnector>,
    settings: ClientSettings,
}

impl ImageDescriptionClient {
    pub fn new(connector: Arc<dyn InferenceConnector>, settings: ClientSettings) -> Self {
        Self {
            connector,
            settings,
        }
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Runs one analysis attempt. Never returns an error: every failure ends
    /// up as a display update and is mirrored in the outcome.
    pub async fn analyze<S: DisplaySink + ?Sized>(
        &self,
        input: &AnalysisInput,
        sink: &mut S,
    ) -> AnalysisOutcome {
        let image = match (&input.image, input.credential.is_empty(), input.triggered) {
            (Some(image), false, true) => image,
            _ => return self.warn(input, sink),
        };

        log::info!(
            "📸 Analysis triggered for {} ({} bytes, {})",
            image.filename,
            image.bytes.len(),
            image.format
        );

        let context = input.context.as_deref().unwrap_or("");
        let prompt_text = prompt::build_prompt(input.include_context, context);

        sink.busy(BUSY_MESSAGE);

        match self.stream_description(input, image, prompt_text, sink).await {
            Ok(full_response) => {
                log::info!("✅ Description finished ({} chars)", full_response.len());
                sink.render(DisplayUpdate::Final(full_response.clone()));
                AnalysisOutcome::Described(full_response)
            }
            Err(e) => {
                let detail = format!("{:#}", e);
                log::error!("❌ Analysis failed: {}", detail);
                sink.render(DisplayUpdate::Error(format!("Ocurrió un error: {}", detail)));
                AnalysisOutcome::Failed(detail)
            }
        }
    }

    fn warn<S: DisplaySink + ?Sized>(&self, input: &AnalysisInput, sink: &mut S) -> AnalysisOutcome {
        let mut warnings = Vec::new();

        if input.image.is_none() && input.triggered {
            warnings.push(Warning::MissingImage);
        }
        if input.credential.is_empty() {
            warnings.push(Warning::MissingCredential);
        }

        for warning in &warnings {
            log::warn!("⚠️ {:?}: no request sent", warning);
            sink.render(DisplayUpdate::Warning(*warning));
        }

        AnalysisOutcome::Warned(warnings)
    }

    async fn stream_description<S: DisplaySink + ?Sized>(
        &self,
        input: &AnalysisInput,
        image: &UploadedImage,
        prompt_text: String,
        sink: &mut S,
    ) -> Result<String> {
        let request = InferenceRequest {
            model: self.settings.model.clone(),
            prompt: prompt_text,
            image_data_uri: image_encoding::data_uri(image, self.settings.media_type_label),
            max_output_tokens: self.settings.max_output_tokens,
            stream: true,
        };

        let service = self.connector.connect(&input.credential)?;
        let mut chunks = service.stream_completion(&request).await?;

        let mut full_response = String::new();
        loop {
            if sink.is_closed() {
                log::info!("🛑 Viewer left, dropping the response stream");
                anyhow::bail!("Display closed before the description finished");
            }

            let Some(chunk) = chunks.next().await else {
                break;
            };
            let Some(delta) = chunk?.delta else {
                continue;
            };
            full_response.push_str(&delta);
            sink.render(DisplayUpdate::Partial(format!("{}{}", full_response, CURSOR_MARKER)));
        }

        Ok(full_response)
    }
}

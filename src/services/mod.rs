pub mod ai_service; // Inference backend traits
pub mod image_encoding;
pub mod openai; // OpenAI-compatible chat completions
pub mod prompt;

pub use ai_service::{InferenceConnector, InferenceService};
pub use openai::{OpenAIConfig, OpenAIConnector, OpenAIService};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod gemini;
pub mod openai;

pub use gemini::GeminiTranslator;
pub use openai::WhisperTranscriber;

/// Speech-to-text provider: binary audio in, plain text out
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Transcribe the audio bytes of `file_name`
    async fn transcribe(&self, audio: Vec<u8>, file_name: &str) -> anyhow::Result<String>;
}

/// Text generation provider used for translation and cleanup
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Translator: Send + Sync {
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> anyhow::Result<String>;
}

/// Sampling parameters sent with every generation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

impl From<&crate::config::TranslationConfig> for GenerationParams {
    fn from(config: &crate::config::TranslationConfig) -> Self {
        Self {
            temperature: config.temperature,
            top_p: config.top_p,
            top_k: config.top_k,
            max_output_tokens: config.max_output_tokens,
        }
    }
}

/// Trim an error body so it stays readable in a log line
pub(crate) fn truncate_body(body: &str, max_chars: usize) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= max_chars {
        trimmed.to_string()
    } else {
        let head: String = trimmed.chars().take(max_chars).collect();
        format!("{head}...")
    }
}

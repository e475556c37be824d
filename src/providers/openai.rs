use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;

use super::{truncate_body, SpeechToText};
use crate::config::TranscriptionConfig;
use crate::media::AudioFormat;

/// Client for the OpenAI-compatible `/audio/transcriptions` endpoint
pub struct WhisperTranscriber {
    client: Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl WhisperTranscriber {
    pub fn new(config: &TranscriptionConfig, api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            anyhow::bail!("OpenAI API key is empty");
        }

        let client = Client::builder()
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/audio/transcriptions", self.api_base)
    }
}

#[async_trait]
impl SpeechToText for WhisperTranscriber {
    async fn transcribe(&self, audio: Vec<u8>, file_name: &str) -> Result<String> {
        let mime = AudioFormat::from_path(std::path::Path::new(file_name))
            .unwrap_or(AudioFormat::Mp3)
            .mime_type();

        let part = Part::bytes(audio)
            .file_name(file_name.to_string())
            .mime_str(mime)
            .context("Invalid audio MIME type")?;

        let form = Form::new()
            .text("model", self.model.clone())
            .text("response_format", "text")
            .part("file", part);

        tracing::debug!("Uploading {} to {}", file_name, self.endpoint());

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .context("Failed to send transcription request")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read transcription response")?;

        if !status.is_success() {
            anyhow::bail!("Transcription API returned HTTP {}: {}", status, truncate_body(&body, 300));
        }

        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty_key() {
        assert!(WhisperTranscriber::new(&TranscriptionConfig::default(), "  ").is_err());
    }

    #[test]
    fn test_endpoint_ignores_trailing_slash() {
        let config = TranscriptionConfig {
            api_base: "http://localhost:8080/v1/".to_string(),
            ..TranscriptionConfig::default()
        };
        let client = WhisperTranscriber::new(&config, "sk-test").unwrap();
        assert_eq!(client.endpoint(), "http://localhost:8080/v1/audio/transcriptions");
    }
}

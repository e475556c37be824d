use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{truncate_body, GenerationParams, Translator};
use crate::config::TranslationConfig;

/// Client for the Gemini `generateContent` endpoint
pub struct GeminiTranslator {
    client: Client,
    api_base: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: &'a GenerationParams,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GeminiTranslator {
    pub fn new(config: &TranslationConfig, api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            anyhow::bail!("Gemini API key is empty");
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
        format!("{}/models/{}:generateContent", self.api_base, self.model)
    }
}

#[async_trait]
impl Translator for GeminiTranslator {
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let request = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: params,
        };

        tracing::debug!("Sending {} characters to {}", prompt.len(), self.model);

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send generation request")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read generation response")?;

        if !status.is_success() {
            anyhow::bail!("Gemini API returned HTTP {}: {}", status, truncate_body(&body, 300));
        }

        let parsed: GenerateResponse =
            serde_json::from_str(&body).context("Failed to parse generation response")?;

        extract_text(parsed)
    }
}

fn extract_text(response: GenerateResponse) -> Result<String> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        anyhow::bail!("Prompt was blocked: {}", reason);
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("Response contained no candidates"))?;

    let finish_reason = candidate.finish_reason.unwrap_or_default();
    match finish_reason.as_str() {
        "MAX_TOKENS" => {
            tracing::warn!("Output hit the token limit, the translation may be truncated")
        }
        "SAFETY" | "RECITATION" | "PROHIBITED_CONTENT" => {
            anyhow::bail!("Generation stopped: {}", finish_reason)
        }
        _ => {}
    }

    let text: String = candidate
        .content
        .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    Ok(text)
}

use std::path::PathBuf;
use std::time::Duration;

use crate::cache::{Artifact, ArtifactStore};
use crate::config::TranslationConfig;
use crate::providers::{GenerationParams, Translator};
use crate::{PipelineError, StageResult};

/// Separator placed between chunk transcripts in the combined transcript
pub const CHUNK_SEPARATOR: &str = "\n\n";

/// Paths written by a successful translation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationOutput {
    pub combined: PathBuf,
    pub final_path: PathBuf,
}

/// Builds the instructions sent with the combined transcript
pub fn build_prompt(transcript: &str, config: &TranslationConfig) -> String {
    let subject = config
        .subject
        .as_deref()
        .map(|s| format!(" The lecture is about {s}."))
        .unwrap_or_default();

    format!(
        "You are a translator and editor specialized in transcripts of lectures and talks.{subject}\n\
         \n\
         Task:\n\
         1. Translate the ENTIRE transcript into {lang}.\n\
         2. Keep every detail: names, drugs, studies, percentages, numbers and scientific data.\n\
         3. Fix spelling and grammar mistakes.\n\
         4. Remove hesitations and filler sounds.\n\
         5. Organize the text into logical paragraphs that are easy to read.\n\
         6. Keep the language natural and fluent.\n\
         7. Do NOT omit any information; keep 100% of the original content.\n\
         8. Preserve technical terms and proper names correctly.\n\
         \n\
         Original transcript:\n\
         {transcript}\n\
         \n\
         Return ONLY the translated and corrected transcript in {lang}, without additional comments.",
        lang = config.target_language,
    )
}

/// Combines chunk transcripts and translates them in a single request
pub struct TranslationStage<'a> {
    provider: &'a dyn Translator,
    store: &'a ArtifactStore,
    config: &'a TranslationConfig,
}

impl<'a> TranslationStage<'a> {
    pub fn new(provider: &'a dyn Translator, store: &'a ArtifactStore, config: &'a TranslationConfig) -> Self {
        Self {
            provider,
            store,
            config,
        }
    }

    /// Persist the combined transcript, translate it, and persist the final artifact
    pub async fn translate(&self, stem: &str, transcripts: &[String]) -> StageResult<TranslationOutput> {
        let combined_text = transcripts.join(CHUNK_SEPARATOR);
        tracing::info!("Transcription complete: {} characters", combined_text.chars().count());

        let combined = self.store.write_text(Artifact::Combined { stem }, &combined_text)?;
        tracing::info!("Saved {}", combined.display());

        let translation_error = |message: String| PipelineError::Translation {
            stem: stem.to_string(),
            message,
        };

        let prompt = build_prompt(&combined_text, self.config);
        let params = GenerationParams::from(self.config);

        tracing::info!("Sending transcript for translation into {}", self.config.target_language);

        let request = self.provider.generate(&prompt, &params);
        let result = if self.config.request_timeout_secs > 0 {
            let limit = Duration::from_secs(self.config.request_timeout_secs);
            tokio::time::timeout(limit, request)
                .await
                .map_err(|_| translation_error(format!("timed out after {}s", limit.as_secs())))?
        } else {
            request.await
        };

        let translated = result.map_err(|e| translation_error(format!("{e:#}")))?;
        if translated.trim().is_empty() {
            return Err(translation_error("provider returned an empty translation".to_string()));
        }

        tracing::info!("Translation finished ({} characters)", translated.chars().count());

        let final_path = self.store.write_text(Artifact::Final { stem }, &translated)?;
        tracing::info!("Saved {}", final_path.display());

        Ok(TranslationOutput { combined, final_path })
    }
}

use futures_util::{StreamExt, TryStreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::{file_stem, Artifact, ArtifactStore};
use crate::config::TranscriptionConfig;
use crate::providers::SpeechToText;
use crate::{PipelineError, StageResult};

/// Transcribes chunks, reading and writing per-chunk transcripts as a cache
pub struct TranscriptionDriver<'a> {
    provider: &'a dyn SpeechToText,
    store: &'a ArtifactStore,
    concurrency: usize,
    timeout: Option<Duration>,
    show_progress: bool,
}

impl<'a> TranscriptionDriver<'a> {
    pub fn new(
        provider: &'a dyn SpeechToText,
        store: &'a ArtifactStore,
        config: &TranscriptionConfig,
    ) -> Self {
        Self {
            provider,
            store,
            concurrency: config.concurrency.max(1),
            timeout: (config.request_timeout_secs > 0)
                .then(|| Duration::from_secs(config.request_timeout_secs)),
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Transcript of one chunk, from the cache when present
    pub async fn transcribe_chunk(&self, asset_stem: &str, chunk: &Path) -> StageResult<String> {
        let chunk_stem = file_stem(chunk);
        let artifact = Artifact::ChunkTranscript {
            asset_stem,
            chunk_stem: &chunk_stem,
        };

        if let Some(cached) = self.store.lookup(artifact) {
            tracing::info!("Using cached transcript for {}", chunk_stem);
            return Ok(self.store.read_text(&cached)?);
        }

        let transcription_error = |message: String| PipelineError::Transcription {
            chunk: chunk.to_path_buf(),
            message,
        };

        tracing::info!("Transcribing {}", chunk_stem);

        let audio = fs_err::tokio::read(chunk).await?;
        let file_name = chunk
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{chunk_stem}.mp3"));

        let request = self.provider.transcribe(audio, &file_name);
        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, request)
                .await
                .map_err(|_| transcription_error(format!("timed out after {}s", limit.as_secs())))?,
            None => request.await,
        };

        let text = result.map_err(|e| transcription_error(format!("{e:#}")))?;
        if text.trim().is_empty() {
            return Err(transcription_error("provider returned an empty transcript".to_string()));
        }

        let path = self.store.write_text(artifact, &text)?;
        tracing::info!("{} characters transcribed, saved {}", text.chars().count(), path.display());

        Ok(text)
    }

    /// Transcripts of all chunks in chunk order.
    ///
    /// Up to `concurrency` chunks are in flight at once. The first failure fails the
    /// whole asset; transcripts that completed before it stay cached.
    pub async fn transcribe_all(&self, asset_stem: &str, chunks: &[PathBuf]) -> StageResult<Vec<String>> {
        let progress = self.progress_bar(chunks.len() as u64);

        let transcripts = futures_util::stream::iter(chunks)
            .map(|chunk| {
                let progress = progress.clone();
                async move {
                    let text = self.transcribe_chunk(asset_stem, chunk).await?;
                    progress.inc(1);
                    Ok::<_, PipelineError>(text)
                }
            })
            .buffered(self.concurrency)
            .try_collect::<Vec<_>>()
            .await;

        match &transcripts {
            Ok(_) => progress.finish_with_message("Transcription complete"),
            Err(_) => progress.abandon_with_message("Transcription failed"),
        }

        transcripts
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let progress = ProgressBar::new(len);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks {msg}")
        {
            progress.set_style(style.progress_chars("#>-"));
        }
        progress
    }
}

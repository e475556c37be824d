use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::Instrument;
use uuid::Uuid;

use crate::cache::{file_stem, Artifact, ArtifactStore, CleanupManager, CleanupReport};
use crate::config::Config;
use crate::media::{list_sorted, ChunkSplitter, MediaKind, MediaNormalizer, MediaTool};
use crate::providers::{SpeechToText, Translator};
use crate::transcribe::TranscriptionDriver;
use crate::translate::TranslationStage;
use crate::{PipelineError, Result, StageResult};

/// Position of a source file in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    Pending,
    Normalizing,
    Splitting,
    Transcribing,
    Translating,
    Done,
    AlreadyDone,
    Failed,
}

impl std::fmt::Display for FileState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            FileState::Pending => "pending",
            FileState::Normalizing => "normalizing",
            FileState::Splitting => "splitting",
            FileState::Transcribing => "transcribing",
            FileState::Translating => "translating",
            FileState::Done => "done",
            FileState::AlreadyDone => "already done",
            FileState::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Terminal result of processing one source file
#[derive(Debug)]
pub enum FileOutcome {
    Done { final_path: PathBuf, chunks: usize },
    AlreadyDone { final_path: PathBuf },
    Failed { stage: FileState, error: PipelineError },
}

impl FileOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, FileOutcome::Failed { .. })
    }

    pub fn state(&self) -> FileState {
        match self {
            FileOutcome::Done { .. } => FileState::Done,
            FileOutcome::AlreadyDone { .. } => FileState::AlreadyDone,
            FileOutcome::Failed { .. } => FileState::Failed,
        }
    }
}

/// Per-file line of a batch summary
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub source: PathBuf,
    pub state: FileState,
    pub final_path: Option<PathBuf>,
    pub chunks: Option<usize>,
    /// Stage that was running when the file failed
    pub failed_stage: Option<FileState>,
    pub error: Option<String>,
}

impl FileReport {
    fn new(source: &Path, outcome: &FileOutcome) -> Self {
        let mut report = Self {
            source: source.to_path_buf(),
            state: outcome.state(),
            final_path: None,
            chunks: None,
            failed_stage: None,
            error: None,
        };

        match outcome {
            FileOutcome::Done { final_path, chunks } => {
                report.final_path = Some(final_path.clone());
                report.chunks = Some(*chunks);
            }
            FileOutcome::AlreadyDone { final_path } => {
                report.final_path = Some(final_path.clone());
            }
            FileOutcome::Failed { stage, error } => {
                report.failed_stage = Some(*stage);
                report.error = Some(error.to_string());
            }
        }

        report
    }

    pub fn is_success(&self) -> bool {
        self.state != FileState::Failed
    }
}

/// Result of a batch run
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub files: Vec<FileReport>,
}

impl BatchSummary {
    pub fn succeeded(&self) -> usize {
        self.files.iter().filter(|f| f.is_success()).count()
    }

    pub fn total(&self) -> usize {
        self.files.len()
    }

    /// True when nothing succeeded, which makes the run a failure
    pub fn all_failed(&self) -> bool {
        self.succeeded() == 0
    }
}

/// Sequences the stages for every source file
pub struct Pipeline {
    config: Config,
    store: ArtifactStore,
    media: Box<dyn MediaTool>,
    transcriber: Box<dyn SpeechToText>,
    translator: Box<dyn Translator>,
    show_progress: bool,
}

impl Pipeline {
    /// Create a pipeline whose artifacts live under `root`
    pub fn new(
        config: Config,
        root: impl Into<PathBuf>,
        media: Box<dyn MediaTool>,
        transcriber: Box<dyn SpeechToText>,
        translator: Box<dyn Translator>,
    ) -> Self {
        let store = ArtifactStore::new(root, config.layout.clone());
        Self {
            config,
            store,
            media,
            transcriber,
            translator,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Source files of the input directory: audio first, then video, each sorted by name
    pub fn discover_sources(&self, input_dir: Option<&Path>) -> Result<Vec<PathBuf>> {
        let dir = input_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.store.input_dir());

        if !dir.is_dir() {
            anyhow::bail!("Input directory does not exist: {}", dir.display());
        }

        let mut sources = Vec::new();
        for ext in self
            .config
            .media
            .audio_extensions
            .iter()
            .chain(&self.config.media.video_extensions)
        {
            for path in list_sorted(&dir, ext)
                .with_context(|| format!("Failed to list {}", dir.display()))?
            {
                if !sources.contains(&path) {
                    sources.push(path);
                }
            }
        }

        Ok(sources)
    }

    /// Process every source in order. One file's failure never stops the batch.
    pub async fn run_batch(&self, sources: &[PathBuf]) -> Result<BatchSummary> {
        self.store
            .ensure_dirs()
            .context("Failed to create output directories")?;

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        tracing::info!("Run {}: {} file(s) to process", run_id, sources.len());

        let mut files = Vec::with_capacity(sources.len());
        for (index, source) in sources.iter().enumerate() {
            tracing::info!("File {}/{}: {}", index + 1, sources.len(), source.display());
            let outcome = self.process_file(source).await;
            files.push(FileReport::new(source, &outcome));
        }

        let summary = BatchSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            files,
        };

        tracing::info!(
            "Processing complete: {}/{} file(s)",
            summary.succeeded(),
            summary.total()
        );

        Ok(summary)
    }

    /// Run one source file through the state machine
    pub async fn process_file(&self, source: &Path) -> FileOutcome {
        let stem = file_stem(source);
        let span = tracing::info_span!("file", stem = %stem);

        async {
            let mut state = FileState::Pending;
            match self.run_stages(source, &stem, &mut state).await {
                Ok(outcome) => {
                    tracing::info!("Finished: {}", outcome.state());
                    outcome
                }
                Err(error) => {
                    tracing::error!("Failed while {}: {}", state, error);
                    FileOutcome::Failed {
                        stage: state,
                        error,
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run_stages(&self, source: &Path, stem: &str, state: &mut FileState) -> StageResult<FileOutcome> {
        if let Some(final_path) = self.store.lookup(Artifact::Final { stem }) {
            tracing::info!("Final transcript already exists: {}", final_path.display());
            *state = FileState::AlreadyDone;
            self.cleanup_quietly(stem);
            return Ok(FileOutcome::AlreadyDone { final_path });
        }

        let kind = MediaKind::of(source, &self.config.media).ok_or_else(|| {
            PipelineError::Stage(anyhow::anyhow!("Unsupported media type: {}", source.display()))
        })?;

        let audio = match kind {
            MediaKind::Video => {
                *state = FileState::Normalizing;
                MediaNormalizer::new(self.media.as_ref(), &self.store)
                    .normalize(source)
                    .await?
            }
            MediaKind::Audio => source.to_path_buf(),
        };

        *state = FileState::Splitting;
        let chunk_set = ChunkSplitter::new(self.media.as_ref(), &self.store, &self.config.chunking)
            .split(&audio)
            .await?;

        *state = FileState::Transcribing;
        tracing::info!("Transcribing {} chunk(s)", chunk_set.len());
        let transcripts = TranscriptionDriver::new(
            self.transcriber.as_ref(),
            &self.store,
            &self.config.transcription,
        )
        .with_progress(self.show_progress)
        .transcribe_all(stem, &chunk_set.chunks)
        .await?;

        *state = FileState::Translating;
        let output = TranslationStage::new(self.translator.as_ref(), &self.store, &self.config.translation)
            .translate(stem, &transcripts)
            .await?;

        *state = FileState::Done;
        if chunk_set.len() > 1 {
            self.cleanup_quietly(stem);
        }

        Ok(FileOutcome::Done {
            final_path: output.final_path,
            chunks: chunk_set.len(),
        })
    }

    /// Remove the transient artifacts of `stem`
    pub fn cleanup(&self, stem: &str) -> std::io::Result<CleanupReport> {
        CleanupManager::new(&self.store).cleanup(stem)
    }

    // The final artifact already exists here, so a cleanup failure only leaves clutter behind.
    fn cleanup_quietly(&self, stem: &str) {
        if let Err(e) = self.cleanup(stem) {
            tracing::warn!("Cleanup of {} failed: {}", stem, e);
        }
    }
}

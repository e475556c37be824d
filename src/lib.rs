//! Lecture Pipeline - turns recorded lecture media into translated, cleaned-up transcripts
//!
//! The pipeline normalizes video to audio, splits oversized audio into fixed-duration
//! chunks, transcribes every chunk, and submits the combined transcript for translation.
//! Every intermediate artifact lives on the local filesystem and doubles as a cache, so
//! rerunning the pipeline only performs the work that is still missing.

pub mod cache;
pub mod cli;
pub mod config;
pub mod fetch;
pub mod media;
pub mod output;
pub mod pipeline;
pub mod providers;
pub mod transcribe;
pub mod translate;
pub mod utils;

use std::path::PathBuf;

pub use cache::{Artifact, ArtifactStore, CleanupManager, CleanupReport};
pub use cli::{Cli, Commands, OutputFormat};
pub use config::Config;
pub use pipeline::{BatchSummary, FileOutcome, Pipeline};

/// Result type used by the application layer
pub type Result<T> = anyhow::Result<T>;

/// Result type returned by the individual pipeline stages
pub type StageResult<T> = std::result::Result<T, PipelineError>;

/// Failures of a single file's pipeline, one variant per stage
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("Could not probe duration of {}: {message}", path.display())]
    Probe { path: PathBuf, message: String },

    #[error("Conversion of {} failed: {message}", path.display())]
    Conversion { path: PathBuf, message: String },

    #[error("Splitting {} failed: {message}", path.display())]
    Split { path: PathBuf, message: String },

    #[error("Transcription of {} failed: {message}", chunk.display())]
    Transcription { chunk: PathBuf, message: String },

    #[error("Translation of {stem} failed: {message}")]
    Translation { stem: String, message: String },

    #[error("Unexpected stage failure: {0:#}")]
    Stage(#[from] anyhow::Error),
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Stage(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_errors_become_stage_errors() {
        let err: PipelineError = std::io::Error::new(std::io::ErrorKind::Other, "disk full").into();
        assert!(matches!(err, PipelineError::Stage(_)));
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_error_messages_name_the_artifact() {
        let err = PipelineError::Split {
            path: PathBuf::from("aulas/aula1.mp3"),
            message: "chunk 2 missing".to_string(),
        };
        assert_eq!(err.to_string(), "Splitting aulas/aula1.mp3 failed: chunk 2 missing");
    }
}

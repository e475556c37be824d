use std::path::{Path, PathBuf};

use super::{file_size, MediaTool};
use crate::cache::{file_stem, Artifact, ArtifactStore};
use crate::utils::format_file_size;
use crate::{PipelineError, StageResult};

/// Converts video sources to audio, reusing a previous conversion when present
pub struct MediaNormalizer<'a> {
    tool: &'a dyn MediaTool,
    store: &'a ArtifactStore,
}

impl<'a> MediaNormalizer<'a> {
    pub fn new(tool: &'a dyn MediaTool, store: &'a ArtifactStore) -> Self {
        Self { tool, store }
    }

    /// Path of the audio-only form of `video`
    pub async fn normalize(&self, video: &Path) -> StageResult<PathBuf> {
        let stem = file_stem(video);
        let artifact = Artifact::NormalizedAudio { stem: &stem };

        if let Some(cached) = self.store.lookup(artifact) {
            tracing::info!("Normalized audio already exists: {}", cached.display());
            return Ok(cached);
        }

        let output = self.store.path(artifact);
        if let Some(parent) = output.parent() {
            fs_err::create_dir_all(parent)?;
        }

        tracing::info!("Converting {} to audio", video.display());
        if let Err(e) = self.tool.convert_to_audio(video, &output).await {
            // A partial encode must not be mistaken for a cached result
            let _ = std::fs::remove_file(&output);
            return Err(e);
        }

        match file_size(&output) {
            Ok(size) => {
                tracing::info!("Created {} ({})", output.display(), format_file_size(size));
                Ok(output)
            }
            Err(_) => Err(PipelineError::Conversion {
                path: video.to_path_buf(),
                message: format!("transcoder produced no output at {}", output.display()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LayoutConfig;
    use crate::media::MockMediaTool;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_existing_output_skips_transcoder() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path(), LayoutConfig::default());
        let cached = store.path(Artifact::NormalizedAudio { stem: "aula1" });
        std::fs::create_dir_all(cached.parent().unwrap()).unwrap();
        std::fs::write(&cached, b"mp3").unwrap();

        let mut tool = MockMediaTool::new();
        tool.expect_convert_to_audio().times(0);

        let normalizer = MediaNormalizer::new(&tool, &store);
        let path = normalizer.normalize(Path::new("aulas/aula1.mp4")).await.unwrap();
        assert_eq!(path, cached);
    }

    #[tokio::test]
    async fn test_converts_into_deterministic_path() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path(), LayoutConfig::default());
        let expected = store.path(Artifact::NormalizedAudio { stem: "aula1" });

        let mut tool = MockMediaTool::new();
        tool.expect_convert_to_audio().times(1).returning(|_, output| {
            std::fs::write(output, b"mp3 bytes").unwrap();
            Ok(())
        });

        let normalizer = MediaNormalizer::new(&tool, &store);
        let path = normalizer.normalize(Path::new("aulas/aula1.mp4")).await.unwrap();
        assert_eq!(path, expected);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_missing_output_is_conversion_error() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path(), LayoutConfig::default());

        let mut tool = MockMediaTool::new();
        tool.expect_convert_to_audio().times(1).returning(|_, _| Ok(()));

        let normalizer = MediaNormalizer::new(&tool, &store);
        let err = normalizer.normalize(Path::new("aulas/aula1.mp4")).await.unwrap_err();
        assert!(matches!(err, PipelineError::Conversion { .. }));
    }
}

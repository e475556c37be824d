use std::path::{Path, PathBuf};

use super::{file_size, is_materialized, is_plausible_duration, list_sorted, MediaTool};
use crate::cache::{file_stem, Artifact, ArtifactStore};
use crate::config::{ChunkTranscriptNaming, ChunkingConfig, ProbeFailurePolicy};
use crate::utils::{format_duration, format_file_size};
use crate::{PipelineError, StageResult};

/// Ordered chunks of one audio asset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSet {
    /// Chunk paths in temporal order
    pub chunks: Vec<PathBuf>,

    /// Whether the chunks live in a chunk directory rather than being the asset itself
    pub split: bool,
}

impl ChunkSet {
    fn whole(audio: &Path) -> Self {
        Self {
            chunks: vec![audio.to_path_buf()],
            split: false,
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Number of chunks for a `duration` cut into `chunk_secs` pieces.
///
/// Always one more than the whole number of pieces, so the trailing partial
/// segment is captured even when the duration divides evenly.
pub fn chunk_count(duration: f64, chunk_secs: u64) -> usize {
    (duration / chunk_secs as f64).floor() as usize + 1
}

/// Splits audio above the size threshold into fixed-duration chunks
pub struct ChunkSplitter<'a> {
    tool: &'a dyn MediaTool,
    store: &'a ArtifactStore,
    threshold_bytes: u64,
    chunk_secs: u64,
    on_probe_failure: ProbeFailurePolicy,
    allow_missing_chunks: bool,
}

impl<'a> ChunkSplitter<'a> {
    pub fn new(tool: &'a dyn MediaTool, store: &'a ArtifactStore, config: &ChunkingConfig) -> Self {
        Self {
            tool,
            store,
            threshold_bytes: config.threshold_bytes(),
            chunk_secs: config.chunk_duration_secs,
            on_probe_failure: config.on_probe_failure,
            allow_missing_chunks: config.allow_missing_chunks,
        }
    }

    /// Override the size threshold, in bytes
    pub fn with_threshold_bytes(mut self, threshold_bytes: u64) -> Self {
        self.threshold_bytes = threshold_bytes;
        self
    }

    pub async fn split(&self, audio: &Path) -> StageResult<ChunkSet> {
        let size = file_size(audio)?;

        if size <= self.threshold_bytes {
            tracing::info!("File is small ({}), no need to split", format_file_size(size));
            return Ok(ChunkSet::whole(audio));
        }

        tracing::info!("File is large ({}), splitting into chunks", format_file_size(size));

        let stem = file_stem(audio);
        let chunk_dir = self.store.path(Artifact::ChunkDir { stem: &stem });

        if chunk_dir.is_dir() {
            let existing = list_sorted(&chunk_dir, "mp3")?;
            if !existing.is_empty() {
                tracing::info!("Reusing {} existing chunks", existing.len());
                if self.store.layout().chunk_transcript_naming == ChunkTranscriptNaming::Legacy {
                    self.discard_shared_transcripts(&stem, &existing)?;
                }
                return Ok(ChunkSet {
                    chunks: existing,
                    split: true,
                });
            }
        }

        let duration = match self.tool.probe_duration(audio).await {
            Ok(duration) => duration,
            Err(e) => match self.on_probe_failure {
                ProbeFailurePolicy::Fail => {
                    return Err(PipelineError::Split {
                        path: audio.to_path_buf(),
                        message: e.to_string(),
                    })
                }
                ProbeFailurePolicy::WholeFile => {
                    tracing::warn!("{}; transcribing the whole file as one chunk", e);
                    return Ok(ChunkSet::whole(audio));
                }
            },
        };

        if !is_plausible_duration(duration) {
            return Err(PipelineError::Split {
                path: audio.to_path_buf(),
                message: format!("implausible duration {duration}s"),
            });
        }

        let count = chunk_count(duration, self.chunk_secs);
        tracing::info!("Total duration: {}, {} chunks", format_duration(duration), count);

        self.discard_stale_transcripts(&stem, count)?;
        fs_err::create_dir_all(&chunk_dir)?;

        // A leftover prefix of chunks would be reused as a complete set on the next run
        let chunks = match self.extract_chunks(audio, &stem, count).await {
            Ok(chunks) => chunks,
            Err(e) => {
                if let Err(rm) = fs_err::remove_dir_all(&chunk_dir) {
                    tracing::warn!("Could not remove incomplete chunks: {}", rm);
                }
                return Err(e);
            }
        };

        tracing::info!("Audio split into {} chunks", chunks.len());
        Ok(ChunkSet {
            chunks,
            split: true,
        })
    }

    async fn extract_chunks(&self, audio: &Path, stem: &str, count: usize) -> StageResult<Vec<PathBuf>> {
        let mut chunks = Vec::new();
        for index in 0..count {
            let ordinal = index + 1;
            let start = index as u64 * self.chunk_secs;
            let chunk_path = self.store.path(Artifact::Chunk { stem, ordinal });

            tracing::info!(
                "Extracting chunk {}/{}: {} - {}",
                ordinal,
                count,
                format_duration(start as f64),
                format_duration((start + self.chunk_secs) as f64)
            );

            self.tool
                .extract_segment(audio, &chunk_path, start, self.chunk_secs)
                .await?;

            if is_materialized(&chunk_path) {
                tracing::debug!("Saved {}", chunk_path.display());
                chunks.push(chunk_path);
                continue;
            }

            let _ = std::fs::remove_file(&chunk_path);
            if self.allow_missing_chunks {
                tracing::warn!("Chunk {} produced no audio, skipping it", ordinal);
            } else {
                return Err(PipelineError::Split {
                    path: audio.to_path_buf(),
                    message: format!("chunk {} produced no output file", chunk_path.display()),
                });
            }
        }

        if chunks.is_empty() {
            return Err(PipelineError::Split {
                path: audio.to_path_buf(),
                message: "no chunk was produced".to_string(),
            });
        }

        Ok(chunks)
    }

    /// Chunk transcripts for the ordinals about to be extracted were made from other audio.
    ///
    /// With legacy naming they may even belong to a different asset whose run stopped
    /// before cleanup.
    fn discard_stale_transcripts(&self, stem: &str, count: usize) -> std::io::Result<()> {
        for ordinal in 1..=count {
            let chunk = self.store.path(Artifact::Chunk { stem, ordinal });
            self.discard_transcript(stem, &chunk)?;
        }
        Ok(())
    }

    /// Legacy transcript names carry no asset stem, so a transcript whose chunk name also
    /// exists in another asset's chunk directory cannot be attributed and is redone.
    fn discard_shared_transcripts(&self, stem: &str, chunks: &[PathBuf]) -> std::io::Result<()> {
        let chunks_root = self.store.chunks_root();
        let mut other_dirs = Vec::new();
        for entry in fs_err::read_dir(&chunks_root)? {
            let path = entry?.path();
            if path.is_dir() && path.file_name().map_or(false, |name| name != stem) {
                other_dirs.push(path);
            }
        }

        for chunk in chunks {
            let Some(name) = chunk.file_name() else {
                continue;
            };
            if other_dirs.iter().any(|dir| dir.join(name).exists()) {
                self.discard_transcript(stem, chunk)?;
            }
        }
        Ok(())
    }

    fn discard_transcript(&self, stem: &str, chunk: &Path) -> std::io::Result<()> {
        let chunk_stem = file_stem(chunk);
        let transcript = self.store.path(Artifact::ChunkTranscript {
            asset_stem: stem,
            chunk_stem: &chunk_stem,
        });
        match fs_err::remove_file(&transcript) {
            Ok(()) => {
                tracing::debug!("Discarded transcript {}", transcript.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LayoutConfig;
    use crate::media::MockMediaTool;
    use tempfile::TempDir;

    const THRESHOLD: u64 = 1024;

    fn setup(size: usize) -> (TempDir, ArtifactStore, PathBuf) {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path(), LayoutConfig::default());
        let audio = dir.path().join("aulas").join("aula1.mp3");
        std::fs::create_dir_all(audio.parent().unwrap()).unwrap();
        std::fs::write(&audio, vec![0u8; size]).unwrap();
        (dir, store, audio)
    }

    fn writing_tool(duration: f64, expected_chunks: usize) -> MockMediaTool {
        let mut tool = MockMediaTool::new();
        tool.expect_probe_duration()
            .times(1)
            .returning(move |_| Ok(duration));
        tool.expect_extract_segment()
            .times(expected_chunks)
            .returning(|_, output, start, _| {
                std::fs::write(output, format!("from {start}")).unwrap();
                Ok(())
            });
        tool
    }

    #[test]
    fn test_chunk_count_formula() {
        assert_eq!(chunk_count(1200.0, 600), 3);
        assert_eq!(chunk_count(1199.9, 600), 2);
        assert_eq!(chunk_count(0.0, 600), 1);
        assert_eq!(chunk_count(3725.4, 600), 7);
    }

    #[tokio::test]
    async fn test_file_at_threshold_is_not_split() {
        let (_dir, store, audio) = setup(THRESHOLD as usize);
        let mut tool = MockMediaTool::new();
        tool.expect_probe_duration().times(0);
        tool.expect_extract_segment().times(0);

        let splitter = ChunkSplitter::new(&tool, &store, &ChunkingConfig::default())
            .with_threshold_bytes(THRESHOLD);
        let set = splitter.split(&audio).await.unwrap();

        assert_eq!(set.chunks, vec![audio.clone()]);
        assert!(!set.split);
        assert!(!store.path(Artifact::ChunkDir { stem: "aula1" }).exists());
    }

    #[tokio::test]
    async fn test_file_one_byte_over_threshold_is_split() {
        let (_dir, store, audio) = setup(THRESHOLD as usize + 1);
        let tool = writing_tool(1200.0, 3);

        let splitter = ChunkSplitter::new(&tool, &store, &ChunkingConfig::default())
            .with_threshold_bytes(THRESHOLD);
        let set = splitter.split(&audio).await.unwrap();

        assert!(set.split);
        assert_eq!(set.len(), 3);
        assert_eq!(set.chunks[0], store.path(Artifact::Chunk { stem: "aula1", ordinal: 1 }));
        assert_eq!(set.chunks[2], store.path(Artifact::Chunk { stem: "aula1", ordinal: 3 }));
        assert_eq!(std::fs::read_to_string(&set.chunks[1]).unwrap(), "from 600");
    }

    #[tokio::test]
    async fn test_existing_chunks_are_reused_without_probing() {
        let (_dir, store, audio) = setup(THRESHOLD as usize + 1);
        for ordinal in [2, 1] {
            let path = store.path(Artifact::Chunk { stem: "aula1", ordinal });
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, b"x").unwrap();
        }

        let mut tool = MockMediaTool::new();
        tool.expect_probe_duration().times(0);
        tool.expect_extract_segment().times(0);

        let splitter = ChunkSplitter::new(&tool, &store, &ChunkingConfig::default())
            .with_threshold_bytes(THRESHOLD);
        let set = splitter.split(&audio).await.unwrap();

        assert_eq!(
            set.chunks,
            vec![
                store.path(Artifact::Chunk { stem: "aula1", ordinal: 1 }),
                store.path(Artifact::Chunk { stem: "aula1", ordinal: 2 }),
            ]
        );
    }

    #[tokio::test]
    async fn test_probe_failure_policies() {
        let (_dir, store, audio) = setup(THRESHOLD as usize + 1);
        let probe_error = || -> StageResult<f64> {
            Err(PipelineError::Probe {
                path: PathBuf::from("aula1.mp3"),
                message: "ffprobe not found".to_string(),
            })
        };

        let mut tool = MockMediaTool::new();
        tool.expect_probe_duration().times(2).returning(move |_| probe_error());
        tool.expect_extract_segment().times(0);

        let strict = ChunkSplitter::new(&tool, &store, &ChunkingConfig::default())
            .with_threshold_bytes(THRESHOLD);
        let err = strict.split(&audio).await.unwrap_err();
        assert!(matches!(err, PipelineError::Split { .. }));
        assert!(err.to_string().contains("ffprobe not found"));

        let lenient_config = ChunkingConfig {
            on_probe_failure: ProbeFailurePolicy::WholeFile,
            ..ChunkingConfig::default()
        };
        let lenient = ChunkSplitter::new(&tool, &store, &lenient_config)
            .with_threshold_bytes(THRESHOLD);
        let set = lenient.split(&audio).await.unwrap();
        assert_eq!(set.chunks, vec![audio.clone()]);
        assert!(!set.split);
    }

    #[tokio::test]
    async fn test_missing_chunk_output_policies() {
        let (_dir, store, audio) = setup(THRESHOLD as usize + 1);
        let missing_last = |tool: &mut MockMediaTool| {
            tool.expect_probe_duration().returning(|_| Ok(1200.0));
            tool.expect_extract_segment().returning(|_, output, start, _| {
                if start < 1200 {
                    std::fs::write(output, b"audio").unwrap();
                }
                Ok(())
            });
        };

        let mut tool = MockMediaTool::new();
        missing_last(&mut tool);
        let strict = ChunkSplitter::new(&tool, &store, &ChunkingConfig::default())
            .with_threshold_bytes(THRESHOLD);
        let err = strict.split(&audio).await.unwrap_err();
        assert!(matches!(err, PipelineError::Split { .. }));
        assert!(!store.path(Artifact::ChunkDir { stem: "aula1" }).exists());

        let mut tool = MockMediaTool::new();
        missing_last(&mut tool);
        let lenient_config = ChunkingConfig {
            allow_missing_chunks: true,
            ..ChunkingConfig::default()
        };
        let lenient = ChunkSplitter::new(&tool, &store, &lenient_config)
            .with_threshold_bytes(THRESHOLD);
        let set = lenient.split(&audio).await.unwrap();
        assert_eq!(set.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_extraction_removes_partial_chunk() {
        let (_dir, store, audio) = setup(THRESHOLD as usize + 1);
        let mut tool = MockMediaTool::new();
        tool.expect_probe_duration().returning(|_| Ok(300.0));
        tool.expect_extract_segment().times(1).returning(|input, output, _, _| {
            std::fs::write(output, b"half").unwrap();
            Err(PipelineError::Split {
                path: input.to_path_buf(),
                message: "ffmpeg crashed".to_string(),
            })
        });

        let splitter = ChunkSplitter::new(&tool, &store, &ChunkingConfig::default())
            .with_threshold_bytes(THRESHOLD);
        assert!(splitter.split(&audio).await.is_err());
        assert!(!store.path(Artifact::Chunk { stem: "aula1", ordinal: 1 }).exists());
    }

    #[tokio::test]
    async fn test_rerun_after_partial_split_extracts_every_chunk() {
        let (_dir, store, audio) = setup(THRESHOLD as usize + 1);

        let mut failing = MockMediaTool::new();
        failing.expect_probe_duration().returning(|_| Ok(1200.0));
        failing.expect_extract_segment().returning(|input, output, start, _| {
            if start >= 1200 {
                return Err(PipelineError::Split {
                    path: input.to_path_buf(),
                    message: "ffmpeg killed".to_string(),
                });
            }
            std::fs::write(output, b"audio").unwrap();
            Ok(())
        });
        let splitter = ChunkSplitter::new(&failing, &store, &ChunkingConfig::default())
            .with_threshold_bytes(THRESHOLD);
        assert!(splitter.split(&audio).await.is_err());
        assert!(!store.path(Artifact::ChunkDir { stem: "aula1" }).exists());

        let working = writing_tool(1200.0, 3);
        let splitter = ChunkSplitter::new(&working, &store, &ChunkingConfig::default())
            .with_threshold_bytes(THRESHOLD);
        let set = splitter.split(&audio).await.unwrap();
        assert_eq!(set.len(), 3);
    }

    #[tokio::test]
    async fn test_fresh_split_discards_transcripts_of_other_audio() {
        let (_dir, store, audio) = setup(THRESHOLD as usize + 1);
        let leftover = |ordinal: usize| {
            let chunk_stem = format!("chunk_{ordinal:03}");
            store.path(Artifact::ChunkTranscript {
                asset_stem: "aula1",
                chunk_stem: &chunk_stem,
            })
        };
        for ordinal in [1, 3, 4] {
            let chunk_stem = format!("chunk_{ordinal:03}");
            let artifact = Artifact::ChunkTranscript {
                asset_stem: "other",
                chunk_stem: &chunk_stem,
            };
            store.write_text(artifact, "another lecture").unwrap();
        }

        let tool = writing_tool(1200.0, 3);
        let splitter = ChunkSplitter::new(&tool, &store, &ChunkingConfig::default())
            .with_threshold_bytes(THRESHOLD);
        splitter.split(&audio).await.unwrap();

        assert!(!leftover(1).exists());
        assert!(!leftover(3).exists());
        // Beyond this asset's chunk count, so not touched
        assert!(leftover(4).exists());
    }

    #[tokio::test]
    async fn test_implausible_duration_is_split_error() {
        let (_dir, store, audio) = setup(THRESHOLD as usize + 1);
        let mut tool = MockMediaTool::new();
        tool.expect_probe_duration().returning(|_| Ok(1e30));
        tool.expect_extract_segment().times(0);

        let splitter = ChunkSplitter::new(&tool, &store, &ChunkingConfig::default())
            .with_threshold_bytes(THRESHOLD);
        let err = splitter.split(&audio).await.unwrap_err();
        assert!(matches!(err, PipelineError::Split { .. }));
        assert!(!store.path(Artifact::ChunkDir { stem: "aula1" }).exists());
    }

    #[tokio::test]
    async fn test_reuse_discards_transcripts_shared_with_other_assets() {
        let (_dir, store, audio) = setup(THRESHOLD as usize + 1);
        for (stem, ordinal) in [("aula1", 1), ("aula1", 2), ("other", 1)] {
            let path = store.path(Artifact::Chunk { stem, ordinal });
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, b"x").unwrap();
        }
        let shared = store
            .write_text(
                Artifact::ChunkTranscript {
                    asset_stem: "aula1",
                    chunk_stem: "chunk_001",
                },
                "whose?",
            )
            .unwrap();
        let own = store
            .write_text(
                Artifact::ChunkTranscript {
                    asset_stem: "aula1",
                    chunk_stem: "chunk_002",
                },
                "mine",
            )
            .unwrap();

        let mut tool = MockMediaTool::new();
        tool.expect_probe_duration().times(0);
        tool.expect_extract_segment().times(0);

        let splitter = ChunkSplitter::new(&tool, &store, &ChunkingConfig::default())
            .with_threshold_bytes(THRESHOLD);
        assert_eq!(splitter.split(&audio).await.unwrap().len(), 2);

        assert!(!shared.exists());
        assert_eq!(std::fs::read_to_string(own).unwrap(), "mine");
    }
}

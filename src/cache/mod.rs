use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::{CacheValidation, ChunkTranscriptNaming, LayoutConfig};

pub mod cleanup;

pub use cleanup::{CleanupManager, CleanupReport};

/// A pipeline artifact, identified by the asset stem and the stage that produces it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact<'a> {
    /// `<normalized_dir>/<stem>.mp3`
    NormalizedAudio { stem: &'a str },

    /// `<chunks_dir>/<stem>/`
    ChunkDir { stem: &'a str },

    /// `<chunks_dir>/<stem>/chunk_<NNN>.mp3`, 1-based ordinal
    Chunk { stem: &'a str, ordinal: usize },

    /// Transcript of one chunk, or of the whole asset when it was not split
    ChunkTranscript {
        asset_stem: &'a str,
        chunk_stem: &'a str,
    },

    /// `<transcripts_dir>/<stem>_original.txt`
    Combined { stem: &'a str },

    /// `<transcripts_dir>/<stem>_<suffix>.txt`, the terminal marker
    Final { stem: &'a str },
}

/// Maps artifacts to deterministic paths and decides cache hits.
///
/// All cache checks go through [`ArtifactStore::lookup`], so stronger validation only
/// has to be added there.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    layout: LayoutConfig,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>, layout: LayoutConfig) -> Self {
        Self {
            root: root.into(),
            layout,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn layout(&self) -> &LayoutConfig {
        &self.layout
    }

    pub fn input_dir(&self) -> PathBuf {
        self.root.join(&self.layout.input_dir)
    }

    pub fn chunks_root(&self) -> PathBuf {
        self.root.join(&self.layout.chunks_dir)
    }

    pub fn chunk_transcripts_dir(&self) -> PathBuf {
        self.root.join(&self.layout.transcripts_dir).join("chunks")
    }

    /// Deterministic path of an artifact
    pub fn path(&self, artifact: Artifact<'_>) -> PathBuf {
        match artifact {
            Artifact::NormalizedAudio { stem } => self
                .root
                .join(&self.layout.normalized_dir)
                .join(format!("{stem}.mp3")),
            Artifact::ChunkDir { stem } => self.chunks_root().join(stem),
            Artifact::Chunk { stem, ordinal } => self
                .chunks_root()
                .join(stem)
                .join(chunk_file_name(ordinal)),
            Artifact::ChunkTranscript {
                asset_stem,
                chunk_stem,
            } => {
                let name = match self.layout.chunk_transcript_naming {
                    ChunkTranscriptNaming::Qualified if asset_stem != chunk_stem => {
                        format!("{asset_stem}_{chunk_stem}_transcricao.txt")
                    }
                    _ => format!("{chunk_stem}_transcricao.txt"),
                };
                self.chunk_transcripts_dir().join(name)
            }
            Artifact::Combined { stem } => self
                .root
                .join(&self.layout.transcripts_dir)
                .join(format!("{stem}_original.txt")),
            Artifact::Final { stem } => self
                .root
                .join(&self.layout.transcripts_dir)
                .join(format!("{stem}_{}.txt", self.layout.final_suffix)),
        }
    }

    /// Returns the artifact path when it counts as a cache hit
    pub fn lookup(&self, artifact: Artifact<'_>) -> Option<PathBuf> {
        let path = self.path(artifact);
        let metadata = std::fs::metadata(&path).ok()?;

        let valid = match self.layout.cache_validation {
            CacheValidation::Exists => true,
            CacheValidation::NonEmpty => metadata.is_dir() || metadata.len() > 0,
        };

        if valid {
            tracing::debug!("Cache hit: {}", path.display());
            Some(path)
        } else {
            tracing::debug!("Ignoring invalid cached artifact: {}", path.display());
            None
        }
    }

    /// Create the top-level artifact directories
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        fs_err::create_dir_all(self.root.join(&self.layout.transcripts_dir))?;
        fs_err::create_dir_all(self.chunks_root())?;
        fs_err::create_dir_all(self.root.join(&self.layout.normalized_dir))?;
        Ok(())
    }

    /// Write a text artifact so that it either appears complete or not at all
    pub fn write_text(&self, artifact: Artifact<'_>, content: &str) -> std::io::Result<PathBuf> {
        let path = self.path(artifact);
        write_atomic(&path, content.as_bytes())?;
        Ok(path)
    }

    pub fn read_text(&self, path: &Path) -> std::io::Result<String> {
        fs_err::read_to_string(path)
    }
}

/// File name of the chunk with the given 1-based ordinal
pub fn chunk_file_name(ordinal: usize) -> String {
    format!("chunk_{ordinal:03}.mp3")
}

/// File stem of a path, used as the cache key of every stage
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn write_atomic(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs_err::create_dir_all(parent)?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;

    Ok(())
}

use std::io::ErrorKind;
use std::path::Path;

use super::{file_stem, Artifact, ArtifactStore};

/// What a cleanup pass removed
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed_chunk_dir: bool,
    pub removed_transcripts: usize,
}

/// Removes the transient chunk artifacts of an asset once it reached its terminal state
pub struct CleanupManager<'a> {
    store: &'a ArtifactStore,
}

impl<'a> CleanupManager<'a> {
    pub fn new(store: &'a ArtifactStore) -> Self {
        Self { store }
    }

    /// Remove the chunk directory and chunk transcripts of `stem`.
    ///
    /// Missing files and directories are not an error, so the call is idempotent.
    pub fn cleanup(&self, stem: &str) -> std::io::Result<CleanupReport> {
        let mut report = CleanupReport::default();
        let chunk_dir = self.store.path(Artifact::ChunkDir { stem });

        // Transcripts of split chunks are keyed by the chunk stem, so collect them
        // while the chunk directory still tells us which chunks belonged to the asset.
        for chunk_stem in list_stems(&chunk_dir)? {
            let transcript = self.store.path(Artifact::ChunkTranscript {
                asset_stem: stem,
                chunk_stem: &chunk_stem,
            });
            if remove_file_if_exists(&transcript)? {
                report.removed_transcripts += 1;
            }
        }

        match fs_err::remove_dir_all(&chunk_dir) {
            Ok(()) => {
                tracing::info!("Removed chunk directory {}", chunk_dir.display());
                report.removed_chunk_dir = true;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        let transcripts_dir = self.store.chunk_transcripts_dir();
        let entries = match std::fs::read_dir(&transcripts_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(report),
            Err(e) => return Err(e),
        };

        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if belongs_to_asset(&name, stem) && remove_file_if_exists(&entry.path())? {
                report.removed_transcripts += 1;
            }
        }

        if report.removed_transcripts > 0 {
            tracing::info!(
                "Removed {} temporary transcript(s) of {}",
                report.removed_transcripts,
                stem
            );
        }

        Ok(report)
    }
}

/// Transcript names derived from the asset stem itself:
/// `<stem>_transcricao.txt` and `<stem>_chunk_NNN_transcricao.txt`.
fn belongs_to_asset(name: &str, stem: &str) -> bool {
    let Some(rest) = name.strip_prefix(stem) else {
        return false;
    };

    if rest == "_transcricao.txt" {
        return true;
    }

    rest.strip_prefix("_chunk_")
        .and_then(|r| r.strip_suffix("_transcricao.txt"))
        .is_some_and(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()))
}

fn list_stems(dir: &Path) -> std::io::Result<Vec<String>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut stems = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() {
            stems.push(file_stem(&path));
        }
    }
    Ok(stems)
}

fn remove_file_if_exists(path: &Path) -> std::io::Result<bool> {
    match fs_err::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

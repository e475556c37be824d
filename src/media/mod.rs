use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;

use crate::config::MediaConfig;
use crate::{PipelineError, StageResult};

pub mod normalizer;
pub mod splitter;

pub use normalizer::MediaNormalizer;
pub use splitter::{chunk_count, ChunkSet, ChunkSplitter};

/// Audio formats accepted by the transcription provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Mp3,
    M4a,
    Wav,
    Flac,
    Ogg,
    Webm,
}

impl AudioFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "mp3" => Some(AudioFormat::Mp3),
            "m4a" | "aac" => Some(AudioFormat::M4a),
            "wav" => Some(AudioFormat::Wav),
            "flac" => Some(AudioFormat::Flac),
            "ogg" => Some(AudioFormat::Ogg),
            "webm" => Some(AudioFormat::Webm),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// Get MIME type for the format
    pub fn mime_type(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::M4a => "audio/mp4",
            AudioFormat::Wav => "audio/wav",
            AudioFormat::Flac => "audio/flac",
            AudioFormat::Ogg => "audio/ogg",
            AudioFormat::Webm => "audio/webm",
        }
    }
}

/// Kind of a source file, decided by its extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn of(path: &Path, config: &MediaConfig) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        if config.video_extensions.iter().any(|v| v.eq_ignore_ascii_case(&ext)) {
            Some(MediaKind::Video)
        } else if config.audio_extensions.iter().any(|a| a.eq_ignore_ascii_case(&ext)) {
            Some(MediaKind::Audio)
        } else {
            None
        }
    }
}

/// Transcoder and prober operations used by the pipeline
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaTool: Send + Sync {
    /// Duration of an audio asset in seconds
    async fn probe_duration(&self, path: &Path) -> StageResult<f64>;

    /// Encode the audio track of `input` into `output`
    async fn convert_to_audio(&self, input: &Path, output: &Path) -> StageResult<()>;

    /// Encode `duration_secs` of `input` starting at `start_secs` into `output`
    async fn extract_segment(
        &self,
        input: &Path,
        output: &Path,
        start_secs: u64,
        duration_secs: u64,
    ) -> StageResult<()>;
}

/// [`MediaTool`] backed by the ffmpeg and ffprobe binaries
pub struct FfmpegTool {
    ffmpeg_path: String,
    ffprobe_path: String,
    bitrate: String,
}

impl FfmpegTool {
    pub fn new(config: &MediaConfig) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            ffprobe_path: config.ffprobe_path.clone(),
            bitrate: config.bitrate.clone(),
        }
    }

    async fn run_ffmpeg(&self, args: Vec<String>) -> std::result::Result<(), String> {
        tracing::debug!("Running {} {}", self.ffmpeg_path, args.join(" "));

        let output = Command::new(&self.ffmpeg_path)
            .args(&args)
            .output()
            .await
            .map_err(|e| format!("failed to run {}: {}", self.ffmpeg_path, e))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "{} exited with {}: {}",
                self.ffmpeg_path,
                output.status,
                last_lines(&error, 5)
            ));
        }

        Ok(())
    }
}

#[async_trait]
impl MediaTool for FfmpegTool {
    async fn probe_duration(&self, path: &Path) -> StageResult<f64> {
        let probe_error = |message: String| PipelineError::Probe {
            path: path.to_path_buf(),
            message,
        };

        let output = Command::new(&self.ffprobe_path)
            .args([
                "-v", "error",
                "-show_entries", "format=duration",
                "-of", "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .output()
            .await
            .map_err(|e| probe_error(format!("failed to run {}: {}", self.ffprobe_path, e)))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(probe_error(format!("ffprobe failed: {}", error.trim())));
        }

        parse_duration(&String::from_utf8_lossy(&output.stdout)).map_err(probe_error)
    }

    async fn convert_to_audio(&self, input: &Path, output: &Path) -> StageResult<()> {
        let args = vec![
            "-i".to_string(), input.to_string_lossy().into_owned(),
            "-vn".to_string(), // No video
            "-acodec".to_string(), "libmp3lame".to_string(),
            "-b:a".to_string(), self.bitrate.clone(),
            "-y".to_string(), // Overwrite output file
            output.to_string_lossy().into_owned(),
        ];

        self.run_ffmpeg(args)
            .await
            .map_err(|message| PipelineError::Conversion {
                path: input.to_path_buf(),
                message,
            })
    }

    async fn extract_segment(
        &self,
        input: &Path,
        output: &Path,
        start_secs: u64,
        duration_secs: u64,
    ) -> StageResult<()> {
        let args = vec![
            "-i".to_string(), input.to_string_lossy().into_owned(),
            "-ss".to_string(), start_secs.to_string(),
            "-t".to_string(), duration_secs.to_string(),
            "-acodec".to_string(), "libmp3lame".to_string(),
            "-b:a".to_string(), self.bitrate.clone(),
            "-y".to_string(),
            output.to_string_lossy().into_owned(),
        ];

        self.run_ffmpeg(args)
            .await
            .map_err(|message| PipelineError::Split {
                path: input.to_path_buf(),
                message: format!("extracting {} failed: {}", output.display(), message),
            })
    }
}

/// Parse ffprobe's bare `format=duration` output
pub fn parse_duration(stdout: &str) -> std::result::Result<f64, String> {
    let trimmed = stdout.trim();
    match trimmed.parse::<f64>() {
        Ok(duration) if is_plausible_duration(duration) => Ok(duration),
        _ => Err(format!("unexpected duration output: {trimmed:?}")),
    }
}

/// Longest duration accepted from the prober, one week
pub const MAX_DURATION_SECS: f64 = 7.0 * 24.0 * 3600.0;

pub fn is_plausible_duration(duration: f64) -> bool {
    duration.is_finite() && (0.0..=MAX_DURATION_SECS).contains(&duration)
}

/// Size of a file in bytes
pub fn file_size(path: &Path) -> std::io::Result<u64> {
    Ok(fs_err::metadata(path)?.len())
}

/// True when the path exists and holds at least one byte
pub fn is_materialized(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.is_file() && m.len() > 0).unwrap_or(false)
}

/// Audio files in `dir` with the given extension, sorted by name
pub fn list_sorted(dir: &Path, extension: &str) -> std::io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs_err::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case(extension))
        })
        .collect();
    files.sort();
    Ok(files)
}

fn last_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.trim().lines().collect();
    lines[lines.len().saturating_sub(count)..].join(" | ")
}

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Filesystem layout of the artifacts
    pub layout: LayoutConfig,

    /// External transcoder settings
    pub media: MediaConfig,

    /// Chunking policy for oversized audio
    pub chunking: ChunkingConfig,

    /// Speech-to-text provider settings
    pub transcription: TranscriptionConfig,

    /// Translation/cleanup provider settings
    pub translation: TranslationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Directory scanned for source media
    pub input_dir: PathBuf,

    /// Directory holding audio normalized from video sources
    pub normalized_dir: PathBuf,

    /// Root of the per-asset chunk directories
    pub chunks_dir: PathBuf,

    /// Directory holding combined and final transcripts
    pub transcripts_dir: PathBuf,

    /// Suffix of the final artifact, `<stem>_<suffix>.txt`
    pub final_suffix: String,

    /// How per-chunk transcript files are named
    pub chunk_transcript_naming: ChunkTranscriptNaming,

    /// What a cache hit requires of an existing artifact
    pub cache_validation: CacheValidation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkTranscriptNaming {
    /// `<chunk-stem>_transcricao.txt`
    Legacy,
    /// `<asset-stem>_<chunk-stem>_transcricao.txt`
    Qualified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheValidation {
    /// Existence alone is trusted
    Exists,
    /// The artifact must also be non-empty
    NonEmpty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub ffmpeg_path: String,
    pub ffprobe_path: String,

    /// Bitrate used for normalized audio and chunks
    pub bitrate: String,

    /// Source extensions processed as audio
    pub audio_extensions: Vec<String>,

    /// Source extensions normalized to audio first
    pub video_extensions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Files larger than this are split
    pub max_file_size_mb: u64,

    /// Length of every chunk in seconds
    pub chunk_duration_secs: u64,

    /// What to do when the duration of an oversized file cannot be probed
    pub on_probe_failure: ProbeFailurePolicy,

    /// Drop chunks whose extraction produced no output instead of failing the file
    pub allow_missing_chunks: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeFailurePolicy {
    /// Fail the file with a split error
    Fail,
    /// Transcribe the whole file as a single chunk
    WholeFile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    /// Base URL of the OpenAI-compatible API
    pub api_base: String,

    pub model: String,

    /// Maximum chunks transcribed at the same time
    pub concurrency: usize,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationConfig {
    /// Base URL of the Gemini API
    pub api_base: String,

    pub model: String,

    /// Language the final transcript is written in
    pub target_language: String,

    /// Optional subject of the lectures, added to the instructions
    pub subject: Option<String>,

    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("aulas"),
            normalized_dir: PathBuf::from("aulas_mp3"),
            chunks_dir: PathBuf::from("chunks"),
            transcripts_dir: PathBuf::from("transcricoes"),
            final_suffix: "PT-BR".to_string(),
            chunk_transcript_naming: ChunkTranscriptNaming::Legacy,
            cache_validation: CacheValidation::Exists,
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            bitrate: "128k".to_string(),
            audio_extensions: vec!["mp3".to_string()],
            video_extensions: vec!["mp4".to_string()],
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: 20,
            chunk_duration_secs: 600,
            on_probe_failure: ProbeFailurePolicy::Fail,
            allow_missing_chunks: false,
        }
    }
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            model: "whisper-1".to_string(),
            concurrency: 4,
            request_timeout_secs: 600,
        }
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            api_base: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-3-flash-preview".to_string(),
            target_language: "Brazilian Portuguese (PT-BR)".to_string(),
            subject: None,
            temperature: 0.3,
            top_p: 0.95,
            top_k: 40,
            max_output_tokens: 65536,
            request_timeout_secs: 900,
        }
    }
}

impl ChunkingConfig {
    pub fn threshold_bytes(&self) -> u64 {
        self.max_file_size_mb.saturating_mul(1024 * 1024)
    }
}

impl Config {
    /// Load configuration from an explicit path, the usual locations, or the defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => Self::config_path().ok().filter(|path| path.exists()),
        };

        let Some(path) = path else {
            tracing::debug!("No config file found, using defaults");
            return Ok(Self::default());
        };

        let content = fs_err::read_to_string(&path).context("Failed to read config file")?;
        let config = Self::from_yaml(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;

        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Write configuration to `path`, or to the user config directory
    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::user_config_path()?,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;
        fs_err::write(&path, content).context("Failed to write config file")?;

        Ok(path)
    }

    /// Get configuration file path
    fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        Self::user_config_path()
    }

    fn user_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Could not determine config directory")?;

        Ok(config_dir.join("lecture-pipeline").join("config.yaml"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_duration_secs == 0 {
            anyhow::bail!("chunking.chunk_duration_secs must be greater than zero");
        }

        if self.chunking.max_file_size_mb == 0 {
            anyhow::bail!("chunking.max_file_size_mb must be greater than zero");
        }

        if self.transcription.concurrency == 0 {
            anyhow::bail!("transcription.concurrency must be at least 1");
        }

        if self.media.audio_extensions.is_empty() && self.media.video_extensions.is_empty() {
            anyhow::bail!("At least one audio or video extension must be configured");
        }

        if self.layout.final_suffix.trim().is_empty() {
            anyhow::bail!("layout.final_suffix must not be empty");
        }

        Ok(())
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  Input directory: {}", self.layout.input_dir.display());
        println!("  Normalized audio: {}", self.layout.normalized_dir.display());
        println!("  Chunks: {}", self.layout.chunks_dir.display());
        println!("  Transcripts: {}", self.layout.transcripts_dir.display());
        println!("  Final suffix: {}", self.layout.final_suffix);
        println!(
            "  Split above: {} MB into {}s chunks",
            self.chunking.max_file_size_mb, self.chunking.chunk_duration_secs
        );
        println!("  Probe failure policy: {:?}", self.chunking.on_probe_failure);
        println!("  Allow missing chunks: {}", self.chunking.allow_missing_chunks);
        println!(
            "  Transcription: {} (concurrency {})",
            self.transcription.model, self.transcription.concurrency
        );
        println!(
            "  Translation: {} -> {}",
            self.translation.model, self.translation.target_language
        );
    }
}

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "lecture-pipeline",
    about = "Lecture Pipeline - Transcribe and translate recorded lectures, resuming where the last run stopped",
    version,
    long_about = "Turns lecture recordings (MP3/MP4) into cleaned-up, translated transcripts. Video is converted to audio, large audio is split into chunks, every chunk is transcribed, and the combined transcript is translated. Intermediate files are kept as a cache, so interrupted runs resume without repeating paid work."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to a YAML configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory the artifact layout is rooted at
    #[arg(long, global = true, value_name = "DIR", default_value = ".")]
    pub workdir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,
}

/// Provider credentials, read from the environment when not given
#[derive(clap::Args, Clone)]
pub struct ProviderKeys {
    /// API key of the transcription provider
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: String,

    /// API key of the translation provider
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Process every audio/video file of the input directory
    Run {
        /// Directory to scan (defaults to the configured input directory)
        #[arg(short, long, value_name = "DIR")]
        input_dir: Option<PathBuf>,

        /// Summary format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        #[command(flatten)]
        keys: ProviderKeys,
    },

    /// Process specific files
    Process {
        /// Audio or video files to process
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,

        /// Summary format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        #[command(flatten)]
        keys: ProviderKeys,
    },

    /// Download a shared file into the input directory
    Fetch {
        /// Share link of the file
        #[arg(value_name = "URL")]
        url: String,

        /// Destination directory (defaults to the configured input directory)
        #[arg(short, long, value_name = "DIR")]
        dest: Option<PathBuf>,
    },

    /// Remove the chunk artifacts of a file
    Clean {
        /// File stem (name without extension)
        #[arg(value_name = "STEM")]
        stem: String,
    },

    /// Show or initialize the configuration
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,

        /// Write the default configuration file
        #[arg(long, conflicts_with = "show")]
        init: bool,
    },
}

#[derive(ValueEnum, Clone, Debug)]
pub enum OutputFormat {
    /// Plain text
    Text,
    /// JSON with per-file details
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_process_with_keys() {
        let cli = Cli::try_parse_from([
            "lecture-pipeline",
            "process",
            "aulas/aula1.mp3",
            "--openai-api-key",
            "sk-1",
            "--gemini-api-key",
            "g-1",
            "--format",
            "json",
        ])
        .unwrap();

        match cli.command {
            Commands::Process { files, format, keys } => {
                assert_eq!(files, vec![PathBuf::from("aulas/aula1.mp3")]);
                assert!(matches!(format, OutputFormat::Json));
                assert_eq!(keys.openai_api_key, "sk-1");
            }
            _ => panic!("expected process command"),
        }
    }

    #[test]
    fn test_clean_needs_no_keys() {
        let cli = Cli::try_parse_from(["lecture-pipeline", "--workdir", "/tmp/x", "clean", "aula1"]).unwrap();
        assert_eq!(cli.workdir, PathBuf::from("/tmp/x"));
        assert!(matches!(cli.command, Commands::Clean { ref stem } if stem == "aula1"));
    }
}

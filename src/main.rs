use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use lecture_pipeline::cli::{Cli, Commands, OutputFormat, ProviderKeys};
use lecture_pipeline::config::Config;
use lecture_pipeline::fetch::Downloader;
use lecture_pipeline::media::FfmpegTool;
use lecture_pipeline::providers::{GeminiTranslator, WhisperTranscriber};
use lecture_pipeline::{output, utils, ArtifactStore, CleanupManager, CleanupReport, Pipeline};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    // --init writes the defaults, so the target file does not have to exist yet
    let config = match cli.command {
        Commands::Config { init: true, .. } => Config::default(),
        _ => Config::load(cli.config.as_deref())?,
    };

    match cli.command {
        Commands::Run {
            ref input_dir,
            ref format,
            ref keys,
        } => {
            let pipeline = build_pipeline(&cli, &config, keys).await?;
            let sources = pipeline.discover_sources(input_dir.as_deref())?;

            if sources.is_empty() {
                anyhow::bail!("No audio or video files found to process");
            }

            tracing::info!("Found {} file(s)", sources.len());
            run(&pipeline, &sources, format).await?;
        }
        Commands::Process {
            ref files,
            ref format,
            ref keys,
        } => {
            let pipeline = build_pipeline(&cli, &config, keys).await?;
            run(&pipeline, files, format).await?;
        }
        Commands::Fetch { ref url, ref dest } => {
            let dest = dest
                .clone()
                .unwrap_or_else(|| cli.workdir.join(&config.layout.input_dir));
            let path = Downloader::new(!cli.quiet)?.fetch(url, &dest).await?;
            println!("Downloaded to: {}", path.display());
        }
        Commands::Clean { ref stem } => {
            let store = ArtifactStore::new(&cli.workdir, config.layout.clone());
            let CleanupReport {
                removed_chunk_dir,
                removed_transcripts,
            } = CleanupManager::new(&store).cleanup(stem)?;
            println!(
                "Removed chunk directory: {}, temporary transcripts: {}",
                if removed_chunk_dir { "yes" } else { "no" },
                removed_transcripts
            );
        }
        Commands::Config { show, init } => {
            if init {
                let path = config.save(cli.config.as_deref())?;
                println!("Configuration written to: {}", path.display());
            } else if show {
                config.display();
            } else {
                config.display();
                println!();
                println!("Use --init to write a configuration file you can edit.");
            }
        }
    }

    Ok(())
}

fn init_tracing(cli: &Cli) {
    let default_filter = if cli.verbose {
        "lecture_pipeline=debug"
    } else {
        "lecture_pipeline=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    if cli.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn build_pipeline(cli: &Cli, config: &Config, keys: &ProviderKeys) -> Result<Pipeline> {
    // Missing tools only matter for files that still need transcoding
    let missing_deps = utils::check_dependencies(&config.media).await;
    if !missing_deps.is_empty() {
        eprintln!("⚠️  Dependency check warnings:");
        for dep in missing_deps {
            eprintln!("   • {}", dep);
        }
        eprintln!("   (Continuing anyway - cached files can still be processed)");
    }

    let transcriber = WhisperTranscriber::new(&config.transcription, keys.openai_api_key.clone())?;
    let translator = GeminiTranslator::new(&config.translation, keys.gemini_api_key.clone())?;

    let root: PathBuf = cli.workdir.clone();
    Ok(Pipeline::new(
        config.clone(),
        root,
        Box::new(FfmpegTool::new(&config.media)),
        Box::new(transcriber),
        Box::new(translator),
    )
    .with_progress(!cli.quiet))
}

async fn run(pipeline: &Pipeline, sources: &[PathBuf], format: &OutputFormat) -> Result<()> {
    let summary = pipeline.run_batch(sources).await?;
    output::print_summary(&summary, format)?;

    if summary.all_failed() {
        anyhow::bail!("None of the {} file(s) could be processed", summary.total());
    }

    Ok(())
}

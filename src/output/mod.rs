use anyhow::{Context, Result};
use console::style;

use crate::cli::OutputFormat;
use crate::pipeline::{BatchSummary, FileState};

/// Render the batch summary in the requested format
pub fn render_summary(summary: &BatchSummary, format: &OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(format_as_text(summary)),
        OutputFormat::Json => {
            serde_json::to_string_pretty(summary).context("Failed to serialize summary")
        }
    }
}

/// Print the batch summary to the console
pub fn print_summary(summary: &BatchSummary, format: &OutputFormat) -> Result<()> {
    println!("{}", render_summary(summary, format)?);
    Ok(())
}

fn format_as_text(summary: &BatchSummary) -> String {
    let mut lines = Vec::with_capacity(summary.files.len() + 2);

    for file in &summary.files {
        let name = file.source.display();
        let line = match file.state {
            FileState::Done => format!(
                "{} {} -> {}",
                style("done").green(),
                name,
                file.final_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default()
            ),
            FileState::AlreadyDone => format!("{} {}", style("cached").cyan(), name),
            _ => format!(
                "{} {} ({}): {}",
                style("failed").red(),
                name,
                file.failed_stage
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "unknown stage".to_string()),
                file.error.as_deref().unwrap_or("unknown error")
            ),
        };
        lines.push(line);
    }

    lines.push(String::new());
    lines.push(format!(
        "Total processed: {}/{} files",
        summary.succeeded(),
        summary.total()
    ));

    lines.join("\n")
}

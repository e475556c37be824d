use anyhow::{Context, Result};
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::Client;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::utils::{format_file_size, sanitize_filename, validate_and_normalize_url};

const DRIVE_DOWNLOAD_URL: &str = "https://drive.usercontent.google.com/download";

/// Downloads shared files into the input directory
pub struct Downloader {
    client: Client,
    download_base: String,
    show_progress: bool,
}

impl Downloader {
    pub fn new(show_progress: bool) -> Result<Self> {
        let client = Client::builder()
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            download_base: DRIVE_DOWNLOAD_URL.to_string(),
            show_progress,
        })
    }

    /// Download the file behind a share link into `dest_dir`, returning its path
    pub async fn fetch(&self, share_url: &str, dest_dir: &Path) -> Result<PathBuf> {
        let share_url = validate_and_normalize_url(share_url)?;
        let file_id = extract_file_id(&share_url)
            .ok_or_else(|| anyhow::anyhow!("Unrecognized share link format: {}", share_url))?;

        tracing::info!("File ID: {}", file_id);
        fs_err::create_dir_all(dest_dir)?;

        let response = self
            .client
            .get(&self.download_base)
            .query(&[("id", file_id.as_str()), ("export", "download"), ("confirm", "t")])
            .send()
            .await
            .context("Failed to start download")?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to download file: HTTP {}", response.status());
        }

        let is_html = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/html"));
        if is_html {
            anyhow::bail!("Download returned a web page instead of the file, no output path produced");
        }

        let file_name = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|cd| cd.to_str().ok())
            .and_then(filename_from_disposition)
            .map(|name| sanitize_filename(&name))
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| file_id.clone());

        let output_path = dest_dir.join(&file_name);
        let partial_path = dest_dir.join(format!(".{file_name}.part"));

        let progress = self.progress_bar(response.content_length().unwrap_or(0));
        progress.set_message(file_name.clone());

        let mut file = fs_err::File::create(&partial_path)?;
        let mut downloaded = 0u64;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("Download interrupted")?;
            file.write_all(&chunk)?;
            downloaded += chunk.len() as u64;
            progress.set_position(downloaded);
        }
        file.flush()?;
        drop(file);

        if downloaded == 0 {
            let _ = fs_err::remove_file(&partial_path);
            anyhow::bail!("Download was empty, no output path produced");
        }

        if output_path.exists() {
            fs_err::remove_file(&output_path)?;
        }
        fs_err::rename(&partial_path, &output_path)?;

        progress.finish_with_message("Download complete");
        tracing::info!(
            "Downloaded {} ({})",
            output_path.display(),
            format_file_size(downloaded)
        );

        Ok(output_path)
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let progress = ProgressBar::new(len);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
        {
            progress.set_style(style);
        }
        progress
    }
}

/// File identifier of a `/file/d/<id>/...` or `?id=<id>` share link
pub fn extract_file_id(url: &str) -> Option<String> {
    if let Some((_, rest)) = url.split_once("/file/d/") {
        return rest
            .split(['/', '?', '#'])
            .next()
            .filter(|id| !id.is_empty())
            .map(str::to_string);
    }

    let parsed = url::Url::parse(url).ok()?;
    parsed
        .query_pairs()
        .find(|(key, _)| key == "id")
        .map(|(_, value)| value.into_owned())
        .filter(|id| !id.is_empty())
}

/// File name from a `Content-Disposition` header, preferring the RFC 5987 form
pub fn filename_from_disposition(header: &str) -> Option<String> {
    let params: Vec<(&str, &str)> = header
        .split(';')
        .filter_map(|part| part.trim().split_once('='))
        .map(|(key, value)| (key.trim(), value.trim()))
        .collect();

    let extended = params
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("filename*"))
        .and_then(|(_, value)| {
            let encoded = value.split_once("''").map(|(_, v)| v).unwrap_or(value);
            urlencoding::decode(encoded).ok().map(|s| s.into_owned())
        });

    extended.or_else(|| {
        params
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case("filename"))
            .map(|(_, value)| value.trim_matches('"').to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_file_id() {
        assert_eq!(
            extract_file_id("https://drive.google.com/file/d/1AbC-xyz_9/view?usp=sharing"),
            Some("1AbC-xyz_9".to_string())
        );
        assert_eq!(
            extract_file_id("https://drive.google.com/open?id=1AbC&authuser=0"),
            Some("1AbC".to_string())
        );
        assert_eq!(extract_file_id("https://drive.google.com/drive/folders/xyz"), None);
        assert_eq!(extract_file_id("https://drive.google.com/file/d/"), None);
    }

    #[test]
    fn test_filename_from_disposition() {
        assert_eq!(
            filename_from_disposition(r#"attachment; filename="aula 1.mp4""#),
            Some("aula 1.mp4".to_string())
        );
        assert_eq!(
            filename_from_disposition(
                r#"attachment; filename="aula.mp4"; filename*=UTF-8''Aula%20de%20Cefaleia.mp4"#
            ),
            Some("Aula de Cefaleia.mp4".to_string())
        );
        assert_eq!(filename_from_disposition("inline"), None);
    }

    #[tokio::test]
    async fn test_rejects_unknown_link_format() {
        let dir = tempfile::TempDir::new().unwrap();
        let downloader = Downloader::new(false).unwrap();

        let err = downloader
            .fetch("https://example.com/lecture.mp4", dir.path())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unrecognized share link"));

        let err = downloader.fetch("not a url", dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("Invalid URL"));
    }
}

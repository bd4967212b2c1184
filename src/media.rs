use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::IngestError;
use crate::job::CancelToken;

/// Probed source metadata. Sources that look manually curated (title plus
/// description plus a subtitle track) are flagged high-value for cascade
/// purposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    pub duration_secs: f64,
    pub title: Option<String>,
    pub description: Option<String>,
    pub subtitle_url: Option<String>,
    pub container: Option<String>,
}

impl MediaInfo {
    pub fn looks_high_value(&self) -> bool {
        self.title.is_some() && self.description.is_some() && self.subtitle_url.is_some()
    }
}

/// Abstraction over source fetching and local media tooling so the worker
/// pipeline can run against simulated media in tests.
#[async_trait]
pub trait MediaProvider: Send + Sync {
    async fn probe(&self, source: &str) -> Result<MediaInfo, IngestError>;

    /// Fetch the source into `dest`, returning the byte count. Checks the
    /// cancellation token between chunks.
    async fn download(
        &self,
        source: &str,
        dest: &Path,
        cancel: &CancelToken,
    ) -> Result<u64, IngestError>;

    /// Produce a mono 16kHz WAV next to the pipeline's working directory.
    async fn extract_audio(&self, media_path: &Path, out_dir: &Path)
        -> Result<PathBuf, IngestError>;

    /// Silence onsets in seconds, usable as chunk boundary hints.
    async fn detect_silence(&self, audio_path: &Path) -> Result<Vec<f64>, IngestError>;
}

/// Real implementation backed by ffmpeg/ffprobe and HTTP fetch.
pub struct FfmpegMediaProvider {
    client: reqwest::Client,
    /// 16kHz is the sweet spot for speech models
    target_sample_rate: u32,
}

impl FfmpegMediaProvider {
    pub fn new(download_timeout: Duration) -> Result<Self, IngestError> {
        let client = reqwest::Client::builder()
            .timeout(download_timeout)
            .build()
            .map_err(|e| IngestError::unrecoverable("setup", format!("http client: {}", e)))?;
        Ok(Self {
            client,
            target_sample_rate: 16000,
        })
    }
}

#[async_trait]
impl MediaProvider for FfmpegMediaProvider {
    async fn probe(&self, source: &str) -> Result<MediaInfo, IngestError> {
        let output = tokio::process::Command::new("ffprobe")
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                source,
            ])
            .output()
            .await
            .map_err(|e| IngestError::transient("probe", format!("ffprobe spawn: {}", e)))?;

        if !output.status.success() {
            return Err(IngestError::SourceUnavailable(format!(
                "ffprobe could not read {}",
                source
            )));
        }

        let data: serde_json::Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| IngestError::unrecoverable("probe", format!("ffprobe json: {}", e)))?;
        let format = &data["format"];

        let duration_secs: f64 = format["duration"]
            .as_str()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.0);

        let tags = &format["tags"];
        let info = MediaInfo {
            duration_secs,
            title: tags["title"].as_str().map(str::to_string),
            description: tags["description"]
                .as_str()
                .or_else(|| tags["comment"].as_str())
                .map(str::to_string),
            subtitle_url: None,
            container: format["format_name"].as_str().map(str::to_string),
        };

        debug!(
            "🔍 Probed {}: {:.1}s, container {:?}",
            source, info.duration_secs, info.container
        );
        Ok(info)
    }

    async fn download(
        &self,
        source: &str,
        dest: &Path,
        cancel: &CancelToken,
    ) -> Result<u64, IngestError> {
        info!("⬇️ Downloading {}", source);

        let response = self
            .client
            .get(source)
            .send()
            .await
            .map_err(|e| IngestError::transient("download", format!("request: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::GONE {
            return Err(IngestError::SourceUnavailable(source.to_string()));
        }
        if !status.is_success() {
            let err = IngestError::transient("download", format!("http {}", status));
            // Client errors other than 404/410 will not heal on retry
            if status.is_client_error() {
                return Err(IngestError::unrecoverable("download", format!("http {}", status)));
            }
            return Err(err);
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| IngestError::transient("download", format!("mkdir: {}", e)))?;
        }
        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| IngestError::transient("download", format!("create: {}", e)))?;

        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            if cancel.is_cancelled() {
                return Err(IngestError::Cancelled);
            }
            let chunk =
                chunk.map_err(|e| IngestError::transient("download", format!("stream: {}", e)))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| IngestError::transient("download", format!("write: {}", e)))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| IngestError::transient("download", format!("flush: {}", e)))?;

        info!("✅ Downloaded {} ({} bytes)", source, written);
        Ok(written)
    }

    async fn extract_audio(
        &self,
        media_path: &Path,
        out_dir: &Path,
    ) -> Result<PathBuf, IngestError> {
        let stem = media_path
            .file_stem()
            .ok_or_else(|| {
                IngestError::unrecoverable("extract_audio", "media path has no file stem")
            })?
            .to_string_lossy();
        let audio_path = out_dir.join(format!("{}.wav", stem));

        tokio::fs::create_dir_all(out_dir)
            .await
            .map_err(|e| IngestError::transient("extract_audio", format!("mkdir: {}", e)))?;

        info!("🎵 Extracting audio from {}", media_path.display());

        let status = tokio::process::Command::new("ffmpeg")
            .args([
                "-i",
                &media_path.to_string_lossy(),
                "-vn",
                "-acodec",
                "pcm_s16le",
                "-ar",
                &self.target_sample_rate.to_string(),
                "-ac",
                "1",
                "-f",
                "wav",
                "-y",
                &audio_path.to_string_lossy(),
            ])
            .status()
            .await
            .map_err(|e| IngestError::transient("extract_audio", format!("ffmpeg spawn: {}", e)))?;

        if !status.success() {
            return Err(IngestError::unrecoverable(
                "extract_audio",
                format!("ffmpeg failed for {}", media_path.display()),
            ));
        }

        Ok(audio_path)
    }

    async fn detect_silence(&self, audio_path: &Path) -> Result<Vec<f64>, IngestError> {
        let output = tokio::process::Command::new("ffmpeg")
            .args([
                "-i",
                &audio_path.to_string_lossy(),
                "-af",
                "silencedetect=noise=-30dB:d=1.5",
                "-f",
                "null",
                "-",
            ])
            .output()
            .await
            .map_err(|e| IngestError::transient("detect_silence", format!("ffmpeg spawn: {}", e)))?;

        // silencedetect reports on stderr regardless of exit status
        let stderr = String::from_utf8_lossy(&output.stderr);
        let onsets = parse_silence_onsets(&stderr);
        if onsets.is_empty() {
            warn!("No silence boundaries found in {}", audio_path.display());
        }
        Ok(onsets)
    }
}

fn parse_silence_onsets(ffmpeg_stderr: &str) -> Vec<f64> {
    let pattern = match Regex::new(r"silence_start:\s*([0-9.]+)") {
        Ok(p) => p,
        Err(_) => return Vec::new(),
    };
    let mut onsets: Vec<f64> = pattern
        .captures_iter(ffmpeg_stderr)
        .filter_map(|c| c.get(1)?.as_str().parse().ok())
        .collect();
    onsets.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    onsets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_silence_onsets() {
        let stderr = "\
[silencedetect @ 0x55] silence_start: 12.5\n\
[silencedetect @ 0x55] silence_end: 14.2 | silence_duration: 1.7\n\
[silencedetect @ 0x55] silence_start: 1800.25\n";
        let onsets = parse_silence_onsets(stderr);
        assert_eq!(onsets, vec![12.5, 1800.25]);
    }

    #[test]
    fn test_parse_silence_onsets_empty() {
        assert!(parse_silence_onsets("frame=100 fps=30").is_empty());
    }

    #[test]
    fn test_high_value_requires_all_metadata() {
        let mut info = MediaInfo {
            duration_secs: 120.0,
            title: Some("Lesson 1".into()),
            description: Some("Intro".into()),
            subtitle_url: Some("https://example.com/s.srt".into()),
            container: None,
        };
        assert!(info.looks_high_value());
        info.subtitle_url = None;
        assert!(!info.looks_high_value());
    }
}

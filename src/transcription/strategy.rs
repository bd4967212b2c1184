use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::TranscriptionConfig;
use crate::error::StrategyError;
use crate::transcription::{confidence_from_logprob, Segment, TranscriptionResult};

/// One self-contained transcription method. The cascade order is an explicit
/// list of these variants, evaluated by a single dispatch function; adding a
/// strategy means adding a variant, not a trait object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// Pull existing human-authored subtitles/captions (fast, free)
    SubtitlePull,
    /// Local speech-to-text model via a whisper-style CLI (slow, reliable)
    LocalModel,
    /// Paid cloud speech-to-text, high-value content only (paid, best)
    CloudModel,
    /// Static description fallback; always defined, never fails
    DescriptionFallback,
}

impl StrategyKind {
    pub fn name(&self) -> &'static str {
        match self {
            StrategyKind::SubtitlePull => "subtitle-pull",
            StrategyKind::LocalModel => "local-model",
            StrategyKind::CloudModel => "cloud-model",
            StrategyKind::DescriptionFallback => "description-fallback",
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The slice of one media item handed to a strategy. For short items this is
/// the whole item at offset 0; for long items the segmenter hands out one
/// window per chunk. Segment times in the returned result are window-local;
/// the segmenter rebases them during merge.
#[derive(Debug, Clone)]
pub struct MediaWindow {
    /// Original source reference
    pub source: String,
    /// Extracted 16 kHz mono audio for this item, when available
    pub audio_path: Option<PathBuf>,
    /// Caption/subtitle track location, when the source advertises one
    pub subtitle_url: Option<String>,
    /// Item title from probing
    pub title: Option<String>,
    /// Item description, feeds the fallback strategy
    pub description: Option<String>,
    /// Window offset into the item (seconds)
    pub offset_secs: f64,
    /// Window duration (seconds)
    pub duration_secs: f64,
    /// Content flagged as worth paid transcription
    pub high_value: bool,
}

impl MediaWindow {
    /// Whole-item window starting at zero.
    pub fn whole(source: impl Into<String>, duration_secs: f64) -> Self {
        Self {
            source: source.into(),
            audio_path: None,
            subtitle_url: None,
            title: None,
            description: None,
            offset_secs: 0.0,
            duration_secs,
            high_value: false,
        }
    }

    /// Same item, re-windowed to one chunk.
    pub fn rewindow(&self, offset_secs: f64, duration_secs: f64) -> Self {
        Self {
            offset_secs,
            duration_secs,
            ..self.clone()
        }
    }
}

/// Uniform strategy contract: attempt one strategy against one window.
#[async_trait]
pub trait StrategyExecutor: Send + Sync {
    async fn attempt(
        &self,
        strategy: StrategyKind,
        window: &MediaWindow,
        language: Option<&str>,
    ) -> Result<TranscriptionResult, StrategyError>;
}

/// Default executor backed by real tooling: HTTP subtitle pull, a
/// whisper-style CLI for the local model, and a cloud transcription API.
pub struct ToolingExecutor {
    config: TranscriptionConfig,
    http: reqwest::Client,
    cue_pattern: Regex,
}

impl ToolingExecutor {
    pub fn new(config: TranscriptionConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.min(300)))
            .build()
            .unwrap_or_default();

        // Matches both SRT ("00:01:23,456") and VTT ("00:01:23.456") cue lines
        let cue_pattern = Regex::new(
            r"(?m)^(\d{2}):(\d{2}):(\d{2})[,.](\d{3})\s*-->\s*(\d{2}):(\d{2}):(\d{2})[,.](\d{3})",
        )
        .expect("static cue pattern");

        Self {
            config,
            http,
            cue_pattern,
        }
    }

    /// Pull and parse an existing caption track. Authoritative subtitles
    /// report confidence 1.0.
    async fn pull_subtitles(
        &self,
        window: &MediaWindow,
    ) -> Result<TranscriptionResult, StrategyError> {
        let url = window
            .subtitle_url
            .as_deref()
            .ok_or_else(|| StrategyError::NoData("source has no caption track".into()))?;

        debug!("Pulling caption track: {}", url);
        let body = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| StrategyError::Execution(format!("caption fetch failed: {}", e)))?
            .text()
            .await
            .map_err(|e| StrategyError::Execution(format!("caption body read failed: {}", e)))?;

        let segments = self.parse_cues(&body, window);
        if segments.is_empty() {
            return Err(StrategyError::NoData("caption track had no cues".into()));
        }

        info!("📜 Pulled {} subtitle cues for {}", segments.len(), window.source);
        Ok(TranscriptionResult::from_segments(
            segments,
            self.config.language.clone(),
            1.0,
            StrategyKind::SubtitlePull.name(),
        ))
    }

    /// Parse SRT/VTT cues that fall inside the window, shifted to
    /// window-local time.
    fn parse_cues(&self, body: &str, window: &MediaWindow) -> Vec<Segment> {
        let mut segments = Vec::new();
        let window_end = window.offset_secs + window.duration_secs;

        let mut cursor = 0;
        while let Some(caps) = self.cue_pattern.captures_at(body, cursor) {
            let whole = caps.get(0).expect("capture 0 always present");
            let start = cue_seconds(&caps, 1);
            let end = cue_seconds(&caps, 5);

            // Cue text runs until the next blank line
            let text_start = whole.end();
            let text = body[text_start..]
                .split("\n\n")
                .next()
                .unwrap_or("")
                .trim()
                .to_string();
            cursor = text_start;

            if end > start && start >= window.offset_secs && end <= window_end && !text.is_empty() {
                segments.push(Segment {
                    start: start - window.offset_secs,
                    end: end - window.offset_secs,
                    text,
                    confidence: 1.0,
                    strategy: StrategyKind::SubtitlePull,
                });
            }
        }

        segments
    }

    /// Run the local whisper-style CLI against the window's audio.
    async fn run_local_model(
        &self,
        window: &MediaWindow,
        language: Option<&str>,
    ) -> Result<TranscriptionResult, StrategyError> {
        let audio_path = window
            .audio_path
            .as_deref()
            .ok_or_else(|| StrategyError::NoData("no extracted audio for local model".into()))?;

        let scratch = tempfile::tempdir()
            .map_err(|e| StrategyError::Execution(format!("scratch dir: {}", e)))?;
        let window_wav = scratch.path().join("window.wav");
        let output_base = scratch.path().join("window");

        // Cut the window out of the extracted audio without re-encoding
        let cut = Command::new("ffmpeg")
            .args([
                "-i",
                &audio_path.to_string_lossy(),
                "-ss",
                &window.offset_secs.to_string(),
                "-t",
                &window.duration_secs.to_string(),
                "-c",
                "copy",
                "-y",
                &window_wav.to_string_lossy(),
            ])
            .status()
            .await
            .map_err(|e| StrategyError::Execution(format!("ffmpeg spawn failed: {}", e)))?;
        if !cut.success() {
            return Err(StrategyError::Execution("ffmpeg window cut failed".into()));
        }

        let mut cmd = Command::new("whisper-cli");
        cmd.arg("-f")
            .arg(&window_wav)
            .arg("-oj")
            .arg("-of")
            .arg(&output_base)
            .arg("-m")
            .arg(format!("models/ggml-{}.bin", self.config.model));
        if let Some(lang) = language.or(self.config.language.as_deref()) {
            cmd.arg("-l").arg(lang);
        }

        info!(
            "🎤 Local model on {} ({}s window at {}s)",
            window.source, window.duration_secs, window.offset_secs
        );

        let timeout = Duration::from_secs(self.config.timeout_secs);
        let status = tokio::time::timeout(timeout, cmd.status())
            .await
            .map_err(|_| StrategyError::Timeout(self.config.timeout_secs))?
            .map_err(|e| StrategyError::Execution(format!("whisper spawn failed: {}", e)))?;
        if !status.success() {
            return Err(StrategyError::Execution(format!(
                "whisper exited with {}",
                status
            )));
        }

        let json_path = output_base.with_extension("json");
        let raw = tokio::fs::read_to_string(&json_path)
            .await
            .map_err(|e| StrategyError::Execution(format!("missing model output: {}", e)))?;
        let output: ModelOutput = serde_json::from_str(&raw)
            .map_err(|e| StrategyError::Execution(format!("model output parse: {}", e)))?;

        let segments: Vec<Segment> = output
            .segments
            .into_iter()
            .filter(|s| s.end > s.start && !s.text.trim().is_empty())
            .map(|s| Segment {
                start: s.start,
                end: s.end,
                text: s.text.trim().to_string(),
                confidence: s
                    .avg_logprob
                    .map(confidence_from_logprob)
                    .unwrap_or(0.5),
                strategy: StrategyKind::LocalModel,
            })
            .collect();

        if segments.is_empty() {
            return Err(StrategyError::NoData("model produced no segments".into()));
        }

        Ok(TranscriptionResult::from_segments(
            segments,
            output.language.clone(),
            output.language.as_ref().map(|_| 0.9).unwrap_or(0.0),
            StrategyKind::LocalModel.name(),
        ))
    }

    /// POST the window audio to the paid cloud service.
    async fn run_cloud_model(
        &self,
        window: &MediaWindow,
        language: Option<&str>,
    ) -> Result<TranscriptionResult, StrategyError> {
        let endpoint = self
            .config
            .cloud_endpoint
            .as_deref()
            .ok_or_else(|| StrategyError::NoData("cloud endpoint not configured".into()))?;
        let audio_path = window
            .audio_path
            .as_deref()
            .ok_or_else(|| StrategyError::NoData("no extracted audio for cloud model".into()))?;

        let bytes = tokio::fs::read(audio_path)
            .await
            .map_err(|e| StrategyError::Execution(format!("audio read: {}", e)))?;

        let mut request = self
            .http
            .post(endpoint)
            .query(&[
                ("offset", window.offset_secs.to_string()),
                ("duration", window.duration_secs.to_string()),
            ])
            .body(bytes);
        if let Some(key) = &self.config.cloud_api_key {
            request = request.bearer_auth(key);
        }
        if let Some(lang) = language.or(self.config.language.as_deref()) {
            request = request.query(&[("language", lang.to_string())]);
        }

        let timeout = Duration::from_secs(self.config.timeout_secs);
        let response = tokio::time::timeout(timeout, request.send())
            .await
            .map_err(|_| StrategyError::Timeout(self.config.timeout_secs))?
            .and_then(|r| r.error_for_status())
            .map_err(|e| StrategyError::Execution(format!("cloud request failed: {}", e)))?;

        let output: ModelOutput = response
            .json()
            .await
            .map_err(|e| StrategyError::Execution(format!("cloud response parse: {}", e)))?;

        let segments: Vec<Segment> = output
            .segments
            .into_iter()
            .filter(|s| s.end > s.start)
            .map(|s| Segment {
                start: s.start,
                end: s.end,
                text: s.text.trim().to_string(),
                confidence: s
                    .avg_logprob
                    .map(confidence_from_logprob)
                    .unwrap_or(0.8),
                strategy: StrategyKind::CloudModel,
            })
            .collect();

        if segments.is_empty() {
            return Err(StrategyError::NoData("cloud service returned no segments".into()));
        }

        Ok(TranscriptionResult::from_segments(
            segments,
            output.language.clone(),
            output.language.as_ref().map(|_| 0.95).unwrap_or(0.0),
            StrategyKind::CloudModel.name(),
        ))
    }

    /// Static description fallback. Degraded quality is signalled through
    /// confidence and method, never through an error.
    fn describe(&self, window: &MediaWindow) -> TranscriptionResult {
        let text = window
            .description
            .clone()
            .or_else(|| window.title.clone())
            .unwrap_or_else(|| format!("No transcript available for {}", window.source));

        warn!("📝 Falling back to description for {}", window.source);

        let segment = Segment {
            start: 0.0,
            end: window.duration_secs.max(0.0),
            text,
            confidence: 0.1,
            strategy: StrategyKind::DescriptionFallback,
        };

        TranscriptionResult::from_segments(
            vec![segment],
            None,
            0.0,
            StrategyKind::DescriptionFallback.name(),
        )
    }
}

#[async_trait]
impl StrategyExecutor for ToolingExecutor {
    async fn attempt(
        &self,
        strategy: StrategyKind,
        window: &MediaWindow,
        language: Option<&str>,
    ) -> Result<TranscriptionResult, StrategyError> {
        match strategy {
            StrategyKind::SubtitlePull => self.pull_subtitles(window).await,
            StrategyKind::LocalModel => self.run_local_model(window, language).await,
            StrategyKind::CloudModel => self.run_cloud_model(window, language).await,
            StrategyKind::DescriptionFallback => Ok(self.describe(window)),
        }
    }
}

fn cue_seconds(caps: &regex::Captures<'_>, first_group: usize) -> f64 {
    let field = |i: usize| -> f64 {
        caps.get(first_group + i)
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .unwrap_or(0.0)
    };
    field(0) * 3600.0 + field(1) * 60.0 + field(2) + field(3) / 1000.0
}

/// JSON shape shared by the local CLI and the cloud service
#[derive(Debug, Clone, Deserialize)]
struct ModelOutput {
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    segments: Vec<ModelSegment>,
}

#[derive(Debug, Clone, Deserialize)]
struct ModelSegment {
    start: f64,
    end: f64,
    text: String,
    #[serde(default)]
    avg_logprob: Option<f64>,
}

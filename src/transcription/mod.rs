pub mod engine;
pub mod segmenter;
pub mod strategy;

pub use engine::TranscriptionEngine;
pub use segmenter::{ChunkPlan, Segmenter};
pub use strategy::{MediaWindow, StrategyExecutor, StrategyKind, ToolingExecutor};

use serde::{Deserialize, Serialize};

/// Method tag carried by results assembled from parallel chunks.
pub const PARALLEL_MERGE_METHOD: &str = "parallel-merge";

/// One timestamped span of transcribed speech
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    /// Transcribed text
    pub text: String,
    /// Confidence score in [0, 1]
    pub confidence: f64,
    /// Strategy that produced this segment
    pub strategy: StrategyKind,
}

impl Segment {
    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}

/// Complete transcription result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionResult {
    /// Full transcription text (concatenation of segment texts)
    pub text: String,
    /// Time-ordered segments
    pub segments: Vec<Segment>,
    /// Detected language
    pub language: Option<String>,
    /// Language detection confidence in [0, 1]
    pub language_confidence: f64,
    /// Overall confidence: arithmetic mean of segment confidences
    pub overall_confidence: f64,
    /// Producing strategy name, or "parallel-merge" for chunked results
    pub method: String,
}

impl TranscriptionResult {
    /// Build a result from segments, deriving text and overall confidence.
    pub fn from_segments(
        segments: Vec<Segment>,
        language: Option<String>,
        language_confidence: f64,
        method: impl Into<String>,
    ) -> Self {
        let text = segments
            .iter()
            .map(|s| s.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        let overall_confidence = mean_confidence(&segments);

        Self {
            text,
            segments,
            language,
            language_confidence,
            overall_confidence,
            method: method.into(),
        }
    }

    /// End time of the last segment, in seconds.
    pub fn span_end(&self) -> f64 {
        self.segments.last().map(|s| s.end).unwrap_or(0.0)
    }

    /// Check the monotonic non-overlap invariant over adjacent segments.
    pub fn is_time_ordered(&self) -> bool {
        self.segments
            .windows(2)
            .all(|pair| pair[0].end <= pair[1].start + f64::EPSILON)
    }
}

/// Arithmetic mean of segment confidences; 0.0 for an empty sequence.
pub fn mean_confidence(segments: &[Segment]) -> f64 {
    if segments.is_empty() {
        return 0.0;
    }
    segments.iter().map(|s| s.confidence).sum::<f64>() / segments.len() as f64
}

/// Convert a model average log-probability to a [0, 1] confidence via an
/// exponential transform.
pub fn confidence_from_logprob(avg_logprob: f64) -> f64 {
    avg_logprob.exp().clamp(0.0, 1.0)
}

/// Vidscribe - media ingestion and transcription orchestration
///
/// Accepts source references, drives them through a staged download /
/// extraction / transcription pipeline on a worker pool, and persists the
/// resulting content assets across pluggable storage collaborators.

pub mod config;
pub mod content;
pub mod error;
pub mod job;
pub mod media;
pub mod storage;
pub mod transcription;

#[cfg(feature = "api")]
pub mod api;

// Re-export main types for easy access
pub use crate::config::{Config, ConfigBuilder};
pub use crate::content::{ContentAsset, ContentManager, ContentUpdate, DeleteOutcome};
pub use crate::error::{IngestError, StrategyError};
pub use crate::job::{
    CancelToken, ContentKind, Job, JobFilter, JobManager, JobQueue, JobStats, JobStatus,
    WorkerPool,
};
pub use crate::media::{FfmpegMediaProvider, MediaInfo, MediaProvider};
pub use crate::transcription::strategy::{MediaWindow, StrategyExecutor, StrategyKind, ToolingExecutor};
pub use crate::transcription::{Segment, TranscriptionEngine, TranscriptionResult};

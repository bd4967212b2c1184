pub mod manager;
pub mod queue;
pub mod worker;

pub use manager::{JobManager, JobStatusEvent, JobSubscription};
pub use queue::{JobQueue, QueuedJob};
pub use worker::WorkerPool;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

/// Job status state machine.
///
/// `pending → queued → {downloading → extracting_audio → transcribing →
/// extracting_metadata} → completed`; any non-terminal status may move to
/// `failed` or `cancelled`; `failed` may move to `retrying → queued`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Queued,
    Downloading,
    ExtractingAudio,
    Transcribing,
    ExtractingMetadata,
    Retrying,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Terminal statuses never transition again through the update path;
    /// a `failed` job is re-armed only through the explicit retry operation.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Queued => "queued",
            JobStatus::Downloading => "downloading",
            JobStatus::ExtractingAudio => "extracting_audio",
            JobStatus::Transcribing => "transcribing",
            JobStatus::ExtractingMetadata => "extracting_metadata",
            JobStatus::Retrying => "retrying",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Terminal error recorded on a failed job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobError {
    pub message: String,
    /// Whether the automatic retry path may re-arm the job
    pub retryable: bool,
}

/// Requested output kind for an ingestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Video,
    Audio,
}

/// One orchestrated ingestion request and its execution state.
///
/// Mutated only by the Job Manager's single update path; immutable once
/// terminal, except for explicit re-arming of a failed job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Opaque, immutable job id
    pub id: String,

    /// Source reference (URI)
    pub source: String,

    /// Requested content kind
    pub kind: ContentKind,

    pub status: JobStatus,

    /// Progress percent [0, 100]; monotonically non-decreasing while the
    /// job is non-terminal
    pub progress: u8,

    /// Human-readable current stage label
    pub stage: String,

    /// Priority 1..=10; lower is more urgent
    pub priority: u8,

    pub retry_count: u32,
    pub max_retries_auto: u32,
    pub max_retries_manual: u32,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    pub error: Option<JobError>,

    /// Caller-supplied cancellation reason
    pub cancel_reason: Option<String>,

    /// Content id once processing succeeded
    pub result_content_id: Option<String>,

    /// Reprocessing of an existing blob skips the download stage
    pub skip_download: bool,

    /// Content flagged as worth paid transcription
    pub high_value: bool,
}

impl Job {
    pub fn retryable_auto(&self) -> bool {
        self.retry_count < self.max_retries_auto
            && self.error.as_ref().map(|e| e.retryable).unwrap_or(true)
    }

    pub fn retryable_manual(&self) -> bool {
        self.retry_count < self.max_retries_manual
    }
}

/// Filter for job listings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub source_contains: Option<String>,
}

impl JobFilter {
    pub fn matches(&self, job: &Job) -> bool {
        if let Some(status) = self.status {
            if job.status != status {
                return false;
            }
        }
        if let Some(fragment) = &self.source_contains {
            if !job.source.contains(fragment.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Aggregate job counts and success rate
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobStats {
    pub total: usize,
    pub pending: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// completed / (completed + failed), 0.0 when neither exists
    pub success_rate: f64,
}

/// Cooperative cancellation token, checked at stage and chunk boundaries.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Default)]
struct CancelInner {
    flag: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Resolve once cancelled; used to race in-flight network calls.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

static ID_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Generate a short opaque id with a readable prefix.
pub(crate) fn generate_id(prefix: &str, seed: &str) -> String {
    let seq = ID_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let digest = md5::compute(format!("{}:{}:{}", seed, Utc::now().timestamp_nanos_opt().unwrap_or_default(), seq));
    let hex = format!("{:x}", digest);
    format!("{}_{}", prefix, &hex[..12])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Transcribing.is_terminal());
        assert!(!JobStatus::Retrying.is_terminal());
    }

    #[test]
    fn test_status_round_trips_through_serde() {
        for status in [
            JobStatus::Pending,
            JobStatus::ExtractingAudio,
            JobStatus::Completed,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            let back: JobStatus = serde_json::from_str(&json).unwrap();
            assert_eq!(back, status);
        }
        assert_eq!(
            serde_json::to_string(&JobStatus::ExtractingMetadata).unwrap(),
            "\"extracting_metadata\""
        );
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = generate_id("job", "same-seed");
        let b = generate_id("job", "same-seed");
        assert_ne!(a, b);
        assert!(a.starts_with("job_"));
    }

    #[tokio::test]
    async fn test_cancel_token_wakes_waiters() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });

        token.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("waiter should wake")
            .unwrap();
        assert!(token.is_cancelled());
    }
}

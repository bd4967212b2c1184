use thiserror::Error;

/// Error taxonomy for the ingestion core.
///
/// Stage errors are classified by the worker pool into retryable and
/// non-retryable before they are translated into a job status update; the
/// public surface only ever sees this taxonomy, never a raw collaborator
/// error.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Rejected synchronously; no job is ever created.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Network timeouts, rate limits and other conditions worth retrying.
    #[error("transient stage error in {stage}: {message}")]
    TransientStage { stage: String, message: String },

    /// Malformed media, permanently missing source. Terminal for automatic
    /// retries; a manual retry is still permitted.
    #[error("unrecoverable stage error in {stage}: {message}")]
    UnrecoverableStage { stage: String, message: String },

    /// The stored source blob required for reprocessing is gone.
    #[error("source unavailable for content {0}; re-download required")]
    SourceUnavailable(String),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("content not found: {0}")]
    ContentNotFound(String),

    /// The requested mutation targets a job already in a terminal status.
    #[error("job {0} is already terminal")]
    JobTerminal(String),

    #[error("retry rejected for job {job_id}: {reason}")]
    RetryRejected { job_id: String, reason: String },

    /// Collaborator failure (relational/graph/blob/cache). Treated as
    /// transient unless the collaborator says otherwise.
    #[error("storage error: {0}")]
    Storage(String),

    /// Cooperative cancellation observed at a stage or chunk boundary.
    /// Internal control flow only; cancelled jobs expose no error.
    #[error("cancelled")]
    Cancelled,
}

impl IngestError {
    /// Whether the automatic retry path may re-arm a job that failed with
    /// this error.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            IngestError::TransientStage { .. } | IngestError::Storage(_)
        )
    }

    pub fn transient(stage: &str, message: impl Into<String>) -> Self {
        IngestError::TransientStage {
            stage: stage.to_string(),
            message: message.into(),
        }
    }

    pub fn unrecoverable(stage: &str, message: impl Into<String>) -> Self {
        IngestError::UnrecoverableStage {
            stage: stage.to_string(),
            message: message.into(),
        }
    }
}

/// Failure of a single transcription strategy. Never surfaces as a job
/// failure: the engine moves on to the next strategy in the cascade and the
/// description fallback is always defined.
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("no data available: {0}")]
    NoData(String),

    #[error("strategy timed out after {0}s")]
    Timeout(u64),

    #[error("confidence {actual:.3} below floor {floor:.3}")]
    LowConfidence { actual: f64, floor: f64 },

    #[error("strategy execution failed: {0}")]
    Execution(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(IngestError::transient("download", "timeout").retryable());
        assert!(IngestError::Storage("row lock".into()).retryable());
        assert!(!IngestError::unrecoverable("download", "404").retryable());
        assert!(!IngestError::Validation("bad priority".into()).retryable());
        assert!(!IngestError::Cancelled.retryable());
    }

    #[test]
    fn test_error_display_names_stage() {
        let err = IngestError::transient("transcribe", "rate limited");
        assert!(err.to_string().contains("transcribe"));
    }
}

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::JobConfig;
use crate::error::IngestError;
use crate::job::queue::JobQueue;
use crate::job::{generate_id, CancelToken, ContentKind, Job, JobError, JobFilter, JobStats, JobStatus};
use crate::storage::{Notifier, RelationalStore};

/// Status-changed notification, published per transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusEvent {
    pub job_id: String,
    pub status: JobStatus,
    pub progress: u8,
    pub stage: String,
    pub error: Option<JobError>,
    pub result_content_id: Option<String>,
    pub at: DateTime<Utc>,
}

/// Per-job status stream; yields events in issue order and ends after a
/// terminal status has been delivered.
pub struct JobSubscription {
    job_id: String,
    receiver: broadcast::Receiver<JobStatusEvent>,
    done: bool,
    /// Terminal snapshot captured at subscribe time for jobs that already
    /// finished; delivered once before the stream ends.
    pending: Option<JobStatusEvent>,
}

impl JobSubscription {
    pub async fn recv(&mut self) -> Option<JobStatusEvent> {
        if self.done {
            return None;
        }
        if let Some(event) = self.pending.take() {
            self.done = true;
            return Some(event);
        }
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.job_id == self.job_id => {
                    if event.status.is_terminal() {
                        self.done = true;
                    }
                    return Some(event);
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // Progress ticks were dropped; the job record remains
                    // the source of truth, terminal events still arrive.
                    debug!("Subscription for {} lagged by {}", self.job_id, skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.done = true;
                    return None;
                }
            }
        }
    }
}

/// Sole authority over Job state transitions and the status-query surface.
///
/// All mutations flow through one internally synchronized update path; the
/// job table is an explicit handle shared with the worker pool, never a
/// process-wide global.
pub struct JobManager {
    config: JobConfig,
    jobs: RwLock<HashMap<String, Job>>,
    store: Arc<dyn RelationalStore>,
    queue: Arc<JobQueue>,
    notifier: Arc<dyn Notifier>,
    events: broadcast::Sender<JobStatusEvent>,
    cancel_tokens: RwLock<HashMap<String, CancelToken>>,
}

impl JobManager {
    pub fn new(
        config: JobConfig,
        store: Arc<dyn RelationalStore>,
        queue: Arc<JobQueue>,
        notifier: Arc<dyn Notifier>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            config,
            jobs: RwLock::new(HashMap::new()),
            store,
            queue,
            notifier,
            events,
            cancel_tokens: RwLock::new(HashMap::new()),
        })
    }

    /// Validate and enqueue a new ingestion request. Returns as soon as the
    /// job is queued; processing happens on the worker pool.
    pub async fn create(
        &self,
        source: &str,
        kind: ContentKind,
        priority: u8,
        high_value: bool,
    ) -> Result<Job, IngestError> {
        self.create_with_options(source, kind, priority, high_value, false)
            .await
    }

    /// As `create`, with the option to skip the download stage when the
    /// source blob is already stored (reprocessing).
    pub async fn create_with_options(
        &self,
        source: &str,
        kind: ContentKind,
        priority: u8,
        high_value: bool,
        skip_download: bool,
    ) -> Result<Job, IngestError> {
        if priority < self.config.min_priority || priority > self.config.max_priority {
            return Err(IngestError::Validation(format!(
                "priority {} outside {}..={}",
                priority, self.config.min_priority, self.config.max_priority
            )));
        }

        Url::parse(source)
            .map_err(|e| IngestError::Validation(format!("malformed source reference: {}", e)))?;

        let mut job = Job {
            id: generate_id("job", source),
            source: source.to_string(),
            kind,
            status: JobStatus::Pending,
            progress: 0,
            stage: "pending".to_string(),
            priority,
            retry_count: 0,
            max_retries_auto: self.config.max_retries_auto,
            max_retries_manual: self.config.max_retries_manual,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
            cancel_reason: None,
            result_content_id: None,
            skip_download,
            high_value,
        };

        // Pending is momentary; the queued snapshot is the first one stored
        job.status = JobStatus::Queued;
        job.stage = "queued".to_string();
        self.apply(job.clone()).await?;
        self.queue.push(job.id.clone(), priority).await;

        info!("🆕 Created job {} for {} (priority {})", job.id, source, priority);
        Ok(job)
    }

    pub async fn get(&self, job_id: &str) -> Option<Job> {
        self.jobs.read().await.get(job_id).cloned()
    }

    pub async fn list(&self, filter: &JobFilter, limit: usize, offset: usize) -> Vec<Job> {
        let jobs = self.jobs.read().await;
        let mut matched: Vec<Job> = jobs.values().filter(|j| filter.matches(j)).cloned().collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matched.into_iter().skip(offset).take(limit).collect()
    }

    pub async fn stats(&self) -> JobStats {
        let jobs = self.jobs.read().await;
        let mut stats = JobStats {
            total: jobs.len(),
            ..JobStats::default()
        };

        for job in jobs.values() {
            match job.status {
                JobStatus::Pending | JobStatus::Queued | JobStatus::Retrying => stats.pending += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
                JobStatus::Cancelled => stats.cancelled += 1,
                _ => stats.active += 1,
            }
        }

        let finished = stats.completed + stats.failed;
        stats.success_rate = if finished > 0 {
            stats.completed as f64 / finished as f64
        } else {
            0.0
        };
        stats
    }

    /// Progress/stage update issued by the worker currently assigned to the
    /// job. Rejects updates to terminal jobs; progress never decreases
    /// within one attempt.
    pub async fn update_status(
        &self,
        job_id: &str,
        status: JobStatus,
        progress: u8,
        stage: &str,
    ) -> Result<Job, IngestError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| IngestError::JobNotFound(job_id.to_string()))?;

        if job.status.is_terminal() {
            return Err(IngestError::JobTerminal(job_id.to_string()));
        }

        job.status = status;
        job.progress = progress.min(100).max(job.progress);
        job.stage = stage.to_string();
        if job.started_at.is_none() && !matches!(status, JobStatus::Pending | JobStatus::Queued) {
            job.started_at = Some(Utc::now());
        }

        let snapshot = job.clone();
        drop(jobs);

        self.persist(&snapshot).await?;
        self.emit(&snapshot).await;
        Ok(snapshot)
    }

    /// Record successful completion with its single produced content asset.
    pub async fn complete(&self, job_id: &str, content_id: &str) -> Result<Job, IngestError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| IngestError::JobNotFound(job_id.to_string()))?;

        if job.status.is_terminal() {
            return Err(IngestError::JobTerminal(job_id.to_string()));
        }

        job.status = JobStatus::Completed;
        job.progress = 100;
        job.stage = "completed".to_string();
        job.completed_at = Some(Utc::now());
        job.result_content_id = Some(content_id.to_string());

        let snapshot = job.clone();
        drop(jobs);

        self.drop_cancel_token(job_id).await;
        self.persist(&snapshot).await?;
        self.emit(&snapshot).await;
        info!("🎉 Job {} completed with content {}", job_id, content_id);
        Ok(snapshot)
    }

    /// Classify a stage failure: retryable errors within the automatic
    /// ceiling re-arm the job after exponential backoff; everything else is
    /// terminal `failed`.
    pub async fn fail(self: &Arc<Self>, job_id: &str, error: &IngestError) -> Result<Job, IngestError> {
        let retryable = error.retryable();
        let (snapshot, auto_retry) = {
            let mut jobs = self.jobs.write().await;
            let job = jobs
                .get_mut(job_id)
                .ok_or_else(|| IngestError::JobNotFound(job_id.to_string()))?;

            if job.status.is_terminal() {
                return Err(IngestError::JobTerminal(job_id.to_string()));
            }

            job.error = Some(JobError {
                message: error.to_string(),
                retryable,
            });

            let auto_retry = retryable && job.retry_count < job.max_retries_auto;
            if auto_retry {
                // New attempt, same identity: reset progress, discard any
                // partial artifacts on the worker side
                job.retry_count += 1;
                job.status = JobStatus::Retrying;
                job.progress = 0;
                job.stage = "retrying".to_string();
            } else {
                job.status = JobStatus::Failed;
                job.stage = "failed".to_string();
                job.completed_at = Some(Utc::now());
            }

            (job.clone(), auto_retry)
        };

        self.persist(&snapshot).await?;
        self.emit(&snapshot).await;

        if auto_retry {
            let delay = backoff_delay(&self.config, snapshot.retry_count);
            warn!(
                "🔁 Job {} attempt {} failed ({}); retrying in {:?}",
                job_id, snapshot.retry_count, error, delay
            );
            let manager = Arc::clone(self);
            let job_id = job_id.to_string();
            let priority = snapshot.priority;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Err(e) = manager.requeue(&job_id, priority).await {
                    warn!("Failed to requeue {}: {}", job_id, e);
                }
            });
        } else {
            self.drop_cancel_token(job_id).await;
            warn!("❌ Job {} failed terminally: {}", job_id, error);
        }

        Ok(snapshot)
    }

    /// Re-arm a job. Automatic retries are bounded by the automatic
    /// ceiling; manual retries use the higher manual ceiling and dispatch at
    /// the highest priority tier.
    pub async fn retry(self: &Arc<Self>, job_id: &str, manual: bool) -> Result<u32, IngestError> {
        let (snapshot, dispatch_priority) = {
            let mut jobs = self.jobs.write().await;
            let job = jobs
                .get_mut(job_id)
                .ok_or_else(|| IngestError::JobNotFound(job_id.to_string()))?;

            if job.status != JobStatus::Failed {
                return Err(IngestError::RetryRejected {
                    job_id: job_id.to_string(),
                    reason: format!("job is {}, not failed", job.status),
                });
            }

            let ceiling = if manual {
                job.max_retries_manual
            } else {
                job.max_retries_auto
            };
            if job.retry_count >= ceiling {
                return Err(IngestError::RetryRejected {
                    job_id: job_id.to_string(),
                    reason: format!(
                        "retry count {} has reached the {} ceiling {}",
                        job.retry_count,
                        if manual { "manual" } else { "automatic" },
                        ceiling
                    ),
                });
            }
            if !manual && job.error.as_ref().map(|e| !e.retryable).unwrap_or(false) {
                return Err(IngestError::RetryRejected {
                    job_id: job_id.to_string(),
                    reason: "error is not retryable automatically".to_string(),
                });
            }

            job.retry_count += 1;
            job.status = JobStatus::Queued;
            job.progress = 0;
            job.stage = "queued".to_string();
            job.error = None;
            job.completed_at = None;

            let dispatch_priority = if manual {
                self.config.min_priority
            } else {
                job.priority
            };
            (job.clone(), dispatch_priority)
        };

        self.persist(&snapshot).await?;
        self.emit(&snapshot).await;
        self.queue.push(job_id.to_string(), dispatch_priority).await;

        info!(
            "🔄 Job {} re-armed ({} retry #{})",
            job_id,
            if manual { "manual" } else { "automatic" },
            snapshot.retry_count
        );
        Ok(snapshot.retry_count)
    }

    /// Request cooperative cancellation. Completed and failed jobs are
    /// rejected; queued jobs cancel immediately, running jobs once their
    /// worker observes the token.
    pub async fn cancel(&self, job_id: &str, reason: Option<String>) -> Result<(), IngestError> {
        let running = {
            let mut jobs = self.jobs.write().await;
            let job = jobs
                .get_mut(job_id)
                .ok_or_else(|| IngestError::JobNotFound(job_id.to_string()))?;

            if job.status.is_terminal() {
                return Err(IngestError::JobTerminal(job_id.to_string()));
            }

            job.cancel_reason = reason;
            matches!(
                job.status,
                JobStatus::Downloading
                    | JobStatus::ExtractingAudio
                    | JobStatus::Transcribing
                    | JobStatus::ExtractingMetadata
            )
        };

        self.token_for(job_id).await.cancel();

        if !running {
            // Never picked up by a worker; finalize here
            self.mark_cancelled(job_id).await?;
        }
        Ok(())
    }

    /// Finalize cancellation once observed (worker side) or immediately for
    /// jobs that never started.
    pub async fn mark_cancelled(&self, job_id: &str) -> Result<Job, IngestError> {
        let snapshot = {
            let mut jobs = self.jobs.write().await;
            let job = jobs
                .get_mut(job_id)
                .ok_or_else(|| IngestError::JobNotFound(job_id.to_string()))?;

            if job.status.is_terminal() {
                return Err(IngestError::JobTerminal(job_id.to_string()));
            }

            job.status = JobStatus::Cancelled;
            job.stage = "cancelled".to_string();
            job.completed_at = Some(Utc::now());
            job.clone()
        };

        self.drop_cancel_token(job_id).await;
        self.persist(&snapshot).await?;
        self.emit(&snapshot).await;
        info!("🛑 Job {} cancelled", job_id);
        Ok(snapshot)
    }

    /// Cancellation token for a job, created on first use.
    pub async fn token_for(&self, job_id: &str) -> CancelToken {
        let mut tokens = self.cancel_tokens.write().await;
        tokens
            .entry(job_id.to_string())
            .or_insert_with(CancelToken::new)
            .clone()
    }

    /// Status stream for one job. Subscribing after the job already reached
    /// a terminal state yields that terminal status once, then ends.
    pub async fn subscribe(&self, job_id: &str) -> JobSubscription {
        // Take the receiver before the snapshot so a transition landing in
        // between is delivered, not lost
        let receiver = self.events.subscribe();
        let pending = self
            .jobs
            .read()
            .await
            .get(job_id)
            .filter(|job| job.status.is_terminal())
            .map(event_from);
        JobSubscription {
            job_id: job_id.to_string(),
            receiver,
            done: false,
            pending,
        }
    }

    async fn requeue(&self, job_id: &str, priority: u8) -> Result<(), IngestError> {
        let snapshot = {
            let mut jobs = self.jobs.write().await;
            let job = jobs
                .get_mut(job_id)
                .ok_or_else(|| IngestError::JobNotFound(job_id.to_string()))?;

            // A cancel may have landed during the backoff sleep
            if job.status != JobStatus::Retrying {
                debug!("Skipping requeue of {}: status is {}", job_id, job.status);
                return Ok(());
            }
            job.status = JobStatus::Queued;
            job.stage = "queued".to_string();
            job.clone()
        };
        self.persist(&snapshot).await?;
        self.emit(&snapshot).await;
        self.queue.push(job_id.to_string(), priority).await;
        Ok(())
    }

    async fn apply(&self, job: Job) -> Result<(), IngestError> {
        self.persist(&job).await?;
        self.jobs.write().await.insert(job.id.clone(), job.clone());
        self.emit(&job).await;
        Ok(())
    }

    async fn persist(&self, job: &Job) -> Result<(), IngestError> {
        self.store
            .upsert_job(job)
            .await
            .map_err(|e| IngestError::Storage(e.to_string()))
    }

    async fn emit(&self, job: &Job) {
        let event = event_from(job);

        // No subscribers is fine
        let _ = self.events.send(event.clone());

        if let Ok(payload) = serde_json::to_value(&event) {
            if let Err(e) = self.notifier.publish("jobs.status", payload).await {
                warn!("Notifier publish failed for {}: {}", job.id, e);
            }
        }
    }

    async fn drop_cancel_token(&self, job_id: &str) {
        self.cancel_tokens.write().await.remove(job_id);
    }
}

fn event_from(job: &Job) -> JobStatusEvent {
    JobStatusEvent {
        job_id: job.id.clone(),
        status: job.status,
        progress: job.progress,
        stage: job.stage.clone(),
        error: job.error.clone(),
        result_content_id: job.result_content_id.clone(),
        at: Utc::now(),
    }
}

/// Exponential backoff: base doubled per attempt, capped.
fn backoff_delay(config: &JobConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let delay = config
        .retry_base_delay_secs
        .saturating_mul(1u64 << exponent)
        .min(config.retry_max_delay_secs);
    Duration::from_secs(delay)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::storage::{InMemoryRelationalStore, LoggingNotifier};

    fn manager() -> Arc<JobManager> {
        let config = Config::default();
        JobManager::new(
            config.jobs,
            Arc::new(InMemoryRelationalStore::new()),
            JobQueue::new(),
            Arc::new(LoggingNotifier::new()),
        )
    }

    #[tokio::test]
    async fn test_create_validates_priority() {
        let manager = manager();
        let err = manager
            .create("https://example.com/v.mp4", ContentKind::Video, 0, false)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));

        let err = manager
            .create("https://example.com/v.mp4", ContentKind::Video, 11, false)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));
    }

    #[tokio::test]
    async fn test_create_rejects_malformed_source() {
        let manager = manager();
        let err = manager
            .create("not a uri", ContentKind::Video, 5, false)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));
    }

    #[tokio::test]
    async fn test_create_enqueues_job() {
        let manager = manager();
        let job = manager
            .create("https://example.com/v.mp4", ContentKind::Video, 5, false)
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.progress, 0);
        assert!(manager.get(&job.id).await.is_some());
    }

    #[tokio::test]
    async fn test_progress_is_monotonic() {
        let manager = manager();
        let job = manager
            .create("https://example.com/v.mp4", ContentKind::Video, 5, false)
            .await
            .unwrap();

        manager
            .update_status(&job.id, JobStatus::Transcribing, 60, "transcribing")
            .await
            .unwrap();
        let updated = manager
            .update_status(&job.id, JobStatus::Transcribing, 40, "transcribing")
            .await
            .unwrap();

        assert_eq!(updated.progress, 60);
    }

    #[tokio::test]
    async fn test_terminal_jobs_reject_updates() {
        let manager = manager();
        let job = manager
            .create("https://example.com/v.mp4", ContentKind::Video, 5, false)
            .await
            .unwrap();

        manager.complete(&job.id, "content_abc").await.unwrap();
        let err = manager
            .update_status(&job.id, JobStatus::Downloading, 10, "downloading")
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::JobTerminal(_)));
    }

    #[tokio::test]
    async fn test_unrecoverable_failure_is_terminal_and_not_auto_retryable() {
        let manager = manager();
        let job = manager
            .create("https://example.com/v.mp4", ContentKind::Video, 5, false)
            .await
            .unwrap();

        manager
            .fail(&job.id, &IngestError::unrecoverable("download", "404"))
            .await
            .unwrap();

        let failed = manager.get(&job.id).await.unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert!(!failed.error.as_ref().unwrap().retryable);

        let err = manager.retry(&job.id, false).await.unwrap_err();
        assert!(matches!(err, IngestError::RetryRejected { .. }));

        // Manual retry remains permitted
        let count = manager.retry(&job.id, true).await.unwrap();
        assert_eq!(count, 1);
        assert_eq!(manager.get(&job.id).await.unwrap().status, JobStatus::Queued);
    }

    #[tokio::test]
    async fn test_transient_failure_rearms_until_ceiling() {
        let config = crate::config::ConfigBuilder::new()
            .with_retry_base_delay_secs(0)
            .build();
        let manager = JobManager::new(
            config.jobs,
            Arc::new(InMemoryRelationalStore::new()),
            JobQueue::new(),
            Arc::new(LoggingNotifier::new()),
        );

        let job = manager
            .create("https://example.com/v.mp4", ContentKind::Video, 5, false)
            .await
            .unwrap();

        for attempt in 1..=3 {
            let snapshot = manager
                .fail(&job.id, &IngestError::transient("download", "timeout"))
                .await
                .unwrap();
            assert_eq!(snapshot.status, JobStatus::Retrying);
            assert_eq!(snapshot.retry_count, attempt);
            assert_eq!(snapshot.progress, 0);
            // Let the zero-delay requeue task run
            tokio::time::sleep(Duration::from_millis(20)).await;
            assert_eq!(manager.get(&job.id).await.unwrap().status, JobStatus::Queued);
        }

        // Fourth consecutive failure exceeds the automatic ceiling of 3
        let snapshot = manager
            .fail(&job.id, &IngestError::transient("download", "timeout"))
            .await
            .unwrap();
        assert_eq!(snapshot.status, JobStatus::Failed);
        assert_eq!(snapshot.retry_count, 3);
    }

    #[tokio::test]
    async fn test_cancel_queued_job_is_immediate() {
        let manager = manager();
        let job = manager
            .create("https://example.com/v.mp4", ContentKind::Video, 5, false)
            .await
            .unwrap();

        manager.cancel(&job.id, Some("changed my mind".into())).await.unwrap();
        let cancelled = manager.get(&job.id).await.unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);
        assert!(cancelled.error.is_none());
        assert_eq!(cancelled.cancel_reason.as_deref(), Some("changed my mind"));
    }

    #[tokio::test]
    async fn test_cancel_completed_job_is_rejected() {
        let manager = manager();
        let job = manager
            .create("https://example.com/v.mp4", ContentKind::Video, 5, false)
            .await
            .unwrap();
        manager.complete(&job.id, "content_abc").await.unwrap();

        let err = manager.cancel(&job.id, None).await.unwrap_err();
        assert!(matches!(err, IngestError::JobTerminal(_)));
    }

    #[tokio::test]
    async fn test_subscription_ends_after_terminal_event() {
        let manager = manager();
        let job = manager
            .create("https://example.com/v.mp4", ContentKind::Video, 5, false)
            .await
            .unwrap();

        let mut subscription = manager.subscribe(&job.id).await;
        manager
            .update_status(&job.id, JobStatus::Downloading, 10, "downloading")
            .await
            .unwrap();
        manager.complete(&job.id, "content_abc").await.unwrap();

        let mut statuses = Vec::new();
        while let Some(event) = subscription.recv().await {
            statuses.push(event.status);
        }
        assert_eq!(statuses.last(), Some(&JobStatus::Completed));
        // Ordered as issued
        assert!(statuses.contains(&JobStatus::Downloading));
    }

    #[tokio::test]
    async fn test_subscribe_after_terminal_yields_final_status() {
        let manager = manager();
        let job = manager
            .create("https://example.com/v.mp4", ContentKind::Video, 5, false)
            .await
            .unwrap();
        manager.complete(&job.id, "content_abc").await.unwrap();

        let mut subscription = manager.subscribe(&job.id).await;
        let event = subscription.recv().await.unwrap();
        assert_eq!(event.status, JobStatus::Completed);
        assert_eq!(event.result_content_id.as_deref(), Some("content_abc"));
        assert!(subscription.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_create_stores_a_single_queued_snapshot() {
        let store = Arc::new(InMemoryRelationalStore::new());
        let manager = JobManager::new(
            Config::default().jobs,
            store.clone(),
            JobQueue::new(),
            Arc::new(LoggingNotifier::new()),
        );

        let job = manager
            .create("https://example.com/v.mp4", ContentKind::Video, 5, false)
            .await
            .unwrap();

        assert_eq!(
            store.job_write_statuses(&job.id).await,
            vec![JobStatus::Queued]
        );
    }

    #[tokio::test]
    async fn test_stats_success_rate() {
        let manager = manager();
        let a = manager
            .create("https://example.com/a.mp4", ContentKind::Video, 5, false)
            .await
            .unwrap();
        let b = manager
            .create("https://example.com/b.mp4", ContentKind::Video, 5, false)
            .await
            .unwrap();
        manager.complete(&a.id, "content_a").await.unwrap();
        manager
            .fail(&b.id, &IngestError::unrecoverable("download", "gone"))
            .await
            .unwrap();

        let stats = manager.stats().await;
        assert_eq!(stats.total, 2);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
        assert!((stats.success_rate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = Config::default().jobs;
        assert_eq!(backoff_delay(&config, 1), Duration::from_secs(2));
        assert_eq!(backoff_delay(&config, 2), Duration::from_secs(4));
        assert_eq!(backoff_delay(&config, 3), Duration::from_secs(8));
        assert_eq!(backoff_delay(&config, 12), Duration::from_secs(60));
    }
}

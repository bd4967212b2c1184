use std::path::PathBuf;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::content::chapters::chapters_from_silence;
use crate::content::manager::asset_from_result;
use crate::content::{audio_blob_key, media_blob_key, ContentManager};
use crate::error::IngestError;
use crate::job::{CancelToken, Job, JobManager, JobQueue, JobStatus};
use crate::media::MediaProvider;
use crate::storage::BlobStore;
use crate::transcription::strategy::MediaWindow;
use crate::transcription::TranscriptionEngine;

/// Content identity is derived from the source reference, so reprocessing
/// the same source overwrites the same asset and reuses its blob folder.
pub fn content_id_for(source: &str) -> String {
    let digest = format!("{:x}", md5::compute(source.as_bytes()));
    format!("content_{}", &digest[..12])
}

/// Fixed pool of pipeline workers pulling from the shared priority queue.
///
/// Each worker owns one job at a time and drives it through the staged
/// pipeline, reporting every transition through the job manager. Cancellation
/// races the pipeline via `tokio::select!` so a cancel request interrupts a
/// stage in flight rather than waiting for it.
pub struct WorkerPool {
    manager: Arc<JobManager>,
    queue: Arc<JobQueue>,
    media: Arc<dyn MediaProvider>,
    engine: Arc<TranscriptionEngine>,
    content: Arc<ContentManager>,
    blobs: Arc<dyn BlobStore>,
    workers: usize,
    shutdown: CancelToken,
}

impl WorkerPool {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        manager: Arc<JobManager>,
        queue: Arc<JobQueue>,
        media: Arc<dyn MediaProvider>,
        engine: Arc<TranscriptionEngine>,
        content: Arc<ContentManager>,
        blobs: Arc<dyn BlobStore>,
        workers: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            manager,
            queue,
            media,
            engine,
            content,
            blobs,
            workers: workers.max(1),
            shutdown: CancelToken::new(),
        })
    }

    pub fn start(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        info!("🚀 Starting {} pipeline workers", self.workers);
        (0..self.workers)
            .map(|worker_id| {
                let pool = Arc::clone(self);
                tokio::spawn(async move { pool.worker_loop(worker_id).await })
            })
            .collect()
    }

    /// Ask workers to stop after their current job.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    async fn worker_loop(self: Arc<Self>, worker_id: usize) {
        debug!("Worker {} online", worker_id);
        loop {
            let queued = tokio::select! {
                queued = self.queue.pop() => queued,
                _ = self.shutdown.cancelled() => break,
            };

            let job = match self.manager.get(&queued.job_id).await {
                Some(job) => job,
                None => {
                    warn!("Queued job {} has no record, dropping", queued.job_id);
                    continue;
                }
            };
            // Cancelled (or otherwise finalized) while waiting in the queue
            if job.status != JobStatus::Queued {
                debug!("Worker {} skipping {} in state {}", worker_id, job.id, job.status);
                continue;
            }

            let token = self.manager.token_for(&job.id).await;
            if token.is_cancelled() {
                let _ = self.manager.mark_cancelled(&job.id).await;
                continue;
            }

            info!("⚙️ Worker {} picked up job {} ({})", worker_id, job.id, job.source);
            let outcome = tokio::select! {
                outcome = self.run_job(&job, &token) => outcome,
                _ = token.cancelled() => Err(IngestError::Cancelled),
            };

            match outcome {
                Ok(content_id) => {
                    if let Err(e) = self.manager.complete(&job.id, &content_id).await {
                        warn!("Completion bookkeeping for {} failed: {}", job.id, e);
                    }
                }
                Err(IngestError::Cancelled) => {
                    if let Err(e) = self.manager.mark_cancelled(&job.id).await {
                        warn!("Cancel bookkeeping for {} failed: {}", job.id, e);
                    }
                }
                Err(e) => {
                    if let Err(e2) = self.manager.fail(&job.id, &e).await {
                        warn!("Failure bookkeeping for {} failed: {}", job.id, e2);
                    }
                }
            }
        }
        debug!("Worker {} offline", worker_id);
    }

    /// Run the staged pipeline for one job; returns the produced content id.
    async fn run_job(&self, job: &Job, token: &CancelToken) -> Result<String, IngestError> {
        let content_id = content_id_for(&job.source);
        let work_dir = tempfile::tempdir()
            .map_err(|e| IngestError::transient("setup", format!("workdir: {}", e)))?;

        // Stage 1: fetch
        self.manager
            .update_status(&job.id, JobStatus::Downloading, 5, "downloading")
            .await?;
        let info = self.media.probe(&job.source).await?;
        let media_path = self
            .fetch_media(job, &content_id, work_dir.path().to_path_buf(), token)
            .await?;

        // Stage 2: audio extraction
        self.manager
            .update_status(&job.id, JobStatus::ExtractingAudio, 25, "extracting_audio")
            .await?;
        if token.is_cancelled() {
            return Err(IngestError::Cancelled);
        }
        let audio_path = self.media.extract_audio(&media_path, work_dir.path()).await?;
        self.store_blob_best_effort(&audio_blob_key(&content_id), &audio_path)
            .await;
        let silence_onsets = self.media.detect_silence(&audio_path).await.unwrap_or_default();

        // Stage 3: transcription
        self.manager
            .update_status(&job.id, JobStatus::Transcribing, 40, "transcribing")
            .await?;
        let mut window = MediaWindow::whole(&job.source, info.duration_secs);
        window.audio_path = Some(audio_path);
        window.subtitle_url = info.subtitle_url.clone();
        window.title = info.title.clone();
        window.description = info.description.clone();
        window.high_value = job.high_value || info.looks_high_value();

        let transcript = self.engine.transcribe(&window, &silence_onsets, token).await?;

        // Stage 4: metadata
        self.manager
            .update_status(&job.id, JobStatus::ExtractingMetadata, 75, "extracting_metadata")
            .await?;
        if token.is_cancelled() {
            return Err(IngestError::Cancelled);
        }
        let chapters = chapters_from_silence(&silence_onsets, info.duration_secs);

        // Stage 5: persist the single produced asset
        self.manager
            .update_status(&job.id, JobStatus::ExtractingMetadata, 90, "persisting")
            .await?;
        let asset = asset_from_result(
            &content_id,
            &job.source,
            job.kind,
            info.title,
            info.description,
            info.duration_secs,
            chapters,
            &transcript,
        );
        self.content.persist_new(&asset, &transcript).await?;

        Ok(content_id)
    }

    /// Materialize the source media in the working directory: download it,
    /// or pull it back from blob storage for reprocessing jobs.
    async fn fetch_media(
        &self,
        job: &Job,
        content_id: &str,
        work_dir: PathBuf,
        token: &CancelToken,
    ) -> Result<PathBuf, IngestError> {
        let media_path = work_dir.join("media.bin");
        let blob_key = media_blob_key(content_id);

        if job.skip_download {
            let bytes = self
                .blobs
                .get(&blob_key)
                .await
                .map_err(|e| IngestError::Storage(e.to_string()))?
                .ok_or_else(|| {
                    IngestError::SourceUnavailable(format!("no stored media for {}", job.source))
                })?;
            tokio::fs::write(&media_path, bytes)
                .await
                .map_err(|e| IngestError::transient("download", format!("restore: {}", e)))?;
            debug!("♻️ Restored stored media for {}", job.source);
            return Ok(media_path);
        }

        self.media.download(&job.source, &media_path, token).await?;
        self.store_blob_best_effort(&blob_key, &media_path).await;
        Ok(media_path)
    }

    async fn store_blob_best_effort(&self, key: &str, path: &std::path::Path) {
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                if let Err(e) = self.blobs.put(key, bytes).await {
                    warn!("Blob write for {} failed: {}", key, e);
                }
            }
            Err(e) => warn!("Could not read {} for blob storage: {}", path.display(), e),
        }
    }
}

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::content::{blob_prefix, media_blob_key, transcript_blob_key, ContentAsset, ContentUpdate};
use crate::error::IngestError;
use crate::job::{ContentKind, Job, JobManager};
use crate::storage::{BlobStore, Cache, GraphStore, RelationalStore, RowKind, RowMutation};
use crate::transcription::TranscriptionResult;

/// What a cascading delete actually removed. Blob deletion is best-effort;
/// failures land in `warnings` instead of aborting the cascade.
#[derive(Debug, Default, Serialize)]
pub struct DeleteOutcome {
    pub rows_deleted: usize,
    pub graph_edges_deleted: usize,
    pub blobs_deleted: usize,
    pub warnings: Vec<String>,
}

/// Read/write surface over a content asset and its satellite records across
/// the four storage collaborators.
pub struct ContentManager {
    store: Arc<dyn RelationalStore>,
    blobs: Arc<dyn BlobStore>,
    graph: Arc<dyn GraphStore>,
    cache: Arc<dyn Cache>,
    cache_ttl: Duration,
}

impl ContentManager {
    pub fn new(
        store: Arc<dyn RelationalStore>,
        blobs: Arc<dyn BlobStore>,
        graph: Arc<dyn GraphStore>,
        cache: Arc<dyn Cache>,
        cache_ttl: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            blobs,
            graph,
            cache,
            cache_ttl,
        })
    }

    /// Persist a freshly produced asset: transcript blob, relational row
    /// (which seeds the satellite rows), graph node, cache entry.
    pub async fn persist_new(
        &self,
        asset: &ContentAsset,
        transcript: &TranscriptionResult,
    ) -> Result<(), IngestError> {
        let transcript_json = serde_json::to_vec(transcript)
            .map_err(|e| IngestError::Storage(format!("transcript encode: {}", e)))?;
        self.blobs
            .put(&transcript_blob_key(&asset.id), transcript_json)
            .await
            .map_err(|e| IngestError::Storage(e.to_string()))?;

        self.store
            .upsert_content(asset)
            .await
            .map_err(|e| IngestError::Storage(e.to_string()))?;

        self.graph
            .upsert_node(&asset.id, asset.display_title())
            .await
            .map_err(|e| IngestError::Storage(e.to_string()))?;

        self.cache_put(asset).await;
        info!("💾 Persisted content {} ({})", asset.id, asset.display_title());
        Ok(())
    }

    /// Cache-first read. A hit never touches the relational store; a miss
    /// repopulates the cache with the configured TTL.
    pub async fn get(&self, content_id: &str) -> Result<ContentAsset, IngestError> {
        if let Ok(Some(cached)) = self.cache.get(&cache_key(content_id)).await {
            match serde_json::from_str::<ContentAsset>(&cached) {
                Ok(asset) => {
                    debug!("⚡ Cache hit for content {}", content_id);
                    return Ok(asset);
                }
                Err(e) => warn!("Discarding malformed cache entry for {}: {}", content_id, e),
            }
        }

        let asset = self
            .store
            .fetch_content(content_id)
            .await
            .map_err(|e| IngestError::Storage(e.to_string()))?
            .ok_or_else(|| IngestError::ContentNotFound(content_id.to_string()))?;

        self.cache_put(&asset).await;
        Ok(asset)
    }

    pub async fn list(&self, include_deleted: bool) -> Result<Vec<ContentAsset>, IngestError> {
        self.store
            .list_content(include_deleted)
            .await
            .map_err(|e| IngestError::Storage(e.to_string()))
    }

    /// Write-through partial update. A title change also reconciles the
    /// graph node so both stores agree on the display name.
    pub async fn update(
        &self,
        content_id: &str,
        update: ContentUpdate,
    ) -> Result<ContentAsset, IngestError> {
        let mut asset = self.fetch_live(content_id).await?;

        let title_changed = update.title.is_some() && update.title != asset.title;
        if let Some(title) = update.title {
            asset.title = Some(title);
        }
        if let Some(description) = update.description {
            asset.description = Some(description);
        }
        asset.updated_at = Utc::now();

        self.store
            .upsert_content(&asset)
            .await
            .map_err(|e| IngestError::Storage(e.to_string()))?;

        if title_changed {
            self.graph
                .upsert_node(&asset.id, asset.display_title())
                .await
                .map_err(|e| IngestError::Storage(e.to_string()))?;
        }

        self.invalidate(content_id).await;
        Ok(asset)
    }

    /// Mark deleted without removing anything. Reversible by another update
    /// path; hidden from default listings.
    pub async fn soft_delete(&self, content_id: &str) -> Result<ContentAsset, IngestError> {
        let mut asset = self.fetch_live(content_id).await?;
        asset.deleted_at = Some(Utc::now());
        asset.updated_at = Utc::now();

        self.store
            .upsert_content(&asset)
            .await
            .map_err(|e| IngestError::Storage(e.to_string()))?;
        self.invalidate(content_id).await;

        info!("🗑️ Soft-deleted content {}", content_id);
        Ok(asset)
    }

    /// Cascading removal in dependency order: cache entry, graph subgraph,
    /// satellite rows plus parent row, then blob folder. The cascade can be
    /// re-run while the parent row survives an interruption; once it is gone
    /// a repeat call reports not-found.
    pub async fn hard_delete(&self, content_id: &str) -> Result<DeleteOutcome, IngestError> {
        // Soft-deleted assets still qualify; only a missing parent row ends
        // the cascade
        self.store
            .fetch_content(content_id)
            .await
            .map_err(|e| IngestError::Storage(e.to_string()))?
            .ok_or_else(|| IngestError::ContentNotFound(content_id.to_string()))?;

        let mut outcome = DeleteOutcome::default();

        self.invalidate(content_id).await;

        match self.graph.delete_subgraph(content_id).await {
            Ok(removed) => outcome.graph_edges_deleted = removed,
            Err(e) => return Err(IngestError::Storage(format!("graph delete: {}", e))),
        }

        // Child rows and the parent row fall in one unit so an interruption
        // never leaves orphaned children
        let mutations = [
            RowMutation::DeleteRows {
                content_id: content_id.to_string(),
                kinds: vec![
                    RowKind::Comments,
                    RowKind::Chapters,
                    RowKind::Transcript,
                    RowKind::JobHistory,
                ],
            },
            RowMutation::DeleteRows {
                content_id: content_id.to_string(),
                kinds: vec![RowKind::Content],
            },
        ];
        outcome.rows_deleted = self
            .store
            .transaction(&mutations)
            .await
            .map_err(|e| IngestError::Storage(e.to_string()))?;

        // Rows are authoritative; an orphaned blob only wastes space
        match self.blobs.delete_prefix(&blob_prefix(content_id)).await {
            Ok(removed) => outcome.blobs_deleted = removed,
            Err(e) => {
                let warning = format!("blob cleanup for {} failed: {}", content_id, e);
                warn!("⚠️ {}", warning);
                outcome.warnings.push(warning);
            }
        }

        info!(
            "🧹 Hard-deleted content {}: {} rows, {} blobs",
            content_id, outcome.rows_deleted, outcome.blobs_deleted
        );
        Ok(outcome)
    }

    /// Queue a re-ingestion of stored media without re-downloading. Requires
    /// the media blob to still exist.
    pub async fn reprocess(
        &self,
        content_id: &str,
        jobs: &Arc<JobManager>,
        priority: u8,
    ) -> Result<Job, IngestError> {
        let asset = self.fetch_live(content_id).await?;

        let has_media = self
            .blobs
            .exists(&media_blob_key(content_id))
            .await
            .map_err(|e| IngestError::Storage(e.to_string()))?;
        if !has_media {
            return Err(IngestError::SourceUnavailable(format!(
                "no stored media for content {}",
                content_id
            )));
        }

        let high_value = asset.title.is_some() && asset.description.is_some();
        jobs.create_with_options(
            &asset.source,
            asset.kind,
            priority,
            high_value,
            true,
        )
        .await
    }

    async fn fetch_live(&self, content_id: &str) -> Result<ContentAsset, IngestError> {
        self.store
            .fetch_content(content_id)
            .await
            .map_err(|e| IngestError::Storage(e.to_string()))?
            .ok_or_else(|| IngestError::ContentNotFound(content_id.to_string()))
    }

    async fn cache_put(&self, asset: &ContentAsset) {
        match serde_json::to_string(asset) {
            Ok(payload) => {
                if let Err(e) = self
                    .cache
                    .set_with_ttl(&cache_key(&asset.id), payload, self.cache_ttl)
                    .await
                {
                    warn!("Cache write for {} failed: {}", asset.id, e);
                }
            }
            Err(e) => warn!("Cache encode for {} failed: {}", asset.id, e),
        }
    }

    async fn invalidate(&self, content_id: &str) {
        if let Err(e) = self.cache.invalidate(&cache_key(content_id)).await {
            warn!("Cache invalidation for {} failed: {}", content_id, e);
        }
    }
}

fn cache_key(content_id: &str) -> String {
    format!("content:{}", content_id)
}

/// Build the asset a completed pipeline run produces.
pub fn asset_from_result(
    content_id: &str,
    source: &str,
    kind: ContentKind,
    title: Option<String>,
    description: Option<String>,
    duration_secs: f64,
    chapters: Vec<crate::content::Chapter>,
    transcript: &TranscriptionResult,
) -> ContentAsset {
    let now = Utc::now();
    ContentAsset {
        id: content_id.to_string(),
        source: source.to_string(),
        kind,
        title,
        description,
        duration_secs,
        language: transcript.language.clone(),
        transcript_method: transcript.method.clone(),
        overall_confidence: transcript.overall_confidence,
        chapters,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{
        InMemoryBlobStore, InMemoryCache, InMemoryGraphStore, InMemoryRelationalStore,
    };
    use crate::transcription::TranscriptionResult;

    fn sample_transcript() -> TranscriptionResult {
        TranscriptionResult {
            text: "hello world".to_string(),
            segments: Vec::new(),
            language: Some("en".to_string()),
            language_confidence: 0.9,
            overall_confidence: 0.8,
            method: "local-model".to_string(),
        }
    }

    fn sample_asset(id: &str) -> ContentAsset {
        asset_from_result(
            id,
            "https://example.com/v.mp4",
            ContentKind::Video,
            Some("Lesson".to_string()),
            None,
            600.0,
            Vec::new(),
            &sample_transcript(),
        )
    }

    struct Fixture {
        store: Arc<InMemoryRelationalStore>,
        blobs: Arc<InMemoryBlobStore>,
        graph: Arc<InMemoryGraphStore>,
        cache: Arc<InMemoryCache>,
        manager: Arc<ContentManager>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryRelationalStore::new());
        let blobs = Arc::new(InMemoryBlobStore::new());
        let graph = Arc::new(InMemoryGraphStore::new());
        let cache = Arc::new(InMemoryCache::new());
        let manager = ContentManager::new(
            store.clone(),
            blobs.clone(),
            graph.clone(),
            cache.clone(),
            Duration::from_secs(60),
        );
        Fixture {
            store,
            blobs,
            graph,
            cache,
            manager,
        }
    }

    #[tokio::test]
    async fn test_persist_then_get_round_trip() {
        let f = fixture();
        let asset = sample_asset("content_a1");
        f.manager.persist_new(&asset, &sample_transcript()).await.unwrap();

        let fetched = f.manager.get("content_a1").await.unwrap();
        assert_eq!(fetched.title.as_deref(), Some("Lesson"));
        assert!(f.graph.node_exists("content_a1").await.unwrap());
        assert!(f
            .blobs
            .exists(&transcript_blob_key("content_a1"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_get_unknown_is_not_found() {
        let f = fixture();
        let err = f.manager.get("content_missing").await.unwrap_err();
        assert!(matches!(err, IngestError::ContentNotFound(_)));
    }

    #[tokio::test]
    async fn test_update_reconciles_graph_and_invalidates_cache() {
        let f = fixture();
        let asset = sample_asset("content_a1");
        f.manager.persist_new(&asset, &sample_transcript()).await.unwrap();

        let updated = f
            .manager
            .update(
                "content_a1",
                ContentUpdate {
                    title: Some("Renamed".to_string()),
                    description: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.title.as_deref(), Some("Renamed"));
        assert!(f.cache.get("content:content_a1").await.unwrap().is_none());

        // Next read repopulates from the relational store
        let fetched = f.manager.get("content_a1").await.unwrap();
        assert_eq!(fetched.title.as_deref(), Some("Renamed"));
    }

    #[tokio::test]
    async fn test_soft_delete_hides_from_default_listing() {
        let f = fixture();
        f.manager
            .persist_new(&sample_asset("content_a1"), &sample_transcript())
            .await
            .unwrap();
        f.manager.soft_delete("content_a1").await.unwrap();

        assert!(f.manager.list(false).await.unwrap().is_empty());
        assert_eq!(f.manager.list(true).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_hard_delete_cascades_fully() {
        let f = fixture();
        let asset = sample_asset("content_a1");
        f.manager.persist_new(&asset, &sample_transcript()).await.unwrap();
        f.blobs
            .put(&media_blob_key("content_a1"), vec![1, 2, 3])
            .await
            .unwrap();

        let outcome = f.manager.hard_delete("content_a1").await.unwrap();
        assert!(outcome.rows_deleted > 0);
        assert!(outcome.blobs_deleted >= 2);
        assert!(outcome.warnings.is_empty());
        assert!(!f.graph.node_exists("content_a1").await.unwrap());
        assert!(f.store.fetch_content("content_a1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_second_hard_delete_reports_not_found() {
        let f = fixture();
        f.manager
            .persist_new(&sample_asset("content_a1"), &sample_transcript())
            .await
            .unwrap();

        f.manager.hard_delete("content_a1").await.unwrap();
        let err = f.manager.hard_delete("content_a1").await.unwrap_err();
        assert!(matches!(err, IngestError::ContentNotFound(_)));
    }

    #[tokio::test]
    async fn test_hard_delete_accepts_soft_deleted_asset() {
        let f = fixture();
        f.manager
            .persist_new(&sample_asset("content_a1"), &sample_transcript())
            .await
            .unwrap();
        f.manager.soft_delete("content_a1").await.unwrap();

        let outcome = f.manager.hard_delete("content_a1").await.unwrap();
        assert!(outcome.rows_deleted > 0);
        assert!(f.store.fetch_content("content_a1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reprocess_requires_stored_media() {
        let f = fixture();
        f.manager
            .persist_new(&sample_asset("content_a1"), &sample_transcript())
            .await
            .unwrap();

        let jobs = crate::job::JobManager::new(
            crate::config::Config::default().jobs,
            f.store.clone(),
            crate::job::JobQueue::new(),
            Arc::new(crate::storage::LoggingNotifier::new()),
        );

        let err = f
            .manager
            .reprocess("content_a1", &jobs, 5)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::SourceUnavailable(_)));

        f.blobs
            .put(&media_blob_key("content_a1"), vec![1, 2, 3])
            .await
            .unwrap();
        let job = f.manager.reprocess("content_a1", &jobs, 5).await.unwrap();
        assert!(job.skip_download);
    }
}

//! In-memory collaborator implementations.
//!
//! The default runtime for the CLI and the substrate for tests: every store
//! is an `Arc<RwLock<HashMap>>` table, so multiple isolated instances can
//! coexist in one process.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::content::ContentAsset;
use crate::job::{Job, JobFilter, JobStatus};
use crate::storage::{BlobStore, Cache, GraphStore, Notifier, RelationalStore, RowKind, RowMutation};

/// In-memory blob store
#[derive(Default, Clone)]
pub struct InMemoryBlobStore {
    objects: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        self.objects.write().await.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.objects.read().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.objects.write().await.remove(key).is_some())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        let mut objects = self.objects.write().await;
        let keys: Vec<String> = objects
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        for key in &keys {
            objects.remove(key);
        }
        Ok(keys.len())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.objects.read().await.contains_key(key))
    }
}

#[derive(Default)]
struct RelationalTables {
    jobs: HashMap<String, Job>,
    content: HashMap<String, ContentAsset>,
    /// content_id -> surviving child row kinds
    child_rows: HashMap<String, Vec<RowKind>>,
    /// job_id -> status at each upsert (test inspection)
    job_writes: HashMap<String, Vec<JobStatus>>,
}

impl RelationalTables {
    fn put_job(&mut self, job: &Job) {
        self.job_writes
            .entry(job.id.clone())
            .or_default()
            .push(job.status);
        self.jobs.insert(job.id.clone(), job.clone());
    }

    fn put_content(&mut self, asset: &ContentAsset) {
        self.content.insert(asset.id.clone(), asset.clone());
        // A stored asset carries its full complement of child rows
        self.child_rows.insert(
            asset.id.clone(),
            vec![
                RowKind::Comments,
                RowKind::Chapters,
                RowKind::Transcript,
                RowKind::JobHistory,
            ],
        );
    }

    fn remove_rows(&mut self, content_id: &str, kinds: &[RowKind]) -> usize {
        let mut removed = 0;

        if let Some(children) = self.child_rows.get_mut(content_id) {
            let before = children.len();
            children.retain(|kind| !kinds.contains(kind));
            removed += before - children.len();
        }

        if kinds.contains(&RowKind::Content) && self.content.remove(content_id).is_some() {
            self.child_rows.remove(content_id);
            removed += 1;
        }

        removed
    }
}

/// In-memory relational store
#[derive(Default, Clone)]
pub struct InMemoryRelationalStore {
    tables: Arc<RwLock<RelationalTables>>,
}

impl InMemoryRelationalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Child rows surviving for a content id (test inspection).
    pub async fn child_row_kinds(&self, content_id: &str) -> Vec<RowKind> {
        self.tables
            .read()
            .await
            .child_rows
            .get(content_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Status carried by each upsert of a job, in write order (test
    /// inspection).
    pub async fn job_write_statuses(&self, job_id: &str) -> Vec<JobStatus> {
        self.tables
            .read()
            .await
            .job_writes
            .get(job_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl RelationalStore for InMemoryRelationalStore {
    async fn upsert_job(&self, job: &Job) -> Result<()> {
        self.tables.write().await.put_job(job);
        Ok(())
    }

    async fn fetch_job(&self, job_id: &str) -> Result<Option<Job>> {
        Ok(self.tables.read().await.jobs.get(job_id).cloned())
    }

    async fn list_jobs(&self, filter: &JobFilter, limit: usize, offset: usize) -> Result<Vec<Job>> {
        let tables = self.tables.read().await;
        let mut jobs: Vec<Job> = tables
            .jobs
            .values()
            .filter(|job| filter.matches(job))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs.into_iter().skip(offset).take(limit).collect())
    }

    async fn upsert_content(&self, asset: &ContentAsset) -> Result<()> {
        self.tables.write().await.put_content(asset);
        Ok(())
    }

    async fn fetch_content(&self, content_id: &str) -> Result<Option<ContentAsset>> {
        Ok(self.tables.read().await.content.get(content_id).cloned())
    }

    async fn list_content(&self, include_deleted: bool) -> Result<Vec<ContentAsset>> {
        let tables = self.tables.read().await;
        let mut assets: Vec<ContentAsset> = tables
            .content
            .values()
            .filter(|a| include_deleted || !a.is_deleted())
            .cloned()
            .collect();
        assets.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(assets)
    }

    async fn delete_rows(&self, content_id: &str, kinds: &[RowKind]) -> Result<usize> {
        Ok(self.tables.write().await.remove_rows(content_id, kinds))
    }

    async fn transaction(&self, mutations: &[RowMutation]) -> Result<usize> {
        // One write lock held across the group is what makes it atomic here
        let mut tables = self.tables.write().await;
        let mut affected = 0;
        for mutation in mutations {
            match mutation {
                RowMutation::UpsertJob(job) => {
                    tables.put_job(job);
                    affected += 1;
                }
                RowMutation::UpsertContent(asset) => {
                    tables.put_content(asset);
                    affected += 1;
                }
                RowMutation::DeleteRows { content_id, kinds } => {
                    affected += tables.remove_rows(content_id, kinds);
                }
            }
        }
        Ok(affected)
    }
}

/// In-memory graph store: node table plus undirected edge list
#[derive(Default, Clone)]
pub struct InMemoryGraphStore {
    nodes: Arc<RwLock<HashMap<String, String>>>,
    edges: Arc<RwLock<Vec<(String, String)>>>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn relate(&self, from: &str, to: &str) {
        self.edges
            .write()
            .await
            .push((from.to_string(), to.to_string()));
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn upsert_node(&self, content_id: &str, title: &str) -> Result<()> {
        self.nodes
            .write()
            .await
            .insert(content_id.to_string(), title.to_string());
        Ok(())
    }

    async fn delete_subgraph(&self, content_id: &str) -> Result<usize> {
        let mut removed = 0;
        if self.nodes.write().await.remove(content_id).is_some() {
            removed += 1;
        }
        let mut edges = self.edges.write().await;
        let before = edges.len();
        edges.retain(|(from, to)| from != content_id && to != content_id);
        removed += before - edges.len();
        Ok(removed)
    }

    async fn node_exists(&self, content_id: &str) -> Result<bool> {
        Ok(self.nodes.read().await.contains_key(content_id))
    }
}

struct CacheEntry {
    value: String,
    expires_at: Instant,
}

/// In-memory TTL cache
#[derive(Default, Clone)]
pub struct InMemoryCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        // Expired entries are dropped on read rather than swept
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                debug!("⏰ Cache expired for key: {}", key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        self.entries.write().await.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// Notifier that logs published events and retains them for inspection
#[derive(Default, Clone)]
pub struct LoggingNotifier {
    published: Arc<RwLock<Vec<(String, serde_json::Value)>>>,
}

impl LoggingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn published(&self) -> Vec<(String, serde_json::Value)> {
        self.published.read().await.clone()
    }
}

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<()> {
        debug!("📣 {}: {}", topic, payload);
        self.published
            .write()
            .await
            .push((topic.to_string(), payload));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_blob_prefix_delete() {
        let blobs = InMemoryBlobStore::new();
        blobs.put("content/c1/video", vec![1]).await.unwrap();
        blobs.put("content/c1/audio", vec![2]).await.unwrap();
        blobs.put("content/c2/video", vec![3]).await.unwrap();

        let removed = blobs.delete_prefix("content/c1/").await.unwrap();
        assert_eq!(removed, 2);
        assert!(blobs.exists("content/c2/video").await.unwrap());
        assert!(!blobs.exists("content/c1/video").await.unwrap());
    }

    #[tokio::test]
    async fn test_cache_ttl_expiry() {
        let cache = InMemoryCache::new();
        cache
            .set_with_ttl("k", "v".to_string(), Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some("v".to_string()));

        tokio::time::sleep(Duration::from_millis(25)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    fn asset(id: &str) -> ContentAsset {
        let now = chrono::Utc::now();
        ContentAsset {
            id: id.to_string(),
            source: format!("https://example.com/{}.mp4", id),
            kind: crate::job::ContentKind::Video,
            title: None,
            description: None,
            duration_secs: 600.0,
            language: None,
            transcript_method: "local-model".to_string(),
            overall_confidence: 0.8,
            chapters: Vec::new(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[tokio::test]
    async fn test_delete_rows_spares_unnamed_kinds() {
        let store = InMemoryRelationalStore::new();
        store.upsert_content(&asset("c1")).await.unwrap();

        let removed = store
            .delete_rows("c1", &[RowKind::Comments, RowKind::Chapters])
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(
            store.child_row_kinds("c1").await,
            vec![RowKind::Transcript, RowKind::JobHistory]
        );
        assert!(store.fetch_content("c1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_transaction_applies_the_whole_group() {
        let store = InMemoryRelationalStore::new();
        store.upsert_content(&asset("c1")).await.unwrap();

        let affected = store
            .transaction(&[
                RowMutation::DeleteRows {
                    content_id: "c1".to_string(),
                    kinds: vec![
                        RowKind::Comments,
                        RowKind::Chapters,
                        RowKind::Transcript,
                        RowKind::JobHistory,
                    ],
                },
                RowMutation::DeleteRows {
                    content_id: "c1".to_string(),
                    kinds: vec![RowKind::Content],
                },
            ])
            .await
            .unwrap();

        assert_eq!(affected, 5);
        assert!(store.fetch_content("c1").await.unwrap().is_none());
        assert!(store.child_row_kinds("c1").await.is_empty());
    }

    #[tokio::test]
    async fn test_graph_subgraph_delete_removes_edges() {
        let graph = InMemoryGraphStore::new();
        graph.upsert_node("c1", "First").await.unwrap();
        graph.upsert_node("c2", "Second").await.unwrap();
        graph.relate("c1", "c2").await;

        let removed = graph.delete_subgraph("c1").await.unwrap();
        assert_eq!(removed, 2);
        assert!(!graph.node_exists("c1").await.unwrap());
        assert!(graph.node_exists("c2").await.unwrap());
    }
}

pub mod memory;

pub use memory::{InMemoryBlobStore, InMemoryCache, InMemoryGraphStore, InMemoryRelationalStore, LoggingNotifier};

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::content::ContentAsset;
use crate::job::{Job, JobFilter};

/// Blob object store collaborator. Keys are hierarchical
/// (`content/<id>/video`, `content/<id>/audio/...`); `delete_prefix` removes
/// a whole folder.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn delete(&self, key: &str) -> Result<bool>;
    async fn delete_prefix(&self, prefix: &str) -> Result<usize>;
    async fn exists(&self, key: &str) -> Result<bool>;
}

/// Which relational rows a delete targets. Child rows are removed before the
/// parent row so an interrupted cascade never leaves dangling references.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKind {
    Comments,
    Chapters,
    Transcript,
    JobHistory,
    Content,
}

/// One relational mutation inside a grouped unit.
#[derive(Debug, Clone)]
pub enum RowMutation {
    UpsertJob(Job),
    UpsertContent(ContentAsset),
    DeleteRows { content_id: String, kinds: Vec<RowKind> },
}

/// Relational store collaborator. Single calls are atomic on the store's
/// side; `transaction` groups several mutations into one unit.
#[async_trait]
pub trait RelationalStore: Send + Sync {
    async fn upsert_job(&self, job: &Job) -> Result<()>;
    async fn fetch_job(&self, job_id: &str) -> Result<Option<Job>>;
    async fn list_jobs(&self, filter: &JobFilter, limit: usize, offset: usize) -> Result<Vec<Job>>;
    async fn upsert_content(&self, asset: &ContentAsset) -> Result<()>;
    async fn fetch_content(&self, content_id: &str) -> Result<Option<ContentAsset>>;
    async fn list_content(&self, include_deleted: bool) -> Result<Vec<ContentAsset>>;
    /// Remove the named row kinds for one content id; returns rows removed.
    async fn delete_rows(&self, content_id: &str, kinds: &[RowKind]) -> Result<usize>;
    /// Apply the mutations as one atomic unit: all land or none do. Returns
    /// rows affected.
    async fn transaction(&self, mutations: &[RowMutation]) -> Result<usize>;
}

/// Graph store collaborator holding content nodes and their relationships.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn upsert_node(&self, content_id: &str, title: &str) -> Result<()>;
    /// Remove the node and every relationship hanging off it.
    async fn delete_subgraph(&self, content_id: &str) -> Result<usize>;
    async fn node_exists(&self, content_id: &str) -> Result<bool>;
}

/// Cache collaborator with TTL semantics.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> Result<()>;
    async fn invalidate(&self, key: &str) -> Result<()>;
}

/// Status-change notification sink.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<()>;
}

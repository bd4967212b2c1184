//! REST and WebSocket surface over the ingestion pipeline.
//!
//! Everything here is a thin translation layer: handlers call straight into
//! the job and content managers and map their errors onto HTTP statuses.

use std::sync::Arc;

use anyhow::Result;
use tokio::task::JoinHandle;
use tracing::info;

use crate::content::ContentManager;
use crate::job::JobManager;

pub mod models;
pub mod server;

/// API server handling REST requests and per-job WebSocket status streams
pub struct ApiServer {
    jobs: Arc<JobManager>,
    content: Arc<ContentManager>,
    port: u16,
}

impl ApiServer {
    pub fn new(jobs: Arc<JobManager>, content: Arc<ContentManager>, port: u16) -> Self {
        Self { jobs, content, port }
    }

    /// Start the API server in the background
    pub fn start_background(self) -> JoinHandle<Result<()>> {
        tokio::spawn(async move { self.start().await })
    }

    async fn start(self) -> Result<()> {
        info!("🚀 Starting API server on port {}", self.port);
        server::start_http_server(self.jobs, self.content, self.port).await
    }
}

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Arg, Command};
use tracing::{info, warn};

use vidscribe::config::Config;
use vidscribe::content::ContentManager;
use vidscribe::job::{ContentKind, JobManager, JobQueue, JobStatus, WorkerPool};
use vidscribe::media::FfmpegMediaProvider;
use vidscribe::storage::{
    InMemoryBlobStore, InMemoryCache, InMemoryGraphStore, InMemoryRelationalStore, LoggingNotifier,
};
use vidscribe::transcription::strategy::ToolingExecutor;
use vidscribe::transcription::TranscriptionEngine;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vidscribe=info,warn".into()),
        )
        .init();

    let matches = Command::new("vidscribe")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Media ingestion and transcription orchestration pipeline")
        .arg(
            Arg::new("sources")
                .value_name("SOURCE")
                .help("Media source URLs to ingest")
                .num_args(0..),
        )
        .arg(
            Arg::new("workers")
                .short('w')
                .long("workers")
                .value_name("NUM")
                .help("Number of pipeline workers"),
        )
        .arg(
            Arg::new("priority")
                .short('p')
                .long("priority")
                .value_name("NUM")
                .help("Job priority, 1 (highest) to 10 (lowest)")
                .default_value("5"),
        )
        .arg(
            Arg::new("audio")
                .long("audio")
                .help("Treat sources as audio rather than video")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("high-value")
                .long("high-value")
                .help("Flag sources as high-value (enables paid transcription)")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("port")
                .long("port")
                .value_name("PORT")
                .help("Run the API server on this port (requires the api feature)"),
        )
        .get_matches();

    let mut config = Config::load().unwrap_or_else(|e| {
        warn!("Failed to load config, using defaults: {}", e);
        Config::default()
    });
    if let Some(workers) = matches.get_one::<String>("workers") {
        config.performance.max_workers = workers.parse()?;
    }
    config.validate()?;

    let priority: u8 = matches
        .get_one::<String>("priority")
        .map(String::as_str)
        .unwrap_or("5")
        .parse()?;
    let kind = if matches.get_flag("audio") {
        ContentKind::Audio
    } else {
        ContentKind::Video
    };
    let high_value = matches.get_flag("high-value");
    let sources: Vec<String> = matches
        .get_many::<String>("sources")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();

    info!("🚀 Vidscribe starting");
    info!("{}", config.summary());

    // Wire the pipeline: in-memory collaborators, real media tooling
    let store = Arc::new(InMemoryRelationalStore::new());
    let blobs = Arc::new(InMemoryBlobStore::new());
    let queue = JobQueue::new();
    let manager = JobManager::new(
        config.jobs.clone(),
        store.clone(),
        queue.clone(),
        Arc::new(LoggingNotifier::new()),
    );
    let content = ContentManager::new(
        store,
        blobs.clone(),
        Arc::new(InMemoryGraphStore::new()),
        Arc::new(InMemoryCache::new()),
        Duration::from_secs(config.content.cache_ttl_secs),
    );
    let media = Arc::new(FfmpegMediaProvider::new(Duration::from_secs(
        config.performance.download_timeout_secs,
    ))?);
    let engine = Arc::new(TranscriptionEngine::new(
        config.transcription.clone(),
        config.segmenter.clone(),
        Arc::new(ToolingExecutor::new(config.transcription.clone())),
    ));
    let pool = WorkerPool::new(
        manager.clone(),
        queue,
        media,
        engine,
        content.clone(),
        blobs,
        config.performance.max_workers,
    );
    pool.start();

    #[cfg(feature = "api")]
    let api_handle = matches
        .get_one::<String>("port")
        .map(|port| -> Result<_> {
            let port: u16 = port.parse()?;
            Ok(vidscribe::api::ApiServer::new(manager.clone(), content.clone(), port)
                .start_background())
        })
        .transpose()?;
    #[cfg(not(feature = "api"))]
    if matches.get_one::<String>("port").is_some() {
        warn!("--port ignored: built without the api feature");
    }

    let mut job_ids = Vec::new();
    for source in &sources {
        match manager.create(source, kind, priority, high_value).await {
            Ok(job) => job_ids.push(job.id),
            Err(e) => warn!("Rejected {}: {}", source, e),
        }
    }

    if !job_ids.is_empty() {
        let start_time = std::time::Instant::now();
        loop {
            let mut remaining = 0;
            for job_id in &job_ids {
                match manager.get(job_id).await {
                    Some(job) if !job.status.is_terminal() => remaining += 1,
                    _ => {}
                }
            }
            if remaining == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }

        for job_id in &job_ids {
            if let Some(job) = manager.get(job_id).await {
                if job.status == JobStatus::Completed {
                    info!(
                        "✅ {} -> content {}",
                        job_id,
                        job.result_content_id.as_deref().unwrap_or("?")
                    );
                }
            }
        }

        let stats = manager.stats().await;
        info!("🎉 Processing completed in {:.2}s", start_time.elapsed().as_secs_f64());
        info!("✅ Successful: {}", stats.completed);
        info!("❌ Failed: {}", stats.failed);
        info!("📊 Success rate: {:.1}%", stats.success_rate * 100.0);
    }

    #[cfg(feature = "api")]
    if let Some(handle) = api_handle {
        // Serve until interrupted
        handle.await??;
    }

    pool.shutdown();
    Ok(())
}

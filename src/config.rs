use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::transcription::StrategyKind;

/// Configuration for the vidscribe ingestion pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Job orchestration settings
    pub jobs: JobConfig,

    /// Transcription cascade settings
    pub transcription: TranscriptionConfig,

    /// Long-content segmentation settings
    pub segmenter: SegmenterConfig,

    /// Content manager settings
    pub content: ContentConfig,

    /// Performance and resource settings
    pub performance: PerformanceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Automatic retry ceiling
    pub max_retries_auto: u32,

    /// Manual retry ceiling
    pub max_retries_manual: u32,

    /// Base delay for exponential retry backoff (seconds)
    pub retry_base_delay_secs: u64,

    /// Cap for the backoff delay (seconds)
    pub retry_max_delay_secs: u64,

    /// Lowest accepted priority value (most urgent)
    pub min_priority: u8,

    /// Highest accepted priority value (least urgent)
    pub max_priority: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    /// Strategy cascade, tried in order until one succeeds
    pub cascade: Vec<StrategyKind>,

    /// Results below this overall confidence fail over to the next strategy
    pub confidence_floor: f64,

    /// Local model name passed to the whisper-style CLI
    pub model: String,

    /// Language hint; None enables auto detection
    pub language: Option<String>,

    /// Per-strategy timeout (seconds)
    pub timeout_secs: u64,

    /// Endpoint for the paid cloud transcription service
    pub cloud_endpoint: Option<String>,

    /// API key for the cloud service
    pub cloud_api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmenterConfig {
    /// Items longer than this are chunked (seconds)
    pub long_content_threshold_secs: u64,

    /// Target chunk duration (seconds)
    pub chunk_duration_secs: u64,

    /// Snap a split to a natural boundary within this distance (seconds)
    pub boundary_tolerance_secs: u64,

    /// Concurrent chunk transcriptions, independent of the worker pool size
    pub chunk_parallelism: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentConfig {
    /// TTL for cached content assemblies (seconds)
    pub cache_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// Worker pool size
    pub max_workers: usize,

    /// Download timeout (seconds)
    pub download_timeout_secs: u64,
}

impl Config {
    /// Load configuration from the usual locations
    pub fn load() -> Result<Self> {
        let config_paths = [
            "vidscribe.toml",
            "config/vidscribe.toml",
            "~/.config/vidscribe/config.toml",
            "/etc/vidscribe/config.toml",
        ];

        for path in &config_paths {
            if let Ok(config_str) = std::fs::read_to_string(path) {
                match toml::from_str::<Config>(&config_str) {
                    Ok(config) => {
                        tracing::info!("📄 Loaded configuration from: {}", path);
                        return Ok(config);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse config file {}: {}", path, e);
                    }
                }
            }
        }

        Ok(Self::from_env())
    }

    /// Overlay environment variables on top of the defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(workers) = std::env::var("VIDSCRIBE_WORKERS") {
            config.performance.max_workers =
                workers.parse().unwrap_or(config.performance.max_workers);
        }

        if let Ok(model) = std::env::var("VIDSCRIBE_MODEL") {
            config.transcription.model = model;
        }

        if let Ok(api_key) = std::env::var("VIDSCRIBE_CLOUD_API_KEY") {
            config.transcription.cloud_api_key = Some(api_key);
        }

        if let Ok(endpoint) = std::env::var("VIDSCRIBE_CLOUD_ENDPOINT") {
            config.transcription.cloud_endpoint = Some(endpoint);
        }

        if let Ok(parallelism) = std::env::var("VIDSCRIBE_CHUNK_PARALLELISM") {
            config.segmenter.chunk_parallelism = parallelism
                .parse()
                .unwrap_or(config.segmenter.chunk_parallelism);
        }

        config
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.performance.max_workers == 0 {
            return Err(anyhow!("max_workers must be greater than 0"));
        }

        if self.segmenter.chunk_parallelism == 0 {
            return Err(anyhow!("chunk_parallelism must be greater than 0"));
        }

        if self.segmenter.chunk_duration_secs == 0 {
            return Err(anyhow!("chunk_duration_secs must be greater than 0"));
        }

        if self.jobs.min_priority == 0 || self.jobs.min_priority > self.jobs.max_priority {
            return Err(anyhow!(
                "invalid priority range {}..{}",
                self.jobs.min_priority,
                self.jobs.max_priority
            ));
        }

        if self.jobs.max_retries_manual < self.jobs.max_retries_auto {
            return Err(anyhow!("manual retry ceiling must be >= automatic ceiling"));
        }

        if !(0.0..=1.0).contains(&self.transcription.confidence_floor) {
            return Err(anyhow!("confidence_floor must be in [0, 1]"));
        }

        // The cascade must stay total: the fallback never fails, so the
        // pipeline never halts on transcription alone.
        if self.transcription.cascade.last() != Some(&StrategyKind::DescriptionFallback) {
            return Err(anyhow!(
                "transcription cascade must end with the description fallback"
            ));
        }

        if self
            .transcription
            .cascade
            .contains(&StrategyKind::CloudModel)
            && self.transcription.cloud_endpoint.is_none()
        {
            return Err(anyhow!("cloud strategy configured without an endpoint"));
        }

        Ok(())
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        format!(
            "vidscribe configuration:\n\
            - Workers: {}\n\
            - Chunk parallelism: {}\n\
            - Long-content threshold: {}s\n\
            - Chunk duration: {}s\n\
            - Cascade: {:?}\n\
            - Confidence floor: {:.2}\n\
            - Retry ceilings: {} auto / {} manual",
            self.performance.max_workers,
            self.segmenter.chunk_parallelism,
            self.segmenter.long_content_threshold_secs,
            self.segmenter.chunk_duration_secs,
            self.transcription.cascade,
            self.transcription.confidence_floor,
            self.jobs.max_retries_auto,
            self.jobs.max_retries_manual,
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            jobs: JobConfig {
                max_retries_auto: 3,
                max_retries_manual: 10,
                retry_base_delay_secs: 2,
                retry_max_delay_secs: 60,
                min_priority: 1,
                max_priority: 10,
            },
            transcription: TranscriptionConfig {
                cascade: vec![
                    StrategyKind::SubtitlePull,
                    StrategyKind::LocalModel,
                    StrategyKind::CloudModel,
                    StrategyKind::DescriptionFallback,
                ],
                confidence_floor: 0.35,
                model: "base".to_string(),
                language: None,
                timeout_secs: 3600, // 60 minutes for large files
                cloud_endpoint: Some("https://api.transcribe.example/v1/audio".to_string()),
                cloud_api_key: None,
            },
            segmenter: SegmenterConfig {
                long_content_threshold_secs: 3600, // 1 hour
                chunk_duration_secs: 1800,         // 30 minutes
                boundary_tolerance_secs: 120,
                chunk_parallelism: 4,
            },
            content: ContentConfig {
                cache_ttl_secs: 3600, // 1 hour
            },
            performance: PerformanceConfig {
                max_workers: num_cpus::get().min(8), // Use available cores, max 8
                download_timeout_secs: 1800,
            },
        }
    }
}

/// Configuration builder for programmatic config creation
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.config.performance.max_workers = workers;
        self
    }

    pub fn with_cascade(mut self, cascade: Vec<StrategyKind>) -> Self {
        self.config.transcription.cascade = cascade;
        self
    }

    pub fn with_confidence_floor(mut self, floor: f64) -> Self {
        self.config.transcription.confidence_floor = floor;
        self
    }

    pub fn with_retry_ceilings(mut self, auto: u32, manual: u32) -> Self {
        self.config.jobs.max_retries_auto = auto;
        self.config.jobs.max_retries_manual = manual;
        self
    }

    pub fn with_retry_base_delay_secs(mut self, secs: u64) -> Self {
        self.config.jobs.retry_base_delay_secs = secs;
        self
    }

    pub fn with_chunking(mut self, threshold_secs: u64, chunk_secs: u64) -> Self {
        self.config.segmenter.long_content_threshold_secs = threshold_secs;
        self.config.segmenter.chunk_duration_secs = chunk_secs;
        self
    }

    pub fn with_chunk_parallelism(mut self, parallelism: usize) -> Self {
        self.config.segmenter.chunk_parallelism = parallelism;
        self
    }

    pub fn with_cache_ttl_secs(mut self, secs: u64) -> Self {
        self.config.content.cache_ttl_secs = secs;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

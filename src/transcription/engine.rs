use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{SegmenterConfig, TranscriptionConfig};
use crate::error::IngestError;
use crate::job::CancelToken;
use crate::transcription::segmenter::Segmenter;
use crate::transcription::strategy::{MediaWindow, StrategyExecutor, StrategyKind};
use crate::transcription::{Segment, TranscriptionResult};

/// Produces the best available transcription for one media item at
/// acceptable cost, degrading gracefully through the strategy cascade.
pub struct TranscriptionEngine {
    config: TranscriptionConfig,
    segmenter: Segmenter,
    executor: Arc<dyn StrategyExecutor>,
}

impl TranscriptionEngine {
    pub fn new(
        config: TranscriptionConfig,
        segmenter_config: SegmenterConfig,
        executor: Arc<dyn StrategyExecutor>,
    ) -> Self {
        Self {
            config,
            segmenter: Segmenter::new(segmenter_config),
            executor,
        }
    }

    /// Transcribe one item. Items beyond the duration threshold are split,
    /// transcribed in parallel and merged back in global time order.
    ///
    /// The only error this can return is cancellation: the cascade always
    /// terminates in the description fallback, so transcription alone never
    /// fails a job.
    pub async fn transcribe(
        &self,
        window: &MediaWindow,
        natural_boundaries: &[f64],
        cancel: &CancelToken,
    ) -> Result<TranscriptionResult, IngestError> {
        if self.segmenter.needs_chunking(window.duration_secs) {
            info!(
                "📼 {} exceeds the long-content threshold ({:.0}s), chunking",
                window.source, window.duration_secs
            );
            self.segmenter
                .transcribe_chunked(self, window, natural_boundaries, cancel)
                .await
        } else {
            self.run_cascade(window, cancel).await
        }
    }

    /// Evaluate the cascade in its fixed, configured order, stopping at the
    /// first acceptable result. Always returns a result: the description
    /// fallback closes the cascade.
    pub async fn run_cascade(
        &self,
        window: &MediaWindow,
        cancel: &CancelToken,
    ) -> Result<TranscriptionResult, IngestError> {
        for strategy in &self.config.cascade {
            if cancel.is_cancelled() {
                return Err(IngestError::Cancelled);
            }

            // Paid transcription only runs for content flagged high-value
            if *strategy == StrategyKind::CloudModel && !window.high_value {
                debug!("Skipping cloud model for non-high-value {}", window.source);
                continue;
            }

            match self
                .executor
                .attempt(*strategy, window, self.config.language.as_deref())
                .await
            {
                Ok(result) => {
                    if *strategy != StrategyKind::DescriptionFallback
                        && result.overall_confidence < self.config.confidence_floor
                    {
                        debug!(
                            "{} confidence {:.2} below floor {:.2}, trying next strategy",
                            strategy, result.overall_confidence, self.config.confidence_floor
                        );
                        continue;
                    }

                    info!(
                        "✅ {} transcribed {} ({} segments, confidence {:.2})",
                        strategy,
                        window.source,
                        result.segments.len(),
                        result.overall_confidence
                    );
                    return Ok(result);
                }
                Err(e) => {
                    debug!("{} failed for {}: {}", strategy, window.source, e);
                }
            }
        }

        // Reached only when the configured fallback itself errored; keep the
        // contract that transcription never halts the pipeline.
        warn!(
            "All strategies exhausted for {}, synthesizing minimal fallback",
            window.source
        );
        Ok(minimal_fallback(window))
    }
}

fn minimal_fallback(window: &MediaWindow) -> TranscriptionResult {
    let text = window
        .description
        .clone()
        .or_else(|| window.title.clone())
        .unwrap_or_else(|| format!("No transcript available for {}", window.source));

    TranscriptionResult::from_segments(
        vec![Segment {
            start: 0.0,
            end: window.duration_secs.max(0.0),
            text,
            confidence: 0.0,
            strategy: StrategyKind::DescriptionFallback,
        }],
        None,
        0.0,
        StrategyKind::DescriptionFallback.name(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBuilder;
    use crate::error::StrategyError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted executor: each strategy resolves to a fixed outcome.
    struct ScriptedExecutor {
        subtitle: Option<f64>,
        local: Option<f64>,
        cloud: Option<f64>,
        attempts: AtomicUsize,
    }

    impl ScriptedExecutor {
        fn result(kind: StrategyKind, confidence: f64, duration: f64) -> TranscriptionResult {
            TranscriptionResult::from_segments(
                vec![Segment {
                    start: 0.0,
                    end: duration,
                    text: format!("{} text", kind),
                    confidence,
                    strategy: kind,
                }],
                Some("en".to_string()),
                0.9,
                kind.name(),
            )
        }
    }

    #[async_trait]
    impl StrategyExecutor for ScriptedExecutor {
        async fn attempt(
            &self,
            strategy: StrategyKind,
            window: &MediaWindow,
            _language: Option<&str>,
        ) -> Result<TranscriptionResult, StrategyError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let scripted = match strategy {
                StrategyKind::SubtitlePull => self.subtitle,
                StrategyKind::LocalModel => self.local,
                StrategyKind::CloudModel => self.cloud,
                StrategyKind::DescriptionFallback => {
                    return Ok(Self::result(strategy, 0.1, window.duration_secs));
                }
            };

            match scripted {
                Some(confidence) => Ok(Self::result(strategy, confidence, window.duration_secs)),
                None => Err(StrategyError::NoData("scripted miss".into())),
            }
        }
    }

    fn engine(executor: ScriptedExecutor) -> TranscriptionEngine {
        let config = ConfigBuilder::new().with_confidence_floor(0.35).build();
        TranscriptionEngine::new(
            config.transcription,
            config.segmenter,
            Arc::new(executor),
        )
    }

    #[tokio::test]
    async fn test_cascade_stops_at_first_success() {
        let engine = engine(ScriptedExecutor {
            subtitle: Some(1.0),
            local: Some(0.8),
            cloud: None,
            attempts: AtomicUsize::new(0),
        });

        let window = MediaWindow::whole("test://short", 600.0);
        let result = engine
            .run_cascade(&window, &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(result.method, "subtitle-pull");
        assert_eq!(result.overall_confidence, 1.0);
    }

    #[tokio::test]
    async fn test_cascade_falls_through_to_local_model() {
        let engine = engine(ScriptedExecutor {
            subtitle: None,
            local: Some(0.72),
            cloud: None,
            attempts: AtomicUsize::new(0),
        });

        let window = MediaWindow::whole("test://no-subs", 600.0);
        let result = engine
            .run_cascade(&window, &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(result.method, "local-model");
        assert!(result.overall_confidence > 0.0);
    }

    #[tokio::test]
    async fn test_low_confidence_fails_over() {
        let engine = engine(ScriptedExecutor {
            subtitle: None,
            local: Some(0.05), // below the 0.35 floor
            cloud: None,
            attempts: AtomicUsize::new(0),
        });

        let window = MediaWindow::whole("test://mumbling", 600.0);
        let result = engine
            .run_cascade(&window, &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(result.method, "description-fallback");
    }

    #[tokio::test]
    async fn test_cloud_skipped_unless_high_value() {
        let executor = ScriptedExecutor {
            subtitle: None,
            local: None,
            cloud: Some(0.95),
            attempts: AtomicUsize::new(0),
        };
        let engine = engine(executor);

        let mut window = MediaWindow::whole("test://ordinary", 600.0);
        let result = engine
            .run_cascade(&window, &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(result.method, "description-fallback");

        window.high_value = true;
        let result = engine
            .run_cascade(&window, &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(result.method, "cloud-model");
    }

    #[tokio::test]
    async fn test_cancellation_stops_cascade() {
        let engine = engine(ScriptedExecutor {
            subtitle: Some(1.0),
            local: None,
            cloud: None,
            attempts: AtomicUsize::new(0),
        });

        let cancel = CancelToken::new();
        cancel.cancel();

        let window = MediaWindow::whole("test://cancelled", 600.0);
        let err = engine.run_cascade(&window, &cancel).await.unwrap_err();
        assert!(matches!(err, IngestError::Cancelled));
    }

    #[tokio::test]
    async fn test_long_item_is_chunked_and_merged() {
        let config = ConfigBuilder::new()
            .with_chunking(3600, 1800)
            .with_chunk_parallelism(3)
            .build();
        let engine = TranscriptionEngine::new(
            config.transcription,
            config.segmenter,
            Arc::new(ScriptedExecutor {
                subtitle: None,
                local: Some(0.8),
                cloud: None,
                attempts: AtomicUsize::new(0),
            }),
        );

        // 3 hours -> 6 chunks of 30 minutes
        let window = MediaWindow::whole("test://marathon", 3.0 * 3600.0);
        let result = engine
            .transcribe(&window, &[], &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(result.method, "parallel-merge");
        assert!(result.segments.len() > 1);
        assert!(result.is_time_ordered());
        assert!((result.span_end() - 3.0 * 3600.0).abs() < 1.0);
    }
}

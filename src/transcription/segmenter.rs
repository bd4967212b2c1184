use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::config::SegmenterConfig;
use crate::error::IngestError;
use crate::job::CancelToken;
use crate::transcription::engine::TranscriptionEngine;
use crate::transcription::strategy::MediaWindow;
use crate::transcription::{Segment, TranscriptionResult, PARALLEL_MERGE_METHOD};

/// One planned chunk of a long item
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkPlan {
    pub index: usize,
    /// Absolute offset into the item (seconds)
    pub start_secs: f64,
    pub duration_secs: f64,
}

/// Splits media exceeding the duration threshold into bounded chunks and
/// merges per-chunk results back into one globally time-ordered result.
#[derive(Debug, Clone)]
pub struct Segmenter {
    config: SegmenterConfig,
}

impl Segmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self { config }
    }

    pub fn needs_chunking(&self, total_secs: f64) -> bool {
        total_secs > self.config.long_content_threshold_secs as f64
    }

    /// Plan fixed-duration chunks, snapping each split to a natural boundary
    /// (detected silence, known chapter mark) when one lies within tolerance.
    /// Natural boundaries avoid truncating words and sentences mid-split.
    pub fn plan_chunks(&self, total_secs: f64, boundaries: &[f64]) -> Vec<ChunkPlan> {
        let target = self.config.chunk_duration_secs as f64;
        let tolerance = self.config.boundary_tolerance_secs as f64;

        let mut plans = Vec::new();
        let mut start = 0.0_f64;
        let mut index = 0;

        while start < total_secs {
            let ideal_end = start + target;
            let end = if ideal_end >= total_secs {
                total_secs
            } else {
                nearest_boundary(boundaries, ideal_end, tolerance)
                    .filter(|b| *b > start)
                    .unwrap_or(ideal_end)
                    .min(total_secs)
            };

            plans.push(ChunkPlan {
                index,
                start_secs: start,
                duration_secs: end - start,
            });
            start = end;
            index += 1;
        }

        debug!(
            "Planned {} chunks over {:.0}s (target {:.0}s each)",
            plans.len(),
            total_secs,
            target
        );
        plans
    }

    /// Transcribe one long item chunk by chunk, fanning out up to the
    /// configured parallelism, then merge in chunk order.
    pub async fn transcribe_chunked(
        &self,
        engine: &TranscriptionEngine,
        window: &MediaWindow,
        boundaries: &[f64],
        cancel: &CancelToken,
    ) -> Result<TranscriptionResult, IngestError> {
        let plans = self.plan_chunks(window.duration_secs, boundaries);

        info!(
            "✂️ Splitting {} into {} chunks ({} in parallel)",
            window.source,
            plans.len(),
            self.config.chunk_parallelism
        );

        let mut outcomes: Vec<(ChunkPlan, TranscriptionResult)> =
            stream::iter(plans.into_iter().map(|plan| {
                let chunk_window = window.rewindow(plan.start_secs, plan.duration_secs);
                async move {
                    // Cancellation is observed at chunk boundaries; an
                    // already-running chunk finishes its strategy attempt.
                    if cancel.is_cancelled() {
                        return Err(IngestError::Cancelled);
                    }
                    let result = engine.run_cascade(&chunk_window, cancel).await?;
                    Ok((plan, result))
                }
            }))
            .buffer_unordered(self.config.chunk_parallelism)
            .collect::<Vec<Result<_, IngestError>>>()
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?;

        if cancel.is_cancelled() {
            return Err(IngestError::Cancelled);
        }

        outcomes.sort_by_key(|(plan, _)| plan.index);
        Ok(merge_chunks(outcomes))
    }
}

/// Merge per-chunk results: rebase segment times by the chunk's absolute
/// offset, concatenate in chunk order, and enforce the non-overlap invariant
/// by clamping a late-starting segment to the prior segment's end.
pub fn merge_chunks(chunks: Vec<(ChunkPlan, TranscriptionResult)>) -> TranscriptionResult {
    if chunks.len() == 1 {
        let (_, result) = chunks.into_iter().next().expect("single chunk");
        return result;
    }

    let total_duration: f64 = chunks.iter().map(|(p, _)| p.duration_secs).sum();

    let mut segments: Vec<Segment> = Vec::new();
    let mut clamped = 0usize;
    let mut weighted_confidence = 0.0_f64;
    let mut language_weights: Vec<(String, f64, f64)> = Vec::new();

    for (plan, result) in &chunks {
        weighted_confidence += result.overall_confidence * plan.duration_secs;

        if let Some(language) = &result.language {
            match language_weights.iter_mut().find(|(l, _, _)| l == language) {
                Some(entry) => {
                    entry.1 += plan.duration_secs;
                    entry.2 = entry.2.max(result.language_confidence);
                }
                None => language_weights.push((
                    language.clone(),
                    plan.duration_secs,
                    result.language_confidence,
                )),
            }
        }

        for segment in &result.segments {
            let mut rebased = Segment {
                start: segment.start + plan.start_secs,
                end: segment.end + plan.start_secs,
                text: segment.text.clone(),
                confidence: segment.confidence,
                strategy: segment.strategy,
            };

            // Clock drift across a chunk boundary: clamp to the prior end
            if let Some(prev) = segments.last() {
                if rebased.start < prev.end {
                    rebased.start = prev.end;
                    rebased.end = rebased.end.max(rebased.start);
                    clamped += 1;
                }
            }

            segments.push(rebased);
        }
    }

    if clamped > 0 {
        warn!("Clamped {} overlapping segment starts during merge", clamped);
    }

    let language = language_weights
        .iter()
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(l, _, _)| l.clone());
    let language_confidence = language
        .as_ref()
        .and_then(|l| language_weights.iter().find(|(cand, _, _)| cand == l))
        .map(|(_, _, c)| *c)
        .unwrap_or(0.0);

    let text = segments
        .iter()
        .map(|s| s.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    // Duration-weighted mean, not a flat average: tail chunks may be shorter
    let overall_confidence = if total_duration > 0.0 {
        weighted_confidence / total_duration
    } else {
        0.0
    };

    TranscriptionResult {
        text,
        segments,
        language,
        language_confidence,
        overall_confidence,
        method: PARALLEL_MERGE_METHOD.to_string(),
    }
}

fn nearest_boundary(boundaries: &[f64], target: f64, tolerance: f64) -> Option<f64> {
    boundaries
        .iter()
        .copied()
        .filter(|b| (b - target).abs() <= tolerance)
        .min_by(|a, b| {
            (a - target)
                .abs()
                .partial_cmp(&(b - target).abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::transcription::StrategyKind;

    fn segmenter() -> Segmenter {
        let mut config = Config::default().segmenter;
        config.chunk_duration_secs = 1800;
        config.boundary_tolerance_secs = 120;
        Segmenter::new(config)
    }

    fn chunk_result(confidence: f64, segments: Vec<(f64, f64, &str)>) -> TranscriptionResult {
        let segments = segments
            .into_iter()
            .map(|(start, end, text)| Segment {
                start,
                end,
                text: text.to_string(),
                confidence,
                strategy: StrategyKind::LocalModel,
            })
            .collect();
        TranscriptionResult::from_segments(segments, Some("en".to_string()), 0.9, "local-model")
    }

    #[test]
    fn test_plan_fixed_chunks() {
        let plans = segmenter().plan_chunks(3.0 * 3600.0, &[]);
        assert_eq!(plans.len(), 6);
        assert_eq!(plans[0].start_secs, 0.0);
        assert_eq!(plans[5].start_secs, 9000.0);
        let total: f64 = plans.iter().map(|p| p.duration_secs).sum();
        assert!((total - 10800.0).abs() < 1e-6);
    }

    #[test]
    fn test_plan_snaps_to_natural_boundary() {
        // Silence detected 60s before the 1800s target split
        let plans = segmenter().plan_chunks(3600.0, &[1740.0]);
        assert_eq!(plans.len(), 2);
        assert!((plans[0].duration_secs - 1740.0).abs() < 1e-6);
        assert!((plans[1].start_secs - 1740.0).abs() < 1e-6);
    }

    #[test]
    fn test_plan_ignores_distant_boundary() {
        let plans = segmenter().plan_chunks(3600.0, &[900.0]);
        assert_eq!(plans.len(), 2);
        assert!((plans[0].duration_secs - 1800.0).abs() < 1e-6);
    }

    #[test]
    fn test_merge_rebases_and_orders() {
        let chunks = vec![
            (
                ChunkPlan {
                    index: 0,
                    start_secs: 0.0,
                    duration_secs: 1800.0,
                },
                chunk_result(0.8, vec![(0.0, 10.0, "first"), (10.0, 1795.0, "chunk")]),
            ),
            (
                ChunkPlan {
                    index: 1,
                    start_secs: 1800.0,
                    duration_secs: 1800.0,
                },
                chunk_result(0.6, vec![(0.0, 12.0, "second"), (12.0, 1790.0, "chunk")]),
            ),
        ];

        let merged = merge_chunks(chunks);
        assert_eq!(merged.method, PARALLEL_MERGE_METHOD);
        assert_eq!(merged.segments.len(), 4);
        assert!((merged.segments[2].start - 1800.0).abs() < 1e-6);
        assert!(merged.is_time_ordered());
        // Duration-weighted mean over equal chunks is the flat mean here
        assert!((merged.overall_confidence - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_merge_clamps_boundary_overlap() {
        let chunks = vec![
            (
                ChunkPlan {
                    index: 0,
                    start_secs: 0.0,
                    duration_secs: 100.0,
                },
                // Segment overruns its chunk end
                chunk_result(0.8, vec![(0.0, 105.0, "overrun")]),
            ),
            (
                ChunkPlan {
                    index: 1,
                    start_secs: 100.0,
                    duration_secs: 100.0,
                },
                chunk_result(0.8, vec![(0.0, 50.0, "next")]),
            ),
        ];

        let merged = merge_chunks(chunks);
        assert!(merged.is_time_ordered());
        assert!((merged.segments[1].start - 105.0).abs() < 1e-6);
    }

    #[test]
    fn test_merge_weighted_confidence_uneven_tail() {
        let chunks = vec![
            (
                ChunkPlan {
                    index: 0,
                    start_secs: 0.0,
                    duration_secs: 1800.0,
                },
                chunk_result(0.9, vec![(0.0, 1800.0, "long")]),
            ),
            (
                ChunkPlan {
                    index: 1,
                    start_secs: 1800.0,
                    duration_secs: 200.0,
                },
                chunk_result(0.1, vec![(0.0, 200.0, "tail")]),
            ),
        ];

        let merged = merge_chunks(chunks);
        let expected = (0.9 * 1800.0 + 0.1 * 200.0) / 2000.0;
        assert!((merged.overall_confidence - expected).abs() < 1e-9);
    }

    #[test]
    fn test_needs_chunking_threshold() {
        let seg = segmenter();
        assert!(!seg.needs_chunking(600.0));
        assert!(seg.needs_chunking(3.0 * 3600.0));
    }
}

use tracing::{debug, info};

use crate::content::Chapter;

/// Boundaries closer together than this collapse into one chapter
const MIN_CHAPTER_GAP_SECS: f64 = 60.0;

/// Keep at most this many chapters per asset
const MAX_CHAPTERS: usize = 100;

/// Derive chapter markers from silence onsets. Boundaries are sorted,
/// near-duplicates collapsed, and anything past the media duration dropped;
/// graceful degradation means an empty list, never an error.
pub fn chapters_from_silence(onsets: &[f64], duration_secs: f64) -> Vec<Chapter> {
    if duration_secs <= 0.0 {
        return Vec::new();
    }

    let mut boundaries: Vec<f64> = onsets
        .iter()
        .copied()
        .filter(|&t| t > 0.0 && t < duration_secs)
        .collect();
    boundaries.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mut starts = vec![0.0];
    for boundary in boundaries {
        let last = starts[starts.len() - 1];
        if boundary - last >= MIN_CHAPTER_GAP_SECS {
            starts.push(boundary);
        } else {
            debug!("Collapsing chapter boundary at {:.1}s into {:.1}s", boundary, last);
        }
    }
    starts.truncate(MAX_CHAPTERS);

    // A single chapter covering everything carries no information
    if starts.len() < 2 {
        return Vec::new();
    }

    let chapters: Vec<Chapter> = starts
        .iter()
        .enumerate()
        .map(|(i, &start)| Chapter {
            title: format!("Chapter {}", i + 1),
            start_secs: start,
            end_secs: starts.get(i + 1).copied().unwrap_or(duration_secs),
        })
        .collect();

    info!("📑 Derived {} chapters from {} silence onsets", chapters.len(), onsets.len());
    chapters
}

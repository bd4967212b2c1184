pub mod chapters;
pub mod manager;

pub use manager::{ContentManager, DeleteOutcome};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::ContentKind;

/// Blob key layout for one content asset
pub fn blob_prefix(content_id: &str) -> String {
    format!("content/{}/", content_id)
}

pub fn media_blob_key(content_id: &str) -> String {
    format!("content/{}/media", content_id)
}

pub fn audio_blob_key(content_id: &str) -> String {
    format!("content/{}/audio", content_id)
}

pub fn transcript_blob_key(content_id: &str) -> String {
    format!("content/{}/transcript.json", content_id)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chapter {
    pub title: String,
    pub start_secs: f64,
    pub end_secs: f64,
}

/// The single durable artifact a successful job produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentAsset {
    pub id: String,
    pub source: String,
    pub kind: ContentKind,
    pub title: Option<String>,
    pub description: Option<String>,
    pub duration_secs: f64,
    pub language: Option<String>,
    pub transcript_method: String,
    pub overall_confidence: f64,
    pub chapters: Vec<Chapter>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ContentAsset {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.source)
    }
}

/// Partial edit applied write-through; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContentUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
}

impl ContentUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none()
    }
}

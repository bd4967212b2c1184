//! API request and response shapes

use serde::{Deserialize, Serialize};

use crate::job::{ContentKind, JobStatus};

/// API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

fn default_priority() -> u8 {
    5
}

fn default_kind() -> ContentKind {
    ContentKind::Video
}

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub source: String,
    #[serde(default = "default_kind")]
    pub kind: ContentKind,
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default)]
    pub high_value: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelJobRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReprocessRequest {
    #[serde(default = "default_priority")]
    pub priority: u8,
}

#[derive(Debug, Default, Deserialize)]
pub struct JobListQuery {
    pub status: Option<JobStatus>,
    pub source: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ContentListQuery {
    #[serde(default)]
    pub include_deleted: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteQuery {
    /// `hard=true` runs the cascading delete; the default is a soft delete
    #[serde(default)]
    pub hard: bool,
}

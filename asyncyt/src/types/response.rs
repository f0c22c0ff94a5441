use serde::Serialize;

use super::result::{OperationResult, PlaylistResult};
use super::video_info::VideoInfo;
use crate::error::Result;

/// Serializable outcome envelope for callers that hand results straight to
/// an API client instead of matching on [`Result`].
#[derive(Debug, Clone, Serialize)]
pub struct Response<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>
}

pub type DownloadResponse = Response<OperationResult>;
pub type SearchResponse = Response<Vec<VideoInfo>>;
pub type PlaylistResponse = Response<PlaylistResult>;

impl<T> Response<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            error: None
        }
    }

    pub fn failed(message: impl Into<String>, error: impl ToString) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            error: Some(error.to_string())
        }
    }

    /// Wraps `result`, naming the success message from its value.
    pub fn from_result(
        result: Result<T>,
        on_success: impl FnOnce(&T) -> String,
        on_failure: &str
    ) -> Self {
        match result {
            Ok(data) => Self::ok(on_success(&data), data),
            Err(error) => Self::failed(on_failure, error)
        }
    }
}

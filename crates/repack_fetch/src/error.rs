use std::sync::Arc;

use reqwest::StatusCode;
use thiserror::Error;
use url::Url;

/// Errors that can occur while downloading a repository archive.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("invalid repository url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The forge answered, but not with an archive. Either the status was not
    /// `200` or the body is an HTML page (typically a login redirect).
    #[error("failed to download {url}: {status} ({})", .content_type.as_deref().unwrap_or("no content type"))]
    Rejected {
        url: Url,
        status: StatusCode,
        content_type: Option<String>,
        body_prefix: String,
    },

    #[error("timed out while downloading {url}")]
    Timeout { url: Url },

    #[error(transparent)]
    Reqwest(Arc<reqwest::Error>),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        Self::Reqwest(Arc::new(err))
    }
}

impl FetchError {
    /// The beginning of the rejected response body, if the forge sent one.
    pub fn body_prefix(&self) -> Option<&str> {
        match self {
            FetchError::Rejected { body_prefix, .. } => Some(body_prefix),
            _ => None,
        }
    }
}

use std::error::Error as _;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::produce::ProduceError;

/// Server error type that maps to HTTP status codes.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("no archive named '{0}' is available")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Produce(#[from] ProduceError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to render page")]
    Template(#[from] minijinja::Error),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Produce(_) | Self::Io(_) | Self::Template(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Joins an error with all of its sources, `outer: inner: innermost`.
fn error_chain(err: &ServerError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = error_chain(&self);
        tracing::error!(status = %status, error = %message);
        (status, message).into_response()
    }
}

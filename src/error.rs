//! HTTP-facing errors and the JSON error envelope.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;
use utoipa::ToSchema;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Login state missing or not matching; the login has to start over.
    #[error("state mismatch, restart the login")]
    StateMismatch,
    #[error("unauthorized")]
    Unauthorized,
    #[error("{0}")]
    NotFound(&'static str),
    #[error("internal server error")]
    Internal(#[source] anyhow::Error),
}

impl ApiError {
    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        Self::Internal(err.into())
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::StateMismatch => StatusCode::PRECONDITION_FAILED,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(ToSchema, Serialize, Debug, PartialEq, Eq)]
pub struct ErrorItem {
    pub status: u16,
    pub title: String,
}

/// `{"status": 412, "errors": [{"status": 412, "title": "..."}]}`
#[derive(ToSchema, Serialize, Debug, PartialEq, Eq)]
pub struct ErrorBody {
    pub status: u16,
    pub errors: Vec<ErrorItem>,
}

impl ErrorBody {
    #[must_use]
    pub fn new(status: StatusCode, title: impl Into<String>) -> Self {
        Self {
            status: status.as_u16(),
            errors: vec![ErrorItem {
                status: status.as_u16(),
                title: title.into(),
            }],
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let Self::Internal(err) = &self {
            // Details stay in the logs, the client only sees the generic title.
            error!(error = %format!("{err:#}"), "request failed");
        }
        (status, Json(ErrorBody::new(status, self.to_string()))).into_response()
    }
}

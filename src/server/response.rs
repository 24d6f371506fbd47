//! Response envelopes shared by every front-end
//!
//! Errors and plain messages are `{"status": .., "message": ..}`; data is
//! `{"type": "success", "content": ..}`.

use crate::auth::AuthError;
use crate::Error;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error};

pub type ApiResult = std::result::Result<Response, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// Map an auth failure to a 403 carrying `message`
    pub fn forbidden(message: &'static str) -> impl FnOnce(AuthError) -> ApiError {
        move |err| {
            debug!("Denied: {}", err);
            ApiError::Forbidden(message.to_string())
        }
    }

    /// Map a store failure, keeping not-found and bad input distinct from `message`
    pub fn from_store(message: &'static str) -> impl FnOnce(Error) -> ApiError {
        move |err| match err {
            Error::NotFound { .. } => ApiError::NotFound(err.to_string()),
            Error::InvalidRequest(reason) => ApiError::BadRequest(reason),
            other => {
                error!("{}: {}", message, other);
                ApiError::Internal(message.to_string())
            }
        }
    }

    fn status(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "badrequest"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "notfound"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internalerror"),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError::from_store("store request failed")(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (code, status) = self.status();
        message(code, status, self.to_string())
    }
}

/// `{"type": "success", "content": value}` with 200
pub fn content<T: Serialize>(value: &T) -> ApiResult {
    let content = serde_json::to_value(value).map_err(|e| {
        error!("Failed to encode response: {}", e);
        ApiError::Internal("error encoding response".to_string())
    })?;
    Ok((StatusCode::OK, Json(json!({ "type": "success", "content": content }))).into_response())
}

/// `{"status": status, "message": message}` with `code`
pub fn message(code: StatusCode, status: &str, message: impl Into<String>) -> Response {
    (
        code,
        Json(json!({ "status": status, "message": message.into() })),
    )
        .into_response()
}

use std::fmt;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::models::Table;

/// BackendError
///
/// Every failure that can come back from the hosted backend (or from the local
/// checks performed before a request is sent). The `Display` form is the
/// human-readable message the hooks surface in their `error` field.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("network error: {0}")]
    Network(String),

    /// The backend answered with a non-success status and a message.
    #[error("{message}")]
    Api { status: u16, message: String },

    #[error("no matching row found in {table}")]
    NotFound { table: Table },

    #[error("expected a single row from {table} but several matched")]
    MultipleRows { table: Table },

    #[error("{table} has no public read path")]
    NotPublic { table: Table },

    #[error("not authenticated")]
    Unauthorized,

    #[error("could not decode backend response: {0}")]
    Decode(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl BackendError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::NotFound { .. })
    }

    /// Status used when the error is returned from an HTTP handler.
    pub fn status_code(&self) -> StatusCode {
        match self {
            BackendError::NotFound { .. } | BackendError::NotPublic { .. } => StatusCode::NOT_FOUND,
            BackendError::Validation(_) | BackendError::InvalidQuery(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            BackendError::Unauthorized => StatusCode::UNAUTHORIZED,
            // Constraint violations (duplicate slug, bad column) are the caller's fault.
            BackendError::Api { status, .. } if (400..500).contains(status) => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_REQUEST)
            }
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            BackendError::Decode(err.to_string())
        } else {
            BackendError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::Decode(err.to_string())
    }
}

/// ValidationError
///
/// Client-side checks run before any network call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    Required(&'static str),

    #[error("email address is not valid")]
    InvalidEmail,

    #[error("password must be at least {0} characters")]
    PasswordTooShort(usize),

    #[error("passwords do not match")]
    PasswordMismatch,

    #[error("slug '{0}' is not URL-safe")]
    InvalidSlug(String),

    #[error("'{0}' is not an image type")]
    UnsupportedMediaType(String),
}

/// HookErrorKind
///
/// Coarse classification of a hook failure, so callers can tell a missing row
/// apart from a backend outage without parsing the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum HookErrorKind {
    NotFound,
    Backend,
    Validation,
    Unauthorized,
}

/// HookError
///
/// The error a hook keeps in its reactive state. Cloneable (watch channels hand
/// out snapshots), unlike `BackendError`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct HookError {
    pub kind: HookErrorKind,
    pub message: String,
}

impl HookError {
    pub fn is_not_found(&self) -> bool {
        self.kind == HookErrorKind::NotFound
    }

    pub fn status_code(&self) -> StatusCode {
        match self.kind {
            HookErrorKind::NotFound => StatusCode::NOT_FOUND,
            HookErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
            HookErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            HookErrorKind::Backend => StatusCode::BAD_GATEWAY,
        }
    }
}

impl fmt::Display for HookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<&BackendError> for HookError {
    fn from(err: &BackendError) -> Self {
        let kind = match err {
            BackendError::NotFound { .. } | BackendError::NotPublic { .. } => HookErrorKind::NotFound,
            BackendError::Validation(_) | BackendError::InvalidQuery(_) => HookErrorKind::Validation,
            BackendError::Unauthorized => HookErrorKind::Unauthorized,
            _ => HookErrorKind::Backend,
        };
        HookError {
            kind,
            message: err.to_string(),
        }
    }
}

impl From<BackendError> for HookError {
    fn from(err: BackendError) -> Self {
        HookError::from(&err)
    }
}

/// ErrorBody
///
/// JSON shape of every error response: `{"error": "<message>"}`.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    pub error: String,
}

impl IntoResponse for BackendError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "backend request failed");
        }
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

impl IntoResponse for HookError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self.message, "content read failed");
        }
        (status, Json(ErrorBody { error: self.message })).into_response()
    }
}

impl IntoResponse for ValidationError {
    fn into_response(self) -> Response {
        BackendError::Validation(self).into_response()
    }
}

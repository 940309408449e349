use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use tourdesk_core::{CalculationError, CrmError};
use tourdesk_store::StoreError;

/// Error returned by every handler
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Domain(#[from] CrmError),

    #[error("missing {0} header")]
    MissingHeader(&'static str),

    #[error("invalid {header} header: {reason}")]
    InvalidHeader {
        header: &'static str,
        reason: String,
    },

    /// Body or query string could not be decoded
    #[error("{0}")]
    BadRequest(String),
}

impl From<CalculationError> for AppError {
    fn from(err: CalculationError) -> Self {
        Self::Domain(err.into())
    }
}

impl AppError {
    fn domain(&self) -> Option<&CrmError> {
        match self {
            Self::Domain(err) => Some(err),
            Self::Store(err) => err.domain(),
            _ => None,
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingHeader(_) | Self::InvalidHeader { .. } => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Domain(_) | Self::Store(_) => match self.domain() {
                Some(err) if err.is_not_found() => StatusCode::NOT_FOUND,
                Some(err) if err.is_validation() => StatusCode::BAD_REQUEST,
                Some(err) if err.is_conflict() => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingHeader(_) | Self::InvalidHeader { .. } => "unauthorized",
            Self::BadRequest(_) => "bad_request",
            Self::Domain(_) | Self::Store(_) => self.domain().map_or("internal", CrmError::kind),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            error!(error = %self, "request failed");
            "internal server error".to_string()
        } else {
            self.to_string()
        };
        (
            status,
            Json(json!({ "error": self.kind(), "message": message })),
        )
            .into_response()
    }
}

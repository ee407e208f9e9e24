//! Error envelope for the HTTP surface

use crate::error::Error;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

/// `{"error": <kind>, "message": <text>}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::BackendTransient(_) => StatusCode::BAD_GATEWAY,
            Error::BackendUnavailable(_) | Error::ServiceUnavailable(_) | Error::Relational(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Error::Internal(_) | Error::Io(_) | Error::Json(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            let correlation_id = Uuid::new_v4();
            error!("Internal error [{}]: {}", correlation_id, self);
            format!("internal error (correlation id {correlation_id})")
        } else {
            self.to_string()
        };

        let body = ErrorBody {
            error: self.kind().to_string(),
            message,
        };
        (status, axum::Json(body)).into_response()
    }
}

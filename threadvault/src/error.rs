use thiserror::Error;

/// A rejected request parameter.
///
/// Raised before any backend call; never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid parameter '{field}': {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Re-attribute the error to another parameter name
    pub fn for_field(mut self, field: impl Into<String>) -> Self {
        self.field = field.into();
        self
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Backend transient error: {0}")]
    BackendTransient(String),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Relational store error: {0}")]
    Relational(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Stable kind label used in the error envelope and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation_error",
            Error::BackendTransient(_) => "backend_transient_error",
            Error::BackendUnavailable(_) | Error::Relational(_) => "backend_unavailable",
            Error::ServiceUnavailable(_) => "service_unavailable",
            Error::Internal(_) | Error::Io(_) | Error::Json(_) => {
                "internal_error"
            }
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Relational(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_message_names_field() {
        let err = ValidationError::new("sort_type", "unrecognized value 'karma'");
        assert_eq!(
            err.to_string(),
            "invalid parameter 'sort_type': unrecognized value 'karma'"
        );
    }

    #[test]
    fn test_for_field_retags() {
        let err = ValidationError::new("time", "bad token").for_field("after");
        assert_eq!(err.field, "after");
        assert_eq!(err.reason, "bad token");
    }

    #[test]
    fn test_kinds() {
        let v: Error = ValidationError::new("size", "negative").into();
        assert_eq!(v.kind(), "validation_error");
        assert_eq!(
            Error::BackendUnavailable("x".into()).kind(),
            "backend_unavailable"
        );
        assert_eq!(
            Error::ServiceUnavailable("x".into()).kind(),
            "service_unavailable"
        );
        assert_eq!(Error::Internal("x".into()).kind(), "internal_error");
    }
}

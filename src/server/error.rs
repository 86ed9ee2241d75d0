//! Error responses for the HTTP API

use crate::error::{ErrorKind, IedpError};
use crate::orchestrator::TaskError;
use crate::retrieval::RetrievalError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// A failure rendered as `{error, message}`
#[derive(Debug)]
pub struct ApiError {
    /// `None` for failures outside the query core
    kind: Option<ErrorKind>,
    message: String,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: &'a str,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind: Some(kind),
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self.kind {
            Some(ErrorKind::InvalidQuery) => StatusCode::BAD_REQUEST,
            Some(ErrorKind::DocumentNotFound) => StatusCode::NOT_FOUND,
            Some(ErrorKind::UnsupportedContentType) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Some(ErrorKind::IterationLimitExceeded) => StatusCode::UNPROCESSABLE_ENTITY,
            Some(ErrorKind::Backend) => StatusCode::BAD_GATEWAY,
            Some(ErrorKind::RetrievalUnavailable) => StatusCode::SERVICE_UNAVAILABLE,
            Some(ErrorKind::Timeout) | Some(ErrorKind::ReasoningTimeout) => {
                StatusCode::GATEWAY_TIMEOUT
            }
            None => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error = self.kind.map(ErrorKind::as_str).unwrap_or("internal");

        if status.is_server_error() {
            tracing::error!(error, status = status.as_u16(), "{}", self.message);
        } else {
            tracing::warn!(error, status = status.as_u16(), "{}", self.message);
        }

        let body = ErrorBody {
            error,
            message: &self.message,
        };
        (status, Json(body)).into_response()
    }
}

impl From<TaskError> for ApiError {
    fn from(e: TaskError) -> Self {
        Self::new(e.kind, e.message)
    }
}

impl From<RetrievalError> for ApiError {
    fn from(e: RetrievalError) -> Self {
        Self::new(e.kind(), e.to_string())
    }
}

impl From<IedpError> for ApiError {
    fn from(e: IedpError) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ErrorKind::InvalidQuery, 400),
            (ErrorKind::DocumentNotFound, 404),
            (ErrorKind::UnsupportedContentType, 415),
            (ErrorKind::IterationLimitExceeded, 422),
            (ErrorKind::Backend, 502),
            (ErrorKind::RetrievalUnavailable, 503),
            (ErrorKind::Timeout, 504),
            (ErrorKind::ReasoningTimeout, 504),
        ];
        for (kind, status) in cases {
            assert_eq!(ApiError::new(kind, "x").status_code().as_u16(), status);
        }

        let internal = ApiError::from(IedpError::Server("boom".into()));
        assert_eq!(internal.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

//! Application error taxonomy and its HTTP mapping.

use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde::Serialize;

/// Error model shared by the session, the adapters, and the relay.
///
/// A recognizer reporting "no speech" is not represented here; see
/// [`crate::speech::Recognition`].
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Bad language code, missing credentials, or no capture device.
    #[error("{0}")]
    Configuration(String),
    /// The session is not in a state that allows the operation.
    #[error("{0}")]
    Precondition(String),
    /// Any failure reported by or while talking to an external provider.
    #[error("{0}")]
    Upstream(String),
    #[error("{message}")]
    InvalidRequest {
        message: String,
        param: Option<String>,
        code: Option<String>,
    },
    #[error("{0}")]
    UnsupportedMediaType(String),
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition(message.into())
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream(message.into())
    }

    /// Creates an `invalid_request_error` payload with status `400`.
    pub fn invalid_request(
        message: impl Into<String>,
        param: Option<&str>,
        code: Option<&str>,
    ) -> Self {
        Self::InvalidRequest {
            message: message.into(),
            param: param.map(ToOwned::to_owned),
            code: code.map(ToOwned::to_owned),
        }
    }

    /// Creates a `415 Unsupported Media Type` style error.
    pub fn unsupported_media_type(message: impl Into<String>) -> Self {
        Self::UnsupportedMediaType(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// HTTP status used when this error reaches a client.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Precondition(_) | Self::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            Self::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::Configuration(_) | Self::Upstream(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorPayload {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
    #[serde(rename = "type")]
    error_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    param: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            AppError::Configuration(message) => ErrorBody {
                message,
                error_type: "server_error",
                param: None,
                code: Some("configuration_error".to_string()),
            },
            AppError::Precondition(message) => ErrorBody {
                message,
                error_type: "invalid_request_error",
                param: None,
                code: Some("precondition_failed".to_string()),
            },
            AppError::Upstream(message) => ErrorBody {
                message,
                error_type: "server_error",
                param: None,
                code: Some("upstream_error".to_string()),
            },
            AppError::InvalidRequest {
                message,
                param,
                code,
            } => ErrorBody {
                message,
                error_type: "invalid_request_error",
                param,
                code,
            },
            AppError::UnsupportedMediaType(message) => ErrorBody {
                message,
                error_type: "invalid_request_error",
                param: Some("file".to_string()),
                code: Some("unsupported_media_type".to_string()),
            },
            AppError::Internal(message) => ErrorBody {
                message,
                error_type: "server_error",
                param: None,
                code: Some("internal_error".to_string()),
            },
        };

        (status, Json(ErrorPayload { error: body })).into_response()
    }
}

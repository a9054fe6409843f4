//! HTTP error mapping.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use robot_gateway_core::{
    ErrorKind, GatewayError, identity::IdentityError, traits::StorageError,
};
use serde::Serialize;
use thiserror::Error;

/// Error returned by an HTTP handler.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("{0}")]
    Unauthorized(#[from] IdentityError),
    #[error("Admin role required")]
    Forbidden,
    #[error("{0}")]
    BadRequest(String),
    #[error("Operation log unavailable: {0}")]
    Storage(#[from] StorageError),
}

/// Status code for a gateway error kind.
#[must_use]
pub const fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidAddress | ErrorKind::UnknownCommand => StatusCode::BAD_REQUEST,
        ErrorKind::AlreadyConnected | ErrorKind::NotConnected => StatusCode::CONFLICT,
        ErrorKind::NoFrameAvailable => StatusCode::NOT_FOUND,
        ErrorKind::CommandTimeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::TransportFailure => StatusCode::BAD_GATEWAY,
        ErrorKind::LogWriteFailure => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<ErrorKind>,
}

impl ApiError {
    /// Status code for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Gateway(e) => status_for(e.kind()),
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(%status, "{self}");
        } else {
            tracing::debug!(%status, "{self}");
        }

        let kind = match &self {
            Self::Gateway(e) => Some(e.kind()),
            _ => None,
        };
        let body = ErrorBody {
            error: self.to_string(),
            kind,
        };
        (status, Json(body)).into_response()
    }
}

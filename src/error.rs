//! Error types shared by the feed client, geocoder and HTTP layer.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Result type alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// HTTP request failed before a response arrived
    #[error("HTTP request failed: {0}")]
    Http(#[source] reqwest::Error),

    /// SIRI-VM document was not well-formed XML
    #[error("Invalid SIRI-VM document: {0}")]
    Xml(#[from] roxmltree::Error),

    /// GTFS-RT payload could not be decoded
    #[error("Invalid GTFS-RT payload: {0}")]
    Protobuf(#[from] prost::DecodeError),

    #[error("CSV export failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Upstream service answered with a non-success status
    #[error("Upstream error ({status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("Invalid postcode: {0}")]
    InvalidPostcode(String),

    #[error("Postcode not found: {0}")]
    PostcodeNotFound(String),

    #[error("Invalid coordinate: ({latitude}, {longitude})")]
    InvalidCoordinate { latitude: f64, longitude: f64 },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Vehicle not found: {0}")]
    VehicleNotFound(String),
}

// BODS request URLs carry the api_key, so the URL never reaches the message.
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.without_url())
    }
}

impl Error {
    pub fn upstream(status: u16, message: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            message: message.into(),
        }
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// HTTP status reported to the browser for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidPostcode(_)
            | Self::InvalidCoordinate { .. }
            | Self::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Self::PostcodeNotFound(_) | Self::VehicleNotFound(_) => StatusCode::NOT_FOUND,
            Self::Http(_) | Self::Xml(_) | Self::Protobuf(_) | Self::Upstream { .. } => {
                StatusCode::BAD_GATEWAY
            }
            Self::Csv(_) | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %self, "Request failed");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_map_to_4xx() {
        assert_eq!(
            Error::InvalidPostcode("XX".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::InvalidCoordinate {
                latitude: 91.0,
                longitude: 0.0
            }
            .status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::PostcodeNotFound("TF1 1AA".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            Error::VehicleNotFound("1234".into()).status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_upstream_errors_map_to_bad_gateway() {
        let err = Error::upstream(403, "Forbidden");
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.to_string(), "Upstream error (403): Forbidden");
    }

    #[test]
    fn test_into_response_keeps_status() {
        let response = Error::invalid_argument("limit must be positive").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

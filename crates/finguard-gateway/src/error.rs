//! Gateway error taxonomy
//!
//! Each variant maps to exactly one status code. Client-caused failures are
//! 400, everything the caller could not have prevented is 500. The body is
//! always `{"detail": "<message>"}` and never an envelope.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use finguard_crypto::{EnvelopeError, KeyError};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    /// Request body is not a usable envelope (bad JSON, missing or
    /// non-base64 fields)
    #[error("Invalid envelope: {0}")]
    EnvelopeFormat(String),

    /// Any failure while unwrapping the envelope. Deliberately says nothing
    /// about which step failed.
    #[error("Decryption error: unable to decrypt request")]
    Decryption,

    /// Decrypted payload lacks required business fields
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Downstream service failed or returned something unusable
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Gateway's own key material could not be loaded
    #[error("Key error: {0}")]
    KeyLoad(#[from] KeyError),

    /// Sealing the response failed
    #[error("Encryption error: {0}")]
    Encryption(String),
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::EnvelopeFormat(_)
            | GatewayError::Decryption
            | GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::Upstream(_) | GatewayError::KeyLoad(_) | GatewayError::Encryption(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Text placed in the `detail` field
    pub fn detail(&self) -> String {
        if self.is_client_error() {
            self.to_string()
        } else {
            format!("Server error: {}", self)
        }
    }
}

impl From<EnvelopeError> for GatewayError {
    fn from(err: EnvelopeError) -> Self {
        match err {
            EnvelopeError::Format(msg) => GatewayError::EnvelopeFormat(msg),
            EnvelopeError::Decryption => GatewayError::Decryption,
            EnvelopeError::Encryption(msg) => GatewayError::Encryption(msg),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(json!({ "detail": self.detail() }))).into_response()
    }
}

//! Request metadata log
//!
//! One structured event per gateway request at target `finguard::audit`.
//! Only identifiers go in here, never payloads or key material.

use chrono::Utc;
use uuid::Uuid;

use crate::error::GatewayError;

pub const AUDIT_TARGET: &str = "finguard::audit";
pub const SERVICE_NAME: &str = "api_gateway";

/// Identifying values attached to a successful request
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AuditSubject {
    pub user_id: Option<String>,
    pub ticker: Option<String>,
    pub query_length: Option<usize>,
}

pub fn record_success(endpoint: &str, request_id: Uuid, subject: &AuditSubject) {
    tracing::info!(
        target: AUDIT_TARGET,
        service = SERVICE_NAME,
        endpoint,
        %request_id,
        user_id = subject.user_id.as_deref(),
        ticker = subject.ticker.as_deref(),
        query_length = subject.query_length,
        status = "success",
        timestamp = %Utc::now().to_rfc3339(),
        "gateway request completed"
    );
}

pub fn record_error(endpoint: &str, request_id: Uuid, error: &GatewayError) {
    let http_status = error.status_code().as_u16();
    let detail = error.detail();
    let timestamp = Utc::now().to_rfc3339();

    if error.is_client_error() {
        tracing::warn!(
            target: AUDIT_TARGET,
            service = SERVICE_NAME,
            endpoint,
            %request_id,
            error = %detail,
            http_status,
            status = "error",
            %timestamp,
            "gateway request rejected"
        );
    } else {
        tracing::error!(
            target: AUDIT_TARGET,
            service = SERVICE_NAME,
            endpoint,
            %request_id,
            error = %detail,
            http_status,
            status = "error",
            %timestamp,
            "gateway request failed"
        );
    }
}

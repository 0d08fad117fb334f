//! HTTP surface of the gateway
//!
//! Each enveloped request walks the same pipeline:
//! decrypt with the gateway key, validate, forward upstream, seal the
//! upstream answer under the client key. Any step can fail; the failure
//! is logged and turned into a plaintext `{"detail": ...}` response.

use axum::{
    body::Bytes,
    extract::{
        rejection::{BytesRejection, PathRejection},
        DefaultBodyLimit, Path, State,
    },
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use finguard_crypto::{envelope, Envelope};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::Instrument;
use uuid::Uuid;

use crate::audit::{self, AuditSubject};
use crate::endpoints::{self, AuditKey, Endpoint, POST_ENDPOINTS, STOCK_LATEST};
use crate::error::GatewayError;
use crate::state::GatewayState;

pub const PUBLIC_KEY_ROUTE: &str = "/api/public-key";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

pub fn create_router(state: Arc<GatewayState>) -> Router {
    let mut router = Router::new()
        .route(PUBLIC_KEY_ROUTE, get(public_key_handler))
        .route("/api/stock-latest/:ticker", get(stock_latest_handler));

    for &endpoint in POST_ENDPOINTS {
        router = router.route(
            endpoint.route,
            post(
                move |State(state): State<Arc<GatewayState>>,
                      body: Result<Bytes, BytesRejection>| async move {
                    let inbound = body.map_err(body_rejection).map(|body| Inbound {
                        ticker: None,
                        body,
                    });
                    handle(&state, endpoint, inbound).await
                },
            ),
        );
    }

    let max_body_bytes = state.max_body_bytes;
    router
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn public_key_handler(State(state): State<Arc<GatewayState>>) -> Json<Value> {
    Json(json!({ "public_key": state.keys.gateway_public_pem() }))
}

async fn stock_latest_handler(
    State(state): State<Arc<GatewayState>>,
    ticker: Result<Path<String>, PathRejection>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let inbound = match (ticker, body) {
        (Err(rejection), _) => Err(GatewayError::Validation(format!(
            "invalid ticker: {}",
            rejection.body_text()
        ))),
        (Ok(_), Err(rejection)) => Err(body_rejection(rejection)),
        (Ok(Path(ticker)), Ok(body)) => Ok(Inbound {
            ticker: Some(ticker),
            body,
        }),
    };
    handle(&state, &STOCK_LATEST, inbound).await
}

/// What the extractors pulled out of the request
struct Inbound {
    ticker: Option<String>,
    body: Bytes,
}

fn body_rejection(rejection: BytesRejection) -> GatewayError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        GatewayError::EnvelopeFormat("request body too large".to_string())
    } else {
        GatewayError::EnvelopeFormat(format!("unreadable request body: {}", rejection.body_text()))
    }
}

/// Run one request through the pipeline and render the outcome
async fn handle(
    state: &GatewayState,
    endpoint: &'static Endpoint,
    inbound: Result<Inbound, GatewayError>,
) -> Response {
    let request_id = Uuid::new_v4();
    let ticker = inbound.as_ref().ok().and_then(|i| i.ticker.clone());
    let route = endpoint.audit_route(ticker.as_deref());
    let span = tracing::info_span!("gateway_request", endpoint = %route, %request_id);

    let result = match inbound {
        Ok(inbound) => {
            process(state, endpoint, inbound.ticker.as_deref(), &inbound.body)
                .instrument(span)
                .await
        }
        Err(err) => Err(err),
    };

    let mut response = match result {
        Ok((sealed, subject)) => {
            audit::record_success(&route, request_id, &subject);
            Json(sealed).into_response()
        }
        Err(err) => {
            audit::record_error(&route, request_id, &err);
            err.into_response()
        }
    };

    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response
}

async fn process(
    state: &GatewayState,
    endpoint: &Endpoint,
    ticker: Option<&str>,
    body: &[u8],
) -> Result<(Envelope, AuditSubject), GatewayError> {
    if let Some(ticker) = ticker {
        endpoints::validate_ticker(ticker)?;
    }

    // Received -> Decrypted
    let payload = match parse_body(body, endpoint.body_optional)? {
        Some(sealed) => Some(envelope::open_value(&sealed, state.keys.gateway_private_key())?),
        None => None,
    };
    tracing::debug!("request envelope opened");

    // Decrypted -> Forwarded -> ResponseReceived
    let upstream_body = endpoint.upstream_body(payload.as_ref())?;
    let subject = audit_subject(endpoint.audit, payload.as_ref(), ticker);

    let answer = state
        .upstream
        .call(
            endpoint.service,
            endpoint.method,
            &endpoint.upstream_path(ticker),
            upstream_body.as_ref(),
        )
        .await?;
    tracing::debug!(service = endpoint.service.name(), "upstream answered");

    // ResponseReceived -> Encrypted
    let client_key = state.keys.load_client_public_key()?;
    let sealed = envelope::seal_value(&answer, &client_key)?;

    Ok((sealed, subject))
}

/// Parse the raw body into an envelope.
///
/// With `optional`, an empty body or any falsy JSON value (`null`, `{}`,
/// `""`, ...) means the caller sent no envelope at all. Anything else must
/// be a complete envelope.
fn parse_body(body: &[u8], optional: bool) -> Result<Option<Envelope>, GatewayError> {
    let is_blank = body.iter().all(u8::is_ascii_whitespace);
    if optional && is_blank {
        return Ok(None);
    }
    if is_blank {
        return Err(GatewayError::EnvelopeFormat("request body is empty".to_string()));
    }

    let value: Value = serde_json::from_slice(body)
        .map_err(|_| GatewayError::EnvelopeFormat("request body is not valid JSON".to_string()))?;

    if optional && !endpoints::is_present(&value) {
        return Ok(None);
    }

    Ok(Some(Envelope::from_value(&value)?))
}

fn audit_subject(key: AuditKey, payload: Option<&Value>, ticker: Option<&str>) -> AuditSubject {
    let text = |name: &str| -> Option<String> {
        payload
            .and_then(|p| p.get(name))
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
    };

    match key {
        AuditKey::UserId => AuditSubject {
            user_id: text("user_id"),
            ..AuditSubject::default()
        },
        AuditKey::Ticker => AuditSubject {
            ticker: ticker.map(str::to_string).or_else(|| text("ticker")),
            ..AuditSubject::default()
        },
        AuditKey::Query => AuditSubject {
            user_id: text("user_id"),
            query_length: text("query").map(|q| q.chars().count()),
            ..AuditSubject::default()
        },
    }
}

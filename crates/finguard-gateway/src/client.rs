//! Client side of the envelope protocol
//!
//! Fetches the gateway public key once, seals each request under it and
//! opens each response with the client private key.

use finguard_crypto::keys::{public_key_from_pem, KeyError};
use finguard_crypto::{envelope, Envelope, EnvelopeError, KeySlot, KeyStore, RsaPrivateKey, RsaPublicKey};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::OnceCell;

use crate::router::PUBLIC_KEY_ROUTE;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("gateway returned {status}: {detail}")]
    Gateway { status: u16, detail: String },

    #[error("key error: {0}")]
    Key(#[from] KeyError),

    #[error("envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("invalid gateway response: {0}")]
    InvalidResponse(String),
}

#[derive(Deserialize)]
struct PublicKeyResponse {
    public_key: String,
}

#[derive(Deserialize)]
struct ErrorResponse {
    detail: String,
}

pub struct GatewayClient {
    http: reqwest::Client,
    base_url: String,
    client_key: RsaPrivateKey,
    gateway_key: OnceCell<RsaPublicKey>,
}

impl GatewayClient {
    pub fn new(base_url: impl Into<String>, client_key: RsaPrivateKey) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client_key,
            gateway_key: OnceCell::new(),
        }
    }

    /// Use the client private key provisioned in `store`
    pub fn from_key_store(base_url: impl Into<String>, store: &KeyStore) -> Result<Self, ClientError> {
        let client_key = store.load_private_key(KeySlot::Client)?;
        Ok(Self::new(base_url, client_key))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Gateway public key, fetched on first use
    pub async fn gateway_public_key(&self) -> Result<&RsaPublicKey, ClientError> {
        self.gateway_key
            .get_or_try_init(|| self.fetch_public_key())
            .await
    }

    /// Fetch and parse `GET /api/public-key` without caching
    pub async fn fetch_public_key(&self) -> Result<RsaPublicKey, ClientError> {
        let url = format!("{}{}", self.base_url, PUBLIC_KEY_ROUTE);
        let resp = self.http.get(&url).send().await?.error_for_status()?;
        let body: PublicKeyResponse = resp
            .json()
            .await
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;
        Ok(public_key_from_pem(&body.public_key, &url)?)
    }

    /// Seal `payload`, POST it to `path` and open the answer
    pub async fn post(&self, path: &str, payload: &Value) -> Result<Value, ClientError> {
        let sealed = envelope::seal_value(payload, self.gateway_public_key().await?)?;
        let resp = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .json(&sealed)
            .send()
            .await?;
        self.open_response(resp).await
    }

    /// GET `path`, optionally carrying a sealed payload as the body
    pub async fn get(&self, path: &str, payload: Option<&Value>) -> Result<Value, ClientError> {
        let mut request = self.http.get(format!("{}{}", self.base_url, path));
        if let Some(payload) = payload {
            let sealed = envelope::seal_value(payload, self.gateway_public_key().await?)?;
            request = request.json(&sealed);
        }
        let resp = request.send().await?;
        self.open_response(resp).await
    }

    async fn open_response(&self, resp: reqwest::Response) -> Result<Value, ClientError> {
        let status = resp.status();
        let body = resp.bytes().await?;

        if !status.is_success() {
            let detail = serde_json::from_slice::<ErrorResponse>(&body)
                .map(|e| e.detail)
                .unwrap_or_else(|_| String::from_utf8_lossy(&body).into_owned());
            return Err(ClientError::Gateway {
                status: status.as_u16(),
                detail,
            });
        }

        let sealed: Envelope = serde_json::from_slice(&body)
            .map_err(|e| ClientError::InvalidResponse(format!("expected an envelope: {}", e)))?;
        Ok(envelope::open_value(&sealed, &self.client_key)?)
    }
}

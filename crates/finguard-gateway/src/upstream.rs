//! Plain JSON client for the financial, NLP and analytics services
//!
//! One attempt per call. A non-2xx status, a transport failure, a timeout
//! or a body that is not JSON all surface as `GatewayError::Upstream`.

use serde_json::Value;

use crate::config::{GatewayConfig, UpstreamService};
use crate::endpoints::UpstreamMethod;
use crate::error::GatewayError;

pub struct UpstreamClient {
    http: reqwest::Client,
    config: GatewayConfig,
}

impl UpstreamClient {
    pub fn new(config: &GatewayConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(config.upstream_timeout)
            .build()?;
        Ok(Self {
            http,
            config: config.clone(),
        })
    }

    pub fn url(&self, service: UpstreamService, path: &str) -> String {
        format!("{}{}", self.config.base_url(service), path)
    }

    pub async fn call(
        &self,
        service: UpstreamService,
        method: UpstreamMethod,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, GatewayError> {
        let url = self.url(service, path);
        let name = service.name();

        let mut request = match method {
            UpstreamMethod::Get => self.http.get(&url),
            UpstreamMethod::Post => self.http.post(&url),
        };
        if let Some(body) = body {
            request = request.json(body);
        }

        tracing::debug!(service = name, %url, "calling upstream");

        let resp = request.send().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::Upstream(format!("{} service timed out", name))
            } else {
                GatewayError::Upstream(format!("{} service unreachable: {}", name, e))
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(GatewayError::Upstream(format!(
                "{} service returned {}",
                name, status
            )));
        }

        resp.json::<Value>()
            .await
            .map_err(|_| GatewayError::Upstream(format!("{} service returned invalid JSON", name)))
    }
}

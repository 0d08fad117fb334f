//! Gateway configuration
//!
//! CLI arguments with environment variable fallbacks. The binary loads a
//! `.env` file first, so the upstream URLs can live there.

use clap::Args;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_FINANCIAL_URL: &str = "http://localhost:8001";
pub const DEFAULT_NLP_URL: &str = "http://localhost:8000";
pub const DEFAULT_ANALYTICS_URL: &str = "http://localhost:8002";
pub const DEFAULT_KEY_DIR: &str = "keys";
pub const DEFAULT_LISTEN: &str = "0.0.0.0:8080";
pub const DEFAULT_UPSTREAM_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// The downstream services the gateway fronts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamService {
    Financial,
    Nlp,
    Analytics,
}

impl UpstreamService {
    pub fn name(&self) -> &'static str {
        match self {
            UpstreamService::Financial => "financial",
            UpstreamService::Nlp => "nlp",
            UpstreamService::Analytics => "analytics",
        }
    }
}

/// Resolved gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub listen: SocketAddr,
    pub key_dir: PathBuf,
    pub financial_url: String,
    pub nlp_url: String,
    pub analytics_url: String,
    pub upstream_timeout: Duration,
    /// Largest request body accepted, in bytes
    pub max_body_bytes: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            key_dir: PathBuf::from(DEFAULT_KEY_DIR),
            financial_url: DEFAULT_FINANCIAL_URL.to_string(),
            nlp_url: DEFAULT_NLP_URL.to_string(),
            analytics_url: DEFAULT_ANALYTICS_URL.to_string(),
            upstream_timeout: Duration::from_millis(DEFAULT_UPSTREAM_TIMEOUT_MS),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl GatewayConfig {
    /// Base URL for a service, without a trailing slash
    pub fn base_url(&self, service: UpstreamService) -> &str {
        let url = match service {
            UpstreamService::Financial => &self.financial_url,
            UpstreamService::Nlp => &self.nlp_url,
            UpstreamService::Analytics => &self.analytics_url,
        };
        url.trim_end_matches('/')
    }
}

/// `finguard serve` arguments
#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = DEFAULT_LISTEN)]
    pub listen: SocketAddr,

    /// Directory holding the gateway and client PEM files
    #[arg(long, env = "FINGUARD_KEY_DIR", default_value = DEFAULT_KEY_DIR)]
    pub key_dir: PathBuf,

    /// Financial data service base URL
    #[arg(long, env = "FINANCIAL_SERVER_URL", default_value = DEFAULT_FINANCIAL_URL)]
    pub financial_url: String,

    /// NLP service base URL
    #[arg(long, env = "NLP_SERVER_URL", default_value = DEFAULT_NLP_URL)]
    pub nlp_url: String,

    /// Analytics service base URL
    #[arg(long, env = "ANALYTICS_SERVER_URL", default_value = DEFAULT_ANALYTICS_URL)]
    pub analytics_url: String,

    /// Upstream request timeout in milliseconds
    #[arg(long, env = "UPSTREAM_TIMEOUT_MS", default_value_t = DEFAULT_UPSTREAM_TIMEOUT_MS)]
    pub upstream_timeout_ms: u64,

    /// Largest request body accepted, in bytes
    #[arg(long, env = "MAX_BODY_BYTES", default_value_t = DEFAULT_MAX_BODY_BYTES)]
    pub max_body_bytes: usize,
}

impl From<ServeArgs> for GatewayConfig {
    fn from(args: ServeArgs) -> Self {
        Self {
            listen: args.listen,
            key_dir: args.key_dir,
            financial_url: args.financial_url,
            nlp_url: args.nlp_url,
            analytics_url: args.analytics_url,
            upstream_timeout: Duration::from_millis(args.upstream_timeout_ms),
            max_body_bytes: args.max_body_bytes,
        }
    }
}

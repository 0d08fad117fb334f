//! FinGuard Gateway
//!
//! Front door for the FinGuard services. Requests arrive sealed under the
//! gateway key; the gateway opens them, forwards plain JSON to the
//! financial, NLP or analytics service and seals the answer under the
//! client key.

pub mod audit;
pub mod client;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod router;
pub mod server;
pub mod state;
pub mod upstream;

pub use client::{ClientError, GatewayClient};
pub use config::{GatewayConfig, ServeArgs, UpstreamService};
pub use error::GatewayError;
pub use router::create_router;
pub use server::run;
pub use state::{GatewayKeys, GatewayState};

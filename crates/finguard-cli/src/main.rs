//! FinGuard CLI
//!
//! Usage:
//!   finguard serve                     - Provision keys if needed and run the gateway
//!   finguard keys setup                - Create any missing keypairs
//!   finguard keys show <gateway|client> - Print a public key
//!   finguard call <endpoint> [json]    - Send an enveloped request through a gateway

use anyhow::Context;
use clap::{Parser, Subcommand};
use finguard_crypto::{KeySlot, KeyStore};
use finguard_gateway::config::DEFAULT_KEY_DIR;
use finguard_gateway::{GatewayClient, GatewayConfig, ServeArgs};
use serde_json::Value;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "finguard")]
#[command(version)]
#[command(about = "End-to-end encrypting gateway for the FinGuard services", long_about = None)]
struct Cli {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway
    Serve(ServeArgs),

    /// Manage the gateway and client keypairs
    Keys {
        /// Key directory
        #[arg(long, env = "FINGUARD_KEY_DIR", default_value = DEFAULT_KEY_DIR, global = true)]
        key_dir: PathBuf,

        #[command(subcommand)]
        action: KeysAction,
    },

    /// Send one request through a running gateway and print the decrypted answer
    Call {
        /// Gateway path, e.g. /api/user-data
        endpoint: String,

        /// JSON payload to seal
        payload: Option<String>,

        /// Use GET instead of POST (payload becomes optional)
        #[arg(long)]
        get: bool,

        /// Gateway base URL
        #[arg(long, env = "FINGUARD_GATEWAY_URL", default_value = "http://localhost:8080")]
        gateway_url: String,

        /// Directory holding the client private key
        #[arg(long, env = "FINGUARD_KEY_DIR", default_value = DEFAULT_KEY_DIR)]
        key_dir: PathBuf,
    },
}

#[derive(Subcommand)]
enum KeysAction {
    /// Generate whichever keypairs are missing
    Setup,

    /// Print a public key in PEM form
    Show {
        /// gateway or client
        slot: KeySlot,
    },
}

fn init_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_json);

    match cli.command {
        Commands::Serve(args) => {
            finguard_gateway::run(GatewayConfig::from(args)).await?;
        }

        Commands::Keys { key_dir, action } => {
            let store = KeyStore::new(key_dir);
            match action {
                KeysAction::Setup => {
                    let created = store.setup_keys()?;
                    if created.is_empty() {
                        println!("All keypairs already present in {}", store.dir().display());
                    }
                    for slot in created {
                        println!("Generated {} keypair in {}", slot, store.dir().display());
                    }
                }
                KeysAction::Show { slot } => {
                    print!("{}", store.read_public_pem(slot)?);
                }
            }
        }

        Commands::Call {
            endpoint,
            payload,
            get,
            gateway_url,
            key_dir,
        } => {
            let payload: Option<Value> = payload
                .map(|p| serde_json::from_str(&p))
                .transpose()
                .context("payload is not valid JSON")?;

            let client = GatewayClient::from_key_store(gateway_url, &KeyStore::new(key_dir))?;
            let answer = if get {
                client.get(&endpoint, payload.as_ref()).await?
            } else {
                let payload = payload.context("POST requests need a JSON payload")?;
                client.post(&endpoint, &payload).await?
            };

            println!("{}", serde_json::to_string_pretty(&answer)?);
        }
    }

    Ok(())
}

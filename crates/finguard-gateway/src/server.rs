//! Gateway process lifecycle

use finguard_crypto::KeyStore;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::config::GatewayConfig;
use crate::router::create_router;
use crate::state::GatewayState;

/// Make sure both keypairs exist, then serve until Ctrl-C
pub async fn run(config: GatewayConfig) -> anyhow::Result<()> {
    let store = KeyStore::new(&config.key_dir);
    let created = tokio::task::spawn_blocking(move || store.setup_keys()).await??;
    if !created.is_empty() {
        tracing::info!(
            key_dir = %config.key_dir.display(),
            generated = ?created,
            "provisioned missing keypairs"
        );
    }

    let state = Arc::new(GatewayState::new(&config)?);
    let app = create_router(state);

    let listener = TcpListener::bind(config.listen).await?;
    tracing::info!(
        listen = %listener.local_addr()?,
        financial = %config.financial_url,
        nlp = %config.nlp_url,
        analytics = %config.analytics_url,
        "gateway listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

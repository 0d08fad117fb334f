//! Immutable per-gateway context handed to the router

use finguard_crypto::keys::{load_public_key, KeyError};
use finguard_crypto::{KeySlot, KeyStore, RsaPrivateKey, RsaPublicKey};
use std::path::{Path, PathBuf};

use crate::config::GatewayConfig;
use crate::upstream::UpstreamClient;

/// Key material one gateway instance works with.
///
/// The gateway keypair is loaded once. The client public key is re-read
/// from disk for every response, so replacing that file takes effect
/// without a restart.
pub struct GatewayKeys {
    gateway_private: RsaPrivateKey,
    gateway_public_pem: String,
    client_public_path: PathBuf,
}

impl GatewayKeys {
    pub fn load(store: &KeyStore) -> Result<Self, KeyError> {
        store.verify_pair(KeySlot::Gateway)?;
        let gateway_private = store.load_private_key(KeySlot::Gateway)?;
        let gateway_public_pem = store.read_public_pem(KeySlot::Gateway)?;

        Ok(Self {
            gateway_private,
            gateway_public_pem,
            client_public_path: store.public_key_path(KeySlot::Client),
        })
    }

    pub fn gateway_private_key(&self) -> &RsaPrivateKey {
        &self.gateway_private
    }

    /// PEM served by `GET /api/public-key`
    pub fn gateway_public_pem(&self) -> &str {
        &self.gateway_public_pem
    }

    pub fn client_public_path(&self) -> &Path {
        &self.client_public_path
    }

    pub fn load_client_public_key(&self) -> Result<RsaPublicKey, KeyError> {
        load_public_key(&self.client_public_path)
    }
}

pub struct GatewayState {
    pub keys: GatewayKeys,
    pub upstream: UpstreamClient,
    pub max_body_bytes: usize,
}

impl GatewayState {
    /// Build state from already-provisioned key files; does not generate keys
    pub fn new(config: &GatewayConfig) -> anyhow::Result<Self> {
        let store = KeyStore::new(&config.key_dir);
        let keys = GatewayKeys::load(&store)?;
        let upstream = UpstreamClient::new(config)?;
        Ok(Self {
            keys,
            upstream,
            max_body_bytes: config.max_body_bytes,
        })
    }
}

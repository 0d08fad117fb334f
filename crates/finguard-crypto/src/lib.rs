//! FinGuard Crypto - end-to-end envelope encryption
//!
//! This crate provides:
//! - RSA-2048 keypair generation, PEM persistence and loading
//! - AES-256-CBC / PKCS7 bulk encryption
//! - The hybrid RSA-OAEP + AES envelope spoken between clients and the gateway

pub mod cipher;
pub mod envelope;
pub mod keys;

pub use envelope::{open, open_value, seal, seal_value, Envelope, EnvelopeError};
pub use keys::{KeyError, KeyPair, KeySlot, KeyStore};

pub use rsa::{RsaPrivateKey, RsaPublicKey};

//! RSA key management
//!
//! Two keypairs live on disk as PEM files under one key directory: the
//! gateway's (its public half is handed to clients) and the client's (its
//! public half is what the gateway encrypts responses to). Files are
//! generated once when missing and only ever read afterwards.

use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;
use thiserror::Error;
use zeroize::Zeroizing;

/// RSA modulus size in bits
pub const RSA_KEY_BITS: usize = 2048;
/// RSA public exponent (F4)
pub const RSA_PUBLIC_EXPONENT: u32 = 65537;

/// Serializes `setup_keys` within the process.
static SETUP_LOCK: Mutex<()> = Mutex::new(());

#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Failed to read key file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid key material in {origin}: {reason}")]
    Parse { origin: String, reason: String },

    #[error("Failed to write key file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Key generation failed: {0}")]
    Generation(String),

    #[error("Key encoding failed: {0}")]
    Encoding(String),
}

/// Which party a keypair belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeySlot {
    Gateway,
    Client,
}

impl KeySlot {
    pub const ALL: [KeySlot; 2] = [KeySlot::Gateway, KeySlot::Client];

    pub fn name(&self) -> &'static str {
        match self {
            KeySlot::Gateway => "gateway",
            KeySlot::Client => "client",
        }
    }
}

impl fmt::Display for KeySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for KeySlot {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gateway" => Ok(KeySlot::Gateway),
            "client" => Ok(KeySlot::Client),
            other => Err(format!("unknown key slot '{}' (expected gateway or client)", other)),
        }
    }
}

/// An RSA-2048 keypair
pub struct KeyPair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl KeyPair {
    /// Generate a fresh keypair with the fixed modulus size and exponent
    pub fn generate() -> Result<Self, KeyError> {
        let mut rng = rand::rngs::OsRng;
        let private = RsaPrivateKey::new_with_exp(
            &mut rng,
            RSA_KEY_BITS,
            &BigUint::from(RSA_PUBLIC_EXPONENT),
        )
        .map_err(|e| KeyError::Generation(e.to_string()))?;
        let public = RsaPublicKey::from(&private);
        Ok(Self { private, public })
    }

    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    /// Unencrypted PKCS#8 PEM (`BEGIN PRIVATE KEY`)
    pub fn private_pem(&self) -> Result<Zeroizing<String>, KeyError> {
        self.private
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| KeyError::Encoding(e.to_string()))
    }

    /// SubjectPublicKeyInfo PEM (`BEGIN PUBLIC KEY`)
    pub fn public_pem(&self) -> Result<String, KeyError> {
        self.public
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| KeyError::Encoding(e.to_string()))
    }
}

/// Generate a fresh RSA-2048 keypair
pub fn generate_keypair() -> Result<KeyPair, KeyError> {
    KeyPair::generate()
}

fn read_pem(path: &Path) -> Result<Zeroizing<String>, KeyError> {
    fs::read_to_string(path)
        .map(Zeroizing::new)
        .map_err(|source| KeyError::Read {
            path: path.to_path_buf(),
            source,
        })
}

/// Parse a private key from PEM text.
///
/// PKCS#8 is what `setup_keys` writes; legacy PKCS#1 (`BEGIN RSA PRIVATE
/// KEY`) is accepted as well.
pub fn private_key_from_pem(pem: &str, origin: &str) -> Result<RsaPrivateKey, KeyError> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|pkcs8_err| {
            RsaPrivateKey::from_pkcs1_pem(pem).map_err(|_| KeyError::Parse {
                origin: origin.to_string(),
                reason: pkcs8_err.to_string(),
            })
        })
}

/// Parse a SubjectPublicKeyInfo public key from PEM text
pub fn public_key_from_pem(pem: &str, origin: &str) -> Result<RsaPublicKey, KeyError> {
    RsaPublicKey::from_public_key_pem(pem).map_err(|e| KeyError::Parse {
        origin: origin.to_string(),
        reason: e.to_string(),
    })
}

/// Load a private key from a PEM file
pub fn load_private_key(path: &Path) -> Result<RsaPrivateKey, KeyError> {
    let pem = read_pem(path)?;
    private_key_from_pem(&pem, &path.display().to_string())
}

/// Load a public key from a PEM file
pub fn load_public_key(path: &Path) -> Result<RsaPublicKey, KeyError> {
    let pem = read_pem(path)?;
    public_key_from_pem(&pem, &path.display().to_string())
}

/// The on-disk home of both keypairs.
///
/// File names inside the directory are fixed:
/// `{gateway,client}_{private,public}_key.pem`.
#[derive(Debug, Clone)]
pub struct KeyStore {
    dir: PathBuf,
}

impl KeyStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn private_key_path(&self, slot: KeySlot) -> PathBuf {
        self.dir.join(format!("{}_private_key.pem", slot.name()))
    }

    pub fn public_key_path(&self, slot: KeySlot) -> PathBuf {
        self.dir.join(format!("{}_public_key.pem", slot.name()))
    }

    fn is_complete(&self, slot: KeySlot) -> bool {
        self.private_key_path(slot).exists() && self.public_key_path(slot).exists()
    }

    /// Make sure both keypairs exist on disk.
    ///
    /// A slot is regenerated only when one of its two files is missing;
    /// existing files are never touched. Returns the slots that were
    /// generated by this call.
    ///
    /// Concurrent calls within one process are serialized. Across processes
    /// there is no lock: a freshly written slot is read back and checked
    /// with [`KeyStore::verify_pair`], so a setup racing another process
    /// fails instead of leaving mismatched halves behind silently.
    pub fn setup_keys(&self) -> Result<Vec<KeySlot>, KeyError> {
        let _guard = SETUP_LOCK.lock().unwrap_or_else(|e| e.into_inner());

        fs::create_dir_all(&self.dir).map_err(|source| KeyError::Write {
            path: self.dir.clone(),
            source,
        })?;

        let mut generated = Vec::new();
        for slot in KeySlot::ALL {
            if self.is_complete(slot) {
                continue;
            }

            tracing::info!(slot = %slot, dir = %self.dir.display(), "generating RSA keypair");
            let pair = KeyPair::generate()?;
            self.write_keypair(slot, &pair)?;
            self.verify_pair(slot)?;
            generated.push(slot);
        }

        Ok(generated)
    }

    fn write_keypair(&self, slot: KeySlot, pair: &KeyPair) -> Result<(), KeyError> {
        let private_pem = pair.private_pem()?;
        let public_pem = pair.public_pem()?;

        // Private first: a pair is only considered present once both exist
        self.write_atomic(&self.private_key_path(slot), private_pem.as_bytes(), false)?;
        self.write_atomic(&self.public_key_path(slot), public_pem.as_bytes(), true)?;
        Ok(())
    }

    fn write_atomic(&self, path: &Path, contents: &[u8], world_readable: bool) -> Result<(), KeyError> {
        let write_err = |source: io::Error| KeyError::Write {
            path: path.to_path_buf(),
            source,
        };

        // Temp files are created 0600, which is what private keys want
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir).map_err(write_err)?;
        tmp.write_all(contents).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;

        #[cfg(unix)]
        if world_readable {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o644)).map_err(write_err)?;
        }
        #[cfg(not(unix))]
        let _ = world_readable;

        tmp.persist(path).map_err(|e| write_err(e.error))?;
        Ok(())
    }

    pub fn load_private_key(&self, slot: KeySlot) -> Result<RsaPrivateKey, KeyError> {
        load_private_key(&self.private_key_path(slot))
    }

    pub fn load_public_key(&self, slot: KeySlot) -> Result<RsaPublicKey, KeyError> {
        load_public_key(&self.public_key_path(slot))
    }

    /// Check that a slot's public key file belongs to its private key file
    pub fn verify_pair(&self, slot: KeySlot) -> Result<(), KeyError> {
        let private = self.load_private_key(slot)?;
        let public = self.load_public_key(slot)?;
        if RsaPublicKey::from(&private) != public {
            return Err(KeyError::Parse {
                origin: self.public_key_path(slot).display().to_string(),
                reason: format!("{} public key does not match the private key", slot),
            });
        }
        Ok(())
    }

    /// PEM text of a slot's public key, validated before it is returned
    pub fn read_public_pem(&self, slot: KeySlot) -> Result<String, KeyError> {
        let path = self.public_key_path(slot);
        let pem = read_pem(&path)?;
        public_key_from_pem(&pem, &path.display().to_string())?;
        Ok(pem.to_string())
    }
}

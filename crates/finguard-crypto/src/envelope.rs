//! Hybrid encryption envelope
//!
//! A payload is serialized to JSON, encrypted with a one-time AES-256-CBC
//! key, and that key is wrapped with RSA-OAEP (SHA-256, MGF1-SHA-256, no
//! label) under the recipient's public key. All three parts travel as
//! standard base64:
//!
//! ```json
//! { "encrypted_data": "...", "encrypted_key": "...", "iv": "..." }
//! ```
//!
//! Each call to [`seal`] draws a fresh AES key and IV, so envelopes are
//! never reused.

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use rand::rngs::OsRng;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::cipher::{self, IV_SIZE, KEY_SIZE};

pub const FIELD_ENCRYPTED_DATA: &str = "encrypted_data";
pub const FIELD_ENCRYPTED_KEY: &str = "encrypted_key";
pub const FIELD_IV: &str = "iv";

#[derive(Error, Debug)]
pub enum EnvelopeError {
    /// A field is missing, not a string, not base64, or the wrong size.
    #[error("Invalid envelope: {0}")]
    Format(String),

    /// Every failure past decoding collapses into this one variant so the
    /// caller cannot tell which step rejected the envelope.
    #[error("Decryption failed")]
    Decryption,

    #[error("Encryption failed: {0}")]
    Encryption(String),
}

/// The three-field wire structure carrying one encrypted payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// AES-256-CBC ciphertext of the PKCS7-padded JSON payload
    pub encrypted_data: String,
    /// The AES key, RSA-OAEP encrypted under the recipient's public key
    pub encrypted_key: String,
    /// The 16-byte CBC IV, in the clear
    pub iv: String,
}

impl Envelope {
    /// Pull the three fields out of an arbitrary JSON body.
    ///
    /// Unlike plain deserialization this names the offending field, which
    /// is what ends up in the gateway's 400 response.
    pub fn from_value(value: &Value) -> Result<Self, EnvelopeError> {
        let obj = value
            .as_object()
            .ok_or_else(|| EnvelopeError::Format("body must be a JSON object".to_string()))?;

        let field = |name: &str| -> Result<String, EnvelopeError> {
            match obj.get(name) {
                Some(Value::String(s)) => Ok(s.clone()),
                Some(_) => Err(EnvelopeError::Format(format!("field '{}' must be a string", name))),
                None => Err(EnvelopeError::Format(format!("missing field '{}'", name))),
            }
        };

        Ok(Self {
            encrypted_data: field(FIELD_ENCRYPTED_DATA)?,
            encrypted_key: field(FIELD_ENCRYPTED_KEY)?,
            iv: field(FIELD_IV)?,
        })
    }

    fn decode(&self) -> Result<DecodedEnvelope, EnvelopeError> {
        let decode_field = |name: &str, data: &str| {
            B64.decode(data.as_bytes())
                .map_err(|_| EnvelopeError::Format(format!("field '{}' is not valid base64", name)))
        };

        let ciphertext = decode_field(FIELD_ENCRYPTED_DATA, &self.encrypted_data)?;
        let wrapped_key = decode_field(FIELD_ENCRYPTED_KEY, &self.encrypted_key)?;
        let iv = decode_field(FIELD_IV, &self.iv)?;

        let iv: [u8; IV_SIZE] = iv.as_slice().try_into().map_err(|_| {
            EnvelopeError::Format(format!("field '{}' must decode to {} bytes", FIELD_IV, IV_SIZE))
        })?;

        Ok(DecodedEnvelope {
            ciphertext,
            wrapped_key,
            iv,
        })
    }
}

struct DecodedEnvelope {
    ciphertext: Vec<u8>,
    wrapped_key: Vec<u8>,
    iv: [u8; IV_SIZE],
}

fn oaep() -> Oaep {
    Oaep::new::<Sha256>()
}

/// Encrypt `payload` for the holder of `recipient`'s private key
pub fn seal<T: Serialize + ?Sized>(
    payload: &T,
    recipient: &RsaPublicKey,
) -> Result<Envelope, EnvelopeError> {
    let plaintext = Zeroizing::new(
        serde_json::to_vec(payload).map_err(|e| EnvelopeError::Encryption(e.to_string()))?,
    );

    let key = cipher::generate_key();
    let iv = cipher::generate_iv();

    let ciphertext = cipher::encrypt(key.as_ref(), &iv, &plaintext)
        .map_err(|e| EnvelopeError::Encryption(e.to_string()))?;

    let wrapped_key = recipient
        .encrypt(&mut OsRng, oaep(), key.as_ref())
        .map_err(|e| EnvelopeError::Encryption(format!("rsa-oaep: {}", e)))?;

    Ok(Envelope {
        encrypted_data: B64.encode(ciphertext),
        encrypted_key: B64.encode(wrapped_key),
        iv: B64.encode(iv),
    })
}

/// Decrypt an envelope addressed to `recipient` and deserialize its payload
pub fn open<T: DeserializeOwned>(
    envelope: &Envelope,
    recipient: &RsaPrivateKey,
) -> Result<T, EnvelopeError> {
    let decoded = envelope.decode()?;

    let key = Zeroizing::new(
        recipient
            .decrypt(oaep(), &decoded.wrapped_key)
            .map_err(|_| EnvelopeError::Decryption)?,
    );
    if key.len() != KEY_SIZE {
        return Err(EnvelopeError::Decryption);
    }

    let plaintext = cipher::decrypt(&key, &decoded.iv, &decoded.ciphertext)
        .map_err(|_| EnvelopeError::Decryption)?;

    let text = std::str::from_utf8(&plaintext).map_err(|_| EnvelopeError::Decryption)?;
    serde_json::from_str(text).map_err(|_| EnvelopeError::Decryption)
}

/// [`seal`] for an already-built JSON value
pub fn seal_value(payload: &Value, recipient: &RsaPublicKey) -> Result<Envelope, EnvelopeError> {
    seal(payload, recipient)
}

/// [`open`] into a JSON value
pub fn open_value(envelope: &Envelope, recipient: &RsaPrivateKey) -> Result<Value, EnvelopeError> {
    open(envelope, recipient)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyPair;
    use serde_json::json;
    use std::sync::OnceLock;

    fn alice() -> &'static KeyPair {
        static KEYS: OnceLock<KeyPair> = OnceLock::new();
        KEYS.get_or_init(|| KeyPair::generate().unwrap())
    }

    fn bob() -> &'static KeyPair {
        static KEYS: OnceLock<KeyPair> = OnceLock::new();
        KEYS.get_or_init(|| KeyPair::generate().unwrap())
    }

    fn flip_bit(field: &str, byte: usize, bit: u8) -> String {
        let mut raw = B64.decode(field).unwrap();
        raw[byte] ^= 1 << bit;
        B64.encode(raw)
    }

    #[test]
    fn test_roundtrip_preserves_json() {
        let payloads = [
            json!({"user_id": "uid1"}),
            json!({
                "user_id": "uid1",
                "simulation_data": {"years": 10, "monthly": 250.75, "risk": null, "tickers": ["AAPL", "MSFT"]},
                "flag": true,
                "note": "ünïcödé ✓ \"quoted\""
            }),
            json!([1, 2, 3]),
            json!("just a string"),
            json!(null),
            json!({}),
        ];

        for payload in payloads {
            let envelope = seal_value(&payload, alice().public_key()).unwrap();
            let opened = open_value(&envelope, alice().private_key()).unwrap();
            assert_eq!(opened, payload);
        }
    }

    #[test]
    fn test_roundtrip_typed() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Query {
            user_id: String,
            query: String,
        }

        let query = Query {
            user_id: "uid1".into(),
            query: "Should I buy index funds?".into(),
        };
        let envelope = seal(&query, alice().public_key()).unwrap();
        let opened: Query = open(&envelope, alice().private_key()).unwrap();
        assert_eq!(opened, query);
    }

    #[test]
    fn test_envelope_shape() {
        let envelope = seal_value(&json!({"balance": 1000}), alice().public_key()).unwrap();

        assert_eq!(B64.decode(&envelope.iv).unwrap().len(), IV_SIZE);
        assert_eq!(B64.decode(&envelope.encrypted_key).unwrap().len(), 256);
        assert_eq!(B64.decode(&envelope.encrypted_data).unwrap().len() % 16, 0);

        let wire = serde_json::to_value(&envelope).unwrap();
        let obj = wire.as_object().unwrap();
        assert_eq!(obj.len(), 3);
        assert!(obj.contains_key("encrypted_data"));
        assert!(obj.contains_key("encrypted_key"));
        assert!(obj.contains_key("iv"));
    }

    #[test]
    fn test_fresh_randomness_per_call() {
        let payload = json!({"user_id": "uid1"});
        let first = seal_value(&payload, alice().public_key()).unwrap();
        let second = seal_value(&payload, alice().public_key()).unwrap();

        assert_ne!(first.encrypted_data, second.encrypted_data);
        assert_ne!(first.encrypted_key, second.encrypted_key);
        assert_ne!(first.iv, second.iv);
    }

    #[test]
    fn test_wrong_key_fails() {
        let payload = json!({"user_id": "uid1", "query": "retirement plan"});
        for _ in 0..4 {
            let envelope = seal_value(&payload, alice().public_key()).unwrap();
            let result = open_value(&envelope, bob().private_key());
            assert!(matches!(result, Err(EnvelopeError::Decryption)));
        }
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let payload = json!({"user_id": "uid1", "simulation_data": {"years": 10, "amount": 5000}});
        let envelope = seal_value(&payload, alice().public_key()).unwrap();
        let data_len = B64.decode(&envelope.encrypted_data).unwrap().len();

        for byte in [0, 7, 15, 16, data_len / 2, data_len - 17, data_len - 1] {
            let mut tampered = envelope.clone();
            tampered.encrypted_data = flip_bit(&envelope.encrypted_data, byte, 0);
            assert!(
                open_value(&tampered, alice().private_key()).is_err(),
                "flip at byte {} went unnoticed",
                byte
            );
        }
    }

    #[test]
    fn test_tampered_key_fails() {
        let envelope = seal_value(&json!({"user_id": "uid1"}), alice().public_key()).unwrap();

        for (byte, bit) in [(0, 0), (1, 7), (128, 3), (255, 0)] {
            let mut tampered = envelope.clone();
            tampered.encrypted_key = flip_bit(&envelope.encrypted_key, byte, bit);
            assert!(matches!(
                open_value(&tampered, alice().private_key()),
                Err(EnvelopeError::Decryption)
            ));
        }
    }

    #[test]
    fn test_decryption_errors_are_uniform() {
        let envelope = seal_value(&json!({"user_id": "uid1"}), alice().public_key()).unwrap();

        let mut bad_key = envelope.clone();
        bad_key.encrypted_key = flip_bit(&envelope.encrypted_key, 10, 1);

        let mut bad_padding = envelope.clone();
        let raw = B64.decode(&envelope.encrypted_data).unwrap();
        bad_padding.encrypted_data = B64.encode(&raw[..raw.len() - 1]);

        let wrong_recipient = seal_value(&json!({"user_id": "uid1"}), bob().public_key()).unwrap();

        let messages: Vec<String> = [bad_key, bad_padding, wrong_recipient]
            .iter()
            .map(|e| open_value(e, alice().private_key()).unwrap_err().to_string())
            .collect();

        assert!(messages.iter().all(|m| m == "Decryption failed"));
    }

    #[test]
    fn test_non_json_plaintext_fails() {
        // Hand-build an envelope around bytes that are not JSON
        let key = cipher::generate_key();
        let iv = cipher::generate_iv();
        let ciphertext = cipher::encrypt(key.as_ref(), &iv, b"not json at all").unwrap();
        let wrapped = alice()
            .public_key()
            .encrypt(&mut OsRng, oaep(), key.as_ref())
            .unwrap();
        let envelope = Envelope {
            encrypted_data: B64.encode(ciphertext),
            encrypted_key: B64.encode(wrapped),
            iv: B64.encode(iv),
        };

        assert!(matches!(
            open_value(&envelope, alice().private_key()),
            Err(EnvelopeError::Decryption)
        ));
    }

    #[test]
    fn test_short_aes_key_fails() {
        let iv = cipher::generate_iv();
        let wrapped = alice()
            .public_key()
            .encrypt(&mut OsRng, oaep(), &[7u8; 16])
            .unwrap();
        let envelope = Envelope {
            encrypted_data: B64.encode([0u8; 16]),
            encrypted_key: B64.encode(wrapped),
            iv: B64.encode(iv),
        };

        assert!(matches!(
            open_value(&envelope, alice().private_key()),
            Err(EnvelopeError::Decryption)
        ));
    }

    #[test]
    fn test_bad_base64_is_format_error() {
        let envelope = seal_value(&json!({"user_id": "uid1"}), alice().public_key()).unwrap();

        let mut bad = envelope.clone();
        bad.encrypted_key = "%%% not base64 %%%".to_string();
        let err = open_value(&bad, alice().private_key()).unwrap_err();
        assert!(matches!(err, EnvelopeError::Format(ref m) if m.contains("encrypted_key")));

        let mut bad_iv = envelope.clone();
        bad_iv.iv = B64.encode([0u8; 8]);
        let err = open_value(&bad_iv, alice().private_key()).unwrap_err();
        assert!(matches!(err, EnvelopeError::Format(ref m) if m.contains("iv")));
    }

    #[test]
    fn test_from_value_names_missing_field() {
        let err = Envelope::from_value(&json!({"encrypted_data": "AA==", "iv": "AA=="})).unwrap_err();
        assert_eq!(err.to_string(), "Invalid envelope: missing field 'encrypted_key'");

        let err = Envelope::from_value(&json!({
            "encrypted_data": "AA==", "encrypted_key": 5, "iv": "AA=="
        }))
        .unwrap_err();
        assert_eq!(err.to_string(), "Invalid envelope: field 'encrypted_key' must be a string");

        assert!(Envelope::from_value(&json!([1, 2])).is_err());

        let ok = Envelope::from_value(&json!({
            "encrypted_data": "AA==", "encrypted_key": "AQ==", "iv": "Ag==", "extra": 1
        }))
        .unwrap();
        assert_eq!(ok.iv, "Ag==");
    }
}

//! AES-256-CBC with PKCS7 padding
//!
//! This is the bulk layer of the envelope. The key and IV are always
//! supplied by the caller: the envelope generates both fresh for every
//! payload and ships the IV alongside the ciphertext.

use aes::Aes256;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;
use zeroize::Zeroizing;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// 256-bit key (32 bytes)
pub const KEY_SIZE: usize = 32;
/// 128-bit IV (16 bytes), one AES block
pub const IV_SIZE: usize = 16;
/// AES block size; ciphertext is always a multiple of this
pub const BLOCK_SIZE: usize = 16;

#[derive(Error, Debug)]
pub enum CipherError {
    #[error("Decryption failed - data may be corrupted or tampered")]
    DecryptionFailed,

    #[error("Invalid key size: expected {KEY_SIZE}, got {0}")]
    InvalidKeySize(usize),

    #[error("Invalid IV size: expected {IV_SIZE}, got {0}")]
    InvalidIvSize(usize),
}

/// Generate a cryptographically secure random key
pub fn generate_key() -> Zeroizing<[u8; KEY_SIZE]> {
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    OsRng.fill_bytes(key.as_mut());
    key
}

/// Generate a cryptographically secure random IV
pub fn generate_iv() -> [u8; IV_SIZE] {
    let mut iv = [0u8; IV_SIZE];
    OsRng.fill_bytes(&mut iv);
    iv
}

fn check_sizes(key: &[u8], iv: &[u8]) -> Result<(), CipherError> {
    if key.len() != KEY_SIZE {
        return Err(CipherError::InvalidKeySize(key.len()));
    }
    if iv.len() != IV_SIZE {
        return Err(CipherError::InvalidIvSize(iv.len()));
    }
    Ok(())
}

/// PKCS7-pad and encrypt `plaintext` with AES-256-CBC.
///
/// The output length is the padded length: always a non-zero multiple of
/// [`BLOCK_SIZE`], with a full padding block when the input is aligned.
pub fn encrypt(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
    check_sizes(key, iv)?;

    let cipher = Aes256CbcEnc::new_from_slices(key, iv)
        .map_err(|_| CipherError::InvalidKeySize(key.len()))?;

    Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

/// Decrypt AES-256-CBC ciphertext and strip PKCS7 padding.
///
/// A ciphertext that is empty, not block-aligned, or whose final block does
/// not carry valid padding all fail the same way.
pub fn decrypt(
    key: &[u8],
    iv: &[u8],
    ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CipherError> {
    check_sizes(key, iv)?;

    let cipher = Aes256CbcDec::new_from_slices(key, iv)
        .map_err(|_| CipherError::InvalidKeySize(key.len()))?;

    let plaintext = cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CipherError::DecryptionFailed)?;

    Ok(Zeroizing::new(plaintext))
}

//! AES-256-GCM primitives behind the barrier.
//!
//! Blob layout: `nonce (12 bytes) || ciphertext || tag (16 bytes)`. Every call
//! to [`encrypt`] draws a fresh nonce from the OS CSPRNG.

use std::fmt;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::CryptoError;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;

/// The store's 256-bit master key. Zeroized on drop, redacted in `Debug`.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl EncryptionKey {
    /// Wrap raw key bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Draw a fresh key from the OS CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        let generated = Aes256Gcm::generate_key(OsRng);
        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(&generated);
        Self(bytes)
    }

    /// Decode an operator-supplied key (standard base64, 32 bytes).
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKey`] if the input is not base64 or does
    /// not decode to exactly 32 bytes.
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let decoded = Zeroizing::new(STANDARD.decode(encoded.trim()).map_err(|e| {
            CryptoError::InvalidKey {
                reason: format!("not valid base64: {e}"),
            }
        })?);
        let bytes: [u8; KEY_LEN] =
            decoded
                .as_slice()
                .try_into()
                .map_err(|_| CryptoError::InvalidKey {
                    reason: format!("expected {KEY_LEN} bytes, got {}", decoded.len()),
                })?;
        Ok(Self(bytes))
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.0))
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey([REDACTED])")
    }
}

/// Encrypt `plaintext` under `key` with a fresh nonce.
///
/// # Errors
///
/// Returns [`CryptoError::Encryption`] if the AEAD rejects the input.
pub fn encrypt(key: &EncryptionKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let sealed = key
        .cipher()
        .encrypt(&nonce, plaintext)
        .map_err(|e| CryptoError::Encryption {
            reason: e.to_string(),
        })?;

    let mut blob = Vec::with_capacity(NONCE_LEN.saturating_add(sealed.len()));
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&sealed);
    Ok(blob)
}

/// Decrypt a blob produced by [`encrypt`].
///
/// # Errors
///
/// - [`CryptoError::CiphertextTooShort`] if `blob` cannot hold a nonce and tag.
/// - [`CryptoError::Decryption`] if authentication fails.
pub fn decrypt(key: &EncryptionKey, blob: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let min = NONCE_LEN + TAG_LEN;
    if blob.len() < min {
        return Err(CryptoError::CiphertextTooShort {
            expected: min,
            actual: blob.len(),
        });
    }

    let (nonce, sealed) = blob.split_at(NONCE_LEN);
    key.cipher()
        .decrypt(Nonce::from_slice(nonce), sealed)
        .map_err(|e| CryptoError::Decryption {
            reason: e.to_string(),
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_under_same_key() {
        let key = EncryptionKey::generate();
        let blob = encrypt(&key, b"db-password record").unwrap();
        assert_eq!(decrypt(&key, &blob).unwrap(), b"db-password record");
    }

    #[test]
    fn other_key_cannot_decrypt() {
        let blob = encrypt(&EncryptionKey::generate(), b"x").unwrap();
        let result = decrypt(&EncryptionKey::generate(), &blob);
        assert!(matches!(result, Err(CryptoError::Decryption { .. })));
    }

    #[test]
    fn flipped_byte_fails_authentication() {
        let key = EncryptionKey::generate();
        let mut blob = encrypt(&key, b"record").unwrap();
        if let Some(last) = blob.last_mut() {
            *last ^= 0x01;
        }
        assert!(matches!(
            decrypt(&key, &blob),
            Err(CryptoError::Decryption { .. })
        ));
    }

    #[test]
    fn short_blob_is_rejected_before_decrypting() {
        let key = EncryptionKey::generate();
        assert!(matches!(
            decrypt(&key, &[0u8; 5]),
            Err(CryptoError::CiphertextTooShort {
                expected: 28,
                actual: 5
            })
        ));
    }

    #[test]
    fn same_plaintext_encrypts_differently() {
        let key = EncryptionKey::generate();
        assert_ne!(encrypt(&key, b"same").unwrap(), encrypt(&key, b"same").unwrap());
    }

    #[test]
    fn base64_key_must_be_32_bytes() {
        let good = STANDARD.encode([7u8; 32]);
        assert!(EncryptionKey::from_base64(&good).is_ok());

        let short = STANDARD.encode([7u8; 16]);
        assert!(matches!(
            EncryptionKey::from_base64(&short),
            Err(CryptoError::InvalidKey { .. })
        ));
        assert!(matches!(
            EncryptionKey::from_base64("%%%"),
            Err(CryptoError::InvalidKey { .. })
        ));
    }

    #[test]
    fn debug_hides_key_bytes() {
        let key = EncryptionKey::from_bytes([0xAB; 32]);
        let shown = format!("{key:?}");
        assert!(shown.contains("REDACTED"));
        assert!(!shown.contains("171"));
    }
}

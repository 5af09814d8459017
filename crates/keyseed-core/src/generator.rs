//! Credential-grade random tokens.
//!
//! A token is [`TOKEN_ENTROPY_BYTES`] bytes from the OS CSPRNG encoded as
//! base64url without padding: 64 characters from `[A-Za-z0-9_-]`, usable as
//! a bearer credential, in URLs, and in file paths without escaping.

use aes_gcm::aead::OsRng;
use aes_gcm::aead::rand_core::RngCore;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use zeroize::Zeroizing;

use crate::error::GeneratorError;
use crate::secret::SecretValue;

/// Bytes of entropy per generated token (384 bits).
pub const TOKEN_ENTROPY_BYTES: usize = 48;

/// Length of an encoded token.
pub const TOKEN_LEN: usize = 64;

/// Produces fresh secret values.
pub trait SecretGenerator: Send + Sync {
    /// Generate one token.
    ///
    /// # Errors
    ///
    /// Returns [`GeneratorError::EntropySourceUnavailable`] if the random
    /// source fails. Callers treat this as fatal.
    fn generate(&self) -> Result<SecretValue, GeneratorError>;
}

/// The production generator, backed by the operating system's CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsRngGenerator;

impl SecretGenerator for OsRngGenerator {
    fn generate(&self) -> Result<SecretValue, GeneratorError> {
        generate_token_from(&mut OsRng)
    }
}

/// Generate a token from an arbitrary random source.
///
/// Uses the fallible fill so a broken source surfaces as an error instead
/// of a panic.
///
/// # Errors
///
/// Returns [`GeneratorError::EntropySourceUnavailable`] if `rng` fails.
pub fn generate_token_from<R: RngCore + ?Sized>(rng: &mut R) -> Result<SecretValue, GeneratorError> {
    let mut raw = Zeroizing::new([0u8; TOKEN_ENTROPY_BYTES]);
    rng.try_fill_bytes(raw.as_mut_slice())
        .map_err(|e| GeneratorError::EntropySourceUnavailable {
            reason: e.to_string(),
        })?;
    Ok(SecretValue::new(URL_SAFE_NO_PAD.encode(raw.as_slice())))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;
    use std::num::NonZeroU32;

    use aes_gcm::aead::rand_core;

    use super::*;

    struct BrokenSource;

    impl RngCore for BrokenSource {
        fn next_u32(&mut self) -> u32 {
            0
        }

        fn next_u64(&mut self) -> u64 {
            0
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            dest.fill(0);
        }

        fn try_fill_bytes(&mut self, _dest: &mut [u8]) -> Result<(), rand_core::Error> {
            let code = NonZeroU32::new(rand_core::Error::CUSTOM_START).unwrap();
            Err(rand_core::Error::from(code))
        }
    }

    #[test]
    fn token_is_64_url_safe_chars() {
        let token = OsRngGenerator.generate().unwrap();
        assert_eq!(token.len(), TOKEN_LEN);
        assert!(
            token
                .expose()
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        );
        assert!(!token.expose().contains('='));
    }

    #[test]
    fn token_decodes_to_48_bytes() {
        let token = OsRngGenerator.generate().unwrap();
        let raw = URL_SAFE_NO_PAD.decode(token.expose()).unwrap();
        assert_eq!(raw.len(), TOKEN_ENTROPY_BYTES);
    }

    #[test]
    fn tokens_do_not_repeat() {
        let seen: HashSet<String> = (0..256)
            .map(|_| OsRngGenerator.generate().unwrap().expose().to_owned())
            .collect();
        assert_eq!(seen.len(), 256);
    }

    #[test]
    fn broken_source_is_reported_not_papered_over() {
        let result = generate_token_from(&mut BrokenSource);
        assert!(matches!(
            result,
            Err(GeneratorError::EntropySourceUnavailable { .. })
        ));
    }
}

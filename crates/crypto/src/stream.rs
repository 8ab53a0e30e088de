//! Raw XChaCha20 keystream (20 rounds, unauthenticated).
//!
//! Encryption and decryption are the same XOR; callers that need integrity
//! must layer a signature or use [`crate::aead`] instead.

use chacha20::XChaCha20;
use chacha20::cipher::{KeyIvInit, StreamCipher};

use crate::CryptoError;

pub const KEY_SIZE: usize = 32;
pub const NONCE_SIZE: usize = 24;

/// XORs the XChaCha20 keystream into `data` in place.
pub fn apply(key: &[u8], nonce: &[u8], data: &mut [u8]) -> Result<(), CryptoError> {
    if key.len() != KEY_SIZE {
        return Err(CryptoError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual: key.len(),
        });
    }
    if nonce.len() != NONCE_SIZE {
        return Err(CryptoError::InvalidNonceLength {
            expected: NONCE_SIZE,
            actual: nonce.len(),
        });
    }
    let mut cipher = XChaCha20::new_from_slices(key, nonce).map_err(|_| {
        CryptoError::InvalidNonceLength {
            expected: NONCE_SIZE,
            actual: nonce.len(),
        }
    })?;
    cipher.apply_keystream(data);
    Ok(())
}

/// Convenience wrapper over [`apply`] that returns a new buffer.
pub fn encrypt(key: &[u8], nonce: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut out = plaintext.to_vec();
    apply(key, nonce, &mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_is_its_own_inverse() {
        let key = [3u8; KEY_SIZE];
        let nonce = [5u8; NONCE_SIZE];
        let ct = encrypt(&key, &nonce, b"stream me").unwrap();
        assert_ne!(ct, b"stream me");
        let pt = encrypt(&key, &nonce, &ct).unwrap();
        assert_eq!(pt, b"stream me");
    }

    #[test]
    fn different_nonce_different_stream() {
        let key = [3u8; KEY_SIZE];
        let a = encrypt(&key, &[0u8; NONCE_SIZE], b"stream me").unwrap();
        let b = encrypt(&key, &[1u8; NONCE_SIZE], b"stream me").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_bad_lengths() {
        let mut buf = [0u8; 4];
        assert!(apply(&[0u8; 31], &[0u8; NONCE_SIZE], &mut buf).is_err());
        assert!(apply(&[0u8; KEY_SIZE], &[0u8; 12], &mut buf).is_err());
    }
}

//! XChaCha20-Poly1305 authenticated encryption.

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};

use crate::CryptoError;

pub const KEY_SIZE: usize = 32;
pub const NONCE_SIZE: usize = 24;
pub const TAG_SIZE: usize = 16;

fn cipher(key: &[u8]) -> Result<XChaCha20Poly1305, CryptoError> {
    XChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength {
        expected: KEY_SIZE,
        actual: key.len(),
    })
}

fn check_nonce(nonce: &[u8]) -> Result<(), CryptoError> {
    if nonce.len() != NONCE_SIZE {
        return Err(CryptoError::InvalidNonceLength {
            expected: NONCE_SIZE,
            actual: nonce.len(),
        });
    }
    Ok(())
}

/// Encrypts and authenticates `plaintext`; the tag is appended to the
/// returned ciphertext.
pub fn seal(key: &[u8], nonce: &[u8], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
    check_nonce(nonce)?;
    cipher(key)?
        .encrypt(
            XNonce::from_slice(nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| CryptoError::Decryption)
}

/// Authenticates and decrypts a `seal` output. Any tampering with the key,
/// nonce, ciphertext or associated data fails the tag check.
pub fn open(key: &[u8], nonce: &[u8], ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
    check_nonce(nonce)?;
    cipher(key)?
        .decrypt(
            XNonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| CryptoError::Decryption)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; KEY_SIZE] = [7u8; KEY_SIZE];
    const NONCE: [u8; NONCE_SIZE] = [9u8; NONCE_SIZE];

    #[test]
    fn seal_open_roundtrip() {
        let ct = seal(&KEY, &NONCE, b"payload", b"aad").unwrap();
        assert_eq!(ct.len(), b"payload".len() + TAG_SIZE);
        let pt = open(&KEY, &NONCE, &ct, b"aad").unwrap();
        assert_eq!(pt, b"payload");
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let mut ct = seal(&KEY, &NONCE, b"payload", b"").unwrap();
        ct[0] ^= 0x01;
        assert!(matches!(
            open(&KEY, &NONCE, &ct, b""),
            Err(CryptoError::Decryption)
        ));
    }

    #[test]
    fn wrong_key_fails() {
        let ct = seal(&KEY, &NONCE, b"payload", b"").unwrap();
        let mut bad_key = KEY;
        bad_key[31] ^= 0xff;
        assert!(open(&bad_key, &NONCE, &ct, b"").is_err());
    }

    #[test]
    fn wrong_nonce_fails() {
        let ct = seal(&KEY, &NONCE, b"payload", b"").unwrap();
        let mut bad_nonce = NONCE;
        bad_nonce[0] ^= 0x01;
        assert!(open(&KEY, &bad_nonce, &ct, b"").is_err());
    }

    #[test]
    fn wrong_aad_fails() {
        let ct = seal(&KEY, &NONCE, b"payload", b"aad").unwrap();
        assert!(open(&KEY, &NONCE, &ct, b"axd").is_err());
    }

    #[test]
    fn bad_lengths_are_typed() {
        assert!(matches!(
            seal(&[0u8; 16], &NONCE, b"", b""),
            Err(CryptoError::InvalidKeyLength { expected: 32, .. })
        ));
        assert!(matches!(
            seal(&KEY, &[0u8; 12], b"", b""),
            Err(CryptoError::InvalidNonceLength { expected: 24, .. })
        ));
    }
}

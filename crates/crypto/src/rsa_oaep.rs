//! RSA-OAEP with SHA3-512 as both the label hash and the MGF1 digest.
//!
//! The modulus is fixed at 5120 bits; keys round-trip through PKCS#8 PEM for
//! key-file storage.

use rand::{CryptoRng, RngCore};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::Oaep;
use sha3::Sha3_512;

pub use rsa::{RsaPrivateKey, RsaPublicKey};

use crate::CryptoError;

pub const KEY_BITS: usize = 5120;

/// Generates a 5120-bit RSA keypair. This is expensive (seconds, not
/// milliseconds) and is expected to run once at provisioning time.
pub fn generate<R: RngCore + CryptoRng>(
    rng: &mut R,
) -> Result<(RsaPrivateKey, RsaPublicKey), CryptoError> {
    let private = RsaPrivateKey::new(rng, KEY_BITS)?;
    let public = RsaPublicKey::from(&private);
    Ok((private, public))
}

pub fn encrypt<R: RngCore + CryptoRng>(
    rng: &mut R,
    key: &RsaPublicKey,
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    Ok(key.encrypt(rng, Oaep::new::<Sha3_512>(), plaintext)?)
}

pub fn decrypt(key: &RsaPrivateKey, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    Ok(key.decrypt(Oaep::new::<Sha3_512>(), ciphertext)?)
}

pub fn private_key_to_pem(key: &RsaPrivateKey) -> Result<String, CryptoError> {
    key.to_pkcs8_pem(LineEnding::LF)
        .map(|pem| pem.to_string())
        .map_err(|e| CryptoError::KeyEncoding(e.to_string()))
}

pub fn private_key_from_pem(pem: &str) -> Result<RsaPrivateKey, CryptoError> {
    RsaPrivateKey::from_pkcs8_pem(pem).map_err(|e| CryptoError::KeyEncoding(e.to_string()))
}

pub fn public_key_to_pem(key: &RsaPublicKey) -> Result<String, CryptoError> {
    key.to_public_key_pem(LineEnding::LF)
        .map_err(|e| CryptoError::KeyEncoding(e.to_string()))
}

pub fn public_key_from_pem(pem: &str) -> Result<RsaPublicKey, CryptoError> {
    RsaPublicKey::from_public_key_pem(pem).map_err(|e| CryptoError::KeyEncoding(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;
    use std::sync::LazyLock;

    // Keygen at this modulus size is slow; share one pair across the tests.
    static KEYS: LazyLock<(RsaPrivateKey, RsaPublicKey)> =
        LazyLock::new(|| generate(&mut OsRng).unwrap());

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let (private, public) = &*KEYS;
        let ct = encrypt(&mut OsRng, public, b"ephemeral symmetric key").unwrap();
        let pt = decrypt(private, &ct).unwrap();
        assert_eq!(pt, b"ephemeral symmetric key");
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let (private, public) = &*KEYS;
        let mut ct = encrypt(&mut OsRng, public, b"secret").unwrap();
        ct[0] ^= 0x01;
        assert!(decrypt(private, &ct).is_err());
    }

    #[test]
    fn pem_roundtrip() {
        let (private, public) = &*KEYS;
        let private_pem = private_key_to_pem(private).unwrap();
        let restored = private_key_from_pem(&private_pem).unwrap();
        assert_eq!(&restored, private);

        let public_pem = public_key_to_pem(public).unwrap();
        let restored_pub = public_key_from_pem(&public_pem).unwrap();
        assert_eq!(&restored_pub, public);
    }
}

//! Digests and password-grade key derivation.

use argon2::{Algorithm, Argon2, Params, Version};
use sha2::{Digest, Sha256, Sha512};

use crate::CryptoError;

pub const ARGON2ID_TIME_COST: u32 = 1;
pub const ARGON2ID_MEMORY_KIB: u32 = 64 * 1024;
pub const ARGON2ID_LANES: u32 = 4;
pub const ARGON2ID_OUTPUT_LEN: usize = 32;

pub fn sha256(data: &[u8]) -> [u8; 32] {
    let digest = Sha256::digest(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

pub fn sha512(data: &[u8]) -> [u8; 64] {
    let digest = Sha512::digest(data);
    let mut out = [0u8; 64];
    out.copy_from_slice(&digest);
    out
}

/// Argon2id with t=1, m=64 MiB, p=4, 32-byte output.
pub fn argon2id(password: &[u8], salt: &[u8]) -> Result<[u8; ARGON2ID_OUTPUT_LEN], CryptoError> {
    let params = Params::new(
        ARGON2ID_MEMORY_KIB,
        ARGON2ID_TIME_COST,
        ARGON2ID_LANES,
        Some(ARGON2ID_OUTPUT_LEN),
    )
    .map_err(CryptoError::Argon2)?;
    let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut out = [0u8; ARGON2ID_OUTPUT_LEN];
    argon
        .hash_password_into(password, salt, &mut out)
        .map_err(CryptoError::Argon2)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_vector() {
        // SHA-256("abc")
        let digest = sha256(b"abc");
        assert_eq!(
            digest[..4],
            [0xba, 0x78, 0x16, 0xbf],
            "unexpected prefix: {digest:02x?}"
        );
    }

    #[test]
    fn sha512_splits_into_key_and_nonce_material() {
        let digest = sha512(b"session key bytes");
        assert_eq!(digest.len(), 64);
        assert_ne!(digest[..32], digest[32..]);
    }

    #[test]
    fn argon2id_is_deterministic_per_salt() {
        let a = argon2id(b"correct horse", b"salt-0123").unwrap();
        let b = argon2id(b"correct horse", b"salt-0123").unwrap();
        let c = argon2id(b"correct horse", b"salt-4567").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn argon2id_rejects_empty_salt() {
        assert!(argon2id(b"password", b"").is_err());
    }
}

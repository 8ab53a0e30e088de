//! Ed448 signing and verification in pure (no pre-hash) mode.
//!
//! Key and signature types are re-exported from the underlying
//! implementation; the helpers here fix the byte-level conventions the rest
//! of the protocol relies on (raw secret seeds, raw 114-byte signatures).

use rand::{CryptoRng, RngCore};

pub use ed448_goldilocks_plus::{Signature, SigningKey, VerifyingKey};

use crate::CryptoError;

pub const SECRET_KEY_LENGTH: usize = 57;
pub const PUBLIC_KEY_LENGTH: usize = 57;
pub const SIGNATURE_LENGTH: usize = 114;

/// Generates a fresh Ed448 keypair from the given CSPRNG.
pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> (SigningKey, VerifyingKey) {
    let signing = SigningKey::generate(rng);
    let verifying = signing.verifying_key();
    (signing, verifying)
}

/// Signs `message` with the pure Ed448 scheme (empty context, no pre-hash).
pub fn sign(key: &SigningKey, message: &[u8]) -> [u8; SIGNATURE_LENGTH] {
    key.sign_raw(message).to_bytes()
}

/// Verifies a detached signature over `message`.
///
/// Malformed signature bytes yield `false` rather than an error, so callers
/// can treat every failure mode uniformly.
pub fn verify(key: &VerifyingKey, message: &[u8], signature: &[u8]) -> bool {
    let Ok(signature) = Signature::try_from(signature) else {
        return false;
    };
    key.verify_raw(&signature, message).is_ok()
}

/// Raw secret seed bytes, suitable for key-file storage.
pub fn signing_key_to_bytes(key: &SigningKey) -> [u8; SECRET_KEY_LENGTH] {
    key.to_bytes().into()
}

pub fn signing_key_from_bytes(bytes: &[u8; SECRET_KEY_LENGTH]) -> SigningKey {
    SigningKey::try_from(bytes.as_slice()).expect("fixed-size array has correct length")
}

pub fn verifying_key_to_bytes(key: &VerifyingKey) -> [u8; PUBLIC_KEY_LENGTH] {
    key.to_bytes()
}

pub fn verifying_key_from_bytes(
    bytes: &[u8; PUBLIC_KEY_LENGTH],
) -> Result<VerifyingKey, CryptoError> {
    VerifyingKey::from_bytes(bytes).map_err(|_| CryptoError::InvalidPublicKey)
}

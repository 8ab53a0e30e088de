//! The sealed server-state envelope, and session-key-bound ticket delivery.
//!
//! Between login step one and step two the server holds no per-user AKE
//! state. Instead the serialized state is signed, encrypted under a fresh
//! symmetric key, that key is encrypted to the server's own RSA public key
//! and separately signed, and the whole envelope rides to the client and
//! back. Opening re-verifies every layer with zero persisted state.
//!
//! Callers of [`open`] only learn that verification failed; the failing
//! layer is logged and kept internal so the wire gives nothing away.

use base64::Engine;
use persephone_crypto::{aead, ed448, hashing, rsa_oaep};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::Zeroize;

use crate::keyring::{KeyRing, SIGNATURE_ALGORITHM_ED448};
use crate::{B64, unix_now};

pub const OPAQUE_SERVER_STATE_VERSION: &str = "v1";
pub const ENVELOPE_KEY_BLOCK_VERSION: &str = "v1";
pub const STATE_NONCE_SIZE: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("failed to seal opaque server state")]
    Seal,
    #[error("envelope verification failed")]
    Verification,
}

/// Why an open failed. Internal only; surfaced to callers as the single
/// opaque [`EnvelopeError::Verification`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OpenFailure {
    KeyDecode,
    KeyDecrypt,
    KeySignature,
    StateDecode,
    StateDecrypt,
    StateParse,
    StateSignature,
}

/// The signed AKE state as carried inside the encrypted half of the
/// envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpaqueServerState {
    pub version: String,
    pub step: String,
    pub ake_server_state: String,
    pub unix_timestamp: i64,
    pub nonce: String,
    pub signature_algorithm: String,
    pub signature: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeKeyBlock {
    pub version: String,
    pub encrypted_ephemeral_key: String,
    pub signature_key_id: String,
    pub ephemeral_key_signature: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpaqueServerStateEnvelope {
    pub envelope_key_block: EnvelopeKeyBlock,
    pub encrypted_opaque_server_state: String,
}

/// Seals the serialized AKE state into a self-authenticating envelope.
pub fn seal<R: RngCore + CryptoRng>(
    keys: &KeyRing,
    step: &str,
    ake_state: &[u8],
    rng: &mut R,
) -> Result<OpaqueServerStateEnvelope, EnvelopeError> {
    let mut state_nonce = [0u8; STATE_NONCE_SIZE];
    rng.fill_bytes(&mut state_nonce);

    let mut state = OpaqueServerState {
        version: OPAQUE_SERVER_STATE_VERSION.to_string(),
        step: step.to_string(),
        ake_server_state: B64.encode(ake_state),
        unix_timestamp: unix_now(),
        nonce: B64.encode(state_nonce),
        signature_algorithm: SIGNATURE_ALGORITHM_ED448.to_string(),
        signature: String::new(),
    };

    let unsigned = serde_json::to_vec(&state).map_err(|_| EnvelopeError::Seal)?;
    state.signature = B64.encode(ed448::sign(&keys.protocol.signing, &unsigned));
    let signed = serde_json::to_vec(&state).map_err(|_| EnvelopeError::Seal)?;

    let mut ephemeral_key = [0u8; aead::KEY_SIZE];
    rng.fill_bytes(&mut ephemeral_key);
    let mut nonce = [0u8; aead::NONCE_SIZE];
    rng.fill_bytes(&mut nonce);

    let ciphertext =
        aead::seal(&ephemeral_key, &nonce, &signed, &[]).map_err(|_| EnvelopeError::Seal)?;
    let mut wrapped = nonce.to_vec();
    wrapped.extend_from_slice(&ciphertext);

    let encrypted_key = rsa_oaep::encrypt(rng, &keys.envelope_rsa_public, &ephemeral_key)
        .map_err(|_| EnvelopeError::Seal)?;
    let key_signature = ed448::sign(&keys.protocol.signing, &ephemeral_key);
    ephemeral_key.zeroize();

    Ok(OpaqueServerStateEnvelope {
        envelope_key_block: EnvelopeKeyBlock {
            version: ENVELOPE_KEY_BLOCK_VERSION.to_string(),
            encrypted_ephemeral_key: B64.encode(encrypted_key),
            signature_key_id: SIGNATURE_ALGORITHM_ED448.to_string(),
            ephemeral_key_signature: B64.encode(key_signature),
        },
        encrypted_opaque_server_state: B64.encode(wrapped),
    })
}

/// Verifies and decrypts an envelope, returning the raw AKE state bytes.
pub fn open(keys: &KeyRing, env: &OpaqueServerStateEnvelope) -> Result<Vec<u8>, EnvelopeError> {
    open_inner(keys, env).map_err(|failure| {
        debug!(?failure, "envelope rejected");
        EnvelopeError::Verification
    })
}

pub(crate) fn open_inner(
    keys: &KeyRing,
    env: &OpaqueServerStateEnvelope,
) -> Result<Vec<u8>, OpenFailure> {
    let block = &env.envelope_key_block;

    let encrypted_key = B64
        .decode(block.encrypted_ephemeral_key.as_bytes())
        .map_err(|_| OpenFailure::KeyDecode)?;
    let key_signature = B64
        .decode(block.ephemeral_key_signature.as_bytes())
        .map_err(|_| OpenFailure::KeyDecode)?;
    if key_signature.len() != ed448::SIGNATURE_LENGTH {
        return Err(OpenFailure::KeyDecode);
    }

    let mut ephemeral_key = rsa_oaep::decrypt(&keys.envelope_rsa_private, &encrypted_key)
        .map_err(|_| OpenFailure::KeyDecrypt)?;
    if !ed448::verify(&keys.protocol.verifying, &ephemeral_key, &key_signature) {
        ephemeral_key.zeroize();
        return Err(OpenFailure::KeySignature);
    }

    let wrapped = B64
        .decode(env.encrypted_opaque_server_state.as_bytes())
        .map_err(|_| OpenFailure::StateDecode)?;
    if wrapped.len() <= aead::NONCE_SIZE {
        ephemeral_key.zeroize();
        return Err(OpenFailure::StateDecode);
    }
    let (nonce, ciphertext) = wrapped.split_at(aead::NONCE_SIZE);

    let opened = aead::open(&ephemeral_key, nonce, ciphertext, &[]);
    ephemeral_key.zeroize();
    let signed = opened.map_err(|_| OpenFailure::StateDecrypt)?;

    let state: OpaqueServerState =
        serde_json::from_slice(&signed).map_err(|_| OpenFailure::StateParse)?;

    let signature = B64
        .decode(state.signature.as_bytes())
        .map_err(|_| OpenFailure::StateParse)?;
    let mut unsigned = state.clone();
    unsigned.signature = String::new();
    let unsigned_bytes = serde_json::to_vec(&unsigned).map_err(|_| OpenFailure::StateParse)?;
    if !ed448::verify(&keys.protocol.verifying, &unsigned_bytes, &signature) {
        return Err(OpenFailure::StateSignature);
    }

    B64.decode(state.ake_server_state.as_bytes())
        .map_err(|_| OpenFailure::StateParse)
}

/// Encrypts a serialized ticket under the AKE session key.
///
/// The key is SHA-512(session_key)[0..32]; a random nonce rides in front of
/// the ciphertext so encrypting several tickets under one session never
/// reuses a stream.
pub fn encrypt_ticket_with_session_key<R: RngCore + CryptoRng>(
    session_key: &[u8],
    ticket_json: &[u8],
    rng: &mut R,
) -> Result<String, EnvelopeError> {
    let digest = hashing::sha512(session_key);
    let mut nonce = [0u8; aead::NONCE_SIZE];
    rng.fill_bytes(&mut nonce);

    let ciphertext =
        aead::seal(&digest[..aead::KEY_SIZE], &nonce, ticket_json, &[]).map_err(|_| EnvelopeError::Seal)?;
    let mut wrapped = nonce.to_vec();
    wrapped.extend_from_slice(&ciphertext);
    Ok(B64.encode(wrapped))
}

/// Client-side inverse of [`encrypt_ticket_with_session_key`].
pub fn decrypt_ticket_with_session_key(
    session_key: &[u8],
    blob_b64: &str,
) -> Result<Vec<u8>, EnvelopeError> {
    let wrapped = B64
        .decode(blob_b64.as_bytes())
        .map_err(|_| EnvelopeError::Verification)?;
    if wrapped.len() <= aead::NONCE_SIZE {
        return Err(EnvelopeError::Verification);
    }
    let digest = hashing::sha512(session_key);
    let (nonce, ciphertext) = wrapped.split_at(aead::NONCE_SIZE);
    aead::open(&digest[..aead::KEY_SIZE], nonce, ciphertext, &[])
        .map_err(|_| EnvelopeError::Verification)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::support::test_keys;
    use rand::rngs::OsRng;

    const STEP: &str = "OPAQUE_LOGIN_STEP_ONE";

    #[test]
    fn seal_open_roundtrip() {
        let keys = test_keys();
        let state = b"opaque ake server state bytes".to_vec();
        let env = seal(&keys, STEP, &state, &mut OsRng).unwrap();
        assert_eq!(open(&keys, &env).unwrap(), state);
    }

    #[test]
    fn tampered_state_ciphertext_fails_decrypt() {
        let keys = test_keys();
        let mut env = seal(&keys, STEP, b"state", &mut OsRng).unwrap();

        let mut wrapped = B64.decode(env.encrypted_opaque_server_state.as_bytes()).unwrap();
        let last = wrapped.len() - 1;
        wrapped[last] ^= 0x01;
        env.encrypted_opaque_server_state = B64.encode(wrapped);

        assert_eq!(
            open_inner(&keys, &env),
            Err(OpenFailure::StateDecrypt)
        );
        assert!(matches!(open(&keys, &env), Err(EnvelopeError::Verification)));
    }

    #[test]
    fn tampered_key_block_fails() {
        let keys = test_keys();
        let mut env = seal(&keys, STEP, b"state", &mut OsRng).unwrap();

        let mut encrypted = B64.decode(env.envelope_key_block.encrypted_ephemeral_key.as_bytes()).unwrap();
        encrypted[0] ^= 0x01;
        env.envelope_key_block.encrypted_ephemeral_key = B64.encode(encrypted);

        assert_eq!(open_inner(&keys, &env), Err(OpenFailure::KeyDecrypt));
    }

    #[test]
    fn tampered_key_signature_fails() {
        let keys = test_keys();
        let mut env = seal(&keys, STEP, b"state", &mut OsRng).unwrap();

        let mut sig = B64.decode(env.envelope_key_block.ephemeral_key_signature.as_bytes()).unwrap();
        sig[0] ^= 0x01;
        env.envelope_key_block.ephemeral_key_signature = B64.encode(sig);

        assert_eq!(open_inner(&keys, &env), Err(OpenFailure::KeySignature));
    }

    #[test]
    fn garbage_base64_fails_decode() {
        let keys = test_keys();
        let mut env = seal(&keys, STEP, b"state", &mut OsRng).unwrap();
        env.encrypted_opaque_server_state = "!!!not-base64!!!".to_string();
        assert_eq!(open_inner(&keys, &env), Err(OpenFailure::StateDecode));
    }

    #[test]
    fn ticket_encryption_roundtrip_with_distinct_nonces() {
        let session_key = [0x42u8; 64];
        let a = encrypt_ticket_with_session_key(&session_key, b"{\"t\":1}", &mut OsRng).unwrap();
        let b = encrypt_ticket_with_session_key(&session_key, b"{\"t\":1}", &mut OsRng).unwrap();
        assert_ne!(a, b, "same session key must never reuse a stream");

        assert_eq!(
            decrypt_ticket_with_session_key(&session_key, &a).unwrap(),
            b"{\"t\":1}"
        );
    }

    #[test]
    fn ticket_decryption_rejects_wrong_session_key() {
        let blob =
            encrypt_ticket_with_session_key(&[1u8; 64], b"ticket", &mut OsRng).unwrap();
        assert!(decrypt_ticket_with_session_key(&[2u8; 64], &blob).is_err());
    }
}

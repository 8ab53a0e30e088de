//! Outer protocol framing: the command envelope and signed trace ids.
//!
//! Every request except protocol initiation must carry a trace id signed by
//! the server. Trace ids are never persisted; the server only verifies its
//! own signature, which gives session-bounded, deniable trace identity.

use base64::Engine;
use persephone_crypto::ed448;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::B64;
use crate::keyring::{KeyRing, SIGNATURE_ALGORITHM_ED448};

pub const PERSEPHONE_VERSION: &str = "v1";

pub const CMD_INITIATE_PROTOCOL: &str = "PSP_INITIATE_PROTOCOL";
pub const CMD_INITIATE_OPAQUE: &str = "PSP_INITIATE_OPAQUE";
pub const CMD_OPAQUE_EXECUTE: &str = "PSP_OPAQUE_EXECUTE";
pub const CMD_INITIATE_HYDRATE: &str = "PSP_INITIATE_HYDRATE";
pub const CMD_HYDRATE_EXECUTE: &str = "PSP_HYDRATE_EXECUTE";

pub const TRACE_ID_SIZE: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolViolation {
    #[error("invalid envelope JSON: {0}")]
    MalformedEnvelope(#[from] serde_json::Error),

    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(String),

    #[error("invalid base64 or signature size")]
    MalformedTraceSignature,

    #[error("trace id signature verification failed")]
    InvalidTraceSignature,
}

/// The outer command envelope; the same shape travels in both directions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersephoneEnvelope {
    pub persephone_version: String,
    pub persephone_command: String,
    pub persephone_payload: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub trace_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub trace_id_signature: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub trace_id_signature_algorithm: String,
}

impl PersephoneEnvelope {
    pub fn reply(
        command: &str,
        payload: String,
        trace_id: &str,
        trace_id_signature: &str,
    ) -> Self {
        Self {
            persephone_version: PERSEPHONE_VERSION.to_string(),
            persephone_command: command.to_string(),
            persephone_payload: payload,
            trace_id: trace_id.to_string(),
            trace_id_signature: trace_id_signature.to_string(),
            trace_id_signature_algorithm: SIGNATURE_ALGORITHM_ED448.to_string(),
        }
    }
}

/// Parses and version-checks a client envelope.
pub fn unwrap_request(raw: &str) -> Result<PersephoneEnvelope, ProtocolViolation> {
    let envelope: PersephoneEnvelope = serde_json::from_str(raw)?;
    if envelope.persephone_version != PERSEPHONE_VERSION {
        return Err(ProtocolViolation::UnsupportedVersion(
            envelope.persephone_version,
        ));
    }
    Ok(envelope)
}

/// 32 random bytes, base64url without padding.
pub fn generate_trace_id<R: RngCore + CryptoRng>(rng: &mut R) -> String {
    let mut buf = [0u8; TRACE_ID_SIZE];
    rng.fill_bytes(&mut buf);
    B64.encode(buf)
}

/// Signs the trace id string's UTF-8 bytes with the protocol key.
pub fn sign_trace_id(keys: &KeyRing, trace_id: &str) -> String {
    B64.encode(ed448::sign(&keys.protocol.signing, trace_id.as_bytes()))
}

pub fn verify_trace_id(
    keys: &KeyRing,
    trace_id: &str,
    signature_b64: &str,
) -> Result<(), ProtocolViolation> {
    let signature = B64
        .decode(signature_b64.as_bytes())
        .map_err(|_| ProtocolViolation::MalformedTraceSignature)?;
    if signature.len() != ed448::SIGNATURE_LENGTH {
        return Err(ProtocolViolation::MalformedTraceSignature);
    }
    if !ed448::verify(&keys.protocol.verifying, trace_id.as_bytes(), &signature) {
        return Err(ProtocolViolation::InvalidTraceSignature);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::support::test_keys;
    use rand::rngs::OsRng;

    #[test]
    fn trace_id_sign_verify() {
        let keys = test_keys();
        let trace_id = generate_trace_id(&mut OsRng);
        let signature = sign_trace_id(&keys, &trace_id);
        verify_trace_id(&keys, &trace_id, &signature).unwrap();
    }

    #[test]
    fn altered_trace_id_rejected() {
        let keys = test_keys();
        let trace_id = generate_trace_id(&mut OsRng);
        let signature = sign_trace_id(&keys, &trace_id);
        assert!(matches!(
            verify_trace_id(&keys, "forged-trace-id", &signature),
            Err(ProtocolViolation::InvalidTraceSignature)
        ));
    }

    #[test]
    fn malformed_signature_rejected() {
        let keys = test_keys();
        let trace_id = generate_trace_id(&mut OsRng);
        assert!(matches!(
            verify_trace_id(&keys, &trace_id, "@@@"),
            Err(ProtocolViolation::MalformedTraceSignature)
        ));
        assert!(matches!(
            verify_trace_id(&keys, &trace_id, "AAAA"),
            Err(ProtocolViolation::MalformedTraceSignature)
        ));
    }

    #[test]
    fn unwrap_rejects_wrong_version() {
        let raw = serde_json::json!({
            "persephone_version": "v0",
            "persephone_command": CMD_INITIATE_PROTOCOL,
            "persephone_payload": "",
        })
        .to_string();
        assert!(matches!(
            unwrap_request(&raw),
            Err(ProtocolViolation::UnsupportedVersion(v)) if v == "v0"
        ));
    }
}

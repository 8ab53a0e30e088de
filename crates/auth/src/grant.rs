//! Ed448-signed authorization grants.
//!
//! A grant authorizes one specific action (registration, password reset)
//! until an explicit expiry. Signing follows the same blank-signature
//! canonical JSON convention as tickets.

use std::time::Duration;

use base64::Engine;
use persephone_crypto::ed448;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::keyring::{GRANT_SIGNING_KEY_ID, KeyRing};
use crate::{B64, unix_now};

pub const AUTH_GRANT_VERSION: &str = "v1";
pub const AUTH_GRANT_NONCE_SIZE: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum GrantError {
    #[error("grant serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid base64 in signature: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("invalid grant signature")]
    InvalidSignature,

    #[error("grant expired")]
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GrantType {
    #[serde(rename = "AUTH_GRANT_PURPOSE_REGISTER")]
    Register,
    #[serde(rename = "AUTH_GRANT_PURPOSE_PASSWORD_RESET")]
    PasswordReset,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthGrant {
    pub version: String,
    pub grant_id: String,
    pub grant_type: GrantType,
    pub issued_at_unix_timestamp: i64,
    pub expires_at_unix_timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub associated_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub nonce: String,
    pub payload: serde_json::Value,
    pub signing_key_identifier: String,
    pub signature: String,
}

/// Issues a grant valid for `ttl` from now.
pub fn create_auth_grant<R: RngCore + CryptoRng>(
    keys: &KeyRing,
    grant_id: impl Into<String>,
    grant_type: GrantType,
    associated_id: Option<String>,
    scope: Option<String>,
    payload: serde_json::Value,
    ttl: Duration,
    rng: &mut R,
) -> Result<AuthGrant, GrantError> {
    let mut nonce = [0u8; AUTH_GRANT_NONCE_SIZE];
    rng.fill_bytes(&mut nonce);

    let now = unix_now();
    let mut grant = AuthGrant {
        version: AUTH_GRANT_VERSION.to_string(),
        grant_id: grant_id.into(),
        grant_type,
        issued_at_unix_timestamp: now,
        expires_at_unix_timestamp: now + ttl.as_secs() as i64,
        associated_id,
        scope,
        nonce: B64.encode(nonce),
        payload,
        signing_key_identifier: GRANT_SIGNING_KEY_ID.to_string(),
        signature: String::new(),
    };

    let to_sign = serde_json::to_vec(&grant)?;
    grant.signature = B64.encode(ed448::sign(&keys.ticket_signing.signing, &to_sign));
    Ok(grant)
}

/// Verifies expiry first, then the signature.
pub fn verify_auth_grant(keys: &KeyRing, grant: &AuthGrant) -> Result<(), GrantError> {
    if unix_now() > grant.expires_at_unix_timestamp {
        return Err(GrantError::Expired);
    }

    let mut unsigned = grant.clone();
    unsigned.signature = String::new();
    let bytes = serde_json::to_vec(&unsigned)?;

    let signature = B64.decode(grant.signature.as_bytes())?;
    if !ed448::verify(&keys.ticket_signing.verifying, &bytes, &signature) {
        return Err(GrantError::InvalidSignature);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::support::test_keys;
    use rand::rngs::OsRng;

    #[test]
    fn create_then_verify() {
        let keys = test_keys();
        let grant = create_auth_grant(
            &keys,
            "grant-001",
            GrantType::PasswordReset,
            None,
            None,
            serde_json::json!({"requested_by": "staff-desk"}),
            Duration::from_secs(600),
            &mut OsRng,
        )
        .unwrap();
        assert_eq!(grant.signing_key_identifier, GRANT_SIGNING_KEY_ID);
        verify_auth_grant(&keys, &grant).unwrap();
    }

    #[test]
    fn expired_grant_rejected_before_signature_check() {
        let keys = test_keys();
        let mut grant = create_auth_grant(
            &keys,
            "grant-002",
            GrantType::Register,
            None,
            None,
            serde_json::Value::Null,
            Duration::from_secs(600),
            &mut OsRng,
        )
        .unwrap();
        grant.expires_at_unix_timestamp = unix_now() - 1;
        assert!(matches!(
            verify_auth_grant(&keys, &grant),
            Err(GrantError::Expired)
        ));
    }

    #[test]
    fn tampered_payload_breaks_signature() {
        let keys = test_keys();
        let mut grant = create_auth_grant(
            &keys,
            "grant-003",
            GrantType::Register,
            Some("hestia-7".into()),
            None,
            serde_json::json!({"seat": 1}),
            Duration::from_secs(600),
            &mut OsRng,
        )
        .unwrap();
        grant.payload = serde_json::json!({"seat": 2});
        assert!(matches!(
            verify_auth_grant(&keys, &grant),
            Err(GrantError::InvalidSignature)
        ));
    }
}

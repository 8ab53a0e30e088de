//! Ed448-signed, short-lived authentication tickets.
//!
//! A ticket binds a role-tagged identity to a purpose for two minutes. The
//! signature covers the canonical JSON serialization with the `signature`
//! field set to the empty string, so field order is fixed by the struct
//! declaration and verification never depends on wire formatting.

use std::time::Duration;

use base64::Engine;
use persephone_crypto::ed448;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::keyring::{KeyRing, TICKET_SIGNING_KEY_ID};
use crate::types::UniqueUser;
use crate::{B64, unix_now};

pub const AUTH_TICKET_VERSION: &str = "v1";
pub const AUTH_TICKET_TTL: Duration = Duration::from_secs(2 * 60);
pub const AUTH_TICKET_NONCE_SIZE: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum TicketError {
    #[error("ticket serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid base64 in signature: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("invalid ticket signature")]
    InvalidSignature,

    #[error("ticket expired")]
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketPurpose {
    #[serde(rename = "AUTH_TICKET_PURPOSE_LOGIN")]
    Login,
    #[serde(rename = "AUTH_TICKET_PURPOSE_REGISTER")]
    Register,
    #[serde(rename = "AUTH_TICKET_PURPOSE_PASSWORD_RESET")]
    PasswordReset,
    #[serde(rename = "AUTH_TICKET_PURPOSE_USER_ROLE_SWITCH")]
    UserRoleSwitch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthTicket {
    pub version: String,
    /// Who is being authenticated, with the role for this session.
    pub authenticated_user: UniqueUser,
    pub issued_at_unix_timestamp: i64,
    pub purpose: TicketPurpose,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub nonce: String,
    /// Set when the ticket came out of the device-binding hydrate flow
    /// rather than a fresh key exchange.
    pub is_rehydrated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    pub signing_key_identifier: String,
    pub signature: String,
}

/// Issues a signed ticket for `user`.
pub fn create_auth_ticket<R: RngCore + CryptoRng>(
    keys: &KeyRing,
    user: UniqueUser,
    purpose: TicketPurpose,
    scope: Option<String>,
    is_rehydrated: bool,
    payload: Option<serde_json::Value>,
    rng: &mut R,
) -> Result<AuthTicket, TicketError> {
    create_auth_ticket_at(keys, user, purpose, scope, is_rehydrated, payload, unix_now(), rng)
}

pub(crate) fn create_auth_ticket_at<R: RngCore + CryptoRng>(
    keys: &KeyRing,
    user: UniqueUser,
    purpose: TicketPurpose,
    scope: Option<String>,
    is_rehydrated: bool,
    payload: Option<serde_json::Value>,
    issued_at: i64,
    rng: &mut R,
) -> Result<AuthTicket, TicketError> {
    let mut nonce = [0u8; AUTH_TICKET_NONCE_SIZE];
    rng.fill_bytes(&mut nonce);

    let mut ticket = AuthTicket {
        version: AUTH_TICKET_VERSION.to_string(),
        authenticated_user: user,
        issued_at_unix_timestamp: issued_at,
        purpose,
        scope,
        nonce: B64.encode(nonce),
        is_rehydrated,
        payload,
        signing_key_identifier: TICKET_SIGNING_KEY_ID.to_string(),
        signature: String::new(),
    };

    let to_sign = serde_json::to_vec(&ticket)?;
    ticket.signature = B64.encode(ed448::sign(&keys.ticket_signing.signing, &to_sign));
    Ok(ticket)
}

/// Verifies signature and freshness.
pub fn verify_auth_ticket(keys: &KeyRing, ticket: &AuthTicket) -> Result<(), TicketError> {
    let mut unsigned = ticket.clone();
    unsigned.signature = String::new();
    let bytes = serde_json::to_vec(&unsigned)?;

    let signature = B64.decode(ticket.signature.as_bytes())?;
    if !ed448::verify(&keys.ticket_signing.verifying, &bytes, &signature) {
        return Err(TicketError::InvalidSignature);
    }

    if unix_now() - ticket.issued_at_unix_timestamp > AUTH_TICKET_TTL.as_secs() as i64 {
        return Err(TicketError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::support::test_keys;
    use crate::types::UserGroup;
    use rand::rngs::OsRng;

    fn sample_user() -> UniqueUser {
        UniqueUser {
            tenant_id: "dojo-a".into(),
            user_id: "akira".into(),
            user_group_id: UserGroup::Coach,
            sub_id: None,
        }
    }

    #[test]
    fn create_then_verify() {
        let keys = test_keys();
        let ticket = create_auth_ticket(
            &keys,
            sample_user(),
            TicketPurpose::Login,
            None,
            false,
            None,
            &mut OsRng,
        )
        .unwrap();
        assert_eq!(ticket.version, AUTH_TICKET_VERSION);
        assert_eq!(ticket.signing_key_identifier, TICKET_SIGNING_KEY_ID);
        verify_auth_ticket(&keys, &ticket).unwrap();
    }

    #[test]
    fn mutated_field_breaks_signature() {
        let keys = test_keys();
        let mut ticket = create_auth_ticket(
            &keys,
            sample_user(),
            TicketPurpose::Login,
            None,
            false,
            None,
            &mut OsRng,
        )
        .unwrap();
        ticket.authenticated_user.user_id = "not-akira".into();
        assert!(matches!(
            verify_auth_ticket(&keys, &ticket),
            Err(TicketError::InvalidSignature)
        ));
    }

    #[test]
    fn expired_ticket_rejected() {
        let keys = test_keys();
        let stale = unix_now() - AUTH_TICKET_TTL.as_secs() as i64 - 1;
        let ticket = create_auth_ticket_at(
            &keys,
            sample_user(),
            TicketPurpose::Login,
            None,
            false,
            None,
            stale,
            &mut OsRng,
        )
        .unwrap();
        assert!(matches!(
            verify_auth_ticket(&keys, &ticket),
            Err(TicketError::Expired)
        ));
    }

    #[test]
    fn serde_roundtrip_preserves_signature_validity() {
        let keys = test_keys();
        let ticket = create_auth_ticket(
            &keys,
            sample_user(),
            TicketPurpose::Register,
            Some("onboarding".into()),
            true,
            Some(serde_json::json!({"device": "tablet-3"})),
            &mut OsRng,
        )
        .unwrap();
        let json = serde_json::to_string(&ticket).unwrap();
        let restored: AuthTicket = serde_json::from_str(&json).unwrap();
        verify_auth_ticket(&keys, &restored).unwrap();
    }
}

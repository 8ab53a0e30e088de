//! Stateless, multi-tenant authentication core.
//!
//! The crate composes five tightly coupled pieces into one authentication
//! flow: an outer framed protocol with signed trace ids, a Hashcash
//! proof-of-work admission gate, an OPAQUE registration/login state machine
//! kept stateless on the server through a sealed server-state envelope,
//! session-key-bound ticket delivery, and Ed448-signed TTL-bounded tickets
//! and grants.
//!
//! HTTP is a thin shell: a single POST endpoint unwraps a
//! [`transport::TransportMessage`], routes the inner payload through the
//! [`registry::ServiceRegistry`], and wraps the uniform status quadruple
//! back up. Everything stateful lives either client-side (the sealed
//! envelope) or behind the [`store::UserStore`] contract.

use std::time::{SystemTime, UNIX_EPOCH};

pub mod config;
pub mod envelope;
pub mod grant;
pub mod handlers;
pub mod hashcash;
pub mod keyring;
pub mod opaque;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod store;
pub mod ticket;
pub mod transport;
pub mod types;

#[cfg(test)]
mod tests;

/// URL-safe, unpadded base64. Every binary field on the wire uses this
/// engine.
pub const B64: base64::engine::GeneralPurpose = base64::engine::GeneralPurpose::new(
    &base64::alphabet::URL_SAFE,
    base64::engine::general_purpose::NO_PAD,
);

/// Seconds since the unix epoch.
pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Crypto(#[from] persephone_crypto::CryptoError),

    #[error(transparent)]
    Identity(#[from] types::IdentityError),

    #[error(transparent)]
    KeyRing(#[from] keyring::KeyRingError),

    #[error(transparent)]
    Hashcash(#[from] hashcash::HashcashError),

    #[error(transparent)]
    Envelope(#[from] envelope::EnvelopeError),

    #[error(transparent)]
    Opaque(#[from] opaque::OpaqueError),

    #[error(transparent)]
    Protocol(#[from] protocol::ProtocolViolation),

    #[error(transparent)]
    Ticket(#[from] ticket::TicketError),

    #[error(transparent)]
    Grant(#[from] grant::GrantError),

    #[error(transparent)]
    Store(#[from] store::StoreError),

    #[error(transparent)]
    Registry(#[from] registry::RegistryError),

    #[error(transparent)]
    Transport(#[from] transport::TransportError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

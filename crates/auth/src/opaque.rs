//! OPAQUE service: registration, login and password reset over the
//! `opaque-ke` implementation of the RFC 9807 flow.
//!
//! The server's key material (AKE keypair, identity, OPRF seed) lives in the
//! keyring as one serialized `ServerSetup` blob and is rehydrated per
//! operation; the per-login AKE state is serialized out to the sealed
//! envelope, never held in memory between round trips.

use std::sync::Arc;

use base64::Engine;
use opaque_ke::rand::rngs::OsRng;
use opaque_ke::{
    CipherSuite, CredentialFinalization, CredentialRequest, RegistrationRequest,
    RegistrationUpload, Ristretto255, ServerLogin, ServerLoginStartParameters, ServerRegistration,
    ServerSetup, key_exchange::tripledh::TripleDh,
};
use tracing::instrument;

use crate::B64;
use crate::keyring::KeyRing;
use crate::store::{StoreError, UserStore};
use crate::types::{CoreUser, OpaqueUserRecord};

/// Ristretto255 for OPRF and key exchange, SHA-512 for KDF/MAC/hash,
/// Argon2id as the key-stretching function.
pub struct DefaultCipherSuite;

impl CipherSuite for DefaultCipherSuite {
    type OprfCs = Ristretto255;
    type KeGroup = Ristretto255;
    type KeyExchange = TripleDh;
    type Ksf = argon2::Argon2<'static>;
}

#[derive(Debug, thiserror::Error)]
pub enum OpaqueError {
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("user already registered")]
    AlreadyRegistered,

    #[error("user record not found")]
    NotFound,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("record serialization error: {0}")]
    Record(#[from] serde_json::Error),

    #[error("key exchange failure: {0}")]
    Protocol(String),
}

fn protocol_err(e: impl std::fmt::Display) -> OpaqueError {
    OpaqueError::Protocol(e.to_string())
}

/// Stateless wrapper over the OPAQUE server operations. All state between
/// steps rides through the client.
pub struct OpaqueService {
    store: Arc<dyn UserStore>,
    keys: Arc<KeyRing>,
}

impl OpaqueService {
    pub fn new(store: Arc<dyn UserStore>, keys: Arc<KeyRing>) -> Self {
        Self { store, keys }
    }

    pub fn store(&self) -> &dyn UserStore {
        self.store.as_ref()
    }

    fn server_setup(&self) -> Result<ServerSetup<DefaultCipherSuite>, OpaqueError> {
        ServerSetup::<DefaultCipherSuite>::deserialize(&self.keys.opaque_server_setup)
            .map_err(protocol_err)
    }

    /// Evaluates the client's blinded registration request.
    #[instrument(skip_all, fields(user = %user), err)]
    pub fn registration_step1(
        &self,
        user: &CoreUser,
        request_b64: &str,
    ) -> Result<String, OpaqueError> {
        let request_bytes = B64.decode(request_b64.as_bytes())?;
        let request = RegistrationRequest::<DefaultCipherSuite>::deserialize(&request_bytes)
            .map_err(protocol_err)?;

        let setup = self.server_setup()?;
        let result = ServerRegistration::<DefaultCipherSuite>::start(
            &setup,
            request,
            user.encode_key().as_bytes(),
        )
        .map_err(protocol_err)?;

        Ok(B64.encode(result.message.serialize()))
    }

    /// Persists the client's registration record. Fails if the user already
    /// has one.
    #[instrument(skip_all, fields(user = %user), err)]
    pub fn registration_step2(
        &self,
        user: &CoreUser,
        record_b64: &str,
    ) -> Result<(), OpaqueError> {
        if self.store.exists(user)? {
            return Err(OpaqueError::AlreadyRegistered);
        }
        self.save_record(user, record_b64)
    }

    fn save_record(&self, user: &CoreUser, record_b64: &str) -> Result<(), OpaqueError> {
        let upload_bytes = B64.decode(record_b64.as_bytes())?;
        let upload = RegistrationUpload::<DefaultCipherSuite>::deserialize(&upload_bytes)
            .map_err(protocol_err)?;
        let password_file = ServerRegistration::finish(upload);

        let record = OpaqueUserRecord::new(password_file.serialize().to_vec());
        self.store.save_raw(user, &record.to_bytes()?)?;
        Ok(())
    }

    /// Runs the server half of KE1 -> KE2. Returns the serialized KE2 and
    /// the serialized AKE state the caller must seal into the envelope.
    #[instrument(skip_all, fields(user = %user), err)]
    pub fn login_step1(
        &self,
        user: &CoreUser,
        ke1_b64: &str,
    ) -> Result<(String, Vec<u8>), OpaqueError> {
        let ke1_bytes = B64.decode(ke1_b64.as_bytes())?;

        let data = self.store.load_raw(user).map_err(|e| match e {
            StoreError::NotFound(_) => OpaqueError::NotFound,
            other => OpaqueError::Store(other),
        })?;
        let record = OpaqueUserRecord::from_bytes(&data)?;
        let password_file =
            ServerRegistration::<DefaultCipherSuite>::deserialize(&record.opaque_record)
                .map_err(protocol_err)?;

        let ke1 = CredentialRequest::<DefaultCipherSuite>::deserialize(&ke1_bytes)
            .map_err(protocol_err)?;

        let setup = self.server_setup()?;
        let mut rng = OsRng;
        let result = ServerLogin::start(
            &mut rng,
            &setup,
            Some(password_file),
            ke1,
            user.encode_key().as_bytes(),
            ServerLoginStartParameters::default(),
        )
        .map_err(protocol_err)?;

        Ok((
            B64.encode(result.message.serialize()),
            result.state.serialize().to_vec(),
        ))
    }

    /// Finishes the AKE from the restored state and the client's KE3,
    /// yielding the base64 session key. Failure is terminal for the flow.
    #[instrument(skip_all, err)]
    pub fn login_step2(&self, ke3_b64: &str, ake_state: &[u8]) -> Result<String, OpaqueError> {
        let ke3_bytes = B64.decode(ke3_b64.as_bytes())?;

        let state = ServerLogin::<DefaultCipherSuite>::deserialize(ake_state)
            .map_err(protocol_err)?;
        let ke3 = CredentialFinalization::<DefaultCipherSuite>::deserialize(&ke3_bytes)
            .map_err(protocol_err)?;

        let result = state.finish(ke3).map_err(protocol_err)?;

        Ok(B64.encode(result.session_key))
    }

    /// Identical to [`Self::registration_step1`]; the reset flow reuses the
    /// registration messages.
    pub fn password_reset_step1(
        &self,
        user: &CoreUser,
        request_b64: &str,
    ) -> Result<String, OpaqueError> {
        self.registration_step1(user, request_b64)
    }

    /// Overwrites the stored record, no existence check.
    #[instrument(skip_all, fields(user = %user), err)]
    pub fn password_reset_step2(
        &self,
        user: &CoreUser,
        record_b64: &str,
    ) -> Result<(), OpaqueError> {
        self.save_record(user, record_b64)
    }
}

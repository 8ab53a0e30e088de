//! Process-wide key material.
//!
//! A single [`KeyRing`] is built in `main` (from a key file, or generated
//! for development) and threaded through every component as a shared
//! read-only handle. Key identifiers are embedded in signed structures so
//! keys can be rotated without invalidating the format.

use std::path::Path;

use base64::Engine;
use persephone_crypto::ed448::{self, SigningKey, VerifyingKey};
use persephone_crypto::rsa_oaep::{self, RsaPrivateKey, RsaPublicKey};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::B64;
use crate::opaque::DefaultCipherSuite;

/// Identifier stamped into tickets signed with the current ticket key.
pub const TICKET_SIGNING_KEY_ID: &str = "FirstBlood";
/// Identifier stamped into grants.
pub const GRANT_SIGNING_KEY_ID: &str = "Artemis";
/// Algorithm tag carried next to every Ed448 signature on the wire.
pub const SIGNATURE_ALGORITHM_ED448: &str = "Ed448";

#[derive(Debug, thiserror::Error)]
pub enum KeyRingError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("key file parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("key file encode error: {0}")]
    Encode(#[from] toml::ser::Error),

    #[error("invalid base64 in key file: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("invalid key length for {field}: expected {expected} bytes, got {actual}")]
    InvalidLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error(transparent)]
    Crypto(#[from] persephone_crypto::CryptoError),

    #[error("OPAQUE key material error: {0}")]
    Opaque(String),
}

/// An Ed448 signing/verifying pair.
pub struct Ed448KeyPair {
    pub signing: SigningKey,
    pub verifying: VerifyingKey,
}

impl Ed448KeyPair {
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let (signing, verifying) = ed448::generate(rng);
        Self { signing, verifying }
    }

    fn from_secret(bytes: &[u8], field: &'static str) -> Result<Self, KeyRingError> {
        let secret: [u8; ed448::SECRET_KEY_LENGTH] =
            bytes
                .try_into()
                .map_err(|_| KeyRingError::InvalidLength {
                    field,
                    expected: ed448::SECRET_KEY_LENGTH,
                    actual: bytes.len(),
                })?;
        let signing = ed448::signing_key_from_bytes(&secret);
        let verifying = signing.verifying_key();
        Ok(Self { signing, verifying })
    }
}

/// All key material the core holds. Immutable after construction.
pub struct KeyRing {
    /// Signs tickets and grants.
    pub ticket_signing: Ed448KeyPair,
    /// Signs trace ids, the sealed server state and its ephemeral key.
    pub protocol: Ed448KeyPair,
    /// Signs proof-of-work challenge headers.
    pub hashcash: Ed448KeyPair,
    /// Unwraps the envelope's ephemeral symmetric key.
    pub envelope_rsa_private: RsaPrivateKey,
    pub envelope_rsa_public: RsaPublicKey,
    /// Serialized OPAQUE server setup: AKE keypair, server identity and
    /// OPRF seed in one blob.
    pub opaque_server_setup: Vec<u8>,
}

/// On-disk representation: secrets only, public halves are derived.
#[derive(Serialize, Deserialize)]
struct KeyRingFile {
    ticket_signing_secret: String,
    protocol_secret: String,
    hashcash_secret: String,
    envelope_rsa_private_pem: String,
    opaque_server_setup: String,
}

impl KeyRing {
    /// Generates a complete set of fresh key material. RSA keygen at 5120
    /// bits makes this slow; production deployments load a key file instead.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Self, KeyRingError> {
        let (envelope_rsa_private, envelope_rsa_public) = rsa_oaep::generate(rng)?;
        let opaque_server_setup =
            opaque_ke::ServerSetup::<DefaultCipherSuite>::new(rng).serialize().to_vec();
        Ok(Self {
            ticket_signing: Ed448KeyPair::generate(rng),
            protocol: Ed448KeyPair::generate(rng),
            hashcash: Ed448KeyPair::generate(rng),
            envelope_rsa_private,
            envelope_rsa_public,
            opaque_server_setup,
        })
    }

    pub fn from_toml(contents: &str) -> Result<Self, KeyRingError> {
        let file: KeyRingFile = toml::from_str(contents)?;
        let decode = |s: &str| B64.decode(s.as_bytes());

        let envelope_rsa_private = rsa_oaep::private_key_from_pem(&file.envelope_rsa_private_pem)?;
        let envelope_rsa_public = RsaPublicKey::from(&envelope_rsa_private);
        let opaque_server_setup = decode(&file.opaque_server_setup)?;
        // Fail at load time, not first login, if the blob is unusable.
        opaque_ke::ServerSetup::<DefaultCipherSuite>::deserialize(&opaque_server_setup)
            .map_err(|e| KeyRingError::Opaque(e.to_string()))?;

        Ok(Self {
            ticket_signing: Ed448KeyPair::from_secret(
                &decode(&file.ticket_signing_secret)?,
                "ticket_signing_secret",
            )?,
            protocol: Ed448KeyPair::from_secret(&decode(&file.protocol_secret)?, "protocol_secret")?,
            hashcash: Ed448KeyPair::from_secret(&decode(&file.hashcash_secret)?, "hashcash_secret")?,
            envelope_rsa_private,
            envelope_rsa_public,
            opaque_server_setup,
        })
    }

    pub fn to_toml(&self) -> Result<String, KeyRingError> {
        let file = KeyRingFile {
            ticket_signing_secret: B64
                .encode(ed448::signing_key_to_bytes(&self.ticket_signing.signing)),
            protocol_secret: B64.encode(ed448::signing_key_to_bytes(&self.protocol.signing)),
            hashcash_secret: B64.encode(ed448::signing_key_to_bytes(&self.hashcash.signing)),
            envelope_rsa_private_pem: rsa_oaep::private_key_to_pem(&self.envelope_rsa_private)?,
            opaque_server_setup: B64.encode(&self.opaque_server_setup),
        };
        Ok(toml::to_string(&file)?)
    }

    pub fn load(path: &Path) -> Result<Self, KeyRingError> {
        Self::from_toml(&std::fs::read_to_string(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use persephone_crypto::ed448;
    use rand::rngs::OsRng;
    use std::sync::LazyLock;

    // RSA keygen dominates ring generation; share one ring across tests.
    static RING: LazyLock<KeyRing> = LazyLock::new(|| KeyRing::generate(&mut OsRng).unwrap());

    #[test]
    fn toml_roundtrip_preserves_signing_identity() {
        let ring = &*RING;
        let restored = KeyRing::from_toml(&ring.to_toml().unwrap()).unwrap();

        let sig = ed448::sign(&restored.ticket_signing.signing, b"probe");
        assert!(ed448::verify(&ring.ticket_signing.verifying, b"probe", &sig));

        assert_eq!(restored.opaque_server_setup, ring.opaque_server_setup);

        let ct = persephone_crypto::rsa_oaep::encrypt(&mut OsRng, &ring.envelope_rsa_public, b"k")
            .unwrap();
        assert_eq!(
            persephone_crypto::rsa_oaep::decrypt(&restored.envelope_rsa_private, &ct).unwrap(),
            b"k"
        );
    }

    #[test]
    fn truncated_secret_rejected() {
        let mut toml_str = RING.to_toml().unwrap();
        // Corrupt the first secret's length.
        let file: KeyRingFile = toml::from_str(&toml_str).unwrap();
        toml_str = toml_str.replace(&file.ticket_signing_secret, "AAAA");
        assert!(matches!(
            KeyRing::from_toml(&toml_str),
            Err(KeyRingError::InvalidLength { .. })
        ));
    }
}

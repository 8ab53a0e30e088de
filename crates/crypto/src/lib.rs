//! Cryptographic primitives facade for the Persephone authentication core.
//!
//! Every primitive the protocol relies on is exposed through this crate so
//! that call sites never touch vendor APIs directly: Ed448 signatures (pure,
//! no pre-hashing), XChaCha20-Poly1305 AEAD, the raw XChaCha20 stream,
//! RSA-OAEP with SHA3-512, SHA-2 digests and Argon2id key derivation.
//!
//! Verification primitives return `bool`; everything else returns
//! [`CryptoError`] on malformed input.

pub mod aead;
pub mod ed448;
pub mod hashing;
pub mod rsa_oaep;
pub mod stream;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("invalid nonce length: expected {expected} bytes, got {actual}")]
    InvalidNonceLength { expected: usize, actual: usize },

    #[error("invalid public key encoding")]
    InvalidPublicKey,

    #[error("authenticated decryption failed")]
    Decryption,

    #[error(transparent)]
    Rsa(#[from] rsa::Error),

    #[error("invalid key encoding: {0}")]
    KeyEncoding(String),

    #[error("argon2 failure: {0}")]
    Argon2(argon2::Error),
}

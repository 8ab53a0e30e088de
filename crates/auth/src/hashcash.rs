//! Hashcash-style proof-of-work admission gate.
//!
//! Tokens are seven colon-separated fields:
//! `version:difficulty:expires:subject:ext:nonce:counter`. The server signs
//! the header (with `ext` blanked) using the hashcash Ed448 key and places
//! the signature in `ext`; the client brute-forces a 4-byte little-endian
//! counter until SHA-256 over `header:counter` has the required number of
//! leading zero bits.

use std::time::Duration;

use base64::Engine;
use persephone_crypto::ed448;
use rand::{CryptoRng, RngCore};
use sha2::{Digest, Sha256};

use crate::keyring::KeyRing;
use crate::{B64, unix_now};

pub const VERSION: &str = "1";
pub const MAX_DIFFICULTY: u8 = 26;
const SEPARATOR: char = ':';
const NONCE_SIZE: usize = 16;
const FIELD_COUNT: usize = 7;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HashcashError {
    #[error("invalid hashcash format")]
    InvalidFormat,
    #[error("invalid hashcash version")]
    InvalidVersion,
    #[error("difficulty out of range")]
    InvalidDifficulty,
    #[error("invalid timestamp")]
    InvalidTimestamp,
    #[error("hashcash has expired")]
    Expired,
    #[error("subject mismatch")]
    SubjectMismatch,
    #[error("malformed signature")]
    SignatureMalformed,
    #[error("invalid challenge signature")]
    SignatureInvalid,
    #[error("invalid proof-of-work")]
    InvalidPow,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Hashcash {
    pub version: String,
    pub difficulty: u8,
    pub expires_unix: i64,
    pub subject: String,
    pub ext: String,
    pub nonce: String,
    pub counter: String,
}

impl Hashcash {
    /// Header with `ext` blanked; this is what the server signs.
    fn unsigned_header(&self) -> String {
        [
            self.version.as_str(),
            &self.difficulty.to_string(),
            &self.expires_unix.to_string(),
            &self.subject,
            "",
            &self.nonce,
        ]
        .join(&SEPARATOR.to_string())
    }

    /// Header including the signature; this is what the client hashes over.
    fn header(&self) -> String {
        [
            self.version.as_str(),
            &self.difficulty.to_string(),
            &self.expires_unix.to_string(),
            &self.subject,
            &self.ext,
            &self.nonce,
        ]
        .join(&SEPARATOR.to_string())
    }

    /// Full token, counter included.
    pub fn token(&self) -> String {
        format!("{}{}{}", self.header(), SEPARATOR, self.counter)
    }
}

/// Issues a signed challenge with an empty counter.
pub fn create<R: RngCore + CryptoRng>(
    keys: &KeyRing,
    subject: &str,
    difficulty: u8,
    ttl: Duration,
    rng: &mut R,
) -> Result<Hashcash, HashcashError> {
    create_at(keys, subject, difficulty, unix_now() + ttl.as_secs() as i64, rng)
}

fn create_at<R: RngCore + CryptoRng>(
    keys: &KeyRing,
    subject: &str,
    difficulty: u8,
    expires_unix: i64,
    rng: &mut R,
) -> Result<Hashcash, HashcashError> {
    if difficulty == 0 || difficulty > MAX_DIFFICULTY {
        return Err(HashcashError::InvalidDifficulty);
    }

    let mut nonce = [0u8; NONCE_SIZE];
    rng.fill_bytes(&mut nonce);

    let mut challenge = Hashcash {
        version: VERSION.to_string(),
        difficulty,
        expires_unix,
        subject: subject.to_string(),
        ext: String::new(),
        nonce: B64.encode(nonce),
        counter: String::new(),
    };

    let signature = ed448::sign(
        &keys.hashcash.signing,
        challenge.unsigned_header().as_bytes(),
    );
    challenge.ext = B64.encode(signature);
    Ok(challenge)
}

/// Parses a full token string into its fields.
pub fn parse(token: &str) -> Result<Hashcash, HashcashError> {
    let parts: Vec<&str> = token.split(SEPARATOR).collect();
    if parts.len() != FIELD_COUNT {
        return Err(HashcashError::InvalidFormat);
    }
    if parts[0] != VERSION {
        return Err(HashcashError::InvalidVersion);
    }
    let difficulty: u8 = parts[1]
        .parse()
        .map_err(|_| HashcashError::InvalidDifficulty)?;
    if difficulty == 0 || difficulty > MAX_DIFFICULTY {
        return Err(HashcashError::InvalidDifficulty);
    }
    let expires_unix: i64 = parts[2]
        .parse()
        .map_err(|_| HashcashError::InvalidTimestamp)?;

    Ok(Hashcash {
        version: parts[0].to_string(),
        difficulty,
        expires_unix,
        subject: parts[3].to_string(),
        ext: parts[4].to_string(),
        nonce: parts[5].to_string(),
        counter: parts[6].to_string(),
    })
}

/// Client side: brute-forces the counter until the difficulty is met.
/// Returns the full solved token. `max_bits` bounds the work the caller is
/// willing to do.
pub fn solve(token: &str, max_bits: u8) -> Result<String, HashcashError> {
    let mut challenge = parse(token)?;
    if challenge.difficulty > max_bits {
        return Err(HashcashError::InvalidDifficulty);
    }

    let base = challenge.header();
    for counter in 0..=u32::MAX {
        let counter_b64 = B64.encode(counter.to_le_bytes());
        let digest = Sha256::digest(format!("{base}{SEPARATOR}{counter_b64}").as_bytes());
        if leading_zero_bits(&digest, challenge.difficulty) {
            challenge.counter = counter_b64;
            return Ok(challenge.token());
        }
    }
    Err(HashcashError::InvalidPow)
}

/// Verifies every property of a solved token, failing with the first check
/// that does not hold.
pub fn verify(keys: &KeyRing, token: &str, expected_subject: &str) -> Result<(), HashcashError> {
    let challenge = parse(token)?;

    if challenge.subject != expected_subject {
        return Err(HashcashError::SubjectMismatch);
    }
    if unix_now() > challenge.expires_unix {
        return Err(HashcashError::Expired);
    }

    let signature = B64
        .decode(challenge.ext.as_bytes())
        .map_err(|_| HashcashError::SignatureMalformed)?;
    if signature.len() != ed448::SIGNATURE_LENGTH {
        return Err(HashcashError::SignatureMalformed);
    }
    if !ed448::verify(
        &keys.hashcash.verifying,
        challenge.unsigned_header().as_bytes(),
        &signature,
    ) {
        return Err(HashcashError::SignatureInvalid);
    }

    let digest = Sha256::digest(challenge.token().as_bytes());
    if !leading_zero_bits(&digest, challenge.difficulty) {
        return Err(HashcashError::InvalidPow);
    }

    Ok(())
}

fn leading_zero_bits(hash: &[u8], bits: u8) -> bool {
    let full = usize::from(bits / 8);
    let rem = bits % 8;

    if hash[..full].iter().any(|&b| b != 0) {
        return false;
    }
    if rem == 0 {
        return true;
    }
    hash[full] >> (8 - rem) == 0
}

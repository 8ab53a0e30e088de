//! Shared fixtures. Keyring generation includes a 5120-bit RSA keypair, so
//! one ring is generated lazily and shared by every test in the crate.

use std::sync::{Arc, LazyLock};

use rand::rngs::OsRng;

use crate::keyring::KeyRing;

static KEYS: LazyLock<Arc<KeyRing>> =
    LazyLock::new(|| Arc::new(KeyRing::generate(&mut OsRng).expect("keyring generation")));

pub(crate) fn test_keys() -> Arc<KeyRing> {
    KEYS.clone()
}

/// Routes handler logs through the test writer for the current test.
pub(crate) fn init_test_tracing() -> tracing::subscriber::DefaultGuard {
    tracing::subscriber::set_default(
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .finish(),
    )
}

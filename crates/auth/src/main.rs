use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use rand::rngs::OsRng;
use tracing::{info, warn};

use persephone_auth::config::ServiceConfig;
use persephone_auth::handlers::PersephoneHandler;
use persephone_auth::keyring::KeyRing;
use persephone_auth::registry::ServiceRegistry;
use persephone_auth::server;
use persephone_auth::store::{MemoryStore, UserStore};

#[derive(Debug, Parser)]
#[command(name = "auth-server", about = "Stateless OPAQUE authentication server")]
struct Args {
    /// Port to listen on.
    #[arg(long, env = "PERSEPHONE_PORT", default_value_t = server::DEFAULT_PORT)]
    port: u16,

    /// Path to the key material file. A fresh ephemeral keyring is
    /// generated when omitted; every restart then invalidates outstanding
    /// tickets and envelopes.
    #[arg(long, env = "PERSEPHONE_KEYRING")]
    keyring: Option<PathBuf>,
}

/// `PGSQL_DSN` selects the relational store; absence selects the in-memory
/// store.
fn select_store() -> Result<Arc<dyn UserStore>, Box<dyn std::error::Error>> {
    match std::env::var("PGSQL_DSN") {
        #[cfg(feature = "postgres")]
        Ok(dsn) => {
            info!("using relational user store");
            Ok(Arc::new(persephone_auth::store::PgStore::connect(&dsn)?))
        }
        #[cfg(not(feature = "postgres"))]
        Ok(_) => {
            Err("PGSQL_DSN is set but this build lacks the `postgres` feature".into())
        }
        Err(_) => {
            info!("PGSQL_DSN not set; using in-memory user store");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let keys = match &args.keyring {
        Some(path) => {
            info!(path = %path.display(), "loading keyring");
            KeyRing::load(path)?
        }
        None => {
            warn!("no keyring file configured; generating an ephemeral development keyring");
            KeyRing::generate(&mut OsRng)?
        }
    };
    let keys = Arc::new(keys);

    let store = select_store()?;

    let mut registry = ServiceRegistry::new();
    registry.register(Arc::new(PersephoneHandler::new(
        store,
        keys,
        ServiceConfig::default(),
    )))?;
    info!(routes = ?registry.routes(), "auth routes registered");

    let router = server::router(Arc::new(registry));
    let addr = (IpAddr::V4(Ipv4Addr::UNSPECIFIED), args.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(port = args.port, "auth server listening");
    axum::serve(listener, router).await?;

    Ok(())
}

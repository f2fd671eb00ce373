//! quilld - Quill XMPP Daemon
//!
//! An RFC 6120 stream runtime: stream negotiation, element dispatch, and
//! pluggable handlers over TCP with in-band STARTTLS.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use quilld::config::Config;
use quilld::handlers::StaticUsers;
use quilld::network::Gateway;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "failed to load config");
        e
    })?;

    info!(
        domain = %config.server.domain,
        addr = %config.listen.address,
        tls = config.tls.is_some(),
        "starting quilld"
    );
    if config.users.is_empty() {
        tracing::warn!("no [users] configured; every SASL PLAIN attempt will be refused");
    }

    let authenticator = Arc::new(StaticUsers::new(config.users.clone()));
    let gateway = Gateway::bind(config, authenticator, None).await?;
    gateway.run().await
}

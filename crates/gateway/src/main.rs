mod cli;
mod config;
mod facade;
mod http;
mod role_source;
mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use gqiam_identity::TokenVerifier;
use gqiam_role_cache::RoleCache;
use poem::listener::TcpListener;
use poem::Server;

use crate::cli::Cli;
use crate::config::load_config;
use crate::http::{build_router, AppState};
use crate::role_source::ManagerRoleSource;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init_telemetry(cli.console_logging.into());

    let mut config = load_config(&cli.config)?;
    if let Some(port) = cli.port {
        config.port = port;
    }
    tracing::info!(port = config.port, path = %config.path, "starting");

    let http_client = reqwest::Client::builder().timeout(Duration::from_secs(10)).build()?;
    let identity_config = config.auth.into_identity_config()?;

    let verifier = match &identity_config {
        gqiam_identity::IdentityConfig::Jwt(options) => {
            // A failed startup JWKS fetch (or static key load) terminates the process.
            Some(TokenVerifier::new((**options).clone()).await?)
        }
        gqiam_identity::IdentityConfig::Header { .. } => None,
    };

    let role_source = ManagerRoleSource::new(http_client.clone(), config.manager_url.clone());
    let role_cache =
        RoleCache::new(role_source, Duration::from_secs(config.cache_options.expiration * 60));
    let role_cache = Arc::new(role_cache);

    let purge_interval = Duration::from_secs(config.cache_options.purge * 60);
    tokio::spawn(role_cache.clone().run_purge_loop(purge_interval));

    let state = Arc::new(AppState {
        identity_config,
        verifier,
        role_cache,
        http_client,
        source_url: config.source_url,
    });

    let app = build_router(&config.path, state, &config.cors_options);
    let listener = TcpListener::bind(("0.0.0.0", config.port));
    Server::new(listener).run(app).await?;

    Ok(())
}

mod bods;
mod config;
mod distance;
mod error;
mod model;
mod postcode;
mod routes;
mod snapshot;

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::bods::BodsClient;
use crate::config::Config;
use crate::postcode::PostcodeClient;
use crate::routes::AppState;

#[tokio::main]
async fn main() -> error::Result<()> {
    let env_files = config::load_env_files(Path::new("."));
    let config = Config::parse();
    init_tracing(&config.log_level);
    for path in &env_files {
        tracing::info!(path = %path.display(), "Loaded environment file");
    }
    config.validate()?;

    let state = Arc::new(AppState {
        bods: BodsClient::from_config(&config)?,
        geocoder: PostcodeClient::from_config(&config)?,
        default_limit: config.default_limit,
    });

    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(config.listen).await?;

    tracing::info!(
        addr = %config.listen,
        bbox = %config.bounding_box,
        feed = ?config.feed,
        "Server is running"
    );
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();
}

//! Vodline server
//!
//! Wires up:
//! - Media server, status callback and transcoding engine clients
//! - The pipeline controller and its job cache
//! - The HTTP layer the media server triggers and uploads arrive on

use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use vodline::adapters::{callback::CallbackClient, http, mist::MistClient};
use vodline::application::{pipeline::PipelineController, transcode::TranscodeService};
use vodline::config::Config;
use vodline::domain::cache::JobCache;

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vodline=info")),
        )
        .init();

    if let Err(e) = run(config).await {
        error!(error = %e, "vodline exited");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> vodline::Result<()> {
    // 1. Adapters
    let mist = MistClient::new(&config.mist_api_url, &config.mist_http_url)?;
    let callbacks = CallbackClient::new()?;
    let transcoder =
        TranscodeService::new(&config.broadcaster_url, config.transcoding_parallel_jobs)?;

    // 2. Application
    let controller = PipelineController::new(
        mist,
        callbacks,
        transcoder,
        Arc::new(JobCache::new()),
        config.segment_size_secs,
    );

    // 3. HTTP layer
    let app = http::router(controller);

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", config.addr, config.port)).await?;
    info!(
        addr = %config.addr,
        port = %config.port,
        broadcaster = %config.broadcaster_url,
        parallel_jobs = config.transcoding_parallel_jobs,
        "listening"
    );
    axum::serve(listener, app).await?;
    Ok(())
}

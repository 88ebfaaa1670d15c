//! edgeship daemon: webhook receiver, run queue and inspection API.

use anyhow::Context;
use clap::Parser;
use edgeship_api::{AppState, bootstrap, routes};
use edgeship_core::secret::EnvCredentialProvider;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "edgeshipd")]
#[command(about = "edgeship deployment daemon", long_about = None)]
struct Args {
    /// Path to the site configuration
    #[arg(long, env = "EDGESHIP_CONFIG", default_value = "edgeship.kdl")]
    config: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long, env = "EDGESHIP_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let mut site = edgeship_config::load_site(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    site.runtime.apply_env();
    info!(site = %site.host(), pipeline = %site.pipeline_name(), "Loaded site configuration");

    let credentials = Arc::new(EnvCredentialProvider::default());
    let collaborators = bootstrap::collaborators(&site, credentials, false)?;
    let scheduler = bootstrap::start_scheduler(&site, collaborators.clone()).await?;
    if bootstrap::spawn_poller(&site, &collaborators, scheduler.clone()).is_none() {
        info!("Branch polling disabled; relying on webhooks");
    }

    let mut state = AppState::new(
        site.clone(),
        scheduler,
        collaborators.source.clone(),
        collaborators.store.clone(),
    );
    match site.runtime.webhook_secret() {
        Some(secret) => state = state.with_webhook_secret(secret),
        None => warn!(
            var = %site.runtime.webhook_secret_env,
            "Webhook secret not set; webhook signatures will not be verified"
        ),
    }

    let app = routes::router(state).layer(TraceLayer::new_for_http());

    info!("Starting server on {}", site.runtime.bind);
    let listener = TcpListener::bind(&site.runtime.bind)
        .await
        .with_context(|| format!("failed to bind {}", site.runtime.bind))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutting down");
    }
}

//! dhk-daemon entry point.
//!
//! Sets up tracing, loads the layered configuration, builds the account
//! registry, starts the sync scheduler and serves the HTTP surface. Route
//! handlers live in `routes.rs`; shared state in `state.rs`.

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use clap::Parser;
use dhk_daemon::{
    cli::{self, Cli, Commands},
    routes, state,
};
use dhk_remote::{HttpTransport, Transport};
use dhk_sync::{AccountRegistry, SyncScheduler};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{error, info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    let cli = Cli::parse();
    init_tracing(cli.verbosity);

    if let Some(Commands::CreateConfig { login, password }) = &cli.cmd {
        let yaml = cli::create_config(login, password).await?;
        print!("{yaml}");
        return Ok(());
    }

    let paths: Vec<&str> = cli.config_paths.iter().map(String::as_str).collect();
    let (loaded, config) = dhk_config::load_bridge_config(&paths)?;
    info!(
        config_hash = %loaded.config_hash,
        systems = config.systems.len(),
        "configuration loaded"
    );

    let transport: Arc<dyn Transport> = Arc::new(
        HttpTransport::new(config.scheduler.http_timeout()).context("build http transport")?,
    );
    let registry = Arc::new(AccountRegistry::from_config(&config, transport));
    let scheduler = Arc::new(SyncScheduler::new(Arc::clone(&registry), &config.scheduler));

    let shared = Arc::new(state::AppState::new(Arc::clone(&registry)));
    state::spawn_heartbeat(shared.bus.clone(), Duration::from_secs(15));
    state::spawn_event_relay(&shared);

    let sync_loop = scheduler.start();

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    info!("dhk-daemon listening on http://{}", cli.addr);
    axum::serve(tokio::net::TcpListener::bind(cli.addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    // Let the cycle in progress finish, then leave.
    scheduler.stop();
    if let Err(e) = sync_loop.await {
        error!(error = %e, "sync loop ended abnormally");
    }
    info!("dhk-daemon stopped");
    Ok(())
}

fn init_tracing(verbosity: u8) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli::verbosity_filter(verbosity).into()),
        )
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "ctrl-c handler failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "SIGTERM handler failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown requested");
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = ["http://localhost", "http://127.0.0.1"];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}

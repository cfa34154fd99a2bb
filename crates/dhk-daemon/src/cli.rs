//! Command-line surface and the `create-config` helper.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dhk_config::render_sample;
use dhk_remote::{HttpTransport, RemoteGateway, Transport, DEFAULT_TIMEOUT};
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "dhk-daemon")]
#[command(about = "Bridge between the vendor alarm cloud and home-automation accessories", long_about = None)]
pub struct Cli {
    /// Config paths in merge order (base -> site -> secrets...)
    #[arg(
        short = 'c',
        long = "config",
        env = "DHK_CONFIG",
        value_delimiter = ',',
        default_value = "dhk.yaml"
    )]
    pub config_paths: Vec<String>,

    /// Listen address of the HTTP surface
    #[arg(short = 'a', long = "addr", env = "DHK_ADDR", default_value = "127.0.0.1:51826")]
    pub addr: SocketAddr,

    /// 0 = warn, 1 = info, 2+ = debug (RUST_LOG overrides)
    #[arg(short = 'v', long = "verbosity", env = "DHK_VERBOSITY", default_value_t = 1)]
    pub verbosity: u8,

    #[command(subcommand)]
    pub cmd: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Log in, list the account's installations and print a config skeleton
    CreateConfig {
        #[arg(long)]
        login: String,

        #[arg(long, env = "DHK_PASSWORD", hide_env_values = true)]
        password: String,
    },
}

/// Default log filter for a verbosity level.
pub fn verbosity_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

/// YAML skeleton for every installation of the account.
pub async fn create_config(login: &str, password: &str) -> Result<String> {
    let transport: Arc<dyn Transport> =
        Arc::new(HttpTransport::new(DEFAULT_TIMEOUT).context("build http transport")?);
    create_config_with(transport, login, password).await
}

pub async fn create_config_with(
    transport: Arc<dyn Transport>,
    login: &str,
    password: &str,
) -> Result<String> {
    let mut gateway = RemoteGateway::new(login, password, transport);
    if !gateway.login().await.context("login")? {
        bail!("login refused for {login}");
    }

    let listing = gateway.list_systems().await;
    if let Err(e) = gateway.logout().await {
        warn!(account = %login, error = %e, "logout failed");
    }
    let listing = listing.context("list systems")?;
    info!(account = %login, systems = listing.systems.len(), "systems listed");

    render_sample(login, &listing.systems)
}

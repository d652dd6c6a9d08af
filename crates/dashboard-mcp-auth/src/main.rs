//! Dashboard MCP Authorization Server - Entry Point

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use dashboard_mcp_auth::{
    config::{Config, parse_seed_clients},
    server::AuthServer,
};

#[derive(Parser, Debug)]
#[command(name = "dashboard-mcp-auth")]
#[command(about = "OAuth 2.1 authorization server for dashboard MCP clients")]
#[command(version)]
struct Cli {
    /// HTTP server port
    #[arg(long, default_value = "8000", env = "PORT")]
    port: u16,

    /// Host used when requests carry no Host or X-Forwarded-Host header
    #[arg(long, env = "FALLBACK_HOST")]
    fallback_host: Option<String>,

    /// Operator password for the interactive login step
    #[arg(long, env = "DASHBOARD_LOGIN_PASSWORD", hide_env_values = true)]
    login_password: Option<String>,

    /// HMAC key for the authorization parameter cookie (random if unset)
    #[arg(long, env = "OAUTH_COOKIE_SECRET", hide_env_values = true)]
    cookie_secret: Option<String>,

    /// Trusted clients: `id|name|uri1,uri2[|scope]`, separated by `;`
    #[arg(long, env = "OAUTH_SEED_CLIENTS")]
    seed_clients: Option<String>,

    /// Dynamic registrations accepted per minute (0 disables the limit)
    #[arg(long, env = "OAUTH_REGISTRATIONS_PER_MINUTE")]
    registrations_per_minute: Option<u32>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        subscriber.with(tracing_subscriber::fmt::layer().compact()).init();
    }
}

fn build_config(cli: Cli) -> anyhow::Result<Config> {
    let mut config = Config::new(cli.login_password, cli.cookie_secret);

    if let Some(host) = cli.fallback_host {
        config.fallback_host = host;
    }
    if let Some(limit) = cli.registrations_per_minute {
        config.registrations_per_minute = limit;
    }
    if let Some(seeds) = cli.seed_clients {
        config.seed_clients = parse_seed_clients(&seeds)?;
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.json_logs);

    let port = cli.port;
    let config = build_config(cli)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        port,
        login_enabled = config.has_login_password(),
        "Starting dashboard authorization server"
    );
    if !config.has_login_password() {
        tracing::warn!("DASHBOARD_LOGIN_PASSWORD is not set; every login attempt will fail");
    }

    let server = AuthServer::new(config).await?;
    server.run_http(port).await
}

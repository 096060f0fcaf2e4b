use anyhow::Context;
use std::sync::Arc;
use tokengate::{
    api::routes::create_router, cli::Cli, db::MemoryUserStore, AppState, ConfigManager,
    TokenGateConfig,
};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse_args();

    let config_exists = cli.config.exists();
    let mut manager = if config_exists {
        ConfigManager::new(&cli.config)
            .with_context(|| format!("failed to load {}", cli.config.display()))?
    } else {
        ConfigManager::from_config(TokenGateConfig::default())
    };
    let config = manager.config();

    init_tracing(&config.server.log_level, cli.json_logs);
    if !config_exists {
        warn!(path = %cli.config.display(), "config file not found, using defaults");
    }

    let auth = config.build_auth().context("failed to set up authentication")?;
    manager.attach(auth.clone());
    if cli.watch && config_exists {
        manager
            .start_watching()
            .context("failed to watch configuration file")?;
    }

    let state = AppState::new(auth, Arc::new(MemoryUserStore::new()));
    let app = create_router(state);

    let host = cli.host.unwrap_or_else(|| config.server.host.clone());
    let port = cli.port.unwrap_or(config.server.port);
    let addr = format!("{host}:{port}");

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(address = %addr, token_expiration = %config.auth.token_expiration, "tokengate-server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("tokengate-server stopped");
    Ok(())
}

fn init_tracing(default_level: &str, json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {}", e);
    }
}

mod app;
mod auth;
mod config;
mod db;
mod error;
mod health;
mod state;
mod users;

use crate::config::{AppConfig, AppMode};

fn init_tracing(mode: AppMode) {
    let default_filter = match mode {
        AppMode::Debug => "userauth=debug,axum=info,tower_http=info",
        AppMode::Release => "userauth=info,axum=warn,tower_http=info",
    };
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(mode == AppMode::Release);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;
    init_tracing(config.mode);

    if std::env::args().nth(1).as_deref() == Some("health") {
        match health::probe(config.port).await {
            Ok(()) => {
                tracing::info!("health check passed");
                std::process::exit(0);
            }
            Err(e) => {
                tracing::error!(error = %e, "health check failed");
                std::process::exit(1);
            }
        }
    }

    tracing::info!(mode = ?config.mode, "starting userauth");
    let state = state::AppState::init(config).await?;
    app::serve(state).await
}

use std::time::Duration;

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::info;

use crate::{config::DbConfig, users::repo::DB_CALL_TIMEOUT};

const MAX_CONNECTIONS: u32 = 50;
const IDLE_TIMEOUT: Duration = Duration::from_secs(10 * 60);
const MAX_LIFETIME: Duration = Duration::from_secs(60 * 60);

fn pool_options() -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .acquire_timeout(DB_CALL_TIMEOUT)
        .idle_timeout(IDLE_TIMEOUT)
        .max_lifetime(MAX_LIFETIME)
}

/// Connects the pool and brings the schema up to date.
pub async fn connect(cfg: &DbConfig) -> anyhow::Result<PgPool> {
    let db = pool_options()
        .connect(&cfg.database_url())
        .await
        .with_context(|| format!("connect to database {} on {}:{}", cfg.name, cfg.host, cfg.port))?;

    sqlx::migrate!("./migrations")
        .run(&db)
        .await
        .context("run database migrations")?;
    info!(database = %cfg.name, "database ready");
    Ok(db)
}

/// A pool that only dials out on first use.
#[cfg(test)]
pub fn connect_lazy(url: &str) -> anyhow::Result<PgPool> {
    pool_options()
        .connect_lazy(url)
        .context("build lazy database pool")
}

/// Round-trips a trivial query, bounded by the per-call timeout.
pub async fn ping(db: &PgPool) -> anyhow::Result<()> {
    tokio::time::timeout(DB_CALL_TIMEOUT, sqlx::query("SELECT 1").execute(db))
        .await
        .context("database ping timed out")?
        .context("database ping failed")?;
    Ok(())
}

use std::time::Duration;

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use tracing::{error, instrument};

use crate::{db, state::AppState};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub message: &'static str,
}

#[instrument(skip(state))]
pub async fn check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    match db::ping(&state.db).await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                message: "service is healthy",
            }),
        ),
        Err(e) => {
            error!(error = %e, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "error",
                    message: "database ping failed",
                }),
            )
        }
    }
}

/// Calls the local `/health` endpoint; used by `userauth health` in container probes.
pub async fn probe(port: u16) -> anyhow::Result<()> {
    let url = format!("http://localhost:{port}/health");
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?;
    let res = client.get(&url).send().await?;
    let status = res.status();
    if status != reqwest::StatusCode::OK {
        anyhow::bail!("health check failed with status {status}");
    }
    Ok(())
}

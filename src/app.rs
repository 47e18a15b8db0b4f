use std::{future::IntoFuture, net::SocketAddr, time::Duration};

use anyhow::Context;
use axum::{routing::get, Router};
use tokio::sync::oneshot;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::state::AppState;
use crate::{auth, health, users};

/// How long in-flight requests get to finish once shutdown starts.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .nest(
            "/api",
            Router::new()
                .merge(auth::router())
                .merge(users::router(state.clone())),
        )
        .route("/health", get(health::check))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!(
                        "http_request",
                        %method,
                        uri = %uri,
                        status = tracing::field::Empty
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        )
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
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
                warn!(error = %e, "failed to listen for SIGTERM");
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
}

/// Serves until SIGINT/SIGTERM, drains for up to [`SHUTDOWN_GRACE`], then closes the pool.
pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", state.config.host, state.config.port)
        .parse()
        .context("parse listen address")?;
    let db = state.db.clone();
    let app = build_app(state);

    info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = stop_rx.await;
    });
    let mut server = std::pin::pin!(server.into_future());

    tokio::select! {
        res = &mut server => res.context("server error")?,
        _ = shutdown_signal() => {
            info!("shutting down server");
            let _ = stop_tx.send(());
            match tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await {
                Ok(res) => res.context("server error during shutdown")?,
                Err(_) => warn!(
                    grace_secs = SHUTDOWN_GRACE.as_secs(),
                    "in-flight requests did not finish, forcing shutdown"
                ),
            }
        }
    }

    db.close().await;
    info!("server exiting");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::memory::InMemoryUserRepository;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::{json, Value};
    use time::OffsetDateTime;
    use tower::ServiceExt;

    fn test_app() -> (Router, InMemoryUserRepository) {
        let repo = InMemoryUserRepository::new();
        (build_app(AppState::fake(repo.clone())), repo)
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn post_json(uri: &str, body: &Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn profile(authorization: Option<&str>) -> Request<Body> {
        let mut req = Request::get("/api/user/profile");
        if let Some(value) = authorization {
            req = req.header(header::AUTHORIZATION, value);
        }
        req.body(Body::empty()).unwrap()
    }

    fn signed(secret: &str, payload: Value) -> String {
        encode(
            &Header::default(),
            &payload,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn later() -> i64 {
        OffsetDateTime::now_utc().unix_timestamp() + 3600
    }

    async fn register_and_login(app: &Router) -> (Value, String) {
        let creds = json!({"email": "a@b.com", "password": "password1", "full_name": "A B"});
        let (status, user) = send(app, post_json("/api/auth/register", &creds)).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(
            app,
            post_json("/api/auth/login", &json!({"email": "a@b.com", "password": "password1"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let token = body["token"].as_str().expect("token string").to_string();
        (user, token)
    }

    #[tokio::test]
    async fn register_login_then_read_profile() {
        let (app, _) = test_app();
        let (user, token) = register_and_login(&app).await;

        assert!(user["id"].is_string());
        assert_eq!(user["email"], "a@b.com");
        assert_eq!(user["full_name"], "A B");
        assert!(user["created_at"].is_string());
        assert!(user["updated_at"].is_string());
        assert!(user.get("password_hash").is_none());
        assert_eq!(token.split('.').count(), 3);

        let (status, me) = send(&app, profile(Some(&format!("Bearer {token}")))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me, user);
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let (app, repo) = test_app();
        let creds = json!({"email": "a@b.com", "password": "password1", "full_name": "A B"});

        let (status, _) = send(&app, post_json("/api/auth/register", &creds)).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(&app, post_json("/api/auth/register", &creds)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"error": "email already registered"}));
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn registration_input_is_validated_before_the_service() {
        let (app, repo) = test_app();

        let cases = [
            (json!({"email": "", "password": "password1", "full_name": "A"}), "email"),
            (json!({"email": "nope", "password": "password1", "full_name": "A"}), "email"),
            (json!({"email": "a@b.com", "password": "short", "full_name": "A"}), "password"),
            (json!({"email": "a@b.com", "password": "password1", "full_name": ""}), "full_name"),
            (json!({"email": "a@b.com", "password": "password1"}), "full_name"),
        ];
        for (body, field) in cases {
            let (status, res) = send(&app, post_json("/api/auth/register", &body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
            let msg = res["error"].as_str().unwrap();
            assert!(msg.starts_with(&format!("{field}:")), "{msg}");
        }

        let garbage = Request::post("/api/auth/register")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, res) = send(&app, garbage).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(res["error"].is_string());

        assert_eq!(repo.len(), 0);
    }

    #[tokio::test]
    async fn login_failures_look_the_same() {
        let (app, _) = test_app();
        register_and_login(&app).await;

        let wrong_password = send(
            &app,
            post_json("/api/auth/login", &json!({"email": "a@b.com", "password": "password2"})),
        )
        .await;
        let unknown_email = send(
            &app,
            post_json("/api/auth/login", &json!({"email": "x@b.com", "password": "password1"})),
        )
        .await;

        assert_eq!(wrong_password.0, StatusCode::BAD_REQUEST);
        assert_eq!(wrong_password, unknown_email);
        assert_eq!(wrong_password.1, json!({"error": "invalid credentials"}));

        let (status, body) = send(
            &app,
            post_json("/api/auth/login", &json!({"email": "a@b.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "password: is required");
    }

    #[tokio::test]
    async fn middleware_rejects_bad_credentials_before_the_handler() {
        let (app, _) = test_app();
        // A subject that does not exist: reaching the handler would yield 404.
        let ghost = uuid::Uuid::new_v4().to_string();

        let an_hour_ago = OffsetDateTime::now_utc().unix_timestamp() - 3600;
        let expired = signed(
            "test-secret",
            json!({"user_id": ghost, "email": "a@b.com", "exp": an_hour_ago}),
        );
        let foreign = signed(
            "other-secret",
            json!({"user_id": ghost, "email": "a@b.com", "exp": later()}),
        );
        let no_user_id = signed("test-secret", json!({"email": "a@b.com", "exp": later()}));
        let no_email = signed("test-secret", json!({"user_id": ghost, "exp": later()}));
        let not_uuid = signed(
            "test-secret",
            json!({"user_id": "42", "email": "a@b.com", "exp": later()}),
        );

        let cases = [
            (None, "authorization header required"),
            (Some("".to_string()), "authorization header required"),
            (Some("Token abc".to_string()), "invalid authorization header format"),
            (Some(format!("bearer {expired}")), "invalid authorization header format"),
            (Some("Bearer a b".to_string()), "invalid authorization header format"),
            (Some("Bearer not-a-jwt".to_string()), "invalid token"),
            (Some(format!("Bearer {expired}")), "invalid token"),
            (Some(format!("Bearer {foreign}")), "invalid token"),
            (Some(format!("Bearer {no_user_id}")), "invalid token claims"),
            (Some(format!("Bearer {no_email}")), "invalid token claims"),
            (Some(format!("Bearer {not_uuid}")), "invalid token claims"),
        ];
        for (authorization, expected) in cases {
            let (status, body) = send(&app, profile(authorization.as_deref())).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{authorization:?}");
            assert_eq!(body, json!({"error": expected}), "{authorization:?}");
        }
    }

    #[tokio::test]
    async fn valid_token_for_missing_user_is_not_found() {
        let (app, repo) = test_app();
        let (user, token) = register_and_login(&app).await;

        let id = user["id"].as_str().unwrap().parse().unwrap();
        repo.remove(id);

        let (status, body) = send(&app, profile(Some(&format!("Bearer {token}")))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"error": "user not found"}));
    }

    #[tokio::test]
    async fn profile_handler_without_identity_is_unauthorized() {
        let state = AppState::fake(InMemoryUserRepository::new());
        let bare = Router::new()
            .route("/profile", get(users::handlers::get_profile))
            .with_state(state);

        let req = Request::get("/profile").body(Body::empty()).unwrap();
        let (status, body) = send(&bare, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({"error": "unauthorized"}));
    }

    #[tokio::test]
    async fn health_reports_unreachable_database() {
        let (app, _) = test_app();
        let req = Request::get("/health").body(Body::empty()).unwrap();
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "error");
    }
}

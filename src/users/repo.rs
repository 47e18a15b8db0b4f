use std::{future::Future, time::Duration};

use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use super::repo_types::{NewUser, User};

/// Upper bound on a single database round trip.
pub const DB_CALL_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("a user with this email already exists")]
    Duplicate,

    #[error("database call timed out")]
    Timeout,

    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl From<sqlx::Error> for RepoError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => Self::Duplicate,
            _ => Self::Database(err),
        }
    }
}

/// Data access for user rows. A missing row is `Ok(None)`, not an error.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: NewUser) -> Result<User, RepoError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepoError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, RepoError>;
}

#[derive(Debug, Clone)]
pub struct PgUserRepository {
    db: PgPool,
    timeout: Duration,
}

impl PgUserRepository {
    pub fn new(db: PgPool) -> Self {
        Self {
            db,
            timeout: DB_CALL_TIMEOUT,
        }
    }
}

/// Runs a query under the per-call deadline.
async fn bounded<T, F>(limit: Duration, op: &'static str, fut: F) -> Result<T, RepoError>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => res.map_err(RepoError::from),
        Err(_) => {
            warn!(op, timeout_ms = limit.as_millis() as u64, "database call timed out");
            Err(RepoError::Timeout)
        }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, user: NewUser) -> Result<User, RepoError> {
        let query = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, password_hash, full_name)
            VALUES ($1, $2, $3, $4)
            RETURNING id, email, password_hash, full_name, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.full_name)
        .fetch_one(&self.db);
        bounded(self.timeout, "users.create", query).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepoError> {
        let query = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, full_name, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db);
        bounded(self.timeout, "users.find_by_email", query).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, RepoError> {
        let query = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, full_name, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db);
        bounded(self.timeout, "users.find_by_id", query).await
    }
}

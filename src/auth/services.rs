use std::sync::Arc;

use tracing::{error, info, warn};

use super::{
    jwt::JwtKeys,
    password::{hash_password, verify_password},
};
use crate::{
    error::AppError,
    users::{
        repo::UserRepository,
        repo_types::{NewUser, User},
    },
};

/// Registration and login over a user repository.
#[derive(Clone)]
pub struct AuthService {
    repo: Arc<dyn UserRepository>,
    keys: JwtKeys,
}

impl AuthService {
    pub fn new(repo: Arc<dyn UserRepository>, keys: JwtKeys) -> Self {
        Self { repo, keys }
    }

    /// Hashes the password and stores a new user.
    ///
    /// The existence check and the insert are not one transaction; a
    /// concurrent registration for the same email is caught by the unique
    /// index and reported as the same duplicate-email error.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
    ) -> Result<User, AppError> {
        match self.repo.find_by_email(email).await {
            Ok(Some(_)) => {
                warn!(email, "email already registered");
                return Err(AppError::EmailTaken);
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, email, "pre-registration lookup failed"),
        }

        let password_hash = hash_password(password)?;
        let user = self
            .repo
            .create(NewUser {
                email: email.to_string(),
                password_hash,
                full_name: full_name.to_string(),
            })
            .await?;

        info!(user_id = %user.id, email = %user.email, "user registered");
        Ok(user)
    }

    /// Returns a signed token. Every failure to authenticate is the same
    /// `InvalidCredentials`, whichever part was wrong.
    pub async fn login(&self, email: &str, password: &str) -> Result<String, AppError> {
        let user = match self.repo.find_by_email(email).await {
            Ok(Some(u)) => u,
            Ok(None) => {
                warn!(email, "login unknown email");
                return Err(AppError::InvalidCredentials);
            }
            Err(e) => {
                error!(error = %e, "find_by_email failed");
                return Err(AppError::InvalidCredentials);
            }
        };

        let ok = verify_password(password, &user.password_hash).unwrap_or_else(|e| {
            error!(error = %e, user_id = %user.id, "stored hash unreadable");
            false
        });
        if !ok {
            warn!(email, user_id = %user.id, "login invalid password");
            return Err(AppError::InvalidCredentials);
        }

        let token = self.keys.sign(&user)?;
        info!(user_id = %user.id, "user logged in");
        Ok(token)
    }
}

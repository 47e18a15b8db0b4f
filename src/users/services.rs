use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use super::{repo::UserRepository, repo_types::User};
use crate::error::AppError;

#[derive(Clone)]
pub struct UserService {
    repo: Arc<dyn UserRepository>,
}

impl UserService {
    pub fn new(repo: Arc<dyn UserRepository>) -> Self {
        Self { repo }
    }

    pub async fn get_user_by_id(&self, id: Uuid) -> Result<User, AppError> {
        match self.repo.find_by_id(id).await? {
            Some(user) => Ok(user),
            None => {
                debug!(user_id = %id, "user lookup missed");
                Err(AppError::NotFound("user not found".into()))
            }
        }
    }
}

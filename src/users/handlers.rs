use axum::{extract::State, routing::get, Json, Router};
use tracing::instrument;

use crate::{auth::extractors::AuthUser, error::AppError, state::AppState, users::PublicUser};

pub fn user_routes() -> Router<AppState> {
    Router::new().route("/user/profile", get(get_profile))
}

#[instrument(skip(state, user), fields(user_id = %user.user_id, email = %user.email))]
pub async fn get_profile(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<PublicUser>, AppError> {
    let found = state.users.get_user_by_id(user.user_id).await?;
    Ok(Json(found.into()))
}

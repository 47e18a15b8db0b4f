use serde::{Deserialize, Serialize};

/// JWT payload issued at login.
///
/// `user_id` and `email` default to empty so that a token missing them still
/// decodes and can be rejected as having bad claims rather than a bad signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub user_id: String, // UUID of the user, as a string
    #[serde(default)]
    pub email: String,
    pub exp: usize, // expires at (unix timestamp)
}

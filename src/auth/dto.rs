use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const MIN_PASSWORD_LEN: usize = 8;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Request body for user registration.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub full_name: String,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Response returned after a successful login.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

fn check_email(email: &str, problems: &mut Vec<String>) {
    if email.is_empty() {
        problems.push("email: is required".into());
    } else if !is_valid_email(email) {
        problems.push("email: must be a valid email address".into());
    }
}

fn into_result(problems: Vec<String>) -> Result<(), AppError> {
    if problems.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(problems.join("; ")))
    }
}

impl RegisterRequest {
    pub fn normalize(&mut self) {
        self.email = self.email.trim().to_lowercase();
        self.full_name = self.full_name.trim().to_string();
    }

    pub fn validate(&self) -> Result<(), AppError> {
        let mut problems = Vec::new();
        check_email(&self.email, &mut problems);
        if self.password.is_empty() {
            problems.push("password: is required".into());
        } else if self.password.chars().count() < MIN_PASSWORD_LEN {
            problems.push(format!(
                "password: must be at least {MIN_PASSWORD_LEN} characters"
            ));
        }
        if self.full_name.is_empty() {
            problems.push("full_name: is required".into());
        }
        into_result(problems)
    }
}

impl LoginRequest {
    pub fn normalize(&mut self) {
        self.email = self.email.trim().to_lowercase();
    }

    pub fn validate(&self) -> Result<(), AppError> {
        let mut problems = Vec::new();
        check_email(&self.email, &mut problems);
        if self.password.is_empty() {
            problems.push("password: is required".into());
        }
        into_result(problems)
    }
}

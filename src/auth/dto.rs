use serde::{Deserialize, Serialize};

use crate::store::User;

/// Body of `POST /auth/google/callback`.
#[derive(Debug, Deserialize)]
pub struct GoogleCallbackRequest {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: &'static str,
    pub token: String,
    pub user: User,
    pub firstlogin: bool,
}

#[derive(Debug, Serialize)]
pub struct VerifyTokenResponse {
    pub message: &'static str,
    pub user: User,
}

use axum::{
    extract::{rejection::JsonRejection, State},
    response::Redirect,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument};

use super::{
    dto::{GoogleCallbackRequest, LoginResponse, VerifyTokenResponse},
    extractors::AuthUser,
    services::{login_with_google, oauth_state},
};
use crate::{
    error::{AppError, AppResult},
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/google", get(google_login))
        .route("/auth/google/callback", post(google_callback))
        .route("/verify-token", get(verify_token))
}

#[instrument(skip(state))]
pub async fn google_login(State(state): State<AppState>) -> AppResult<Redirect> {
    let url = state
        .identity
        .consent_url(&oauth_state())
        .map_err(AppError::internal("Google login is not configured"))?;
    Ok(Redirect::temporary(&url))
}

#[instrument(skip(state, payload))]
pub async fn google_callback(
    State(state): State<AppState>,
    payload: Result<Json<GoogleCallbackRequest>, JsonRejection>,
) -> AppResult<Json<LoginResponse>> {
    let Json(payload) = payload.map_err(|_| AppError::bad_request("Invalid request"))?;

    let login =
        login_with_google(state.store.as_ref(), state.identity.as_ref(), &payload.token).await?;

    let token = state
        .jwt
        .sign(login.user.id)
        .map_err(AppError::internal("Failed to generate token"))?;

    info!(user_id = %login.user.id, first_login = login.first_login, "user logged in");
    Ok(Json(LoginResponse {
        message: "Login successful",
        token,
        user: login.user,
        firstlogin: login.first_login,
    }))
}

#[instrument(skip(state))]
pub async fn verify_token(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<VerifyTokenResponse>> {
    let user = state
        .store
        .find_user(user_id)
        .await
        .map_err(AppError::internal("Failed to fetch user"))?
        .ok_or_else(|| AppError::unauthorized("User not found"))?;

    Ok(Json(VerifyTokenResponse {
        message: "Token is valid",
        user,
    }))
}

use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::extractors::AuthUser,
    error::{AppError, AppResult},
    state::AppState,
    store::Store,
};

const UPDATE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct UpdateProfileResponse {
    pub message: &'static str,
}

/// Sets the display name; nothing else on the user changes.
pub async fn update_display_name(store: &dyn Store, user_id: Uuid, name: &str) -> AppResult<()> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("Name cannot be empty"));
    }

    let updated = tokio::time::timeout(
        UPDATE_TIMEOUT,
        store.update_user_name(user_id, name, OffsetDateTime::now_utc()),
    )
    .await
    .map_err(AppError::internal("Failed to update user"))?
    .map_err(AppError::internal("Failed to update user"))?;

    if !updated {
        return Err(AppError::not_found("User not found"));
    }
    info!(%user_id, "display name updated");
    Ok(())
}

#[instrument(skip(state, payload))]
pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> AppResult<Json<UpdateProfileResponse>> {
    let Json(payload) = payload?;
    update_display_name(state.store.as_ref(), user_id, &payload.name).await?;
    Ok(Json(UpdateProfileResponse {
        message: "User name updated successfully",
    }))
}

use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use super::dto::{CreateCommentRequest, CreateResolutionRequest};
use crate::{
    error::{AppError, AppResult},
    store::{Comment, Like, LikeToggle, Resolution, Store},
};

/// Parses a client-supplied resolution reference. Missing or nil ids are
/// treated alike.
pub fn parse_resolution_id(raw: Option<&str>) -> AppResult<Uuid> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty());
    let Some(raw) = raw else {
        return Err(AppError::bad_request("ResolutionID is required"));
    };
    match Uuid::parse_str(raw) {
        Ok(id) if id.is_nil() => Err(AppError::bad_request("ResolutionID is required")),
        Ok(id) => Ok(id),
        Err(_) => Err(AppError::bad_request("Invalid resolution ID")),
    }
}

async fn ensure_resolution_exists(store: &dyn Store, r_id: Uuid) -> AppResult<()> {
    let found = store
        .find_resolution(r_id)
        .await
        .map_err(AppError::internal("Failed to retrieve resolution"))?;
    match found {
        Some(_) => Ok(()),
        None => Err(AppError::not_found("Resolution not found")),
    }
}

pub async fn create_resolution(
    store: &dyn Store,
    owner: Uuid,
    req: CreateResolutionRequest,
) -> AppResult<Uuid> {
    let text = req.resolution.trim();
    if text.is_empty() {
        warn!(%owner, "empty resolution rejected");
        return Err(AppError::bad_request("Resolution cannot be empty"));
    }
    let tags: Vec<String> = req
        .tags
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();

    let now = OffsetDateTime::now_utc();
    let resolution = Resolution {
        id: Uuid::new_v4(),
        user_id: owner,
        resolution: text.to_string(),
        tags,
        created_at: now,
        updated_at: now,
    };
    store
        .insert_resolution(&resolution)
        .await
        .map_err(AppError::internal("Failed to create resolution"))?;

    info!(r_id = %resolution.id, %owner, "resolution created");
    Ok(resolution.id)
}

pub async fn create_comment(
    store: &dyn Store,
    author: Uuid,
    req: CreateCommentRequest,
) -> AppResult<Uuid> {
    let r_id = parse_resolution_id(req.r_id.as_deref())?;
    let text = req.comment.trim();
    if text.is_empty() {
        return Err(AppError::bad_request("Comment cannot be empty"));
    }
    ensure_resolution_exists(store, r_id).await?;

    let now = OffsetDateTime::now_utc();
    let comment = Comment {
        id: Uuid::new_v4(),
        r_id,
        user_id: author,
        comment: text.to_string(),
        created_at: now,
        updated_at: now,
    };
    store
        .insert_comment(&comment)
        .await
        .map_err(AppError::internal("Failed to create comment"))?;

    info!(comment_id = %comment.id, %r_id, %author, "comment created");
    Ok(comment.id)
}

pub async fn toggle_like(store: &dyn Store, user_id: Uuid, r_id: Uuid) -> AppResult<LikeToggle> {
    ensure_resolution_exists(store, r_id).await?;

    let now = OffsetDateTime::now_utc();
    let like = Like {
        id: Uuid::new_v4(),
        user_id,
        r_id,
        created_at: now,
        updated_at: now,
    };
    let outcome = store
        .toggle_like(&like)
        .await
        .map_err(AppError::internal("Failed to toggle like"))?;

    info!(%r_id, %user_id, ?outcome, "like toggled");
    Ok(outcome)
}

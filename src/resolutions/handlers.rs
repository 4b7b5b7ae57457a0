use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::{
    dto::{
        CreateCommentRequest, CreateResolutionRequest, CreatedCommentResponse,
        CreatedResolutionResponse, PageQuery, ResolutionPage, ResolutionResponse,
        ToggleLikeRequest, ToggleLikeResponse,
    },
    query::{self, Page},
    services,
};
use crate::{
    auth::extractors::{AuthUser, MaybeAuthUser},
    error::{AppError, AppResult},
    state::AppState,
    store::{LikeToggle, Scope},
};

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/resolution", get(list_resolutions))
        .route("/resolution/me", get(my_resolutions))
        .route("/resolution/:id", get(get_resolution))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/resolution", post(create_resolution))
        .route("/resolution/likes", post(toggle_like))
        .route("/resolution/comments", post(create_comment))
}

/// An unreadable query string pages like an absent one.
fn page_or_default(q: Result<Query<PageQuery>, QueryRejection>) -> Page {
    match q {
        Ok(Query(q)) => Page::from_query(&q),
        Err(rejection) => {
            debug!(error = %rejection.body_text(), "query string ignored");
            Page::default()
        }
    }
}

#[instrument(skip(state))]
pub async fn list_resolutions(
    State(state): State<AppState>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    q: Result<Query<PageQuery>, QueryRejection>,
) -> AppResult<Json<ResolutionPage>> {
    let page = query::list_resolutions(
        state.store.as_ref(),
        Scope::All,
        page_or_default(q),
        viewer,
    )
    .await
    .map_err(AppError::internal("Failed to retrieve resolutions"))?;
    Ok(Json(page))
}

#[instrument(skip(state))]
pub async fn my_resolutions(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    q: Result<Query<PageQuery>, QueryRejection>,
) -> AppResult<Json<ResolutionPage>> {
    let page = query::list_resolutions(
        state.store.as_ref(),
        Scope::OwnedBy(user_id),
        page_or_default(q),
        Some(user_id),
    )
    .await
    .map_err(AppError::internal("Failed to retrieve resolutions"))?;
    Ok(Json(page))
}

#[instrument(skip(state))]
pub async fn get_resolution(
    State(state): State<AppState>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<ResolutionResponse>> {
    let id = Uuid::parse_str(id.trim()).map_err(|_| AppError::bad_request("Invalid resolution ID"))?;

    let detail = query::get_resolution(state.store.as_ref(), id, viewer)
        .await
        .map_err(AppError::internal("Failed to retrieve resolution"))?
        .ok_or_else(|| AppError::not_found("Resolution not found"))?;

    let has_liked = detail.resolution.is_liked;
    Ok(Json(ResolutionResponse {
        data: detail,
        has_liked,
    }))
}

#[instrument(skip(state, payload))]
pub async fn create_resolution(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<CreateResolutionRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<CreatedResolutionResponse>)> {
    let Json(payload) = payload?;
    let r_id = services::create_resolution(state.store.as_ref(), user_id, payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreatedResolutionResponse {
            message: "Resolution created successfully",
            r_id,
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn create_comment(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<CreateCommentRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<CreatedCommentResponse>)> {
    let Json(payload) = payload?;
    let comment_id = services::create_comment(state.store.as_ref(), user_id, payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreatedCommentResponse {
            message: "Comment created successfully",
            comment_id,
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn toggle_like(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<ToggleLikeRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<ToggleLikeResponse>)> {
    let Json(payload) = payload?;
    let r_id = services::parse_resolution_id(payload.r_id.as_deref())?;

    let response = match services::toggle_like(state.store.as_ref(), user_id, r_id).await? {
        LikeToggle::Liked => (
            StatusCode::CREATED,
            Json(ToggleLikeResponse {
                message: "Resolution liked successfully",
                liked: true,
            }),
        ),
        LikeToggle::Unliked => (
            StatusCode::OK,
            Json(ToggleLikeResponse {
                message: "Resolution unliked successfully",
                liked: false,
            }),
        ),
    };
    Ok(response)
}

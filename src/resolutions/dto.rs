use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::store::User;

/// Raw `page`/`limit` query parameters; parsed leniently by [`super::query::Page`].
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateResolutionRequest {
    #[serde(default)]
    pub resolution: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Any `user_id` a client sends is ignored; the author is the caller.
#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub r_id: Option<String>,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Deserialize)]
pub struct ToggleLikeRequest {
    pub r_id: Option<String>,
}

/// Public face of a user: never carries the email.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UserDetail {
    pub id: Uuid,
    pub name: String,
    pub image: String,
}

impl From<&User> for UserDetail {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            name: u.name.clone(),
            image: u.image.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolutionView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub resolution: String,
    pub tags: Vec<String>,
    pub like_count: i64,
    pub comment_count: i64,
    pub user_detail: Option<UserDetail>,
    #[serde(rename = "isLiked")]
    pub is_liked: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommentView {
    pub id: Uuid,
    pub r_id: Uuid,
    pub user_id: Uuid,
    pub comment: String,
    pub user_detail: Option<UserDetail>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolutionDetail {
    #[serde(flatten)]
    pub resolution: ResolutionView,
    pub comments: Vec<CommentView>,
}

#[derive(Debug, Serialize)]
pub struct ResolutionPage {
    pub resolutions: Vec<ResolutionView>,
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub has_more: bool,
}

#[derive(Debug, Serialize)]
pub struct ResolutionResponse {
    pub data: ResolutionDetail,
    #[serde(rename = "hasLiked")]
    pub has_liked: bool,
}

#[derive(Debug, Serialize)]
pub struct CreatedResolutionResponse {
    pub message: &'static str,
    pub r_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct CreatedCommentResponse {
    pub message: &'static str,
    pub comment_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ToggleLikeResponse {
    pub message: &'static str,
    pub liked: bool,
}

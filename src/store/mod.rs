use std::collections::{HashMap, HashSet};
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// The four collections the service persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Users,
    Resolutions,
    Comments,
    Likes,
}

impl Collection {
    pub fn as_str(self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Resolutions => "resolutions",
            Collection::Comments => "comments",
            Collection::Likes => "likes",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub image: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Resolution {
    pub id: Uuid,
    pub user_id: Uuid,
    pub resolution: String,
    pub tags: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Comment {
    pub id: Uuid,
    pub r_id: Uuid,
    pub user_id: Uuid,
    pub comment: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Like {
    pub id: Uuid,
    pub user_id: Uuid,
    pub r_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Outcome of [`Store::toggle_like`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeToggle {
    Liked,
    Unliked,
}

/// Restricts a resolution listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    All,
    OwnedBy(Uuid),
}

/// Access to the document collections.
///
/// Listings are ordered newest first (`created_at DESC, id DESC`). Batch
/// lookups take a slice of ids and omit ids with nothing to report.
#[async_trait]
pub trait Store: Send + Sync {
    async fn find_user(&self, id: Uuid) -> anyhow::Result<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    /// Returns `false` when a user with the same email already exists.
    async fn insert_user(&self, user: &User) -> anyhow::Result<bool>;
    /// Returns `false` when no user has this id.
    async fn update_user_name(
        &self,
        id: Uuid,
        name: &str,
        at: OffsetDateTime,
    ) -> anyhow::Result<bool>;
    async fn users_by_ids(&self, ids: &[Uuid]) -> anyhow::Result<Vec<User>>;

    async fn insert_resolution(&self, resolution: &Resolution) -> anyhow::Result<()>;
    async fn find_resolution(&self, id: Uuid) -> anyhow::Result<Option<Resolution>>;
    async fn list_resolutions(
        &self,
        scope: Scope,
        skip: i64,
        limit: i64,
    ) -> anyhow::Result<Vec<Resolution>>;
    async fn count_resolutions(&self, scope: Scope) -> anyhow::Result<i64>;

    async fn insert_comment(&self, comment: &Comment) -> anyhow::Result<()>;
    async fn comments_for(&self, r_id: Uuid) -> anyhow::Result<Vec<Comment>>;
    async fn count_comments(&self, r_ids: &[Uuid]) -> anyhow::Result<HashMap<Uuid, i64>>;

    async fn count_likes(&self, r_ids: &[Uuid]) -> anyhow::Result<HashMap<Uuid, i64>>;
    /// The subset of `r_ids` that `user_id` has liked.
    async fn liked_by(&self, user_id: Uuid, r_ids: &[Uuid]) -> anyhow::Result<HashSet<Uuid>>;
    /// Removes the (user, resolution) like if present, otherwise inserts `like`.
    async fn toggle_like(&self, like: &Like) -> anyhow::Result<LikeToggle>;

    async fn close(&self);
}

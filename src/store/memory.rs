use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{Comment, Like, LikeToggle, Resolution, Scope, Store, User};

#[derive(Default)]
struct Collections {
    users: Vec<User>,
    resolutions: Vec<Resolution>,
    comments: Vec<Comment>,
    likes: Vec<Like>,
}

/// Process-local store used for development without Postgres and in tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn in_scope(r: &Resolution, scope: Scope) -> bool {
    match scope {
        Scope::All => true,
        Scope::OwnedBy(user_id) => r.user_id == user_id,
    }
}

fn count_by_r_id<'a>(
    r_ids: &[Uuid],
    refs: impl Iterator<Item = &'a Uuid>,
) -> HashMap<Uuid, i64> {
    let wanted: HashSet<&Uuid> = r_ids.iter().collect();
    let mut counts = HashMap::new();
    for r_id in refs.filter(|r_id| wanted.contains(r_id)) {
        *counts.entry(*r_id).or_insert(0) += 1;
    }
    counts
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_user(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let db = self.inner.read().await;
        Ok(db.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let db = self.inner.read().await;
        Ok(db.users.iter().find(|u| u.email == email).cloned())
    }

    async fn insert_user(&self, user: &User) -> anyhow::Result<bool> {
        let mut db = self.inner.write().await;
        if db.users.iter().any(|u| u.email == user.email) {
            return Ok(false);
        }
        db.users.push(user.clone());
        Ok(true)
    }

    async fn update_user_name(
        &self,
        id: Uuid,
        name: &str,
        at: OffsetDateTime,
    ) -> anyhow::Result<bool> {
        let mut db = self.inner.write().await;
        match db.users.iter_mut().find(|u| u.id == id) {
            Some(user) => {
                user.name = name.to_string();
                user.updated_at = at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn users_by_ids(&self, ids: &[Uuid]) -> anyhow::Result<Vec<User>> {
        let db = self.inner.read().await;
        Ok(db
            .users
            .iter()
            .filter(|u| ids.contains(&u.id))
            .cloned()
            .collect())
    }

    async fn insert_resolution(&self, resolution: &Resolution) -> anyhow::Result<()> {
        self.inner.write().await.resolutions.push(resolution.clone());
        Ok(())
    }

    async fn find_resolution(&self, id: Uuid) -> anyhow::Result<Option<Resolution>> {
        let db = self.inner.read().await;
        Ok(db.resolutions.iter().find(|r| r.id == id).cloned())
    }

    async fn list_resolutions(
        &self,
        scope: Scope,
        skip: i64,
        limit: i64,
    ) -> anyhow::Result<Vec<Resolution>> {
        let db = self.inner.read().await;
        let mut rows: Vec<Resolution> = db
            .resolutions
            .iter()
            .filter(|r| in_scope(r, scope))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows
            .into_iter()
            .skip(usize::try_from(skip).unwrap_or(0))
            .take(usize::try_from(limit).unwrap_or(0))
            .collect())
    }

    async fn count_resolutions(&self, scope: Scope) -> anyhow::Result<i64> {
        let db = self.inner.read().await;
        Ok(db.resolutions.iter().filter(|r| in_scope(r, scope)).count() as i64)
    }

    async fn insert_comment(&self, comment: &Comment) -> anyhow::Result<()> {
        self.inner.write().await.comments.push(comment.clone());
        Ok(())
    }

    async fn comments_for(&self, r_id: Uuid) -> anyhow::Result<Vec<Comment>> {
        let db = self.inner.read().await;
        let mut rows: Vec<Comment> = db
            .comments
            .iter()
            .filter(|c| c.r_id == r_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn count_comments(&self, r_ids: &[Uuid]) -> anyhow::Result<HashMap<Uuid, i64>> {
        let db = self.inner.read().await;
        Ok(count_by_r_id(r_ids, db.comments.iter().map(|c| &c.r_id)))
    }

    async fn count_likes(&self, r_ids: &[Uuid]) -> anyhow::Result<HashMap<Uuid, i64>> {
        let db = self.inner.read().await;
        Ok(count_by_r_id(r_ids, db.likes.iter().map(|l| &l.r_id)))
    }

    async fn liked_by(&self, user_id: Uuid, r_ids: &[Uuid]) -> anyhow::Result<HashSet<Uuid>> {
        let db = self.inner.read().await;
        Ok(db
            .likes
            .iter()
            .filter(|l| l.user_id == user_id && r_ids.contains(&l.r_id))
            .map(|l| l.r_id)
            .collect())
    }

    async fn toggle_like(&self, like: &Like) -> anyhow::Result<LikeToggle> {
        // Check and write under one lock.
        let mut db = self.inner.write().await;
        let before = db.likes.len();
        db.likes
            .retain(|l| !(l.user_id == like.user_id && l.r_id == like.r_id));
        if db.likes.len() < before {
            return Ok(LikeToggle::Unliked);
        }
        db.likes.push(like.clone());
        Ok(LikeToggle::Liked)
    }

    async fn close(&self) {}
}

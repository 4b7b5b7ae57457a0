use std::collections::{HashMap, HashSet};

use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use super::{Collection, Comment, Like, LikeToggle, Resolution, Scope, Store, User};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("connect to database")?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("run migrations")?;
        Ok(())
    }
}

const TOGGLE_ATTEMPTS: usize = 3;

fn ctx(op: &str, collection: Collection) -> String {
    format!("{op} {collection}")
}

#[async_trait]
impl Store for PgStore {
    async fn find_user(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, image, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| ctx("find", Collection::Users))?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, image, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| ctx("find by email", Collection::Users))?;
        Ok(user)
    }

    async fn insert_user(&self, user: &User) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (id, name, email, image, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (email) DO NOTHING
            "#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.image)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .with_context(|| ctx("insert", Collection::Users))?;
        Ok(result.rows_affected() == 1)
    }

    async fn update_user_name(
        &self,
        id: Uuid,
        name: &str,
        at: OffsetDateTime,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query(r#"UPDATE users SET name = $2, updated_at = $3 WHERE id = $1"#)
            .bind(id)
            .bind(name)
            .bind(at)
            .execute(&self.pool)
            .await
            .with_context(|| ctx("update", Collection::Users))?;
        Ok(result.rows_affected() > 0)
    }

    async fn users_by_ids(&self, ids: &[Uuid]) -> anyhow::Result<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, image, created_at, updated_at
            FROM users
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .with_context(|| ctx("batch find", Collection::Users))?;
        Ok(users)
    }

    async fn insert_resolution(&self, r: &Resolution) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO resolutions (id, user_id, resolution, tags, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(r.id)
        .bind(r.user_id)
        .bind(&r.resolution)
        .bind(&r.tags)
        .bind(r.created_at)
        .bind(r.updated_at)
        .execute(&self.pool)
        .await
        .with_context(|| ctx("insert", Collection::Resolutions))?;
        Ok(())
    }

    async fn find_resolution(&self, id: Uuid) -> anyhow::Result<Option<Resolution>> {
        let row = sqlx::query_as::<_, Resolution>(
            r#"
            SELECT id, user_id, resolution, tags, created_at, updated_at
            FROM resolutions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| ctx("find", Collection::Resolutions))?;
        Ok(row)
    }

    async fn list_resolutions(
        &self,
        scope: Scope,
        skip: i64,
        limit: i64,
    ) -> anyhow::Result<Vec<Resolution>> {
        let owner = match scope {
            Scope::All => None,
            Scope::OwnedBy(user_id) => Some(user_id),
        };
        let rows = sqlx::query_as::<_, Resolution>(
            r#"
            SELECT id, user_id, resolution, tags, created_at, updated_at
            FROM resolutions
            WHERE ($1::uuid IS NULL OR user_id = $1)
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(owner)
        .bind(limit)
        .bind(skip)
        .fetch_all(&self.pool)
        .await
        .with_context(|| ctx("list", Collection::Resolutions))?;
        debug!(count = rows.len(), skip, limit, "resolutions listed");
        Ok(rows)
    }

    async fn count_resolutions(&self, scope: Scope) -> anyhow::Result<i64> {
        let owner = match scope {
            Scope::All => None,
            Scope::OwnedBy(user_id) => Some(user_id),
        };
        let (total,): (i64,) = sqlx::query_as(
            r#"SELECT COUNT(*) FROM resolutions WHERE ($1::uuid IS NULL OR user_id = $1)"#,
        )
        .bind(owner)
        .fetch_one(&self.pool)
        .await
        .with_context(|| ctx("count", Collection::Resolutions))?;
        Ok(total)
    }

    async fn insert_comment(&self, c: &Comment) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO comments (id, r_id, user_id, comment, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(c.id)
        .bind(c.r_id)
        .bind(c.user_id)
        .bind(&c.comment)
        .bind(c.created_at)
        .bind(c.updated_at)
        .execute(&self.pool)
        .await
        .with_context(|| ctx("insert", Collection::Comments))?;
        Ok(())
    }

    async fn comments_for(&self, r_id: Uuid) -> anyhow::Result<Vec<Comment>> {
        let rows = sqlx::query_as::<_, Comment>(
            r#"
            SELECT id, r_id, user_id, comment, created_at, updated_at
            FROM comments
            WHERE r_id = $1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(r_id)
        .fetch_all(&self.pool)
        .await
        .with_context(|| ctx("list", Collection::Comments))?;
        Ok(rows)
    }

    async fn count_comments(&self, r_ids: &[Uuid]) -> anyhow::Result<HashMap<Uuid, i64>> {
        if r_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query_as::<_, (Uuid, i64)>(
            r#"SELECT r_id, COUNT(*) FROM comments WHERE r_id = ANY($1) GROUP BY r_id"#,
        )
        .bind(r_ids)
        .fetch_all(&self.pool)
        .await
        .with_context(|| ctx("count", Collection::Comments))?;
        Ok(rows.into_iter().collect())
    }

    async fn count_likes(&self, r_ids: &[Uuid]) -> anyhow::Result<HashMap<Uuid, i64>> {
        if r_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query_as::<_, (Uuid, i64)>(
            r#"SELECT r_id, COUNT(*) FROM likes WHERE r_id = ANY($1) GROUP BY r_id"#,
        )
        .bind(r_ids)
        .fetch_all(&self.pool)
        .await
        .with_context(|| ctx("count", Collection::Likes))?;
        Ok(rows.into_iter().collect())
    }

    async fn liked_by(&self, user_id: Uuid, r_ids: &[Uuid]) -> anyhow::Result<HashSet<Uuid>> {
        if r_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let rows = sqlx::query_as::<_, (Uuid,)>(
            r#"SELECT r_id FROM likes WHERE user_id = $1 AND r_id = ANY($2)"#,
        )
        .bind(user_id)
        .bind(r_ids)
        .fetch_all(&self.pool)
        .await
        .with_context(|| ctx("find viewer", Collection::Likes))?;
        Ok(rows.into_iter().map(|(r_id,)| r_id).collect())
    }

    async fn toggle_like(&self, like: &Like) -> anyhow::Result<LikeToggle> {
        // Unique (user_id, r_id): a lost insert means a concurrent toggle liked
        // first, so this one flips it back.
        for _ in 0..TOGGLE_ATTEMPTS {
            let removed = sqlx::query(r#"DELETE FROM likes WHERE user_id = $1 AND r_id = $2"#)
                .bind(like.user_id)
                .bind(like.r_id)
                .execute(&self.pool)
                .await
                .with_context(|| ctx("delete", Collection::Likes))?;
            if removed.rows_affected() > 0 {
                return Ok(LikeToggle::Unliked);
            }

            let inserted = sqlx::query(
                r#"
                INSERT INTO likes (id, user_id, r_id, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (user_id, r_id) DO NOTHING
                "#,
            )
            .bind(like.id)
            .bind(like.user_id)
            .bind(like.r_id)
            .bind(like.created_at)
            .bind(like.updated_at)
            .execute(&self.pool)
            .await
            .with_context(|| ctx("insert", Collection::Likes))?;
            if inserted.rows_affected() > 0 {
                return Ok(LikeToggle::Liked);
            }
            debug!(user_id = %like.user_id, r_id = %like.r_id, "like toggle raced, retrying");
        }
        anyhow::bail!("toggle {} contended", Collection::Likes)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(email: &str) -> User {
        let now = OffsetDateTime::now_utc();
        User {
            id: Uuid::new_v4(),
            name: email.split('@').next().unwrap_or_default().to_string(),
            email: email.to_string(),
            image: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn resolution(user_id: Uuid, text: &str, age_secs: i64) -> Resolution {
        let at = OffsetDateTime::now_utc() - time::Duration::seconds(age_secs);
        Resolution {
            id: Uuid::new_v4(),
            user_id,
            resolution: text.to_string(),
            tags: vec!["health".into()],
            created_at: at,
            updated_at: at,
        }
    }

    fn like(user_id: Uuid, r_id: Uuid) -> Like {
        let now = OffsetDateTime::now_utc();
        Like {
            id: Uuid::new_v4(),
            user_id,
            r_id,
            created_at: now,
            updated_at: now,
        }
    }

    async fn seeded(pool: PgPool) -> (PgStore, User, User) {
        let store = PgStore { pool };
        let (ada, bob) = (user("ada@example.com"), user("bob@example.com"));
        assert!(store.insert_user(&ada).await.unwrap());
        assert!(store.insert_user(&bob).await.unwrap());
        (store, ada, bob)
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL"]
    async fn duplicate_email_is_not_inserted(pool: PgPool) {
        let (store, ada, _) = seeded(pool).await;

        let mut again = user("ada@example.com");
        again.name = "Impostor".into();
        assert!(!store.insert_user(&again).await.unwrap());

        let stored = store.find_user_by_email("ada@example.com").await.unwrap().unwrap();
        assert_eq!(stored.id, ada.id);
        assert_eq!(stored.name, "ada");
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL"]
    async fn toggle_like_alternates(pool: PgPool) {
        let (store, ada, _) = seeded(pool).await;
        let r = resolution(ada.id, "run a marathon", 0);
        store.insert_resolution(&r).await.unwrap();

        assert_eq!(store.toggle_like(&like(ada.id, r.id)).await.unwrap(), LikeToggle::Liked);
        assert_eq!(store.liked_by(ada.id, &[r.id]).await.unwrap(), HashSet::from([r.id]));
        assert_eq!(store.toggle_like(&like(ada.id, r.id)).await.unwrap(), LikeToggle::Unliked);
        assert!(store.liked_by(ada.id, &[r.id]).await.unwrap().is_empty());
        assert_eq!(store.toggle_like(&like(ada.id, r.id)).await.unwrap(), LikeToggle::Liked);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL"]
    async fn concurrent_toggles_leave_one_row_at_most(pool: PgPool) {
        let (store, ada, _) = seeded(pool).await;
        let r = resolution(ada.id, "learn rust", 0);
        store.insert_resolution(&r).await.unwrap();

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.toggle_like(&like(ada.id, r.id)).await.unwrap() })
            })
            .collect();
        let mut outcomes = Vec::new();
        for h in handles {
            outcomes.push(h.await.unwrap());
        }

        // Two toggles are two transitions: one like, one unlike.
        assert!(outcomes.contains(&LikeToggle::Liked));
        assert!(outcomes.contains(&LikeToggle::Unliked));
        assert!(store.count_likes(&[r.id]).await.unwrap().is_empty());
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL"]
    async fn batch_counts_group_by_resolution(pool: PgPool) {
        let (store, ada, bob) = seeded(pool).await;
        let (first, second) = (resolution(ada.id, "one", 10), resolution(bob.id, "two", 0));
        store.insert_resolution(&first).await.unwrap();
        store.insert_resolution(&second).await.unwrap();

        store.toggle_like(&like(ada.id, first.id)).await.unwrap();
        store.toggle_like(&like(bob.id, first.id)).await.unwrap();
        let now = OffsetDateTime::now_utc();
        for author in [ada.id, bob.id, bob.id] {
            store
                .insert_comment(&Comment {
                    id: Uuid::new_v4(),
                    r_id: second.id,
                    user_id: author,
                    comment: "keep going".into(),
                    created_at: now,
                    updated_at: now,
                })
                .await
                .unwrap();
        }

        let ids = [first.id, second.id];
        let likes = store.count_likes(&ids).await.unwrap();
        assert_eq!(likes.get(&first.id), Some(&2));
        assert_eq!(likes.get(&second.id), None);

        let comments = store.count_comments(&ids).await.unwrap();
        assert_eq!(comments.get(&second.id), Some(&3));
        assert_eq!(comments.get(&first.id), None);
        assert_eq!(store.comments_for(second.id).await.unwrap().len(), 3);

        let users = store.users_by_ids(&[ada.id, bob.id, Uuid::new_v4()]).await.unwrap();
        assert_eq!(users.len(), 2);
        assert!(store.count_likes(&[]).await.unwrap().is_empty());
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL"]
    async fn owner_scope_filters_and_orders(pool: PgPool) {
        let (store, ada, bob) = seeded(pool).await;
        let older = resolution(ada.id, "older", 60);
        let newer = resolution(ada.id, "newer", 0);
        for r in [&older, &newer, &resolution(bob.id, "bob's", 30)] {
            store.insert_resolution(r).await.unwrap();
        }

        assert_eq!(store.count_resolutions(Scope::All).await.unwrap(), 3);
        assert_eq!(store.count_resolutions(Scope::OwnedBy(ada.id)).await.unwrap(), 2);

        let mine = store.list_resolutions(Scope::OwnedBy(ada.id), 0, 15).await.unwrap();
        let texts: Vec<_> = mine.iter().map(|r| r.resolution.as_str()).collect();
        assert_eq!(texts, ["newer", "older"]);
        assert_eq!(mine[0].tags, vec!["health".to_string()]);

        let second_page = store.list_resolutions(Scope::All, 2, 2).await.unwrap();
        assert_eq!(second_page.len(), 1);
        assert_eq!(second_page[0].id, older.id);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL"]
    async fn update_name_reports_missing_user(pool: PgPool) {
        let (store, ada, _) = seeded(pool).await;
        let now = OffsetDateTime::now_utc();
        assert!(store.update_user_name(ada.id, "Ada L.", now).await.unwrap());
        assert!(!store.update_user_name(Uuid::new_v4(), "Nobody", now).await.unwrap());
        assert_eq!(store.find_user(ada.id).await.unwrap().unwrap().name, "Ada L.");
    }
}

//! Read side of resolutions: one listing or one resolution joined with its
//! likes, comments and the users behind them.
//!
//! The join runs as batched lookups against the [`Store`] followed by an
//! in-memory merge, so every store produces the same document shape.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use super::dto::{
    CommentView, PageQuery, ResolutionDetail, ResolutionPage, ResolutionView, UserDetail,
};
use crate::store::{Resolution, Scope, Store};

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_LIMIT: i64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: i64,
    pub limit: i64,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl Page {
    /// Missing, non-numeric or non-positive values fall back to the defaults.
    pub fn from_query(q: &PageQuery) -> Self {
        fn positive(raw: Option<&str>) -> Option<i64> {
            raw.and_then(|v| v.trim().parse::<i64>().ok()).filter(|v| *v > 0)
        }
        Self {
            page: positive(q.page.as_deref()).unwrap_or(DEFAULT_PAGE),
            limit: positive(q.limit.as_deref()).unwrap_or(DEFAULT_LIMIT),
        }
    }

    pub fn skip(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    pub fn has_more(&self, total: i64) -> bool {
        self.skip().saturating_add(self.limit) < total
    }
}

/// Lists resolutions in `scope`, newest first.
pub async fn list_resolutions(
    store: &dyn Store,
    scope: Scope,
    page: Page,
    viewer: Option<Uuid>,
) -> anyhow::Result<ResolutionPage> {
    let total = store.count_resolutions(scope).await?;
    let rows = store
        .list_resolutions(scope, page.skip(), page.limit)
        .await?;
    let resolutions = enrich(store, rows, viewer).await?;

    Ok(ResolutionPage {
        resolutions,
        page: page.page,
        limit: page.limit,
        total,
        has_more: page.has_more(total),
    })
}

/// One resolution with its comments, or `None` if it does not exist.
pub async fn get_resolution(
    store: &dyn Store,
    id: Uuid,
    viewer: Option<Uuid>,
) -> anyhow::Result<Option<ResolutionDetail>> {
    let Some(row) = store.find_resolution(id).await? else {
        return Ok(None);
    };

    let resolution = enrich(store, vec![row], viewer)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("enrichment dropped resolution {id}"))?;

    let mut comments = store.comments_for(id).await?;
    comments.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let author_ids: Vec<Uuid> = unique(comments.iter().map(|c| c.user_id));
    let authors = user_details(store, &author_ids).await?;

    let comments = comments
        .into_iter()
        .map(|c| CommentView {
            user_detail: authors.get(&c.user_id).cloned(),
            id: c.id,
            r_id: c.r_id,
            user_id: c.user_id,
            comment: c.comment,
            created_at: c.created_at,
            updated_at: c.updated_at,
        })
        .collect();

    Ok(Some(ResolutionDetail {
        resolution,
        comments,
    }))
}

/// Attaches counts, owner details and the viewer's like flag.
async fn enrich(
    store: &dyn Store,
    rows: Vec<Resolution>,
    viewer: Option<Uuid>,
) -> anyhow::Result<Vec<ResolutionView>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let r_ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let owner_ids = unique(rows.iter().map(|r| r.user_id));

    let like_counts = store.count_likes(&r_ids).await?;
    let comment_counts = store.count_comments(&r_ids).await?;
    let owners = user_details(store, &owner_ids).await?;
    let liked: HashSet<Uuid> = match viewer {
        Some(user_id) => store.liked_by(user_id, &r_ids).await?,
        None => HashSet::new(),
    };

    Ok(rows
        .into_iter()
        .map(|r| ResolutionView {
            like_count: like_counts.get(&r.id).copied().unwrap_or(0),
            comment_count: comment_counts.get(&r.id).copied().unwrap_or(0),
            user_detail: owners.get(&r.user_id).cloned(),
            is_liked: liked.contains(&r.id),
            id: r.id,
            user_id: r.user_id,
            resolution: r.resolution,
            tags: r.tags,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
        .collect())
}

async fn user_details(
    store: &dyn Store,
    ids: &[Uuid],
) -> anyhow::Result<HashMap<Uuid, UserDetail>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let users = store.users_by_ids(ids).await?;
    Ok(users.iter().map(|u| (u.id, UserDetail::from(u))).collect())
}

fn unique(ids: impl Iterator<Item = Uuid>) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    ids.filter(|id| seen.insert(*id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Comment, Like, MemoryStore, User};
    use time::{Duration, OffsetDateTime};

    fn q(page: Option<&str>, limit: Option<&str>) -> PageQuery {
        PageQuery {
            page: page.map(str::to_string),
            limit: limit.map(str::to_string),
        }
    }

    #[test]
    fn page_defaults_and_fallbacks() {
        assert_eq!(Page::from_query(&q(None, None)), Page { page: 1, limit: 15 });
        assert_eq!(Page::from_query(&q(Some("abc"), Some("x"))), Page::default());
        assert_eq!(Page::from_query(&q(Some("0"), Some("-3"))), Page::default());
        assert_eq!(Page::from_query(&q(Some("2"), Some("5"))), Page { page: 2, limit: 5 });
    }

    #[test]
    fn page_math() {
        let p = Page { page: 2, limit: 5 };
        assert_eq!(p.skip(), 5);
        assert!(p.has_more(11));
        assert!(!p.has_more(10));
        assert!(!Page { page: 1, limit: 15 }.has_more(15));
        assert!(!Page { page: i64::MAX, limit: i64::MAX }.has_more(10));
    }

    struct Fixture {
        store: MemoryStore,
        base: OffsetDateTime,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: MemoryStore::new(),
                base: OffsetDateTime::now_utc(),
            }
        }

        async fn user(&self, name: &str) -> Uuid {
            let user = User {
                id: Uuid::new_v4(),
                name: name.into(),
                email: format!("{name}@example.com"),
                image: format!("https://img.example/{name}.png"),
                created_at: self.base,
                updated_at: self.base,
            };
            self.store.insert_user(&user).await.unwrap();
            user.id
        }

        async fn resolution(&self, owner: Uuid, text: &str, minutes: i64) -> Uuid {
            let at = self.base + Duration::minutes(minutes);
            let r = Resolution {
                id: Uuid::new_v4(),
                user_id: owner,
                resolution: text.into(),
                tags: Vec::new(),
                created_at: at,
                updated_at: at,
            };
            self.store.insert_resolution(&r).await.unwrap();
            r.id
        }

        async fn comment(&self, r_id: Uuid, author: Uuid, text: &str, minutes: i64) {
            let at = self.base + Duration::minutes(minutes);
            self.store
                .insert_comment(&Comment {
                    id: Uuid::new_v4(),
                    r_id,
                    user_id: author,
                    comment: text.into(),
                    created_at: at,
                    updated_at: at,
                })
                .await
                .unwrap();
        }

        async fn like(&self, r_id: Uuid, user_id: Uuid) {
            self.store
                .toggle_like(&Like {
                    id: Uuid::new_v4(),
                    user_id,
                    r_id,
                    created_at: self.base,
                    updated_at: self.base,
                })
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn list_counts_and_viewer_flag() {
        let fx = Fixture::new();
        let ada = fx.user("ada").await;
        let bob = fx.user("bob").await;
        let r1 = fx.resolution(ada, "Run a marathon", 0).await;
        let r2 = fx.resolution(bob, "Read 20 books", 1).await;
        fx.like(r1, ada).await;
        fx.like(r1, bob).await;
        fx.comment(r1, bob, "go!", 2).await;

        let page = list_resolutions(&fx.store, Scope::All, Page::default(), Some(bob))
            .await
            .unwrap();

        assert_eq!(page.total, 2);
        assert!(!page.has_more);
        // newest first
        assert_eq!(page.resolutions[0].id, r2);
        let first = &page.resolutions[1];
        assert_eq!(first.id, r1);
        assert_eq!(first.like_count, 2);
        assert_eq!(first.comment_count, 1);
        assert!(first.is_liked);
        assert_eq!(first.user_detail.as_ref().unwrap().name, "ada");
        assert_eq!(page.resolutions[0].like_count, 0);
        assert!(!page.resolutions[0].is_liked);
    }

    #[tokio::test]
    async fn anonymous_list_never_marks_liked() {
        let fx = Fixture::new();
        let ada = fx.user("ada").await;
        let r1 = fx.resolution(ada, "Learn Rust", 0).await;
        fx.like(r1, ada).await;

        let page = list_resolutions(&fx.store, Scope::All, Page::default(), None)
            .await
            .unwrap();
        assert!(page.resolutions.iter().all(|r| !r.is_liked));
        assert_eq!(page.resolutions[0].like_count, 1);
    }

    #[tokio::test]
    async fn second_page_skips_first_items() {
        let fx = Fixture::new();
        let ada = fx.user("ada").await;
        let mut ids = Vec::new();
        for i in 0..12 {
            ids.push(fx.resolution(ada, &format!("r{i}"), i).await);
        }
        ids.reverse(); // newest first

        let page = list_resolutions(&fx.store, Scope::All, Page { page: 2, limit: 5 }, None)
            .await
            .unwrap();
        let got: Vec<Uuid> = page.resolutions.iter().map(|r| r.id).collect();
        assert_eq!(got, ids[5..10].to_vec());
        assert!(page.has_more);

        let last = list_resolutions(&fx.store, Scope::All, Page { page: 3, limit: 5 }, None)
            .await
            .unwrap();
        assert_eq!(last.resolutions.len(), 2);
        assert!(!last.has_more);
    }

    #[tokio::test]
    async fn owner_scope_filters() {
        let fx = Fixture::new();
        let ada = fx.user("ada").await;
        let bob = fx.user("bob").await;
        fx.resolution(ada, "mine", 0).await;
        fx.resolution(bob, "theirs", 1).await;

        let page = list_resolutions(&fx.store, Scope::OwnedBy(ada), Page::default(), Some(ada))
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.resolutions[0].resolution, "mine");
    }

    #[tokio::test]
    async fn empty_list_is_not_an_error() {
        let fx = Fixture::new();
        let page = list_resolutions(&fx.store, Scope::All, Page::default(), None)
            .await
            .unwrap();
        assert!(page.resolutions.is_empty());
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn single_resolution_has_sorted_comments_with_authors() {
        let fx = Fixture::new();
        let ada = fx.user("ada").await;
        let bob = fx.user("bob").await;
        let r1 = fx.resolution(ada, "Run a marathon", 0).await;
        fx.comment(r1, bob, "oldest", 1).await;
        fx.comment(r1, ada, "newest", 10).await;
        fx.comment(r1, bob, "middle", 5).await;

        let detail = get_resolution(&fx.store, r1, None).await.unwrap().unwrap();

        let texts: Vec<&str> = detail.comments.iter().map(|c| c.comment.as_str()).collect();
        assert_eq!(texts, ["newest", "middle", "oldest"]);
        assert_eq!(detail.comments[0].user_detail.as_ref().unwrap().name, "ada");
        assert_eq!(detail.comments[1].user_detail.as_ref().unwrap().name, "bob");
        assert_eq!(detail.resolution.comment_count, 3);
        assert!(detail.resolution.tags.is_empty());
    }

    #[tokio::test]
    async fn single_resolution_missing_is_none() {
        let fx = Fixture::new();
        assert!(get_resolution(&fx.store, Uuid::new_v4(), None)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn serialized_view_has_no_null_counts_or_email() {
        let fx = Fixture::new();
        let ada = fx.user("ada").await;
        let r1 = fx.resolution(ada, "Sleep more", 0).await;

        let detail = get_resolution(&fx.store, r1, Some(ada)).await.unwrap().unwrap();
        let json = serde_json::to_value(&detail).unwrap();

        assert_eq!(json["like_count"], 0);
        assert_eq!(json["comment_count"], 0);
        assert_eq!(json["tags"], serde_json::json!([]));
        assert_eq!(json["isLiked"], false);
        assert!(json["user_detail"].get("email").is_none());
        assert_eq!(json["comments"], serde_json::json!([]));
    }
}

//! Instrumented in-memory store backend and fixtures.
//!
//! Implements every store seam over plain vectors so engine behavior can be
//! pinned down without a database, and counts comment-row queries so the
//! two-query tree property is testable.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use driftwood::cache::memory::MemoryCache;
use driftwood::cache::Cache;
use driftwood::engine::ContentEngine;
use driftwood::error::{Error, Result};
use driftwood::orm::posts::{self, Visibility};
use driftwood::orm::{comments, users};
use driftwood::store::{
    CommentFilter, CommentOrder, ContentStore, Engagement, LikeTarget, NewComment, NewPost,
    ParentFilter, PostChanges, PostFilter, PostOrder, ProfileChanges, RelationshipStore,
    UserFilter, UserStore,
};

#[derive(Default)]
pub struct MockBackend {
    posts: Mutex<Vec<posts::Model>>,
    comments: Mutex<Vec<comments::Model>>,
    users: Mutex<Vec<users::Model>>,
    likes: Mutex<Vec<(i32, LikeTarget)>>,
    /// (follower_id, following_id), insertion order
    follows: Mutex<Vec<(i32, i32)>>,
    /// (blocker_id, blocked_id)
    blocks: Mutex<Vec<(i32, i32)>>,
    next_id: AtomicI32,
    /// Number of store queries that returned comment rows.
    pub comment_queries: AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn next_id(&self) -> i32 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn comment_query_count(&self) -> usize {
        self.comment_queries.load(Ordering::SeqCst)
    }

    pub fn reset_comment_queries(&self) {
        self.comment_queries.store(0, Ordering::SeqCst);
    }

    // ---- fixtures ----

    pub fn seed_user(&self, username: &str) -> i32 {
        self.seed_user_full(username, true, None)
    }

    pub fn seed_user_full(&self, username: &str, email_verified: bool, bio: Option<&str>) -> i32 {
        let id = self.next_id();
        self.users.lock().unwrap().push(users::Model {
            id,
            username: username.to_string(),
            email: format!("{}@example.com", username),
            email_verified,
            first_name: None,
            last_name: None,
            bio: bio.map(str::to_string),
            avatar_url: None,
            created_at: (Utc::now() - Duration::days(id as i64)).into(),
        });
        id
    }

    pub fn seed_post(
        &self,
        author_id: i32,
        content: &str,
        visibility: Visibility,
        hours_ago: i64,
    ) -> i32 {
        let id = self.next_id();
        let created = Utc::now() - Duration::hours(hours_ago);
        self.posts.lock().unwrap().push(posts::Model {
            id,
            author_id,
            content: content.to_string(),
            media_urls: serde_json::json!([]),
            visibility,
            is_deleted: false,
            deleted_at: None,
            created_at: created.into(),
            updated_at: created.into(),
        });
        id
    }

    pub fn seed_comment(
        &self,
        post_id: i32,
        author_id: i32,
        parent_id: Option<i32>,
        content: &str,
    ) -> i32 {
        let id = self.next_id();
        // Later-seeded comments are strictly newer.
        let created = Utc::now() + Duration::milliseconds(id as i64);
        self.comments.lock().unwrap().push(comments::Model {
            id,
            post_id,
            author_id,
            parent_id,
            content: content.to_string(),
            is_deleted: false,
            created_at: created.into(),
        });
        id
    }

    pub fn seed_like(&self, user_id: i32, post_id: i32) {
        self.likes
            .lock()
            .unwrap()
            .push((user_id, LikeTarget::Post(post_id)));
    }

    pub fn seed_follow(&self, follower_id: i32, following_id: i32) {
        self.follows.lock().unwrap().push((follower_id, following_id));
    }

    pub fn seed_block(&self, blocker_id: i32, blocked_id: i32) {
        self.blocks.lock().unwrap().push((blocker_id, blocked_id));
    }

    pub fn follow_edge_exists(&self, follower_id: i32, following_id: i32) -> bool {
        self.follows
            .lock()
            .unwrap()
            .contains(&(follower_id, following_id))
    }

    // ---- filter helpers ----

    fn usernames(&self) -> HashMap<i32, String> {
        self.users
            .lock()
            .unwrap()
            .iter()
            .map(|u| (u.id, u.username.clone()))
            .collect()
    }

    fn post_matches(
        &self,
        post: &posts::Model,
        filter: &PostFilter,
        usernames: &HashMap<i32, String>,
    ) -> bool {
        if !filter.include_deleted && post.is_deleted {
            return false;
        }
        if let Some(ids) = &filter.author_ids {
            if !ids.contains(&post.author_id) {
                return false;
            }
        }
        if filter.exclude_author_ids.contains(&post.author_id) {
            return false;
        }
        if let Some(visibilities) = &filter.visibility {
            if !visibilities.contains(&post.visibility) {
                return false;
            }
        }
        let created = post.created_at.with_timezone(&Utc);
        if let Some(after) = filter.created_after {
            if created < after {
                return false;
            }
        }
        if let Some(before) = filter.created_before {
            if created > before {
                return false;
            }
        }
        if let Some(query) = &filter.query {
            let query = query.to_lowercase();
            let content_match = post.content.to_lowercase().contains(&query);
            let author_match = usernames
                .get(&post.author_id)
                .map(|name| name.to_lowercase().contains(&query))
                .unwrap_or(false);
            if !content_match && !author_match {
                return false;
            }
        }
        true
    }

    fn matching_posts(&self, filter: &PostFilter, order: PostOrder) -> Vec<posts::Model> {
        let usernames = self.usernames();
        let mut matched: Vec<posts::Model> = self
            .posts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| self.post_matches(p, filter, &usernames))
            .cloned()
            .collect();
        match order {
            PostOrder::NewestFirst => {
                matched.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)))
            }
            PostOrder::OldestFirst => {
                matched.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
            }
        }
        matched
    }

    fn comment_matches(comment: &comments::Model, filter: &CommentFilter) -> bool {
        if !filter.include_deleted && comment.is_deleted {
            return false;
        }
        if let Some(post_id) = filter.post_id {
            if comment.post_id != post_id {
                return false;
            }
        }
        match &filter.parent {
            ParentFilter::Any => true,
            ParentFilter::TopLevel => comment.parent_id.is_none(),
            ParentFilter::In(ids) => comment
                .parent_id
                .map(|parent| ids.contains(&parent))
                .unwrap_or(false),
        }
    }

    fn matching_comments(&self, filter: &CommentFilter, order: CommentOrder) -> Vec<comments::Model> {
        let mut matched: Vec<comments::Model> = self
            .comments
            .lock()
            .unwrap()
            .iter()
            .filter(|c| Self::comment_matches(c, filter))
            .cloned()
            .collect();
        match order {
            CommentOrder::NewestFirst => {
                matched.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)))
            }
            CommentOrder::OldestFirst => {
                matched.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
            }
        }
        matched
    }
}

fn window<T>(items: Vec<T>, skip: u64, take: Option<u64>) -> Vec<T> {
    let iter = items.into_iter().skip(skip as usize);
    match take {
        Some(take) => iter.take(take as usize).collect(),
        None => iter.collect(),
    }
}

#[async_trait]
impl ContentStore for MockBackend {
    async fn find_post(&self, id: i32) -> Result<Option<posts::Model>> {
        Ok(self
            .posts
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == id)
            .cloned())
    }

    async fn find_posts(
        &self,
        filter: &PostFilter,
        order: PostOrder,
        skip: u64,
        take: Option<u64>,
    ) -> Result<Vec<posts::Model>> {
        Ok(window(self.matching_posts(filter, order), skip, take))
    }

    async fn count_posts(&self, filter: &PostFilter) -> Result<u64> {
        Ok(self.matching_posts(filter, PostOrder::NewestFirst).len() as u64)
    }

    async fn insert_post(&self, post: NewPost) -> Result<posts::Model> {
        let id = self.next_id();
        let now = Utc::now();
        let model = posts::Model {
            id,
            author_id: post.author_id,
            content: post.content,
            media_urls: serde_json::json!(post.media_urls),
            visibility: post.visibility,
            is_deleted: false,
            deleted_at: None,
            created_at: now.into(),
            updated_at: now.into(),
        };
        self.posts.lock().unwrap().push(model.clone());
        Ok(model)
    }

    async fn update_post(&self, id: i32, changes: PostChanges) -> Result<posts::Model> {
        let mut posts = self.posts.lock().unwrap();
        let post = posts
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(Error::NotFound)?;
        if let Some(content) = changes.content {
            post.content = content;
        }
        if let Some(urls) = changes.media_urls {
            post.media_urls = serde_json::json!(urls);
        }
        if let Some(visibility) = changes.visibility {
            post.visibility = visibility;
        }
        post.updated_at = Utc::now().into();
        Ok(post.clone())
    }

    async fn soft_delete_post(&self, id: i32) -> Result<()> {
        let mut posts = self.posts.lock().unwrap();
        if let Some(post) = posts.iter_mut().find(|p| p.id == id) {
            post.is_deleted = true;
            post.deleted_at = Some(Utc::now().into());
        }
        Ok(())
    }

    async fn soft_delete_posts_by_author(&self, author_id: i32) -> Result<Vec<i32>> {
        let mut posts = self.posts.lock().unwrap();
        let mut ids = Vec::new();
        for post in posts
            .iter_mut()
            .filter(|p| p.author_id == author_id && !p.is_deleted)
        {
            post.is_deleted = true;
            post.deleted_at = Some(Utc::now().into());
            ids.push(post.id);
        }
        Ok(ids)
    }

    async fn find_comment(&self, id: i32) -> Result<Option<comments::Model>> {
        Ok(self
            .comments
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    async fn find_comments(
        &self,
        filter: &CommentFilter,
        order: CommentOrder,
        skip: u64,
        take: Option<u64>,
    ) -> Result<Vec<comments::Model>> {
        self.comment_queries.fetch_add(1, Ordering::SeqCst);
        Ok(window(self.matching_comments(filter, order), skip, take))
    }

    async fn find_comments_page(
        &self,
        filter: &CommentFilter,
        order: CommentOrder,
        skip: u64,
        take: u64,
    ) -> Result<(Vec<comments::Model>, u64)> {
        self.comment_queries.fetch_add(1, Ordering::SeqCst);
        let matched = self.matching_comments(filter, order);
        let total = matched.len() as u64;
        Ok((window(matched, skip, Some(take)), total))
    }

    async fn insert_comment(&self, comment: NewComment) -> Result<comments::Model> {
        let id = self.next_id();
        let model = comments::Model {
            id,
            post_id: comment.post_id,
            author_id: comment.author_id,
            parent_id: comment.parent_id,
            content: comment.content,
            is_deleted: false,
            created_at: Utc::now().into(),
        };
        self.comments.lock().unwrap().push(model.clone());
        Ok(model)
    }

    async fn soft_delete_comment(&self, id: i32) -> Result<()> {
        let mut comments = self.comments.lock().unwrap();
        if let Some(comment) = comments.iter_mut().find(|c| c.id == id) {
            comment.is_deleted = true;
        }
        Ok(())
    }

    async fn soft_delete_comments_by_author(&self, author_id: i32) -> Result<()> {
        let mut comments = self.comments.lock().unwrap();
        for comment in comments.iter_mut().filter(|c| c.author_id == author_id) {
            comment.is_deleted = true;
        }
        Ok(())
    }

    async fn post_engagement(&self, post_ids: &[i32]) -> Result<HashMap<i32, Engagement>> {
        let likes = self.likes.lock().unwrap();
        let comments = self.comments.lock().unwrap();
        Ok(post_ids
            .iter()
            .map(|&post_id| {
                let like_count = likes
                    .iter()
                    .filter(|(_, target)| *target == LikeTarget::Post(post_id))
                    .count() as i64;
                let comment_count = comments
                    .iter()
                    .filter(|c| c.post_id == post_id && !c.is_deleted)
                    .count() as i64;
                (
                    post_id,
                    Engagement {
                        like_count,
                        comment_count,
                    },
                )
            })
            .collect())
    }

    async fn liked_post_ids(&self, user_id: i32, post_ids: &[i32]) -> Result<HashSet<i32>> {
        let likes = self.likes.lock().unwrap();
        Ok(post_ids
            .iter()
            .copied()
            .filter(|&post_id| likes.contains(&(user_id, LikeTarget::Post(post_id))))
            .collect())
    }

    async fn like_exists(&self, user_id: i32, target: LikeTarget) -> Result<bool> {
        Ok(self.likes.lock().unwrap().contains(&(user_id, target)))
    }

    async fn insert_like(&self, user_id: i32, target: LikeTarget) -> Result<()> {
        self.likes.lock().unwrap().push((user_id, target));
        Ok(())
    }

    async fn delete_like(&self, user_id: i32, target: LikeTarget) -> Result<bool> {
        let mut likes = self.likes.lock().unwrap();
        let before = likes.len();
        likes.retain(|entry| *entry != (user_id, target));
        Ok(likes.len() < before)
    }
}

#[async_trait]
impl RelationshipStore for MockBackend {
    async fn is_following(&self, follower_id: i32, following_id: i32) -> Result<bool> {
        Ok(self
            .follows
            .lock()
            .unwrap()
            .contains(&(follower_id, following_id)))
    }

    async fn following_ids(&self, user_id: i32) -> Result<Vec<i32>> {
        Ok(self
            .follows
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|(follower, _)| *follower == user_id)
            .map(|(_, following)| *following)
            .collect())
    }

    async fn follower_ids(&self, user_id: i32) -> Result<Vec<i32>> {
        Ok(self
            .follows
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|(_, following)| *following == user_id)
            .map(|(follower, _)| *follower)
            .collect())
    }

    async fn is_blocked_pair(&self, a: i32, b: i32) -> Result<bool> {
        let blocks = self.blocks.lock().unwrap();
        Ok(blocks.contains(&(a, b)) || blocks.contains(&(b, a)))
    }

    async fn blocker_ids_of(&self, user_id: i32) -> Result<Vec<i32>> {
        Ok(self
            .blocks
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, blocked)| *blocked == user_id)
            .map(|(blocker, _)| *blocker)
            .collect())
    }

    async fn blocked_ids_by(&self, user_id: i32) -> Result<Vec<i32>> {
        Ok(self
            .blocks
            .lock()
            .unwrap()
            .iter()
            .filter(|(blocker, _)| *blocker == user_id)
            .map(|(_, blocked)| *blocked)
            .collect())
    }

    async fn insert_follow(&self, follower_id: i32, following_id: i32) -> Result<()> {
        self.follows.lock().unwrap().push((follower_id, following_id));
        Ok(())
    }

    async fn delete_follow(&self, follower_id: i32, following_id: i32) -> Result<bool> {
        let mut follows = self.follows.lock().unwrap();
        let before = follows.len();
        follows.retain(|edge| *edge != (follower_id, following_id));
        Ok(follows.len() < before)
    }

    async fn insert_block(&self, blocker_id: i32, blocked_id: i32) -> Result<()> {
        self.blocks.lock().unwrap().push((blocker_id, blocked_id));
        Ok(())
    }

    async fn delete_block(&self, blocker_id: i32, blocked_id: i32) -> Result<bool> {
        let mut blocks = self.blocks.lock().unwrap();
        let before = blocks.len();
        blocks.retain(|edge| *edge != (blocker_id, blocked_id));
        Ok(blocks.len() < before)
    }

    async fn delete_follows_between(&self, a: i32, b: i32) -> Result<()> {
        self.follows
            .lock()
            .unwrap()
            .retain(|edge| *edge != (a, b) && *edge != (b, a));
        Ok(())
    }

    async fn delete_all_edges_for(&self, user_id: i32) -> Result<()> {
        self.follows
            .lock()
            .unwrap()
            .retain(|(follower, following)| *follower != user_id && *following != user_id);
        self.blocks
            .lock()
            .unwrap()
            .retain(|(blocker, blocked)| *blocker != user_id && *blocked != user_id);
        Ok(())
    }
}

#[async_trait]
impl UserStore for MockBackend {
    async fn find_user(&self, id: i32) -> Result<Option<users::Model>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.id == id)
            .cloned())
    }

    async fn find_users_by_ids(&self, ids: &[i32]) -> Result<Vec<users::Model>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .filter(|u| ids.contains(&u.id))
            .cloned()
            .collect())
    }

    async fn search_users(&self, filter: &UserFilter) -> Result<Vec<users::Model>> {
        let mut matched: Vec<users::Model> = self
            .users
            .lock()
            .unwrap()
            .iter()
            .filter(|u| {
                if let Some(exclude_id) = filter.exclude_id {
                    if u.id == exclude_id {
                        return false;
                    }
                }
                if filter.verified_only && !u.email_verified {
                    return false;
                }
                if filter.has_bio && u.bio.as_deref().unwrap_or("").is_empty() {
                    return false;
                }
                if let Some(query) = &filter.query {
                    let query = query.to_lowercase();
                    let fields = [
                        Some(u.username.as_str()),
                        u.first_name.as_deref(),
                        u.last_name.as_deref(),
                        Some(u.email.as_str()),
                    ];
                    if !fields
                        .iter()
                        .flatten()
                        .any(|field| field.to_lowercase().contains(&query))
                    {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(matched)
    }

    async fn update_profile(
        &self,
        user_id: i32,
        changes: ProfileChanges,
    ) -> Result<users::Model> {
        let mut users = self.users.lock().unwrap();
        let user = users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or(Error::NotFound)?;
        if let Some(first_name) = changes.first_name {
            user.first_name = Some(first_name);
        }
        if let Some(last_name) = changes.last_name {
            user.last_name = Some(last_name);
        }
        if let Some(bio) = changes.bio {
            user.bio = Some(bio);
        }
        if let Some(avatar_url) = changes.avatar_url {
            user.avatar_url = Some(avatar_url);
        }
        Ok(user.clone())
    }
}

/// Engine over the mock backend with a working in-memory cache.
pub fn engine(backend: &Arc<MockBackend>) -> ContentEngine {
    let _ = env_logger::builder().is_test(true).try_init();
    ContentEngine::new(
        backend.clone(),
        backend.clone(),
        backend.clone(),
        Cache::new(Arc::new(MemoryCache::default())),
    )
}

/// Engine with caching disabled; every read hits the mock store.
pub fn engine_uncached(backend: &Arc<MockBackend>) -> ContentEngine {
    let _ = env_logger::builder().is_test(true).try_init();
    ContentEngine::new(
        backend.clone(),
        backend.clone(),
        backend.clone(),
        Cache::disabled(),
    )
}

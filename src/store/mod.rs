//! Trait seams over the relational store.
//!
//! The engine consumes content, relationship and user lookups through these
//! traits and never talks to a database directly. [`pg`] provides the
//! sea-orm/Postgres implementation; tests drive the engine with instrumented
//! in-memory implementations to pin down query-count properties.

pub mod pg;

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::orm::posts::Visibility;
use crate::orm::{comments, posts, users};

/// Conjunctive post predicates. Every set field narrows the result.
#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    /// Restrict to these authors (the feed's allowed-author set). An empty
    /// list matches nothing.
    pub author_ids: Option<Vec<i32>>,
    /// Exclude these authors (blocked set for trending and search).
    pub exclude_author_ids: Vec<i32>,
    pub visibility: Option<Vec<Visibility>>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    /// Case-insensitive substring over post content or author username.
    pub query: Option<String>,
    pub include_deleted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostOrder {
    NewestFirst,
    OldestFirst,
}

#[derive(Debug, Clone, Default)]
pub struct CommentFilter {
    pub post_id: Option<i32>,
    pub parent: ParentFilter,
    pub include_deleted: bool,
}

/// Which tree level a comment query addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ParentFilter {
    #[default]
    Any,
    /// `parent_id IS NULL`
    TopLevel,
    /// Direct replies of any of these comments. One batched query serves a
    /// whole page of top-level comments.
    In(Vec<i32>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentOrder {
    NewestFirst,
    OldestFirst,
}

/// A like targets exactly one of a post or a comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeTarget {
    Post(i32),
    Comment(i32),
}

/// Derived engagement counters, counted from Like/Comment rows at read time.
#[derive(Debug, Clone, Copy, Default)]
pub struct Engagement {
    pub like_count: i64,
    pub comment_count: i64,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub author_id: i32,
    pub content: String,
    pub media_urls: Vec<String>,
    pub visibility: Visibility,
}

/// Partial post update; unset fields keep their stored value.
#[derive(Debug, Clone, Default)]
pub struct PostChanges {
    pub content: Option<String>,
    pub media_urls: Option<Vec<String>>,
    pub visibility: Option<Visibility>,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub post_id: i32,
    pub author_id: i32,
    pub parent_id: Option<i32>,
    pub content: String,
}

/// Partial profile update; unset fields keep their stored value.
#[derive(Debug, Clone, Default)]
pub struct ProfileChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    /// Case-insensitive substring over username, first/last name or email.
    pub query: Option<String>,
    pub verified_only: bool,
    pub has_bio: bool,
    /// An authenticated searcher never sees their own account.
    pub exclude_id: Option<i32>,
}

/// Post and comment rows plus like bookkeeping.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn find_post(&self, id: i32) -> Result<Option<posts::Model>>;
    async fn find_posts(
        &self,
        filter: &PostFilter,
        order: PostOrder,
        skip: u64,
        take: Option<u64>,
    ) -> Result<Vec<posts::Model>>;
    async fn count_posts(&self, filter: &PostFilter) -> Result<u64>;
    async fn insert_post(&self, post: NewPost) -> Result<posts::Model>;
    async fn update_post(&self, id: i32, changes: PostChanges) -> Result<posts::Model>;
    async fn soft_delete_post(&self, id: i32) -> Result<()>;
    /// Soft-delete every post of one author; returns the affected post ids so
    /// callers can evict the matching cache entries.
    async fn soft_delete_posts_by_author(&self, author_id: i32) -> Result<Vec<i32>>;

    async fn find_comment(&self, id: i32) -> Result<Option<comments::Model>>;
    async fn find_comments(
        &self,
        filter: &CommentFilter,
        order: CommentOrder,
        skip: u64,
        take: Option<u64>,
    ) -> Result<Vec<comments::Model>>;
    /// One page of comments together with the total matching count.
    async fn find_comments_page(
        &self,
        filter: &CommentFilter,
        order: CommentOrder,
        skip: u64,
        take: u64,
    ) -> Result<(Vec<comments::Model>, u64)>;
    async fn insert_comment(&self, comment: NewComment) -> Result<comments::Model>;
    async fn soft_delete_comment(&self, id: i32) -> Result<()>;
    async fn soft_delete_comments_by_author(&self, author_id: i32) -> Result<()>;

    /// Batched like/comment counters for a set of posts. Posts with no
    /// engagement may be absent from the returned map.
    async fn post_engagement(&self, post_ids: &[i32]) -> Result<HashMap<i32, Engagement>>;
    /// Which of these posts the user has liked, in one batched query.
    async fn liked_post_ids(&self, user_id: i32, post_ids: &[i32]) -> Result<HashSet<i32>>;
    async fn like_exists(&self, user_id: i32, target: LikeTarget) -> Result<bool>;
    async fn insert_like(&self, user_id: i32, target: LikeTarget) -> Result<()>;
    /// Returns whether a like row existed.
    async fn delete_like(&self, user_id: i32, target: LikeTarget) -> Result<bool>;
}

/// Follow and block edges.
#[async_trait]
pub trait RelationshipStore: Send + Sync {
    async fn is_following(&self, follower_id: i32, following_id: i32) -> Result<bool>;
    /// Ids this user follows, most recent edge first.
    async fn following_ids(&self, user_id: i32) -> Result<Vec<i32>>;
    /// Ids following this user, most recent edge first.
    async fn follower_ids(&self, user_id: i32) -> Result<Vec<i32>>;

    /// True when a block edge exists between the two users in either
    /// direction.
    async fn is_blocked_pair(&self, a: i32, b: i32) -> Result<bool>;
    /// Users who blocked this user.
    async fn blocker_ids_of(&self, user_id: i32) -> Result<Vec<i32>>;
    /// Users this user blocked.
    async fn blocked_ids_by(&self, user_id: i32) -> Result<Vec<i32>>;

    async fn insert_follow(&self, follower_id: i32, following_id: i32) -> Result<()>;
    async fn delete_follow(&self, follower_id: i32, following_id: i32) -> Result<bool>;
    async fn insert_block(&self, blocker_id: i32, blocked_id: i32) -> Result<()>;
    async fn delete_block(&self, blocker_id: i32, blocked_id: i32) -> Result<bool>;
    /// Remove follow edges between two users in both directions (side effect
    /// of a new block).
    async fn delete_follows_between(&self, a: i32, b: i32) -> Result<()>;
    /// Hard-delete every follow and block edge touching this user (account
    /// deletion cleanup).
    async fn delete_all_edges_for(&self, user_id: i32) -> Result<()>;
}

/// User rows for search, profiles and author hydration.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user(&self, id: i32) -> Result<Option<users::Model>>;
    async fn find_users_by_ids(&self, ids: &[i32]) -> Result<Vec<users::Model>>;
    /// All rows matching the filter; ranking and pagination happen in memory
    /// because the relevance tiers are not expressible as a store sort key.
    async fn search_users(&self, filter: &UserFilter) -> Result<Vec<users::Model>>;
    async fn update_profile(&self, user_id: i32, changes: ProfileChanges)
        -> Result<users::Model>;
}

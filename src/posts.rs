//! Post read and mutation paths.
//!
//! Reads hydrate [`PostView`]s from batched lookups (engagement counters,
//! viewer like flags, author usernames), never one query per post. Mutations
//! run their cache invalidation synchronously before returning.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::access::can_view;
use crate::cache::{keys, ttl};
use crate::constants::{MAX_MEDIA_URLS, MAX_POST_LENGTH};
use crate::engine::ContentEngine;
use crate::error::{Error, Result};
use crate::orm::posts::{self, Visibility};
use crate::store::{LikeTarget, NewPost, PostChanges};

/// A post as returned to route collaborators, with the viewer's like flag as
/// a first-class field rather than a join remnant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub id: i32,
    pub author_id: i32,
    pub author_username: String,
    pub content: String,
    pub media_urls: Vec<String>,
    pub visibility: Visibility,
    pub like_count: i64,
    pub comment_count: i64,
    pub is_liked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LikeState {
    pub liked: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostInput {
    pub content: String,
    #[validate(length(max = 10, message = "at most 10 media attachments"))]
    #[serde(default)]
    pub media_urls: Vec<String>,
    #[serde(default = "default_visibility")]
    pub visibility: Visibility,
}

fn default_visibility() -> Visibility {
    Visibility::Public
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePostInput {
    pub content: Option<String>,
    pub media_urls: Option<Vec<String>>,
    pub visibility: Option<Visibility>,
}

/// Trim and bound content; raised before any query executes.
pub(crate) fn normalized_content(raw: &str, max: usize) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation("content: must not be empty".to_string()));
    }
    if trimmed.chars().count() > max {
        return Err(Error::Validation(format!(
            "content: must be at most {} characters",
            max
        )));
    }
    Ok(trimmed.to_string())
}

impl ContentEngine {
    /// Visibility decision for one post, with both relationship facts fetched
    /// concurrently. Batch paths use [`crate::access::ViewerGraph`] instead.
    pub(crate) async fn viewer_can_see(
        &self,
        viewer: Option<i32>,
        post: &posts::Model,
    ) -> Result<bool> {
        let Some(viewer_id) = viewer else {
            return Ok(can_view(None, post, false, false));
        };
        if post.is_deleted {
            return Ok(false);
        }
        let (blocked, follows) = tokio::try_join!(
            self.relations.is_blocked_pair(viewer_id, post.author_id),
            self.relations.is_following(viewer_id, post.author_id),
        )?;
        Ok(can_view(Some(viewer_id), post, blocked, follows))
    }

    /// Assemble views for a batch of posts. Exactly three batched lookups
    /// regardless of batch size: engagement counters, the viewer's like set,
    /// and author usernames.
    pub(crate) async fn hydrate_posts(
        &self,
        models: Vec<posts::Model>,
        viewer: Option<i32>,
    ) -> Result<Vec<PostView>> {
        if models.is_empty() {
            return Ok(Vec::new());
        }

        let post_ids: Vec<i32> = models.iter().map(|p| p.id).collect();
        let author_ids: Vec<i32> = models
            .iter()
            .map(|p| p.author_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        let (engagement, liked, authors) = tokio::try_join!(
            self.content.post_engagement(&post_ids),
            async {
                match viewer {
                    Some(viewer_id) => self.content.liked_post_ids(viewer_id, &post_ids).await,
                    None => Ok(HashSet::new()),
                }
            },
            self.users.find_users_by_ids(&author_ids),
        )?;

        let usernames: HashMap<i32, String> =
            authors.into_iter().map(|u| (u.id, u.username)).collect();

        Ok(models
            .into_iter()
            .map(|post| {
                let counts = engagement.get(&post.id).copied().unwrap_or_default();
                let media_urls = post.media_urls();
                PostView {
                    id: post.id,
                    author_id: post.author_id,
                    author_username: usernames
                        .get(&post.author_id)
                        .cloned()
                        .unwrap_or_default(),
                    content: post.content,
                    media_urls,
                    visibility: post.visibility,
                    like_count: counts.like_count,
                    comment_count: counts.comment_count,
                    is_liked: liked.contains(&post.id),
                    created_at: post.created_at.with_timezone(&Utc),
                    updated_at: post.updated_at.with_timezone(&Utc),
                }
            })
            .collect())
    }

    async fn hydrate_post(&self, model: posts::Model, viewer: Option<i32>) -> Result<PostView> {
        self.hydrate_posts(vec![model], viewer)
            .await?
            .pop()
            .ok_or(Error::NotFound)
    }

    /// Read one post as seen by `viewer`. Absent, soft-deleted and
    /// blocked-from-view posts are indistinguishable from the outside.
    pub async fn get_post_by_id(&self, post_id: i32, viewer: Option<i32>) -> Result<PostView> {
        let key = keys::post(post_id, viewer);
        if let Some(hit) = self.cache.get_json::<PostView>(&key).await {
            return Ok(hit);
        }

        let post = self
            .content
            .find_post(post_id)
            .await?
            .ok_or(Error::NotFound)?;
        if !self.viewer_can_see(viewer, &post).await? {
            return Err(Error::NotFound);
        }

        let view = self.hydrate_post(post, viewer).await?;
        self.cache.set_json(&key, &view, ttl::POST).await;
        Ok(view)
    }

    pub async fn create_post(&self, author_id: i32, input: CreatePostInput) -> Result<PostView> {
        let content = normalized_content(&input.content, MAX_POST_LENGTH)?;
        input.validate()?;

        let post = self
            .content
            .insert_post(NewPost {
                author_id,
                content,
                media_urls: input.media_urls,
                visibility: input.visibility,
            })
            .await?;

        self.cache.invalidate_post_mutation(post.id, author_id).await;
        self.hydrate_post(post, Some(author_id)).await
    }

    pub async fn update_post(
        &self,
        user_id: i32,
        post_id: i32,
        input: UpdatePostInput,
    ) -> Result<PostView> {
        let mut changes = PostChanges::default();
        if let Some(content) = &input.content {
            changes.content = Some(normalized_content(content, MAX_POST_LENGTH)?);
        }
        if let Some(urls) = input.media_urls {
            if urls.len() > MAX_MEDIA_URLS {
                return Err(Error::Validation(format!(
                    "mediaUrls: at most {} media attachments",
                    MAX_MEDIA_URLS
                )));
            }
            changes.media_urls = Some(urls);
        }
        changes.visibility = input.visibility;

        let post = self
            .content
            .find_post(post_id)
            .await?
            .filter(|p| !p.is_deleted)
            .ok_or(Error::NotFound)?;
        if post.author_id != user_id {
            return Err(Error::Forbidden);
        }

        let updated = self.content.update_post(post_id, changes).await?;
        self.cache.invalidate_post_mutation(post_id, user_id).await;
        self.hydrate_post(updated, Some(user_id)).await
    }

    pub async fn delete_post(&self, user_id: i32, post_id: i32) -> Result<()> {
        let post = self
            .content
            .find_post(post_id)
            .await?
            .filter(|p| !p.is_deleted)
            .ok_or(Error::NotFound)?;
        if post.author_id != user_id {
            return Err(Error::Forbidden);
        }

        self.content.soft_delete_post(post_id).await?;
        self.cache.invalidate_post_mutation(post_id, user_id).await;
        Ok(())
    }

    /// Flip the (user, post) like state. Two calls in a row return
    /// `liked: true` then `liked: false`.
    pub async fn toggle_post_like(&self, user_id: i32, post_id: i32) -> Result<LikeState> {
        let post = self
            .content
            .find_post(post_id)
            .await?
            .ok_or(Error::NotFound)?;
        if !self.viewer_can_see(Some(user_id), &post).await? {
            return Err(Error::NotFound);
        }

        let target = LikeTarget::Post(post_id);
        let liked = if self.content.like_exists(user_id, target).await? {
            self.content.delete_like(user_id, target).await?;
            false
        } else {
            self.content.insert_like(user_id, target).await?;
            if post.author_id != user_id {
                self.notifier
                    .notify(
                        post.author_id,
                        serde_json::json!({
                            "type": "post_liked",
                            "postId": post_id,
                            "userId": user_id,
                        }),
                    )
                    .await;
            }
            true
        };

        self.cache.invalidate_post(post_id).await;
        Ok(LikeState { liked })
    }

    pub async fn toggle_comment_like(&self, user_id: i32, comment_id: i32) -> Result<LikeState> {
        let comment = self
            .content
            .find_comment(comment_id)
            .await?
            .filter(|c| !c.is_deleted)
            .ok_or(Error::NotFound)?;
        let post = self
            .content
            .find_post(comment.post_id)
            .await?
            .ok_or(Error::NotFound)?;
        if !self.viewer_can_see(Some(user_id), &post).await? {
            return Err(Error::NotFound);
        }

        let target = LikeTarget::Comment(comment_id);
        let liked = if self.content.like_exists(user_id, target).await? {
            self.content.delete_like(user_id, target).await?;
            false
        } else {
            self.content.insert_like(user_id, target).await?;
            if comment.author_id != user_id {
                self.notifier
                    .notify(
                        comment.author_id,
                        serde_json::json!({
                            "type": "comment_liked",
                            "commentId": comment_id,
                            "postId": comment.post_id,
                            "userId": user_id,
                        }),
                    )
                    .await;
            }
            true
        };

        self.cache.invalidate_post(comment.post_id).await;
        Ok(LikeState { liked })
    }
}

//! Two-level comment tree assembly and comment mutations.
//!
//! The tree read is two content-store queries regardless of page size or
//! reply counts: one page of top-level comments (with total), then a single
//! batched fetch of every direct reply for the page. Grouping happens in
//! memory. Anything deeper than direct replies goes through
//! [`ContentEngine::get_comment_replies`] a page at a time.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::MAX_COMMENT_LENGTH;
use crate::engine::ContentEngine;
use crate::error::{Error, Result};
use crate::orm::comments;
use crate::pagination::{Page, PageParams};
use crate::posts::normalized_content;
use crate::store::{CommentFilter, CommentOrder, NewComment, ParentFilter};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: i32,
    pub post_id: i32,
    pub author_id: i32,
    pub author_username: String,
    pub parent_id: Option<i32>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A top-level comment with a bounded slice of its direct replies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentWithReplies {
    #[serde(flatten)]
    pub comment: CommentView,
    pub replies: Vec<CommentView>,
    pub replies_count: u64,
    pub has_more_replies: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentInput {
    pub post_id: i32,
    pub parent_id: Option<i32>,
    pub content: String,
}

fn comment_view(model: comments::Model, usernames: &HashMap<i32, String>) -> CommentView {
    CommentView {
        id: model.id,
        post_id: model.post_id,
        author_id: model.author_id,
        author_username: usernames
            .get(&model.author_id)
            .cloned()
            .unwrap_or_default(),
        parent_id: model.parent_id,
        content: model.content,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

impl ContentEngine {
    async fn comment_usernames(
        &self,
        models: &[comments::Model],
    ) -> Result<HashMap<i32, String>> {
        let author_ids: Vec<i32> = models
            .iter()
            .map(|c| c.author_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let authors = self.users.find_users_by_ids(&author_ids).await?;
        Ok(authors.into_iter().map(|u| (u.id, u.username)).collect())
    }

    /// One page of top-level comments, newest first, each carrying up to
    /// `replies_limit` direct replies (oldest first) plus the full reply
    /// count and an overflow flag.
    pub async fn get_post_comments(
        &self,
        post_id: i32,
        viewer: Option<i32>,
        params: PageParams,
        replies_limit: u64,
    ) -> Result<Page<CommentWithReplies>> {
        self.validate_page(params)?;

        let post = self
            .content
            .find_post(post_id)
            .await?
            .ok_or(Error::NotFound)?;
        if !self.viewer_can_see(viewer, &post).await? {
            return Err(Error::NotFound);
        }

        // Query 1: the top-level page with its total.
        let top_filter = CommentFilter {
            post_id: Some(post_id),
            parent: ParentFilter::TopLevel,
            ..Default::default()
        };
        let (top, total) = self
            .content
            .find_comments_page(
                &top_filter,
                CommentOrder::NewestFirst,
                params.skip(),
                params.limit,
            )
            .await?;

        // Query 2: every direct reply for the whole page in one batch.
        let parent_ids: Vec<i32> = top.iter().map(|c| c.id).collect();
        let replies = if parent_ids.is_empty() {
            Vec::new()
        } else {
            self.content
                .find_comments(
                    &CommentFilter {
                        post_id: Some(post_id),
                        parent: ParentFilter::In(parent_ids),
                        ..Default::default()
                    },
                    CommentOrder::OldestFirst,
                    0,
                    None,
                )
                .await?
        };

        let mut by_parent: HashMap<i32, Vec<comments::Model>> = HashMap::new();
        for reply in replies {
            if let Some(parent_id) = reply.parent_id {
                by_parent.entry(parent_id).or_default().push(reply);
            }
        }

        let all_models: Vec<comments::Model> = top
            .iter()
            .cloned()
            .chain(by_parent.values().flatten().cloned())
            .collect();
        let usernames = self.comment_usernames(&all_models).await?;

        let data: Vec<CommentWithReplies> = top
            .into_iter()
            .map(|comment| {
                let group = by_parent.remove(&comment.id).unwrap_or_default();
                let replies_count = group.len() as u64;
                let replies: Vec<CommentView> = group
                    .into_iter()
                    .take(replies_limit as usize)
                    .map(|reply| comment_view(reply, &usernames))
                    .collect();
                CommentWithReplies {
                    comment: comment_view(comment, &usernames),
                    replies,
                    replies_count,
                    has_more_replies: replies_count > replies_limit,
                }
            })
            .collect();

        Ok(Page::new(data, total, params))
    }

    /// Paginate one comment's direct replies once `has_more_replies` was
    /// signalled. No automatic recursion into deeper levels.
    pub async fn get_comment_replies(
        &self,
        comment_id: i32,
        viewer: Option<i32>,
        params: PageParams,
    ) -> Result<Page<CommentView>> {
        self.validate_page(params)?;

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
        if !self.viewer_can_see(viewer, &post).await? {
            return Err(Error::NotFound);
        }

        let filter = CommentFilter {
            post_id: Some(comment.post_id),
            parent: ParentFilter::In(vec![comment_id]),
            ..Default::default()
        };
        let (models, total) = self
            .content
            .find_comments_page(&filter, CommentOrder::OldestFirst, params.skip(), params.limit)
            .await?;

        let usernames = self.comment_usernames(&models).await?;
        let data: Vec<CommentView> = models
            .into_iter()
            .map(|model| comment_view(model, &usernames))
            .collect();

        Ok(Page::new(data, total, params))
    }

    pub async fn create_comment(
        &self,
        author_id: i32,
        input: CreateCommentInput,
    ) -> Result<CommentView> {
        let content = normalized_content(&input.content, MAX_COMMENT_LENGTH)?;

        let post = self
            .content
            .find_post(input.post_id)
            .await?
            .ok_or(Error::NotFound)?;
        if !self.viewer_can_see(Some(author_id), &post).await? {
            return Err(Error::NotFound);
        }

        let parent = match input.parent_id {
            Some(parent_id) => {
                let parent = self
                    .content
                    .find_comment(parent_id)
                    .await?
                    .filter(|c| !c.is_deleted)
                    .ok_or(Error::NotFound)?;
                if parent.post_id != post.id {
                    return Err(Error::Validation(
                        "parentId: parent comment belongs to a different post".to_string(),
                    ));
                }
                Some(parent)
            }
            None => None,
        };

        let comment = self
            .content
            .insert_comment(NewComment {
                post_id: post.id,
                author_id,
                parent_id: input.parent_id,
                content,
            })
            .await?;
        self.cache.invalidate_post(post.id).await;

        if post.author_id != author_id {
            self.notifier
                .notify(
                    post.author_id,
                    serde_json::json!({
                        "type": "post_commented",
                        "postId": post.id,
                        "commentId": comment.id,
                        "userId": author_id,
                    }),
                )
                .await;
        }
        if let Some(parent) = parent {
            if parent.author_id != author_id && parent.author_id != post.author_id {
                self.notifier
                    .notify(
                        parent.author_id,
                        serde_json::json!({
                            "type": "comment_replied",
                            "postId": post.id,
                            "commentId": comment.id,
                            "userId": author_id,
                        }),
                    )
                    .await;
            }
        }

        let usernames = self.comment_usernames(std::slice::from_ref(&comment)).await?;
        Ok(comment_view(comment, &usernames))
    }

    pub async fn delete_comment(&self, user_id: i32, comment_id: i32) -> Result<()> {
        let comment = self
            .content
            .find_comment(comment_id)
            .await?
            .filter(|c| !c.is_deleted)
            .ok_or(Error::NotFound)?;
        if comment.author_id != user_id {
            return Err(Error::Forbidden);
        }

        self.content.soft_delete_comment(comment_id).await?;
        self.cache.invalidate_post(comment.post_id).await;
        Ok(())
    }
}

//! Social graph mutations, follower/following lists, profiles and
//! account-deletion cleanup.
//!
//! Duplicate edges are rejected with a conflict, never silently absorbed.
//! Blocks are directed rows with symmetric effect: interaction between the
//! pair stops in both directions, and existing follow edges between the two
//! users are removed as part of the block.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::cache::{keys, ttl};
use crate::engine::ContentEngine;
use crate::error::{Error, Result};
use crate::orm::users;
use crate::pagination::{Page, PageParams};
use crate::store::{PostFilter, ProfileChanges};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: i32,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email_verified: bool,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<users::Model> for UserSummary {
    fn from(user: users::Model) -> Self {
        Self {
            id: user.id,
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
            email_verified: user.email_verified,
            avatar_url: user.avatar_url,
            created_at: user.created_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: i32,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email_verified: bool,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub followers_count: u64,
    pub following_count: u64,
    pub posts_count: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileInput {
    #[validate(length(max = 100, message = "at most 100 characters"))]
    pub first_name: Option<String>,
    #[validate(length(max = 100, message = "at most 100 characters"))]
    pub last_name: Option<String>,
    #[validate(length(max = 500, message = "at most 500 characters"))]
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
}

impl ContentEngine {
    pub async fn follow_user(&self, follower_id: i32, following_id: i32) -> Result<()> {
        if follower_id == following_id {
            return Err(Error::Validation(
                "followingId: cannot follow yourself".to_string(),
            ));
        }

        self.users
            .find_user(following_id)
            .await?
            .ok_or(Error::NotFound)?;
        // A blocked pair cannot interact; reported as NotFound so the block
        // is not revealed to either side.
        if self.relations.is_blocked_pair(follower_id, following_id).await? {
            return Err(Error::NotFound);
        }
        if self.relations.is_following(follower_id, following_id).await? {
            return Err(Error::Conflict("already following this user"));
        }

        self.relations.insert_follow(follower_id, following_id).await?;
        self.cache
            .invalidate_follow_mutation(follower_id, following_id)
            .await;

        self.notifier
            .notify(
                following_id,
                serde_json::json!({
                    "type": "user_followed",
                    "userId": follower_id,
                }),
            )
            .await;
        Ok(())
    }

    pub async fn unfollow_user(&self, follower_id: i32, following_id: i32) -> Result<()> {
        if !self.relations.delete_follow(follower_id, following_id).await? {
            return Err(Error::NotFound);
        }
        self.cache
            .invalidate_follow_mutation(follower_id, following_id)
            .await;
        Ok(())
    }

    pub async fn block_user(&self, blocker_id: i32, blocked_id: i32) -> Result<()> {
        if blocker_id == blocked_id {
            return Err(Error::Validation(
                "blockedId: cannot block yourself".to_string(),
            ));
        }

        self.users
            .find_user(blocked_id)
            .await?
            .ok_or(Error::NotFound)?;
        let already_blocked = self
            .relations
            .blocked_ids_by(blocker_id)
            .await?
            .contains(&blocked_id);
        if already_blocked {
            return Err(Error::Conflict("already blocked this user"));
        }

        self.relations.insert_block(blocker_id, blocked_id).await?;
        // The block severs follow interaction in both directions.
        self.relations
            .delete_follows_between(blocker_id, blocked_id)
            .await?;

        self.cache
            .invalidate_follow_mutation(blocker_id, blocked_id)
            .await;
        self.cache
            .invalidate_follow_mutation(blocked_id, blocker_id)
            .await;
        Ok(())
    }

    pub async fn unblock_user(&self, blocker_id: i32, blocked_id: i32) -> Result<()> {
        if !self.relations.delete_block(blocker_id, blocked_id).await? {
            return Err(Error::NotFound);
        }
        self.cache
            .invalidate_follow_mutation(blocker_id, blocked_id)
            .await;
        self.cache
            .invalidate_follow_mutation(blocked_id, blocker_id)
            .await;
        Ok(())
    }

    pub async fn get_followers(
        &self,
        user_id: i32,
        params: PageParams,
    ) -> Result<Page<UserSummary>> {
        self.validate_page(params)?;

        let key = keys::followers(user_id, params.page, params.limit);
        if let Some(hit) = self.cache.get_json::<Page<UserSummary>>(&key).await {
            return Ok(hit);
        }

        self.users.find_user(user_id).await?.ok_or(Error::NotFound)?;
        let ids = self.relations.follower_ids(user_id).await?;
        let page = self.user_list_page(ids, params).await?;
        self.cache.set_json(&key, &page, ttl::FOLLOW_LISTS).await;
        Ok(page)
    }

    pub async fn get_following(
        &self,
        user_id: i32,
        params: PageParams,
    ) -> Result<Page<UserSummary>> {
        self.validate_page(params)?;

        let key = keys::following(user_id, params.page, params.limit);
        if let Some(hit) = self.cache.get_json::<Page<UserSummary>>(&key).await {
            return Ok(hit);
        }

        self.users.find_user(user_id).await?.ok_or(Error::NotFound)?;
        let ids = self.relations.following_ids(user_id).await?;
        let page = self.user_list_page(ids, params).await?;
        self.cache.set_json(&key, &page, ttl::FOLLOW_LISTS).await;
        Ok(page)
    }

    /// Page an id list and hydrate the slice, preserving edge order.
    async fn user_list_page(
        &self,
        ids: Vec<i32>,
        params: PageParams,
    ) -> Result<Page<UserSummary>> {
        let total = ids.len() as u64;
        let (start, end) = params.slice_range(ids.len());
        let slice = &ids[start..end];

        let mut by_id: HashMap<i32, users::Model> = self
            .users
            .find_users_by_ids(slice)
            .await?
            .into_iter()
            .map(|u| (u.id, u))
            .collect();
        let data: Vec<UserSummary> = slice
            .iter()
            .filter_map(|id| by_id.remove(id))
            .map(UserSummary::from)
            .collect();

        Ok(Page::new(data, total, params))
    }

    /// Profile as seen by `viewer`; the subject's own read is cached under a
    /// separate key with its own TTL.
    pub async fn get_user_profile(
        &self,
        user_id: i32,
        viewer: Option<i32>,
    ) -> Result<UserProfile> {
        if let Some(viewer_id) = viewer {
            if viewer_id != user_id
                && self.relations.is_blocked_pair(viewer_id, user_id).await?
            {
                return Err(Error::NotFound);
            }
        }

        let own = viewer == Some(user_id);
        let key = if own {
            keys::own_profile(user_id)
        } else {
            keys::profile(user_id)
        };
        if let Some(hit) = self.cache.get_json::<UserProfile>(&key).await {
            return Ok(hit);
        }

        let profile = self.assemble_profile(user_id).await?;
        let ttl = if own {
            ttl::OWN_PROFILE
        } else {
            ttl::PUBLIC_PROFILE
        };
        self.cache.set_json(&key, &profile, ttl).await;
        Ok(profile)
    }

    async fn assemble_profile(&self, user_id: i32) -> Result<UserProfile> {
        let user = self
            .users
            .find_user(user_id)
            .await?
            .ok_or(Error::NotFound)?;

        let posts_filter = PostFilter {
            author_ids: Some(vec![user_id]),
            ..Default::default()
        };
        let (followers, following, posts_count) = tokio::try_join!(
            self.relations.follower_ids(user_id),
            self.relations.following_ids(user_id),
            self.content.count_posts(&posts_filter),
        )?;

        Ok(UserProfile {
            id: user.id,
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
            email_verified: user.email_verified,
            bio: user.bio,
            avatar_url: user.avatar_url,
            followers_count: followers.len() as u64,
            following_count: following.len() as u64,
            posts_count,
            created_at: user.created_at.with_timezone(&Utc),
        })
    }

    pub async fn update_profile(
        &self,
        user_id: i32,
        input: UpdateProfileInput,
    ) -> Result<UserProfile> {
        input.validate()?;

        self.users
            .update_profile(
                user_id,
                ProfileChanges {
                    first_name: input.first_name,
                    last_name: input.last_name,
                    bio: input.bio,
                    avatar_url: input.avatar_url,
                },
            )
            .await?;
        self.cache.invalidate_profile_mutation(user_id).await;

        self.assemble_profile(user_id).await
    }

    /// Ordered account-deletion cleanup: hard-delete the symmetric
    /// relationship edges first, then soft-delete owned content, then drop
    /// the account's cache entries. Relationship rows disappear because they
    /// carry no visibility semantics; content keeps its soft-delete contract.
    pub async fn cleanup_account(&self, user_id: i32) -> Result<()> {
        self.relations.delete_all_edges_for(user_id).await?;

        let post_ids = self.content.soft_delete_posts_by_author(user_id).await?;
        self.content.soft_delete_comments_by_author(user_id).await?;

        for post_id in &post_ids {
            self.cache.invalidate_post(*post_id).await;
        }
        self.cache.del_pattern(&keys::feed_pattern(user_id)).await;
        self.cache
            .del_pattern(&keys::followers_pattern(user_id))
            .await;
        self.cache
            .del_pattern(&keys::following_pattern(user_id))
            .await;
        self.cache.invalidate_profile_mutation(user_id).await;
        Ok(())
    }
}

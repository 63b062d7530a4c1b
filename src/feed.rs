//! Personalized timeline assembly.

use std::collections::HashSet;

use crate::cache::{keys, ttl};
use crate::engine::ContentEngine;
use crate::error::Result;
use crate::orm::posts::Visibility;
use crate::pagination::{Page, PageParams};
use crate::posts::PostView;
use crate::store::{PostFilter, PostOrder};

impl ContentEngine {
    /// Recency-ordered posts from the viewer and the authors they follow,
    /// minus anyone with a block edge in either direction. A user with no
    /// follows still sees their own posts; a fully blocked relationship
    /// silently drops out without error.
    pub async fn get_feed(&self, user_id: i32, params: PageParams) -> Result<Page<PostView>> {
        self.validate_page(params)?;

        let key = keys::feed(user_id, params.page, params.limit);
        if let Some(hit) = self.cache.get_json::<Page<PostView>>(&key).await {
            return Ok(hit);
        }

        // Three independent relationship lookups; the two block directions
        // are unioned into one exclusion set.
        let (following, blockers, blocked) = tokio::try_join!(
            self.relations.following_ids(user_id),
            self.relations.blocker_ids_of(user_id),
            self.relations.blocked_ids_by(user_id),
        )?;
        let mut blocked_set: HashSet<i32> = blockers.into_iter().collect();
        blocked_set.extend(blocked);

        let mut author_set: HashSet<i32> = following.into_iter().collect();
        author_set.insert(user_id);
        let mut author_ids: Vec<i32> = author_set.difference(&blocked_set).copied().collect();
        author_ids.sort_unstable();

        let filter = PostFilter {
            author_ids: Some(author_ids),
            visibility: Some(vec![Visibility::Public, Visibility::Friends]),
            ..Default::default()
        };
        let (models, total) = tokio::try_join!(
            self.content.find_posts(
                &filter,
                PostOrder::NewestFirst,
                params.skip(),
                Some(params.limit),
            ),
            self.content.count_posts(&filter),
        )?;

        let data = self.hydrate_posts(models, Some(user_id)).await?;
        let page = Page::new(data, total, params);
        self.cache.set_json(&key, &page, ttl::FEED).await;
        Ok(page)
    }
}

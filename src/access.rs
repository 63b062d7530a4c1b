//! Per-post visibility decisions.
//!
//! Pure functions over facts the caller supplies; relationship lookups are
//! batched by callers so no per-post query is ever needed.

use std::collections::HashSet;

use crate::orm::posts::{self, Visibility};
use crate::store::RelationshipStore;

/// Decide whether `viewer` may see `post`.
///
/// Short-circuit order matters for cost; the cheapest checks run first.
pub fn can_view(
    viewer: Option<i32>,
    post: &posts::Model,
    is_blocked_pair: bool,
    viewer_follows_author: bool,
) -> bool {
    if post.is_deleted {
        return false;
    }
    // A block in either direction wins over visibility and authorship.
    if is_blocked_pair {
        return false;
    }
    if post.visibility == Visibility::Public {
        return true;
    }
    if viewer == Some(post.author_id) {
        return true;
    }
    // Anonymous viewers only reach public content.
    if viewer.is_none() {
        return false;
    }
    match post.visibility {
        // Private is author-only; the author case returned above.
        Visibility::Private => false,
        Visibility::Friends => viewer_follows_author,
        Visibility::Public => true,
    }
}

/// A viewer's relationship sets, batch-fetched once and consulted per post.
#[derive(Debug, Clone, Default)]
pub struct ViewerGraph {
    pub viewer: Option<i32>,
    /// Users with a block edge to or from the viewer.
    pub blocked: HashSet<i32>,
    /// Users the viewer follows.
    pub following: HashSet<i32>,
}

impl ViewerGraph {
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Fetch both block directions and the follow set for an authenticated
    /// viewer. The two block-direction queries are independent and issued
    /// concurrently.
    pub async fn load(
        relations: &dyn RelationshipStore,
        viewer: Option<i32>,
    ) -> crate::error::Result<Self> {
        let Some(user_id) = viewer else {
            return Ok(Self::anonymous());
        };

        let (blockers, blocked, following) = tokio::try_join!(
            relations.blocker_ids_of(user_id),
            relations.blocked_ids_by(user_id),
            relations.following_ids(user_id),
        )?;

        let mut blocked_set: HashSet<i32> = blockers.into_iter().collect();
        blocked_set.extend(blocked);

        Ok(Self {
            viewer,
            blocked: blocked_set,
            following: following.into_iter().collect(),
        })
    }

    pub fn allows(&self, post: &posts::Model) -> bool {
        can_view(
            self.viewer,
            post,
            self.blocked.contains(&post.author_id),
            self.following.contains(&post.author_id),
        )
    }
}

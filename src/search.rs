//! Substring search with deterministic relevance tie-breaks.
//!
//! Matching is a case-insensitive substring filter at the store, not
//! tokenized full-text search, and every sort policy is an explainable
//! comparator, not a blended score. Filters are conjunctive and applied
//! before sorting; ranking and pagination happen in memory.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::access::ViewerGraph;
use crate::cache::{keys, ttl};
use crate::constants::{ANONYMOUS_VIEWER, MAX_QUERY_LENGTH, MIN_QUERY_LENGTH};
use crate::engine::ContentEngine;
use crate::error::{Error, Result};
use crate::orm::posts::Visibility;
use crate::orm::users;
use crate::pagination::{Page, PageParams};
use crate::posts::PostView;
use crate::social::UserSummary;
use crate::store::{PostFilter, PostOrder, UserFilter};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostSearchFilters {
    pub visibility: Option<Visibility>,
    pub author_id: Option<i32>,
    pub min_likes: Option<i64>,
    pub min_comments: Option<i64>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostSortBy {
    Relevance,
    Newest,
    Oldest,
    Popular,
}

impl PostSortBy {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Relevance => "relevance",
            Self::Newest => "newest",
            Self::Oldest => "oldest",
            Self::Popular => "popular",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSearchFilters {
    pub verified_only: bool,
    pub has_bio: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserSortBy {
    Relevance,
    Username,
    Newest,
    Oldest,
}

impl UserSortBy {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Relevance => "relevance",
            Self::Username => "username",
            Self::Newest => "newest",
            Self::Oldest => "oldest",
        }
    }
}

/// Queries are bounded before anything touches the store; an empty query is
/// an error, not an empty result.
fn normalized_query(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let length = trimmed.chars().count();
    if length < MIN_QUERY_LENGTH || length > MAX_QUERY_LENGTH {
        return Err(Error::Validation(format!(
            "query: must be between {} and {} characters",
            MIN_QUERY_LENGTH, MAX_QUERY_LENGTH
        )));
    }
    Ok(trimmed.to_string())
}

fn viewer_segment(viewer: Option<i32>) -> String {
    viewer
        .map(|id| id.to_string())
        .unwrap_or_else(|| ANONYMOUS_VIEWER.to_string())
}

/// Strict four-tier relevance for user results; lower sorts first.
fn user_relevance_tier(user: &users::Model, query_lower: &str) -> u8 {
    let username = user.username.to_lowercase();
    if username == query_lower {
        0
    } else if username.starts_with(query_lower) {
        1
    } else if user.email_verified {
        2
    } else {
        3
    }
}

impl ContentEngine {
    /// Posts whose content or author username contains the query, visible to
    /// the viewer, narrowed by the conjunctive filters, under the requested
    /// sort policy.
    pub async fn search_posts(
        &self,
        query: &str,
        params: PageParams,
        viewer: Option<i32>,
        filters: &PostSearchFilters,
        sort: PostSortBy,
    ) -> Result<Page<PostView>> {
        let query = normalized_query(query)?;
        self.validate_page(params)?;

        let mut cache_params: BTreeMap<&'static str, String> = BTreeMap::new();
        cache_params.insert("q", query.to_lowercase());
        cache_params.insert("page", params.page.to_string());
        cache_params.insert("limit", params.limit.to_string());
        cache_params.insert("viewer", viewer_segment(viewer));
        cache_params.insert("sort", sort.as_str().to_string());
        if let Some(v) = filters.visibility {
            cache_params.insert("visibility", v.as_str().to_string());
        }
        if let Some(author_id) = filters.author_id {
            cache_params.insert("author", author_id.to_string());
        }
        if let Some(min) = filters.min_likes {
            cache_params.insert("minLikes", min.to_string());
        }
        if let Some(min) = filters.min_comments {
            cache_params.insert("minComments", min.to_string());
        }
        if let Some(after) = filters.created_after {
            cache_params.insert("after", after.to_rfc3339());
        }
        if let Some(before) = filters.created_before {
            cache_params.insert("before", before.to_rfc3339());
        }
        let key = keys::search("posts", &cache_params);
        if let Some(hit) = self.cache.get_json::<Page<PostView>>(&key).await {
            return Ok(hit);
        }

        let graph = ViewerGraph::load(self.relations.as_ref(), viewer).await?;
        let filter = PostFilter {
            query: Some(query.clone()),
            author_ids: filters.author_id.map(|id| vec![id]),
            visibility: filters.visibility.map(|v| vec![v]),
            created_after: filters.created_after,
            created_before: filters.created_before,
            exclude_author_ids: graph.blocked.iter().copied().collect(),
            ..Default::default()
        };

        let models = self
            .content
            .find_posts(&filter, PostOrder::NewestFirst, 0, None)
            .await?;
        let eligible: Vec<_> = models.into_iter().filter(|p| graph.allows(p)).collect();
        let mut views = self.hydrate_posts(eligible, viewer).await?;

        if let Some(min) = filters.min_likes {
            views.retain(|v| v.like_count >= min);
        }
        if let Some(min) = filters.min_comments {
            views.retain(|v| v.comment_count >= min);
        }

        let query_lower = query.to_lowercase();
        match sort {
            PostSortBy::Relevance => {
                // Content matches rank above author-username-only matches;
                // newest first within each band.
                views.sort_by(|a, b| {
                    let a_content = a.content.to_lowercase().contains(&query_lower);
                    let b_content = b.content.to_lowercase().contains(&query_lower);
                    b_content
                        .cmp(&a_content)
                        .then_with(|| b.created_at.cmp(&a.created_at))
                        .then_with(|| b.id.cmp(&a.id))
                });
            }
            PostSortBy::Newest => {
                views.sort_by(|a, b| {
                    b.created_at
                        .cmp(&a.created_at)
                        .then_with(|| b.id.cmp(&a.id))
                });
            }
            PostSortBy::Oldest => {
                views.sort_by(|a, b| {
                    a.created_at
                        .cmp(&b.created_at)
                        .then_with(|| a.id.cmp(&b.id))
                });
            }
            PostSortBy::Popular => {
                views.sort_by(|a, b| {
                    (b.like_count + b.comment_count)
                        .cmp(&(a.like_count + a.comment_count))
                        .then_with(|| b.created_at.cmp(&a.created_at))
                        .then_with(|| b.id.cmp(&a.id))
                });
            }
        }

        let total = views.len() as u64;
        let (start, end) = params.slice_range(views.len());
        let data: Vec<PostView> = views.into_iter().skip(start).take(end - start).collect();

        let page = Page::new(data, total, params);
        self.cache.set_json(&key, &page, ttl::SEARCH).await;
        Ok(page)
    }

    /// Users matching the query on username, name or email. The searcher
    /// never appears in their own results, and blocked pairs are mutually
    /// invisible here as everywhere else.
    pub async fn search_users(
        &self,
        query: &str,
        params: PageParams,
        viewer: Option<i32>,
        filters: &UserSearchFilters,
        sort: UserSortBy,
    ) -> Result<Page<UserSummary>> {
        let query = normalized_query(query)?;
        self.validate_page(params)?;

        let mut cache_params: BTreeMap<&'static str, String> = BTreeMap::new();
        cache_params.insert("q", query.to_lowercase());
        cache_params.insert("page", params.page.to_string());
        cache_params.insert("limit", params.limit.to_string());
        cache_params.insert("viewer", viewer_segment(viewer));
        cache_params.insert("sort", sort.as_str().to_string());
        if filters.verified_only {
            cache_params.insert("verified", "1".to_string());
        }
        if filters.has_bio {
            cache_params.insert("hasBio", "1".to_string());
        }
        let key = keys::search("users", &cache_params);
        if let Some(hit) = self.cache.get_json::<Page<UserSummary>>(&key).await {
            return Ok(hit);
        }

        let graph = ViewerGraph::load(self.relations.as_ref(), viewer).await?;
        let filter = UserFilter {
            query: Some(query.clone()),
            verified_only: filters.verified_only,
            has_bio: filters.has_bio,
            exclude_id: viewer,
        };
        let mut matches = self.users.search_users(&filter).await?;
        if !graph.blocked.is_empty() {
            matches.retain(|u| !graph.blocked.contains(&u.id));
        }

        let query_lower = query.to_lowercase();
        match sort {
            UserSortBy::Relevance => {
                matches.sort_by(|a, b| {
                    user_relevance_tier(a, &query_lower)
                        .cmp(&user_relevance_tier(b, &query_lower))
                        .then_with(|| a.username.to_lowercase().cmp(&b.username.to_lowercase()))
                        .then_with(|| a.id.cmp(&b.id))
                });
            }
            UserSortBy::Username => {
                matches.sort_by(|a, b| {
                    a.username
                        .to_lowercase()
                        .cmp(&b.username.to_lowercase())
                        .then_with(|| a.id.cmp(&b.id))
                });
            }
            UserSortBy::Newest => {
                matches.sort_by(|a, b| {
                    b.created_at
                        .cmp(&a.created_at)
                        .then_with(|| b.id.cmp(&a.id))
                });
            }
            UserSortBy::Oldest => {
                matches.sort_by(|a, b| {
                    a.created_at
                        .cmp(&b.created_at)
                        .then_with(|| a.id.cmp(&b.id))
                });
            }
        }

        let total = matches.len() as u64;
        let (start, end) = params.slice_range(matches.len());
        let data: Vec<UserSummary> = matches
            .into_iter()
            .skip(start)
            .take(end - start)
            .map(UserSummary::from)
            .collect();

        let page = Page::new(data, total, params);
        self.cache.set_json(&key, &page, ttl::SEARCH).await;
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user(id: i32, username: &str, verified: bool) -> users::Model {
        users::Model {
            id,
            username: username.to_string(),
            email: format!("{}@example.com", username),
            email_verified: verified,
            first_name: None,
            last_name: None,
            bio: None,
            avatar_url: None,
            created_at: Utc::now().into(),
        }
    }

    #[test]
    fn query_bounds_are_enforced() {
        assert!(normalized_query("").is_err());
        assert!(normalized_query("   ").is_err());
        assert!(normalized_query(&"x".repeat(201)).is_err());
        assert_eq!(normalized_query("  rust  ").unwrap(), "rust");
    }

    #[test]
    fn user_relevance_is_a_strict_tier_order() {
        assert_eq!(user_relevance_tier(&user(1, "alice", false), "alice"), 0);
        assert_eq!(user_relevance_tier(&user(2, "alice99", false), "alice"), 1);
        assert_eq!(user_relevance_tier(&user(3, "bob", true), "alice"), 2);
        assert_eq!(user_relevance_tier(&user(4, "bob", false), "alice"), 3);
    }

    #[test]
    fn exact_match_is_case_insensitive() {
        assert_eq!(user_relevance_tier(&user(1, "Alice", false), "alice"), 0);
    }
}

//! Time-decayed engagement ranking.
//!
//! Scores are computed in memory over a time-bounded candidate set because
//! the decay formula is not expressible as a storage sort key. The candidate
//! window (≤30 days unless `all`) keeps the scored set small; at larger data
//! volumes the counters should be denormalized onto the post row instead of
//! recounted per request.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::access::ViewerGraph;
use crate::cache::{keys, ttl};
use crate::constants::ANONYMOUS_VIEWER;
use crate::engine::ContentEngine;
use crate::error::Result;
use crate::orm::posts::Visibility;
use crate::pagination::{Page, PageParams};
use crate::posts::PostView;
use crate::store::{PostFilter, PostOrder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeRange {
    Day,
    Week,
    Month,
    All,
}

impl TimeRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::All => "all",
        }
    }

    /// Lower bound for candidate posts; `None` means no bound.
    pub fn threshold(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Day => Some(now - Duration::hours(24)),
            Self::Week => Some(now - Duration::days(7)),
            Self::Month => Some(now - Duration::days(30)),
            Self::All => None,
        }
    }
}

/// `(2·likes + 3·comments) / (hours since creation + 1)`.
///
/// Comments weigh more than likes as the stronger engagement signal; the +1
/// denominator keeps posts from the current hour finite.
pub fn trending_score(
    like_count: i64,
    comment_count: i64,
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> f64 {
    let hours = ((now - created_at).num_seconds().max(0) as f64) / 3600.0;
    (like_count as f64 * 2.0 + comment_count as f64 * 3.0) / (hours + 1.0)
}

impl ContentEngine {
    /// Decayed-engagement ranking over the time window, filtered through the
    /// access resolver per author, paginated in memory after scoring. The
    /// transient score is dropped before results leave this function.
    pub async fn get_trending(
        &self,
        params: PageParams,
        viewer: Option<i32>,
        range: TimeRange,
    ) -> Result<Page<PostView>> {
        self.validate_page(params)?;

        let mut cache_params: BTreeMap<&'static str, String> = BTreeMap::new();
        cache_params.insert("page", params.page.to_string());
        cache_params.insert("limit", params.limit.to_string());
        cache_params.insert("range", range.as_str().to_string());
        cache_params.insert(
            "viewer",
            viewer
                .map(|id| id.to_string())
                .unwrap_or_else(|| ANONYMOUS_VIEWER.to_string()),
        );
        let key = keys::search("trending", &cache_params);
        if let Some(hit) = self.cache.get_json::<Page<PostView>>(&key).await {
            return Ok(hit);
        }

        let now = Utc::now();
        // Coarse visibility filter: friends-only candidates are worth
        // fetching only for authenticated viewers. Exact per-author
        // eligibility is enforced by the resolver below.
        let mut visibility = vec![Visibility::Public];
        if viewer.is_some() {
            visibility.push(Visibility::Friends);
        }

        let graph = ViewerGraph::load(self.relations.as_ref(), viewer).await?;
        let filter = PostFilter {
            visibility: Some(visibility),
            created_after: range.threshold(now),
            exclude_author_ids: graph.blocked.iter().copied().collect(),
            ..Default::default()
        };

        let models = self
            .content
            .find_posts(&filter, PostOrder::NewestFirst, 0, None)
            .await?;
        let eligible: Vec<_> = models.into_iter().filter(|p| graph.allows(p)).collect();
        let views = self.hydrate_posts(eligible, viewer).await?;

        let mut scored: Vec<(f64, PostView)> = views
            .into_iter()
            .map(|view| {
                (
                    trending_score(view.like_count, view.comment_count, view.created_at, now),
                    view,
                )
            })
            .collect();
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.1.created_at.cmp(&a.1.created_at))
                .then_with(|| b.1.id.cmp(&a.1.id))
        });

        let total = scored.len() as u64;
        let (start, end) = params.slice_range(scored.len());
        let data: Vec<PostView> = scored
            .into_iter()
            .map(|(_, view)| view)
            .skip(start)
            .take(end - start)
            .collect();

        let page = Page::new(data, total, params);
        self.cache.set_json(&key, &page, ttl::SEARCH).await;
        Ok(page)
    }
}

//! Offset pagination envelope shared by every read operation.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Validated page/limit pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PageParams {
    pub page: u64,
    pub limit: u64,
}

impl PageParams {
    pub fn new(page: u64, limit: u64) -> Self {
        Self { page, limit }
    }

    /// Reject out-of-range pagination before any query executes.
    pub fn validate(&self, max_limit: u64) -> Result<()> {
        if self.page < 1 {
            return Err(Error::Validation("page: must be at least 1".to_string()));
        }
        if self.limit < 1 || self.limit > max_limit {
            return Err(Error::Validation(format!(
                "limit: must be between 1 and {}",
                max_limit
            )));
        }
        Ok(())
    }

    pub fn skip(&self) -> u64 {
        (self.page - 1) * self.limit
    }

    /// Bounds for slicing an already-scored, already-sorted in-memory list.
    pub fn slice_range(&self, len: usize) -> (usize, usize) {
        let start = (self.skip() as usize).min(len);
        let end = (start + self.limit as usize).min(len);
        (start, end)
    }
}

/// Page of results in the shape handed to route collaborators, and the exact
/// shape serialized into the cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
    pub has_next_page: bool,
    pub has_previous_page: bool,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, total: u64, params: PageParams) -> Self {
        let total_pages = if total == 0 {
            0
        } else {
            (total + params.limit - 1) / params.limit
        };
        Self {
            data,
            total,
            page: params.page,
            limit: params.limit,
            total_pages,
            has_next_page: params.page < total_pages,
            has_previous_page: params.page > 1 && total > 0,
        }
    }
}

//! Application-wide constants
//!
//! This module contains constants used throughout the application.

/// Maximum length for post content in characters.
/// Content is trimmed before the length check; an empty trimmed body is
/// rejected outright.
pub const MAX_POST_LENGTH: usize = 5_000;

/// Maximum length for comment content in characters
pub const MAX_COMMENT_LENGTH: usize = 2_000;

/// Maximum number of media attachments per post
pub const MAX_MEDIA_URLS: usize = 10;

/// Bounds for search query strings in characters.
/// An empty or missing query is a validation error, not an empty result.
pub const MIN_QUERY_LENGTH: usize = 1;
pub const MAX_QUERY_LENGTH: usize = 200;

/// Maximum length for profile text fields (bio)
pub const MAX_BIO_LENGTH: usize = 500;

/// Viewer segment used for anonymous entries in per-viewer cache keys
pub const ANONYMOUS_VIEWER: &str = "anonymous";

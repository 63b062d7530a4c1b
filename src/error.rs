//! Engine error taxonomy.
//!
//! The engine raises typed conditions only; mapping to HTTP status/message
//! pairs is the surrounding route collaborator's job. Absent, soft-deleted and
//! blocked-from-view content are all reported as [`Error::NotFound`] so that
//! the existence of private or blocked content is never leaked.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Entity absent, soft-deleted, or not visible to the viewer.
    #[error("not found")]
    NotFound,

    /// Input rejected before any query executed.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Duplicate follow/like/block pair. Creates are rejected, not silently
    /// idempotent; callers toggle explicitly.
    #[error("conflict: {0}")]
    Conflict(&'static str),

    /// Acting on another user's own-only resource.
    #[error("forbidden")]
    Forbidden,

    /// Primary content store failure. Not recovered locally; propagates to
    /// the caller. Cache failures never surface here.
    #[error("storage error")]
    Store(#[from] anyhow::Error),
}

impl From<sea_orm::DbErr> for Error {
    fn from(e: sea_orm::DbErr) -> Self {
        Self::Store(anyhow::Error::new(e))
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        // Flatten the field->errors map into a single stable message.
        let mut parts: Vec<String> = errors
            .field_errors()
            .iter()
            .map(|(field, errs)| {
                let detail = errs
                    .first()
                    .and_then(|e| e.message.as_ref())
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "invalid value".to_string());
                format!("{}: {}", field, detail)
            })
            .collect();
        parts.sort();
        Self::Validation(parts.join("; "))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

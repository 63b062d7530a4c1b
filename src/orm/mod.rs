//! SeaORM entities for the content and relationship tables.

pub mod comments;
pub mod likes;
pub mod posts;
pub mod user_blocks;
pub mod user_follows;
pub mod users;

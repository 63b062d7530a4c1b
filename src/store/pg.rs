//! sea-orm/Postgres implementation of the store seams.
//!
//! Joined and aggregated reads go through raw statements; single-table shapes
//! use the query builder. Engagement counters are counted from like/comment
//! rows at read time rather than denormalized onto the post row.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    entity::*, query::*, Condition, DatabaseConnection, DbBackend, DbErr, FromQueryResult, Select,
    Set, Statement, Value,
};

use crate::error::{Error, Result};
use crate::orm::{comments, likes, posts, user_blocks, user_follows, users};

use super::{
    CommentFilter, CommentOrder, ContentStore, Engagement, LikeTarget, NewComment, NewPost,
    ParentFilter, PostChanges, PostFilter, PostOrder, ProfileChanges, RelationshipStore,
    UserFilter, UserStore,
};

pub struct PgStore {
    db: DatabaseConnection,
}

impl PgStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Adapter over the process-wide pool from [`crate::db`].
    pub fn from_global() -> Self {
        Self {
            db: crate::db::get_db_pool().to_owned(),
        }
    }
}

/// `%term%` with LIKE metacharacters escaped, lowercased for the
/// `LOWER(column) LIKE` legs.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn join_ids(ids: &[i32]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// `FROM posts p ... WHERE ...` tail shared by the select and count queries.
fn post_sql_tail(filter: &PostFilter) -> (String, Vec<Value>) {
    let mut clauses: Vec<String> = Vec::new();
    let mut values: Vec<Value> = Vec::new();
    let mut join = String::new();

    if !filter.include_deleted {
        clauses.push("p.is_deleted = FALSE".to_string());
    }
    if let Some(ids) = &filter.author_ids {
        if ids.is_empty() {
            clauses.push("FALSE".to_string());
        } else {
            clauses.push(format!("p.author_id IN ({})", join_ids(ids)));
        }
    }
    if !filter.exclude_author_ids.is_empty() {
        clauses.push(format!(
            "p.author_id NOT IN ({})",
            join_ids(&filter.exclude_author_ids)
        ));
    }
    if let Some(vs) = &filter.visibility {
        let list = vs
            .iter()
            .map(|v| format!("'{}'", v.as_str()))
            .collect::<Vec<_>>()
            .join(", ");
        clauses.push(format!("p.visibility IN ({})", list));
    }
    if let Some(after) = filter.created_after {
        values.push(after.into());
        clauses.push(format!("p.created_at >= ${}", values.len()));
    }
    if let Some(before) = filter.created_before {
        values.push(before.into());
        clauses.push(format!("p.created_at <= ${}", values.len()));
    }
    if let Some(term) = &filter.query {
        join = " JOIN users u ON u.id = p.author_id".to_string();
        let pattern = like_pattern(term);
        values.push(pattern.clone().into());
        let content_param = values.len();
        values.push(pattern.into());
        let author_param = values.len();
        clauses.push(format!(
            "(LOWER(p.content) LIKE ${} OR LOWER(u.username) LIKE ${})",
            content_param, author_param
        ));
    }

    let where_sql = if clauses.is_empty() {
        "TRUE".to_string()
    } else {
        clauses.join(" AND ")
    };
    (format!("FROM posts p{} WHERE {}", join, where_sql), values)
}

fn comment_query(filter: &CommentFilter, order: CommentOrder) -> Select<comments::Entity> {
    let mut query = comments::Entity::find();
    if let Some(post_id) = filter.post_id {
        query = query.filter(comments::Column::PostId.eq(post_id));
    }
    match &filter.parent {
        ParentFilter::Any => {}
        ParentFilter::TopLevel => {
            query = query.filter(comments::Column::ParentId.is_null());
        }
        ParentFilter::In(ids) => {
            query = query.filter(comments::Column::ParentId.is_in(ids.iter().copied()));
        }
    }
    if !filter.include_deleted {
        query = query.filter(comments::Column::IsDeleted.eq(false));
    }
    match order {
        CommentOrder::NewestFirst => query
            .order_by_desc(comments::Column::CreatedAt)
            .order_by_desc(comments::Column::Id),
        CommentOrder::OldestFirst => query
            .order_by_asc(comments::Column::CreatedAt)
            .order_by_asc(comments::Column::Id),
    }
}

fn like_condition(user_id: i32, target: LikeTarget) -> Condition {
    let base = Condition::all().add(likes::Column::UserId.eq(user_id));
    match target {
        LikeTarget::Post(id) => base.add(likes::Column::PostId.eq(id)),
        LikeTarget::Comment(id) => base.add(likes::Column::CommentId.eq(id)),
    }
}

#[derive(FromQueryResult)]
struct CountRow {
    total: i64,
}

#[derive(FromQueryResult)]
struct EngagementRow {
    post_id: i32,
    like_count: i64,
    comment_count: i64,
}

#[derive(FromQueryResult)]
struct LikedRow {
    post_id: i32,
}

#[async_trait]
impl ContentStore for PgStore {
    async fn find_post(&self, id: i32) -> Result<Option<posts::Model>> {
        posts::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(Into::into)
    }

    async fn find_posts(
        &self,
        filter: &PostFilter,
        order: PostOrder,
        skip: u64,
        take: Option<u64>,
    ) -> Result<Vec<posts::Model>> {
        let (tail, values) = post_sql_tail(filter);
        let order_sql = match order {
            PostOrder::NewestFirst => "ORDER BY p.created_at DESC, p.id DESC",
            PostOrder::OldestFirst => "ORDER BY p.created_at ASC, p.id ASC",
        };
        let window_sql = match take {
            Some(n) => format!("LIMIT {} OFFSET {}", n, skip),
            None => format!("OFFSET {}", skip),
        };
        let sql = format!("SELECT p.* {} {} {}", tail, order_sql, window_sql);

        posts::Model::find_by_statement(Statement::from_sql_and_values(
            DbBackend::Postgres,
            &sql,
            values,
        ))
        .all(&self.db)
        .await
        .map_err(Into::into)
    }

    async fn count_posts(&self, filter: &PostFilter) -> Result<u64> {
        let (tail, values) = post_sql_tail(filter);
        let sql = format!("SELECT COUNT(*) AS total {}", tail);

        let row = CountRow::find_by_statement(Statement::from_sql_and_values(
            DbBackend::Postgres,
            &sql,
            values,
        ))
        .one(&self.db)
        .await?;

        Ok(row.map(|r| r.total as u64).unwrap_or(0))
    }

    async fn insert_post(&self, post: NewPost) -> Result<posts::Model> {
        let now = Utc::now();
        let model = posts::ActiveModel {
            author_id: Set(post.author_id),
            content: Set(post.content),
            media_urls: Set(serde_json::json!(post.media_urls)),
            visibility: Set(post.visibility),
            is_deleted: Set(false),
            deleted_at: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;
        Ok(model)
    }

    async fn update_post(&self, id: i32, changes: PostChanges) -> Result<posts::Model> {
        let mut active = posts::ActiveModel {
            id: Set(id),
            updated_at: Set(Utc::now().into()),
            ..Default::default()
        };
        if let Some(content) = changes.content {
            active.content = Set(content);
        }
        if let Some(urls) = changes.media_urls {
            active.media_urls = Set(serde_json::json!(urls));
        }
        if let Some(visibility) = changes.visibility {
            active.visibility = Set(visibility);
        }
        active.update(&self.db).await.map_err(Into::into)
    }

    async fn soft_delete_post(&self, id: i32) -> Result<()> {
        posts::Entity::update_many()
            .col_expr(posts::Column::IsDeleted, Expr::value(true))
            .col_expr(posts::Column::DeletedAt, Expr::value(Utc::now()))
            .filter(posts::Column::Id.eq(id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn soft_delete_posts_by_author(&self, author_id: i32) -> Result<Vec<i32>> {
        let ids: Vec<i32> = posts::Entity::find()
            .filter(posts::Column::AuthorId.eq(author_id))
            .filter(posts::Column::IsDeleted.eq(false))
            .all(&self.db)
            .await?
            .iter()
            .map(|p| p.id)
            .collect();

        if !ids.is_empty() {
            posts::Entity::update_many()
                .col_expr(posts::Column::IsDeleted, Expr::value(true))
                .col_expr(posts::Column::DeletedAt, Expr::value(Utc::now()))
                .filter(posts::Column::Id.is_in(ids.iter().copied()))
                .exec(&self.db)
                .await?;
        }
        Ok(ids)
    }

    async fn find_comment(&self, id: i32) -> Result<Option<comments::Model>> {
        comments::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(Into::into)
    }

    async fn find_comments(
        &self,
        filter: &CommentFilter,
        order: CommentOrder,
        skip: u64,
        take: Option<u64>,
    ) -> Result<Vec<comments::Model>> {
        let mut query = comment_query(filter, order).offset(skip);
        if let Some(take) = take {
            query = query.limit(take);
        }
        query.all(&self.db).await.map_err(Into::into)
    }

    async fn find_comments_page(
        &self,
        filter: &CommentFilter,
        order: CommentOrder,
        skip: u64,
        take: u64,
    ) -> Result<(Vec<comments::Model>, u64)> {
        let query = comment_query(filter, order);
        let total = query.clone().count(&self.db).await? as u64;
        let rows = query.offset(skip).limit(take).all(&self.db).await?;
        Ok((rows, total))
    }

    async fn insert_comment(&self, comment: NewComment) -> Result<comments::Model> {
        let model = comments::ActiveModel {
            post_id: Set(comment.post_id),
            author_id: Set(comment.author_id),
            parent_id: Set(comment.parent_id),
            content: Set(comment.content),
            is_deleted: Set(false),
            created_at: Set(Utc::now().into()),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;
        Ok(model)
    }

    async fn soft_delete_comment(&self, id: i32) -> Result<()> {
        comments::Entity::update_many()
            .col_expr(comments::Column::IsDeleted, Expr::value(true))
            .filter(comments::Column::Id.eq(id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn soft_delete_comments_by_author(&self, author_id: i32) -> Result<()> {
        comments::Entity::update_many()
            .col_expr(comments::Column::IsDeleted, Expr::value(true))
            .filter(comments::Column::AuthorId.eq(author_id))
            .filter(comments::Column::IsDeleted.eq(false))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn post_engagement(&self, post_ids: &[i32]) -> Result<HashMap<i32, Engagement>> {
        if post_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let sql = format!(
            r#"
            SELECT
                p.id AS post_id,
                (SELECT COUNT(*) FROM likes l WHERE l.post_id = p.id) AS like_count,
                (SELECT COUNT(*) FROM comments c
                    WHERE c.post_id = p.id AND c.is_deleted = FALSE) AS comment_count
            FROM posts p
            WHERE p.id IN ({})
            "#,
            join_ids(post_ids)
        );

        let rows = EngagementRow::find_by_statement(Statement::from_string(
            DbBackend::Postgres,
            sql,
        ))
        .all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| {
                (
                    r.post_id,
                    Engagement {
                        like_count: r.like_count,
                        comment_count: r.comment_count,
                    },
                )
            })
            .collect())
    }

    async fn liked_post_ids(&self, user_id: i32, post_ids: &[i32]) -> Result<HashSet<i32>> {
        if post_ids.is_empty() {
            return Ok(HashSet::new());
        }

        let sql = format!(
            "SELECT l.post_id FROM likes l WHERE l.user_id = {} AND l.post_id IN ({})",
            user_id,
            join_ids(post_ids)
        );
        let rows = LikedRow::find_by_statement(Statement::from_string(DbBackend::Postgres, sql))
            .all(&self.db)
            .await?;

        Ok(rows.into_iter().map(|r| r.post_id).collect())
    }

    async fn like_exists(&self, user_id: i32, target: LikeTarget) -> Result<bool> {
        let existing = likes::Entity::find()
            .filter(like_condition(user_id, target))
            .one(&self.db)
            .await?;
        Ok(existing.is_some())
    }

    async fn insert_like(&self, user_id: i32, target: LikeTarget) -> Result<()> {
        let (post_id, comment_id) = match target {
            LikeTarget::Post(id) => (Some(id), None),
            LikeTarget::Comment(id) => (None, Some(id)),
        };
        likes::ActiveModel {
            user_id: Set(user_id),
            post_id: Set(post_id),
            comment_id: Set(comment_id),
            created_at: Set(Utc::now().into()),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;
        Ok(())
    }

    async fn delete_like(&self, user_id: i32, target: LikeTarget) -> Result<bool> {
        let result = likes::Entity::delete_many()
            .filter(like_condition(user_id, target))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }
}

#[async_trait]
impl RelationshipStore for PgStore {
    async fn is_following(&self, follower_id: i32, following_id: i32) -> Result<bool> {
        let edge = user_follows::Entity::find()
            .filter(user_follows::Column::FollowerId.eq(follower_id))
            .filter(user_follows::Column::FollowingId.eq(following_id))
            .one(&self.db)
            .await?;
        Ok(edge.is_some())
    }

    async fn following_ids(&self, user_id: i32) -> Result<Vec<i32>> {
        let edges = user_follows::Entity::find()
            .filter(user_follows::Column::FollowerId.eq(user_id))
            .order_by_desc(user_follows::Column::CreatedAt)
            .order_by_desc(user_follows::Column::Id)
            .all(&self.db)
            .await?;
        Ok(edges.iter().map(|e| e.following_id).collect())
    }

    async fn follower_ids(&self, user_id: i32) -> Result<Vec<i32>> {
        let edges = user_follows::Entity::find()
            .filter(user_follows::Column::FollowingId.eq(user_id))
            .order_by_desc(user_follows::Column::CreatedAt)
            .order_by_desc(user_follows::Column::Id)
            .all(&self.db)
            .await?;
        Ok(edges.iter().map(|e| e.follower_id).collect())
    }

    async fn is_blocked_pair(&self, a: i32, b: i32) -> Result<bool> {
        let edge = user_blocks::Entity::find()
            .filter(
                Condition::any()
                    .add(
                        Condition::all()
                            .add(user_blocks::Column::BlockerId.eq(a))
                            .add(user_blocks::Column::BlockedId.eq(b)),
                    )
                    .add(
                        Condition::all()
                            .add(user_blocks::Column::BlockerId.eq(b))
                            .add(user_blocks::Column::BlockedId.eq(a)),
                    ),
            )
            .one(&self.db)
            .await?;
        Ok(edge.is_some())
    }

    async fn blocker_ids_of(&self, user_id: i32) -> Result<Vec<i32>> {
        let edges = user_blocks::Entity::find()
            .filter(user_blocks::Column::BlockedId.eq(user_id))
            .all(&self.db)
            .await?;
        Ok(edges.iter().map(|e| e.blocker_id).collect())
    }

    async fn blocked_ids_by(&self, user_id: i32) -> Result<Vec<i32>> {
        let edges = user_blocks::Entity::find()
            .filter(user_blocks::Column::BlockerId.eq(user_id))
            .all(&self.db)
            .await?;
        Ok(edges.iter().map(|e| e.blocked_id).collect())
    }

    async fn insert_follow(&self, follower_id: i32, following_id: i32) -> Result<()> {
        user_follows::ActiveModel {
            follower_id: Set(follower_id),
            following_id: Set(following_id),
            created_at: Set(Utc::now().into()),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;
        Ok(())
    }

    async fn delete_follow(&self, follower_id: i32, following_id: i32) -> Result<bool> {
        let result = user_follows::Entity::delete_many()
            .filter(user_follows::Column::FollowerId.eq(follower_id))
            .filter(user_follows::Column::FollowingId.eq(following_id))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }

    async fn insert_block(&self, blocker_id: i32, blocked_id: i32) -> Result<()> {
        user_blocks::ActiveModel {
            blocker_id: Set(blocker_id),
            blocked_id: Set(blocked_id),
            created_at: Set(Utc::now().into()),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;
        Ok(())
    }

    async fn delete_block(&self, blocker_id: i32, blocked_id: i32) -> Result<bool> {
        let result = user_blocks::Entity::delete_many()
            .filter(user_blocks::Column::BlockerId.eq(blocker_id))
            .filter(user_blocks::Column::BlockedId.eq(blocked_id))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }

    async fn delete_follows_between(&self, a: i32, b: i32) -> Result<()> {
        user_follows::Entity::delete_many()
            .filter(
                Condition::any()
                    .add(
                        Condition::all()
                            .add(user_follows::Column::FollowerId.eq(a))
                            .add(user_follows::Column::FollowingId.eq(b)),
                    )
                    .add(
                        Condition::all()
                            .add(user_follows::Column::FollowerId.eq(b))
                            .add(user_follows::Column::FollowingId.eq(a)),
                    ),
            )
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn delete_all_edges_for(&self, user_id: i32) -> Result<()> {
        user_follows::Entity::delete_many()
            .filter(
                Condition::any()
                    .add(user_follows::Column::FollowerId.eq(user_id))
                    .add(user_follows::Column::FollowingId.eq(user_id)),
            )
            .exec(&self.db)
            .await?;
        user_blocks::Entity::delete_many()
            .filter(
                Condition::any()
                    .add(user_blocks::Column::BlockerId.eq(user_id))
                    .add(user_blocks::Column::BlockedId.eq(user_id)),
            )
            .exec(&self.db)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_user(&self, id: i32) -> Result<Option<users::Model>> {
        users::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(Into::into)
    }

    async fn find_users_by_ids(&self, ids: &[i32]) -> Result<Vec<users::Model>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        users::Entity::find()
            .filter(users::Column::Id.is_in(ids.iter().copied()))
            .all(&self.db)
            .await
            .map_err(Into::into)
    }

    async fn search_users(&self, filter: &UserFilter) -> Result<Vec<users::Model>> {
        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(term) = &filter.query {
            let pattern = like_pattern(term);
            let first = values.len() + 1;
            for _ in 0..4 {
                values.push(pattern.clone().into());
            }
            clauses.push(format!(
                "(LOWER(u.username) LIKE ${} \
                 OR LOWER(COALESCE(u.first_name, '')) LIKE ${} \
                 OR LOWER(COALESCE(u.last_name, '')) LIKE ${} \
                 OR LOWER(u.email) LIKE ${})",
                first,
                first + 1,
                first + 2,
                first + 3
            ));
        }
        if filter.verified_only {
            clauses.push("u.email_verified = TRUE".to_string());
        }
        if filter.has_bio {
            clauses.push("(u.bio IS NOT NULL AND u.bio <> '')".to_string());
        }
        if let Some(id) = filter.exclude_id {
            clauses.push(format!("u.id <> {}", id));
        }

        let where_sql = if clauses.is_empty() {
            "TRUE".to_string()
        } else {
            clauses.join(" AND ")
        };
        let sql = format!(
            "SELECT u.* FROM users u WHERE {} ORDER BY u.created_at DESC, u.id DESC",
            where_sql
        );

        users::Model::find_by_statement(Statement::from_sql_and_values(
            DbBackend::Postgres,
            &sql,
            values,
        ))
        .all(&self.db)
        .await
        .map_err(Into::into)
    }

    async fn update_profile(
        &self,
        user_id: i32,
        changes: ProfileChanges,
    ) -> Result<users::Model> {
        let mut active = users::ActiveModel {
            id: Set(user_id),
            ..Default::default()
        };
        if let Some(first_name) = changes.first_name {
            active.first_name = Set(Some(first_name));
        }
        if let Some(last_name) = changes.last_name {
            active.last_name = Set(Some(last_name));
        }
        if let Some(bio) = changes.bio {
            active.bio = Set(Some(bio));
        }
        if let Some(avatar_url) = changes.avatar_url {
            active.avatar_url = Set(Some(avatar_url));
        }

        active.update(&self.db).await.map_err(|e| match e {
            DbErr::RecordNotFound(_) => Error::NotFound,
            other => other.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orm::posts::Visibility;

    #[test]
    fn like_pattern_escapes_metacharacters() {
        assert_eq!(like_pattern("Rust"), "%rust%");
        assert_eq!(like_pattern("100%"), "%100\\%%");
        assert_eq!(like_pattern("a_b"), "%a\\_b%");
    }

    #[test]
    fn post_tail_combines_conjunctive_clauses() {
        let filter = PostFilter {
            author_ids: Some(vec![1, 2]),
            visibility: Some(vec![Visibility::Public, Visibility::Friends]),
            ..Default::default()
        };
        let (tail, values) = post_sql_tail(&filter);
        assert!(tail.contains("p.is_deleted = FALSE"));
        assert!(tail.contains("p.author_id IN (1, 2)"));
        assert!(tail.contains("p.visibility IN ('public', 'friends')"));
        assert!(values.is_empty());
    }

    #[test]
    fn post_tail_with_empty_author_set_matches_nothing() {
        let filter = PostFilter {
            author_ids: Some(vec![]),
            ..Default::default()
        };
        let (tail, _) = post_sql_tail(&filter);
        assert!(tail.contains("FALSE"));
    }

    #[test]
    fn post_tail_query_joins_author() {
        let filter = PostFilter {
            query: Some("hello".to_string()),
            ..Default::default()
        };
        let (tail, values) = post_sql_tail(&filter);
        assert!(tail.contains("JOIN users u ON u.id = p.author_id"));
        assert!(tail.contains("LOWER(p.content) LIKE $1"));
        assert!(tail.contains("LOWER(u.username) LIKE $2"));
        assert_eq!(values.len(), 2);
    }
}

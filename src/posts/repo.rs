use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

/// Post record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Post {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub cover_image: Option<String>,
    pub tags: Vec<String>,
    pub author_name: String,
    pub author_id: String,
    pub status: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Sanitized input for an insert, produced by `services::sanitize_new_post`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub cover_image: Option<String>,
    pub tags: Vec<String>,
    pub author_name: String,
    pub author_id: String,
    pub status: String,
}

/// Normalized listing filter, produced by the handler from query params.
#[derive(Debug, Clone)]
pub struct ListFilter {
    pub status: String,
    /// Lowercased and trimmed; matched against the stored author_id.
    pub author_id: Option<String>,
    /// Trimmed; matched case-insensitively against the stored author_name.
    pub author_name: Option<String>,
    /// LIKE pattern (`%term%`, wildcards escaped) over title/content/tags.
    pub search: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

const POST_COLUMNS: &str =
    "id, title, content, cover_image, tags, author_name, author_id, status, created_at, updated_at";

// Author filters are OR-combined when present; no filter means no constraint.
const LIST_WHERE: &str = "status = $1 \
     AND (($2::text IS NULL AND $3::text IS NULL) \
          OR ($2::text IS NOT NULL AND lower(author_id) = $2) \
          OR ($3::text IS NOT NULL AND lower(author_name) = lower($3))) \
     AND ($4::text IS NULL \
          OR title ILIKE $4 \
          OR content ILIKE $4 \
          OR EXISTS (SELECT 1 FROM unnest(tags) AS tag WHERE tag ILIKE $4))";

pub async fn list(db: &PgPool, filter: &ListFilter) -> Result<Vec<Post>, sqlx::Error> {
    sqlx::query_as::<_, Post>(&format!(
        "SELECT {POST_COLUMNS} FROM posts WHERE {LIST_WHERE} \
         ORDER BY created_at DESC LIMIT $5 OFFSET $6"
    ))
    .bind(&filter.status)
    .bind(&filter.author_id)
    .bind(&filter.author_name)
    .bind(&filter.search)
    .bind(filter.limit)
    .bind(filter.offset)
    .fetch_all(db)
    .await
}

pub async fn count(db: &PgPool, filter: &ListFilter) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM posts WHERE {LIST_WHERE}"))
        .bind(&filter.status)
        .bind(&filter.author_id)
        .bind(&filter.author_name)
        .bind(&filter.search)
        .fetch_one(db)
        .await
}

pub async fn find_by_id(db: &PgPool, id: Uuid) -> Result<Option<Post>, sqlx::Error> {
    sqlx::query_as::<_, Post>(&format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1"))
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn insert(db: &PgPool, new: &NewPost) -> Result<Post, sqlx::Error> {
    sqlx::query_as::<_, Post>(&format!(
        "INSERT INTO posts (title, content, cover_image, tags, author_name, author_id, status) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         RETURNING {POST_COLUMNS}"
    ))
    .bind(&new.title)
    .bind(&new.content)
    .bind(&new.cover_image)
    .bind(&new.tags)
    .bind(&new.author_name)
    .bind(&new.author_id)
    .bind(&new.status)
    .fetch_one(db)
    .await
}

pub async fn delete(db: &PgPool, id: Uuid) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM posts WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(result.rows_affected())
}

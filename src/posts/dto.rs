use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::posts::repo::Post;

/// Query parameters for GET /posts.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub search: Option<String>,
    pub status: Option<String>,
    #[serde(rename = "authorId")]
    pub author_id: Option<String>,
    #[serde(rename = "authorName")]
    pub author_name: Option<String>,
    pub limit: Option<i64>,
    pub page: Option<i64>,
}

/// Request body for POST /posts. Tags arrive as raw JSON values because
/// clients historically sent mixed arrays; non-strings are dropped during
/// sanitization.
#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(rename = "coverImage", default)]
    pub cover_image: Option<String>,
    #[serde(default)]
    pub tags: Vec<serde_json::Value>,
    #[serde(rename = "authorName", default)]
    pub author_name: Option<String>,
    #[serde(rename = "authorId", default)]
    pub author_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Query parameters for DELETE /posts/:id.
#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    #[serde(rename = "authorId")]
    pub author_id: Option<String>,
    #[serde(rename = "authorName")]
    pub author_name: Option<String>,
}

/// Post as returned to clients. Field names follow the public surface.
#[derive(Debug, Serialize)]
pub struct PostView {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub title: String,
    pub content: String,
    #[serde(rename = "coverImage")]
    pub cover_image: Option<String>,
    pub tags: Vec<String>,
    #[serde(rename = "authorName")]
    pub author_name: String,
    #[serde(rename = "authorId")]
    pub author_id: String,
    pub status: String,
    #[serde(rename = "createdAt", with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(rename = "updatedAt", with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<Post> for PostView {
    fn from(post: Post) -> Self {
        Self {
            id: post.id,
            title: post.title,
            content: post.content,
            cover_image: post.cover_image,
            tags: post.tags,
            author_name: post.author_name,
            author_id: post.author_id,
            status: post.status,
            created_at: post.created_at,
            updated_at: post.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub success: bool,
    pub posts: Vec<PostView>,
    pub total: i64,
    pub page: i64,
    pub pages: i64,
    pub limit: i64,
}

#[derive(Debug, Serialize)]
pub struct PostResponse {
    pub success: bool,
    pub post: PostView,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
}

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    routing::get,
    Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    db::{is_unreachable, store_error},
    error::ApiError,
    posts::{
        dto::{CreatePostRequest, DeleteQuery, DeleteResponse, ListQuery, ListResponse, PostResponse, PostView},
        repo::{self, ListFilter},
        services::{
            can_modify, excerpt, normalize_limit, normalize_page, page_count, search_pattern,
        },
    },
    state::AppState,
};

pub fn post_routes() -> Router<AppState> {
    Router::new()
        .route("/posts", get(list_posts).post(create_post))
        .route("/posts/:id", get(get_post).delete(delete_post))
}

fn list_cache_headers(status: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let value = if status == "published" {
        "public, max-age=300, s-maxage=300"
    } else {
        "private, no-cache"
    };
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(value));
    headers
}

#[instrument(skip(state, query))]
pub async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<(HeaderMap, Json<ListResponse>), ApiError> {
    let status = query
        .status
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("published")
        .to_string();
    // TODO: a status=draft listing with no author filter returns every
    // author's drafts; require a verified session here and scope drafts to
    // its author id.
    let limit = normalize_limit(query.limit);
    let page = normalize_page(query.page);

    let filter = ListFilter {
        status: status.clone(),
        author_id: query
            .author_id
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty()),
        author_name: query
            .author_name
            .as_deref()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        search: query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(search_pattern),
        limit,
        offset: (page - 1) * limit,
    };

    let empty = ListResponse {
        success: true,
        posts: vec![],
        total: 0,
        page: 1,
        pages: 0,
        limit,
    };

    let Some(db) = &state.db else {
        warn!("store not configured; returning empty listing");
        return Ok((list_cache_headers(&status), Json(empty)));
    };

    let total = match repo::count(db, &filter).await {
        Ok(total) => total,
        Err(e) if is_unreachable(&e) => {
            warn!(error = %e, "store unreachable; returning empty listing");
            return Ok((list_cache_headers(&status), Json(empty)));
        }
        Err(e) => return Err(store_error(e)),
    };
    let posts = repo::list(db, &filter).await.map_err(store_error)?;

    Ok((
        list_cache_headers(&status),
        Json(ListResponse {
            success: true,
            posts: posts.into_iter().map(PostView::from).collect(),
            total,
            page,
            pages: page_count(total, limit),
            limit,
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn create_post(
    State(state): State<AppState>,
    Json(payload): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<PostResponse>), ApiError> {
    let db = state.db.as_ref().ok_or_else(|| {
        ApiError::ServiceUnavailable(
            "Database connection unavailable. Please check database configuration.".into(),
        )
    })?;

    let new = crate::posts::services::sanitize_new_post(payload)?;
    let post = repo::insert(db, &new).await.map_err(store_error)?;
    info!(post_id = %post.id, author_id = %post.author_id, "post created");

    // Full content is stored; the response carries only an excerpt.
    let mut view = PostView::from(post);
    view.content = excerpt(&view.content);

    Ok((
        StatusCode::CREATED,
        Json(PostResponse {
            success: true,
            post: view,
        }),
    ))
}

#[instrument(skip(state))]
pub async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(HeaderMap, Json<PostResponse>), ApiError> {
    // Reject malformed ids before touching the store.
    let id = Uuid::parse_str(id.trim())
        .map_err(|_| ApiError::BadRequest("Invalid post ID".into()))?;

    let db = state
        .db
        .as_ref()
        .ok_or_else(|| ApiError::ServiceUnavailable("Database connection unavailable".into()))?;

    let post = repo::find_by_id(db, id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| ApiError::NotFound("Post not found".into()))?;

    // Unpublished posts are indistinguishable from absent ones here.
    if post.status != "published" {
        return Err(ApiError::NotFound("Post not found".into()));
    }

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=600, s-maxage=600"),
    );
    headers.insert("CDN-Cache-Control", HeaderValue::from_static("max-age=3600"));

    Ok((
        headers,
        Json(PostResponse {
            success: true,
            post: PostView::from(post),
        }),
    ))
}

#[instrument(skip(state))]
pub async fn delete_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let id = Uuid::parse_str(id.trim())
        .map_err(|_| ApiError::BadRequest("Invalid post ID".into()))?;

    let author_id = query
        .author_id
        .as_deref()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::BadRequest("authorId required".into()))?;
    let author_name = query
        .author_name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let db = state
        .db
        .as_ref()
        .ok_or_else(|| ApiError::ServiceUnavailable("Database connection unavailable".into()))?;

    let post = repo::find_by_id(db, id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| ApiError::NotFound("Post not found".into()))?;

    if !can_modify(&post.author_id, &post.author_name, &author_id, author_name) {
        warn!(post_id = %id, caller = %author_id, "delete rejected");
        return Err(ApiError::Forbidden(
            "Not authorized to delete this post".into(),
        ));
    }

    repo::delete(db, id).await.map_err(store_error)?;
    info!(post_id = %id, "post deleted");
    Ok(Json(DeleteResponse { success: true }))
}

use axum::async_trait;
use axum::extract::DefaultBodyLimit;
use axum::routing::post;
use axum::Router;
use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

use crate::state::AppState;

mod cloudinary;
pub mod handlers;

pub use cloudinary::CloudinaryClient;

/// Hosted image plus the metadata the host reports back.
#[derive(Debug, Clone, Serialize)]
pub struct UploadedImage {
    pub url: String,
    pub public_id: String,
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub bytes: u64,
}

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("upload timed out")]
    Timeout,
    #[error("media host error: {0}")]
    Service(String),
}

/// Seam to the external asset host; handlers and tests only see this trait.
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn upload_image(
        &self,
        body: Bytes,
        content_type: &str,
    ) -> Result<UploadedImage, MediaError>;
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/upload", post(handlers::upload_image))
        // Large enough that an oversized file reaches the 5MB guard and gets
        // a proper rejection instead of a generic body-limit error.
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024))
}

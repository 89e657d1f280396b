use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use bytes::Bytes;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::{
    error::ApiError,
    media::{MediaError, UploadedImage},
    state::AppState,
};

const MAX_FILE_SIZE: usize = 5 * 1024 * 1024;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub url: String,
    pub public_id: String,
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub bytes: u64,
}

/// POST /upload: single `file` field, image only, at most 5MB. Both guards
/// run before the payload is forwarded anywhere.
#[instrument(skip(state, multipart))]
pub async fn upload_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let media = state
        .media
        .clone()
        .ok_or_else(|| ApiError::ServiceUnavailable("Image upload service unavailable".into()))?;

    let mut file: Option<(Bytes, String)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::BadRequest("Invalid multipart data".into()))?
    {
        if field.name() == Some("file") {
            let content_type = field.content_type().unwrap_or("").to_string();
            let data = field
                .bytes()
                .await
                .map_err(|_| ApiError::BadRequest("Failed to read file data".into()))?;
            file = Some((data, content_type));
            break;
        }
    }

    let (data, content_type) =
        file.ok_or_else(|| ApiError::BadRequest("No file provided".into()))?;

    if !content_type.starts_with("image/") {
        warn!(content_type = %content_type, "upload rejected: not an image");
        return Err(ApiError::BadRequest("Only image files are allowed".into()));
    }
    if data.len() > MAX_FILE_SIZE {
        warn!(bytes = data.len(), "upload rejected: too large");
        return Err(ApiError::BadRequest(
            "File size must be less than 5MB".into(),
        ));
    }

    let UploadedImage {
        url,
        public_id,
        width,
        height,
        format,
        bytes,
    } = media
        .upload_image(data, &content_type)
        .await
        .map_err(|e| match e {
            MediaError::Timeout => ApiError::UploadTimeout,
            MediaError::Service(detail) => {
                anyhow::anyhow!("media host upload failed: {detail}").into()
            }
        })?;

    info!(%public_id, width, height, "image uploaded");
    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            success: true,
            url,
            public_id,
            width,
            height,
            format,
            bytes,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::router;
    use axum::body::Body;
    use axum::http::{header, Request};
    use axum::Router;
    use tower::ServiceExt;

    const BOUNDARY: &str = "test-boundary";

    fn multipart_body(name: &str, content_type: &str, payload: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{name}\"; filename=\"pic\"\r\n\
                 Content-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(payload);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn app() -> Router {
        router().with_state(AppState::fake())
    }

    async fn upload(name: &str, content_type: &str, payload: &[u8]) -> (StatusCode, serde_json::Value) {
        let res = app()
            .oneshot(
                Request::post("/upload")
                    .header(
                        header::CONTENT_TYPE,
                        format!("multipart/form-data; boundary={BOUNDARY}"),
                    )
                    .body(Body::from(multipart_body(name, content_type, payload)))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn accepts_a_small_image_and_reports_metadata() {
        let (status, body) = upload("file", "image/jpeg", b"\xFF\xD8\xFFfake-jpeg").await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["success"], true);
        assert_eq!(body["width"], 1200);
        assert_eq!(body["height"], 630);
        assert!(body["url"].as_str().unwrap().starts_with("https://"));
    }

    #[tokio::test]
    async fn rejects_non_image_media_types() {
        let (status, body) = upload("file", "application/pdf", b"%PDF-1.4").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Only image files are allowed");
    }

    #[tokio::test]
    async fn rejects_files_over_five_megabytes() {
        let oversized = vec![0u8; 6 * 1024 * 1024];
        let (status, body) = upload("file", "image/png", &oversized).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "File size must be less than 5MB");
    }

    #[tokio::test]
    async fn rejects_requests_without_a_file_field() {
        let (status, body) = upload("other", "image/png", b"data").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "No file provided");
    }

    #[tokio::test]
    async fn unconfigured_media_host_is_unavailable() {
        let state = AppState {
            media: None,
            ..AppState::fake()
        };
        let res = router()
            .with_state(state)
            .oneshot(
                Request::post("/upload")
                    .header(
                        header::CONTENT_TYPE,
                        format!("multipart/form-data; boundary={BOUNDARY}"),
                    )
                    .body(Body::from(multipart_body("file", "image/png", b"x")))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}

use axum::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use sha1::{Digest, Sha1};
use time::OffsetDateTime;
use tracing::{debug, warn};

use super::{MediaError, MediaStore, UploadedImage};
use crate::config::MediaConfig;

/// Every cover image is normalized to the same social-card box.
const TRANSFORMATION: &str = "c_fill,w_1200,h_630,q_auto,f_auto";
const FOLDER: &str = "atlas-blog-images";
const UPLOAD_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);

/// Client for a Cloudinary-style upload API with signed requests.
pub struct CloudinaryClient {
    http: reqwest::Client,
    config: MediaConfig,
}

#[derive(Debug, serde::Deserialize)]
struct UploadReply {
    secure_url: String,
    public_id: String,
    width: u32,
    height: u32,
    format: String,
    bytes: u64,
}

impl CloudinaryClient {
    pub fn new(config: MediaConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn upload_url(&self) -> String {
        format!(
            "https://api.cloudinary.com/v1_1/{}/image/upload",
            self.config.cloud_name
        )
    }

    /// Request signature: params sorted by key, joined `k=v` with `&`, the
    /// API secret appended, SHA-1 over the whole string, hex-encoded.
    fn sign(params: &[(&str, &str)], api_secret: &str) -> String {
        let mut sorted: Vec<_> = params.to_vec();
        sorted.sort_by_key(|(k, _)| *k);
        let joined = sorted
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        let mut hasher = Sha1::new();
        hasher.update(joined.as_bytes());
        hasher.update(api_secret.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[async_trait]
impl MediaStore for CloudinaryClient {
    async fn upload_image(
        &self,
        body: Bytes,
        content_type: &str,
    ) -> Result<UploadedImage, MediaError> {
        let timestamp = OffsetDateTime::now_utc().unix_timestamp().to_string();
        let signed_params = [
            ("folder", FOLDER),
            ("timestamp", timestamp.as_str()),
            ("transformation", TRANSFORMATION),
        ];
        let signature = Self::sign(&signed_params, &self.config.api_secret);

        let file = Part::bytes(body.to_vec())
            .file_name("upload")
            .mime_str(content_type)
            .map_err(|e| MediaError::Service(format!("invalid content type: {e}")))?;
        let form = Form::new()
            .text("api_key", self.config.api_key.clone())
            .text("timestamp", timestamp)
            .text("folder", FOLDER)
            .text("transformation", TRANSFORMATION)
            .text("signature", signature)
            .part("file", file);

        debug!(bytes = body.len(), "forwarding image to media host");
        let request = self.http.post(self.upload_url()).multipart(form).send();
        let response = tokio::time::timeout(UPLOAD_TIMEOUT, request)
            .await
            .map_err(|_| {
                warn!("media host upload timed out");
                MediaError::Timeout
            })?
            .map_err(|e| MediaError::Service(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            warn!(%status, "media host rejected upload");
            return Err(MediaError::Service(format!("{status}: {detail}")));
        }

        let reply: UploadReply = response
            .json()
            .await
            .map_err(|e| MediaError::Service(e.to_string()))?;
        Ok(UploadedImage {
            url: reply.secure_url,
            public_id: reply.public_id,
            width: reply.width,
            height: reply.height,
            format: reply.format,
            bytes: reply.bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_deterministic_and_hex_encoded() {
        let params = [("timestamp", "1700000000"), ("folder", FOLDER)];
        let a = CloudinaryClient::sign(&params, "secret");
        let b = CloudinaryClient::sign(&params, "secret");
        assert_eq!(a, b);
        assert_eq!(a.len(), 40);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn signature_depends_on_the_secret() {
        let params = [("timestamp", "1700000000")];
        assert_ne!(
            CloudinaryClient::sign(&params, "secret-a"),
            CloudinaryClient::sign(&params, "secret-b")
        );
    }

    #[test]
    fn signature_sorts_params_by_key() {
        let forward = [("folder", FOLDER), ("timestamp", "1")];
        let reversed = [("timestamp", "1"), ("folder", FOLDER)];
        assert_eq!(
            CloudinaryClient::sign(&forward, "s"),
            CloudinaryClient::sign(&reversed, "s")
        );
    }
}

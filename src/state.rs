use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::AppConfig;
use crate::media::{CloudinaryClient, MediaStore};

#[derive(Clone)]
pub struct AppState {
    /// None when no store is configured; queries then take the degraded paths.
    pub db: Option<PgPool>,
    pub config: Arc<AppConfig>,
    /// None when the media host credentials are not configured.
    pub media: Option<Arc<dyn MediaStore>>,
}

impl AppState {
    pub fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        // Lazy pool: the first query establishes the connection, concurrent
        // callers share the same in-flight attempt, and the handle is reused
        // for the life of the process.
        let db = match &config.database_url {
            Some(url) => Some(
                PgPoolOptions::new()
                    .max_connections(10)
                    .acquire_timeout(std::time::Duration::from_secs(10))
                    .connect_lazy(url)?,
            ),
            None => {
                tracing::warn!("DATABASE_URL not set; running without a persistent store");
                None
            }
        };

        let media = config
            .media
            .as_ref()
            .map(|cfg| Arc::new(CloudinaryClient::new(cfg.clone())) as Arc<dyn MediaStore>);
        if media.is_none() {
            tracing::warn!("media host credentials not set; uploads disabled");
        }

        Ok(Self { db, config, media })
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        use crate::config::JwtConfig;
        use crate::media::UploadedImage;
        use bytes::Bytes;

        struct FakeMedia;

        #[axum::async_trait]
        impl MediaStore for FakeMedia {
            async fn upload_image(
                &self,
                _body: Bytes,
                _content_type: &str,
            ) -> Result<UploadedImage, crate::media::MediaError> {
                Ok(UploadedImage {
                    url: "https://media.fake.local/atlas-blog-images/test.jpg".into(),
                    public_id: "atlas-blog-images/test".into(),
                    width: 1200,
                    height: 630,
                    format: "jpg".into(),
                    bytes: 1024,
                })
            }
        }

        let config = Arc::new(AppConfig {
            database_url: None,
            jwt: JwtConfig {
                secret: "test-secret".into(),
                ttl_days: 7,
            },
            google: None,
            media: None,
            public_url: "http://localhost:3000".into(),
            production: false,
        });

        Self {
            db: None,
            config,
            media: Some(Arc::new(FakeMedia) as Arc<dyn MediaStore>),
        }
    }
}

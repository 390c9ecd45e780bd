//! Blob stores for boundary GeoJSON.

use crate::domain::ports::BlobStore;
use crate::utils::error::{EtlError, Result};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};

/// Object key for an area's boundary.
pub fn boundary_key(code: &str) -> String {
    format!("boundaries/{}.geojson", code)
}

#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    base_path: PathBuf,
}

impl LocalBlobStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Keys are relative paths that must stay below `base_path`.
    fn resolve(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if key.is_empty() || !safe {
            return Err(EtlError::BlobStore {
                message: format!("Invalid blob key {:?}", key),
            });
        }
        Ok(self.base_path.join(relative))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn upload(&self, key: &str, data: &[u8]) -> Result<()> {
        let full_path = self.resolve(key)?;
        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full_path, data).await?;
        tracing::debug!("Wrote {} bytes to {}", data.len(), full_path.display());
        Ok(())
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>> {
        let full_path = self.resolve(key)?;
        match tokio::fs::read(&full_path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(EtlError::BlobNotFound {
                key: key.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(feature = "s3")]
pub use s3::S3BlobStore;

#[cfg(feature = "s3")]
mod s3 {
    use super::*;
    use crate::config::settings::BlobSettings;
    use aws_config::BehaviorVersion;
    use aws_sdk_s3::config::{Credentials, Region};
    use aws_sdk_s3::operation::get_object::GetObjectError;
    use aws_sdk_s3::Client as S3Client;

    #[derive(Debug, Clone)]
    pub struct S3BlobStore {
        client: S3Client,
        bucket: String,
    }

    impl S3BlobStore {
        pub fn new(client: S3Client, bucket: String) -> Self {
            Self { client, bucket }
        }

        /// Region, endpoint and static credentials come from settings when
        /// present, otherwise from the default AWS provider chain.
        pub async fn from_settings(settings: &BlobSettings) -> Self {
            let mut loader = aws_config::defaults(BehaviorVersion::latest());
            if let Some(region) = &settings.region {
                loader = loader.region(Region::new(region.clone()));
            }
            let shared = loader.load().await;

            let mut builder = aws_sdk_s3::config::Builder::from(&shared).force_path_style(true);
            if let Some(endpoint) = &settings.endpoint {
                builder = builder.endpoint_url(endpoint);
            }
            if let (Some(id), Some(secret)) = (&settings.access_id, &settings.secret_key) {
                builder = builder.credentials_provider(Credentials::new(
                    id,
                    secret,
                    None,
                    None,
                    "findthatpostcode-settings",
                ));
            }
            Self::new(S3Client::from_conf(builder.build()), settings.bucket.clone())
        }
    }

    #[async_trait]
    impl BlobStore for S3BlobStore {
        async fn upload(&self, key: &str, data: &[u8]) -> Result<()> {
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(key)
                .content_type("application/geo+json")
                .body(data.to_vec().into())
                .send()
                .await
                .map_err(|e| EtlError::BlobStore {
                    message: format!("Failed to write {} to S3: {}", key, e.into_service_error()),
                })?;
            Ok(())
        }

        async fn download(&self, key: &str) -> Result<Vec<u8>> {
            let response = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| match e.into_service_error() {
                    GetObjectError::NoSuchKey(_) => EtlError::BlobNotFound {
                        key: key.to_string(),
                    },
                    other => EtlError::BlobStore {
                        message: format!("Failed to read {} from S3: {}", key, other),
                    },
                })?;
            let data = response.body.collect().await.map_err(|e| EtlError::BlobStore {
                message: format!("Failed to collect S3 data: {}", e),
            })?;
            Ok(data.into_bytes().to_vec())
        }
    }
}

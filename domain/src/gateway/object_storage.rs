//! S3 compatible object storage, used only to hand out time limited URLs.
//!
//! Clients upload audio through a presigned PUT URL and the ASR service fetches
//! it through a presigned GET URL; this process never touches the bytes.

use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    presigning::PresigningConfig,
    Client,
};
use log::*;
use service::config::Config;

use crate::error::{config_error, external_error, Error, ExternalErrorKind};

/// Produces time limited URLs for objects in a bucket.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Presigned GET URL for `key`. The object is not required to exist yet.
    async fn generate_download_url(&self, key: &str) -> Result<String, Error>;

    /// Presigned PUT URL for `key`.
    async fn generate_upload_url(&self, key: &str) -> Result<String, Error>;
}

pub struct S3Storage {
    client: Client,
    bucket: String,
    expires_in: Duration,
}

impl S3Storage {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let access_key = required(config.storage_access_key(), "STORAGE_ACCESS_KEY")?;
        let secret_key = required(config.storage_secret_key(), "STORAGE_SECRET_KEY")?;
        let endpoint = required(config.storage_endpoint(), "STORAGE_ENDPOINT")?;
        let region = required(config.storage_region(), "STORAGE_REGION")?;
        let bucket = required(config.storage_bucket(), "STORAGE_BUCKET")?;

        let endpoint = normalize_endpoint(&endpoint);
        debug!("Creating object storage client for bucket {bucket} at {endpoint}");

        let credentials = Credentials::new(access_key, secret_key, None, None, "scribe-platform");

        let s3_config = S3ConfigBuilder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region))
            .credentials_provider(credentials)
            .endpoint_url(endpoint)
            .force_path_style(false)
            .build();

        Ok(Self {
            client: Client::from_conf(s3_config),
            bucket,
            expires_in: Duration::from_secs(config.storage_url_expiry_secs),
        })
    }

    fn presigning_config(&self) -> Result<PresigningConfig, Error> {
        PresigningConfig::builder()
            .expires_in(self.expires_in)
            .build()
            .map_err(|e| {
                warn!("Invalid presigned URL expiry {:?}: {e}", self.expires_in);
                config_error(&format!("Invalid storage URL expiry: {e}"))
            })
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn generate_download_url(&self, key: &str) -> Result<String, Error> {
        check_key(key)?;
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(self.presigning_config()?)
            .await
            .map_err(|e| {
                error!("Failed to presign download of {key}: {e}");
                external_error(
                    ExternalErrorKind::Storage,
                    &format!("Failed to generate download URL for {key}: {e}"),
                )
            })?;

        debug!("Generated download URL for {key}");
        Ok(presigned.uri().to_string())
    }

    async fn generate_upload_url(&self, key: &str) -> Result<String, Error> {
        check_key(key)?;
        let presigned = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(self.presigning_config()?)
            .await
            .map_err(|e| {
                error!("Failed to presign upload of {key}: {e}");
                external_error(
                    ExternalErrorKind::Storage,
                    &format!("Failed to generate upload URL for {key}: {e}"),
                )
            })?;

        debug!("Generated upload URL for {key}");
        Ok(presigned.uri().to_string())
    }
}

fn required(value: Option<String>, name: &str) -> Result<String, Error> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => {
            warn!("Object storage is missing {name}");
            Err(config_error(&format!("{name} is not configured")))
        }
    }
}

fn check_key(key: &str) -> Result<(), Error> {
    if key.trim().is_empty() {
        return Err(external_error(
            ExternalErrorKind::Storage,
            "Object key must not be empty",
        ));
    }
    Ok(())
}

/// Endpoints are often configured as bare hosts.
fn normalize_endpoint(endpoint: &str) -> String {
    let endpoint = endpoint.trim().trim_end_matches('/');
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("https://{endpoint}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DomainErrorKind, InternalErrorKind};

    fn storage() -> S3Storage {
        let config = Config::from_env().set_storage(
            "tos-s3-cn-beijing.volces.com",
            "cn-beijing",
            "audio-bucket",
            "AKTEST",
            "SKTEST",
        );
        S3Storage::new(&config).unwrap()
    }

    #[test]
    fn test_normalize_endpoint_prepends_https() {
        assert_eq!(
            normalize_endpoint("tos-s3-cn-beijing.volces.com"),
            "https://tos-s3-cn-beijing.volces.com"
        );
        assert_eq!(
            normalize_endpoint("http://localhost:9000/"),
            "http://localhost:9000"
        );
    }

    #[tokio::test]
    async fn test_download_url_is_virtual_hosted_and_signed() {
        let url = storage().generate_download_url("a.mp3").await.unwrap();

        assert!(url.starts_with("https://audio-bucket.tos-s3-cn-beijing.volces.com/a.mp3?"));
        assert!(url.contains("X-Amz-Signature="));
        assert!(url.contains("X-Amz-Expires=3600"));
    }

    #[tokio::test]
    async fn test_upload_url_is_signed_for_the_key() {
        let url = storage().generate_upload_url("meetings/b.mp3").await.unwrap();

        assert!(url.contains("/meetings/b.mp3?"));
        assert!(url.contains("X-Amz-Signature="));
    }

    #[tokio::test]
    async fn test_blank_key_is_a_storage_error() {
        let err = storage().generate_download_url("  ").await.unwrap_err();
        assert_eq!(
            err.error_kind,
            DomainErrorKind::External(ExternalErrorKind::Storage)
        );
    }

    #[test]
    fn test_blank_configuration_is_rejected() {
        let config = Config::from_env().set_storage("", "cn-beijing", "bucket", "ak", "sk");
        let err = S3Storage::new(&config).map(|_| ()).unwrap_err();
        assert_eq!(
            err.error_kind,
            DomainErrorKind::Internal(InternalErrorKind::Config)
        );
        assert!(err.detail().contains("STORAGE_ENDPOINT"));
    }
}

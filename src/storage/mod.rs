use http::{HeaderMap, HeaderName, HeaderValue};
use s3::creds::Credentials;
use s3::{Bucket, BucketConfiguration, Region};

use crate::config::S3Config;
use crate::errors::AppError;

pub mod policy;

/// S3-compatible object store bound to one bucket.
///
/// Construction ensures the bucket exists (creating it on miss) and asserts
/// the public-read bucket policy. Keys are bucket-relative, e.g.
/// `records/<md5>.zip`.
#[derive(Clone, Debug)]
pub struct ObjectStore {
    bucket: Bucket,
}

fn endpoint_url(config: &S3Config) -> Result<String, AppError> {
    let endpoint = config
        .endpoint
        .clone()
        .ok_or_else(|| AppError::EnvError("Missing S3 endpoint".into()))?;
    Ok(if endpoint.contains("://") {
        endpoint
    } else if config.secure {
        format!("https://{endpoint}")
    } else {
        format!("http://{endpoint}")
    })
}

fn region_name(config: &S3Config) -> String {
    config.region.clone().unwrap_or_else(|| "us-east-1".into())
}

fn region_of(config: &S3Config) -> Result<Region, AppError> {
    Ok(Region::Custom { region: region_name(config), endpoint: endpoint_url(config)? })
}

impl ObjectStore {
    /// Connect, make sure the bucket exists, and apply the public-read
    /// policy. The policy is asserted on every connect, not only when the
    /// bucket is first created.
    pub async fn connect(config: &S3Config) -> Result<Self, AppError> {
        let bucket_name = config
            .bucket
            .clone()
            .ok_or_else(|| AppError::EnvError("Missing S3 bucket name".into()))?;
        let access = config
            .accesskey
            .as_deref()
            .ok_or_else(|| AppError::EnvError("Missing S3 access key".into()))?;
        let secret = config
            .secretkey
            .as_deref()
            .ok_or_else(|| AppError::EnvError("Missing S3 secret key".into()))?;
        let region = region_of(config)?;
        let credentials = Credentials::new(Some(access), Some(secret), None, None, None)
            .map_err(|e| AppError::EnvError(format!("Bad S3 credentials: {e}")))?;

        let bucket =
            *Bucket::new(&bucket_name, region.clone(), credentials.clone())?.with_path_style();

        if !bucket.exists().await? {
            tracing::warn!("Creating bucket {}", bucket_name);
            Bucket::create_with_path_style(
                &bucket_name,
                region,
                credentials,
                BucketConfiguration::public(),
            )
            .await?;
        }

        policy::put_public_read_policy(
            &endpoint_url(config)?,
            &region_name(config),
            access,
            secret,
            &bucket_name,
        )
        .await?;

        Ok(Self { bucket })
    }

    pub fn bucket_name(&self) -> String {
        self.bucket.name()
    }

    /// True if an object exists under `key`.
    pub async fn exists(&self, key: &str) -> Result<bool, AppError> {
        match self.bucket.head_object(key).await {
            Ok((head, code)) => Ok(code == 200 && head.e_tag.is_some()),
            Err(s3::error::S3Error::HttpFailWithBody(404, _)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Idempotent upload of a byte buffer, with optional `x-amz-meta-*`
    /// metadata and content type.
    pub async fn put(
        &self,
        key: &str,
        bytes: &[u8],
        metadata: &[(&str, String)],
        content_type: Option<&str>,
    ) -> Result<(), AppError> {
        let bucket = if metadata.is_empty() {
            self.bucket.clone()
        } else {
            let mut headers = HeaderMap::new();
            for (name, value) in metadata {
                let header = HeaderName::from_bytes(format!("x-amz-meta-{name}").as_bytes())
                    .map_err(|_| AppError::InvalidInput(format!("bad metadata key: {name}")))?;
                // Metadata values travel as HTTP headers; strip what can't.
                let clean: String =
                    value.chars().filter(|c| c.is_ascii() && *c != '\r' && *c != '\n').collect();
                headers.insert(
                    header,
                    HeaderValue::from_str(&clean)
                        .map_err(|_| AppError::InvalidInput(format!("bad metadata value for {name}")))?,
                );
            }
            self.bucket.clone().with_extra_headers(headers)?
        };

        let response = match content_type {
            Some(ct) => bucket.put_object_with_content_type(key, bytes, ct).await?,
            None => bucket.put_object(key, bytes).await?,
        };
        if response.status_code() >= 300 {
            return Err(AppError::ObjectStore(s3::error::S3Error::HttpFailWithBody(
                response.status_code(),
                response.as_str().unwrap_or_default().to_string(),
            )));
        }
        tracing::debug!("Uploaded object {}", key);
        Ok(())
    }

    /// Fetch an object; `None` when it does not exist.
    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AppError> {
        match self.bucket.get_object(key).await {
            Ok(response) if response.status_code() == 200 => Ok(Some(response.to_vec())),
            Ok(response) if response.status_code() == 404 => Ok(None),
            Ok(response) => Err(AppError::ObjectStore(s3::error::S3Error::HttpFailWithBody(
                response.status_code(),
                response.as_str().unwrap_or_default().to_string(),
            ))),
            Err(s3::error::S3Error::HttpFailWithBody(404, _)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn delete(&self, key: &str) -> Result<(), AppError> {
        self.bucket.delete_object(key).await?;
        tracing::warn!("Removed object {}", key);
        Ok(())
    }
}

/// Join a configured prefix and a file name into a bucket key.
pub fn object_key(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

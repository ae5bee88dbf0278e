// ABOUTME: S3-compatible object store backend built on the AWS SDK
// ABOUTME: Uses the default credential chain; endpoint override supports MinIO

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;

use super::ObjectStore;

/// Object store living in one S3 bucket.
#[derive(Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    /// Build a client from the ambient AWS configuration (env, profile, IMDS).
    pub async fn connect(
        bucket: &str,
        region: Option<&str>,
        endpoint: Option<&str>,
        force_path_style: bool,
    ) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region.to_string()));
        }
        let shared_config = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared_config);
        if let Some(endpoint) = endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        builder = builder.force_path_style(force_path_style);

        tracing::info!("Using S3 bucket: {}", bucket);
        Ok(Self::from_client(Client::from_conf(builder.build()), bucket))
    }

    pub fn from_client(client: Client, bucket: &str) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn has_objects(&self, prefix: &str) -> Result<bool> {
        let response = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .max_keys(1)
            .send()
            .await
            .map_err(|e| {
                anyhow!(
                    "Failed to probe s3://{}/{}: {}",
                    self.bucket,
                    prefix,
                    DisplayErrorContext(&e)
                )
            })?;

        Ok(!response.contents().is_empty())
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation_token = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation_token.take())
                .send()
                .await
                .map_err(|e| {
                    anyhow!(
                        "Failed to list s3://{}/{}: {}",
                        self.bucket,
                        prefix,
                        DisplayErrorContext(&e)
                    )
                })?;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|obj| obj.key().map(str::to_string)),
            );

            if !response.is_truncated().unwrap_or(false) {
                break;
            }
            continuation_token = response.next_continuation_token().map(str::to_string);
            if continuation_token.is_none() {
                break;
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(false),
            Err(e) => Err(anyhow!(
                "Failed to stat s3://{}/{}: {}",
                self.bucket,
                key,
                DisplayErrorContext(&e)
            )),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let response = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.as_service_error().is_some_and(|se| se.is_no_such_key()) => {
                return Ok(None)
            }
            Err(e) => {
                return Err(anyhow!(
                    "Failed to get s3://{}/{}: {}",
                    self.bucket,
                    key,
                    DisplayErrorContext(&e)
                ))
            }
        };

        let bytes = response
            .body
            .collect()
            .await
            .with_context(|| format!("Failed to read body of s3://{}/{}", self.bucket, key))?
            .into_bytes();

        Ok(Some(bytes.to_vec()))
    }

    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| {
                anyhow!(
                    "Failed to put s3://{}/{}: {}",
                    self.bucket,
                    key,
                    DisplayErrorContext(&e)
                )
            })?;
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        // S3 has no move: copy, then delete the source.
        let copy_source = format!("{}/{}", self.bucket, urlencoding::encode(from));
        self.client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(copy_source)
            .key(to)
            .send()
            .await
            .map_err(|e| {
                anyhow!(
                    "Failed to copy s3://{}/{} to {}: {}",
                    self.bucket,
                    from,
                    to,
                    DisplayErrorContext(&e)
                )
            })?;

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(from)
            .send()
            .await
            .map_err(|e| {
                anyhow!(
                    "Copied s3://{}/{} to {} but failed to delete the original: {}",
                    self.bucket,
                    from,
                    to,
                    DisplayErrorContext(&e)
                )
            })?;
        Ok(())
    }
}

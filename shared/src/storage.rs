use crate::error::StoreError;
use async_trait::async_trait;
use aws_sdk_s3 as s3;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use bytes::Bytes;
use std::time::Duration;

const CONTENT_DISPOSITION: &str = "attachment";

/// Body of a fetched object, read chunk by chunk.
pub struct Download {
    /// Size announced by the store before any of the body is read.
    pub content_length: Option<u64>,
    body: ByteStream,
}

impl Download {
    pub fn new(content_length: Option<u64>, body: ByteStream) -> Self {
        Download {
            content_length,
            body,
        }
    }

    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, StoreError> {
        self.body.try_next().await.map_err(other)
    }
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn get(&self, bucket: &str, key: &str) -> Result<Download, StoreError>;

    /// Stores `bytes` publicly readable, served as an attachment.
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StoreError>;

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError>;
}

#[async_trait]
pub trait UploadSigner: Send + Sync {
    async fn presign_put(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> Result<String, StoreError>;
}

#[derive(Clone)]
pub struct S3Store {
    client: s3::Client,
}

impl S3Store {
    pub fn new(client: s3::Client) -> Self {
        S3Store { client }
    }
}

fn other<E: std::fmt::Display>(err: E) -> StoreError {
    StoreError::Other(err.to_string())
}

#[async_trait]
impl BlobStore for S3Store {
    async fn get(&self, bucket: &str, key: &str) -> Result<Download, StoreError> {
        let cmd_output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| match err {
                // NoSuchBucket is a 404 too, and stays a server error
                SdkError::ServiceError(service_err)
                    if matches!(service_err.err(), GetObjectError::NoSuchKey(_)) =>
                {
                    StoreError::NotFound {
                        key: key.to_string(),
                    }
                }
                err => StoreError::Other(format!("{}", s3::error::DisplayErrorContext(err))),
            })?;

        let content_length = cmd_output
            .content_length()
            .and_then(|len| u64::try_from(len).ok());

        Ok(Download::new(content_length, cmd_output.body))
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StoreError> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .acl(ObjectCannedAcl::PublicRead)
            .content_length(bytes.len() as i64)
            .content_type(content_type)
            .content_disposition(CONTENT_DISPOSITION)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|err| other(s3::error::DisplayErrorContext(err)))?;

        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| other(s3::error::DisplayErrorContext(err)))?;

        Ok(())
    }
}

#[async_trait]
impl UploadSigner for S3Store {
    async fn presign_put(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> Result<String, StoreError> {
        let presigned_url = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .presigned(PresigningConfig::expires_in(expires_in).map_err(other)?)
            .await
            .map_err(other)?;

        Ok(presigned_url.uri().to_string())
    }
}

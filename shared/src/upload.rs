use crate::error::PipelineError;
use crate::keys;
use crate::storage::UploadSigner;
use crate::validate;
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadTicket {
    pub upload_url: String,
    pub file_key: String,
}

pub fn content_type_for(extension: &str) -> Result<&'static str, PipelineError> {
    match extension {
        "png" => Ok("image/png"),
        "jpg" | "jpeg" => Ok("image/jpeg"),
        other => Err(PipelineError::UnsupportedExtension(other.to_string())),
    }
}

/// Reserves a fresh key under `directory` and signs a PUT for it.
pub async fn issue_upload_url(
    signer: &dyn UploadSigner,
    bucket: &str,
    directory: &str,
    extension: &str,
    ttl: Duration,
) -> Result<UploadTicket, PipelineError> {
    validate::require_present(&[("extension", extension)])?;
    let content_type = content_type_for(extension)?;
    let file_key = keys::upload_key(directory, &Uuid::new_v4().to_string(), extension);

    let upload_url = signer
        .presign_put(bucket, &file_key, content_type, ttl)
        .await?;

    tracing::info!(bucket = %bucket, file_key = %file_key, "issued upload url");

    Ok(UploadTicket {
        upload_url,
        file_key,
    })
}

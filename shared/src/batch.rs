//! SQS batch handling: queued finalization and webhook delivery.
//!
//! Items are handled one after another so at most one image is in memory.
//! A failing item is logged and skipped; the rest of the batch still runs.

use crate::error::{NotifyError, PipelineError};
use crate::notify::{CallbackMessage, CallbackPayload, Notifier};
use crate::pipeline::{FinalizeRequest, Pipeline};
use crate::validate;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::Instrument;

/// Queue record stripped down to what the handlers read.
#[derive(Debug, Clone, Default)]
pub struct QueueItem {
    pub message_id: Option<String>,
    pub body: Option<String>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct QueuedUpload {
    #[serde(flatten)]
    request: FinalizeRequest,
    #[serde(default)]
    callback_url: String,
}

fn parse_body<T: DeserializeOwned>(item: &QueueItem) -> Result<T, PipelineError> {
    let body = item.body.as_deref().unwrap_or_default();

    serde_json::from_str(body)
        .map_err(|e| PipelineError::InvalidInput(format!("Error unmarshalling message body: {}", e)))
}

pub struct FinalizeBatch<'a> {
    pub pipeline: Pipeline<'a>,
    pub notifier: &'a dyn Notifier,
    pub upload_bucket: &'a str,
    pub public_bucket: &'a str,
    pub callback_queue: &'a str,
}

impl FinalizeBatch<'_> {
    pub async fn run(&self, items: &[QueueItem]) -> BatchReport {
        let mut report = BatchReport::default();

        for item in items {
            let id = item.message_id.clone().unwrap_or_default();
            let span = tracing::info_span!("message", message_id = %id);

            match self.finalize_one(item).instrument(span).await {
                Ok(()) => report.succeeded.push(id),
                Err(err) => {
                    tracing::error!(message_id = %id, error = %err, "skipping queued upload");
                    report.failed.push(id);
                }
            }
        }

        tracing::info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "upload batch complete"
        );
        report
    }

    async fn finalize_one(&self, item: &QueueItem) -> Result<(), PipelineError> {
        let queued: QueuedUpload = parse_body(item)?;
        let event = self
            .pipeline
            .finalize(self.upload_bucket, self.public_bucket, &queued.request)
            .await?;

        let msg = CallbackMessage {
            callback_url: queued.callback_url,
            bucket: event.bucket,
            directory: event.directory,
            file_id: event.file_id,
            file_extension: event.file_extension,
            width: Some(event.width),
            height: Some(event.height),
            size_bytes: Some(event.size_bytes),
        };
        let body = serde_json::to_string(&msg).map_err(NotifyError::from)?;

        self.notifier.publish(self.callback_queue, body).await?;

        Ok(())
    }
}

pub struct CallbackBatch<'a> {
    pub notifier: &'a dyn Notifier,
    /// Validate and log, but never call out.
    pub dry_run: bool,
}

impl CallbackBatch<'_> {
    pub async fn run(&self, items: &[QueueItem]) -> BatchReport {
        let mut report = BatchReport::default();

        for item in items {
            let id = item.message_id.clone().unwrap_or_default();
            let span = tracing::info_span!("message", message_id = %id);

            match self.deliver_one(item).instrument(span).await {
                Ok(()) => report.succeeded.push(id),
                Err(err) => {
                    tracing::error!(message_id = %id, error = %err, "callback failed");
                    report.failed.push(id);
                }
            }
        }

        report
    }

    async fn deliver_one(&self, item: &QueueItem) -> Result<(), PipelineError> {
        let msg: CallbackMessage = parse_body(item)?;
        validate::require_present(&[
            ("callback_url", msg.callback_url.as_str()),
            ("bucket", msg.bucket.as_str()),
            ("file_id", msg.file_id.as_str()),
            ("file_extension", msg.file_extension.as_str()),
        ])?;

        let body = serde_json::to_string(&CallbackPayload::from(&msg)).map_err(NotifyError::from)?;

        if self.dry_run {
            tracing::info!(callback_url = %msg.callback_url, "test environment, callback not sent");
            return Ok(());
        }

        self.notifier.publish(&msg.callback_url, body).await?;

        Ok(())
    }
}

use crate::config::CallbackAuth;
use crate::error::NotifyError;
use async_trait::async_trait;
use aws_sdk_sqs as sqs;
use serde::{Deserialize, Serialize};

/// Fire-and-forget delivery of a JSON document to a queue url or webhook.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, target: &str, body: String) -> Result<(), NotifyError>;
}

/// Message placed on the callback queue once a queued upload is finalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackMessage {
    #[serde(default)]
    pub callback_url: String,
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub directory: String,
    #[serde(default)]
    pub file_id: String,
    #[serde(default)]
    pub file_extension: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

/// Body POSTed to the caller's webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackPayload {
    pub bucket: String,
    pub directory: String,
    pub file_id: String,
    pub file_extension: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

impl From<&CallbackMessage> for CallbackPayload {
    fn from(msg: &CallbackMessage) -> Self {
        CallbackPayload {
            bucket: msg.bucket.clone(),
            directory: msg.directory.clone(),
            file_id: msg.file_id.clone(),
            file_extension: msg.file_extension.clone(),
            width: msg.width,
            height: msg.height,
            size_bytes: msg.size_bytes,
        }
    }
}

pub struct SqsNotifier {
    client: sqs::Client,
}

impl SqsNotifier {
    pub fn new(client: sqs::Client) -> Self {
        SqsNotifier { client }
    }
}

#[async_trait]
impl Notifier for SqsNotifier {
    async fn publish(&self, target: &str, body: String) -> Result<(), NotifyError> {
        let output = self
            .client
            .send_message()
            .queue_url(target)
            .message_body(body)
            .send()
            .await
            .map_err(|err| NotifyError::Delivery {
                target: target.to_string(),
                reason: sqs::error::DisplayErrorContext(err).to_string(),
            })?;

        tracing::info!(
            queue = %target,
            message_id = output.message_id().unwrap_or_default(),
            "callback message queued"
        );

        Ok(())
    }
}

pub struct WebhookNotifier {
    client: reqwest::Client,
    auth: CallbackAuth,
}

impl WebhookNotifier {
    pub fn new(auth: CallbackAuth) -> Self {
        WebhookNotifier {
            client: reqwest::Client::new(),
            auth,
        }
    }

    fn request(&self, url: &str, body: String) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json; charset=utf-8")
            .body(body);

        // basic credentials take the Authorization header over the api key
        if let (Some(user), Some(password)) = (&self.auth.api_username, &self.auth.api_password) {
            req = req.basic_auth(user, Some(password));
        } else if let Some(key) = &self.auth.api_secret_key {
            req = req.header(reqwest::header::AUTHORIZATION, format!("Apikey {}", key));
        }

        req
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn publish(&self, target: &str, body: String) -> Result<(), NotifyError> {
        let delivery_error = |reason: String| NotifyError::Delivery {
            target: target.to_string(),
            reason,
        };

        let resp = self
            .request(target, body)
            .send()
            .await
            .map_err(|e| delivery_error(e.to_string()))?;
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();

        tracing::info!(status = status.as_u16(), response = %text, "callback complete");

        if !status.is_success() {
            return Err(delivery_error(format!("unexpected status: {}", status)));
        }

        Ok(())
    }
}

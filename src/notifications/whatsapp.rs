//! WhatsApp Cloud API client and webhook payload types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{instrument, warn};

use super::{MessageSender, SendReceipt};
use crate::entities::notification::NotificationStatus;
use crate::errors::ServiceError;

#[derive(Clone)]
pub struct WhatsAppClient {
    client: reqwest::Client,
    api_url: String,
    phone_number_id: String,
    access_token: String,
}

impl std::fmt::Debug for WhatsAppClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhatsAppClient")
            .field("api_url", &self.api_url)
            .field("phone_number_id", &self.phone_number_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
struct OutboundMessage<'a> {
    messaging_product: &'static str,
    recipient_type: &'static str,
    to: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    text: TextBody<'a>,
}

#[derive(Debug, Serialize)]
struct TextBody<'a> {
    preview_url: bool,
    body: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct GraphErrorBody {
    error: GraphError,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    message: String,
    #[serde(default)]
    code: Option<i64>,
}

impl WhatsAppClient {
    pub fn new(
        api_url: String,
        phone_number_id: String,
        access_token: String,
    ) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ServiceError::InternalError(format!("http client: {}", e)))?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            phone_number_id,
            access_token,
        })
    }

    fn messages_url(&self) -> String {
        format!("{}/{}/messages", self.api_url, self.phone_number_id)
    }
}

#[async_trait]
impl MessageSender for WhatsAppClient {
    #[instrument(skip(self, body), fields(to = %to))]
    async fn send_text(&self, to: &str, body: &str) -> Result<SendReceipt, ServiceError> {
        // The Cloud API expects the number without the leading '+'
        let to = to.trim_start_matches('+');
        let payload = OutboundMessage {
            messaging_product: "whatsapp",
            recipient_type: "individual",
            to,
            kind: "text",
            text: TextBody {
                preview_url: false,
                body,
            },
        };

        let response = self
            .client
            .post(self.messages_url())
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("whatsapp request: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .json::<GraphErrorBody>()
                .await
                .map(|b| match b.error.code {
                    Some(code) => format!("{} (code {})", b.error.message, code),
                    None => b.error.message,
                })
                .unwrap_or_else(|_| status.to_string());
            warn!(%status, %detail, "whatsapp rejected message");
            return Err(ServiceError::ExternalServiceError(format!(
                "whatsapp: {}",
                detail
            )));
        }

        let parsed: SendResponse = response.json().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("whatsapp response: {}", e))
        })?;

        Ok(SendReceipt {
            provider_message_id: parsed.messages.into_iter().next().map(|m| m.id),
        })
    }

    fn channel(&self) -> &'static str {
        "whatsapp"
    }
}

/// Body of a `POST /webhooks/whatsapp` callback
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub entry: Vec<WebhookEntry>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEntry {
    #[serde(default)]
    pub changes: Vec<WebhookChange>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookChange {
    #[serde(default)]
    pub field: String,
    pub value: WebhookValue,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookValue {
    #[serde(default)]
    pub statuses: Vec<StatusUpdate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusUpdate {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub errors: Vec<StatusError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusError {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub title: Option<String>,
}

impl WebhookPayload {
    /// All delivery status updates carried by the payload, in order.
    pub fn status_updates(&self) -> impl Iterator<Item = &StatusUpdate> {
        self.entry
            .iter()
            .flat_map(|e| e.changes.iter())
            .flat_map(|c| c.value.statuses.iter())
    }
}

impl StatusUpdate {
    pub fn notification_status(&self) -> Option<NotificationStatus> {
        match self.status.as_str() {
            "sent" => Some(NotificationStatus::Sent),
            "delivered" => Some(NotificationStatus::Delivered),
            "read" => Some(NotificationStatus::Read),
            "failed" => Some(NotificationStatus::Failed),
            _ => None,
        }
    }

    pub fn error_summary(&self) -> Option<String> {
        let first = self.errors.first()?;
        Some(match (&first.title, first.code) {
            (Some(title), Some(code)) => format!("{} (code {})", title, code),
            (Some(title), None) => title.clone(),
            (None, Some(code)) => format!("error code {}", code),
            (None, None) => "delivery failed".to_string(),
        })
    }
}

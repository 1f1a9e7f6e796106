//! Outbound messaging. Everything that talks to WhatsApp goes through the
//! [`MessageSender`] trait so the HTTP client can be swapped for a logging
//! sender when delivery is disabled.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::errors::ServiceError;

pub mod phone;
pub mod signature;
pub mod whatsapp;

pub use phone::normalize_phone;
pub use signature::verify_hub_signature;
pub use whatsapp::WhatsAppClient;

/// Provider acknowledgement for an accepted message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub provider_message_id: Option<String>,
}

#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Sends a plain text message to an E.164 number.
    async fn send_text(&self, to: &str, body: &str) -> Result<SendReceipt, ServiceError>;

    fn channel(&self) -> &'static str;
}

/// Sender used when WhatsApp delivery is disabled; messages are only logged.
#[derive(Debug, Default, Clone)]
pub struct LoggingSender;

#[async_trait]
impl MessageSender for LoggingSender {
    async fn send_text(&self, to: &str, body: &str) -> Result<SendReceipt, ServiceError> {
        let id = format!("log-{}", Uuid::new_v4());
        info!(to, chars = body.chars().count(), provider_message_id = %id, "whatsapp disabled, message logged only");
        Ok(SendReceipt {
            provider_message_id: Some(id),
        })
    }

    fn channel(&self) -> &'static str {
        "log"
    }
}

/// Picks the Cloud API client when WhatsApp is enabled and configured.
pub fn build_sender(cfg: &AppConfig) -> Result<Arc<dyn MessageSender>, ServiceError> {
    if !cfg.whatsapp_enabled {
        return Ok(Arc::new(LoggingSender));
    }

    let phone_number_id = cfg.whatsapp_phone_number_id.clone().ok_or_else(|| {
        ServiceError::InternalError("whatsapp_phone_number_id is not configured".into())
    })?;
    let access_token = cfg.whatsapp_access_token.clone().ok_or_else(|| {
        ServiceError::InternalError("whatsapp_access_token is not configured".into())
    })?;

    Ok(Arc::new(WhatsAppClient::new(
        cfg.whatsapp_api_url.clone(),
        phone_number_id,
        access_token,
    )?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn logging_sender_returns_synthetic_id() {
        let receipt = LoggingSender.send_text("+15551234567", "hi").await.unwrap();
        assert!(receipt
            .provider_message_id
            .as_deref()
            .is_some_and(|id| id.starts_with("log-")));
    }
}

use axum::{
    body::Bytes,
    extract::{Json, Query, State},
    http::{HeaderMap, StatusCode},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};

use super::common::{created, ok, PaginatedResponse, PaginationParams};
use crate::{
    entities::notification,
    errors::ServiceError,
    notifications::{signature::SIGNATURE_HEADER, verify_hub_signature, whatsapp::WebhookPayload},
    services::notifications::{NotificationFilter, SendWhatsAppInput},
    ApiResponse, AppState,
};

/// Query Meta sends when registering the webhook
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct VerifyParams {
    #[serde(rename = "hub.mode")]
    #[param(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    #[param(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    #[param(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAck {
    pub updated: usize,
}

/// Notification history, newest first
#[utoipa::path(
    get,
    path = "/api/v1/notifications",
    params(PaginationParams, NotificationFilter),
    responses((status = 200, description = "Notifications page", body = ApiResponse<PaginatedResponse<notification::Model>>)),
    security(("Bearer" = [])),
    tag = "notifications"
)]
pub async fn list_notifications(
    State(state): State<AppState>,
    Query(page): Query<PaginationParams>,
    Query(filter): Query<NotificationFilter>,
) -> Result<Json<ApiResponse<PaginatedResponse<notification::Model>>>, ServiceError> {
    let (items, total) = state
        .services
        .notifications
        .list_notifications(page.page(), page.per_page(), filter)
        .await?;
    Ok(ok(PaginatedResponse::new(items, &page, total)))
}

/// Send a WhatsApp message to a client or a raw number
#[utoipa::path(
    post,
    path = "/api/v1/notifications/whatsapp",
    request_body = SendWhatsAppInput,
    responses(
        (status = 201, description = "Message accepted by the provider", body = ApiResponse<notification::Model>),
        (status = 400, description = "No usable recipient", body = crate::errors::ErrorResponse),
        (status = 502, description = "Provider rejected the message", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "notifications"
)]
pub async fn send_whatsapp(
    State(state): State<AppState>,
    Json(input): Json<SendWhatsAppInput>,
) -> Result<(StatusCode, Json<ApiResponse<notification::Model>>), ServiceError> {
    Ok(created(
        state.services.notifications.send_whatsapp(input).await?,
    ))
}

/// Webhook subscription handshake
#[utoipa::path(
    get,
    path = "/api/v1/webhooks/whatsapp",
    params(VerifyParams),
    responses(
        (status = 200, description = "Echoed challenge", body = String),
        (status = 403, description = "Verify token mismatch", body = crate::errors::ErrorResponse),
    ),
    tag = "notifications"
)]
pub async fn verify_webhook(
    State(state): State<AppState>,
    Query(params): Query<VerifyParams>,
) -> Result<String, ServiceError> {
    let Some(expected) = state.config.whatsapp_verify_token.as_deref() else {
        return Err(ServiceError::Forbidden("Webhook verification is not configured".into()));
    };

    match (params.mode.as_deref(), params.verify_token.as_deref()) {
        (Some("subscribe"), Some(token)) if token == expected => {
            info!("WhatsApp webhook verified");
            Ok(params.challenge.unwrap_or_default())
        }
        _ => {
            warn!("WhatsApp webhook verification rejected");
            Err(ServiceError::Forbidden("Verify token mismatch".into()))
        }
    }
}

/// Delivery status callbacks
#[utoipa::path(
    post,
    path = "/api/v1/webhooks/whatsapp",
    request_body(content = String, description = "Meta webhook payload", content_type = "application/json"),
    responses(
        (status = 200, description = "Updates applied", body = ApiResponse<WebhookAck>),
        (status = 401, description = "Bad signature", body = crate::errors::ErrorResponse),
    ),
    tag = "notifications"
)]
pub async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ApiResponse<WebhookAck>>, ServiceError> {
    if let Some(secret) = state.config.whatsapp_app_secret.as_deref() {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !verify_hub_signature(secret, &body, signature) {
            warn!("WhatsApp webhook signature mismatch");
            return Err(ServiceError::Unauthorized("Invalid webhook signature".into()));
        }
    }

    let payload: WebhookPayload = serde_json::from_slice(&body)
        .map_err(|e| ServiceError::BadRequest(format!("Malformed webhook payload: {}", e)))?;
    let updates: Vec<_> = payload.status_updates().cloned().collect();
    let updated = state
        .services
        .notifications
        .apply_status_updates(&updates)
        .await?;

    Ok(ok(WebhookAck { updated }))
}

use base64::{engine::general_purpose, Engine};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::handlers::MessageHandler;

/// LINE Messaging API webhook payload structures
#[derive(Debug, Deserialize)]
pub struct WebhookRequest {
    #[serde(default)]
    pub events: Vec<WebhookEvent>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(rename = "replyToken")]
    pub reply_token: Option<String>,
    pub source: Option<EventSource>,
    pub message: Option<EventMessage>,
}

#[derive(Debug, Deserialize)]
pub struct EventSource {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EventMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    pub id: String,
    pub text: Option<String>,
}

/// Verify the `x-line-signature` header: base64(HMAC-SHA256(secret, raw body)).
/// Verification uses the raw request body — re-serialized JSON would break it.
pub fn verify_signature(channel_secret: &str, body: &[u8], signature: &str) -> bool {
    type HmacSha256 = Hmac<Sha256>;

    let mut mac = match HmacSha256::new_from_slice(channel_secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };

    mac.update(body);
    let expected = general_purpose::STANDARD.encode(mac.finalize().into_bytes());

    expected == signature
}

/// Dispatch one webhook event to the message handler.
pub async fn handle_event(handler: &MessageHandler, event: WebhookEvent) -> anyhow::Result<()> {
    if event.event_type != "message" {
        log::debug!("Ignoring {} event", event.event_type);
        return Ok(());
    }

    let (Some(reply_token), Some(message)) = (event.reply_token, event.message) else {
        log::warn!("⚠️ Message event without reply token or message body");
        return Ok(());
    };
    let Some(user_id) = event.source.and_then(|s| s.user_id) else {
        log::warn!("⚠️ Message event without a user id");
        return Ok(());
    };

    match message.message_type.as_str() {
        "text" => {
            let text = message.text.unwrap_or_default();
            handler.handle_text(&user_id, &reply_token, &text).await
        }
        "image" => handler.handle_image(&user_id, &reply_token, &message.id).await,
        other => {
            log::debug!("Ignoring {} message from {}", other, user_id);
            Ok(())
        }
    }
}

// REST API handlers (analyze / menu / documents)
pub mod api;

pub mod server {
    use super::*;
    use std::sync::Arc;

    use axum::extract::{DefaultBodyLimit, State};
    use axum::http::HeaderMap;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use tower_http::cors::CorsLayer;

    use super::api::ApiError;
    use crate::handlers::{MenuPlanner, ProductAnalyzer};
    use crate::services::BlobStore;

    pub struct AppState {
        pub message_handler: Arc<MessageHandler>,
        pub analyzer: Arc<ProductAnalyzer>,
        pub planner: Arc<MenuPlanner>,
        pub storage: Arc<dyn BlobStore>,
        pub channel_secret: String,
    }

    pub fn create_router(state: Arc<AppState>) -> Router {
        Router::new()
            .route("/analyze", post(api::analyze))
            .route("/suggest-menu", post(api::suggest_menu))
            .route("/upload-json", post(api::upload_json))
            .route("/get-json/:id", get(api::get_json))
            .route("/callback", post(callback))
            .route("/health", get(health))
            .layer(DefaultBodyLimit::max(20 * 1024 * 1024))
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    async fn health() -> Json<serde_json::Value> {
        Json(serde_json::json!({ "status": "ok" }))
    }

    async fn callback(
        State(state): State<Arc<AppState>>,
        headers: HeaderMap,
        body: String,
    ) -> Result<&'static str, ApiError> {
        let signature = headers
            .get("x-line-signature")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::BadRequest("missing x-line-signature header".to_string()))?;

        if !verify_signature(&state.channel_secret, body.as_bytes(), signature) {
            log::error!("❌ Webhook signature verification failed");
            return Err(ApiError::BadRequest("invalid signature".to_string()));
        }

        let request: WebhookRequest = serde_json::from_str(&body)
            .map_err(|e| ApiError::BadRequest(format!("unparsable webhook payload: {}", e)))?;

        log::info!("🔔 Webhook received: {} event(s)", request.events.len());

        for event in request.events {
            // The handler turns its own failures into reply messages; anything
            // surfacing here is a reply-delivery failure. LINE still gets its ack.
            if let Err(e) = handle_event(&state.message_handler, event).await {
                log::error!("❌ Webhook event error: {}", e);
            }
        }

        Ok("OK")
    }
}

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine};
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Gemini API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("malformed model response: {0}")]
    Malformed(String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Vision/text inference constrained to a JSON schema.
///
/// One contract for every endpoint: the prompt describes the keys to emit, the
/// schema constrains the provider output, and callers get parsed JSON back.
#[async_trait]
pub trait VisionModel: Send + Sync {
    async fn infer(
        &self,
        prompt: &str,
        response_schema: &Value,
        image: Option<(&str, &[u8])>,
    ) -> Result<Value, ModelError>;
}

pub struct GeminiClient {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self) -> String {
        format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        )
    }
}

/// Pull the generated text out of the Gemini response envelope.
fn candidate_text(response: &Value) -> Result<&str, ModelError> {
    response["candidates"][0]["content"]["parts"][0]["text"]
        .as_str()
        .ok_or_else(|| ModelError::Malformed("no candidate text in response".to_string()))
}

/// Schema-constrained output still needs a sanity check: the provider can emit
/// valid JSON with keys missing.
fn check_required_keys(value: &Value, schema: &Value) -> Result<(), ModelError> {
    let Some(required) = schema["required"].as_array() else {
        return Ok(());
    };

    for key in required.iter().filter_map(|k| k.as_str()) {
        if value.get(key).is_none() {
            return Err(ModelError::Malformed(format!("missing required key: {}", key)));
        }
    }
    Ok(())
}

#[async_trait]
impl VisionModel for GeminiClient {
    async fn infer(
        &self,
        prompt: &str,
        response_schema: &Value,
        image: Option<(&str, &[u8])>,
    ) -> Result<Value, ModelError> {
        let mut parts = Vec::new();
        if let Some((mime_type, data)) = image {
            log::debug!("🖼️ Attaching {} image ({} bytes)", mime_type, data.len());
            parts.push(json!({
                "inline_data": {
                    "mime_type": mime_type,
                    "data": general_purpose::STANDARD.encode(data),
                }
            }));
        }
        parts.push(json!({ "text": prompt }));

        let body = json!({
            "contents": [{ "parts": parts }],
            "generationConfig": {
                "response_mime_type": "application/json",
                "response_schema": response_schema,
            }
        });

        log::info!("🤖 Sending request to Gemini with model: {}", self.model);

        let response = self
            .client
            .post(self.api_url())
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        log::debug!("📥 Gemini response status: {}", status);

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            log::error!("❌ Gemini API error ({}): {}", status, error_text);
            return Err(ModelError::Api {
                status: status.as_u16(),
                message: error_text,
            });
        }

        let envelope: Value = response.json().await?;
        let text = candidate_text(&envelope)?;

        let value: Value = serde_json::from_str(text)
            .map_err(|e| ModelError::Malformed(format!("invalid JSON: {}", e)))?;
        check_required_keys(&value, response_schema)?;

        Ok(value)
    }
}

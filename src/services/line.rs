use anyhow::Result;
use async_trait::async_trait;

/// Chat reply channel. Trait so handlers can be tested without the LINE API.
#[async_trait]
pub trait ChatService: Send + Sync {
    /// Reply to a received event with a plain text message.
    async fn reply_text(&self, reply_token: &str, text: &str) -> Result<()>;

    /// Download the binary content (image) attached to a message.
    async fn get_message_content(&self, message_id: &str) -> Result<Vec<u8>>;
}

/// LINE Messaging API client.
pub struct LineClient {
    channel_token: String,
    client: reqwest::Client,
}

impl LineClient {
    pub fn new(channel_token: String) -> Self {
        Self {
            channel_token,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ChatService for LineClient {
    async fn reply_text(&self, reply_token: &str, text: &str) -> Result<()> {
        let body = serde_json::json!({
            "replyToken": reply_token,
            "messages": [{ "type": "text", "text": text }]
        });

        let response = self
            .client
            .post("https://api.line.me/v2/bot/message/reply")
            .header("Authorization", format!("Bearer {}", self.channel_token))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            anyhow::bail!("Failed to send reply: {}", error_text);
        }

        Ok(())
    }

    async fn get_message_content(&self, message_id: &str) -> Result<Vec<u8>> {
        // Media content lives on the api-data host, not api.line.me
        let url = format!(
            "https://api-data.line.me/v2/bot/message/{}/content",
            message_id
        );

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.channel_token))
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!(
                "Failed to download message content: HTTP {}",
                response.status()
            );
        }

        let bytes = response.bytes().await?;
        log::debug!("📥 Downloaded message content: {} bytes", bytes.len());
        Ok(bytes.to_vec())
    }
}

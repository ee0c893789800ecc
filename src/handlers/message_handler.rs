use std::sync::Arc;

use anyhow::Result;

use crate::handlers::ProductAnalyzer;
use crate::models::{ProductRecord, SessionDocument};
use crate::services::{BlobStore, ChatService, SessionStore};

/// Text that creates (or resets) a user's product list.
pub const START_KEYWORD: &str = "スタート";

const MSG_STARTED: &str = "✅ 食材リストを作成しました！\n商品の写真を送ると、自動で登録します📸";
const MSG_NOT_STARTED: &str = "「スタート」と送信すると食材リストを作成します";
const MSG_SEND_PHOTO: &str = "📸 商品の写真を送ってください\n「スタート」でリストをリセットできます";

/// Per-user chat flow: start keyword opens a session, each product photo is
/// analyzed and appended, the full list is persisted to storage after every
/// append. Failures never propagate to the webhook loop; they become reply
/// messages instead.
pub struct MessageHandler {
    sessions: Arc<dyn SessionStore>,
    storage: Arc<dyn BlobStore>,
    analyzer: Arc<ProductAnalyzer>,
    chat: Arc<dyn ChatService>,
}

impl MessageHandler {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        storage: Arc<dyn BlobStore>,
        analyzer: Arc<ProductAnalyzer>,
        chat: Arc<dyn ChatService>,
    ) -> Self {
        Self {
            sessions,
            storage,
            analyzer,
            chat,
        }
    }

    pub async fn handle_text(&self, user_id: &str, reply_token: &str, text: &str) -> Result<()> {
        log::info!("💬 Text message from {}: {}", user_id, text);

        if text.trim() == START_KEYWORD {
            // Start (or restart) with an empty list
            self.sessions.save(user_id, SessionDocument::new()).await;
            log::info!("✅ Session started for {}", user_id);
            return self.chat.reply_text(reply_token, MSG_STARTED).await;
        }

        let reply = if self.sessions.load(user_id).await.is_some() {
            MSG_SEND_PHOTO
        } else {
            MSG_NOT_STARTED
        };
        self.chat.reply_text(reply_token, reply).await
    }

    pub async fn handle_image(
        &self,
        user_id: &str,
        reply_token: &str,
        message_id: &str,
    ) -> Result<()> {
        log::info!("📸 Image message from {}: id={}", user_id, message_id);

        if self.sessions.load(user_id).await.is_none() {
            return self.chat.reply_text(reply_token, MSG_NOT_STARTED).await;
        }

        match self.register_product(user_id, message_id).await {
            Ok((record, total)) => {
                let summary = format_summary(&record, total);
                self.chat.reply_text(reply_token, &summary).await
            }
            Err(e) => {
                log::error!("❌ Image registration failed for {}: {}", user_id, e);
                let reply = format!("❌ 解析に失敗しました: {}\nもう一度写真を送ってください", e);
                self.chat.reply_text(reply_token, &reply).await
            }
        }
    }

    /// Download, analyze, append, persist. Returns the new record and the
    /// session size after the append.
    async fn register_product(
        &self,
        user_id: &str,
        message_id: &str,
    ) -> Result<(ProductRecord, usize)> {
        let data = self.chat.get_message_content(message_id).await?;
        let record = self.analyzer.analyze("image/jpeg", &data).await?;

        // Read-modify-write without a lock across the awaits above: concurrent
        // photos from the same user can lose an append. Accepted.
        let mut session = self.sessions.load(user_id).await.unwrap_or_default();
        session.products.push(record.clone());
        let total = session.products.len();
        self.sessions.save(user_id, session.clone()).await;

        let document = serde_json::to_vec(&session)?;
        self.storage
            .put_object(&format!("{}.json", user_id), document)
            .await?;

        Ok((record, total))
    }
}

fn format_summary(record: &ProductRecord, total: usize) -> String {
    let expiration = match record.expiration_type {
        Some(t) => format!("{} ({})", record.expiration_date, t),
        None => record.expiration_date.clone(),
    };

    format!(
        "✅ 登録しました！\n\n\
         📦 {}\n\
         📅 期限: {}\n\
         ⚖️ 分量: {}{}\n\
         🏷️ 分類: {}\n\n\
         現在 {} 件の食材が登録されています",
        record.name, expiration, record.amount, record.unit, record.category, total
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    use crate::models::{Category, ExpirationType, Unit};
    use crate::services::storage::{StorageError, StorageResult};
    use crate::services::{MemorySessionStore, ModelError, VisionModel};

    /// Records replies and serves canned image bytes.
    struct StubChat {
        replies: Mutex<Vec<String>>,
    }

    impl StubChat {
        fn new() -> Self {
            Self {
                replies: Mutex::new(Vec::new()),
            }
        }

        async fn last_reply(&self) -> String {
            self.replies.lock().await.last().cloned().unwrap_or_default()
        }
    }

    #[async_trait]
    impl ChatService for StubChat {
        async fn reply_text(&self, _reply_token: &str, text: &str) -> Result<()> {
            self.replies.lock().await.push(text.to_string());
            Ok(())
        }

        async fn get_message_content(&self, _message_id: &str) -> Result<Vec<u8>> {
            Ok(b"fake jpeg".to_vec())
        }
    }

    /// Stores documents in memory, keyed like the real store.
    struct StubStore {
        documents: Mutex<Vec<(String, Vec<u8>)>>,
        put_files: AtomicUsize,
    }

    impl StubStore {
        fn new() -> Self {
            Self {
                documents: Mutex::new(Vec::new()),
                put_files: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl BlobStore for StubStore {
        async fn put_file(&self, _path: &std::path::Path, ext: &str) -> StorageResult<String> {
            self.put_files.fetch_add(1, Ordering::SeqCst);
            Ok(format!("https://pub-test.r2.dev/image{}", ext))
        }

        async fn put_object(&self, key: &str, data: Vec<u8>) -> StorageResult<String> {
            self.documents
                .lock()
                .await
                .push((key.to_string(), data));
            Ok(format!("https://pub-test.r2.dev/{}", key))
        }

        async fn get_object(&self, key: &str) -> StorageResult<Vec<u8>> {
            Err(StorageError::NotFound(key.to_string()))
        }
    }

    struct StubModel {
        response: Result<Value, String>,
    }

    #[async_trait]
    impl VisionModel for StubModel {
        async fn infer(
            &self,
            _prompt: &str,
            _schema: &Value,
            _image: Option<(&str, &[u8])>,
        ) -> Result<Value, ModelError> {
            match &self.response {
                Ok(v) => Ok(v.clone()),
                Err(msg) => Err(ModelError::Api {
                    status: 500,
                    message: msg.clone(),
                }),
            }
        }
    }

    fn milk_json() -> Value {
        serde_json::json!({
            "name": "牛乳",
            "expiration_date": "2025-04-28T00:00:00Z",
            "expiration_type": "best_before",
            "image_url": "",
            "amount": 1000,
            "unit": "ml",
            "category": "飲料"
        })
    }

    struct Fixture {
        handler: MessageHandler,
        sessions: Arc<MemorySessionStore>,
        storage: Arc<StubStore>,
        chat: Arc<StubChat>,
    }

    fn fixture(model_response: Result<Value, String>) -> Fixture {
        let sessions = Arc::new(MemorySessionStore::new());
        let storage = Arc::new(StubStore::new());
        let chat = Arc::new(StubChat::new());
        let model = Arc::new(StubModel {
            response: model_response,
        });
        let analyzer = Arc::new(ProductAnalyzer::new(storage.clone(), model));

        let handler = MessageHandler::new(
            sessions.clone(),
            storage.clone(),
            analyzer,
            chat.clone(),
        );

        Fixture {
            handler,
            sessions,
            storage,
            chat,
        }
    }

    #[tokio::test]
    async fn test_start_keyword_creates_empty_session() {
        let f = fixture(Ok(milk_json()));

        f.handler.handle_text("U1", "rt", "スタート").await.unwrap();

        let session = f.sessions.load("U1").await.unwrap();
        assert!(session.products.is_empty());
        assert!(f.chat.last_reply().await.contains("作成しました"));
    }

    #[tokio::test]
    async fn test_text_before_start_prompts_for_keyword() {
        let f = fixture(Ok(milk_json()));

        f.handler.handle_text("U1", "rt", "こんにちは").await.unwrap();

        assert!(f.sessions.load("U1").await.is_none());
        assert!(f.chat.last_reply().await.contains("スタート"));
    }

    #[tokio::test]
    async fn test_image_before_start_is_rejected() {
        let f = fixture(Ok(milk_json()));

        f.handler.handle_image("U1", "rt", "m1").await.unwrap();

        assert!(f.chat.last_reply().await.contains("スタート"));
        assert_eq!(f.storage.put_files.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_image_appends_and_persists_session() {
        let f = fixture(Ok(milk_json()));

        f.handler.handle_text("U1", "rt", "スタート").await.unwrap();
        f.handler.handle_image("U1", "rt", "m1").await.unwrap();

        let session = f.sessions.load("U1").await.unwrap();
        assert_eq!(session.products.len(), 1);
        assert_eq!(session.products[0].name, "牛乳");
        assert_eq!(
            session.products[0].expiration_type,
            Some(ExpirationType::BestBefore)
        );
        assert_eq!(session.products[0].unit, Unit::Milliliter);
        assert_eq!(session.products[0].category, Category::Beverage);
        // image_url filled from storage, not the model's empty string
        assert_eq!(session.products[0].image_url, "https://pub-test.r2.dev/image.jpg");

        // the whole session document went to storage under {userId}.json
        let documents = f.storage.documents.lock().await;
        let (key, data) = documents.last().unwrap();
        assert_eq!(key, "U1.json");
        let persisted: SessionDocument = serde_json::from_slice(data).unwrap();
        assert_eq!(persisted, session);

        let reply = f.chat.last_reply().await;
        assert!(reply.contains("牛乳"));
        assert!(reply.contains("2025-04-28"));
        assert!(reply.contains("1000ml"));
        assert!(reply.contains("飲料"));
    }

    #[tokio::test]
    async fn test_analysis_failure_becomes_error_reply() {
        let f = fixture(Err("model exploded".to_string()));

        f.handler.handle_text("U1", "rt", "スタート").await.unwrap();
        // must not propagate the error
        f.handler.handle_image("U1", "rt", "m1").await.unwrap();

        let reply = f.chat.last_reply().await;
        assert!(reply.contains("失敗"));
        assert!(reply.contains("model exploded"));

        // nothing appended
        assert!(f.sessions.load("U1").await.unwrap().products.is_empty());
    }

    #[tokio::test]
    async fn test_start_keyword_resets_existing_session() {
        let f = fixture(Ok(milk_json()));

        f.handler.handle_text("U1", "rt", "スタート").await.unwrap();
        f.handler.handle_image("U1", "rt", "m1").await.unwrap();
        assert_eq!(f.sessions.load("U1").await.unwrap().products.len(), 1);

        f.handler.handle_text("U1", "rt", "スタート").await.unwrap();
        assert!(f.sessions.load("U1").await.unwrap().products.is_empty());
    }
}

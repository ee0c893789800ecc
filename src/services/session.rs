use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::models::SessionDocument;

/// Per-user session state. Injectable so the chat handler does not depend on
/// process memory directly; the production impl is still in-memory and sessions
/// are lost on restart unless re-initialized.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, user_id: &str) -> Option<SessionDocument>;
    async fn save(&self, user_id: &str, session: SessionDocument);
}

#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, SessionDocument>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, user_id: &str) -> Option<SessionDocument> {
        self.sessions.read().await.get(user_id).cloned()
    }

    async fn save(&self, user_id: &str, session: SessionDocument) {
        self.sessions
            .write()
            .await
            .insert(user_id.to_string(), session);
    }
}

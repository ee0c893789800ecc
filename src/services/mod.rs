pub mod gemini; // Gemini vision/text model client
pub mod line; // LINE Messaging API
pub mod session;
pub mod storage; // Cloudflare R2 (S3-compatible)

pub use gemini::{GeminiClient, ModelError, VisionModel};
pub use line::{ChatService, LineClient};
pub use session::{MemorySessionStore, SessionStore};
pub use storage::{BlobStore, S3Storage, StorageError};

mod handlers;
mod models;
mod services;
mod webhook; // LINE webhook + REST API

use anyhow::Result;
use dotenv::dotenv;
use std::env;
use std::sync::Arc;

use handlers::{MenuPlanner, MessageHandler, ProductAnalyzer};
use services::{GeminiClient, LineClient, MemorySessionStore, S3Storage};
use webhook::server::{create_router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger
    env_logger::init();

    // Load environment variables
    dotenv().ok();

    log::info!("🚀 Starting LINE Pantry Bot...");

    // Object storage (Cloudflare R2, S3-compatible)
    let storage_endpoint = env::var("STORAGE_ENDPOINT")
        .expect("STORAGE_ENDPOINT must be set in .env file");
    let storage_bucket = env::var("STORAGE_BUCKET").unwrap_or_else(|_| "pantry".to_string());
    let access_key = env::var("ACCESS_KEY").expect("ACCESS_KEY must be set in .env file");
    let secret_key = env::var("SECRET_KEY").expect("SECRET_KEY must be set in .env file");
    let public_base_url = env::var("PUBLIC_BASE_URL")
        .expect("PUBLIC_BASE_URL must be set in .env file");

    let storage = Arc::new(S3Storage::new(
        &storage_endpoint,
        &storage_bucket,
        &access_key,
        &secret_key,
        &public_base_url,
    )?);
    log::info!("✅ Object storage initialized (bucket: {})", storage_bucket);

    // Gemini vision model
    let gemini_api_key = env::var("GEMINI_API_KEY")
        .expect("GEMINI_API_KEY must be set in .env file");
    let gemini_model = env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-2.5-pro".to_string());

    let model = Arc::new(GeminiClient::new(gemini_api_key, gemini_model.clone()));
    log::info!("✅ Gemini service initialized with model: {}", gemini_model);

    // LINE Messaging API
    let channel_secret = env::var("LINE_CHANNEL_SECRET")
        .expect("LINE_CHANNEL_SECRET must be set in .env file");
    let channel_token = env::var("LINE_CHANNEL_TOKEN")
        .expect("LINE_CHANNEL_TOKEN must be set in .env file");

    let line = Arc::new(LineClient::new(channel_token));
    log::info!("✅ LINE client initialized");

    // Shared pipeline and handlers
    let analyzer = Arc::new(ProductAnalyzer::new(storage.clone(), model.clone()));
    let planner = Arc::new(MenuPlanner::new(model.clone()));
    let sessions = Arc::new(MemorySessionStore::new());
    let message_handler = Arc::new(MessageHandler::new(
        sessions,
        storage.clone(),
        analyzer.clone(),
        line,
    ));
    log::info!("✅ Message handler initialized");

    let state = Arc::new(AppState {
        message_handler,
        analyzer,
        planner,
        storage,
        channel_secret,
    });

    let port = env::var("PORT").unwrap_or_else(|_| "8000".to_string());
    let addr = format!("0.0.0.0:{}", port);
    let app = create_router(state);

    log::info!("🌐 Server starting on {}", addr);

    println!("\n🥕 LINE Pantry Bot が起動しました!");
    println!("🌐 http://localhost:{}", port);
    println!("   POST /analyze       - 商品写真の解析");
    println!("   POST /suggest-menu  - 献立の提案");
    println!("   POST /callback      - LINE Webhook");
    println!("\n🛑 停止するには Ctrl+C\n");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

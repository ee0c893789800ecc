pub mod analyzer;
pub mod menu;
pub mod message_handler;

pub use analyzer::ProductAnalyzer;
pub use menu::MenuPlanner;
pub use message_handler::MessageHandler;

//! Keyword module - learns question/answer pairs and auto-replies in allowed groups.

pub mod allowlist;
pub mod commands;
pub mod engine;
pub mod message;
pub mod responder;
pub mod session;
pub mod store;
pub mod telegram;

#[cfg(test)]
mod tests;

pub use allowlist::AllowList;
pub use engine::KeywordEngine;
pub use message::IncomingMessage;
pub use store::TriggerRepository;
pub use telegram::TelegramClient;

//! Telegram integration: bot setup and the transport event loop

pub mod bot;

pub use bot::{create_bot, run, schema, setup_bot_commands, HandlerDeps};

//! faltas — Telegram bot for tracking class attendance
//!
//! Register classes, record and remove absences, and query totals from a
//! chat. The interesting parts are the conversation dispatcher (per-chat
//! multi-step state) and the persistence layer backing it.
//!
//! # Module Structure
//!
//! - `core`: configuration, errors, logging
//! - `storage`: Postgres gateway, domain repository, schema bootstrap
//! - `dispatch`: command routing, conversation state, response descriptors
//! - `telegram`: transport adapter (event loop, rendering)

pub mod core;
pub mod dispatch;
pub mod storage;
pub mod telegram;

// Re-export commonly used types for convenience
pub use core::{AppError, AppResult, Config};
pub use dispatch::{ChatInfo, ConversationStore, Dispatcher, Response};
pub use storage::{AbsenceStore, PgGateway, PgRepository, StorageError};

//! Schema bootstrap
//!
//! Creates the three tables on startup when they are missing. Mirrors the
//! deployed migration history: string chat ids, UUID class ids, a composite
//! key on the absence counters.

use crate::storage::gateway::{PgGateway, StorageError};
use crate::storage::repo::ClassScope;

const CREATE_CHATS: &str = "CREATE TABLE IF NOT EXISTS chats (
    id TEXT PRIMARY KEY,
    username TEXT,
    first_name TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
)";

const CREATE_CLASSES: &str = "CREATE TABLE IF NOT EXISTS classes (
    id UUID PRIMARY KEY,
    code TEXT NOT NULL,
    name TEXT NOT NULL,
    semester TEXT,
    chat_id TEXT NOT NULL REFERENCES chats(id),
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
)";

const CREATE_ABSENCES: &str = "CREATE TABLE IF NOT EXISTS absences (
    chat_id TEXT NOT NULL REFERENCES chats(id),
    class_id UUID NOT NULL REFERENCES classes(id),
    counter INTEGER NOT NULL DEFAULT 0,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (chat_id, class_id)
)";

// Two deployed schema generations differ on class-code uniqueness, so the
// index matches the configured scope instead of hard-coding either.
const UNIQUE_CODE_PER_CHAT: &str =
    "CREATE UNIQUE INDEX IF NOT EXISTS uq_classes_chat_code ON classes (chat_id, code)";
const UNIQUE_CODE_GLOBAL: &str =
    "CREATE UNIQUE INDEX IF NOT EXISTS uq_classes_code ON classes (code)";

/// Ensures all tables and the scope-appropriate unique index exist.
///
/// # Errors
///
/// Propagates `StorageError` from the gateway; a failed bootstrap is fatal
/// at startup.
pub async fn ensure_schema(gateway: &PgGateway, scope: ClassScope) -> Result<(), StorageError> {
    gateway.execute(CREATE_CHATS, &[]).await?;
    gateway.execute(CREATE_CLASSES, &[]).await?;
    gateway.execute(CREATE_ABSENCES, &[]).await?;

    let index = match scope {
        ClassScope::PerChat => UNIQUE_CODE_PER_CHAT,
        ClassScope::Global => UNIQUE_CODE_GLOBAL,
    };
    gateway.execute(index, &[]).await?;

    log::info!("Database schema is up to date (class scope: {:?})", scope);
    Ok(())
}

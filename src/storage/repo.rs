//! Domain repository: absence-tracking operations over the gateway
//!
//! Encapsulates the idempotency rules (duplicate chats and classes are a
//! no-op, not an error) and the aggregate queries. Reads on missing data
//! return empty/zero values; true storage faults propagate unmodified so the
//! dispatcher can decide on user-facing wording.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use crate::storage::gateway::{PgGateway, SqlParam, StorageError};

/// Whether a class code is unique per chat or across all chats
///
/// Both variants exist in deployed schema generations, so this is a
/// configuration decision rather than a hard-coded rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassScope {
    PerChat,
    Global,
}

/// A registered class as listed to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassRow {
    pub code: String,
    pub name: String,
    pub semester: Option<String>,
}

/// Per-class absence breakdown entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassAbsences {
    pub class_name: String,
    pub class_code: String,
    pub count: i64,
}

/// Result of a class registration attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Inserted,
    AlreadyExists,
}

/// Result of removing one absence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// Counter decremented; holds the new value
    Decremented(i64),
    /// Counter was already at zero and stays there
    AlreadyZero,
    /// No class or counter record for that code
    NotFound,
}

/// Absence-tracking storage operations
///
/// The dispatcher depends on this trait rather than on Postgres directly, so
/// integration tests can drive the full dispatch logic against an in-memory
/// implementation.
#[async_trait]
pub trait AbsenceStore: Send + Sync {
    async fn chat_exists(&self, chat_id: &str) -> Result<bool, StorageError>;

    /// Registers a chat. Inserting an already-registered chat is success.
    async fn register_chat(
        &self,
        chat_id: &str,
        username: Option<&str>,
        first_name: Option<&str>,
    ) -> Result<(), StorageError>;

    /// Registers a class, or reports that one with the same code already
    /// exists in the configured scope.
    async fn register_class(
        &self,
        chat_id: &str,
        code: &str,
        name: &str,
        semester: Option<&str>,
    ) -> Result<RegisterOutcome, StorageError>;

    /// Records one absence. Returns `false` when the class code is unknown.
    async fn record_absence(&self, chat_id: &str, code: &str) -> Result<bool, StorageError>;

    /// Removes one absence, floored at zero.
    async fn remove_absence(&self, chat_id: &str, code: &str) -> Result<RemoveOutcome, StorageError>;

    /// Absence count for one class; 0 when the class or counter is absent.
    async fn absence_count(&self, chat_id: &str, code: &str) -> Result<i64, StorageError>;

    /// Sum of absences across all classes for the chat.
    async fn total_absences(&self, chat_id: &str) -> Result<i64, StorageError>;

    /// One entry per class with a counter record, ordered by code. Classes
    /// without recorded absences are omitted.
    async fn absences_by_class(&self, chat_id: &str) -> Result<Vec<ClassAbsences>, StorageError>;

    /// All classes registered for the chat, ordered by code.
    async fn all_classes(&self, chat_id: &str) -> Result<Vec<ClassRow>, StorageError>;
}

/// Postgres-backed repository
pub struct PgRepository {
    gateway: std::sync::Arc<PgGateway>,
    scope: ClassScope,
}

impl PgRepository {
    pub fn new(gateway: std::sync::Arc<PgGateway>, scope: ClassScope) -> Self {
        Self { gateway, scope }
    }

    /// Resolves a class code to its id within the configured scope.
    async fn find_class_id(&self, chat_id: &str, code: &str) -> Result<Option<Uuid>, StorageError> {
        let (statement, params): (&str, Vec<SqlParam>) = match self.scope {
            ClassScope::PerChat => (
                "SELECT id FROM classes WHERE code = $1 AND chat_id = $2",
                vec![
                    SqlParam::Text(code.to_string()),
                    SqlParam::Text(chat_id.to_string()),
                ],
            ),
            ClassScope::Global => (
                "SELECT id FROM classes WHERE code = $1",
                vec![SqlParam::Text(code.to_string())],
            ),
        };

        match self.gateway.query_one(statement, &params).await? {
            Some(row) => Ok(Some(row.try_get("id").map_err(StorageError::Query)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl AbsenceStore for PgRepository {
    async fn chat_exists(&self, chat_id: &str) -> Result<bool, StorageError> {
        let row = self
            .gateway
            .query_one(
                "SELECT 1 FROM chats WHERE id = $1",
                &[SqlParam::Text(chat_id.to_string())],
            )
            .await?;
        Ok(row.is_some())
    }

    async fn register_chat(
        &self,
        chat_id: &str,
        username: Option<&str>,
        first_name: Option<&str>,
    ) -> Result<(), StorageError> {
        if self.chat_exists(chat_id).await? {
            return Ok(());
        }

        let result = self
            .gateway
            .execute(
                "INSERT INTO chats (id, username, first_name, created_at) VALUES ($1, $2, $3, $4)",
                &[
                    SqlParam::Text(chat_id.to_string()),
                    SqlParam::OptText(username.map(str::to_string)),
                    SqlParam::OptText(first_name.map(str::to_string)),
                    SqlParam::Timestamp(Utc::now()),
                ],
            )
            .await;

        match result {
            Ok(_) => {
                log::info!("Registered new chat {}", chat_id);
                Ok(())
            }
            // Lost a race with a concurrent event for the same chat; the row
            // exists, which is all the caller wanted.
            Err(e) if e.is_unique_violation() => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn register_class(
        &self,
        chat_id: &str,
        code: &str,
        name: &str,
        semester: Option<&str>,
    ) -> Result<RegisterOutcome, StorageError> {
        if self.find_class_id(chat_id, code).await?.is_some() {
            return Ok(RegisterOutcome::AlreadyExists);
        }

        let result = self
            .gateway
            .execute(
                "INSERT INTO classes (id, code, name, semester, chat_id, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
                &[
                    SqlParam::Uuid(Uuid::new_v4()),
                    SqlParam::Text(code.to_string()),
                    SqlParam::Text(name.to_string()),
                    SqlParam::OptText(semester.map(str::to_string)),
                    SqlParam::Text(chat_id.to_string()),
                    SqlParam::Timestamp(Utc::now()),
                ],
            )
            .await;

        match result {
            Ok(_) => {
                log::info!("Registered class {} for chat {}", code, chat_id);
                Ok(RegisterOutcome::Inserted)
            }
            Err(e) if e.is_unique_violation() => Ok(RegisterOutcome::AlreadyExists),
            Err(e) => Err(e),
        }
    }

    async fn record_absence(&self, chat_id: &str, code: &str) -> Result<bool, StorageError> {
        let Some(class_id) = self.find_class_id(chat_id, code).await? else {
            return Ok(false);
        };

        self.gateway
            .execute(
                "INSERT INTO absences (chat_id, class_id, counter, updated_at) \
                 VALUES ($1, $2, 1, $3) \
                 ON CONFLICT (chat_id, class_id) \
                 DO UPDATE SET counter = absences.counter + 1, updated_at = $3",
                &[
                    SqlParam::Text(chat_id.to_string()),
                    SqlParam::Uuid(class_id),
                    SqlParam::Timestamp(Utc::now()),
                ],
            )
            .await?;
        Ok(true)
    }

    async fn remove_absence(&self, chat_id: &str, code: &str) -> Result<RemoveOutcome, StorageError> {
        let Some(class_id) = self.find_class_id(chat_id, code).await? else {
            return Ok(RemoveOutcome::NotFound);
        };

        let row = self
            .gateway
            .query_one(
                "SELECT counter FROM absences WHERE chat_id = $1 AND class_id = $2",
                &[
                    SqlParam::Text(chat_id.to_string()),
                    SqlParam::Uuid(class_id),
                ],
            )
            .await?;

        let counter: i64 = match row {
            Some(row) => {
                let value: i32 = row.try_get("counter").map_err(StorageError::Query)?;
                i64::from(value)
            }
            None => return Ok(RemoveOutcome::NotFound),
        };

        if counter == 0 {
            return Ok(RemoveOutcome::AlreadyZero);
        }

        // counter > 0 guard keeps the floor at zero even if another event
        // decremented in between.
        self.gateway
            .execute(
                "UPDATE absences SET counter = counter - 1, updated_at = $3 \
                 WHERE chat_id = $1 AND class_id = $2 AND counter > 0",
                &[
                    SqlParam::Text(chat_id.to_string()),
                    SqlParam::Uuid(class_id),
                    SqlParam::Timestamp(Utc::now()),
                ],
            )
            .await?;
        Ok(RemoveOutcome::Decremented(counter - 1))
    }

    async fn absence_count(&self, chat_id: &str, code: &str) -> Result<i64, StorageError> {
        let Some(class_id) = self.find_class_id(chat_id, code).await? else {
            return Ok(0);
        };

        let row = self
            .gateway
            .query_one(
                "SELECT counter FROM absences WHERE chat_id = $1 AND class_id = $2",
                &[
                    SqlParam::Text(chat_id.to_string()),
                    SqlParam::Uuid(class_id),
                ],
            )
            .await?;

        match row {
            Some(row) => {
                let value: i32 = row.try_get("counter").map_err(StorageError::Query)?;
                Ok(i64::from(value))
            }
            None => Ok(0),
        }
    }

    async fn total_absences(&self, chat_id: &str) -> Result<i64, StorageError> {
        let row = self
            .gateway
            .query_one(
                "SELECT COALESCE(SUM(counter), 0) AS total FROM absences WHERE chat_id = $1",
                &[SqlParam::Text(chat_id.to_string())],
            )
            .await?;

        match row {
            Some(row) => row.try_get("total").map_err(StorageError::Query),
            None => Ok(0),
        }
    }

    async fn absences_by_class(&self, chat_id: &str) -> Result<Vec<ClassAbsences>, StorageError> {
        let rows = self
            .gateway
            .query_all(
                "SELECT c.name, c.code, a.counter FROM absences a \
                 JOIN classes c ON c.id = a.class_id \
                 WHERE a.chat_id = $1 ORDER BY c.code",
                &[SqlParam::Text(chat_id.to_string())],
            )
            .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let counter: i32 = row.try_get("counter").map_err(StorageError::Query)?;
            entries.push(ClassAbsences {
                class_name: row.try_get("name").map_err(StorageError::Query)?,
                class_code: row.try_get("code").map_err(StorageError::Query)?,
                count: i64::from(counter),
            });
        }
        Ok(entries)
    }

    async fn all_classes(&self, chat_id: &str) -> Result<Vec<ClassRow>, StorageError> {
        let rows = self
            .gateway
            .query_all(
                "SELECT code, name, semester FROM classes WHERE chat_id = $1 ORDER BY code",
                &[SqlParam::Text(chat_id.to_string())],
            )
            .await?;

        let mut classes = Vec::with_capacity(rows.len());
        for row in rows {
            classes.push(ClassRow {
                code: row.try_get("code").map_err(StorageError::Query)?,
                name: row.try_get("name").map_err(StorageError::Query)?,
                semester: row.try_get("semester").map_err(StorageError::Query)?,
            });
        }
        Ok(classes)
    }
}

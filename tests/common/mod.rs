//! Shared test helpers: an in-memory repository for driving the dispatcher

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use faltas::storage::{
    AbsenceStore, ClassAbsences, ClassRow, RegisterOutcome, RemoveOutcome, StorageError,
};

#[derive(Clone)]
struct StoredClass {
    chat_id: String,
    code: String,
    name: String,
    semester: Option<String>,
}

/// In-memory `AbsenceStore` with per-chat class-code scope.
///
/// Mirrors the Postgres repository semantics closely enough for dispatcher
/// tests: idempotent registrations, lazily created counters, floor at zero.
/// Writes can be made to fail for error-path tests.
#[derive(Default)]
pub struct MemoryStore {
    chats: Mutex<HashMap<String, (Option<String>, Option<String>)>>,
    classes: Mutex<Vec<StoredClass>>,
    counters: Mutex<HashMap<(String, String), i64>>,
    /// How many chat rows were actually inserted (not idempotent re-checks)
    pub chat_inserts: AtomicUsize,
    /// When set, chat registration fails with a storage error
    pub fail_chat_writes: AtomicBool,
    /// When set, class/absence writes fail with a storage error
    pub fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn class_count(&self) -> usize {
        self.classes.lock().unwrap().len()
    }

    fn class_exists(&self, chat_id: &str, code: &str) -> bool {
        self.classes
            .lock()
            .unwrap()
            .iter()
            .any(|c| c.chat_id == chat_id && c.code == code)
    }

    fn simulated_error() -> StorageError {
        StorageError::Query(sqlx::Error::Protocol("simulated failure".into()))
    }
}

#[async_trait]
impl AbsenceStore for MemoryStore {
    async fn chat_exists(&self, chat_id: &str) -> Result<bool, StorageError> {
        Ok(self.chats.lock().unwrap().contains_key(chat_id))
    }

    async fn register_chat(
        &self,
        chat_id: &str,
        username: Option<&str>,
        first_name: Option<&str>,
    ) -> Result<(), StorageError> {
        if self.fail_chat_writes.load(Ordering::SeqCst) {
            return Err(Self::simulated_error());
        }
        let mut chats = self.chats.lock().unwrap();
        if !chats.contains_key(chat_id) {
            chats.insert(
                chat_id.to_string(),
                (username.map(str::to_string), first_name.map(str::to_string)),
            );
            self.chat_inserts.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn register_class(
        &self,
        chat_id: &str,
        code: &str,
        name: &str,
        semester: Option<&str>,
    ) -> Result<RegisterOutcome, StorageError> {
        if self.class_exists(chat_id, code) {
            return Ok(RegisterOutcome::AlreadyExists);
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::simulated_error());
        }
        self.classes.lock().unwrap().push(StoredClass {
            chat_id: chat_id.to_string(),
            code: code.to_string(),
            name: name.to_string(),
            semester: semester.map(str::to_string),
        });
        Ok(RegisterOutcome::Inserted)
    }

    async fn record_absence(&self, chat_id: &str, code: &str) -> Result<bool, StorageError> {
        if !self.class_exists(chat_id, code) {
            return Ok(false);
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::simulated_error());
        }
        let mut counters = self.counters.lock().unwrap();
        *counters
            .entry((chat_id.to_string(), code.to_string()))
            .or_insert(0) += 1;
        Ok(true)
    }

    async fn remove_absence(&self, chat_id: &str, code: &str) -> Result<RemoveOutcome, StorageError> {
        if !self.class_exists(chat_id, code) {
            return Ok(RemoveOutcome::NotFound);
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::simulated_error());
        }
        let mut counters = self.counters.lock().unwrap();
        match counters.get_mut(&(chat_id.to_string(), code.to_string())) {
            None => Ok(RemoveOutcome::NotFound),
            Some(counter) if *counter == 0 => Ok(RemoveOutcome::AlreadyZero),
            Some(counter) => {
                *counter -= 1;
                Ok(RemoveOutcome::Decremented(*counter))
            }
        }
    }

    async fn absence_count(&self, chat_id: &str, code: &str) -> Result<i64, StorageError> {
        Ok(self
            .counters
            .lock()
            .unwrap()
            .get(&(chat_id.to_string(), code.to_string()))
            .copied()
            .unwrap_or(0))
    }

    async fn total_absences(&self, chat_id: &str) -> Result<i64, StorageError> {
        Ok(self
            .counters
            .lock()
            .unwrap()
            .iter()
            .filter(|((chat, _), _)| chat == chat_id)
            .map(|(_, count)| count)
            .sum())
    }

    async fn absences_by_class(&self, chat_id: &str) -> Result<Vec<ClassAbsences>, StorageError> {
        let counters = self.counters.lock().unwrap();
        let classes = self.classes.lock().unwrap();

        let mut entries: Vec<ClassAbsences> = counters
            .iter()
            .filter(|((chat, _), _)| chat == chat_id)
            .filter_map(|((_, code), count)| {
                classes
                    .iter()
                    .find(|c| c.chat_id == chat_id && &c.code == code)
                    .map(|class| ClassAbsences {
                        class_name: class.name.clone(),
                        class_code: code.clone(),
                        count: *count,
                    })
            })
            .collect();
        entries.sort_by(|a, b| a.class_code.cmp(&b.class_code));
        Ok(entries)
    }

    async fn all_classes(&self, chat_id: &str) -> Result<Vec<ClassRow>, StorageError> {
        let classes = self.classes.lock().unwrap();
        let mut rows: Vec<ClassRow> = classes
            .iter()
            .filter(|c| c.chat_id == chat_id)
            .map(|c| ClassRow {
                code: c.code.clone(),
                name: c.name.clone(),
                semester: c.semester.clone(),
            })
            .collect();
        rows.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(rows)
    }
}

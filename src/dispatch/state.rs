//! Per-chat conversation state
//!
//! The guided class-registration flow keeps a small state machine per chat:
//! which answer we are waiting for, plus the draft collected so far. State
//! lives in process memory only — a restart loses in-flight conversations,
//! which is acceptable for a three-message flow.

use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Which answer the chat's next message provides
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    AwaitingClassId,
    AwaitingClassName,
    AwaitingSemester,
}

/// Partially-filled class registration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassDraft {
    pub code: Option<String>,
    pub name: Option<String>,
}

/// An open conversation for one chat
#[derive(Debug, Clone)]
pub struct Conversation {
    pub step: Step,
    pub draft: ClassDraft,
    touched: Instant,
}

impl Conversation {
    fn new() -> Self {
        Self {
            step: Step::AwaitingClassId,
            draft: ClassDraft::default(),
            touched: Instant::now(),
        }
    }
}

/// Conversation store keyed by chat id
///
/// An explicit object handed to the dispatcher at construction; chats with
/// no entry are implicitly idle. `DashMap` gives per-key locking, and the
/// dispatcher additionally serializes events per chat, so a conversation is
/// never mutated concurrently.
#[derive(Default)]
pub struct ConversationStore {
    inner: DashMap<String, Conversation>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the guided registration flow for a chat, replacing any
    /// previous conversation.
    pub fn start(&self, chat_id: &str) {
        self.inner.insert(chat_id.to_string(), Conversation::new());
    }

    /// Returns a snapshot of the chat's conversation, if one is open.
    pub fn get(&self, chat_id: &str) -> Option<Conversation> {
        self.inner.get(chat_id).map(|entry| entry.clone())
    }

    /// Advances the chat's conversation to the next step with an updated
    /// draft and refreshes its idle timer.
    pub fn advance(&self, chat_id: &str, step: Step, draft: ClassDraft) {
        self.inner.insert(
            chat_id.to_string(),
            Conversation {
                step,
                draft,
                touched: Instant::now(),
            },
        );
    }

    /// Removes the chat's conversation, reverting it to idle.
    pub fn clear(&self, chat_id: &str) {
        self.inner.remove(chat_id);
    }

    /// Drops conversations idle for longer than `ttl`. Returns how many
    /// were removed.
    ///
    /// Removals are tallied inside the sweep itself; comparing map sizes
    /// before and after would miscount when another task inserts mid-sweep.
    pub fn expire_idle(&self, ttl: Duration) -> usize {
        let mut removed = 0;
        self.inner.retain(|_, conv| {
            if conv.touched.elapsed() < ttl {
                return true;
            }
            removed += 1;
            false
        });
        removed
    }

    /// Number of open conversations.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

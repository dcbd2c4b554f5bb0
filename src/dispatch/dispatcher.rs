//! Conversation dispatcher
//!
//! Routes inbound text and selection events to handlers, owns the per-chat
//! conversation state, and turns repository faults into a fixed user-facing
//! message without losing the diagnostic detail in the log. Events for the
//! same chat are serialized so conversation transitions never race.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::dispatch::callback::CallbackAction;
use crate::dispatch::command::{Command, RegisterArgs};
use crate::dispatch::response::{Choice, Response};
use crate::dispatch::state::{ClassDraft, Conversation, ConversationStore, Step};
use crate::storage::{AbsenceStore, RegisterOutcome, RemoveOutcome, StorageError};

/// Fixed reply when a repository fault reaches a handler. Never contains
/// raw storage error text.
pub const MSG_FAILURE: &str = "Something went wrong on our side. Please try again later.";

/// Fixed reply for unknown command tokens and plain text.
pub const MSG_UNKNOWN: &str = "Command not recognized. Send /help to see what I can do.";

const MSG_CANCELLED: &str = "Okay, cancelled.";
const MSG_NO_CLASSES: &str = "You have no classes registered yet. Use /register_class to add one.";

const HELP_TEXT: &str = "Here is what I can do:\n\
    /register_class CODE | NAME | [SEMESTER] — register a class (or just /register_class for a guided flow)\n\
    /add_absence CODE — record one absence\n\
    /remove_absence CODE — remove one absence\n\
    /my_absences CODE — absences for one class\n\
    /total_absences — total absences with a per-class breakdown\n\
    /list_classes — your registered classes\n\
    /menu — this overview\n\
    /cancel — abort an ongoing registration";

/// Sender identity attached to an inbound text event
#[derive(Debug, Clone)]
pub struct ChatInfo {
    pub chat_id: String,
    pub username: Option<String>,
    pub first_name: Option<String>,
}

/// Message/command dispatcher with per-chat conversational state
///
/// Generic over the repository seam so tests can drive it with an in-memory
/// store. Never calls the transport layer; every handler returns a
/// [`Response`] descriptor for the adapter to render.
pub struct Dispatcher<S: AbsenceStore> {
    repo: Arc<S>,
    conversations: ConversationStore,
    /// Per-chat serialization: conversation state is only correct when
    /// events for one chat are processed in arrival order.
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl<S: AbsenceStore> Dispatcher<S> {
    pub fn new(repo: Arc<S>, conversations: ConversationStore) -> Self {
        Self {
            repo,
            conversations,
            locks: DashMap::new(),
        }
    }

    /// The conversation store, for the periodic expiry sweep.
    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    /// Drops per-chat locks no in-flight event holds. Returns how many were
    /// removed.
    ///
    /// Without this the lock map grows by one entry per chat id seen, for
    /// the process lifetime. A lock is safe to drop exactly when the map
    /// holds the only reference; a handler mid-event owns a clone, which
    /// keeps the entry alive. Run from the same periodic sweep that expires
    /// idle conversations.
    pub fn prune_chat_locks(&self) -> usize {
        let mut removed = 0;
        self.locks.retain(|_, lock| {
            if Arc::strong_count(lock) > 1 {
                return true;
            }
            removed += 1;
            false
        });
        removed
    }

    /// Handles an inbound text event and returns the reply descriptor.
    ///
    /// An open conversation takes precedence over command routing: the text
    /// is treated as the answer to the current step even if it looks like a
    /// command, except for the explicit /cancel and /menu escapes.
    pub async fn handle_text(&self, chat: &ChatInfo, text: &str) -> Response {
        let lock = self.chat_lock(&chat.chat_id);
        let _guard = lock.lock().await;

        if let Err(e) = self
            .repo
            .register_chat(
                &chat.chat_id,
                chat.username.as_deref(),
                chat.first_name.as_deref(),
            )
            .await
        {
            log::error!("Failed to register chat {}: {}", chat.chat_id, e);
            return Response::send(MSG_FAILURE);
        }

        if let Some(conversation) = self.conversations.get(&chat.chat_id) {
            if Command::is_conversation_escape(text) {
                self.conversations.clear(&chat.chat_id);
                return match Command::parse(text) {
                    Some(Command::Menu) => Response::send(HELP_TEXT),
                    _ => Response::send(MSG_CANCELLED),
                };
            }
            return self.continue_conversation(&chat.chat_id, conversation, text).await;
        }

        match Command::parse(text) {
            Some(command) => self.run_command(chat, command).await,
            None => Response::send(MSG_UNKNOWN),
        }
    }

    /// Handles a selection callback (`action:argument` data).
    pub async fn handle_callback(&self, chat_id: &str, data: &str) -> Response {
        let lock = self.chat_lock(chat_id);
        let _guard = lock.lock().await;

        match CallbackAction::parse(data) {
            Some(CallbackAction::Add(code)) => Response::edit(self.add_absence_text(chat_id, &code).await),
            Some(CallbackAction::Remove(code)) => {
                Response::edit(self.remove_absence_text(chat_id, &code).await)
            }
            Some(CallbackAction::Query(code)) => {
                Response::edit(self.absence_count_text(chat_id, &code).await)
            }
            None => {
                log::warn!("Unrecognized callback data from chat {}: {:?}", chat_id, data);
                Response::edit(MSG_UNKNOWN)
            }
        }
    }

    async fn run_command(&self, chat: &ChatInfo, command: Command) -> Response {
        let chat_id = &chat.chat_id;
        match command {
            Command::Start => {
                let name = chat.first_name.as_deref().unwrap_or("there");
                Response::send(format!(
                    "Hi {}! I track your class attendance. Register a class with /register_class, then log absences with /add_absence. Send /help for the full list.",
                    name
                ))
            }
            Command::Menu | Command::Help => Response::send(HELP_TEXT),
            Command::Cancel => Response::send("Nothing to cancel."),
            Command::RegisterClass(Some(args)) => self.register_class_response(chat_id, &args).await,
            Command::RegisterClass(None) => {
                self.conversations.start(chat_id);
                Response::send(
                    "Let's register a class. What's the class code? (e.g. CS101)\nSend /cancel to stop.",
                )
            }
            Command::AddAbsence(Some(code)) => Response::send(self.add_absence_text(chat_id, &code).await),
            Command::AddAbsence(None) => {
                self.selection(chat_id, CallbackAction::Add, "Which class do you want to add an absence to?")
                    .await
            }
            Command::RemoveAbsence(Some(code)) => {
                Response::send(self.remove_absence_text(chat_id, &code).await)
            }
            Command::RemoveAbsence(None) => {
                self.selection(
                    chat_id,
                    CallbackAction::Remove,
                    "Which class do you want to remove an absence from?",
                )
                .await
            }
            Command::MyAbsences(Some(code)) => Response::send(self.absence_count_text(chat_id, &code).await),
            Command::MyAbsences(None) => {
                self.selection(chat_id, CallbackAction::Query, "Which class do you want to check?")
                    .await
            }
            Command::TotalAbsences => self.total_absences_response(chat_id).await,
            Command::ListClasses => self.list_classes_response(chat_id).await,
        }
    }

    /// Advances the guided registration flow one step.
    ///
    /// The terminal step clears the conversation before the repository write
    /// is attempted, so a failed registration never leaves the chat stuck.
    async fn continue_conversation(
        &self,
        chat_id: &str,
        conversation: Conversation,
        text: &str,
    ) -> Response {
        let answer = text.trim();

        match conversation.step {
            Step::AwaitingClassId => {
                if answer.is_empty() {
                    return Response::send("Please send the class code (e.g. CS101).");
                }
                self.conversations.advance(
                    chat_id,
                    Step::AwaitingClassName,
                    ClassDraft {
                        code: Some(answer.to_string()),
                        name: None,
                    },
                );
                Response::send("Got it. What's the class name?")
            }
            Step::AwaitingClassName => {
                if answer.is_empty() {
                    return Response::send("Please send the class name.");
                }
                let mut draft = conversation.draft;
                draft.name = Some(answer.to_string());
                self.conversations.advance(chat_id, Step::AwaitingSemester, draft);
                Response::send("Which semester? (e.g. 2024.1) Send - to skip.")
            }
            Step::AwaitingSemester => {
                self.conversations.clear(chat_id);

                let (Some(code), Some(name)) = (conversation.draft.code, conversation.draft.name)
                else {
                    // Draft lost its earlier answers; bail out rather than
                    // insert a half-empty class.
                    log::error!("Conversation draft incomplete for chat {}", chat_id);
                    return Response::send(MSG_FAILURE);
                };

                let semester = match answer {
                    "" | "-" | "skip" => None,
                    s => Some(s.to_string()),
                };

                let args = RegisterArgs {
                    code,
                    name,
                    semester,
                };
                self.register_class_response(chat_id, &args).await
            }
        }
    }

    async fn register_class_response(&self, chat_id: &str, args: &RegisterArgs) -> Response {
        match self
            .repo
            .register_class(chat_id, &args.code, &args.name, args.semester.as_deref())
            .await
        {
            Ok(RegisterOutcome::Inserted) => {
                let semester_note = args
                    .semester
                    .as_deref()
                    .map(|s| format!(", semester {}", s))
                    .unwrap_or_default();
                Response::send(format!(
                    "Registered {} — {}{}.",
                    args.code, args.name, semester_note
                ))
            }
            Ok(RegisterOutcome::AlreadyExists) => {
                Response::send(format!("Class {} is already registered.", args.code))
            }
            Err(e) => self.failure("register_class", chat_id, e),
        }
    }

    async fn add_absence_text(&self, chat_id: &str, code: &str) -> String {
        match self.repo.record_absence(chat_id, code).await {
            Ok(true) => match self.repo.absence_count(chat_id, code).await {
                Ok(count) => format!("Absence recorded for {}. Total: {}.", code, count),
                Err(e) => {
                    log::error!("Failed to read count after recording absence for chat {}: {}", chat_id, e);
                    format!("Absence recorded for {}.", code)
                }
            },
            Ok(false) => format!(
                "Class {} not found. Register it first with /register_class.",
                code
            ),
            Err(e) => {
                log::error!("record_absence failed for chat {}: {}", chat_id, e);
                MSG_FAILURE.to_string()
            }
        }
    }

    async fn remove_absence_text(&self, chat_id: &str, code: &str) -> String {
        match self.repo.remove_absence(chat_id, code).await {
            Ok(RemoveOutcome::Decremented(left)) => {
                format!("Removed one absence from {}. Total: {}.", code, left)
            }
            Ok(RemoveOutcome::AlreadyZero) => format!("{} already has zero absences.", code),
            Ok(RemoveOutcome::NotFound) => format!("No absence record found for {}.", code),
            Err(e) => {
                log::error!("remove_absence failed for chat {}: {}", chat_id, e);
                MSG_FAILURE.to_string()
            }
        }
    }

    async fn absence_count_text(&self, chat_id: &str, code: &str) -> String {
        match self.repo.absence_count(chat_id, code).await {
            Ok(count) => format!("You have {} absences in {}.", count, code),
            Err(e) => {
                log::error!("absence_count failed for chat {}: {}", chat_id, e);
                MSG_FAILURE.to_string()
            }
        }
    }

    async fn total_absences_response(&self, chat_id: &str) -> Response {
        let total = match self.repo.total_absences(chat_id).await {
            Ok(total) => total,
            Err(e) => return self.failure("total_absences", chat_id, e),
        };

        if total == 0 {
            return Response::send("You have no recorded absences. Keep it up!");
        }

        let mut text = format!("You have {} absences in total:", total);
        match self.repo.absences_by_class(chat_id).await {
            Ok(entries) => {
                for entry in entries {
                    text.push_str(&format!(
                        "\n• {} — {}: {}",
                        entry.class_code, entry.class_name, entry.count
                    ));
                }
            }
            Err(e) => {
                // Total alone is still a useful answer
                log::error!("absences_by_class failed for chat {}: {}", chat_id, e);
            }
        }
        Response::send(text)
    }

    async fn list_classes_response(&self, chat_id: &str) -> Response {
        match self.repo.all_classes(chat_id).await {
            Ok(classes) if classes.is_empty() => Response::send(MSG_NO_CLASSES),
            Ok(classes) => {
                let mut text = String::from("Your classes:");
                for class in classes {
                    let semester_note = class
                        .semester
                        .as_deref()
                        .map(|s| format!(" ({})", s))
                        .unwrap_or_default();
                    text.push_str(&format!("\n• {} — {}{}", class.code, class.name, semester_note));
                }
                Response::send(text)
            }
            Err(e) => self.failure("list_classes", chat_id, e),
        }
    }

    /// Presents every class as a selectable option tagged with the
    /// originating action, so the follow-up callback routes straight to the
    /// right handler.
    async fn selection(
        &self,
        chat_id: &str,
        make_action: fn(String) -> CallbackAction,
        prompt: &str,
    ) -> Response {
        match self.repo.all_classes(chat_id).await {
            Ok(classes) if classes.is_empty() => Response::send(MSG_NO_CLASSES),
            Ok(classes) => {
                let choices = classes
                    .into_iter()
                    .map(|class| Choice {
                        label: format!("{} — {}", class.code, class.name),
                        data: make_action(class.code).encode(),
                    })
                    .collect();
                Response::send(prompt).with_choices(choices)
            }
            Err(e) => self.failure("class_selection", chat_id, e),
        }
    }

    fn failure(&self, operation: &str, chat_id: &str, error: StorageError) -> Response {
        log::error!("{} failed for chat {}: {}", operation, chat_id, error);
        Response::send(MSG_FAILURE)
    }

    fn chat_lock(&self, chat_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(chat_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

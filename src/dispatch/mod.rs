//! Dispatch: command routing, conversation state, response descriptors

pub mod callback;
pub mod command;
pub mod dispatcher;
pub mod response;
pub mod state;

pub use callback::CallbackAction;
pub use command::{Command, RegisterArgs};
pub use dispatcher::{ChatInfo, Dispatcher, MSG_FAILURE, MSG_UNKNOWN};
pub use response::{Choice, RenderMode, Response};
pub use state::{ClassDraft, ConversationStore, Step};

//! Response descriptors
//!
//! Handlers describe their reply instead of calling the transport, which
//! keeps the whole dispatch layer testable without a Telegram connection.

/// How the transport should deliver the reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Send a new message
    Send,
    /// Edit the message the event originated from (selection callbacks)
    Edit,
}

/// One selectable option, rendered as an inline keyboard button
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub label: String,
    /// Callback data in the `action:argument` wire format
    pub data: String,
}

/// A transport-agnostic reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub mode: RenderMode,
    pub text: String,
    pub choices: Option<Vec<Choice>>,
}

impl Response {
    /// A plain text reply sent as a new message.
    pub fn send(text: impl Into<String>) -> Self {
        Self {
            mode: RenderMode::Send,
            text: text.into(),
            choices: None,
        }
    }

    /// A plain text reply that edits the originating message.
    pub fn edit(text: impl Into<String>) -> Self {
        Self {
            mode: RenderMode::Edit,
            text: text.into(),
            choices: None,
        }
    }

    /// Attaches selectable options to the reply.
    pub fn with_choices(mut self, choices: Vec<Choice>) -> Self {
        self.choices = Some(choices);
        self
    }
}

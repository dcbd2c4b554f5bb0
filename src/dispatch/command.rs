//! Command parsing
//!
//! The first whitespace-delimited token of an inbound message resolves to a
//! closed set of command variants; only the absence of a match is a runtime
//! condition. A trailing `@botname` suffix on the token is accepted so
//! commands work in group chats.

/// Arguments for a direct (non-guided) class registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterArgs {
    pub code: String,
    pub name: String,
    pub semester: Option<String>,
}

/// The bot's command surface
///
/// Commands that take a class code carry `Option<String>`: `None` falls back
/// to the interactive selection flow instead of failing outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Menu,
    Help,
    Cancel,
    /// `/register_class CODE | NAME | [SEMESTER]`; `None` starts the guided flow
    RegisterClass(Option<RegisterArgs>),
    AddAbsence(Option<String>),
    RemoveAbsence(Option<String>),
    MyAbsences(Option<String>),
    TotalAbsences,
    ListClasses,
}

impl Command {
    /// Parses message text into a command. Returns `None` for unknown
    /// command tokens and for plain text.
    pub fn parse(text: &str) -> Option<Command> {
        let trimmed = text.trim();
        let mut parts = trimmed.splitn(2, char::is_whitespace);
        let token = parts.next()?;
        let rest = parts.next().unwrap_or("").trim();

        // "/add_absence@faltasbot CS101" is the same command
        let name = token.split('@').next().unwrap_or(token);

        match name {
            "/start" => Some(Command::Start),
            "/menu" => Some(Command::Menu),
            "/help" => Some(Command::Help),
            "/cancel" => Some(Command::Cancel),
            "/register_class" => Some(Command::RegisterClass(parse_register_args(rest))),
            "/add_absence" => Some(Command::AddAbsence(first_arg(rest))),
            "/remove_absence" => Some(Command::RemoveAbsence(first_arg(rest))),
            "/my_absences" => Some(Command::MyAbsences(first_arg(rest))),
            "/total_absences" => Some(Command::TotalAbsences),
            "/list_classes" => Some(Command::ListClasses),
            _ => None,
        }
    }

    /// True for the commands that escape an open conversation.
    pub fn is_conversation_escape(text: &str) -> bool {
        matches!(
            Command::parse(text),
            Some(Command::Cancel) | Some(Command::Menu)
        )
    }
}

/// Parses pipe-delimited `CODE | NAME | [SEMESTER]` arguments.
///
/// Anything short of a code and a name falls back to the guided flow.
fn parse_register_args(rest: &str) -> Option<RegisterArgs> {
    if rest.is_empty() {
        return None;
    }

    let fields: Vec<&str> = rest.split('|').map(str::trim).collect();
    let code = fields.first().copied().unwrap_or("");
    let name = fields.get(1).copied().unwrap_or("");
    if code.is_empty() || name.is_empty() {
        return None;
    }

    let semester = fields
        .get(2)
        .map(|s| s.to_string())
        .filter(|s| !s.is_empty());

    Some(RegisterArgs {
        code: code.to_string(),
        name: name.to_string(),
        semester,
    })
}

fn first_arg(rest: &str) -> Option<String> {
    rest.split_whitespace().next().map(str::to_string)
}

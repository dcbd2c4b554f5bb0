//! Callback data parsing
//!
//! Selection buttons carry `action:argument` strings — the compact wire
//! format the transport's data-size limit allows. They are parsed into a
//! typed action at the boundary so handlers never re-derive intent from
//! free text.

/// A parsed selection callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    /// Record one absence for the class code
    Add(String),
    /// Remove one absence for the class code
    Remove(String),
    /// Show the absence count for the class code
    Query(String),
}

impl CallbackAction {
    /// Parses `action:argument` callback data. Unknown actions and missing
    /// arguments yield `None`.
    pub fn parse(data: &str) -> Option<CallbackAction> {
        let (action, argument) = data.split_once(':')?;
        if argument.is_empty() {
            return None;
        }

        match action {
            "add" => Some(CallbackAction::Add(argument.to_string())),
            "remove" => Some(CallbackAction::Remove(argument.to_string())),
            "query" => Some(CallbackAction::Query(argument.to_string())),
            _ => None,
        }
    }

    /// Encodes the action back into callback data for a selection button.
    pub fn encode(&self) -> String {
        match self {
            CallbackAction::Add(code) => format!("add:{}", code),
            CallbackAction::Remove(code) => format!("remove:{}", code),
            CallbackAction::Query(code) => format!("query:{}", code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_actions() {
        assert_eq!(
            CallbackAction::parse("add:CS101"),
            Some(CallbackAction::Add("CS101".to_string()))
        );
        assert_eq!(
            CallbackAction::parse("remove:CS101"),
            Some(CallbackAction::Remove("CS101".to_string()))
        );
        assert_eq!(
            CallbackAction::parse("query:MA202"),
            Some(CallbackAction::Query("MA202".to_string()))
        );
    }

    #[test]
    fn test_parse_rejects_malformed_data() {
        assert_eq!(CallbackAction::parse("add"), None);
        assert_eq!(CallbackAction::parse("add:"), None);
        assert_eq!(CallbackAction::parse("drop:CS101"), None);
        assert_eq!(CallbackAction::parse(""), None);
    }

    #[test]
    fn test_encode_round_trips() {
        let action = CallbackAction::Add("CS101".to_string());
        assert_eq!(CallbackAction::parse(&action.encode()), Some(action));
    }

    #[test]
    fn test_parse_keeps_colons_in_argument() {
        // Only the first colon separates action from argument
        assert_eq!(
            CallbackAction::parse("query:CS:101"),
            Some(CallbackAction::Query("CS:101".to_string()))
        );
    }
}

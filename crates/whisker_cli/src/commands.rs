//! REPL command parsing and outcome rendering.

use whisker_core::{ErrorLogEntry, InteractionType};
use whisker_reasoning::{FailureKind, InteractionOutcome};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Interact(InteractionType, String),
    Status,
    Balance,
    Errors,
    Help,
    Quit,
}

pub const HELP: &str = "\
Commands:
  pet [how]        pet the cat
  feed [what]      feed the cat
  play [with what] play with the cat
  chat <text>      talk to the cat
  think            let the cat have a thought
  status           show the cat's state
  balance          show your credits
  errors           show recent errors
  help             show this help
  quit             leave";

impl Command {
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let interact = |kind| Ok(Command::Interact(kind, rest.to_string()));
        match word.to_lowercase().as_str() {
            "pet" => interact(InteractionType::Pet),
            "feed" => interact(InteractionType::Feed),
            "play" => interact(InteractionType::Play),
            "chat" | "say" => interact(InteractionType::Chat),
            "think" => Ok(Command::Interact(InteractionType::AutonomousThought, String::new())),
            "status" => Ok(Command::Status),
            "balance" => Ok(Command::Balance),
            "errors" => Ok(Command::Errors),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" => Ok(Command::Quit),
            "" => Err(String::new()),
            other => Err(format!("unknown command '{}', try 'help'", other)),
        }
    }
}

pub fn render_outcome(name: &str, outcome: &InteractionOutcome) -> String {
    match outcome {
        InteractionOutcome::Completed { response, state, .. } => {
            format!("{}: {}\n  [{}]", name, response, state.describe())
        }
        InteractionOutcome::ValidationFailed { status, reason, .. } => {
            if reason.is_empty() {
                format!("({} ignores that: {})", name, status)
            } else {
                format!("({} ignores that: {}, {})", name, status, reason)
            }
        }
        InteractionOutcome::Failed {
            kind: FailureKind::InsufficientFunds,
            ..
        } => "(not enough credits)".to_string(),
        InteractionOutcome::Failed { interaction_id, .. } => {
            format!("(something went wrong with {}, see 'errors')", interaction_id)
        }
    }
}

pub fn render_error(entry: &ErrorLogEntry) -> String {
    format!(
        "{} {} {}: {}",
        entry.created_at, entry.error_type, entry.entity_id, entry.error
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use whisker_core::{CharacterState, ValidationStatus};
    use uuid::Uuid;

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            Command::parse("chat  hello kitty "),
            Ok(Command::Interact(InteractionType::Chat, "hello kitty".to_string()))
        );
        assert_eq!(
            Command::parse("FEED"),
            Ok(Command::Interact(InteractionType::Feed, String::new()))
        );
        assert_eq!(
            Command::parse("think about it"),
            Ok(Command::Interact(InteractionType::AutonomousThought, String::new()))
        );
        assert_eq!(Command::parse("exit"), Ok(Command::Quit));
        assert!(Command::parse("bark").is_err());
        assert_eq!(Command::parse("   "), Err(String::new()));
    }

    #[test]
    fn test_render_outcomes() {
        let id = Uuid::new_v4();
        let done = InteractionOutcome::Completed {
            interaction_id: id,
            response: "*purr*".to_string(),
            state: CharacterState::default(),
        };
        assert!(render_outcome("Mochi", &done).starts_with("Mochi: *purr*"));

        let rejected = InteractionOutcome::ValidationFailed {
            interaction_id: id,
            status: ValidationStatus::Flagged,
            reason: "rude".to_string(),
        };
        assert!(render_outcome("Mochi", &rejected).contains("rude"));

        let broke = InteractionOutcome::Failed {
            interaction_id: id,
            kind: FailureKind::InsufficientFunds,
        };
        assert_eq!(render_outcome("Mochi", &broke), "(not enough credits)");
    }
}

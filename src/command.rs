//! Operator command language for `tmuxdash watch`.
//!
//! One command per line. `keys` takes the rest of the line verbatim; `do`
//! takes `key=value` pairs where values starting with `[`, `{` or a digit are
//! parsed as JSON.

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum OperatorCommand {
    Session(String),
    Window(String),
    Pane(String),
    /// Type text into the target pane (literal).
    Keys(String),
    /// Send the named tmux keys, e.g. `Enter`, `C-c`.
    Press(Vec<String>),
    Do {
        action: String,
        payload: Map<String, Value>,
    },
    /// Hold scheduled polls (the operator is composing input).
    Pause,
    Resume,
    Refresh,
    Login {
        user: String,
        password: String,
    },
    Logout,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command '{0}', try 'help'")]
    Unknown(String),
    #[error("'{command}' needs {argument}")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },
    #[error("expected key=value, got '{0}'")]
    BadPair(String),
}

pub const HELP: &str = "\
commands:
  session <name>            select a session
  window <id>               select a window of the current session
  pane <id>                 select a pane
  keys <text>               type text into the target pane (empty clears the line)
  enter | press <key>...    send named keys (Enter, C-c, ...)
  do <action> [k=v ...]     dispatch any backend action
  pause | resume            hold or release scheduled polls
  refresh                   poll now
  login <user> <password>
  logout
  quit";

fn parse_value(raw: &str) -> Value {
    let looks_json = raw.starts_with('[')
        || raw.starts_with('{')
        || raw.starts_with(|c: char| c.is_ascii_digit());
    if looks_json {
        if let Ok(value) = serde_json::from_str(raw) {
            return value;
        }
    }
    Value::String(raw.to_string())
}

/// Parse `key=value` words into an action payload.
pub fn parse_pairs<'a>(words: impl Iterator<Item = &'a str>) -> Result<Map<String, Value>, CommandError> {
    let mut payload = Map::new();
    for word in words {
        let (key, value) = word
            .split_once('=')
            .filter(|(k, _)| !k.is_empty())
            .ok_or_else(|| CommandError::BadPair(word.to_string()))?;
        payload.insert(key.to_string(), parse_value(value));
    }
    Ok(payload)
}

pub fn parse(line: &str) -> Result<OperatorCommand, CommandError> {
    let line = line.trim();
    let (head, rest) = line
        .split_once(char::is_whitespace)
        .map(|(h, r)| (h, r.trim_start()))
        .unwrap_or((line, ""));
    let mut words = rest.split_whitespace();
    let mut arg = |command: &'static str, argument: &'static str| {
        words
            .next()
            .map(str::to_string)
            .ok_or(CommandError::MissingArgument { command, argument })
    };

    match head {
        "" => Err(CommandError::Empty),
        "session" | "s" => Ok(OperatorCommand::Session(arg("session", "a name")?)),
        "window" | "w" => Ok(OperatorCommand::Window(arg("window", "a window id")?)),
        "pane" | "p" => Ok(OperatorCommand::Pane(arg("pane", "a pane id")?)),
        "keys" | "k" => Ok(OperatorCommand::Keys(rest.to_string())),
        "enter" => Ok(OperatorCommand::Press(vec!["Enter".into()])),
        "press" => {
            let keys: Vec<String> = rest.split_whitespace().map(str::to_string).collect();
            if keys.is_empty() {
                return Err(CommandError::MissingArgument {
                    command: "press",
                    argument: "at least one key",
                });
            }
            Ok(OperatorCommand::Press(keys))
        }
        "do" => {
            let action = arg("do", "an action name")?;
            let payload = parse_pairs(rest.split_whitespace().skip(1))?;
            Ok(OperatorCommand::Do { action, payload })
        }
        "pause" => Ok(OperatorCommand::Pause),
        "resume" => Ok(OperatorCommand::Resume),
        "refresh" | "r" => Ok(OperatorCommand::Refresh),
        "login" => {
            let user = arg("login", "a user and a password")?;
            let password = arg("login", "a password")?;
            Ok(OperatorCommand::Login { user, password })
        }
        "logout" => Ok(OperatorCommand::Logout),
        "help" | "?" => Ok(OperatorCommand::Help),
        "quit" | "q" | "exit" => Ok(OperatorCommand::Quit),
        other => Err(CommandError::Unknown(other.to_string())),
    }
}

//! Line input parsing.
//!
//! Plain lines are messages. Lines starting with `/` are commands; `//`
//! escapes a message that itself starts with a slash.

use rendezvous_app::UserInput;

/// Help text printed by `/help`.
pub const HELP: &str = "\
commands:
  /reconnect    reconnect now
  /disconnect   close the connection
  /clear        clear the event log
  /login        connect with the stored token
  /logout       disconnect and stop reconnecting
  /quit         leave the conversation and exit
  //text        send a message starting with '/'";

/// Parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Forward to the runtime
    Input(UserInput),
    /// Print [`HELP`]
    Help,
    /// Unrecognised command
    Unknown(String),
}

/// Parse one line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Option<Command> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return None;
    }

    if let Some(escaped) = line.strip_prefix("//") {
        return Some(Command::Input(UserInput::Send(format!("/{escaped}"))));
    }

    let Some(cmd) = line.strip_prefix('/') else {
        return Some(Command::Input(UserInput::Send(line.to_string())));
    };

    let name = cmd.split_whitespace().next().unwrap_or("");
    let input = match name {
        "quit" | "q" => UserInput::Quit,
        "reconnect" => UserInput::Reconnect,
        "disconnect" => UserInput::Disconnect,
        "clear" => UserInput::ClearEvents,
        "login" => UserInput::Login,
        "logout" => UserInput::Logout,
        "help" | "h" | "?" => return Some(Command::Help),
        other => return Some(Command::Unknown(other.to_string())),
    };
    Some(Command::Input(input))
}

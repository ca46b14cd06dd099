//! Parsing of the line typed at the chat prompt.
//!
//! Three slash commands are recognised; everything else is sent to the
//! channel as typed, including unknown `/words`.

use crate::meshtastic::{parse_node_id, BROADCAST_ADDR};

/// Shown when `/msg` is missing its id or its text.
pub const MSG_USAGE: &str = "Invalid command format. Use '/msg !nodeId message'";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Help,
    Nodes,
    Quit,
    /// `/msg !nodeId text`
    Private { dest: u32, dest_id: String, text: String },
    Broadcast(String),
    /// Rejected input, with the reason to show the user
    Invalid(String),
    /// Blank line; nothing to do
    Empty,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CommandParser;

impl CommandParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, raw: &str) -> ChatCommand {
        let line = raw.trim();
        if line.is_empty() {
            return ChatCommand::Empty;
        }
        if line.eq_ignore_ascii_case("/help") {
            return ChatCommand::Help;
        }
        if line.eq_ignore_ascii_case("/nodes") {
            return ChatCommand::Nodes;
        }
        if line.eq_ignore_ascii_case("/quit") {
            return ChatCommand::Quit;
        }
        if let Some(rest) = strip_msg_keyword(line) {
            return parse_private(rest);
        }
        ChatCommand::Broadcast(line.to_string())
    }
}

/// Returns the text after `/msg` when the line starts with that keyword as a whole word.
fn strip_msg_keyword(line: &str) -> Option<&str> {
    let head = line.get(..4)?;
    if !head.eq_ignore_ascii_case("/msg") {
        return None;
    }
    let rest = &line[4..];
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(rest.trim_start())
    } else {
        None
    }
}

fn parse_private(rest: &str) -> ChatCommand {
    let (id, text) = match rest.split_once(char::is_whitespace) {
        Some((id, text)) => (id, text.trim_start()),
        None => (rest, ""),
    };
    if id.is_empty() || text.is_empty() {
        return ChatCommand::Invalid(MSG_USAGE.to_string());
    }
    // Only a single node can be addressed; `^all` and `!ffffffff` are broadcasts.
    let dest = id
        .starts_with('!')
        .then(|| parse_node_id(id))
        .flatten()
        .filter(|&num| num != BROADCAST_ADDR);
    match dest {
        Some(dest) => ChatCommand::Private {
            dest,
            dest_id: id.to_string(),
            text: text.to_string(),
        },
        None => ChatCommand::Invalid(format!(
            "Unknown node id '{}'. Node ids look like !a1b2c3d4",
            id
        )),
    }
}

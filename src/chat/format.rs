//! Text layout of every line the chat view prints.

use super::buffer::ChatLine;
use crate::meshtastic::{format_node_id, NodeDb, TextEvent, UNKNOWN_NAME};
use chrono::Local;
use std::fmt::Write;

pub const LOADING_TEXT: &str = "Fetching node list from radio...";

pub const HELP_LINES: &[&str] = &[
    "Available commands:",
    "/help - Show this help message",
    "/nodes - List known nodes",
    "/msg !nodeId message - Send a private message",
    "/quit - Leave the chat",
    "PgUp/PgDn - Scroll history, Ctrl-L - Jump to newest",
    "Ctrl-C - Quit",
    "",
    "(Press any key to return to chat)",
];

/// Used when the configured timestamp format cannot be rendered.
pub const FALLBACK_TIMESTAMP_FORMAT: &str = "%H:%M:%S";

/// Current local time rendered with a chrono format string.
pub fn timestamp(format: &str) -> String {
    let now = Local::now();
    let mut out = String::new();
    // chrono reports bad strftime specifiers as a fmt::Error at render time.
    if write!(out, "{}", now.format(format)).is_err() {
        out.clear();
        let _ = write!(out, "{}", now.format(FALLBACK_TIMESTAMP_FORMAT));
    }
    out
}

/// Prompt shown before the input, e.g. `AB:`.
pub fn prompt(short_name: Option<&str>) -> String {
    match short_name.map(str::trim).filter(|s| !s.is_empty()) {
        Some(name) => format!("{}:", name),
        None => format!("{}:", UNKNOWN_NAME),
    }
}

/// One chat line per line of the received text.
pub fn incoming(ts: &str, event: &TextEvent, nodes: &NodeDb) -> Vec<ChatLine> {
    let sender = nodes.short_name(event.from);
    if event.is_private {
        let dest_id = format_node_id(event.to);
        let dest_short = nodes.short_name(event.to);
        event
            .text
            .lines()
            .map(|line| {
                ChatLine::private(format!(
                    "{} {} to {} ({}) 📩 {}",
                    ts, sender, dest_id, dest_short, line
                ))
            })
            .collect()
    } else {
        event
            .text
            .lines()
            .map(|line| ChatLine::normal(format!("{} {}: {}", ts, sender, line)))
            .collect()
    }
}

/// Local echo of a broadcast we sent.
pub fn outgoing_broadcast(ts: &str, prompt: &str, text: &str) -> ChatLine {
    ChatLine::normal(format!("{} {} {}", ts, prompt, text))
}

/// Local echo of a direct message we sent.
pub fn outgoing_private(ts: &str, prompt: &str, dest_id: &str, dest_short: &str, text: &str) -> ChatLine {
    ChatLine::private(format!(
        "{} {} to {} ({}) 📩 {}",
        ts, prompt, dest_id, dest_short, text
    ))
}

/// `/nodes` output, most recently reported node first.
pub fn node_list(nodes: &NodeDb) -> Vec<ChatLine> {
    if nodes.is_empty() {
        return vec![ChatLine::system("No nodes known yet")];
    }
    nodes
        .iter()
        .rev()
        .map(|n| ChatLine::system(format!("Node {}: {}", n.user_id, n.display_short())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::buffer::LineKind;
    use crate::meshtastic::{Node, BROADCAST_ADDR};

    fn db() -> NodeDb {
        let mut db = NodeDb::new();
        db.upsert(Node::new(0x0a, "ME", "Me"));
        db.upsert(Node::new(0x0b, "BOB", "Bob"));
        db
    }

    #[test]
    fn bad_timestamp_format_falls_back() {
        let ts = timestamp("%Q");
        assert_eq!(ts.len(), 8);
        assert_eq!(ts.matches(':').count(), 2);
        assert_eq!(timestamp("[%H]").len(), 4);
    }

    #[test]
    fn broadcast_lines_split_on_newlines() {
        let ev = TextEvent {
            from: 0x0b,
            to: BROADCAST_ADDR,
            channel: 0,
            text: "hello\r\nworld".into(),
            is_private: false,
        };
        let lines = incoming("12:00:00", &ev, &db());
        assert_eq!(
            lines,
            vec![
                ChatLine::normal("12:00:00 BOB: hello"),
                ChatLine::normal("12:00:00 BOB: world"),
            ]
        );
    }

    #[test]
    fn private_lines_name_both_ends() {
        let ev = TextEvent {
            from: 0x0b,
            to: 0x0a,
            channel: 0,
            text: "psst".into(),
            is_private: true,
        };
        let lines = incoming("09:15:02", &ev, &db());
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].kind, LineKind::Private);
        assert_eq!(lines[0].text, "09:15:02 BOB to !0000000a (ME) 📩 psst");
    }

    #[test]
    fn unknown_sender_and_prompt_fallback() {
        let ev = TextEvent {
            from: 0x99,
            to: BROADCAST_ADDR,
            channel: 0,
            text: "hi".into(),
            is_private: false,
        };
        assert_eq!(incoming("t", &ev, &db())[0].text, "t Unknown: hi");
        assert_eq!(prompt(None), "Unknown:");
        assert_eq!(prompt(Some("ME")), "ME:");
    }

    #[test]
    fn echo_formats() {
        assert_eq!(outgoing_broadcast("t", "ME:", "hey").text, "t ME: hey");
        assert_eq!(
            outgoing_private("t", "ME:", "!0000000b", "BOB", "yo").text,
            "t ME: to !0000000b (BOB) 📩 yo"
        );
    }

    #[test]
    fn node_list_is_reversed() {
        let lines = node_list(&db());
        assert_eq!(lines[0].text, "Node !0000000b: BOB");
        assert_eq!(lines[1].text, "Node !0000000a: ME");
        assert_eq!(node_list(&NodeDb::new())[0].text, "No nodes known yet");
    }
}

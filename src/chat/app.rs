//! Chat session state, driven by key presses and radio events.
//!
//! [`ChatApp`] owns everything the screen shows. It never touches the radio
//! itself: sends come back to the caller as [`AppAction::Send`] and the
//! outcome is reported through [`ChatApp::note_send_result`].

use super::buffer::{ChatLine, MessageBuffer};
use super::command::{ChatCommand, CommandParser};
use super::format;
use super::input::InputLine;
use crate::config::Config;
use crate::logutil::escape_log;
use crate::meshtastic::{format_node_id, DeliveryOutcome, NodeDb, RadioEvent, SendError, MAX_TEXT_BYTES};
use log::{debug, info};
use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Chat,
    Help,
}

/// A message the user asked to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    /// None for a channel broadcast
    pub dest: Option<u32>,
    pub dest_id: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppAction {
    None,
    Redraw,
    Send(Outgoing),
    Quit,
}

/// Ctrl-C or Ctrl-D, which leave the client from any screen.
pub fn is_interrupt(key: &KeyEvent) -> bool {
    key.kind != KeyEventKind::Release
        && key.modifiers.contains(KeyModifiers::CONTROL)
        && matches!(key.code, KeyCode::Char('c') | KeyCode::Char('d'))
}

/// Oldest unconfirmed private sends are forgotten past this many.
const MAX_PENDING_DMS: usize = 32;

pub struct ChatApp {
    nodes: NodeDb,
    my_node: Option<u32>,
    channel: u32,
    buffer: MessageBuffer,
    input: InputLine,
    screen: Screen,
    parser: CommandParser,
    timestamp_format: String,
    viewport_height: usize,
    /// Direct messages awaiting a routing result, by packet id
    /// Private sends awaiting a routing reply, oldest first.
    pending_dms: VecDeque<(u32, String)>,
    link_up: bool,
}

impl ChatApp {
    pub fn new(nodes: NodeDb, my_node: Option<u32>, config: &Config) -> Self {
        Self {
            nodes,
            my_node,
            channel: config.meshtastic.channel,
            buffer: MessageBuffer::new(config.chat.history_lines),
            input: InputLine::new(),
            screen: Screen::Chat,
            parser: CommandParser::new(),
            timestamp_format: config.chat.timestamp_format.clone(),
            viewport_height: 20,
            pending_dms: VecDeque::new(),
            link_up: true,
        }
    }

    pub fn screen(&self) -> Screen {
        self.screen
    }

    pub fn buffer(&self) -> &MessageBuffer {
        &self.buffer
    }

    pub fn input(&self) -> &InputLine {
        &self.input
    }

    pub fn nodes(&self) -> &NodeDb {
        &self.nodes
    }

    pub fn channel(&self) -> u32 {
        self.channel
    }

    pub fn link_up(&self) -> bool {
        self.link_up
    }

    /// Our own short name when known, else the first node the radio reported.
    pub fn prompt(&self) -> String {
        let node = self
            .my_node
            .and_then(|n| self.nodes.get(n))
            .or_else(|| self.nodes.iter().next());
        format::prompt(node.map(|n| n.display_short()))
    }

    /// Height of the message pane, used for page-sized scrolling.
    pub fn set_viewport_height(&mut self, height: usize) {
        self.viewport_height = height.max(1);
    }

    pub fn push_system(&mut self, text: impl Into<String>) {
        self.buffer.push(ChatLine::system(text));
    }

    fn now(&self) -> String {
        format::timestamp(&self.timestamp_format)
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> AppAction {
        if key.kind == KeyEventKind::Release {
            return AppAction::None;
        }
        if is_interrupt(&key) {
            return AppAction::Quit;
        }
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        if self.screen == Screen::Help {
            // Any key dismisses help and is otherwise ignored.
            self.screen = Screen::Chat;
            return AppAction::Redraw;
        }

        let page = self.viewport_height.saturating_sub(1).max(1);
        match key.code {
            KeyCode::Enter => return self.submit(),
            KeyCode::Char('l') if ctrl => self.buffer.scroll_to_bottom(),
            KeyCode::Char('u') if ctrl => self.input.clear(),
            KeyCode::Char(_) if ctrl => return AppAction::None,
            KeyCode::Char(c) => self.input.insert(c),
            KeyCode::Backspace => self.input.backspace(),
            KeyCode::Delete => self.input.delete(),
            KeyCode::Left => self.input.move_left(),
            KeyCode::Right => self.input.move_right(),
            KeyCode::Home => self.input.home(),
            KeyCode::End => self.input.end(),
            KeyCode::Up => self.input.history_prev(),
            KeyCode::Down => self.input.history_next(),
            KeyCode::PageUp => self.buffer.scroll_up(page, self.viewport_height),
            KeyCode::PageDown => self.buffer.scroll_down(page),
            KeyCode::Esc => self.input.clear(),
            _ => return AppAction::None,
        }
        AppAction::Redraw
    }

    /// Parse and act on the current input line.
    pub fn submit(&mut self) -> AppAction {
        let line = self.input.take();
        let command = self.parser.parse(&line);
        debug!("Input '{}' parsed as {:?}", escape_log(&line), command);
        match command {
            ChatCommand::Empty => AppAction::None,
            ChatCommand::Quit => AppAction::Quit,
            ChatCommand::Help => {
                self.screen = Screen::Help;
                AppAction::Redraw
            }
            ChatCommand::Nodes => {
                let lines = format::node_list(&self.nodes);
                self.buffer.extend(lines);
                self.buffer.scroll_to_bottom();
                AppAction::Redraw
            }
            ChatCommand::Invalid(reason) => {
                self.push_system(reason);
                self.buffer.scroll_to_bottom();
                AppAction::Redraw
            }
            ChatCommand::Private { dest, dest_id, text } => {
                if !self.can_send(&text) {
                    return AppAction::Redraw;
                }
                let ts = self.now();
                let echo = format::outgoing_private(
                    &ts,
                    &self.prompt(),
                    &dest_id,
                    self.nodes.short_name(dest),
                    &text,
                );
                self.buffer.push(echo);
                self.buffer.scroll_to_bottom();
                AppAction::Send(Outgoing {
                    dest: Some(dest),
                    dest_id: Some(dest_id),
                    text,
                })
            }
            ChatCommand::Broadcast(text) => {
                if !self.can_send(&text) {
                    return AppAction::Redraw;
                }
                let ts = self.now();
                let echo = format::outgoing_broadcast(&ts, &self.prompt(), &text);
                self.buffer.push(echo);
                self.buffer.scroll_to_bottom();
                AppAction::Send(Outgoing {
                    dest: None,
                    dest_id: None,
                    text,
                })
            }
        }
    }

    fn can_send(&mut self, text: &str) -> bool {
        if !self.link_up {
            self.push_system("Radio link is down, message not sent");
        } else if text.len() > MAX_TEXT_BYTES {
            self.push_system(format!(
                "Message not sent: {} bytes is over the {} byte limit",
                text.len(),
                MAX_TEXT_BYTES
            ));
        } else {
            return true;
        }
        self.buffer.scroll_to_bottom();
        false
    }

    /// Record what happened to a send returned from [`AppAction::Send`].
    pub fn note_send_result(&mut self, out: &Outgoing, result: Result<u32, SendError>) {
        match result {
            Ok(id) => {
                if let Some(dest_id) = &out.dest_id {
                    if self.pending_dms.len() == MAX_PENDING_DMS {
                        self.pending_dms.pop_front();
                    }
                    self.pending_dms.push_back((id, dest_id.clone()));
                }
            }
            Err(e) => self.push_system(format!("Message not sent: {}", e)),
        }
    }

    /// Private messages still waiting for a delivery report.
    pub fn pending_deliveries(&self) -> usize {
        self.pending_dms.len()
    }

    fn take_pending(&mut self, id: u32) -> Option<String> {
        let pos = self.pending_dms.iter().position(|(pending, _)| *pending == id)?;
        self.pending_dms.remove(pos).map(|(_, dest_id)| dest_id)
    }

    /// Apply a radio event. Returns true when the screen needs redrawing.
    pub fn handle_radio_event(&mut self, event: RadioEvent) -> bool {
        match event {
            RadioEvent::MyInfo(num) => {
                self.my_node = Some(num);
                true
            }
            RadioEvent::Node(node) => {
                self.nodes.upsert(node);
                true
            }
            RadioEvent::ConfigComplete(_) => false,
            RadioEvent::Text(text) => {
                if text.channel != self.channel {
                    debug!(
                        "Ignoring text from {} on channel {}",
                        format_node_id(text.from),
                        text.channel
                    );
                    return false;
                }
                let ts = self.now();
                let lines = format::incoming(&ts, &text, &self.nodes);
                self.buffer.extend(lines);
                true
            }
            RadioEvent::Delivery { id, outcome } => match self.take_pending(id) {
                Some(dest_id) => {
                    let note = match outcome {
                        DeliveryOutcome::Acked => format!("Delivered to {}", dest_id),
                        DeliveryOutcome::Failed(reason) => {
                            format!("Delivery to {} failed: {}", dest_id, reason)
                        }
                    };
                    self.push_system(note);
                    true
                }
                None => false,
            },
            RadioEvent::SendFailed { id, reason } => {
                self.take_pending(id);
                self.push_system(format!("Message not sent: {}", reason));
                self.buffer.scroll_to_bottom();
                true
            }
            RadioEvent::Log(line) => {
                debug!("radio: {}", escape_log(&line));
                false
            }
            RadioEvent::Disconnected(reason) => {
                info!("Radio disconnected: {}", reason);
                self.link_up = false;
                self.push_system(format!("Radio link lost: {}", reason));
                if !self.pending_dms.is_empty() {
                    self.push_system(format!(
                        "{} private message(s) were not confirmed",
                        self.pending_dms.len()
                    ));
                    self.pending_dms.clear();
                }
                true
            }
        }
    }
}

//! Chat front-end logic independent of the terminal.
//!
//! - [`command`] - parsing of `/help`, `/nodes`, `/msg` and plain text
//! - [`buffer`] - bounded scrollback with a scroll position
//! - [`input`] - the prompt's line editor
//! - [`format`] - how each kind of line is laid out
//! - [`app`] - the state machine tying them together

pub mod app;
pub mod buffer;
pub mod command;
pub mod format;
pub mod input;

pub use app::{is_interrupt, AppAction, ChatApp, Outgoing, Screen};
pub use buffer::{ChatLine, LineKind, MessageBuffer};
pub use command::{ChatCommand, CommandParser};
pub use input::InputLine;

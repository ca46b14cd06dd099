//! Terminal front end built on ratatui and crossterm.

pub mod event_loop;
pub mod renderer;
pub mod terminal;

pub use event_loop::run_chat;

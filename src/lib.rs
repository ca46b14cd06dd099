//! # Meshchat - Terminal Chat for Meshtastic Networks
//!
//! Meshchat connects to a Meshtastic radio over USB serial or the node's TCP
//! API, fetches the list of known nodes and gives you a scrolling chat view on
//! the radio's channel, including private messages to a single node.
//!
//! ## Features
//!
//! - **Serial or TCP**: talks the Meshtastic client API stream protocol directly,
//!   with protobuf decoding via prost.
//! - **Chat commands**: `/nodes`, `/msg !nodeId text`, `/help`, `/quit`.
//! - **Delivery reports**: private messages are sent reliable and the routing
//!   outcome is shown when the radio reports it.
//! - **Scrollback**: bounded history with PageUp/PageDown scrolling and input history.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use meshchat::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_or_default("meshchat.toml").await?;
//!     meshchat::ui::run_chat(&config).await
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`meshtastic`] - radio link, framing, node database and the API session
//! - [`chat`] - command parsing, scrollback, input editing and chat state
//! - [`ui`] - ratatui rendering and the interactive event loop
//! - [`config`] - configuration loading and validation
//! - [`protobuf`] - generated Meshtastic protobuf types
//! - [`logutil`] - helpers for single-line log output
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   Terminal UI   │ ← ratatui rendering, key handling
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │   Chat State    │ ← commands, scrollback, formatting
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │   Meshtastic    │ ← serial/TCP link, framing, protobufs
//! │   Session       │
//! └─────────────────┘
//! ```

pub mod chat;
pub mod config;
pub mod logutil;
pub mod meshtastic;
pub mod protobuf;
pub mod ui;

use super::renderer::{draw, draw_loading, message_pane_height};
use super::terminal::{restore_terminal, setup_terminal, ChatTerminal};
use crate::chat::format::LOADING_TEXT;
use crate::chat::{is_interrupt, AppAction, ChatApp};
use crate::config::Config;
use crate::meshtastic::{MeshInterface, RadioEvent};
use anyhow::{anyhow, Result};
use log::{debug, info};
use ratatui::crossterm::event::{self, Event, KeyEvent};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug)]
pub enum UiEvent {
    Crossterm(Event),
}

/// Run the interactive chat until the user quits.
pub async fn run_chat(config: &Config) -> Result<()> {
    let mut terminal = setup_terminal()?;
    let result = run_session(&mut terminal, config).await;
    restore_terminal(&mut terminal)?;
    result
}

async fn run_session(terminal: &mut ChatTerminal, config: &Config) -> Result<()> {
    terminal.draw(|f| draw_loading(f, LOADING_TEXT))?;

    // Read the keyboard from the start so Ctrl-C works while the handshake runs.
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<UiEvent>();
    let event_reader_handle = tokio::spawn(async move {
        loop {
            if let Ok(true) = event::poll(Duration::from_millis(10)) {
                match event::read() {
                    Ok(ev) => {
                        if event_tx.send(UiEvent::Crossterm(ev)).is_err() {
                            break;
                        }
                    }
                    Err(_) => continue,
                }
            } else {
                tokio::task::yield_now().await;
            }
        }
    });

    let outcome = match connect_or_cancel(terminal, config, &mut event_rx).await {
        Ok(Some((mut radio, early_keys))) => {
            let outcome = chat_loop(terminal, config, &mut radio, early_keys, &mut event_rx).await;
            radio.close().await;
            outcome
        }
        Ok(None) => {
            info!("Connection cancelled before the chat opened");
            Ok(())
        }
        Err(e) => Err(e),
    };
    event_reader_handle.abort();
    outcome
}

/// Wait for the handshake while watching for Ctrl-C.
///
/// Keys typed while waiting are returned so they can be replayed into the chat.
async fn connect_or_cancel(
    terminal: &mut ChatTerminal,
    config: &Config,
    event_rx: &mut mpsc::UnboundedReceiver<UiEvent>,
) -> Result<Option<(MeshInterface, Vec<KeyEvent>)>> {
    let connect = MeshInterface::connect(&config.meshtastic);
    tokio::pin!(connect);
    let mut early_keys = Vec::new();
    let mut keyboard_open = true;
    loop {
        tokio::select! {
            res = &mut connect => return res.map(|radio| Some((radio, early_keys))),
            ui = event_rx.recv(), if keyboard_open => match ui {
                Some(UiEvent::Crossterm(Event::Key(key))) => {
                    if is_interrupt(&key) {
                        return Ok(None);
                    }
                    early_keys.push(key);
                }
                Some(UiEvent::Crossterm(Event::Resize(..))) => {
                    terminal.draw(|f| draw_loading(f, LOADING_TEXT))?;
                }
                Some(_) => {}
                None => keyboard_open = false,
            },
        }
    }
}

async fn chat_loop(
    terminal: &mut ChatTerminal,
    config: &Config,
    radio: &mut MeshInterface,
    early_keys: Vec<KeyEvent>,
    event_rx: &mut mpsc::UnboundedReceiver<UiEvent>,
) -> Result<()> {
    let mut app = ChatApp::new(radio.nodes().clone(), radio.my_node_num(), config);
    for ev in radio.drain_backlog() {
        app.handle_radio_event(ev);
    }
    let mut radio_rx = radio
        .take_events()
        .ok_or_else(|| anyhow!("Radio event stream unavailable"))?;

    info!("Chat started on channel {}", app.channel());
    let mut pending_keys = early_keys.into_iter();
    let mut radio_open = true;
    let mut redraw = true;
    loop {
        if redraw {
            let size = terminal.size()?;
            app.set_viewport_height(message_pane_height(size.height));
            terminal.draw(|f| draw(f, &app))?;
            redraw = false;
        }

        let key = match pending_keys.next() {
            Some(key) => Some(key),
            None => tokio::select! {
                ui = event_rx.recv() => match ui {
                    Some(UiEvent::Crossterm(Event::Key(key))) => Some(key),
                    Some(UiEvent::Crossterm(Event::Resize(w, h))) => {
                        debug!("Terminal resized to {}x{}", w, h);
                        redraw = true;
                        None
                    }
                    Some(_) => None,
                    None => return Err(anyhow!("Terminal event reader stopped")),
                },
                ev = radio_rx.recv(), if radio_open => {
                    match ev {
                        Some(ev) => {
                            let closed = matches!(ev, RadioEvent::Disconnected(_));
                            redraw |= app.handle_radio_event(ev);
                            radio_open = !closed;
                        }
                        None => {
                            radio_open = false;
                            app.push_system("Radio event stream ended");
                            redraw = true;
                        }
                    }
                    None
                }
            },
        };

        if let Some(key) = key {
            match app.handle_key(key) {
                AppAction::Quit => return Ok(()),
                AppAction::Send(out) => {
                    let result = radio.send_text(&out.text, out.dest, app.channel());
                    app.note_send_result(&out, result);
                    redraw = true;
                }
                AppAction::Redraw => redraw = true,
                AppAction::None => {}
            }
        }
    }
}

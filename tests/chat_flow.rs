//! Chat state driven the way the event loop drives it: keys in, radio events in.

use meshchat::chat::{AppAction, ChatApp, LineKind, Outgoing, Screen};
use meshchat::config::Config;
use meshchat::meshtastic::{DeliveryOutcome, Node, NodeDb, RadioEvent, SendError, TextEvent, BROADCAST_ADDR};
use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

fn press(app: &mut ChatApp, code: KeyCode) -> AppAction {
    app.handle_key(KeyEvent::new(code, KeyModifiers::NONE))
}

fn type_and_enter(app: &mut ChatApp, line: &str) -> AppAction {
    for c in line.chars() {
        press(app, KeyCode::Char(c));
    }
    press(app, KeyCode::Enter)
}

fn lines(app: &ChatApp) -> Vec<(String, LineKind)> {
    app.buffer()
        .iter()
        .map(|l| (l.text.clone(), l.kind))
        .collect()
}

fn new_app() -> ChatApp {
    let mut nodes = NodeDb::new();
    nodes.upsert(Node::new(0x0a, "ME", "Base"));
    nodes.upsert(Node::new(0x0b, "BOB", "Bob"));
    nodes.upsert(Node::new(0x0c, "CAT", "Cat"));
    ChatApp::new(nodes, Some(0x0a), &Config::default())
}

#[test]
fn nodes_command_lists_newest_first() {
    let mut app = new_app();
    assert_eq!(type_and_enter(&mut app, "/nodes"), AppAction::Redraw);
    let texts: Vec<String> = lines(&app).into_iter().map(|(t, _)| t).collect();
    assert_eq!(
        texts,
        vec![
            "Node !0000000c: CAT",
            "Node !0000000b: BOB",
            "Node !0000000a: ME",
        ]
    );
}

#[test]
fn incoming_private_message_is_highlighted() {
    let mut app = new_app();
    let redraw = app.handle_radio_event(RadioEvent::Text(TextEvent {
        from: 0x0b,
        to: 0x0a,
        channel: 0,
        text: "meet at the ridge\nbring water".into(),
        is_private: true,
    }));
    assert!(redraw);
    let got = lines(&app);
    assert_eq!(got.len(), 2);
    assert!(got.iter().all(|(_, kind)| *kind == LineKind::Private));
    assert!(got[0].0.ends_with(" BOB to !0000000a (ME) 📩 meet at the ridge"));
    assert!(got[1].0.ends_with(" BOB to !0000000a (ME) 📩 bring water"));
}

#[test]
fn new_nodes_are_named_in_later_messages() {
    let mut app = new_app();
    app.handle_radio_event(RadioEvent::Node(Node::new(0x0d, "DOG", "Dog")));
    app.handle_radio_event(RadioEvent::Text(TextEvent {
        from: 0x0d,
        to: BROADCAST_ADDR,
        channel: 0,
        text: "woof".into(),
        is_private: false,
    }));
    assert!(lines(&app)[0].0.ends_with(" DOG: woof"));
}

#[test]
fn invalid_msg_shows_usage() {
    let mut app = new_app();
    assert_eq!(type_and_enter(&mut app, "/msg !0000000b"), AppAction::Redraw);
    let got = lines(&app);
    assert_eq!(
        got,
        vec![(
            "Invalid command format. Use '/msg !nodeId message'".to_string(),
            LineKind::System
        )]
    );
}

#[test]
fn failed_delivery_and_failed_send_are_reported() {
    let mut app = new_app();
    let out = match type_and_enter(&mut app, "/msg !0000000c you there?") {
        AppAction::Send(out) => out,
        other => panic!("expected send, got {:?}", other),
    };
    assert_eq!(out.dest, Some(0x0c));
    app.note_send_result(&out, Ok(4242));
    app.handle_radio_event(RadioEvent::Delivery {
        id: 4242,
        outcome: DeliveryOutcome::Failed("MAX_RETRANSMIT".into()),
    });
    assert_eq!(
        lines(&app).last().map(|(t, _)| t.as_str()),
        Some("Delivery to !0000000c failed: MAX_RETRANSMIT")
    );

    let broadcast = Outgoing {
        dest: None,
        dest_id: None,
        text: "anyone".into(),
    };
    app.note_send_result(&broadcast, Err(SendError::Closed));
    assert_eq!(
        lines(&app).last().map(|(t, _)| t.as_str()),
        Some("Message not sent: radio link is closed")
    );
}

#[test]
fn page_up_holds_the_view_while_messages_arrive() {
    let mut app = new_app();
    app.set_viewport_height(3);
    for i in 0..10 {
        app.handle_radio_event(RadioEvent::Text(TextEvent {
            from: 0x0b,
            to: BROADCAST_ADDR,
            channel: 0,
            text: format!("msg {}", i),
            is_private: false,
        }));
    }
    press(&mut app, KeyCode::PageUp);
    assert_eq!(app.buffer().scroll_offset(), 2);
    let before: Vec<String> = app.buffer().visible(3).map(|l| l.text.clone()).collect();

    app.handle_radio_event(RadioEvent::Text(TextEvent {
        from: 0x0b,
        to: BROADCAST_ADDR,
        channel: 0,
        text: "late".into(),
        is_private: false,
    }));
    let after: Vec<String> = app.buffer().visible(3).map(|l| l.text.clone()).collect();
    assert_eq!(before, after);

    app.handle_key(KeyEvent::new(KeyCode::Char('l'), KeyModifiers::CONTROL));
    assert!(app.buffer().is_following());
    assert!(app
        .buffer()
        .visible(3)
        .last()
        .is_some_and(|l| l.text.ends_with("BOB: late")));
}

#[test]
fn help_round_trip_and_quit() {
    let mut app = new_app();
    type_and_enter(&mut app, "/help");
    assert_eq!(app.screen(), Screen::Help);
    press(&mut app, KeyCode::Enter);
    assert_eq!(app.screen(), Screen::Chat);
    assert_eq!(type_and_enter(&mut app, "/quit"), AppAction::Quit);
}

#[test]
fn history_recalls_sent_lines() {
    let mut app = new_app();
    type_and_enter(&mut app, "first");
    type_and_enter(&mut app, "second");
    press(&mut app, KeyCode::Up);
    assert_eq!(app.input().text(), "second");
    press(&mut app, KeyCode::Up);
    assert_eq!(app.input().text(), "first");
    press(&mut app, KeyCode::Down);
    press(&mut app, KeyCode::Down);
    assert_eq!(app.input().text(), "");
}

#[test]
fn broadcast_ids_are_not_private_destinations() {
    let mut app = new_app();
    assert_eq!(type_and_enter(&mut app, "/msg ^all hello"), AppAction::Redraw);
    let got = lines(&app);
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].1, LineKind::System);
    assert!(got[0].0.starts_with("Unknown node id '^all'"));
}

#[test]
fn unusable_timestamp_format_does_not_break_the_view() {
    let mut config = Config::default();
    config.chat.timestamp_format = "%Q".into();
    let mut app = ChatApp::new(NodeDb::new(), None, &config);
    app.handle_radio_event(RadioEvent::Text(TextEvent {
        from: 0x0b,
        to: BROADCAST_ADDR,
        channel: 0,
        text: "still readable".into(),
        is_private: false,
    }));
    assert!(lines(&app)[0].0.ends_with(" Unknown: still readable"));
}

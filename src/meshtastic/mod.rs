//! # Meshtastic Radio Session
//!
//! Talks to a Meshtastic node over the client API stream protocol and turns
//! what the radio sends into [`RadioEvent`]s for the chat front end.
//!
//! ## Architecture
//!
//! ```text
//!   link reader half ──▶ MeshtasticReader (thread) ──▶ RadioEvent channel ──▶ UI
//!   link writer half ◀── MeshtasticWriter (task)   ◀── OutgoingMessage / ControlMessage
//! ```
//!
//! The reader runs on a dedicated OS thread because serial reads block; the
//! writer is a tokio task that paces text sends and keeps the API session
//! alive with periodic heartbeats.
//!
//! ## Session lifecycle
//!
//! 1. [`MeshInterface::connect`] opens the link and spawns both halves.
//! 2. The writer sends the wake preamble then `want_config_id`.
//! 3. The radio replies with MyInfo, one NodeInfo per known node and finally
//!    `config_complete_id`; `connect` returns once that id matches.
//! 4. [`MeshInterface::close`] sends `disconnect` and stops both halves.

pub mod framer;
pub mod link;
pub mod node;

pub use node::{format_node_id, parse_node_id, Node, NodeDb, BROADCAST_ADDR, UNKNOWN_NAME};

use crate::config::MeshtasticConfig;
use crate::logutil::{escape_log, hex_snippet, truncate_for_log};
use crate::protobuf::meshtastic_generated as proto;
use anyhow::{anyhow, bail, Context, Result};
use framer::{encode_frame, wake_sequence, StreamFramer};
use link::{is_timeout, open_link, LinkReader, LinkWriter};
use log::{debug, error, info, trace, warn};
use prost::Message;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Duration, Instant};

/// Longest text payload the firmware will carry in one packet.
pub const MAX_TEXT_BYTES: usize = 228;

/// Result of a reliable (want_ack) send as reported by the routing layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Acked,
    Failed(String),
}

/// A decoded text message heard on the mesh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEvent {
    pub from: u32,
    pub to: u32,
    pub channel: u32,
    pub text: String,
    /// Addressed to a single node rather than broadcast
    pub is_private: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RadioEvent {
    MyInfo(u32),
    Node(Node),
    ConfigComplete(u32),
    Text(TextEvent),
    Delivery { id: u32, outcome: DeliveryOutcome },
    /// The writer could not put a queued text on the link
    SendFailed { id: u32, reason: String },
    Log(String),
    Disconnected(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    #[error("message is empty")]
    Empty,
    #[error("message is {0} bytes, the limit is 228")]
    TooLong(usize),
    #[error("radio link is closed")]
    Closed,
}

/// Outgoing text handed to the writer task
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    pub id: u32,
    pub to_node: Option<u32>, // None for broadcast
    pub channel: u32,
    pub content: String,
    pub want_ack: bool,
}

/// Control messages for coordinating with the writer task
#[derive(Debug)]
pub enum ControlMessage {
    WantConfig(u32),
    SetNodeId(u32),
    /// Tell the radio we are leaving, then stop
    Disconnect,
    Shutdown,
}

/// Writer tuning parameters, sourced from [`MeshtasticConfig`]
#[derive(Debug, Clone)]
pub struct WriterTuning {
    pub min_send_gap_ms: u64,
    /// 0 disables heartbeats
    pub heartbeat_secs: u64,
    pub hop_limit: u32,
}

impl Default for WriterTuning {
    fn default() -> Self {
        Self {
            min_send_gap_ms: 1000,
            heartbeat_secs: 300,
            hop_limit: 3,
        }
    }
}

impl From<&MeshtasticConfig> for WriterTuning {
    fn from(cfg: &MeshtasticConfig) -> Self {
        Self {
            min_send_gap_ms: cfg.min_send_gap_ms,
            heartbeat_secs: cfg.heartbeat_secs,
            hop_limit: cfg.hop_limit,
        }
    }
}

/// Decode one FromRadio payload. Frames with nothing the chat client cares
/// about yield `None`.
pub fn decode_from_radio(payload: &[u8]) -> Option<RadioEvent> {
    use proto::from_radio::PayloadVariant;

    let msg = match proto::FromRadio::decode(payload) {
        Ok(msg) => msg,
        Err(e) => {
            debug!(
                "Dropping undecodable FromRadio frame ({} bytes, {}): {}",
                payload.len(),
                hex_snippet(payload, 16),
                e
            );
            return None;
        }
    };

    match msg.payload_variant? {
        PayloadVariant::Packet(pkt) => decode_packet(pkt),
        PayloadVariant::MyInfo(info) => {
            debug!("MyInfo: node {}", format_node_id(info.my_node_num));
            Some(RadioEvent::MyInfo(info.my_node_num))
        }
        PayloadVariant::NodeInfo(info) => Some(RadioEvent::Node(Node::from_proto(&info))),
        PayloadVariant::ConfigCompleteId(id) => Some(RadioEvent::ConfigComplete(id)),
        PayloadVariant::LogRecord(rec) => Some(RadioEvent::Log(rec.message)),
        PayloadVariant::Rebooted(_) => {
            warn!("Radio reported a reboot");
            Some(RadioEvent::Log("radio rebooted".to_string()))
        }
        PayloadVariant::Channel(ch) => {
            trace!("Channel {} role={}", ch.index, ch.role);
            None
        }
        PayloadVariant::QueueStatus(q) => {
            trace!("QueueStatus free={}/{} res={}", q.free, q.maxlen, q.res);
            None
        }
    }
}

fn decode_packet(pkt: proto::MeshPacket) -> Option<RadioEvent> {
    use proto::mesh_packet::PayloadVariant as MPPayload;

    let data = match pkt.payload_variant {
        Some(MPPayload::Decoded(data)) => data,
        Some(MPPayload::Encrypted(_)) => {
            trace!(
                "Encrypted packet from {} not decoded by radio",
                format_node_id(pkt.from)
            );
            return None;
        }
        None => return None,
    };

    match proto::PortNum::try_from(data.portnum) {
        Ok(proto::PortNum::TextMessageApp) => match String::from_utf8(data.payload.to_vec()) {
            Ok(text) => {
                debug!(
                    "Text from {} to {} ch{}: '{}'",
                    format_node_id(pkt.from),
                    format_node_id(pkt.to),
                    pkt.channel,
                    truncate_for_log(&text, 120)
                );
                Some(RadioEvent::Text(TextEvent {
                    from: pkt.from,
                    to: pkt.to,
                    channel: pkt.channel,
                    text,
                    is_private: pkt.to != BROADCAST_ADDR,
                }))
            }
            Err(_) => {
                warn!(
                    "Ignoring text packet from {} with invalid UTF-8",
                    format_node_id(pkt.from)
                );
                None
            }
        },
        Ok(proto::PortNum::NodeinfoApp) => match proto::User::decode(data.payload.as_ref()) {
            Ok(user) => Some(RadioEvent::Node(Node::from_user(pkt.from, &user))),
            Err(e) => {
                debug!("Bad NODEINFO payload from {}: {}", format_node_id(pkt.from), e);
                None
            }
        },
        Ok(proto::PortNum::RoutingApp) => decode_routing(&data),
        Ok(other) => {
            trace!("Ignoring {:?} packet from {}", other, format_node_id(pkt.from));
            None
        }
        Err(_) => {
            trace!("Ignoring packet on unknown port {}", data.portnum);
            None
        }
    }
}

fn decode_routing(data: &proto::Data) -> Option<RadioEvent> {
    use proto::routing::{Error as RoutingError, Variant};

    if data.request_id == 0 {
        return None;
    }
    let routing = match proto::Routing::decode(data.payload.as_ref()) {
        Ok(r) => r,
        Err(e) => {
            debug!("Bad ROUTING payload: {}", e);
            return None;
        }
    };
    match routing.variant {
        Some(Variant::ErrorReason(code)) => {
            let outcome = match RoutingError::try_from(code) {
                Ok(RoutingError::None) => DeliveryOutcome::Acked,
                Ok(reason) => DeliveryOutcome::Failed(reason.as_str_name().to_string()),
                Err(_) => DeliveryOutcome::Failed(format!("ERROR_{}", code)),
            };
            debug!("Routing result for id {}: {:?}", data.request_id, outcome);
            Some(RadioEvent::Delivery {
                id: data.request_id,
                outcome,
            })
        }
        _ => None,
    }
}

/// Blocking reader: pulls bytes off the link, deframes them and forwards decoded events.
pub struct MeshtasticReader {
    reader: LinkReader,
    framer: StreamFramer,
    events_tx: mpsc::UnboundedSender<RadioEvent>,
    shutdown: Arc<AtomicBool>,
}

impl MeshtasticReader {
    pub fn new(
        reader: LinkReader,
        events_tx: mpsc::UnboundedSender<RadioEvent>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            reader,
            framer: StreamFramer::new(),
            events_tx,
            shutdown,
        }
    }

    pub fn spawn(self) -> Result<std::thread::JoinHandle<()>> {
        std::thread::Builder::new()
            .name("meshchat-reader".to_string())
            .spawn(move || self.run())
            .context("Failed to spawn radio reader thread")
    }

    /// Read until EOF, a link error, shutdown, or the event receiver going away.
    pub fn run(mut self) {
        info!("Starting Meshtastic reader");
        let mut buf = [0u8; 1024];
        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                debug!("Reader observed shutdown flag");
                break;
            }
            match self.reader.read(&mut buf) {
                Ok(0) => {
                    self.notify_disconnect("link closed by radio");
                    break;
                }
                Ok(n) => {
                    trace!("Read {} bytes: {}", n, hex_snippet(&buf[..n], 32));
                    if !self.process_bytes(&buf[..n]) {
                        debug!("Event receiver dropped, reader exiting");
                        break;
                    }
                }
                Err(e) if is_timeout(&e) => continue,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    if !self.shutdown.load(Ordering::Relaxed) {
                        self.notify_disconnect(&e.to_string());
                    }
                    break;
                }
            }
        }
        if self.framer.discarded() > 0 {
            debug!(
                "Reader discarded {} bytes of non-frame output",
                self.framer.discarded()
            );
        }
    }

    /// Feed raw bytes; returns false once nobody is listening.
    fn process_bytes(&mut self, data: &[u8]) -> bool {
        self.framer.push(data);
        while let Some(frame) = self.framer.next_frame() {
            if let Some(event) = decode_from_radio(&frame) {
                if self.events_tx.send(event).is_err() {
                    return false;
                }
            }
        }
        true
    }

    fn notify_disconnect(&self, reason: &str) {
        warn!("Radio link lost: {}", reason);
        let _ = self
            .events_tx
            .send(RadioEvent::Disconnected(reason.to_string()));
    }
}

/// Writer task: owns the link's write half and serialises every ToRadio frame.
pub struct MeshtasticWriter {
    writer: LinkWriter,
    outgoing_rx: mpsc::UnboundedReceiver<OutgoingMessage>,
    control_rx: mpsc::UnboundedReceiver<ControlMessage>,
    our_node_id: Option<u32>,
    tuning: WriterTuning,
    last_text_send: Option<Instant>,
    heartbeat_nonce: u32,
    failures: Option<mpsc::UnboundedSender<RadioEvent>>,
}

impl MeshtasticWriter {
    pub fn new(
        writer: LinkWriter,
        outgoing_rx: mpsc::UnboundedReceiver<OutgoingMessage>,
        control_rx: mpsc::UnboundedReceiver<ControlMessage>,
        tuning: WriterTuning,
    ) -> Self {
        Self {
            writer,
            outgoing_rx,
            control_rx,
            our_node_id: None,
            tuning,
            last_text_send: None,
            heartbeat_nonce: 0,
            failures: None,
        }
    }

    /// Report texts that could not be written as [`RadioEvent::SendFailed`].
    pub fn report_failures(mut self, events_tx: mpsc::UnboundedSender<RadioEvent>) -> Self {
        self.failures = Some(events_tx);
        self
    }

    pub async fn run(mut self) -> Result<()> {
        info!("Starting Meshtastic writer task");

        self.write_raw(&wake_sequence())
            .context("Failed to send wake preamble")?;
        sleep(Duration::from_millis(100)).await;

        // A zero period would panic in interval(); park it at a day instead.
        let period = match self.tuning.heartbeat_secs {
            0 => Duration::from_secs(86_400),
            secs => Duration::from_secs(secs),
        };
        let mut heartbeat_interval = tokio::time::interval_at(Instant::now() + period, period);
        heartbeat_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                // Drain queued text before acting on a disconnect request.
                biased;
                msg = self.outgoing_rx.recv() => {
                    match msg {
                        Some(outgoing) => {
                            if let Err(e) = self.send_message(&outgoing).await {
                                error!("Failed to send message {}: {}", outgoing.id, e);
                                if let Some(tx) = &self.failures {
                                    let _ = tx.send(RadioEvent::SendFailed {
                                        id: outgoing.id,
                                        reason: e.to_string(),
                                    });
                                }
                            }
                        }
                        None => {
                            debug!("Outgoing channel closed");
                            break;
                        }
                    }
                }
                ctl = self.control_rx.recv() => {
                    match ctl {
                        Some(ControlMessage::WantConfig(id)) => {
                            info!("Requesting node list from radio (want_config_id=0x{:08x})", id);
                            self.send_want_config(id)?;
                        }
                        Some(ControlMessage::SetNodeId(id)) => {
                            debug!("Writer using node id {}", format_node_id(id));
                            self.our_node_id = Some(id);
                        }
                        Some(ControlMessage::Disconnect) => {
                            if let Err(e) = self.send_disconnect() {
                                warn!("Failed to send disconnect: {}", e);
                            }
                            break;
                        }
                        Some(ControlMessage::Shutdown) | None => break,
                    }
                }
                _ = heartbeat_interval.tick(), if self.tuning.heartbeat_secs > 0 => {
                    if let Err(e) = self.send_heartbeat() {
                        warn!("Heartbeat failed: {}", e);
                    }
                }
            }
        }

        info!("Meshtastic writer task stopped");
        Ok(())
    }

    async fn send_message(&mut self, msg: &OutgoingMessage) -> Result<()> {
        if let Some(last) = self.last_text_send {
            let gap = Duration::from_millis(self.tuning.min_send_gap_ms);
            let elapsed = last.elapsed();
            if elapsed < gap {
                let wait = gap - elapsed;
                trace!("Pacing text send by {}ms", wait.as_millis());
                sleep(wait).await;
            }
        }
        let packet = self.build_text_packet(msg);
        self.send_toradio(proto::ToRadio {
            payload_variant: Some(proto::to_radio::PayloadVariant::Packet(packet)),
        })?;
        self.last_text_send = Some(Instant::now());
        debug!(
            "Sent text id={} to={} ch{} want_ack={}: '{}'",
            msg.id,
            format_node_id(msg.to_node.unwrap_or(BROADCAST_ADDR)),
            msg.channel,
            msg.want_ack,
            escape_log(&msg.content)
        );
        Ok(())
    }

    fn build_text_packet(&self, msg: &OutgoingMessage) -> proto::MeshPacket {
        use proto::mesh_packet::{PayloadVariant as MPPayload, Priority};

        let data = proto::Data {
            portnum: proto::PortNum::TextMessageApp as i32,
            payload: msg.content.as_bytes().to_vec().into(),
            ..Default::default()
        };
        proto::MeshPacket {
            from: self.our_node_id.unwrap_or(0),
            to: msg.to_node.unwrap_or(BROADCAST_ADDR),
            channel: msg.channel,
            payload_variant: Some(MPPayload::Decoded(data)),
            id: msg.id,
            hop_limit: self.tuning.hop_limit,
            want_ack: msg.want_ack,
            priority: if msg.want_ack {
                Priority::Reliable as i32
            } else {
                Priority::Unset as i32
            },
            ..Default::default()
        }
    }

    fn send_want_config(&mut self, id: u32) -> Result<()> {
        self.send_toradio(proto::ToRadio {
            payload_variant: Some(proto::to_radio::PayloadVariant::WantConfigId(id)),
        })
    }

    fn send_heartbeat(&mut self) -> Result<()> {
        self.heartbeat_nonce = self.heartbeat_nonce.wrapping_add(1);
        trace!("Sending heartbeat nonce={}", self.heartbeat_nonce);
        self.send_toradio(proto::ToRadio {
            payload_variant: Some(proto::to_radio::PayloadVariant::Heartbeat(
                proto::Heartbeat {
                    nonce: self.heartbeat_nonce,
                },
            )),
        })
    }

    fn send_disconnect(&mut self) -> Result<()> {
        debug!("Sending disconnect to radio");
        self.send_toradio(proto::ToRadio {
            payload_variant: Some(proto::to_radio::PayloadVariant::Disconnect(true)),
        })
    }

    fn send_toradio(&mut self, msg: proto::ToRadio) -> Result<()> {
        let payload = msg.encode_to_vec();
        let frame = encode_frame(&payload)?;
        self.write_raw(&frame)?;
        trace!("Sent ToRadio frame ({} bytes payload)", payload.len());
        Ok(())
    }

    fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// A live API session with one radio.
pub struct MeshInterface {
    nodes: NodeDb,
    my_node_num: Option<u32>,
    outgoing_tx: mpsc::UnboundedSender<OutgoingMessage>,
    control_tx: mpsc::UnboundedSender<ControlMessage>,
    events_rx: Option<mpsc::UnboundedReceiver<RadioEvent>>,
    backlog: Vec<RadioEvent>,
    shutdown: Arc<AtomicBool>,
    writer_handle: Option<tokio::task::JoinHandle<Result<()>>>,
    reader_handle: Option<std::thread::JoinHandle<()>>,
}

impl MeshInterface {
    /// Open the configured link and wait until the radio has sent its node list.
    pub async fn connect(cfg: &MeshtasticConfig) -> Result<Self> {
        let spec = cfg.link_spec()?;
        let link_desc = spec.to_string();
        let (reader, writer) = tokio::task::spawn_blocking(move || open_link(&spec))
            .await
            .map_err(|e| anyhow!("Link open task failed: {}", e))??;
        let iface = Self::from_link(
            reader,
            writer,
            WriterTuning::from(cfg),
            Duration::from_secs(cfg.config_timeout_secs),
        )
        .await
        .with_context(|| format!("Radio handshake over {} failed", link_desc))?;
        info!(
            "Connected to radio over {} ({} nodes known)",
            link_desc,
            iface.nodes.len()
        );
        Ok(iface)
    }

    /// Run the session over an already opened link.
    pub async fn from_link(
        reader: LinkReader,
        writer: LinkWriter,
        tuning: WriterTuning,
        config_timeout: Duration,
    ) -> Result<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let shutdown = Arc::new(AtomicBool::new(false));

        let writer = MeshtasticWriter::new(writer, outgoing_rx, control_rx, tuning)
            .report_failures(events_tx.clone());
        let reader_handle = MeshtasticReader::new(reader, events_tx, shutdown.clone()).spawn()?;
        let writer_handle = tokio::spawn(writer.run());

        let mut iface = Self {
            nodes: NodeDb::new(),
            my_node_num: None,
            outgoing_tx,
            control_tx,
            events_rx: Some(events_rx),
            backlog: Vec::new(),
            shutdown,
            writer_handle: Some(writer_handle),
            reader_handle: Some(reader_handle),
        };

        let config_id = random_nonzero();
        iface
            .control_tx
            .send(ControlMessage::WantConfig(config_id))
            .map_err(|_| anyhow!("Writer task exited before handshake"))?;
        if let Err(e) = iface.await_config(config_id, config_timeout).await {
            iface.close().await;
            return Err(e);
        }
        Ok(iface)
    }

    async fn await_config(&mut self, config_id: u32, limit: Duration) -> Result<()> {
        let deadline = Instant::now() + limit;
        let rx = self
            .events_rx
            .as_mut()
            .ok_or_else(|| anyhow!("Event stream already taken"))?;
        loop {
            let event = match timeout(deadline.saturating_duration_since(Instant::now()), rx.recv()).await {
                Err(_) => bail!(
                    "Timed out after {}s waiting for the node list from the radio",
                    limit.as_secs()
                ),
                Ok(None) => bail!("Radio link closed during handshake"),
                Ok(Some(ev)) => ev,
            };
            match event {
                RadioEvent::MyInfo(num) => {
                    self.my_node_num = Some(num);
                    let _ = self.control_tx.send(ControlMessage::SetNodeId(num));
                }
                RadioEvent::Node(node) => self.nodes.upsert(node),
                RadioEvent::ConfigComplete(id) if id == config_id => {
                    debug!("Config complete, {} nodes", self.nodes.len());
                    return Ok(());
                }
                RadioEvent::ConfigComplete(id) => {
                    debug!("Ignoring config_complete_id 0x{:08x} (not ours)", id);
                }
                RadioEvent::Disconnected(reason) => bail!("Radio link lost: {}", reason),
                RadioEvent::Log(line) => debug!("radio: {}", escape_log(&line)),
                other => self.backlog.push(other),
            }
        }
    }

    /// Node list as of the end of the handshake.
    pub fn nodes(&self) -> &NodeDb {
        &self.nodes
    }

    pub fn my_node_num(&self) -> Option<u32> {
        self.my_node_num
    }

    /// Events that arrived during the handshake, in order.
    pub fn drain_backlog(&mut self) -> Vec<RadioEvent> {
        std::mem::take(&mut self.backlog)
    }

    /// Hand the live event stream to the caller. Only the first call returns it.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<RadioEvent>> {
        self.events_rx.take()
    }

    /// Queue a text message. Direct messages are sent reliable and their
    /// routing outcome later arrives as [`RadioEvent::Delivery`] with the returned id.
    pub fn send_text(&self, text: &str, dest: Option<u32>, channel: u32) -> Result<u32, SendError> {
        if text.is_empty() {
            return Err(SendError::Empty);
        }
        if text.len() > MAX_TEXT_BYTES {
            return Err(SendError::TooLong(text.len()));
        }
        let to_node = dest.filter(|&d| d != BROADCAST_ADDR);
        let id = random_nonzero();
        self.outgoing_tx
            .send(OutgoingMessage {
                id,
                to_node,
                channel,
                content: text.to_string(),
                want_ack: to_node.is_some(),
            })
            .map_err(|_| SendError::Closed)?;
        Ok(id)
    }

    /// Flush queued sends, say goodbye to the radio and stop both halves.
    pub async fn close(&mut self) {
        let _ = self.control_tx.send(ControlMessage::Disconnect);
        if let Some(handle) = self.writer_handle.take() {
            match timeout(Duration::from_secs(5), handle).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => warn!("Writer task ended with error: {}", e),
                Ok(Err(e)) => warn!("Writer task panicked: {}", e),
                Err(_) => warn!("Writer task did not stop in time"),
            }
        }
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.reader_handle.take() {
            let joined = tokio::task::spawn_blocking(move || handle.join()).await;
            if !matches!(joined, Ok(Ok(()))) {
                warn!("Reader thread did not exit cleanly");
            }
        }
        info!("Radio session closed");
    }
}

impl Drop for MeshInterface {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        let _ = self.control_tx.send(ControlMessage::Shutdown);
    }
}

fn random_nonzero() -> u32 {
    loop {
        let id: u32 = rand::random();
        if id != 0 {
            return id;
        }
    }
}

//! Transports to the radio: USB serial or the node's TCP API socket.
//!
//! Each link is split into independent read and write halves so the blocking
//! reader thread never holds up outgoing sends.
use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Reads return after this long without data so the reader can observe shutdown.
pub const READ_TIMEOUT: Duration = Duration::from_millis(500);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Default port of the Meshtastic TCP client API.
pub const DEFAULT_TCP_PORT: u16 = 4403;

pub type LinkReader = Box<dyn Read + Send>;
pub type LinkWriter = Box<dyn Write + Send>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkSpec {
    Serial { port: String, baud_rate: u32 },
    Tcp { host: String, port: u16 },
}

impl std::fmt::Display for LinkSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkSpec::Serial { port, baud_rate } => write!(f, "serial {} @ {} baud", port, baud_rate),
            LinkSpec::Tcp { host, port } => write!(f, "tcp {}:{}", host, port),
        }
    }
}

/// Open the link described by `spec`, returning its reader and writer halves.
pub fn open_link(spec: &LinkSpec) -> Result<(LinkReader, LinkWriter)> {
    info!("Opening radio link: {}", spec);
    match spec {
        LinkSpec::Serial { port, baud_rate } => open_serial(port, *baud_rate),
        LinkSpec::Tcp { host, port } => open_tcp(host, *port),
    }
}

fn open_tcp(host: &str, port: u16) -> Result<(LinkReader, LinkWriter)> {
    let addr = (host, port)
        .to_socket_addrs()
        .with_context(|| format!("Failed to resolve {}:{}", host, port))?
        .next()
        .ok_or_else(|| anyhow!("No address found for {}:{}", host, port))?;
    let stream = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)
        .with_context(|| format!("Failed to connect to {}", addr))?;
    stream.set_read_timeout(Some(READ_TIMEOUT))?;
    stream.set_nodelay(true)?;
    let writer = stream.try_clone()?;
    debug!("TCP link established to {}", addr);
    Ok((Box::new(stream), Box::new(writer)))
}

#[cfg(feature = "serial")]
fn open_serial(port_name: &str, baud_rate: u32) -> Result<(LinkReader, LinkWriter)> {
    let mut builder = serialport::new(port_name, baud_rate).timeout(READ_TIMEOUT);
    #[cfg(unix)]
    {
        builder = builder
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None);
    }
    let mut port = builder
        .open()
        .map_err(|e| anyhow!("Failed to open serial port {}: {}", port_name, e))?;

    // Toggle DTR/RTS so ESP32 based boards wake up, then drop buffered boot text.
    let _ = port.write_data_terminal_ready(true);
    let _ = port.write_request_to_send(true);
    std::thread::sleep(Duration::from_millis(150));
    if let Ok(available) = port.bytes_to_read() {
        if available > 0 {
            let _ = port.clear(serialport::ClearBuffer::Input);
            debug!("Discarded {} bytes of buffered serial output", available);
        }
    }

    let writer = port
        .try_clone()
        .map_err(|e| anyhow!("Failed to clone serial port {}: {}", port_name, e))?;
    Ok((Box::new(port), Box::new(writer)))
}

#[cfg(not(feature = "serial"))]
fn open_serial(port_name: &str, _baud_rate: u32) -> Result<(LinkReader, LinkWriter)> {
    Err(anyhow!(
        "Cannot open {}: serial support not compiled in (enable the 'serial' feature)",
        port_name
    ))
}

/// True for the error kinds a read timeout produces on the supported platforms.
pub fn is_timeout(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
    )
}

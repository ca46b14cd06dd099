//! Stream framing for the Meshtastic client API.
//!
//! Both the USB serial link and the TCP socket (port 4403) carry protobuf
//! messages wrapped as:
//!
//!   `0x94 0xC3 <len_hi> <len_lo> <protobuf bytes>`
//!
//! Between frames the radio may print plain-text debug output, so the decoder
//! is incremental and resynchronises on the next `0x94` whenever the header is
//! missing or the declared length is implausible.
use bytes::{Buf, BytesMut};
use thiserror::Error;

pub const START1: u8 = 0x94;
pub const START2: u8 = 0xC3;
/// Largest ToRadio/FromRadio payload the firmware accepts.
pub const MAX_PAYLOAD: usize = 512;
const HEADER_LEN: usize = 4;
/// Number of `START2` bytes sent to wake a sleeping serial console.
pub const WAKE_LEN: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("payload of {0} bytes exceeds the 512 byte frame limit")]
    TooLarge(usize),
    #[error("empty payload")]
    Empty,
}

/// Incremental decoder for `0x94 0xC3` framed messages.
#[derive(Debug, Default)]
pub struct StreamFramer {
    buf: BytesMut,
    discarded: usize,
}

impl StreamFramer {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(1024),
            discarded: 0,
        }
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Bytes dropped so far while hunting for a header (console noise).
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    /// Extract the next complete payload, if one is buffered.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        loop {
            if !self.align_to_header() {
                return None;
            }
            if self.buf.len() < HEADER_LEN {
                return None;
            }
            if self.buf[1] != START2 {
                self.skip(1);
                continue;
            }
            let declared = ((self.buf[2] as usize) << 8) | self.buf[3] as usize;
            if declared == 0 || declared > MAX_PAYLOAD {
                self.skip(1);
                continue;
            }
            if self.buf.len() < HEADER_LEN + declared {
                return None;
            }
            self.buf.advance(HEADER_LEN);
            return Some(self.buf.split_to(declared).to_vec());
        }
    }

    /// Drop bytes before the next `START1`. Returns false when the buffer was emptied.
    fn align_to_header(&mut self) -> bool {
        match self.buf.iter().position(|&b| b == START1) {
            Some(0) => true,
            Some(pos) => {
                self.skip(pos);
                true
            }
            None => {
                let n = self.buf.len();
                self.skip(n);
                false
            }
        }
    }

    fn skip(&mut self, n: usize) {
        self.buf.advance(n);
        self.discarded += n;
    }
}

/// Wrap an encoded protobuf payload in the stream header.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    if payload.is_empty() {
        return Err(FrameError::Empty);
    }
    if payload.len() > MAX_PAYLOAD {
        return Err(FrameError::TooLarge(payload.len()));
    }
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.push(START1);
    out.push(START2);
    out.push(((payload.len() >> 8) & 0xFF) as u8);
    out.push((payload.len() & 0xFF) as u8);
    out.extend_from_slice(payload);
    Ok(out)
}

/// Preamble written once after opening a link so the radio switches to API mode.
pub fn wake_sequence() -> [u8; WAKE_LEN] {
    [START2; WAKE_LEN]
}

//! Inter-task communication channels.
//!
//! Uses `embassy-sync` bounded channels to bridge the async socket tasks
//! with the synchronous event loop. Both sides run on the same thread; the
//! loop only ever uses the non-blocking `try_*` calls.
//!
//! ```text
//! ┌──────────────┐  outbound frames ┌──────────────┐
//! │  Event loop  │────────────────▶│ Backend task │
//! │  (sync)      │◀────────────────│  (async)     │
//! │              │  inbound chunks  └──────────────┘
//! │              │  command lines   ┌──────────────┐
//! │              │◀────────────────│ Command task │
//! │              │────────────────▶│  (async)     │
//! └──────────────┘  ack strings     └──────────────┘
//! ```

use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use heapless::{String, Vec};
use log::warn;

use super::codec::MAX_WIRE_SIZE;
use super::transport::{CommandPort, Transport};
use crate::error::CommsError;

/// Socket read granularity.
pub const CHUNK_SIZE: usize = 512;
/// Longest accepted command line (JSON object, no newline).
pub const MAX_COMMAND_LINE: usize = 512;
/// Longest acknowledgement string.
pub const MAX_ACK_LEN: usize = 64;

/// Outbound depth: one inference request plus one upload.
const OUT_DEPTH: usize = 2;
const IN_DEPTH: usize = 8;
const CMD_DEPTH: usize = 4;

pub type WireFrame = Vec<u8, MAX_WIRE_SIZE>;
pub type Chunk = Vec<u8, CHUNK_SIZE>;

/// One command line and the connection it arrived on.
#[derive(Debug, Clone)]
pub struct InboundCommand {
    pub conn: u32,
    pub line: Vec<u8, MAX_COMMAND_LINE>,
}

#[derive(Debug, Clone)]
pub struct AckMsg {
    pub conn: u32,
    pub text: String<MAX_ACK_LEN>,
}

/// Channels and flags shared by the event loop and the socket tasks.
pub struct BackendChannels {
    pub outbound: Channel<CriticalSectionRawMutex, WireFrame, OUT_DEPTH>,
    pub inbound: Channel<CriticalSectionRawMutex, Chunk, IN_DEPTH>,
    pub commands: Channel<CriticalSectionRawMutex, InboundCommand, CMD_DEPTH>,
    pub acks: Channel<CriticalSectionRawMutex, AckMsg, CMD_DEPTH>,
    link_up: AtomicBool,
    listening: AtomicBool,
    backend_open: AtomicBool,
}

impl BackendChannels {
    pub const fn new() -> Self {
        Self {
            outbound: Channel::new(),
            inbound: Channel::new(),
            commands: Channel::new(),
            acks: Channel::new(),
            link_up: AtomicBool::new(false),
            listening: AtomicBool::new(false),
            backend_open: AtomicBool::new(false),
        }
    }

    pub fn link_up(&self) -> bool {
        self.link_up.load(Ordering::Acquire)
    }

    pub fn set_link_up(&self, up: bool) {
        self.link_up.store(up, Ordering::Release);
        if !up {
            // Frames queued for a dead socket would be replayed stale.
            self.outbound.clear();
            self.inbound.clear();
        }
    }

    pub fn listening(&self) -> bool {
        self.listening.load(Ordering::Acquire)
    }

    pub fn set_listening(&self, on: bool) {
        self.listening.store(on, Ordering::Release);
    }

    /// Whether the backend socket is currently open.
    pub fn backend_open(&self) -> bool {
        self.backend_open.load(Ordering::Acquire)
    }

    pub fn set_backend_open(&self, open: bool) {
        self.backend_open.store(open, Ordering::Release);
    }
}

impl Default for BackendChannels {
    fn default() -> Self {
        Self::new()
    }
}

// ── Transport over the backend channels ──────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelTransportError {
    /// The frame does not fit a wire buffer.
    TooLarge,
}

/// Byte path of the session manager, backed by the channels.
pub struct ChannelTransport<'a> {
    channels: &'a BackendChannels,
    partial: Option<(Chunk, usize)>,
}

impl<'a> ChannelTransport<'a> {
    pub fn new(channels: &'a BackendChannels) -> Self {
        Self {
            channels,
            partial: None,
        }
    }
}

impl Transport for ChannelTransport<'_> {
    type Error = ChannelTransportError;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let (chunk, offset) = match self.partial.take() {
            Some(p) => p,
            None => match self.channels.inbound.try_receive() {
                Ok(c) => (c, 0),
                Err(_) => return Ok(0),
            },
        };
        let n = (chunk.len() - offset).min(buf.len());
        buf[..n].copy_from_slice(&chunk[offset..offset + n]);
        if offset + n < chunk.len() {
            self.partial = Some((chunk, offset + n));
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error> {
        let frame = WireFrame::from_slice(data).map_err(|()| ChannelTransportError::TooLarge)?;
        match self.channels.outbound.try_send(frame) {
            Ok(()) => Ok(data.len()),
            Err(_) => Ok(0),
        }
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn available(&self) -> bool {
        self.partial.is_some() || !self.channels.inbound.is_empty()
    }

    fn link_changed(&mut self, up: bool) {
        self.partial = None;
        self.channels.set_link_up(up);
    }
}

// ── Command port over the channels ───────────────────────────

pub struct ChannelCommandPort<'a> {
    channels: &'a BackendChannels,
}

impl<'a> ChannelCommandPort<'a> {
    pub fn new(channels: &'a BackendChannels) -> Self {
        Self { channels }
    }
}

impl CommandPort for ChannelCommandPort<'_> {
    fn set_listening(&mut self, on: bool) {
        self.channels.set_listening(on);
    }

    fn next_line(&mut self) -> Option<InboundCommand> {
        self.channels.commands.try_receive().ok()
    }

    fn reply(&mut self, conn: u32, text: &str) -> Result<(), CommsError> {
        let mut s = String::new();
        s.push_str(text).map_err(|()| CommsError::Encode)?;
        self.channels
            .acks
            .try_send(AckMsg { conn, text: s })
            .map_err(|_| {
                warn!("CMD[{}]: ack channel full", conn);
                CommsError::Busy
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_reports_full_channel_as_zero() {
        let ch = BackendChannels::new();
        let mut t = ChannelTransport::new(&ch);
        assert_eq!(t.write(b"a"), Ok(1));
        assert_eq!(t.write(b"b"), Ok(1));
        assert_eq!(t.write(b"c"), Ok(0));
    }

    #[test]
    fn read_spans_small_buffers() {
        let ch = BackendChannels::new();
        let mut t = ChannelTransport::new(&ch);
        ch.inbound
            .try_send(Chunk::from_slice(b"hello").unwrap())
            .unwrap();
        assert!(t.available());
        let mut buf = [0u8; 3];
        assert_eq!(t.read(&mut buf), Ok(3));
        assert_eq!(&buf, b"hel");
        assert_eq!(t.read(&mut buf), Ok(2));
        assert_eq!(&buf[..2], b"lo");
        assert_eq!(t.read(&mut buf), Ok(0));
    }

    #[test]
    fn link_down_discards_queued_frames() {
        let ch = BackendChannels::new();
        let mut t = ChannelTransport::new(&ch);
        t.link_changed(true);
        t.write(b"stale").unwrap();
        t.link_changed(false);
        assert!(ch.outbound.is_empty());
        assert!(!ch.link_up());
    }

    #[test]
    fn command_port_roundtrip() {
        let ch = BackendChannels::new();
        let mut p = ChannelCommandPort::new(&ch);
        p.set_listening(true);
        assert!(ch.listening());
        ch.commands
            .try_send(InboundCommand {
                conn: 9,
                line: Vec::from_slice(b"{}").unwrap(),
            })
            .unwrap();
        let cmd = p.next_line().unwrap();
        assert_eq!(cmd.conn, 9);
        p.reply(9, "received:STUDY").unwrap();
        let ack = ch.acks.try_receive().unwrap();
        assert_eq!(ack.text.as_str(), "received:STUDY");
    }
}

//! Transport abstraction: any byte-oriented channel.
//!
//! Concrete implementations:
//! - [`ChannelTransport`](super::channels::ChannelTransport): frames handed
//!   to and from the async socket tasks
//! - [`NullTransport`]: accepts and discards everything
//!
//! The session manager is generic over `Transport`, so the byte path can be
//! swapped without touching connection or client logic.

use super::channels::InboundCommand;
use crate::error::CommsError;

/// Byte-oriented transport channel.
pub trait Transport {
    /// Error type for this transport.
    type Error: core::fmt::Debug;

    /// Read up to `buf.len()` bytes into `buf`.
    /// Returns the number of bytes actually read.
    /// Returns 0 if no data is available (non-blocking).
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Write `data` to the transport.
    /// Returns the number of bytes actually written; 0 means "full, try
    /// again later".
    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error>;

    /// Flush any buffered output.
    fn flush(&mut self) -> Result<(), Self::Error>;

    /// Check if data is available for reading.
    fn available(&self) -> bool;

    /// The network link underneath went up or down.
    fn link_changed(&mut self, _up: bool) {}
}

/// A null transport that discards all writes and never reads.
/// Used when no backend address is configured.
pub struct NullTransport;

impl Transport for NullTransport {
    type Error = ();

    fn read(&mut self, _buf: &mut [u8]) -> Result<usize, ()> {
        Ok(0)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, ()> {
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<(), ()> {
        Ok(())
    }

    fn available(&self) -> bool {
        false
    }
}

/// The device-side end of the remote command channel.
pub trait CommandPort {
    /// Keep (or stop keeping) a listening socket open whenever the link is
    /// up.
    fn set_listening(&mut self, on: bool);

    /// Next complete command line received since the last call.
    fn next_line(&mut self) -> Option<InboundCommand>;

    /// Send the acknowledgement for one command back on its connection.
    fn reply(&mut self, conn: u32, text: &str) -> Result<(), CommsError>;
}

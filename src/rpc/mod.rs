//! Backend and remote-command I/O.
//!
//! Length-prefixed JSON frames to the backend, newline-delimited JSON
//! commands from the companion app.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                      I/O Stack                             │
//! │                                                            │
//! │  ┌──────────────┐  ┌──────────┐   ┌─────────────────────┐ │
//! │  │ BackendClient │─▶│  Codec   │──▶│ Session (Transport) │ │
//! │  │ (BackendPort) │◀─│ messages │◀──│  ChannelTransport   │ │
//! │  └──────────────┘  └──────────┘   └─────────┬───────────┘ │
//! │         ▲                                    │ channels    │
//! │         │ CommandPort                        ▼             │
//! │  ┌──────────────┐                 ┌─────────────────────┐ │
//! │  │ command lines │◀───────────────│  io_task (async)    │ │
//! │  └──────────────┘                 └─────────────────────┘ │
//! └────────────────────────────────────────────────────────────┘
//! ```

pub mod channels;
pub mod client;
pub mod codec;
pub mod io_task;
pub mod messages;
pub mod transport;

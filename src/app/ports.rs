//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ AppService (domain)
//! ```
//!
//! Driven adapters (sensors, buttons, display, indicator, network, storage)
//! implement these traits. The [`AppService`](super::service::AppService)
//! and the components around it consume them via generics, so the domain
//! core never touches hardware directly.
//!
//! ## Notes
//!
//! - **ConfigPort** implementations MUST validate before persisting.
//! - **SessionPort** and **BackendPort** never block: every call returns an
//!   outcome immediately, "not ready" included.

use core::fmt;

use super::commands::{InferenceReply, RemoteCommand};
use crate::config::RuntimeConfig;
use crate::drivers::button::ButtonId;
use crate::error::{CommsError, DisplayError};
use crate::fsm::Mode;
use crate::sensors::RawReadings;
use crate::sensors::window::SensorWindow;

// ───────────────────────────────────────────────────────────────
// Sensor port (driven adapter: hardware → domain)
// ───────────────────────────────────────────────────────────────

/// Read-side port used only by the windowing engine.
pub trait SensorPort {
    /// One read attempt per hardware channel. Must not block beyond a
    /// bus transaction.
    fn read_raw(&mut self) -> RawReadings;
}

// ───────────────────────────────────────────────────────────────
// Input port
// ───────────────────────────────────────────────────────────────

/// Raw (undebounced) button levels, `true` = pressed.
pub trait InputPort {
    fn read_buttons(&mut self) -> [bool; ButtonId::COUNT];
}

// ───────────────────────────────────────────────────────────────
// Indicator port (domain → LED / buzzer)
// ───────────────────────────────────────────────────────────────

pub trait IndicatorPort {
    /// Set the RGB mode LED colour.
    fn set_led(&mut self, r: u8, g: u8, b: u8);

    /// Drive the buzzer at `freq_hz`, or silence it with `None`.
    fn set_tone(&mut self, freq_hz: Option<u32>);
}

// ───────────────────────────────────────────────────────────────
// Display port
// ───────────────────────────────────────────────────────────────

/// Row-addressed text panel. Rows are drawn into a frame buffer and pushed
/// to the panel on `flush`.
pub trait DisplayPort {
    /// Replace the contents of one text row.
    fn draw_row(&mut self, row: usize, text: &str) -> Result<(), DisplayError>;

    /// Push every row drawn since the last flush.
    fn flush(&mut self) -> Result<(), DisplayError>;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port. Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Network session port
// ───────────────────────────────────────────────────────────────

/// Connection lifecycle as seen by every other component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityStatus {
    Disconnected,
    Connecting,
    Connected,
    /// Link lost; `n` reconnect attempts have failed since.
    Degraded(u32),
    /// No saved network. Nothing is retried until provisioning.
    AwaitingCredentials,
}

impl ConnectivityStatus {
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }

    /// Short label for the display status line.
    pub fn label(self) -> &'static str {
        match self {
            Self::Disconnected => "OFF",
            Self::Connecting => "...",
            Self::Connected => "NET",
            Self::Degraded(_) => "DEG",
            Self::AwaitingCredentials => "NOC",
        }
    }
}

impl fmt::Display for ConnectivityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "DISCONNECTED"),
            Self::Connecting => write!(f, "CONNECTING"),
            Self::Connected => write!(f, "CONNECTED"),
            Self::Degraded(n) => write!(f, "DEGRADED({n})"),
            Self::AwaitingCredentials => write!(f, "NO CREDENTIALS"),
        }
    }
}

/// Byte-level access to the backend link.
pub trait SessionPort {
    fn status(&self) -> ConnectivityStatus;

    /// Advance the connection lifecycle by at most one driver action.
    /// Returns the new status when it changed.
    fn poll(&mut self, now_ms: u64) -> Option<ConnectivityStatus>;

    /// Hand one whole frame to the link. Fails fast with
    /// [`CommsError::Unavailable`] unless CONNECTED, and with
    /// [`CommsError::Busy`] when the outbound path is full.
    fn send(&mut self, bytes: &[u8]) -> Result<(), CommsError>;

    /// Copy whatever has arrived into `buf`. `Ok(0)` means nothing yet.
    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, CommsError>;
}

// ───────────────────────────────────────────────────────────────
// Backend port (state machine → communication client)
// ───────────────────────────────────────────────────────────────

/// Result of one upload attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Handed to the link.
    Sent,
    /// Parked in the single pending slot; `replaced` is set when it
    /// superseded an undelivered older window.
    Pending { replaced: bool },
    /// Session unavailable; the window was discarded.
    Dropped,
}

/// Immediate answer to an inference request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferenceTicket {
    /// The request is in flight; its reply will carry this id.
    Pending(u32),
    /// Degraded synchronously: no link or no model.
    NoModel,
}

/// What the state machine needs from the backend client. The client only
/// returns results; it never touches device state.
pub trait BackendPort {
    fn status(&self) -> ConnectivityStatus;

    fn upload(&mut self, window: &SensorWindow, mode: Mode) -> UploadOutcome;

    fn infer(&mut self, window: &SensorWindow) -> InferenceTicket;

    /// Next inference reply received since the last call.
    fn poll_inference(&mut self) -> Option<InferenceReply>;

    /// Next remote command received since the last call.
    fn poll_command(&mut self) -> Option<RemoteCommand>;
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists runtime configuration.
///
/// Implementations MUST validate config values before persisting.
/// Invalid ranges are rejected with [`ConfigError::ValidationFailed`],
/// not silently clamped.
pub trait ConfigPort {
    /// Load configuration from persistent storage.
    /// Returns [`RuntimeConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<RuntimeConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&self, config: &RuntimeConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage for config blobs and credentials.
///
/// - Keys are namespaced to prevent collisions between subsystems.
/// - Write operations MUST be atomic; no partial writes on power loss.
///   The ESP-IDF NVS API guarantees this natively.
pub trait StoragePort {
    /// Read a value.  Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key.  Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Scheduler delegate (decouples scheduler from event system)
// ───────────────────────────────────────────────────────────────

/// Cadences driven by the tick scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TickKind {
    ButtonPoll = 0,
    Sample = 1,
    Network = 2,
    Display = 3,
    Housekeeping = 4,
}

impl TickKind {
    pub const COUNT: usize = 5;

    /// In discriminant order.
    pub const ALL: [TickKind; Self::COUNT] = [
        Self::ButtonPoll,
        Self::Sample,
        Self::Network,
        Self::Display,
        Self::Housekeeping,
    ];
}

/// Callback trait that the scheduler invokes when a cadence comes due.
///
/// The main loop implements this by forwarding to
/// [`push_event`](crate::events::push_event); the scheduler itself knows
/// nothing about events or queues.
pub trait SchedulerDelegate {
    fn on_tick_due(&mut self, kind: TickKind);
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// No config found in storage (first boot).
    NotFound,
    /// Stored config failed integrity / deserialization check.
    Corrupted,
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Underlying storage is full.
    StorageFull,
    /// Generic I/O error from the storage backend.
    IoError,
}

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Generic I/O error.
    IoError,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::StorageFull => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

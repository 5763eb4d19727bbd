//! Runtime configuration parameters
//!
//! All tunable parameters for the AURA controller. Values are persisted in
//! NVS as a postcard blob and fall back to [`RuntimeConfig::default`] when no
//! valid blob is stored.

use serde::{Deserialize, Serialize};

use crate::fsm::Mode;

/// Maximum length of the backend host string.
pub const HOST_MAX_LEN: usize = 64;

/// Core runtime configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    // --- Cadences ---
    /// Sensor sampling period (milliseconds). One window spans 30 of these.
    pub sample_period_ms: u32,
    /// Button line polling period (milliseconds). Must be faster than sampling.
    pub button_poll_ms: u32,
    /// Display refresh period (milliseconds)
    pub display_period_ms: u32,
    /// Network progress period (milliseconds)
    pub network_poll_ms: u32,

    // --- Buttons ---
    /// Consecutive stable polls required before a line change is accepted
    pub debounce_polls: u8,
    /// Auto-repeat Up/Down while held
    pub button_repeat: bool,
    pub repeat_delay_ms: u32,
    pub repeat_rate_ms: u32,

    // --- Connectivity ---
    /// Time without a CONNECTED session before the stale flag is raised
    pub stale_after_ms: u32,
    /// First reconnect delay; doubles per failure
    pub backoff_base_ms: u32,
    /// Upper bound for the reconnect delay
    pub backoff_max_ms: u32,
    /// An association attempt that has not completed by now counts as failed
    pub connect_timeout_ms: u32,
    pub backend_host: heapless::String<HOST_MAX_LEN>,
    pub backend_port: u16,
    /// TCP port the remote command listener binds to
    pub command_port: u16,

    // --- Alarm ---
    /// Sensor channel watched while the alarm is armed (4 = motion)
    pub alarm_channel: u8,
    /// Value at or above which the alarm condition holds
    pub alarm_threshold: f32,
    /// How long the condition must hold continuously (milliseconds)
    pub alarm_hold_ms: u32,
    pub alarm_clock_hour: u8,
    pub alarm_clock_minute: u8,
    pub alarm_clock_enabled: bool,

    // --- Mode policy ---
    /// Mode applied when the backend has no model or is unreachable
    pub default_mode: Mode,
    /// A local mode choice blocks inferred modes until Auto Mode is picked
    pub manual_override_holds: bool,

    // --- Supervision ---
    pub watchdog_timeout_ms: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let mut backend_host = heapless::String::new();
        // Fits: the literal is shorter than HOST_MAX_LEN.
        let _ = backend_host.push_str("192.168.1.5");
        Self {
            // Cadences
            sample_period_ms: 1000, // 1 Hz, 30 s windows
            button_poll_ms: 20,     // 50 Hz
            display_period_ms: 200,
            network_poll_ms: 50,

            // Buttons
            debounce_polls: 3, // 60 ms at 50 Hz
            button_repeat: true,
            repeat_delay_ms: 500,
            repeat_rate_ms: 150,

            // Connectivity
            stale_after_ms: 30_000,
            backoff_base_ms: 2_000,
            backoff_max_ms: 60_000,
            connect_timeout_ms: 10_000,
            backend_host,
            backend_port: 5000,
            command_port: 80,

            // Alarm
            alarm_channel: 4,
            alarm_threshold: 0.5,
            alarm_hold_ms: 3_000,
            alarm_clock_hour: 8,
            alarm_clock_minute: 0,
            alarm_clock_enabled: false,

            // Mode policy
            default_mode: Mode::AutoMode,
            manual_override_holds: false,

            watchdog_timeout_ms: 10_000,
        }
    }
}

impl RuntimeConfig {
    /// Number of button polls spanning `ms`, at least one.
    pub fn polls_for(&self, ms: u32) -> u16 {
        (ms / self.button_poll_ms.max(1)).clamp(1, u16::MAX as u32) as u16
    }
}

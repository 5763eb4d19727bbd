//! WiFi station session manager.
//!
//! Owns the connection lifecycle and implements [`SessionPort`], the
//! hexagonal boundary every other component uses to reach the backend.
//!
//! ```text
//!  AWAITING_CREDENTIALS ──[provision]──▶ DISCONNECTED
//!                                            │
//!                                            ▼
//!        ┌──────────────────────────────▶ CONNECTING ──[up]──▶ CONNECTED
//!        │                                   │                    │
//!   [retry_at]                           [failed/timeout]    [link lost]
//!        │                                   ▼                    │
//!        └──────────────────────────── DEGRADED(n) ◀──────────────┘
//! ```
//!
//! Nothing here blocks. `poll()` issues at most one driver action and
//! observes its completion on a later call.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: [`EspLink`] drives `esp_idf_svc::wifi`.
//! - **all other targets**: [`SimLink`] replays a scripted sequence of
//!   attempt outcomes for host-side tests.
//!
//! ## Reconnection policy
//!
//! After the n-th consecutive failure the session waits
//! `base · 2ⁿ` (capped) plus up to a quarter of that as jitter, so devices
//! sharing an access point do not retry in lock-step. The delay never
//! shrinks while failures keep accumulating.

use core::fmt;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::app::ports::{ConnectivityStatus, SessionPort};
use crate::config::RuntimeConfig;
use crate::error::CommsError;
use crate::rpc::transport::Transport;

// ───────────────────────────────────────────────────────────────
// Errors
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityError {
    NoCredentials,
    InvalidSsid,
    InvalidPassword,
    TooManyNetworks,
    ConnectionFailed,
}

impl fmt::Display for ConnectivityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCredentials => write!(f, "no WiFi credentials configured"),
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 printable ASCII bytes)"),
            Self::InvalidPassword => write!(f, "password invalid (must be 8-64 bytes for WPA2, or empty for open)"),
            Self::TooManyNetworks => write!(f, "at most {MAX_NETWORKS} networks can be saved"),
            Self::ConnectionFailed => write!(f, "WiFi connection failed"),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Credentials
// ───────────────────────────────────────────────────────────────

/// Saved networks, tried in rotation.
pub const MAX_NETWORKS: usize = 4;

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

fn validate_ssid(ssid: &str) -> Result<(), ConnectivityError> {
    if ssid.is_empty() || ssid.len() > 32 || !is_printable_ascii(ssid) {
        return Err(ConnectivityError::InvalidSsid);
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), ConnectivityError> {
    if password.is_empty() {
        return Ok(());
    }
    if password.len() < 8 || password.len() > 64 {
        return Err(ConnectivityError::InvalidPassword);
    }
    Ok(())
}

/// One saved network. An empty password means an open network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub ssid: heapless::String<32>,
    pub password: heapless::String<64>,
}

impl Credentials {
    pub fn new(ssid: &str, password: &str) -> Result<Self, ConnectivityError> {
        validate_ssid(ssid)?;
        validate_password(password)?;
        let mut c = Self {
            ssid: heapless::String::new(),
            password: heapless::String::new(),
        };
        c.ssid
            .push_str(ssid)
            .map_err(|_| ConnectivityError::InvalidSsid)?;
        c.password
            .push_str(password)
            .map_err(|_| ConnectivityError::InvalidPassword)?;
        Ok(c)
    }

    pub fn is_open(&self) -> bool {
        self.password.is_empty()
    }
}

pub type NetworkList = heapless::Vec<Credentials, MAX_NETWORKS>;

// ───────────────────────────────────────────────────────────────
// Platform link
// ───────────────────────────────────────────────────────────────

/// Progress of the radio link as reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Down,
    Associating,
    Up,
    Failed,
}

/// Non-blocking station driver.
pub trait WifiLink {
    /// Start associating with `creds`. Returns as soon as the request is
    /// issued; progress is observed through [`WifiLink::poll`].
    fn begin_connect(&mut self, creds: &Credentials) -> Result<(), ConnectivityError>;
    fn poll(&mut self) -> LinkState;
    fn disconnect(&mut self);
    fn rssi(&self) -> Option<i8>;
}

// ───────────────────────────────────────────────────────────────
// Backoff
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_ms: u32,
    pub max_ms: u32,
}

impl BackoffPolicy {
    pub fn from_config(cfg: &RuntimeConfig) -> Self {
        Self {
            base_ms: cfg.backoff_base_ms,
            max_ms: cfg.backoff_max_ms,
        }
    }

    /// Un-jittered delay after `failures` consecutive failures.
    pub fn nominal_ms(&self, failures: u32) -> u32 {
        let shift = failures.min(16);
        self.base_ms.saturating_mul(1 << shift).min(self.max_ms)
    }
}

/// xorshift32; seeded from the MAC so neighbours diverge.
#[derive(Debug, Clone, Copy)]
pub struct Jitter(u32);

impl Jitter {
    pub fn new(seed: u32) -> Self {
        Self(if seed == 0 { 0x9E37_79B9 } else { seed })
    }

    pub fn next(&mut self) -> u32 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.0 = x;
        x
    }
}

// ───────────────────────────────────────────────────────────────
// Session
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    AwaitingCredentials,
    Idle,
    Connecting { started_ms: u64, failures: u32 },
    Connected,
    Backoff { failures: u32, retry_at_ms: u64 },
}

pub struct WifiSession<L: WifiLink, T: Transport> {
    link: L,
    transport: T,
    networks: NetworkList,
    cursor: usize,
    phase: Phase,
    policy: BackoffPolicy,
    jitter: Jitter,
    last_delay_ms: u32,
    connect_timeout_ms: u32,
}

impl<L: WifiLink, T: Transport> WifiSession<L, T> {
    pub fn new(
        link: L,
        transport: T,
        policy: BackoffPolicy,
        connect_timeout_ms: u32,
        jitter_seed: u32,
    ) -> Self {
        Self {
            link,
            transport,
            networks: NetworkList::new(),
            cursor: 0,
            phase: Phase::AwaitingCredentials,
            policy,
            jitter: Jitter::new(jitter_seed),
            last_delay_ms: 0,
            connect_timeout_ms,
        }
    }

    pub fn from_config(link: L, transport: T, cfg: &RuntimeConfig, jitter_seed: u32) -> Self {
        Self::new(
            link,
            transport,
            BackoffPolicy::from_config(cfg),
            cfg.connect_timeout_ms,
            jitter_seed,
        )
    }

    /// Replace the saved networks wholesale. An empty list parks the
    /// session in AWAITING_CREDENTIALS.
    pub fn provision(&mut self, networks: NetworkList) {
        if self.phase == Phase::Connected {
            self.transport.link_changed(false);
        }
        self.link.disconnect();
        self.networks = networks;
        self.cursor = 0;
        self.last_delay_ms = 0;
        self.phase = if self.networks.is_empty() {
            warn!("WiFi: no saved networks, waiting for provisioning");
            Phase::AwaitingCredentials
        } else {
            info!("WiFi: {} network(s) provisioned", self.networks.len());
            Phase::Idle
        };
    }

    /// Forget every saved network.
    pub fn clear_credentials(&mut self) {
        self.provision(NetworkList::new());
    }

    fn start_attempt(&mut self, now_ms: u64, failures: u32) {
        let Some(creds) = self.networks.get(self.cursor) else {
            self.phase = Phase::AwaitingCredentials;
            return;
        };
        info!(
            "WiFi: connecting to '{}' (attempt {})",
            creds.ssid,
            failures + 1
        );
        match self.link.begin_connect(creds) {
            Ok(()) => {
                self.phase = Phase::Connecting {
                    started_ms: now_ms,
                    failures,
                };
            }
            Err(e) => {
                warn!("WiFi: connect request rejected: {}", e);
                self.attempt_failed(now_ms, failures);
            }
        }
    }

    fn attempt_failed(&mut self, now_ms: u64, failures: u32) {
        let failures = failures.saturating_add(1);
        if !self.networks.is_empty() {
            self.cursor = (self.cursor + 1) % self.networks.len();
        }
        let delay = self.retry_delay(failures);
        warn!("WiFi: attempt failed ({} in a row), retry in {} ms", failures, delay);
        self.phase = Phase::Backoff {
            failures,
            retry_at_ms: now_ms + u64::from(delay),
        };
    }

    fn retry_delay(&mut self, failures: u32) -> u32 {
        let nominal = self.policy.nominal_ms(failures);
        let spread = nominal / 4;
        let jitter = if spread == 0 {
            0
        } else {
            self.jitter.next() % (spread + 1)
        };
        let mut delay = nominal.saturating_add(jitter).min(self.policy.max_ms);
        if failures > 0 {
            delay = delay.max(self.last_delay_ms);
        }
        self.last_delay_ms = delay;
        delay
    }

    /// Delay chosen for the current backoff, 0 while connected.
    pub fn last_retry_delay_ms(&self) -> u32 {
        self.last_delay_ms
    }

    pub fn rssi(&self) -> Option<i8> {
        match self.phase {
            Phase::Connected => self.link.rssi(),
            _ => None,
        }
    }

    pub fn networks(&self) -> &NetworkList {
        &self.networks
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }
}

// ───────────────────────────────────────────────────────────────
// SessionPort
// ───────────────────────────────────────────────────────────────

impl<L: WifiLink, T: Transport> SessionPort for WifiSession<L, T> {
    /// Advance the connection lifecycle. Returns the new status when it
    /// changed.
    fn poll(&mut self, now_ms: u64) -> Option<ConnectivityStatus> {
        let before = self.status();

        match self.phase {
            Phase::AwaitingCredentials => {}
            Phase::Idle => self.start_attempt(now_ms, 0),
            Phase::Connecting {
                started_ms,
                failures,
            } => match self.link.poll() {
                LinkState::Up => {
                    let ssid = self.networks.get(self.cursor).map(|c| c.ssid.as_str());
                    info!(
                        "WiFi: connected to '{}' (RSSI={:?})",
                        ssid.unwrap_or("?"),
                        self.link.rssi()
                    );
                    self.phase = Phase::Connected;
                    self.last_delay_ms = 0;
                    self.transport.link_changed(true);
                }
                LinkState::Failed => self.attempt_failed(now_ms, failures),
                LinkState::Associating | LinkState::Down => {
                    if now_ms.saturating_sub(started_ms) >= u64::from(self.connect_timeout_ms) {
                        warn!("WiFi: association timed out");
                        self.link.disconnect();
                        self.attempt_failed(now_ms, failures);
                    }
                }
            },
            Phase::Connected => {
                if self.link.poll() != LinkState::Up {
                    warn!("WiFi: connection lost, entering reconnect");
                    self.transport.link_changed(false);
                    let delay = self.retry_delay(0);
                    self.phase = Phase::Backoff {
                        failures: 0,
                        retry_at_ms: now_ms + u64::from(delay),
                    };
                }
            }
            Phase::Backoff {
                failures,
                retry_at_ms,
            } => {
                if now_ms >= retry_at_ms {
                    self.start_attempt(now_ms, failures);
                }
            }
        }

        let after = self.status();
        (after != before).then_some(after)
    }

    fn status(&self) -> ConnectivityStatus {
        match self.phase {
            Phase::AwaitingCredentials => ConnectivityStatus::AwaitingCredentials,
            Phase::Idle => ConnectivityStatus::Disconnected,
            Phase::Connecting { .. } => ConnectivityStatus::Connecting,
            Phase::Connected => ConnectivityStatus::Connected,
            Phase::Backoff { failures, .. } => ConnectivityStatus::Degraded(failures),
        }
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), CommsError> {
        if self.phase != Phase::Connected {
            return Err(CommsError::Unavailable);
        }
        match self.transport.write(bytes) {
            Ok(n) if n == bytes.len() => Ok(()),
            Ok(_) => Err(CommsError::Busy),
            Err(e) => {
                warn!("WiFi: transport write failed: {:?}", e);
                Err(CommsError::Unavailable)
            }
        }
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, CommsError> {
        if self.phase != Phase::Connected {
            return Err(CommsError::Unavailable);
        }
        self.transport
            .read(buf)
            .map_err(|_| CommsError::Unavailable)
    }
}

// ───────────────────────────────────────────────────────────────
// Simulation link (host)
// ───────────────────────────────────────────────────────────────

/// Scripted link for host tests. Each `begin_connect` consumes the next
/// scripted outcome; an exhausted script fails every attempt.
#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Default)]
pub struct SimLink {
    script: std::collections::VecDeque<LinkState>,
    state: Option<LinkState>,
    pub attempts: u32,
    pub last_ssid: Option<heapless::String<32>>,
}

#[cfg(not(target_os = "espidf"))]
impl SimLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue outcomes for upcoming attempts (`Up`, `Failed`, or
    /// `Associating` for one that never completes).
    pub fn script(&mut self, outcomes: &[LinkState]) {
        self.script.extend(outcomes.iter().copied());
    }

    /// Simulate the access point going away.
    pub fn drop_link(&mut self) {
        self.state = Some(LinkState::Down);
    }
}

#[cfg(not(target_os = "espidf"))]
impl WifiLink for SimLink {
    fn begin_connect(&mut self, creds: &Credentials) -> Result<(), ConnectivityError> {
        self.attempts += 1;
        self.last_ssid = Some(creds.ssid.clone());
        self.state = Some(self.script.pop_front().unwrap_or(LinkState::Failed));
        Ok(())
    }

    fn poll(&mut self) -> LinkState {
        self.state.unwrap_or(LinkState::Down)
    }

    fn disconnect(&mut self) {
        self.state = None;
    }

    fn rssi(&self) -> Option<i8> {
        (self.state == Some(LinkState::Up)).then_some(-58)
    }
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF link
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub struct EspLink {
    wifi: esp_idf_svc::wifi::EspWifi<'static>,
    requested: bool,
}

#[cfg(target_os = "espidf")]
impl EspLink {
    pub fn new(wifi: esp_idf_svc::wifi::EspWifi<'static>) -> Self {
        Self {
            wifi,
            requested: false,
        }
    }
}

#[cfg(target_os = "espidf")]
impl WifiLink for EspLink {
    fn begin_connect(&mut self, creds: &Credentials) -> Result<(), ConnectivityError> {
        use esp_idf_svc::wifi::{AuthMethod, ClientConfiguration, Configuration};

        let auth_method = if creds.is_open() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };
        let config = Configuration::Client(ClientConfiguration {
            ssid: creds
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| ConnectivityError::InvalidSsid)?,
            password: creds
                .password
                .as_str()
                .try_into()
                .map_err(|_| ConnectivityError::InvalidPassword)?,
            auth_method,
            ..Default::default()
        });

        let _ = self.wifi.disconnect();
        self.wifi
            .set_configuration(&config)
            .map_err(|_| ConnectivityError::ConnectionFailed)?;
        if !self.wifi.is_started().unwrap_or(false) {
            self.wifi
                .start()
                .map_err(|_| ConnectivityError::ConnectionFailed)?;
        }
        // EspWifi::connect only issues esp_wifi_connect; association
        // completes asynchronously.
        self.wifi
            .connect()
            .map_err(|_| ConnectivityError::ConnectionFailed)?;
        self.requested = true;
        Ok(())
    }

    fn poll(&mut self) -> LinkState {
        if !self.requested {
            return LinkState::Down;
        }
        match (self.wifi.is_connected(), self.wifi.is_up()) {
            (Ok(true), Ok(true)) => LinkState::Up,
            (Ok(true), _) => LinkState::Associating,
            (Ok(false), _) => LinkState::Associating,
            (Err(_), _) => LinkState::Failed,
        }
    }

    fn disconnect(&mut self) {
        self.requested = false;
        let _ = self.wifi.disconnect();
    }

    fn rssi(&self) -> Option<i8> {
        let mut info = esp_idf_sys::wifi_ap_record_t::default();
        // SAFETY: `info` is a valid out-parameter for the duration of the call.
        let ret = unsafe { esp_idf_sys::esp_wifi_sta_get_ap_info(&mut info) };
        (ret == esp_idf_sys::ESP_OK).then_some(info.rssi)
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::transport::NullTransport;

    fn creds(ssid: &str) -> Credentials {
        Credentials::new(ssid, "password1").unwrap()
    }

    fn session() -> WifiSession<SimLink, NullTransport> {
        WifiSession::new(
            SimLink::new(),
            NullTransport,
            BackoffPolicy {
                base_ms: 1000,
                max_ms: 8000,
            },
            5000,
            42,
        )
    }

    fn provisioned(ssids: &[&str]) -> WifiSession<SimLink, NullTransport> {
        let mut s = session();
        let mut list = NetworkList::new();
        for ssid in ssids {
            list.push(creds(ssid)).unwrap();
        }
        s.provision(list);
        s
    }

    /// Step until the session leaves its current backoff.
    fn run_until_retry(s: &mut WifiSession<SimLink, NullTransport>, now: &mut u64) {
        let delay = u64::from(s.last_retry_delay_ms());
        *now += delay;
        s.poll(*now);
    }

    #[test]
    fn rejects_empty_ssid() {
        assert_eq!(Credentials::new("", "password123"), Err(ConnectivityError::InvalidSsid));
    }

    #[test]
    fn rejects_short_password() {
        assert_eq!(Credentials::new("MyNet", "short"), Err(ConnectivityError::InvalidPassword));
    }

    #[test]
    fn accepts_open_network() {
        assert!(Credentials::new("OpenCafe", "").unwrap().is_open());
    }

    #[test]
    fn without_credentials_never_retries() {
        let mut s = session();
        assert_eq!(s.status(), ConnectivityStatus::AwaitingCredentials);
        for t in 0..100 {
            assert_eq!(s.poll(t * 1000), None);
        }
        assert_eq!(s.link().attempts, 0);
        assert_eq!(s.send(b"x"), Err(CommsError::Unavailable));
    }

    #[test]
    fn connects_over_several_polls() {
        let mut s = provisioned(&["Home"]);
        s.link_mut().script(&[LinkState::Up]);
        assert_eq!(s.status(), ConnectivityStatus::Disconnected);
        assert_eq!(s.poll(0), Some(ConnectivityStatus::Connecting));
        assert_eq!(s.poll(10), Some(ConnectivityStatus::Connected));
        assert!(s.rssi().is_some());
        assert_eq!(s.send(b"frame"), Ok(()));
    }

    #[test]
    fn failures_count_up_and_success_resets() {
        let mut s = provisioned(&["Home"]);
        s.link_mut()
            .script(&[LinkState::Failed, LinkState::Failed, LinkState::Up]);
        let mut now = 0;
        s.poll(now); // begin attempt 1
        s.poll(now); // observe failure
        assert_eq!(s.status(), ConnectivityStatus::Degraded(1));

        run_until_retry(&mut s, &mut now);
        assert_eq!(s.status(), ConnectivityStatus::Connecting);
        s.poll(now);
        assert_eq!(s.status(), ConnectivityStatus::Degraded(2));

        run_until_retry(&mut s, &mut now);
        s.poll(now);
        assert_eq!(s.status(), ConnectivityStatus::Connected);
        assert_eq!(s.last_retry_delay_ms(), 0);

        s.link_mut().drop_link();
        s.poll(now);
        assert_eq!(s.status(), ConnectivityStatus::Degraded(0));
    }

    #[test]
    fn backoff_is_monotone_and_capped() {
        let mut s = provisioned(&["Home"]);
        let mut now = 0;
        s.poll(now);
        let mut prev = 0;
        for k in 1..=10 {
            s.poll(now);
            assert_eq!(s.status(), ConnectivityStatus::Degraded(k));
            let d = s.last_retry_delay_ms();
            assert!(d >= prev, "delay shrank: {d} < {prev}");
            assert!(d <= 8000);
            prev = d;
            run_until_retry(&mut s, &mut now);
        }
        assert_eq!(prev, 8000);
    }

    #[test]
    fn retry_waits_for_backoff() {
        let mut s = provisioned(&["Home"]);
        s.poll(0);
        s.poll(0);
        let attempts = s.link().attempts;
        let delay = u64::from(s.last_retry_delay_ms());
        s.poll(delay - 1);
        assert_eq!(s.link().attempts, attempts);
        s.poll(delay);
        assert_eq!(s.link().attempts, attempts + 1);
    }

    #[test]
    fn attempt_times_out() {
        let mut s = provisioned(&["Home"]);
        s.link_mut().script(&[LinkState::Associating]);
        s.poll(0);
        s.poll(4_999);
        assert_eq!(s.status(), ConnectivityStatus::Connecting);
        s.poll(5_000);
        assert_eq!(s.status(), ConnectivityStatus::Degraded(1));
    }

    #[test]
    fn rotates_through_saved_networks() {
        let mut s = provisioned(&["First", "Second"]);
        let mut now = 0;
        s.poll(now);
        assert_eq!(s.link().last_ssid.as_deref(), Some("First"));
        s.poll(now);
        run_until_retry(&mut s, &mut now);
        assert_eq!(s.link().last_ssid.as_deref(), Some("Second"));
    }

    #[test]
    fn clearing_credentials_stops_everything() {
        let mut s = provisioned(&["Home"]);
        s.link_mut().script(&[LinkState::Up]);
        s.poll(0);
        s.poll(1);
        assert!(s.status().is_connected());
        s.clear_credentials();
        assert_eq!(s.status(), ConnectivityStatus::AwaitingCredentials);
        assert_eq!(s.send(b"x"), Err(CommsError::Unavailable));
    }

    #[test]
    fn jitter_separates_seeds() {
        let mut a = Jitter::new(1);
        let mut b = Jitter::new(2);
        assert_ne!(a.next(), b.next());
        assert_ne!(Jitter::new(0).next(), 0);
    }
}

//! Mock hardware and a host-side rig that drives the application the way
//! the firmware event loop does.
//!
//! Everything below the [`BackendPort`] is real: the backend client, the
//! Wi-Fi session (on a scripted link), the channel transport and the frame
//! codec. Only the sensor board, the buttons, the LED, the buzzer and the
//! panel are mocked.

use aura::adapters::nvs::NvsAdapter;
use aura::adapters::wifi::{Credentials, LinkState, NetworkList, SimLink, WifiSession};
use aura::app::events::AppEvent;
use aura::app::ports::{DisplayPort, EventSink, IndicatorPort, InputPort, SensorPort};
use aura::app::service::AppService;
use aura::config::RuntimeConfig;
use aura::drivers::button::ButtonId;
use aura::error::DisplayError;
use aura::rpc::channels::{
    BackendChannels, ChannelCommandPort, ChannelTransport, Chunk, InboundCommand,
};
use aura::rpc::client::BackendClient;
use aura::rpc::codec::{FrameDecoder, encode_frame};
use aura::scheduler::{DueTicks, HOUSEKEEPING_PERIOD_MS, Scheduler};
use aura::sensors::RawReadings;

/// Main-loop granularity of the rig.
pub const STEP_MS: u64 = 10;

// ── MockBoard ─────────────────────────────────────────────────

/// Sensors, buttons, LED and buzzer in one mock.
pub struct MockBoard {
    pub readings: RawReadings,
    pub buttons: [bool; ButtonId::COUNT],
    pub leds: Vec<(u8, u8, u8)>,
    pub tones: Vec<Option<u32>>,
}

#[allow(dead_code)]
impl MockBoard {
    pub fn new() -> Self {
        Self {
            readings: [Ok(120.0), Ok(110.0), Ok(40.0), Ok(42.0), Ok(0.0)],
            buttons: [false; ButtonId::COUNT],
            leds: Vec::new(),
            tones: Vec::new(),
        }
    }

    pub fn set_motion(&mut self, on: bool) {
        self.readings[4] = Ok(if on { 1.0 } else { 0.0 });
    }

    pub fn tone(&self) -> Option<u32> {
        self.tones.last().copied().flatten()
    }

    pub fn rang(&self) -> bool {
        self.tones.iter().any(Option::is_some)
    }
}

impl Default for MockBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorPort for MockBoard {
    fn read_raw(&mut self) -> RawReadings {
        self.readings
    }
}

impl InputPort for MockBoard {
    fn read_buttons(&mut self) -> [bool; ButtonId::COUNT] {
        self.buttons
    }
}

impl IndicatorPort for MockBoard {
    fn set_led(&mut self, r: u8, g: u8, b: u8) {
        self.leds.push((r, g, b));
    }

    fn set_tone(&mut self, freq_hz: Option<u32>) {
        self.tones.push(freq_hz);
    }
}

// ── MockPanel ─────────────────────────────────────────────────

/// Text panel that keeps what is on screen and counts bus traffic.
#[derive(Default)]
pub struct MockPanel {
    pub rows: [String; 4],
    pub row_writes: usize,
    pub flushes: usize,
    pub fail: bool,
}

#[allow(dead_code)]
impl MockPanel {
    pub fn row(&self, i: usize) -> &str {
        self.rows[i].trim_end()
    }
}

impl DisplayPort for MockPanel {
    fn draw_row(&mut self, row: usize, text: &str) -> Result<(), DisplayError> {
        if self.fail {
            return Err(DisplayError::BusWriteFailed);
        }
        self.rows[row] = text.to_string();
        self.row_writes += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), DisplayError> {
        if self.fail {
            return Err(DisplayError::BusWriteFailed);
        }
        self.flushes += 1;
        Ok(())
    }
}

// ── LogSink ───────────────────────────────────────────────────

/// Event sink that collects events for assertion.
#[derive(Default)]
pub struct LogSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for LogSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── Rig ───────────────────────────────────────────────────────

pub type Session = WifiSession<SimLink, ChannelTransport<'static>>;
pub type Client = BackendClient<Session, ChannelCommandPort<'static>>;

pub fn networks(ssids: &[&str]) -> NetworkList {
    let mut list = NetworkList::new();
    for ssid in ssids {
        list.push(Credentials::new(ssid, "password1").unwrap()).unwrap();
    }
    list
}

/// Cadences short enough that a window seals in three seconds.
pub fn fast_config() -> RuntimeConfig {
    RuntimeConfig {
        sample_period_ms: 100,
        stale_after_ms: 1_000,
        backoff_base_ms: 200,
        backoff_max_ms: 1_600,
        ..RuntimeConfig::default()
    }
}

pub struct Rig {
    pub app: AppService,
    pub client: Client,
    pub board: MockBoard,
    pub panel: MockPanel,
    pub sink: LogSink,
    pub nvs: NvsAdapter,
    pub channels: &'static BackendChannels,
    pub wall_clock: Option<(u8, u8)>,
    pub now: u64,
    sched: Scheduler,
    decoder: FrameDecoder,
}

#[allow(dead_code)]
impl Rig {
    /// Boot with `networks` provisioned and the link outcomes scripted.
    pub fn boot(config: RuntimeConfig, networks: NetworkList, link: &[LinkState]) -> Self {
        // Each rig owns its channels so tests can run in parallel.
        let channels: &'static BackendChannels = Box::leak(Box::new(BackendChannels::new()));
        let mut session =
            WifiSession::from_config(SimLink::new(), ChannelTransport::new(channels), &config, 7);
        session.link_mut().script(link);
        session.provision(networks);

        let mut client = BackendClient::new(session, ChannelCommandPort::new(channels));
        client.listen_for_commands();

        let mut sink = LogSink::new();
        let sched = Scheduler::new(&config);
        let mut app = AppService::new(config, "AURA-EFCAFE");
        app.start(0, &mut sink);

        Self {
            app,
            client,
            board: MockBoard::new(),
            panel: MockPanel::default(),
            sink,
            nvs: NvsAdapter::new().unwrap(),
            channels,
            wall_clock: None,
            now: 0,
            sched,
            decoder: FrameDecoder::new(),
        }
    }

    /// Boot connected to a single network.
    pub fn online(config: RuntimeConfig) -> Self {
        let mut rig = Self::boot(config, networks(&["Home"]), &[LinkState::Up]);
        rig.run_for(100);
        rig
    }

    /// One main-loop iteration.
    pub fn step(&mut self) {
        self.now += STEP_MS;
        let mut due = DueTicks::default();
        self.sched.poll(self.now, &mut due);

        if due.network {
            self.client.poll(self.now);
        }
        self.app.set_wall_clock(self.wall_clock);
        self.app.cycle(
            self.now,
            due,
            &mut self.board,
            &mut self.client,
            &mut self.panel,
            &mut self.sink,
        );
        if due.housekeeping {
            self.app.auto_save_if_needed(self.now, &self.nvs, &mut self.sink);
        }
    }

    pub fn run_for(&mut self, ms: u64) {
        for _ in 0..ms / STEP_MS {
            self.step();
        }
    }

    /// Hold a button past the debounce, then let go.
    pub fn press(&mut self, button: ButtonId) {
        self.board.buttons[button as usize] = true;
        self.run_for(100);
        self.board.buttons[button as usize] = false;
        self.run_for(100);
    }

    /// Open the menu and select the item at `index`.
    pub fn pick(&mut self, index: usize) {
        self.press(ButtonId::Select);
        for _ in 0..index {
            self.press(ButtonId::Down);
        }
        self.press(ButtonId::Select);
    }

    /// Run until the next window seals.
    pub fn seal_window(&mut self) {
        let target = self.app.windows_sealed() + 1;
        for _ in 0..10_000 {
            if self.app.windows_sealed() >= target {
                return;
            }
            self.step();
        }
        panic!("no window sealed");
    }

    /// Every frame the device has written to the backend socket, decoded.
    pub fn sent(&mut self) -> Vec<serde_json::Value> {
        let mut out = Vec::new();
        while let Ok(frame) = self.channels.outbound.try_receive() {
            let mut data: &[u8] = &frame;
            while !data.is_empty() {
                let (used, payload) = self.decoder.feed(data);
                data = &data[used..];
                if let Some(p) = payload {
                    out.push(serde_json::from_slice(p).unwrap());
                }
            }
        }
        out
    }

    /// Deliver one backend frame to the device.
    pub fn backend_says(&mut self, json: &str) {
        let mut buf = [0u8; 512];
        let n = encode_frame(json.as_bytes(), &mut buf).unwrap();
        for piece in buf[..n].chunks(64) {
            self.channels
                .inbound
                .try_send(Chunk::from_slice(piece).unwrap())
                .unwrap();
        }
    }

    /// Deliver one line on the command channel.
    pub fn app_says(&mut self, conn: u32, line: &str) {
        self.channels
            .commands
            .try_send(InboundCommand {
                conn,
                line: heapless::Vec::from_slice(line.as_bytes()).unwrap(),
            })
            .unwrap();
    }

    /// Acknowledgements written back on the command channel.
    pub fn acks(&mut self) -> Vec<(u32, String)> {
        let mut out = Vec::new();
        while let Ok(ack) = self.channels.acks.try_receive() {
            out.push((ack.conn, ack.text.as_str().to_string()));
        }
        out
    }

    pub fn housekeeping_period() -> u64 {
        u64::from(HOUSEKEEPING_PERIOD_MS)
    }
}

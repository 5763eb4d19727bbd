//! AURA Firmware: Main Entry Point
//!
//! Hexagonal architecture with a single cooperative event loop.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  HardwareAdapter    LogEventSink   NvsAdapter   Esp32Time      │
//! │  (Sensor+Input+     (EventSink)    (Config+NVS) (uptime, RTC)  │
//! │   Indicator)                                                   │
//! │  WifiSession ──▶ BackendClient ◀── io_task (async sockets)     │
//! │  (SessionPort)   (BackendPort)                                 │
//! │  Oled (DisplayPort)                                            │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              AppService (pure logic)                   │    │
//! │  │  buttons → remote → window → inference → FSM → display │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  Scheduler (delegate-driven) ──▶ tick queue ──▶ DueTicks       │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::net::ToSocketAddrs;
use std::time::Duration;

use anyhow::{Context, Result};
use esp_idf_hal::gpio::{AnyIOPin, IOPin, Input, PinDriver, Pull};
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::sntp::EspSntp;
use esp_idf_svc::wifi::EspWifi;
use log::{info, warn};

use aura::adapters::device_id;
use aura::adapters::hardware::{HardwareAdapter, SensorBoard};
use aura::adapters::log_sink::LogEventSink;
use aura::adapters::nvs::NvsAdapter;
use aura::adapters::time::Esp32TimeAdapter;
use aura::adapters::wifi::{EspLink, WifiSession};
use aura::app::ports::{ConfigPort, SchedulerDelegate, TickKind};
use aura::app::service::AppService;
use aura::config::RuntimeConfig;
use aura::display::oled::Oled;
use aura::drivers::button::ButtonLines;
use aura::drivers::buzzer::Buzzer;
use aura::drivers::status_led::StatusLed;
use aura::drivers::{hw_init, watchdog::Watchdog};
use aura::events::{drain_events, push_event};
use aura::pins;
use aura::rpc::channels::{BackendChannels, ChannelCommandPort, ChannelTransport};
use aura::rpc::client::BackendClient;
use aura::rpc::io_task::{self, IoExecutor};
use aura::scheduler::{DueTicks, Scheduler};

/// Channels shared by the event loop and the socket tasks.
static CHANNELS: BackendChannels = BackendChannels::new();

/// Executor steps granted to the socket tasks per loop iteration.
const IO_BUDGET: usize = 8;
/// Upper bound on the idle sleep so the socket tasks keep moving.
const MAX_IDLE_MS: u64 = 10;

// ── Scheduler delegate ────────────────────────────────────────
//
// Bridges the scheduler (which knows nothing about the event system)
// to the lock-free tick queue.

struct EventQueueDelegate;

impl SchedulerDelegate for EventQueueDelegate {
    fn on_tick_due(&mut self, kind: TickKind) {
        if !push_event(kind) {
            warn!("tick queue full, {:?} dropped", kind);
        }
    }
}

type ButtonPin = PinDriver<'static, AnyIOPin, Input>;

fn button_pin(pin: AnyIOPin) -> Result<ButtonPin> {
    let mut driver = PinDriver::input(pin)?;
    driver.set_pull(Pull::Up)?;
    Ok(driver)
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  AURA v{}                          ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    hw_init::init_peripherals().map_err(|e| anyhow::anyhow!("HAL init failed: {}", e))?;

    // ── 2. Load config and credentials from NVS ───────────────
    let nvs = NvsAdapter::new().map_err(|e| anyhow::anyhow!("NVS init failed: {}", e))?;
    let config = match nvs.load() {
        Ok(cfg) => {
            info!("Config loaded from NVS");
            cfg
        }
        Err(e) => {
            warn!("NVS config load failed ({}), using defaults", e);
            RuntimeConfig::default()
        }
    };
    let watchdog = Watchdog::new(config.watchdog_timeout_ms);

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;

    // ── 3. Device identity ────────────────────────────────────
    let mac = device_id::read_mac();
    let dev_id = device_id::device_id(&mac);
    info!("Device ID: {}", dev_id);

    // ── 4. Network session + backend client ───────────────────
    let wifi = EspWifi::new(peripherals.modem, sysloop.clone(), Some(nvs_partition))?;
    let mut session = WifiSession::from_config(
        EspLink::new(wifi),
        ChannelTransport::new(&CHANNELS),
        &config,
        device_id::jitter_seed(&mac),
    );
    session.provision(nvs.load_networks());

    let backend_addr = (config.backend_host.as_str(), config.backend_port)
        .to_socket_addrs()?
        .next()
        .context("backend address did not resolve")?;
    let executor: &'static IoExecutor<'static> = Box::leak(Box::new(IoExecutor::new()));
    io_task::spawn(executor, &CHANNELS, backend_addr, config.command_port);

    let mut client = BackendClient::new(session, ChannelCommandPort::new(&CHANNELS));
    client.listen_for_commands();

    // Wall clock for the alarm; stays unsynced until the link is up.
    let _sntp = EspSntp::new_default()?;

    // ── 5. Local peripherals ──────────────────────────────────
    let mut oled = Oled::new(pins::OLED_ADDR);
    if let Err(e) = oled.init() {
        warn!("OLED init failed ({}), display retries on every refresh", e);
    }

    let mut board = SensorBoard::new();
    board.init();
    let gpio = peripherals.pins;
    let buttons = ButtonLines::new([
        button_pin(gpio.gpio33.downgrade())?,
        button_pin(gpio.gpio27.downgrade())?,
        button_pin(gpio.gpio18.downgrade())?,
        button_pin(gpio.gpio5.downgrade())?,
    ]);
    let mut hw = HardwareAdapter::new(board, buttons, StatusLed::new(), Buzzer::new());

    // ── 6. Application service ────────────────────────────────
    let time = Esp32TimeAdapter::new();
    let mut log_sink = LogEventSink::new();
    let mut sched = Scheduler::new(&config);
    let mut sched_delegate = EventQueueDelegate;
    let mut app = AppService::new(config, dev_id.as_str());
    app.start(time.uptime_ms(), &mut log_sink);

    info!("System ready. Entering event loop.");

    // ── 7. Event loop ─────────────────────────────────────────
    loop {
        let now_ms = time.uptime_ms();
        sched.poll(now_ms, &mut sched_delegate);

        let mut due = DueTicks::default();
        drain_events(|kind| due.mark(kind));

        if due.network {
            client.poll(now_ms);
        }
        app.set_wall_clock(time.wall_clock_hm());
        app.cycle(now_ms, due, &mut hw, &mut client, &mut oled, &mut log_sink);

        if due.housekeeping {
            app.auto_save_if_needed(now_ms, &nvs, &mut log_sink);
            if hw.button_read_errors() > 0 {
                warn!("button read errors: {}", hw.button_read_errors());
            }
        }

        watchdog.feed();
        io_task::run_ready(executor, IO_BUDGET);

        let idle = sched
            .next_deadline()
            .saturating_sub(time.uptime_ms())
            .min(MAX_IDLE_MS);
        if idle > 0 {
            std::thread::sleep(Duration::from_millis(idle));
        }
    }
}

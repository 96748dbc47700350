//! TrapWatch: ESP-IDF std dashboard firmware
//!
//! Thread-based dashboard using FreeRTOS threads and std::sync::mpsc
//! channels. Feature-equivalent to the embassy dashboard, plus a serial
//! command interface. ESP-NOW via esp-idf-svc.

mod leds;

use std::io::Read;
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use esp_idf_svc::espnow::{EspNow, ReceiveInfo};
use esp_idf_svc::hal::gpio::OutputPin;
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::wifi::{BlockingWifi, EspWifi};
use esp_idf_svc::{eventloop::EspSystemEventLoop, nvs::EspDefaultNvsPartition};

use trapwatch::comm::{self, CommandReply, LineReader};
use trapwatch::config::LivenessConfig;
use trapwatch::dashboard::Dashboard;
use trapwatch::identity::TrapIdentity;
use trapwatch::indicator;
use trapwatch::liveness::{TrapEvent, MAX_TRAPS};
use trapwatch::platform::{Clock, Timestamp};
use trapwatch::protocol::{MsgBuffer, VERSION};
use trapwatch::{board, defaults};

use leds::LedPanel;

type SharedDashboard = Arc<Dashboard<CriticalSectionRawMutex, MAX_TRAPS>>;

/// Monotonic clock anchored at boot (esp_timer backed).
#[derive(Clone, Copy)]
struct BootClock(Instant);

impl Clock for BootClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.0.elapsed().as_millis() as u64)
    }
}

impl BootClock {
    fn uptime_secs(&self) -> u32 {
        self.0.elapsed().as_secs() as u32
    }
}

/// Hand an event to the indicator thread. A full queue only delays the LEDs
/// until the next periodic redraw, but the event line is lost.
fn queue_event(event_tx: &SyncSender<TrapEvent>, event: TrapEvent) {
    if event_tx.try_send(event).is_err() {
        log::warn!("Event queue full, dropped {} for {}", event.kind.as_str(), event.id);
    }
}

fn queue_line(output_tx: &SyncSender<MsgBuffer>, line: MsgBuffer) {
    if output_tx.try_send(line).is_err() {
        log::warn!("Output queue full, dropped report line");
    }
}

fn main() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();

    // Bind the ESP-IDF logger to the `log` facade
    esp_idf_svc::log::EspLogger::initialize_default();

    let clock = BootClock(Instant::now());

    log::info!("TrapWatch dashboard v{} starting on {} (std)", VERSION, board::BOARD_NAME);

    // ── Dashboard ────────────────────────────────────────────────────

    let ids: heapless::Vec<TrapIdentity, MAX_TRAPS> = defaults::TRAPS.iter().map(|t| t.id).collect();
    let config = LivenessConfig::new(
        defaults::WAKE_INTERVAL,
        defaults::CONNECTIVITY_TIMEOUT,
        defaults::WATCHDOG_PERIOD,
    )
    .map_err(|e| anyhow!("liveness config: {}", e))?;
    let dashboard: SharedDashboard =
        Arc::new(Dashboard::new(&ids, config).map_err(|e| anyhow!("trap table: {}", e))?);

    log::info!(
        "Tracking {} traps, timeout {}s, report interval {}s",
        dashboard.trap_count(),
        config.timeout().as_secs(),
        config.wake_interval().as_secs()
    );

    // ── Peripherals ──────────────────────────────────────────────────

    let peripherals = Peripherals::take()?;
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    #[cfg(feature = "devkit")]
    let pins = [
        (peripherals.pins.gpio27.downgrade_output(), peripherals.pins.gpio33.downgrade_output()),
        (peripherals.pins.gpio25.downgrade_output(), peripherals.pins.gpio26.downgrade_output()),
    ];
    #[cfg(all(feature = "xiao", not(feature = "devkit")))]
    let pins = [
        (peripherals.pins.gpio3.downgrade_output(), peripherals.pins.gpio4.downgrade_output()),
        (peripherals.pins.gpio5.downgrade_output(), peripherals.pins.gpio6.downgrade_output()),
    ];
    for (slot, (connected, triggered)) in board::INDICATOR_PINS.iter().enumerate() {
        log::info!("Slot {}: connected LED GPIO{}, triggered LED GPIO{}", slot, connected, triggered);
    }
    let panel = LedPanel::new(&ids, pins)?;

    // ── Channels ─────────────────────────────────────────────────────

    let (event_tx, event_rx) = mpsc::sync_channel::<TrapEvent>(16);
    let (output_tx, output_rx) = mpsc::sync_channel::<MsgBuffer>(8);

    // ── Indicator thread ─────────────────────────────────────────────

    {
        let dashboard = dashboard.clone();
        let output_tx = output_tx.clone();
        thread::Builder::new()
            .name("indicator".into())
            .stack_size(4096)
            .spawn(move || indicator_thread(event_rx, panel, dashboard, output_tx))?;
    }
    log::info!("Indicator thread spawned");

    // ── Output thread ────────────────────────────────────────────────

    thread::Builder::new()
        .name("output".into())
        .stack_size(4096)
        .spawn(move || output_thread(output_rx))?;
    log::info!("Output thread spawned");

    // ── Watchdog thread ──────────────────────────────────────────────

    {
        let dashboard = dashboard.clone();
        let event_tx = event_tx.clone();
        thread::Builder::new()
            .name("watchdog".into())
            .stack_size(4096)
            .spawn(move || watchdog_thread(dashboard, event_tx, clock))?;
    }
    log::info!("Watchdog thread spawned");

    // ── Status thread ────────────────────────────────────────────────

    {
        let dashboard = dashboard.clone();
        let output_tx = output_tx.clone();
        thread::Builder::new()
            .name("status".into())
            .stack_size(4096)
            .spawn(move || status_thread(dashboard, output_tx, clock))?;
    }
    log::info!("Status thread spawned");

    // ── WiFi + ESP-NOW ───────────────────────────────────────────────

    let mut wifi = BlockingWifi::wrap(
        EspWifi::new(peripherals.modem, sys_loop.clone(), Some(nvs))?,
        sys_loop,
    )?;
    wifi.set_configuration(&esp_idf_svc::wifi::Configuration::Client(Default::default()))?;
    wifi.start()?;

    let espnow = EspNow::take()?;
    {
        let dashboard = dashboard.clone();
        // Runs in the WiFi driver task: deliver is bounded and non-blocking,
        // and events are handed off with try_send.
        espnow.register_recv_cb(move |info: &ReceiveInfo, data: &[u8]| {
            let source = TrapIdentity::new(*info.src_addr);
            if let Ok(events) = dashboard.deliver(&clock, source, data) {
                for event in events {
                    queue_event(&event_tx, event);
                }
            }
        })?;
    }
    log::info!("ESP-NOW receiver ready");

    // ── Serial commands: runs on main thread ────────────────────────

    command_loop(&dashboard, &output_tx, clock)
}

// ── Watchdog thread ──────────────────────────────────────────────────

fn watchdog_thread(dashboard: SharedDashboard, event_tx: SyncSender<TrapEvent>, clock: BootClock) {
    let period = dashboard.config().watchdog_period();
    log::info!("Watchdog thread started ({}ms period)", period.as_millis());

    let mut next = Instant::now();
    loop {
        next += period;
        if let Some(wait) = next.checked_duration_since(Instant::now()) {
            thread::sleep(wait);
        }
        for event in dashboard.watchdog_tick(&clock) {
            queue_event(&event_tx, event);
        }
    }
}

// ── Indicator thread ─────────────────────────────────────────────────

fn indicator_thread(
    event_rx: mpsc::Receiver<TrapEvent>,
    mut panel: LedPanel,
    dashboard: SharedDashboard,
    output_tx: SyncSender<MsgBuffer>,
) {
    log::info!("Indicator thread started");

    let period = dashboard.config().watchdog_period();
    indicator::render_all(&mut panel, &dashboard.snapshot_all());

    loop {
        match event_rx.recv_timeout(period) {
            Ok(event) => {
                if let Some(record) = dashboard.snapshot(&event.id) {
                    indicator::render(&mut panel, event.id, &record);
                }
                if let Some(line) = comm::event_line(&event) {
                    queue_line(&output_tx, line);
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                indicator::render_all(&mut panel, &dashboard.snapshot_all());
            }
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}

// ── Output thread ────────────────────────────────────────────────────

fn output_thread(output_rx: mpsc::Receiver<MsgBuffer>) {
    log::info!("Output thread started");

    while let Ok(msg) = output_rx.recv() {
        if let Ok(s) = std::str::from_utf8(&msg) {
            print!("{}", s);
        }
    }
}

// ── Status thread ────────────────────────────────────────────────────

fn status_thread(dashboard: SharedDashboard, output_tx: SyncSender<MsgBuffer>, clock: BootClock) {
    loop {
        thread::sleep(defaults::STATUS_REPORT_PERIOD);

        let emit = |line| queue_line(&output_tx, line);
        comm::reply_lines(&CommandReply::Status, &*dashboard, clock.uptime_secs(), emit);
        comm::reply_lines(&CommandReply::Traps, &*dashboard, clock.uptime_secs(), emit);
    }
}

// ── Command loop ─────────────────────────────────────────────────────

fn command_loop(
    dashboard: &SharedDashboard,
    output_tx: &SyncSender<MsgBuffer>,
    clock: BootClock,
) -> ! {
    let mut stdin = std::io::stdin();
    let mut reader = LineReader::new();
    let mut byte = [0u8; 1];

    loop {
        // Console stdin is non-blocking on ESP-IDF; poll gently.
        match stdin.read(&mut byte) {
            Ok(1) => {}
            _ => {
                thread::sleep(Duration::from_millis(50));
                continue;
            }
        }

        if let Some(line) = reader.feed(byte[0]) {
            comm::handle_line(line, &**dashboard, clock.uptime_secs(), |l| queue_line(output_tx, l));
        }
    }
}

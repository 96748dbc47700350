//! TrapWatch: dashboard firmware
//!
//! Mains-powered receiver. Listens for ESP-NOW status datagrams from the
//! configured traps, tracks per-trap liveness, drives a connected LED and a
//! triggered LED for each trap, and writes NDJSON reports to the serial
//! console.
//!
//! Tasks:
//!   receive  : ESP-NOW datagrams → Dashboard::deliver
//!   watchdog : periodic Dashboard::watchdog_tick
//!   indicator: trap events → LEDs + event report lines; full redraw each period
//!   output   : report lines → serial
//!   command  : serial NDJSON commands → replies
//!   status   : periodic status line

#![no_std]
#![no_main]

extern crate alloc;

use esp_backtrace as _;

esp_bootloader_esp_idf::esp_app_desc!();

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::{Duration, Instant, Ticker, Timer};
use esp_hal::gpio::{Level, Output, OutputConfig, OutputPin};
use esp_hal::interrupt::software::SoftwareInterruptControl;
use esp_hal::timer::timg::TimerGroup;
use esp_hal::uart::{Config as UartConfig, UartRx};
use esp_hal::Async;
use esp_radio::esp_now::EspNow;
use heapless::Vec;
use static_cell::StaticCell;

use trapwatch::comm::{CommandReply, LineReader};
use trapwatch::config::LivenessConfig;
use trapwatch::dashboard::Dashboard;
use trapwatch::identity::TrapIdentity;
use trapwatch::indicator::{self, Indicator};
use trapwatch::liveness::{TrapEvent, MAX_TRAPS};
use trapwatch::platform::{Clock, Timestamp};
use trapwatch::protocol::{MsgBuffer, VERSION};
use trapwatch::{board, comm, defaults};

type SharedDashboard = Dashboard<CriticalSectionRawMutex, MAX_TRAPS>;

// ── Static channels and shared state ─────────────────────────────────

static DASHBOARD: StaticCell<SharedDashboard> = StaticCell::new();

/// Trap events from the receive and watchdog tasks
static EVENT_CHANNEL: Channel<CriticalSectionRawMutex, TrapEvent, 16> = Channel::new();

/// Serialized NDJSON lines for the serial console
static OUTPUT_CHANNEL: Channel<CriticalSectionRawMutex, MsgBuffer, 8> = Channel::new();

/// embassy-time clock; survives nothing across resets, which is fine for a
/// mains-powered node that rebuilds its tracker on boot.
struct EmbassyClock;

impl Clock for EmbassyClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(Instant::now().as_millis())
    }
}

fn uptime_secs() -> u32 {
    (Instant::now().as_secs() & 0xFFFF_FFFF) as u32
}

/// Queue an event for the indicator task. A full queue only delays the LEDs
/// until the next periodic redraw, but the event line is lost.
fn queue_event(event: TrapEvent) {
    if EVENT_CHANNEL.try_send(event).is_err() {
        log::warn!("Event queue full, dropped {} for {}", event.kind.as_str(), event.id);
    }
}

fn queue_line(line: MsgBuffer) {
    if OUTPUT_CHANNEL.try_send(line).is_err() {
        log::warn!("Output queue full, dropped report line");
    }
}

fn watchdog_ticker(dashboard: &SharedDashboard) -> Ticker {
    let period = dashboard.config().watchdog_period();
    Ticker::every(Duration::from_millis(period.as_millis() as u64))
}

// ── Indicator LEDs ───────────────────────────────────────────────────

fn led<'d>(pin: impl OutputPin + 'd) -> Output<'d> {
    Output::new(pin, Level::Low, OutputConfig::default())
}

/// One (connected, triggered) LED pair per configured trap, in slot order.
struct LedPanel {
    ids: Vec<TrapIdentity, MAX_TRAPS>,
    leds: Vec<(Output<'static>, Output<'static>), MAX_TRAPS>,
}

impl LedPanel {
    fn slot(&mut self, id: TrapIdentity) -> Option<&mut (Output<'static>, Output<'static>)> {
        let i = indicator::slot_of(&self.ids, &id)?;
        self.leds.get_mut(i)
    }
}

impl Indicator for LedPanel {
    fn set_connected(&mut self, id: TrapIdentity, connected: bool) {
        if let Some((led, _)) = self.slot(id) {
            led.set_level(Level::from(connected));
        }
    }

    fn set_triggered(&mut self, id: TrapIdentity, triggered: bool) {
        if let Some((_, led)) = self.slot(id) {
            led.set_level(Level::from(triggered));
        }
    }
}

// ── Tasks ────────────────────────────────────────────────────────────

/// Receive task: every datagram goes through the dashboard; discards are
/// counted and logged there.
#[embassy_executor::task]
async fn receive_task(mut esp_now: EspNow<'static>, dashboard: &'static SharedDashboard) {
    log::info!("Receive task started");

    loop {
        let received = esp_now.receive_async().await;
        let source = TrapIdentity::new(received.info.src_address);
        if let Ok(events) = dashboard.deliver(&EmbassyClock, source, received.data()) {
            for event in events {
                queue_event(event);
            }
        }
    }
}

/// Watchdog task: evaluates timeouts on a fixed tick, independent of
/// traffic.
#[embassy_executor::task]
async fn watchdog_task(dashboard: &'static SharedDashboard) {
    let mut ticker = watchdog_ticker(dashboard);

    loop {
        ticker.next().await;
        for event in dashboard.watchdog_tick(&EmbassyClock) {
            queue_event(event);
        }
    }
}

/// Indicator task: renders the affected trap on each event and redraws every
/// trap once per watchdog period.
#[embassy_executor::task]
async fn indicator_task(mut panel: LedPanel, dashboard: &'static SharedDashboard) {
    indicator::render_all(&mut panel, &dashboard.snapshot_all());

    let event_rx = EVENT_CHANNEL.receiver();
    let mut ticker = watchdog_ticker(dashboard);

    loop {
        match select(event_rx.receive(), ticker.next()).await {
            Either::First(event) => {
                if let Some(record) = dashboard.snapshot(&event.id) {
                    indicator::render(&mut panel, event.id, &record);
                }
                if let Some(line) = comm::event_line(&event) {
                    queue_line(line);
                }
            }
            Either::Second(()) => indicator::render_all(&mut panel, &dashboard.snapshot_all()),
        }
    }
}

/// Serial output task: writes each NDJSON line to the console.
#[embassy_executor::task]
async fn output_serial_task() {
    log::info!("Serial output task started");

    let output_rx = OUTPUT_CHANNEL.receiver();

    loop {
        let msg = output_rx.receive().await;
        if let Ok(s) = core::str::from_utf8(&msg) {
            esp_println::print!("{}", s);
        }
    }
}

/// Command task: NDJSON host commands on UART0 RX, answered on the output
/// channel.
#[embassy_executor::task]
async fn command_task(mut rx: UartRx<'static, Async>, dashboard: &'static SharedDashboard) {
    log::info!("Command task started");

    let mut reader = LineReader::new();
    let mut buf = [0u8; 64];

    loop {
        let len = match rx.read_async(&mut buf).await {
            Ok(len) => len,
            Err(e) => {
                log::warn!("Console read failed: {:?}", e);
                continue;
            }
        };
        for &byte in &buf[..len] {
            if let Some(line) = reader.feed(byte) {
                comm::handle_line(line, dashboard, uptime_secs(), queue_line);
            }
        }
    }
}

/// Periodic status reporting task
#[embassy_executor::task]
async fn status_task(dashboard: &'static SharedDashboard) {
    loop {
        Timer::after(Duration::from_secs(defaults::STATUS_REPORT_PERIOD.as_secs())).await;

        comm::reply_lines(&CommandReply::Status, dashboard, uptime_secs(), queue_line);
        comm::reply_lines(&CommandReply::Traps, dashboard, uptime_secs(), queue_line);
    }
}

// ── Entry point ──────────────────────────────────────────────────────

#[esp_rtos::main]
async fn main(spawner: embassy_executor::Spawner) {
    esp_println::logger::init_logger_from_env();

    let peripherals = esp_hal::init(esp_hal::Config::default());

    esp_alloc::heap_allocator!(size: 64 * 1024);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    let sw_int = SoftwareInterruptControl::new(peripherals.SW_INTERRUPT);
    esp_rtos::start(timg0.timer0, sw_int.software_interrupt0);

    log::info!("TrapWatch dashboard v{} starting on {}", VERSION, board::BOARD_NAME);

    let ids: Vec<TrapIdentity, MAX_TRAPS> = defaults::TRAPS.iter().map(|t| t.id).collect();
    let config = LivenessConfig::new(
        defaults::WAKE_INTERVAL,
        defaults::CONNECTIVITY_TIMEOUT,
        defaults::WATCHDOG_PERIOD,
    )
    .expect("default liveness config invalid");
    let dashboard: &'static SharedDashboard =
        DASHBOARD.init(Dashboard::new(&ids, config).expect("trap table invalid"));

    log::info!(
        "Tracking {} traps, timeout {}s, report interval {}s",
        dashboard.trap_count(),
        config.timeout().as_secs(),
        config.wake_interval().as_secs()
    );

    // ── Indicator LEDs ───────────────────────────────────────────────

    let mut leds = Vec::new();
    #[cfg(feature = "board-devkit")]
    {
        let _ = leds.push((led(peripherals.GPIO27), led(peripherals.GPIO33)));
        let _ = leds.push((led(peripherals.GPIO25), led(peripherals.GPIO26)));
    }
    #[cfg(feature = "board-xiao")]
    {
        let _ = leds.push((led(peripherals.GPIO3), led(peripherals.GPIO4)));
        let _ = leds.push((led(peripherals.GPIO5), led(peripherals.GPIO6)));
    }
    for (slot, (connected, triggered)) in board::INDICATOR_PINS.iter().enumerate() {
        log::info!("Slot {}: connected LED GPIO{}, triggered LED GPIO{}", slot, connected, triggered);
    }
    if leds.len() < ids.len() {
        log::warn!(
            "{} traps configured but only {} indicator slots on this board",
            ids.len(),
            leds.len()
        );
    }
    let panel = LedPanel { ids, leds };

    // ── Radio ────────────────────────────────────────────────────────

    let (mut controller, interfaces) =
        esp_radio::wifi::new(peripherals.WIFI, Default::default()).expect("WiFi init failed");
    controller.start().expect("WiFi start failed");

    log::info!("ESP-NOW receiver ready");

    // ── Host command console ─────────────────────────────────────────

    #[cfg(feature = "board-devkit")]
    let rx_pin = peripherals.GPIO3;
    #[cfg(feature = "board-xiao")]
    let rx_pin = peripherals.GPIO44;

    let console_rx = UartRx::new(
        peripherals.UART0,
        UartConfig::default().with_baudrate(comm::SERIAL_BAUD),
    )
    .expect("UART0 config failed")
    .with_rx(rx_pin)
    .into_async();
    log::info!("Commands on UART0 RX GPIO{} at {} baud", board::CONSOLE_RX_PIN, comm::SERIAL_BAUD);

    spawner.spawn(receive_task(interfaces.esp_now, dashboard)).unwrap();
    spawner.spawn(watchdog_task(dashboard)).unwrap();
    spawner.spawn(indicator_task(panel, dashboard)).unwrap();
    spawner.spawn(output_serial_task()).unwrap();
    spawner.spawn(command_task(console_rx, dashboard)).unwrap();
    spawner.spawn(status_task(dashboard)).unwrap();

    // Keep the WiFi controller alive for the lifetime of the firmware.
    let _controller = controller;
    loop {
        Timer::after(Duration::from_secs(60)).await;
    }
}

//! TrapWatch: trap node firmware
//!
//! Battery-powered sensor node. Every boot is one duty cycle: read the
//! trap's switch, send one ESP-NOW status datagram to the dashboard, then
//! deep sleep until the report timer expires or the switch closes.
//! Deep sleep resets the chip, so the next cycle starts here again from
//! scratch.

#![no_std]
#![no_main]

extern crate alloc;

use esp_backtrace as _;

esp_bootloader_esp_idf::esp_app_desc!();

use core::cell::RefCell;

use esp_hal::gpio::{Input, InputConfig, Level, Output, OutputConfig, Pull};
use esp_hal::interrupt::software::SoftwareInterruptControl;
use esp_hal::rtc_cntl::sleep::{Ext0WakeupSource, TimerWakeupSource, WakeupLevel};
use esp_hal::rtc_cntl::{wakeup_cause, Rtc, SleepSource};
use esp_hal::timer::timg::TimerGroup;
use esp_radio::esp_now::{EspNow, PeerInfo};
use static_cell::StaticCell;

use trapwatch::duty_cycle::{DutyCycleConfig, TrapNode};
use trapwatch::identity::TrapIdentity;
use trapwatch::platform::{
    EdgeTrigger, SendError, Sensor, SleepController, SleepError, Transport, WakePlan, WakeReason,
};
use trapwatch::protocol::VERSION;
use trapwatch::{board, defaults};

#[cfg(feature = "board-devkit")]
type SensorPin = esp_hal::peripherals::GPIO4<'static>;
#[cfg(feature = "board-xiao")]
type SensorPin = esp_hal::peripherals::GPIO1<'static>;

/// Sensor pin shared between the sensor (reads) and the sleeper (ext0 wake).
static SENSOR_PIN: StaticCell<RefCell<SensorPin>> = StaticCell::new();

// ── Sensor ───────────────────────────────────────────────────────────

/// Trap switch, pulled down, high when fired. The status LED mirrors it.
struct TrapSwitch {
    pin: &'static RefCell<SensorPin>,
    led: Output<'static>,
}

impl Sensor for TrapSwitch {
    fn is_triggered(&mut self) -> bool {
        let mut pin = self.pin.borrow_mut();
        let input = Input::new(pin.reborrow(), InputConfig::default().with_pull(Pull::Down));
        let triggered = input.is_high();
        self.led.set_level(if triggered { Level::High } else { Level::Low });
        triggered
    }
}

// ── Transport ────────────────────────────────────────────────────────

/// ESP-NOW unicast to the dashboard. `None` when the radio failed to come
/// up; every send then fails and the node still sleeps on schedule.
struct EspNowTransport {
    esp_now: Option<EspNow<'static>>,
}

impl Transport for EspNowTransport {
    fn send(&mut self, peer: TrapIdentity, payload: &[u8]) -> Result<(), SendError> {
        let esp_now = self.esp_now.as_mut().ok_or(SendError::NotReady)?;
        let addr = *peer.as_bytes();
        if !esp_now.peer_exists(&addr) {
            esp_now
                .add_peer(PeerInfo {
                    peer_address: addr,
                    lmk: None,
                    channel: None,
                    encrypt: false,
                    ..Default::default()
                })
                .map_err(|_| SendError::NotReady)?;
        }
        esp_now
            .send(&addr, payload)
            .map_err(|_| SendError::NotReady)?
            .wait()
            .map_err(|_| SendError::Failed)
    }
}

// ── Deep sleep ───────────────────────────────────────────────────────

struct DeepSleep {
    rtc: Rtc<'static>,
    pin: &'static RefCell<SensorPin>,
}

impl SleepController for DeepSleep {
    fn sleep(&mut self, plan: &WakePlan) -> Result<WakeReason, SleepError> {
        let timer = TimerWakeupSource::new(plan.timer);
        let mut pin = self.pin.try_borrow_mut().map_err(|_| SleepError::WakeSourceUnavailable)?;
        log::info!("Entering deep sleep for {}s", plan.timer.as_secs());
        match plan.edge {
            Some(EdgeTrigger::SensorAsserted) => {
                let ext0 = Ext0WakeupSource::new(pin.reborrow(), WakeupLevel::High);
                self.rtc.sleep_deep(&[&timer, &ext0])
            }
            None => self.rtc.sleep_deep(&[&timer]),
        }
    }
}

fn boot_wake_reason() -> WakeReason {
    match wakeup_cause() {
        SleepSource::Timer => WakeReason::Timer,
        SleepSource::Ext0 => WakeReason::SensorEdge,
        _ => WakeReason::ColdBoot,
    }
}

// ── Entry point ──────────────────────────────────────────────────────

#[esp_rtos::main]
async fn main(_spawner: embassy_executor::Spawner) {
    esp_println::logger::init_logger_from_env();

    let peripherals = esp_hal::init(esp_hal::Config::default());

    esp_alloc::heap_allocator!(size: 64 * 1024);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    let sw_int = SoftwareInterruptControl::new(peripherals.SW_INTERRUPT);
    esp_rtos::start(timg0.timer0, sw_int.software_interrupt0);

    log::info!(
        "TrapWatch trap v{} on {}, woke by {}",
        VERSION,
        board::BOARD_NAME,
        boot_wake_reason().as_str()
    );

    #[cfg(feature = "board-devkit")]
    let (sensor_pin, led_pin) = (peripherals.GPIO4, peripherals.GPIO2);
    #[cfg(feature = "board-xiao")]
    let (sensor_pin, led_pin) = (peripherals.GPIO1, peripherals.GPIO21);

    log::info!(
        "Sensor on GPIO{}, status LED on GPIO{}",
        board::SENSOR_PIN,
        board::STATUS_LED_PIN
    );

    let pin: &'static RefCell<SensorPin> = SENSOR_PIN.init(RefCell::new(sensor_pin));
    let led = Output::new(led_pin, Level::Low, OutputConfig::default());

    // Radio failure is not fatal: the cycle still has to reach sleep.
    let esp_now = match esp_radio::wifi::new(peripherals.WIFI, Default::default()) {
        Ok((mut controller, interfaces)) => match controller.start() {
            Ok(()) => {
                // Controller must outlive the send; deep sleep ends the boot anyway.
                core::mem::forget(controller);
                Some(interfaces.esp_now)
            }
            Err(e) => {
                log::error!("WiFi start failed: {:?}", e);
                None
            }
        },
        Err(e) => {
            log::error!("WiFi init failed: {:?}", e);
            None
        }
    };

    let mut node = TrapNode::new(
        TrapSwitch { pin, led },
        EspNowTransport { esp_now },
        DeepSleep {
            rtc: Rtc::new(peripherals.LPWR),
            pin,
        },
        DutyCycleConfig {
            peer: defaults::DASHBOARD_PEER,
            wake_interval: defaults::WAKE_INTERVAL,
            fallback_sleep: defaults::FALLBACK_SLEEP,
        },
    );

    node.run()
}

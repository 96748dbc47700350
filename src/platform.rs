//! Platform seams: what the core needs from the hardware around it.
//!
//! Firmware binaries implement these traits over esp-hal / ESP-IDF; tests
//! implement them with plain structs. The core never calls a HAL directly.

use core::fmt;
use core::time::Duration;

use crate::identity::TrapIdentity;

/// Monotonic time since boot, millisecond resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);

    pub const fn from_millis(ms: u64) -> Self {
        Self(ms)
    }

    pub const fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1000))
    }

    pub const fn as_millis(&self) -> u64 {
        self.0
    }

    pub const fn as_secs(&self) -> u64 {
        self.0 / 1000
    }

    /// Time elapsed since `earlier`, or zero if `earlier` is in the future.
    pub fn saturating_duration_since(&self, earlier: Timestamp) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

/// Monotonic clock. Must not jump when the node sleeps.
pub trait Clock {
    fn now(&self) -> Timestamp;
}

/// Transport send failure. The trap never retries, so the cause is only
/// kept for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// Radio not initialized or peer not registered
    NotReady,
    /// Driver accepted the frame but reported a failed transmission
    Failed,
    /// Driver rejected the transmission; carries the driver error code
    Driver(i32),
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::NotReady => write!(f, "transport not ready"),
            SendError::Failed => write!(f, "transmission failed"),
            SendError::Driver(code) => write!(f, "transport driver error {}", code),
        }
    }
}

/// Connectionless, unacknowledged datagram channel addressed by hardware id.
///
/// Receiving is not part of this trait: the environment pushes arrivals into
/// [`crate::dashboard::Dashboard::deliver`].
pub trait Transport {
    fn send(&mut self, peer: TrapIdentity, payload: &[u8]) -> Result<(), SendError>;
}

/// The trap's mechanical sensor.
pub trait Sensor {
    /// `true` while the trap is in its fired position.
    fn is_triggered(&mut self) -> bool;
}

/// Edge that ends a sleep early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeTrigger {
    /// Sensor input going to its asserted ("triggered") level
    SensorAsserted,
}

/// Wake sources to arm before sleeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WakePlan {
    /// Timer wake, always armed
    pub timer: Duration,
    /// Optional edge wake on the sensor input
    pub edge: Option<EdgeTrigger>,
}

/// Why the node woke up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    /// Report interval (or fallback sleep) elapsed
    Timer,
    /// Sensor edge fired
    SensorEdge,
    /// Power-on or any reset that is not a sleep wake
    ColdBoot,
}

impl WakeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            WakeReason::Timer => "timer",
            WakeReason::SensorEdge => "sensor",
            WakeReason::ColdBoot => "cold_boot",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepError {
    /// A requested wake source could not be armed
    WakeSourceUnavailable,
    /// The halt returned without a recognizable wake cause
    Interrupted,
}

impl fmt::Display for SleepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SleepError::WakeSourceUnavailable => write!(f, "wake source unavailable"),
            SleepError::Interrupted => write!(f, "sleep interrupted"),
        }
    }
}

/// Low-power halt.
///
/// Implementations disable the radio and volatile subsystems, arm the
/// sources in `plan`, and halt. A deep-sleep implementation never returns:
/// the chip resets and the firmware starts over at `Sensing`.
pub trait SleepController {
    fn sleep(&mut self, plan: &WakePlan) -> Result<WakeReason, SleepError>;
}

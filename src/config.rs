/// Liveness timing configuration.
///
/// The connectivity timeout must cover at least [`MIN_MISSED_CYCLES`] report
/// intervals, so a single lost datagram never flips a healthy trap to
/// disconnected. The watchdog period must be non-zero and no longer than the
/// timeout, otherwise the dashboard could notice an outage late by a whole
/// timeout.
use core::fmt;
use core::time::Duration;

/// Report intervals the timeout must span (one missed report tolerated)
pub const MIN_MISSED_CYCLES: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Timeout shorter than `MIN_MISSED_CYCLES` wake intervals
    TimeoutTooShort { timeout: Duration, minimum: Duration },
    /// Watchdog period is zero or exceeds the timeout
    InvalidWatchdogPeriod,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::TimeoutTooShort { timeout, minimum } => write!(
                f,
                "timeout {}s is shorter than the {}s minimum",
                timeout.as_secs(),
                minimum.as_secs()
            ),
            ConfigError::InvalidWatchdogPeriod => {
                write!(f, "watchdog period must be non-zero and within the timeout")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessConfig {
    wake_interval: Duration,
    timeout: Duration,
    watchdog_period: Duration,
}

impl LivenessConfig {
    pub fn new(
        wake_interval: Duration,
        timeout: Duration,
        watchdog_period: Duration,
    ) -> Result<Self, ConfigError> {
        check_timeout(wake_interval, timeout)?;
        if watchdog_period.is_zero() || watchdog_period > timeout {
            return Err(ConfigError::InvalidWatchdogPeriod);
        }
        Ok(Self {
            wake_interval,
            timeout,
            watchdog_period,
        })
    }

    pub const fn wake_interval(&self) -> Duration {
        self.wake_interval
    }

    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    pub const fn watchdog_period(&self) -> Duration {
        self.watchdog_period
    }

    /// Replace the timeout, keeping the other settings.
    pub fn with_timeout(&self, timeout: Duration) -> Result<Self, ConfigError> {
        Self::new(self.wake_interval, timeout, self.watchdog_period)
    }
}

/// Smallest timeout accepted for a given wake interval.
pub fn minimum_timeout(wake_interval: Duration) -> Duration {
    wake_interval.saturating_mul(MIN_MISSED_CYCLES)
}

fn check_timeout(wake_interval: Duration, timeout: Duration) -> Result<(), ConfigError> {
    let minimum = minimum_timeout(wake_interval);
    if timeout < minimum {
        return Err(ConfigError::TimeoutTooShort { timeout, minimum });
    }
    Ok(())
}

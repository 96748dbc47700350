/// Dashboard service: decode, track and count, under one lock.
///
/// Two independent inputs drive the dashboard: datagrams arriving from the
/// radio ([`Dashboard::deliver`]) and the periodic watchdog
/// ([`Dashboard::watchdog_tick`]). Both run against the same tracker, guarded
/// by an `embassy_sync` blocking mutex, so writers never interleave and a
/// snapshot never sees a half-updated record. The clock is read inside the
/// lock, which keeps timestamps ordered the same way the updates are.
///
/// The raw mutex is a type parameter: `CriticalSectionRawMutex` on both
/// firmwares, `NoopRawMutex` where a single task owns the dashboard.
use core::cell::RefCell;
use core::fmt;
use core::time::Duration;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::Vec;

use crate::codec::{self, DecodeError};
use crate::config::{ConfigError, LivenessConfig};
use crate::identity::TrapIdentity;
use crate::liveness::{LivenessTracker, MessageEvents, TrackerError, TrapEvent, TrapLivenessRecord};
use crate::platform::Clock;

/// Why a delivered datagram was discarded. Always recoverable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    Malformed(DecodeError),
    UnknownSender(TrapIdentity),
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryError::Malformed(e) => write!(f, "malformed status: {}", e),
            DeliveryError::UnknownSender(id) => write!(f, "status from unknown sender {}", id),
        }
    }
}

/// Delivery counters since boot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeliveryStats {
    pub accepted: u32,
    pub malformed: u32,
    pub unknown: u32,
}

struct State<const N: usize> {
    tracker: LivenessTracker<N>,
    config: LivenessConfig,
    stats: DeliveryStats,
}

pub struct Dashboard<M: RawMutex, const N: usize> {
    state: Mutex<M, RefCell<State<N>>>,
}

impl<M: RawMutex, const N: usize> Dashboard<M, N> {
    pub fn new(ids: &[TrapIdentity], config: LivenessConfig) -> Result<Self, TrackerError> {
        let tracker = LivenessTracker::new(ids)?;
        Ok(Self {
            state: Mutex::new(RefCell::new(State {
                tracker,
                config,
                stats: DeliveryStats::default(),
            })),
        })
    }

    /// Handle a datagram from `source`. Malformed payloads and unknown
    /// senders are counted and dropped without touching any record.
    pub fn deliver<C: Clock + ?Sized>(
        &self,
        clock: &C,
        source: TrapIdentity,
        payload: &[u8],
    ) -> Result<MessageEvents, DeliveryError> {
        let decoded = codec::decode(payload);

        let result = self.state.lock(|s| {
            let mut s = s.borrow_mut();
            let triggered = match decoded {
                Ok(t) => t,
                Err(e) => {
                    s.stats.malformed = s.stats.malformed.wrapping_add(1);
                    return Err(DeliveryError::Malformed(e));
                }
            };
            let now = clock.now();
            match s.tracker.on_message(source, triggered, now) {
                Ok(events) => {
                    s.stats.accepted = s.stats.accepted.wrapping_add(1);
                    Ok(events)
                }
                Err(_) => {
                    s.stats.unknown = s.stats.unknown.wrapping_add(1);
                    Err(DeliveryError::UnknownSender(source))
                }
            }
        });

        match &result {
            Ok(_) => log::debug!("Status from {}: triggered={}", source, decoded == Ok(true)),
            Err(e) => log::warn!("Dropped datagram from {}: {}", source, e),
        }
        result
    }

    /// Evaluate every record for timeout against the configured timeout.
    pub fn watchdog_tick<C: Clock + ?Sized>(&self, clock: &C) -> Vec<TrapEvent, N> {
        let events = self.state.lock(|s| {
            let mut s = s.borrow_mut();
            let now = clock.now();
            let timeout = s.config.timeout();
            s.tracker.on_watchdog_tick(now, timeout)
        });
        for e in &events {
            log::info!("Trap {} timed out", e.id);
        }
        events
    }

    /// Consistent copy of one record.
    pub fn snapshot(&self, id: &TrapIdentity) -> Option<TrapLivenessRecord> {
        self.state.lock(|s| s.borrow().tracker.record(id).copied())
    }

    /// Consistent copy of every record, in configuration order.
    pub fn snapshot_all(&self) -> Vec<(TrapIdentity, TrapLivenessRecord), N> {
        self.state.lock(|s| {
            s.borrow()
                .tracker
                .iter()
                .map(|(id, r)| (*id, *r))
                .collect()
        })
    }

    pub fn connected_count(&self) -> usize {
        self.state.lock(|s| s.borrow().tracker.connected_count())
    }

    pub fn trap_count(&self) -> usize {
        self.state.lock(|s| s.borrow().tracker.len())
    }

    pub fn stats(&self) -> DeliveryStats {
        self.state.lock(|s| s.borrow().stats)
    }

    pub fn config(&self) -> LivenessConfig {
        self.state.lock(|s| s.borrow().config)
    }

    /// Change the connectivity timeout at runtime. Rejected values leave the
    /// current configuration in place.
    pub fn set_timeout(&self, timeout: Duration) -> Result<LivenessConfig, ConfigError> {
        self.state.lock(|s| {
            let mut s = s.borrow_mut();
            let updated = s.config.with_timeout(timeout)?;
            s.config = updated;
            Ok(updated)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::liveness::TrapEventKind;
    use crate::platform::Timestamp;
    use core::sync::atomic::{AtomicU64, Ordering};
    use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, NoopRawMutex};
    use std::sync::Arc;
    use std::thread;

    const A: TrapIdentity = TrapIdentity::new([0xA0, 0, 0, 0, 0, 1]);
    const B: TrapIdentity = TrapIdentity::new([0xB0, 0, 0, 0, 0, 2]);
    const STRANGER: TrapIdentity = TrapIdentity::new([0xEE, 0, 0, 0, 0, 9]);

    /// Settable clock in whole seconds.
    #[derive(Default)]
    struct TestClock(AtomicU64);

    impl TestClock {
        fn set(&self, secs: u64) {
            self.0.store(secs, Ordering::SeqCst);
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> Timestamp {
            Timestamp::from_secs(self.0.load(Ordering::SeqCst))
        }
    }

    fn config() -> LivenessConfig {
        LivenessConfig::new(Duration::from_secs(5), Duration::from_secs(10), Duration::from_secs(1))
            .unwrap()
    }

    fn dashboard() -> Dashboard<NoopRawMutex, 4> {
        Dashboard::new(&[A, B], config()).unwrap()
    }

    #[test]
    fn accepted_delivery_updates_record() {
        let clock = TestClock::default();
        let d = dashboard();
        clock.set(3);
        let events = d.deliver(&clock, A, &codec::encode(true)).unwrap();
        assert_eq!(events.len(), 2);

        let rec = d.snapshot(&A).unwrap();
        assert!(rec.connected);
        assert!(rec.triggered);
        assert_eq!(rec.last_seen, Some(Timestamp::from_secs(3)));
        assert_eq!(d.stats().accepted, 1);
    }

    #[test]
    fn malformed_payload_is_counted_and_ignored() {
        let clock = TestClock::default();
        let d = dashboard();
        let before = d.snapshot_all();

        assert_eq!(
            d.deliver(&clock, A, &[]),
            Err(DeliveryError::Malformed(DecodeError::Empty))
        );
        assert_eq!(
            d.deliver(&clock, A, &[1, 1]),
            Err(DeliveryError::Malformed(DecodeError::WrongLength(2)))
        );
        assert_eq!(d.snapshot_all(), before);
        assert_eq!(d.stats().malformed, 2);
        assert_eq!(d.stats().accepted, 0);
    }

    #[test]
    fn unknown_sender_is_counted_and_ignored() {
        let clock = TestClock::default();
        let d = dashboard();
        assert_eq!(
            d.deliver(&clock, STRANGER, &codec::encode(true)),
            Err(DeliveryError::UnknownSender(STRANGER))
        );
        assert_eq!(d.trap_count(), 2);
        assert!(d.snapshot(&STRANGER).is_none());
        assert_eq!(d.stats().unknown, 1);
    }

    #[test]
    fn watchdog_uses_configured_timeout() {
        let clock = TestClock::default();
        let d = dashboard();
        d.deliver(&clock, A, &codec::encode(false)).unwrap();

        clock.set(9);
        assert!(d.watchdog_tick(&clock).is_empty());
        clock.set(10);
        let events = d.watchdog_tick(&clock);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, TrapEventKind::Disconnected);
        assert_eq!(d.connected_count(), 0);
    }

    #[test]
    fn events_are_stamped_with_lock_time() {
        let clock = TestClock::default();
        let d = dashboard();
        clock.set(4);
        let connected = d.deliver(&clock, A, &codec::encode(false)).unwrap();
        clock.set(14);
        let disconnected = d.watchdog_tick(&clock);

        assert_eq!(connected[0].at, Timestamp::from_secs(4));
        assert_eq!(disconnected[0].at, Timestamp::from_secs(14));
        // Consumers that drain queues in any order can still sort by `at`.
        assert!(connected[0].at < disconnected[0].at);
    }

    #[test]
    fn set_timeout_applies_to_next_tick() {
        let clock = TestClock::default();
        let d = dashboard();
        d.deliver(&clock, A, &codec::encode(false)).unwrap();
        d.set_timeout(Duration::from_secs(20)).unwrap();

        clock.set(15);
        assert!(d.watchdog_tick(&clock).is_empty());
        clock.set(20);
        assert_eq!(d.watchdog_tick(&clock).len(), 1);
    }

    #[test]
    fn invalid_timeout_keeps_previous_config() {
        let d = dashboard();
        assert!(d.set_timeout(Duration::from_secs(6)).is_err());
        assert_eq!(d.config().timeout(), Duration::from_secs(10));
    }

    #[test]
    fn concurrent_delivery_and_watchdog() {
        let clock = Arc::new(TestClock::default());
        let d: Arc<Dashboard<CriticalSectionRawMutex, 4>> =
            Arc::new(Dashboard::new(&[A, B], config()).unwrap());

        let rx = {
            let (d, clock) = (d.clone(), clock.clone());
            thread::spawn(move || {
                for i in 0..500u32 {
                    let id = if i % 2 == 0 { A } else { B };
                    d.deliver(&*clock, id, &codec::encode(i % 3 == 0)).unwrap();
                }
            })
        };
        let wd = {
            let (d, clock) = (d.clone(), clock.clone());
            thread::spawn(move || {
                for _ in 0..500 {
                    d.watchdog_tick(&*clock);
                }
            })
        };
        rx.join().unwrap();
        wd.join().unwrap();

        // Clock never advanced, so nothing can have timed out.
        assert_eq!(d.connected_count(), 2);
        assert_eq!(d.stats().accepted, 500);
    }
}

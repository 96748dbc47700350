/// Dashboard liveness tracker: per-trap connectivity from silence timeouts.
///
/// One [`TrapLivenessRecord`] per configured identity, created disconnected
/// at startup and kept for the lifetime of the process. Exactly two inputs
/// mutate a record:
///
/// - [`LivenessTracker::on_message`]: a status arrived. Sets `triggered`,
///   marks the trap connected and stamps `last_seen`. This is the only way a
///   record becomes connected.
/// - [`LivenessTracker::on_watchdog_tick`]: periodic, independent of traffic.
///   Marks traps disconnected once `now - last_seen >= timeout`. Leaves
///   `triggered` alone; the last confirmed sensor reading stays visible while
///   the trap is silent.
///
/// There is no acknowledgement or handshake: failure detection is purely the
/// absence of messages. The tracker itself is not synchronized; the
/// [`crate::dashboard::Dashboard`] serializes access.
use core::fmt;
use core::time::Duration;

use heapless::Vec;

use crate::identity::TrapIdentity;
use crate::platform::Timestamp;

/// Maximum number of traps a dashboard can track.
pub const MAX_TRAPS: usize = 8;

/// Events a single message can produce (connectivity + trigger edge).
pub const MAX_EVENTS_PER_MESSAGE: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrapLivenessRecord {
    /// Arrival time of the most recent status; `None` until the first one
    pub last_seen: Option<Timestamp>,
    /// Last reported sensor state
    pub triggered: bool,
    /// Heard from within the timeout
    pub connected: bool,
}

impl TrapLivenessRecord {
    /// Whether the record has gone `timeout` without a message at `now`.
    /// Never-seen records are not "expired"; they were never connected.
    pub fn is_expired(&self, now: Timestamp, timeout: Duration) -> bool {
        match self.last_seen {
            Some(seen) => now.saturating_duration_since(seen) >= timeout,
            None => false,
        }
    }
}

/// Kind of state change observed on a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapEventKind {
    /// Disconnected → connected
    Connected,
    /// Connected → disconnected (timeout)
    Disconnected,
    /// Sensor went idle → triggered
    Triggered,
    /// Sensor went triggered → idle (trap re-armed)
    Reset,
}

impl TrapEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrapEventKind::Connected => "connected",
            TrapEventKind::Disconnected => "disconnected",
            TrapEventKind::Triggered => "triggered",
            TrapEventKind::Reset => "reset",
        }
    }

    /// Events worth notifying a person about.
    pub fn is_alert(&self) -> bool {
        matches!(self, TrapEventKind::Triggered | TrapEventKind::Disconnected)
    }
}

/// A state change on one trap, for indicators and notifiers.
///
/// `at` is the tracker time of the mutation that caused it. Events from
/// different inputs may be queued out of order; `at` is the order the
/// records actually changed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrapEvent {
    pub id: TrapIdentity,
    pub kind: TrapEventKind,
    pub at: Timestamp,
}

pub type MessageEvents = Vec<TrapEvent, MAX_EVENTS_PER_MESSAGE>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerError {
    /// Identity is not in the configured set
    UnknownTrap(TrapIdentity),
    /// Identity listed twice at construction
    DuplicateTrap(TrapIdentity),
    /// More identities than the tracker capacity
    TooManyTraps,
}

impl fmt::Display for TrackerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackerError::UnknownTrap(id) => write!(f, "unknown trap {}", id),
            TrackerError::DuplicateTrap(id) => write!(f, "trap {} configured twice", id),
            TrackerError::TooManyTraps => write!(f, "too many traps configured"),
        }
    }
}

/// Fixed set of liveness records keyed by identity.
#[derive(Debug, Clone)]
pub struct LivenessTracker<const N: usize> {
    records: Vec<(TrapIdentity, TrapLivenessRecord), N>,
}

impl<const N: usize> LivenessTracker<N> {
    /// Create one disconnected record per identity.
    pub fn new(ids: &[TrapIdentity]) -> Result<Self, TrackerError> {
        let mut records = Vec::new();
        for &id in ids {
            if records.iter().any(|(known, _)| *known == id) {
                return Err(TrackerError::DuplicateTrap(id));
            }
            records
                .push((id, TrapLivenessRecord::default()))
                .map_err(|_| TrackerError::TooManyTraps)?;
        }
        Ok(Self { records })
    }

    /// Record a status message from `id` received at `now`.
    pub fn on_message(
        &mut self,
        id: TrapIdentity,
        triggered: bool,
        now: Timestamp,
    ) -> Result<MessageEvents, TrackerError> {
        let record = self
            .records
            .iter_mut()
            .find(|(known, _)| *known == id)
            .map(|(_, r)| r)
            .ok_or(TrackerError::UnknownTrap(id))?;

        let before = *record;
        record.triggered = triggered;
        record.connected = true;
        record.last_seen = Some(now);

        let mut events = MessageEvents::new();
        if !before.connected {
            let _ = events.push(TrapEvent {
                id,
                kind: TrapEventKind::Connected,
                at: now,
            });
        }
        if triggered != before.triggered {
            let kind = if triggered {
                TrapEventKind::Triggered
            } else {
                TrapEventKind::Reset
            };
            let _ = events.push(TrapEvent { id, kind, at: now });
        }
        Ok(events)
    }

    /// Disconnect every record silent for at least `timeout`. Returns the
    /// traps that changed; already-disconnected traps are not reported again.
    pub fn on_watchdog_tick(&mut self, now: Timestamp, timeout: Duration) -> Vec<TrapEvent, N> {
        let mut events = Vec::new();
        for (id, record) in self.records.iter_mut() {
            if record.connected && record.is_expired(now, timeout) {
                record.connected = false;
                let _ = events.push(TrapEvent {
                    id: *id,
                    kind: TrapEventKind::Disconnected,
                    at: now,
                });
            }
        }
        events
    }

    pub fn record(&self, id: &TrapIdentity) -> Option<&TrapLivenessRecord> {
        self.records.iter().find(|(known, _)| known == id).map(|(_, r)| r)
    }

    pub fn contains(&self, id: &TrapIdentity) -> bool {
        self.record(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TrapIdentity, &TrapLivenessRecord)> {
        self.records.iter().map(|(id, r)| (id, r))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn connected_count(&self) -> usize {
        self.records.iter().filter(|(_, r)| r.connected).count()
    }
}

/// Compiled-in network configuration.
///
/// The set of traps is closed: a dashboard only tracks the identities listed
/// in [`TRAPS`], and each trap only reports to [`DASHBOARD_PEER`]. Adding a
/// trap means adding a row here (and an indicator pin pair in `board`) and
/// reflashing the dashboard.
use core::time::Duration;

use crate::config::MIN_MISSED_CYCLES;
use crate::identity::TrapIdentity;

/// A configured trap: radio identity plus a human-readable name for reports
/// and notifications.
#[derive(Debug, Clone, Copy)]
pub struct TrapEntry {
    pub id: TrapIdentity,
    pub name: &'static str,
}

/// Station MAC of the dashboard node; traps send to this peer.
pub const DASHBOARD_PEER: TrapIdentity = TrapIdentity::new([0x94, 0xB5, 0x55, 0x8E, 0x2A, 0x20]);

/// Known traps, in indicator slot order.
pub static TRAPS: &[TrapEntry] = &[
    TrapEntry {
        id: TrapIdentity::new([0x94, 0xB5, 0x55, 0x8E, 0x31, 0x0C]),
        name: "Kitchen",
    },
    TrapEntry {
        id: TrapIdentity::new([0x94, 0xB5, 0x55, 0x8E, 0x44, 0xA8]),
        name: "Garage",
    },
];

/// Status report period. Traps wake on this timer even if nothing happened.
pub const WAKE_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Silence after which the dashboard shows a trap as disconnected:
/// two report periods plus a minute of slack for boot and radio bring-up.
pub const CONNECTIVITY_TIMEOUT: Duration = Duration::from_secs(2 * 15 * 60 + 60);

/// How often the dashboard evaluates timeouts.
pub const WATCHDOG_PERIOD: Duration = Duration::from_secs(1);

/// Timer-only sleep used when arming the normal wake sources fails.
pub const FALLBACK_SLEEP: Duration = Duration::from_secs(60);

/// How often the dashboard writes a status line to its console.
pub const STATUS_REPORT_PERIOD: Duration = Duration::from_secs(30);

// Defaults must satisfy the same rules `LivenessConfig::new` enforces.
const _: () = assert!(CONNECTIVITY_TIMEOUT.as_secs() >= WAKE_INTERVAL.as_secs() * MIN_MISSED_CYCLES as u64);
const _: () = assert!(WATCHDOG_PERIOD.as_millis() > 0);
const _: () = assert!(WATCHDOG_PERIOD.as_secs() <= CONNECTIVITY_TIMEOUT.as_secs());
const _: () = assert!(FALLBACK_SLEEP.as_secs() <= WAKE_INTERVAL.as_secs());

/// Look up the configured name for an identity.
pub fn trap_name(id: &TrapIdentity) -> Option<&'static str> {
    TRAPS.iter().find(|t| t.id == *id).map(|t| t.name)
}

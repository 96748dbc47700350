/// JSON report protocol between the dashboard and whatever listens on its
/// serial console (a logger, or the SMS notifier bridge).
///
/// All messages are newline-delimited JSON (NDJSON).
/// Uses `heapless` types for no_std/no-alloc operation.
use heapless::{String, Vec};
use serde::{Deserialize, Serialize};

/// Maximum length for MAC address strings ("AA:BB:CC:DD:EE:FF")
pub type MacString = String<18>;

/// Maximum trap name length
pub const NAME_LEN: usize = 24;

/// Messages sent from the dashboard to the host
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum DashboardMessage<'a> {
    /// Current state of one trap
    #[serde(rename = "trap")]
    Trap {
        mac: &'a MacString,
        name: &'a str,
        connected: bool,
        triggered: bool,
        /// Uptime in seconds of the last status; omitted if never heard from
        #[serde(skip_serializing_if = "Option::is_none")]
        last_seen: Option<u64>,
    },
    /// A state change on one trap
    #[serde(rename = "event")]
    Event {
        mac: &'a MacString,
        name: &'a str,
        /// "connected", "disconnected", "triggered", "reset"
        event: &'static str,
        /// Whether a person should be notified
        alert: bool,
        /// Uptime in seconds
        uptime: u32,
    },
    /// Dashboard status report
    #[serde(rename = "status")]
    Status {
        /// Uptime in seconds
        uptime: u32,
        traps: u8,
        connected: u8,
        accepted: u32,
        malformed: u32,
        unknown: u32,
        /// Connectivity timeout in seconds
        timeout: u32,
        /// Board identifier
        board: &'static str,
        /// Firmware version
        version: &'static str,
    },
}

/// Commands sent from the host to the dashboard.
///
/// Deserialized via [`RawCommand`] in `comm::parse_command()` because
/// `serde_json_core` does not support internally tagged enums (`deserialize_any`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCommand {
    /// Request a status report
    GetStatus,
    /// Request one `trap` line per configured trap
    ListTraps,
    /// Change the connectivity timeout
    SetTimeout {
        /// Timeout in seconds
        secs: u32,
    },
}

/// Wire format for host commands: flat struct that `serde_json_core` can
/// deserialize without `deserialize_any`. Converted to [`HostCommand`] in
/// `comm::parse_command()`.
#[derive(Deserialize)]
pub(crate) struct RawCommand {
    pub cmd: heapless::String<16>,
    #[serde(default)]
    pub secs: Option<u32>,
}

/// Firmware version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum size of a serialized JSON message
pub const MAX_MSG_LEN: usize = 256;

/// Buffer type for serialized JSON messages
pub type MsgBuffer = Vec<u8, MAX_MSG_LEN>;

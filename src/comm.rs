/// Serial console layer: NDJSON reports out, NDJSON commands in.
///
/// The dashboard writes one JSON object per line for every trap event and
/// a periodic status line. Hosts can ask for status, list traps, or change
/// the connectivity timeout.
use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::board;
use crate::config::{ConfigError, LivenessConfig};
use crate::dashboard::Dashboard;
use crate::defaults;
use crate::identity::TrapIdentity;
use crate::liveness::{TrapEvent, TrapLivenessRecord};
use crate::protocol::{DashboardMessage, HostCommand, MsgBuffer, RawCommand, MAX_MSG_LEN, VERSION};

/// Serial baud rate
pub const SERIAL_BAUD: u32 = 115200;

/// Name shown for identities missing from the trap table
const UNNAMED: &str = "Unnamed";

// ── Serialization helpers ──────────────────────────────────────────────

/// Serialize a DashboardMessage to JSON bytes and write to the output buffer.
/// Returns the number of bytes written, or None if serialization failed.
pub fn serialize_message(msg: &DashboardMessage, buf: &mut [u8]) -> Option<usize> {
    match serde_json_core::to_slice(msg, buf) {
        Ok(len) => {
            // Append newline for NDJSON
            if len < buf.len() {
                buf[len] = b'\n';
                Some(len + 1)
            } else {
                Some(len)
            }
        }
        Err(_) => None,
    }
}

/// Serialize into a fresh line buffer.
pub fn to_line(msg: &DashboardMessage) -> Option<MsgBuffer> {
    let mut buf = MsgBuffer::new();
    buf.resize_default(MAX_MSG_LEN).ok()?;
    let len = serialize_message(msg, &mut buf)?;
    buf.truncate(len);
    Some(buf)
}

pub fn trap_line(id: &TrapIdentity, record: &TrapLivenessRecord) -> Option<MsgBuffer> {
    let mac = id.to_mac_string();
    to_line(&DashboardMessage::Trap {
        mac: &mac,
        name: defaults::trap_name(id).unwrap_or(UNNAMED),
        connected: record.connected,
        triggered: record.triggered,
        last_seen: record.last_seen.map(|t| t.as_secs()),
    })
}

/// Event report stamped with the time the record changed, not the time the
/// line is written.
pub fn event_line(event: &TrapEvent) -> Option<MsgBuffer> {
    let mac = event.id.to_mac_string();
    to_line(&DashboardMessage::Event {
        mac: &mac,
        name: defaults::trap_name(&event.id).unwrap_or(UNNAMED),
        event: event.kind.as_str(),
        alert: event.kind.is_alert(),
        uptime: event.at.as_secs().min(u32::MAX as u64) as u32,
    })
}

pub fn status_line<M: RawMutex, const N: usize>(
    dashboard: &Dashboard<M, N>,
    uptime_secs: u32,
) -> Option<MsgBuffer> {
    let stats = dashboard.stats();
    let config = dashboard.config();
    to_line(&DashboardMessage::Status {
        uptime: uptime_secs,
        traps: dashboard.trap_count() as u8,
        connected: dashboard.connected_count() as u8,
        accepted: stats.accepted,
        malformed: stats.malformed,
        unknown: stats.unknown,
        timeout: config.timeout().as_secs().min(u32::MAX as u64) as u32,
        board: board::BOARD_NAME,
        version: VERSION,
    })
}

/// Deserialize a HostCommand from a JSON byte slice.
pub fn parse_command(data: &[u8]) -> Option<HostCommand> {
    // Strip trailing newline/whitespace
    let trimmed = trim_trailing_whitespace(data);
    if trimmed.is_empty() {
        return None;
    }
    let (raw, _) = serde_json_core::from_slice::<RawCommand>(trimmed).ok()?;
    match raw.cmd.as_str() {
        "status" => Some(HostCommand::GetStatus),
        "traps" => Some(HostCommand::ListTraps),
        "set_timeout" => raw.secs.map(|secs| HostCommand::SetTimeout { secs }),
        _ => None,
    }
}

/// What the caller should write back after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandReply {
    /// Write a status line
    Status,
    /// Write one trap line per configured trap
    Traps,
    /// Timeout changed; write a status line
    TimeoutUpdated(LivenessConfig),
    /// Timeout rejected; configuration unchanged
    Rejected(ConfigError),
}

/// Process a received host command and update state accordingly.
pub fn handle_command<M: RawMutex, const N: usize>(
    cmd: HostCommand,
    dashboard: &Dashboard<M, N>,
) -> CommandReply {
    match cmd {
        HostCommand::GetStatus => CommandReply::Status,
        HostCommand::ListTraps => CommandReply::Traps,
        HostCommand::SetTimeout { secs } => {
            let timeout = core::time::Duration::from_secs(secs as u64);
            match dashboard.set_timeout(timeout) {
                Ok(config) => {
                    log::info!("Connectivity timeout set to {}s", secs);
                    CommandReply::TimeoutUpdated(config)
                }
                Err(e) => {
                    log::warn!("Rejected timeout {}s: {}", secs, e);
                    CommandReply::Rejected(e)
                }
            }
        }
    }
}

/// Emit the lines answering `reply`: one `trap` line per trap for a listing,
/// a `status` line otherwise (a rejected timeout shows the unchanged one).
pub fn reply_lines<M: RawMutex, const N: usize>(
    reply: &CommandReply,
    dashboard: &Dashboard<M, N>,
    uptime_secs: u32,
    mut emit: impl FnMut(MsgBuffer),
) {
    match reply {
        CommandReply::Traps => {
            for (id, record) in dashboard.snapshot_all() {
                if let Some(line) = trap_line(&id, &record) {
                    emit(line);
                }
            }
        }
        CommandReply::Status | CommandReply::TimeoutUpdated(_) | CommandReply::Rejected(_) => {
            if let Some(line) = status_line(dashboard, uptime_secs) {
                emit(line);
            }
        }
    }
}

/// Parse, execute and answer one console line. Unparseable lines are logged
/// and produce no output.
pub fn handle_line<M: RawMutex, const N: usize>(
    line: &[u8],
    dashboard: &Dashboard<M, N>,
    uptime_secs: u32,
    emit: impl FnMut(MsgBuffer),
) -> Option<CommandReply> {
    let Some(cmd) = parse_command(line) else {
        log::warn!("Ignoring unrecognized command line");
        return None;
    };
    let reply = handle_command(cmd, dashboard);
    reply_lines(&reply, dashboard, uptime_secs, emit);
    Some(reply)
}

// ── Serial NDJSON reader ───────────────────────────────────────────────

/// Serial NDJSON reader state machine.
/// Accumulates bytes until a newline is found, then yields the line.
/// A line longer than the buffer is dropped whole, up to its terminator.
pub struct LineReader {
    buf: [u8; MAX_MSG_LEN],
    pos: usize,
    discarding: bool,
}

impl LineReader {
    pub const fn new() -> Self {
        Self {
            buf: [0; MAX_MSG_LEN],
            pos: 0,
            discarding: false,
        }
    }

    /// Feed a byte into the reader. Returns a complete line (without newline)
    /// when one is detected.
    pub fn feed(&mut self, byte: u8) -> Option<&[u8]> {
        if byte == b'\n' || byte == b'\r' {
            if self.discarding {
                self.discarding = false;
                None
            } else if self.pos > 0 {
                let line = &self.buf[..self.pos];
                self.pos = 0;
                Some(line)
            } else {
                None
            }
        } else if self.discarding {
            None
        } else if self.pos < self.buf.len() {
            self.buf[self.pos] = byte;
            self.pos += 1;
            None
        } else {
            log::warn!("Dropping command line longer than {} bytes", MAX_MSG_LEN);
            self.pos = 0;
            self.discarding = true;
            None
        }
    }
}

impl Default for LineReader {
    fn default() -> Self {
        Self::new()
    }
}

fn trim_trailing_whitespace(data: &[u8]) -> &[u8] {
    let mut end = data.len();
    while end > 0 && matches!(data[end - 1], b' ' | b'\n' | b'\r' | b'\t') {
        end -= 1;
    }
    &data[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::liveness::TrapEventKind;
    use crate::platform::{Clock, Timestamp};
    use core::time::Duration;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    struct Fixed(u64);

    impl Clock for Fixed {
        fn now(&self) -> Timestamp {
            Timestamp::from_secs(self.0)
        }
    }

    fn dashboard() -> Dashboard<NoopRawMutex, 4> {
        let ids: heapless::Vec<TrapIdentity, 4> = defaults::TRAPS.iter().map(|t| t.id).collect();
        let config = LivenessConfig::new(
            defaults::WAKE_INTERVAL,
            defaults::CONNECTIVITY_TIMEOUT,
            defaults::WATCHDOG_PERIOD,
        )
        .unwrap();
        Dashboard::new(&ids, config).unwrap()
    }

    fn as_str(line: &MsgBuffer) -> &str {
        core::str::from_utf8(line).unwrap()
    }

    // ── Command parsing ─────────────────────────────────────────────

    #[test]
    fn parses_known_commands() {
        assert_eq!(parse_command(br#"{"cmd":"status"}"#), Some(HostCommand::GetStatus));
        assert_eq!(parse_command(br#"{"cmd":"traps"}"#), Some(HostCommand::ListTraps));
        assert_eq!(
            parse_command(b"{\"cmd\":\"set_timeout\",\"secs\":3600}\r\n"),
            Some(HostCommand::SetTimeout { secs: 3600 })
        );
    }

    #[test]
    fn rejects_bad_commands() {
        assert_eq!(parse_command(b""), None);
        assert_eq!(parse_command(b"  \n"), None);
        assert_eq!(parse_command(b"not json"), None);
        assert_eq!(parse_command(br#"{"cmd":"reboot"}"#), None);
        assert_eq!(parse_command(br#"{"cmd":"set_timeout"}"#), None);
    }

    // ── Command handling ────────────────────────────────────────────

    #[test]
    fn set_timeout_command_updates_dashboard() {
        let d = dashboard();
        let reply = handle_command(HostCommand::SetTimeout { secs: 7200 }, &d);
        assert!(matches!(reply, CommandReply::TimeoutUpdated(c) if c.timeout() == Duration::from_secs(7200)));
        assert_eq!(d.config().timeout(), Duration::from_secs(7200));
    }

    #[test]
    fn too_short_timeout_is_rejected() {
        let d = dashboard();
        let reply = handle_command(HostCommand::SetTimeout { secs: 60 }, &d);
        assert!(matches!(reply, CommandReply::Rejected(ConfigError::TimeoutTooShort { .. })));
        assert_eq!(d.config().timeout(), defaults::CONNECTIVITY_TIMEOUT);
    }

    #[test]
    fn query_commands_do_not_mutate() {
        let d = dashboard();
        assert_eq!(handle_command(HostCommand::GetStatus, &d), CommandReply::Status);
        assert_eq!(handle_command(HostCommand::ListTraps, &d), CommandReply::Traps);
        assert_eq!(d.stats().accepted, 0);
    }

    // ── Report lines ────────────────────────────────────────────────

    #[test]
    fn event_line_names_the_trap() {
        let event = TrapEvent {
            id: defaults::TRAPS[0].id,
            kind: TrapEventKind::Triggered,
            at: Timestamp::from_secs(90),
        };
        let line = event_line(&event).unwrap();
        let s = as_str(&line);
        assert!(s.ends_with('\n'));
        assert!(s.contains(r#""uptime":90"#));
        assert!(s.contains(r#""name":"Kitchen""#));
        assert!(s.contains(r#""event":"triggered""#));
        assert!(s.contains(r#""alert":true"#));
    }

    #[test]
    fn trap_line_reflects_record() {
        let d = dashboard();
        let id = defaults::TRAPS[1].id;
        d.deliver(&Fixed(30), id, &codec::encode(true)).unwrap();
        let line = trap_line(&id, &d.snapshot(&id).unwrap()).unwrap();
        let s = as_str(&line);
        assert!(s.contains(r#""name":"Garage""#));
        assert!(s.contains(r#""connected":true"#));
        assert!(s.contains(r#""triggered":true"#));
        assert!(s.contains(r#""last_seen":30"#));
    }

    #[test]
    fn unlisted_identity_is_unnamed() {
        let event = TrapEvent {
            id: TrapIdentity::new([0xEE; 6]),
            kind: TrapEventKind::Connected,
            at: Timestamp::ZERO,
        };
        let line = event_line(&event).unwrap();
        assert!(as_str(&line).contains(r#""name":"Unnamed""#));
    }

    #[test]
    fn status_line_counts() {
        let d = dashboard();
        d.deliver(&Fixed(1), defaults::TRAPS[0].id, &codec::encode(false)).unwrap();
        let _ = d.deliver(&Fixed(2), defaults::TRAPS[0].id, &[0, 0]);
        let line = status_line(&d, 77).unwrap();
        let s = as_str(&line);
        assert!(s.contains(r#""uptime":77"#));
        assert!(s.contains(r#""traps":2"#));
        assert!(s.contains(r#""connected":1"#));
        assert!(s.contains(r#""accepted":1"#));
        assert!(s.contains(r#""malformed":1"#));
        assert!(s.contains(r#""timeout":1860"#));
    }

    // ── Console lines ───────────────────────────────────────────────

    fn run_line(line: &[u8], d: &Dashboard<NoopRawMutex, 4>) -> std::vec::Vec<std::string::String> {
        let mut out = std::vec::Vec::new();
        handle_line(line, d, 5, |l| out.push(as_str(&l).to_owned()));
        out
    }

    #[test]
    fn traps_command_lists_every_trap() {
        let d = dashboard();
        let out = run_line(br#"{"cmd":"traps"}"#, &d);
        assert_eq!(out.len(), 2);
        assert!(out[0].contains(r#""name":"Kitchen""#));
        assert!(out[1].contains(r#""name":"Garage""#));
    }

    #[test]
    fn set_timeout_line_answers_with_new_status() {
        let d = dashboard();
        let out = run_line(br#"{"cmd":"set_timeout","secs":3600}"#, &d);
        assert_eq!(out.len(), 1);
        assert!(out[0].contains(r#""type":"status""#));
        assert!(out[0].contains(r#""timeout":3600"#));
    }

    #[test]
    fn rejected_timeout_reports_unchanged_status() {
        let d = dashboard();
        let out = run_line(br#"{"cmd":"set_timeout","secs":1}"#, &d);
        assert_eq!(out.len(), 1);
        assert!(out[0].contains(r#""timeout":1860"#));
    }

    #[test]
    fn garbage_line_produces_nothing() {
        let d = dashboard();
        let mut out = std::vec::Vec::new();
        assert_eq!(handle_line(b"{nope", &d, 0, |l| out.push(l)), None);
        assert!(out.is_empty());
    }

    // ── LineReader ──────────────────────────────────────────────────

    #[test]
    fn line_reader_splits_on_newline() {
        let mut reader = LineReader::new();
        let mut lines = std::vec::Vec::new();
        for &b in b"{\"cmd\":\"status\"}\r\n{\"cmd\":\"traps\"}\n" {
            if let Some(line) = reader.feed(b) {
                lines.push(line.to_vec());
            }
        }
        assert_eq!(lines.len(), 2);
        assert_eq!(parse_command(&lines[1]), Some(HostCommand::ListTraps));
    }

    #[test]
    fn line_reader_drops_overlong_line() {
        let mut reader = LineReader::new();
        for _ in 0..=MAX_MSG_LEN {
            assert!(reader.feed(b'x').is_none());
        }
        assert_eq!(reader.feed(b'\n'), None);
        for &b in b"ab" {
            reader.feed(b);
        }
        assert_eq!(reader.feed(b'\n'), Some(&b"ab"[..]));
    }

    #[test]
    fn command_at_end_of_overlong_line_is_not_executed() {
        let mut reader = LineReader::new();
        let mut lines = std::vec::Vec::new();
        let tail = b"{\"cmd\":\"set_timeout\",\"secs\":99999}\n";
        for &b in core::iter::repeat(&b'x').take(MAX_MSG_LEN + 1).chain(tail.iter()) {
            if let Some(line) = reader.feed(b) {
                lines.push(line.to_vec());
            }
        }
        assert!(lines.is_empty());

        // The next complete line is read normally.
        for &b in b"{\"cmd\":\"status\"}\n" {
            if let Some(line) = reader.feed(b) {
                lines.push(line.to_vec());
            }
        }
        assert_eq!(lines.len(), 1);
        assert_eq!(parse_command(&lines[0]), Some(HostCommand::GetStatus));
    }
}

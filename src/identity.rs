/// Trap identities: the 6-byte hardware address the radio reports as sender.
///
/// Identity never travels inside the payload; the transport supplies it.
use core::fmt;

use crate::protocol::MacString;

/// Hardware address of a trap (or of the dashboard, when used as a peer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrapIdentity([u8; 6]);

impl TrapIdentity {
    pub const fn new(mac: [u8; 6]) -> Self {
        Self(mac)
    }

    pub const fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    /// Format as "AA:BB:CC:DD:EE:FF" into a fixed-capacity string.
    pub fn format_into(&self, buf: &mut MacString) {
        use core::fmt::Write;
        buf.clear();
        let _ = write!(buf, "{}", self);
    }

    pub fn to_mac_string(&self) -> MacString {
        let mut buf = MacString::new();
        self.format_into(&mut buf);
        buf
    }
}

impl From<[u8; 6]> for TrapIdentity {
    fn from(mac: [u8; 6]) -> Self {
        Self(mac)
    }
}

impl fmt::Display for TrapIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        )
    }
}

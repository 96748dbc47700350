/// Status codec: the trap → dashboard wire payload.
///
/// One byte, `1` for triggered and `0` for idle, matching a C `bool` on the
/// wire. No header, no sequence number, no identity. Any non-zero byte reads
/// as triggered; the only validation is the length.
///
/// Widening the payload (battery level, sequence numbers) should introduce a
/// versioned frame with its own width rather than reinterpreting this byte.
use core::fmt;

/// Fixed width of an encoded status payload in bytes
pub const STATUS_LEN: usize = 1;

/// Encoded status payload
pub type StatusPayload = [u8; STATUS_LEN];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Zero-length payload
    Empty,
    /// Payload length differs from [`STATUS_LEN`]; carries the actual length
    WrongLength(usize),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Empty => write!(f, "empty status payload"),
            DecodeError::WrongLength(len) => {
                write!(f, "status payload is {} bytes, expected {}", len, STATUS_LEN)
            }
        }
    }
}

pub fn encode(triggered: bool) -> StatusPayload {
    [triggered as u8]
}

pub fn decode(bytes: &[u8]) -> Result<bool, DecodeError> {
    match bytes {
        [] => Err(DecodeError::Empty),
        [b] => Ok(*b != 0),
        _ => Err(DecodeError::WrongLength(bytes.len())),
    }
}

//! `nlmsgerr` decoding.
//!
//! An `NLMSG_ERROR` payload starts with a signed error code (negative errno,
//! 0 for a plain acknowledgement) followed by the header of the request it
//! answers. All fields are host byte order.

use std::fmt;

use crate::error::{NfqueueError, Result};

/// Minimum payload size of an error message.
pub const ERROR_RECORD_SIZE: usize = 20;

/// Decoded error or acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorRecord {
    /// Negative errno, or 0 for an acknowledgement.
    pub code: i32,
    /// Length of the original message.
    pub len: u32,
    /// Type of the original message.
    pub kind: u16,
    /// Flags of the original message.
    pub flags: u16,
    /// Sequence of the original message.
    pub sequence: u32,
    /// Port id of the original sender.
    pub pid: u32,
}

impl ErrorRecord {
    /// Decode from an `NLMSG_ERROR` payload.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < ERROR_RECORD_SIZE {
            return Err(NfqueueError::Malformed(format!(
                "error message has {} bytes, expected {}",
                buf.len(),
                ERROR_RECORD_SIZE
            )));
        }
        Ok(Self {
            code: i32::from_ne_bytes([buf[0], buf[1], buf[2], buf[3]]),
            len: u32::from_ne_bytes([buf[4], buf[5], buf[6], buf[7]]),
            kind: u16::from_ne_bytes([buf[8], buf[9]]),
            flags: u16::from_ne_bytes([buf[10], buf[11]]),
            sequence: u32::from_ne_bytes([buf[12], buf[13], buf[14], buf[15]]),
            pid: u32::from_ne_bytes([buf[16], buf[17], buf[18], buf[19]]),
        })
    }

    /// Encode to the 20-byte wire layout.
    pub fn encode(&self) -> [u8; ERROR_RECORD_SIZE] {
        let mut buf = [0u8; ERROR_RECORD_SIZE];
        buf[0..4].copy_from_slice(&self.code.to_ne_bytes());
        buf[4..8].copy_from_slice(&self.len.to_ne_bytes());
        buf[8..10].copy_from_slice(&self.kind.to_ne_bytes());
        buf[10..12].copy_from_slice(&self.flags.to_ne_bytes());
        buf[12..16].copy_from_slice(&self.sequence.to_ne_bytes());
        buf[16..20].copy_from_slice(&self.pid.to_ne_bytes());
        buf
    }

    /// True when this is an acknowledgement rather than a failure.
    #[inline]
    pub fn is_ack(&self) -> bool {
        self.code == 0
    }

    /// Positive errno value.
    #[inline]
    pub fn errno(&self) -> i32 {
        self.code.saturating_neg()
    }

    /// The errno as an `io::Error` for display.
    pub fn os_error(&self) -> std::io::Error {
        std::io::Error::from_raw_os_error(self.errno())
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (code {}, type {:#06x}, flags {:#06x}, seq {}, pid {}, len {})",
            self.os_error(),
            self.code,
            self.kind,
            self.flags,
            self.sequence,
            self.pid,
            self.len
        )
    }
}

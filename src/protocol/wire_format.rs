//! Netlink header encoding and decoding.
//!
//! Implements the 16-byte `nlmsghdr` followed by the 4-byte `nfgenmsg`
//! extra header used by every nfnetlink message:
//! ```text
//! ┌──────────┬───────┬───────┬──────────┬──────────┐
//! │ Length   │ Type  │ Flags │ Sequence │ Port ID  │
//! │ 4 bytes  │2 bytes│2 bytes│ 4 bytes  │ 4 bytes  │
//! └──────────┴───────┴───────┴──────────┴──────────┘
//! ┌────────┬─────────┬─────────────┐
//! │ Family │ Version │ Resource ID │
//! │ 1 byte │ 1 byte  │ uint16 BE   │
//! └────────┴─────────┴─────────────┘
//! ```
//!
//! The netlink header uses host byte order; the extra header's resource id
//! is Big Endian.

/// Netlink header size in bytes.
pub const HEADER_SIZE: usize = 16;

/// `nfgenmsg` size in bytes.
pub const EXTRA_HEADER_SIZE: usize = 4;

/// Netlink messages and attributes are aligned to 4 bytes.
pub const ALIGNTO: usize = 4;

/// `NETLINK_NETFILTER` protocol number.
pub const NETLINK_NETFILTER: i32 = 12;

/// `NFNETLINK_V0`.
pub const NFNETLINK_V0: u8 = 0;

/// Reserved netlink message types.
pub mod kind {
    /// Nothing, ignore.
    pub const NOOP: u16 = 1;
    /// Error or acknowledgement.
    pub const ERROR: u16 = 2;
    /// End of a multipart batch.
    pub const DONE: u16 = 3;
    /// Data lost.
    pub const OVERRUN: u16 = 4;
}

/// Netlink header flags.
pub mod flags {
    /// Request message.
    pub const REQUEST: u16 = 0x01;
    /// Multipart message, terminated by `NLMSG_DONE`.
    pub const MULTI: u16 = 0x02;
    /// Reply with an acknowledgement.
    pub const ACK: u16 = 0x04;
    /// Echo this request.
    pub const ECHO: u16 = 0x08;

    /// Request flags used for every control message: request + ack.
    pub const REQUEST_ACK: u16 = REQUEST | ACK;

    /// Check if a specific flag is set.
    #[inline]
    pub fn has_flag(flags: u16, flag: u16) -> bool {
        flags & flag != 0
    }
}

/// Round `len` up to the netlink alignment.
#[inline]
pub const fn align(len: usize) -> usize {
    (len + ALIGNTO - 1) & !(ALIGNTO - 1)
}

/// Decoded `nlmsghdr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    /// Total message length including this header (unpadded).
    pub length: u32,
    /// Message type (`subsystem << 8 | operation` for nfnetlink).
    pub kind: u16,
    /// Flags (see `flags` module).
    pub flags: u16,
    /// Sequence number (0 = let the transport assign one).
    pub sequence: u32,
    /// Sending port id (0 = kernel).
    pub pid: u32,
}

impl Header {
    /// Create a new header with length 0; it is filled in on encode.
    pub fn new(kind: u16, flags: u16, sequence: u32) -> Self {
        Self {
            length: 0,
            kind,
            flags,
            sequence,
            pid: 0,
        }
    }

    /// Encode header to bytes (host byte order).
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE` (16 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_SIZE);
        buf[0..4].copy_from_slice(&self.length.to_ne_bytes());
        buf[4..6].copy_from_slice(&self.kind.to_ne_bytes());
        buf[6..8].copy_from_slice(&self.flags.to_ne_bytes());
        buf[8..12].copy_from_slice(&self.sequence.to_ne_bytes());
        buf[12..16].copy_from_slice(&self.pid.to_ne_bytes());
    }

    /// Decode header from bytes.
    ///
    /// Returns `None` if buffer is too short.
    ///
    /// # Example
    ///
    /// ```
    /// use nfqueue::protocol::{Header, flags};
    ///
    /// let mut header = Header::new(0x0302, flags::REQUEST_ACK, 7);
    /// header.length = 20;
    /// let decoded = Header::decode(&header.encode()).unwrap();
    /// assert_eq!(decoded, header);
    /// ```
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            length: u32::from_ne_bytes([buf[0], buf[1], buf[2], buf[3]]),
            kind: u16::from_ne_bytes([buf[4], buf[5]]),
            flags: u16::from_ne_bytes([buf[6], buf[7]]),
            sequence: u32::from_ne_bytes([buf[8], buf[9], buf[10], buf[11]]),
            pid: u32::from_ne_bytes([buf[12], buf[13], buf[14], buf[15]]),
        })
    }

    /// Check if this is an error or acknowledgement.
    #[inline]
    pub fn is_error(&self) -> bool {
        self.kind == kind::ERROR
    }

    /// Check if this is a batch terminator.
    #[inline]
    pub fn is_done(&self) -> bool {
        self.kind == kind::DONE
    }

    /// Check if this header asks for an acknowledgement.
    #[inline]
    pub fn wants_ack(&self) -> bool {
        flags::has_flag(self.flags, flags::ACK)
    }

    /// nfnetlink subsystem id (high byte of the type).
    #[inline]
    pub fn subsystem(&self) -> u8 {
        (self.kind >> 8) as u8
    }

    /// nfnetlink operation (low byte of the type).
    #[inline]
    pub fn operation(&self) -> u8 {
        (self.kind & 0xFF) as u8
    }
}

/// Decoded `nfgenmsg`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtraHeader {
    /// Address family.
    pub family: u8,
    /// nfnetlink version.
    pub version: u8,
    /// Resource id (queue number), Big Endian on the wire.
    pub resource_id: u16,
}

impl ExtraHeader {
    /// Encode to 4 bytes.
    pub fn encode(&self) -> [u8; EXTRA_HEADER_SIZE] {
        encode_extra_header(self.family, self.version, self.resource_id)
    }

    /// Decode from the start of a message payload.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < EXTRA_HEADER_SIZE {
            return None;
        }
        Some(Self {
            family: buf[0],
            version: buf[1],
            resource_id: u16::from_be_bytes([buf[2], buf[3]]),
        })
    }
}

/// Encode the `nfgenmsg` extra header.
#[inline]
pub fn encode_extra_header(family: u8, version: u8, resource_id: u16) -> [u8; EXTRA_HEADER_SIZE] {
    let id = resource_id.to_be_bytes();
    [family, version, id[0], id[1]]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_encode_decode_roundtrip() {
        let mut original = Header::new(0x0301, flags::REQUEST_ACK, 42);
        original.length = 36;
        original.pid = 1234;
        let decoded = Header::decode(&original.encode()).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_header_host_byte_order() {
        let mut header = Header::new(0x0102, 0x0304, 0x05060708);
        header.length = 0x0A0B0C0D;
        let bytes = header.encode();

        assert_eq!(&bytes[0..4], &0x0A0B0C0Du32.to_ne_bytes());
        assert_eq!(&bytes[4..6], &0x0102u16.to_ne_bytes());
        assert_eq!(&bytes[6..8], &0x0304u16.to_ne_bytes());
        assert_eq!(&bytes[8..12], &0x05060708u32.to_ne_bytes());
    }

    #[test]
    fn test_decode_too_short_buffer() {
        let buf = [0u8; HEADER_SIZE - 1];
        assert!(Header::decode(&buf).is_none());
    }

    #[test]
    fn test_extra_header_resource_id_is_big_endian() {
        let bytes = encode_extra_header(10, NFNETLINK_V0, 0x0102);
        assert_eq!(bytes, [10, 0, 0x01, 0x02]);

        let decoded = ExtraHeader::decode(&bytes).unwrap();
        assert_eq!(decoded.family, 10);
        assert_eq!(decoded.version, 0);
        assert_eq!(decoded.resource_id, 0x0102);
    }

    #[test]
    fn test_extra_header_too_short() {
        assert!(ExtraHeader::decode(&[2, 0, 0]).is_none());
    }

    #[test]
    fn test_align() {
        assert_eq!(align(0), 0);
        assert_eq!(align(1), 4);
        assert_eq!(align(4), 4);
        assert_eq!(align(5), 8);
        assert_eq!(align(7), 8);
    }

    #[test]
    fn test_header_accessors() {
        let header = Header::new(0x0302, flags::REQUEST_ACK, 1);
        assert_eq!(header.subsystem(), 3);
        assert_eq!(header.operation(), 2);
        assert!(header.wants_ack());
        assert!(!header.is_error());
        assert!(!header.is_done());

        assert!(Header::new(kind::DONE, flags::MULTI, 0).is_done());
        assert!(Header::new(kind::ERROR, 0, 0).is_error());
    }

    #[test]
    fn test_type_with_error_bit_is_not_error() {
        // 0x0302 has bit 1 set but is a config message
        let header = Header::new(0x0302, 0, 0);
        assert!(!header.is_error());
    }
}

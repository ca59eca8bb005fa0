//! Netlink message with typed accessors.
//!
//! A message is a header plus its payload. Uses `bytes::Bytes` so that
//! attributes decoded from a received datagram share its storage.
//!
//! # Example
//!
//! ```
//! use nfqueue::protocol::{decode_messages, flags, Header, Message};
//! use bytes::Bytes;
//!
//! let message = Message::new(Header::new(0x0302, flags::REQUEST_ACK, 1), Bytes::from_static(b"abcd"));
//! let bytes = message.encode();
//! assert_eq!(bytes.len(), 20);
//!
//! let batch = decode_messages(&bytes).unwrap();
//! assert_eq!(batch[0].data(), b"abcd");
//! ```

use bytes::Bytes;

use super::attribute::{decode_attributes_bytes, encode_attribute_into, Attribute};
use super::wire_format::{align, ExtraHeader, Header, EXTRA_HEADER_SIZE, HEADER_SIZE};
use crate::error::{NfqueueError, Result};

/// A complete netlink message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Decoded header. `length` is recomputed on encode.
    pub header: Header,
    /// Payload bytes following the header.
    pub data: Bytes,
}

impl Message {
    /// Create a new message from header and payload.
    pub fn new(header: Header, data: Bytes) -> Self {
        Self { header, data }
    }

    /// Build an nfnetlink message: extra header followed by attributes.
    ///
    /// # Errors
    ///
    /// Returns `Malformed` if an attribute payload is too large to encode.
    pub fn with_attributes(header: Header, extra: ExtraHeader, attrs: &[Attribute]) -> Result<Self> {
        let mut data = Vec::with_capacity(
            EXTRA_HEADER_SIZE + attrs.iter().map(Attribute::encoded_len).sum::<usize>(),
        );
        data.extend_from_slice(&extra.encode());
        for attr in attrs {
            encode_attribute_into(&mut data, attr)?;
        }
        Ok(Self::new(header, Bytes::from(data)))
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Check if this is an error or acknowledgement.
    #[inline]
    pub fn is_error(&self) -> bool {
        self.header.is_error()
    }

    /// Check if this is a batch terminator.
    #[inline]
    pub fn is_done(&self) -> bool {
        self.header.is_done()
    }

    /// Sequence number.
    #[inline]
    pub fn sequence(&self) -> u32 {
        self.header.sequence
    }

    /// Split an nfnetlink payload into its extra header and attributes.
    pub fn nfnetlink_parts(&self) -> Result<(ExtraHeader, Vec<Attribute>)> {
        let extra = ExtraHeader::decode(&self.data).ok_or_else(|| {
            NfqueueError::Malformed(format!(
                "message type {:#06x} has {} payload bytes, missing nfgenmsg",
                self.header.kind,
                self.data.len()
            ))
        })?;
        let attrs = decode_attributes_bytes(&self.data.slice(EXTRA_HEADER_SIZE..))?;
        Ok((extra, attrs))
    }

    /// Encode header and padded payload into a single buffer.
    pub fn encode(&self) -> Vec<u8> {
        let length = HEADER_SIZE + self.data.len();
        let mut header = self.header;
        header.length = length as u32;

        let mut buf = Vec::with_capacity(align(length));
        buf.extend_from_slice(&header.encode());
        buf.extend_from_slice(&self.data);
        buf.resize(align(length), 0);
        buf
    }
}

/// Split one received datagram into its batch of messages.
///
/// # Errors
///
/// Returns `Malformed` if a header is truncated or declares a length that
/// is shorter than the header or runs past the datagram.
pub fn decode_messages(buf: &[u8]) -> Result<Vec<Message>> {
    let buf = Bytes::copy_from_slice(buf);
    let mut messages = Vec::new();
    let mut offset = 0;

    while offset < buf.len() {
        let header = Header::decode(&buf[offset..]).ok_or_else(|| {
            NfqueueError::Malformed(format!(
                "{} trailing bytes cannot hold a netlink header",
                buf.len() - offset
            ))
        })?;

        let length = header.length as usize;
        if length < HEADER_SIZE || length > buf.len() - offset {
            return Err(NfqueueError::Malformed(format!(
                "netlink message declares length {} with {} bytes available",
                length,
                buf.len() - offset
            )));
        }

        let data = buf.slice(offset + HEADER_SIZE..offset + length);
        messages.push(Message::new(header, data));

        offset = (offset + align(length)).min(buf.len());
    }

    Ok(messages)
}

//! Netlink attribute (TLV) encoding and decoding.
//!
//! ```text
//! ┌──────────┬──────────┬─────────────┬─────────┐
//! │ Length   │ Type     │ Payload     │ Padding │
//! │ uint16   │ uint16   │ Length - 4  │ to 4    │
//! └──────────┴──────────┴─────────────┴─────────┘
//! ```
//!
//! Length counts the 4-byte attribute header and the payload but not the
//! padding. The encoder pads every record to 4 bytes and the decoder skips
//! that padding, so `decode(encode(list)) == list`.

use bytes::Bytes;

use super::wire_format::align;
use crate::error::{NfqueueError, Result};

/// Attribute header size in bytes.
pub const ATTR_HEADER_SIZE: usize = 4;

/// Largest payload that fits the 16-bit length field.
pub const MAX_ATTR_PAYLOAD: usize = u16::MAX as usize - ATTR_HEADER_SIZE;

/// Nested attribute bit of the type field.
pub const NLA_F_NESTED: u16 = 0x8000;

/// Network byte order bit of the type field.
pub const NLA_F_NET_BYTEORDER: u16 = 0x4000;

/// Mask removing both flag bits from the type field.
pub const NLA_TYPE_MASK: u16 = !(NLA_F_NESTED | NLA_F_NET_BYTEORDER);

/// A single type/payload record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Type field as found on the wire, flag bits included.
    pub kind: u16,
    /// Opaque payload.
    pub data: Bytes,
}

impl Attribute {
    /// Create an attribute, copying the payload.
    pub fn new(kind: u16, data: &[u8]) -> Self {
        Self {
            kind,
            data: Bytes::copy_from_slice(data),
        }
    }

    /// Create an attribute from owned bytes.
    pub fn from_bytes(kind: u16, data: Bytes) -> Self {
        Self { kind, data }
    }

    /// Type with the nested and byte-order bits removed.
    #[inline]
    pub fn kind_id(&self) -> u16 {
        self.kind & NLA_TYPE_MASK
    }

    /// Encoded size including padding.
    #[inline]
    pub fn encoded_len(&self) -> usize {
        align(ATTR_HEADER_SIZE + self.data.len())
    }

    /// Big Endian `u32` payload.
    pub fn be_u32(&self) -> Result<u32> {
        let bytes = self.fixed::<4>()?;
        Ok(u32::from_be_bytes(bytes))
    }

    /// First `N` payload bytes, or `Malformed` if the payload is shorter.
    pub(crate) fn fixed<const N: usize>(&self) -> Result<[u8; N]> {
        if self.data.len() < N {
            return Err(NfqueueError::Malformed(format!(
                "attribute {} has {} bytes, expected at least {}",
                self.kind_id(),
                self.data.len(),
                N
            )));
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[..N]);
        Ok(out)
    }
}

/// Encode attributes into a contiguous, padded buffer.
///
/// # Errors
///
/// Returns `Malformed` if a payload exceeds `MAX_ATTR_PAYLOAD`.
///
/// # Example
///
/// ```
/// use nfqueue::protocol::{decode_attributes, encode_attributes, Attribute};
///
/// let attrs = vec![Attribute::new(1, &[4, 0, 0, 2]), Attribute::new(2, b"abc")];
/// let bytes = encode_attributes(&attrs).unwrap();
/// assert_eq!(bytes.len(), 8 + 8);
/// assert_eq!(decode_attributes(&bytes).unwrap(), attrs);
/// ```
pub fn encode_attributes(attrs: &[Attribute]) -> Result<Vec<u8>> {
    let total = attrs.iter().map(Attribute::encoded_len).sum();
    let mut buf = Vec::with_capacity(total);
    for attr in attrs {
        encode_attribute_into(&mut buf, attr)?;
    }
    Ok(buf)
}

/// Append one encoded attribute to `buf`.
///
/// `buf` is left untouched when the payload is too large.
pub fn encode_attribute_into(buf: &mut Vec<u8>, attr: &Attribute) -> Result<()> {
    if attr.data.len() > MAX_ATTR_PAYLOAD {
        return Err(NfqueueError::Malformed(format!(
            "attribute {} payload of {} bytes exceeds {}",
            attr.kind_id(),
            attr.data.len(),
            MAX_ATTR_PAYLOAD
        )));
    }
    let len = (ATTR_HEADER_SIZE + attr.data.len()) as u16;
    let start = buf.len();
    buf.extend_from_slice(&len.to_ne_bytes());
    buf.extend_from_slice(&attr.kind.to_ne_bytes());
    buf.extend_from_slice(&attr.data);
    buf.resize(start + attr.encoded_len(), 0);
    Ok(())
}

/// Decode a padded attribute buffer.
///
/// # Errors
///
/// Returns `Malformed` if a record is shorter than its header or its
/// declared length runs past the end of the buffer.
pub fn decode_attributes(buf: &[u8]) -> Result<Vec<Attribute>> {
    decode_attributes_bytes(&Bytes::copy_from_slice(buf))
}

/// Decode attributes sharing the payload storage of `buf`.
pub fn decode_attributes_bytes(buf: &Bytes) -> Result<Vec<Attribute>> {
    let mut attrs = Vec::new();
    let mut offset = 0;

    while offset < buf.len() {
        let remaining = buf.len() - offset;
        if remaining < ATTR_HEADER_SIZE {
            return Err(NfqueueError::Malformed(format!(
                "{} trailing bytes cannot hold an attribute header",
                remaining
            )));
        }

        let len = u16::from_ne_bytes([buf[offset], buf[offset + 1]]) as usize;
        let kind = u16::from_ne_bytes([buf[offset + 2], buf[offset + 3]]);

        if len < ATTR_HEADER_SIZE {
            return Err(NfqueueError::Malformed(format!(
                "attribute {} declares length {}",
                kind, len
            )));
        }
        if len > remaining {
            return Err(NfqueueError::Malformed(format!(
                "attribute {} declares length {} but only {} bytes remain",
                kind, len, remaining
            )));
        }

        let data = buf.slice(offset + ATTR_HEADER_SIZE..offset + len);
        attrs.push(Attribute { kind, data });

        // the final record may omit its padding
        offset = (offset + align(len)).min(buf.len());
    }

    Ok(attrs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::collection::vec;
    use proptest::prelude::*;

    #[test]
    fn test_encode_pads_to_four_bytes() {
        let bytes = encode_attributes(&[Attribute::new(5, &[1, 2, 3, 4, 5])]).unwrap();
        assert_eq!(bytes.len(), 12);
        assert_eq!(u16::from_ne_bytes([bytes[0], bytes[1]]), 9);
        assert_eq!(u16::from_ne_bytes([bytes[2], bytes[3]]), 5);
        assert_eq!(&bytes[4..9], &[1, 2, 3, 4, 5]);
        assert_eq!(&bytes[9..], &[0, 0, 0]);
    }

    #[test]
    fn test_empty_list() {
        assert!(encode_attributes(&[]).unwrap().is_empty());
        assert!(decode_attributes(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_empty_payload() {
        let attrs = vec![Attribute::new(3, &[])];
        let bytes = encode_attributes(&attrs).unwrap();
        assert_eq!(bytes.len(), 4);
        assert_eq!(decode_attributes(&bytes).unwrap(), attrs);
    }

    #[test]
    fn test_declared_length_exceeds_buffer() {
        let mut bytes = encode_attributes(&[Attribute::new(1, &[0; 8])]).unwrap();
        bytes.truncate(10);
        let err = decode_attributes(&bytes).unwrap_err();
        assert!(matches!(err, NfqueueError::Malformed(_)));
        assert!(err.to_string().contains("only 10 bytes remain"));
    }

    #[test]
    fn test_declared_length_below_header() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&2u16.to_ne_bytes());
        bytes.extend_from_slice(&1u16.to_ne_bytes());
        assert!(matches!(
            decode_attributes(&bytes),
            Err(NfqueueError::Malformed(_))
        ));
    }

    #[test]
    fn test_trailing_garbage() {
        let mut bytes = encode_attributes(&[Attribute::new(1, &[0; 4])]).unwrap();
        bytes.extend_from_slice(&[0, 0]);
        assert!(matches!(
            decode_attributes(&bytes),
            Err(NfqueueError::Malformed(_))
        ));
    }

    #[test]
    fn test_unpadded_final_record() {
        let mut bytes = encode_attributes(&[Attribute::new(7, &[9, 9])]).unwrap();
        bytes.truncate(6);
        let attrs = decode_attributes(&bytes).unwrap();
        assert_eq!(attrs, vec![Attribute::new(7, &[9, 9])]);
    }

    #[test]
    fn test_kind_id_masks_flag_bits() {
        let attr = Attribute::new(NLA_F_NESTED | NLA_F_NET_BYTEORDER | 11, &[]);
        assert_eq!(attr.kind_id(), 11);
    }

    #[test]
    fn test_be_u32_too_short() {
        let attr = Attribute::new(3, &[0, 1]);
        assert!(matches!(attr.be_u32(), Err(NfqueueError::Malformed(_))));
        assert_eq!(Attribute::new(3, &[0, 0, 1, 0]).be_u32().unwrap(), 256);
    }

    #[test]
    fn test_decode_bytes_shares_storage() {
        let encoded = Bytes::from(encode_attributes(&[Attribute::new(10, b"payload")]).unwrap());
        let attrs = decode_attributes_bytes(&encoded).unwrap();
        assert_eq!(attrs[0].data.as_ptr(), encoded[4..].as_ptr());
    }

    #[test]
    fn test_payload_size_limit() {
        let largest = Attribute::from_bytes(1, Bytes::from(vec![7u8; MAX_ATTR_PAYLOAD]));
        let bytes = encode_attributes(&[largest.clone()]).unwrap();
        assert_eq!(u16::from_ne_bytes([bytes[0], bytes[1]]), u16::MAX);
        assert_eq!(decode_attributes(&bytes).unwrap(), vec![largest]);

        let oversized = Attribute::from_bytes(1, Bytes::from(vec![7u8; MAX_ATTR_PAYLOAD + 1]));
        let err = encode_attributes(&[oversized.clone()]).unwrap_err();
        assert!(matches!(err, NfqueueError::Malformed(_)));

        let mut buf = vec![1, 2];
        assert!(encode_attribute_into(&mut buf, &oversized).is_err());
        assert_eq!(buf, vec![1, 2]);
    }

    fn attribute_strategy() -> impl Strategy<Value = Attribute> {
        (any::<u16>(), vec(any::<u8>(), 0..128))
            .prop_map(|(kind, data)| Attribute::new(kind, &data))
    }

    proptest! {
        #[test]
        fn test_attribute_list_roundtrip(attrs in vec(attribute_strategy(), 0..16)) {
            let bytes = encode_attributes(&attrs).unwrap();
            prop_assert_eq!(bytes.len() % 4, 0);
            prop_assert_eq!(decode_attributes(&bytes).unwrap(), attrs);
        }
    }
}

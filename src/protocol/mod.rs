//! Protocol module - netlink wire format, attributes and messages.
//!
//! This module implements the binary control protocol:
//! - 16-byte netlink header and 4-byte nfnetlink extra header
//! - Attribute list encoding with 4-byte alignment
//! - Datagram splitting into message batches
//! - Error record decoding
//! - nfnetlink_queue ABI constants

mod attribute;
mod error_record;
mod message;
mod netfilter;
mod wire_format;

pub use attribute::{
    decode_attributes, decode_attributes_bytes, encode_attribute_into, encode_attributes,
    Attribute, ATTR_HEADER_SIZE, MAX_ATTR_PAYLOAD, NLA_F_NESTED, NLA_F_NET_BYTEORDER,
    NLA_TYPE_MASK,
};
pub use error_record::{ErrorRecord, ERROR_RECORD_SIZE};
pub use message::{decode_messages, Message};
pub use netfilter::{
    attr, cfg, cmd, msg, queue_flags, queue_msg_type, CopyMode, Family, Verdict, AF_INET,
    AF_INET6, AF_UNSPEC, NFNL_SUBSYS_QUEUE,
};
pub use wire_format::{
    align, encode_extra_header, flags, kind, ExtraHeader, Header, ALIGNTO, EXTRA_HEADER_SIZE,
    HEADER_SIZE, NETLINK_NETFILTER, NFNETLINK_V0,
};

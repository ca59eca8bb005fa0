//! Delivered packet record.
//!
//! Built from the attributes of an `NFQNL_MSG_PACKET` message. Every field
//! is optional because the kernel only attaches what the copy mode and
//! queue flags ask for.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;

use crate::error::{NfqueueError, Result};
use crate::protocol::{attr, Attribute, ExtraHeader, Message};

/// `nfqnl_msg_packet_hdr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Id used when issuing the verdict.
    pub id: u32,
    /// Link-layer protocol (ethertype).
    pub hw_protocol: u16,
    /// Netfilter hook the packet was queued from.
    pub hook: u8,
}

/// One intercepted packet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Packet {
    /// Family from the extra header.
    pub family: u8,
    /// Queue number from the extra header.
    pub queue: u16,
    /// Packet id, ethertype and hook.
    pub header: Option<PacketHeader>,
    /// Netfilter mark.
    pub mark: Option<u32>,
    /// Time the packet was queued.
    pub timestamp: Option<SystemTime>,
    /// Input interface index.
    pub indev: Option<u32>,
    /// Output interface index.
    pub outdev: Option<u32>,
    /// Physical input interface index (bridged traffic).
    pub physindev: Option<u32>,
    /// Physical output interface index (bridged traffic).
    pub physoutdev: Option<u32>,
    /// Hardware source address, trimmed to its declared length.
    pub hw_addr: Option<Bytes>,
    /// Packet bytes, up to the configured buffer size.
    pub payload: Option<Bytes>,
    /// Raw nested conntrack attributes.
    pub ct: Option<Bytes>,
    /// Conntrack state (`enum ip_conntrack_info`).
    pub ct_info: Option<u32>,
    /// Original length when the payload was truncated to the buffer size.
    pub cap_len: Option<u32>,
    /// `NFQA_SKB_*` bits such as GSO and checksum state.
    pub skb_info: Option<u32>,
    /// Owning socket uid, with the uid/gid queue flag set.
    pub uid: Option<u32>,
    /// Owning socket gid, with the uid/gid queue flag set.
    pub gid: Option<u32>,
    /// Security context string, with the secctx queue flag set.
    pub secctx: Option<Bytes>,
    /// Link-layer header.
    pub l2_header: Option<Bytes>,
}

impl Packet {
    /// Decode a packet message (extra header and attributes).
    pub fn from_message(message: &Message) -> Result<Self> {
        let (extra, attrs) = message.nfnetlink_parts()?;
        Self::from_parts(extra, &attrs)
    }

    /// Build from an already split extra header and attribute list.
    pub fn from_parts(extra: ExtraHeader, attrs: &[Attribute]) -> Result<Self> {
        let mut packet = Self::from_attributes(attrs)?;
        packet.family = extra.family;
        packet.queue = extra.resource_id;
        Ok(packet)
    }

    /// Extract the known attributes; unknown ones are ignored.
    pub fn from_attributes(attrs: &[Attribute]) -> Result<Self> {
        let mut packet = Packet::default();

        for a in attrs {
            match a.kind_id() {
                attr::PACKET_HDR => {
                    let b = a.fixed::<7>()?;
                    packet.header = Some(PacketHeader {
                        id: u32::from_be_bytes([b[0], b[1], b[2], b[3]]),
                        hw_protocol: u16::from_be_bytes([b[4], b[5]]),
                        hook: b[6],
                    });
                }
                attr::MARK => packet.mark = Some(a.be_u32()?),
                attr::TIMESTAMP => packet.timestamp = Some(decode_timestamp(a)?),
                attr::IFINDEX_INDEV => packet.indev = Some(a.be_u32()?),
                attr::IFINDEX_OUTDEV => packet.outdev = Some(a.be_u32()?),
                attr::IFINDEX_PHYSINDEV => packet.physindev = Some(a.be_u32()?),
                attr::IFINDEX_PHYSOUTDEV => packet.physoutdev = Some(a.be_u32()?),
                attr::HWADDR => packet.hw_addr = Some(decode_hw_addr(a)?),
                attr::PAYLOAD => packet.payload = Some(a.data.clone()),
                attr::CT => packet.ct = Some(a.data.clone()),
                attr::CT_INFO => packet.ct_info = Some(a.be_u32()?),
                attr::CAP_LEN => packet.cap_len = Some(a.be_u32()?),
                attr::SKB_INFO => packet.skb_info = Some(a.be_u32()?),
                attr::UID => packet.uid = Some(a.be_u32()?),
                attr::GID => packet.gid = Some(a.be_u32()?),
                attr::SECCTX => packet.secctx = Some(a.data.clone()),
                attr::L2HDR => packet.l2_header = Some(a.data.clone()),
                _ => {}
            }
        }

        Ok(packet)
    }

    /// Packet id, if the header attribute was present.
    #[inline]
    pub fn id(&self) -> Option<u32> {
        self.header.map(|h| h.id)
    }

    /// Payload bytes, empty when not copied.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        self.payload.as_deref().unwrap_or_default()
    }
}

// nfqnl_msg_packet_timestamp: be64 sec, be64 usec
fn decode_timestamp(a: &Attribute) -> Result<SystemTime> {
    let b = a.fixed::<16>()?;
    let mut sec = [0u8; 8];
    let mut usec = [0u8; 8];
    sec.copy_from_slice(&b[..8]);
    usec.copy_from_slice(&b[8..]);
    let since_epoch = Duration::from_secs(u64::from_be_bytes(sec))
        + Duration::from_micros(u64::from_be_bytes(usec));
    UNIX_EPOCH
        .checked_add(since_epoch)
        .ok_or_else(|| NfqueueError::Malformed("timestamp out of range".to_string()))
}

// nfqnl_msg_packet_hw: be16 addrlen, u16 pad, u8 addr[8]
fn decode_hw_addr(a: &Attribute) -> Result<Bytes> {
    let b = a.fixed::<4>()?;
    let len = u16::from_be_bytes([b[0], b[1]]) as usize;
    let end = 4 + len.min(8);
    if a.data.len() < end {
        return Err(NfqueueError::Malformed(format!(
            "hardware address declares {} bytes, attribute holds {}",
            len,
            a.data.len() - 4
        )));
    }
    Ok(a.data.slice(4..end))
}

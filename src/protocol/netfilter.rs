//! nfnetlink_queue ABI constants and typed values.
//!
//! Values mirror `linux/netfilter/nfnetlink_queue.h` and
//! `linux/netfilter.h`; they are fixed by the kernel and must not change.

use serde::{Deserialize, Serialize};

use crate::error::{NfqueueError, Result};

/// `AF_UNSPEC`.
pub const AF_UNSPEC: u8 = 0;
/// `AF_INET`.
pub const AF_INET: u8 = 2;
/// `AF_INET6`.
pub const AF_INET6: u8 = 10;

/// `NFNL_SUBSYS_QUEUE`.
pub const NFNL_SUBSYS_QUEUE: u16 = 3;

/// Queue message operations.
pub mod msg {
    /// Packet delivered from the kernel.
    pub const PACKET: u8 = 0;
    /// Verdict for one packet.
    pub const VERDICT: u8 = 1;
    /// Queue configuration.
    pub const CONFIG: u8 = 2;
    /// Verdict for all packets up to an id.
    pub const VERDICT_BATCH: u8 = 3;
}

/// Full message type for a queue operation.
#[inline]
pub const fn queue_msg_type(operation: u8) -> u16 {
    (NFNL_SUBSYS_QUEUE << 8) | operation as u16
}

/// Packet attributes (`NFQA_*`).
pub mod attr {
    /// `nfqnl_msg_packet_hdr`.
    pub const PACKET_HDR: u16 = 1;
    /// `nfqnl_msg_verdict_hdr`.
    pub const VERDICT_HDR: u16 = 2;
    /// Firewall mark.
    pub const MARK: u16 = 3;
    /// `nfqnl_msg_packet_timestamp`.
    pub const TIMESTAMP: u16 = 4;
    /// Input interface index.
    pub const IFINDEX_INDEV: u16 = 5;
    /// Output interface index.
    pub const IFINDEX_OUTDEV: u16 = 6;
    /// Physical input interface index.
    pub const IFINDEX_PHYSINDEV: u16 = 7;
    /// Physical output interface index.
    pub const IFINDEX_PHYSOUTDEV: u16 = 8;
    /// `nfqnl_msg_packet_hw`.
    pub const HWADDR: u16 = 9;
    /// Packet bytes.
    pub const PAYLOAD: u16 = 10;
    /// Conntrack entry.
    pub const CT: u16 = 11;
    /// Conntrack state.
    pub const CT_INFO: u16 = 12;
    /// Original packet length before truncation.
    pub const CAP_LEN: u16 = 13;
    /// `NFQA_SKB_*` bits.
    pub const SKB_INFO: u16 = 14;
    /// Conntrack expectation.
    pub const EXP: u16 = 15;
    /// Socket owner uid.
    pub const UID: u16 = 16;
    /// Socket owner gid.
    pub const GID: u16 = 17;
    /// Security context.
    pub const SECCTX: u16 = 18;
    /// VLAN info.
    pub const VLAN: u16 = 19;
    /// Link-layer header.
    pub const L2HDR: u16 = 20;
}

/// Configuration attributes (`NFQA_CFG_*`).
pub mod cfg {
    /// `nfqnl_msg_config_cmd`.
    pub const CMD: u16 = 1;
    /// `nfqnl_msg_config_params`.
    pub const PARAMS: u16 = 2;
    /// Maximum queue length.
    pub const QUEUE_MAXLEN: u16 = 3;
    /// Which flag bits are meaningful.
    pub const MASK: u16 = 4;
    /// Flag values.
    pub const FLAGS: u16 = 5;
}

/// Configuration commands (`NFQNL_CFG_CMD_*`).
pub mod cmd {
    /// No-op.
    pub const NONE: u8 = 0;
    /// Bind to a queue.
    pub const BIND: u8 = 1;
    /// Unbind from a queue.
    pub const UNBIND: u8 = 2;
    /// Bind a protocol family.
    pub const PF_BIND: u8 = 3;
    /// Unbind a protocol family.
    pub const PF_UNBIND: u8 = 4;
}

/// Queue configuration flags (`NFQA_CFG_F_*`).
pub mod queue_flags {
    /// Accept packets when the queue is full instead of dropping them.
    pub const FAIL_OPEN: u32 = 0x01;
    /// Attach conntrack information.
    pub const CONNTRACK: u32 = 0x02;
    /// Deliver GSO packets without segmenting.
    pub const GSO: u32 = 0x04;
    /// Attach socket owner uid/gid.
    pub const UID_GID: u32 = 0x08;
    /// Attach security context.
    pub const SECCTX: u32 = 0x10;
    /// First value that is not a recognized flag.
    pub const MAX: u32 = 0x20;
}

/// Address family a queue intercepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    /// IPv4.
    Inet,
    /// IPv6.
    Inet6,
}

impl Family {
    /// Raw `AF_*` value.
    #[inline]
    pub fn as_u8(self) -> u8 {
        match self {
            Family::Inet => AF_INET,
            Family::Inet6 => AF_INET6,
        }
    }
}

impl TryFrom<u8> for Family {
    type Error = NfqueueError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            AF_INET => Ok(Family::Inet),
            AF_INET6 => Ok(Family::Inet6),
            other => Err(NfqueueError::InvalidFamily(other)),
        }
    }
}

impl From<Family> for u8 {
    fn from(family: Family) -> u8 {
        family.as_u8()
    }
}

/// Disposition of a queued packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Verdict {
    /// `NF_DROP`.
    Drop = 0,
    /// `NF_ACCEPT`.
    Accept = 1,
    /// `NF_STOLEN`.
    Stolen = 2,
    /// `NF_QUEUE`.
    Queue = 3,
    /// `NF_REPEAT`.
    Repeat = 4,
}

impl Verdict {
    /// Raw verdict code.
    #[inline]
    pub fn code(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for Verdict {
    type Error = NfqueueError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0 => Ok(Verdict::Drop),
            1 => Ok(Verdict::Accept),
            2 => Ok(Verdict::Stolen),
            3 => Ok(Verdict::Queue),
            4 => Ok(Verdict::Repeat),
            other => Err(NfqueueError::InvalidVerdict(other)),
        }
    }
}

impl From<Verdict> for u32 {
    fn from(verdict: Verdict) -> u32 {
        verdict.code()
    }
}

/// How much of each packet the kernel copies to userspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum CopyMode {
    /// `NFQNL_COPY_NONE`.
    None = 0,
    /// `NFQNL_COPY_META`: metadata only.
    Meta = 1,
    /// `NFQNL_COPY_PACKET`: metadata and payload up to the buffer size.
    #[default]
    Packet = 2,
}

impl CopyMode {
    /// Raw mode byte.
    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for CopyMode {
    type Error = NfqueueError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(CopyMode::None),
            1 => Ok(CopyMode::Meta),
            2 => Ok(CopyMode::Packet),
            other => Err(NfqueueError::InvalidCopyMode(other)),
        }
    }
}

//! Outbound control request builders.
//!
//! Pure constructors for the messages sent to the queue subsystem:
//! verdicts and configuration requests. Every request asks for an
//! acknowledgement so the executor can correlate it.
//!
//! # Example
//!
//! ```
//! use nfqueue::request::{build_config, config_command};
//! use nfqueue::protocol::{cmd, AF_INET};
//!
//! let message = build_config(AF_INET, 0, 0, &[config_command(cmd::PF_BIND, AF_INET)]).unwrap();
//! assert_eq!(message.header.kind, 0x0302);
//! ```

use crate::error::Result;
use crate::protocol::{
    attr, cfg, flags, msg, queue_msg_type, Attribute, ExtraHeader, Header, Message, Verdict,
    NFNETLINK_V0,
};

/// Build a verdict (or batch verdict) request.
///
/// # Errors
///
/// Returns `InvalidVerdict` if `verdict` is not one of the five kernel
/// actions.
pub fn build_verdict(
    family: u8,
    queue: u16,
    sequence: u32,
    id: u32,
    verdict: u32,
    batch: bool,
) -> Result<Message> {
    let verdict = Verdict::try_from(verdict)?;

    // nfqnl_msg_verdict_hdr: be32 verdict, be32 id
    let mut data = [0u8; 8];
    data[..4].copy_from_slice(&verdict.code().to_be_bytes());
    data[4..].copy_from_slice(&id.to_be_bytes());

    let operation = if batch { msg::VERDICT_BATCH } else { msg::VERDICT };
    Message::with_attributes(
        Header::new(queue_msg_type(operation), flags::REQUEST_ACK, sequence),
        ExtraHeader {
            family,
            version: NFNETLINK_V0,
            resource_id: queue,
        },
        &[Attribute::new(attr::VERDICT_HDR, &data)],
    )
}

/// Build a configuration request carrying `attrs` in order.
///
/// # Errors
///
/// Returns `Malformed` if an attribute payload is too large to encode.
pub fn build_config(
    family: u8,
    sequence: u32,
    resource_id: u16,
    attrs: &[Attribute],
) -> Result<Message> {
    Message::with_attributes(
        Header::new(queue_msg_type(msg::CONFIG), flags::REQUEST_ACK, sequence),
        ExtraHeader {
            family,
            version: NFNETLINK_V0,
            resource_id,
        },
        attrs,
    )
}

/// `nfqnl_msg_config_cmd`: command byte, two pad bytes, family.
pub fn config_command(command: u8, family: u8) -> Attribute {
    Attribute::new(cfg::CMD, &[command, 0, 0, family])
}

/// `nfqnl_msg_config_params`: be32 copy range followed by the mode byte.
pub fn config_params(buffer_size: u32, copy_mode: u8) -> Attribute {
    let mut data = [0u8; 5];
    data[..4].copy_from_slice(&buffer_size.to_be_bytes());
    data[4] = copy_mode;
    Attribute::new(cfg::PARAMS, &data)
}

/// Flags and mask attributes; the mask equals the flags.
pub fn config_flags(queue_flags: u32) -> [Attribute; 2] {
    let data = queue_flags.to_be_bytes();
    [
        Attribute::new(cfg::FLAGS, &data),
        Attribute::new(cfg::MASK, &data),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NfqueueError;
    use crate::protocol::{cmd, AF_INET, AF_INET6, AF_UNSPEC, MAX_ATTR_PAYLOAD};

    #[test]
    fn test_verdict_accepts_all_five() {
        for code in 0..5u32 {
            let message = build_verdict(AF_INET, 1, 0, 10, code, false).unwrap();
            let (_, attrs) = message.nfnetlink_parts().unwrap();
            assert_eq!(&attrs[0].data[..4], &code.to_be_bytes());
        }
    }

    #[test]
    fn test_verdict_rejects_unknown_codes() {
        for code in [5u32, 6, 0x100, u32::MAX] {
            let err = build_verdict(AF_INET, 1, 0, 10, code, false).unwrap_err();
            assert!(matches!(err, NfqueueError::InvalidVerdict(c) if c == code));
            assert!(err.is_configuration());
        }
    }

    #[test]
    fn test_verdict_batch_selects_operation() {
        let single = build_verdict(AF_INET, 1, 0, 10, 1, false).unwrap();
        let batch = build_verdict(AF_INET, 1, 0, 10, 1, true).unwrap();

        assert_eq!(single.header.kind, queue_msg_type(msg::VERDICT));
        assert_eq!(batch.header.kind, queue_msg_type(msg::VERDICT_BATCH));
        assert_eq!(single.data, batch.data);
    }

    #[test]
    fn test_verdict_layout() {
        let message = build_verdict(AF_INET6, 0x0102, 7, 0xDEADBEEF, 1, false).unwrap();

        assert_eq!(message.header.flags, flags::REQUEST_ACK);
        assert_eq!(message.header.sequence, 7);
        assert_eq!(message.data().len(), 4 + 12);
        assert_eq!(&message.data()[..4], &[AF_INET6, 0, 0x01, 0x02]);

        let (_, attrs) = message.nfnetlink_parts().unwrap();
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs[0].kind, attr::VERDICT_HDR);
        assert_eq!(&attrs[0].data[..], &[0, 0, 0, 1, 0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn test_config_preserves_attribute_order() {
        let message = build_config(
            AF_UNSPEC,
            3,
            9,
            &[config_command(cmd::BIND, AF_INET), config_params(0xFFFF, 2)],
        )
        .unwrap();
        assert_eq!(message.header.kind, queue_msg_type(msg::CONFIG));

        let (extra, attrs) = message.nfnetlink_parts().unwrap();
        assert_eq!(extra.family, AF_UNSPEC);
        assert_eq!(extra.resource_id, 9);
        assert_eq!(attrs[0].kind, cfg::CMD);
        assert_eq!(&attrs[0].data[..], &[cmd::BIND, 0, 0, AF_INET]);
        assert_eq!(attrs[1].kind, cfg::PARAMS);
        assert_eq!(&attrs[1].data[..], &[0, 0, 0xFF, 0xFF, 2]);
    }

    #[test]
    fn test_config_rejects_oversized_attribute() {
        let big = Attribute::new(cfg::PARAMS, &vec![0u8; MAX_ATTR_PAYLOAD + 1]);
        let err = build_config(AF_UNSPEC, 0, 0, &[big]).unwrap_err();
        assert!(matches!(err, NfqueueError::Malformed(_)));
    }

    #[test]
    fn test_config_flags_mask_equals_flags() {
        let [flags_attr, mask_attr] = config_flags(0x11);
        assert_eq!(flags_attr.kind, cfg::FLAGS);
        assert_eq!(mask_attr.kind, cfg::MASK);
        assert_eq!(&flags_attr.data[..], &[0, 0, 0, 0x11]);
        assert_eq!(flags_attr.data, mask_attr.data);
    }
}

//! Single-acknowledgement request execution.
//!
//! Every control request this crate sends asks for exactly one
//! acknowledgement. [`execute`] sends the request, checks that the replies
//! belong to it and returns the acknowledgement's sequence number so that
//! dependent requests can reuse it.

use crate::error::{NfqueueError, Result};
use crate::protocol::{ErrorRecord, Header, Message};
use crate::transport::Transport;

/// Send `request` and return the sequence number of its acknowledgement.
///
/// # Errors
///
/// - transport failures are returned unchanged
/// - `Protocol` if a reply does not correlate with the request
/// - `UnexpectedMessageCount` unless exactly one reply arrived
/// - `KernelRejection` if the reply is an error record with a non-zero code
pub async fn execute<T: Transport + ?Sized>(transport: &T, request: Message) -> Result<u32> {
    let exchange = transport.execute(request).await?;

    validate(&exchange.request, &exchange.replies)?;

    let reply = match exchange.replies.as_slice() {
        [reply] => reply,
        replies => return Err(NfqueueError::UnexpectedMessageCount(replies.len())),
    };

    if reply.is_error() {
        let record = ErrorRecord::decode(reply.data())?;
        if !record.is_ack() {
            return Err(NfqueueError::KernelRejection(record));
        }
    }

    Ok(reply.sequence())
}

/// Check that every reply answers `request`.
pub fn validate(request: &Header, replies: &[Message]) -> Result<()> {
    for reply in replies {
        if reply.header.sequence != request.sequence {
            return Err(NfqueueError::Protocol(format!(
                "reply sequence {} does not match request sequence {}",
                reply.header.sequence, request.sequence
            )));
        }
        if request.pid != 0 && reply.header.pid != request.pid {
            return Err(NfqueueError::Protocol(format!(
                "reply port id {} does not match request port id {}",
                reply.header.pid, request.pid
            )));
        }
    }
    Ok(())
}

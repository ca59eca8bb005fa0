//! Scripted in-memory transport for unit tests.
//!
//! Every executed request is recorded and answered with an acknowledgement
//! unless a script entry overrides that request's reply. Batches pushed with
//! `push_batch` are handed out by `receive` in order; after `close` the
//! remaining batches drain and `receive` fails with `ConnectionClosed`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use tokio::sync::mpsc;

use super::{BoxFuture, Exchange, Transport};
use crate::error::{NfqueueError, Result};
use crate::protocol::{
    attr, flags, kind, msg, queue_msg_type, Attribute, ErrorRecord, ExtraHeader, Header, Message,
    AF_INET, NFNETLINK_V0,
};

/// Reply override for one `execute` call, by call index.
pub(crate) enum Script {
    /// Answer with an error record carrying `-errno`.
    Reject(i32),
    /// Answer with these messages verbatim.
    Replies(Vec<Message>),
    /// Fail the transport call itself.
    Fail,
}

type Delivery = Result<Vec<Message>>;

pub(crate) struct MockTransport {
    executed: Mutex<Vec<Message>>,
    scripts: Mutex<HashMap<usize, Script>>,
    next_sequence: AtomicU32,
    inbound_tx: Mutex<Option<mpsc::UnboundedSender<Delivery>>>,
    inbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Delivery>>,
}

impl MockTransport {
    pub(crate) fn new() -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            executed: Mutex::new(Vec::new()),
            scripts: Mutex::new(HashMap::new()),
            next_sequence: AtomicU32::new(100),
            inbound_tx: Mutex::new(Some(tx)),
            inbound_rx: tokio::sync::Mutex::new(rx),
        })
    }

    pub(crate) fn script(&self, index: usize, script: Script) {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(index, script);
    }

    pub(crate) fn push_batch(&self, batch: Vec<Message>) {
        self.push(Ok(batch));
    }

    pub(crate) fn push_error(&self, error: NfqueueError) {
        self.push(Err(error));
    }

    fn push(&self, delivery: Delivery) {
        if let Some(tx) = self
            .inbound_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            let _ = tx.send(delivery);
        }
    }

    pub(crate) fn executed(&self) -> Vec<Message> {
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Transport for MockTransport {
    fn execute(&self, mut request: Message) -> BoxFuture<'_, Result<Exchange>> {
        Box::pin(async move {
            if request.header.sequence == 0 {
                request.header.sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
            }

            let index = {
                let mut executed = self.executed.lock().unwrap_or_else(PoisonError::into_inner);
                executed.push(request.clone());
                executed.len() - 1
            };

            let script = self
                .scripts
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&index);
            let replies = match script {
                None => vec![error_message(&request.header, 0)],
                Some(Script::Reject(errno)) => vec![error_message(&request.header, -errno)],
                Some(Script::Replies(replies)) => replies,
                Some(Script::Fail) => return Err(NfqueueError::ConnectionClosed),
            };

            Ok(Exchange {
                request: request.header,
                replies,
            })
        })
    }

    fn receive(&self) -> BoxFuture<'_, Result<Vec<Message>>> {
        Box::pin(async move {
            let mut rx = self.inbound_rx.lock().await;
            rx.recv()
                .await
                .unwrap_or(Err(NfqueueError::ConnectionClosed))
        })
    }

    fn close(&self) -> Result<()> {
        self.inbound_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Ok(())
    }
}

/// `NLMSG_ERROR` answering `request` with `code` (0 = ack).
pub(crate) fn error_message(request: &Header, code: i32) -> Message {
    let record = ErrorRecord {
        code,
        len: 0,
        kind: request.kind,
        flags: request.flags,
        sequence: request.sequence,
        pid: 0,
    };
    let mut header = Header::new(kind::ERROR, 0, request.sequence);
    header.pid = 4242;
    Message::new(header, Bytes::copy_from_slice(&record.encode()))
}

/// A delivered packet with the given id and payload on queue 0.
pub(crate) fn packet_message(id: u32, payload: &[u8]) -> Message {
    let mut hdr = id.to_be_bytes().to_vec();
    hdr.extend_from_slice(&0x0800u16.to_be_bytes());
    hdr.push(1);
    Message::with_attributes(
        Header::new(queue_msg_type(msg::PACKET), 0, 0),
        ExtraHeader {
            family: AF_INET,
            version: NFNETLINK_V0,
            resource_id: 0,
        },
        &[
            Attribute::new(attr::PACKET_HDR, &hdr),
            Attribute::new(attr::PAYLOAD, payload),
        ],
    )
    .unwrap()
}

/// Batch terminator.
pub(crate) fn done_message() -> Message {
    Message::new(Header::new(kind::DONE, flags::MULTI, 0), Bytes::from_static(&[0; 4]))
}

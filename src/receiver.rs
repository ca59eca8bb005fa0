//! Receive loop - reads message batches and dispatches packets to the hook.
//!
//! The loop runs as one spawned task per registration:
//! 1. Wait for the next batch from the transport (or a cancel signal)
//! 2. For each message in order:
//!    - `NLMSG_DONE`: drop the rest of the batch, go back to 1
//!    - `NLMSG_ERROR`: stop
//!    - anything else: decode as a packet and call the hook
//! 3. Stop when the hook returns non-zero
//!
//! Every stop except a failed read sends the deferred unbind request.
//! A failed read means the channel is already gone, so nothing is sent.
//! A datagram that reads fine but cannot be split into messages is a
//! decode failure, not a failed read.

use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::{NfqueueError, Result};
use crate::executor;
use crate::hook::{Hook, CONTINUE};
use crate::packet::Packet;
use crate::protocol::{ErrorRecord, Message};
use crate::transport::Transport;

/// Why the receive loop stopped.
#[derive(Debug)]
pub enum LoopExit {
    /// The hook returned this non-zero value.
    HookStopped(i32),
    /// [`Registration::cancel`] was called.
    Cancelled,
    /// Reading from the transport failed; no unbind was sent.
    Closed(NfqueueError),
    /// The kernel sent an error record.
    Rejected(ErrorRecord),
    /// A message could not be decoded.
    Malformed(NfqueueError),
}

impl LoopExit {
    /// Whether this exit sends the deferred unbind.
    #[inline]
    pub fn unbinds(&self) -> bool {
        !matches!(self, LoopExit::Closed(_))
    }
}

/// Handle to a running receive loop.
///
/// Dropping the handle detaches the loop; it keeps running until the hook
/// stops it or the transport closes.
pub struct Registration {
    sequence: u32,
    cancel: Option<oneshot::Sender<()>>,
    task: JoinHandle<LoopExit>,
}

impl Registration {
    /// Spawn the loop on the current Tokio runtime.
    pub(crate) fn spawn<T, H>(transport: Arc<T>, hook: H, unbind: Message, sequence: u32) -> Self
    where
        T: Transport + ?Sized,
        H: Hook,
    {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let task = tokio::spawn(run(transport, hook, unbind, cancel_rx));
        Self {
            sequence,
            cancel: Some(cancel_tx),
            task,
        }
    }

    /// Sequence number shared by the handshake and the deferred unbind.
    #[inline]
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Ask the loop to stop before its next read.
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }

    /// Check if the loop has stopped.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the loop to stop.
    pub async fn wait(self) -> Result<LoopExit> {
        self.task.await.map_err(|_| NfqueueError::LoopPanicked)
    }
}

/// Loop body followed by the deferred unbind.
async fn run<T, H>(
    transport: Arc<T>,
    hook: H,
    unbind: Message,
    mut cancel: oneshot::Receiver<()>,
) -> LoopExit
where
    T: Transport + ?Sized,
    H: Hook,
{
    let exit = receive_until_stopped(&*transport, &hook, &mut cancel).await;

    if exit.unbinds() {
        if let Err(e) = executor::execute(&*transport, unbind).await {
            tracing::warn!("Could not unbind from queue: {}", e);
        }
    }

    tracing::info!("Receive loop stopped: {:?}", exit);
    exit
}

async fn receive_until_stopped<T, H>(
    transport: &T,
    hook: &H,
    cancel: &mut oneshot::Receiver<()>,
) -> LoopExit
where
    T: Transport + ?Sized,
    H: Hook,
{
    let mut cancel_open = true;

    loop {
        let batch = tokio::select! {
            biased;
            signal = &mut *cancel, if cancel_open => match signal {
                Ok(()) => return LoopExit::Cancelled,
                // handle dropped: keep running detached
                Err(_) => {
                    cancel_open = false;
                    continue;
                }
            },
            batch = transport.receive() => batch,
        };

        let batch = match batch {
            Ok(batch) => batch,
            Err(e @ NfqueueError::Malformed(_)) => {
                tracing::error!("Could not parse datagram: {}", e);
                return LoopExit::Malformed(e);
            }
            Err(e) => return LoopExit::Closed(e),
        };

        for message in batch {
            if message.is_done() {
                break;
            }

            if message.is_error() {
                return match ErrorRecord::decode(message.data()) {
                    Ok(record) => {
                        tracing::error!("Received error message: {}", record);
                        LoopExit::Rejected(record)
                    }
                    Err(e) => {
                        tracing::error!("Could not parse message: {}", e);
                        LoopExit::Malformed(e)
                    }
                };
            }

            let packet = match Packet::from_message(&message) {
                Ok(packet) => packet,
                Err(e) => {
                    tracing::error!("Could not parse message: {}", e);
                    return LoopExit::Malformed(e);
                }
            };

            let ret = hook.call(packet).await;
            if ret != CONTINUE {
                return LoopExit::HookStopped(ret);
            }
        }
    }
}

//! Transport module - the netlink channel the queue talks over.
//!
//! [`Transport`] is the seam between the protocol logic and the socket:
//! - `execute` sends one request and returns the replies correlated to it
//! - `receive` returns the next batch of unsolicited messages
//! - `close` shuts the channel and wakes pending callers
//!
//! All methods take `&self`, so one task may issue requests while another
//! is blocked in `receive`.
//!
//! [`NetlinkConn`] implements it over an `AF_NETLINK` socket on Linux.

#[cfg(test)]
pub(crate) mod mock;
#[cfg(target_os = "linux")]
mod netlink;

use std::future::Future;
use std::pin::Pin;

use crate::error::Result;
use crate::protocol::{Header, Message};

#[cfg(target_os = "linux")]
pub use netlink::{NetlinkConfig, NetlinkConn, DEFAULT_READ_BUFFER_SIZE};

/// Boxed future returned by transports and hooks.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A request as sent together with the replies it produced.
#[derive(Debug, Clone)]
pub struct Exchange {
    /// Header of the request as transmitted, sequence filled in.
    pub request: Header,
    /// Replies carrying the request's sequence number.
    pub replies: Vec<Message>,
}

/// Message channel to the kernel.
pub trait Transport: Send + Sync + 'static {
    /// Send `request` and wait for its reply batch.
    ///
    /// A request with sequence 0 gets the next sequence number assigned.
    fn execute(&self, request: Message) -> BoxFuture<'_, Result<Exchange>>;

    /// Wait for the next batch of messages not claimed by `execute`.
    fn receive(&self) -> BoxFuture<'_, Result<Vec<Message>>>;

    /// Close the channel. Pending and later calls fail with `ConnectionClosed`.
    fn close(&self) -> Result<()>;
}

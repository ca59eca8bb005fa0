//! # nfqueue
//!
//! Userspace driver for the Linux netfilter queue (`NFQUEUE`) subsystem.
//!
//! Packets matched by an `NFQUEUE` rule are held by the kernel until
//! userspace issues a verdict. This crate binds to a queue over a
//! netfilter netlink socket, streams the queued packets to a hook and
//! sends the verdicts back.
//!
//! ## Architecture
//!
//! - **Protocol**: netlink headers, attributes and the queue ABI constants
//! - **Requests**: config and verdict message builders
//! - **Executor**: single-acknowledgement request/reply correlation
//! - **Session**: attach handshake with rollback, sealed settings, verdicts
//! - **Receiver**: the receive loop and its [`Registration`] handle
//!
//! ## Example
//!
//! ```ignore
//! use nfqueue::{sync_hook, CopyMode, Nfqueue, AF_INET};
//!
//! #[tokio::main]
//! async fn main() -> nfqueue::Result<()> {
//!     let mut queue = Nfqueue::open(AF_INET, 0).await?;
//!     let registration = queue
//!         .register(CopyMode::Meta, sync_hook(|packet| {
//!             println!("packet {:?}", packet.id());
//!             0
//!         }))
//!         .await?;
//!
//!     registration.wait().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod executor;
pub mod hook;
pub mod packet;
pub mod protocol;
pub mod request;
pub mod transport;

mod receiver;
mod session;

pub use config::Config;
pub use error::{NfqueueError, Result};
pub use hook::{sync_hook, Hook, CONTINUE};
pub use packet::{Packet, PacketHeader};
pub use protocol::{queue_flags, CopyMode, Family, Verdict, AF_INET, AF_INET6};
pub use receiver::{LoopExit, Registration};
pub use session::{Nfqueue, VerdictSender};
pub use transport::Transport;

#[cfg(target_os = "linux")]
pub use transport::{NetlinkConfig, NetlinkConn};

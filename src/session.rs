//! Queue session - attach handshake, verdicts and teardown.
//!
//! [`Nfqueue`] owns the transport and the settings negotiated with the
//! kernel. `register` runs the attach handshake on the caller's task and
//! then spawns the receive loop:
//!
//! 1. `PF_UNBIND` the family (its acknowledgement fixes the sequence number)
//! 2. `PF_BIND` the family
//! 3. `BIND` the generic queue handle (`AF_UNSPEC`, resource 0)
//! 4. `BIND` the queue number (`AF_UNSPEC`)
//! 5. Copy mode and buffer size
//! 6. Flags with an identical mask, only when flags are set
//!
//! A failed step undoes the binds that already succeeded, newest first.
//! Once registered the settings are sealed.
//!
//! # Example
//!
//! ```ignore
//! use nfqueue::{CopyMode, Nfqueue, Packet, Verdict, AF_INET};
//!
//! #[tokio::main]
//! async fn main() -> nfqueue::Result<()> {
//!     let mut queue = Nfqueue::open(AF_INET, 0).await?;
//!     let verdicts = queue.verdicts();
//!
//!     let registration = queue
//!         .register(CopyMode::Packet, move |packet: Packet| {
//!             let verdicts = verdicts.clone();
//!             async move {
//!                 if let Some(id) = packet.id() {
//!                     let _ = verdicts.set_verdict(id, Verdict::Accept).await;
//!                 }
//!                 0
//!             }
//!         })
//!         .await?;
//!
//!     registration.wait().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use crate::config::{Config, DEFAULT_BUFFER_SIZE};
use crate::error::{NfqueueError, Result};
use crate::executor;
use crate::hook::Hook;
use crate::protocol::{cmd, queue_flags, CopyMode, Family, Message, Verdict, AF_UNSPEC};
use crate::receiver::Registration;
use crate::request::{build_config, build_verdict, config_command, config_flags, config_params};
use crate::transport::Transport;

#[cfg(target_os = "linux")]
use crate::protocol::NETLINK_NETFILTER;
#[cfg(target_os = "linux")]
use crate::transport::NetlinkConn;

/// One handshake request and the request that reverts it.
struct AttachStep {
    name: &'static str,
    request: Message,
    undo: Option<Message>,
}

/// A queue session bound to one family and queue number.
pub struct Nfqueue<T: Transport> {
    transport: Arc<T>,
    family: Family,
    queue: u16,
    buffer_size: u32,
    flags: u32,
    copy_mode: CopyMode,
    sealed: bool,
}

#[cfg(target_os = "linux")]
impl Nfqueue<NetlinkConn> {
    /// Open a netfilter netlink socket for `family` and `queue`.
    ///
    /// The family is checked before the socket is created.
    pub async fn open(family: u8, queue: u16) -> Result<Self> {
        let family = Family::try_from(family)?;
        let conn = NetlinkConn::dial(NETLINK_NETFILTER)?;
        Ok(Self::new(family, queue, Arc::new(conn)))
    }
}

impl<T: Transport> Nfqueue<T> {
    /// Create a session over an existing transport.
    pub fn with_transport(family: u8, queue: u16, transport: Arc<T>) -> Result<Self> {
        let family = Family::try_from(family)?;
        Ok(Self::new(family, queue, transport))
    }

    /// Create a session from `config`, applying its flags, buffer size and
    /// copy mode.
    pub fn from_config(config: &Config, transport: Arc<T>) -> Result<Self> {
        config.validate()?;
        let mut session = Self::with_transport(config.family, config.queue, transport)?;
        session.buffer_size = config.buffer_size;
        session.flags = config.flags;
        session.copy_mode = config.copy_mode;
        Ok(session)
    }

    fn new(family: Family, queue: u16, transport: Arc<T>) -> Self {
        Self {
            transport,
            family,
            queue,
            buffer_size: DEFAULT_BUFFER_SIZE,
            flags: 0,
            copy_mode: CopyMode::default(),
            sealed: false,
        }
    }

    /// Set the queue flag word, replacing the previous value.
    pub fn set_flag(&mut self, flag: u32) -> Result<()> {
        if flag >= queue_flags::MAX {
            return Err(NfqueueError::InvalidFlag(flag));
        }
        self.ensure_unsealed()?;
        self.flags = flag;
        Ok(())
    }

    /// Current queue flag word.
    #[inline]
    pub fn show_flags(&self) -> u32 {
        self.flags
    }

    /// Set the copy range sent with the copy mode.
    pub fn set_buffer_size(&mut self, buffer_size: u32) -> Result<()> {
        self.ensure_unsealed()?;
        self.buffer_size = buffer_size;
        Ok(())
    }

    /// Copy range sent with the copy mode.
    #[inline]
    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    /// Set the copy mode used by [`start`](Self::start).
    pub fn set_copy_mode(&mut self, copy_mode: CopyMode) -> Result<()> {
        self.ensure_unsealed()?;
        self.copy_mode = copy_mode;
        Ok(())
    }

    /// Copy mode used by [`start`](Self::start).
    #[inline]
    pub fn copy_mode(&self) -> CopyMode {
        self.copy_mode
    }

    /// Address family the session was opened for.
    #[inline]
    pub fn family(&self) -> Family {
        self.family
    }

    /// Queue number.
    #[inline]
    pub fn queue(&self) -> u16 {
        self.queue
    }

    /// Check if `register` has succeeded.
    #[inline]
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    fn ensure_unsealed(&self) -> Result<()> {
        if self.sealed {
            Err(NfqueueError::Sealed)
        } else {
            Ok(())
        }
    }

    /// Attach to the queue and start delivering packets to `hook`.
    ///
    /// Returns as soon as the receive loop is spawned.
    ///
    /// # Errors
    ///
    /// - `Sealed` if the session is already registered
    /// - `Handshake` naming the failed step; completed binds are undone first
    pub async fn register<H: Hook>(&mut self, copy_mode: CopyMode, hook: H) -> Result<Registration> {
        self.ensure_unsealed()?;
        let family = self.family.as_u8();

        let unbind_family = build_config(family, 0, 0, &[config_command(cmd::PF_UNBIND, family)])?;
        let sequence = executor::execute(&*self.transport, unbind_family)
            .await
            .map_err(|e| handshake_error("unbind family", e))?;
        tracing::debug!("Handshake step 'unbind family' done (seq {})", sequence);

        let steps = self.attach_steps(sequence, copy_mode)?;
        let unbind = build_config(
            AF_UNSPEC,
            sequence,
            self.queue,
            &[config_command(cmd::UNBIND, family)],
        )?;

        let mut completed: Vec<Message> = Vec::new();
        for step in steps {
            if let Err(e) = executor::execute(&*self.transport, step.request).await {
                tracing::debug!("Handshake step '{}' failed: {}", step.name, e);
                self.roll_back(completed).await;
                return Err(handshake_error(step.name, e));
            }
            tracing::debug!("Handshake step '{}' done (seq {})", step.name, sequence);
            completed.extend(step.undo);
        }

        self.sealed = true;
        tracing::info!(
            "Registered on queue {} (family {:?}, copy mode {:?}, flags {:#x})",
            self.queue,
            self.family,
            copy_mode,
            self.flags
        );

        Ok(Registration::spawn(self.transport.clone(), hook, unbind, sequence))
    }

    /// Register with the session's own copy mode.
    pub async fn start<H: Hook>(&mut self, hook: H) -> Result<Registration> {
        self.register(self.copy_mode, hook).await
    }

    /// Steps 2 to 6 of the handshake.
    fn attach_steps(&self, sequence: u32, copy_mode: CopyMode) -> Result<Vec<AttachStep>> {
        let family = self.family.as_u8();
        let queue = self.queue;
        let command = |op, resource_id, scope| {
            build_config(scope, sequence, resource_id, &[config_command(op, family)])
        };

        let mut steps = vec![
            AttachStep {
                name: "bind family",
                request: command(cmd::PF_BIND, 0, family)?,
                undo: Some(command(cmd::PF_UNBIND, 0, family)?),
            },
            AttachStep {
                name: "bind generic queue",
                request: command(cmd::BIND, 0, AF_UNSPEC)?,
                undo: Some(command(cmd::UNBIND, 0, AF_UNSPEC)?),
            },
            AttachStep {
                name: "bind queue",
                request: command(cmd::BIND, queue, AF_UNSPEC)?,
                undo: Some(command(cmd::UNBIND, queue, AF_UNSPEC)?),
            },
            AttachStep {
                name: "set params",
                request: build_config(
                    AF_UNSPEC,
                    sequence,
                    queue,
                    &[config_params(self.buffer_size, copy_mode.as_u8())],
                )?,
                undo: None,
            },
        ];

        if self.flags != 0 {
            steps.push(AttachStep {
                name: "set flags",
                request: build_config(AF_UNSPEC, sequence, queue, &config_flags(self.flags))?,
                undo: None,
            });
        }

        Ok(steps)
    }

    async fn roll_back(&self, completed: Vec<Message>) {
        for undo in completed.into_iter().rev() {
            let kind = undo.header.kind;
            match executor::execute(&*self.transport, undo).await {
                Ok(_) => tracing::debug!("Rolled back handshake request (type {:#06x})", kind),
                Err(e) => tracing::warn!("Could not roll back handshake request: {}", e),
            }
        }
    }

    /// Issue a verdict for packet `id`.
    pub async fn set_verdict(&self, id: u32, verdict: Verdict) -> Result<u32> {
        self.verdicts().set_verdict(id, verdict).await
    }

    /// Issue a verdict for every packet up to and including `id`.
    pub async fn set_verdict_batch(&self, id: u32, verdict: Verdict) -> Result<u32> {
        self.verdicts().set_verdict_batch(id, verdict).await
    }

    /// Verdict handle that can be moved into hooks and other tasks.
    pub fn verdicts(&self) -> VerdictSender<T> {
        VerdictSender {
            transport: self.transport.clone(),
            family: self.family.as_u8(),
            queue: self.queue,
        }
    }

    /// Close the transport. A running receive loop stops without unbinding.
    pub fn close(&self) -> Result<()> {
        self.transport.close()
    }
}

fn handshake_error(step: &'static str, source: NfqueueError) -> NfqueueError {
    NfqueueError::Handshake {
        step,
        source: Box::new(source),
    }
}

/// Issues verdicts for one queue.
pub struct VerdictSender<T: Transport> {
    transport: Arc<T>,
    family: u8,
    queue: u16,
}

impl<T: Transport> Clone for VerdictSender<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            family: self.family,
            queue: self.queue,
        }
    }
}

impl<T: Transport> VerdictSender<T> {
    /// Issue a verdict for packet `id`.
    ///
    /// Returns the acknowledgement's sequence number.
    pub async fn set_verdict(&self, id: u32, verdict: Verdict) -> Result<u32> {
        self.send(id, verdict, false).await
    }

    /// Issue a verdict for every packet up to and including `id`.
    pub async fn set_verdict_batch(&self, id: u32, verdict: Verdict) -> Result<u32> {
        self.send(id, verdict, true).await
    }

    async fn send(&self, id: u32, verdict: Verdict, batch: bool) -> Result<u32> {
        let request = build_verdict(self.family, self.queue, 0, id, verdict.code(), batch)?;
        executor::execute(&*self.transport, request).await
    }
}

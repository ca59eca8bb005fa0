//! Netlink socket transport (Linux).
//!
//! A dedicated reader task owns the receive side of the socket and routes
//! every datagram:
//!
//! ```text
//!                      ┌─► pending[seq] (oneshot) ─► execute()
//! socket ─► Reader ────┤
//!                      └─► mpsc::UnboundedSender ──► receive()
//! ```
//!
//! Messages whose sequence number has a waiting `execute` call go to that
//! call; everything else (packet deliveries, batch terminators, stray
//! errors) is forwarded to `receive`. Writes go straight to the socket, so
//! requests can be sent while another task is blocked in `receive`.
//!
//! `close` releases the connection's handle on the socket and aborts the
//! reader, so the descriptor is closed once the reader task is dropped.
//!
//! # Example
//!
//! ```ignore
//! use nfqueue::protocol::NETLINK_NETFILTER;
//! use nfqueue::transport::NetlinkConn;
//!
//! let conn = NetlinkConn::dial(NETLINK_NETFILTER)?;
//! ```

use std::collections::HashMap;
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::io::unix::AsyncFd;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::{BoxFuture, Exchange, Transport};
use crate::error::{NfqueueError, Result};
use crate::protocol::{decode_messages, Message};

/// Default receive buffer (fits a 64 KiB payload plus metadata).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 128 * 1024;

/// Socket options for [`NetlinkConn`].
#[derive(Debug, Clone)]
pub struct NetlinkConfig {
    /// Size of the datagram buffer; larger datagrams are truncated.
    pub read_buffer_size: usize,
    /// Set `NETLINK_NO_ENOBUFS` so the kernel stops reporting overruns.
    pub no_enobufs: bool,
}

impl Default for NetlinkConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            no_enobufs: false,
        }
    }
}

type Waiters = HashMap<u32, oneshot::Sender<Vec<Message>>>;
type Delivery = Result<Vec<Message>>;

/// State shared between the connection and its reader task.
struct Shared {
    pending: Mutex<Waiters>,
    closed: AtomicBool,
}

impl Shared {
    fn lock_pending(&self) -> MutexGuard<'_, Waiters> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark closed and drop every waiter so pending `execute` calls fail.
    fn shut(&self) {
        let mut pending = self.lock_pending();
        self.closed.store(true, Ordering::Release);
        pending.clear();
    }
}

/// An `AF_NETLINK` socket speaking to the kernel.
pub struct NetlinkConn {
    socket: Mutex<Option<Arc<AsyncFd<OwnedFd>>>>,
    pid: u32,
    next_sequence: AtomicU32,
    shared: Arc<Shared>,
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<Delivery>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl NetlinkConn {
    /// Open and bind a netlink socket for `protocol` with default options.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn dial(protocol: i32) -> Result<Self> {
        Self::dial_with(protocol, NetlinkConfig::default())
    }

    /// Open and bind a netlink socket for `protocol`.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn dial_with(protocol: i32, config: NetlinkConfig) -> Result<Self> {
        let fd = open_socket(protocol)?;
        if config.no_enobufs {
            set_no_enobufs(&fd)?;
        }
        let pid = bind_socket(&fd)?;
        let socket = Arc::new(AsyncFd::new(fd)?);

        let shared = Arc::new(Shared {
            pending: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        });
        let (tx, rx) = mpsc::unbounded_channel();

        let reader = tokio::spawn({
            let socket = socket.clone();
            let shared = shared.clone();
            async move {
                read_loop(&socket, &shared, tx, config.read_buffer_size).await;
                shared.shut();
            }
        });

        tracing::debug!("Netlink socket bound (protocol {}, port id {})", protocol, pid);

        Ok(Self {
            socket: Mutex::new(Some(socket)),
            pid,
            next_sequence: AtomicU32::new(initial_sequence()),
            shared,
            inbound: tokio::sync::Mutex::new(rx),
            reader: Mutex::new(Some(reader)),
        })
    }

    /// Port id assigned by the kernel.
    #[inline]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    fn next_sequence(&self) -> u32 {
        loop {
            let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
            if sequence != 0 {
                return sequence;
            }
        }
    }

    fn socket(&self) -> Result<Arc<AsyncFd<OwnedFd>>> {
        self.socket
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(NfqueueError::ConnectionClosed)
    }

    async fn send(&self, bytes: &[u8]) -> Result<()> {
        let socket = self.socket()?;
        let addr = kernel_address();
        loop {
            let mut guard = socket.writable().await?;
            let sent = guard.try_io(|inner| {
                // SAFETY: `bytes` and `addr` outlive the call and the lengths match.
                let n = unsafe {
                    libc::sendto(
                        inner.as_raw_fd(),
                        bytes.as_ptr().cast(),
                        bytes.len(),
                        0,
                        (&addr as *const libc::sockaddr_nl).cast(),
                        mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t,
                    )
                };
                if n < 0 {
                    Err(io::Error::last_os_error())
                } else {
                    Ok(())
                }
            });
            match sent {
                Ok(result) => return result.map_err(Into::into),
                Err(_would_block) => continue,
            }
        }
    }

    fn abort_reader(&self) {
        let reader = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(reader) = reader {
            reader.abort();
        }
    }
}

impl Transport for NetlinkConn {
    fn execute(&self, mut request: Message) -> BoxFuture<'_, Result<Exchange>> {
        Box::pin(async move {
            if request.header.sequence == 0 {
                request.header.sequence = self.next_sequence();
            }
            let sequence = request.header.sequence;

            let (tx, rx) = oneshot::channel();
            {
                let mut pending = self.shared.lock_pending();
                if self.shared.closed.load(Ordering::Acquire) {
                    return Err(NfqueueError::ConnectionClosed);
                }
                pending.insert(sequence, tx);
            }

            if let Err(e) = self.send(&request.encode()).await {
                self.shared.lock_pending().remove(&sequence);
                return Err(e);
            }

            let replies = rx.await.map_err(|_| NfqueueError::ConnectionClosed)?;
            Ok(Exchange {
                request: request.header,
                replies,
            })
        })
    }

    fn receive(&self) -> BoxFuture<'_, Result<Vec<Message>>> {
        Box::pin(async move {
            let mut inbound = self.inbound.lock().await;
            inbound
                .recv()
                .await
                .unwrap_or(Err(NfqueueError::ConnectionClosed))
        })
    }

    fn close(&self) -> Result<()> {
        self.shared.shut();
        self.abort_reader();
        let socket = self
            .socket
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if socket.is_some() {
            tracing::debug!("Netlink socket released (port id {})", self.pid);
        }
        Ok(())
    }
}

impl Drop for NetlinkConn {
    fn drop(&mut self) {
        self.abort_reader();
    }
}

/// Reader task body: returns when the socket fails or nobody listens.
async fn read_loop(
    socket: &AsyncFd<OwnedFd>,
    shared: &Shared,
    inbound: mpsc::UnboundedSender<Delivery>,
    buffer_size: usize,
) {
    let mut buf = vec![0u8; buffer_size];

    loop {
        let n = match recv(socket, &mut buf).await {
            Ok(0) => {
                let _ = inbound.send(Err(NfqueueError::ConnectionClosed));
                return;
            }
            Ok(n) => n,
            Err(e) if e.raw_os_error() == Some(libc::ENOBUFS) => {
                tracing::warn!("Netlink receive buffer overrun, kernel dropped messages");
                continue;
            }
            Err(e) => {
                let _ = inbound.send(Err(e.into()));
                return;
            }
        };

        let delivery = decode_messages(&buf[..n]).map(|batch| route_replies(shared, batch));
        match delivery {
            Ok(batch) if batch.is_empty() => {}
            other => {
                if inbound.send(other).is_err() {
                    return;
                }
            }
        }
    }
}

/// Hand replies to waiting `execute` calls; return the rest.
fn route_replies(shared: &Shared, batch: Vec<Message>) -> Vec<Message> {
    let mut pending = shared.lock_pending();
    let mut replies: HashMap<u32, Vec<Message>> = HashMap::new();
    let mut deliveries = Vec::new();

    for message in batch {
        let sequence = message.sequence();
        if sequence != 0 && pending.contains_key(&sequence) {
            replies.entry(sequence).or_default().push(message);
        } else {
            deliveries.push(message);
        }
    }

    for (sequence, messages) in replies {
        if let Some(waiter) = pending.remove(&sequence) {
            let _ = waiter.send(messages);
        }
    }

    deliveries
}

async fn recv(socket: &AsyncFd<OwnedFd>, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        let mut guard = socket.readable().await?;
        let received = guard.try_io(|inner| {
            // SAFETY: `buf` is valid for writes of `buf.len()` bytes.
            let n = unsafe { libc::recv(inner.as_raw_fd(), buf.as_mut_ptr().cast(), buf.len(), 0) };
            if n < 0 {
                Err(io::Error::last_os_error())
            } else {
                Ok(n as usize)
            }
        });
        match received {
            Ok(result) => return result,
            Err(_would_block) => continue,
        }
    }
}

fn open_socket(protocol: i32) -> io::Result<OwnedFd> {
    // SAFETY: plain syscall, the descriptor is wrapped immediately.
    let fd = unsafe {
        libc::socket(
            libc::AF_NETLINK,
            libc::SOCK_RAW | libc::SOCK_CLOEXEC | libc::SOCK_NONBLOCK,
            protocol,
        )
    };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: `fd` is a fresh descriptor owned by nobody else.
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

fn set_no_enobufs(fd: &OwnedFd) -> io::Result<()> {
    let on: libc::c_int = 1;
    // SAFETY: `on` outlives the call and the length matches its type.
    let rc = unsafe {
        libc::setsockopt(
            fd.as_raw_fd(),
            libc::SOL_NETLINK,
            libc::NETLINK_NO_ENOBUFS,
            (&on as *const libc::c_int).cast(),
            mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Bind with port id 0 and return the id the kernel picked.
fn bind_socket(fd: &OwnedFd) -> io::Result<u32> {
    let mut addr = kernel_address();
    let mut len = mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t;

    // SAFETY: `addr` is a valid sockaddr_nl of `len` bytes.
    let rc = unsafe {
        libc::bind(
            fd.as_raw_fd(),
            (&addr as *const libc::sockaddr_nl).cast(),
            len,
        )
    };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }

    // SAFETY: `addr` and `len` are valid for writes.
    let rc = unsafe {
        libc::getsockname(
            fd.as_raw_fd(),
            (&mut addr as *mut libc::sockaddr_nl).cast(),
            &mut len,
        )
    };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(addr.nl_pid)
}

/// Address of the kernel (port id 0, no groups).
fn kernel_address() -> libc::sockaddr_nl {
    // SAFETY: sockaddr_nl is plain data; all zeroes is a valid value.
    let mut addr: libc::sockaddr_nl = unsafe { mem::zeroed() };
    addr.nl_family = libc::AF_NETLINK as libc::sa_family_t;
    addr
}

/// Starting sequence mixed from the clock and process id.
fn initial_sequence() -> u32 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (nanos.wrapping_mul(0x9E37_79B9) ^ std::process::id()).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{kind, Header};
    use bytes::Bytes;

    fn shared() -> Shared {
        Shared {
            pending: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    fn message(kind: u16, sequence: u32) -> Message {
        Message::new(Header::new(kind, 0, sequence), Bytes::new())
    }

    #[test]
    fn test_route_replies_to_waiter() {
        let shared = shared();
        let (tx, mut rx) = oneshot::channel();
        shared.lock_pending().insert(7, tx);

        let rest = route_replies(&shared, vec![message(kind::ERROR, 7), message(0x0300, 0)]);

        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].header.kind, 0x0300);
        let replies = rx.try_recv().unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].sequence(), 7);
        assert!(shared.lock_pending().is_empty());
    }

    #[test]
    fn test_route_unclaimed_sequences_are_deliveries() {
        let shared = shared();
        let rest = route_replies(&shared, vec![message(kind::ERROR, 3), message(kind::DONE, 0)]);
        assert_eq!(rest.len(), 2);
    }

    #[test]
    fn test_shut_fails_waiters() {
        let shared = shared();
        let (tx, mut rx) = oneshot::channel::<Vec<Message>>();
        shared.lock_pending().insert(1, tx);

        shared.shut();

        assert!(shared.closed.load(Ordering::Acquire));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_initial_sequence_is_non_zero() {
        assert_ne!(initial_sequence(), 0);
    }

    fn fd_target(fd: i32) -> Option<std::path::PathBuf> {
        std::fs::read_link(format!("/proc/self/fd/{}", fd)).ok()
    }

    #[tokio::test]
    async fn test_close_releases_descriptor() {
        // sandboxes without netlink access have nothing to check
        let Ok(conn) = NetlinkConn::dial(crate::protocol::NETLINK_NETFILTER) else {
            return;
        };
        let fd = conn.socket().unwrap().as_raw_fd();
        let before = fd_target(fd);
        assert!(before.is_some());

        conn.close().unwrap();
        assert!(matches!(conn.socket(), Err(NfqueueError::ConnectionClosed)));

        let mut released = false;
        for _ in 0..100 {
            if fd_target(fd) != before {
                released = true;
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(released);

        let err = conn
            .execute(message(0x0301, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, NfqueueError::ConnectionClosed));
    }

    #[test]
    fn test_default_config() {
        let config = NetlinkConfig::default();
        assert_eq!(config.read_buffer_size, DEFAULT_READ_BUFFER_SIZE);
        assert!(!config.no_enobufs);
    }
}

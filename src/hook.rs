//! Packet hooks invoked by the receive loop.
//!
//! A hook receives one [`Packet`] and returns `0` to keep the loop running
//! or any other value to stop it. Closures returning a future implement
//! [`Hook`] directly.
//!
//! # Example
//!
//! ```ignore
//! let verdicts = queue.verdicts();
//! queue.register(CopyMode::Packet, move |packet: Packet| {
//!     let verdicts = verdicts.clone();
//!     async move {
//!         if let Some(id) = packet.id() {
//!             let _ = verdicts.set_verdict(id, Verdict::Accept).await;
//!         }
//!         0
//!     }
//! }).await?;
//! ```

use std::future::Future;

use crate::packet::Packet;
use crate::transport::BoxFuture;

/// Return value that keeps the receive loop running.
pub const CONTINUE: i32 = 0;

/// Trait for packet hooks.
pub trait Hook: Send + Sync + 'static {
    /// Handle one delivered packet.
    fn call(&self, packet: Packet) -> BoxFuture<'static, i32>;
}

impl<F, Fut> Hook for F
where
    F: Fn(Packet) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = i32> + Send + 'static,
{
    fn call(&self, packet: Packet) -> BoxFuture<'static, i32> {
        Box::pin(self(packet))
    }
}

/// Turn a synchronous function into a hook.
pub fn sync_hook<F>(func: F) -> impl Hook
where
    F: Fn(&Packet) -> i32 + Send + Sync + 'static,
{
    move |packet: Packet| std::future::ready(func(&packet))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_async_closure_hook() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let hook = move |_packet: Packet| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                CONTINUE
            }
        };

        assert_eq!(Hook::call(&hook, Packet::default()).await, 0);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sync_hook() {
        let hook = sync_hook(|packet: &Packet| if packet.mark == Some(1) { 1 } else { 0 });

        assert_eq!(hook.call(Packet::default()).await, 0);
        let marked = Packet {
            mark: Some(1),
            ..Packet::default()
        };
        assert_eq!(hook.call(marked).await, 1);
    }

    #[test]
    fn test_hook_is_object_safe() {
        let hook: Box<dyn Hook> = Box::new(sync_hook(|_: &Packet| 0));
        drop(hook);
    }
}

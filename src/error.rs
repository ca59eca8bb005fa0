//! Error types for nfqueue.

use thiserror::Error;

use crate::protocol::ErrorRecord;

/// Main error type for all nfqueue operations.
#[derive(Debug, Error)]
pub enum NfqueueError {
    /// Address family is not `AF_INET` or `AF_INET6`.
    #[error("Unsupported address family: {0}")]
    InvalidFamily(u8),

    /// Flag value at or above `NFQA_CFG_F_MAX`.
    #[error("Invalid queue flag: {0:#x}")]
    InvalidFlag(u32),

    /// Verdict code outside the five kernel actions.
    #[error("Invalid verdict: {0}")]
    InvalidVerdict(u32),

    /// Copy mode byte outside the known modes.
    #[error("Invalid copy mode: {0}")]
    InvalidCopyMode(u8),

    /// Configuration was changed after the queue was registered.
    #[error("Queue configuration is sealed after registration")]
    Sealed,

    /// JSON configuration could not be parsed.
    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    /// I/O error on the netlink channel.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel closed while a request or receive was pending.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Reply does not correlate with the request.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Reply batch for a single-acknowledgement request had the wrong size.
    #[error("Unexpected number of reply messages: {0}")]
    UnexpectedMessageCount(usize),

    /// The kernel answered with an error record.
    #[error("Kernel rejected request: {0}")]
    KernelRejection(ErrorRecord),

    /// Message or attribute could not be decoded.
    #[error("Malformed message: {0}")]
    Malformed(String),

    /// A registration step failed.
    #[error("Handshake step '{step}' failed: {source}")]
    Handshake {
        /// Name of the failed step.
        step: &'static str,
        /// Underlying failure.
        source: Box<NfqueueError>,
    },

    /// The receive loop task panicked.
    #[error("Receive loop panicked")]
    LoopPanicked,
}

impl NfqueueError {
    /// True for errors detected before any I/O took place.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            NfqueueError::InvalidFamily(_)
                | NfqueueError::InvalidFlag(_)
                | NfqueueError::InvalidVerdict(_)
                | NfqueueError::InvalidCopyMode(_)
                | NfqueueError::Sealed
                | NfqueueError::Config(_)
        )
    }

    /// The kernel error record, looking through handshake wrapping.
    pub fn kernel_error(&self) -> Option<&ErrorRecord> {
        match self {
            NfqueueError::KernelRejection(record) => Some(record),
            NfqueueError::Handshake { source, .. } => source.kernel_error(),
            _ => None,
        }
    }
}

/// Result type alias using NfqueueError.
pub type Result<T> = std::result::Result<T, NfqueueError>;

//! Queue configuration.
//!
//! [`Config`] collects the settings a session applies before registering.
//! Missing JSON fields fall back to the defaults.
//!
//! ```
//! use nfqueue::{Config, CopyMode};
//!
//! let config = Config::from_json(r#"{"queue": 3, "copy_mode": "meta"}"#).unwrap();
//! assert_eq!(config.queue, 3);
//! assert_eq!(config.copy_mode, CopyMode::Meta);
//! assert_eq!(config.buffer_size, 0xFFFF);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{NfqueueError, Result};
use crate::protocol::{queue_flags, CopyMode, Family, AF_INET};

/// Default copy range in bytes.
pub const DEFAULT_BUFFER_SIZE: u32 = 0xFFFF;

/// Session settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address family (`AF_INET` or `AF_INET6`).
    pub family: u8,
    /// Queue number.
    pub queue: u16,
    /// Copy range requested from the kernel.
    pub buffer_size: u32,
    /// Queue flag word, sent with an identical mask.
    pub flags: u32,
    /// Copy mode passed to `register`.
    pub copy_mode: CopyMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            family: AF_INET,
            queue: 0,
            buffer_size: DEFAULT_BUFFER_SIZE,
            flags: 0,
            copy_mode: CopyMode::default(),
        }
    }
}

impl Config {
    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check family and flags.
    pub fn validate(&self) -> Result<()> {
        Family::try_from(self.family)?;
        if self.flags >= queue_flags::MAX {
            return Err(NfqueueError::InvalidFlag(self.flags));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::AF_INET6;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.family, AF_INET);
        assert_eq!(config.queue, 0);
        assert_eq!(config.buffer_size, 0xFFFF);
        assert_eq!(config.flags, 0);
        assert_eq!(config.copy_mode, CopyMode::Packet);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_partial() {
        let config = Config::from_json(r#"{"family": 10, "flags": 1}"#).unwrap();
        assert_eq!(config.family, AF_INET6);
        assert_eq!(config.flags, queue_flags::FAIL_OPEN);
        assert_eq!(config.buffer_size, DEFAULT_BUFFER_SIZE);
    }

    #[test]
    fn test_from_json_rejects_family() {
        let err = Config::from_json(r#"{"family": 7}"#).unwrap_err();
        assert!(matches!(err, NfqueueError::InvalidFamily(7)));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_from_json_rejects_flag() {
        let err = Config::from_json(r#"{"flags": 32}"#).unwrap_err();
        assert!(matches!(err, NfqueueError::InvalidFlag(0x20)));
    }

    #[test]
    fn test_from_json_syntax_error() {
        let err = Config::from_json("{").unwrap_err();
        assert!(matches!(err, NfqueueError::Config(_)));
    }

    #[test]
    fn test_serialize_copy_mode_lowercase() {
        let json = serde_json::to_string(&Config::default()).unwrap();
        assert!(json.contains(r#""copy_mode":"packet""#));
    }
}

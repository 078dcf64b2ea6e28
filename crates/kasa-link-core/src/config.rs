//! Engine configuration.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, StorageError};
use crate::protocol::DEVICE_PORT;

/// One year; keeps the chrono conversion in range.
const MAX_STALE_SECS: u64 = 365 * 24 * 3600;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Local address of the shared datagram socket
    pub bind_addr: SocketAddr,
    /// Port devices listen on, both datagram and direct
    pub device_port: u16,
    pub poll_interval_secs: u64,
    /// A record is stale after `poll_interval_secs * stale_multiplier` of silence
    pub stale_multiplier: u32,
    /// How long the startup burst waits for replies
    pub discovery_window_ms: u64,
    pub probe_timeout_ms: u64,
    pub command_timeout_ms: u64,
    /// Liveness probes in flight at once during a sweep
    pub probe_concurrency: usize,
    /// Unicast and direct follow-up queries in flight at once
    pub follow_up_concurrency: usize,
    pub recv_buffer_size: usize,
    /// Static broadcast targets. Interfaces are enumerated when absent.
    pub broadcast_addresses: Option<Vec<Ipv4Addr>>,
    pub cache_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            device_port: DEVICE_PORT,
            poll_interval_secs: 30,
            stale_multiplier: 5,
            discovery_window_ms: 3000,
            probe_timeout_ms: 2000,
            command_timeout_ms: 5000,
            probe_concurrency: 8,
            follow_up_concurrency: 16,
            recv_buffer_size: 2048,
            broadcast_addresses: None,
            cache_dir: None,
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path).map_err(StorageError::Io)?;
        let config: Self = serde_json::from_str(&content).map_err(StorageError::Serialization)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        let invalid = |msg: &str| Err(CoreError::Other(format!("Invalid config: {}", msg)));

        if self.poll_interval_secs == 0 {
            return invalid("poll_interval_secs must be at least 1");
        }
        if self.stale_multiplier == 0 {
            return invalid("stale_multiplier must be at least 1");
        }
        if self.device_port == 0 {
            return invalid("device_port must not be 0");
        }
        if self.probe_concurrency == 0 {
            return invalid("probe_concurrency must be at least 1");
        }
        if self.follow_up_concurrency == 0 {
            return invalid("follow_up_concurrency must be at least 1");
        }
        if self.recv_buffer_size < 512 {
            return invalid("recv_buffer_size must be at least 512 bytes");
        }
        if self.probe_timeout_ms == 0 || self.command_timeout_ms == 0 {
            return invalid("timeouts must be non-zero");
        }
        if matches!(&self.broadcast_addresses, Some(list) if list.is_empty()) {
            return invalid("broadcast_addresses must not be empty when set");
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Silence after which a record gets a liveness probe.
    pub fn stale_after(&self) -> chrono::Duration {
        let secs = self
            .poll_interval_secs
            .saturating_mul(u64::from(self.stale_multiplier))
            .min(MAX_STALE_SECS);
        chrono::Duration::seconds(secs as i64)
    }

    pub fn discovery_window(&self) -> Duration {
        Duration::from_millis(self.discovery_window_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.device_port, 9999);
        assert_eq!(config.stale_after(), chrono::Duration::seconds(150));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let config = EngineConfig {
            poll_interval_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            broadcast_addresses: Some(vec![]),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            follow_up_concurrency: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"poll_interval_secs": 10, "broadcast_addresses": ["192.168.1.255"]}}"#
        )
        .unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.poll_interval_secs, 10);
        assert_eq!(config.stale_multiplier, 5);
        assert_eq!(
            config.broadcast_addresses,
            Some(vec![Ipv4Addr::new(192, 168, 1, 255)])
        );
    }

    #[test]
    fn test_bad_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            EngineConfig::from_file(file.path()),
            Err(CoreError::Storage(StorageError::Serialization(_)))
        ));
    }
}

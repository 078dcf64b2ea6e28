//! Command implementations.

pub mod actuate;
pub mod discover;
pub mod status;
pub mod watch;

pub use actuate::{run_alias, run_brightness, run_countdown, run_relay};
pub use discover::run_discover;
pub use status::run_status;
pub use watch::run_watch;

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use kasa_link_core::{Device, Engine, EngineConfig, EngineHandle};
use tokio_util::sync::CancellationToken;

use crate::error::{CliError, Result};

/// A running engine owned by one command.
pub struct Session {
    pub engine: Arc<Engine>,
    handle: EngineHandle,
}

impl Session {
    /// Bind, run the startup discovery burst and return with the first snapshot ready.
    pub async fn start(config: EngineConfig, spinner: bool) -> Result<Self> {
        let window = config.discovery_window();
        let engine = Engine::bind(config)?;

        let progress = spinner.then(|| {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            pb.set_message(format!("Discovering devices for {}s...", window.as_secs()));
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        });

        let handle = engine.start(CancellationToken::new()).await;

        if let Some(pb) = progress {
            pb.finish_and_clear();
        }

        Ok(Self {
            engine,
            handle: handle?,
        })
    }

    pub async fn shutdown(self) -> Result<()> {
        self.handle.shutdown().await?;
        Ok(())
    }

    /// Find a record by id, alias or address.
    pub async fn find(&self, target: &str) -> Result<Device> {
        self.engine
            .registry()
            .find(target)
            .await
            .ok_or_else(|| CliError::DeviceNotFound(target.to_string()))
    }
}

/// Configuration for a discovery burst that has to find `target`.
///
/// An IP target is queried directly instead of through the broadcast set.
pub fn targeted_config(mut config: EngineConfig, target: &str, duration_secs: u64) -> EngineConfig {
    config.discovery_window_ms = duration_secs.saturating_mul(1000);
    if let Ok(ip) = target.parse::<Ipv4Addr>() {
        config.broadcast_addresses = Some(vec![ip]);
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_targeted_config_unicasts_to_ip() {
        let config = targeted_config(EngineConfig::default(), "192.168.1.40", 2);
        assert_eq!(
            config.broadcast_addresses,
            Some(vec![Ipv4Addr::new(192, 168, 1, 40)])
        );
        assert_eq!(config.discovery_window_ms, 2000);

        let config = targeted_config(EngineConfig::default(), "Porch", 1);
        assert_eq!(config.broadcast_addresses, None);
    }
}

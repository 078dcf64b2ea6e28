//! Engine configuration assembled from the config file and global flags.

use std::path::PathBuf;

use kasa_link_core::storage::default_data_dir;
use kasa_link_core::EngineConfig;

use crate::cli::Cli;
use crate::error::Result;

/// Build the engine configuration: file first, then flag and env overrides.
pub fn engine_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };

    if let Some(secs) = cli.poll_interval {
        config.poll_interval_secs = secs;
    }
    if let Some(dir) = &cli.cache_dir {
        config.cache_dir = Some(dir.clone());
    }
    config.command_timeout_ms = cli.timeout;
    config.probe_timeout_ms = config.probe_timeout_ms.min(cli.timeout);

    config.validate()?;
    Ok(config)
}

/// Directory for the warm-start cache, falling back to the platform data directory.
pub fn cache_dir(config: &EngineConfig) -> Option<PathBuf> {
    config.cache_dir.clone().or_else(default_data_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "kasa-link",
            "--poll-interval",
            "12",
            "--timeout",
            "800",
            "--cache-dir",
            "/tmp/kasa",
            "watch",
        ])
        .unwrap();

        let config = engine_config(&cli).unwrap();
        assert_eq!(config.poll_interval_secs, 12);
        assert_eq!(config.command_timeout_ms, 800);
        assert_eq!(config.probe_timeout_ms, 800);
        assert_eq!(cache_dir(&config), Some(PathBuf::from("/tmp/kasa")));
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let cli = Cli::try_parse_from(["kasa-link", "--poll-interval", "0", "watch"]).unwrap();
        assert!(engine_config(&cli).is_err());
    }
}

//! Discover command implementation.

use kasa_link_core::{Device, EngineConfig};
use regex::Regex;

use super::Session;
use crate::cli::DiscoverArgs;
use crate::error::CliError;
use crate::output::get_formatter;

/// Run the discover command
pub async fn run_discover(
    args: DiscoverArgs,
    mut config: EngineConfig,
    json: bool,
) -> Result<(), CliError> {
    let formatter = get_formatter(json);

    let filter = args
        .filter
        .as_deref()
        .map(Regex::new)
        .transpose()
        .map_err(|e| CliError::InvalidArgument(format!("Invalid filter pattern: {}", e)))?;

    config.discovery_window_ms = args.duration.saturating_mul(1000);

    let session = Session::start(config, !json).await?;
    let devices = session.engine.snapshot().await;
    session.shutdown().await?;

    let devices = filter_devices(devices, filter.as_ref());
    println!("{}", formatter.format_devices(&devices));

    if devices.is_empty() {
        return Err(CliError::NoDevicesFound);
    }

    Ok(())
}

fn filter_devices(devices: Vec<Device>, filter: Option<&Regex>) -> Vec<Device> {
    match filter {
        Some(re) => devices
            .into_iter()
            .filter(|d| re.is_match(&d.alias) || re.is_match(&d.model_name))
            .collect(),
        None => devices,
    }
}

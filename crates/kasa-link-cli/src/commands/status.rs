//! Status command implementation.

use std::net::IpAddr;

use kasa_link_core::device::direct::{fetch_sysinfo, TcpChannel};
use kasa_link_core::EngineConfig;

use crate::cli::StatusArgs;
use crate::error::CliError;
use crate::output::get_formatter;

/// Run the status command: one direct sysinfo request, no discovery.
pub async fn run_status(args: StatusArgs, config: EngineConfig, json: bool) -> Result<(), CliError> {
    let formatter = get_formatter(json);

    let ip: IpAddr = args
        .ip
        .parse()
        .map_err(|_| CliError::InvalidArgument(format!("'{}' is not an IP address", args.ip)))?;

    let channel = TcpChannel::new(config.device_port, config.command_timeout());
    let info = fetch_sysinfo(&channel, ip).await?;

    println!("{}", formatter.format_sysinfo(&args.ip, &info));
    Ok(())
}

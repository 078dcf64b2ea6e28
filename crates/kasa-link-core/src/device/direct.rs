//! Point-to-point TCP channel for non-latency-critical requests.
//!
//! Countdown rules, dimmer parameters, aliases and liveness probes go here
//! instead of through the shared datagram socket. Each request opens a
//! fresh connection, sends one length-prefixed frame and reads one back.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{CoreError, DeviceError, ProtocolError};
use crate::protocol::codec::{deobfuscate, encode_frame, frame_len};
use crate::protocol::commands::COUNTDOWN_RULE_NAME;
use crate::protocol::response::{
    check_response, parse_countdown_rules, parse_dimmer_parameters, parse_sysinfo,
};
use crate::protocol::{Commands, CountdownRule, DimmerParameters, Sysinfo};

/// Request/response transport to a single device.
#[async_trait]
pub trait DirectChannel: Send + Sync {
    /// Send a plaintext command, return the plaintext reply.
    async fn request(&self, address: IpAddr, command: &str) -> Result<String, CoreError>;
}

/// Length-prefixed TCP transport on the device port.
#[derive(Debug, Clone)]
pub struct TcpChannel {
    port: u16,
    timeout: Duration,
}

impl TcpChannel {
    pub fn new(port: u16, timeout: Duration) -> Self {
        Self { port, timeout }
    }

    async fn exchange(stream: &mut TcpStream, command: &str) -> Result<Vec<u8>, CoreError> {
        stream.write_all(&encode_frame(command.as_bytes())).await?;

        let mut header = [0u8; 4];
        stream.read_exact(&mut header).await?;
        let len = frame_len(header)?;

        let mut body = vec![0u8; len];
        stream.read_exact(&mut body).await?;
        Ok(deobfuscate(&body))
    }
}

#[async_trait]
impl DirectChannel for TcpChannel {
    async fn request(&self, address: IpAddr, command: &str) -> Result<String, CoreError> {
        let target = SocketAddr::new(address, self.port);
        let offline = || {
            CoreError::Device(DeviceError::Offline {
                ip: address.to_string(),
            })
        };

        let mut stream = timeout(self.timeout, TcpStream::connect(target))
            .await
            .map_err(|_| offline())?
            .map_err(|e| {
                debug!(%target, error = %e, "direct connect failed");
                offline()
            })?;

        let plain = timeout(self.timeout, Self::exchange(&mut stream, command))
            .await
            .map_err(|_| offline())??;

        let response = String::from_utf8(plain)
            .map_err(|e| ProtocolError::Malformed(format!("reply is not UTF-8: {}", e)))?;

        let ip = address.to_string();
        check_response(&response, &ip)?;
        Ok(response)
    }
}

// ==================== Typed helpers ====================

pub async fn fetch_sysinfo(
    channel: &dyn DirectChannel,
    address: IpAddr,
) -> Result<Sysinfo, CoreError> {
    let response = channel.request(address, Commands::get_sysinfo()).await?;
    Ok(parse_sysinfo(&response, &address.to_string())?)
}

pub async fn fetch_countdown_rules(
    channel: &dyn DirectChannel,
    address: IpAddr,
) -> Result<Vec<CountdownRule>, CoreError> {
    let response = channel
        .request(address, Commands::get_countdown_rules())
        .await?;
    Ok(parse_countdown_rules(&response, &address.to_string())?)
}

pub async fn clear_countdown_rules(
    channel: &dyn DirectChannel,
    address: IpAddr,
) -> Result<(), CoreError> {
    channel
        .request(address, Commands::clear_countdown_rules())
        .await
        .map(|_| ())
}

/// Replace any countdown with one that drives the relay to `target` after `delay_secs`.
pub async fn add_countdown_rule(
    channel: &dyn DirectChannel,
    address: IpAddr,
    delay_secs: u32,
    target: bool,
) -> Result<(), CoreError> {
    // the device accepts a single countdown rule
    clear_countdown_rules(channel, address).await?;
    channel
        .request(
            address,
            &Commands::add_countdown_rule(delay_secs, target, COUNTDOWN_RULE_NAME),
        )
        .await
        .map(|_| ())
}

pub async fn set_alias(
    channel: &dyn DirectChannel,
    address: IpAddr,
    alias: &str,
) -> Result<(), CoreError> {
    channel
        .request(address, &Commands::set_alias(alias))
        .await
        .map(|_| ())
}

pub async fn fetch_dimmer_parameters(
    channel: &dyn DirectChannel,
    address: IpAddr,
) -> Result<DimmerParameters, CoreError> {
    let response = channel
        .request(address, Commands::get_dimmer_parameters())
        .await?;
    Ok(parse_dimmer_parameters(&response, &address.to_string())?)
}

//! Protocol layer for device communication.
//!
//! Handles the wire codec, command strings and inbound payload parsing
//! for Kasa devices (UDP and TCP, port 9999).

pub mod codec;
pub mod commands;
pub mod response;

pub use codec::{deobfuscate, obfuscate};
pub use commands::Commands;
pub use response::{
    classify, ChildInfo, CountdownRule, DimmerParameters, EmeterRealtime, EnergyReading, Inbound,
    Sysinfo,
};

/// Fixed device port for both datagram and direct requests.
pub const DEVICE_PORT: u16 = 9999;

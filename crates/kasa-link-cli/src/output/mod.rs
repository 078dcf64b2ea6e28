//! Output formatting for CLI results.

pub mod json;
pub mod table;

pub use json::JsonOutput;
pub use table::TableOutput;

use kasa_link_core::protocol::Sysinfo;
use kasa_link_core::{Device, LivenessChange};

/// Output formatter trait
pub trait OutputFormatter {
    /// Format device list
    fn format_devices(&self, devices: &[Device]) -> String;

    /// Format a single device record
    fn format_device_status(&self, device: &Device) -> String;

    /// Format a raw sysinfo report fetched directly from `ip`
    fn format_sysinfo(&self, ip: &str, info: &Sysinfo) -> String;

    /// Format a liveness transition
    fn format_liveness(&self, change: &LivenessChange) -> String;

    /// Format the result of an actuation
    fn format_action(&self, target: &str, action: &str, success: bool) -> String;
}

/// Get the appropriate formatter based on JSON flag
pub fn get_formatter(json: bool) -> Box<dyn OutputFormatter> {
    if json {
        Box::new(JsonOutput::new())
    } else {
        Box::new(TableOutput::new())
    }
}

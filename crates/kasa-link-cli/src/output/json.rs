//! JSON-formatted output for CLI.

use kasa_link_core::protocol::Sysinfo;
use kasa_link_core::{Device, LivenessChange};
use serde::Serialize;
use serde_json::json;

use super::OutputFormatter;

pub struct JsonOutput;

impl JsonOutput {
    pub fn new() -> Self {
        Self
    }

    fn to_json<T: Serialize>(value: &T) -> String {
        serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
    }
}

impl Default for JsonOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputFormatter for JsonOutput {
    fn format_devices(&self, devices: &[Device]) -> String {
        let output = json!({
            "devices": devices,
            "count": devices.len()
        });
        Self::to_json(&output)
    }

    fn format_device_status(&self, device: &Device) -> String {
        Self::to_json(device)
    }

    fn format_sysinfo(&self, ip: &str, info: &Sysinfo) -> String {
        Self::to_json(&json!({
            "ip": ip,
            "sysinfo": info
        }))
    }

    fn format_liveness(&self, change: &LivenessChange) -> String {
        // one event per line so the stream can be piped
        serde_json::to_string(&json!({ "event": "liveness", "change": change }))
            .unwrap_or_else(|_| "{}".to_string())
    }

    fn format_action(&self, target: &str, action: &str, success: bool) -> String {
        Self::to_json(&json!({
            "target": target,
            "action": action,
            "success": success
        }))
    }
}

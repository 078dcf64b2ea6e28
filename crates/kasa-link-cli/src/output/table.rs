//! Table-formatted output for CLI.

use chrono::{DateTime, Utc};
use colored::*;
use comfy_table::{Cell, Color, ContentArrangement, Table};
use kasa_link_core::device::{ProgramMode, Timer};
use kasa_link_core::protocol::{EnergyReading, Sysinfo};
use kasa_link_core::{Device, DeviceState, Liveness, LivenessChange};

use super::OutputFormatter;

pub struct TableOutput;

impl TableOutput {
    pub fn new() -> Self {
        Self
    }

    fn on_off(on: bool) -> &'static str {
        if on {
            "on"
        } else {
            "off"
        }
    }

    fn liveness_cell(liveness: Liveness) -> Cell {
        match liveness {
            Liveness::Responsive => Cell::new("ok").fg(Color::Green),
            Liveness::Unresponsive => Cell::new("no response").fg(Color::Red),
        }
    }

    fn energy(reading: &EnergyReading) -> String {
        format!("{:.1} W, {:.1} V", reading.watts(), reading.volts())
    }

    fn timer(timer: &Timer) -> Option<String> {
        match timer.program {
            ProgramMode::Countdown if timer.remaining_secs > 0 => {
                Some(format!("countdown {}s", timer.remaining_secs))
            }
            ProgramMode::Countdown => Some("countdown".to_string()),
            ProgramMode::Scheduled => Some("scheduled".to_string()),
            ProgramMode::None => None,
        }
    }

    /// One-line state summary.
    fn summary(state: &DeviceState) -> String {
        let mut parts = Vec::new();
        match state {
            DeviceState::Outlet(s) => parts.push(Self::on_off(s.relay).to_string()),
            DeviceState::Switch(s) => parts.push(Self::on_off(s.relay).to_string()),
            DeviceState::Dimmer(s) => {
                parts.push(format!("{} {}%", Self::on_off(s.relay), s.brightness))
            }
            DeviceState::MeteredOutlet(s) => {
                parts.push(Self::on_off(s.relay).to_string());
                if let Some(reading) = &s.energy {
                    parts.push(format!("{:.1} W", reading.watts()));
                }
            }
            DeviceState::PowerStrip(s) => {
                let on = s.children.iter().filter(|c| c.relay).count();
                parts.push(format!("{}/{} on", on, s.children.len()));
            }
        }
        if let Some(timer) = state.timer().and_then(Self::timer) {
            parts.push(timer);
        }
        parts.join(", ")
    }

    fn ago(at: DateTime<Utc>) -> String {
        let secs = (Utc::now() - at).num_seconds().max(0);
        match secs {
            0..=59 => format!("{}s ago", secs),
            60..=3599 => format!("{}m ago", secs / 60),
            _ => format!("{}h ago", secs / 3600),
        }
    }
}

impl Default for TableOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputFormatter for TableOutput {
    fn format_devices(&self, devices: &[Device]) -> String {
        if devices.is_empty() {
            return "No devices found.".to_string();
        }

        let mut table = Table::new();
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec!["Alias", "ID", "Model", "Type", "IP", "State", "Status", "Seen"]);

        for device in devices {
            table.add_row(vec![
                Cell::new(&device.alias),
                Cell::new(&device.id),
                Cell::new(&device.model_name),
                Cell::new(device.kind().display_name()),
                Cell::new(device.address.to_string()),
                Cell::new(Self::summary(&device.state)),
                Self::liveness_cell(device.liveness),
                Cell::new(Self::ago(device.last_seen)),
            ]);
        }

        format!("{}\n\nFound {} device(s)", table, devices.len())
    }

    fn format_device_status(&self, device: &Device) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Device: {} ({})", device.alias.bold(), device.id));
        lines.push(format!("  Model:      {} ({})", device.model_name, device.kind().display_name()));
        lines.push(format!("  Address:    {}", device.address));
        lines.push(format!("  Firmware:   {}", device.firmware));
        lines.push(format!("  MAC:        {}", device.mac));
        lines.push(format!("  RSSI:       {} dBm", device.rssi));

        let status = match device.liveness {
            Liveness::Responsive => "responsive".green(),
            Liveness::Unresponsive => {
                format!("unresponsive ({} failed probes)", device.failed_probes).red()
            }
        };
        lines.push(format!("  Status:     {}", status));
        lines.push(format!("  State:      {}", Self::summary(&device.state)));

        match &device.state {
            DeviceState::MeteredOutlet(s) => {
                if let Some(reading) = &s.energy {
                    lines.push(format!("  Energy:     {}, {} Wh total", Self::energy(reading), reading.total_wh));
                }
            }
            DeviceState::Dimmer(s) => {
                let p = &s.parameters;
                lines.push(format!(
                    "  Fade:       on {} ms, off {} ms (gentle {} / {} ms)",
                    p.fade_on_time, p.fade_off_time, p.gentle_on_time, p.gentle_off_time
                ));
                lines.push(format!("  Ramp rate:  {}, min {}%", p.ramp_rate, p.min_threshold));
            }
            DeviceState::PowerStrip(s) => {
                lines.push("  Outlets:".to_string());
                for child in &s.children {
                    let mut line = format!(
                        "    {} {:<20} {}",
                        child.id,
                        child.alias,
                        Self::on_off(child.relay)
                    );
                    if let Some(reading) = &child.energy {
                        line.push_str(&format!("  {}", Self::energy(reading)));
                    }
                    lines.push(line);
                }
            }
            DeviceState::Outlet(_) | DeviceState::Switch(_) => {}
        }

        lines.join("\n")
    }

    fn format_sysinfo(&self, ip: &str, info: &Sysinfo) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Device: {} ({})", ip, info.device_id));
        lines.push(format!("  Alias:      {}", info.alias));
        lines.push(format!("  Model:      {}", info.model));
        lines.push(format!("  Firmware:   {} (hw {})", info.sw_ver, info.hw_ver));
        lines.push(format!("  MAC:        {}", info.mac));
        lines.push(format!("  RSSI:       {} dBm", info.rssi));

        if info.children.is_empty() {
            lines.push(format!("  Relay:      {}", Self::on_off(info.relay_on())));
            if info.brightness > 0 {
                lines.push(format!("  Brightness: {}%", info.brightness));
            }
        } else {
            lines.push("  Outlets:".to_string());
            for child in &info.children {
                lines.push(format!(
                    "    {} {:<20} {}",
                    child.id,
                    child.alias,
                    Self::on_off(child.state > 0)
                ));
            }
        }

        if !info.active_mode.is_empty() && info.active_mode != "none" {
            lines.push(format!("  Mode:       {}", info.active_mode));
        }

        lines.join("\n")
    }

    fn format_liveness(&self, change: &LivenessChange) -> String {
        match change.liveness {
            Liveness::Responsive => format!("{} {} ({}) is back", "[OK]".green(), change.alias, change.id),
            Liveness::Unresponsive => format!(
                "{} {} ({}) is not responding",
                "[!]".red(),
                change.alias,
                change.id
            ),
        }
    }

    fn format_action(&self, target: &str, action: &str, success: bool) -> String {
        let status = if success {
            "[OK]".green()
        } else {
            "[FAIL]".red()
        };

        format!("{} {} {}", status, target, action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kasa_link_core::protocol::ChildInfo;
    use std::net::IpAddr;

    fn strip() -> Device {
        let info = Sysinfo {
            model: "KP303(US)".to_string(),
            device_id: "ABCDEF".to_string(),
            alias: "Strip".to_string(),
            children: vec![
                ChildInfo {
                    id: "00".to_string(),
                    state: 1,
                    alias: "TV".to_string(),
                    on_time: 0,
                },
                ChildInfo {
                    id: "01".to_string(),
                    state: 0,
                    alias: "Lamp".to_string(),
                    on_time: 0,
                },
            ],
            ..Default::default()
        };
        Device::from_report(&info, IpAddr::from([10, 0, 0, 7])).unwrap().0
    }

    #[test]
    fn test_strip_summary() {
        assert_eq!(TableOutput::summary(&strip().state), "1/2 on");
    }

    #[test]
    fn test_device_table_lists_every_record() {
        let output = TableOutput::new().format_devices(&[strip()]);
        assert!(output.contains("ABCDEF"));
        assert!(output.contains("10.0.0.7"));
        assert!(output.contains("Found 1 device(s)"));
        assert_eq!(TableOutput::new().format_devices(&[]), "No devices found.");
    }

    #[test]
    fn test_status_lists_outlets() {
        let output = TableOutput::new().format_device_status(&strip());
        assert!(output.contains("Outlets:"));
        assert!(output.contains("Lamp"));
    }
}

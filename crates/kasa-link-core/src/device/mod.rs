//! Device records and capability variants.
//!
//! A [`Device`] holds the fields every model shares; the model-specific
//! part lives in [`DeviceState`], a closed set of variants that all
//! implement [`Capability`]. The variant is picked once, from the vendor
//! model string, when the record is created.

pub mod dimmer;
pub mod direct;
pub mod model;
pub mod plug;
pub mod strip;

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::ProtocolError;
use crate::protocol::{CountdownRule, DimmerParameters, EmeterRealtime, Sysinfo};

pub use dimmer::Dimmer;
pub use model::{DeviceKind, Model};
pub use plug::{MeteredOutlet, Outlet, Switch, Timer};
pub use strip::{ChildOutlet, PowerStrip};

/// Engine-side reachability classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Liveness {
    Responsive,
    Unresponsive,
}

/// Device-local scheduling state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ProgramMode {
    #[default]
    None,
    Scheduled,
    Countdown,
}

impl ProgramMode {
    pub fn from_active_mode(mode: &str) -> Self {
        match mode {
            "schedule" | "add_rule" => ProgramMode::Scheduled,
            "count_down" => ProgramMode::Countdown,
            _ => ProgramMode::None,
        }
    }
}

/// Request a report asks us to make after it has been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowUp {
    /// `emeter.get_realtime` over UDP
    QueryEnergy,
    /// Child variant of the energy query
    QueryChildEnergy { child_id: String },
    /// Read countdown rules over the direct channel
    FetchCountdown,
    /// Delete countdown rules over the direct channel
    ClearCountdown,
    /// Read fade/ramp settings over the direct channel
    FetchDimmerParameters,
}

/// Contract every hardware variant implements.
pub trait Capability {
    /// Apply the model-specific part of a sysinfo report.
    fn apply_report(&mut self, info: &Sysinfo) -> Vec<FollowUp>;

    /// Apply standalone energy telemetry. Returns false when the reading has nowhere to go.
    fn apply_energy(&mut self, _realtime: &EmeterRealtime) -> bool {
        false
    }

    fn apply_countdown(&mut self, _rules: &[CountdownRule]) {}

    fn apply_dimmer_parameters(&mut self, _params: DimmerParameters) {}

    /// Relay state for single-relay variants.
    fn relay(&self) -> Option<bool>;

    /// Optimistically record a relay change. Returns false if unsupported.
    fn set_relay(&mut self, _on: bool) -> bool {
        false
    }

    fn set_brightness(&mut self, _brightness: u8) -> bool {
        false
    }

    fn set_child_relay(&mut self, _child_id: &str, _on: bool) -> bool {
        false
    }

    /// Optimistically record a freshly added countdown.
    fn start_countdown(&mut self, _seconds: u32) -> bool {
        false
    }
}

/// Model-specific state, one variant per capability set.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum DeviceState {
    Outlet(Outlet),
    Switch(Switch),
    Dimmer(Dimmer),
    PowerStrip(PowerStrip),
    MeteredOutlet(MeteredOutlet),
}

impl DeviceState {
    fn for_model(model: Model) -> Self {
        match model.kind() {
            DeviceKind::Outlet => DeviceState::Outlet(Outlet::default()),
            DeviceKind::Switch => DeviceState::Switch(Switch::default()),
            DeviceKind::Dimmer => DeviceState::Dimmer(Dimmer::default()),
            DeviceKind::PowerStrip => {
                DeviceState::PowerStrip(PowerStrip::new(model.has_energy_meter()))
            }
            DeviceKind::MeteredOutlet => DeviceState::MeteredOutlet(MeteredOutlet::default()),
        }
    }

    pub fn capability(&self) -> &dyn Capability {
        match self {
            DeviceState::Outlet(s) => s,
            DeviceState::Switch(s) => s,
            DeviceState::Dimmer(s) => s,
            DeviceState::PowerStrip(s) => s,
            DeviceState::MeteredOutlet(s) => s,
        }
    }

    pub fn capability_mut(&mut self) -> &mut dyn Capability {
        match self {
            DeviceState::Outlet(s) => s,
            DeviceState::Switch(s) => s,
            DeviceState::Dimmer(s) => s,
            DeviceState::PowerStrip(s) => s,
            DeviceState::MeteredOutlet(s) => s,
        }
    }

    pub fn timer(&self) -> Option<&Timer> {
        match self {
            DeviceState::Outlet(s) => Some(&s.timer),
            DeviceState::Switch(s) => Some(&s.timer),
            DeviceState::Dimmer(s) => Some(&s.timer),
            DeviceState::MeteredOutlet(s) => Some(&s.timer),
            DeviceState::PowerStrip(_) => None,
        }
    }
}

/// One physical device.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: String,
    pub model: Model,
    /// Model string exactly as reported, e.g. `HS103(US)`
    pub model_name: String,
    pub alias: String,
    pub address: IpAddr,
    pub last_seen: DateTime<Utc>,
    pub liveness: Liveness,
    /// Consecutive failed liveness probes
    pub failed_probes: u32,
    pub rssi: i32,
    pub firmware: String,
    pub mac: String,
    pub state: DeviceState,
    /// Last sysinfo applied, kept for the warm-start cache
    #[serde(skip)]
    pub report: Sysinfo,
}

impl Device {
    /// Build a record from the first report of an unseen device.
    pub fn from_report(
        info: &Sysinfo,
        address: IpAddr,
    ) -> Result<(Self, Vec<FollowUp>), ProtocolError> {
        let model = Model::from_vendor(&info.model)
            .ok_or_else(|| ProtocolError::UnknownModel(info.model.clone()))?;

        let mut device = Self {
            id: info.device_id.clone(),
            model,
            model_name: info.model.clone(),
            alias: info.alias.clone(),
            address,
            last_seen: Utc::now(),
            liveness: Liveness::Responsive,
            failed_probes: 0,
            rssi: info.rssi,
            firmware: info.sw_ver.clone(),
            mac: info.mac.clone(),
            state: DeviceState::for_model(model),
            report: info.clone(),
        };

        let follow_ups = device.state.capability_mut().apply_report(info);
        Ok((device, follow_ups))
    }

    pub fn kind(&self) -> DeviceKind {
        self.model.kind()
    }

    /// Apply a fresh sysinfo report received from `address`.
    pub fn update(&mut self, info: &Sysinfo, address: IpAddr) -> Vec<FollowUp> {
        if self.address != address {
            info!(id = %self.id, old = %self.address, new = %address, alias = %info.alias, "device address changed");
            self.address = address;
        }

        if self.alias != info.alias {
            info!(id = %self.id, old = %self.alias, new = %info.alias, "device renamed");
            self.alias = info.alias.clone();
        }

        self.rssi = info.rssi;
        self.firmware = info.sw_ver.clone();
        if !info.mac.is_empty() {
            self.mac = info.mac.clone();
        }
        self.last_seen = Utc::now();
        self.mark_responsive();

        let follow_ups = self.state.capability_mut().apply_report(info);
        self.report = info.clone();
        follow_ups
    }

    /// Apply standalone energy telemetry.
    pub fn update_energy(&mut self, realtime: &EmeterRealtime) -> bool {
        let applied = self.state.capability_mut().apply_energy(realtime);
        if !applied {
            debug!(id = %self.id, ip = %self.address, "energy reading not applicable");
        }
        applied
    }

    pub fn update_countdown(&mut self, rules: &[CountdownRule]) {
        self.state.capability_mut().apply_countdown(rules);
    }

    /// Returns true if this call flipped the record back to responsive.
    pub fn mark_responsive(&mut self) -> bool {
        self.failed_probes = 0;
        let changed = self.liveness == Liveness::Unresponsive;
        self.liveness = Liveness::Responsive;
        changed
    }

    /// Record a failed verification probe. Returns true on the responsive to unresponsive edge.
    pub fn mark_unresponsive(&mut self) -> bool {
        self.failed_probes = self.failed_probes.saturating_add(1);
        let changed = self.liveness == Liveness::Responsive;
        self.liveness = Liveness::Unresponsive;
        changed
    }

    pub fn is_stale(&self, cutoff: DateTime<Utc>) -> bool {
        self.last_seen < cutoff
    }

    pub fn is_responsive(&self) -> bool {
        self.liveness == Liveness::Responsive
    }

    pub fn relay(&self) -> Option<bool> {
        self.state.capability().relay()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sysinfo(model: &str, relay: u8) -> Sysinfo {
        Sysinfo {
            model: model.to_string(),
            device_id: "X1".to_string(),
            alias: "Porch".to_string(),
            relay_state: relay,
            active_mode: "none".to_string(),
            rssi: -60,
            ..Default::default()
        }
    }

    fn ip(last: u8) -> IpAddr {
        IpAddr::from([192, 168, 1, last])
    }

    #[test]
    fn test_from_report_picks_variant() {
        let (device, follow_ups) = Device::from_report(&sysinfo("HS103(US)", 0), ip(10)).unwrap();
        assert_eq!(device.id, "X1");
        assert!(matches!(device.state, DeviceState::Outlet(_)));
        assert_eq!(device.relay(), Some(false));
        assert!(device.is_responsive());
        assert!(follow_ups.is_empty());

        let (dimmer, follow_ups) = Device::from_report(&sysinfo("HS220(US)", 1), ip(11)).unwrap();
        assert!(matches!(dimmer.state, DeviceState::Dimmer(_)));
        assert_eq!(follow_ups, vec![FollowUp::FetchDimmerParameters]);
    }

    #[test]
    fn test_from_report_unknown_model() {
        let err = Device::from_report(&sysinfo("KL130(US)", 0), ip(10)).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownModel(m) if m == "KL130(US)"));
    }

    #[test]
    fn test_update_tracks_address_alias_and_relay() {
        let (mut device, _) = Device::from_report(&sysinfo("HS103(US)", 0), ip(10)).unwrap();
        let mut report = sysinfo("HS103(US)", 1);
        report.alias = "Back Porch".to_string();

        device.update(&report, ip(42));

        assert_eq!(device.address, ip(42));
        assert_eq!(device.alias, "Back Porch");
        assert_eq!(device.relay(), Some(true));
        assert_eq!(device.report.alias, "Back Porch");
    }

    #[test]
    fn test_liveness_transitions() {
        let (mut device, _) = Device::from_report(&sysinfo("HS200(US)", 0), ip(10)).unwrap();

        assert!(device.mark_unresponsive());
        assert!(!device.mark_unresponsive());
        assert_eq!(device.failed_probes, 2);
        assert_eq!(device.liveness, Liveness::Unresponsive);

        device.update(&sysinfo("HS200(US)", 0), ip(10));
        assert_eq!(device.liveness, Liveness::Responsive);
        assert_eq!(device.failed_probes, 0);
    }

    #[test]
    fn test_is_stale() {
        let (mut device, _) = Device::from_report(&sysinfo("HS103(US)", 0), ip(10)).unwrap();
        let now = Utc::now();
        device.last_seen = now - Duration::seconds(200);
        assert!(device.is_stale(now - Duration::seconds(150)));
        assert!(!device.is_stale(now - Duration::seconds(250)));
    }

    #[test]
    fn test_program_mode_mapping() {
        assert_eq!(ProgramMode::from_active_mode("count_down"), ProgramMode::Countdown);
        assert_eq!(ProgramMode::from_active_mode("schedule"), ProgramMode::Scheduled);
        assert_eq!(ProgramMode::from_active_mode("add_rule"), ProgramMode::Scheduled);
        assert_eq!(ProgramMode::from_active_mode("none"), ProgramMode::None);
        assert_eq!(ProgramMode::from_active_mode("delete_all_rules"), ProgramMode::None);
    }

    #[test]
    fn test_serialized_shape() {
        let (device, _) = Device::from_report(&sysinfo("HS103(US)", 1), ip(10)).unwrap();
        let value = serde_json::to_value(&device).unwrap();
        assert_eq!(value["id"], "X1");
        assert_eq!(value["model"], "HS103");
        assert_eq!(value["liveness"], "responsive");
        assert_eq!(value["state"]["kind"], "outlet");
        assert_eq!(value["state"]["relay"], true);
        assert!(value.get("report").is_none());
    }
}

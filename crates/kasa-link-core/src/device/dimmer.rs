//! Dimmable wall switch (HS220).

use serde::Serialize;

use super::{Capability, FollowUp, Timer};
use crate::protocol::{CountdownRule, DimmerParameters, Sysinfo};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dimmer {
    pub relay: bool,
    /// Percentage, 0-100
    pub brightness: u8,
    pub timer: Timer,
    /// Defaults until the device answers a parameter query
    pub parameters: DimmerParameters,
    #[serde(skip)]
    parameters_fetched: bool,
}

impl Capability for Dimmer {
    fn apply_report(&mut self, info: &Sysinfo) -> Vec<FollowUp> {
        self.relay = info.relay_on();
        self.brightness = info.brightness.min(100);

        let mut follow_ups = self.timer.apply(&info.active_mode);
        if !self.parameters_fetched {
            follow_ups.push(FollowUp::FetchDimmerParameters);
        }
        follow_ups
    }

    fn apply_countdown(&mut self, rules: &[CountdownRule]) {
        self.timer.apply_rules(rules);
    }

    fn apply_dimmer_parameters(&mut self, params: DimmerParameters) {
        self.parameters = params;
        self.parameters_fetched = true;
    }

    fn relay(&self) -> Option<bool> {
        Some(self.relay)
    }

    fn set_relay(&mut self, on: bool) -> bool {
        self.relay = on;
        true
    }

    fn set_brightness(&mut self, brightness: u8) -> bool {
        self.brightness = brightness.min(100);
        true
    }

    fn start_countdown(&mut self, seconds: u32) -> bool {
        self.timer.start(seconds);
        true
    }
}

//! Single-relay variants: plain outlet, wall switch and energy-metered outlet.

use serde::Serialize;

use super::{Capability, FollowUp, ProgramMode};
use crate::protocol::{CountdownRule, EmeterRealtime, EnergyReading, Sysinfo};

/// Program mode plus the countdown it may be running.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Timer {
    pub program: ProgramMode,
    pub remaining_secs: u32,
}

impl Timer {
    /// Track `active_mode` from a sysinfo report.
    pub fn apply(&mut self, active_mode: &str) -> Vec<FollowUp> {
        let next = ProgramMode::from_active_mode(active_mode);
        let previous = std::mem::replace(&mut self.program, next);

        match (previous, next) {
            (_, ProgramMode::Countdown) => vec![FollowUp::FetchCountdown],
            (previous, ProgramMode::None) if previous != ProgramMode::None => {
                // expired rules linger on the device and block the next add
                self.remaining_secs = 0;
                vec![FollowUp::ClearCountdown]
            }
            _ => {
                self.remaining_secs = 0;
                Vec::new()
            }
        }
    }

    pub fn apply_rules(&mut self, rules: &[CountdownRule]) {
        self.remaining_secs = rules
            .iter()
            .find(|r| r.enable > 0)
            .map(|r| r.remain)
            .unwrap_or(0);
    }

    pub fn start(&mut self, seconds: u32) {
        self.program = ProgramMode::Countdown;
        self.remaining_secs = seconds;
    }
}

/// Plain outlet (HS100/HS103/HS105).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Outlet {
    pub relay: bool,
    pub in_use: bool,
    pub timer: Timer,
}

impl Capability for Outlet {
    fn apply_report(&mut self, info: &Sysinfo) -> Vec<FollowUp> {
        self.relay = info.relay_on();
        self.in_use = self.relay;
        self.timer.apply(&info.active_mode)
    }

    fn apply_countdown(&mut self, rules: &[CountdownRule]) {
        self.timer.apply_rules(rules);
    }

    fn relay(&self) -> Option<bool> {
        Some(self.relay)
    }

    fn set_relay(&mut self, on: bool) -> bool {
        self.relay = on;
        self.in_use = on;
        true
    }

    fn start_countdown(&mut self, seconds: u32) -> bool {
        self.timer.start(seconds);
        true
    }
}

/// Wall switch (HS200/HS210). No "in use" notion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Switch {
    pub relay: bool,
    pub timer: Timer,
}

impl Capability for Switch {
    fn apply_report(&mut self, info: &Sysinfo) -> Vec<FollowUp> {
        self.relay = info.relay_on();
        self.timer.apply(&info.active_mode)
    }

    fn apply_countdown(&mut self, rules: &[CountdownRule]) {
        self.timer.apply_rules(rules);
    }

    fn relay(&self) -> Option<bool> {
        Some(self.relay)
    }

    fn set_relay(&mut self, on: bool) -> bool {
        self.relay = on;
        true
    }

    fn start_countdown(&mut self, seconds: u32) -> bool {
        self.timer.start(seconds);
        true
    }
}

/// Outlet with an energy meter (HS110/KP115).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeteredOutlet {
    pub relay: bool,
    pub in_use: bool,
    pub timer: Timer,
    pub energy: Option<EnergyReading>,
}

impl Capability for MeteredOutlet {
    fn apply_report(&mut self, info: &Sysinfo) -> Vec<FollowUp> {
        self.relay = info.relay_on();
        if !self.relay {
            self.in_use = false;
        }
        let mut follow_ups = self.timer.apply(&info.active_mode);
        follow_ups.push(FollowUp::QueryEnergy);
        follow_ups
    }

    fn apply_energy(&mut self, realtime: &EmeterRealtime) -> bool {
        let reading = realtime.reading();
        self.in_use = self.relay && reading.power_mw > 0;
        self.energy = Some(reading);
        true
    }

    fn apply_countdown(&mut self, rules: &[CountdownRule]) {
        self.timer.apply_rules(rules);
    }

    fn relay(&self) -> Option<bool> {
        Some(self.relay)
    }

    fn set_relay(&mut self, on: bool) -> bool {
        self.relay = on;
        if !on {
            self.in_use = false;
        }
        true
    }

    fn start_countdown(&mut self, seconds: u32) -> bool {
        self.timer.start(seconds);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(relay: u8, mode: &str) -> Sysinfo {
        Sysinfo {
            relay_state: relay,
            active_mode: mode.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_outlet_tracks_relay() {
        let mut outlet = Outlet::default();
        assert!(outlet.apply_report(&report(1, "none")).is_empty());
        assert!(outlet.relay);
        assert!(outlet.in_use);
        assert_eq!(outlet.relay(), Some(true));
    }

    #[test]
    fn test_countdown_follow_ups() {
        let mut switch = Switch::default();

        let follow_ups = switch.apply_report(&report(1, "count_down"));
        assert_eq!(follow_ups, vec![FollowUp::FetchCountdown]);
        assert_eq!(switch.timer.program, ProgramMode::Countdown);

        switch.apply_countdown(&[CountdownRule {
            enable: 1,
            remain: 45,
            ..Default::default()
        }]);
        assert_eq!(switch.timer.remaining_secs, 45);

        // still counting: keep the remaining time fresh
        assert_eq!(
            switch.apply_report(&report(1, "count_down")),
            vec![FollowUp::FetchCountdown]
        );

        let follow_ups = switch.apply_report(&report(0, "none"));
        assert_eq!(follow_ups, vec![FollowUp::ClearCountdown]);
        assert_eq!(switch.timer.remaining_secs, 0);
        assert_eq!(switch.timer.program, ProgramMode::None);
    }

    #[test]
    fn test_schedule_mode_needs_no_follow_up() {
        let mut outlet = Outlet::default();
        assert!(outlet.apply_report(&report(0, "schedule")).is_empty());
        assert_eq!(outlet.timer.program, ProgramMode::Scheduled);
    }

    #[test]
    fn test_leaving_schedule_clears_rules() {
        let mut outlet = Outlet::default();
        outlet.apply_report(&report(0, "schedule"));
        assert_eq!(
            outlet.apply_report(&report(0, "none")),
            vec![FollowUp::ClearCountdown]
        );
        // already idle
        assert!(outlet.apply_report(&report(0, "none")).is_empty());
    }

    #[test]
    fn test_disabled_rules_are_ignored() {
        let mut timer = Timer::default();
        timer.apply_rules(&[CountdownRule {
            enable: 0,
            remain: 99,
            ..Default::default()
        }]);
        assert_eq!(timer.remaining_secs, 0);
    }

    #[test]
    fn test_metered_outlet_queries_energy_every_report() {
        let mut outlet = MeteredOutlet::default();
        assert_eq!(
            outlet.apply_report(&report(1, "none")),
            vec![FollowUp::QueryEnergy]
        );
        assert_eq!(
            outlet.apply_report(&report(1, "none")),
            vec![FollowUp::QueryEnergy]
        );

        let applied = outlet.apply_energy(&EmeterRealtime {
            power_mw: Some(4_500),
            voltage_mv: Some(120_000),
            ..Default::default()
        });
        assert!(applied);
        assert!(outlet.in_use);
        assert_eq!(outlet.energy.map(|e| e.power_mw), Some(4_500));

        outlet.set_relay(false);
        assert!(!outlet.in_use);
    }

    #[test]
    fn test_plain_outlet_rejects_energy() {
        let mut outlet = Outlet::default();
        assert!(!outlet.apply_energy(&EmeterRealtime::default()));
    }
}

//! Multi-outlet power strips (KP303, HS300).

use serde::Serialize;

use super::{Capability, FollowUp};
use crate::protocol::{EmeterRealtime, EnergyReading, Sysinfo};

/// One independently switched outlet of a strip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildOutlet {
    /// Sub-id as reported by the parent, e.g. `00`
    pub id: String,
    pub alias: String,
    pub relay: bool,
    pub in_use: bool,
    pub energy: Option<EnergyReading>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerStrip {
    /// Per-outlet energy telemetry available
    pub metered: bool,
    pub children: Vec<ChildOutlet>,
}

impl PowerStrip {
    pub fn new(metered: bool) -> Self {
        Self {
            metered,
            children: Vec::new(),
        }
    }

    pub fn child(&self, id: &str) -> Option<&ChildOutlet> {
        self.children.iter().find(|c| c.id == id)
    }

    /// Find a child by sub-id, or by the full `parentId + childId` form.
    pub fn resolve_child(&self, parent_id: &str, child: &str) -> Option<&ChildOutlet> {
        let short = child.strip_prefix(parent_id).unwrap_or(child);
        self.child(short)
    }
}

impl Capability for PowerStrip {
    fn apply_report(&mut self, info: &Sysinfo) -> Vec<FollowUp> {
        let mut follow_ups = Vec::new();

        // Children keep their identity by sub-id; telemetry survives re-ordering.
        let mut children = Vec::with_capacity(info.children.len());
        for reported in &info.children {
            let mut child = self
                .children
                .iter()
                .find(|c| c.id == reported.id)
                .cloned()
                .unwrap_or_else(|| ChildOutlet {
                    id: reported.id.clone(),
                    ..Default::default()
                });

            child.alias = reported.alias.clone();
            child.relay = reported.state > 0;
            if !child.relay {
                child.in_use = false;
            } else if !self.metered {
                child.in_use = true;
            }

            if self.metered {
                follow_ups.push(FollowUp::QueryChildEnergy {
                    child_id: child.id.clone(),
                });
            }
            children.push(child);
        }
        self.children = children;

        follow_ups
    }

    fn apply_energy(&mut self, realtime: &EmeterRealtime) -> bool {
        if !self.metered {
            return false;
        }
        let Some(child) = self.children.get_mut(realtime.slot()) else {
            return false;
        };
        let reading = realtime.reading();
        child.in_use = child.relay && reading.power_mw > 0;
        child.energy = Some(reading);
        true
    }

    fn relay(&self) -> Option<bool> {
        None
    }

    fn set_child_relay(&mut self, child_id: &str, on: bool) -> bool {
        match self.children.iter_mut().find(|c| c.id == child_id) {
            Some(child) => {
                child.relay = on;
                if !on {
                    child.in_use = false;
                }
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ChildInfo;

    fn strip_report(states: &[(&str, u8, &str)]) -> Sysinfo {
        Sysinfo {
            model: "HS300(US)".to_string(),
            device_id: "ABCDEF".to_string(),
            child_num: states.len(),
            children: states
                .iter()
                .map(|(id, state, alias)| ChildInfo {
                    id: id.to_string(),
                    state: *state,
                    alias: alias.to_string(),
                    on_time: 0,
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_children_reconciled_by_id() {
        let mut strip = PowerStrip::new(false);
        let follow_ups = strip.apply_report(&strip_report(&[("00", 1, "TV"), ("01", 0, "Lamp")]));
        assert!(follow_ups.is_empty());
        assert_eq!(strip.children.len(), 2);
        assert!(strip.child("00").unwrap().relay);
        assert!(strip.child("00").unwrap().in_use);

        strip.apply_report(&strip_report(&[("00", 0, "TV"), ("01", 1, "Reading Lamp")]));
        assert!(!strip.child("00").unwrap().relay);
        assert_eq!(strip.child("01").unwrap().alias, "Reading Lamp");
    }

    #[test]
    fn test_metered_strip_queries_each_child() {
        let mut strip = PowerStrip::new(true);
        let follow_ups = strip.apply_report(&strip_report(&[("00", 1, "A"), ("01", 1, "B")]));
        assert_eq!(
            follow_ups,
            vec![
                FollowUp::QueryChildEnergy {
                    child_id: "00".to_string()
                },
                FollowUp::QueryChildEnergy {
                    child_id: "01".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_energy_routed_by_slot() {
        let mut strip = PowerStrip::new(true);
        strip.apply_report(&strip_report(&[("00", 1, "A"), ("01", 1, "B")]));

        let reading = EmeterRealtime {
            slot_id: Some(1),
            power_mw: Some(12_000),
            ..Default::default()
        };
        assert!(strip.apply_energy(&reading));
        assert!(strip.child("00").unwrap().energy.is_none());
        assert_eq!(strip.child("01").unwrap().energy.map(|e| e.power_mw), Some(12_000));
        assert!(strip.child("01").unwrap().in_use);

        let out_of_range = EmeterRealtime {
            slot_id: Some(5),
            ..Default::default()
        };
        assert!(!strip.apply_energy(&out_of_range));
    }

    #[test]
    fn test_set_child_relay() {
        let mut strip = PowerStrip::new(false);
        strip.apply_report(&strip_report(&[("00", 0, "A")]));
        assert!(strip.set_child_relay("00", true));
        assert!(strip.child("00").unwrap().relay);
        assert!(!strip.set_child_relay("07", true));
    }

    #[test]
    fn test_resolve_child_accepts_full_address() {
        let mut strip = PowerStrip::new(false);
        strip.apply_report(&strip_report(&[("00", 0, "A"), ("01", 0, "B")]));
        assert_eq!(strip.resolve_child("ABCDEF", "ABCDEF01").unwrap().alias, "B");
        assert_eq!(strip.resolve_child("ABCDEF", "00").unwrap().alias, "A");
        assert!(strip.resolve_child("ABCDEF", "02").is_none());
    }
}

//! Hardware model table.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Vendor model string: family code plus optional region suffix, e.g. `HS103(US)`.
const MODEL_PATTERN: &str = r"^([A-Z]{2}\d{3})(?:\(([A-Z]{2})\))?$";

fn model_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(MODEL_PATTERN).ok()).as_ref()
}

/// Capability variant a model maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceKind {
    Outlet,
    Switch,
    Dimmer,
    PowerStrip,
    MeteredOutlet,
}

impl DeviceKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            DeviceKind::Outlet => "Outlet",
            DeviceKind::Switch => "Switch",
            DeviceKind::Dimmer => "Dimmer",
            DeviceKind::PowerStrip => "Power Strip",
            DeviceKind::MeteredOutlet => "Outlet (energy)",
        }
    }
}

/// Supported hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Model {
    Hs100,
    Hs103,
    Hs105,
    Hs110,
    Hs200,
    Hs210,
    Hs220,
    Kp115,
    Kp303,
    Hs300,
}

impl Model {
    /// Resolve a vendor model string. Region suffix is ignored.
    pub fn from_vendor(model: &str) -> Option<Self> {
        let caps = model_regex()?.captures(model.trim())?;
        let family = caps.get(1)?.as_str();

        match family {
            "HS100" => Some(Model::Hs100),
            "HS103" => Some(Model::Hs103),
            "HS105" => Some(Model::Hs105),
            "HS110" => Some(Model::Hs110),
            "HS200" => Some(Model::Hs200),
            "HS210" => Some(Model::Hs210),
            "HS220" => Some(Model::Hs220),
            "KP115" => Some(Model::Kp115),
            "KP303" => Some(Model::Kp303),
            "HS300" => Some(Model::Hs300),
            _ => None,
        }
    }

    pub fn kind(&self) -> DeviceKind {
        match self {
            Model::Hs100 | Model::Hs103 | Model::Hs105 => DeviceKind::Outlet,
            Model::Hs200 | Model::Hs210 => DeviceKind::Switch,
            Model::Hs220 => DeviceKind::Dimmer,
            Model::Hs110 | Model::Kp115 => DeviceKind::MeteredOutlet,
            Model::Kp303 | Model::Hs300 => DeviceKind::PowerStrip,
        }
    }

    /// Whether the hardware reports energy telemetry.
    pub fn has_energy_meter(&self) -> bool {
        matches!(self, Model::Hs110 | Model::Kp115 | Model::Hs300)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Model::Hs100 => "HS100",
            Model::Hs103 => "HS103",
            Model::Hs105 => "HS105",
            Model::Hs110 => "HS110",
            Model::Hs200 => "HS200",
            Model::Hs210 => "HS210",
            Model::Hs220 => "HS220",
            Model::Kp115 => "KP115",
            Model::Kp303 => "KP303",
            Model::Hs300 => "HS300",
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

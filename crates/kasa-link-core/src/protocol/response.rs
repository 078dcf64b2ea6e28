//! Typed device reports and inbound payload classification.

use serde::{Deserialize, Serialize};

use super::commands::is_ack;
use crate::error::{DeviceError, ProtocolError};

/// Self-reported status block of a device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sysinfo {
    pub sw_ver: String,
    pub hw_ver: String,
    pub model: String,
    #[serde(rename = "deviceId")]
    pub device_id: String,
    #[serde(rename = "oemId")]
    pub oem_id: String,
    pub alias: String,
    #[serde(alias = "mic_mac")]
    pub mac: String,
    pub rssi: i32,
    pub relay_state: u8,
    pub on_time: u64,
    pub active_mode: String,
    pub brightness: u8,
    pub led_off: u8,
    pub children: Vec<ChildInfo>,
    pub child_num: usize,
    pub err_code: i32,
}

impl Sysinfo {
    pub fn relay_on(&self) -> bool {
        self.relay_state > 0
    }
}

/// One outlet entry of a multi-outlet sysinfo.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChildInfo {
    pub id: String,
    pub state: u8,
    pub alias: String,
    pub on_time: u64,
}

/// Raw realtime energy report. Older firmware reports float units, newer milli-units.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmeterRealtime {
    pub voltage_mv: Option<u32>,
    pub current_ma: Option<u32>,
    pub power_mw: Option<u32>,
    pub total_wh: Option<u32>,
    pub voltage: Option<f64>,
    pub current: Option<f64>,
    pub power: Option<f64>,
    pub total: Option<f64>,
    pub slot_id: Option<usize>,
    pub err_code: i32,
}

fn milli(direct: Option<u32>, float: Option<f64>) -> u32 {
    direct
        .or_else(|| float.map(|v| (v * 1000.0).round().max(0.0) as u32))
        .unwrap_or(0)
}

impl EmeterRealtime {
    /// Normalize to milli-units.
    pub fn reading(&self) -> EnergyReading {
        EnergyReading {
            voltage_mv: milli(self.voltage_mv, self.voltage),
            current_ma: milli(self.current_ma, self.current),
            power_mw: milli(self.power_mw, self.power),
            // `total` is kWh on float firmware
            total_wh: milli(self.total_wh, self.total),
        }
    }

    pub fn slot(&self) -> usize {
        self.slot_id.unwrap_or(0)
    }
}

/// Normalized energy telemetry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnergyReading {
    pub voltage_mv: u32,
    pub current_ma: u32,
    pub power_mw: u32,
    pub total_wh: u32,
}

impl EnergyReading {
    pub fn volts(&self) -> f64 {
        f64::from(self.voltage_mv) / 1000.0
    }

    pub fn watts(&self) -> f64 {
        f64::from(self.power_mw) / 1000.0
    }
}

/// A device-local countdown rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CountdownRule {
    pub id: String,
    pub name: String,
    pub enable: u8,
    pub delay: u32,
    pub act: u8,
    pub remain: u32,
}

/// Fade and ramp settings of a dimmer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DimmerParameters {
    pub fade_on_time: u32,
    pub fade_off_time: u32,
    pub gentle_on_time: u32,
    pub gentle_off_time: u32,
    pub ramp_rate: u32,
    pub min_threshold: u32,
}

impl Default for DimmerParameters {
    fn default() -> Self {
        Self {
            fade_on_time: 1000,
            fade_off_time: 1000,
            gentle_on_time: 3000,
            gentle_off_time: 10000,
            ramp_rate: 30,
            min_threshold: 10,
        }
    }
}

// ==================== Envelope ====================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Status {
    err_code: i32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SystemSection {
    get_sysinfo: Option<Sysinfo>,
    set_relay_state: Option<Status>,
    set_dev_alias: Option<Status>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EmeterSection {
    get_realtime: Option<EmeterRealtime>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DimmerSection {
    set_brightness: Option<Status>,
    get_dimmer_parameters: Option<DimmerParameters>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RuleList {
    rule_list: Vec<CountdownRule>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CountdownSection {
    get_rules: Option<RuleList>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Envelope {
    system: Option<SystemSection>,
    emeter: Option<EmeterSection>,
    #[serde(rename = "smartlife.iot.dimmer")]
    dimmer: Option<DimmerSection>,
    count_down: Option<CountdownSection>,
}

/// Classified inbound datagram.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Acknowledgment of a fire-and-forget set command
    Ack { err_code: i32 },
    /// Full status report
    Sysinfo(Box<Sysinfo>),
    /// Standalone energy telemetry, addressed by source IP only
    Energy(EmeterRealtime),
    /// Well-formed JSON with a shape we do not handle
    Unknown,
}

/// Classify a de-obfuscated payload.
pub fn classify(plain: &[u8]) -> Result<Inbound, ProtocolError> {
    let text = std::str::from_utf8(plain)
        .map_err(|e| ProtocolError::Malformed(format!("not UTF-8: {}", e)))?;

    if is_ack(text) {
        return Ok(Inbound::Ack { err_code: 0 });
    }

    let envelope: Envelope = serde_json::from_str(text)?;

    if let Some(realtime) = envelope.emeter.and_then(|e| e.get_realtime) {
        return Ok(Inbound::Energy(realtime));
    }

    if let Some(system) = envelope.system {
        if let Some(info) = system.get_sysinfo {
            if info.device_id.is_empty() {
                return Err(ProtocolError::Malformed(
                    "sysinfo without deviceId".to_string(),
                ));
            }
            return Ok(Inbound::Sysinfo(Box::new(info)));
        }
        if let Some(status) = system.set_relay_state.or(system.set_dev_alias) {
            return Ok(Inbound::Ack {
                err_code: status.err_code,
            });
        }
    }

    if let Some(status) = envelope.dimmer.and_then(|d| d.set_brightness) {
        return Ok(Inbound::Ack {
            err_code: status.err_code,
        });
    }

    Ok(Inbound::Unknown)
}

// ==================== Direct responses ====================

/// Find the first non-zero `err_code` anywhere in a response.
pub fn error_in_response(value: &serde_json::Value) -> Option<String> {
    let obj = value.as_object()?;

    if let Some(code) = obj.get("err_code").and_then(|c| c.as_i64()) {
        if code != 0 {
            let msg = obj
                .get("err_msg")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown error");
            return Some(format!("err_code {}: {}", code, msg));
        }
    }

    obj.values().find_map(error_in_response)
}

fn parse_envelope(plain: &str, device_ip: &str) -> Result<Envelope, DeviceError> {
    let value: serde_json::Value =
        serde_json::from_str(plain).map_err(|e| DeviceError::InvalidResponse {
            ip: device_ip.to_string(),
            message: format!("Failed to parse JSON: {}", e),
        })?;

    if let Some(message) = error_in_response(&value) {
        return Err(DeviceError::CommandFailed {
            ip: device_ip.to_string(),
            message,
        });
    }

    serde_json::from_value(value).map_err(|e| DeviceError::InvalidResponse {
        ip: device_ip.to_string(),
        message: format!("Unexpected shape: {}", e),
    })
}

fn missing(device_ip: &str, what: &str) -> DeviceError {
    DeviceError::InvalidResponse {
        ip: device_ip.to_string(),
        message: format!("No {} in response", what),
    }
}

/// Check a direct response for device-reported errors.
pub fn check_response(plain: &str, device_ip: &str) -> Result<(), DeviceError> {
    parse_envelope(plain, device_ip).map(|_| ())
}

pub fn parse_sysinfo(plain: &str, device_ip: &str) -> Result<Sysinfo, DeviceError> {
    parse_envelope(plain, device_ip)?
        .system
        .and_then(|s| s.get_sysinfo)
        .ok_or_else(|| missing(device_ip, "sysinfo"))
}

pub fn parse_countdown_rules(
    plain: &str,
    device_ip: &str,
) -> Result<Vec<CountdownRule>, DeviceError> {
    parse_envelope(plain, device_ip)?
        .count_down
        .and_then(|c| c.get_rules)
        .map(|r| r.rule_list)
        .ok_or_else(|| missing(device_ip, "countdown rules"))
}

pub fn parse_dimmer_parameters(
    plain: &str,
    device_ip: &str,
) -> Result<DimmerParameters, DeviceError> {
    parse_envelope(plain, device_ip)?
        .dimmer
        .and_then(|d| d.get_dimmer_parameters)
        .ok_or_else(|| missing(device_ip, "dimmer parameters"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HS103: &str = r#"{"system":{"get_sysinfo":{"sw_ver":"1.0.5 Build 201201 Rel.101542","hw_ver":"2.1","model":"HS103(US)","deviceId":"80066B9C2C5D4E6F","oemId":"OEM","alias":"Porch","mac":"B0:A7:B9:00:11:22","rssi":-52,"relay_state":1,"on_time":120,"active_mode":"none","led_off":0,"err_code":0}}}"#;

    #[test]
    fn test_classify_sysinfo() {
        match classify(HS103.as_bytes()).unwrap() {
            Inbound::Sysinfo(info) => {
                assert_eq!(info.device_id, "80066B9C2C5D4E6F");
                assert_eq!(info.model, "HS103(US)");
                assert_eq!(info.alias, "Porch");
                assert_eq!(info.rssi, -52);
                assert!(info.relay_on());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_classify_acks() {
        let relay = br#"{"system":{"set_relay_state":{"err_code":0}}}"#;
        assert_eq!(classify(relay).unwrap(), Inbound::Ack { err_code: 0 });

        let dimmer = br#"{"smartlife.iot.dimmer":{"set_brightness":{"err_code":-3}}}"#;
        assert_eq!(classify(dimmer).unwrap(), Inbound::Ack { err_code: -3 });
    }

    #[test]
    fn test_classify_energy_milli_units() {
        let payload = br#"{"emeter":{"get_realtime":{"voltage_mv":121500,"current_ma":310,"power_mw":35200,"total_wh":812,"slot_id":2,"err_code":0}}}"#;
        match classify(payload).unwrap() {
            Inbound::Energy(realtime) => {
                assert_eq!(realtime.slot(), 2);
                let reading = realtime.reading();
                assert_eq!(reading.voltage_mv, 121_500);
                assert_eq!(reading.power_mw, 35_200);
                assert!((reading.watts() - 35.2).abs() < 1e-9);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_energy_float_units() {
        let payload = br#"{"emeter":{"get_realtime":{"voltage":120.25,"current":0.5,"power":60.1,"total":1.25,"err_code":0}}}"#;
        let Inbound::Energy(realtime) = classify(payload).unwrap() else {
            panic!("expected energy");
        };
        let reading = realtime.reading();
        assert_eq!(reading.voltage_mv, 120_250);
        assert_eq!(reading.current_ma, 500);
        assert_eq!(reading.power_mw, 60_100);
        assert_eq!(reading.total_wh, 1_250);
        assert_eq!(realtime.slot(), 0);
    }

    #[test]
    fn test_classify_unknown_and_malformed() {
        assert_eq!(
            classify(br#"{"cnCloud":{"get_info":{}}}"#).unwrap(),
            Inbound::Unknown
        );
        assert!(classify(b"{\"system\":{\"get_sys").is_err());
        assert!(classify(&[0xff, 0xfe, 0x00]).is_err());
        assert!(classify(br#"{"system":{"get_sysinfo":{"model":"HS103(US)"}}}"#).is_err());
    }

    #[test]
    fn test_classify_strip_children() {
        let payload = br#"{"system":{"get_sysinfo":{"model":"HS300(US)","deviceId":"ABCDEF","alias":"Strip","child_num":2,"children":[{"id":"00","state":1,"alias":"TV"},{"id":"01","state":0,"alias":"Lamp"}]}}}"#;
        let Inbound::Sysinfo(info) = classify(payload).unwrap() else {
            panic!("expected sysinfo");
        };
        assert_eq!(info.children.len(), 2);
        assert_eq!(info.children[1].alias, "Lamp");
        assert_eq!(info.children[0].state, 1);
    }

    #[test]
    fn test_error_in_response() {
        let value: serde_json::Value = serde_json::from_str(
            r#"{"count_down":{"add_rule":{"err_code":-10,"err_msg":"table is full"}}}"#,
        )
        .unwrap();
        assert_eq!(
            error_in_response(&value).as_deref(),
            Some("err_code -10: table is full")
        );

        let ok: serde_json::Value =
            serde_json::from_str(r#"{"count_down":{"add_rule":{"id":"A","err_code":0}}}"#).unwrap();
        assert!(error_in_response(&ok).is_none());
    }

    #[test]
    fn test_parse_countdown_rules() {
        let plain = r#"{"count_down":{"get_rules":{"rule_list":[{"id":"7C90","name":"t","enable":1,"delay":300,"act":0,"remain":287}],"err_code":0}}}"#;
        let rules = parse_countdown_rules(plain, "10.0.0.5").unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].remain, 287);
    }

    #[test]
    fn test_parse_sysinfo_missing() {
        let err = parse_sysinfo(r#"{"system":{}}"#, "10.0.0.5").unwrap_err();
        assert!(matches!(err, DeviceError::InvalidResponse { .. }));
    }

    #[test]
    fn test_parse_dimmer_parameters() {
        let plain = r#"{"smartlife.iot.dimmer":{"get_dimmer_parameters":{"fadeOnTime":500,"fadeOffTime":700,"gentleOnTime":3000,"gentleOffTime":10000,"rampRate":30,"minThreshold":23,"bulb_type":1,"err_code":0}}}"#;
        let params = parse_dimmer_parameters(plain, "10.0.0.9").unwrap();
        assert_eq!(params.fade_on_time, 500);
        assert_eq!(params.min_threshold, 23);
    }
}

//! Command string builders for the Kasa local protocol.
//!
//! Every string here is plaintext JSON; pass it through
//! [`obfuscate`](super::codec::obfuscate) (datagram) or
//! [`encode_frame`](super::codec::encode_frame) (direct) before sending.

/// Name attached to countdown rules we create.
pub const COUNTDOWN_RULE_NAME: &str = "added from kasa-link";

/// Plaintext acknowledgments that need no further handling.
pub const FIRE_AND_FORGET_ACKS: &[&str] = &[
    r#"{"system":{"set_relay_state":{"err_code":0}}}"#,
    r#"{"smartlife.iot.dimmer":{"set_brightness":{"err_code":0}}}"#,
];

/// Check if a decoded payload is a known fire-and-forget acknowledgment
pub fn is_ack(payload: &str) -> bool {
    FIRE_AND_FORGET_ACKS.iter().any(|ack| *ack == payload)
}

/// Full identifier of a child outlet: parent device id followed by the child id.
pub fn child_address(parent_id: &str, child_id: &str) -> String {
    format!("{}{}", parent_id, child_id)
}

fn quoted(s: &str) -> String {
    // serde_json's string encoder always succeeds for &str
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

/// Command builders for device protocol
pub struct Commands;

impl Commands {
    // ==================== Discovery / info ====================

    /// Sysinfo query; doubles as the broadcast discovery probe
    pub fn get_sysinfo() -> &'static str {
        r#"{"system":{"get_sysinfo":{}}}"#
    }

    // ==================== Relay / dimmer ====================

    /// Switch the relay on (1) or off (0)
    pub fn set_relay_state(on: bool) -> String {
        format!(
            r#"{{"system":{{"set_relay_state":{{"state":{}}}}}}}"#,
            u8::from(on)
        )
    }

    /// Switch one outlet of a multi-outlet strip
    pub fn set_child_relay_state(parent_id: &str, child_id: &str, on: bool) -> String {
        format!(
            r#"{{"context":{{"child_ids":[{}]}},"system":{{"set_relay_state":{{"state":{}}}}}}}"#,
            quoted(&child_address(parent_id, child_id)),
            u8::from(on)
        )
    }

    /// Set dimmer brightness. The value is not validated; callers clamp to 0-100.
    pub fn set_brightness(brightness: u8) -> String {
        format!(
            r#"{{"smartlife.iot.dimmer":{{"set_brightness":{{"brightness":{}}}}}}}"#,
            brightness
        )
    }

    /// Read fade/ramp parameters of a dimmer
    pub fn get_dimmer_parameters() -> &'static str {
        r#"{"smartlife.iot.dimmer":{"get_dimmer_parameters":{}}}"#
    }

    // ==================== Energy meter ====================

    /// Realtime energy reading
    pub fn get_emeter_realtime() -> &'static str {
        r#"{"emeter":{"get_realtime":{}}}"#
    }

    /// Realtime energy reading of one child outlet
    pub fn get_child_emeter_realtime(parent_id: &str, child_id: &str) -> String {
        format!(
            r#"{{"context":{{"child_ids":[{}]}},"emeter":{{"get_realtime":{{}}}}}}"#,
            quoted(&child_address(parent_id, child_id))
        )
    }

    // ==================== Countdown rules ====================

    /// List countdown rules
    pub fn get_countdown_rules() -> &'static str {
        r#"{"count_down":{"get_rules":{}}}"#
    }

    /// Remove every countdown rule
    pub fn clear_countdown_rules() -> &'static str {
        r#"{"count_down":{"delete_all_rules":{}}}"#
    }

    /// Add an enabled countdown rule that drives the relay to `target` after `delay_secs`
    pub fn add_countdown_rule(delay_secs: u32, target: bool, name: &str) -> String {
        format!(
            r#"{{"count_down":{{"add_rule":{{"enable":1,"delay":{},"act":{},"name":{}}}}}}}"#,
            delay_secs,
            u8::from(target),
            quoted(name)
        )
    }

    // ==================== System ====================

    /// Rename the device
    pub fn set_alias(alias: &str) -> String {
        format!(
            r#"{{"system":{{"set_dev_alias":{{"alias":{}}}}}}}"#,
            quoted(alias)
        )
    }
}

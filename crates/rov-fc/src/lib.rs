pub mod cancel;
pub mod control;
pub mod error;
pub mod link;
pub mod mav;
pub mod modes;
pub mod session;
pub mod state;
mod wire;

#[cfg(test)]
mod mock;

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

pub use error::FcError;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FcConfig {
    /// `<scheme>:<host>:<port>` (udpin, udpout, udpbcast, tcpin, tcpout) or
    /// `serial:<device>:<baud>`.
    pub endpoint: String,

    /// MAVLink ids we use (ground side)
    pub sys_id: u8,
    pub comp_id: u8,

    /// Unset: wait for the first heartbeat forever.
    pub heartbeat_timeout_ms: Option<u64>,

    /// Upper bound on waiting for a COMMAND_ACK after a mode change.
    pub ack_timeout_ms: u64,

    /// Upper bound on waiting for armed/disarmed to show up in heartbeats.
    pub arm_timeout_ms: u64,

    /// Receive slice; cancellation is checked between slices.
    pub poll_interval_ms: u64,

    /// Replaces the built-in mode table for the detected vehicle.
    pub modes: Option<BTreeMap<String, u32>>,
}

impl Default for FcConfig {
    fn default() -> Self {
        Self {
            endpoint: "udpin:0.0.0.0:14550".into(),
            sys_id: 255,
            comp_id: 190, // MAV_COMP_ID_MISSIONPLANNER
            heartbeat_timeout_ms: None,
            ack_timeout_ms: 3000,
            arm_timeout_ms: 5000,
            poll_interval_ms: 100,
            modes: None,
        }
    }
}

impl FcConfig {
    pub fn heartbeat_timeout(&self) -> Option<Duration> {
        self.heartbeat_timeout_ms.map(Duration::from_millis)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn arm_timeout(&self) -> Duration {
        Duration::from_millis(self.arm_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: FcConfig = toml::from_str(
            r#"
            endpoint = "udpout:192.168.2.1:14550"
            ack_timeout_ms = 500
            "#,
        )
        .unwrap();
        assert_eq!(cfg.endpoint, "udpout:192.168.2.1:14550");
        assert_eq!(cfg.ack_timeout(), Duration::from_millis(500));
        assert_eq!(cfg.sys_id, 255);
        assert_eq!(cfg.heartbeat_timeout(), None);
        assert_eq!(cfg.arm_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn mode_override_table() {
        let cfg: FcConfig = toml::from_str(
            r#"
            [modes]
            STABILIZE = 0
            DEPTH_HOLD = 2
            "#,
        )
        .unwrap();
        let modes = cfg.modes.unwrap();
        assert_eq!(modes.get("DEPTH_HOLD"), Some(&2));
    }

    #[test]
    fn poll_interval_never_zero() {
        let cfg = FcConfig { poll_interval_ms: 0, ..FcConfig::default() };
        assert_eq!(cfg.poll_interval(), Duration::from_millis(1));
    }
}

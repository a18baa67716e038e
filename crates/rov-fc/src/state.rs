use std::time::{Duration, Instant};

use crate::link::{BatteryStatus, VehicleKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    /// Link open, no heartbeat yet.
    Connected,
    /// Heartbeat seen, target ids known.
    Ready,
}

#[derive(Debug, Clone, Default)]
pub struct VehicleStatus {
    pub connected: bool,
    pub armed: bool,
    pub mode: Option<String>,
    pub custom_mode: Option<u32>,
    pub kind: Option<VehicleKind>,
    pub system_id: Option<u8>,
    pub component_id: Option<u8>,
    pub battery: BatteryStatus,
    pub heading_deg: Option<f32>,
    pub last_heartbeat: Option<Instant>,
}

impl VehicleStatus {
    pub fn hb_age(&self) -> Option<Duration> {
        self.last_heartbeat.map(|t| t.elapsed())
    }
}

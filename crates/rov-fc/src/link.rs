use std::fmt;
use std::time::Duration;

use crate::control::{ChannelOverride, ManualInput};
use crate::FcError;

/// MAV_MODE_FLAG_CUSTOM_MODE_ENABLED
pub const MODE_FLAG_CUSTOM_MODE_ENABLED: u8 = 1;

/// Commands the session issues through COMMAND_LONG.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleCommand {
    ArmDisarm,
    SetMode,
}

impl VehicleCommand {
    /// MAV_CMD id, matched against COMMAND_ACK.command.
    pub fn id(self) -> u16 {
        match self {
            VehicleCommand::ArmDisarm => 400,
            VehicleCommand::SetMode => 176,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            VehicleCommand::ArmDisarm => "arm/disarm",
            VehicleCommand::SetMode => "set mode",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommandLong {
    pub command: VehicleCommand,
    pub params: [f32; 7],
}

impl CommandLong {
    pub fn arm_disarm(arm: bool) -> Self {
        let mut params = [0.0; 7];
        params[0] = if arm { 1.0 } else { 0.0 };
        Self { command: VehicleCommand::ArmDisarm, params }
    }

    /// DO_SET_MODE: param1 = mode flags, param2 = custom mode id.
    pub fn set_mode(mode_flags: u8, mode_id: u32) -> Self {
        let mut params = [0.0; 7];
        params[0] = mode_flags as f32;
        params[1] = mode_id as f32;
        Self { command: VehicleCommand::SetMode, params }
    }
}

/// MAV_RESULT as reported in COMMAND_ACK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckResult {
    Accepted,
    TemporarilyRejected,
    Denied,
    Unsupported,
    Failed,
    InProgress,
    Cancelled,
    Other(u8),
}

impl AckResult {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => AckResult::Accepted,
            1 => AckResult::TemporarilyRejected,
            2 => AckResult::Denied,
            3 => AckResult::Unsupported,
            4 => AckResult::Failed,
            5 => AckResult::InProgress,
            6 => AckResult::Cancelled,
            n => AckResult::Other(n),
        }
    }

    pub fn is_accepted(self) -> bool {
        self == AckResult::Accepted
    }
}

impl fmt::Display for AckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AckResult::Accepted => f.write_str("accepted"),
            AckResult::TemporarilyRejected => f.write_str("temporarily rejected"),
            AckResult::Denied => f.write_str("denied"),
            AckResult::Unsupported => f.write_str("unsupported"),
            AckResult::Failed => f.write_str("failed"),
            AckResult::InProgress => f.write_str("in progress"),
            AckResult::Cancelled => f.write_str("cancelled"),
            AckResult::Other(n) => write!(f, "result {}", n),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandAck {
    pub command: u16,
    pub result: AckResult,
}

/// Firmware family, derived from HEARTBEAT.type. Selects the mode table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleKind {
    Sub,
    Copter,
    Rover,
    Other(u32),
}

impl VehicleKind {
    pub fn from_mav_type(mav_type: u32) -> Self {
        match mav_type {
            12 => VehicleKind::Sub,
            // quad, coaxial, heli, hexa, octo, tri, dodeca, deca
            2 | 3 | 4 | 13 | 14 | 15 | 29 | 35 => VehicleKind::Copter,
            // ground rover, surface boat
            10 | 11 => VehicleKind::Rover,
            n => VehicleKind::Other(n),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heartbeat {
    pub system_id: u8,
    pub component_id: u8,
    pub kind: VehicleKind,
    pub armed: bool,
    pub custom_mode: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatteryStatus {
    pub voltage: Option<f32>,      // Volts
    pub current: Option<f32>,      // Amps
    pub remaining: Option<u8>,     // Percent 0-100
}

#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Heartbeat(Heartbeat),
    Ack(CommandAck),
    Battery(BatteryStatus),
    /// Degrees, 0..360
    Heading(f32),
}

/// The narrow surface the session needs from a MAVLink transport.
///
/// `recv` returns `Ok(None)` when nothing arrived within `timeout`; a fatal
/// transport failure is `Err(FcError::Transport)`.
pub trait VehicleLink {
    fn recv(&mut self, timeout: Duration) -> Result<Option<LinkEvent>, FcError>;

    fn send_command(&mut self, cmd: CommandLong) -> Result<(), FcError>;

    fn send_mode(&mut self, mode_flags: u8, mode_id: u32) -> Result<(), FcError>;

    fn send_manual_control(&mut self, input: ManualInput) -> Result<(), FcError>;

    fn send_channel_override(&mut self, channels: &ChannelOverride) -> Result<(), FcError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_codes_follow_mav_result() {
        assert_eq!(AckResult::from_code(0), AckResult::Accepted);
        assert_eq!(AckResult::from_code(2), AckResult::Denied);
        assert_eq!(AckResult::from_code(4), AckResult::Failed);
        assert_eq!(AckResult::from_code(42), AckResult::Other(42));
        assert!(!AckResult::InProgress.is_accepted());
    }

    #[test]
    fn vehicle_kind_from_type() {
        assert_eq!(VehicleKind::from_mav_type(12), VehicleKind::Sub);
        assert_eq!(VehicleKind::from_mav_type(2), VehicleKind::Copter);
        assert_eq!(VehicleKind::from_mav_type(10), VehicleKind::Rover);
        assert_eq!(VehicleKind::from_mav_type(6), VehicleKind::Other(6));
    }

    #[test]
    fn arm_command_params() {
        assert_eq!(CommandLong::arm_disarm(true).params[0], 1.0);
        assert_eq!(CommandLong::arm_disarm(false).params[0], 0.0);
        assert_eq!(CommandLong::arm_disarm(true).command.id(), 400);
    }

    #[test]
    fn set_mode_puts_flags_before_mode_id() {
        let cmd = CommandLong::set_mode(MODE_FLAG_CUSTOM_MODE_ENABLED, 19);
        assert_eq!(cmd.command.id(), 176);
        assert_eq!(&cmd.params[..3], &[1.0, 19.0, 0.0]);
    }
}

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use mavlink::{
    common::{
        MavCmd, MavMessage, COMMAND_LONG_DATA, MANUAL_CONTROL_DATA, RC_CHANNELS_OVERRIDE_DATA,
        SYS_STATUS_DATA,
    },
    MavHeader,
};
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::control::{ChannelOverride, ManualInput};
use crate::link::{
    AckResult, BatteryStatus, CommandAck, CommandLong, Heartbeat, LinkEvent, VehicleCommand,
    VehicleKind, VehicleLink,
};
use crate::wire::{self, Frame, Wire, WireWriter};
use crate::FcError;

const MAV_TYPE_GCS: u32 = 6;
const MAV_AUTOPILOT_INVALID: u32 = 8;
const MAV_MODE_FLAG_SAFETY_ARMED: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetScheme {
    UdpIn,
    UdpOut,
    UdpBcast,
    TcpIn,
    TcpOut,
}

impl NetScheme {
    fn as_str(self) -> &'static str {
        match self {
            NetScheme::UdpIn => "udpin",
            NetScheme::UdpOut => "udpout",
            NetScheme::UdpBcast => "udpbcast",
            NetScheme::TcpIn => "tcpin",
            NetScheme::TcpOut => "tcpout",
        }
    }
}

/// Parsed `<scheme>:<host>:<port>` or `serial:<device>:<baud>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Net { scheme: NetScheme, host: String, port: u16 },
    Serial { dev: String, baud: u32 },
}

impl FromStr for Endpoint {
    type Err = FcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = |reason: &str| FcError::Connection { endpoint: s.to_string(), reason: reason.to_string() };

        let (scheme, rest) = s.split_once(':').ok_or_else(|| bad("expected <scheme>:<host>:<port>"))?;
        let (addr, last) = rest.rsplit_once(':').ok_or_else(|| bad("missing port/baud"))?;
        if addr.is_empty() {
            return Err(bad("empty host/device"));
        }

        let scheme = match scheme {
            "serial" => {
                let baud: u32 = last.parse().map_err(|_| bad("baud is not a number"))?;
                if baud == 0 {
                    return Err(bad("baud must be > 0"));
                }
                return Ok(Endpoint::Serial { dev: addr.to_string(), baud });
            }
            "udpin" => NetScheme::UdpIn,
            "udpout" => NetScheme::UdpOut,
            "udpbcast" => NetScheme::UdpBcast,
            "tcpin" => NetScheme::TcpIn,
            "tcpout" => NetScheme::TcpOut,
            _ => return Err(bad("unknown scheme")),
        };
        let port: u16 = last.parse().map_err(|_| bad("port is not a number"))?;
        Ok(Endpoint::Net { scheme, host: addr.to_string(), port })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Net { scheme, host, port } => write!(f, "{}:{}:{}", scheme.as_str(), host, port),
            Endpoint::Serial { dev, baud } => write!(f, "serial:{}:{}", dev, baud),
        }
    }
}

type Received = Result<Frame, String>;

/// Link to one vehicle over a [`Wire`].
///
/// A reader thread decodes frames into a channel and [`VehicleLink::recv`]
/// waits on that with a timeout. Dropping the link raises the stop flag and
/// joins the reader, so the socket or port is closed once `drop` returns.
pub struct MavLink {
    writer: WireWriter,
    rx: Receiver<Received>,
    stop: CancelToken,
    reader: Option<JoinHandle<()>>,
    local: Option<SocketAddr>,
    hdr: MavHeader,
    target: Option<(u8, u8)>,
}

impl MavLink {
    pub fn open(endpoint: &Endpoint, sys_id: u8, comp_id: u8) -> Result<Self, FcError> {
        let conn_err = |reason: String| FcError::Connection { endpoint: endpoint.to_string(), reason };

        let Wire { mut reader, writer, local } = wire::open(endpoint).map_err(|e| conn_err(e.to_string()))?;
        info!("link: opened {}", endpoint);

        let (tx, rx) = mpsc::channel::<Received>();
        let stop = CancelToken::new();
        let stopped = stop.clone();
        let handle = thread::Builder::new()
            .name("mav-rx".into())
            .spawn(move || {
                let mut frames = Vec::new();
                while !stopped.is_cancelled() {
                    if let Err(e) = reader.read_frames(&mut frames) {
                        let _ = tx.send(Err(e.to_string()));
                        return;
                    }
                    for frame in frames.drain(..) {
                        if tx.send(Ok(frame)).is_err() {
                            return;
                        }
                    }
                }
            })
            .map_err(|e| conn_err(format!("spawn reader: {}", e)))?;

        Ok(Self {
            writer,
            rx,
            stop,
            reader: Some(handle),
            local,
            hdr: MavHeader { system_id: sys_id, component_id: comp_id, sequence: 0 },
            target: None,
        })
    }

    /// Vehicle system/component id, once a heartbeat has been seen.
    pub fn target(&self) -> Option<(u8, u8)> {
        self.target
    }

    /// Bound address of a network endpoint.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local
    }

    fn target_or_refuse(&self) -> Result<(u8, u8), FcError> {
        self.target.ok_or(FcError::NoHeartbeat)
    }

    fn send(&mut self, msg: MavMessage) -> Result<(), FcError> {
        self.hdr.sequence = self.hdr.sequence.wrapping_add(1);
        self.writer
            .write_frame(self.hdr, &msg)
            .map_err(|e| FcError::Transport(format!("mavlink send: {}", e)))
    }
}

impl Drop for MavLink {
    fn drop(&mut self) {
        self.stop.cancel();
        if let Some(handle) = self.reader.take() {
            if handle.join().is_err() {
                warn!("link: reader thread panicked");
            }
        }
        debug!("link: closed");
    }
}

/// Turn a decoded frame into a session event.
///
/// `target` starts empty and locks onto the first heartbeat that is neither
/// from a GCS nor from a component without an autopilot. After that only
/// frames from that system/component pair get through.
pub(crate) fn classify(target: &mut Option<(u8, u8)>, hdr: &MavHeader, msg: &MavMessage) -> Option<LinkEvent> {
    let from_target = *target == Some((hdr.system_id, hdr.component_id));

    match msg {
        MavMessage::HEARTBEAT(hb) => {
            let mav_type = hb.mavtype as u32;
            if mav_type == MAV_TYPE_GCS || hb.autopilot as u32 == MAV_AUTOPILOT_INVALID {
                return None;
            }
            if target.is_none() {
                info!("link: vehicle sys={} comp={} type={}", hdr.system_id, hdr.component_id, mav_type);
                *target = Some((hdr.system_id, hdr.component_id));
            } else if !from_target {
                return None;
            }
            Some(LinkEvent::Heartbeat(Heartbeat {
                system_id: hdr.system_id,
                component_id: hdr.component_id,
                kind: VehicleKind::from_mav_type(mav_type),
                armed: hb.base_mode.bits() & MAV_MODE_FLAG_SAFETY_ARMED != 0,
                custom_mode: hb.custom_mode,
            }))
        }
        MavMessage::COMMAND_ACK(ack) if from_target => Some(LinkEvent::Ack(CommandAck {
            command: ack.command as u32 as u16,
            result: AckResult::from_code(ack.result as u8),
        })),
        MavMessage::SYS_STATUS(status) if from_target => Some(LinkEvent::Battery(battery_from(status))),
        MavMessage::VFR_HUD(hud) if from_target => Some(LinkEvent::Heading(hud.heading as f32)),
        _ => None,
    }
}

fn battery_from(status: &SYS_STATUS_DATA) -> BatteryStatus {
    let mut battery = BatteryStatus::default();
    // voltage_battery is in millivolts, convert to volts
    if status.voltage_battery != u16::MAX {
        battery.voltage = Some(status.voltage_battery as f32 / 1000.0);
    }
    // current_battery is in centiamps (0.01A), -1 means invalid
    if status.current_battery != -1 {
        battery.current = Some(status.current_battery as f32 / 100.0);
    }
    if status.battery_remaining >= 0 && status.battery_remaining <= 100 {
        battery.remaining = Some(status.battery_remaining as u8);
    }
    battery
}

fn mav_cmd(cmd: VehicleCommand) -> MavCmd {
    match cmd {
        VehicleCommand::ArmDisarm => MavCmd::MAV_CMD_COMPONENT_ARM_DISARM,
        VehicleCommand::SetMode => MavCmd::MAV_CMD_DO_SET_MODE,
    }
}

pub(crate) fn command_long_msg((target_system, target_component): (u8, u8), cmd: &CommandLong) -> MavMessage {
    let [param1, param2, param3, param4, param5, param6, param7] = cmd.params;
    MavMessage::COMMAND_LONG(COMMAND_LONG_DATA {
        target_system,
        target_component,
        command: mav_cmd(cmd.command),
        confirmation: 0,
        param1,
        param2,
        param3,
        param4,
        param5,
        param6,
        param7,
    })
}

pub(crate) fn manual_control_msg(target: u8, input: ManualInput) -> MavMessage {
    MavMessage::MANUAL_CONTROL(MANUAL_CONTROL_DATA {
        target,
        x: input.x,
        y: input.y,
        z: input.z,
        r: input.r,
        buttons: input.buttons,
        ..Default::default()
    })
}

/// All 18 channels go out; chan9..chan18 are MAVLink 2 extension fields.
pub(crate) fn channel_override_msg((target_system, target_component): (u8, u8), channels: &ChannelOverride) -> MavMessage {
    let c = channels.values();
    MavMessage::RC_CHANNELS_OVERRIDE(RC_CHANNELS_OVERRIDE_DATA {
        target_system,
        target_component,
        chan1_raw: c[0],
        chan2_raw: c[1],
        chan3_raw: c[2],
        chan4_raw: c[3],
        chan5_raw: c[4],
        chan6_raw: c[5],
        chan7_raw: c[6],
        chan8_raw: c[7],
        chan9_raw: c[8],
        chan10_raw: c[9],
        chan11_raw: c[10],
        chan12_raw: c[11],
        chan13_raw: c[12],
        chan14_raw: c[13],
        chan15_raw: c[14],
        chan16_raw: c[15],
        chan17_raw: c[16],
        chan18_raw: c[17],
    })
}

impl VehicleLink for MavLink {
    fn recv(&mut self, timeout: Duration) -> Result<Option<LinkEvent>, FcError> {
        let deadline = Instant::now() + timeout;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(left) {
                Ok(Ok((hdr, msg))) => {
                    if let Some(ev) = classify(&mut self.target, &hdr, &msg) {
                        return Ok(Some(ev));
                    }
                }
                Ok(Err(e)) => {
                    warn!("link: read failed: {}", e);
                    return Err(FcError::Transport(e));
                }
                Err(RecvTimeoutError::Timeout) => return Ok(None),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(FcError::Transport("link reader stopped".into()))
                }
            }
        }
    }

    fn send_command(&mut self, cmd: CommandLong) -> Result<(), FcError> {
        let target = self.target_or_refuse()?;
        debug!("link: COMMAND_LONG {:?} {:?}", cmd.command, cmd.params);
        self.send(command_long_msg(target, &cmd))
    }

    fn send_mode(&mut self, mode_flags: u8, mode_id: u32) -> Result<(), FcError> {
        self.send_command(CommandLong::set_mode(mode_flags, mode_id))
    }

    fn send_manual_control(&mut self, input: ManualInput) -> Result<(), FcError> {
        let (target, _) = self.target_or_refuse()?;
        self.send(manual_control_msg(target, input))
    }

    fn send_channel_override(&mut self, channels: &ChannelOverride) -> Result<(), FcError> {
        let target = self.target_or_refuse()?;
        self.send(channel_override_msg(target, channels))
    }
}

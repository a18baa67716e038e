//! Vehicle command session.
//!
//! A [`Session`] owns one link and runs operations one at a time. Every wait
//! is sliced into `poll_interval` receives so the [`CancelToken`] is seen
//! between them; all waits except the initial heartbeat (unless configured)
//! are bounded.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::control::{ChannelOverride, ManualInput};
use crate::link::{
    AckResult, CommandAck, CommandLong, Heartbeat, LinkEvent, VehicleCommand, VehicleLink,
    MODE_FLAG_CUSTOM_MODE_ENABLED,
};
use crate::mav::{Endpoint, MavLink};
use crate::modes::ModeTable;
use crate::state::{SessionState, VehicleStatus};
use crate::{FcConfig, FcError};

pub struct Session<L: VehicleLink> {
    link: L,
    cfg: FcConfig,
    state: SessionState,
    status: VehicleStatus,
    modes: ModeTable,
    cancel: CancelToken,
}

impl Session<MavLink> {
    /// Open the configured endpoint and block until the vehicle's first heartbeat.
    pub fn connect(cfg: &FcConfig, cancel: CancelToken) -> Result<Self, FcError> {
        let endpoint: Endpoint = cfg.endpoint.parse()?;
        let link = MavLink::open(&endpoint, cfg.sys_id, cfg.comp_id)?;
        let mut session = Session::new(link, cfg.clone()).with_cancel(cancel);
        session.wait_heartbeat()?;
        Ok(session)
    }
}

impl<L: VehicleLink> Session<L> {
    /// Wrap an already open link. The session starts `Connected`.
    pub fn new(link: L, cfg: FcConfig) -> Self {
        let modes = cfg.modes.as_ref().map(ModeTable::from_map).unwrap_or_default();
        Self {
            link,
            cfg,
            state: SessionState::Connected,
            status: VehicleStatus::default(),
            modes,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn status(&self) -> &VehicleStatus {
        &self.status
    }

    pub fn mode_table(&self) -> &ModeTable {
        &self.modes
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    /// Blocks until a vehicle heartbeat arrives. Without
    /// `heartbeat_timeout_ms` this waits forever; only cancellation ends it.
    pub fn wait_heartbeat(&mut self) -> Result<Heartbeat, FcError> {
        let limit = self.cfg.heartbeat_timeout();
        let start = Instant::now();
        info!("session: waiting for heartbeat");

        loop {
            let slice = match limit {
                Some(limit) => {
                    let left = limit.saturating_sub(start.elapsed());
                    if left.is_zero() {
                        return Err(FcError::HeartbeatTimeout { waited: limit });
                    }
                    left.min(self.cfg.poll_interval())
                }
                None => self.cfg.poll_interval(),
            };
            if let Some(LinkEvent::Heartbeat(hb)) = self.next_event(slice)? {
                return Ok(hb);
            }
        }
    }

    pub fn arm(&mut self) -> Result<(), FcError> {
        self.set_armed(true)
    }

    pub fn disarm(&mut self) -> Result<(), FcError> {
        self.set_armed(false)
    }

    fn set_armed(&mut self, arm: bool) -> Result<(), FcError> {
        self.require_ready()?;
        info!("session: sending {}", if arm { "ARM" } else { "DISARM" });
        self.link.send_command(CommandLong::arm_disarm(arm))?;
        self.wait_armed(arm)
    }

    /// Polls heartbeats until the vehicle reports `armed`. A negative
    /// COMMAND_ACK for arm/disarm ends the wait early.
    pub fn wait_armed(&mut self, armed: bool) -> Result<(), FcError> {
        let limit = self.cfg.arm_timeout();
        let deadline = Instant::now() + limit;

        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                warn!("session: no {} confirmation within {:?}", if armed { "arm" } else { "disarm" }, limit);
                return Err(FcError::arm_refused(armed, format!("no confirmation within {:?}", limit)));
            }
            match self.next_event(left.min(self.cfg.poll_interval()))? {
                Some(LinkEvent::Heartbeat(hb)) if hb.armed == armed => {
                    info!("session: vehicle {}", if armed { "armed" } else { "disarmed" });
                    return Ok(());
                }
                Some(LinkEvent::Ack(ack)) if ack.command == VehicleCommand::ArmDisarm.id() => {
                    if !matches!(ack.result, AckResult::Accepted | AckResult::InProgress) {
                        warn!("session: arm/disarm {}", ack.result);
                        return Err(FcError::arm_ack(armed, ack.result));
                    }
                }
                _ => {}
            }
        }
    }

    /// Request `mode_name` and return the vehicle's verdict. Only the
    /// unknown-name case fails before anything is sent.
    pub fn set_mode(&mut self, mode_name: &str) -> Result<AckResult, FcError> {
        self.require_ready()?;
        let mode_id = self.modes.lookup(mode_name)?;

        info!("session: set mode {} ({})", mode_name, mode_id);
        self.link.send_mode(MODE_FLAG_CUSTOM_MODE_ENABLED, mode_id)?;
        let ack = self.recv_ack(VehicleCommand::SetMode)?;

        if ack.result.is_accepted() {
            self.status.custom_mode = Some(mode_id);
            self.status.mode = Some(mode_name.trim().to_ascii_uppercase());
        } else {
            warn!("session: mode {} {}", mode_name, ack.result);
        }
        Ok(ack.result)
    }

    /// Next final acknowledgment for `command`. Acks for other commands and
    /// in-progress acks are discarded.
    pub fn recv_ack(&mut self, command: VehicleCommand) -> Result<CommandAck, FcError> {
        let limit = self.cfg.ack_timeout();
        let deadline = Instant::now() + limit;

        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                warn!("session: {} ack timed out after {:?}", command.label(), limit);
                return Err(FcError::AckTimeout { command: command.label(), waited: limit });
            }
            if let Some(LinkEvent::Ack(ack)) = self.next_event(left.min(self.cfg.poll_interval()))? {
                if ack.command != command.id() {
                    debug!("session: ignoring ack for command {}", ack.command);
                    continue;
                }
                if ack.result == AckResult::InProgress {
                    continue;
                }
                return Ok(ack);
            }
        }
    }

    /// Fire-and-forget MANUAL_CONTROL. x, y, r in [-1000, 1000]; z in [0, 1000].
    pub fn manual_control(&mut self, x: i32, y: i32, z: i32, r: i32, buttons: u16) -> Result<(), FcError> {
        let input = ManualInput::new(x, y, z, r, buttons)?;
        self.send_manual(input)
    }

    pub fn send_manual(&mut self, input: ManualInput) -> Result<(), FcError> {
        self.require_ready()?;
        debug!("session: manual {:?}", input);
        self.link.send_manual_control(input)
    }

    /// Repeat `input` every `period` for `duration`, draining telemetry in
    /// between. Returns the number of frames sent.
    pub fn hold_manual(&mut self, input: ManualInput, period: Duration, duration: Duration) -> Result<u32, FcError> {
        self.require_ready()?;
        let end = Instant::now() + duration;
        let mut sent = 0;

        loop {
            self.send_manual(input)?;
            sent += 1;
            let next = Instant::now() + period;
            if next >= end {
                break;
            }
            self.drain_until(next)?;
        }
        info!("session: manual stream done, {} frames", sent);
        Ok(sent)
    }

    /// Override one RC channel (1..=18). The other 17 channels are sent as
    /// [`NO_OVERRIDE`](crate::control::NO_OVERRIDE) and are not overridden by this frame.
    pub fn set_channel_pwm(&mut self, channel_id: i32, pwm: u16) -> Result<(), FcError> {
        let frame = ChannelOverride::single(channel_id, pwm)?;
        info!("session: channel {} -> {}", channel_id, pwm);
        self.override_channels(&frame)
    }

    pub fn override_channels(&mut self, frame: &ChannelOverride) -> Result<(), FcError> {
        self.require_ready()?;
        self.link.send_channel_override(frame)
    }

    /// Receive telemetry for `duration`, keeping [`Session::status`] current.
    pub fn pump(&mut self, duration: Duration) -> Result<(), FcError> {
        self.drain_until(Instant::now() + duration)
    }

    /// End the session and drop the link. For [`MavLink`] that stops the
    /// reader thread and releases the socket or serial port before returning.
    pub fn close(self) {
        let Session { link, state, .. } = self;
        debug!("session: closing from {:?}", state);
        drop(link);
        info!("session: closed");
    }

    fn drain_until(&mut self, until: Instant) -> Result<(), FcError> {
        loop {
            let left = until.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return Ok(());
            }
            self.next_event(left.min(self.cfg.poll_interval()))?;
        }
    }

    fn require_ready(&self) -> Result<(), FcError> {
        match self.state {
            SessionState::Ready => Ok(()),
            SessionState::Connected => Err(FcError::NoHeartbeat),
            SessionState::Disconnected => Err(FcError::Transport("session closed".into())),
        }
    }

    fn next_event(&mut self, timeout: Duration) -> Result<Option<LinkEvent>, FcError> {
        if self.cancel.is_cancelled() {
            return Err(FcError::Cancelled);
        }
        match self.link.recv(timeout) {
            Ok(Some(ev)) => {
                self.observe(&ev);
                Ok(Some(ev))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                self.state = SessionState::Disconnected;
                self.status.connected = false;
                Err(e)
            }
        }
    }

    fn observe(&mut self, ev: &LinkEvent) {
        match ev {
            LinkEvent::Heartbeat(hb) => {
                if self.state == SessionState::Connected {
                    if self.cfg.modes.is_none() {
                        self.modes = ModeTable::for_vehicle(hb.kind);
                    }
                    self.state = SessionState::Ready;
                    info!(
                        "session: ready, vehicle sys={} comp={} kind={:?}",
                        hb.system_id, hb.component_id, hb.kind
                    );
                }
                let st = &mut self.status;
                st.connected = true;
                st.armed = hb.armed;
                st.kind = Some(hb.kind);
                st.system_id = Some(hb.system_id);
                st.component_id = Some(hb.component_id);
                st.custom_mode = Some(hb.custom_mode);
                st.mode = self.modes.name_of(hb.custom_mode).map(str::to_string);
                st.last_heartbeat = Some(Instant::now());
            }
            LinkEvent::Battery(b) => self.status.battery = b.clone(),
            LinkEvent::Heading(h) => self.status.heading_deg = Some(*h),
            LinkEvent::Ack(_) => {}
        }
    }
}

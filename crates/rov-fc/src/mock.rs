//! Scripted vehicle for session tests.

use std::collections::VecDeque;
use std::time::Duration;

use crate::control::{ChannelOverride, ManualInput};
use crate::link::{AckResult, CommandAck, CommandLong, Heartbeat, LinkEvent, VehicleKind, VehicleLink};
use crate::FcError;

#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Command(CommandLong),
    Mode { flags: u8, mode_id: u32 },
    Manual(ManualInput),
    Override(ChannelOverride),
}

type Responder = Box<dyn FnMut(&Sent) -> Vec<LinkEvent>>;

pub struct MockLink {
    pub inbox: VecDeque<LinkEvent>,
    pub sent: Vec<Sent>,
    pub fail_recv: Option<String>,
    responder: Responder,
}

impl MockLink {
    pub fn new() -> Self {
        Self::with_responder(|_| Vec::new())
    }

    /// `f` sees every outgoing frame; what it returns is queued for `recv`.
    pub fn with_responder(f: impl FnMut(&Sent) -> Vec<LinkEvent> + 'static) -> Self {
        Self { inbox: VecDeque::new(), sent: Vec::new(), fail_recv: None, responder: Box::new(f) }
    }

    pub fn push(&mut self, ev: LinkEvent) {
        self.inbox.push_back(ev);
    }

    fn record(&mut self, sent: Sent) {
        let replies = (self.responder)(&sent);
        self.inbox.extend(replies);
        self.sent.push(sent);
    }
}

impl VehicleLink for MockLink {
    fn recv(&mut self, timeout: Duration) -> Result<Option<LinkEvent>, FcError> {
        if let Some(e) = &self.fail_recv {
            return Err(FcError::Transport(e.clone()));
        }
        match self.inbox.pop_front() {
            Some(ev) => Ok(Some(ev)),
            None => {
                std::thread::sleep(timeout.min(Duration::from_millis(5)));
                Ok(None)
            }
        }
    }

    fn send_command(&mut self, cmd: CommandLong) -> Result<(), FcError> {
        self.record(Sent::Command(cmd));
        Ok(())
    }

    fn send_mode(&mut self, mode_flags: u8, mode_id: u32) -> Result<(), FcError> {
        self.record(Sent::Mode { flags: mode_flags, mode_id });
        Ok(())
    }

    fn send_manual_control(&mut self, input: ManualInput) -> Result<(), FcError> {
        self.record(Sent::Manual(input));
        Ok(())
    }

    fn send_channel_override(&mut self, channels: &ChannelOverride) -> Result<(), FcError> {
        self.record(Sent::Override(channels.clone()));
        Ok(())
    }
}

/// ArduSub autopilot at sys 1 / comp 1.
pub fn heartbeat(armed: bool, custom_mode: u32) -> LinkEvent {
    LinkEvent::Heartbeat(Heartbeat {
        system_id: 1,
        component_id: 1,
        kind: VehicleKind::Sub,
        armed,
        custom_mode,
    })
}

pub fn ack(command: u16, result: AckResult) -> LinkEvent {
    LinkEvent::Ack(CommandAck { command, result })
}

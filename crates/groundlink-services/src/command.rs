//! High-level vehicle commands and advisory ack tracking.
//!
//! Every command goes out as a single COMMAND_LONG. Delivery is not
//! guaranteed, so the dispatcher only remembers which command ids are waiting
//! for a COMMAND_ACK and reports the ones that never got one.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use groundlink_core::mav::{copter_mode_number, MavCmd, MavResult, COPTER_MODE_RTL, MODE_FLAG_CUSTOM_MODE_ENABLED};
use groundlink_core::message::{CommandAck, CommandLong};
use groundlink_core::{Endpoint, Message};

use crate::error::LinkError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    Arm,
    Disarm,
    Takeoff { altitude: f32 },
    Land,
    ReturnToLaunch,
    SetMode { mode: u32 },
    StartMission,
}

impl Command {
    /// Parse a command name and optional argument.
    ///
    /// `takeoff` takes an altitude in metres (default `default_altitude`),
    /// `mode` takes a flight-mode name or number.
    pub fn parse(name: &str, arg: Option<&str>, default_altitude: f32) -> Result<Self, LinkError> {
        let name = name.trim().to_ascii_lowercase().replace('-', "_");
        let arg = arg.map(str::trim).filter(|a| !a.is_empty());
        match name.as_str() {
            "arm" => Ok(Command::Arm),
            "disarm" => Ok(Command::Disarm),
            "takeoff" => {
                let altitude = match arg {
                    None => default_altitude,
                    Some(a) => a
                        .parse::<f32>()
                        .ok()
                        .filter(|alt| alt.is_finite() && *alt > 0.0)
                        .ok_or_else(|| LinkError::InvalidArgument(format!("takeoff altitude {:?}", a)))?,
                };
                Ok(Command::Takeoff { altitude })
            }
            "land" => Ok(Command::Land),
            "rtl" | "return_to_launch" => Ok(Command::ReturnToLaunch),
            "mode" | "set_mode" => {
                let a = arg.ok_or_else(|| LinkError::InvalidArgument("mode requires a name or number".into()))?;
                let mode = copter_mode_number(a)
                    .ok_or_else(|| LinkError::InvalidArgument(format!("unknown flight mode {:?}", a)))?;
                Ok(Command::SetMode { mode })
            }
            "start_mission" | "mission_start" => Ok(Command::StartMission),
            _ => Err(LinkError::UnknownCommand(name)),
        }
    }

    pub fn mav_cmd(&self) -> MavCmd {
        match self {
            Command::Arm | Command::Disarm => MavCmd::ComponentArmDisarm,
            Command::Takeoff { .. } => MavCmd::NavTakeoff,
            Command::Land => MavCmd::NavLand,
            Command::ReturnToLaunch | Command::SetMode { .. } => MavCmd::DoSetMode,
            Command::StartMission => MavCmd::MissionStart,
        }
    }

    /// Encode as COMMAND_LONG. Confirmation is always 0.
    pub fn to_command_long(&self, target: Endpoint) -> CommandLong {
        let mut params = [0.0f32; 7];
        match *self {
            Command::Arm => params[0] = 1.0,
            Command::Disarm => params[0] = 0.0,
            Command::Takeoff { altitude } => params[6] = altitude,
            Command::Land | Command::StartMission => {}
            // Return-to-launch is a mode change, not NAV_RETURN_TO_LAUNCH.
            Command::ReturnToLaunch => {
                params[0] = MODE_FLAG_CUSTOM_MODE_ENABLED as f32;
                params[1] = COPTER_MODE_RTL as f32;
            }
            Command::SetMode { mode } => {
                params[0] = MODE_FLAG_CUSTOM_MODE_ENABLED as f32;
                params[1] = mode as f32;
            }
        }
        CommandLong {
            command: self.mav_cmd(),
            params,
            target,
            confirmation: 0,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Arm => f.write_str("arm"),
            Command::Disarm => f.write_str("disarm"),
            Command::Takeoff { altitude } => write!(f, "takeoff {}m", altitude),
            Command::Land => f.write_str("land"),
            Command::ReturnToLaunch => f.write_str("rtl"),
            Command::SetMode { mode } => write!(f, "mode {}", mode),
            Command::StartMission => f.write_str("start_mission"),
        }
    }
}

// ── Dispatcher ────────────────────────────────────────────────────────────────

/// What became of a COMMAND_ACK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckMatch {
    /// Resolved a pending command.
    Resolved,
    /// Vehicle is still working on it; the deadline was pushed out.
    InProgress,
    /// No pending command with that id.
    Unsolicited,
}

#[derive(Debug)]
pub struct CommandDispatcher {
    pending: HashMap<MavCmd, Instant>,
    ack_timeout: Duration,
}

impl CommandDispatcher {
    pub fn new(ack_timeout: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            ack_timeout,
        }
    }

    /// Build the outbound message and start the ack clock.
    pub fn prepare(&mut self, command: Command, target: Endpoint, now: Instant) -> Message {
        let long = command.to_command_long(target);
        self.pending.insert(long.command, now + self.ack_timeout);
        Message::CommandLong(long)
    }

    pub fn on_ack(&mut self, ack: &CommandAck, now: Instant) -> AckMatch {
        match self.pending.get_mut(&ack.command) {
            None => AckMatch::Unsolicited,
            Some(deadline) if ack.result == MavResult::InProgress => {
                *deadline = now + self.ack_timeout;
                AckMatch::InProgress
            }
            Some(_) => {
                self.pending.remove(&ack.command);
                AckMatch::Resolved
            }
        }
    }

    /// Remove and return commands whose ack deadline has passed.
    pub fn expire(&mut self, now: Instant) -> Vec<MavCmd> {
        let mut expired: Vec<MavCmd> = self
            .pending
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(cmd, _)| *cmd)
            .collect();
        expired.sort_by_key(|cmd| u16::from(*cmd));
        for cmd in &expired {
            self.pending.remove(cmd);
        }
        expired
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().min().copied()
    }

    pub fn is_pending(&self, command: MavCmd) -> bool {
        self.pending.contains_key(&command)
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

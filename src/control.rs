use crate::protocol::{build_response_frame, Command};
use bytes::Bytes;
use std::fmt;
use tracing::debug;

/// Mask toggled in the response status byte on every recognized command
pub const FLIP_BIT: u8 = 0x80;

/// Status byte before the first response is sent
pub const INITIAL_FLIP: u8 = 0x81;

/// PM5 wrapper for proprietary set-configuration commands
pub const CSAFE_SETPMCFG_CMD: u8 = 0x76;

/// PM5 set screen state command
pub const CSAFE_PM_SET_SCREENSTATE: u8 = 0x13;

/// Screen type: workout
pub const SCREENTYPE_WORKOUT: u8 = 0x01;

/// Workout screen value: terminate workout
pub const SCREENVALUEWORKOUT_TERMINATEWORKOUT: u8 = 0x02;

/// Payload of the terminate-workout command as sent by training apps
pub const TERMINATE_WORKOUT: [u8; 6] = [
    CSAFE_SETPMCFG_CMD,
    0x04,
    CSAFE_PM_SET_SCREENSTATE,
    0x02,
    SCREENTYPE_WORKOUT,
    SCREENVALUEWORKOUT_TERMINATEWORKOUT,
];

/// Commands the control channel answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Central asked to end the running workout
    TerminateWorkout,
}

impl ControlCommand {
    /// Match a validated payload against the known commands
    #[must_use]
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        match payload {
            p if p == TERMINATE_WORKOUT => Some(Self::TerminateWorkout),
            _ => None,
        }
    }

    /// Opcode bytes echoed back after the status byte
    const fn response_body(self) -> [u8; 3] {
        match self {
            Self::TerminateWorkout => [CSAFE_SETPMCFG_CMD, 0x01, CSAFE_PM_SET_SCREENSTATE],
        }
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TerminateWorkout => write!(f, "Terminate Workout"),
        }
    }
}

/// Response produced for a recognized command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    /// Command that was recognized
    pub command: ControlCommand,
    /// Escaped, checksummed frame to notify
    pub response: Bytes,
}

/// Maps validated commands to response frames
///
/// Every answered command toggles [`FLIP_BIT`] in the status byte that leads the
/// response payload, starting from [`INITIAL_FLIP`]. Unknown payloads get no
/// response and leave the flip bit alone.
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    flip: u8,
}

impl CommandDispatcher {
    /// Create a dispatcher with the initial status byte
    #[must_use]
    pub const fn new() -> Self {
        Self { flip: INITIAL_FLIP }
    }

    /// Current status byte
    #[must_use]
    pub const fn flip(&self) -> u8 {
        self.flip
    }

    /// Answer a validated command
    pub fn dispatch(&mut self, command: &Command) -> Option<Dispatch> {
        let Some(known) = ControlCommand::from_payload(&command.payload) else {
            debug!("Ignoring unknown command: {:02X?}", &command.payload[..]);
            return None;
        };

        self.flip ^= FLIP_BIT;

        let mut payload = Vec::with_capacity(4);
        payload.push(self.flip);
        payload.extend_from_slice(&known.response_body());

        let response = build_response_frame(&payload);
        debug!("{} response: {:02X?}", known, &response[..]);

        Some(Dispatch {
            command: known,
            response,
        })
    }
}

impl Default for CommandDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

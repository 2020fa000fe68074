use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};

/// Session status reported by the rowing engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionStatus {
    /// Session created, no stroke yet
    #[default]
    WaitingForStart,
    /// Rower is actively rowing
    Rowing,
    /// Session paused by inactivity
    Paused,
    /// Session ended
    Stopped,
    /// Any status string this crate does not know
    #[serde(other)]
    Unrecognized,
}

impl From<&str> for SessionStatus {
    fn from(value: &str) -> Self {
        match value {
            "WaitingForStart" => Self::WaitingForStart,
            "Rowing" => Self::Rowing,
            "Paused" => Self::Paused,
            "Stopped" => Self::Stopped,
            _ => Self::Unrecognized,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WaitingForStart => write!(f, "WaitingForStart"),
            Self::Rowing => write!(f, "Rowing"),
            Self::Paused => write!(f, "Paused"),
            Self::Stopped => write!(f, "Stopped"),
            Self::Unrecognized => write!(f, "Unrecognized"),
        }
    }
}

/// FE-C equipment state, stored in bits 4-6 of the capability byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum FeState {
    /// Equipment is off
    Asleep = 0b001_0000,
    /// Equipment is waiting for a session
    Ready = 0b010_0000,
    /// Session in progress
    InUse = 0b011_0000,
    /// Session paused or finished
    Finished = 0b101_0000,
}

impl FeState {
    /// Raw bits as placed in the capability byte
    #[must_use]
    pub const fn bits(self) -> u8 {
        self as u8
    }
}

impl From<SessionStatus> for FeState {
    fn from(status: SessionStatus) -> Self {
        match status {
            SessionStatus::Rowing => Self::InUse,
            SessionStatus::WaitingForStart | SessionStatus::Unrecognized => Self::Ready,
            SessionStatus::Paused | SessionStatus::Stopped => Self::Finished,
        }
    }
}

impl fmt::Display for FeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asleep => write!(f, "Asleep"),
            Self::Ready => write!(f, "Ready"),
            Self::InUse => write!(f, "In Use"),
            Self::Finished => write!(f, "Finished"),
        }
    }
}

/// Metrics snapshot produced by the rowing engine once per update
///
/// Field names follow the engine's JSON (`totalMovingTime`, `cyclePower`, ...),
/// so snapshots can be deserialized as they arrive.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetricsSnapshot {
    /// Session status
    #[serde(rename = "sessionStatus")]
    pub status: SessionStatus,
    /// Total moving time in seconds
    pub total_moving_time: f64,
    /// Total number of strokes in the session
    pub total_number_of_strokes: u64,
    /// Total distance in meters
    pub total_linear_distance: f64,
    /// Stroke rate in strokes per minute
    pub cycle_stroke_rate: f64,
    /// Linear velocity in m/s
    pub cycle_linear_velocity: f64,
    /// Power in watts
    pub cycle_power: f64,
    /// Drag factor in raw sensor units (50 = no resistance)
    pub drag_factor: f64,
    /// Drive length in meters
    pub drive_length: f64,
}

/// ANT+ channel parameters for the FE-C broadcaster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AntChannelConfig {
    /// ANT channel number, prefixed to every page
    pub channel: u8,
    /// Device number announced in the channel id
    pub device_number: u16,
    /// Device type (0x11 = fitness equipment)
    pub device_type: u8,
    /// Transmission type
    pub transmission_type: u8,
    /// RF channel offset from 2400 MHz
    pub rf_frequency: u8,
    /// Channel period in 1/32768 s
    pub period: u16,
    /// Metrics updates buffered between the producer and the broadcast task
    pub metrics_capacity: usize,
}

impl AntChannelConfig {
    /// Broadcast interval derived from the channel period
    #[must_use]
    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_secs_f64(f64::from(self.period) / 32768.0)
    }
}

impl Default for AntChannelConfig {
    fn default() -> Self {
        Self {
            channel: 1,
            device_number: 11_234,
            device_type: 0x11,
            transmission_type: 1,
            rf_frequency: 57,
            period: 8192,
            metrics_capacity: 16,
        }
    }
}

/// Bounds for reassembling BLE command frames
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FramingConfig {
    /// Largest raw frame (delimiters and escapes included) kept in the buffer
    pub max_frame_len: usize,
    /// Partial frame is dropped after this long without a new chunk, in milliseconds
    pub idle_timeout_ms: u64,
}

impl FramingConfig {
    /// Idle timeout as a [`Duration`]
    #[must_use]
    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

impl Default for FramingConfig {
    fn default() -> Self {
        Self {
            max_frame_len: 256,
            idle_timeout_ms: 2_000,
        }
    }
}

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

//! # Ergcast 🚣
//!
//! Protocol engines that let a rowing machine monitor speak to the outside world.
//!
//! Two independent pieces are provided:
//!
//! - **ANT+ FE-C broadcaster**: turns rowing metrics into 8-byte ANT+ fitness
//!   equipment data pages and emits one page every channel period (250 ms by
//!   default), following a fixed page rotation.
//! - **PM5 control channel**: reassembles the byte-stuffed, checksummed command
//!   frames that training apps write to the PM5 control characteristic and
//!   answers the commands it understands.
//!
//! Both engines write through the [`ByteSink`] trait, so the ANT USB stick and
//! the BLE GATT server stay outside of this crate.
//!
//! ## Frame Format
//!
//! Control frames are `F1 <escaped payload> <escaped checksum> F2`. The bytes
//! `F0` to `F3` are escaped as `F3 (byte - F0)` and the checksum is the XOR of
//! the unescaped payload bytes.
//!
//! ## Quick Start
//!
//! ```no_run
//! use ergcast::{
//!     AntChannelConfig, BroadcastScheduler, ChannelSink, ControlChannel, FramingConfig,
//!     MetricsSnapshot, SessionStatus,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Broadcast FE-C pages into a channel drained by the ANT writer
//!     let (radio, _radio_rx) = ChannelSink::channel();
//!     let mut scheduler = BroadcastScheduler::new(AntChannelConfig::default(), Arc::new(radio));
//!     scheduler.start().await?;
//!
//!     scheduler
//!         .notify_metrics(MetricsSnapshot {
//!             status: SessionStatus::Rowing,
//!             cycle_linear_velocity: 3.2,
//!             ..MetricsSnapshot::default()
//!         })
//!         .await?;
//!
//!     // Answer control writes of one BLE connection
//!     let (notify, _notify_rx) = ChannelSink::channel();
//!     let mut control = ControlChannel::new(FramingConfig::default(), Arc::new(notify));
//!     control
//!         .on_write(&[0xF1, 0x76, 0x04, 0x13, 0x02, 0x01, 0x02, 0x60, 0xF2])
//!         .await?;
//!
//!     scheduler.stop().await?;
//!     Ok(())
//! }
//! ```

/// ANT+ FE-C pages, session state and channel messages
pub mod ant;
/// Reassembly of command frames from BLE write chunks
pub mod assembler;
/// Per-connection PM5 control channel
pub mod ble;
/// Periodic FE-C page broadcasting
pub mod broadcast;
/// Command dispatch and response generation
pub mod control;
/// Error types and handling
pub mod error;
/// Byte stuffing, checksums and frame structures
pub mod protocol;
/// Output sinks for radio messages and notifications
pub mod sink;
/// Type definitions and configuration
pub mod types;

// Re-export the main types for convenient usage
pub use ant::{encode_page, AntMessage, AntPage, BroadcastCycle, PageType, SessionState};
pub use assembler::CommandFrameAssembler;
pub use ble::{pm5_uuid, ControlChannel};
pub use broadcast::{BroadcastScheduler, FeBroadcaster};
pub use control::{CommandDispatcher, ControlCommand};
pub use error::{ErgcastError, Result};
pub use protocol::Command;
pub use sink::{ByteSink, ChannelSink};
pub use types::{AntChannelConfig, FeState, FramingConfig, MetricsSnapshot, SessionStatus};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// PM5 control service UUID
pub const CONTROL_SERVICE_UUID: uuid::Uuid = pm5_uuid(0x0020);

/// PM5 control receive characteristic UUID, written by the central
pub const CONTROL_RECEIVE_UUID: uuid::Uuid = pm5_uuid(0x0021);

/// PM5 control transmit characteristic UUID, notified to the central
pub const CONTROL_TRANSMIT_UUID: uuid::Uuid = pm5_uuid(0x0022);

//! # masterlink
//!
//! Protocol layer for the serial link to a home-automation master
//! controller.
//!
//! The master speaks a small framed request/reply protocol over RS-232/485
//! and also pushes unsolicited event frames. This crate provides:
//!
//! - A declarative frame codec ([`protocol`]): command shapes built from
//!   typed fields, with checksum verification and partial-frame detection
//! - A command catalogue ([`protocol::api`])
//! - A byte transport over any [`Port`] ([`Transport`])
//! - The [`MasterCommunicator`]: one command in flight at a time, background
//!   consumers for event frames, a maintenance (CLI) session and a
//!   passthrough relay for a second device on the same link
//!
//! ## Features
//!
//! - `native` (default): Native serial port support via the `serialport` crate
//! - `serde`: Serialization support for data types
//!
//! ## Example
//!
//! ```rust,no_run
//! use masterlink::{CommunicatorConfig, Fields, MasterCommunicator, SerialConfig, Transport, api};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     #[cfg(feature = "native")]
//!     {
//!         let transport = Transport::open(&SerialConfig::new("/dev/ttyUSB0", 115200))?;
//!         let communicator = MasterCommunicator::new(transport, CommunicatorConfig::default());
//!         communicator.start()?;
//!
//!         let reply = communicator.do_command(
//!             api::basic_action(),
//!             &Fields::new()
//!                 .with("action_type", api::BA_LIGHT_ON)
//!                 .with("action_number", 5u8),
//!         )?;
//!         println!("master says {:?}", reply.get_str("resp"));
//!
//!         communicator.stop();
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod communicator;
pub mod error;
pub mod port;
pub mod protocol;
pub mod transport;

// Re-exports for convenience
#[cfg(feature = "native")]
pub use port::{NativePort, NativePortEnumerator};
pub use {
    communicator::{
        BackgroundConsumer, ChannelHandler, CommunicationStatistics, CommunicatorConfig,
        ConsumerHandler, DebugEntry, Direction, HandlerError, MasterCommunicator, Mode,
    },
    error::{Error, ErrorKind, Result},
    port::{Port, PortEnumerator, PortInfo, SerialConfig, SimulatedDevice, SimulatedPort},
    protocol::{CommandSpec, Field, FieldKind, FieldValue, Fields, MatchHint, Svt, api},
    transport::{Transport, TransportStats},
};

//! Serial packet driver for a differential-drive mobile base
//!
//! Talks the base controller's binary protocol over a serial link: frames and
//! validates the inbound byte stream, decodes the per-type sensor packets,
//! accumulates wheel odometry from the encoder counters, and encodes outbound
//! motion commands. A connection state machine gates when commands actually
//! reach the hardware.
//!
//! # Architecture
//!
//! - [`transport`] - the byte-level link: a [`Transport`] trait, the
//!   [`SerialLink`](transport::SerialLink) implementation and a mock for tests
//! - [`protocol`] - framing ([`FrameAccumulator`](protocol::FrameAccumulator))
//!   and per-type decode/encode ([`protocol::codec`])
//! - [`kinematics`] - wraparound-aware encoder deltas, odometry accumulation
//!   and velocity-to-wire-command conversion
//! - [`events`] - typed subscribe/notify fan-out of decoded packets
//! - [`driver`] - the [`DriverController`] tying it together: reader thread,
//!   state machine, command gating
//!
//! # Quick start
//!
//! ```no_run
//! use diffbase_io::{DriverConfig, DriverController, EventKind};
//!
//! # fn main() -> diffbase_io::Result<()> {
//! let mut config = DriverConfig::base_defaults();
//! config.serial.device = "/dev/ttyUSB0".to_string();
//!
//! let mut driver = DriverController::open(config)?;
//! driver.subscribe(EventKind::WheelState, |event| {
//!     if let diffbase_io::Event::Wheel(odom) = event {
//!         println!("heading: {:.3} rad", odom.heading_rad);
//!     }
//! });
//!
//! driver.enable()?;
//! driver.set_command(0.1, 0.0)?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod events;
pub mod kinematics;
pub mod protocol;
pub mod transport;

pub use config::{DriverConfig, LinkConfig, OperatingMode, SerialConfig, VelocityConfig, WheelConfig};
pub use driver::{DriverController, DriverState};
pub use error::{Error, Result};
pub use events::{Event, EventHub, EventKind, SubscriptionId};
pub use kinematics::{KinematicsTracker, OdometryState};
pub use protocol::{DriveCommand, FrameAccumulator, PacketKind, PacketRecord};
pub use transport::{MockTransport, SerialLink, Transport};

//! Wire protocol for the base controller
//!
//! Frame format: `[0xAA 0x55] [LEN] [TYPE] [PAYLOAD] [CS]`
//!
//! - `LEN` counts TYPE + PAYLOAD bytes
//! - `CS` is the XOR of every byte from LEN through the last payload byte;
//!   a valid frame XORs to zero over LEN..=CS

mod frame;
mod ring_buffer;

pub mod codec;
pub use codec::{DriveCommand, PacketKind, PacketRecord};
pub use frame::{FrameAccumulator, FrameError, RawFrame};
pub use ring_buffer::RingBuffer;

/// Start marker, first byte
pub const SYNC1: u8 = 0xAA;
/// Start marker, second byte
pub const SYNC2: u8 = 0x55;

/// Smallest representable frame: sync(2) + len(1) + type(1) + cs(1)
pub const MIN_FRAME_SIZE: usize = 5;

/// Largest LEN the controller ever emits (type + payload)
///
/// The biggest inbound payload is the EEPROM dump (17 bytes); 64 leaves
/// headroom for firmware revisions without letting line noise that mimics a
/// sync sequence stall the parser on an absurd length.
pub const MAX_FRAME_LEN: u8 = 64;

// Inbound type tags
pub const TYPE_DEFAULT: u8 = 0x01;
pub const TYPE_IR: u8 = 0x02;
pub const TYPE_DOCK_IR: u8 = 0x03;
pub const TYPE_INERTIA: u8 = 0x04;
pub const TYPE_CLIFF: u8 = 0x05;
pub const TYPE_CURRENT: u8 = 0x06;
pub const TYPE_MAGNET: u8 = 0x07;
pub const TYPE_TIME: u8 = 0x08;
pub const TYPE_HARDWARE: u8 = 0x0A;
pub const TYPE_FIRMWARE: u8 = 0x0B;
pub const TYPE_GYRO_RAW: u8 = 0x0D;
pub const TYPE_EEPROM: u8 = 0x0F;
pub const TYPE_GP_INPUT: u8 = 0x10;

/// Outbound base-control command tag
pub const TYPE_BASE_CONTROL: u8 = 0x09;

/// Running XOR over a byte span
#[inline]
pub fn xor_checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc ^ b)
}

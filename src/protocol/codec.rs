//! Per-type packet decoding and command encoding
//!
//! Decoding dispatches on the type tag of an already-validated frame into one
//! of thirteen fixed-layout records. Encoding serializes the outbound
//! base-control command with the same framing and checksum. The two paths
//! share no mutable state.

use super::frame::RawFrame;
use super::{
    SYNC1, SYNC2, TYPE_BASE_CONTROL, TYPE_CLIFF, TYPE_CURRENT, TYPE_DEFAULT, TYPE_DOCK_IR,
    TYPE_EEPROM, TYPE_FIRMWARE, TYPE_GP_INPUT, TYPE_GYRO_RAW, TYPE_HARDWARE, TYPE_INERTIA,
    TYPE_IR, TYPE_MAGNET, TYPE_TIME, xor_checksum,
};
use crate::error::{Error, Result};

/// Packet category, used for latest-record lookup and event subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    Default,
    Ir,
    DockIr,
    Inertia,
    Cliff,
    Current,
    Magnet,
    Time,
    Hardware,
    Firmware,
    GyroRaw,
    Eeprom,
    GpInput,
}

/// Core sensor packet: encoders, bumpers, cliff flags, power state
///
/// This is the high-rate packet; its encoder ticks and timestamp feed the
/// kinematics tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CoreSensors {
    /// Controller-side timestamp, wraps at 2^16 (ms resolution)
    pub timestamp: u16,
    /// Bumper contact bitfield (bit0 right, bit1 centre, bit2 left)
    pub bumper: u8,
    /// Cliff detection bitfield (same bit layout as bumper)
    pub cliff: u8,
    /// Left wheel encoder, wraps at 2^16
    pub tick_left: u16,
    /// Right wheel encoder, wraps at 2^16
    pub tick_right: u16,
    /// Applied left motor PWM (signed)
    pub pwm_left: i8,
    /// Applied right motor PWM (signed)
    pub pwm_right: i8,
    /// Button bitfield
    pub buttons: u8,
    /// Charger state byte
    pub charger: u8,
    /// Battery voltage in 0.1 V steps
    pub battery: u8,
}

impl CoreSensors {
    pub fn bumper_right(&self) -> bool {
        self.bumper & 0x01 != 0
    }
    pub fn bumper_centre(&self) -> bool {
        self.bumper & 0x02 != 0
    }
    pub fn bumper_left(&self) -> bool {
        self.bumper & 0x04 != 0
    }
}

/// IR receiver intensities (remote control band)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IrReadings {
    pub right: u8,
    pub centre: u8,
    pub left: u8,
}

/// Docking-station IR beacon intensities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DockIrReadings {
    pub right: u8,
    pub centre: u8,
    pub left: u8,
}

/// Fused gyro heading plus raw accelerometer axes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InertiaData {
    /// Heading angle in hundredths of a degree
    pub angle: i16,
    /// Heading rate in hundredths of a degree per second
    pub angle_rate: i16,
    pub acc_x: u8,
    pub acc_y: u8,
    pub acc_z: u8,
}

/// Cliff sensor ADC values (floor reflectivity)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CliffAdc {
    pub right: u16,
    pub centre: u16,
    pub left: u16,
}

/// Wheel motor current draw (10 mA steps)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MotorCurrent {
    pub left: u8,
    pub right: u8,
}

/// Magnetic strip detector intensities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MagnetReadings {
    pub right: u8,
    pub centre: u8,
    pub left: u8,
}

/// Standalone controller timestamp packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeData {
    pub timestamp: u16,
}

/// Hardware or firmware revision triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VersionInfo {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl std::fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Unfiltered gyro axes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GyroRawData {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

/// EEPROM dump fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EepromData {
    pub frame_id: u8,
    pub data: [u8; 16],
}

/// General-purpose digital/analog inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GpInputData {
    pub digital: u16,
    pub analog: [u16; 4],
}

/// Tagged union over every inbound packet layout
///
/// Only constructed from a frame whose checksum validated; no
/// partially-decoded variant is ever exposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketRecord {
    Default(CoreSensors),
    Ir(IrReadings),
    DockIr(DockIrReadings),
    Inertia(InertiaData),
    Cliff(CliffAdc),
    Current(MotorCurrent),
    Magnet(MagnetReadings),
    Time(TimeData),
    Hardware(VersionInfo),
    Firmware(VersionInfo),
    GyroRaw(GyroRawData),
    Eeprom(EepromData),
    GpInput(GpInputData),
}

impl PacketRecord {
    /// Category of this record
    pub fn kind(&self) -> PacketKind {
        match self {
            PacketRecord::Default(_) => PacketKind::Default,
            PacketRecord::Ir(_) => PacketKind::Ir,
            PacketRecord::DockIr(_) => PacketKind::DockIr,
            PacketRecord::Inertia(_) => PacketKind::Inertia,
            PacketRecord::Cliff(_) => PacketKind::Cliff,
            PacketRecord::Current(_) => PacketKind::Current,
            PacketRecord::Magnet(_) => PacketKind::Magnet,
            PacketRecord::Time(_) => PacketKind::Time,
            PacketRecord::Hardware(_) => PacketKind::Hardware,
            PacketRecord::Firmware(_) => PacketKind::Firmware,
            PacketRecord::GyroRaw(_) => PacketKind::GyroRaw,
            PacketRecord::Eeprom(_) => PacketKind::Eeprom,
            PacketRecord::GpInput(_) => PacketKind::GpInput,
        }
    }
}

fn u16_le(p: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([p[at], p[at + 1]])
}

fn i16_le(p: &[u8], at: usize) -> i16 {
    i16::from_le_bytes([p[at], p[at + 1]])
}

fn require(tag: u8, payload: &[u8], need: usize) -> Result<()> {
    if payload.len() < need {
        return Err(Error::TruncatedPayload {
            tag,
            got: payload.len(),
            need,
        });
    }
    Ok(())
}

/// Decode a validated frame into its typed record
///
/// An unknown type tag is a non-fatal error: the caller logs it, drops the
/// frame, and keeps parsing the stream.
pub fn decode(frame: &RawFrame) -> Result<PacketRecord> {
    let tag = frame.type_tag();
    let p = frame.payload();

    let record = match tag {
        TYPE_DEFAULT => {
            require(tag, p, 13)?;
            PacketRecord::Default(CoreSensors {
                timestamp: u16_le(p, 0),
                bumper: p[2],
                cliff: p[3],
                tick_left: u16_le(p, 4),
                tick_right: u16_le(p, 6),
                pwm_left: p[8] as i8,
                pwm_right: p[9] as i8,
                buttons: p[10],
                charger: p[11],
                battery: p[12],
            })
        }
        TYPE_IR => {
            require(tag, p, 3)?;
            PacketRecord::Ir(IrReadings {
                right: p[0],
                centre: p[1],
                left: p[2],
            })
        }
        TYPE_DOCK_IR => {
            require(tag, p, 3)?;
            PacketRecord::DockIr(DockIrReadings {
                right: p[0],
                centre: p[1],
                left: p[2],
            })
        }
        TYPE_INERTIA => {
            require(tag, p, 7)?;
            PacketRecord::Inertia(InertiaData {
                angle: i16_le(p, 0),
                angle_rate: i16_le(p, 2),
                acc_x: p[4],
                acc_y: p[5],
                acc_z: p[6],
            })
        }
        TYPE_CLIFF => {
            require(tag, p, 6)?;
            PacketRecord::Cliff(CliffAdc {
                right: u16_le(p, 0),
                centre: u16_le(p, 2),
                left: u16_le(p, 4),
            })
        }
        TYPE_CURRENT => {
            require(tag, p, 2)?;
            PacketRecord::Current(MotorCurrent {
                left: p[0],
                right: p[1],
            })
        }
        TYPE_MAGNET => {
            require(tag, p, 3)?;
            PacketRecord::Magnet(MagnetReadings {
                right: p[0],
                centre: p[1],
                left: p[2],
            })
        }
        TYPE_TIME => {
            require(tag, p, 2)?;
            PacketRecord::Time(TimeData {
                timestamp: u16_le(p, 0),
            })
        }
        TYPE_HARDWARE => {
            require(tag, p, 3)?;
            PacketRecord::Hardware(VersionInfo {
                major: p[0],
                minor: p[1],
                patch: p[2],
            })
        }
        TYPE_FIRMWARE => {
            require(tag, p, 3)?;
            PacketRecord::Firmware(VersionInfo {
                major: p[0],
                minor: p[1],
                patch: p[2],
            })
        }
        TYPE_GYRO_RAW => {
            require(tag, p, 6)?;
            PacketRecord::GyroRaw(GyroRawData {
                x: i16_le(p, 0),
                y: i16_le(p, 2),
                z: i16_le(p, 4),
            })
        }
        TYPE_EEPROM => {
            require(tag, p, 17)?;
            let mut data = [0u8; 16];
            data.copy_from_slice(&p[1..17]);
            PacketRecord::Eeprom(EepromData {
                frame_id: p[0],
                data,
            })
        }
        TYPE_GP_INPUT => {
            require(tag, p, 10)?;
            PacketRecord::GpInput(GpInputData {
                digital: u16_le(p, 0),
                analog: [u16_le(p, 2), u16_le(p, 4), u16_le(p, 6), u16_le(p, 8)],
            })
        }
        other => return Err(Error::UnknownPacketType(other)),
    };

    Ok(record)
}

/// Outbound motion command in wire units
///
/// Produced by the kinematics conversion from (linear, angular) velocity.
/// Transmitted only while the driver is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DriveCommand {
    /// Translational speed (mm/s); for pure rotation, half-bias rim speed
    pub speed: i16,
    /// Turn radius (mm); 0 = straight, ±1 = rotate in place
    pub radius: i16,
}

impl DriveCommand {
    /// A safe stop
    pub const fn stop() -> Self {
        Self {
            speed: 0,
            radius: 0,
        }
    }

    /// Serialize to wire bytes with computed checksum
    pub fn encode(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(9);
        packet.push(SYNC1);
        packet.push(SYNC2);
        packet.push(5); // LEN: type(1) + payload(4)
        packet.push(TYPE_BASE_CONTROL);
        packet.extend_from_slice(&self.speed.to_le_bytes());
        packet.extend_from_slice(&self.radius.to_le_bytes());
        let cs = xor_checksum(&packet[2..]);
        packet.push(cs);
        packet
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::FrameAccumulator;

    fn frame_for(tag: u8, payload: &[u8]) -> RawFrame {
        let mut bytes = vec![SYNC1, SYNC2, (payload.len() + 1) as u8, tag];
        bytes.extend_from_slice(payload);
        let cs = xor_checksum(&bytes[2..]);
        bytes.push(cs);

        let mut acc = FrameAccumulator::new();
        acc.feed(&bytes);
        acc.extract_frames()
            .next()
            .expect("complete frame")
            .expect("valid frame")
    }

    #[test]
    fn test_decode_default() {
        let payload = [
            0x34, 0x12, // timestamp
            0x05, // bumper: left + right
            0x02, // cliff: centre
            0xE8, 0x03, // tick_left = 1000
            0xD0, 0x07, // tick_right = 2000
            0x10, // pwm_left
            0xF0, // pwm_right = -16
            0x01, // buttons
            0x02, // charger
            0xA5, // battery
        ];
        let rec = decode(&frame_for(TYPE_DEFAULT, &payload)).unwrap();
        let PacketRecord::Default(core) = rec else {
            panic!("wrong variant");
        };
        assert_eq!(core.timestamp, 0x1234);
        assert!(core.bumper_left() && core.bumper_right() && !core.bumper_centre());
        assert_eq!(core.tick_left, 1000);
        assert_eq!(core.tick_right, 2000);
        assert_eq!(core.pwm_right, -16);
        assert_eq!(core.battery, 0xA5);
        assert_eq!(rec.kind(), PacketKind::Default);
    }

    #[test]
    fn test_decode_inertia() {
        let payload = [0x2C, 0x01, 0xFE, 0xFF, 7, 8, 9]; // angle=300, rate=-2
        let rec = decode(&frame_for(TYPE_INERTIA, &payload)).unwrap();
        let PacketRecord::Inertia(inertia) = rec else {
            panic!("wrong variant");
        };
        assert_eq!(inertia.angle, 300);
        assert_eq!(inertia.angle_rate, -2);
        assert_eq!((inertia.acc_x, inertia.acc_y, inertia.acc_z), (7, 8, 9));
    }

    #[test]
    fn test_decode_cliff_and_gp_input() {
        let rec = decode(&frame_for(TYPE_CLIFF, &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06])).unwrap();
        assert_eq!(
            rec,
            PacketRecord::Cliff(CliffAdc {
                right: 0x0201,
                centre: 0x0403,
                left: 0x0605,
            })
        );

        let rec = decode(&frame_for(
            TYPE_GP_INPUT,
            &[0xFF, 0x00, 1, 0, 2, 0, 3, 0, 4, 0],
        ))
        .unwrap();
        assert_eq!(
            rec,
            PacketRecord::GpInput(GpInputData {
                digital: 0x00FF,
                analog: [1, 2, 3, 4],
            })
        );
    }

    #[test]
    fn test_decode_versions_and_eeprom() {
        let rec = decode(&frame_for(TYPE_FIRMWARE, &[1, 2, 3])).unwrap();
        let PacketRecord::Firmware(fw) = rec else {
            panic!("wrong variant");
        };
        assert_eq!(fw.to_string(), "1.2.3");

        let mut eeprom_payload = vec![0x07];
        eeprom_payload.extend_from_slice(&[0xEE; 16]);
        let rec = decode(&frame_for(TYPE_EEPROM, &eeprom_payload)).unwrap();
        let PacketRecord::Eeprom(ee) = rec else {
            panic!("wrong variant");
        };
        assert_eq!(ee.frame_id, 0x07);
        assert_eq!(ee.data, [0xEE; 16]);
    }

    #[test]
    fn test_decode_every_known_tag() {
        let mut eeprom_payload = vec![0x03];
        eeprom_payload.extend_from_slice(&[0x5A; 16]);

        let cases: Vec<(u8, Vec<u8>, PacketRecord)> = vec![
            (
                TYPE_DEFAULT,
                vec![0x10, 0x27, 0, 0, 0x01, 0, 0x02, 0, 0, 0, 0, 0, 0xA0],
                PacketRecord::Default(CoreSensors {
                    timestamp: 10000,
                    tick_left: 1,
                    tick_right: 2,
                    battery: 0xA0,
                    ..Default::default()
                }),
            ),
            (
                TYPE_IR,
                vec![11, 22, 33],
                PacketRecord::Ir(IrReadings {
                    right: 11,
                    centre: 22,
                    left: 33,
                }),
            ),
            (
                TYPE_DOCK_IR,
                vec![1, 4, 2],
                PacketRecord::DockIr(DockIrReadings {
                    right: 1,
                    centre: 4,
                    left: 2,
                }),
            ),
            (
                TYPE_INERTIA,
                vec![0x64, 0x00, 0xFF, 0xFF, 1, 2, 3],
                PacketRecord::Inertia(InertiaData {
                    angle: 100,
                    angle_rate: -1,
                    acc_x: 1,
                    acc_y: 2,
                    acc_z: 3,
                }),
            ),
            (
                TYPE_CLIFF,
                vec![0x01, 0x02, 0x03, 0x04, 0x05, 0x06],
                PacketRecord::Cliff(CliffAdc {
                    right: 0x0201,
                    centre: 0x0403,
                    left: 0x0605,
                }),
            ),
            (
                TYPE_CURRENT,
                vec![40, 55],
                PacketRecord::Current(MotorCurrent {
                    left: 40,
                    right: 55,
                }),
            ),
            (
                TYPE_MAGNET,
                vec![9, 8, 7],
                PacketRecord::Magnet(MagnetReadings {
                    right: 9,
                    centre: 8,
                    left: 7,
                }),
            ),
            (
                TYPE_TIME,
                vec![0xFE, 0xFF],
                PacketRecord::Time(TimeData { timestamp: 0xFFFE }),
            ),
            (
                TYPE_HARDWARE,
                vec![1, 0, 4],
                PacketRecord::Hardware(VersionInfo {
                    major: 1,
                    minor: 0,
                    patch: 4,
                }),
            ),
            (
                TYPE_FIRMWARE,
                vec![2, 3, 1],
                PacketRecord::Firmware(VersionInfo {
                    major: 2,
                    minor: 3,
                    patch: 1,
                }),
            ),
            (
                TYPE_GYRO_RAW,
                vec![0x00, 0x80, 0xFF, 0x7F, 0x00, 0x00],
                PacketRecord::GyroRaw(GyroRawData {
                    x: i16::MIN,
                    y: i16::MAX,
                    z: 0,
                }),
            ),
            (
                TYPE_EEPROM,
                eeprom_payload,
                PacketRecord::Eeprom(EepromData {
                    frame_id: 0x03,
                    data: [0x5A; 16],
                }),
            ),
            (
                TYPE_GP_INPUT,
                vec![0x0F, 0x00, 1, 0, 2, 0, 3, 0, 4, 0],
                PacketRecord::GpInput(GpInputData {
                    digital: 0x000F,
                    analog: [1, 2, 3, 4],
                }),
            ),
        ];

        assert_eq!(cases.len(), 13);
        for (tag, payload, expected) in cases {
            let record = decode(&frame_for(tag, &payload)).unwrap();
            assert_eq!(record, expected, "tag {tag:#04x}");
            assert_eq!(record.kind(), expected.kind());
        }
    }

    #[test]
    fn test_unknown_type_non_fatal() {
        let err = decode(&frame_for(0x7F, &[1, 2, 3])).unwrap_err();
        assert!(matches!(err, Error::UnknownPacketType(0x7F)));
    }

    #[test]
    fn test_truncated_payload() {
        let err = decode(&frame_for(TYPE_DEFAULT, &[1, 2, 3])).unwrap_err();
        assert!(matches!(
            err,
            Error::TruncatedPayload {
                tag: TYPE_DEFAULT,
                got: 3,
                need: 13,
            }
        ));
    }

    #[test]
    fn test_encode_satisfies_checksum_invariant() {
        let cmd = DriveCommand {
            speed: -150,
            radius: 420,
        };
        let bytes = cmd.encode();

        assert_eq!(&bytes[..2], &[SYNC1, SYNC2]);
        assert_eq!(bytes[2], 5);
        assert_eq!(bytes[3], TYPE_BASE_CONTROL);
        assert_eq!(bytes.len(), 9);
        // Independent validator: running XOR over LEN..=CS is zero
        assert_eq!(xor_checksum(&bytes[2..]), 0);

        // The accumulator itself accepts an encoded command
        let mut acc = FrameAccumulator::new();
        acc.feed(&bytes);
        let frame = acc.extract_frames().next().unwrap().unwrap();
        assert_eq!(frame.type_tag(), TYPE_BASE_CONTROL);
        assert_eq!(i16::from_le_bytes([frame.payload()[0], frame.payload()[1]]), -150);
        assert_eq!(i16::from_le_bytes([frame.payload()[2], frame.payload()[3]]), 420);
    }
}

//! HID wire protocol for the BS2 / BS2 PRO fan controller.
//!
//! The device speaks fixed-size 23-byte output reports. A speed command is
//! `5A A5 26 05 <gear> <rpm_lo> <rpm_hi> <checksum>` followed by zero padding,
//! where the checksum is the low byte of the sum of bytes 2..=6. Input reports
//! carry the current and target RPM plus gear/mode status.
//!
//! This crate only builds and parses frames; submitting them to the device is
//! the daemon's job.

use serde::{Deserialize, Serialize};

use bs2_error::{Bs2Error, Result};

/// Output report length in bytes
pub const FRAME_LEN: usize = 23;

/// Frame header bytes (sync marker)
pub const FRAME_HEADER: [u8; 2] = [0x5a, 0xa5];

/// Command byte for a speed/gear change
pub const CMD_SET_SPEED: u8 = 0x26;

/// Payload length byte carried by speed commands
const SET_SPEED_PAYLOAD_LEN: u8 = 0x05;

/// Minimum input report length the parser accepts
pub const REPORT_MIN_LEN: usize = 12;

/// Highest RPM the device accepts
pub const DEVICE_MAX_RPM: u16 = 4000;

/// Fan gear as encoded in the speed command's gear byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gear {
    Silent,
    Standard,
    Strong,
    Overclock,
}

impl Gear {
    /// Wire encoding of the gear byte
    pub fn as_byte(self) -> u8 {
        match self {
            Gear::Silent => 0x00,
            Gear::Standard => 0x01,
            Gear::Strong => 0x02,
            Gear::Overclock => 0x03,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Gear::Silent),
            0x01 => Some(Gear::Standard),
            0x02 => Some(Gear::Strong),
            0x03 => Some(Gear::Overclock),
            _ => None,
        }
    }

    pub fn all() -> [Gear; 4] {
        [Gear::Silent, Gear::Standard, Gear::Strong, Gear::Overclock]
    }

    /// Gear whose preset band covers the given RPM.
    ///
    /// Bands follow the preset tables: up to 1900 silent, 2760 standard,
    /// 3300 strong, then overclock.
    pub fn for_rpm(rpm: u16) -> Gear {
        match rpm {
            0..=1900 => Gear::Silent,
            1901..=2760 => Gear::Standard,
            2761..=3300 => Gear::Strong,
            _ => Gear::Overclock,
        }
    }
}

impl std::fmt::Display for Gear {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Gear::Silent => write!(f, "silent"),
            Gear::Standard => write!(f, "standard"),
            Gear::Strong => write!(f, "strong"),
            Gear::Overclock => write!(f, "overclock"),
        }
    }
}

/// Speed level within a gear
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Low,
    Mid,
    High,
}

impl Level {
    pub fn all() -> [Level; 3] {
        [Level::Low, Level::Mid, Level::High]
    }
}

/// Canonical RPM for a preset gear/level pair
pub fn preset_rpm(gear: Gear, level: Level) -> u16 {
    match (gear, level) {
        (Gear::Silent, Level::Low) => 1300,
        (Gear::Silent, Level::Mid) => 1700,
        (Gear::Silent, Level::High) => 1900,
        (Gear::Standard, Level::Low) => 2100,
        (Gear::Standard, Level::Mid) => 2310,
        (Gear::Standard, Level::High) => 2760,
        (Gear::Strong, Level::Low) => 2800,
        (Gear::Strong, Level::Mid) => 3000,
        (Gear::Strong, Level::High) => 3300,
        (Gear::Overclock, Level::Low) => 3500,
        (Gear::Overclock, Level::Mid) => 3700,
        (Gear::Overclock, Level::High) => 4000,
    }
}

/// Build the output frame for a preset gear/level pair
pub fn preset_command(gear: Gear, level: Level) -> [u8; FRAME_LEN] {
    build_speed_command(gear, preset_rpm(gear, level))
}

/// Build a speed command frame for an arbitrary RPM.
///
/// The RPM is clamped to the device limit before encoding; the checksum
/// covers the command, length, gear, and RPM bytes.
pub fn build_speed_command(gear: Gear, rpm: u16) -> [u8; FRAME_LEN] {
    let rpm = rpm.min(DEVICE_MAX_RPM);
    let mut frame = [0u8; FRAME_LEN];
    frame[0] = FRAME_HEADER[0];
    frame[1] = FRAME_HEADER[1];
    frame[2] = CMD_SET_SPEED;
    frame[3] = SET_SPEED_PAYLOAD_LEN;
    frame[4] = gear.as_byte();
    frame[5] = (rpm & 0xff) as u8;
    frame[6] = (rpm >> 8) as u8;
    frame[7] = checksum(&frame[2..7]);
    frame
}

/// Low byte of the byte sum; the device verifies this over bytes 2..=6
fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u32, |acc, &b| acc + b as u32) as u8
}

/// A decoded speed command, for logging and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeedCommand {
    pub gear: Gear,
    pub rpm: u16,
}

/// Parse a speed command frame back into gear and RPM.
///
/// Rejects frames with a bad header, wrong command byte, unknown gear, or a
/// checksum mismatch.
pub fn parse_speed_command(frame: &[u8]) -> Result<SpeedCommand> {
    if frame.len() < 8 {
        return Err(Bs2Error::MalformedReport(format!(
            "speed command too short: {} bytes",
            frame.len()
        )));
    }
    if frame[0..2] != FRAME_HEADER {
        return Err(Bs2Error::MalformedReport("bad frame header".into()));
    }
    if frame[2] != CMD_SET_SPEED {
        return Err(Bs2Error::MalformedReport(format!(
            "unexpected command byte 0x{:02x}",
            frame[2]
        )));
    }
    if frame[7] != checksum(&frame[2..7]) {
        return Err(Bs2Error::MalformedReport("checksum mismatch".into()));
    }
    let gear = Gear::from_byte(frame[4]).ok_or_else(|| {
        Bs2Error::MalformedReport(format!("unknown gear byte 0x{:02x}", frame[4]))
    })?;
    let rpm = u16::from_le_bytes([frame[5], frame[6]]);
    Ok(SpeedCommand { gear, rpm })
}

/// Status report read back from the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanReport {
    pub report_id: u8,
    pub command: u8,
    pub status: u8,
    pub gear_settings: u8,
    pub current_mode: u8,
    pub current_rpm: u16,
    pub target_rpm: u16,
}

impl FanReport {
    /// Parse an input report.
    ///
    /// Layout: report id, `5A A5` sync, command, status, gear settings,
    /// current mode, one reserved byte, then current and target RPM as
    /// little-endian u16s.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < REPORT_MIN_LEN {
            return Err(Bs2Error::MalformedReport(format!(
                "report too short: {} bytes, need {}",
                buf.len(),
                REPORT_MIN_LEN
            )));
        }
        if buf[1..3] != FRAME_HEADER {
            return Err(Bs2Error::MalformedReport("bad report sync bytes".into()));
        }
        Ok(FanReport {
            report_id: buf[0],
            command: buf[3],
            status: buf[4],
            gear_settings: buf[5],
            current_mode: buf[6],
            current_rpm: u16::from_le_bytes([buf[8], buf[9]]),
            target_rpm: u16::from_le_bytes([buf[10], buf[11]]),
        })
    }

    /// Encode as an input report buffer (test helper for transports)
    pub fn encode(&self) -> [u8; REPORT_MIN_LEN] {
        let mut buf = [0u8; REPORT_MIN_LEN];
        buf[0] = self.report_id;
        buf[1] = FRAME_HEADER[0];
        buf[2] = FRAME_HEADER[1];
        buf[3] = self.command;
        buf[4] = self.status;
        buf[5] = self.gear_settings;
        buf[6] = self.current_mode;
        buf[8..10].copy_from_slice(&self.current_rpm.to_le_bytes());
        buf[10..12].copy_from_slice(&self.target_rpm.to_le_bytes());
        buf
    }
}

//! Fan command transport
//!
//! The control loop decides *whether* and *when* to command the fan; this
//! module owns *how*. Frames come from [`bs2_protocol`]; the concrete sink is
//! behind [`FanTransport`] so the loop can run against a real HID device, the
//! frame-logging default, or a test mock.

use tracing::{debug, warn};

use bs2_error::Result;
use bs2_protocol::{build_speed_command, preset_command, Gear, Level, FRAME_LEN};

/// Where speed and gear frames go
pub trait FanTransport: Send {
    /// Submit a target RPM to the device
    fn set_target_rpm(&mut self, rpm: u16) -> Result<()>;

    /// Submit a preset gear/level command
    fn send_preset(&mut self, gear: Gear, level: Level) -> Result<()>;

    /// Last RPM reported by the device, if it reports one
    fn current_rpm(&mut self) -> Option<u16>;
}

/// Default transport: builds real frames and logs them instead of writing to
/// a device. Used when no HID backend is wired in, and handy for dry runs.
#[derive(Debug, Default)]
pub struct LoggingTransport {
    last_frame: Option<[u8; FRAME_LEN]>,
}

impl LoggingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent frame this transport would have written
    pub fn last_frame(&self) -> Option<&[u8; FRAME_LEN]> {
        self.last_frame.as_ref()
    }
}

impl FanTransport for LoggingTransport {
    fn set_target_rpm(&mut self, rpm: u16) -> Result<()> {
        let frame = build_speed_command(Gear::for_rpm(rpm), rpm);
        debug!(rpm, frame = ?&frame[..8], "TRANSPORT: speed command");
        self.last_frame = Some(frame);
        Ok(())
    }

    fn send_preset(&mut self, gear: Gear, level: Level) -> Result<()> {
        let frame = preset_command(gear, level);
        debug!(%gear, ?level, frame = ?&frame[..8], "TRANSPORT: preset command");
        self.last_frame = Some(frame);
        Ok(())
    }

    fn current_rpm(&mut self) -> Option<u16> {
        None
    }
}

/// Log a transport failure without aborting the tick
pub fn report_transport_error(context: &str, err: &bs2_error::Bs2Error) {
    warn!("TRANSPORT: {} failed: {}", context, err);
}

//! Constants for the BS2 controller core
//!
//! Centralizes device limits, control-core constants, and configuration
//! defaults. Never use magic numbers in other files - add them here first.

/// Device limits
pub mod device {
    /// Highest RPM the BS2 / BS2 PRO accepts
    pub const MAX_RPM: i32 = 4000;

    /// RPM above which the learner starts charging a noise penalty.
    /// Deliberately independent of MAX_RPM; the two must be revisited
    /// together if a future device raises the ceiling.
    pub const NOISE_FLOOR_RPM: i32 = 2800;
}

/// Control-core constants
pub mod control {
    /// Smallest temperature delta bucketed by the rate-bias tables
    pub const RATE_BUCKET_MIN: i32 = -3;

    /// Largest temperature delta bucketed by the rate-bias tables
    pub const RATE_BUCKET_MAX: i32 = 3;

    /// Number of rate-of-change buckets
    pub const RATE_BUCKET_COUNT: usize = (RATE_BUCKET_MAX - RATE_BUCKET_MIN + 1) as usize;

    /// Degrees above the setpoint at which the overheat boost kicks in
    pub const OVERHEAT_MARGIN: i32 = 15;

    /// Base RPM added by the overheat boost
    pub const OVERHEAT_BOOST_BASE: i32 = 320;

    /// Raw learning scores below this magnitude are discarded
    pub const LEARN_DEADBAND: i32 = 4;

    /// Extra FIFO capacity beyond what the learner needs to see
    pub const SAMPLE_FIFO_SLACK: usize = 4;
}

/// Timing bounds for the control loop
pub mod timing {
    /// Temperature update cadence bounds in seconds
    pub const MIN_UPDATE_RATE_SECS: i32 = 1;
    pub const MAX_UPDATE_RATE_SECS: i32 = 10;

    /// Raw-sample averaging count bounds
    pub const MIN_SAMPLE_COUNT: i32 = 1;
    pub const MAX_SAMPLE_COUNT: i32 = 10;
}

/// Configuration file locations
pub mod paths {
    use std::path::PathBuf;

    /// Configuration file name
    pub const CONFIG_FILE: &str = "config.json";

    /// User configuration directory (`~/.config/bs2`)
    pub fn user_config_dir() -> Option<PathBuf> {
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            return Some(PathBuf::from(xdg).join("bs2"));
        }
        dirs::config_dir().map(|p| p.join("bs2"))
    }

    /// Full path of the configuration file
    pub fn config_file_path() -> PathBuf {
        user_config_dir()
            .unwrap_or_else(|| PathBuf::from(".").join("bs2"))
            .join(CONFIG_FILE)
    }
}

/// Factory fan curve for the BS2 PRO
pub mod default_curve {
    use crate::data::CurvePoint;

    /// The curve the device ships with: 1000 RPM at 30°C up to the
    /// 4000 RPM ceiling from 90°C.
    pub fn standard() -> Vec<CurvePoint> {
        [
            (30, 1000),
            (35, 1200),
            (40, 1400),
            (45, 1600),
            (50, 1800),
            (55, 2000),
            (60, 2300),
            (65, 2600),
            (70, 2900),
            (75, 3200),
            (80, 3500),
            (85, 3800),
            (90, 4000),
            (95, 4000),
        ]
        .iter()
        .map(|&(temperature, rpm)| CurvePoint { temperature, rpm })
        .collect()
    }
}

/// Limits for configuration validation
pub mod limits {
    /// Maximum number of points a fan curve may carry
    pub const MAX_CURVE_POINTS: usize = 32;

    /// Highest temperature a curve point may name
    pub const MAX_CURVE_TEMPERATURE: i32 = 120;

    /// Maximum config file size accepted by the loader (bytes)
    pub const MAX_CONFIG_SIZE: u64 = 256 * 1024;
}

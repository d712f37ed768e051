//! Core data types for the BS2 controller
//!
//! The configuration document is camelCase JSON so it stays readable next to
//! the vendor application's exports.

use serde::{Deserialize, Serialize};

use crate::constants::{control, default_curve};

/// A point on the fan curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurvePoint {
    /// Temperature in °C
    pub temperature: i32,
    /// Fan speed in RPM
    pub rpm: i32,
}

/// One reading from the temperature provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TempReading {
    pub cpu: i32,
    pub gpu: i32,
    pub max: i32,
    pub success: bool,
    #[serde(default)]
    pub error: String,
}

impl TempReading {
    /// The temperature the control loop should act on.
    ///
    /// The hotter of CPU and GPU when both are valid, whichever is valid
    /// otherwise, 0 when nothing is.
    pub fn effective(&self) -> i32 {
        if !self.success {
            return 0;
        }
        if self.cpu > 0 && self.gpu > 0 {
            self.max.max(self.cpu.max(self.gpu))
        } else if self.cpu > 0 {
            self.cpu
        } else if self.gpu > 0 {
            self.gpu
        } else {
            self.max.max(0)
        }
    }
}

/// Tunables and learned state for adaptive control
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SmartControlConfig {
    /// Master switch for adaptive control
    pub enabled: bool,
    /// Learning switch; forced on by normalization
    pub learning: bool,
    /// Setpoint in °C
    pub target_temp: i32,
    /// Gain of the error term (1-10)
    pub aggressiveness: i32,
    /// Deadband around the setpoint in °C
    pub hysteresis: i32,
    /// Minimum RPM step actually sent to the device
    pub min_rpm_change: i32,
    /// Maximum RPM increase per tick
    pub ramp_up_limit: i32,
    /// Maximum RPM decrease per tick
    pub ramp_down_limit: i32,
    /// Learning speed (1-10)
    pub learn_rate: i32,
    /// Stable-window length in samples
    pub learn_window: i32,
    /// Samples the learner looks backward to ride out thermal inertia
    pub learn_delay: i32,
    /// Overheat penalty weight
    pub overheat_weight: i32,
    /// Penalty weight on RPM churn
    pub rpm_delta_weight: i32,
    /// Penalty weight at high RPM
    pub noise_weight: i32,
    /// Feed-forward gain on temperature trend
    pub trend_gain: i32,
    /// Absolute bound on any learned offset (RPM)
    pub max_learn_offset: i32,
    /// Blended per-curve-point offsets (derived from heat and cool)
    pub learned_offsets: Vec<i32>,
    /// Per-curve-point offsets applied while heating
    pub learned_offsets_heat: Vec<i32>,
    /// Per-curve-point offsets applied while cooling
    pub learned_offsets_cool: Vec<i32>,
    /// Rate-of-change biases applied while heating, one per bucket
    pub learned_rate_heat: Vec<i32>,
    /// Rate-of-change biases applied while cooling, one per bucket
    pub learned_rate_cool: Vec<i32>,
}

impl SmartControlConfig {
    /// Factory configuration sized for the given curve
    pub fn defaults_for(curve: &[CurvePoint]) -> Self {
        Self {
            enabled: true,
            learning: true,
            target_temp: 68,
            aggressiveness: 5,
            hysteresis: 2,
            min_rpm_change: 50,
            ramp_up_limit: 220,
            ramp_down_limit: 160,
            learn_rate: 4,
            learn_window: 6,
            learn_delay: 2,
            overheat_weight: 8,
            rpm_delta_weight: 5,
            noise_weight: 4,
            trend_gain: 5,
            max_learn_offset: 600,
            learned_offsets: vec![0; curve.len()],
            learned_offsets_heat: vec![0; curve.len()],
            learned_offsets_cool: vec![0; curve.len()],
            learned_rate_heat: vec![0; control::RATE_BUCKET_COUNT],
            learned_rate_cool: vec![0; control::RATE_BUCKET_COUNT],
        }
    }

    /// Zero every learned table in place, keeping array lengths
    pub fn reset_learning(&mut self) {
        self.learned_offsets.fill(0);
        self.learned_offsets_heat.fill(0);
        self.learned_offsets_cool.fill(0);
        self.learned_rate_heat.fill(0);
        self.learned_rate_cool.fill(0);
    }
}

/// Application configuration document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    /// Adaptive control master switch
    pub auto_control: bool,
    /// User fan curve, ordered by temperature
    pub fan_curve: Vec<CurvePoint>,
    /// Temperature poll cadence in seconds
    pub temp_update_rate: i32,
    /// Raw readings averaged into one sample
    pub temp_sample_count: i32,
    /// Fixed-speed override switch
    pub custom_speed_enabled: bool,
    /// Fixed-speed override value; unbounded here, clamped at the device
    pub custom_speed_rpm: i32,
    /// Adaptive control tunables and learned state
    pub smart_control: SmartControlConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        let curve = default_curve::standard();
        let smart_control = SmartControlConfig::defaults_for(&curve);
        Self {
            auto_control: false,
            fan_curve: curve,
            temp_update_rate: 2,
            temp_sample_count: 1,
            custom_speed_enabled: false,
            custom_speed_rpm: 2000,
            smart_control,
        }
    }
}

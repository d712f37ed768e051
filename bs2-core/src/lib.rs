//! BS2 Controller Core Library
//!
//! The adaptive fan-control core for the BS2 / BS2 PRO cooling pad: a
//! closed-loop controller that turns a stream of temperature samples into
//! target fan RPMs while learning per-temperature and per-rate-of-change
//! offsets to the user's baseline curve.
//!
//! # Module Structure
//!
//! - `data/` - Data types, configuration persistence, validation
//! - `engine/` - Curve evaluation, offset store, normalization, target
//!   calculation, learning
//!
//! Everything in `engine/` is pure integer arithmetic: the same inputs always
//! produce the same outputs, bit for bit.

pub mod constants;
pub mod data;
pub mod engine;

pub use data::{
    load_config, load_config_from, sanitize_curve, save_config, save_config_to,
    validate_curve_points, AppConfig, CurvePoint, SmartControlConfig, TempReading,
};

pub use engine::curve::evaluate as evaluate_curve;
pub use engine::learner::{learn_curve_offsets, LearnOutcome, LearnSample};
pub use engine::normalize::{normalize_app_config, normalize_smart_control};
pub use engine::offsets::{
    blend_offsets, clamp_offset_for_point, clamp_rate_bias, constrain_offsets_to_curve,
    curve_edge_rpm_bounds, effective_curve, enforce_non_decreasing, nearest_curve_index,
    normalize_rate_biases, rate_bucket_index,
};
pub use engine::target::{apply_ramp_limit, calculate_target_rpm};

pub use bs2_error::{Bs2Error, Result};

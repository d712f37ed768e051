//! Data types, configuration persistence, and validation

mod persistence;
mod types;
mod validation;

pub use persistence::{load_config, load_config_from, save_config, save_config_to};
pub use types::{AppConfig, CurvePoint, SmartControlConfig, TempReading};
pub use validation::{sanitize_curve, validate_curve_points};

//! Adaptive fan-control engine
//!
//! Pure integer arithmetic throughout; nothing in here touches the device or
//! the filesystem.

pub mod curve;
pub mod learner;
pub mod normalize;
pub mod offsets;
pub mod target;

//! Target RPM calculation
//!
//! Stateless with respect to previous output: every tick recomputes the
//! target from the current and previous averaged temperatures, the curve, and
//! the learned state. The ramp limiter is the only thing that shapes the
//! emitted value between ticks.

use crate::constants::{control, device};
use crate::data::{CurvePoint, SmartControlConfig};
use crate::engine::{curve, offsets};

/// Compute the smart target RPM for one tick.
///
/// Returns 0 when the curve is empty (no control).
pub fn calculate_target_rpm(
    avg_temp: i32,
    last_avg_temp: i32,
    curve_points: &[CurvePoint],
    cfg: &SmartControlConfig,
) -> i32 {
    let temp_delta = avg_temp - last_avg_temp;
    let active = select_offsets_for_trend(temp_delta, cfg);
    let effective = offsets::effective_curve(
        curve_points,
        &active,
        &cfg.learned_offsets,
        cfg.max_learn_offset,
    );

    let base = curve::evaluate(avg_temp, &effective);
    if base <= 0 {
        return 0;
    }
    let mut target = base;

    let temp_error = avg_temp - cfg.target_temp;
    if temp_error.abs() > cfg.hysteresis {
        target += temp_error * (12 + cfg.aggressiveness * 4);
    }

    target += sample_rate_bias(temp_delta, cfg);

    if temp_delta > 0 {
        // Spin up before the setpoint is reached, not after
        let preheat_band = cfg.hysteresis + 4 + cfg.trend_gain / 2;
        let distance_to_target = cfg.target_temp - avg_temp;
        if distance_to_target >= 0 && distance_to_target <= preheat_band {
            target += (preheat_band - distance_to_target)
                * (4 + cfg.aggressiveness + cfg.trend_gain);
        }
        target += temp_delta * (8 + cfg.aggressiveness * 2 + cfg.trend_gain * 3);
    }
    if temp_delta < 0 {
        target += temp_delta * (1 + cfg.trend_gain / 3);
    }

    if avg_temp >= cfg.target_temp + control::OVERHEAT_MARGIN {
        target += control::OVERHEAT_BOOST_BASE + cfg.overheat_weight * 15;
    }

    target.clamp(0, device::MAX_RPM)
}

/// Limit the RPM change between consecutive ticks, asymmetrically
pub fn apply_ramp_limit(target_rpm: i32, last_rpm: i32, up_limit: i32, down_limit: i32) -> i32 {
    if target_rpm > last_rpm {
        return (last_rpm + up_limit).min(target_rpm);
    }
    if target_rpm < last_rpm {
        return (last_rpm - down_limit).max(target_rpm);
    }
    target_rpm
}

/// Pick the offset table matching the temperature trend.
///
/// Heating uses the heat table, cooling the cool table; a flat trend takes
/// the blend of both, falling back to the persisted blended view.
fn select_offsets_for_trend(temp_delta: i32, cfg: &SmartControlConfig) -> Vec<i32> {
    if temp_delta > 0 && !cfg.learned_offsets_heat.is_empty() {
        return cfg.learned_offsets_heat.clone();
    }
    if temp_delta < 0 && !cfg.learned_offsets_cool.is_empty() {
        return cfg.learned_offsets_cool.clone();
    }
    if !cfg.learned_offsets_heat.is_empty() && !cfg.learned_offsets_cool.is_empty() {
        return offsets::blend_offsets(&cfg.learned_offsets_heat, &cfg.learned_offsets_cool);
    }
    cfg.learned_offsets.clone()
}

/// Pick the rate-bias table matching the trend, blending when flat
fn select_rate_biases_for_trend(temp_delta: i32, cfg: &SmartControlConfig) -> Vec<i32> {
    if temp_delta > 0 && !cfg.learned_rate_heat.is_empty() {
        return cfg.learned_rate_heat.clone();
    }
    if temp_delta < 0 && !cfg.learned_rate_cool.is_empty() {
        return cfg.learned_rate_cool.clone();
    }
    if !cfg.learned_rate_heat.is_empty() && !cfg.learned_rate_cool.is_empty() {
        return (0..control::RATE_BUCKET_COUNT)
            .map(|i| {
                let heat = cfg.learned_rate_heat.get(i).copied().unwrap_or(0);
                let cool = cfg.learned_rate_cool.get(i).copied().unwrap_or(0);
                (heat + cool) / 2
            })
            .collect();
    }
    Vec::new()
}

/// Learned bias for the current rate-of-change bucket.
///
/// Contributes nothing unless the selected table is fully populated.
fn sample_rate_bias(temp_delta: i32, cfg: &SmartControlConfig) -> i32 {
    let biases = select_rate_biases_for_trend(temp_delta, cfg);
    if biases.len() != control::RATE_BUCKET_COUNT {
        return 0;
    }
    biases[offsets::rate_bucket_index(temp_delta)]
}

//! Configuration normalization
//!
//! Repairs every tunable to its valid range and reconciles the learned arrays
//! with the current curve. Normalization is idempotent: a second pass over an
//! already-normalized configuration reports no change.

use crate::constants::timing;
use crate::data::{sanitize_curve, AppConfig, CurvePoint, SmartControlConfig};
use crate::engine::offsets;

/// Normalize the smart-control block against a curve.
///
/// Out-of-range scalars are replaced with their defaults, learned arrays are
/// resized and re-clamped, and the blended view is recomputed from heat and
/// cool. Returns the repaired config and whether anything changed.
pub fn normalize_smart_control(
    mut cfg: SmartControlConfig,
    curve: &[CurvePoint],
) -> (SmartControlConfig, bool) {
    let defaults = SmartControlConfig::defaults_for(curve);
    let mut changed = false;

    if !cfg.learning {
        cfg.learning = true;
        changed = true;
    }

    let mut repair = |value: &mut i32, min: i32, max: i32, default: i32| {
        if *value < min || *value > max {
            *value = default;
            changed = true;
        }
    };

    repair(&mut cfg.target_temp, 45, 90, defaults.target_temp);
    repair(&mut cfg.aggressiveness, 1, 10, defaults.aggressiveness);
    repair(&mut cfg.hysteresis, 0, 8, defaults.hysteresis);
    repair(&mut cfg.min_rpm_change, 20, 400, defaults.min_rpm_change);
    repair(&mut cfg.ramp_up_limit, 50, 1200, defaults.ramp_up_limit);
    repair(&mut cfg.ramp_down_limit, 50, 1200, defaults.ramp_down_limit);
    repair(&mut cfg.learn_rate, 1, 10, defaults.learn_rate);
    repair(&mut cfg.learn_window, 3, 24, defaults.learn_window);
    repair(&mut cfg.learn_delay, 1, 8, defaults.learn_delay);
    repair(&mut cfg.overheat_weight, 1, 12, defaults.overheat_weight);
    repair(&mut cfg.rpm_delta_weight, 1, 12, defaults.rpm_delta_weight);
    repair(&mut cfg.noise_weight, 0, 12, defaults.noise_weight);
    repair(&mut cfg.trend_gain, 1, 12, defaults.trend_gain);
    repair(&mut cfg.max_learn_offset, 100, 2000, defaults.max_learn_offset);

    if cfg.ramp_down_limit > cfg.ramp_up_limit + 300 {
        cfg.ramp_down_limit = cfg.ramp_up_limit + 300;
        changed = true;
    }

    if cfg.learned_offsets.len() != curve.len() {
        cfg.learned_offsets = resize_copy(&cfg.learned_offsets, curve.len());
        changed = true;
    }

    if cfg.learned_offsets_heat.len() != curve.len() {
        cfg.learned_offsets_heat = if cfg.learned_offsets_heat.is_empty() {
            // Seed a fresh heat table from the blended view
            resize_copy(&cfg.learned_offsets, curve.len())
        } else {
            resize_copy(&cfg.learned_offsets_heat, curve.len())
        };
        changed = true;
    }
    let (heat, heat_changed) =
        offsets::constrain_offsets_to_curve(&cfg.learned_offsets_heat, curve, cfg.max_learn_offset);
    if heat_changed {
        cfg.learned_offsets_heat = heat;
        changed = true;
    }

    if cfg.learned_offsets_cool.len() != curve.len() {
        cfg.learned_offsets_cool = if cfg.learned_offsets_cool.is_empty() {
            resize_copy(&cfg.learned_offsets, curve.len())
        } else {
            resize_copy(&cfg.learned_offsets_cool, curve.len())
        };
        changed = true;
    }
    let (cool, cool_changed) =
        offsets::constrain_offsets_to_curve(&cfg.learned_offsets_cool, curve, cfg.max_learn_offset);
    if cool_changed {
        cfg.learned_offsets_cool = cool;
        changed = true;
    }

    let (rate_heat, rate_heat_changed) =
        offsets::normalize_rate_biases(&cfg.learned_rate_heat, cfg.max_learn_offset);
    if rate_heat_changed {
        cfg.learned_rate_heat = rate_heat;
        changed = true;
    }
    let (rate_cool, rate_cool_changed) =
        offsets::normalize_rate_biases(&cfg.learned_rate_cool, cfg.max_learn_offset);
    if rate_cool_changed {
        cfg.learned_rate_cool = rate_cool;
        changed = true;
    }

    let mut blended =
        offsets::blend_offsets(&cfg.learned_offsets_heat, &cfg.learned_offsets_cool);
    let (constrained, _) =
        offsets::constrain_offsets_to_curve(&blended, curve, cfg.max_learn_offset);
    blended = constrained;
    if blended != cfg.learned_offsets {
        cfg.learned_offsets = blended;
        changed = true;
    }

    (cfg, changed)
}

/// Normalize the whole configuration document.
///
/// Repairs the outer fields, repairs the curve, then normalizes the
/// smart-control block against the repaired curve.
pub fn normalize_app_config(mut cfg: AppConfig) -> (AppConfig, bool) {
    let mut changed = false;

    if cfg.temp_update_rate < timing::MIN_UPDATE_RATE_SECS
        || cfg.temp_update_rate > timing::MAX_UPDATE_RATE_SECS
    {
        cfg.temp_update_rate = AppConfig::default().temp_update_rate;
        changed = true;
    }
    if cfg.temp_sample_count < timing::MIN_SAMPLE_COUNT
        || cfg.temp_sample_count > timing::MAX_SAMPLE_COUNT
    {
        cfg.temp_sample_count = AppConfig::default().temp_sample_count;
        changed = true;
    }

    let repaired = sanitize_curve(cfg.fan_curve.clone());
    if repaired != cfg.fan_curve {
        cfg.fan_curve = repaired;
        changed = true;
    }

    let (smart, smart_changed) = normalize_smart_control(cfg.smart_control, &cfg.fan_curve);
    cfg.smart_control = smart;
    changed |= smart_changed;

    (cfg, changed)
}

fn resize_copy(values: &[i32], len: usize) -> Vec<i32> {
    let mut resized = vec![0i32; len];
    for (slot, value) in resized.iter_mut().zip(values.iter()) {
        *slot = *value;
    }
    resized
}

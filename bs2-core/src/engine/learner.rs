//! Stability-gated offset learning
//!
//! Runs after the target calculator on every tick with enough history. Scores
//! the tick (temperature error, overheat, trend, minus churn and noise
//! penalties), quantizes the score into a small step, and spreads it over the
//! curve points around the delayed learning temperature. Heating and cooling
//! keep separate tables because fan-up aggressiveness and cooling inertia are
//! asymmetric; a light bleed into the passive table keeps the two from
//! drifting apart entirely.

use crate::constants::{control, device};
use crate::data::{CurvePoint, SmartControlConfig};
use crate::engine::offsets;

/// Per-tick values the learner scores
#[derive(Debug, Clone, Copy)]
pub struct LearnSample {
    pub avg_temp: i32,
    pub last_avg_temp: i32,
    pub target_rpm: i32,
    pub last_target_rpm: i32,
}

/// Updated learned state produced by one learning pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LearnOutcome {
    pub heat: Vec<i32>,
    pub cool: Vec<i32>,
    pub rate_heat: Vec<i32>,
    pub rate_cool: Vec<i32>,
    pub blended: Vec<i32>,
    pub changed: bool,
}

impl LearnOutcome {
    /// Write the outcome back into the configuration
    pub fn apply_to(self, cfg: &mut SmartControlConfig) {
        cfg.learned_offsets_heat = self.heat;
        cfg.learned_offsets_cool = self.cool;
        cfg.learned_rate_heat = self.rate_heat;
        cfg.learned_rate_cool = self.rate_cool;
        cfg.learned_offsets = self.blended;
    }
}

/// Learn offset and rate-bias updates from one tick.
///
/// `recent_avg_temps` is the driver's averaged-temperature FIFO, oldest
/// first. Skips (returns `changed = false`) when history is short, the
/// stability window is too noisy without an overheat override, or the raw
/// score lands inside the dead-band.
pub fn learn_curve_offsets(
    sample: LearnSample,
    recent_avg_temps: &[i32],
    curve: &[CurvePoint],
    cfg: &SmartControlConfig,
) -> LearnOutcome {
    let (rate_heat, _) = offsets::normalize_rate_biases(&cfg.learned_rate_heat, cfg.max_learn_offset);
    let (rate_cool, _) = offsets::normalize_rate_biases(&cfg.learned_rate_cool, cfg.max_learn_offset);

    if curve.is_empty() {
        return LearnOutcome {
            heat: cfg.learned_offsets_heat.clone(),
            cool: cfg.learned_offsets_cool.clone(),
            rate_heat,
            rate_cool,
            blended: cfg.learned_offsets.clone(),
            changed: false,
        };
    }

    let mut heat = resize_copy(&cfg.learned_offsets_heat, curve.len());
    let mut cool = resize_copy(&cfg.learned_offsets_cool, curve.len());
    let mut rate_heat = rate_heat;
    let mut rate_cool = rate_cool;

    let skip = |heat: Vec<i32>, cool: Vec<i32>, rate_heat: Vec<i32>, rate_cool: Vec<i32>| {
        let blended = blended_view(&heat, &cool, curve, cfg.max_learn_offset);
        LearnOutcome { heat, cool, rate_heat, rate_cool, blended, changed: false }
    };

    let learning_window = cfg.learn_window.max(3) as usize;
    let learning_delay = cfg.learn_delay.max(1) as usize;
    let min_required = learning_window + learning_delay;
    if recent_avg_temps.len() < min_required {
        return skip(heat, cool, rate_heat, rate_cool);
    }

    let window_start = recent_avg_temps.len() - min_required;
    let window = &recent_avg_temps[window_start..window_start + learning_window];
    if !is_stable_window(window, cfg.hysteresis + 1) {
        // Thermal runaway trumps the stability gate
        let overheat_margin = cfg.target_temp + cfg.hysteresis + 3;
        if sample.avg_temp < overheat_margin {
            return skip(heat, cool, rate_heat, rate_cool);
        }
    }

    // Look back past the thermal inertia: the fan action we are judging
    // happened learn_delay samples ago.
    let learn_temp = recent_avg_temps[recent_avg_temps.len() - learning_delay];
    let learn_prev_temp = recent_avg_temps[recent_avg_temps.len() - learning_delay - 1];
    let learn_temp_delta = learn_temp - learn_prev_temp;

    let idx = offsets::nearest_curve_index(learn_temp, curve) as isize;
    let error_temp = sample.avg_temp - cfg.target_temp;
    let temp_delta = sample.avg_temp - sample.last_avg_temp;
    let overheat = (sample.avg_temp - (cfg.target_temp + cfg.hysteresis)).max(0);
    let rpm_delta = (sample.target_rpm - sample.last_target_rpm).abs();
    let noise = (sample.target_rpm - device::NOISE_FLOOR_RPM).max(0);

    let temp_term = error_temp * (4 + cfg.learn_rate);
    let overheat_term = overheat * (2 + cfg.overheat_weight);
    let trend_term = temp_delta * (2 + cfg.trend_gain);
    let change_penalty = (rpm_delta / cfg.min_rpm_change.max(30)) * (2 + cfg.rpm_delta_weight);
    let noise_penalty = (noise / 180) * cfg.noise_weight;

    let mut raw = temp_term + overheat_term + trend_term - change_penalty - noise_penalty;

    if temp_delta > 0 {
        // Reward spinning up while still approaching the setpoint
        let preheat_band = cfg.hysteresis + 4;
        let distance_to_target = cfg.target_temp - sample.avg_temp;
        if distance_to_target >= 0 && distance_to_target <= preheat_band {
            raw += (preheat_band - distance_to_target) * (1 + cfg.trend_gain / 2);
        }
    }

    if learn_temp_delta > 0 {
        raw += learn_temp_delta * (2 + cfg.trend_gain);
    }
    if learn_temp_delta < 0 {
        raw += learn_temp_delta * (cfg.trend_gain / 2).max(1);
    }

    if error_temp < -cfg.hysteresis - 1 && temp_delta <= 0 {
        // Running cold and not heating: spend less RPM
        raw -= 3 + cfg.noise_weight;
    }

    let low_rpm_delta_band = (cfg.min_rpm_change / 2).max(20);
    if temp_delta > 0 && rpm_delta <= low_rpm_delta_band && error_temp <= cfg.hysteresis + 2 {
        raw -= 4 + cfg.noise_weight / 2;
    }

    if raw.abs() < control::LEARN_DEADBAND {
        return skip(heat, cool, rate_heat, rate_cool);
    }

    // Compress the score into a small step so the curve cannot jump
    let denominator = (24 - cfg.learn_rate * 2).max(10);
    let mut delta = raw / denominator;
    if delta == 0 {
        delta = raw.signum();
    }
    let delta = delta.clamp(-4, 6);

    let rate_denominator = (28 - cfg.learn_rate * 2).max(14);
    let mut rate_delta = raw / rate_denominator;
    if rate_delta == 0 {
        rate_delta = raw.signum();
    }
    let rate_delta = rate_delta.clamp(-3, 4);

    let heating = temp_delta >= 0;
    let rate_idx = offsets::rate_bucket_index(temp_delta) as isize;
    let mut changed = false;

    {
        let (active, passive) = if heating {
            (&mut heat, &mut cool)
        } else {
            (&mut cool, &mut heat)
        };

        changed |= apply_delta_at_index(active, idx, delta, curve, cfg.max_learn_offset);
        changed |= apply_delta_at_index(active, idx - 1, scaled_delta(delta, 2, 3), curve, cfg.max_learn_offset);
        changed |= apply_delta_at_index(active, idx + 1, scaled_delta(delta, 2, 3), curve, cfg.max_learn_offset);
        changed |= apply_delta_at_index(active, idx - 2, scaled_delta(delta, 1, 3), curve, cfg.max_learn_offset);
        changed |= apply_delta_at_index(active, idx + 2, scaled_delta(delta, 1, 3), curve, cfg.max_learn_offset);

        changed |= apply_delta_at_index(passive, idx, scaled_delta(delta, 1, 8), curve, cfg.max_learn_offset);
    }

    {
        let (active_rate, passive_rate) = if heating {
            (&mut rate_heat, &mut rate_cool)
        } else {
            (&mut rate_cool, &mut rate_heat)
        };

        changed |= apply_rate_delta_at_index(active_rate, rate_idx, rate_delta, cfg.max_learn_offset);
        changed |= apply_rate_delta_at_index(active_rate, rate_idx - 1, scaled_delta(rate_delta, 2, 3), cfg.max_learn_offset);
        changed |= apply_rate_delta_at_index(active_rate, rate_idx + 1, scaled_delta(rate_delta, 2, 3), cfg.max_learn_offset);
        changed |= apply_rate_delta_at_index(passive_rate, rate_idx, scaled_delta(rate_delta, 1, 8), cfg.max_learn_offset);
    }

    changed |= smooth_and_clamp_offsets(&mut heat, curve, cfg.max_learn_offset);
    changed |= smooth_and_clamp_offsets(&mut cool, curve, cfg.max_learn_offset);
    changed |= smooth_rate_biases(&mut rate_heat, cfg.max_learn_offset);
    changed |= smooth_rate_biases(&mut rate_cool, cfg.max_learn_offset);

    let blended = blended_view(&heat, &cool, curve, cfg.max_learn_offset);
    changed |= blended != cfg.learned_offsets;

    LearnOutcome { heat, cool, rate_heat, rate_cool, blended, changed }
}

fn blended_view(
    heat: &[i32],
    cool: &[i32],
    curve: &[CurvePoint],
    max_learn_offset: i32,
) -> Vec<i32> {
    let blended = offsets::blend_offsets(heat, cool);
    let (constrained, _) = offsets::constrain_offsets_to_curve(&blended, curve, max_learn_offset);
    constrained
}

/// Add a delta at a curve index, routed through the per-point clamp.
///
/// Out-of-range indexes are ignored. Returns whether the entry changed.
fn apply_delta_at_index(
    offset_table: &mut [i32],
    idx: isize,
    delta: i32,
    curve: &[CurvePoint],
    max_learn_offset: i32,
) -> bool {
    if delta == 0 || idx < 0 {
        return false;
    }
    let idx = idx as usize;
    if idx >= offset_table.len() || idx >= curve.len() {
        return false;
    }
    let (edge_min, edge_max) = offsets::curve_edge_rpm_bounds(curve);
    let new_value = offsets::clamp_offset_for_point(
        offset_table[idx] + delta,
        curve[idx].rpm,
        edge_min,
        edge_max,
        max_learn_offset,
    );
    if new_value == offset_table[idx] {
        return false;
    }
    offset_table[idx] = new_value;
    true
}

/// Add a delta at a rate bucket, clamped to the rate cap
fn apply_rate_delta_at_index(
    biases: &mut [i32],
    idx: isize,
    delta: i32,
    max_learn_offset: i32,
) -> bool {
    if delta == 0 || idx < 0 {
        return false;
    }
    let idx = idx as usize;
    if idx >= biases.len() {
        return false;
    }
    let new_value = offsets::clamp_rate_bias(biases[idx] + delta, max_learn_offset);
    if new_value == biases[idx] {
        return false;
    }
    biases[idx] = new_value;
    true
}

/// Scale a delta by `numerator/denominator`, rounding magnitude up so a
/// non-zero delta never scales to zero
fn scaled_delta(delta: i32, numerator: i32, denominator: i32) -> i32 {
    if delta == 0 || denominator <= 0 {
        return 0;
    }
    let scaled = ((delta.abs() * numerator + denominator - 1) / denominator).max(1);
    if delta < 0 {
        -scaled
    } else {
        scaled
    }
}

/// 3-tap weighted smoothing (1,5,1) with a neighbour-jump cap, then the
/// per-point clamp. Mutates in place; returns whether anything changed.
fn smooth_and_clamp_offsets(
    offset_table: &mut [i32],
    curve: &[CurvePoint],
    max_learn_offset: i32,
) -> bool {
    if offset_table.is_empty() || curve.is_empty() {
        return false;
    }
    let (edge_min, edge_max) = offsets::curve_edge_rpm_bounds(curve);

    let smoothed: Vec<i32> = (0..offset_table.len())
        .map(|i| {
            let mut weighted = offset_table[i] * 5;
            let mut weight = 5;
            if i > 0 {
                weighted += offset_table[i - 1];
                weight += 1;
            }
            if i + 1 < offset_table.len() {
                weighted += offset_table[i + 1];
                weight += 1;
            }
            weighted / weight
        })
        .collect();

    let max_jump = (max_learn_offset / 10).clamp(20, 90);
    let mut changed = false;
    for i in 0..offset_table.len() {
        let mut candidate = smoothed[i];
        if i > 0 {
            candidate = candidate.clamp(offset_table[i - 1] - max_jump, offset_table[i - 1] + max_jump);
        }
        if let Some(point) = curve.get(i) {
            candidate = offsets::clamp_offset_for_point(
                candidate,
                point.rpm,
                edge_min,
                edge_max,
                max_learn_offset,
            );
        }
        if candidate != offset_table[i] {
            offset_table[i] = candidate;
            changed = true;
        }
    }
    changed
}

/// 3-tap weighted smoothing (2,4,2) for the rate tables with a tighter jump cap
fn smooth_rate_biases(biases: &mut [i32], max_learn_offset: i32) -> bool {
    if biases.is_empty() {
        return false;
    }

    let smoothed: Vec<i32> = (0..biases.len())
        .map(|i| {
            let mut weighted = biases[i] * 4;
            let mut weight = 4;
            if i > 0 {
                weighted += biases[i - 1] * 2;
                weight += 2;
            }
            if i + 1 < biases.len() {
                weighted += biases[i + 1] * 2;
                weight += 2;
            }
            weighted / weight
        })
        .collect();

    let max_jump = (max_learn_offset / 20).clamp(12, 45);
    let mut changed = false;
    for i in 0..biases.len() {
        let mut candidate = offsets::clamp_rate_bias(smoothed[i], max_learn_offset);
        if i > 0 {
            candidate = candidate.clamp(biases[i - 1] - max_jump, biases[i - 1] + max_jump);
        }
        if candidate != biases[i] {
            biases[i] = candidate;
            changed = true;
        }
    }
    changed
}

/// A window is stable when its spread fits inside the allowed range
fn is_stable_window(temps: &[i32], allowed_range: i32) -> bool {
    let (first, rest) = match temps.split_first() {
        Some(split) => split,
        None => return false,
    };
    let mut min_temp = *first;
    let mut max_temp = *first;
    for &temp in rest {
        min_temp = min_temp.min(temp);
        max_temp = max_temp.max(temp);
    }
    max_temp - min_temp <= allowed_range.max(2)
}

fn resize_copy(values: &[i32], len: usize) -> Vec<i32> {
    let mut resized = vec![0i32; len];
    for (slot, value) in resized.iter_mut().zip(values.iter()) {
        *slot = *value;
    }
    resized
}

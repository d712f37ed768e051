//! Learned offset store
//!
//! Two per-curve-point offset tables (heat, cool), a blended view, and two
//! rate-of-change bias tables. Every mutation funnels through the clamps in
//! this module so the invariants hold:
//!
//! - no offset pushes a point's RPM outside the envelope set by the curve's
//!   endpoint RPMs,
//! - every offset stays within `±max_learn_offset`,
//! - every rate bias stays within the rate cap,
//! - the effective curve is non-decreasing in RPM.

use crate::constants::control;
use crate::data::CurvePoint;

/// RPM envelope defined by the curve's endpoint RPMs, low edge first.
///
/// An empty curve yields `(0, 4000)` so clamping against it is a no-op.
pub fn curve_edge_rpm_bounds(curve: &[CurvePoint]) -> (i32, i32) {
    match (curve.first(), curve.last()) {
        (Some(first), Some(last)) => {
            let left = first.rpm;
            let right = last.rpm;
            if left > right {
                (right, left)
            } else {
                (left, right)
            }
        }
        _ => (0, crate::constants::device::MAX_RPM),
    }
}

/// Clamp an offset so `base_rpm + offset` stays inside the curve envelope and
/// the offset itself stays inside `±max_learn_offset`.
///
/// Returns 0 when the admissible range is empty.
pub fn clamp_offset_for_point(
    offset: i32,
    base_rpm: i32,
    edge_min: i32,
    edge_max: i32,
    max_learn_offset: i32,
) -> i32 {
    let min_offset = (edge_min - base_rpm).max(-max_learn_offset);
    let max_offset = (edge_max - base_rpm).min(max_learn_offset);
    if min_offset > max_offset {
        return 0;
    }
    offset.clamp(min_offset, max_offset)
}

/// Re-clamp a whole offset table against the curve.
///
/// Entries beyond the curve length are zeroed. Returns the repaired table and
/// whether anything changed.
pub fn constrain_offsets_to_curve(
    offsets: &[i32],
    curve: &[CurvePoint],
    max_learn_offset: i32,
) -> (Vec<i32>, bool) {
    if offsets.is_empty() || curve.is_empty() {
        return (offsets.to_vec(), false);
    }

    let (edge_min, edge_max) = curve_edge_rpm_bounds(curve);
    let mut changed = false;
    let mut repaired = offsets.to_vec();
    for (i, value) in repaired.iter_mut().enumerate() {
        let clamped = match curve.get(i) {
            Some(point) => {
                clamp_offset_for_point(*value, point.rpm, edge_min, edge_max, max_learn_offset)
            }
            None => 0,
        };
        if clamped != *value {
            *value = clamped;
            changed = true;
        }
    }
    (repaired, changed)
}

/// Element-wise integer mean of the heat and cool tables.
///
/// Missing entries count as 0; the result is as long as the longer input.
/// Both inputs empty yields an empty table.
pub fn blend_offsets(heat: &[i32], cool: &[i32]) -> Vec<i32> {
    if heat.is_empty() && cool.is_empty() {
        return Vec::new();
    }

    let size = heat.len().max(cool.len());
    (0..size)
        .map(|i| {
            let h = heat.get(i).copied().unwrap_or(0);
            let c = cool.get(i).copied().unwrap_or(0);
            (h + c) / 2
        })
        .collect()
}

/// Build the effective curve: baseline plus offsets, clamped to the envelope,
/// with monotonicity restored.
///
/// Indexes missing from `active` fall back to `blended`, then to 0.
pub fn effective_curve(
    curve: &[CurvePoint],
    active: &[i32],
    blended: &[i32],
    max_learn_offset: i32,
) -> Vec<CurvePoint> {
    let (edge_min, edge_max) = curve_edge_rpm_bounds(curve);
    let mut effective: Vec<CurvePoint> = curve
        .iter()
        .enumerate()
        .map(|(i, point)| {
            let offset = active
                .get(i)
                .or_else(|| blended.get(i))
                .copied()
                .unwrap_or(0);
            let offset =
                clamp_offset_for_point(offset, point.rpm, edge_min, edge_max, max_learn_offset);
            CurvePoint {
                temperature: point.temperature,
                rpm: (point.rpm + offset).clamp(edge_min, edge_max),
            }
        })
        .collect();
    enforce_non_decreasing(&mut effective);
    effective
}

/// Raise any point whose RPM dips below its predecessor
pub fn enforce_non_decreasing(curve: &mut [CurvePoint]) {
    for i in 1..curve.len() {
        if curve[i].rpm < curve[i - 1].rpm {
            curve[i].rpm = curve[i - 1].rpm;
        }
    }
}

/// Index of the curve point nearest a temperature, ties to the lower index
pub fn nearest_curve_index(temp: i32, curve: &[CurvePoint]) -> usize {
    let mut idx = 0;
    let mut best = match curve.first() {
        Some(point) => (point.temperature - temp).abs(),
        None => return 0,
    };
    for (i, point) in curve.iter().enumerate().skip(1) {
        let distance = (point.temperature - temp).abs();
        if distance < best {
            best = distance;
            idx = i;
        }
    }
    idx
}

/// Bucket for a per-tick temperature delta: clamp to ±3, shift to 0..7
pub fn rate_bucket_index(temp_delta: i32) -> usize {
    let clamped = temp_delta.clamp(control::RATE_BUCKET_MIN, control::RATE_BUCKET_MAX);
    (clamped - control::RATE_BUCKET_MIN) as usize
}

/// Bound a rate bias to the cap derived from `max_learn_offset`
pub fn clamp_rate_bias(value: i32, max_learn_offset: i32) -> i32 {
    let cap = (max_learn_offset / 2).clamp(80, 600);
    value.clamp(-cap, cap)
}

/// Resize a rate-bias table to the bucket count and clamp every entry.
///
/// Returns the repaired table and whether anything changed.
pub fn normalize_rate_biases(biases: &[i32], max_learn_offset: i32) -> (Vec<i32>, bool) {
    let mut changed = biases.len() != control::RATE_BUCKET_COUNT;
    let mut normalized = vec![0i32; control::RATE_BUCKET_COUNT];
    for (slot, value) in normalized.iter_mut().zip(biases.iter()) {
        *slot = *value;
    }

    for value in normalized.iter_mut() {
        let clamped = clamp_rate_bias(*value, max_learn_offset);
        if clamped != *value {
            *value = clamped;
            changed = true;
        }
    }

    (normalized, changed)
}

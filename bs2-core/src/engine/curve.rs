//! Piecewise-linear fan curve evaluation
//!
//! Given a temperature, finds the fan RPM by interpolating between curve
//! points. All arithmetic is integer; division truncates toward zero.

use crate::data::CurvePoint;

/// Evaluate the curve at a temperature.
///
/// - Below the first point: the first point's RPM.
/// - Above the last point: the last point's RPM.
/// - Between points: integer linear interpolation.
/// - Empty curve: 0, meaning "no control".
pub fn evaluate(temp: i32, curve: &[CurvePoint]) -> i32 {
    let (first, last) = match (curve.first(), curve.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return 0,
    };

    if temp <= first.temperature {
        return first.rpm;
    }
    if temp >= last.temperature {
        return last.rpm;
    }

    for window in curve.windows(2) {
        let lower = &window[0];
        let upper = &window[1];
        if temp >= lower.temperature && temp <= upper.temperature {
            let temp_range = upper.temperature - lower.temperature;
            if temp_range == 0 {
                return lower.rpm;
            }
            let rpm_range = upper.rpm - lower.rpm;
            return lower.rpm + (temp - lower.temperature) * rpm_range / temp_range;
        }
    }

    last.rpm
}

//! Validation and repair for user-supplied configuration

use bs2_error::{Bs2Error, Result};

use crate::constants::{device, limits};
use crate::data::CurvePoint;

/// Validate a curve for use by the control core.
///
/// Points must be strictly increasing in temperature with RPMs inside the
/// device envelope.
pub fn validate_curve_points(points: &[CurvePoint]) -> Result<()> {
    if points.is_empty() {
        return Err(Bs2Error::InvalidCurve("curve must have at least one point".into()));
    }

    if points.len() > limits::MAX_CURVE_POINTS {
        return Err(Bs2Error::InvalidCurve(format!(
            "curve exceeds maximum of {} points",
            limits::MAX_CURVE_POINTS
        )));
    }

    for (index, point) in points.iter().enumerate() {
        if !(0..=limits::MAX_CURVE_TEMPERATURE).contains(&point.temperature) {
            return Err(Bs2Error::InvalidCurve(format!(
                "point {} has invalid temperature {}°C (must be 0-{}°C)",
                index, point.temperature, limits::MAX_CURVE_TEMPERATURE
            )));
        }
        if !(0..=device::MAX_RPM).contains(&point.rpm) {
            return Err(Bs2Error::InvalidCurve(format!(
                "point {} has invalid RPM {} (must be 0-{})",
                index, point.rpm, device::MAX_RPM
            )));
        }
    }

    for window in points.windows(2) {
        if window[0].temperature >= window[1].temperature {
            return Err(Bs2Error::InvalidCurve(
                "curve points must be strictly increasing in temperature".into(),
            ));
        }
    }

    Ok(())
}

/// Repair a curve received over the message queue.
///
/// Sorts by temperature, keeps the last point for a duplicated temperature,
/// and clamps RPMs to the device envelope. Returns the repaired curve; an
/// empty input stays empty (the driver treats that as "no control").
pub fn sanitize_curve(points: Vec<CurvePoint>) -> Vec<CurvePoint> {
    let mut sorted = points;
    sorted.sort_by_key(|p| p.temperature);

    let mut repaired: Vec<CurvePoint> = Vec::with_capacity(sorted.len());
    for point in sorted {
        let clamped = CurvePoint {
            temperature: point.temperature.clamp(0, limits::MAX_CURVE_TEMPERATURE),
            rpm: point.rpm.clamp(0, device::MAX_RPM),
        };
        match repaired.last_mut() {
            Some(last) if last.temperature == clamped.temperature => *last = clamped,
            _ => repaired.push(clamped),
        }
    }

    repaired.truncate(limits::MAX_CURVE_POINTS);
    repaired
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(temperature: i32, rpm: i32) -> CurvePoint {
        CurvePoint { temperature, rpm }
    }

    #[test]
    fn test_validate_accepts_default_curve() {
        let curve = crate::constants::default_curve::standard();
        assert!(validate_curve_points(&curve).is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_curve() {
        assert!(validate_curve_points(&[]).is_err());
    }

    #[test]
    fn test_validate_rejects_unsorted_curve() {
        let curve = vec![point(50, 1800), point(40, 1400)];
        assert!(validate_curve_points(&curve).is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_temperatures() {
        let curve = vec![point(40, 1400), point(40, 1500)];
        assert!(validate_curve_points(&curve).is_err());
    }

    #[test]
    fn test_validate_rejects_rpm_above_device_limit() {
        let curve = vec![point(40, 4100)];
        assert!(validate_curve_points(&curve).is_err());
    }

    #[test]
    fn test_sanitize_sorts_and_dedups() {
        let curve = vec![point(50, 1800), point(30, 1000), point(50, 1900)];
        let repaired = sanitize_curve(curve);
        assert_eq!(repaired, vec![point(30, 1000), point(50, 1900)]);
        assert!(validate_curve_points(&repaired).is_ok());
    }

    #[test]
    fn test_sanitize_clamps_rpm() {
        let repaired = sanitize_curve(vec![point(40, 9999), point(30, -5)]);
        assert_eq!(repaired, vec![point(30, 0), point(40, 4000)]);
    }

    #[test]
    fn test_sanitize_keeps_empty_curve_empty() {
        assert!(sanitize_curve(Vec::new()).is_empty());
    }
}

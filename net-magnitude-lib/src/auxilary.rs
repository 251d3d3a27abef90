//! Auxiliary constants and helper functions.
//!
//! This module provides numerical constants, sentinel values and utility
//! functions shared by the magnitude computation modules.

use geo::{Distance, Haversine, Point};

/// Sentinel magnitude value used wherever a station or network magnitude
/// could not be computed.
pub const NA_MAGNITUDE: f64 = -999.0;

/// Sentinel uncertainty value for records without a usable error estimate.
pub const NA_UNCERTAINTY: f64 = -1.0;

/// Sentinel magnitude residual value.
pub const NA_RESIDUAL: f64 = -999.0;

/// Sentinel returned when a transmission-loss type carries no modelling-error
/// table. Callers substitute the baseline standard deviation of the magnitude
/// type.
pub const NA_MODEL_ERROR: f64 = -999.9;

/// Sentinel database identifier.
pub const NA_ID: i64 = -1;

/// Mean Earth radius in meters, consistent with the Haversine distance used
/// for epicentral distances.
pub const MEAN_EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Check if two floating-point numbers are approximately equal within a given
/// tolerance (epsilon).
///
/// # Examples
///
/// ```
/// use net_magnitude_lib::auxilary::approx_equal;
/// assert!(approx_equal(1.00001, 1.00002, 0.0001));
/// ```
pub fn approx_equal(a: f64, b: f64, epsilon: f64) -> bool {
    (a - b).abs() < epsilon
}

/// Is this a valid (non-sentinel) magnitude value?
///
/// Comparisons against [`NA_MAGNITUDE`] use a coarse 0.1 tolerance since the
/// sentinel may have passed through single-precision table storage.
pub fn valid_magnitude(mag: f64) -> bool {
    (mag - NA_MAGNITUDE).abs() >= 0.1
}

/// Compute the epicentral distance between two geographic points, in arc
/// degrees.
///
/// # Arguments
///
/// * `lat1`, `lon1` - First point in decimal degrees.
/// * `lat2`, `lon2` - Second point in decimal degrees.
///
/// # Returns
///
/// Great-circle arc distance in degrees.
///
/// # Example
///
/// ```
/// use net_magnitude_lib::auxilary::{approx_equal, delta_degrees};
/// let delta = delta_degrees(0.0, 0.0, 0.0, 90.0);
/// assert!(approx_equal(delta, 90.0, 0.1));
/// ```
pub fn delta_degrees(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let meters = Haversine.distance(Point::new(lon1, lat1), Point::new(lon2, lat2));
    (meters / MEAN_EARTH_RADIUS_M).to_degrees()
}

/// Error function approximation (Abramowitz & Stegun 7.1.26, |error| < 1.5e-7).
///
/// Used by the maximum-likelihood estimator for one-sided Gaussian tail
/// probabilities of clipped and non-detection observations.
pub fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();

    sign * y
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_approx_equal_true() {
        assert!(approx_equal(1.000001, 1.000002, 0.00001));
    }

    #[test]
    fn test_approx_equal_false() {
        assert!(!approx_equal(1.0, 1.1, 0.00001));
    }

    #[test]
    fn test_valid_magnitude() {
        assert!(valid_magnitude(4.5));
        assert!(valid_magnitude(0.0));
        assert!(!valid_magnitude(NA_MAGNITUDE));
        assert!(!valid_magnitude(-999.04));
    }

    #[test]
    fn test_delta_degrees_quarter_circle() {
        assert!(approx_equal(delta_degrees(0.0, 0.0, 0.0, 90.0), 90.0, 0.1));
    }

    #[test]
    fn test_delta_degrees_zero() {
        assert!(delta_degrees(51.92, 143.04, 51.92, 143.04) < 1e-9);
    }

    #[test]
    fn test_erf_known_values() {
        assert!(approx_equal(erf(0.0), 0.0, 1e-7));
        assert!(approx_equal(erf(1.0), 0.8427007929, 1e-6));
        assert!(approx_equal(erf(-1.0), -0.8427007929, 1e-6));
        assert!(approx_equal(erf(2.0), 0.9953222650, 1e-6));
    }

    #[test]
    fn test_erf_saturates() {
        assert!(erf(6.0) > 0.999999);
        assert!(erf(-6.0) < -0.999999);
    }
}

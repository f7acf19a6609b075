//! Small numeric helpers shared across the engine.
//!
//! Every value that crosses a tick boundary goes through [`sanitize_f32`]
//! so a single NaN from a misbehaving input cannot poison the smoothing
//! state for the rest of the session.

/// Replace non-finite values with a fallback, logging when it happens.
pub fn sanitize_f32(v: f32, fallback: f32) -> f32 {
    if v.is_finite() {
        v
    } else {
        tracing::warn!("Non-finite value sanitized to {}", fallback);
        fallback
    }
}

/// Linear interpolation between `a` and `b` by `t` in [0, 1].
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t.clamp(0.0, 1.0)
}

/// Arithmetic mean; 0.0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation; 0.0 with fewer than 2 values.
pub fn stddev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// Coefficient of variation (stddev / mean) of a set of intervals.
///
/// Returns 0.0 with fewer than 2 values or a non-positive mean, so a
/// degenerate interval sequence reads as perfectly stable rather than
/// producing a division artifact.
pub fn coefficient_of_variation(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    if m <= 0.0 {
        return 0.0;
    }
    stddev(values) / m
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sanitize_passthrough() {
        assert_eq!(sanitize_f32(0.5, 0.0), 0.5);
        assert_eq!(sanitize_f32(-1.0, 0.0), -1.0);
    }

    #[test]
    fn test_sanitize_nan_and_inf() {
        assert_eq!(sanitize_f32(f32::NAN, 0.25), 0.25);
        assert_eq!(sanitize_f32(f32::INFINITY, -0.5), -0.5);
        assert_eq!(sanitize_f32(f32::NEG_INFINITY, 0.0), 0.0);
    }

    #[test]
    fn test_mean_and_stddev() {
        let v = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((mean(&v) - 5.0).abs() < 1e-9);
        assert!((stddev(&v) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_cv_uniform_intervals_is_zero() {
        let v = [5.0, 5.0, 5.0, 5.0];
        assert_eq!(coefficient_of_variation(&v), 0.0);
    }

    #[test]
    fn test_cv_degenerate_inputs() {
        assert_eq!(coefficient_of_variation(&[]), 0.0);
        assert_eq!(coefficient_of_variation(&[3.0]), 0.0);
        assert_eq!(coefficient_of_variation(&[0.0, 0.0]), 0.0);
    }

    proptest! {
        #[test]
        fn prop_lerp_bounded(a in -1.0f32..1.0, b in -1.0f32..1.0, t in 0.0f32..1.0) {
            let v = lerp(a, b, t);
            let lo = a.min(b);
            let hi = a.max(b);
            prop_assert!(v >= lo - 1e-6 && v <= hi + 1e-6);
        }

        #[test]
        fn prop_cv_non_negative(values in proptest::collection::vec(0.1f64..100.0, 2..20)) {
            prop_assert!(coefficient_of_variation(&values) >= 0.0);
        }
    }
}

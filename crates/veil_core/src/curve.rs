//! Population response curves.
//!
//! A curve maps a population ratio in [0, 1] to a steady-state signal
//! level via piecewise-linear interpolation over a small set of control
//! points. The default curve keeps sparse regions slightly comfortable
//! (negative baseline) and ramps discomfort up as crowding grows.

use serde::{Deserialize, Serialize};

/// Piecewise-linear curve over population ratio.
///
/// Points must be sorted by population; inputs outside the covered range
/// clamp to the first/last point's value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationCurve {
    points: Vec<(f32, f32)>,
}

impl Default for PopulationCurve {
    fn default() -> Self {
        Self {
            points: vec![
                (0.0, -0.30),
                (0.2, 0.00),
                (0.5, 0.20),
                (0.8, 0.50),
                (1.0, 0.80),
            ],
        }
    }
}

impl PopulationCurve {
    /// Build a curve from control points. Points are sorted by population
    /// ratio; an empty list yields a constant-zero curve.
    pub fn new(mut points: Vec<(f32, f32)>) -> Self {
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self { points }
    }

    /// Sample the curve at a population ratio (clamped to [0, 1]).
    pub fn sample(&self, population: f32) -> f32 {
        let p = population.clamp(0.0, 1.0);
        let Some(first) = self.points.first() else {
            return 0.0;
        };
        if p <= first.0 {
            return first.1;
        }
        for pair in self.points.windows(2) {
            let (x0, y0) = pair[0];
            let (x1, y1) = pair[1];
            if p <= x1 {
                if x1 - x0 <= f32::EPSILON {
                    return y1;
                }
                let t = (p - x0) / (x1 - x0);
                return y0 + (y1 - y0) * t;
            }
        }
        self.points.last().map(|(_, y)| *y).unwrap_or(0.0)
    }

    /// True if the curve never decreases as population grows.
    pub fn is_monotonic(&self) -> bool {
        self.points.windows(2).all(|p| p[1].1 >= p[0].1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_curve_anchor_points() {
        let curve = PopulationCurve::default();
        assert!((curve.sample(0.0) - (-0.30)).abs() < 1e-6);
        assert!((curve.sample(0.2) - 0.00).abs() < 1e-6);
        assert!((curve.sample(0.5) - 0.20).abs() < 1e-6);
        assert!((curve.sample(1.0) - 0.80).abs() < 1e-6);
    }

    #[test]
    fn test_interpolation_between_points() {
        let curve = PopulationCurve::default();
        // Halfway between (0.2, 0.0) and (0.5, 0.2)
        let v = curve.sample(0.35);
        assert!((v - 0.10).abs() < 1e-6);
    }

    #[test]
    fn test_out_of_range_clamps() {
        let curve = PopulationCurve::default();
        assert_eq!(curve.sample(-0.5), curve.sample(0.0));
        assert_eq!(curve.sample(2.0), curve.sample(1.0));
    }

    #[test]
    fn test_default_is_monotonic() {
        assert!(PopulationCurve::default().is_monotonic());
    }

    #[test]
    fn test_unsorted_points_are_sorted() {
        let curve = PopulationCurve::new(vec![(1.0, 1.0), (0.0, 0.0)]);
        assert!((curve.sample(0.5) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_empty_curve_is_zero() {
        let curve = PopulationCurve::new(vec![]);
        assert_eq!(curve.sample(0.7), 0.0);
    }
}

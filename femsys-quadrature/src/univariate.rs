//! Quadrature rules for the one-dimensional domain `[-1, 1]`.

use crate::{Error, Rule1d};
use std::f64::consts::PI;

/// The largest number of points for which [`gauss_legendre`] provides a rule.
pub const MAX_GAUSS_POINTS: usize = 5;

/// Recurrence relation for Legendre polynomials.
///
/// Note: derivatives are *not* defined at |x| == 1, so this is only suitable for evaluation
/// in the open interval (-1, 1).
#[derive(Debug, Default)]
struct LegendreRecurrence {
    n: usize,
    x: f64,
    // p_n(x)
    p1: f64,
    // p_{n - 1}(x)
    p2: f64,
}

impl LegendreRecurrence {
    fn evaluate(n: usize, x: f64) -> Self {
        //  m P_m(x) = (2m - 1) * x P_{m - 1}(x) - (m - 1) P_{m - 2}(x)
        let mut p1 = 1.0;
        let mut p2 = 0.0;
        let mut p3;
        for m in 1..=n {
            let m = m as f64;
            p3 = p2;
            p2 = p1;
            p1 = ((2.0 * m - 1.0) * x * p2 - (m - 1.0) * p3) / m;
        }

        Self { n, x, p1, p2 }
    }

    fn value(&self) -> f64 {
        self.p1
    }

    fn derivative(&self) -> f64 {
        let Self { n, x, p1, p2 } = &self;
        let n = *n as f64;
        // dp_n/dx (x) = n * (x * p_n(x) - p_{n - 1}(x)) / (x^2 - 1)
        n * (x * p1 - p2) / (x * x - 1.0)
    }
}

/// Gauss-Legendre quadrature on `[-1, 1]` with `num_points` points.
///
/// Only rules with 1 to [`MAX_GAUSS_POINTS`] points are available. A rule with `n` points
/// integrates polynomials of degree up to `2 n - 1` exactly.
pub fn gauss_legendre(num_points: usize) -> Result<Rule1d, Error> {
    if num_points == 0 || num_points > MAX_GAUSS_POINTS {
        return Err(Error::NoRuleAvailable { num_points });
    }

    let n = num_points;
    let m = (n + 1) / 2;
    let mut points = Vec::with_capacity(n);
    let mut weights = Vec::with_capacity(n);

    // Only find the first m roots, the remaining ones follow by symmetry
    for i in 0..m {
        let mut x = (PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
        let mut recurrence = LegendreRecurrence::evaluate(n, x);

        // Newton's method. The initial guess is close enough that a handful of iterations
        // reach machine precision for the small orders we support.
        for _ in 0..100 {
            let dx = -recurrence.value() / recurrence.derivative();
            x += dx;
            recurrence = LegendreRecurrence::evaluate(n, x);
            if dx.abs() <= 1e-15 {
                break;
            }
        }

        let dp = recurrence.derivative();
        points.push([x]);
        weights.push(2.0 / ((1.0 - x * x) * dp * dp));
    }

    for i in m..n {
        let mirror_idx = n - i - 1;
        points.push([-points[mirror_idx][0]]);
        weights.push(weights[mirror_idx]);
    }

    // The central root of odd rules is exactly zero
    if n % 2 == 1 {
        points[m - 1] = [0.0];
    }

    Ok((weights, points))
}

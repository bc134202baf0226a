//! Symmetric quadrature rules on the standard triangle `(0, 0), (1, 0), (0, 1)`.
//!
//! Weights sum to the area of the reference triangle, `1/2`.

use crate::{Error, Rule2d};

/// Point counts for which a triangle rule is tabulated.
pub const AVAILABLE_POINT_COUNTS: [usize; 4] = [1, 3, 4, 7];

/// Returns the symmetric triangle rule with the given number of points.
///
/// | points | exact for degree |
/// |--------|------------------|
/// | 1      | 1                |
/// | 3      | 2                |
/// | 4      | 3                |
/// | 7      | 5                |
pub fn triangle(num_points: usize) -> Result<Rule2d, Error> {
    match num_points {
        1 => Ok((vec![0.5], vec![[1.0 / 3.0, 1.0 / 3.0]])),
        3 => {
            let w = 1.0 / 6.0;
            Ok((
                vec![w, w, w],
                vec![[1.0 / 6.0, 1.0 / 6.0], [2.0 / 3.0, 1.0 / 6.0], [1.0 / 6.0, 2.0 / 3.0]],
            ))
        }
        4 => {
            let w0 = -27.0 / 96.0;
            let w1 = 25.0 / 96.0;
            Ok((
                vec![w0, w1, w1, w1],
                vec![[1.0 / 3.0, 1.0 / 3.0], [0.2, 0.2], [0.6, 0.2], [0.2, 0.6]],
            ))
        }
        7 => {
            let s15 = 15.0_f64.sqrt();
            let a = (6.0 - s15) / 21.0;
            let b = (6.0 + s15) / 21.0;
            let wa = (155.0 - s15) / 2400.0;
            let wb = (155.0 + s15) / 2400.0;
            let third = 1.0 / 3.0;
            Ok((
                vec![9.0 / 80.0, wa, wa, wa, wb, wb, wb],
                vec![
                    [third, third],
                    [a, a],
                    [1.0 - 2.0 * a, a],
                    [a, 1.0 - 2.0 * a],
                    [b, b],
                    [1.0 - 2.0 * b, b],
                    [b, 1.0 - 2.0 * b],
                ],
            ))
        }
        _ => Err(Error::NoRuleAvailable { num_points }),
    }
}

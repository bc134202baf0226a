//! 2D and 3D quadrature rules formed by tensor products of Gauss-Legendre rules.

use crate::univariate::gauss_legendre;
use crate::{Error, Rule1d, Rule2d, Rule3d};

/// Combines two 1D rules pairwise. The first coordinate varies slowest.
pub fn tensor_product_2d(rule: &Rule1d) -> Rule2d {
    let (weights1d, points1d) = rule;
    let n = weights1d.len();
    let mut weights2d = Vec::with_capacity(n * n);
    let mut points2d = Vec::with_capacity(n * n);

    let rule1d_iter = || weights1d.iter().zip(points1d);

    for (&wx, &[x]) in rule1d_iter() {
        for (&wy, &[y]) in rule1d_iter() {
            weights2d.push(wx * wy);
            points2d.push([x, y]);
        }
    }

    (weights2d, points2d)
}

/// Combines three 1D rules. The first coordinate varies slowest.
pub fn tensor_product_3d(rule: &Rule1d) -> Rule3d {
    let (weights1d, points1d) = rule;
    let n = weights1d.len();
    let mut weights3d = Vec::with_capacity(n * n * n);
    let mut points3d = Vec::with_capacity(n * n * n);

    let rule1d_iter = || weights1d.iter().zip(points1d);

    for (&wx, &[x]) in rule1d_iter() {
        for (&wy, &[y]) in rule1d_iter() {
            for (&wz, &[z]) in rule1d_iter() {
                weights3d.push(wx * wy * wz);
                points3d.push([x, y, z]);
            }
        }
    }

    (weights3d, points3d)
}

/// A Gauss rule for the reference quadrilateral `[-1, 1]^2`.
pub fn quadrilateral_gauss(num_points_per_dim: usize) -> Result<Rule2d, Error> {
    gauss_legendre(num_points_per_dim).map(|rule| tensor_product_2d(&rule))
}

/// A Gauss rule for the reference hexahedron `[-1, 1]^3`.
pub fn hexahedron_gauss(num_points_per_dim: usize) -> Result<Rule3d, Error> {
    gauss_legendre(num_points_per_dim).map(|rule| tensor_product_3d(&rule))
}

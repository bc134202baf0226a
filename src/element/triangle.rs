use crate::element::{ElementFamily, ReferenceElement};
use nalgebra::DMatrix;

/// Linear triangle on the reference triangle `(0, 0), (1, 0), (0, 1)`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Tri3;

/// Quadratic triangle on the reference triangle `(0, 0), (1, 0), (0, 1)`.
///
/// Nodes 0-2 are the vertices, nodes 3, 4, 5 are the midpoints of the sides 0-1, 1-2 and 2-0.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Tri6;

const TRI_VERTICES: [[f64; 2]; 3] = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
const TRI6_MIDPOINTS: [[f64; 2]; 3] = [[0.5, 0.0], [0.5, 0.5], [0.0, 0.5]];

const TRI3_SIDES: &[&[usize]] = &[&[0, 1], &[1, 2], &[2, 0]];
// Side nodes follow the Line3 convention: end points first, midpoint last
const TRI6_SIDES: &[&[usize]] = &[&[0, 1, 3], &[1, 2, 4], &[2, 0, 5]];

/// Barycentric coordinates and their (constant) reference gradients.
fn barycentric(xi: &[f64]) -> ([f64; 3], [[f64; 2]; 3]) {
    let (x, y) = (xi[0], xi[1]);
    ([1.0 - x - y, x, y], [[-1.0, -1.0], [1.0, 0.0], [0.0, 1.0]])
}

impl ReferenceElement for Tri3 {
    fn reference_dim(&self) -> usize {
        2
    }

    fn num_nodes(&self) -> usize {
        3
    }

    fn node_reference_coords(&self, local_node: usize) -> Vec<f64> {
        TRI_VERTICES[local_node].to_vec()
    }

    fn sides(&self) -> &'static [&'static [usize]] {
        TRI3_SIDES
    }

    fn side_family(&self) -> Option<ElementFamily> {
        Some(ElementFamily::Line2)
    }

    fn basis(&self, xi: &[f64]) -> DMatrix<f64> {
        let (lambda, _) = barycentric(xi);
        DMatrix::from_row_slice(1, 3, &lambda)
    }

    fn basis_derivative(&self, _xi: &[f64]) -> DMatrix<f64> {
        DMatrix::from_row_slice(2, 3, &[-1.0, 1.0, 0.0, -1.0, 0.0, 1.0])
    }
}

impl ReferenceElement for Tri6 {
    fn reference_dim(&self) -> usize {
        2
    }

    fn num_nodes(&self) -> usize {
        6
    }

    fn node_reference_coords(&self, local_node: usize) -> Vec<f64> {
        if local_node < 3 {
            TRI_VERTICES[local_node].to_vec()
        } else {
            TRI6_MIDPOINTS[local_node - 3].to_vec()
        }
    }

    fn sides(&self) -> &'static [&'static [usize]] {
        TRI6_SIDES
    }

    fn side_family(&self) -> Option<ElementFamily> {
        Some(ElementFamily::Line3)
    }

    fn basis(&self, xi: &[f64]) -> DMatrix<f64> {
        let ([l0, l1, l2], _) = barycentric(xi);
        DMatrix::from_row_slice(
            1,
            6,
            &[
                l0 * (2.0 * l0 - 1.0),
                l1 * (2.0 * l1 - 1.0),
                l2 * (2.0 * l2 - 1.0),
                4.0 * l0 * l1,
                4.0 * l1 * l2,
                4.0 * l2 * l0,
            ],
        )
    }

    fn basis_derivative(&self, xi: &[f64]) -> DMatrix<f64> {
        let (l, dl) = barycentric(xi);
        let mut gradients = DMatrix::zeros(2, 6);
        for k in 0..2 {
            for i in 0..3 {
                gradients[(k, i)] = (4.0 * l[i] - 1.0) * dl[i][k];
            }
            for (m, (a, b)) in [(0, 1), (1, 2), (2, 0)].into_iter().enumerate() {
                gradients[(k, 3 + m)] = 4.0 * (l[a] * dl[b][k] + l[b] * dl[a][k]);
            }
        }
        gradients
    }
}

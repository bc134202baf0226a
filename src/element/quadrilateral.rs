use crate::element::{ElementFamily, ReferenceElement};
use nalgebra::{DMatrix, Matrix1x4, Matrix2x4, Vector2};

/// Bilinear quadrilateral on `[-1, 1]^2`.
///
/// Nodes are numbered counter-clockwise starting at `(-1, -1)`. Side `i` connects node `i`
/// to node `i + 1`, so sides 0, 1, 2, 3 are the bottom, right, top and left sides of the
/// reference square.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Quad4;

const QUAD4_NODES: [[f64; 2]; 4] = [[-1.0, -1.0], [1.0, -1.0], [1.0, 1.0], [-1.0, 1.0]];
const QUAD4_SIDES: &[&[usize]] = &[&[0, 1], &[1, 2], &[2, 3], &[3, 0]];

impl ReferenceElement for Quad4 {
    fn reference_dim(&self) -> usize {
        2
    }

    fn num_nodes(&self) -> usize {
        4
    }

    fn node_reference_coords(&self, local_node: usize) -> Vec<f64> {
        QUAD4_NODES[local_node].to_vec()
    }

    fn sides(&self) -> &'static [&'static [usize]] {
        QUAD4_SIDES
    }

    fn side_family(&self) -> Option<ElementFamily> {
        Some(ElementFamily::Line2)
    }

    #[rustfmt::skip]
    fn basis(&self, xi: &[f64]) -> DMatrix<f64> {
        // N_{alpha, beta}([alpha, beta]) = 1 with alpha, beta = 1 or -1
        let phi = |alpha: f64, beta: f64| (1.0 + alpha * xi[0]) * (1.0 + beta * xi[1]) / 4.0;
        let values = Matrix1x4::new(
            phi(-1.0, -1.0),
            phi( 1.0, -1.0),
            phi( 1.0,  1.0),
            phi(-1.0,  1.0),
        );
        DMatrix::from_row_slice(1, 4, values.as_slice())
    }

    #[rustfmt::skip]
    fn basis_derivative(&self, xi: &[f64]) -> DMatrix<f64> {
        let phi_grad = |alpha: f64, beta: f64|
            Vector2::new(
                alpha * (1.0 + beta * xi[1]) / 4.0,
                beta * (1.0 + alpha * xi[0]) / 4.0,
            );

        let gradients = Matrix2x4::from_columns(&[
            phi_grad(-1.0, -1.0),
            phi_grad( 1.0, -1.0),
            phi_grad( 1.0,  1.0),
            phi_grad(-1.0,  1.0),
        ]);
        DMatrix::from_column_slice(2, 4, gradients.as_slice())
    }
}

use crate::element::{ElementFamily, ReferenceElement};
use nalgebra::DMatrix;

/// Linear two-node line on `[-1, 1]`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Line2;

/// Quadratic three-node line on `[-1, 1]`.
///
/// The end nodes come first, the midpoint node last.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Line3;

// The sides of a line are its end points
const LINE_SIDES: &[&[usize]] = &[&[0], &[1]];
const LINE2_NODES: [f64; 2] = [-1.0, 1.0];
const LINE3_NODES: [f64; 3] = [-1.0, 1.0, 0.0];

impl ReferenceElement for Line2 {
    fn reference_dim(&self) -> usize {
        1
    }

    fn num_nodes(&self) -> usize {
        2
    }

    fn node_reference_coords(&self, local_node: usize) -> Vec<f64> {
        vec![LINE2_NODES[local_node]]
    }

    fn sides(&self) -> &'static [&'static [usize]] {
        LINE_SIDES
    }

    fn side_family(&self) -> Option<ElementFamily> {
        None
    }

    fn basis(&self, xi: &[f64]) -> DMatrix<f64> {
        let x = xi[0];
        DMatrix::from_row_slice(1, 2, &[(1.0 - x) / 2.0, (1.0 + x) / 2.0])
    }

    fn basis_derivative(&self, _xi: &[f64]) -> DMatrix<f64> {
        DMatrix::from_row_slice(1, 2, &[-0.5, 0.5])
    }
}

impl ReferenceElement for Line3 {
    fn reference_dim(&self) -> usize {
        1
    }

    fn num_nodes(&self) -> usize {
        3
    }

    fn node_reference_coords(&self, local_node: usize) -> Vec<f64> {
        vec![LINE3_NODES[local_node]]
    }

    fn sides(&self) -> &'static [&'static [usize]] {
        LINE_SIDES
    }

    fn side_family(&self) -> Option<ElementFamily> {
        None
    }

    fn basis(&self, xi: &[f64]) -> DMatrix<f64> {
        let x = xi[0];
        DMatrix::from_row_slice(1, 3, &[x * (x - 1.0) / 2.0, x * (x + 1.0) / 2.0, 1.0 - x * x])
    }

    fn basis_derivative(&self, xi: &[f64]) -> DMatrix<f64> {
        let x = xi[0];
        DMatrix::from_row_slice(1, 3, &[x - 0.5, x + 0.5, -2.0 * x])
    }
}

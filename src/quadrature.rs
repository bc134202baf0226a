//! Quadrature rules on the reference domains of the supported element families.
//!
//! Rules come in two flavours:
//!
//! - [`rules`] returns the *raw* rule: a 1D Gauss-Legendre rule for line, quadrilateral and
//!   hexahedral families (to be combined by the caller across dimensions) and a symmetric
//!   rule for triangles.
//! - [`flattened`] returns the rule with one point per evaluation, i.e. with the tensor
//!   product already formed for quadrilaterals and hexahedra.
use crate::error::{FemError, Result};
use femsys_quadrature::{tensor, triangle, univariate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::{Display, Formatter};

/// The reference domain a quadrature rule is defined on.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuadratureFamily {
    /// `[-1, 1]`.
    Line,
    /// `[-1, 1]^2`.
    Quad,
    /// `[-1, 1]^3`.
    Hex,
    /// The triangle `(0, 0), (1, 0), (0, 1)`.
    Tri,
    /// The tetrahedron. No rules are provided.
    Tet,
}

impl Display for QuadratureFamily {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Line => "line",
            Self::Quad => "quad",
            Self::Hex => "hex",
            Self::Tri => "triangle",
            Self::Tet => "tetrahedron",
        };
        write!(f, "{name}")
    }
}

impl QuadratureFamily {
    /// Dimension of the points returned by [`flattened`].
    pub fn reference_dim(&self) -> usize {
        match self {
            Self::Line => 1,
            Self::Quad | Self::Tri => 2,
            Self::Hex | Self::Tet => 3,
        }
    }

    /// Measure of the reference domain.
    pub fn reference_measure(&self) -> f64 {
        match self {
            Self::Line => 2.0,
            Self::Quad => 4.0,
            Self::Hex => 8.0,
            Self::Tri => 0.5,
            Self::Tet => 1.0 / 6.0,
        }
    }
}

/// Quadrature weights together with their points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuadratureRule {
    weights: Vec<f64>,
    points: Vec<Vec<f64>>,
}

impl QuadratureRule {
    /// Creates a rule from matching weights and points.
    ///
    /// # Panics
    ///
    /// Panics if the number of weights and points differ.
    pub fn from_weights_and_points(weights: Vec<f64>, points: Vec<Vec<f64>>) -> Self {
        assert_eq!(weights.len(), points.len(), "Number of weights and points must agree");
        Self { weights, points }
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn points(&self) -> &[Vec<f64>] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, &[f64])> {
        self.weights
            .iter()
            .copied()
            .zip(self.points.iter().map(Vec::as_slice))
    }

    /// Approximates the integral of `f` over the reference domain.
    pub fn integrate(&self, f: impl Fn(&[f64]) -> f64) -> f64 {
        self.iter().map(|(w, xi)| w * f(xi)).sum()
    }
}

fn from_raw<const D: usize>((weights, points): femsys_quadrature::Rule<D>) -> QuadratureRule {
    let points = points.into_iter().map(|p| p.to_vec()).collect();
    QuadratureRule::from_weights_and_points(weights, points)
}

fn unsupported(family: QuadratureFamily, order: usize) -> impl FnOnce(femsys_quadrature::Error) -> FemError {
    move |_| FemError::UnsupportedOrder { family, order }
}

/// Returns the raw quadrature rule of the given order.
///
/// For [`QuadratureFamily::Line`], [`QuadratureFamily::Quad`] and [`QuadratureFamily::Hex`] the
/// result is the one-dimensional Gauss-Legendre rule with `order` points (1 to 5). For
/// [`QuadratureFamily::Tri`] it is the symmetric rule with `order` points (1, 3, 4 or 7).
pub fn rules(family: QuadratureFamily, order: usize) -> Result<QuadratureRule> {
    match family {
        QuadratureFamily::Line | QuadratureFamily::Quad | QuadratureFamily::Hex => univariate::gauss_legendre(order)
            .map(from_raw)
            .map_err(unsupported(family, order)),
        QuadratureFamily::Tri => triangle::triangle(order)
            .map(from_raw)
            .map_err(unsupported(family, order)),
        QuadratureFamily::Tet => Err(FemError::NotImplemented(
            "tetrahedral quadrature".to_string(),
        )),
    }
}

/// Returns the quadrature rule of the given order with tensor products already formed.
pub fn flattened(family: QuadratureFamily, order: usize) -> Result<QuadratureRule> {
    match family {
        QuadratureFamily::Quad => tensor::quadrilateral_gauss(order)
            .map(from_raw)
            .map_err(unsupported(family, order)),
        QuadratureFamily::Hex => tensor::hexahedron_gauss(order)
            .map(from_raw)
            .map_err(unsupported(family, order)),
        QuadratureFamily::Line | QuadratureFamily::Tri | QuadratureFamily::Tet => rules(family, order),
    }
}

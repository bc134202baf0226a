//! Quadrature rules for finite element reference domains.
//!
//! Rules are plain `f64` tables. The reference domains are
//!
//! - the interval `[-1, 1]` (and its tensor products `[-1, 1]^2`, `[-1, 1]^3`),
//! - the standard triangle with vertices `(0, 0)`, `(1, 0)` and `(0, 1)`.
//!
//! `femsys` wraps these tables with a family-aware API. The crate itself knows nothing about
//! elements and may be used on its own.

use std::fmt;
use std::fmt::{Display, Formatter};

pub mod tensor;
pub mod triangle;
pub mod univariate;

/// Library-wide error type.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// Indicates that no tabulated rule exists for the requested number of points.
    NoRuleAvailable { num_points: usize },
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRuleAvailable { num_points } => {
                write!(f, "there is no quadrature rule with {num_points} points available")
            }
        }
    }
}

impl std::error::Error for Error {}

/// A D-dimensional point.
pub type Point<const D: usize> = [f64; D];

/// A D-dimensional rule, given as `(weights, points)`.
pub type Rule<const D: usize> = (Vec<f64>, Vec<Point<D>>);

/// A one-dimensional quadrature rule.
pub type Rule1d = Rule<1>;

/// A two-dimensional quadrature rule.
pub type Rule2d = Rule<2>;

/// A three-dimensional rule.
pub type Rule3d = Rule<3>;

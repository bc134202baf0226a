//! Library-wide error type.
use crate::element::ElementFamily;
use crate::quadrature::QuadratureFamily;
use std::error::Error;
use std::fmt;
use std::fmt::{Display, Formatter};

pub type Result<T> = std::result::Result<T, FemError>;

/// Errors reported by `femsys`.
///
/// Every error is surfaced to the caller of the operation that triggered it. Nothing is
/// retried or recovered from internally.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum FemError {
    /// No quadrature rule is tabulated for the requested family and order.
    UnsupportedOrder { family: QuadratureFamily, order: usize },
    /// The requested family/dimension combination has no implementation.
    NotImplemented(String),
    /// Non-positive Jacobian determinant, i.e. an inverted or collapsed element.
    DegenerateElement { element: usize, determinant: f64 },
    /// A vector or matrix did not have the expected size.
    DimensionMismatch { expected: usize, actual: usize },
    /// Operands of a weak-form expression have incompatible shapes.
    IncompatibleShapes {
        operation: &'static str,
        left: (usize, usize),
        right: (usize, usize),
    },
    /// A constant was given a name reserved by the weak-form language.
    ReservedName(String),
    /// An expression references a constant that has not (yet) been defined.
    UnknownConstant(String),
    /// No matrix, vector, constant or boundary is registered under the given name.
    NotFound(String),
    /// A parameter is out of range.
    InvalidParameter(String),
    /// The solver was asked to step before `init` was called.
    NotInitialized,
    /// An element references a node that was never added to the mesh.
    UnknownNode { element: usize, node: usize },
    /// The node count of an element does not match its family.
    InvalidTopology {
        family: ElementFamily,
        expected: usize,
        actual: usize,
    },
    /// A weak-form expression could not be parsed.
    Parse { expression: String, message: String },
    /// The reduced linear system could not be factorized.
    SingularSystem,
}

impl Display for FemError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedOrder { family, order } => {
                write!(f, "no {family} quadrature rule of order {order} is available")
            }
            Self::NotImplemented(what) => write!(f, "not implemented: {what}"),
            Self::DegenerateElement { element, determinant } => write!(
                f,
                "element {element} is degenerate (Jacobian determinant {determinant:e})"
            ),
            Self::DimensionMismatch { expected, actual } => {
                write!(f, "dimension mismatch: expected {expected}, got {actual}")
            }
            Self::IncompatibleShapes {
                operation,
                left,
                right,
            } => write!(
                f,
                "cannot {operation} a {}x{} and a {}x{} operand",
                left.0, left.1, right.0, right.1
            ),
            Self::ReservedName(name) => write!(f, "'{name}' is a reserved name"),
            Self::UnknownConstant(name) => write!(f, "unknown constant '{name}'"),
            Self::NotFound(name) => write!(f, "nothing is registered under '{name}'"),
            Self::InvalidParameter(message) => write!(f, "invalid parameter: {message}"),
            Self::NotInitialized => write!(f, "solver has not been initialized"),
            Self::UnknownNode { element, node } => {
                write!(f, "element {element} references unknown node {node}")
            }
            Self::InvalidTopology {
                family,
                expected,
                actual,
            } => write!(f, "{family:?} elements have {expected} nodes, got {actual}"),
            Self::Parse { expression, message } => {
                write!(f, "failed to parse '{expression}': {message}")
            }
            Self::SingularSystem => write!(f, "the reduced linear system is singular"),
        }
    }
}

impl Error for FemError {}

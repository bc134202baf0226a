//! Configuration values for meshes, systems and solvers.
//!
//! Every configuration is a plain value with named fields. `Default` gives the documented
//! defaults and `validate` checks ranges before the configuration is used.
use crate::error::{FemError, Result};
use serde::{Deserialize, Serialize};

/// Number of degrees of freedom attached to every node of a mesh.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DofsPerNode {
    /// One DOF per node (scalar fields such as temperature).
    #[default]
    Scalar,
    /// As many DOFs per node as the mesh has spatial dimensions (displacement fields).
    Vector,
    /// An explicit number of DOFs per node.
    Explicit(usize),
}

impl DofsPerNode {
    /// Resolves the stride for a mesh with the given spatial dimension.
    pub fn resolve(&self, spatial_dim: usize) -> Result<usize> {
        match *self {
            Self::Scalar => Ok(1),
            Self::Vector => Ok(spatial_dim),
            Self::Explicit(0) => Err(FemError::InvalidParameter(
                "explicit DOFs per node must be positive".to_string(),
            )),
            Self::Explicit(n) => Ok(n),
        }
    }
}

/// How element contributions are scattered into global sparse matrices.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AssemblyStrategy {
    /// Accumulate each element block directly into the global CSR structure.
    Direct,
    /// Collect `(row, col, value)` triplets and build the CSR matrix once at the end.
    #[default]
    Triplet,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub strategy: AssemblyStrategy,
    /// Overrides the canonical quadrature order of every element family.
    pub quadrature_order: Option<usize>,
    /// Compute element blocks on the rayon thread pool.
    pub parallel: bool,
}

impl SystemConfig {
    pub fn validate(&self) -> Result<()> {
        if self.quadrature_order == Some(0) {
            return Err(FemError::InvalidParameter(
                "quadrature order must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// The capability used to solve the reduced linear systems.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LinearSolverKind {
    /// Dense LU factorization. Works for any non-singular system.
    #[default]
    DenseLu,
    /// Sparse Cholesky factorization. Requires a symmetric positive definite system.
    SparseCholesky,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Scheme parameter: 0 forward difference, 1/2 Crank-Nicolson, 2/3 Galerkin, 1 backward difference.
    pub theta: f64,
    pub dt: f64,
    pub t0: f64,
    /// Names of the mass matrix, stiffness matrix and force vector in the system.
    pub mass: String,
    pub stiffness: String,
    pub force: String,
    /// Global switch for lazy assembly of operators that were not provided explicitly.
    pub assemble: bool,
    pub assemble_mass: bool,
    pub assemble_stiffness: bool,
    pub assemble_force: bool,
    /// Boundary whose essential DOFs are eliminated. `None` selects every essential boundary.
    pub essential_tag: Option<usize>,
    pub linear_solver: LinearSolverKind,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            theta: 0.5,
            dt: 0.1,
            t0: 0.0,
            mass: "M".to_string(),
            stiffness: "K".to_string(),
            force: "f".to_string(),
            assemble: true,
            assemble_mass: true,
            assemble_stiffness: true,
            assemble_force: true,
            essential_tag: None,
            linear_solver: LinearSolverKind::default(),
        }
    }
}

impl SolverConfig {
    /// A single backward step of unit length without mass, which solves `K u = f`.
    pub fn steady_state() -> Self {
        Self {
            theta: 1.0,
            dt: 1.0,
            assemble_mass: false,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.theta) {
            return Err(FemError::InvalidParameter(format!(
                "theta must lie in [0, 1], got {}",
                self.theta
            )));
        }
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(FemError::InvalidParameter(format!(
                "time step must be positive and finite, got {}",
                self.dt
            )));
        }
        Ok(())
    }
}

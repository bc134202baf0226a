//! Linear solves with essential boundary conditions and theta-scheme time stepping.
use crate::config::{LinearSolverKind, SolverConfig};
use crate::error::{FemError, Result};
use crate::mesh::DofSelection;
use crate::system::System;
use log::debug;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::factorization::CscCholesky;
use nalgebra_sparse::{CscMatrix, CsrMatrix};
use std::borrow::Cow;
use std::fmt;
use std::fmt::{Debug, Formatter};

/// Solves `A x = b` for a square sparse `A`.
pub trait LinearSolve: Debug + Send + Sync {
    fn solve(&self, a: &CsrMatrix<f64>, b: &DVector<f64>) -> Result<DVector<f64>>;
}

/// Dense LU factorization with partial pivoting.
#[derive(Debug, Copy, Clone, Default)]
pub struct DenseLu;

impl LinearSolve for DenseLu {
    fn solve(&self, a: &CsrMatrix<f64>, b: &DVector<f64>) -> Result<DVector<f64>> {
        if b.is_empty() {
            return Ok(DVector::zeros(0));
        }
        DMatrix::from(a).lu().solve(b).ok_or(FemError::SingularSystem)
    }
}

/// Sparse Cholesky factorization. The matrix must be symmetric positive definite.
#[derive(Debug, Copy, Clone, Default)]
pub struct SparseCholesky;

impl LinearSolve for SparseCholesky {
    fn solve(&self, a: &CsrMatrix<f64>, b: &DVector<f64>) -> Result<DVector<f64>> {
        if b.is_empty() {
            return Ok(DVector::zeros(0));
        }
        let cholesky = CscCholesky::factor(&CscMatrix::from(a)).map_err(|_| FemError::SingularSystem)?;
        let rhs = DMatrix::from_column_slice(b.len(), 1, b.as_slice());
        let x = cholesky.solve(&rhs);
        Ok(DVector::from_column_slice(x.as_slice()))
    }
}

impl LinearSolverKind {
    pub fn build(&self) -> Box<dyn LinearSolve> {
        match self {
            Self::DenseLu => Box::new(DenseLu),
            Self::SparseCholesky => Box::new(SparseCholesky),
        }
    }
}

fn check_len(expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(FemError::DimensionMismatch { expected, actual })
    }
}

/// Extracts the rows and columns selected by boolean masks.
pub fn submatrix(matrix: &CsrMatrix<f64>, row_mask: &[bool], col_mask: &[bool]) -> Result<CsrMatrix<f64>> {
    check_len(matrix.nrows(), row_mask.len())?;
    check_len(matrix.ncols(), col_mask.len())?;

    // New index of every selected column
    let mut col_map = vec![None; col_mask.len()];
    let mut num_cols = 0;
    for (j, _) in col_mask.iter().enumerate().filter(|(_, &m)| m) {
        col_map[j] = Some(num_cols);
        num_cols += 1;
    }

    let mut offsets = vec![0];
    let mut column_indices = Vec::new();
    let mut values = Vec::new();
    for (row, _) in matrix.row_iter().zip(row_mask).filter(|(_, &m)| m) {
        for (&j, &v) in row.col_indices().iter().zip(row.values()) {
            if let Some(new_j) = col_map[j] {
                column_indices.push(new_j);
                values.push(v);
            }
        }
        offsets.push(column_indices.len());
    }

    let num_rows = offsets.len() - 1;
    CsrMatrix::try_from_csr_data(num_rows, num_cols, offsets, column_indices, values)
        .map_err(|err| FemError::InvalidParameter(format!("invalid submatrix: {err}")))
}

/// Sparse matrix-vector product.
pub fn spmv(matrix: &CsrMatrix<f64>, x: &DVector<f64>) -> Result<DVector<f64>> {
    check_len(matrix.ncols(), x.len())?;
    Ok(DVector::from_iterator(
        matrix.nrows(),
        matrix.row_iter().map(|row| {
            row.col_indices()
                .iter()
                .zip(row.values())
                .map(|(&j, &v)| v * x[j])
                .sum::<f64>()
        }),
    ))
}

fn select(vector: &DVector<f64>, mask: &[bool], value: bool) -> DVector<f64> {
    DVector::from_iterator(
        mask.iter().filter(|&&m| m == value).count(),
        vector
            .iter()
            .zip(mask)
            .filter(|(_, &m)| m == value)
            .map(|(&x, _)| x),
    )
}

/// Solves `A u = b` for the DOFs not marked `essential`, keeping the essential entries of `u`.
///
/// The reduced system is `A[free, free] u[free] = b[free] - A[free, ess] u[ess]`.
pub fn solve_constrained(
    a: &CsrMatrix<f64>,
    b: &DVector<f64>,
    essential: &[bool],
    u: &mut DVector<f64>,
    solver: &dyn LinearSolve,
) -> Result<()> {
    let n = essential.len();
    check_len(n, a.nrows())?;
    check_len(n, a.ncols())?;
    check_len(n, b.len())?;
    check_len(n, u.len())?;

    let free: Vec<bool> = essential.iter().map(|&e| !e).collect();
    let a_ff = submatrix(a, &free, &free)?;
    let a_fe = submatrix(a, &free, essential)?;
    let rhs = select(b, &free, true) - spmv(&a_fe, &select(u, essential, true))?;

    debug!(
        "Solving reduced system with {} free and {} essential DOFs.",
        rhs.len(),
        n - rhs.len()
    );
    let u_free = solver.solve(&a_ff, &rhs)?;

    for (u_i, x) in u
        .iter_mut()
        .zip(&free)
        .filter(|(_, &f)| f)
        .map(|(u_i, _)| u_i)
        .zip(u_free.iter())
    {
        *u_i = *x;
    }
    Ok(())
}

/// The starting point of a transient solve.
#[derive(Debug, Clone, PartialEq)]
pub enum InitialCondition {
    Vector(DVector<f64>),
    /// An assembled vector of the system.
    Named(String),
}

impl From<DVector<f64>> for InitialCondition {
    fn from(vector: DVector<f64>) -> Self {
        Self::Vector(vector)
    }
}

impl From<&str> for InitialCondition {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}

/// Values of essential DOFs as a function of node coordinates, component and time.
pub type EssentialValues = dyn Fn(&[f64], usize, f64) -> f64 + Send + Sync;

#[derive(Debug, Clone, PartialEq)]
enum SolverState {
    Uninitialized,
    Initialized {
        t: f64,
        u: DVector<f64>,
        f_old: DVector<f64>,
    },
}

/// Theta-scheme integrator for `M du/dt + K u = f`.
///
/// Every call to [`solve`](ThetaSolver::solve) advances the solution by one step:
///
/// ```text
/// (M + θ Δt K) u_new = Δt (θ f + (1 - θ) f_old) + (M - (1 - θ) Δt K) u_old
/// ```
///
/// θ = 0 is the forward difference, 1/2 Crank-Nicolson, 2/3 Galerkin and 1 the backward
/// difference. Essential DOFs are set from the essential value function at the new time and
/// eliminated from the system.
pub struct ThetaSolver {
    config: SolverConfig,
    mass: Option<CsrMatrix<f64>>,
    stiffness: Option<CsrMatrix<f64>>,
    force: Option<DVector<f64>>,
    essential_values: Box<EssentialValues>,
    linear_solver: Box<dyn LinearSolve>,
    state: SolverState,
}

impl Debug for ThetaSolver {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThetaSolver")
            .field("config", &self.config)
            .field("linear_solver", &self.linear_solver)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl ThetaSolver {
    /// Creates a solver with homogeneous essential boundary conditions.
    pub fn new(config: SolverConfig) -> Self {
        Self {
            linear_solver: config.linear_solver.build(),
            config,
            mass: None,
            stiffness: None,
            force: None,
            essential_values: Box::new(|_, _, _| 0.0),
            state: SolverState::Uninitialized,
        }
    }

    pub fn with_essential_values(self, values: impl Fn(&[f64], usize, f64) -> f64 + Send + Sync + 'static) -> Self {
        Self {
            essential_values: Box::new(values),
            ..self
        }
    }

    pub fn with_linear_solver(self, linear_solver: impl LinearSolve + 'static) -> Self {
        Self {
            linear_solver: Box::new(linear_solver),
            ..self
        }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Provides the mass matrix explicitly instead of taking it from the system.
    pub fn set_mass(&mut self, mass: CsrMatrix<f64>) {
        self.mass = Some(mass);
    }

    pub fn set_stiffness(&mut self, stiffness: CsrMatrix<f64>) {
        self.stiffness = Some(stiffness);
    }

    pub fn set_force(&mut self, force: DVector<f64>) {
        self.force = Some(force);
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.state, SolverState::Initialized { .. })
    }

    /// Current time, if initialized.
    pub fn time(&self) -> Option<f64> {
        match &self.state {
            SolverState::Initialized { t, .. } => Some(*t),
            SolverState::Uninitialized => None,
        }
    }

    /// Current solution, if initialized.
    pub fn solution(&self) -> Option<&DVector<f64>> {
        match &self.state {
            SolverState::Initialized { u, .. } => Some(u),
            SolverState::Uninitialized => None,
        }
    }

    fn essential_mask(&self, system: &System) -> Result<Vec<bool>> {
        system
            .mesh()
            .dof_mask(self.config.essential_tag, DofSelection::Essential)
    }

    fn apply_essential_values(&self, system: &System, mask: &[bool], u: &mut DVector<f64>, t: f64) {
        let mesh = system.mesh();
        for (dof, _) in mask.iter().enumerate().filter(|(_, &m)| m) {
            if let Some((coords, component)) = mesh.dof_location(dof) {
                u[dof] = (self.essential_values)(coords, component, t);
            }
        }
    }

    /// Assembles the named operator unless it was provided explicitly, is already assembled or
    /// its assembly is disabled.
    fn ensure_assembled(&self, system: &mut System, name: &str, provided: bool, enabled: bool) -> Result<()> {
        if !provided && enabled && self.config.assemble && !system.is_assembled(name) {
            system.assemble(name)?;
        }
        Ok(())
    }

    fn prepare(&self, system: &mut System) -> Result<()> {
        let config = &self.config;
        self.ensure_assembled(system, &config.mass, self.mass.is_some(), config.assemble_mass)?;
        self.ensure_assembled(system, &config.stiffness, self.stiffness.is_some(), config.assemble_stiffness)?;
        self.ensure_assembled(system, &config.force, self.force.is_some(), config.assemble_force)
    }

    fn matrix<'s>(
        &'s self,
        system: &'s System,
        explicit: &'s Option<CsrMatrix<f64>>,
        name: &str,
        enabled: bool,
    ) -> Result<Cow<'s, CsrMatrix<f64>>> {
        let n = system.mesh().num_dofs();
        let matrix = match explicit {
            Some(matrix) => Cow::Borrowed(matrix),
            None if enabled && self.config.assemble => Cow::Borrowed(system.matrix(name)?),
            None => Cow::Owned(CsrMatrix::zeros(n, n)),
        };
        check_len(n, matrix.nrows())?;
        check_len(n, matrix.ncols())?;
        Ok(matrix)
    }

    fn force<'s>(&'s self, system: &'s System) -> Result<Cow<'s, DVector<f64>>> {
        let n = system.mesh().num_dofs();
        let force = match &self.force {
            Some(force) => Cow::Borrowed(force),
            None if self.config.assemble_force && self.config.assemble => {
                Cow::Borrowed(system.vector(&self.config.force)?)
            }
            None => Cow::Owned(DVector::zeros(n)),
        };
        check_len(n, force.len())?;
        Ok(force)
    }

    /// Sets the initial solution, overwriting its essential DOFs with their values at `t0`.
    pub fn init(&mut self, system: &mut System, initial: impl Into<InitialCondition>) -> Result<()> {
        let mut u = match initial.into() {
            InitialCondition::Vector(u) => u,
            InitialCondition::Named(name) => system.vector(&name)?.clone(),
        };
        check_len(system.mesh().num_dofs(), u.len())?;

        let t0 = self.config.t0;
        let mask = self.essential_mask(system)?;
        self.apply_essential_values(system, &mask, &mut u, t0);

        self.prepare(system)?;
        let f_old = self.force(system)?.into_owned();
        self.state = SolverState::Initialized { t: t0, u, f_old };
        Ok(())
    }

    /// Advances the solution by one time step and returns it.
    pub fn solve(&mut self, system: &mut System) -> Result<&DVector<f64>> {
        let SolverState::Initialized { t, u: u_old, f_old } = &self.state else {
            return Err(FemError::NotInitialized);
        };
        let (t, u_old, f_old) = (*t, u_old.clone(), f_old.clone());
        self.config.validate()?;
        self.prepare(system)?;

        let SolverConfig { theta, dt, .. } = self.config;
        let (u_new, f) = {
            let config = &self.config;
            let m = self.matrix(system, &self.mass, &config.mass, config.assemble_mass)?;
            let k = self.matrix(system, &self.stiffness, &config.stiffness, config.assemble_stiffness)?;
            let f = self.force(system)?;
            check_len(f.len(), u_old.len())?;

            let k_hat = &*m + &(&*k * (theta * dt));
            let f_hat = (&*f * theta + &f_old * (1.0 - theta)) * dt + spmv(&m, &u_old)?
                - spmv(&k, &u_old)? * ((1.0 - theta) * dt);

            let t_new = t + dt;
            let mask = self.essential_mask(system)?;
            let mut u_new = u_old;
            self.apply_essential_values(system, &mask, &mut u_new, t_new);
            debug!("Theta step to t = {t_new} (theta = {theta}, dt = {dt}).");
            solve_constrained(&k_hat, &f_hat, &mask, &mut u_new, self.linear_solver.as_ref())?;
            (u_new, f.into_owned())
        };

        self.state = SolverState::Initialized {
            t: t + dt,
            u: u_new,
            f_old: f,
        };
        match &self.state {
            SolverState::Initialized { u, .. } => Ok(u),
            SolverState::Uninitialized => Err(FemError::NotInitialized),
        }
    }
}

//! Named constants, matrices and vectors defined by weak-form expressions.
use crate::assembly::{assemble_matrix, assemble_vector, Kernel, KernelAssembler};
use crate::config::SystemConfig;
use crate::error::{FemError, Result};
use crate::expression::{is_reserved, Expression, Value};
use crate::mesh::Mesh;
use log::debug;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::CsrMatrix;
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::{Debug, Formatter};

/// The definition of a constant: a value, or an expression over previously defined constants.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantDefinition {
    Value(Value),
    Expression(String),
}

impl From<f64> for ConstantDefinition {
    fn from(value: f64) -> Self {
        Self::Value(Value::Scalar(value))
    }
}

impl From<DMatrix<f64>> for ConstantDefinition {
    fn from(value: DMatrix<f64>) -> Self {
        Self::Value(Value::Matrix(value))
    }
}

impl From<Value> for ConstantDefinition {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<&str> for ConstantDefinition {
    fn from(expression: &str) -> Self {
        Self::Expression(expression.to_string())
    }
}

impl From<String> for ConstantDefinition {
    fn from(expression: String) -> Self {
        Self::Expression(expression)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum EntryKind {
    Matrix,
    Vector,
}

enum Integrand {
    Expression(Expression),
    Kernel(Box<dyn Kernel>),
}

impl Integrand {
    fn kernel(&self) -> &dyn Kernel {
        match self {
            Self::Expression(expression) => expression,
            Self::Kernel(kernel) => kernel.as_ref(),
        }
    }
}

impl Debug for Integrand {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expression(expression) => write!(f, "Expression({expression})"),
            Self::Kernel(_) => write!(f, "Kernel(..)"),
        }
    }
}

#[derive(Debug)]
enum Assembled {
    Matrix(CsrMatrix<f64>),
    Vector(DVector<f64>),
}

#[derive(Debug)]
struct Entry {
    kind: EntryKind,
    integrand: Integrand,
    boundary: Option<usize>,
    value: Option<Assembled>,
}

/// A stored value returned by [`System::get`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Stored<'a> {
    Matrix(&'a CsrMatrix<f64>),
    Vector(&'a DVector<f64>),
    Constant(&'a Value),
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .map_or(false, |c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Compiles weak-form expressions into element kernels and assembles them on a mesh.
///
/// ```
/// # use femsys::config::{DofsPerNode, SystemConfig};
/// # use femsys::element::ElementFamily;
/// # use femsys::mesh::procedural::create_rectangular_grid;
/// # use femsys::system::System;
/// # fn main() -> femsys::error::Result<()> {
/// let mesh = create_rectangular_grid((0.0, 1.0), (0.0, 1.0), 4, 4, ElementFamily::Quad4, DofsPerNode::Scalar)?
///     .initialize()?;
/// let mut system = System::new(&mesh, SystemConfig::default())?;
/// system.add_constant("D", 0.5)?;
/// system.add_matrix("K", "B'*D*B", None)?;
/// system.assemble("K")?;
/// assert_eq!(system.matrix("K")?.nrows(), 25);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct System<'a> {
    mesh: &'a Mesh,
    config: SystemConfig,
    // In definition order, which is also the order in which they can be referenced
    constants: Vec<(String, Value)>,
    entries: BTreeMap<String, Entry>,
}

impl<'a> System<'a> {
    pub fn new(mesh: &'a Mesh, config: SystemConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            mesh,
            config,
            constants: Vec::new(),
            entries: BTreeMap::new(),
        })
    }

    pub fn mesh(&self) -> &'a Mesh {
        self.mesh
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name) || self.constants.iter().any(|(constant, _)| constant == name)
    }

    fn check_new_name(&self, name: &str) -> Result<()> {
        if is_reserved(name) {
            return Err(FemError::ReservedName(name.to_string()));
        }
        if !is_identifier(name) {
            return Err(FemError::InvalidParameter(format!("'{name}' is not a valid name")));
        }
        if self.contains(name) {
            return Err(FemError::InvalidParameter(format!("'{name}' is already defined")));
        }
        Ok(())
    }

    /// Defines a constant.
    ///
    /// Expressions are evaluated immediately and may only reference constants defined before.
    pub fn add_constant(&mut self, name: &str, definition: impl Into<ConstantDefinition>) -> Result<()> {
        self.check_new_name(name)?;
        let value = match definition.into() {
            ConstantDefinition::Value(value) => value,
            ConstantDefinition::Expression(source) => Expression::parse(&source, &self.constants)?.evaluate_constant()?,
        };
        self.constants.push((name.to_string(), value));
        Ok(())
    }

    fn add_entry(&mut self, name: &str, kind: EntryKind, integrand: Integrand, boundary: Option<usize>) -> Result<()> {
        self.check_new_name(name)?;
        if let Some(tag) = boundary {
            self.mesh.region(tag)?;
        }
        self.entries.insert(
            name.to_string(),
            Entry {
                kind,
                integrand,
                boundary,
                value: None,
            },
        );
        Ok(())
    }

    /// Defines a matrix by a weak-form expression, integrated over the whole mesh or over the
    /// sides tagged with `boundary`.
    pub fn add_matrix(&mut self, name: &str, expression: &str, boundary: Option<usize>) -> Result<()> {
        let expression = Expression::parse(expression, &self.constants)?;
        self.add_entry(name, EntryKind::Matrix, Integrand::Expression(expression), boundary)
    }

    /// Defines a vector by a weak-form expression.
    pub fn add_vector(&mut self, name: &str, expression: &str, boundary: Option<usize>) -> Result<()> {
        let expression = Expression::parse(expression, &self.constants)?;
        self.add_entry(name, EntryKind::Vector, Integrand::Expression(expression), boundary)
    }

    /// Defines a matrix by a hard-coded kernel.
    pub fn add_matrix_kernel(
        &mut self,
        name: &str,
        kernel: impl Kernel + 'static,
        boundary: Option<usize>,
    ) -> Result<()> {
        self.add_entry(name, EntryKind::Matrix, Integrand::Kernel(Box::new(kernel)), boundary)
    }

    /// Defines a vector by a hard-coded kernel.
    pub fn add_vector_kernel(
        &mut self,
        name: &str,
        kernel: impl Kernel + 'static,
        boundary: Option<usize>,
    ) -> Result<()> {
        self.add_entry(name, EntryKind::Vector, Integrand::Kernel(Box::new(kernel)), boundary)
    }

    /// Clears and re-assembles a matrix or vector.
    pub fn assemble(&mut self, name: &str) -> Result<()> {
        let mesh = self.mesh;
        let config = self.config.clone();
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| FemError::NotFound(name.to_string()))?;
        entry.value = None;

        let element_assembler = KernelAssembler::new(mesh, entry.integrand.kernel())
            .with_boundary(entry.boundary)
            .with_quadrature_order(config.quadrature_order);
        let assembled = match entry.kind {
            EntryKind::Matrix => {
                let matrix = assemble_matrix(&element_assembler, config.strategy, config.parallel)?;
                debug!(
                    "Assembled matrix '{name}' ({:?}, {} elements): {}x{} with {} non-zeros.",
                    config.strategy,
                    mesh.num_elements(),
                    matrix.nrows(),
                    matrix.ncols(),
                    matrix.nnz()
                );
                Assembled::Matrix(matrix)
            }
            EntryKind::Vector => {
                let vector = assemble_vector(&element_assembler, config.parallel)?;
                debug!(
                    "Assembled vector '{name}' ({} elements): {} entries.",
                    mesh.num_elements(),
                    vector.len()
                );
                Assembled::Vector(vector)
            }
        };
        entry.value = Some(assembled);
        Ok(())
    }

    /// Assembles every matrix and vector.
    pub fn assemble_all(&mut self) -> Result<()> {
        let names: Vec<String> = self.entries.keys().cloned().collect();
        for name in names {
            self.assemble(&name)?;
        }
        Ok(())
    }

    /// Returns the stored value of a name without recomputing it.
    pub fn get(&self, name: &str) -> Result<Stored<'_>> {
        if let Some((_, value)) = self.constants.iter().find(|(constant, _)| constant == name) {
            return Ok(Stored::Constant(value));
        }
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| FemError::NotFound(name.to_string()))?;
        match &entry.value {
            Some(Assembled::Matrix(matrix)) => Ok(Stored::Matrix(matrix)),
            Some(Assembled::Vector(vector)) => Ok(Stored::Vector(vector)),
            None => Err(FemError::NotFound(format!("assembled value of '{name}'"))),
        }
    }

    pub fn matrix(&self, name: &str) -> Result<&CsrMatrix<f64>> {
        match self.get(name)? {
            Stored::Matrix(matrix) => Ok(matrix),
            _ => Err(FemError::InvalidParameter(format!("'{name}' is not a matrix"))),
        }
    }

    pub fn vector(&self, name: &str) -> Result<&DVector<f64>> {
        match self.get(name)? {
            Stored::Vector(vector) => Ok(vector),
            _ => Err(FemError::InvalidParameter(format!("'{name}' is not a vector"))),
        }
    }

    pub fn constant(&self, name: &str) -> Result<&Value> {
        match self.get(name)? {
            Stored::Constant(value) => Ok(value),
            _ => Err(FemError::InvalidParameter(format!("'{name}' is not a constant"))),
        }
    }

    /// Whether a matrix or vector of this name has been assembled.
    pub fn is_assembled(&self, name: &str) -> bool {
        self.entries
            .get(name)
            .map_or(false, |entry| entry.value.is_some())
    }
}

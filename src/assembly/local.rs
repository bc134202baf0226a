//! Element-local assembly.
use crate::element::Element;
use crate::error::{FemError, Result};
use crate::mesh::Mesh;
use crate::quadrature::{flattened, QuadratureFamily, QuadratureRule};
use log::trace;
use nalgebra::DMatrix;

/// Integrand of an element integral, evaluated at reference coordinates.
///
/// A kernel returns a square matrix with one row per element DOF for matrix integrals, or a
/// single column for vector integrals. Closures with the signature of
/// [`evaluate`](Kernel::evaluate) are kernels.
pub trait Kernel: Send + Sync {
    fn evaluate(&self, element: &Element, xi: &[f64]) -> Result<DMatrix<f64>>;
}

impl<F> Kernel for F
where
    F: Fn(&Element, &[f64]) -> Result<DMatrix<f64>> + Send + Sync,
{
    fn evaluate(&self, element: &Element, xi: &[f64]) -> Result<DMatrix<f64>> {
        self(element, xi)
    }
}

pub trait ElementConnectivityAssembler {
    /// Size of the global system.
    fn num_dofs(&self) -> usize;

    fn num_elements(&self) -> usize;

    fn element_dof_count(&self, element_index: usize) -> usize;

    fn populate_element_dofs(&self, output: &mut [usize], element_index: usize);

    /// Whether the element contributes to the assembled result at all.
    fn element_contributes(&self, _element_index: usize) -> bool {
        true
    }
}

pub trait ElementBlockAssembler: ElementConnectivityAssembler + Sync {
    /// Computes the dense block of an element, with rows and columns ordered like the DOFs
    /// given by [`populate_element_dofs`](ElementConnectivityAssembler::populate_element_dofs).
    ///
    /// Matrix blocks are square, vector blocks have a single column. Returns `None` if the
    /// element does not contribute.
    fn assemble_element_block(&self, element_index: usize) -> Result<Option<DMatrix<f64>>>;
}

/// Accumulates `value` into `sum`, creating it on first use.
fn accumulate(sum: &mut Option<DMatrix<f64>>, value: DMatrix<f64>) -> Result<()> {
    match sum {
        Some(existing) => {
            if existing.shape() != value.shape() {
                return Err(FemError::IncompatibleShapes {
                    operation: "accumulate",
                    left: existing.shape(),
                    right: value.shape(),
                });
            }
            *existing += value;
        }
        None => *sum = Some(value),
    }
    Ok(())
}

/// Integrates a kernel over an element: the sum over all quadrature points of
/// `w * kernel(xi) * det J(xi)`.
///
/// Fails if the Jacobian determinant is not positive at any quadrature point.
pub fn assemble_element_block(element: &Element, kernel: &dyn Kernel, rule: &QuadratureRule) -> Result<DMatrix<f64>> {
    let mut block = None;
    for (w, xi) in rule.iter() {
        let j_det = element.jacobian_determinant(xi)?;
        let value = kernel.evaluate(element, xi)?;
        accumulate(&mut block, value * (w * j_det))?;
    }
    block.ok_or_else(|| FemError::InvalidParameter("empty quadrature rule".to_string()))
}

/// Quadrature rule used for an element, honoring an explicit order if given.
pub fn element_quadrature(element: &Element, order: Option<usize>) -> Result<QuadratureRule> {
    let family = element.family();
    let order = order.unwrap_or_else(|| family.canonical_quadrature_order());
    flattened(family.quadrature_family(), order)
}

/// Quadrature order for the sides of an element, given the order requested for its interior.
///
/// Gauss orders count points per axis and carry over to the sides. Simplex orders count the
/// points of the whole rule, so their sides fall back to the canonical order of the side family.
fn side_quadrature_order(element: &Element, order: Option<usize>) -> Option<usize> {
    match element.family().quadrature_family() {
        QuadratureFamily::Line | QuadratureFamily::Quad | QuadratureFamily::Hex => order,
        QuadratureFamily::Tri | QuadratureFamily::Tet => None,
    }
}

/// Adds a side block to the element block, mapping side DOFs through `local_dofs`.
fn scatter_side_block(
    block: &mut Option<DMatrix<f64>>,
    side_block: &DMatrix<f64>,
    local_dofs: &[usize],
    element_dofs: usize,
) -> Result<()> {
    let m = local_dofs.len();
    let (rows, cols) = side_block.shape();
    let is_vector = cols == 1 && m != 1;
    if rows != m || !(cols == m || is_vector) {
        return Err(FemError::DimensionMismatch { expected: m, actual: rows });
    }

    let mut expanded = DMatrix::zeros(element_dofs, if is_vector { 1 } else { element_dofs });
    for (i, &local_i) in local_dofs.iter().enumerate() {
        if is_vector {
            expanded[(local_i, 0)] = side_block[(i, 0)];
        } else {
            for (j, &local_j) in local_dofs.iter().enumerate() {
                expanded[(local_i, local_j)] = side_block[(i, j)];
            }
        }
    }
    accumulate(block, expanded)
}

/// Integrates a kernel over the sides of an element carrying the given tag.
///
/// The sides of line elements are points: the kernel is evaluated on the element at the end
/// point with unit weight. Other elements build the side element and integrate over it with
/// its own quadrature rule and Jacobian. Returns `None` if no side carries the tag.
///
/// An explicit `quadrature_order` refers to the rule of the element itself. It applies to the
/// sides only where it has the same meaning there, i.e. for tensor-product families.
pub fn assemble_element_boundary_block(
    element: &Element,
    tag: usize,
    kernel: &dyn Kernel,
    quadrature_order: Option<usize>,
) -> Result<Option<DMatrix<f64>>> {
    let mut block = None;
    for (side_index, side) in element.sides().iter().enumerate() {
        if !side.tags.contains(&tag) {
            continue;
        }

        if element.reference_dim() == 1 {
            let xi = element.side_point(side_index)?;
            accumulate(&mut block, kernel.evaluate(element, &xi)?)?;
        } else {
            let side_element = element.build_side(side_index)?;
            let rule = element_quadrature(&side_element, side_quadrature_order(element, quadrature_order))?;
            let side_block = assemble_element_block(&side_element, kernel, &rule)?;
            scatter_side_block(&mut block, &side_block, &side.local_dofs, element.num_dofs())?;
        }
    }
    Ok(block)
}

/// Assembles element blocks of a mesh by integrating a [`Kernel`].
///
/// With a boundary tag only the tagged sides are integrated.
pub struct KernelAssembler<'a> {
    mesh: &'a Mesh,
    kernel: &'a dyn Kernel,
    boundary: Option<usize>,
    quadrature_order: Option<usize>,
}

impl<'a> KernelAssembler<'a> {
    pub fn new(mesh: &'a Mesh, kernel: &'a dyn Kernel) -> Self {
        Self {
            mesh,
            kernel,
            boundary: None,
            quadrature_order: None,
        }
    }

    pub fn with_boundary(self, boundary: Option<usize>) -> Self {
        Self { boundary, ..self }
    }

    pub fn with_quadrature_order(self, quadrature_order: Option<usize>) -> Self {
        Self {
            quadrature_order,
            ..self
        }
    }
}

impl<'a> ElementConnectivityAssembler for KernelAssembler<'a> {
    fn num_dofs(&self) -> usize {
        self.mesh.num_dofs()
    }

    fn num_elements(&self) -> usize {
        self.mesh.num_elements()
    }

    fn element_dof_count(&self, element_index: usize) -> usize {
        self.mesh.elements()[element_index].num_dofs()
    }

    fn populate_element_dofs(&self, output: &mut [usize], element_index: usize) {
        output.copy_from_slice(self.mesh.elements()[element_index].dofs());
    }

    fn element_contributes(&self, element_index: usize) -> bool {
        match self.boundary {
            None => true,
            Some(tag) => self.mesh.elements()[element_index]
                .sides()
                .iter()
                .any(|side| side.tags.contains(&tag)),
        }
    }
}

impl<'a> ElementBlockAssembler for KernelAssembler<'a> {
    fn assemble_element_block(&self, element_index: usize) -> Result<Option<DMatrix<f64>>> {
        let element = &self.mesh.elements()[element_index];
        let block = match self.boundary {
            None => {
                let rule = element_quadrature(element, self.quadrature_order)?;
                Some(assemble_element_block(element, self.kernel, &rule)?)
            }
            Some(tag) => assemble_element_boundary_block(element, tag, self.kernel, self.quadrature_order)?,
        };
        if let Some(block) = &block {
            trace!("Element {element_index}: {}x{} block.", block.nrows(), block.ncols());
        }
        Ok(block)
    }
}

//! Reference elements and the elements of a mesh.
//!
//! Every element family implements the three primitives of [`ReferenceElement`]: basis
//! values, basis derivatives in reference coordinates and the Jacobian. Everything else
//! (shape matrices for vector fields, physical derivatives, determinants, normals and side
//! elements) is derived from these primitives by [`Element`], so adding a family only requires
//! a new [`ReferenceElement`] implementation.
use crate::error::{FemError, Result};
use crate::quadrature::QuadratureFamily;
use itertools::Itertools;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Debug;

mod line;
mod quadrilateral;
mod triangle;

pub use line::{Line2, Line3};
pub use quadrilateral::Quad4;
pub use triangle::{Tri3, Tri6};

/// The primitives every element family provides on its reference domain.
pub trait ReferenceElement: Debug + Send + Sync {
    fn reference_dim(&self) -> usize;

    fn num_nodes(&self) -> usize;

    /// Reference coordinates of the given local node.
    fn node_reference_coords(&self, local_node: usize) -> Vec<f64>;

    /// Local node indices of each side, ordered so that traversing all sides in turn runs
    /// counter-clockwise around the reference domain.
    fn sides(&self) -> &'static [&'static [usize]];

    /// The family of the side elements, or `None` if sides are points.
    fn side_family(&self) -> Option<ElementFamily>;

    /// Evaluates each basis function at the given reference coordinates, as a `1 x n` row.
    ///
    /// # Panics
    ///
    /// Implementations may panic if `xi` has fewer than `reference_dim` entries.
    fn basis(&self, xi: &[f64]) -> DMatrix<f64>;

    /// Reference derivatives of the basis functions, as a `reference_dim x n` matrix whose
    /// columns are the gradients of the individual basis functions.
    fn basis_derivative(&self, xi: &[f64]) -> DMatrix<f64>;

    /// The Jacobian `dN/dxi * X` of the map from reference coordinates to the coordinates
    /// given by the rows of `coords`.
    fn jacobian(&self, xi: &[f64], coords: &DMatrix<f64>) -> DMatrix<f64> {
        self.basis_derivative(xi) * coords
    }
}

/// The element families known to `femsys`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ElementFamily {
    Line2,
    Line3,
    /// Two-node beam carrying a transverse deflection and a rotation at every node.
    Beam2,
    Tri3,
    Tri6,
    Quad4,
}

impl ElementFamily {
    pub fn reference(&self) -> &'static dyn ReferenceElement {
        match self {
            Self::Line2 | Self::Beam2 => &Line2,
            Self::Line3 => &Line3,
            Self::Tri3 => &Tri3,
            Self::Tri6 => &Tri6,
            Self::Quad4 => &Quad4,
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.reference().num_nodes()
    }

    pub fn reference_dim(&self) -> usize {
        self.reference().reference_dim()
    }

    pub fn quadrature_family(&self) -> QuadratureFamily {
        match self {
            Self::Line2 | Self::Line3 | Self::Beam2 => QuadratureFamily::Line,
            Self::Tri3 | Self::Tri6 => QuadratureFamily::Tri,
            Self::Quad4 => QuadratureFamily::Quad,
        }
    }

    /// Quadrature order that integrates the mass matrix of the family exactly on affine
    /// elements.
    pub fn canonical_quadrature_order(&self) -> usize {
        match self {
            Self::Line2 | Self::Beam2 | Self::Quad4 => 2,
            Self::Line3 | Self::Tri3 => 3,
            Self::Tri6 => 7,
        }
    }

    /// DOFs per node the family insists on, if any.
    pub fn required_dofs_per_node(&self) -> Option<usize> {
        match self {
            Self::Beam2 => Some(2),
            _ => None,
        }
    }
}

/// Expands node indices into interleaved DOF indices.
///
/// Node `n` owns the DOFs `n * stride + c` for components `c` in `0 .. stride`, so the DOFs
/// of one node are consecutive and nodes appear in the order given.
pub fn expand_dofs(nodes: &[usize], stride: usize) -> Vec<usize> {
    nodes
        .iter()
        .flat_map(|&node| (0..stride).map(move |c| node * stride + c))
        .collect()
}

/// Inverse of [`expand_dofs`] for a single DOF: returns `(node, component)`.
pub fn collapse_dof(dof: usize, stride: usize) -> (usize, usize) {
    (dof / stride, dof % stride)
}

/// Boundary metadata attached to one side of an element.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SideInfo {
    /// Boundary tags this side carries.
    pub tags: BTreeSet<usize>,
    /// Indices into the element-local DOF vector of the DOFs on this side.
    pub local_dofs: Vec<usize>,
    /// The element sharing this side, if any.
    pub neighbor: Option<usize>,
}

/// An element of a mesh: a reference family mapped onto physical node positions.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    id: usize,
    family: ElementFamily,
    nodes: Vec<usize>,
    // Physical node positions, one row per node
    coords: DMatrix<f64>,
    // Coordinates used by the Jacobian. Equal to `coords` unless the element is embedded in a
    // higher-dimensional space, in which case it holds an arc-length parameterization.
    local_coords: DMatrix<f64>,
    dofs_per_node: usize,
    dofs: Vec<usize>,
    sides: Vec<SideInfo>,
    is_side: bool,
}

/// Chord-length parameterization of a line element embedded in 2D or 3D.
fn arc_length_coords(family: ElementFamily, coords: &DMatrix<f64>) -> DMatrix<f64> {
    let reference = family.reference();
    let order: Vec<usize> = (0..reference.num_nodes())
        .sorted_by(|&a, &b| {
            let xa = reference.node_reference_coords(a)[0];
            let xb = reference.node_reference_coords(b)[0];
            xa.total_cmp(&xb)
        })
        .collect();

    let mut arc_length = DMatrix::zeros(coords.nrows(), 1);
    let mut s = 0.0;
    for (&prev, &next) in order.iter().tuple_windows() {
        s += (coords.row(next) - coords.row(prev)).norm();
        arc_length[(next, 0)] = s;
    }
    arc_length
}

impl Element {
    /// Creates an element of the given family.
    ///
    /// `coords` holds the physical position of each node as a row. Line elements may live in
    /// 2D or 3D space; all other families must have as many coordinates as reference
    /// dimensions.
    pub fn new(
        id: usize,
        family: ElementFamily,
        nodes: Vec<usize>,
        coords: DMatrix<f64>,
        dofs_per_node: usize,
    ) -> Result<Self> {
        let reference = family.reference();
        if nodes.len() != reference.num_nodes() {
            return Err(FemError::InvalidTopology {
                family,
                expected: reference.num_nodes(),
                actual: nodes.len(),
            });
        }
        if coords.nrows() != nodes.len() {
            return Err(FemError::DimensionMismatch {
                expected: nodes.len(),
                actual: coords.nrows(),
            });
        }
        if dofs_per_node == 0 {
            return Err(FemError::InvalidParameter(
                "elements need at least one DOF per node".to_string(),
            ));
        }

        let reference_dim = reference.reference_dim();
        let spatial_dim = coords.ncols();
        let local_coords = if spatial_dim == reference_dim {
            coords.clone()
        } else if reference_dim == 1 && spatial_dim > 1 {
            arc_length_coords(family, &coords)
        } else {
            return Err(FemError::NotImplemented(format!(
                "{reference_dim}D {family:?} elements in {spatial_dim}D space"
            )));
        };

        let sides = reference
            .sides()
            .iter()
            .map(|side_nodes| SideInfo {
                tags: BTreeSet::new(),
                local_dofs: expand_dofs(side_nodes, dofs_per_node),
                neighbor: None,
            })
            .collect();

        Ok(Self {
            id,
            family,
            dofs: expand_dofs(&nodes, dofs_per_node),
            nodes,
            coords,
            local_coords,
            dofs_per_node,
            sides,
            is_side: false,
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn family(&self) -> ElementFamily {
        self.family
    }

    pub fn nodes(&self) -> &[usize] {
        &self.nodes
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Physical node positions, one row per node.
    pub fn coords(&self) -> &DMatrix<f64> {
        &self.coords
    }

    /// The coordinates the Jacobian is computed from.
    pub fn local_coords(&self) -> &DMatrix<f64> {
        &self.local_coords
    }

    pub fn reference_dim(&self) -> usize {
        self.family.reference_dim()
    }

    pub fn spatial_dim(&self) -> usize {
        self.coords.ncols()
    }

    pub fn dofs_per_node(&self) -> usize {
        self.dofs_per_node
    }

    pub fn num_dofs(&self) -> usize {
        self.dofs.len()
    }

    /// Global DOF indices of the element in element-local order.
    pub fn dofs(&self) -> &[usize] {
        &self.dofs
    }

    /// The scalar DOF list, i.e. the global node indices.
    pub fn raw_dofs(&self) -> &[usize] {
        &self.nodes
    }

    pub fn sides(&self) -> &[SideInfo] {
        &self.sides
    }

    pub(crate) fn sides_mut(&mut self) -> &mut [SideInfo] {
        &mut self.sides
    }

    /// Whether this element was built by [`Element::build_side`].
    pub fn is_side(&self) -> bool {
        self.is_side
    }

    /// The scalar basis row at the given reference coordinates.
    ///
    /// # Panics
    ///
    /// Panics if `xi` has fewer entries than the reference dimension. The same holds for every
    /// other method taking reference coordinates.
    pub fn basis(&self, xi: &[f64]) -> DMatrix<f64> {
        self.family.reference().basis(xi)
    }

    /// The shape matrix `N`.
    ///
    /// For a scalar field this is the basis row. With `d` DOFs per node it is the `d x d n`
    /// matrix for which `N * u_e` interpolates every component of the element DOF vector.
    pub fn shape(&self, xi: &[f64]) -> DMatrix<f64> {
        let basis = self.basis(xi);
        let d = self.dofs_per_node;
        if d == 1 {
            return basis;
        }

        let mut shape = DMatrix::zeros(d, d * self.num_nodes());
        for (i, &value) in basis.iter().enumerate() {
            for c in 0..d {
                shape[(c, d * i + c)] = value;
            }
        }
        shape
    }

    pub fn jacobian(&self, xi: &[f64]) -> DMatrix<f64> {
        self.family.reference().jacobian(xi, &self.local_coords)
    }

    /// Determinant of the Jacobian.
    ///
    /// Fails with [`FemError::DegenerateElement`] unless the determinant is positive.
    pub fn jacobian_determinant(&self, xi: &[f64]) -> Result<f64> {
        let determinant = self.jacobian(xi).determinant();
        if determinant > 0.0 {
            Ok(determinant)
        } else {
            Err(FemError::DegenerateElement {
                element: self.id,
                determinant,
            })
        }
    }

    /// Basis gradients with respect to the element coordinates, as a
    /// `reference_dim x n` matrix.
    pub fn basis_gradients(&self, xi: &[f64]) -> Result<DMatrix<f64>> {
        let j = self.jacobian(xi);
        let determinant = j.determinant();
        let j_inv = j.try_inverse().ok_or(FemError::DegenerateElement {
            element: self.id,
            determinant,
        })?;
        Ok(j_inv * self.family.reference().basis_derivative(xi))
    }

    /// The shape derivative matrix `B`.
    ///
    /// For scalar fields this is the matrix of physical basis gradients. For vector fields
    /// whose component count equals the dimension it is the strain operator in engineering
    /// (Voigt) notation: 3 rows in 2D (`xx, yy, xy`) and 6 rows in 3D
    /// (`xx, yy, zz, yz, xz, xy`). Any other layout stacks the gradient of each component.
    pub fn shape_derivative(&self, xi: &[f64]) -> Result<DMatrix<f64>> {
        let g = self.basis_gradients(xi)?;
        let d = self.dofs_per_node;
        let r = g.nrows();
        let n = g.ncols();
        if d == 1 {
            return Ok(g);
        }

        let b = if d == r && r == 2 {
            let mut b = DMatrix::zeros(3, 2 * n);
            for i in 0..n {
                b[(0, 2 * i)] = g[(0, i)];
                b[(1, 2 * i + 1)] = g[(1, i)];
                b[(2, 2 * i)] = g[(1, i)];
                b[(2, 2 * i + 1)] = g[(0, i)];
            }
            b
        } else if d == r && r == 3 {
            let mut b = DMatrix::zeros(6, 3 * n);
            for i in 0..n {
                for k in 0..3 {
                    b[(k, 3 * i + k)] = g[(k, i)];
                }
                b[(3, 3 * i + 1)] = g[(2, i)];
                b[(3, 3 * i + 2)] = g[(1, i)];
                b[(4, 3 * i)] = g[(2, i)];
                b[(4, 3 * i + 2)] = g[(0, i)];
                b[(5, 3 * i)] = g[(1, i)];
                b[(5, 3 * i + 1)] = g[(0, i)];
            }
            b
        } else {
            let mut b = DMatrix::zeros(d * r, d * n);
            for i in 0..n {
                for c in 0..d {
                    for k in 0..r {
                        b[(c * r + k, d * i + c)] = g[(k, i)];
                    }
                }
            }
            b
        };
        Ok(b)
    }

    /// Maps reference coordinates to physical coordinates.
    pub fn map_reference_coords(&self, xi: &[f64]) -> DVector<f64> {
        let x = self.basis(xi) * &self.coords;
        DVector::from_iterator(x.ncols(), x.iter().copied())
    }

    /// Unit normal of a 1D element in 2D space.
    ///
    /// The normal is the tangent rotated clockwise by 90 degrees. Side elements inherit the
    /// counter-clockwise traversal of their parent, so for them this is the outward normal.
    pub fn normal(&self, xi: &[f64]) -> Result<DVector<f64>> {
        if self.reference_dim() != 1 || self.spatial_dim() != 2 {
            return Err(FemError::NotImplemented(format!(
                "normals of {}D elements in {}D space",
                self.reference_dim(),
                self.spatial_dim()
            )));
        }

        let tangent = self.family.reference().basis_derivative(xi) * &self.coords;
        let length = tangent.norm();
        if length <= 0.0 {
            return Err(FemError::DegenerateElement {
                element: self.id,
                determinant: length,
            });
        }
        Ok(DVector::from_column_slice(&[tangent[(0, 1)] / length, -tangent[(0, 0)] / length]))
    }

    /// Reference coordinates of the point a side of a 1D element collapses to.
    pub fn side_point(&self, side: usize) -> Result<Vec<f64>> {
        let reference = self.family.reference();
        let side_nodes = reference.sides().get(side).ok_or_else(|| {
            FemError::InvalidParameter(format!("{:?} has no side {side}", self.family))
        })?;
        if side_nodes.len() != 1 {
            return Err(FemError::InvalidParameter(format!(
                "side {side} of {:?} is not a point",
                self.family
            )));
        }
        Ok(reference.node_reference_coords(side_nodes[0]))
    }

    /// Builds the lower-dimensional element lying on the given side.
    ///
    /// The side element shares the DOF layout of its parent and keeps the parent's id, so
    /// errors raised while integrating over it point at the parent.
    pub fn build_side(&self, side: usize) -> Result<Element> {
        let reference = self.family.reference();
        let side_nodes = reference.sides().get(side).ok_or_else(|| {
            FemError::InvalidParameter(format!("{:?} has no side {side}", self.family))
        })?;
        let family = reference.side_family().ok_or_else(|| {
            FemError::NotImplemented(format!("side elements of {:?}, whose sides are points", self.family))
        })?;

        let nodes = side_nodes.iter().map(|&local| self.nodes[local]).collect();
        let coords = self.coords.select_rows(side_nodes.iter());
        let mut element = Element::new(self.id, family, nodes, coords, self.dofs_per_node)?;
        element.is_side = true;
        Ok(element)
    }
}

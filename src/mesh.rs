//! Meshes, DOF numbering and boundary regions.
//!
//! A mesh is built in two stages. A [`MeshBuilder`] collects nodes, elements and boundary
//! definitions. [`MeshBuilder::initialize`] then numbers the DOFs, connects neighboring
//! elements, tags boundary sides and freezes the result into an immutable [`Mesh`].
use crate::config::DofsPerNode;
use crate::element::{collapse_dof, Element, ElementFamily};
use crate::error::{FemError, Result};
use log::{debug, warn};
use nalgebra::DMatrix;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fmt::{Debug, Formatter};
use std::ops::Range;

pub mod procedural;

/// Tag given to every outer side of a mesh, unless the user registers a boundary with this
/// tag themselves.
pub const OUTER_BOUNDARY: usize = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: usize,
    pub coords: Vec<f64>,
}

/// The edges of an axis-aligned rectangular domain.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum GridEdge {
    Bottom,
    Right,
    Top,
    Left,
}

impl GridEdge {
    /// The axis the edge is orthogonal to and whether it lies at the maximum of that axis.
    fn axis(&self) -> (usize, bool) {
        match self {
            Self::Bottom => (1, false),
            Self::Right => (0, true),
            Self::Top => (1, true),
            Self::Left => (0, false),
        }
    }
}

/// How the DOFs of a boundary region are treated by the solver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundaryKind {
    /// The region prescribes values. `components` restricts the constraint to the given
    /// per-node components; `None` constrains all of them.
    Essential { components: Option<Vec<usize>> },
    /// The region is only used to restrict integrals (fluxes, tractions).
    Natural,
}

impl BoundaryKind {
    /// Essential boundary constraining every component.
    pub fn essential() -> Self {
        Self::Essential { components: None }
    }

    pub fn is_essential(&self) -> bool {
        matches!(self, Self::Essential { .. })
    }
}

/// Selects the nodes, sides and elements of a region.
pub enum BoundarySelector {
    /// All outer sides.
    Outer,
    /// The outer sides on one edge of the mesh bounding box.
    Edge(GridEdge),
    /// The given nodes, plus the outer sides and the elements whose nodes are all among them.
    Nodes(Vec<usize>),
    /// Nodes whose coordinates satisfy the predicate, plus the outer sides and the elements
    /// whose nodes all satisfy it.
    Geometric(Box<dyn Fn(&[f64]) -> bool + Send + Sync>),
}

impl BoundarySelector {
    pub fn geometric(predicate: impl Fn(&[f64]) -> bool + Send + Sync + 'static) -> Self {
        Self::Geometric(Box::new(predicate))
    }
}

impl Debug for BoundarySelector {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Outer => write!(f, "Outer"),
            Self::Edge(edge) => f.debug_tuple("Edge").field(edge).finish(),
            Self::Nodes(nodes) => f.debug_tuple("Nodes").field(nodes).finish(),
            Self::Geometric(_) => write!(f, "Geometric(..)"),
        }
    }
}

/// A tagged part of a mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub kind: BoundaryKind,
    /// Sorted node indices.
    pub nodes: Vec<usize>,
    /// `(element, local side)` pairs.
    pub sides: Vec<(usize, usize)>,
    /// Sorted element indices.
    pub elements: Vec<usize>,
}

impl Region {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.sides.is_empty() && self.elements.is_empty()
    }
}

/// Which DOFs [`Mesh::dof_mask`] selects.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DofSelection {
    All,
    Essential,
    NonEssential,
}

/// Append-only collection of nodes, elements and boundary definitions.
#[derive(Debug)]
pub struct MeshBuilder {
    dofs_per_node: DofsPerNode,
    nodes: Vec<Vec<f64>>,
    elements: Vec<(ElementFamily, Vec<usize>)>,
    boundaries: Vec<(usize, BoundaryKind, BoundarySelector)>,
}

impl MeshBuilder {
    pub fn new(dofs_per_node: DofsPerNode) -> Self {
        Self {
            dofs_per_node,
            nodes: Vec::new(),
            elements: Vec::new(),
            boundaries: Vec::new(),
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_elements(&self) -> usize {
        self.elements.len()
    }

    /// Adds a node with 1 to 3 coordinates and returns its index.
    ///
    /// Indices are zero-based and sequential: the first node is 0 and owns the DOFs
    /// `0..stride`.
    pub fn add_node(&mut self, coords: &[f64]) -> usize {
        self.nodes.push(coords.to_vec());
        self.nodes.len() - 1
    }

    /// Moves an existing node.
    pub fn set_node_coords(&mut self, node: usize, coords: &[f64]) -> Result<()> {
        let existing = self
            .nodes
            .get_mut(node)
            .ok_or_else(|| FemError::NotFound(format!("node {node}")))?;
        *existing = coords.to_vec();
        Ok(())
    }

    /// Adds an element and returns its zero-based index.
    ///
    /// Node indices are only checked against the registered nodes by
    /// [`initialize`](Self::initialize), so elements may be added before their nodes.
    pub fn add_element(&mut self, family: ElementFamily, nodes: &[usize]) -> Result<usize> {
        if nodes.len() != family.num_nodes() {
            return Err(FemError::InvalidTopology {
                family,
                expected: family.num_nodes(),
                actual: nodes.len(),
            });
        }
        self.elements.push((family, nodes.to_vec()));
        Ok(self.elements.len() - 1)
    }

    /// Registers a tagged region, resolved when the mesh is initialized.
    pub fn add_boundary(&mut self, tag: usize, kind: BoundaryKind, selector: BoundarySelector) -> Result<()> {
        if self.boundaries.iter().any(|(existing, _, _)| *existing == tag) {
            return Err(FemError::InvalidParameter(format!("boundary {tag} is already defined")));
        }
        self.boundaries.push((tag, kind, selector));
        Ok(())
    }

    /// Numbers DOFs, connects elements and resolves boundary regions.
    pub fn initialize(self) -> Result<Mesh> {
        let MeshBuilder {
            dofs_per_node,
            nodes,
            elements: element_defs,
            mut boundaries,
        } = self;

        for (i, coords) in nodes.iter().enumerate() {
            if coords.is_empty() || coords.len() > 3 {
                return Err(FemError::InvalidParameter(format!(
                    "node {i} has {} coordinates, expected 1 to 3",
                    coords.len()
                )));
            }
        }
        let spatial_dim = nodes.iter().map(Vec::len).max().unwrap_or(0);
        let stride = dofs_per_node.resolve(spatial_dim)?;

        let mut elements = Vec::with_capacity(element_defs.len());
        for (id, (family, element_nodes)) in element_defs.into_iter().enumerate() {
            if let Some(required) = family.required_dofs_per_node() {
                if required != stride {
                    return Err(FemError::InvalidParameter(format!(
                        "{family:?} elements need {required} DOFs per node, the mesh has {stride}"
                    )));
                }
            }
            let coords = element_coords(id, &element_nodes, &nodes)?;
            elements.push(Element::new(id, family, element_nodes, coords, stride)?);
        }

        let outer_sides = connect_sides(&mut elements);

        if !boundaries.iter().any(|(tag, _, _)| *tag == OUTER_BOUNDARY) {
            boundaries.insert(0, (OUTER_BOUNDARY, BoundaryKind::Natural, BoundarySelector::Outer));
        }

        let mut mesh = Mesh {
            nodes: nodes
                .into_iter()
                .enumerate()
                .map(|(id, coords)| Node { id, coords })
                .collect(),
            elements,
            dofs_per_node: stride,
            spatial_dim,
            regions: BTreeMap::new(),
        };

        for (tag, kind, selector) in boundaries {
            let region = mesh.select_region(&outer_sides, kind, &selector);
            if region.is_empty() {
                warn!("Boundary {tag} ({selector:?}) does not select any nodes or sides.");
            }
            for &(element, side) in &region.sides {
                mesh.elements[element].sides_mut()[side].tags.insert(tag);
            }
            debug!(
                "Boundary {tag}: {} nodes, {} sides, {} elements.",
                region.nodes.len(),
                region.sides.len(),
                region.elements.len()
            );
            mesh.regions.insert(tag, region);
        }

        debug!(
            "Initialized mesh with {} nodes, {} elements and {} DOFs.",
            mesh.num_nodes(),
            mesh.num_elements(),
            mesh.num_dofs()
        );
        Ok(mesh)
    }
}

fn element_coords(element: usize, element_nodes: &[usize], nodes: &[Vec<f64>]) -> Result<DMatrix<f64>> {
    let node_coords = element_nodes
        .iter()
        .map(|&node| {
            nodes
                .get(node)
                .ok_or(FemError::UnknownNode { element, node })
        })
        .collect::<Result<Vec<_>>>()?;

    let dim = node_coords.first().map(|c| c.len()).unwrap_or(0);
    if let Some(other) = node_coords.iter().find(|c| c.len() != dim) {
        return Err(FemError::DimensionMismatch {
            expected: dim,
            actual: other.len(),
        });
    }
    Ok(DMatrix::from_fn(node_coords.len(), dim, |i, j| node_coords[i][j]))
}

/// Matches sides shared between elements and returns the outer `(element, side)` pairs.
///
/// A side is identified by its sorted global node indices. Sides owned by exactly one element
/// are outer sides, sides owned by exactly two elements link the elements as neighbors.
fn connect_sides(elements: &mut [Element]) -> Vec<(usize, usize)> {
    // Keyed by the sorted global nodes of the side
    let mut owners: BTreeMap<Vec<usize>, Vec<(usize, usize)>> = BTreeMap::new();
    for element in elements.iter() {
        let reference = element.family().reference();
        for (side, side_nodes) in reference.sides().iter().enumerate() {
            let mut key: Vec<usize> = side_nodes.iter().map(|&i| element.nodes()[i]).collect();
            key.sort_unstable();
            owners.entry(key).or_default().push((element.id(), side));
        }
    }

    let mut outer = Vec::new();
    for pairs in owners.into_values() {
        match pairs.as_slice() {
            &[single] => outer.push(single),
            &[(e1, s1), (e2, s2)] => {
                elements[e1].sides_mut()[s1].neighbor = Some(e2);
                elements[e2].sides_mut()[s2].neighbor = Some(e1);
            }
            _ => {}
        }
    }
    outer.sort_unstable();
    outer
}

/// An initialized mesh. Immutable.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    nodes: Vec<Node>,
    elements: Vec<Element>,
    dofs_per_node: usize,
    spatial_dim: usize,
    regions: BTreeMap<usize, Region>,
}

impl Mesh {
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn element(&self, id: usize) -> Option<&Element> {
        self.elements.get(id)
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_elements(&self) -> usize {
        self.elements.len()
    }

    pub fn dofs_per_node(&self) -> usize {
        self.dofs_per_node
    }

    /// The largest coordinate count over all nodes.
    pub fn spatial_dim(&self) -> usize {
        self.spatial_dim
    }

    pub fn num_dofs(&self) -> usize {
        self.nodes.len() * self.dofs_per_node
    }

    /// Global DOFs of a node.
    pub fn node_dofs(&self, node: usize) -> Range<usize> {
        node * self.dofs_per_node..(node + 1) * self.dofs_per_node
    }

    /// The node coordinates and component a DOF belongs to.
    pub fn dof_location(&self, dof: usize) -> Option<(&[f64], usize)> {
        let (node, component) = collapse_dof(dof, self.dofs_per_node);
        self.nodes
            .get(node)
            .map(|node| (node.coords.as_slice(), component))
    }

    pub fn region(&self, tag: usize) -> Result<&Region> {
        self.regions
            .get(&tag)
            .ok_or_else(|| FemError::NotFound(format!("boundary {tag}")))
    }

    pub fn regions(&self) -> impl Iterator<Item = (usize, &Region)> {
        self.regions.iter().map(|(tag, region)| (*tag, region))
    }

    /// Per-axis minimum and maximum node coordinates.
    pub fn bounding_box(&self) -> (Vec<f64>, Vec<f64>) {
        let mut min = vec![f64::INFINITY; self.spatial_dim];
        let mut max = vec![f64::NEG_INFINITY; self.spatial_dim];
        for node in &self.nodes {
            for (k, &x) in node.coords.iter().enumerate() {
                min[k] = min[k].min(x);
                max[k] = max[k].max(x);
            }
        }
        (min, max)
    }

    /// Boolean mask over all global DOFs.
    ///
    /// With `tag = None`, [`DofSelection::Essential`] selects the DOFs constrained by any
    /// essential region and [`DofSelection::All`] selects every DOF. With a tag, only the
    /// given region is considered: `All` selects every DOF of its nodes and `Essential` those
    /// it constrains. [`DofSelection::NonEssential`] is always the complement of `Essential`.
    pub fn dof_mask(&self, tag: Option<usize>, selection: DofSelection) -> Result<Vec<bool>> {
        let mut mask = vec![false; self.num_dofs()];
        match (tag, selection) {
            (None, DofSelection::All) => mask.fill(true),
            (Some(tag), DofSelection::All) => {
                for &node in &self.region(tag)?.nodes {
                    for dof in self.node_dofs(node) {
                        mask[dof] = true;
                    }
                }
            }
            (_, DofSelection::Essential | DofSelection::NonEssential) => {
                let regions: Vec<&Region> = match tag {
                    Some(tag) => vec![self.region(tag)?],
                    None => self.regions.values().collect(),
                };
                for region in regions {
                    self.mark_essential(region, &mut mask);
                }
                if selection == DofSelection::NonEssential {
                    mask.iter_mut().for_each(|m| *m = !*m);
                }
            }
        }
        Ok(mask)
    }

    /// Indices of the `true` entries of [`dof_mask`](Self::dof_mask).
    pub fn dof_indices(&self, tag: Option<usize>, selection: DofSelection) -> Result<Vec<usize>> {
        let mask = self.dof_mask(tag, selection)?;
        Ok(mask
            .iter()
            .enumerate()
            .filter_map(|(i, &m)| m.then_some(i))
            .collect())
    }

    fn mark_essential(&self, region: &Region, mask: &mut [bool]) {
        let BoundaryKind::Essential { components } = &region.kind else {
            return;
        };
        for &node in &region.nodes {
            let dofs = self.node_dofs(node);
            match components {
                None => dofs.for_each(|dof| mask[dof] = true),
                Some(components) => {
                    for &c in components.iter().filter(|&&c| c < self.dofs_per_node) {
                        mask[dofs.start + c] = true;
                    }
                }
            }
        }
    }

    fn side_nodes(&self, element: usize, side: usize) -> impl Iterator<Item = usize> + '_ {
        let element = &self.elements[element];
        element.family().reference().sides()[side]
            .iter()
            .map(move |&i| element.nodes()[i])
    }

    fn select_region(&self, outer_sides: &[(usize, usize)], kind: BoundaryKind, selector: &BoundarySelector) -> Region {
        let mut nodes = BTreeSet::new();
        let mut elements = BTreeSet::new();
        let sides: Vec<(usize, usize)> = match selector {
            BoundarySelector::Outer => outer_sides.to_vec(),
            BoundarySelector::Edge(edge) => {
                let (axis, at_max) = edge.axis();
                let (min, max) = self.bounding_box();
                if axis >= self.spatial_dim {
                    Vec::new()
                } else {
                    let target = if at_max { max[axis] } else { min[axis] };
                    let extent = max
                        .iter()
                        .zip(&min)
                        .map(|(a, b)| a - b)
                        .fold(0.0, f64::max);
                    let tol = 1e-10 * extent.max(1.0);
                    let on_edge = |node: usize| {
                        self.nodes[node]
                            .coords
                            .get(axis)
                            .map_or(false, |x| (x - target).abs() <= tol)
                    };
                    outer_sides
                        .iter()
                        .copied()
                        .filter(|&(e, s)| self.side_nodes(e, s).all(&on_edge))
                        .collect()
                }
            }
            BoundarySelector::Nodes(selected) => {
                let selected: BTreeSet<usize> = selected.iter().copied().collect();
                nodes.extend(selected.iter().copied().filter(|&n| n < self.nodes.len()));
                self.select_by_nodes(outer_sides, |node| selected.contains(&node), &mut elements)
            }
            BoundarySelector::Geometric(predicate) => {
                let inside: Vec<bool> = self.nodes.iter().map(|n| predicate(&n.coords)).collect();
                nodes.extend((0..self.nodes.len()).filter(|&n| inside[n]));
                self.select_by_nodes(outer_sides, |node| inside[node], &mut elements)
            }
        };

        for &(element, side) in &sides {
            nodes.extend(self.side_nodes(element, side));
            elements.insert(element);
        }

        Region {
            kind,
            nodes: nodes.into_iter().collect(),
            sides,
            elements: elements.into_iter().collect(),
        }
    }

    /// Collects the elements whose nodes are all selected and returns the selected outer sides.
    fn select_by_nodes(
        &self,
        outer_sides: &[(usize, usize)],
        contains: impl Fn(usize) -> bool,
        elements: &mut BTreeSet<usize>,
    ) -> Vec<(usize, usize)> {
        elements.extend(
            self.elements
                .iter()
                .filter(|element| element.nodes().iter().all(|&n| contains(n)))
                .map(Element::id),
        );
        outer_sides
            .iter()
            .copied()
            .filter(|&(e, s)| self.side_nodes(e, s).all(&contains))
            .collect()
    }
}

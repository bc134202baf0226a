use crate::rectangle;
use femsys::assembly::{
    assemble_element_block, assemble_element_boundary_block, assemble_matrix, assemble_vector, element_quadrature,
    CsrAssembler, ElementBlockAssembler, ElementConnectivityAssembler, KernelAssembler, TripletAssembler,
};
use femsys::config::{AssemblyStrategy, DofsPerNode};
use femsys::element::{expand_dofs, Element, ElementFamily};
use femsys::error::{FemError, Result};
use femsys::expression::Expression;
use femsys::mesh::procedural::create_rectangular_grid;
use femsys::mesh::{BoundaryKind, BoundarySelector, GridEdge, OUTER_BOUNDARY};
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::CsrMatrix;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum BlockShape {
    Square,
    Column,
    Tall,
}

struct MockElementAssembler {
    num_dofs: usize,
    element_dofs: Vec<Vec<usize>>,
    skipped: Vec<usize>,
    shape: BlockShape,
}

impl MockElementAssembler {
    fn new(num_dofs: usize, element_dofs: Vec<Vec<usize>>) -> Self {
        Self {
            num_dofs,
            element_dofs,
            skipped: Vec::new(),
            shape: BlockShape::Square,
        }
    }
}

impl ElementConnectivityAssembler for MockElementAssembler {
    fn num_dofs(&self) -> usize {
        self.num_dofs
    }

    fn num_elements(&self) -> usize {
        self.element_dofs.len()
    }

    fn element_dof_count(&self, element_index: usize) -> usize {
        self.element_dofs[element_index].len()
    }

    fn populate_element_dofs(&self, output: &mut [usize], element_index: usize) {
        output.copy_from_slice(&self.element_dofs[element_index])
    }

    fn element_contributes(&self, element_index: usize) -> bool {
        !self.skipped.contains(&element_index)
    }
}

impl ElementBlockAssembler for MockElementAssembler {
    fn assemble_element_block(&self, element_index: usize) -> Result<Option<DMatrix<f64>>> {
        assert!(self.element_contributes(element_index));
        let n = self.element_dof_count(element_index);
        let block = match self.shape {
            BlockShape::Square => DMatrix::repeat(n, n, 1.0),
            BlockShape::Column => DMatrix::repeat(n, 1, 1.0),
            BlockShape::Tall => DMatrix::repeat(n + 1, n, 1.0),
        };
        Ok(Some(block))
    }
}

fn mock_connectivity() -> Vec<Vec<usize>> {
    vec![vec![0, 1, 2], vec![2, 3], vec![], vec![3, 4, 4, 4, 4, 4, 4]]
}

fn all_matrix_assemblers() -> Vec<(AssemblyStrategy, bool)> {
    vec![
        (AssemblyStrategy::Direct, false),
        (AssemblyStrategy::Direct, true),
        (AssemblyStrategy::Triplet, false),
        (AssemblyStrategy::Triplet, true),
    ]
}

#[test]
fn csr_assemble_mock_pattern() {
    // Empty pattern
    {
        let element_assembler = MockElementAssembler::new(0, vec![vec![]]);
        let (offsets, indices) = CsrAssembler::default().assemble_pattern(&element_assembler);
        assert_eq!(offsets, vec![0]);
        assert!(indices.is_empty());
    }

    // Empty pattern with DOFs
    {
        let element_assembler = MockElementAssembler::new(10, vec![vec![]]);
        let (offsets, indices) = CsrAssembler::default().assemble_pattern(&element_assembler);
        assert_eq!(offsets, vec![0; 11]);
        assert!(indices.is_empty());
    }

    // Simple pattern, one DOF per node
    {
        let element_assembler = MockElementAssembler::new(6, mock_connectivity());
        let (offsets, indices) = CsrAssembler::default().assemble_pattern(&element_assembler);
        assert_eq!(offsets, vec![0, 3, 6, 10, 13, 15, 15]);
        assert_eq!(indices, vec![0, 1, 2, 0, 1, 2, 0, 1, 2, 3, 2, 3, 4, 3, 4]);
    }

    // Simple pattern, two DOFs per node
    {
        let element_dofs = mock_connectivity()
            .iter()
            .map(|nodes| expand_dofs(nodes, 2))
            .collect();
        let element_assembler = MockElementAssembler::new(12, element_dofs);
        let (offsets, indices) = CsrAssembler::default().assemble_pattern(&element_assembler);
        assert_eq!(offsets, vec![0, 6, 12, 18, 24, 32, 40, 46, 52, 56, 60, 60, 60]);
        #[rustfmt::skip]
        let expected_indices = vec![
            0, 1, 2, 3, 4, 5, 0, 1, 2, 3, 4, 5, 0, 1, 2, 3, 4, 5, 0, 1, 2, 3, 4, 5, 0, 1, 2, 3, 4, 5, 6, 7, 0, 1,
            2, 3, 4, 5, 6, 7, 4, 5, 6, 7, 8, 9, 4, 5, 6, 7, 8, 9, 6, 7, 8, 9, 6, 7, 8, 9,
        ];
        assert_eq!(indices, expected_indices);
    }
}

#[test]
fn assemble_mock_matrix() {
    let element_assembler = MockElementAssembler::new(6, mock_connectivity());

    #[rustfmt::skip]
    let expected = DMatrix::from_row_slice(6, 6, &[
        1.0, 1.0, 1.0, 0.0, 0.0, 0.0,
        1.0, 1.0, 1.0, 0.0, 0.0, 0.0,
        1.0, 1.0, 2.0, 1.0, 0.0, 0.0,
        0.0, 0.0, 1.0, 2.0, 6.0, 0.0,
        0.0, 0.0, 0.0, 6.0, 36.0, 0.0,
        0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
    ]);

    for (strategy, parallel) in all_matrix_assemblers() {
        let csr = assemble_matrix(&element_assembler, strategy, parallel).unwrap();
        assert_eq!(csr.nnz(), 15, "{strategy:?}, parallel: {parallel}");
        assert_eq!(DMatrix::from(&csr), expected, "{strategy:?}, parallel: {parallel}");
    }
}

#[test]
fn assemble_into_existing_csr_accumulates() {
    let element_assembler = MockElementAssembler::new(6, mock_connectivity());
    let assembler = CsrAssembler::default();
    let mut csr = assembler.assemble(&element_assembler).unwrap();
    assembler.assemble_into_csr(&mut csr, &element_assembler).unwrap();
    assert_eq!(csr.get_entry(4, 4).unwrap().into_value(), 72.0);
    assert_eq!(csr.get_entry(0, 2).unwrap().into_value(), 2.0);

    // Entries outside the pattern cannot be assembled into
    let mut empty = CsrMatrix::zeros(6, 6);
    assert!(matches!(
        assembler.assemble_into_csr(&mut empty, &element_assembler),
        Err(FemError::NotFound(_))
    ));
}

#[test]
fn skipped_elements_do_not_contribute() {
    let mut element_assembler = MockElementAssembler::new(6, mock_connectivity());
    element_assembler.skipped = vec![3];

    let (offsets, _) = CsrAssembler::default().assemble_pattern(&element_assembler);
    assert_eq!(offsets, vec![0, 3, 6, 10, 12, 12, 12]);

    for (strategy, parallel) in all_matrix_assemblers() {
        let dense = DMatrix::from(&assemble_matrix(&element_assembler, strategy, parallel).unwrap());
        assert_eq!(dense[(3, 3)], 1.0);
        assert_eq!(dense.row(4).sum(), 0.0);
    }

    element_assembler.shape = BlockShape::Column;
    let vector = assemble_vector(&element_assembler, false).unwrap();
    assert_eq!(vector, DVector::from_column_slice(&[1.0, 1.0, 2.0, 1.0, 0.0, 0.0]));
}

#[test]
fn assemble_mock_vector() {
    let mut element_assembler = MockElementAssembler::new(6, mock_connectivity());
    element_assembler.shape = BlockShape::Column;
    let expected = DVector::from_column_slice(&[1.0, 1.0, 2.0, 2.0, 6.0, 0.0]);
    for parallel in [false, true] {
        assert_eq!(assemble_vector(&element_assembler, parallel).unwrap(), expected);
    }
}

#[test]
fn block_shapes_are_checked() {
    let mut element_assembler = MockElementAssembler::new(6, mock_connectivity());

    element_assembler.shape = BlockShape::Column;
    for (strategy, parallel) in all_matrix_assemblers() {
        assert!(matches!(
            assemble_matrix(&element_assembler, strategy, parallel),
            Err(FemError::IncompatibleShapes { .. })
        ));
    }

    element_assembler.shape = BlockShape::Tall;
    for (strategy, parallel) in all_matrix_assemblers() {
        assert!(matches!(
            assemble_matrix(&element_assembler, strategy, parallel),
            Err(FemError::DimensionMismatch { .. })
        ));
    }
    assert!(matches!(
        assemble_vector(&element_assembler, false),
        Err(FemError::DimensionMismatch { .. })
    ));

    element_assembler.shape = BlockShape::Square;
    assert!(matches!(
        assemble_vector(&element_assembler, true),
        Err(FemError::IncompatibleShapes { .. })
    ));
}

#[test]
fn triplet_and_direct_assemblers_agree_on_meshes() {
    let mesh = rectangle(1.0, 1.0, 5, 4, ElementFamily::Tri6, DofsPerNode::Vector);
    let kernel = Expression::parse("B'*B", &[]).unwrap();
    let element_assembler = KernelAssembler::new(&mesh, &kernel);

    let direct = CsrAssembler::default().assemble(&element_assembler).unwrap();
    let triplet = TripletAssembler::default().assemble(&element_assembler).unwrap();
    assert_eq!(direct.pattern(), triplet.pattern());
    assert_matrix_eq!(DMatrix::from(&direct), DMatrix::from(&triplet), comp = abs, tol = 1e-12);
}

fn element(family: ElementFamily, coords: &[f64]) -> Element {
    let n = family.num_nodes();
    Element::new(0, family, (0..n).collect(), DMatrix::from_row_slice(n, 2, coords), 1).unwrap()
}

#[test]
fn element_blocks_integrate_over_the_physical_element() {
    let one = |_: &Element, _: &[f64]| -> Result<DMatrix<f64>> { Ok(DMatrix::repeat(1, 1, 1.0)) };

    let quad = element(ElementFamily::Quad4, &[0.0, 0.0, 2.0, 0.0, 2.5, 1.0, 0.5, 1.0]);
    let rule = element_quadrature(&quad, None).unwrap();
    assert_eq!(rule.len(), 4);
    let area = assemble_element_block(&quad, &one, &rule).unwrap();
    assert_scalar_eq!(area[(0, 0)], 2.0, comp = abs, tol = 1e-14);

    let triangle = element(ElementFamily::Tri3, &[0.0, 0.0, 3.0, 0.0, 0.0, 2.0]);
    let rule = element_quadrature(&triangle, Some(1)).unwrap();
    assert_eq!(rule.len(), 1);
    let area = assemble_element_block(&triangle, &one, &rule).unwrap();
    assert_scalar_eq!(area[(0, 0)], 3.0, comp = abs, tol = 1e-14);

    // Linear triangle mass matrix: area / 12 * (1 + delta_ij)
    let mass = Expression::parse("N'*N", &[]).unwrap();
    let rule = element_quadrature(&triangle, None).unwrap();
    let block = assemble_element_block(&triangle, &mass, &rule).unwrap();
    let expected = (DMatrix::repeat(3, 3, 1.0) + DMatrix::identity(3, 3)) * (3.0 / 12.0);
    assert_matrix_eq!(block, expected, comp = abs, tol = 1e-14);

    let degenerate = element(ElementFamily::Quad4, &[0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
    let rule = element_quadrature(&degenerate, None).unwrap();
    assert!(matches!(
        assemble_element_block(&degenerate, &one, &rule),
        Err(FemError::DegenerateElement { .. })
    ));
}

#[test]
fn inconsistent_kernel_shapes_fail_to_accumulate() {
    let quad = element(ElementFamily::Quad4, &[0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0]);
    let rule = element_quadrature(&quad, None).unwrap();
    let varying = |_: &Element, xi: &[f64]| -> Result<DMatrix<f64>> {
        let n = if xi[0] < 0.0 { 1 } else { 2 };
        Ok(DMatrix::zeros(n, n))
    };
    assert!(matches!(
        assemble_element_block(&quad, &varying, &rule),
        Err(FemError::IncompatibleShapes { operation: "accumulate", .. })
    ));
}

#[test]
fn boundary_blocks_gather_side_contributions() {
    let mesh = rectangle(1.0, 1.0, 1, 1, ElementFamily::Quad4, DofsPerNode::Scalar);
    let element = &mesh.elements()[0];
    let mass = Expression::parse("N'*N", &[]).unwrap();

    // Every side is an outer side and contributes a line mass matrix
    let block = assemble_element_boundary_block(element, OUTER_BOUNDARY, &mass, None)
        .unwrap()
        .unwrap();
    #[rustfmt::skip]
    let expected = DMatrix::from_row_slice(4, 4, &[
        2.0, 0.5, 0.0, 0.5,
        0.5, 2.0, 0.5, 0.0,
        0.0, 0.5, 2.0, 0.5,
        0.5, 0.0, 0.5, 2.0,
    ]) / 3.0;
    assert_matrix_eq!(block, expected, comp = abs, tol = 1e-14);

    assert_eq!(assemble_element_boundary_block(element, 17, &mass, None).unwrap(), None);
}

#[test]
fn boundary_assembler_only_visits_tagged_elements() {
    let mut builder =
        create_rectangular_grid((0.0, 1.0), (0.0, 1.0), 2, 2, ElementFamily::Quad4, DofsPerNode::Scalar).unwrap();
    builder
        .add_boundary(2, BoundaryKind::Natural, BoundarySelector::Edge(GridEdge::Top))
        .unwrap();
    let mesh = builder.initialize().unwrap();
    let kernel = Expression::parse("N'*N", &[]).unwrap();
    let element_assembler = KernelAssembler::new(&mesh, &kernel).with_boundary(Some(2));

    let contributing: Vec<usize> = (0..element_assembler.num_elements())
        .filter(|&i| element_assembler.element_contributes(i))
        .collect();
    assert_eq!(contributing, vec![2, 3]);

    let matrix = assemble_matrix(&element_assembler, AssemblyStrategy::Direct, false).unwrap();
    // The pattern spans both elements, but only the three top nodes couple
    assert_eq!(matrix.nnz(), 28);
    assert_eq!(matrix.values().iter().filter(|&&v| v != 0.0).count(), 7);
    let total: f64 = matrix.values().iter().sum();
    assert_scalar_eq!(total, 1.0, comp = abs, tol = 1e-14);
}

use crate::rectangle;
use femsys::assembly::Kernel;
use femsys::config::{AssemblyStrategy, DofsPerNode, SystemConfig};
use femsys::element::{Element, ElementFamily};
use femsys::error::FemError;
use femsys::expression::Value;
use femsys::mesh::procedural::create_line_grid;
use femsys::mesh::{BoundaryKind, BoundarySelector, GridEdge, MeshBuilder, OUTER_BOUNDARY};
use femsys::proptest::rectangular_grid;
use femsys::system::{Stored, System};
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::DMatrix;
use proptest::prelude::*;
use util::is_symmetric;

fn entry_sum(system: &System, name: &str) -> f64 {
    match system.get(name).unwrap() {
        Stored::Matrix(matrix) => matrix.values().iter().sum(),
        Stored::Vector(vector) => vector.sum(),
        Stored::Constant(_) => panic!("{name} is a constant"),
    }
}

#[test]
fn names_are_validated() {
    let mesh = rectangle(1.0, 1.0, 1, 1, ElementFamily::Quad4, DofsPerNode::Scalar);
    let mut system = System::new(&mesh, SystemConfig::default()).unwrap();

    for name in ["N", "B", "xi", "eta", "zeta"] {
        assert_eq!(
            system.add_constant(name, 1.0),
            Err(FemError::ReservedName(name.to_string()))
        );
        assert_eq!(
            system.add_matrix(name, "N'*N", None),
            Err(FemError::ReservedName(name.to_string()))
        );
    }
    for name in ["", "2k", "a b", "k-1"] {
        assert!(matches!(system.add_constant(name, 1.0), Err(FemError::InvalidParameter(_))));
    }

    system.add_constant("k", 2.0).unwrap();
    assert!(matches!(system.add_constant("k", 3.0), Err(FemError::InvalidParameter(_))));
    assert!(matches!(system.add_vector("k", "N'", None), Err(FemError::InvalidParameter(_))));
    system.add_matrix("M", "N'*N", None).unwrap();
    assert!(matches!(system.add_constant("M", 1.0), Err(FemError::InvalidParameter(_))));
    assert!(system.contains("k") && system.contains("M") && !system.contains("K"));
}

#[test]
fn constants_may_only_reference_earlier_constants() {
    let mesh = rectangle(1.0, 1.0, 1, 1, ElementFamily::Quad4, DofsPerNode::Scalar);
    let mut system = System::new(&mesh, SystemConfig::default()).unwrap();

    assert_eq!(
        system.add_constant("a", "2 * b"),
        Err(FemError::UnknownConstant("b".to_string()))
    );
    system.add_constant("b", 1.5).unwrap();
    system.add_constant("a", "2 * b").unwrap();
    assert_eq!(system.constant("a").unwrap(), &Value::Scalar(3.0));

    system
        .add_constant("D", DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]))
        .unwrap();
    system.add_constant("E", "a * D'").unwrap();
    assert_eq!(
        system.constant("E").unwrap(),
        &Value::Matrix(DMatrix::from_row_slice(2, 2, &[3.0, 9.0, 6.0, 12.0]))
    );

    assert!(matches!(system.add_constant("c", "N'*N"), Err(FemError::InvalidParameter(_))));
    assert_eq!(
        system.add_matrix("K", "B'*unknown*B", None),
        Err(FemError::UnknownConstant("unknown".to_string()))
    );
}

#[test]
fn lookups_fail_for_missing_or_unassembled_names() {
    let mesh = rectangle(1.0, 1.0, 1, 1, ElementFamily::Quad4, DofsPerNode::Scalar);
    let mut system = System::new(&mesh, SystemConfig::default()).unwrap();
    system.add_matrix("M", "N'*N", None).unwrap();
    system.add_vector("f", "N'", None).unwrap();

    assert!(matches!(system.get("missing"), Err(FemError::NotFound(_))));
    assert!(matches!(system.assemble("missing"), Err(FemError::NotFound(_))));
    assert!(matches!(system.get("M"), Err(FemError::NotFound(_))));
    assert!(!system.is_assembled("M"));

    system.assemble("M").unwrap();
    assert!(system.is_assembled("M"));
    assert!(matches!(system.vector("M"), Err(FemError::InvalidParameter(_))));
    assert!(matches!(system.constant("M"), Err(FemError::InvalidParameter(_))));
    assert_eq!(system.matrix("M").unwrap().nrows(), 4);
}

#[test]
fn boundary_tags_must_exist() {
    let mesh = rectangle(1.0, 1.0, 1, 1, ElementFamily::Quad4, DofsPerNode::Scalar);
    let mut system = System::new(&mesh, SystemConfig::default()).unwrap();
    assert!(matches!(system.add_vector("g", "N'", Some(42)), Err(FemError::NotFound(_))));
    assert!(!system.contains("g"));
    system.add_vector("g", "N'", Some(OUTER_BOUNDARY)).unwrap();
}

#[test]
fn invalid_system_config_is_rejected() {
    let mesh = rectangle(1.0, 1.0, 1, 1, ElementFamily::Quad4, DofsPerNode::Scalar);
    let config = SystemConfig {
        quadrature_order: Some(0),
        ..SystemConfig::default()
    };
    assert!(System::new(&mesh, config).is_err());
}

#[test]
fn mass_and_load_integrate_the_area() {
    for family in [ElementFamily::Quad4, ElementFamily::Tri3, ElementFamily::Tri6] {
        let mesh = rectangle(2.0, 1.5, 3, 2, family, DofsPerNode::Scalar);
        let mut system = System::new(&mesh, SystemConfig::default()).unwrap();
        system.add_matrix("M", "N'*N", None).unwrap();
        system.add_vector("f", "N'", None).unwrap();
        system.assemble_all().unwrap();

        assert_scalar_eq!(entry_sum(&system, "M"), 3.0, comp = abs, tol = 1e-12);
        assert_scalar_eq!(entry_sum(&system, "f"), 3.0, comp = abs, tol = 1e-12);
        let mass = DMatrix::from(system.matrix("M").unwrap());
        assert!(is_symmetric(&mass, 1e-14));
    }
}

#[test]
fn boundary_load_integrates_the_perimeter() {
    for family in [ElementFamily::Quad4, ElementFamily::Tri3, ElementFamily::Tri6] {
        let mesh = rectangle(2.0, 1.0, 4, 3, family, DofsPerNode::Scalar);
        let mut system = System::new(&mesh, SystemConfig::default()).unwrap();
        system.add_vector("g", "N'", Some(OUTER_BOUNDARY)).unwrap();
        system.add_matrix("G", "N'*N", Some(OUTER_BOUNDARY)).unwrap();
        system.assemble_all().unwrap();

        assert_scalar_eq!(entry_sum(&system, "g"), 6.0, comp = abs, tol = 1e-12);
        assert_scalar_eq!(entry_sum(&system, "G"), 6.0, comp = abs, tol = 1e-12);

        // Interior nodes receive nothing
        let g = system.vector("g").unwrap();
        let outer = &mesh.region(OUTER_BOUNDARY).unwrap().nodes;
        for node in 0..mesh.num_nodes() {
            assert_eq!(g[node] != 0.0, outer.contains(&node));
        }
    }
}

#[test]
fn boundary_load_on_one_edge() {
    let mut builder = femsys::mesh::procedural::create_rectangular_grid(
        (0.0, 2.0),
        (0.0, 1.0),
        2,
        2,
        ElementFamily::Quad4,
        DofsPerNode::Vector,
    )
    .unwrap();
    builder
        .add_boundary(2, BoundaryKind::Natural, BoundarySelector::Edge(GridEdge::Top))
        .unwrap();
    let mesh = builder.initialize().unwrap();

    let mut system = System::new(&mesh, SystemConfig::default()).unwrap();
    system
        .add_constant("q", DMatrix::from_column_slice(2, 1, &[0.0, -3.0]))
        .unwrap();
    system.add_vector("t", "N'*q", Some(2)).unwrap();
    system.assemble("t").unwrap();
    let t = system.vector("t").unwrap();

    // Top nodes 6, 7, 8 share a total load of 2 * -3 as 1/4, 1/2, 1/4
    let mut expected = nalgebra::DVector::zeros(18);
    expected[13] = -1.5;
    expected[15] = -3.0;
    expected[17] = -1.5;
    assert_matrix_eq!(t, expected, comp = abs, tol = 1e-12);
}

#[test]
fn line_boundaries_are_points() {
    for family in [ElementFamily::Line2, ElementFamily::Line3] {
        let mesh = create_line_grid(0.0, 1.0, 5, family, DofsPerNode::Scalar)
            .and_then(MeshBuilder::initialize)
            .unwrap();
        let mut system = System::new(&mesh, SystemConfig::default()).unwrap();
        system.add_vector("g", "N'", Some(OUTER_BOUNDARY)).unwrap();
        system.add_vector("f", "N'", None).unwrap();
        system.assemble_all().unwrap();

        let g = system.vector("g").unwrap();
        assert_eq!(g.sum(), 2.0);
        assert_eq!(g[0], 1.0);
        assert_eq!(g[mesh.num_nodes() - 1], 1.0);
        assert_scalar_eq!(entry_sum(&system, "f"), 1.0, comp = abs, tol = 1e-12);
    }
}

#[test]
fn stiffness_annihilates_constants() {
    let mesh = rectangle(1.0, 2.0, 3, 4, ElementFamily::Quad4, DofsPerNode::Scalar);
    let mut system = System::new(&mesh, SystemConfig::default()).unwrap();
    system.add_constant("D", 0.7).unwrap();
    system.add_matrix("K", "B'*D*B", None).unwrap();
    system.assemble("K").unwrap();

    let k = system.matrix("K").unwrap();
    for row in k.row_iter() {
        assert_scalar_eq!(row.values().iter().sum::<f64>(), 0.0, comp = abs, tol = 1e-12);
    }
    let dense = DMatrix::from(k);
    assert!(is_symmetric(&dense, 1e-12));
    assert!((0..dense.nrows()).all(|i| dense[(i, i)] > 0.0));
}

#[test]
fn reassembly_replaces_previous_values() {
    let mesh = rectangle(1.0, 1.0, 2, 2, ElementFamily::Tri3, DofsPerNode::Scalar);
    let mut system = System::new(&mesh, SystemConfig::default()).unwrap();
    system.add_matrix("M", "N'*N", None).unwrap();
    system.assemble("M").unwrap();
    let first = system.matrix("M").unwrap().clone();
    system.assemble("M").unwrap();
    assert_eq!(system.matrix("M").unwrap(), &first);
}

#[test]
fn kernels_match_expressions() {
    let mesh = rectangle(1.0, 1.0, 3, 3, ElementFamily::Quad4, DofsPerNode::Vector);
    let mut system = System::new(&mesh, SystemConfig::default()).unwrap();
    system.add_matrix("K", "B'*B", None).unwrap();
    let kernel = |element: &Element, xi: &[f64]| -> femsys::error::Result<DMatrix<f64>> {
        let b = element.shape_derivative(xi)?;
        Ok(b.transpose() * b)
    };
    system.add_matrix_kernel("K_kernel", kernel, None).unwrap();
    system.assemble_all().unwrap();

    let expected = DMatrix::from(system.matrix("K").unwrap());
    let actual = DMatrix::from(system.matrix("K_kernel").unwrap());
    assert_matrix_eq!(actual, expected, comp = abs, tol = 1e-12);
}

#[test]
fn vector_kernels_see_physical_coordinates() {
    struct Position;

    impl Kernel for Position {
        fn evaluate(&self, element: &Element, xi: &[f64]) -> femsys::error::Result<DMatrix<f64>> {
            let x = element.map_reference_coords(xi);
            Ok(element.basis(xi).transpose() * x[0])
        }
    }

    let mesh = rectangle(2.0, 1.0, 4, 2, ElementFamily::Quad4, DofsPerNode::Scalar);
    let mut system = System::new(&mesh, SystemConfig::default()).unwrap();
    system.add_vector_kernel("x", Position, None).unwrap();
    system.assemble("x").unwrap();
    // Integral of x over [0, 2] x [0, 1]
    assert_scalar_eq!(entry_sum(&system, "x"), 2.0, comp = abs, tol = 1e-12);
}

#[test]
fn mismatched_kernel_blocks_are_reported() {
    let mesh = rectangle(1.0, 1.0, 2, 2, ElementFamily::Quad4, DofsPerNode::Scalar);
    let mut system = System::new(&mesh, SystemConfig::default()).unwrap();
    // A vector integrand registered as a matrix
    system.add_matrix("A", "N'", None).unwrap();
    assert!(matches!(system.assemble("A"), Err(FemError::IncompatibleShapes { .. })));
    assert!(!system.is_assembled("A"));

    // A matrix integrand registered as a vector
    system.add_vector("v", "N'*N", None).unwrap();
    assert!(matches!(system.assemble("v"), Err(FemError::IncompatibleShapes { .. })));
}

#[test]
fn degenerate_elements_abort_assembly() {
    let mut builder = MeshBuilder::new(DofsPerNode::Scalar);
    for coords in [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]] {
        builder.add_node(&coords);
    }
    // Self-intersecting node order
    builder.add_element(ElementFamily::Quad4, &[0, 1, 2, 3]).unwrap();
    let mesh = builder.initialize().unwrap();

    let mut system = System::new(&mesh, SystemConfig::default()).unwrap();
    system.add_matrix("M", "N'*N", None).unwrap();
    assert!(matches!(
        system.assemble("M"),
        Err(FemError::DegenerateElement { element: 0, .. })
    ));
}

#[test]
fn explicit_quadrature_order_is_used() {
    let mesh = rectangle(1.0, 1.0, 1, 1, ElementFamily::Quad4, DofsPerNode::Scalar);
    let config = SystemConfig {
        quadrature_order: Some(1),
        ..SystemConfig::default()
    };
    let mut system = System::new(&mesh, config).unwrap();
    system.add_matrix("M", "N'*N", None).unwrap();
    system.assemble("M").unwrap();
    // A single point at the center lumps everything into 1/16 per entry
    let mass = DMatrix::from(system.matrix("M").unwrap());
    assert_matrix_eq!(mass, DMatrix::repeat(4, 4, 1.0 / 16.0), comp = abs, tol = 1e-15);

    let config = SystemConfig {
        quadrature_order: Some(9),
        ..SystemConfig::default()
    };
    let mut system = System::new(&mesh, config).unwrap();
    system.add_matrix("M", "N'*N", None).unwrap();
    assert!(matches!(system.assemble("M"), Err(FemError::UnsupportedOrder { .. })));
}

#[test]
fn triangle_quadrature_order_does_not_leak_into_sides() {
    for (family, order) in [(ElementFamily::Tri6, 7), (ElementFamily::Tri6, 4), (ElementFamily::Tri3, 1)] {
        let mesh = rectangle(1.0, 1.0, 2, 2, family, DofsPerNode::Scalar);
        let assemble_with = |quadrature_order| {
            let config = SystemConfig {
                quadrature_order,
                ..SystemConfig::default()
            };
            let mut system = System::new(&mesh, config).unwrap();
            system.add_vector("area", "N'", None).unwrap();
            system.add_vector("perimeter", "N'", Some(OUTER_BOUNDARY)).unwrap();
            system.assemble_all().unwrap();
            (
                system.vector("area").unwrap().clone(),
                system.vector("perimeter").unwrap().clone(),
            )
        };

        let (area, perimeter) = assemble_with(Some(order));
        let (_, expected_perimeter) = assemble_with(None);
        assert_scalar_eq!(area.sum(), 1.0, comp = abs, tol = 1e-12);
        assert_scalar_eq!(perimeter.sum(), 4.0, comp = abs, tol = 1e-12);
        assert_matrix_eq!(perimeter, expected_perimeter, comp = abs, tol = 1e-14);
    }
}

#[test]
fn gauss_quadrature_order_applies_to_sides() {
    let mesh = rectangle(1.0, 1.0, 1, 1, ElementFamily::Quad4, DofsPerNode::Scalar);
    let config = SystemConfig {
        quadrature_order: Some(1),
        ..SystemConfig::default()
    };
    let mut system = System::new(&mesh, config).unwrap();
    system.add_matrix("G", "N'*N", Some(OUTER_BOUNDARY)).unwrap();
    system.assemble("G").unwrap();

    // One point at the middle of each side lumps 1/4 into every entry of the side block
    let g = DMatrix::from(system.matrix("G").unwrap());
    #[rustfmt::skip]
    let expected = DMatrix::from_row_slice(4, 4, &[
        0.5,  0.25, 0.0,  0.25,
        0.25, 0.5,  0.25, 0.0,
        0.0,  0.25, 0.5,  0.25,
        0.25, 0.0,  0.25, 0.5,
    ]);
    assert_matrix_eq!(g, expected, comp = abs, tol = 1e-15);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn assembly_strategies_agree(builder in rectangular_grid(20, DofsPerNode::Vector)) {
        let mesh = builder.initialize().unwrap();
        let assemble = |strategy, parallel| {
            let config = SystemConfig { strategy, parallel, ..SystemConfig::default() };
            let mut system = System::new(&mesh, config).unwrap();
            system.add_constant("D", DMatrix::from_row_slice(3, 3, &[2.0, 1.0, 0.0, 1.0, 2.0, 0.0, 0.0, 0.0, 0.5])).unwrap();
            system.add_matrix("K", "B'*D*B + N'*N", None).unwrap();
            system.assemble("K").unwrap();
            DMatrix::from(system.matrix("K").unwrap())
        };

        let reference = assemble(AssemblyStrategy::Triplet, false);
        for (strategy, parallel) in [
            (AssemblyStrategy::Direct, false),
            (AssemblyStrategy::Direct, true),
            (AssemblyStrategy::Triplet, true),
        ] {
            let matrix = assemble(strategy, parallel);
            assert_matrix_eq!(matrix, reference, comp = abs, tol = 1e-12);
        }
    }
}

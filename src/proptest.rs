//! Proptest strategies for `femsys` types.
use crate::config::DofsPerNode;
use crate::element::{Element, ElementFamily};
use crate::mesh::procedural::{create_line_grid, create_rectangular_grid};
use crate::mesh::MeshBuilder;
use ::proptest::prelude::*;
use nalgebra::DMatrix;
use std::cmp::max;

pub fn element_family() -> impl Strategy<Value = ElementFamily> {
    prop_oneof![
        Just(ElementFamily::Line2),
        Just(ElementFamily::Line3),
        Just(ElementFamily::Beam2),
        Just(ElementFamily::Tri3),
        Just(ElementFamily::Tri6),
        Just(ElementFamily::Quad4),
    ]
}

/// Points inside the reference domain of the family.
pub fn reference_point(family: ElementFamily) -> BoxedStrategy<Vec<f64>> {
    match family {
        ElementFamily::Line2 | ElementFamily::Line3 | ElementFamily::Beam2 => (-1.0..=1.0).prop_map(|x| vec![x]).boxed(),
        ElementFamily::Quad4 => [-1.0..=1.0, -1.0..=1.0].prop_map(|[x, y]| vec![x, y]).boxed(),
        ElementFamily::Tri3 | ElementFamily::Tri6 => [0.0..=1.0, 0.0..=1.0]
            .prop_map(|[x, y]| {
                // Reflect points of the upper half of the unit square into the triangle
                if x + y > 1.0 {
                    vec![1.0 - x, 1.0 - y]
                } else {
                    vec![x, y]
                }
            })
            .boxed(),
    }
}

/// Pairs of a family and a point in its reference domain.
pub fn family_and_reference_point() -> impl Strategy<Value = (ElementFamily, Vec<f64>)> {
    element_family().prop_flat_map(|family| (Just(family), reference_point(family)))
}

/// Counter-clockwise convex quadrilaterals obtained by perturbing the corners of a square of
/// random size.
pub fn convex_quad4_element(dofs_per_node: usize) -> impl Strategy<Value = Element> {
    let perturbation = -0.15..=0.15;
    (
        0.5..=4.0,
        [
            perturbation.clone(),
            perturbation.clone(),
            perturbation.clone(),
            perturbation.clone(),
            perturbation.clone(),
            perturbation.clone(),
            perturbation.clone(),
            perturbation,
        ],
    )
        .prop_filter_map("element must be valid", move |(size, offsets)| {
            let corners = [0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0];
            let coords = DMatrix::from_fn(4, 2, |i, j| size * (corners[2 * i + j] + offsets[2 * i + j]));
            Element::new(0, ElementFamily::Quad4, vec![0, 1, 2, 3], coords, max(1, dofs_per_node)).ok()
        })
}

/// Grid sizes `(nx, ny)` with at most `max_cells` cells.
pub fn grid_size(max_cells: usize) -> impl Strategy<Value = (usize, usize)> {
    let max_cells = max(1, max_cells);
    (1..=max_cells).prop_flat_map(move |nx| (Just(nx), 1..=max(1, max_cells / nx)))
}

/// Rectangular grids of any 2D family on the unit square.
pub fn rectangular_grid(max_cells: usize, dofs_per_node: DofsPerNode) -> impl Strategy<Value = MeshBuilder> {
    let families = prop_oneof![
        Just(ElementFamily::Quad4),
        Just(ElementFamily::Tri3),
        Just(ElementFamily::Tri6)
    ];
    (grid_size(max_cells), families).prop_filter_map("grid must be valid", move |((nx, ny), family)| {
        create_rectangular_grid((0.0, 1.0), (0.0, 1.0), nx, ny, family, dofs_per_node).ok()
    })
}

/// Line grids of Line2 or Line3 elements on the unit interval.
pub fn line_grid(max_cells: usize, dofs_per_node: DofsPerNode) -> impl Strategy<Value = MeshBuilder> {
    let families = prop_oneof![Just(ElementFamily::Line2), Just(ElementFamily::Line3)];
    (1..=max(1, max_cells), families).prop_filter_map("grid must be valid", move |(nx, family)| {
        create_line_grid(0.0, 1.0, nx, family, dofs_per_node).ok()
    })
}

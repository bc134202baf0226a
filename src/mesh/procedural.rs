//! Regular grid generators.
use crate::config::DofsPerNode;
use crate::element::ElementFamily;
use crate::error::{FemError, Result};
use crate::mesh::MeshBuilder;

fn check_interval(min: f64, max: f64, cells: usize, axis: &str) -> Result<()> {
    if cells == 0 {
        return Err(FemError::InvalidParameter(format!(
            "a grid needs at least one cell along {axis}"
        )));
    }
    if !(min < max) {
        return Err(FemError::InvalidParameter(format!(
            "empty {axis} interval [{min}, {max}]"
        )));
    }
    Ok(())
}

/// Creates a uniform grid on `[xmin, xmax] x [ymin, ymax]` with `nx x ny` cells.
///
/// Nodes are numbered row by row starting at the bottom left corner. Every cell becomes one
/// [`ElementFamily::Quad4`] or two triangles split along the diagonal from the bottom left to
/// the top right corner. [`ElementFamily::Tri6`] grids place their edge nodes on a grid refined
/// by a factor of two, so they have `(2 nx + 1) (2 ny + 1)` nodes.
///
/// All elements are counter-clockwise. No boundaries are registered.
pub fn create_rectangular_grid(
    (xmin, xmax): (f64, f64),
    (ymin, ymax): (f64, f64),
    nx: usize,
    ny: usize,
    family: ElementFamily,
    dofs_per_node: DofsPerNode,
) -> Result<MeshBuilder> {
    check_interval(xmin, xmax, nx, "x")?;
    check_interval(ymin, ymax, ny, "y")?;

    // Tri6 grids place nodes at every half cell
    let refinement = match family {
        ElementFamily::Quad4 | ElementFamily::Tri3 => 1,
        ElementFamily::Tri6 => 2,
        _ => {
            return Err(FemError::NotImplemented(format!(
                "rectangular grids of {family:?} elements"
            )))
        }
    };

    let vertices_x = refinement * nx + 1;
    let vertices_y = refinement * ny + 1;
    let hx = (xmax - xmin) / (vertices_x - 1) as f64;
    let hy = (ymax - ymin) / (vertices_y - 1) as f64;

    let mut builder = MeshBuilder::new(dofs_per_node);
    for j in 0..vertices_y {
        for i in 0..vertices_x {
            // Use the exact end points on the last row and column
            let x = if i + 1 == vertices_x { xmax } else { xmin + i as f64 * hx };
            let y = if j + 1 == vertices_y { ymax } else { ymin + j as f64 * hy };
            builder.add_node(&[x, y]);
        }
    }

    let v = |i: usize, j: usize| vertices_x * j + i;
    for j in 0..ny {
        for i in 0..nx {
            match family {
                ElementFamily::Quad4 => {
                    builder.add_element(family, &[v(i, j), v(i + 1, j), v(i + 1, j + 1), v(i, j + 1)])?;
                }
                ElementFamily::Tri3 => {
                    builder.add_element(family, &[v(i, j), v(i + 1, j), v(i + 1, j + 1)])?;
                    builder.add_element(family, &[v(i, j), v(i + 1, j + 1), v(i, j + 1)])?;
                }
                _ => {
                    let (i, j) = (2 * i, 2 * j);
                    let lower = [v(i, j), v(i + 2, j), v(i + 2, j + 2), v(i + 1, j), v(i + 2, j + 1), v(i + 1, j + 1)];
                    let upper = [v(i, j), v(i + 2, j + 2), v(i, j + 2), v(i + 1, j + 1), v(i + 1, j + 2), v(i, j + 1)];
                    builder.add_element(family, &lower)?;
                    builder.add_element(family, &upper)?;
                }
            }
        }
    }

    Ok(builder)
}

/// Creates a uniform grid of `nx` line elements on `[xmin, xmax]`.
///
/// [`ElementFamily::Line3`] grids number their nodes from left to right, so the middle node of
/// element `i` is `2 i + 1`.
pub fn create_line_grid(
    xmin: f64,
    xmax: f64,
    nx: usize,
    family: ElementFamily,
    dofs_per_node: DofsPerNode,
) -> Result<MeshBuilder> {
    check_interval(xmin, xmax, nx, "x")?;
    let refinement = match family {
        ElementFamily::Line2 | ElementFamily::Beam2 => 1,
        ElementFamily::Line3 => 2,
        _ => {
            return Err(FemError::NotImplemented(format!(
                "line grids of {family:?} elements"
            )))
        }
    };

    let num_nodes = refinement * nx + 1;
    let h = (xmax - xmin) / (num_nodes - 1) as f64;
    let mut builder = MeshBuilder::new(dofs_per_node);
    for i in 0..num_nodes {
        let x = if i + 1 == num_nodes { xmax } else { xmin + i as f64 * h };
        builder.add_node(&[x]);
    }

    for i in 0..nx {
        if refinement == 1 {
            builder.add_element(family, &[i, i + 1])?;
        } else {
            builder.add_element(family, &[2 * i, 2 * i + 2, 2 * i + 1])?;
        }
    }

    Ok(builder)
}

//! Global assembly into sparse matrices and dense vectors.
use crate::assembly::local::{ElementBlockAssembler, ElementConnectivityAssembler};
use crate::config::AssemblyStrategy;
use crate::error::{FemError, Result};
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::csr::CsrRowMut;
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use rayon::iter::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator};
use std::collections::BTreeSet;

/// Element blocks in element order, paired with the element index.
type Blocks = Vec<(usize, DMatrix<f64>)>;

/// Computes the blocks of all contributing elements on the rayon thread pool.
fn par_element_blocks(element_assembler: &dyn ElementBlockAssembler) -> Result<Blocks> {
    let blocks: Vec<Option<(usize, DMatrix<f64>)>> = (0..element_assembler.num_elements())
        .into_par_iter()
        .with_min_len(50)
        .map(|i| {
            if !element_assembler.element_contributes(i) {
                return Ok(None);
            }
            Ok(element_assembler
                .assemble_element_block(i)?
                .map(|block| (i, block)))
        })
        .collect::<Result<_>>()?;
    Ok(blocks.into_iter().flatten().collect())
}

/// Visits the block of every contributing element, either computing blocks one at a time or
/// computing all of them in parallel first.
fn for_each_element_block(
    element_assembler: &dyn ElementBlockAssembler,
    parallel: bool,
    mut f: impl FnMut(usize, &DMatrix<f64>) -> Result<()>,
) -> Result<()> {
    if parallel {
        for (i, block) in par_element_blocks(element_assembler)? {
            f(i, &block)?;
        }
    } else {
        for i in 0..element_assembler.num_elements() {
            if !element_assembler.element_contributes(i) {
                continue;
            }
            if let Some(block) = element_assembler.assemble_element_block(i)? {
                f(i, &block)?;
            }
        }
    }
    Ok(())
}

fn check_matrix_block(block: &DMatrix<f64>, num_dofs: usize) -> Result<()> {
    if block.nrows() != num_dofs {
        return Err(FemError::DimensionMismatch {
            expected: num_dofs,
            actual: block.nrows(),
        });
    }
    if block.ncols() != num_dofs {
        return Err(FemError::IncompatibleShapes {
            operation: "assemble a matrix from",
            left: (num_dofs, num_dofs),
            right: block.shape(),
        });
    }
    Ok(())
}

/// Assembles a square sparse matrix with the given strategy.
pub fn assemble_matrix(
    element_assembler: &dyn ElementBlockAssembler,
    strategy: AssemblyStrategy,
    parallel: bool,
) -> Result<CsrMatrix<f64>> {
    match strategy {
        AssemblyStrategy::Direct => CsrAssembler::default()
            .with_parallel(parallel)
            .assemble(element_assembler),
        AssemblyStrategy::Triplet => TripletAssembler::default()
            .with_parallel(parallel)
            .assemble(element_assembler),
    }
}

/// Assembles a dense vector from single-column element blocks.
pub fn assemble_vector(element_assembler: &dyn ElementBlockAssembler, parallel: bool) -> Result<DVector<f64>> {
    let mut vector = DVector::zeros(element_assembler.num_dofs());
    let mut dofs = Vec::new();
    for_each_element_block(element_assembler, parallel, |i, block| {
        dofs.resize(element_assembler.element_dof_count(i), 0);
        element_assembler.populate_element_dofs(&mut dofs, i);
        if block.nrows() != dofs.len() {
            return Err(FemError::DimensionMismatch {
                expected: dofs.len(),
                actual: block.nrows(),
            });
        }
        if block.ncols() != 1 {
            return Err(FemError::IncompatibleShapes {
                operation: "assemble a vector from",
                left: (dofs.len(), 1),
                right: block.shape(),
            });
        }
        for (local, &global) in dofs.iter().enumerate() {
            vector[global] += block[(local, 0)];
        }
        Ok(())
    })?;
    Ok(vector)
}

/// Assembles CSR matrices by accumulating element blocks directly into the final sparsity
/// pattern.
#[derive(Debug, Clone, Default)]
pub struct CsrAssembler {
    parallel: bool,
}

impl CsrAssembler {
    /// Compute element blocks in parallel before scattering them.
    pub fn with_parallel(self, parallel: bool) -> Self {
        Self { parallel }
    }

    /// Computes the sparsity pattern as CSR offsets and column indices.
    pub fn assemble_pattern<A>(&self, element_assembler: &A) -> (Vec<usize>, Vec<usize>)
    where
        A: ElementConnectivityAssembler + ?Sized,
    {
        // Collecting into a BTreeSet stores each matrix entry exactly once and sorts them
        let mut matrix_entries = BTreeSet::new();
        let mut element_dofs = Vec::new();
        for i in 0..element_assembler.num_elements() {
            if !element_assembler.element_contributes(i) {
                continue;
            }
            element_dofs.resize(element_assembler.element_dof_count(i), usize::MAX);
            element_assembler.populate_element_dofs(&mut element_dofs, i);
            for &dof_i in &element_dofs {
                for &dof_j in &element_dofs {
                    matrix_entries.insert((dof_i, dof_j));
                }
            }
        }

        let num_rows = element_assembler.num_dofs();
        let mut offsets = Vec::with_capacity(num_rows + 1);
        let mut column_indices = Vec::with_capacity(matrix_entries.len());

        offsets.push(0);
        for (i, j) in matrix_entries {
            while i + 1 > offsets.len() {
                // Reached a new row. Loop to handle consecutive empty rows
                offsets.push(column_indices.len());
            }
            column_indices.push(j);
        }

        // Fill out the remaining offsets if the last rows are empty
        while offsets.len() < (num_rows + 1) {
            offsets.push(column_indices.len());
        }

        (offsets, column_indices)
    }

    pub fn assemble(&self, element_assembler: &dyn ElementBlockAssembler) -> Result<CsrMatrix<f64>> {
        let num_dofs = element_assembler.num_dofs();
        let (offsets, column_indices) = self.assemble_pattern(element_assembler);
        let values = vec![0.0; column_indices.len()];
        let mut csr = CsrMatrix::try_from_csr_data(num_dofs, num_dofs, offsets, column_indices, values)
            .map_err(|err| FemError::InvalidParameter(format!("invalid sparsity pattern: {err}")))?;
        self.assemble_into_csr(&mut csr, element_assembler)?;
        Ok(csr)
    }

    /// Adds all element blocks to a matrix whose pattern contains every element entry.
    pub fn assemble_into_csr(
        &self,
        csr: &mut CsrMatrix<f64>,
        element_assembler: &dyn ElementBlockAssembler,
    ) -> Result<()> {
        let mut element_dofs = Vec::new();
        let mut permutation = Vec::new();
        for_each_element_block(element_assembler, self.parallel, |i, block| {
            let n = element_assembler.element_dof_count(i);
            element_dofs.resize(n, 0);
            element_assembler.populate_element_dofs(&mut element_dofs, i);
            check_matrix_block(block, n)?;

            permutation.clear();
            permutation.extend(0..n);
            permutation.sort_unstable_by_key(|&local| element_dofs[local]);

            for (local_row, &global_row) in element_dofs.iter().enumerate() {
                let mut csr_row = csr.row_mut(global_row);
                add_element_row_to_csr_row(&mut csr_row, &element_dofs, &permutation, block, local_row)?;
            }
            Ok(())
        })
    }
}

/// Adds a row of an element block to the corresponding row of a CSR matrix.
///
/// `sorted_permutation` orders the local DOFs such that their global indices are sorted, so the
/// CSR row is traversed once.
fn add_element_row_to_csr_row(
    row: &mut CsrRowMut<f64>,
    element_dofs: &[usize],
    sorted_permutation: &[usize],
    block: &DMatrix<f64>,
    local_row: usize,
) -> Result<()> {
    let (column_indices, values) = row.cols_and_values_mut();
    let mut csr_col_iter = column_indices.iter().copied().enumerate();
    let mut previous = None;

    for &local_col in sorted_permutation {
        let global_col = element_dofs[local_col];
        // Repeated DOFs within one element map to the same entry
        let csr_idx = match previous {
            Some((col, idx)) if col == global_col => idx,
            _ => {
                let (idx, _) = csr_col_iter
                    .find(|&(_, col)| col == global_col)
                    .ok_or_else(|| FemError::NotFound(format!("column {global_col} in sparsity pattern")))?;
                idx
            }
        };
        values[csr_idx] += block[(local_row, local_col)];
        previous = Some((global_col, csr_idx));
    }
    Ok(())
}

/// Assembles CSR matrices by collecting `(row, col, value)` triplets of all elements into
/// flat arrays and converting them once, summing duplicates.
#[derive(Debug, Clone, Default)]
pub struct TripletAssembler {
    parallel: bool,
}

impl TripletAssembler {
    /// Compute element blocks in parallel before writing their triplets.
    pub fn with_parallel(self, parallel: bool) -> Self {
        Self { parallel }
    }

    /// Start of the triplet slice of every element, plus the total count.
    fn triplet_offsets<A>(element_assembler: &A) -> Vec<usize>
    where
        A: ElementConnectivityAssembler + ?Sized,
    {
        let mut offsets = Vec::with_capacity(element_assembler.num_elements() + 1);
        let mut total = 0;
        offsets.push(0);
        for i in 0..element_assembler.num_elements() {
            if element_assembler.element_contributes(i) {
                let n = element_assembler.element_dof_count(i);
                total += n * n;
            }
            offsets.push(total);
        }
        offsets
    }

    pub fn assemble(&self, element_assembler: &dyn ElementBlockAssembler) -> Result<CsrMatrix<f64>> {
        let num_dofs = element_assembler.num_dofs();
        let offsets = Self::triplet_offsets(element_assembler);
        let num_triplets = offsets.last().copied().unwrap_or(0);

        let mut rows = vec![0; num_triplets];
        let mut cols = vec![0; num_triplets];
        let mut values = vec![0.0; num_triplets];

        let mut element_dofs = Vec::new();
        for_each_element_block(element_assembler, self.parallel, |i, block| {
            let n = element_assembler.element_dof_count(i);
            element_dofs.resize(n, 0);
            element_assembler.populate_element_dofs(&mut element_dofs, i);
            check_matrix_block(block, n)?;

            let range = offsets[i]..offsets[i + 1];
            let element_rows = &mut rows[range.clone()];
            let element_cols = &mut cols[range.clone()];
            let element_values = &mut values[range];
            for (local_col, &global_col) in element_dofs.iter().enumerate() {
                for (local_row, &global_row) in element_dofs.iter().enumerate() {
                    // Column-major, matching the storage of the block
                    let k = local_col * n + local_row;
                    element_rows[k] = global_row;
                    element_cols[k] = global_col;
                    element_values[k] = block[(local_row, local_col)];
                }
            }
            Ok(())
        })?;

        let coo = CooMatrix::try_from_triplets(num_dofs, num_dofs, rows, cols, values)
            .map_err(|err| FemError::InvalidParameter(format!("invalid triplets: {err}")))?;
        Ok(CsrMatrix::from(&coo))
    }
}

//! Assembly of global sparse matrices and vectors from element contributions.
//!
//! Assembly is split in two layers. *Local* assemblers ([`local`]) compute the dense block of
//! a single element. *Global* assemblers ([`global`]) drive the element loop and scatter the
//! blocks into a [`CsrMatrix`](nalgebra_sparse::CsrMatrix) or a [`DVector`](nalgebra::DVector).
pub mod global;
pub mod local;

pub use global::*;
pub use local::*;

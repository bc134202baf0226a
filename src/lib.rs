//! Finite element assembly from weak-form expressions.
//!
//! A typical analysis builds a mesh with a grid generator, tags its boundaries, defines the
//! weak form of a problem as named matrices and vectors of a [`System`](system::System) and
//! advances it in time with a [`ThetaSolver`](solver::ThetaSolver).
pub mod assembly;
pub mod config;
pub mod element;
pub mod error;
pub mod expression;
pub mod mesh;
pub mod quadrature;
pub mod solver;
pub mod system;

#[cfg(feature = "proptest-support")]
pub mod proptest;

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;

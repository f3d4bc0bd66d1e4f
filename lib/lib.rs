#![allow(dead_code, non_snake_case, non_upper_case_globals)]

//! Exact diagonalization of small fermionic lattice models and evaluation of
//! one- and two-particle correlation functions in the Lehmann
//! representation.
//!
//! The pipeline runs, in order:
//! - [`lattice`] / [`config`]: describe the model and build its
//!   [`operator::Operator`];
//! - [`symmetrizer`] / [`states`]: find conserved quantities and split the
//!   Fock space into blocks;
//! - [`hamiltonian`]: diagonalize every block;
//! - [`field_op`] / [`density`]: ladder operators in the eigenbasis and
//!   Boltzmann weights;
//! - [`greens`]: Green's functions, susceptibilities, the two-particle
//!   Green's function, and the amputated vertex, the last distributed over
//!   ranks by [`dispatch`].

pub mod error;
pub mod hilbert;
pub mod index;
pub mod operator;
pub mod lattice;
pub mod symmetrizer;
pub mod states;
pub mod linalg;
pub mod hamiltonian;
pub mod field_op;
pub mod density;
pub mod term_list;
pub mod config;
pub mod io;
pub mod dispatch;
pub mod greens;

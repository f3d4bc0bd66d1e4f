//! Correlation functions in the Lehmann representation.
//!
//! Every function here is a sum of simple-pole terms over pairs (or chains)
//! of eigenstates connected by field operators, evaluated on demand at
//! complex frequencies, Matsubara indices, or imaginary times.

use std::f64::consts::PI;
use num_complex::Complex64 as C64;

pub mod gf;
pub mod susceptibility;
pub mod two_particle;
pub mod vertex;
pub mod container;

pub use gf::{ GfTerm, GreensFunction, GreensFunctionPart };
pub use susceptibility::{ Susceptibility, SusceptibilityPart, SusceptibilityTerm };
pub use two_particle::{
    NonResonantTerm,
    ResonantTerm,
    TwoParticleGf,
    TwoParticleGfPart,
};
pub use vertex::Vertex4;
pub use container::{
    Exchange,
    GfContainer,
    SusceptibilityContainer,
    TwoParticleGfContainer,
    Vertex4Container,
};

/// Fermionic Matsubara frequency `iπ(2n + 1)/β`.
pub fn fermionic(n: i64, beta: f64) -> C64 {
    C64::new(0.0, PI * (2 * n + 1) as f64 / beta)
}

/// Bosonic Matsubara frequency `2iπn/β`.
pub fn bosonic(n: i64, beta: f64) -> C64 {
    C64::new(0.0, 2.0 * PI * n as f64 / beta)
}

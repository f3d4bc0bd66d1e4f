#![allow(dead_code, non_snake_case)]

use lehmann_ed::{
    config::{ Tolerances, TwoParticleTolerances },
    hamiltonian::Hamiltonian,
    index::IndexInfo,
    lattice::Lattice,
    linalg::Elem,
    states::StatesClassification,
    symmetrizer::{ Symmetrizer, default_candidates },
};

/// A diagonalized model.
pub struct Model<T>
where T: Elem
{
    pub index: IndexInfo,
    pub states: StatesClassification,
    pub H: Hamiltonian<T>,
}

pub fn solve<T>(lat: &Lattice) -> Model<T>
where T: Elem
{
    let index = lat.index_info().unwrap();
    let op = lat.hamiltonian(&index).unwrap();
    let mut sym = Symmetrizer::new(&index, &op).unwrap();
    sym.compute(default_candidates(&index)).unwrap();
    let states = StatesClassification::compute(&sym).unwrap();
    let mut H: Hamiltonian<T> = Hamiltonian::prepare(&op, &states).unwrap();
    H.compute().unwrap();
    Model { index, states, H }
}

/// Tolerances that never prune a term.
pub fn exact_tolerances() -> Tolerances {
    Tolerances {
        matrix_element: 0.0,
        gf_coefficient: 0.0,
        two_particle: TwoParticleTolerances {
            coefficient: 0.0,
            multi_term_coefficient: 0.0,
            ..TwoParticleTolerances::default()
        },
        ..Tolerances::default()
    }
}

/// Single spin-1/2 orbital with `U n↑ n↓ - μ (n↑ + n↓)`.
pub fn atom(u: f64, mu: f64) -> Lattice {
    let mut lat = Lattice::new();
    lat.add_site("A", 1, 2).unwrap();
    lat.add_coulomb_s("A", u, -mu).unwrap();
    lat
}

//! Discovery of diagonal integrals of motion.
//!
//! A candidate operator `Q` is accepted iff it commutes with the Hamiltonian
//! and with every number operator `n_p`; the latter guarantees that every Fock
//! state is an eigenstate of `Q`, so that `Q` labels Fock states rather than
//! rotating them.

use std::{ cmp::Ordering, hash::{ Hash, Hasher } };
use log::{ info, warn };
use crate::{
    error::{ EdError, EdResult },
    hilbert::FockState,
    index::IndexInfo,
    operator::{ Operator, presets },
};

/// Grid on which quantum numbers are compared and hashed.
pub const QN_RESOLUTION: f64 = 1e-8;

/* Quantum numbers ************************************************************/

/// A tuple of eigenvalues of the accepted integrals of motion.
///
/// Equality, ordering, and hashing all act on the values rounded to multiples
/// of [`QN_RESOLUTION`].
#[derive(Clone, Debug, Default)]
pub struct QuantumNumbers(Vec<f64>);

impl QuantumNumbers {
    pub fn new(values: Vec<f64>) -> Self { Self(values) }

    /// Return the raw values.
    pub fn values(&self) -> &[f64] { &self.0 }

    /// Return the values rounded onto the comparison grid.
    pub fn quantized(&self) -> Vec<i64> {
        self.0.iter().map(|q| (q / QN_RESOLUTION).round() as i64).collect()
    }

    pub fn len(&self) -> usize { self.0.len() }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

impl PartialEq for QuantumNumbers {
    fn eq(&self, other: &Self) -> bool { self.quantized() == other.quantized() }
}

impl Eq for QuantumNumbers { }

impl Hash for QuantumNumbers {
    fn hash<H: Hasher>(&self, state: &mut H) { self.quantized().hash(state); }
}

impl PartialOrd for QuantumNumbers {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QuantumNumbers {
    fn cmp(&self, other: &Self) -> Ordering {
        self.quantized().cmp(&other.quantized())
    }
}

/* Candidates *****************************************************************/

/// A named candidate integral of motion.
#[derive(Clone, Debug)]
pub struct Conserved {
    pub name: String,
    pub op: Operator,
}

impl Conserved {
    pub fn new(name: &str, op: Operator) -> Self {
        Self { name: name.to_string(), op }
    }
}

/// Reason a candidate was rejected.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Rejection {
    /// `[H, Q] ≠ 0`.
    NotConserved,
    /// `[n_p, Q] ≠ 0` for some mode `p`.
    NotDiagonal(usize),
}

/// Outcome of checking every candidate.
#[derive(Clone, Debug, Default)]
pub struct SymmetrizerReport {
    pub accepted: Vec<String>,
    pub rejected: Vec<(String, Rejection)>,
}

/// Return the default candidates for an index map: total number always, and
/// `Sz` iff every mode carries a spin-1/2 label.
pub fn default_candidates(index: &IndexInfo) -> Vec<Conserved> {
    let mut candidates
        = vec![Conserved::new("N", presets::total_number(index.num_modes()))];
    if let Some(sz) = presets::sz_from_index(index) {
        candidates.push(Conserved::new("Sz", sz));
    }
    candidates
}

/* Symmetrizer ****************************************************************/

/// Checks candidate integrals of motion against a Hamiltonian and labels Fock
/// states by their eigenvalues.
#[derive(Clone, Debug)]
pub struct Symmetrizer<'a> {
    hamiltonian: &'a Operator,
    n_modes: usize,
    accepted: Vec<Conserved>,
    report: SymmetrizerReport,
}

impl<'a> Symmetrizer<'a> {
    /// Create a new `Symmetrizer` with no accepted integrals of motion.
    ///
    /// Fails if the Hamiltonian refers to a mode outside the index map.
    pub fn new(index: &IndexInfo, hamiltonian: &'a Operator)
        -> EdResult<Self>
    {
        let n_modes = index.num_modes();
        if let Some(p) = hamiltonian.max_mode().filter(|p| *p >= n_modes) {
            return Err(EdError::ModeOutOfRange(p, n_modes));
        }
        Ok(Self {
            hamiltonian,
            n_modes,
            accepted: Vec::new(),
            report: SymmetrizerReport::default(),
        })
    }

    /// Check a single candidate without recording it.
    pub fn check(&self, candidate: &Operator) -> Result<(), Rejection> {
        if !self.hamiltonian.commutes(candidate) {
            return Err(Rejection::NotConserved);
        }
        (0..self.n_modes)
            .find(|p| !presets::n(*p).commutes(candidate))
            .map_or(Ok(()), |p| Err(Rejection::NotDiagonal(p)))
    }

    /// Check every candidate in order, keeping those that pass.
    pub fn compute<I>(&mut self, candidates: I) -> EdResult<&SymmetrizerReport>
    where I: IntoIterator<Item = Conserved>
    {
        for candidate in candidates.into_iter() {
            if let Some(p)
                = candidate.op.max_mode().filter(|p| *p >= self.n_modes)
            {
                return Err(EdError::ModeOutOfRange(p, self.n_modes));
            }
            match self.check(&candidate.op) {
                Ok(()) => {
                    self.report.accepted.push(candidate.name.clone());
                    self.accepted.push(candidate);
                },
                Err(reason) => {
                    warn!(
                        "rejected integral of motion {}: {:?}",
                        candidate.name, reason,
                    );
                    self.report.rejected.push((candidate.name, reason));
                },
            }
        }
        info!(
            "accepted integrals of motion: [{}]",
            self.report.accepted.join(", "),
        );
        Ok(&self.report)
    }

    /// Number of modes.
    pub fn n_modes(&self) -> usize { self.n_modes }

    /// Return the accepted integrals of motion, in order of acceptance.
    pub fn accepted(&self) -> &[Conserved] { &self.accepted }

    /// Return the report of accepted and rejected candidates.
    pub fn report(&self) -> &SymmetrizerReport { &self.report }

    /// Return the tuple of eigenvalues of the accepted integrals of motion on a
    /// Fock state.
    pub fn quantum_numbers(&self, state: FockState) -> QuantumNumbers {
        QuantumNumbers(
            self.accepted.iter().map(|q| q.op.diagonal(state).re).collect()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ index::Site, lattice::Lattice };
    use num_complex::Complex64 as C64;

    fn spin_flip_model(j: C64) -> (IndexInfo, Operator) {
        let mut lat = Lattice::new();
        lat.add_site("A", 1, 2).unwrap();
        lat.add_coulomb_s("A", 2.0, -1.2).unwrap();
        let index = lat.index_info().unwrap();
        let mut H = lat.hamiltonian(&index).unwrap();
        let up = index.index("A", 0, 1).unwrap();
        let dn = index.index("A", 0, 0).unwrap();
        H += &(&presets::c_dag_c(up, dn) * j);
        H += &(&presets::c_dag_c(dn, up) * j.conj());
        (index, H)
    }

    #[test]
    fn hubbard_keeps_n_and_sz() {
        let (index, H) = spin_flip_model(C64::from(0.0));
        let mut sym = Symmetrizer::new(&index, &H).unwrap();
        let report = sym.compute(default_candidates(&index)).unwrap();
        assert_eq!(report.accepted, vec!["N".to_string(), "Sz".to_string()]);
        let qn = sym.quantum_numbers(FockState::from_modes([1]));
        assert_eq!(qn, QuantumNumbers::new(vec![1.0, 0.5]));
    }

    #[test]
    fn spin_flip_rejects_sz() {
        let (index, H) = spin_flip_model(C64::new(0.1, 0.1));
        let mut sym = Symmetrizer::new(&index, &H).unwrap();
        let report = sym.compute(default_candidates(&index)).unwrap();
        assert_eq!(report.accepted, vec!["N".to_string()]);
        assert_eq!(report.rejected[0].1, Rejection::NotConserved);
        for q in sym.accepted() {
            assert!(H.commutes(&q.op));
        }
    }

    #[test]
    fn non_diagonal_candidate() {
        let index = IndexInfo::new(&[Site::new("A", 2, 1)]).unwrap();
        let H = presets::total_number(2);
        let mut sym = Symmetrizer::new(&index, &H).unwrap();
        let hop = presets::c_dag_c(0, 1) + presets::c_dag_c(1, 0);
        sym.compute([Conserved::new("hop", hop)]).unwrap();
        assert!(sym.accepted().is_empty());
        assert!(matches!(sym.report().rejected[0].1, Rejection::NotDiagonal(_)));
    }

    #[test]
    fn quantization() {
        let a = QuantumNumbers::new(vec![1.0, 0.5]);
        let b = QuantumNumbers::new(vec![1.0 + 1e-12, 0.5 - 1e-12]);
        assert_eq!(a, b);
        assert!(QuantumNumbers::new(vec![1.0, -0.5]) < a);
    }
}

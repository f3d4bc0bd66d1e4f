//! Dynamical susceptibility `χ_AB(τ) = ⟨T A(τ) B(0)⟩` of two quadratic
//! operators.

use std::cmp::Ordering;
use log::info;
use num_complex::Complex64 as C64;
use crate::{
    config::Tolerances,
    density::DensityMatrix,
    error::{ EdError, EdResult },
    field_op::{ FieldOperator, FieldOperatorPart },
    io::PomRecord,
    linalg::Elem,
    states::BlockNumber,
    term_list::{ Term, TermList, cmp_pole },
};
use super::bosonic;

/// A single term `R / (z - P)` with `P ≠ 0`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SusceptibilityTerm {
    pub residue: C64,
    pub pole: f64,
}

impl SusceptibilityTerm {
    pub fn value(&self, z: C64) -> C64 { self.residue / (z - self.pole) }

    /// Imaginary-time value at `0 ≤ τ ≤ β`.
    pub fn tau(&self, tau: f64, beta: f64) -> C64 {
        let p = self.pole;
        if p >= 0.0 {
            self.residue * (-tau * p).exp() / ((-beta * p).exp() - 1.0)
        } else {
            self.residue * ((beta - tau) * p).exp() / (1.0 - (beta * p).exp())
        }
    }
}

impl Term for SusceptibilityTerm {
    fn compare(&self, other: &Self, tol: f64) -> Ordering {
        cmp_pole(self.pole, other.pole, tol)
    }

    fn merge(&mut self, other: &Self) { self.residue += other.residue; }

    fn is_negligible(&self, tol: f64, _len: usize) -> bool {
        self.residue.norm() < tol
    }
}

impl PomRecord for SusceptibilityTerm {
    const WIDTH: usize = 3;

    fn write_record(&self, out: &mut Vec<f64>) {
        out.extend([self.residue.re, self.residue.im, self.pole]);
    }

    fn read_record(rec: &[f64]) -> EdResult<Self> {
        match rec {
            [re, im, pole] => Ok(Self { residue: C64::new(*re, *im), pole: *pole }),
            _ => Err(EdError::MalformedRecord(
                format!("expected {} values, got {}", Self::WIDTH, rec.len()))),
        }
    }
}

/// Contribution of a pair of blocks: `A` maps `inner` into `outer` and `B`
/// maps `outer` back into `inner`.
#[derive(Clone, Debug)]
pub struct SusceptibilityPart {
    inner: BlockNumber,
    outer: BlockNumber,
    terms: TermList<SusceptibilityTerm>,
    zero_weight: C64,
}

impl SusceptibilityPart {
    fn compute<T>(
        a: &FieldOperatorPart<T>,
        b: &FieldOperatorPart<T>,
        rho: &DensityMatrix<'_, T>,
        tol: &Tolerances,
    ) -> EdResult<Self>
    where T: Elem
    {
        let inner = a.from_block();
        let outer = a.to_block();
        let hamiltonian = rho.hamiltonian();
        let E_in = hamiltonian.eigenvalues(inner)?;
        let E_out = hamiltonian.eigenvalues(outer)?;
        let w_in = rho.weights(inner)?;
        let w_out = rho.weights(outer)?;
        let mut terms: TermList<SusceptibilityTerm>
            = TermList::new(tol.gf_reduce_resonance, tol.gf_coefficient);
        let mut zero_weight = C64::from(0.0);
        for alpha in 0..E_out.len() {
            for (beta, x) in a.row(alpha).iter() {
                let M: C64 = x.to_c64() * b.element(*beta, alpha).to_c64();
                let pole = E_in[*beta] - E_out[alpha];
                if pole.abs() < tol.gf_reduce_resonance {
                    zero_weight += M * w_out[alpha];
                    continue;
                }
                let residue = M * (w_in[*beta] - w_out[alpha]);
                if residue.norm() < tol.matrix_element { continue; }
                terms.add(SusceptibilityTerm { residue, pole });
            }
        }
        terms.finalize();
        Ok(Self { inner, outer, terms, zero_weight })
    }

    pub fn inner_block(&self) -> BlockNumber { self.inner }

    pub fn outer_block(&self) -> BlockNumber { self.outer }

    pub fn terms(&self) -> &TermList<SusceptibilityTerm> { &self.terms }

    /// Total weight `W0` of the zero-energy poles.
    pub fn zero_weight(&self) -> C64 { self.zero_weight }
}

/// `χ_AB` as a sum of [`SusceptibilityPart`]s.
///
/// Zero-energy poles are collected into a single weight `W0`, which
/// contributes `β W0` at `z = 0` and `W0` at every imaginary time.
#[derive(Clone, Debug)]
pub struct Susceptibility<'a, T>
where T: Elem
{
    a: &'a FieldOperator<T>,
    b: &'a FieldOperator<T>,
    rho: &'a DensityMatrix<'a, T>,
    tol: Tolerances,
    parts: Vec<SusceptibilityPart>,
    zero_weight: C64,
    disconnected: Option<C64>,
    computed: bool,
}

impl<'a, T> Susceptibility<'a, T>
where T: Elem
{
    pub fn new(
        a: &'a FieldOperator<T>,
        b: &'a FieldOperator<T>,
        rho: &'a DensityMatrix<'a, T>,
        tol: Tolerances,
    ) -> Self
    {
        Self {
            a,
            b,
            rho,
            tol,
            parts: Vec::new(),
            zero_weight: C64::from(0.0),
            disconnected: None,
            computed: false,
        }
    }

    /// Build the term lists of every part.
    pub fn compute(&mut self) -> EdResult<()> {
        if self.computed { return Ok(()); }
        if !self.a.is_computed() || !self.b.is_computed() {
            return Err(EdError::NotComputed("field operator"));
        }
        let mut parts: Vec<SusceptibilityPart> = Vec::new();
        for a_part in self.a.parts() {
            let (inner, outer) = (a_part.from_block(), a_part.to_block());
            let Some(b_part) = self.b.part_from(outer)
                .filter(|p| p.to_block() == inner)
                else { continue; };
            if !self.rho.is_retained(inner) && !self.rho.is_retained(outer) {
                continue;
            }
            parts.push(
                SusceptibilityPart::compute(a_part, b_part, self.rho, &self.tol)?);
        }
        self.zero_weight = parts.iter().map(|p| p.zero_weight).sum();
        info!(
            "susceptibility: {} parts, {} terms, W0 = {:.6e}",
            parts.len(),
            parts.iter().map(|p| p.terms.len()).sum::<usize>(),
            self.zero_weight,
        );
        self.parts = parts;
        self.computed = true;
        Ok(())
    }

    /// Subtract the disconnected part `⟨A⟩⟨B⟩` from all further evaluations.
    pub fn subtract_disconnected(&mut self) -> EdResult<C64> {
        let ab = ensemble_average(self.a, self.rho)?
            * ensemble_average(self.b, self.rho)?;
        self.disconnected = Some(ab);
        Ok(ab)
    }

    pub fn is_computed(&self) -> bool { self.computed }

    pub fn beta(&self) -> f64 { self.rho.beta() }

    pub fn parts(&self) -> &[SusceptibilityPart] { &self.parts }

    pub fn terms(&self) -> impl Iterator<Item = &SusceptibilityTerm> + '_ {
        self.parts.iter().flat_map(|p| p.terms.iter())
    }

    /// Total weight of the zero-energy poles.
    pub fn zero_weight(&self) -> C64 { self.zero_weight }

    /// Evaluate at a complex frequency; the zero-energy weight only
    /// contributes at exactly `z = 0`.
    pub fn value(&self, z: C64) -> C64 {
        let mut acc: C64
            = self.parts.iter()
            .flat_map(|p| p.terms.iter())
            .map(|t| t.value(z))
            .sum();
        if z == C64::from(0.0) {
            let beta = self.beta();
            acc += beta * self.zero_weight;
            if let Some(ab) = self.disconnected { acc -= beta * ab; }
        }
        acc
    }

    /// Evaluate at the `n`-th bosonic Matsubara frequency.
    pub fn matsubara(&self, n: i64) -> C64 {
        self.value(bosonic(n, self.beta()))
    }

    /// Evaluate at imaginary time `0 ≤ τ ≤ β`.
    pub fn tau(&self, tau: f64) -> C64 {
        let beta = self.beta();
        let acc: C64
            = self.terms().map(|t| t.tau(tau, beta)).sum::<C64>() + self.zero_weight;
        acc - self.disconnected.unwrap_or(C64::from(0.0))
    }
}

/// Thermal average of an operator from its block-diagonal eigenbasis parts.
fn ensemble_average<T>(op: &FieldOperator<T>, rho: &DensityMatrix<'_, T>)
    -> EdResult<C64>
where T: Elem
{
    let mut acc = C64::from(0.0);
    for part in op.parts().filter(|p| p.from_block() == p.to_block()) {
        let w = rho.weights(part.from_block())?;
        acc += w.iter().enumerate()
            .map(|(k, wk)| part.element(k, k).to_c64() * *wk)
            .sum::<C64>();
    }
    Ok(acc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        field_op::FieldKind,
        hamiltonian::Hamiltonian,
        lattice::Lattice,
        states::StatesClassification,
        symmetrizer::{ Symmetrizer, default_candidates },
    };

    #[test]
    fn atomic_density_response() {
        let (u, mu, beta) = (1.0, 0.3, 5.0);
        let mut lat = Lattice::new();
        lat.add_site("A", 1, 2).unwrap();
        lat.add_coulomb_s("A", u, -mu).unwrap();
        let index = lat.index_info().unwrap();
        let op = lat.hamiltonian(&index).unwrap();
        let mut sym = Symmetrizer::new(&index, &op).unwrap();
        sym.compute(default_candidates(&index)).unwrap();
        let states = StatesClassification::compute(&sym).unwrap();
        let mut H: Hamiltonian<f64> = Hamiltonian::prepare(&op, &states).unwrap();
        H.compute().unwrap();
        let mut rho = DensityMatrix::new(&states, &H, beta);
        rho.compute().unwrap();

        let mut n_up = FieldOperator::prepare(FieldKind::Quadratic(1, 1), &states)
            .unwrap();
        n_up.compute(&states, &H, 1e-12).unwrap();
        let mut n_dn = FieldOperator::prepare(FieldKind::Quadratic(0, 0), &states)
            .unwrap();
        n_dn.compute(&states, &H, 1e-12).unwrap();
        let mut chi = Susceptibility::new(&n_up, &n_dn, &rho, Tolerances::default());
        chi.compute().unwrap();

        // every state is an eigenstate of both densities: the response is a
        // pure zero-energy pole carrying ⟨n↑ n↓⟩
        let d = rho.average_double_occupancy(0, 1).unwrap();
        assert_eq!(chi.terms().count(), 0);
        assert!((chi.zero_weight().re - d).abs() < 1e-12);
        assert!((chi.matsubara(0) - beta * d).norm() < 1e-12);
        assert!(chi.matsubara(3).norm() < 1e-12);
        assert!((chi.tau(0.3 * beta).re - d).abs() < 1e-12);

        let ab = chi.subtract_disconnected().unwrap();
        let n = rho.average_mode_occupancy(0).unwrap();
        assert!((ab.re - n * n).abs() < 1e-12);
        assert!((chi.matsubara(0) - beta * (d - n * n)).norm() < 1e-12);
        assert!((chi.tau(0.0).re - (d - n * n)).abs() < 1e-12);
    }

    #[test]
    fn zero_frequency_with_poles() {
        let (beta, t) = (4.0, 0.7);
        let mut lat = Lattice::new();
        lat.add_site("A", 1, 1).unwrap();
        lat.add_site("B", 1, 1).unwrap();
        lat.add_level("A", -0.2).unwrap();
        lat.add_hopping("A", 0, "B", 0, t).unwrap();
        let index = lat.index_info().unwrap();
        let op = lat.hamiltonian(&index).unwrap();
        let mut sym = Symmetrizer::new(&index, &op).unwrap();
        sym.compute(default_candidates(&index)).unwrap();
        let states = StatesClassification::compute(&sym).unwrap();
        let mut H: Hamiltonian<f64> = Hamiltonian::prepare(&op, &states).unwrap();
        H.compute().unwrap();
        let mut rho = DensityMatrix::new(&states, &H, beta);
        rho.compute().unwrap();
        let mut n_a = FieldOperator::prepare(FieldKind::Quadratic(0, 0), &states)
            .unwrap();
        n_a.compute(&states, &H, 1e-12).unwrap();
        let mut chi = Susceptibility::new(&n_a, &n_a, &rho, Tolerances::default());
        chi.compute().unwrap();
        assert!(chi.terms().count() > 0);
        assert!(chi.zero_weight().norm() > 0.0);
        let poles: C64 = chi.terms().map(|t| t.residue / (-t.pole)).sum();
        let expected = beta * chi.zero_weight() + poles;
        assert!((chi.matsubara(0) - expected).norm() < 1e-12);
        // χ(τ) = χ(β - τ) for A = B
        assert!((chi.tau(0.7) - chi.tau(beta - 0.7)).norm() < 1e-10);
        // the Matsubara sum of χ(iΩ) recovers χ(τ = 0) = ⟨n_A n_A⟩ = ⟨n_A⟩
        let n = rho.average_mode_occupancy(0).unwrap();
        assert!((chi.tau(0.0).re - n).abs() < 1e-10);
    }
}

//! One-particle Green's function
//! `G_ij(τ) = -⟨T c_i(τ) c†_j(0)⟩`.

use std::cmp::Ordering;
use log::{ debug, info };
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
use super::fermionic;

/// A single term `R / (z - P)`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GfTerm {
    pub residue: C64,
    pub pole: f64,
}

impl GfTerm {
    pub fn value(&self, z: C64) -> C64 { self.residue / (z - self.pole) }

    /// Imaginary-time value at `0 ≤ τ ≤ β`.
    pub fn tau(&self, tau: f64, beta: f64) -> C64 {
        let p = self.pole;
        if p >= 0.0 {
            -self.residue * (-tau * p).exp() / (1.0 + (-beta * p).exp())
        } else {
            -self.residue * ((beta - tau) * p).exp() / ((beta * p).exp() + 1.0)
        }
    }
}

impl Term for GfTerm {
    fn compare(&self, other: &Self, tol: f64) -> Ordering {
        cmp_pole(self.pole, other.pole, tol)
    }

    fn merge(&mut self, other: &Self) { self.residue += other.residue; }

    fn is_negligible(&self, tol: f64, _len: usize) -> bool {
        self.residue.norm() < tol
    }
}

impl PomRecord for GfTerm {
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

/// Contribution of a single pair of blocks: `inner` is acted on by `c_i`,
/// which maps it into `outer`; `c†_j` maps `outer` back into `inner`.
#[derive(Clone, Debug)]
pub struct GreensFunctionPart {
    inner: BlockNumber,
    outer: BlockNumber,
    terms: TermList<GfTerm>,
}

impl GreensFunctionPart {
    fn compute<T>(
        c: &FieldOperatorPart<T>,
        cdag: &FieldOperatorPart<T>,
        rho: &DensityMatrix<'_, T>,
        tol: &Tolerances,
    ) -> EdResult<Self>
    where T: Elem
    {
        let inner = c.from_block();
        let outer = c.to_block();
        let hamiltonian = rho.hamiltonian();
        let E_in = hamiltonian.eigenvalues(inner)?;
        let E_out = hamiltonian.eigenvalues(outer)?;
        let w_in = rho.weights(inner)?;
        let w_out = rho.weights(outer)?;
        let mut terms: TermList<GfTerm>
            = TermList::new(tol.gf_reduce_resonance, tol.gf_coefficient);
        for alpha in 0..E_out.len() {
            for (beta, x) in c.row(alpha).iter() {
                let residue: C64
                    = x.to_c64() * cdag.element(*beta, alpha).to_c64()
                    * (w_out[alpha] + w_in[*beta]);
                if residue.norm() < tol.matrix_element { continue; }
                terms.add(GfTerm { residue, pole: E_in[*beta] - E_out[alpha] });
            }
        }
        terms.finalize();
        Ok(Self { inner, outer, terms })
    }

    pub fn inner_block(&self) -> BlockNumber { self.inner }

    pub fn outer_block(&self) -> BlockNumber { self.outer }

    pub fn terms(&self) -> &TermList<GfTerm> { &self.terms }

    pub fn value(&self, z: C64) -> C64 {
        self.terms.iter().map(|t| t.value(z)).sum()
    }

    pub fn tau(&self, tau: f64, beta: f64) -> C64 {
        self.terms.iter().map(|t| t.tau(tau, beta)).sum()
    }
}

/// `G_ij` as a sum of [`GreensFunctionPart`]s, one per pair of blocks
/// connected by both `c_i` and `c†_j`.
#[derive(Clone, Debug)]
pub struct GreensFunction<'a, T>
where T: Elem
{
    c: &'a FieldOperator<T>,
    cdag: &'a FieldOperator<T>,
    rho: &'a DensityMatrix<'a, T>,
    tol: Tolerances,
    parts: Vec<GreensFunctionPart>,
    computed: bool,
}

impl<'a, T> GreensFunction<'a, T>
where T: Elem
{
    pub fn new(
        c: &'a FieldOperator<T>,
        cdag: &'a FieldOperator<T>,
        rho: &'a DensityMatrix<'a, T>,
        tol: Tolerances,
    ) -> Self
    {
        Self { c, cdag, rho, tol, parts: Vec::new(), computed: false }
    }

    /// Build the term lists of every part.
    ///
    /// Pairs whose two blocks were both marked negligible by the density
    /// matrix are skipped.
    pub fn compute(&mut self) -> EdResult<()> {
        if self.computed { return Ok(()); }
        if !self.c.is_computed() || !self.cdag.is_computed() {
            return Err(EdError::NotComputed("field operator"));
        }
        let mut parts: Vec<GreensFunctionPart> = Vec::new();
        for c_part in self.c.parts() {
            let (inner, outer) = (c_part.from_block(), c_part.to_block());
            let Some(cdag_part) = self.cdag.part_from(outer)
                .filter(|p| p.to_block() == inner)
                else { continue; };
            if !self.rho.is_retained(inner) && !self.rho.is_retained(outer) {
                debug!("skipping negligible pair {} <-> {}", inner, outer);
                continue;
            }
            let part
                = GreensFunctionPart::compute(c_part, cdag_part, self.rho, &self.tol)?;
            if !part.terms.is_empty() { parts.push(part); }
        }
        info!(
            "Green's function: {} parts, {} terms",
            parts.len(),
            parts.iter().map(|p| p.terms.len()).sum::<usize>(),
        );
        self.parts = parts;
        self.computed = true;
        Ok(())
    }

    pub fn is_computed(&self) -> bool { self.computed }

    pub fn beta(&self) -> f64 { self.rho.beta() }

    pub fn parts(&self) -> &[GreensFunctionPart] { &self.parts }

    /// Iterate over every term of every part.
    pub fn terms(&self) -> impl Iterator<Item = &GfTerm> + '_ {
        self.parts.iter().flat_map(|p| p.terms.iter())
    }

    pub fn num_terms(&self) -> usize {
        self.parts.iter().map(|p| p.terms.len()).sum()
    }

    /// `true` if no pair of blocks contributes.
    pub fn vanishes(&self) -> bool { self.parts.is_empty() }

    /// Evaluate at a complex frequency.
    pub fn value(&self, z: C64) -> C64 {
        self.parts.iter().map(|p| p.value(z)).sum()
    }

    /// Evaluate at the `n`-th fermionic Matsubara frequency.
    pub fn matsubara(&self, n: i64) -> C64 {
        self.value(fermionic(n, self.beta()))
    }

    /// Evaluate at imaginary time `0 ≤ τ ≤ β`.
    pub fn tau(&self, tau: f64) -> C64 {
        let beta = self.beta();
        self.parts.iter().map(|p| p.tau(tau, beta)).sum()
    }
}

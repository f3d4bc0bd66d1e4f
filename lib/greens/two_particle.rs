//! Two-particle Green's function
//! ```text
//! χ_ijkl(ω1, ω2; ω3) = ∫ dτ1 dτ2 dτ3 exp(iω1τ1 + iω2τ2 - iω3τ3)
//!                         ⟨T c_i(τ1) c_j(τ2) c†_k(τ3) c†_l(0)⟩
//! ```
//! with `ω4 = ω1 + ω2 - ω3`.
//!
//! The Lehmann sum runs over the six time orderings of the first three
//! operators and, for each, over chains of four eigenstates `1 → 2 → 3 → 4`
//! connected by the operators in that order. Each chain yields two
//! non-resonant terms, three fermionic poles each, and two resonant terms,
//! two fermionic poles and one bosonic pole each; the latter pick up a factor
//! of `β` when their bosonic frequency and energy difference both vanish.
//!
//! Every (ordering, chain of blocks) pair is one job for the dispatcher; term
//! lists are computed on the rank a job lands on and then broadcast to all
//! ranks.

use std::{ cell::RefCell, cmp::Ordering };
use log::{ debug, info };
use ndarray as nd;
use num_complex::Complex64 as C64;
use rustc_hash::FxHashMap as HashMap;
use crate::{
    config::TwoParticleTolerances,
    density::DensityMatrix,
    dispatch::{ self, Communicator, JobLedger, LocalComm },
    error::{ EdError, EdResult },
    field_op::{ FieldOperator, FieldOperatorPart },
    io::{ self, PomRecord },
    linalg::Elem,
    states::BlockNumber,
    term_list::{ Term, TermList, cmp_poles },
};
use super::{ bosonic, fermionic };

/// Signs of the frequencies of `c_i, c_j, c†_k, c†_l` in the exponent.
const SIGNS: [f64; 4] = [1.0, 1.0, -1.0, -1.0];

/// Time orderings `(a, b, c)` of the first three operators and their parity.
const ORDERINGS: [([usize; 3], f64); 6] = [
    ([0, 1, 2], 1.0),
    ([0, 2, 1], -1.0),
    ([1, 0, 2], -1.0),
    ([1, 2, 0], 1.0),
    ([2, 0, 1], 1.0),
    ([2, 1, 0], -1.0),
];

/// Bosonic frequency formed by a pair of the three independent fermionic
/// ones.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Pair {
    /// `ω1 + ω2`
    P12,
    /// `ω1 - ω3`
    P13,
    /// `ω2 - ω3`
    P23,
}

impl Pair {
    fn of(x: usize, y: usize) -> Self {
        match (x.min(y), x.max(y)) {
            (0, 1) => Self::P12,
            (0, 2) => Self::P13,
            _ => Self::P23,
        }
    }

    /// Bosonic Matsubara index of the pair.
    pub fn index(self, n1: i64, n2: i64, n3: i64) -> i64 {
        match self {
            Self::P12 => n1 + n2 + 1,
            Self::P13 => n1 - n3,
            Self::P23 => n2 - n3,
        }
    }

    fn code(self) -> usize {
        match self {
            Self::P12 => 0,
            Self::P13 => 1,
            Self::P23 => 2,
        }
    }

    fn from_code(code: usize) -> Option<Self> {
        match code {
            0 => Some(Self::P12),
            1 => Some(Self::P13),
            2 => Some(Self::P23),
            _ => None,
        }
    }
}

/// `C / Π_s (z_s - P_s)`, where `z_s` is `iω_{s+1}` except for the slot
/// `z4`, if any, which takes `iω4` instead.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct NonResonantTerm {
    pub coeff: C64,
    pub poles: [f64; 3],
    pub z4: Option<usize>,
}

impl NonResonantTerm {
    fn slot_key(&self) -> i64 { self.z4.map(|s| s as i64).unwrap_or(-1) }

    pub fn value(&self, z: &[C64; 4]) -> C64 {
        let denom: C64
            = (0..3)
            .map(|s| {
                let zs = if self.z4 == Some(s) { z[3] } else { z[s] };
                zs - self.poles[s]
            })
            .product();
        self.coeff / denom
    }
}

impl Term for NonResonantTerm {
    fn compare(&self, other: &Self, tol: f64) -> Ordering {
        self.slot_key().cmp(&other.slot_key())
            .then_with(|| cmp_poles(&self.poles, &other.poles, tol))
    }

    fn merge(&mut self, other: &Self) { self.coeff += other.coeff; }

    fn is_negligible(&self, tol: f64, len: usize) -> bool {
        self.coeff.norm() * (len.max(1) as f64) < tol
    }
}

impl PomRecord for NonResonantTerm {
    const WIDTH: usize = 6;

    fn write_record(&self, out: &mut Vec<f64>) {
        out.extend([
            self.coeff.re,
            self.coeff.im,
            self.poles[0],
            self.poles[1],
            self.poles[2],
            self.slot_key() as f64,
        ]);
    }

    fn read_record(rec: &[f64]) -> EdResult<Self> {
        let &[re, im, p1, p2, p3, slot] = rec else {
            return Err(EdError::MalformedRecord(
                format!("expected {} values, got {}", Self::WIDTH, rec.len())));
        };
        let z4 = match slot as i64 {
            -1 => None,
            s @ 0..=2 => Some(s as usize),
            _ => {
                return Err(EdError::MalformedRecord(
                    format!("invalid frequency slot {}", slot)));
            },
        };
        Ok(Self { coeff: C64::new(re, im), poles: [p1, p2, p3], z4 })
    }
}

/// Two fermionic poles and one bosonic pole:
/// ```text
/// β C_res / ((z_a - P1)(z_b - P2))         if ν = 0 and P3 = 0,
/// C_nr / ((z_a - P1)(z_b - P2)(iν - P3))   otherwise,
/// ```
/// where `z_a`, `z_b` are the frequencies of slots `legs` (slot 3 is `iω4`)
/// and `ν` is the bosonic frequency of `pair`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ResonantTerm {
    pub coeff_nr: C64,
    pub coeff_res: C64,
    pub poles: [f64; 3],
    pub legs: [usize; 2],
    pub pair: Pair,
}

impl ResonantTerm {
    fn kind(&self) -> usize {
        16 * self.legs[0] + 4 * self.legs[1] + self.pair.code()
    }

    pub fn value(&self, z: &[C64; 4], nu: i64, beta: f64, res_tol: f64) -> C64 {
        let d = (z[self.legs[0]] - self.poles[0]) * (z[self.legs[1]] - self.poles[1]);
        if nu == 0 && self.poles[2].abs() < res_tol {
            beta * self.coeff_res / d
        } else {
            self.coeff_nr / (d * (bosonic(nu, beta) - self.poles[2]))
        }
    }
}

impl Term for ResonantTerm {
    fn compare(&self, other: &Self, tol: f64) -> Ordering {
        self.kind().cmp(&other.kind())
            .then_with(|| cmp_poles(&self.poles, &other.poles, tol))
    }

    fn merge(&mut self, other: &Self) {
        self.coeff_nr += other.coeff_nr;
        self.coeff_res += other.coeff_res;
    }

    fn is_negligible(&self, tol: f64, len: usize) -> bool {
        let n = len.max(1) as f64;
        self.coeff_nr.norm() * n < tol && self.coeff_res.norm() * n < tol
    }
}

impl PomRecord for ResonantTerm {
    const WIDTH: usize = 8;

    fn write_record(&self, out: &mut Vec<f64>) {
        out.extend([
            self.coeff_nr.re,
            self.coeff_nr.im,
            self.coeff_res.re,
            self.coeff_res.im,
            self.poles[0],
            self.poles[1],
            self.poles[2],
            self.kind() as f64,
        ]);
    }

    fn read_record(rec: &[f64]) -> EdResult<Self> {
        let &[nr_re, nr_im, res_re, res_im, p1, p2, p3, kind] = rec else {
            return Err(EdError::MalformedRecord(
                format!("expected {} values, got {}", Self::WIDTH, rec.len())));
        };
        let k = kind as usize;
        let legs = [k / 16, (k / 4) % 4];
        let pair = Pair::from_code(k % 4)
            .filter(|_| kind >= 0.0 && legs[0] < 4 && k < 64)
            .ok_or_else(|| EdError::MalformedRecord(
                format!("invalid resonant term kind {}", kind)))?;
        Ok(Self {
            coeff_nr: C64::new(nr_re, nr_im),
            coeff_res: C64::new(res_re, res_im),
            poles: [p1, p2, p3],
            legs,
            pair,
        })
    }
}

/* Parts **********************************************************************/

/// Contribution of one time ordering and one chain of blocks
/// `B1 → B2 → B3 → B4`, where the ordered operators map `B2 → B1`,
/// `B3 → B2`, `B4 → B3`, and `c†_l` maps `B1 → B4`.
#[derive(Clone, Debug)]
pub struct TwoParticleGfPart {
    ordering: usize,
    blocks: [BlockNumber; 4],
    non_resonant: TermList<NonResonantTerm>,
    resonant: TermList<ResonantTerm>,
}

impl TwoParticleGfPart {
    fn new(ordering: usize, blocks: [BlockNumber; 4], tol: &TwoParticleTolerances)
        -> Self
    {
        Self {
            ordering,
            blocks,
            non_resonant: TermList::new(tol.reduce_resonance, tol.multi_term_coefficient)
                .with_reduce_threshold(tol.reduce_invocation_threshold),
            resonant: TermList::new(tol.reduce_resonance, tol.multi_term_coefficient)
                .with_reduce_threshold(tol.reduce_invocation_threshold),
        }
    }

    /// Time ordering `(a, b, c)` of the part.
    pub fn ordering(&self) -> [usize; 3] { ORDERINGS[self.ordering].0 }

    /// Blocks `B1..B4` of the chain.
    pub fn blocks(&self) -> [BlockNumber; 4] { self.blocks }

    pub fn non_resonant(&self) -> &TermList<NonResonantTerm> { &self.non_resonant }

    pub fn resonant(&self) -> &TermList<ResonantTerm> { &self.resonant }

    pub fn num_terms(&self) -> usize {
        self.non_resonant.len() + self.resonant.len()
    }

    fn compute<T>(
        &mut self,
        ops: [&FieldOperatorPart<T>; 4],
        rho: &DensityMatrix<'_, T>,
        coeff_tol: f64,
    ) -> EdResult<()>
    where T: Elem
    {
        let ([a, b, c], parity) = ORDERINGS[self.ordering];
        let [op_a, op_b, op_c, op_4] = ops;
        let hamiltonian = rho.hamiltonian();
        let E: Vec<&nd::Array1<f64>>
            = self.blocks.iter()
            .map(|bk| hamiltonian.eigenvalues(*bk))
            .collect::<EdResult<_>>()?;
        let w: Vec<&nd::Array1<f64>>
            = self.blocks.iter()
            .map(|bk| rho.weights(*bk))
            .collect::<EdResult<_>>()?;
        let (sa, sb, sc) = (SIGNS[a], SIGNS[b], SIGNS[c]);

        for (s4, s1, x4) in op_4.nonzeros() {
            for (s3, xc) in op_c.col(s4).iter() {
                for (s2, xb) in op_b.col(*s3).iter() {
                    let xa = op_a.element(s1, *s2);
                    if xa.modulus() == 0.0 { continue; }
                    let M: C64
                        = parity * xa.to_c64() * xb.to_c64() * xc.to_c64()
                        * x4.to_c64();
                    let (E1, E2, E3, E4)
                        = (E[0][s1], E[1][*s2], E[2][*s3], E[3][s4]);
                    let (w1, w2, w3, w4)
                        = (w[0][s1], w[1][*s2], w[2][*s3], w[3][s4]);
                    let (Da, Db, Dc) = (E2 - E1, E3 - E2, E4 - E3);

                    let mut poles = [0.0; 3];
                    poles[a] = sa * Da;
                    poles[c] = sc * Dc;
                    poles[b] = E4 - E1;
                    self.add_non_resonant(NonResonantTerm {
                        coeff: M * (w1 + w2) * sa * sc,
                        poles,
                        z4: Some(b),
                    }, coeff_tol);

                    let mut poles = [0.0; 3];
                    poles[a] = sa * Da;
                    poles[b] = sb * Db;
                    poles[c] = sc * Dc;
                    self.add_non_resonant(NonResonantTerm {
                        coeff: M * (w1 + w2),
                        poles,
                        z4: None,
                    }, coeff_tol);

                    self.add_resonant(ResonantTerm {
                        coeff_nr: M * (w2 - w4) * sc,
                        coeff_res: -M * w2 * sc,
                        poles: [sc * Dc, E4 - E1, E4 - E2],
                        legs: [c, 3],
                        pair: Pair::of(b, c),
                    }, coeff_tol);

                    self.add_resonant(ResonantTerm {
                        coeff_nr: -M * (w3 - w1) * sb * sc,
                        coeff_res: -M * w1 * sb * sc,
                        poles: [sb * Db, sc * Dc, E3 - E1],
                        legs: [b, c],
                        pair: Pair::of(a, b),
                    }, coeff_tol);
                }
            }
        }
        self.non_resonant.finalize();
        self.resonant.finalize();
        debug!(
            "chain {:?} ordering {:?}: {} + {} terms",
            self.blocks, self.ordering(),
            self.non_resonant.len(), self.resonant.len(),
        );
        Ok(())
    }

    fn add_non_resonant(&mut self, term: NonResonantTerm, tol: f64) {
        if term.coeff.norm() >= tol { self.non_resonant.add(term); }
    }

    fn add_resonant(&mut self, term: ResonantTerm, tol: f64) {
        if term.coeff_nr.norm() >= tol || term.coeff_res.norm() >= tol {
            self.resonant.add(term);
        }
    }

    fn value(&self, z: &[C64; 4], n: (i64, i64, i64), beta: f64) -> C64 {
        let res_tol = self.resonant.resonance_tol();
        let nr: C64 = self.non_resonant.iter().map(|t| t.value(z)).sum();
        let r: C64
            = self.resonant.iter()
            .map(|t| t.value(z, t.pair.index(n.0, n.1, n.2), beta, res_tol))
            .sum();
        nr + r
    }

    fn to_records(&self) -> Vec<f64> {
        let mut data: Vec<f64> = vec![self.non_resonant.len() as f64];
        data.extend(io::flatten(self.non_resonant.iter()));
        data.extend(io::flatten(self.resonant.iter()));
        data
    }

    fn set_records(&mut self, data: &[f64]) -> EdResult<()> {
        let (&n_nr, rest) = data.split_first()
            .ok_or_else(|| EdError::MalformedRecord("empty part record".to_string()))?;
        let split = n_nr as usize * NonResonantTerm::WIDTH;
        if split > rest.len() {
            return Err(EdError::MalformedRecord(
                format!("part record too short for {} terms", n_nr)));
        }
        self.non_resonant.set_terms(io::unflatten(&rest[..split])?);
        self.resonant.set_terms(io::unflatten(&rest[split..])?);
        Ok(())
    }
}

/* Full function **************************************************************/

/// `χ_ijkl` as a sum of [`TwoParticleGfPart`]s.
///
/// Values at Matsubara index triples are cached after the first evaluation.
#[derive(Debug)]
pub struct TwoParticleGf<'a, T>
where T: Elem
{
    ops: [&'a FieldOperator<T>; 4],
    rho: &'a DensityMatrix<'a, T>,
    tol: TwoParticleTolerances,
    parts: Vec<TwoParticleGfPart>,
    cache: RefCell<HashMap<(i64, i64, i64), C64>>,
    computed: bool,
}

impl<'a, T> TwoParticleGf<'a, T>
where T: Elem
{
    /// Set up `χ_ijkl` from `c_i`, `c_j`, `c†_k`, and `c†_l`.
    pub fn new(
        c_i: &'a FieldOperator<T>,
        c_j: &'a FieldOperator<T>,
        cdag_k: &'a FieldOperator<T>,
        cdag_l: &'a FieldOperator<T>,
        rho: &'a DensityMatrix<'a, T>,
        tol: TwoParticleTolerances,
    ) -> Self
    {
        Self {
            ops: [c_i, c_j, cdag_k, cdag_l],
            rho,
            tol,
            parts: Vec::new(),
            cache: RefCell::new(HashMap::default()),
            computed: false,
        }
    }

    /// Enumerate every (ordering, chain) pair with at least one retained
    /// block.
    fn chains(&self) -> EdResult<Vec<TwoParticleGfPart>> {
        if self.ops.iter().any(|op| !op.is_computed()) {
            return Err(EdError::NotComputed("field operator"));
        }
        let num_blocks = self.rho.states().num_blocks();
        let mut parts: Vec<TwoParticleGfPart> = Vec::new();
        for (k, ([a, b, c], _)) in ORDERINGS.iter().enumerate() {
            for b1 in 0..num_blocks {
                let chain
                    = self.ops[3].left_index(b1)
                    .and_then(|b4| {
                        self.ops[*c].left_index(b4).map(|b3| (b3, b4))
                    })
                    .and_then(|(b3, b4)| {
                        self.ops[*b].left_index(b3).map(|b2| [b1, b2, b3, b4])
                    })
                    .filter(|chain| self.ops[*a].left_index(chain[1]) == Some(b1));
                let Some(chain) = chain else { continue; };
                if chain.iter().all(|bk| !self.rho.is_retained(*bk)) { continue; }
                parts.push(TwoParticleGfPart::new(k, chain, &self.tol));
            }
        }
        Ok(parts)
    }

    fn operator_parts(&self, part: &TwoParticleGfPart)
        -> EdResult<[&'a FieldOperatorPart<T>; 4]>
    {
        let [a, b, c] = part.ordering();
        let [b1, b2, b3, b4] = part.blocks;
        let missing = || EdError::NotComputed("field operator part");
        Ok([
            self.ops[a].part_from(b2).ok_or_else(missing)?,
            self.ops[b].part_from(b3).ok_or_else(missing)?,
            self.ops[c].part_from(b4).ok_or_else(missing)?,
            self.ops[3].part_from(b1).ok_or_else(missing)?,
        ])
    }

    /// Compute every part on the calling thread alone.
    pub fn compute_serial(&mut self) -> EdResult<()> {
        let comm = LocalComm::world(1)
            .pop()
            .ok_or(EdError::NotComputed("communicator"))?;
        self.compute(&comm).map(|_| ())
    }

    /// Compute every part, distributing them over the ranks of `comm`.
    ///
    /// Must be called collectively on every rank; afterward every rank holds
    /// all term lists.
    pub fn compute<C>(&mut self, comm: &C) -> EdResult<JobLedger>
    where C: Communicator + ?Sized
    {
        let mut parts = self.chains()?;
        info!("two-particle Green's function: {} parts", parts.len());
        let coeff_tol = self.tol.coefficient;
        let ledger: JobLedger
            = dispatch::dispatch(comm, parts.len(), |j| -> EdResult<()> {
                let ops = self.operator_parts(&parts[j])?;
                parts[j].compute(ops, self.rho, coeff_tol)
            })?;
        for (j, part) in parts.iter_mut().enumerate() {
            let owner = ledger.owners[j];
            let mut data: Vec<f64>
                = if comm.rank() == owner { part.to_records() } else { Vec::new() };
            comm.broadcast(owner, &mut data)?;
            if comm.rank() != owner { part.set_records(&data)?; }
        }
        parts.retain(|p| p.num_terms() > 0);
        info!(
            "two-particle Green's function: {} nonzero parts, {} terms",
            parts.len(),
            parts.iter().map(|p| p.num_terms()).sum::<usize>(),
        );
        self.parts = parts;
        self.cache.borrow_mut().clear();
        self.computed = true;
        Ok(ledger)
    }

    pub fn is_computed(&self) -> bool { self.computed }

    pub fn beta(&self) -> f64 { self.rho.beta() }

    pub fn parts(&self) -> &[TwoParticleGfPart] { &self.parts }

    pub fn num_terms(&self) -> usize {
        self.parts.iter().map(|p| p.num_terms()).sum()
    }

    /// `true` if no chain contributes.
    pub fn vanishes(&self) -> bool { self.parts.is_empty() }

    /// Iterate over all non-resonant terms.
    pub fn non_resonant_terms(&self) -> impl Iterator<Item = &NonResonantTerm> + '_ {
        self.parts.iter().flat_map(|p| p.non_resonant.iter())
    }

    /// Iterate over all resonant terms.
    pub fn resonant_terms(&self) -> impl Iterator<Item = &ResonantTerm> + '_ {
        self.parts.iter().flat_map(|p| p.resonant.iter())
    }

    /// Evaluate at fermionic Matsubara indices `(n1, n2, n3)` without
    /// touching the cache.
    pub fn evaluate(&self, n1: i64, n2: i64, n3: i64) -> C64 {
        let beta = self.beta();
        let z: [C64; 4] = [
            fermionic(n1, beta),
            fermionic(n2, beta),
            fermionic(n3, beta),
            fermionic(n1 + n2 - n3, beta),
        ];
        self.parts.iter().map(|p| p.value(&z, (n1, n2, n3), beta)).sum()
    }

    /// Evaluate at fermionic Matsubara indices `(n1, n2, n3)`.
    pub fn value(&self, n1: i64, n2: i64, n3: i64) -> C64 {
        if let Some(v) = self.cache.borrow().get(&(n1, n2, n3)) { return *v; }
        let v = self.evaluate(n1, n2, n3);
        self.cache.borrow_mut().insert((n1, n2, n3), v);
        v
    }

    /// Number of cached frequency triples.
    pub fn cache_len(&self) -> usize { self.cache.borrow().len() }

    pub fn clear_cache(&self) { self.cache.borrow_mut().clear(); }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::TwoParticleTolerances,
        field_op::FieldOperatorContainer,
        greens::gf::GreensFunction,
        hamiltonian::Hamiltonian,
        lattice::Lattice,
        states::StatesClassification,
        symmetrizer::{ Symmetrizer, default_candidates },
    };

    fn exact() -> TwoParticleTolerances {
        TwoParticleTolerances {
            coefficient: 0.0,
            multi_term_coefficient: 0.0,
            ..TwoParticleTolerances::default()
        }
    }

    fn setup(lat: &Lattice, beta: f64)
        -> (StatesClassification, Hamiltonian<f64>, f64)
    {
        let index = lat.index_info().unwrap();
        let op = lat.hamiltonian(&index).unwrap();
        let mut sym = Symmetrizer::new(&index, &op).unwrap();
        sym.compute(default_candidates(&index)).unwrap();
        let states = StatesClassification::compute(&sym).unwrap();
        let mut H = Hamiltonian::prepare(&op, &states).unwrap();
        H.compute().unwrap();
        (states, H, beta)
    }

    #[test]
    fn free_fermions_are_disconnected() {
        let mut lat = Lattice::new();
        lat.add_site("A", 1, 2).unwrap();
        lat.add_level("A", -0.35).unwrap();
        let (states, H, beta) = setup(&lat, 6.0);
        let mut rho = DensityMatrix::new(&states, &H, beta);
        rho.compute().unwrap();
        let ops = FieldOperatorContainer::compute(&states, &H, 1e-12).unwrap();
        let (up, dn) = (1, 0);
        let gf_tol = crate::config::Tolerances::default();
        let mut g_up = GreensFunction::new(
            ops.c(up).unwrap(), ops.c_dag(up).unwrap(), &rho, gf_tol);
        g_up.compute().unwrap();
        let mut g_dn = GreensFunction::new(
            ops.c(dn).unwrap(), ops.c_dag(dn).unwrap(), &rho, gf_tol);
        g_dn.compute().unwrap();

        let mut chi = TwoParticleGf::new(
            ops.c(up).unwrap(),
            ops.c(dn).unwrap(),
            ops.c_dag(up).unwrap(),
            ops.c_dag(dn).unwrap(),
            &rho,
            exact(),
        );
        chi.compute_serial().unwrap();
        assert!(!chi.vanishes());
        for (n1, n2, n3) in [(0, 0, 0), (0, 1, 0), (1, -2, 1), (2, 1, 0), (-1, 3, 2)] {
            let expected
                = if n1 == n3 {
                    -beta * g_up.matsubara(n1) * g_dn.matsubara(n2)
                } else {
                    C64::from(0.0)
                };
            let v = chi.value(n1, n2, n3);
            assert!(
                (v - expected).norm() < 1e-10 * expected.norm().max(1.0),
                "({}, {}, {}): {} vs {}", n1, n2, n3, v, expected,
            );
        }
        assert_eq!(chi.cache_len(), 5);
        assert_eq!(chi.value(1, -2, 1), chi.evaluate(1, -2, 1));
    }

    #[test]
    fn distributed_matches_serial() {
        let mut lat = Lattice::new();
        lat.add_site("A", 1, 2).unwrap();
        lat.add_site("B", 1, 2).unwrap();
        lat.add_coulomb_s("A", 1.5, -0.75).unwrap();
        lat.add_coulomb_s("B", 1.5, -0.6).unwrap();
        lat.add_hopping("A", 0, "B", 0, -0.4).unwrap();
        let (states, H, beta) = setup(&lat, 3.0);
        let mut rho = DensityMatrix::new(&states, &H, beta);
        rho.compute().unwrap();
        let ops = FieldOperatorContainer::compute(&states, &H, 1e-12).unwrap();
        let quad = |i, j, k, l| {
            TwoParticleGf::new(
                ops.c(i).unwrap(),
                ops.c(j).unwrap(),
                ops.c_dag(k).unwrap(),
                ops.c_dag(l).unwrap(),
                &rho,
                exact(),
            )
        };
        let mut serial = quad(1, 0, 1, 0);
        serial.compute_serial().unwrap();

        let values: Vec<Vec<C64>>
            = std::thread::scope(|scope| {
                let handles: Vec<_>
                    = LocalComm::world(3).into_iter()
                    .map(|comm| {
                        let quad = &quad;
                        scope.spawn(move || {
                            let mut chi = quad(1, 0, 1, 0);
                            let ledger = chi.compute(&comm).unwrap();
                            assert_eq!(ledger.owners.len(), chi.chains().unwrap().len());
                            vec![chi.value(0, 0, 0), chi.value(1, -1, 2)]
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });
        for v in values.iter() {
            assert!((v[0] - serial.value(0, 0, 0)).norm() < 1e-12);
            assert!((v[1] - serial.value(1, -1, 2)).norm() < 1e-12);
        }

        // exchanging the two annihilators flips the sign
        let mut swapped = quad(0, 1, 1, 0);
        swapped.compute_serial().unwrap();
        for (n1, n2, n3) in [(0, 0, 0), (1, -1, 2), (2, 0, -1)] {
            let a = serial.value(n1, n2, n3);
            let b = swapped.value(n2, n1, n3);
            assert!((a + b).norm() < 1e-10 * a.norm().max(1.0));
        }
    }

    #[test]
    fn pom_records() {
        let nr = NonResonantTerm {
            coeff: C64::new(0.5, -1e-17),
            poles: [0.1, -0.2, 0.3],
            z4: Some(2),
        };
        let mut data = Vec::new();
        nr.write_record(&mut data);
        assert_eq!(data.len(), NonResonantTerm::WIDTH);
        assert_eq!(NonResonantTerm::read_record(&data).unwrap(), nr);
        let r = ResonantTerm {
            coeff_nr: C64::new(1.0, 2.0),
            coeff_res: C64::new(-3.0, 0.0),
            poles: [0.0, 1.0, -1.0],
            legs: [2, 3],
            pair: Pair::P23,
        };
        let mut data = Vec::new();
        r.write_record(&mut data);
        assert_eq!(ResonantTerm::read_record(&data).unwrap(), r);
        data[7] = 63.0;
        assert!(ResonantTerm::read_record(&data).is_err());
    }
}

//! Index-keyed collections of correlation functions.
//!
//! Two-particle objects are stored once per orbit of the exchange group
//! acting on `(i, j, k, l)`; every other member of the orbit is an
//! `(orbit id, exchange)` pair resolved on evaluation.

use std::path::Path;
use indexmap::IndexMap;
use itertools::Itertools;
use log::info;
use ndarray as nd;
use num_complex::Complex64 as C64;
use crate::{
    config::{ Tolerances, TwoParticleTolerances },
    density::DensityMatrix,
    dispatch::Communicator,
    error::{ EdError, EdResult },
    field_op::{ FieldOperator, FieldOperatorContainer },
    linalg::Elem,
    operator::presets,
    states::StatesClassification,
    hamiltonian::Hamiltonian,
    io::save_pom,
};
use super::{
    gf::GreensFunction,
    susceptibility::Susceptibility,
    two_particle::TwoParticleGf,
    vertex::Vertex4,
};

/// Element of the exchange group of `χ_ijkl(n1, n2; n3)`.
///
/// Each element is an involution acting jointly on the mode indices and the
/// frequencies, with `χ_{g·q}(g·n) = sign(g) χ_q(n)`.
///
/// Exchanging the annihilator pair with the creator pair is not an element:
/// `c_i c_j` and `c†_k c†_l` are different operators, so that exchange only
/// relates `χ_ijkl` to a complex conjugate at negated frequencies, never to
/// `±χ` of another quadruple.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Exchange {
    Identity,
    /// `(i, j, k, l; n1, n2, n3) → (j, i, k, l; n2, n1, n3)`
    SwapAnnihilators,
    /// `(i, j, k, l; n1, n2, n3) → (i, j, l, k; n1, n2, n4)`
    SwapCreators,
    /// Both of the above.
    SwapBoth,
}

impl Exchange {
    pub const ALL: [Self; 4] = [
        Self::Identity,
        Self::SwapAnnihilators,
        Self::SwapCreators,
        Self::SwapBoth,
    ];

    pub fn indices(self, q: [usize; 4]) -> [usize; 4] {
        let [i, j, k, l] = q;
        match self {
            Self::Identity => [i, j, k, l],
            Self::SwapAnnihilators => [j, i, k, l],
            Self::SwapCreators => [i, j, l, k],
            Self::SwapBoth => [j, i, l, k],
        }
    }

    pub fn frequencies(self, n: (i64, i64, i64)) -> (i64, i64, i64) {
        let (n1, n2, n3) = n;
        let n4 = n1 + n2 - n3;
        match self {
            Self::Identity => (n1, n2, n3),
            Self::SwapAnnihilators => (n2, n1, n3),
            Self::SwapCreators => (n1, n2, n4),
            Self::SwapBoth => (n2, n1, n4),
        }
    }

    pub fn sign(self) -> f64 {
        match self {
            Self::Identity | Self::SwapBoth => 1.0,
            Self::SwapAnnihilators | Self::SwapCreators => -1.0,
        }
    }

    /// Return the orbit representative of `q` (its lexicographically
    /// smallest image) and the first group element that maps `q` onto it.
    pub fn canonical(q: [usize; 4]) -> (Self, [usize; 4]) {
        Self::ALL.into_iter()
            .map(|g| (g, g.indices(q)))
            .min_by_key(|(_, image)| *image)
            .unwrap_or((Self::Identity, q))
    }
}

/* GfContainer ***************************************************************/

/// `G_ij` for a set of mode pairs, in insertion order.
#[derive(Debug)]
pub struct GfContainer<'a, T>
where T: Elem
{
    ops: &'a FieldOperatorContainer<T>,
    rho: &'a DensityMatrix<'a, T>,
    tol: Tolerances,
    elements: IndexMap<(usize, usize), GreensFunction<'a, T>>,
}

impl<'a, T> GfContainer<'a, T>
where T: Elem
{
    pub fn new(
        ops: &'a FieldOperatorContainer<T>,
        rho: &'a DensityMatrix<'a, T>,
        tol: Tolerances,
    ) -> Self
    {
        Self { ops, rho, tol, elements: IndexMap::new() }
    }

    /// Add `G_ij` for each pair not already present.
    pub fn prepare<I>(&mut self, pairs: I) -> EdResult<()>
    where I: IntoIterator<Item = (usize, usize)>
    {
        for (i, j) in pairs {
            if self.elements.contains_key(&(i, j)) { continue; }
            let G = GreensFunction::new(
                self.ops.c(i)?, self.ops.c_dag(j)?, self.rho, self.tol);
            self.elements.insert((i, j), G);
        }
        Ok(())
    }

    pub fn compute(&mut self) -> EdResult<()> {
        for G in self.elements.values_mut() { G.compute()?; }
        info!("computed {} Green's functions", self.elements.len());
        Ok(())
    }

    pub fn len(&self) -> usize { self.elements.len() }

    pub fn is_empty(&self) -> bool { self.elements.is_empty() }

    pub fn contains(&self, i: usize, j: usize) -> bool {
        self.elements.contains_key(&(i, j))
    }

    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.elements.keys().copied()
    }

    pub fn get(&self, i: usize, j: usize) -> EdResult<&GreensFunction<'a, T>> {
        self.elements.get(&(i, j))
            .ok_or_else(|| EdError::MissingElement(format!("G({}, {})", i, j)))
    }

    /// Write the term list of every stored `G_ij` to `dir/gf_{i}_{j}.pom`.
    /// Returns the number of files written.
    pub fn save_pom<P>(&self, dir: P) -> EdResult<usize>
    where P: AsRef<Path>
    {
        let dir = dir.as_ref();
        for ((i, j), G) in self.elements.iter() {
            save_pom(dir.join(format!("gf_{}_{}.pom", i, j)), G.terms())?;
        }
        Ok(self.elements.len())
    }

    /// `G(iω_n)` for `0 ≤ n < n_freq` on every pair, one row per pair in
    /// insertion order.
    pub fn matsubara_table(&self, n_freq: usize) -> nd::Array2<C64> {
        let mut table: nd::Array2<C64>
            = nd::Array2::zeros((self.elements.len(), n_freq));
        for (mut row, G) in table.rows_mut().into_iter().zip(self.elements.values()) {
            row.iter_mut().enumerate()
                .for_each(|(n, x)| { *x = G.matsubara(n as i64); });
        }
        table
    }
}

/* SusceptibilityContainer ***************************************************/

/// Quadratic operators `c†_i c_j` in the eigenbasis, keyed by `(i, j)`.
#[derive(Debug)]
pub struct QuadraticOperators<T>
where T: Elem
{
    elements: IndexMap<(usize, usize), FieldOperator<T>>,
}

impl<T> QuadraticOperators<T>
where T: Elem
{
    pub fn compute<I>(
        pairs: I,
        states: &StatesClassification,
        hamiltonian: &Hamiltonian<T>,
        tol: f64,
    ) -> EdResult<Self>
    where I: IntoIterator<Item = (usize, usize)>
    {
        let mut elements: IndexMap<(usize, usize), FieldOperator<T>>
            = IndexMap::new();
        for (i, j) in pairs {
            if elements.contains_key(&(i, j)) { continue; }
            let mut op
                = FieldOperator::prepare_general(presets::c_dag_c(i, j), states)?;
            op.compute(states, hamiltonian, tol)?;
            elements.insert((i, j), op);
        }
        Ok(Self { elements })
    }

    pub fn get(&self, i: usize, j: usize) -> EdResult<&FieldOperator<T>> {
        self.elements.get(&(i, j))
            .ok_or_else(|| EdError::MissingElement(format!("c†_{} c_{}", i, j)))
    }
}

/// `χ_{(ij)(kl)}` between `c†_i c_j` and `c†_k c_l`.
#[derive(Debug)]
pub struct SusceptibilityContainer<'a, T>
where T: Elem
{
    ops: &'a QuadraticOperators<T>,
    rho: &'a DensityMatrix<'a, T>,
    tol: Tolerances,
    subtract_disconnected: bool,
    elements: IndexMap<[usize; 4], Susceptibility<'a, T>>,
}

impl<'a, T> SusceptibilityContainer<'a, T>
where T: Elem
{
    pub fn new(
        ops: &'a QuadraticOperators<T>,
        rho: &'a DensityMatrix<'a, T>,
        tol: Tolerances,
    ) -> Self
    {
        Self {
            ops,
            rho,
            tol,
            subtract_disconnected: false,
            elements: IndexMap::new(),
        }
    }

    /// Subtract `⟨A⟩⟨B⟩` from every element computed afterward.
    pub fn with_disconnected_subtracted(mut self) -> Self {
        self.subtract_disconnected = true;
        self
    }

    pub fn prepare<I>(&mut self, quads: I) -> EdResult<()>
    where I: IntoIterator<Item = [usize; 4]>
    {
        for q in quads {
            if self.elements.contains_key(&q) { continue; }
            let [i, j, k, l] = q;
            let chi = Susceptibility::new(
                self.ops.get(i, j)?, self.ops.get(k, l)?, self.rho, self.tol);
            self.elements.insert(q, chi);
        }
        Ok(())
    }

    pub fn compute(&mut self) -> EdResult<()> {
        for chi in self.elements.values_mut() {
            chi.compute()?;
            if self.subtract_disconnected { chi.subtract_disconnected()?; }
        }
        info!("computed {} susceptibilities", self.elements.len());
        Ok(())
    }

    pub fn len(&self) -> usize { self.elements.len() }

    pub fn is_empty(&self) -> bool { self.elements.is_empty() }

    pub fn indices(&self) -> impl Iterator<Item = [usize; 4]> + '_ {
        self.elements.keys().copied()
    }

    pub fn get(&self, q: [usize; 4]) -> EdResult<&Susceptibility<'a, T>> {
        self.elements.get(&q)
            .ok_or_else(|| EdError::MissingElement(format!("chi{:?}", q)))
    }

    /// `χ(iΩ_n)` for `0 ≤ n < n_freq`, one row per element.
    pub fn matsubara_table(&self, n_freq: usize) -> nd::Array2<C64> {
        let mut table: nd::Array2<C64>
            = nd::Array2::zeros((self.elements.len(), n_freq));
        for (mut row, chi) in table.rows_mut().into_iter().zip(self.elements.values()) {
            row.iter_mut().enumerate()
                .for_each(|(n, x)| { *x = chi.matsubara(n as i64); });
        }
        table
    }
}

/* TwoParticleGfContainer ****************************************************/

/// `χ_ijkl` for a set of quadruples, stored once per exchange orbit.
#[derive(Debug)]
pub struct TwoParticleGfContainer<'a, T>
where T: Elem
{
    ops: &'a FieldOperatorContainer<T>,
    rho: &'a DensityMatrix<'a, T>,
    tol: TwoParticleTolerances,
    representatives: IndexMap<[usize; 4], TwoParticleGf<'a, T>>,
    elements: IndexMap<[usize; 4], (usize, Exchange)>,
}

impl<'a, T> TwoParticleGfContainer<'a, T>
where T: Elem
{
    pub fn new(
        ops: &'a FieldOperatorContainer<T>,
        rho: &'a DensityMatrix<'a, T>,
        tol: TwoParticleTolerances,
    ) -> Self
    {
        Self {
            ops,
            rho,
            tol,
            representatives: IndexMap::new(),
            elements: IndexMap::new(),
        }
    }

    pub fn prepare<I>(&mut self, quads: I) -> EdResult<()>
    where I: IntoIterator<Item = [usize; 4]>
    {
        for q in quads {
            if self.elements.contains_key(&q) { continue; }
            let (g, r) = Exchange::canonical(q);
            let id = match self.representatives.get_index_of(&r) {
                Some(id) => id,
                None => {
                    let [i, j, k, l] = r;
                    let chi = TwoParticleGf::new(
                        self.ops.c(i)?,
                        self.ops.c(j)?,
                        self.ops.c_dag(k)?,
                        self.ops.c_dag(l)?,
                        self.rho,
                        self.tol,
                    );
                    self.representatives.insert_full(r, chi).0
                },
            };
            self.elements.insert(q, (id, g));
        }
        Ok(())
    }

    /// Compute every representative over the ranks of `comm`. Must be called
    /// collectively.
    pub fn compute<C>(&mut self, comm: &C) -> EdResult<()>
    where C: Communicator + ?Sized
    {
        for chi in self.representatives.values_mut() { chi.compute(comm)?; }
        info!(
            "computed {} two-particle Green's functions from {} representatives",
            self.elements.len(),
            self.representatives.len(),
        );
        Ok(())
    }

    pub fn len(&self) -> usize { self.elements.len() }

    pub fn is_empty(&self) -> bool { self.elements.is_empty() }

    pub fn num_representatives(&self) -> usize { self.representatives.len() }

    pub fn indices(&self) -> impl Iterator<Item = [usize; 4]> + '_ {
        self.elements.keys().copied()
    }

    /// Iterate over orbit representatives with their mode quadruples.
    pub fn representatives(&self)
        -> impl Iterator<Item = ([usize; 4], &TwoParticleGf<'a, T>)> + '_
    {
        self.representatives.iter().map(|(q, chi)| (*q, chi))
    }

    /// Write the non-resonant and resonant term lists of every representative
    /// to `dir/chi4_{i}_{j}_{k}_{l}_nr.pom` and `..._res.pom`. Returns the
    /// number of files written.
    pub fn save_pom<P>(&self, dir: P) -> EdResult<usize>
    where P: AsRef<Path>
    {
        let dir = dir.as_ref();
        for ([i, j, k, l], chi) in self.representatives.iter() {
            let stem = format!("chi4_{}_{}_{}_{}", i, j, k, l);
            save_pom(dir.join(format!("{}_nr.pom", stem)), chi.non_resonant_terms())?;
            save_pom(dir.join(format!("{}_res.pom", stem)), chi.resonant_terms())?;
        }
        Ok(2 * self.representatives.len())
    }

    /// Orbit id and exchange of a stored quadruple.
    pub fn element(&self, q: [usize; 4]) -> EdResult<(usize, Exchange)> {
        self.elements.get(&q).copied()
            .ok_or_else(|| EdError::MissingElement(format!("chi4{:?}", q)))
    }

    /// Every Green's function pair a vertex over the stored quadruples needs.
    pub fn required_gf_pairs(&self) -> Vec<(usize, usize)> {
        self.representatives.keys()
            .flat_map(|&[i, j, k, l]| {
                [(i, i), (j, j), (k, k), (l, l), (i, k), (j, l), (i, l), (j, k)]
            })
            .unique()
            .collect()
    }

    pub fn value(&self, q: [usize; 4], n1: i64, n2: i64, n3: i64)
        -> EdResult<C64>
    {
        let (id, g) = self.element(q)?;
        let (m1, m2, m3) = g.frequencies((n1, n2, n3));
        let chi = self.representatives.get_index(id)
            .map(|(_, chi)| chi)
            .ok_or_else(|| EdError::MissingElement(format!("orbit {}", id)))?;
        Ok(g.sign() * chi.value(m1, m2, m3))
    }
}

/* Vertex4Container **********************************************************/

/// `Γ_ijkl` over the quadruples of a [`TwoParticleGfContainer`], sharing
/// its exchange orbits.
#[derive(Debug)]
pub struct Vertex4Container<'c, 'a, T>
where T: Elem
{
    chi: &'c TwoParticleGfContainer<'a, T>,
    vertices: Vec<Vertex4<'c, 'a, T>>,
}

impl<'c, 'a, T> Vertex4Container<'c, 'a, T>
where T: Elem
{
    /// Fails with [`EdError::MissingElement`] if `gf` lacks any of the pairs
    /// named by [`TwoParticleGfContainer::required_gf_pairs`].
    pub fn new(
        chi: &'c TwoParticleGfContainer<'a, T>,
        gf: &'c GfContainer<'a, T>,
    ) -> EdResult<Self>
    {
        let vertices: Vec<Vertex4<'c, 'a, T>>
            = chi.representatives()
            .map(|([i, j, k, l], chi4)| -> EdResult<Vertex4<'c, 'a, T>> {
                let legs = [gf.get(i, i)?, gf.get(j, j)?, gf.get(k, k)?, gf.get(l, l)?];
                Ok(
                    Vertex4::new(chi4, legs)
                        .with_direct(gf.get(i, k)?, gf.get(j, l)?)
                        .with_exchange(gf.get(i, l)?, gf.get(j, k)?)
                )
            })
            .collect::<EdResult<_>>()?;
        Ok(Self { chi, vertices })
    }

    pub fn len(&self) -> usize { self.chi.len() }

    pub fn is_empty(&self) -> bool { self.chi.is_empty() }

    pub fn indices(&self) -> impl Iterator<Item = [usize; 4]> + '_ {
        self.chi.indices()
    }

    pub fn value(&self, q: [usize; 4], n1: i64, n2: i64, n3: i64)
        -> EdResult<C64>
    {
        let (id, g) = self.chi.element(q)?;
        let (m1, m2, m3) = g.frequencies((n1, n2, n3));
        let gamma = self.vertices.get(id)
            .ok_or_else(|| EdError::MissingElement(format!("orbit {}", id)))?;
        Ok(g.sign() * gamma.value(m1, m2, m3))
    }

    /// `Γ(n1, n2; n3)` on the cube `-n_freq ≤ n < n_freq` for one quadruple.
    pub fn matsubara_cube(&self, q: [usize; 4], n_freq: usize)
        -> EdResult<nd::Array3<C64>>
    {
        let n = 2 * n_freq;
        let off = n_freq as i64;
        let mut cube: nd::Array3<C64> = nd::Array3::zeros((n, n, n));
        for ((a, b, c), x) in cube.indexed_iter_mut() {
            *x = self.value(q, a as i64 - off, b as i64 - off, c as i64 - off)?;
        }
        Ok(cube)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dispatch::local::LocalComm,
        greens::{
            gf::GfTerm,
            two_particle::{ NonResonantTerm, ResonantTerm },
        },
        io::load_pom,
        lattice::Lattice,
        symmetrizer::{ Symmetrizer, default_candidates },
    };

    #[test]
    fn canonical_orbits() {
        assert_eq!(Exchange::canonical([0, 1, 2, 3]), (Exchange::Identity, [0, 1, 2, 3]));
        assert_eq!(
            Exchange::canonical([1, 0, 3, 2]),
            (Exchange::SwapBoth, [0, 1, 2, 3]),
        );
        assert_eq!(
            Exchange::canonical([1, 0, 2, 3]),
            (Exchange::SwapAnnihilators, [0, 1, 2, 3]),
        );
        assert_eq!(Exchange::canonical([2, 2, 2, 2]), (Exchange::Identity, [2, 2, 2, 2]));
        // annihilator and creator pairs never trade places
        assert_ne!(Exchange::canonical([2, 3, 0, 1]).1, [0, 1, 2, 3]);
        assert!(Exchange::ALL.iter().all(|g| g.indices([0, 1, 2, 3]) != [2, 3, 0, 1]));
        for g in Exchange::ALL {
            let q = [3, 1, 4, 0];
            assert_eq!(g.indices(g.indices(q)), q);
            assert_eq!(g.frequencies(g.frequencies((2, -1, 5))), (2, -1, 5));
        }
    }

    #[test]
    fn exchange_symmetry_of_dimer() {
        let beta = 3.0;
        let mut lat = Lattice::new();
        lat.add_site("A", 1, 2).unwrap();
        lat.add_site("B", 1, 2).unwrap();
        lat.add_coulomb_s("A", 1.5, -0.6).unwrap();
        lat.add_coulomb_s("B", 1.5, -0.9).unwrap();
        lat.add_hopping("A", 0, "B", 0, -0.4).unwrap();
        let index = lat.index_info().unwrap();
        let op = lat.hamiltonian(&index).unwrap();
        let mut sym = Symmetrizer::new(&index, &op).unwrap();
        sym.compute(default_candidates(&index)).unwrap();
        let states = StatesClassification::compute(&sym).unwrap();
        let mut H: Hamiltonian<f64> = Hamiltonian::prepare(&op, &states).unwrap();
        H.compute().unwrap();
        let mut rho = DensityMatrix::new(&states, &H, beta);
        rho.compute().unwrap();
        let ops = FieldOperatorContainer::compute(&states, &H, 1e-12).unwrap();
        let tol = Tolerances {
            matrix_element: 0.0,
            gf_coefficient: 0.0,
            two_particle: TwoParticleTolerances {
                coefficient: 0.0,
                multi_term_coefficient: 0.0,
                ..TwoParticleTolerances::default()
            },
            ..Tolerances::default()
        };
        let a_up = index.index("A", 0, 1).unwrap();
        let a_dn = index.index("A", 0, 0).unwrap();
        let b_up = index.index("B", 0, 1).unwrap();

        let quads = [
            [a_up, b_up, a_up, b_up],
            [b_up, a_up, a_up, b_up],
            [a_up, b_up, b_up, a_up],
            [b_up, a_up, b_up, a_up],
            [a_up, a_dn, a_up, a_dn],
        ];
        let mut chi = TwoParticleGfContainer::new(&ops, &rho, tol.two_particle);
        chi.prepare(quads).unwrap();
        assert_eq!(chi.len(), 5);
        assert_eq!(chi.num_representatives(), 2);
        let comm = LocalComm::world(1).pop().unwrap();
        chi.compute(&comm).unwrap();

        // a directly computed non-representative agrees with the container
        let [i, j, k, l] = quads[3];
        let mut direct = TwoParticleGf::new(
            ops.c(i).unwrap(),
            ops.c(j).unwrap(),
            ops.c_dag(k).unwrap(),
            ops.c_dag(l).unwrap(),
            &rho,
            tol.two_particle,
        );
        direct.compute_serial().unwrap();
        for (n1, n2, n3) in [(0, 0, 0), (1, -2, 0), (2, 1, -1)] {
            let x = chi.value(quads[3], n1, n2, n3).unwrap();
            assert!((x - direct.value(n1, n2, n3)).norm() < 1e-10);
            let y = chi.value(quads[1], n2, n1, n3).unwrap();
            assert!((y + chi.value(quads[0], n1, n2, n3).unwrap()).norm() < 1e-12);
        }
        assert!(matches!(
            chi.value([a_dn, a_dn, a_dn, b_up], 0, 0, 0),
            Err(EdError::MissingElement(_)),
        ));

        let mut gf = GfContainer::new(&ops, &rho, tol);
        gf.prepare([(a_up, a_up)]).unwrap();
        gf.compute().unwrap();
        assert!(matches!(
            Vertex4Container::new(&chi, &gf),
            Err(EdError::MissingElement(_)),
        ));
        gf.prepare(chi.required_gf_pairs()).unwrap();
        gf.compute().unwrap();
        let gamma = Vertex4Container::new(&chi, &gf).unwrap();
        let x = gamma.value(quads[0], 1, 0, 1).unwrap();
        let y = gamma.value(quads[1], 0, 1, 1).unwrap();
        assert!((x + y).norm() < 1e-10 * x.norm().max(1.0));
        assert_eq!(gf.matsubara_table(4).dim(), (gf.len(), 4));

        let dir = std::env::temp_dir()
            .join(format!("lehmann-ed-container-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        assert_eq!(chi.save_pom(&dir).unwrap(), 4);
        assert_eq!(gf.save_pom(&dir).unwrap(), gf.len());
        for ([i, j, k, l], rep) in chi.representatives() {
            let stem = format!("chi4_{}_{}_{}_{}", i, j, k, l);
            let nr: Vec<NonResonantTerm>
                = load_pom(dir.join(format!("{}_nr.pom", stem))).unwrap();
            let res: Vec<ResonantTerm>
                = load_pom(dir.join(format!("{}_res.pom", stem))).unwrap();
            assert!(nr.iter().eq(rep.non_resonant_terms()));
            assert!(res.iter().eq(rep.resonant_terms()));
            assert!(!nr.is_empty());
        }
        let G: Vec<GfTerm>
            = load_pom(dir.join(format!("gf_{}_{}.pom", a_up, a_up))).unwrap();
        assert!(G.iter().eq(gf.get(a_up, a_up).unwrap().terms()));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}

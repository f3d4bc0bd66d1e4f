//! Amputated connected two-particle vertex.

use std::cell::RefCell;
use num_complex::Complex64 as C64;
use rustc_hash::FxHashMap as HashMap;
use crate::linalg::Elem;
use super::{ gf::GreensFunction, two_particle::TwoParticleGf };

/// ```text
/// Γ_ijkl(n1, n2; n3)
///     = [χ_ijkl + β δ(n1, n3) G_ik(n1) G_jl(n2) - β δ(n2, n3) G_il(n1) G_jk(n2)]
///       / (G_ii(n1) G_jj(n2) G_kk(n3) G_ll(n4))
/// ```
///
/// Off-diagonal Green's functions passed as `None` are taken to vanish.
/// Both the vertex and the inverse legs are cached on first request.
#[derive(Debug)]
pub struct Vertex4<'c, 'a, T>
where T: Elem
{
    chi: &'c TwoParticleGf<'a, T>,
    legs: [&'c GreensFunction<'a, T>; 4],
    g_ik: Option<&'c GreensFunction<'a, T>>,
    g_jl: Option<&'c GreensFunction<'a, T>>,
    g_il: Option<&'c GreensFunction<'a, T>>,
    g_jk: Option<&'c GreensFunction<'a, T>>,
    cache: RefCell<HashMap<(i64, i64, i64), C64>>,
    inverse: RefCell<HashMap<(usize, i64), C64>>,
}

impl<'c, 'a, T> Vertex4<'c, 'a, T>
where T: Elem
{
    /// Set up `Γ_ijkl` from `χ_ijkl` and the diagonal legs
    /// `[G_ii, G_jj, G_kk, G_ll]`.
    pub fn new(
        chi: &'c TwoParticleGf<'a, T>,
        legs: [&'c GreensFunction<'a, T>; 4],
    ) -> Self
    {
        Self {
            chi,
            legs,
            g_ik: None,
            g_jl: None,
            g_il: None,
            g_jk: None,
            cache: RefCell::new(HashMap::default()),
            inverse: RefCell::new(HashMap::default()),
        }
    }

    /// Supply `G_ik` and `G_jl` for the `n1 = n3` subtraction.
    pub fn with_direct(
        mut self,
        g_ik: &'c GreensFunction<'a, T>,
        g_jl: &'c GreensFunction<'a, T>,
    ) -> Self
    {
        self.g_ik = Some(g_ik);
        self.g_jl = Some(g_jl);
        self
    }

    /// Supply `G_il` and `G_jk` for the `n2 = n3` subtraction.
    pub fn with_exchange(
        mut self,
        g_il: &'c GreensFunction<'a, T>,
        g_jk: &'c GreensFunction<'a, T>,
    ) -> Self
    {
        self.g_il = Some(g_il);
        self.g_jk = Some(g_jk);
        self
    }

    pub fn beta(&self) -> f64 { self.chi.beta() }

    /// `1 / G(n)` on leg `k`.
    fn inverse_leg(&self, k: usize, n: i64) -> C64 {
        if let Some(x) = self.inverse.borrow().get(&(k, n)) { return *x; }
        let x = self.legs[k].matsubara(n).inv();
        self.inverse.borrow_mut().insert((k, n), x);
        x
    }

    fn product(
        a: Option<&GreensFunction<'a, T>>,
        b: Option<&GreensFunction<'a, T>>,
        n1: i64,
        n2: i64,
    ) -> C64
    {
        match (a, b) {
            (Some(a), Some(b)) => a.matsubara(n1) * b.matsubara(n2),
            _ => C64::from(0.0),
        }
    }

    /// Connected part `χ + β δ(n1, n3) G_ik G_jl - β δ(n2, n3) G_il G_jk`
    /// before amputation.
    pub fn connected(&self, n1: i64, n2: i64, n3: i64) -> C64 {
        let beta = self.beta();
        let mut v = self.chi.value(n1, n2, n3);
        if n1 == n3 { v += beta * Self::product(self.g_ik, self.g_jl, n1, n2); }
        if n2 == n3 { v -= beta * Self::product(self.g_il, self.g_jk, n1, n2); }
        v
    }

    /// Evaluate at fermionic Matsubara indices `(n1, n2, n3)`.
    pub fn value(&self, n1: i64, n2: i64, n3: i64) -> C64 {
        if let Some(v) = self.cache.borrow().get(&(n1, n2, n3)) { return *v; }
        let n4 = n1 + n2 - n3;
        let v
            = self.connected(n1, n2, n3)
            * self.inverse_leg(0, n1)
            * self.inverse_leg(1, n2)
            * self.inverse_leg(2, n3)
            * self.inverse_leg(3, n4);
        self.cache.borrow_mut().insert((n1, n2, n3), v);
        v
    }

    pub fn cache_len(&self) -> usize { self.cache.borrow().len() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{ Tolerances, TwoParticleTolerances },
        density::DensityMatrix,
        field_op::FieldOperatorContainer,
        hamiltonian::Hamiltonian,
        lattice::Lattice,
        states::StatesClassification,
        symmetrizer::{ Symmetrizer, default_candidates },
    };

    #[test]
    fn free_vertex_vanishes() {
        let beta = 5.0;
        let mut lat = Lattice::new();
        lat.add_site("A", 1, 2).unwrap();
        lat.add_level("A", 0.2).unwrap();
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
            two_particle: TwoParticleTolerances {
                coefficient: 0.0,
                multi_term_coefficient: 0.0,
                ..TwoParticleTolerances::default()
            },
            ..Tolerances::default()
        };
        let up = index.index("A", 0, 1).unwrap();
        let mut g = GreensFunction::new(
            ops.c(up).unwrap(), ops.c_dag(up).unwrap(), &rho, tol);
        g.compute().unwrap();
        let mut chi = TwoParticleGf::new(
            ops.c(up).unwrap(),
            ops.c(up).unwrap(),
            ops.c_dag(up).unwrap(),
            ops.c_dag(up).unwrap(),
            &rho,
            tol.two_particle,
        );
        chi.compute_serial().unwrap();
        let gamma = Vertex4::new(&chi, [&g; 4])
            .with_direct(&g, &g)
            .with_exchange(&g, &g);
        for (n1, n2, n3) in [(0, 0, 0), (0, 1, 0), (1, 0, 0), (2, -1, 3)] {
            assert!(gamma.connected(n1, n2, n3).norm() < 1e-10);
            assert!(gamma.value(n1, n2, n3).norm() < 1e-8);
        }
        assert_eq!(gamma.cache_len(), 4);
    }
}

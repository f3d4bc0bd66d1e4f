//! Lattice descriptions: sites, raw Hamiltonian terms, and common presets.
//!
//! A [`Lattice`] is an ordered collection of [`Site`]s together with a list of
//! [`LatticeTerm`]s, each a scalar times a product of ladder operators labeled
//! by `(site, orbital, spin)`. Presets expand into ordinary terms; nothing
//! downstream distinguishes them from hand-written ones.

use indexmap::IndexMap;
use num_complex::Complex64 as C64;
use serde::Deserialize;
use crate::{
    error::{ EdError, EdResult },
    hilbert::HSpin,
    index::{ IndexInfo, Site },
    operator::{ Ladder, Operator },
};

/// A single ladder operator labeled by its physical mode.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Factor {
    pub site: String,
    pub orbital: usize,
    pub spin: usize,
    pub dagger: bool,
}

impl Factor {
    pub fn create(site: &str, orbital: usize, spin: usize) -> Self {
        Self { site: site.to_string(), orbital, spin, dagger: true }
    }

    pub fn annihilate(site: &str, orbital: usize, spin: usize) -> Self {
        Self { site: site.to_string(), orbital, spin, dagger: false }
    }
}

/// A scalar times a product of [`Factor`]s.
#[derive(Clone, Debug, PartialEq)]
pub struct LatticeTerm {
    pub value: C64,
    pub factors: Vec<Factor>,
}

/// A collection of sites and Hamiltonian terms.
#[derive(Clone, Debug, Default)]
pub struct Lattice {
    sites: IndexMap<String, Site>,
    terms: Vec<LatticeTerm>,
}

impl Lattice {
    /// Create a new, empty lattice.
    pub fn new() -> Self { Self::default() }

    /// Declare a new site.
    pub fn add_site(&mut self, label: &str, orbitals: usize, spins: usize)
        -> EdResult<&mut Self>
    {
        if self.sites.contains_key(label) {
            return Err(EdError::Site(format!("duplicate site {:?}", label)));
        }
        self.sites.insert(label.to_string(), Site::new(label, orbitals, spins));
        Ok(self)
    }

    /// Return the declared site with a given label.
    pub fn site(&self, label: &str) -> EdResult<&Site> {
        self.sites.get(label)
            .ok_or_else(|| EdError::Site(format!("unknown site {:?}", label)))
    }

    /// Iterate over all declared sites in declaration order.
    pub fn sites(&self) -> impl Iterator<Item = &Site> + '_ {
        self.sites.values()
    }

    /// Return all terms added so far.
    pub fn terms(&self) -> &[LatticeTerm] { &self.terms }

    /// Add a raw term.
    ///
    /// Every factor must refer to a declared site and to an orbital and spin
    /// component within its range.
    pub fn add_term<C>(&mut self, value: C, factors: Vec<Factor>)
        -> EdResult<&mut Self>
    where C: Into<C64>
    {
        for f in factors.iter() {
            let site = self.site(&f.site)?;
            if f.orbital >= site.orbitals || f.spin >= site.spins {
                return Err(EdError::UnknownMode {
                    site: f.site.clone(),
                    orbital: f.orbital,
                    spin: f.spin,
                });
            }
        }
        self.terms.push(LatticeTerm { value: value.into(), factors });
        Ok(self)
    }

    fn spin_half_site(&self, label: &str) -> EdResult<&Site> {
        let site = self.site(label)?;
        if site.spins != 2 {
            return Err(EdError::Site(
                format!("site {:?} does not carry spin-1/2 modes", label)));
        }
        Ok(site)
    }

    fn add_density<C>(
        &mut self,
        value: C,
        a: (&str, usize, usize),
        b: (&str, usize, usize),
    ) -> EdResult<&mut Self>
    where C: Into<C64>
    {
        self.add_term(
            value,
            vec![
                Factor::create(a.0, a.1, a.2),
                Factor::annihilate(a.0, a.1, a.2),
                Factor::create(b.0, b.1, b.2),
                Factor::annihilate(b.0, b.1, b.2),
            ],
        )
    }

    /// Add an on-site energy `ε Σ n` over every mode of a site.
    pub fn add_level(&mut self, label: &str, level: f64)
        -> EdResult<&mut Self>
    {
        let site = self.site(label)?.clone();
        for spin in 0..site.spins {
            for orbital in 0..site.orbitals {
                self.add_term(
                    level,
                    vec![
                        Factor::create(label, orbital, spin),
                        Factor::annihilate(label, orbital, spin),
                    ],
                )?;
            }
        }
        Ok(self)
    }

    /// Add a spin-diagonal hopping `t c†_a c_b + t* c†_b c_a` between two
    /// orbitals, for every spin component the two sites share.
    pub fn add_hopping<C>(
        &mut self,
        a: &str,
        orbital_a: usize,
        b: &str,
        orbital_b: usize,
        t: C,
    ) -> EdResult<&mut Self>
    where C: Into<C64>
    {
        let t: C64 = t.into();
        let spins = self.site(a)?.spins.min(self.site(b)?.spins);
        for spin in 0..spins {
            self.add_term(
                t,
                vec![
                    Factor::create(a, orbital_a, spin),
                    Factor::annihilate(b, orbital_b, spin),
                ],
            )?;
            self.add_term(
                t.conj(),
                vec![
                    Factor::create(b, orbital_b, spin),
                    Factor::annihilate(a, orbital_a, spin),
                ],
            )?;
        }
        Ok(self)
    }

    /// Add a single-orbital Hubbard interaction `U n↑ n↓ + ε (n↑ + n↓)` on
    /// orbital 0 of a spin-1/2 site.
    pub fn add_coulomb_s(&mut self, label: &str, u: f64, level: f64)
        -> EdResult<&mut Self>
    {
        self.spin_half_site(label)?;
        let up = HSpin::Up.index();
        let dn = HSpin::Dn.index();
        self.add_density(u, (label, 0, up), (label, 0, dn))?;
        for spin in [dn, up] {
            self.add_term(
                level,
                vec![
                    Factor::create(label, 0, spin),
                    Factor::annihilate(label, 0, spin),
                ],
            )?;
        }
        Ok(self)
    }

    /// Add a Kanamori interaction over all orbitals of a spin-1/2 site:
    /// ```text
    /// U Σ_o n_o↑ n_o↓
    ///   + U' Σ_{o≠o'} n_o↑ n_o'↓
    ///   + (U' - J) Σ_{o<o',σ} n_oσ n_o'σ
    ///   - J Σ_{o≠o'} c†_o↑ c_o↓ c†_o'↓ c_o'↑
    ///   + J Σ_{o≠o'} c†_o↑ c†_o↓ c_o'↓ c_o'↑
    ///   + ε Σ n
    /// ```
    pub fn add_coulomb_p(
        &mut self,
        label: &str,
        u: f64,
        u_prime: f64,
        j: f64,
        level: f64,
    ) -> EdResult<&mut Self>
    {
        let orbitals = self.spin_half_site(label)?.orbitals;
        let up = HSpin::Up.index();
        let dn = HSpin::Dn.index();
        for o in 0..orbitals {
            self.add_density(u, (label, o, up), (label, o, dn))?;
        }
        for o in 0..orbitals {
            for p in 0..orbitals {
                if o == p { continue; }
                self.add_density(u_prime, (label, o, up), (label, p, dn))?;
                if o < p {
                    for spin in [dn, up] {
                        self.add_density(
                            u_prime - j, (label, o, spin), (label, p, spin))?;
                    }
                }
                self.add_term(
                    -j,
                    vec![
                        Factor::create(label, o, up),
                        Factor::annihilate(label, o, dn),
                        Factor::create(label, p, dn),
                        Factor::annihilate(label, p, up),
                    ],
                )?;
                self.add_term(
                    j,
                    vec![
                        Factor::create(label, o, up),
                        Factor::create(label, o, dn),
                        Factor::annihilate(label, p, dn),
                        Factor::annihilate(label, p, up),
                    ],
                )?;
            }
        }
        self.add_level(label, level)
    }

    /// Add a Zeeman term `-h Σ_o (n_o↑ - n_o↓)` on a spin-1/2 site.
    pub fn add_magnetization(&mut self, label: &str, h: f64)
        -> EdResult<&mut Self>
    {
        let orbitals = self.spin_half_site(label)?.orbitals;
        for o in 0..orbitals {
            for spin in [HSpin::Dn, HSpin::Up] {
                self.add_term(
                    -h * 2.0 * spin.sz(),
                    vec![
                        Factor::create(label, o, spin.index()),
                        Factor::annihilate(label, o, spin.index()),
                    ],
                )?;
            }
        }
        Ok(self)
    }

    /// Build the mode index map for the declared sites.
    pub fn index_info(&self) -> EdResult<IndexInfo> {
        IndexInfo::new(self.sites.values())
    }

    /// Assemble the Hamiltonian as a symbolic operator.
    pub fn hamiltonian(&self, index: &IndexInfo) -> EdResult<Operator> {
        let mut products: Vec<(Vec<Ladder>, C64)>
            = Vec::with_capacity(self.terms.len());
        for term in self.terms.iter() {
            let ops: Vec<Ladder>
                = term.factors.iter()
                .map(|f| {
                    index.index(&f.site, f.orbital, f.spin)
                        .map(|p| Ladder { dagger: f.dagger, mode: p })
                })
                .collect::<EdResult<Vec<Ladder>>>()?;
            products.push((ops, term.value));
        }
        Ok(Operator::from_products(products))
    }
}

//! Run and model parameters, loadable from TOML.
//!
//! ```toml
//! [run]
//! beta = 10.0
//! n_fermionic = 64
//! calc_gf = true
//!
//! [run.tolerances]
//! matrix_element = 1e-8
//!
//! [[model.sites]]
//! label = "A"
//! orbitals = 1
//! spins = 2
//!
//! [[model.coulomb]]
//! site = "A"
//! u = 1.0
//! level = -0.5
//!
//! [[model.terms]]
//! value = [0.0, 0.1]
//! factors = [
//!     { site = "A", orbital = 0, spin = 1, dagger = true },
//!     { site = "A", orbital = 0, spin = 0, dagger = false },
//! ]
//! ```

use std::path::{ Path, PathBuf };
use log::info;
use num_complex::Complex64 as C64;
use serde::Deserialize;
use crate::{
    error::{ EdError, EdResult },
    lattice::{ Factor, Lattice },
    term_list::DEFAULT_REDUCE_THRESHOLD,
};

/// Tolerances of the two-particle Green's function.
#[derive(Copy, Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct TwoParticleTolerances {
    /// Pole-merging tolerance.
    pub reduce_resonance: f64,
    /// Absolute floor below which a residue is discarded on insertion.
    pub coefficient: f64,
    /// Pruning tolerance relative to the number of terms.
    pub multi_term_coefficient: f64,
    /// Number of insertions between two pruning sweeps.
    pub reduce_invocation_threshold: usize,
}

impl Default for TwoParticleTolerances {
    fn default() -> Self {
        Self {
            reduce_resonance: 1e-8,
            coefficient: 1e-16,
            multi_term_coefficient: 1e-5,
            reduce_invocation_threshold: DEFAULT_REDUCE_THRESHOLD,
        }
    }
}

/// Numerical tolerances of a calculation.
#[derive(Copy, Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct Tolerances {
    /// Matrix elements of field operators below this are dropped.
    pub matrix_element: f64,
    /// Pole-merging tolerance of one-particle term lists.
    pub gf_reduce_resonance: f64,
    /// Residue floor of one-particle term lists.
    pub gf_coefficient: f64,
    pub two_particle: TwoParticleTolerances,
    /// Blocks whose largest Boltzmann weight falls below this are skipped;
    /// zero keeps every block.
    pub density_truncation: f64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            matrix_element: 1e-8,
            gf_reduce_resonance: 1e-8,
            gf_coefficient: 1e-8,
            two_particle: TwoParticleTolerances::default(),
            density_truncation: 0.0,
        }
    }
}

impl Tolerances {
    fn validate(&self) -> EdResult<()> {
        let named = [
            ("matrix_element", self.matrix_element),
            ("gf_reduce_resonance", self.gf_reduce_resonance),
            ("gf_coefficient", self.gf_coefficient),
            ("two_particle.reduce_resonance", self.two_particle.reduce_resonance),
            ("two_particle.coefficient", self.two_particle.coefficient),
            ("two_particle.multi_term_coefficient",
                self.two_particle.multi_term_coefficient),
            ("density_truncation", self.density_truncation),
        ];
        if let Some((name, x)) = named.iter()
            .find(|(_, x)| !x.is_finite() || *x < 0.0)
        {
            return Err(EdError::Config(
                format!("tolerance {} must be non-negative, got {}", name, x)));
        }
        if self.two_particle.reduce_invocation_threshold == 0 {
            return Err(EdError::Config(
                "two_particle.reduce_invocation_threshold must be positive"
                    .to_string()));
        }
        Ok(())
    }
}

fn default_output() -> PathBuf { PathBuf::from("ed.npz") }

/// Parameters of a single run.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct RunConfig {
    /// Inverse temperature.
    pub beta: f64,
    /// Number of positive fermionic Matsubara frequencies.
    #[serde(default)]
    pub n_fermionic: usize,
    /// Number of non-negative bosonic Matsubara frequencies.
    #[serde(default)]
    pub n_bosonic: usize,
    #[serde(default)]
    pub calc_gf: bool,
    #[serde(default)]
    pub calc_2pgf: bool,
    #[serde(default = "default_output")]
    pub output: PathBuf,
    #[serde(default)]
    pub tolerances: Tolerances,
    /// Mode pairs `(i, j)` for `G_ij`; all diagonal pairs if absent.
    #[serde(default)]
    pub gf_pairs: Option<Vec<[usize; 2]>>,
    /// Quadratic-operator pairs `((i, j), (k, l))` for the susceptibility of
    /// `c†_i c_j` and `c†_k c_l`.
    #[serde(default)]
    pub susceptibilities: Vec<[usize; 4]>,
    /// Subtract `⟨A⟩⟨B⟩` from every susceptibility.
    #[serde(default)]
    pub subtract_disconnected: bool,
    /// Mode quadruples `(i, j, k, l)` for the two-particle Green's function
    /// and vertex; all `(i, i, i, i)` if absent.
    #[serde(default)]
    pub two_particle_indices: Option<Vec<[usize; 4]>>,
}

impl RunConfig {
    fn validate(&self) -> EdResult<()> {
        if !self.beta.is_finite() || self.beta <= 0.0 {
            return Err(EdError::Config(
                format!("beta must be positive and finite, got {}", self.beta)));
        }
        self.tolerances.validate()
    }

    /// Mode pairs of the one-particle Green's functions to compute.
    pub fn gf_pairs(&self, n_modes: usize) -> EdResult<Vec<(usize, usize)>> {
        let pairs: Vec<(usize, usize)>
            = match &self.gf_pairs {
                Some(p) => p.iter().map(|[i, j]| (*i, *j)).collect(),
                None => (0..n_modes).map(|p| (p, p)).collect(),
            };
        check_modes(pairs.iter().flat_map(|(i, j)| [*i, *j]), n_modes)?;
        Ok(pairs)
    }

    /// Mode quadruples of the two-particle Green's functions to compute.
    pub fn two_particle_indices(&self, n_modes: usize)
        -> EdResult<Vec<[usize; 4]>>
    {
        let quads: Vec<[usize; 4]>
            = self.two_particle_indices.clone()
            .unwrap_or_else(|| (0..n_modes).map(|p| [p; 4]).collect());
        check_modes(quads.iter().flatten().copied(), n_modes)?;
        Ok(quads)
    }
}

fn check_modes<I>(modes: I, n_modes: usize) -> EdResult<()>
where I: IntoIterator<Item = usize>
{
    match modes.into_iter().find(|p| *p >= n_modes) {
        Some(p) => Err(EdError::ModeOutOfRange(p, n_modes)),
        None => Ok(()),
    }
}

/* Model **********************************************************************/

/// A term coefficient, written either as a number or as `[re, im]`.
#[derive(Copy, Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Coefficient {
    Real(f64),
    Complex([f64; 2]),
}

impl From<Coefficient> for C64 {
    fn from(c: Coefficient) -> Self {
        match c {
            Coefficient::Real(x) => C64::from(x),
            Coefficient::Complex([re, im]) => C64::new(re, im),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct SiteConfig {
    pub label: String,
    #[serde(default = "one")]
    pub orbitals: usize,
    #[serde(default = "two")]
    pub spins: usize,
}

fn one() -> usize { 1 }
fn two() -> usize { 2 }

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct TermConfig {
    pub value: Coefficient,
    pub factors: Vec<Factor>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct HoppingConfig {
    pub a: String,
    #[serde(default)]
    pub orbital_a: usize,
    pub b: String,
    #[serde(default)]
    pub orbital_b: usize,
    pub t: Coefficient,
}

/// On-site interaction. With `u_prime` and `j` absent this is the
/// single-orbital Hubbard term; otherwise the multi-orbital Kanamori form.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct CoulombConfig {
    pub site: String,
    pub u: f64,
    #[serde(default)]
    pub u_prime: Option<f64>,
    #[serde(default)]
    pub j: Option<f64>,
    #[serde(default)]
    pub level: f64,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct LevelConfig {
    pub site: String,
    pub level: f64,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct MagnetizationConfig {
    pub site: String,
    pub h: f64,
}

/// Sites and Hamiltonian terms.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub sites: Vec<SiteConfig>,
    pub terms: Vec<TermConfig>,
    pub hopping: Vec<HoppingConfig>,
    pub coulomb: Vec<CoulombConfig>,
    pub level: Vec<LevelConfig>,
    pub magnetization: Vec<MagnetizationConfig>,
}

impl ModelConfig {
    /// Expand every site, term, and preset into a [`Lattice`].
    pub fn lattice(&self) -> EdResult<Lattice> {
        let mut lat = Lattice::new();
        for site in self.sites.iter() {
            lat.add_site(&site.label, site.orbitals, site.spins)?;
        }
        for term in self.terms.iter() {
            lat.add_term(term.value, term.factors.clone())?;
        }
        for hop in self.hopping.iter() {
            lat.add_hopping(&hop.a, hop.orbital_a, &hop.b, hop.orbital_b, hop.t)?;
        }
        for c in self.coulomb.iter() {
            match (c.u_prime, c.j) {
                (None, None) => { lat.add_coulomb_s(&c.site, c.u, c.level)?; },
                (u_prime, j) => {
                    let j = j.unwrap_or(0.0);
                    let u_prime = u_prime.unwrap_or(c.u - 2.0 * j);
                    lat.add_coulomb_p(&c.site, c.u, u_prime, j, c.level)?;
                },
            }
        }
        for l in self.level.iter() {
            lat.add_level(&l.site, l.level)?;
        }
        for m in self.magnetization.iter() {
            lat.add_magnetization(&m.site, m.h)?;
        }
        info!(
            "model: {} sites, {} terms",
            lat.sites().count(), lat.terms().len(),
        );
        Ok(lat)
    }
}

/// Complete input of a calculation.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Config {
    pub run: RunConfig,
    pub model: ModelConfig,
}

impl Config {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> EdResult<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a TOML file.
    pub fn load<P>(path: P) -> EdResult<Self>
    where P: AsRef<Path>
    {
        let s = std::fs::read_to_string(path.as_ref())?;
        info!("loaded configuration from {}", path.as_ref().display());
        Self::from_toml_str(&s)
    }

    fn validate(&self) -> EdResult<()> {
        self.run.validate()?;
        if self.model.sites.is_empty() {
            return Err(EdError::Config("model declares no sites".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HUBBARD_DIMER: &str = r#"
        [run]
        beta = 10.0
        n_fermionic = 16
        calc_gf = true
        gf_pairs = [[0, 0], [0, 2]]

        [run.tolerances]
        matrix_element = 1e-10

        [run.tolerances.two_particle]
        reduce_invocation_threshold = 500

        [[model.sites]]
        label = "A"

        [[model.sites]]
        label = "B"

        [[model.coulomb]]
        site = "A"
        u = 1.0
        level = -0.5

        [[model.coulomb]]
        site = "B"
        u = 1.0
        level = -0.5

        [[model.hopping]]
        a = "A"
        b = "B"
        t = -1

        [[model.terms]]
        value = [0.0, 0.25]
        factors = [
            { site = "A", orbital = 0, spin = 1, dagger = true },
            { site = "A", orbital = 0, spin = 0, dagger = false },
        ]
    "#;

    #[test]
    fn parses_with_defaults() {
        let config = Config::from_toml_str(HUBBARD_DIMER).unwrap();
        let tol = config.run.tolerances;
        assert_eq!(tol.matrix_element, 1e-10);
        assert_eq!(tol.gf_coefficient, 1e-8);
        assert_eq!(tol.two_particle.coefficient, 1e-16);
        assert_eq!(tol.two_particle.reduce_invocation_threshold, 500);
        assert_eq!(config.run.n_bosonic, 0);
        assert!(!config.run.calc_2pgf);
        assert_eq!(config.run.output, PathBuf::from("ed.npz"));
        assert_eq!(config.model.sites[1].spins, 2);
        assert_eq!(config.model.hopping[0].t, Coefficient::Real(-1.0));
        assert_eq!(
            C64::from(config.model.terms[0].value), C64::new(0.0, 0.25));
        assert_eq!(config.run.gf_pairs(4).unwrap(), vec![(0, 0), (0, 2)]);
        assert!(config.run.gf_pairs(2).is_err());
        assert_eq!(
            config.run.two_particle_indices(2).unwrap(),
            vec![[0; 4], [1; 4]],
        );
    }

    #[test]
    fn builds_lattice() {
        let config = Config::from_toml_str(HUBBARD_DIMER).unwrap();
        let lat = config.model.lattice().unwrap();
        let index = lat.index_info().unwrap();
        assert_eq!(index.num_modes(), 4);
        let H = lat.hamiltonian(&index).unwrap();
        assert!(!H.is_hermitian());
        assert!(!H.is_real());
    }

    #[test]
    fn rejects_bad_input() {
        let bad_beta = HUBBARD_DIMER.replace("beta = 10.0", "beta = -1.0");
        assert!(matches!(
            Config::from_toml_str(&bad_beta), Err(EdError::Config(_))));
        let bad_tol = HUBBARD_DIMER
            .replace("matrix_element = 1e-10", "matrix_element = -1e-10");
        assert!(matches!(
            Config::from_toml_str(&bad_tol), Err(EdError::Config(_))));
        assert!(matches!(
            Config::from_toml_str("[run]\nbeta = 1.0\n[model]\n"),
            Err(EdError::Config(_)),
        ));
        assert!(matches!(
            Config::from_toml_str("[run]\n"), Err(EdError::Toml(_))));
        let unknown_site = HUBBARD_DIMER.replace("b = \"B\"", "b = \"C\"");
        let config = Config::from_toml_str(&unknown_site).unwrap();
        assert!(matches!(config.model.lattice(), Err(EdError::Site(_))));
    }
}

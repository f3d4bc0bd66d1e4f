//! Bijection between physical mode labels and integer mode indices.

use indexmap::IndexMap;
use rustc_hash::FxHashMap as HashMap;
use crate::{
    error::{ EdError, EdResult },
    hilbert::HSpin,
};

/// A site on the lattice with a number of orbitals and spin components.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Site {
    pub label: String,
    pub orbitals: usize,
    pub spins: usize,
}

impl Site {
    pub fn new(label: &str, orbitals: usize, spins: usize) -> Self {
        Self { label: label.to_string(), orbitals, spins }
    }

    /// Number of modes carried by the site.
    pub fn num_modes(&self) -> usize { self.orbitals * self.spins }
}

/// Physical label of a single mode.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ModeInfo {
    pub site: String,
    pub orbital: usize,
    pub spin: usize,
}

impl ModeInfo {
    /// Return the spin-1/2 label of the mode, if it has one.
    pub fn hspin(&self) -> Option<HSpin> { HSpin::from_index(self.spin) }
}

/// Fixed, ordered mapping between `(site, orbital, spin)` triples and mode
/// indices `0..N`.
///
/// Indices are assigned site by site in declaration order; within a site, spin
/// varies slowest and orbital fastest.
#[derive(Clone, Debug, Default)]
pub struct IndexInfo {
    modes: Vec<ModeInfo>,
    lookup: HashMap<(String, usize, usize), usize>,
    sites: IndexMap<String, Site>,
}

impl IndexInfo {
    /// Build the index map for a collection of sites.
    pub fn new<'a, I>(sites: I) -> EdResult<Self>
    where I: IntoIterator<Item = &'a Site>
    {
        let mut index = Self::default();
        for site in sites.into_iter() {
            if index.sites.contains_key(&site.label) {
                return Err(EdError::Site(
                    format!("duplicate site label {:?}", site.label)));
            }
            for spin in 0..site.spins {
                for orbital in 0..site.orbitals {
                    let k = index.modes.len();
                    index.lookup.insert((site.label.clone(), orbital, spin), k);
                    index.modes.push(
                        ModeInfo { site: site.label.clone(), orbital, spin });
                }
            }
            index.sites.insert(site.label.clone(), site.clone());
        }
        Ok(index)
    }

    /// Total number of modes `N`.
    pub fn num_modes(&self) -> usize { self.modes.len() }

    /// Return the mode index of a `(site, orbital, spin)` triple.
    pub fn index(&self, site: &str, orbital: usize, spin: usize)
        -> EdResult<usize>
    {
        self.lookup.get(&(site.to_string(), orbital, spin))
            .copied()
            .ok_or_else(|| EdError::UnknownMode {
                site: site.to_string(),
                orbital,
                spin,
            })
    }

    /// Return the label of a mode index.
    pub fn info(&self, index: usize) -> EdResult<&ModeInfo> {
        self.modes.get(index)
            .ok_or(EdError::ModeOutOfRange(index, self.modes.len()))
    }

    /// Iterate over all mode labels in index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &ModeInfo)> + '_ {
        self.modes.iter().enumerate()
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bijection() {
        let sites = [Site::new("A", 2, 2), Site::new("B", 1, 2)];
        let index = IndexInfo::new(&sites).unwrap();
        assert_eq!(index.num_modes(), 6);
        for (k, info) in index.iter() {
            assert_eq!(
                index.index(&info.site, info.orbital, info.spin).unwrap(), k);
        }
        assert_eq!(index.index("A", 1, 0).unwrap(), 1);
        assert_eq!(index.index("B", 0, 1).unwrap(), 5);
        assert!(index.index("C", 0, 0).is_err());
        assert!(index.info(6).is_err());
    }

    #[test]
    fn duplicate_site() {
        let sites = [Site::new("A", 1, 2), Site::new("A", 1, 2)];
        assert!(IndexInfo::new(&sites).is_err());
    }
}

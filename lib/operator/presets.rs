//! Commonly used operators.

use num_complex::Complex64 as C64;
use crate::{
    hilbert::HSpin,
    index::IndexInfo,
    operator::{ Ladder, Operator },
};

/// Annihilation operator `c_p`.
pub fn c(p: usize) -> Operator { Operator::annihilate(p) }

/// Creation operator `c†_p`.
pub fn c_dag(p: usize) -> Operator { Operator::create(p) }

/// Number operator `n_p = c†_p c_p`.
pub fn n(p: usize) -> Operator { Operator::number(p) }

/// Quadratic operator `c†_i c_j`.
pub fn c_dag_c(i: usize, j: usize) -> Operator {
    Operator::from_products(
        [(vec![Ladder::create(i), Ladder::annihilate(j)], C64::from(1.0))])
}

/// Total number operator over `n_modes` modes.
pub fn total_number(n_modes: usize) -> Operator {
    (0..n_modes).map(n).sum()
}

/// Spin-projection operator `Sz = (N_up - N_dn) / 2` for an explicit
/// partition of modes into up and down.
pub fn sz<U, D>(up: U, dn: D) -> Operator
where
    U: IntoIterator<Item = usize>,
    D: IntoIterator<Item = usize>,
{
    let up: Operator = up.into_iter().map(|p| &n(p) * 0.5).sum();
    let dn: Operator = dn.into_iter().map(|p| &n(p) * 0.5).sum();
    up - dn
}

/// Spin-projection operator built from the spin labels of an index map.
///
/// Returns `None` if any mode lacks a spin-1/2 label.
pub fn sz_from_index(index: &IndexInfo) -> Option<Operator> {
    let mut up: Vec<usize> = Vec::new();
    let mut dn: Vec<usize> = Vec::new();
    for (k, info) in index.iter() {
        let site = index.site(&info.site).ok()?;
        if site.spins != 2 { return None; }
        match info.hspin()? {
            HSpin::Up => { up.push(k); },
            HSpin::Dn => { dn.push(k); },
        }
    }
    Some(sz(up, dn))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ hilbert::FockState, index::Site };

    #[test]
    fn sz_eigenvalues() {
        let index = IndexInfo::new(&[Site::new("A", 1, 2)]).unwrap();
        let sz = sz_from_index(&index).unwrap();
        let up = index.index("A", 0, 1).unwrap();
        let dn = index.index("A", 0, 0).unwrap();
        assert_eq!(sz.diagonal(FockState::from_modes([up])).re, 0.5);
        assert_eq!(sz.diagonal(FockState::from_modes([dn])).re, -0.5);
        assert_eq!(sz.diagonal(FockState::from_modes([up, dn])).re, 0.0);
    }

    #[test]
    fn no_spin_labels() {
        let index = IndexInfo::new(&[Site::new("A", 1, 3)]).unwrap();
        assert!(sz_from_index(&index).is_none());
    }

    #[test]
    fn total_number_counts() {
        let n = total_number(4);
        assert_eq!(n.diagonal(FockState::from_modes([0, 2, 3])).re, 3.0);
        assert!(n.commutes(&c_dag_c(1, 3)));
        assert!(!n.commutes(&c(2)));
    }
}

//! Definitions to describe Fock states over a fixed set of fermionic modes.

use std::fmt;
use crate::error::{ EdError, EdResult };

/// Largest number of modes for which the full Fock space can be enumerated.
pub const MAX_MODES: usize = 63;

/* Spin labels ****************************************************************/

/// Spin label of a single mode on a spin-1/2 site.
///
/// Component index `0` is spin-down and `1` is spin-up.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HSpin {
    Dn,
    Up,
}

impl HSpin {
    /// Return the spin component index of `self`.
    pub fn index(self) -> usize {
        match self {
            Self::Dn => 0,
            Self::Up => 1,
        }
    }

    /// Convert a spin component index to a label, if the site carries two spin
    /// components.
    pub fn from_index(spin: usize) -> Option<Self> {
        match spin {
            0 => Some(Self::Dn),
            1 => Some(Self::Up),
            _ => None,
        }
    }

    /// Return the spin projection quantum number.
    pub fn sz(self) -> f64 {
        match self {
            Self::Dn => -0.5,
            Self::Up => 0.5,
        }
    }

    /// Return the opposite spin.
    pub fn flipped(self) -> Self {
        match self {
            Self::Dn => Self::Up,
            Self::Up => Self::Dn,
        }
    }
}

/* Fock states ****************************************************************/

/// A single Fock state, stored as a bit pattern over the mode indices.
///
/// Bit `p` is set iff mode `p` is occupied. Ordering is by the underlying
/// integer.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FockState(u64);

impl fmt::Debug for FockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FockState({:#b})", self.0)
    }
}

impl From<u64> for FockState {
    fn from(bits: u64) -> Self { Self(bits) }
}

impl From<FockState> for u64 {
    fn from(state: FockState) -> Self { state.0 }
}

impl FockState {
    /// The state with no occupied modes.
    pub const VACUUM: Self = Self(0);

    /// Create a new Fock state from a bit pattern.
    pub fn new(bits: u64) -> Self { Self(bits) }

    /// Create a Fock state occupying exactly the given modes.
    pub fn from_modes<I>(modes: I) -> Self
    where I: IntoIterator<Item = usize>
    {
        Self(modes.into_iter().fold(0, |acc, p| acc | (1 << p)))
    }

    /// Return the underlying bit pattern.
    pub fn bits(self) -> u64 { self.0 }

    /// Return the bit pattern as an index into a table of all `2^N` states.
    pub fn as_index(self) -> usize { self.0 as usize }

    /// Return `true` if mode `p` is occupied.
    pub fn occupied(self, p: usize) -> bool { self.0 >> p & 1 == 1 }

    /// Return the total number of occupied modes.
    pub fn count(self) -> u32 { self.0.count_ones() }

    /// Return the fermionic sign `(-1)^k` for an operator acting on mode `p`,
    /// where `k` is the number of occupied modes with index below `p`.
    pub fn sign_below(self, p: usize) -> f64 {
        let mask: u64 = (1_u64 << p) - 1;
        if (self.0 & mask).count_ones() % 2 == 0 { 1.0 } else { -1.0 }
    }

    /// Apply an annihilation operator for mode `p`, returning the new state and
    /// the accumulated fermionic sign, or `None` if `p` is unoccupied.
    pub fn annihilate(self, p: usize) -> Option<(Self, f64)> {
        self.occupied(p)
            .then(|| (Self(self.0 & !(1 << p)), self.sign_below(p)))
    }

    /// Apply a creation operator for mode `p`, returning the new state and the
    /// accumulated fermionic sign, or `None` if `p` is already occupied.
    pub fn create(self, p: usize) -> Option<(Self, f64)> {
        (!self.occupied(p))
            .then(|| (Self(self.0 | (1 << p)), self.sign_below(p)))
    }

    /// Iterate over the indices of all occupied modes in ascending order.
    pub fn modes(self) -> impl Iterator<Item = usize> {
        let bits = self.0;
        (0..64).filter(move |p| bits >> p & 1 == 1)
    }
}

/// Check that the full Fock space over `n_modes` can be enumerated and return
/// its dimension.
pub fn fock_dim(n_modes: usize) -> EdResult<usize> {
    (n_modes <= MAX_MODES)
        .then(|| 1_usize << n_modes)
        .ok_or(EdError::TooManyModes(n_modes))
}

/// Enumerate all `2^N` Fock states over `n_modes` modes in ascending order.
pub fn enumerate_states(n_modes: usize)
    -> EdResult<impl Iterator<Item = FockState>>
{
    let dim = fock_dim(n_modes)? as u64;
    Ok((0..dim).map(FockState))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signs_count_lower_modes() {
        let state = FockState::from_modes([0, 2, 3]);
        assert_eq!(state.sign_below(0), 1.0);
        assert_eq!(state.sign_below(1), -1.0);
        assert_eq!(state.sign_below(3), 1.0);
        assert_eq!(state.sign_below(4), -1.0);
    }

    #[test]
    fn ladder_actions() {
        let state = FockState::from_modes([1, 3]);
        assert!(state.annihilate(0).is_none());
        assert!(state.create(1).is_none());
        let (after, sign) = state.annihilate(3).unwrap();
        assert_eq!(after, FockState::from_modes([1]));
        assert_eq!(sign, -1.0);
        let (after, sign) = state.create(2).unwrap();
        assert_eq!(after, FockState::from_modes([1, 2, 3]));
        assert_eq!(sign, -1.0);
    }

    #[test]
    fn enumeration() {
        let states: Vec<FockState> = enumerate_states(3).unwrap().collect();
        assert_eq!(states.len(), 8);
        assert!(states.windows(2).all(|w| w[0] < w[1]));
        assert!(enumerate_states(64).is_err());
    }

    #[test]
    fn too_many_modes() {
        assert_eq!(fock_dim(0).unwrap(), 1);
        assert_eq!(fock_dim(10).unwrap(), 1024);
        assert_eq!(fock_dim(MAX_MODES).unwrap(), 1_usize << MAX_MODES);
        for n in [MAX_MODES + 1, 100, usize::MAX] {
            assert!(matches!(fock_dim(n), Err(EdError::TooManyModes(m)) if m == n));
        }
    }
}

//! Symbolic second-quantized operators over a fixed set of fermionic modes.
//!
//! An [`Operator`] is a finite linear combination of products of creation and
//! annihilation operators. Every operator is stored in canonical normal order:
//! within each monomial all creators precede all annihilators, each group
//! sorted by ascending mode index, with equal monomials merged and zero
//! coefficients dropped. Canonical forms are unique, so two operators are equal
//! iff their canonical term maps are equal.

use std::{
    fmt,
    ops::{ Add, AddAssign, Mul, Neg, Sub },
};
use indexmap::IndexMap;
use num_complex::Complex64 as C64;
use num_traits::Zero;
use crate::hilbert::FockState;

pub mod presets;

/// Coefficient magnitude below which commutators are considered to vanish,
/// relative to the product of the operands' largest coefficients.
pub const COMMUTATOR_EPSILON: f64 = 1e-12;

/* Ladder operators ***********************************************************/

/// A single creation (`dagger == true`) or annihilation operator on a mode.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Ladder {
    pub dagger: bool,
    pub mode: usize,
}

impl Ladder {
    /// Create a creation operator `c†_p`.
    pub fn create(mode: usize) -> Self { Self { dagger: true, mode } }

    /// Create an annihilation operator `c_p`.
    pub fn annihilate(mode: usize) -> Self { Self { dagger: false, mode } }

    /// Return the Hermitian conjugate.
    pub fn adjoint(self) -> Self { Self { dagger: !self.dagger, mode: self.mode } }

    fn rank(self) -> (u8, usize) { (u8::from(!self.dagger), self.mode) }

    /// Apply the operator to a Fock state, returning the new state and the
    /// fermionic sign, or `None` if the result vanishes.
    pub fn apply(self, state: FockState) -> Option<(FockState, f64)> {
        if self.dagger {
            state.create(self.mode)
        } else {
            state.annihilate(self.mode)
        }
    }
}

impl PartialOrd for Ladder {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ladder {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Debug for Ladder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dagger {
            write!(f, "c+_{}", self.mode)
        } else {
            write!(f, "c_{}", self.mode)
        }
    }
}

/// An ordered product of ladder operators.
///
/// The empty product is the identity.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Monomial(Vec<Ladder>);

impl Monomial {
    pub fn new(ops: Vec<Ladder>) -> Self { Self(ops) }

    /// Return the ladder operators of the product, leftmost first.
    pub fn ops(&self) -> &[Ladder] { &self.0 }

    /// Return `true` if this is the identity.
    pub fn is_identity(&self) -> bool { self.0.is_empty() }

    /// Apply the product to a Fock state, rightmost operator first.
    pub fn apply(&self, state: FockState) -> Option<(FockState, f64)> {
        self.0.iter().rev()
            .try_fold((state, 1.0), |(s, sign), op| {
                op.apply(s).map(|(s1, sg)| (s1, sign * sg))
            })
    }
}

impl fmt::Debug for Monomial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() { return write!(f, "1"); }
        let n = self.0.len();
        for (k, op) in self.0.iter().enumerate() {
            op.fmt(f)?;
            if k + 1 < n { write!(f, " ")?; }
        }
        Ok(())
    }
}

/// Reorder a product of ladder operators into canonical normal order,
/// accumulating every resulting monomial into `out`.
///
/// Anticommutation `{c_p, c†_q} = δ_pq` generates additional, shorter terms
/// whenever an annihilator is moved past a creator on the same mode; these are
/// processed in turn until every term is ordered.
fn normal_order_into(
    ops: Vec<Ladder>,
    coeff: C64,
    out: &mut IndexMap<Monomial, C64>,
) {
    let mut stack: Vec<(Vec<Ladder>, C64)> = vec![(ops, coeff)];
    'terms: while let Some((mut term, mut c)) = stack.pop() {
        for i in 1..term.len() {
            for j in (1..=i).rev() {
                let (l, r) = (term[j - 1], term[j]);
                if l.dagger == r.dagger {
                    if l.mode == r.mode { continue 'terms; }
                    if l.mode < r.mode { break; }
                    term.swap(j - 1, j);
                    c = -c;
                } else if r.dagger {
                    if l.mode == r.mode {
                        let mut contracted: Vec<Ladder>
                            = Vec::with_capacity(term.len() - 2);
                        contracted.extend_from_slice(&term[..j - 1]);
                        contracted.extend_from_slice(&term[j + 1..]);
                        stack.push((contracted, c));
                    }
                    term.swap(j - 1, j);
                    c = -c;
                } else {
                    break;
                }
            }
        }
        *out.entry(Monomial(term)).or_insert_with(C64::zero) += c;
    }
}

/* Operators ******************************************************************/

/// A finite linear combination of monomials, held in canonical normal order.
#[derive(Clone, PartialEq, Default)]
pub struct Operator {
    terms: IndexMap<Monomial, C64>,
}

impl fmt::Debug for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.terms.is_empty() { return write!(f, "0"); }
        let n = self.terms.len();
        for (k, (mono, c)) in self.terms.iter().enumerate() {
            write!(f, "({}{:+}i) {:?}", c.re, c.im, mono)?;
            if k + 1 < n { write!(f, " + ")?; }
        }
        Ok(())
    }
}

impl Operator {
    /// Build an operator from arbitrary (not necessarily ordered) products.
    pub fn from_products<I>(products: I) -> Self
    where I: IntoIterator<Item = (Vec<Ladder>, C64)>
    {
        let mut terms: IndexMap<Monomial, C64> = IndexMap::new();
        products.into_iter()
            .for_each(|(ops, c)| normal_order_into(ops, c, &mut terms));
        Self::canonical(terms)
    }

    fn canonical(mut terms: IndexMap<Monomial, C64>) -> Self {
        terms.retain(|_, c| !c.is_zero());
        terms.sort_keys();
        Self { terms }
    }

    /// The zero operator.
    pub fn zero() -> Self { Self::default() }

    /// A multiple of the identity.
    pub fn scalar<C>(c: C) -> Self
    where C: Into<C64>
    {
        Self::from_products([(Vec::new(), c.into())])
    }

    /// The identity operator.
    pub fn identity() -> Self { Self::scalar(1.0) }

    /// The creation operator `c†_p`.
    pub fn create(p: usize) -> Self {
        Self::from_products([(vec![Ladder::create(p)], C64::from(1.0))])
    }

    /// The annihilation operator `c_p`.
    pub fn annihilate(p: usize) -> Self {
        Self::from_products([(vec![Ladder::annihilate(p)], C64::from(1.0))])
    }

    /// The number operator `n_p = c†_p c_p`.
    pub fn number(p: usize) -> Self {
        Self::from_products(
            [(vec![Ladder::create(p), Ladder::annihilate(p)], C64::from(1.0))])
    }

    /// Iterate over the canonical `(monomial, coefficient)` pairs.
    pub fn terms(&self) -> impl Iterator<Item = (&Monomial, C64)> + '_ {
        self.terms.iter().map(|(m, c)| (m, *c))
    }

    /// Return the coefficient of a canonical monomial.
    pub fn coefficient(&self, mono: &Monomial) -> C64 {
        self.terms.get(mono).copied().unwrap_or_else(C64::zero)
    }

    /// Number of canonical monomials.
    pub fn len(&self) -> usize { self.terms.len() }

    /// Return `true` if the operator is zero.
    pub fn is_empty(&self) -> bool { self.terms.is_empty() }

    /// Return `true` if every coefficient is real.
    pub fn is_real(&self) -> bool { self.terms.values().all(|c| c.im == 0.0) }

    /// Largest mode index appearing in the operator.
    pub fn max_mode(&self) -> Option<usize> {
        self.terms.keys()
            .flat_map(|m| m.0.iter().map(|op| op.mode))
            .max()
    }

    /// Largest coefficient magnitude.
    pub fn max_coefficient(&self) -> f64 {
        self.terms.values().map(|c| c.norm()).fold(0.0, f64::max)
    }

    /// Return the Hermitian conjugate.
    pub fn adjoint(&self) -> Self {
        Self::from_products(
            self.terms.iter()
            .map(|(m, c)| {
                let ops: Vec<Ladder>
                    = m.0.iter().rev().map(|op| op.adjoint()).collect();
                (ops, c.conj())
            })
        )
    }

    /// Drop all terms whose coefficient magnitude is at most `tol`.
    pub fn pruned(mut self, tol: f64) -> Self {
        self.terms.retain(|_, c| c.norm() > tol);
        self
    }

    /// Return `true` if the operator equals its adjoint up to coefficients of
    /// relative magnitude [`COMMUTATOR_EPSILON`].
    pub fn is_hermitian(&self) -> bool {
        let scale = self.max_coefficient().max(1.0);
        (self - &self.adjoint())
            .pruned(COMMUTATOR_EPSILON * scale)
            .is_empty()
    }

    /// Compute the commutator `[self, other]`.
    pub fn commutator(&self, other: &Self) -> Self {
        &(self * other) - &(other * self)
    }

    /// Return `true` if `[self, other]` reduces to zero, up to coefficients of
    /// relative magnitude [`COMMUTATOR_EPSILON`].
    pub fn commutes(&self, other: &Self) -> bool {
        let scale
            = (self.max_coefficient() * other.max_coefficient()).max(1.0);
        self.commutator(other)
            .pruned(COMMUTATOR_EPSILON * scale)
            .is_empty()
    }

    /// Apply the operator to a Fock state.
    ///
    /// The result is returned as `(state, amplitude)` pairs sorted by state,
    /// with equal states merged and vanishing amplitudes removed.
    pub fn act(&self, state: FockState) -> Vec<(FockState, C64)> {
        let mut acc: IndexMap<FockState, C64> = IndexMap::new();
        for (mono, c) in self.terms.iter() {
            if let Some((s, sign)) = mono.apply(state) {
                *acc.entry(s).or_insert_with(C64::zero) += c * sign;
            }
        }
        acc.retain(|_, a| !a.is_zero());
        acc.sort_keys();
        acc.into_iter().collect()
    }

    /// Return the diagonal matrix element `⟨state|self|state⟩`.
    pub fn diagonal(&self, state: FockState) -> C64 {
        self.terms.iter()
            .filter_map(|(mono, c)| {
                mono.apply(state)
                    .filter(|(s, _)| *s == state)
                    .map(|(_, sign)| c * sign)
            })
            .sum()
    }
}

impl<'a> Add<&'a Operator> for &'a Operator {
    type Output = Operator;

    fn add(self, rhs: &'a Operator) -> Operator {
        let mut terms = self.terms.clone();
        for (m, c) in rhs.terms.iter() {
            *terms.entry(m.clone()).or_insert_with(C64::zero) += c;
        }
        Operator::canonical(terms)
    }
}

impl Add for Operator {
    type Output = Operator;

    fn add(self, rhs: Operator) -> Operator { &self + &rhs }
}

impl AddAssign<&Operator> for Operator {
    fn add_assign(&mut self, rhs: &Operator) { *self = &*self + rhs; }
}

impl AddAssign for Operator {
    fn add_assign(&mut self, rhs: Operator) { *self = &*self + &rhs; }
}

impl Neg for &Operator {
    type Output = Operator;

    fn neg(self) -> Operator {
        Operator {
            terms: self.terms.iter().map(|(m, c)| (m.clone(), -c)).collect(),
        }
    }
}

impl Neg for Operator {
    type Output = Operator;

    fn neg(self) -> Operator { -&self }
}

impl<'a> Sub<&'a Operator> for &'a Operator {
    type Output = Operator;

    fn sub(self, rhs: &'a Operator) -> Operator { self + &(-rhs) }
}

impl Sub for Operator {
    type Output = Operator;

    fn sub(self, rhs: Operator) -> Operator { &self - &rhs }
}

impl<'a> Mul<&'a Operator> for &'a Operator {
    type Output = Operator;

    fn mul(self, rhs: &'a Operator) -> Operator {
        let mut terms: IndexMap<Monomial, C64> = IndexMap::new();
        for (ml, cl) in self.terms.iter() {
            for (mr, cr) in rhs.terms.iter() {
                let ops: Vec<Ladder>
                    = ml.0.iter().chain(mr.0.iter()).copied().collect();
                normal_order_into(ops, cl * cr, &mut terms);
            }
        }
        Operator::canonical(terms)
    }
}

impl Mul for Operator {
    type Output = Operator;

    fn mul(self, rhs: Operator) -> Operator { &self * &rhs }
}

impl Mul<C64> for &Operator {
    type Output = Operator;

    fn mul(self, rhs: C64) -> Operator {
        let terms: IndexMap<Monomial, C64>
            = self.terms.iter().map(|(m, c)| (m.clone(), c * rhs)).collect();
        Operator::canonical(terms)
    }
}

impl Mul<C64> for Operator {
    type Output = Operator;

    fn mul(self, rhs: C64) -> Operator { &self * rhs }
}

impl Mul<f64> for &Operator {
    type Output = Operator;

    fn mul(self, rhs: f64) -> Operator { self * C64::from(rhs) }
}

impl Mul<f64> for Operator {
    type Output = Operator;

    fn mul(self, rhs: f64) -> Operator { &self * C64::from(rhs) }
}

impl std::iter::Sum for Operator {
    fn sum<I>(iter: I) -> Self
    where I: Iterator<Item = Operator>
    {
        let mut terms: IndexMap<Monomial, C64> = IndexMap::new();
        for op in iter {
            for (m, c) in op.terms.into_iter() {
                *terms.entry(m).or_insert_with(C64::zero) += c;
            }
        }
        Operator::canonical(terms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(p: usize) -> Operator { Operator::annihilate(p) }
    fn cdag(p: usize) -> Operator { Operator::create(p) }

    #[test]
    fn anticommutation() {
        for p in 0..3 {
            for q in 0..3 {
                let anti = &(&c(p) * &cdag(q)) + &(&cdag(q) * &c(p));
                if p == q {
                    assert_eq!(anti, Operator::identity());
                } else {
                    assert!(anti.is_empty());
                }
                assert!((&(&c(p) * &c(q)) + &(&c(q) * &c(p))).is_empty());
            }
        }
    }

    #[test]
    fn canonical_order() {
        let op = &(&c(0) * &cdag(2)) * &cdag(1);
        let mono = Monomial::new(
            vec![Ladder::create(1), Ladder::create(2), Ladder::annihilate(0)]);
        assert_eq!(op.len(), 1);
        assert_eq!(op.coefficient(&mono), C64::from(-1.0));
        assert!((&cdag(1) * &cdag(1)).is_empty());
    }

    #[test]
    fn adjoint_round_trip() {
        let op = Operator::from_products([
            (vec![Ladder::create(0), Ladder::annihilate(1)], C64::new(0.5, 1.5)),
            (vec![Ladder::annihilate(2), Ladder::create(2)], C64::from(2.0)),
        ]);
        assert_eq!(op.adjoint().adjoint(), op);
        assert!(!op.is_hermitian());
        assert!((&op + &op.adjoint()).is_hermitian());
    }

    #[test]
    fn number_conservation() {
        let n = Operator::number(0) + Operator::number(1);
        let hop = Operator::from_products([
            (vec![Ladder::create(0), Ladder::annihilate(1)], C64::from(-1.0)),
            (vec![Ladder::create(1), Ladder::annihilate(0)], C64::from(-1.0)),
        ]);
        assert!(hop.commutes(&n));
        assert!(!hop.commutes(&Operator::number(0)));
    }

    #[test]
    fn action_on_states() {
        let hop = &cdag(2) * &c(0);
        let out = hop.act(FockState::from_modes([0, 1]));
        assert_eq!(out, vec![(FockState::from_modes([1, 2]), C64::from(-1.0))]);
        assert!(hop.act(FockState::from_modes([2])).is_empty());
        let n = Operator::number(1);
        assert_eq!(n.diagonal(FockState::from_modes([1])), C64::from(1.0));
        assert_eq!(n.diagonal(FockState::VACUUM), C64::zero());
    }
}

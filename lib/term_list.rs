//! Sorted collections of Lehmann terms with tolerance-based merging.

use std::cmp::Ordering;

/// Default number of insertions between two pruning sweeps.
pub const DEFAULT_REDUCE_THRESHOLD: usize = 100_000;

/// A single term of a Lehmann sum.
pub trait Term: Clone {
    /// Order two terms by their pole structure, returning `Equal` iff the two
    /// can be merged, i.e. all poles agree within `tol`.
    fn compare(&self, other: &Self, tol: f64) -> Ordering;

    /// Add the residues of a mergeable term into `self`.
    fn merge(&mut self, other: &Self);

    /// Return `true` if the term can be dropped from a list of `len` terms.
    fn is_negligible(&self, tol: f64, len: usize) -> bool;
}

/// Compare two poles, treating them as equal within `tol`.
pub fn cmp_pole(a: f64, b: f64, tol: f64) -> Ordering {
    if (a - b).abs() < tol {
        Ordering::Equal
    } else if a < b {
        Ordering::Less
    } else {
        Ordering::Greater
    }
}

/// Compare two sequences of poles lexicographically, each pair within `tol`.
pub fn cmp_poles(a: &[f64], b: &[f64], tol: f64) -> Ordering {
    a.iter().zip(b)
        .map(|(x, y)| cmp_pole(*x, *y, tol))
        .find(|o| *o != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

/// Sorted list of [`Term`]s.
///
/// Inserting a term that compares equal to one already present merges the two;
/// every `reduce_threshold` insertions, and on [`finalize`][Self::finalize],
/// negligible terms are dropped.
#[derive(Clone, Debug)]
pub struct TermList<Tm>
where Tm: Term
{
    terms: Vec<Tm>,
    resonance_tol: f64,
    negligible_tol: f64,
    reduce_threshold: usize,
    added: usize,
}

impl<Tm> TermList<Tm>
where Tm: Term
{
    /// Create a new, empty list.
    pub fn new(resonance_tol: f64, negligible_tol: f64) -> Self {
        Self {
            terms: Vec::new(),
            resonance_tol,
            negligible_tol,
            reduce_threshold: DEFAULT_REDUCE_THRESHOLD,
            added: 0,
        }
    }

    /// Set the number of insertions between two pruning sweeps.
    pub fn with_reduce_threshold(mut self, reduce_threshold: usize) -> Self {
        self.reduce_threshold = reduce_threshold.max(1);
        self
    }

    /// Pole-merging tolerance.
    pub fn resonance_tol(&self) -> f64 { self.resonance_tol }

    /// Pruning tolerance.
    pub fn negligible_tol(&self) -> f64 { self.negligible_tol }

    /// Insert a term, merging it with an equal one if present.
    pub fn add(&mut self, term: Tm) {
        match self.terms
            .binary_search_by(|t| t.compare(&term, self.resonance_tol))
        {
            Ok(k) => { self.terms[k].merge(&term); },
            Err(k) => { self.terms.insert(k, term); },
        }
        self.added += 1;
        if self.added >= self.reduce_threshold { self.reduce(); }
    }

    /// Drop every negligible term.
    pub fn reduce(&mut self) {
        let len = self.terms.len();
        let tol = self.negligible_tol;
        self.terms.retain(|t| !t.is_negligible(tol, len));
        self.added = 0;
    }

    /// Run a final pruning sweep.
    pub fn finalize(&mut self) { self.reduce(); }

    /// Number of terms.
    pub fn len(&self) -> usize { self.terms.len() }

    pub fn is_empty(&self) -> bool { self.terms.is_empty() }

    /// Remove all terms.
    pub fn clear(&mut self) {
        self.terms.clear();
        self.added = 0;
    }

    /// Terms in sorted order.
    pub fn terms(&self) -> &[Tm] { &self.terms }

    pub fn iter(&self) -> std::slice::Iter<'_, Tm> { self.terms.iter() }

    /// Replace all terms with an already sorted and merged sequence.
    pub(crate) fn set_terms(&mut self, terms: Vec<Tm>) {
        self.terms = terms;
        self.added = 0;
    }
}

impl<'a, Tm> IntoIterator for &'a TermList<Tm>
where Tm: Term
{
    type Item = &'a Tm;
    type IntoIter = std::slice::Iter<'a, Tm>;

    fn into_iter(self) -> Self::IntoIter { self.terms.iter() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug)]
    struct Pole { r: f64, p: f64 }

    impl Term for Pole {
        fn compare(&self, other: &Self, tol: f64) -> Ordering {
            cmp_pole(self.p, other.p, tol)
        }

        fn merge(&mut self, other: &Self) { self.r += other.r; }

        fn is_negligible(&self, tol: f64, len: usize) -> bool {
            self.r.abs() < tol / len as f64
        }
    }

    #[test]
    fn merges_close_poles() {
        let eps = 1e-8;
        let mut list: TermList<Pole> = TermList::new(eps, 1e-8);
        list.add(Pole { r: 0.25, p: 0.3 });
        list.add(Pole { r: 0.5, p: 0.3 + eps / 2.0 });
        list.finalize();
        assert_eq!(list.len(), 1);
        assert_eq!(list.terms()[0].r, 0.75);
        assert!((list.terms()[0].p - 0.3).abs() < eps);
    }

    #[test]
    fn stays_sorted_and_prunes() {
        let mut list: TermList<Pole>
            = TermList::new(1e-8, 1e-3).with_reduce_threshold(4);
        for (r, p) in [(1.0, 0.5), (1e-6, -0.2), (1.0, 0.1), (-1.0, 0.5)] {
            list.add(Pole { r, p });
        }
        // the fourth insertion cancels the first and triggers a sweep
        let poles: Vec<f64> = list.iter().map(|t| t.p).collect();
        assert_eq!(poles, vec![0.1]);
        list.add(Pole { r: 2.0, p: -1.0 });
        list.add(Pole { r: 3.0, p: 1.0 });
        let poles: Vec<f64> = list.iter().map(|t| t.p).collect();
        assert_eq!(poles, vec![-1.0, 0.1, 1.0]);
    }

    #[test]
    fn lexicographic_poles() {
        assert_eq!(cmp_poles(&[0.0, 1.0], &[0.0, 1.0 + 1e-12], 1e-8), Ordering::Equal);
        assert_eq!(cmp_poles(&[0.0, 1.0], &[0.1, 0.0], 1e-8), Ordering::Less);
        assert_eq!(cmp_poles(&[0.0, 2.0], &[0.0, 1.0], 1e-8), Ordering::Greater);
    }
}

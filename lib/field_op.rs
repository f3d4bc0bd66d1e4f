//! Creation, annihilation, and quadratic operators as block-sparse matrices in
//! the Hamiltonian eigenbasis.

use std::fmt;
use log::{ debug, info };
use ndarray as nd;
use rustc_hash::FxHashMap as HashMap;
use crate::{
    error::{ EdError, EdResult },
    hamiltonian::Hamiltonian,
    linalg::{ self, Elem },
    operator::{ Operator, presets },
    states::{ BlockNumber, StatesClassification },
};

/// Which operator a [`FieldOperator`] represents.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// `c_p`
    Annihilation(usize),
    /// `c†_p`
    Creation(usize),
    /// `c†_i c_j`
    Quadratic(usize, usize),
}

impl FieldKind {
    /// Return the symbolic operator.
    pub fn operator(self) -> Operator {
        match self {
            Self::Annihilation(p) => presets::c(p),
            Self::Creation(p) => presets::c_dag(p),
            Self::Quadratic(i, j) => presets::c_dag_c(i, j),
        }
    }

    /// Return the kind of the Hermitian conjugate.
    pub fn adjoint(self) -> Self {
        match self {
            Self::Annihilation(p) => Self::Creation(p),
            Self::Creation(p) => Self::Annihilation(p),
            Self::Quadratic(i, j) => Self::Quadratic(j, i),
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Annihilation(p) => write!(f, "c_{}", p),
            Self::Creation(p) => write!(f, "c+_{}", p),
            Self::Quadratic(i, j) => write!(f, "c+_{} c_{}", i, j),
        }
    }
}

/* Parts **********************************************************************/

/// Matrix of an operator between two blocks, in the eigenbases of both.
///
/// The dense matrix has shape `(size(to), size(from))`; its nonzero elements
/// are also listed by row and by column.
#[derive(Clone, Debug)]
pub struct FieldOperatorPart<T>
where T: Elem
{
    from: BlockNumber,
    to: BlockNumber,
    matrix: nd::Array2<T>,
    rows: Vec<Vec<(usize, T)>>,
    cols: Vec<Vec<(usize, T)>>,
}

impl<T> FieldOperatorPart<T>
where T: Elem
{
    fn from_matrix(from: BlockNumber, to: BlockNumber, matrix: nd::Array2<T>)
        -> Self
    {
        let (nrows, ncols) = matrix.dim();
        let mut rows: Vec<Vec<(usize, T)>> = vec![Vec::new(); nrows];
        let mut cols: Vec<Vec<(usize, T)>> = vec![Vec::new(); ncols];
        for ((i, j), x) in matrix.indexed_iter() {
            if x.modulus() == 0.0 { continue; }
            rows[i].push((j, *x));
            cols[j].push((i, *x));
        }
        Self { from, to, matrix, rows, cols }
    }

    /// Block the operator acts on.
    pub fn from_block(&self) -> BlockNumber { self.from }

    /// Block the operator maps into.
    pub fn to_block(&self) -> BlockNumber { self.to }

    /// Dense matrix, indexed `[to, from]`.
    pub fn matrix(&self) -> &nd::Array2<T> { &self.matrix }

    /// Matrix element `⟨to_i|O|from_j⟩`.
    pub fn element(&self, to_i: usize, from_j: usize) -> T {
        self.matrix[[to_i, from_j]]
    }

    /// Nonzero elements `(from_j, value)` of row `to_i`.
    pub fn row(&self, to_i: usize) -> &[(usize, T)] { &self.rows[to_i] }

    /// Nonzero elements `(to_i, value)` of column `from_j`.
    pub fn col(&self, from_j: usize) -> &[(usize, T)] { &self.cols[from_j] }

    /// Iterate over all nonzero elements as `(to_i, from_j, value)`.
    pub fn nonzeros(&self) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        self.rows.iter().enumerate()
            .flat_map(|(i, row)| row.iter().map(move |(j, x)| (i, *j, *x)))
    }

    /// Number of nonzero elements.
    pub fn nnz(&self) -> usize { self.rows.iter().map(Vec::len).sum() }

    /// Return the part of the Hermitian conjugate operator, mapping `to` back
    /// onto `from`.
    pub fn adjoint(&self) -> Self {
        let conj_lists = |lists: &Vec<Vec<(usize, T)>>| -> Vec<Vec<(usize, T)>> {
            lists.iter()
                .map(|l| l.iter().map(|(k, x)| (*k, x.conjugate())).collect())
                .collect()
        };
        Self {
            from: self.to,
            to: self.from,
            matrix: linalg::adjoint(&self.matrix),
            rows: conj_lists(&self.cols),
            cols: conj_lists(&self.rows),
        }
    }
}

/* Operators ******************************************************************/

/// An operator as a collection of [`FieldOperatorPart`]s, one per connected
/// pair of blocks.
///
/// Each block is mapped into at most one other block and vice versa; the
/// connection is stored in both directions.
#[derive(Clone, Debug)]
pub struct FieldOperator<T>
where T: Elem
{
    kind: Option<FieldKind>,
    op: Operator,
    connections: Vec<(BlockNumber, BlockNumber)>,
    parts: Vec<FieldOperatorPart<T>>,
    left: HashMap<BlockNumber, usize>,
    right: HashMap<BlockNumber, usize>,
    computed: bool,
}

impl<T> FieldOperator<T>
where T: Elem
{
    /// Determine the block connectivity of one of the preset kinds.
    pub fn prepare(kind: FieldKind, states: &StatesClassification)
        -> EdResult<Self>
    {
        let mut new = Self::prepare_general(kind.operator(), states)?;
        new.kind = Some(kind);
        Ok(new)
    }

    /// Determine the block connectivity of an arbitrary operator.
    ///
    /// Fails if the operator maps some block into more than one block, or two
    /// blocks into the same one.
    pub fn prepare_general(op: Operator, states: &StatesClassification)
        -> EdResult<Self>
    {
        if let Some(p) = op.max_mode().filter(|p| *p >= states.n_modes()) {
            return Err(EdError::ModeOutOfRange(p, states.n_modes()));
        }
        let mut connections: Vec<(BlockNumber, BlockNumber)> = Vec::new();
        let mut inverse: HashMap<BlockNumber, BlockNumber> = HashMap::default();
        for (from, block) in states.blocks() {
            let mut target: Option<BlockNumber> = None;
            for state in block.states.iter() {
                for (image, _) in op.act(*state) {
                    let (to, _) = states.inner_index(image);
                    match target {
                        None => { target = Some(to); },
                        Some(t) if t != to => {
                            return Err(EdError::BlockMismatch {
                                from, to_a: t, to_b: to });
                        },
                        _ => { },
                    }
                }
            }
            if let Some(to) = target {
                if let Some(other) = inverse.insert(to, from) {
                    return Err(EdError::BlockMismatch {
                        from: to, to_a: other, to_b: from });
                }
                connections.push((from, to));
            }
        }
        Ok(Self {
            kind: None,
            op,
            connections,
            parts: Vec::new(),
            left: HashMap::default(),
            right: HashMap::default(),
            computed: false,
        })
    }

    /// Compute every part in the eigenbasis, dropping elements with absolute
    /// value below `tol` and parts left with no nonzero elements.
    pub fn compute(
        &mut self,
        states: &StatesClassification,
        hamiltonian: &Hamiltonian<T>,
        tol: f64,
    ) -> EdResult<()>
    {
        if self.computed { return Ok(()); }
        let mut parts: Vec<FieldOperatorPart<T>>
            = Vec::with_capacity(self.connections.len());
        for &(from, to) in self.connections.iter() {
            let basis_from = states.states(from);
            let mut M: nd::Array2<T>
                = nd::Array2::zeros((states.block_size(to), basis_from.len()));
            for (j, state) in basis_from.iter().enumerate() {
                for (image, amp) in self.op.act(*state) {
                    let (_, i) = states.inner_index(image);
                    M[[i, j]] = M[[i, j]] + T::from_c64(amp);
                }
            }
            let mut rotated = linalg::rotate(
                hamiltonian.eigenvectors(to)?,
                &M,
                hamiltonian.eigenvectors(from)?,
            );
            linalg::prune(&mut rotated, tol);
            let part = FieldOperatorPart::from_matrix(from, to, rotated);
            if part.nnz() == 0 {
                debug!("{}: part {} -> {} vanishes", self.label(), from, to);
                continue;
            }
            parts.push(part);
        }
        self.set_parts(parts);
        info!("{}: {} nonzero parts", self.label(), self.parts.len());
        Ok(())
    }

    fn set_parts(&mut self, parts: Vec<FieldOperatorPart<T>>) {
        self.left = parts.iter().enumerate()
            .map(|(k, p)| (p.from, k))
            .collect();
        self.right = parts.iter().enumerate()
            .map(|(k, p)| (p.to, k))
            .collect();
        self.parts = parts;
        self.computed = true;
    }

    fn label(&self) -> String {
        self.kind.map(|k| k.to_string())
            .unwrap_or_else(|| "operator".to_string())
    }

    /// Return the Hermitian conjugate, built from the already computed parts.
    pub fn adjoint(&self) -> Self {
        let mut new = Self {
            kind: self.kind.map(FieldKind::adjoint),
            op: self.op.adjoint(),
            connections: self.connections.iter().map(|(f, t)| (*t, *f)).collect(),
            parts: Vec::new(),
            left: HashMap::default(),
            right: HashMap::default(),
            computed: false,
        };
        if self.computed {
            new.set_parts(self.parts.iter().map(|p| p.adjoint()).collect());
        }
        new
    }

    /// Kind of the operator, if it is one of the presets.
    pub fn kind(&self) -> Option<FieldKind> { self.kind }

    /// Symbolic operator.
    pub fn operator(&self) -> &Operator { &self.op }

    /// Return `true` if [`Self::compute`] has run.
    pub fn is_computed(&self) -> bool { self.computed }

    /// All connected `(from, to)` block pairs, including those whose parts
    /// vanished in the eigenbasis.
    pub fn connections(&self) -> &[(BlockNumber, BlockNumber)] {
        &self.connections
    }

    /// Iterate over all nonzero parts.
    pub fn parts(&self) -> impl Iterator<Item = &FieldOperatorPart<T>> + '_ {
        self.parts.iter()
    }

    /// Number of nonzero parts.
    pub fn num_parts(&self) -> usize { self.parts.len() }

    /// Return the part acting on block `from`, if nonzero.
    pub fn part_from(&self, from: BlockNumber) -> Option<&FieldOperatorPart<T>> {
        self.left.get(&from).map(|k| &self.parts[*k])
    }

    /// Return the part mapping into block `to`, if nonzero.
    pub fn part_to(&self, to: BlockNumber) -> Option<&FieldOperatorPart<T>> {
        self.right.get(&to).map(|k| &self.parts[*k])
    }

    /// Block that `from` is mapped into, if any.
    pub fn left_index(&self, from: BlockNumber) -> Option<BlockNumber> {
        self.part_from(from).map(|p| p.to)
    }

    /// Block that is mapped into `to`, if any.
    pub fn right_index(&self, to: BlockNumber) -> Option<BlockNumber> {
        self.part_to(to).map(|p| p.from)
    }
}

/// Creation and annihilation operators for every mode.
///
/// Only creation operators are computed; annihilation operators are their
/// adjoints.
#[derive(Clone, Debug)]
pub struct FieldOperatorContainer<T>
where T: Elem
{
    creation: Vec<FieldOperator<T>>,
    annihilation: Vec<FieldOperator<T>>,
}

impl<T> FieldOperatorContainer<T>
where T: Elem
{
    /// Compute `c†_p` and `c_p` for every mode.
    pub fn compute(
        states: &StatesClassification,
        hamiltonian: &Hamiltonian<T>,
        tol: f64,
    ) -> EdResult<Self>
    {
        let mut creation: Vec<FieldOperator<T>> = Vec::new();
        for p in 0..states.n_modes() {
            let mut cdag
                = FieldOperator::prepare(FieldKind::Creation(p), states)?;
            cdag.compute(states, hamiltonian, tol)?;
            creation.push(cdag);
        }
        let annihilation: Vec<FieldOperator<T>>
            = creation.iter().map(FieldOperator::adjoint).collect();
        Ok(Self { creation, annihilation })
    }

    /// Number of modes.
    pub fn n_modes(&self) -> usize { self.creation.len() }

    /// Annihilation operator `c_p`.
    pub fn c(&self, p: usize) -> EdResult<&FieldOperator<T>> {
        self.annihilation.get(p)
            .ok_or(EdError::ModeOutOfRange(p, self.annihilation.len()))
    }

    /// Creation operator `c†_p`.
    pub fn c_dag(&self, p: usize) -> EdResult<&FieldOperator<T>> {
        self.creation.get(p)
            .ok_or(EdError::ModeOutOfRange(p, self.creation.len()))
    }
}

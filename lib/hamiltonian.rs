//! Block-diagonal Hamiltonian matrices and their eigendecompositions.

use log::{ debug, info };
use ndarray as nd;
use ndarray_linalg::{ EighInto, UPLO };
use crate::{
    error::{ EdError, EdResult },
    linalg::{ self, Elem },
    operator::Operator,
    states::{ BlockNumber, StatesClassification },
};

/// Hamiltonian restricted to a single block.
///
/// Before diagonalization `matrix` holds `⟨i|H|j⟩` in the block's Fock basis;
/// afterward it holds the orthonormal eigenvectors as columns, matching the
/// ascending `eigenvalues`.
#[derive(Clone, Debug)]
pub struct HamiltonianPart<T>
where T: Elem
{
    block: BlockNumber,
    matrix: nd::Array2<T>,
    eigenvalues: Option<nd::Array1<f64>>,
}

impl<T> HamiltonianPart<T>
where T: Elem
{
    /// Block number of the part.
    pub fn block(&self) -> BlockNumber { self.block }

    /// Size of the block.
    pub fn size(&self) -> usize { self.matrix.nrows() }

    /// Ascending eigenvalues, if computed.
    pub fn eigenvalues(&self) -> EdResult<&nd::Array1<f64>> {
        self.eigenvalues.as_ref()
            .ok_or(EdError::NotComputed("Hamiltonian eigenvalues"))
    }

    /// Eigenvectors as columns, if computed.
    pub fn eigenvectors(&self) -> EdResult<&nd::Array2<T>> {
        self.eigenvalues.as_ref()
            .map(|_| &self.matrix)
            .ok_or(EdError::NotComputed("Hamiltonian eigenvectors"))
    }

    /// Fock-basis matrix, if not yet diagonalized.
    pub fn fock_matrix(&self) -> Option<&nd::Array2<T>> {
        self.eigenvalues.is_none().then_some(&self.matrix)
    }

    fn diagonalize(&mut self) -> EdResult<()> {
        let matrix: nd::Array2<T>
            = std::mem::replace(&mut self.matrix, nd::Array2::zeros((0, 0)));
        let (E, V) = matrix.eigh_into(UPLO::Upper)?;
        debug!(
            "block {}: size {}, lowest eigenvalue {:.6e}",
            self.block, E.len(), E.get(0).copied().unwrap_or(f64::NAN),
        );
        self.matrix = V;
        self.eigenvalues = Some(E);
        Ok(())
    }
}

fn fill_block<T>(
    op: &Operator,
    states: &StatesClassification,
    block: BlockNumber,
    upper_only: bool,
) -> EdResult<nd::Array2<T>>
where T: Elem
{
    let basis = states.states(block);
    let n = basis.len();
    let mut M: nd::Array2<T> = nd::Array2::zeros((n, n));
    for (j, state_j) in basis.iter().enumerate() {
        for (state_i, amp) in op.act(*state_j) {
            let (b, i) = states.inner_index(state_i);
            if b != block {
                return Err(EdError::BlockMismatch {
                    from: block,
                    to_a: block,
                    to_b: b,
                });
            }
            if !upper_only || i <= j {
                M[[i, j]] = M[[i, j]] + T::from_c64(amp);
            }
        }
    }
    Ok(M)
}

/// Build the Fock-basis matrix of a Hermitian operator restricted to a block.
///
/// Only the upper triangle is accumulated from `H|j⟩`; the lower triangle is
/// then filled by conjugate mirroring. Fails if the operator connects the
/// block to any other.
pub fn block_matrix<T>(
    op: &Operator,
    states: &StatesClassification,
    block: BlockNumber,
) -> EdResult<nd::Array2<T>>
where T: Elem
{
    let mut H: nd::Array2<T> = fill_block(op, states, block, true)?;
    linalg::mirror_upper(&mut H);
    Ok(H)
}

/// Build the full Fock-basis matrix of an arbitrary block-diagonal operator
/// restricted to a block.
pub fn operator_block_matrix<T>(
    op: &Operator,
    states: &StatesClassification,
    block: BlockNumber,
) -> EdResult<nd::Array2<T>>
where T: Elem
{
    fill_block(op, states, block, false)
}

/// Block-diagonal Hamiltonian.
#[derive(Clone, Debug)]
pub struct Hamiltonian<T>
where T: Elem
{
    parts: Vec<HamiltonianPart<T>>,
    ground_energy: Option<f64>,
}

impl<T> Hamiltonian<T>
where T: Elem
{
    /// Build the matrices of every block.
    ///
    /// Fails if `T` is real and `op` has complex coefficients.
    pub fn prepare(op: &Operator, states: &StatesClassification)
        -> EdResult<Self>
    {
        if !T::IS_COMPLEX && !op.is_real() {
            return Err(EdError::ComplexCoefficients);
        }
        if let Some(p) = op.max_mode().filter(|p| *p >= states.n_modes()) {
            return Err(EdError::ModeOutOfRange(p, states.n_modes()));
        }
        let parts: Vec<HamiltonianPart<T>>
            = (0..states.num_blocks())
            .map(|b| {
                block_matrix(op, states, b)
                    .map(|matrix| {
                        HamiltonianPart { block: b, matrix, eigenvalues: None }
                    })
            })
            .collect::<EdResult<_>>()?;
        info!(
            "prepared {} Hamiltonian blocks, largest {}",
            parts.len(),
            parts.iter().map(|p| p.size()).max().unwrap_or(0),
        );
        Ok(Self { parts, ground_energy: None })
    }

    /// Diagonalize every block and record the ground energy.
    pub fn compute(&mut self) -> EdResult<()> {
        if self.ground_energy.is_some() { return Ok(()); }
        self.parts.iter_mut()
            .try_for_each(|part| part.diagonalize())?;
        let e0: f64
            = self.parts.iter()
            .filter_map(|p| p.eigenvalues.as_ref().and_then(|E| E.get(0)))
            .copied()
            .fold(f64::INFINITY, f64::min);
        info!("ground energy: {:.12}", e0);
        self.ground_energy = Some(e0);
        Ok(())
    }

    /// Return `true` if [`Self::compute`] has run.
    pub fn is_computed(&self) -> bool { self.ground_energy.is_some() }

    /// Number of blocks.
    pub fn num_blocks(&self) -> usize { self.parts.len() }

    /// Return the part for a block.
    ///
    /// *Panics* if `b` is not a valid block number.
    pub fn part(&self, b: BlockNumber) -> &HamiltonianPart<T> { &self.parts[b] }

    /// Iterate over all parts in block order.
    pub fn parts(&self) -> impl Iterator<Item = &HamiltonianPart<T>> + '_ {
        self.parts.iter()
    }

    /// Ascending eigenvalues of a block.
    pub fn eigenvalues(&self, b: BlockNumber) -> EdResult<&nd::Array1<f64>> {
        self.parts.get(b)
            .ok_or(EdError::NoSuchBlock(b))?
            .eigenvalues()
    }

    /// Eigenvectors of a block, as columns.
    pub fn eigenvectors(&self, b: BlockNumber) -> EdResult<&nd::Array2<T>> {
        self.parts.get(b)
            .ok_or(EdError::NoSuchBlock(b))?
            .eigenvectors()
    }

    /// Smallest eigenvalue over all blocks.
    pub fn ground_energy(&self) -> EdResult<f64> {
        self.ground_energy.ok_or(EdError::NotComputed("ground energy"))
    }

    /// All eigenvalues of the Hamiltonian in ascending order.
    pub fn all_eigenvalues(&self) -> EdResult<nd::Array1<f64>> {
        let mut E: Vec<f64> = Vec::new();
        for part in self.parts.iter() {
            E.extend(part.eigenvalues()?.iter().copied());
        }
        E.sort_by(f64::total_cmp);
        Ok(nd::Array1::from(E))
    }
}

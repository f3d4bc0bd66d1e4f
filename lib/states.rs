//! Partition of the Fock basis into blocks of equal quantum numbers.

use std::hash::{ Hash, Hasher };
use log::{ debug, info };
use rustc_hash::{ FxHashMap as HashMap, FxHasher };
use crate::{
    error::EdResult,
    hilbert::{ self, FockState },
    symmetrizer::{ QuantumNumbers, Symmetrizer },
};

/// Identifier of a block.
pub type BlockNumber = usize;

/// A set of Fock states sharing a quantum-number tuple.
#[derive(Clone, Debug)]
pub struct Block {
    pub qn: QuantumNumbers,
    pub states: Vec<FockState>,
}

impl Block {
    /// Number of states in the block.
    pub fn size(&self) -> usize { self.states.len() }
}

fn qn_hash(qn: &QuantumNumbers) -> u64 {
    let mut hasher = FxHasher::default();
    qn.hash(&mut hasher);
    hasher.finish()
}

/// Partition of all `2^N` Fock states into [`Block`]s.
///
/// Block numbers are assigned in order of the hash of their quantized
/// quantum-number tuple, with ties broken by tuple order; states within a block
/// are in ascending order.
#[derive(Clone, Debug)]
pub struct StatesClassification {
    n_modes: usize,
    blocks: Vec<Block>,
    lookup: HashMap<QuantumNumbers, BlockNumber>,
    inner: Vec<(BlockNumber, usize)>,
}

impl StatesClassification {
    /// Label every Fock state by its quantum numbers and group them into
    /// blocks.
    pub fn compute(symmetrizer: &Symmetrizer) -> EdResult<Self> {
        let n_modes = symmetrizer.n_modes();
        let dim = hilbert::fock_dim(n_modes)?;
        let mut groups: HashMap<QuantumNumbers, Vec<FockState>>
            = HashMap::default();
        for state in hilbert::enumerate_states(n_modes)? {
            groups.entry(symmetrizer.quantum_numbers(state))
                .or_default()
                .push(state);
        }
        let mut keyed: Vec<(u64, Vec<i64>, Block)>
            = groups.into_iter()
            .map(|(qn, states)| (qn_hash(&qn), qn.quantized(), Block { qn, states }))
            .collect();
        keyed.sort_by(|l, r| l.0.cmp(&r.0).then_with(|| l.1.cmp(&r.1)));
        let blocks: Vec<Block>
            = keyed.into_iter().map(|(_, _, block)| block).collect();

        let mut inner: Vec<(BlockNumber, usize)> = vec![(0, 0); dim];
        let mut lookup: HashMap<QuantumNumbers, BlockNumber>
            = HashMap::default();
        for (b, block) in blocks.iter().enumerate() {
            debug!("block {}: {:?}, size {}", b, block.qn.values(), block.size());
            lookup.insert(block.qn.clone(), b);
            for (k, state) in block.states.iter().enumerate() {
                inner[state.as_index()] = (b, k);
            }
        }
        info!(
            "classified {} states into {} blocks; largest block has {} states",
            dim,
            blocks.len(),
            blocks.iter().map(Block::size).max().unwrap_or(0),
        );
        Ok(Self { n_modes, blocks, lookup, inner })
    }

    /// Number of modes.
    pub fn n_modes(&self) -> usize { self.n_modes }

    /// Total number of Fock states.
    pub fn dim(&self) -> usize { self.inner.len() }

    /// Number of blocks.
    pub fn num_blocks(&self) -> usize { self.blocks.len() }

    /// Iterate over all blocks in block-number order.
    pub fn blocks(&self) -> impl Iterator<Item = (BlockNumber, &Block)> + '_ {
        self.blocks.iter().enumerate()
    }

    /// Return a block by number.
    pub fn block(&self, b: BlockNumber) -> Option<&Block> { self.blocks.get(b) }

    /// Look up the block number for a quantum-number tuple.
    pub fn block_of(&self, qn: &QuantumNumbers) -> Option<BlockNumber> {
        self.lookup.get(qn).copied()
    }

    /// Return the Fock states of a block.
    ///
    /// *Panics* if `b` is not a valid block number.
    pub fn states(&self, b: BlockNumber) -> &[FockState] {
        &self.blocks[b].states
    }

    /// Return the size of a block.
    ///
    /// *Panics* if `b` is not a valid block number.
    pub fn block_size(&self, b: BlockNumber) -> usize {
        self.blocks[b].size()
    }

    /// Return the quantum numbers of a block.
    ///
    /// *Panics* if `b` is not a valid block number.
    pub fn quantum_numbers(&self, b: BlockNumber) -> &QuantumNumbers {
        &self.blocks[b].qn
    }

    /// Return the block number and position within the block of a Fock state.
    ///
    /// *Panics* if `state` lies outside the Fock space.
    pub fn inner_index(&self, state: FockState) -> (BlockNumber, usize) {
        self.inner[state.as_index()]
    }
}

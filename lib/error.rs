//! Error types shared across the crate.

use thiserror::Error;
use crate::dispatch::DispatchError;

#[derive(Debug, Error)]
pub enum EdError {
    /// Returned when a mode index falls outside `[0, N)`.
    #[error("mode index {0} out of range for {1} modes")]
    ModeOutOfRange(usize, usize),

    /// Returned when a Fock space would need more bits than a machine word
    /// provides.
    #[error("cannot enumerate a Fock space of {0} modes")]
    TooManyModes(usize),

    /// Returned when a `(site, orbital, spin)` triple names nothing in the
    /// index map.
    #[error("unknown mode: site {site:?}, orbital {orbital}, spin {spin}")]
    UnknownMode { site: String, orbital: usize, spin: usize },

    /// Returned when a site label is declared twice or referenced without
    /// being declared.
    #[error("site error: {0}")]
    Site(String),

    /// Returned when a quantity is requested before the step that produces it
    /// has run.
    #[error("{0} requested before it was computed")]
    NotComputed(&'static str),

    /// Returned when a real-valued matrix type is requested for an operator
    /// with complex coefficients.
    #[error("operator has complex coefficients; use a complex matrix type")]
    ComplexCoefficients,

    /// Returned when an operator maps the states of one block into more than
    /// one other block.
    #[error("operator maps block {from} into both blocks {to_a} and {to_b}")]
    BlockMismatch { from: usize, to_a: usize, to_b: usize },

    /// Returned when a block number is out of range.
    #[error("no block with number {0}")]
    NoSuchBlock(usize),

    /// Returned when a container is asked for an element it was not built
    /// with.
    #[error("missing container element {0}")]
    MissingElement(String),

    /// Returned when a serialized term list is malformed.
    #[error("malformed term record: {0}")]
    MalformedRecord(String),

    #[error("eigensolver error: {0}")]
    Eigensolver(#[from] ndarray_linalg::error::LinalgError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("npz error: {0}")]
    Npz(#[from] ndarray_npy::WriteNpzError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
pub type EdResult<T> = Result<T, EdError>;

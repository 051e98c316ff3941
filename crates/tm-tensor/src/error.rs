use thiserror::Error;

#[derive(Error, Debug)]
pub enum TensorError {
    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch { expected: Vec<usize>, got: Vec<usize> },
    #[error("dtype mismatch: expected {expected}, got {got}")]
    DTypeMismatch { expected: String, got: String },
    #[error("descriptor requires a 2D shape, got {ndim} dimensions")]
    NotTwoDimensional { ndim: usize },
    #[error("storage length {got} does not match shape {dims:?} ({expected} bytes)")]
    StorageSize {
        dims: Vec<usize>,
        expected: usize,
        got: usize,
    },
    #[error("row length {k} is not a multiple of the {dtype} block size {block}")]
    PartialBlock {
        dtype: String,
        k: usize,
        block: usize,
    },
    #[error("unsupported dtype: {0}")]
    UnsupportedDType(String),
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, TensorError>;

use thiserror::Error;

// Unified error type for linop

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OpError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("operator not invertible: {0}")]
    NotInvertible(String),
    #[error("dimension mismatch in {op}: expected {expected:?}, found {found:?}")]
    DimensionMismatch {
        op: &'static str,
        expected: (usize, usize),
        found: (usize, usize),
    },
    #[error("cache not set for {0}; call cache_operator(L, u) first")]
    CacheNotReady(&'static str),
    #[error("no norm estimator configured for {0}")]
    UnsupportedNorm(&'static str),
    #[error("factorization error: {0}")]
    FactorError(String),
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
}

impl OpError {
    /// Shorthand used by every shape check in the crate.
    pub(crate) fn mismatch(op: &'static str, expected: (usize, usize), found: (usize, usize)) -> Self {
        OpError::DimensionMismatch { op, expected, found }
    }
}

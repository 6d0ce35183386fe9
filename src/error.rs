use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("trait graph contains a directed cycle through traits {traits:?}")]
    CyclicGraph { traits: Vec<usize> },

    #[error("invalid correlation matrix {name}: {reason}")]
    InvalidCorrelation { name: String, reason: String },

    #[error(
        "cannot place {required} non-overlapping effect variants among {available} variants"
    )]
    InsufficientVariants { required: usize, available: usize },

    #[error("malformed LD block {block}: {reason}")]
    MalformedLd { block: usize, reason: String },

    #[error("{name} is not positive semi-definite (minimum eigenvalue {min_eigenvalue:e})")]
    NonPositiveDefinite { name: String, min_eigenvalue: f64 },

    #[error("dimension mismatch for {name}: expected {expected}, found {found}")]
    DimensionMismatch {
        name: String,
        expected: String,
        found: String,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid sampling distribution: {0}")]
    Distribution(String),

    #[error("linear algebra failure: {0}")]
    Linalg(#[from] ndarray_linalg::error::LinalgError),
}

impl SimError {
    pub(crate) fn dimension(
        name: impl Into<String>,
        expected: impl ToString,
        found: impl ToString,
    ) -> Self {
        SimError::DimensionMismatch {
            name: name.into(),
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    pub(crate) fn correlation(name: impl Into<String>, reason: impl Into<String>) -> Self {
        SimError::InvalidCorrelation {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SimError>;

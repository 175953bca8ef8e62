//! Error kinds surfaced by every comparison, correction and analyzer call.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A required field is missing or mismatched for the chosen test
    /// (missing covariates, unmatched paired ids, too few samples, wrong data type).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Ill-conditioned arithmetic: zero variance, zero control mean in relative mode,
    /// singular design matrix.
    #[error("Numerical error: {0}")]
    Numerical(String),

    /// A sample or a quantile slice is too small for the test's assumptions.
    #[error("Insufficient data in {context}: need at least {required} observations, got {got}")]
    InsufficientData {
        required: usize,
        got: usize,
        context: String,
    },

    /// Out-of-range or unknown option value (alpha, correction method, test type).
    #[error("Validation error: {0}")]
    Validation(String),
}

impl Error {
    pub(crate) fn insufficient(required: usize, got: usize, context: &str) -> Self {
        Error::InsufficientData {
            required,
            got,
            context: context.to_string(),
        }
    }

    /// Errors that only concern the pair being computed. Under
    /// [`BatchPolicy::Isolate`](crate::testing::inference::BatchPolicy) these are
    /// recorded in place while the rest of the batch keeps going.
    pub fn is_pair_local(&self) -> bool {
        matches!(self, Error::Numerical(_) | Error::InsufficientData { .. })
    }
}

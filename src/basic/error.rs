//! Error types shared by the registry, the solvers and the case loader.

use thiserror::Error;

pub type PfResult<T> = Result<T, PfError>;

/// Errors produced while building a network, solving it or analysing faults.
///
/// Structural problems (`Configuration`) are raised at build time. Numerical
/// outcomes of a solve are reported through [`crate::prelude::SolveStatus`]
/// first and only turn into `SingularSystem` / `ConvergenceFailure` when the
/// caller asks for a `Result`.
#[derive(Error, Debug)]
pub enum PfError {
    #[error("Configuration error: {what}")]
    Configuration { what: String },

    #[error("Singular system: {what}")]
    SingularSystem { what: String },

    #[error(
        "Power flow did not converge after {iterations} iterations (max mismatch {max_mismatch:.3e})"
    )]
    ConvergenceFailure {
        iterations: usize,
        max_mismatch: f64,
        mismatch: Vec<f64>,
    },

    #[error("Numerical domain error: {what}")]
    NumericalDomain { what: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

impl PfError {
    pub(crate) fn config(what: impl Into<String>) -> Self {
        PfError::Configuration { what: what.into() }
    }

    pub(crate) fn singular(what: impl Into<String>) -> Self {
        PfError::SingularSystem { what: what.into() }
    }

    pub(crate) fn domain(what: impl Into<String>) -> Self {
        PfError::NumericalDomain { what: what.into() }
    }
}

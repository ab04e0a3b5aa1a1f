use nalgebra::{DMatrix, DVector};
use thiserror::Error;

mod dense;
pub use dense::*;

#[cfg(feature = "rsparse")]
mod rsparse;
#[cfg(feature = "rsparse")]
pub use self::rsparse::*;

pub type DefaultSolver = DenseLuSolver;

/// Relative pivot magnitude below which a factorization is treated as singular.
pub const PIVOT_TOLERANCE: f64 = 1e-12;

/// Failure of a linear solve.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolveError {
    #[error("matrix is singular (pivot {pivot:.3e} at row {row})")]
    Singular { row: usize, pivot: f64 },
    #[error("solution contains non-finite values")]
    NonFinite,
    #[error("dimension mismatch: {rows}x{cols} matrix with rhs of length {rhs}")]
    Dimension { rows: usize, cols: usize, rhs: usize },
    #[error("factorization failed: {0}")]
    Factorization(&'static str),
}

/// A trait for solving square linear systems `A · x = b`.
pub trait Solve {
    /// Solves the linear system in place.
    ///
    /// # Parameters
    ///
    /// * `a` - The square system matrix.
    /// * `b` - Right-hand side; overwritten with the solution on success.
    ///
    /// # Returns
    ///
    /// An error if the system has no unique, finite solution.
    fn solve(&mut self, a: &DMatrix<f64>, b: &mut DVector<f64>) -> Result<(), SolveError>;

    /// Drops any state cached from a previous matrix structure.
    fn reset(&mut self) {}
}

pub(crate) fn check_dimensions(a: &DMatrix<f64>, b: &DVector<f64>) -> Result<(), SolveError> {
    if a.nrows() != a.ncols() || a.nrows() != b.len() {
        return Err(SolveError::Dimension {
            rows: a.nrows(),
            cols: a.ncols(),
            rhs: b.len(),
        });
    }
    Ok(())
}

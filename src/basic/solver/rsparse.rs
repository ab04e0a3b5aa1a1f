use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::CscMatrix;
use rsparse::{
    data::{self, Numeric, Symb},
    lsolve, lu, sqr, usolve,
};

use super::{Solve, SolveError, check_dimensions};

/// Sparse LU through `rsparse`, reusing the symbolic analysis while the
/// sparsity pattern of the matrix is unchanged.
#[derive(Default)]
pub struct RSparseSolver {
    x: Vec<f64>,
    symbolic: Option<Symb>,
    pattern: Option<(Vec<usize>, Vec<usize>)>,
}

impl Solve for RSparseSolver {
    fn solve(&mut self, a: &DMatrix<f64>, b: &mut DVector<f64>) -> Result<(), SolveError> {
        check_dimensions(a, b)?;
        let n = b.len();
        if n == 0 {
            return Ok(());
        }
        let (ap, ai, ax) = CscMatrix::from(a).disassemble();
        let same_pattern = self
            .pattern
            .as_ref()
            .is_some_and(|(p, i)| *p == ap && *i == ai);
        let sprs = data::Sprs {
            m: n,
            n,
            i: ai.clone(),
            p: ap.iter().map(|&v| v as isize).collect(),
            nzmax: ax.len(),
            x: ax,
        };
        if !same_pattern || self.symbolic.is_none() {
            self.symbolic = Some(sqr(&sprs, 1, false));
            self.pattern = Some((ap, ai));
            self.x = vec![0.0; n];
        }
        let (Some(s), x) = (self.symbolic.as_mut(), &mut self.x) else {
            return Err(SolveError::Factorization("missing symbolic analysis"));
        };
        let num = lu(&sprs, s, 1e-6).map_err(|_| SolveError::Factorization("LU factorization failed"))?;
        let rhs = b.as_mut_slice();
        ipvec(&num.pinv, rhs, &mut x[..]); // x = P*b
        lsolve(&num.l, x); // x = L\x
        usolve(&num.u, x); // x = U\x
        ipvec(&s.q, &x[..], rhs); // b = Q*x
        if rhs.iter().any(|v| !v.is_finite()) {
            return Err(SolveError::NonFinite);
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.symbolic = None;
        self.pattern = None;
    }
}

fn ipvec<T: Numeric<T>>(p: &Option<Vec<isize>>, b: &[T], x: &mut [T]) {
    match p {
        Some(pvec) => {
            for k in 0..b.len() {
                x[pvec[k] as usize] = b[k];
            }
        }
        None => x.copy_from_slice(b),
    }
}

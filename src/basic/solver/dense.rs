use nalgebra::{DMatrix, DVector};

use super::{PIVOT_TOLERANCE, Solve, SolveError, check_dimensions};

/// Dense LU with partial pivoting.
#[derive(Debug, Clone, Default)]
pub struct DenseLuSolver;

impl Solve for DenseLuSolver {
    fn solve(&mut self, a: &DMatrix<f64>, b: &mut DVector<f64>) -> Result<(), SolveError> {
        check_dimensions(a, b)?;
        if b.is_empty() {
            return Ok(());
        }
        let lu = a.clone().lu();
        let u = lu.u();
        let scale = u.amax();
        for row in 0..u.nrows() {
            let pivot = u[(row, row)];
            if !(pivot.abs() > PIVOT_TOLERANCE * scale) {
                return Err(SolveError::Singular { row, pivot });
            }
        }
        if !lu.solve_mut(b) {
            return Err(SolveError::Factorization("LU back substitution failed"));
        }
        if b.iter().any(|x| !x.is_finite()) {
            return Err(SolveError::NonFinite);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn solves_small_system() {
        let a = DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 2.0, 3.0]);
        let mut b = DVector::from_vec(vec![1.0, 2.0]);
        DenseLuSolver.solve(&a, &mut b).unwrap();
        assert_relative_eq!(b[0], 0.1, epsilon = 1e-12);
        assert_relative_eq!(b[1], 0.6, epsilon = 1e-12);
    }

    #[test]
    fn rank_deficient_matrix_is_singular() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]);
        let mut b = DVector::from_vec(vec![1.0, 2.0]);
        let err = DenseLuSolver.solve(&a, &mut b).unwrap_err();
        assert!(matches!(err, SolveError::Singular { .. }));
    }

    #[test]
    fn zero_matrix_is_singular() {
        let a = DMatrix::zeros(3, 3);
        let mut b = DVector::from_element(3, 1.0);
        assert!(DenseLuSolver.solve(&a, &mut b).is_err());
    }

    #[test]
    fn shape_mismatch_is_reported() {
        let a = DMatrix::<f64>::identity(2, 2);
        let mut b = DVector::from_element(3, 1.0);
        assert!(matches!(
            DenseLuSolver.solve(&a, &mut b),
            Err(SolveError::Dimension { .. })
        ));
    }
}

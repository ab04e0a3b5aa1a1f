//! Newton-Raphson Jacobian for the polar power-balance equations.
//!
//! Rows are `[ΔP of every non-slack bus] ++ [ΔQ of every PQ bus]` and columns
//! are `[δ of every non-slack bus] ++ [|V| of every PQ bus]`, both in bus
//! registration order. [`BusOrdering`] fixes that layout once per solve and is
//! shared with the mismatch assembly in the Newton loop.

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use super::dsbus_dv::dSbus_dV;
use super::elements::BusType;
use super::newtonpf::polar_voltages;

/// Position of each solver unknown within the state vector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BusOrdering {
    /// Bus positions whose angle is solved for (all non-slack buses).
    pub angle: Vec<usize>,
    /// Bus positions whose magnitude is solved for (PQ buses).
    pub magnitude: Vec<usize>,
}

impl BusOrdering {
    pub fn new(types: &[BusType]) -> Self {
        let angle = (0..types.len())
            .filter(|&i| types[i].solves_angle())
            .collect();
        let magnitude = (0..types.len())
            .filter(|&i| types[i].solves_magnitude())
            .collect();
        Self { angle, magnitude }
    }

    pub fn n_angle(&self) -> usize {
        self.angle.len()
    }

    pub fn n_magnitude(&self) -> usize {
        self.magnitude.len()
    }

    /// Size of the square Newton system.
    pub fn n_unknowns(&self) -> usize {
        self.angle.len() + self.magnitude.len()
    }

    /// Packs per-bus ΔP/ΔQ into the mismatch vector.
    pub fn mismatch(&self, delta_s: &DVector<Complex64>) -> DVector<f64> {
        let p = self.angle.iter().map(|&i| delta_s[i].re);
        let q = self.magnitude.iter().map(|&i| delta_s[i].im);
        DVector::from_iterator(self.n_unknowns(), p.chain(q))
    }
}

/// Formulation used to evaluate the Jacobian.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JacobianForm {
    /// Element-wise polar partial derivatives.
    #[default]
    Polar,
    /// Complex-matrix derivatives `dS/dVm`, `dS/dVa`.
    ComplexMatrix,
}

/// Builds the full Jacobian `[[J1, J2], [J3, J4]]` at the given state.
pub fn build_jacobian(
    form: JacobianForm,
    ybus: &DMatrix<Complex64>,
    vm: &DVector<f64>,
    va: &DVector<f64>,
    ordering: &BusOrdering,
) -> DMatrix<f64> {
    match form {
        JacobianForm::Polar => polar_jacobian(ybus, vm, va, ordering),
        JacobianForm::ComplexMatrix => complex_jacobian(ybus, &polar_voltages(vm, va), ordering),
    }
}

/// Polar-form Jacobian with `Y_ij = |Y_ij|∠θ_ij`.
pub fn polar_jacobian(
    ybus: &DMatrix<Complex64>,
    vm: &DVector<f64>,
    va: &DVector<f64>,
    ordering: &BusOrdering,
) -> DMatrix<f64> {
    let n = vm.len();
    // Per-bus sums Σ_k V_k |Y_ik| cos/sin(δ_i − δ_k − θ_ik), k ≠ i and the self term.
    let mut sum_cos = vec![0.0; n];
    let mut sum_sin = vec![0.0; n];
    for i in 0..n {
        for k in 0..n {
            let y = ybus[(i, k)];
            if k == i || y.norm() == 0.0 {
                continue;
            }
            let phi = va[i] - va[k] - y.arg();
            sum_cos[i] += vm[k] * y.norm() * phi.cos();
            sum_sin[i] += vm[k] * y.norm() * phi.sin();
        }
    }
    let y_abs = |i: usize, j: usize| ybus[(i, j)].norm();
    let theta = |i: usize, j: usize| ybus[(i, j)].arg();

    let n_a = ordering.n_angle();
    let n_u = ordering.n_unknowns();
    let mut jac = DMatrix::zeros(n_u, n_u);

    // ∂P/∂δ and ∂P/∂V
    for (r, &i) in ordering.angle.iter().enumerate() {
        for (c, &j) in ordering.angle.iter().enumerate() {
            jac[(r, c)] = if i == j {
                -vm[i] * sum_sin[i]
            } else {
                let phi = va[i] - va[j] - theta(i, j);
                vm[i] * vm[j] * y_abs(i, j) * phi.sin()
            };
        }
        for (c, &j) in ordering.magnitude.iter().enumerate() {
            jac[(r, n_a + c)] = if i == j {
                sum_cos[i] + 2.0 * vm[i] * y_abs(i, i) * theta(i, i).cos()
            } else {
                let phi = va[i] - va[j] - theta(i, j);
                vm[i] * y_abs(i, j) * phi.cos()
            };
        }
    }
    // ∂Q/∂δ and ∂Q/∂V
    for (r, &i) in ordering.magnitude.iter().enumerate() {
        for (c, &j) in ordering.angle.iter().enumerate() {
            jac[(n_a + r, c)] = if i == j {
                vm[i] * sum_cos[i]
            } else {
                let phi = va[i] - va[j] - theta(i, j);
                -vm[i] * vm[j] * y_abs(i, j) * phi.cos()
            };
        }
        for (c, &j) in ordering.magnitude.iter().enumerate() {
            jac[(n_a + r, n_a + c)] = if i == j {
                sum_sin[i] - 2.0 * vm[i] * y_abs(i, i) * theta(i, i).sin()
            } else {
                let phi = va[i] - va[j] - theta(i, j);
                vm[i] * y_abs(i, j) * phi.sin()
            };
        }
    }
    jac
}

/// Complex-matrix Jacobian: real/imaginary parts of `dS/dVa` and `dS/dVm`
/// restricted to the unknown rows and columns.
#[allow(non_snake_case)]
pub fn complex_jacobian(
    ybus: &DMatrix<Complex64>,
    v: &DVector<Complex64>,
    ordering: &BusOrdering,
) -> DMatrix<f64> {
    let (dS_dVm, dS_dVa) = dSbus_dV(ybus, v);
    let n_a = ordering.n_angle();
    let n_u = ordering.n_unknowns();
    let mut jac = DMatrix::zeros(n_u, n_u);
    for (r, &i) in ordering.angle.iter().enumerate() {
        for (c, &j) in ordering.angle.iter().enumerate() {
            jac[(r, c)] = dS_dVa[(i, j)].re;
        }
        for (c, &j) in ordering.magnitude.iter().enumerate() {
            jac[(r, n_a + c)] = dS_dVm[(i, j)].re;
        }
    }
    for (r, &i) in ordering.magnitude.iter().enumerate() {
        for (c, &j) in ordering.angle.iter().enumerate() {
            jac[(n_a + r, c)] = dS_dVa[(i, j)].im;
        }
        for (c, &j) in ordering.magnitude.iter().enumerate() {
            jac[(n_a + r, n_a + c)] = dS_dVm[(i, j)].im;
        }
    }
    jac
}

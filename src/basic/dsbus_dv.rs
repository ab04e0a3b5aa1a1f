use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;

/// Computes the Jacobian matrices of power injections with respect to voltage magnitudes and angles.
///
/// # Arguments
///
/// * `Ybus` - The dense nodal admittance matrix.
/// * `v` - The voltage phasors.
///
/// # Returns
///
/// A tuple `(dS_dVm, dS_dVa)`:
///
/// * `dS_dVm` - Derivatives of the complex injections with respect to voltage magnitudes.
/// * `dS_dVa` - Derivatives of the complex injections with respect to voltage angles.
///
/// # Notes
///
/// * The method is from MatPower:
///   R. D. Zimmerman, "AC Power Flows, Generalized OPF Costs and
///   their Derivatives using Complex Matrix Notation", MATPOWER
///   Technical Note 2, February 2010.
/// * A bus with zero voltage magnitude is given a unit normalized phasor at its angle.
#[allow(non_snake_case)]
pub fn dSbus_dV(
    Ybus: &DMatrix<Complex64>,
    v: &DVector<Complex64>,
) -> (DMatrix<Complex64>, DMatrix<Complex64>) {
    let ibus = Ybus * v;
    let Vnorm = v.map(|e| {
        if e.norm() > 0.0 {
            e / e.norm()
        } else {
            Complex64::from_polar(1.0, e.arg())
        }
    });
    let diagV = DMatrix::from_diagonal(v);
    let diagVnorm = DMatrix::from_diagonal(&Vnorm);
    let diagIbus = DMatrix::from_diagonal(&ibus);

    // dS_dVm = diagV * conj(Ybus * diagVnorm) + conj(diagIbus) * diagVnorm
    let dS_dVm = &diagV * (Ybus * &diagVnorm).conjugate() + diagIbus.conjugate() * &diagVnorm;
    // dS_dVa = 1j * diagV * conj(diagIbus - Ybus * diagV)
    let dS_dVa = (&diagV * (diagIbus - Ybus * &diagV).conjugate()) * Complex64::i();
    (dS_dVm, dS_dVa)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::newtonpf::calc_injections as injections;
    use approx::assert_relative_eq;

    #[test]
    #[allow(non_snake_case)]
    fn matches_finite_differences() {
        let y12 = Complex64::new(2.0, -8.0);
        let y13 = Complex64::new(1.0, -5.0);
        let ybus = DMatrix::from_row_slice(
            3,
            3,
            &[
                y12 + y13 + Complex64::new(0.0, 0.05),
                -y12,
                -y13,
                -y12,
                y12,
                Complex64::new(0.0, 0.0),
                -y13,
                Complex64::new(0.0, 0.0),
                y13,
            ],
        );
        let vm = [1.02, 0.97, 0.99];
        let va = [0.0, -0.05, 0.03];
        let v = DVector::from_iterator(3, (0..3).map(|i| Complex64::from_polar(vm[i], va[i])));
        let (dS_dVm, dS_dVa) = dSbus_dV(&ybus, &v);
        let h = 1e-7;
        let s0 = injections(&ybus, &v);
        for j in 0..3 {
            let mut dv = v.clone();
            dv[j] = Complex64::from_polar(vm[j] + h, va[j]);
            let dm = (injections(&ybus, &dv) - &s0) / Complex64::new(h, 0.0);
            let mut da = v.clone();
            da[j] = Complex64::from_polar(vm[j], va[j] + h);
            let dd = (injections(&ybus, &da) - &s0) / Complex64::new(h, 0.0);
            for i in 0..3 {
                assert_relative_eq!(dS_dVm[(i, j)].re, dm[i].re, epsilon = 1e-5);
                assert_relative_eq!(dS_dVm[(i, j)].im, dm[i].im, epsilon = 1e-5);
                assert_relative_eq!(dS_dVa[(i, j)].re, dd[i].re, epsilon = 1e-5);
                assert_relative_eq!(dS_dVa[(i, j)].im, dd[i].im, epsilon = 1e-5);
            }
        }
    }
}

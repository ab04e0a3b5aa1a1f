use derive_more::{Deref, From};
use nalgebra::Matrix2;
use num_complex::Complex64;
use num_traits::Zero;
use serde::{Deserialize, Serialize};

use crate::basic::error::{PfError, PfResult};

/// Represents an admittance value in a power system.
///
/// `Admittance` is a wrapper around a complex number representing the admittance value in per-unit.
#[derive(Clone, Copy, Default, PartialEq, Debug, Deref, From, Serialize, Deserialize)]
pub struct Admittance(pub Complex64);

impl Admittance {
    /// Admittance of a series impedance `z`. Fails for a zero or non-finite impedance.
    pub fn from_impedance(z: Complex64) -> PfResult<Self> {
        if z.is_zero() || !z.is_finite() {
            return Err(PfError::domain(format!("cannot invert impedance {z}")));
        }
        Ok(Admittance(z.inv()))
    }
}

/// One end of a two-port element: a named bus or the ground reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Terminal {
    Bus(String),
    Ground,
}

impl Terminal {
    pub fn bus(name: impl Into<String>) -> Self {
        Terminal::Bus(name.into())
    }

    pub fn bus_name(&self) -> Option<&str> {
        match self {
            Terminal::Bus(name) => Some(name.as_str()),
            Terminal::Ground => None,
        }
    }
}

/// Represents a port with two terminals.
///
/// `Port2` denotes the ordered pair of terminals a branch connects; the first
/// terminal addresses row/column 0 of the primitive matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Port2 {
    pub from: Terminal,
    pub to: Terminal,
}

impl Port2 {
    pub fn new(from: Terminal, to: Terminal) -> Self {
        Self { from, to }
    }

    pub fn between(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::new(Terminal::bus(from), Terminal::bus(to))
    }

    pub fn to_ground(bus: impl Into<String>) -> Self {
        Self::new(Terminal::bus(bus), Terminal::Ground)
    }

    pub fn terminals(&self) -> [&Terminal; 2] {
        [&self.from, &self.to]
    }
}

/// The 2×2 primitive admittance a single branch contributes to Ybus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchPrimitive {
    pub port: Port2,
    /// Per-unit values on the system base.
    pub y: Matrix2<Complex64>,
}

impl BranchPrimitive {
    pub fn new(port: Port2, y: Matrix2<Complex64>) -> Self {
        Self { port, y }
    }

    /// A plain series element `z` between two buses.
    pub fn series(
        from: impl Into<String>,
        to: impl Into<String>,
        z: Complex64,
    ) -> PfResult<Self> {
        Self::pi(from, to, z, Complex64::zero())
    }

    /// Nominal pi model: series impedance `z`, total shunt admittance `y_shunt` split on both ends.
    pub fn pi(
        from: impl Into<String>,
        to: impl Into<String>,
        z: Complex64,
        y_shunt: Complex64,
    ) -> PfResult<Self> {
        let ys = Admittance::from_impedance(z)?.0;
        let half = y_shunt * 0.5;
        Ok(Self::new(
            Port2::between(from, to),
            Matrix2::new(ys + half, -ys, -ys, ys + half),
        ))
    }

    /// A shunt admittance between `bus` and ground.
    pub fn shunt(bus: impl Into<String>, y: Complex64) -> Self {
        Self::new(
            Port2::to_ground(bus),
            Matrix2::new(y, Complex64::zero(), Complex64::zero(), Complex64::zero()),
        )
    }

    pub fn is_finite(&self) -> bool {
        self.y.iter().all(|v| v.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn series_primitive_is_symmetric() {
        let br = BranchPrimitive::series("a", "b", Complex64::new(0.02, 0.08)).unwrap();
        let ys = Complex64::new(0.02, 0.08).inv();
        assert_eq!(br.y[(0, 1)], br.y[(1, 0)]);
        assert_relative_eq!(br.y[(0, 0)].re, ys.re, epsilon = 1e-12);
        assert_relative_eq!(br.y[(0, 0)].im, ys.im, epsilon = 1e-12);
        assert_eq!(br.y[(0, 1)], -ys);
    }

    #[test]
    fn pi_primitive_splits_charging() {
        let br = BranchPrimitive::pi(
            "a",
            "b",
            Complex64::new(0.0, 0.1),
            Complex64::new(0.0, 0.04),
        )
        .unwrap();
        assert_relative_eq!(br.y[(0, 0)].im, -10.0 + 0.02, epsilon = 1e-12);
        assert_relative_eq!(br.y[(1, 1)].im, -10.0 + 0.02, epsilon = 1e-12);
        assert_relative_eq!(br.y[(0, 1)].im, 10.0, epsilon = 1e-12);
    }

    #[test]
    fn zero_impedance_is_rejected() {
        let err = BranchPrimitive::series("a", "b", Complex64::zero()).unwrap_err();
        assert!(matches!(err, PfError::NumericalDomain { .. }));
    }
}

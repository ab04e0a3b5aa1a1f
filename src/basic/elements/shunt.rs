use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::basic::{
    error::{PfError, PfResult},
    system::admittance::BranchPrimitive,
};

/// Fixed shunt, rated at 1.0 p.u. voltage.
///
/// Positive `q_mvar` absorbs reactive power (reactor), negative injects it (capacitor).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShuntParams {
    #[serde(default)]
    pub p_mw: f64,
    pub q_mvar: f64,
    #[serde(default = "one")]
    pub step: i32,
}

fn one() -> i32 {
    1
}

impl ShuntParams {
    pub fn y_pu(&self, s_base_mva: f64) -> PfResult<Complex64> {
        if s_base_mva <= 0.0 {
            return Err(PfError::domain(format!("system base {s_base_mva} MVA")));
        }
        Ok(Complex64::new(self.p_mw, -self.q_mvar) * self.step as f64 / s_base_mva)
    }

    pub fn primitive(&self, bus: &str, s_base_mva: f64) -> PfResult<BranchPrimitive> {
        Ok(BranchPrimitive::shunt(bus, self.y_pu(s_base_mva)?))
    }
}

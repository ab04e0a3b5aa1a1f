use nalgebra::Matrix2;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::basic::{
    error::{PfError, PfResult},
    system::admittance::{Admittance, BranchPrimitive, Port2},
};

/// Two-winding transformer nameplate data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformerParams {
    /// Rated power (MVA).
    pub sn_mva: f64,
    /// Short-circuit voltage (% of rated voltage).
    pub vk_percent: f64,
    /// Real part of the short-circuit voltage (%).
    pub vkr_percent: f64,
    #[serde(default)]
    pub pfe_kw: f64,
    #[serde(default)]
    pub i0_percent: f64,
    #[serde(default)]
    pub tap: Option<TapChanger>,
    #[serde(default = "one")]
    pub parallel: i32,
}

fn one() -> i32 {
    1
}

/// Off-nominal tap on the high-voltage side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TapChanger {
    pub pos: f64,
    #[serde(default)]
    pub neutral: f64,
    pub step_percent: f64,
}

impl TapChanger {
    pub fn ratio(&self) -> f64 {
        1.0 + (self.pos - self.neutral) * 0.01 * self.step_percent
    }
}

impl TransformerParams {
    /// Builds parameters from a percent impedance and X/R ratio.
    pub fn from_impedance_percent(sn_mva: f64, z_percent: f64, x_over_r: f64) -> Self {
        let vkr_percent = z_percent / (1.0 + x_over_r * x_over_r).sqrt();
        Self {
            sn_mva,
            vk_percent: z_percent,
            vkr_percent,
            pfe_kw: 0.0,
            i0_percent: 0.0,
            tap: None,
            parallel: 1,
        }
    }

    /// Series impedance on the system base.
    pub fn z_pu(&self, s_base_mva: f64) -> PfResult<Complex64> {
        if self.sn_mva <= 0.0 || self.parallel < 1 {
            return Err(PfError::domain(format!(
                "transformer rating {} MVA with {} parallel units",
                self.sn_mva, self.parallel
            )));
        }
        let vk = self.vk_percent * 0.01;
        let vkr = self.vkr_percent * 0.01;
        if vkr > vk {
            return Err(PfError::domain(format!(
                "vkr_percent {} exceeds vk_percent {}",
                self.vkr_percent, self.vk_percent
            )));
        }
        let rebase = s_base_mva / self.sn_mva;
        let re = vkr * rebase;
        let im = (vk * vk - vkr * vkr).sqrt() * rebase;
        Ok(Complex64::new(re, im) / self.parallel as f64)
    }

    /// Magnetizing admittance on the system base, if the core is modelled.
    pub fn y_magnetizing_pu(&self, s_base_mva: f64) -> Option<Complex64> {
        if self.i0_percent <= 0.0 {
            return None;
        }
        let y_abs = self.i0_percent * 0.01;
        let g = (0.001 * self.pfe_kw / self.sn_mva).min(y_abs);
        let b = -(y_abs * y_abs - g * g).sqrt();
        let y = Complex64::new(g, b) * self.sn_mva / s_base_mva * self.parallel as f64;
        y.is_finite().then_some(y)
    }

    /// Primitive admittance with the tap on the `hv` terminal.
    pub fn primitive(&self, hv: &str, lv: &str, s_base_mva: f64) -> PfResult<BranchPrimitive> {
        let y = Admittance::from_impedance(self.z_pu(s_base_mva)?)?.0;
        let tap_m = self.tap.as_ref().map_or(1.0, TapChanger::ratio);
        if tap_m <= 0.0 {
            return Err(PfError::domain(format!("tap ratio {tap_m}")));
        }
        let mut m = Matrix2::new(y / (tap_m * tap_m), -y / tap_m, -y / tap_m, y);
        if let Some(c) = self.y_magnetizing_pu(s_base_mva) {
            m[(0, 0)] += 0.5 * c / (tap_m * tap_m);
            m[(1, 1)] += 0.5 * c;
        }
        Ok(BranchPrimitive::new(Port2::between(hv, lv), m))
    }
}

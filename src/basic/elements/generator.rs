//! Generator setpoints and the machine data used by fault analysis.
//!
//! A generator either regulates the voltage magnitude of its bus
//! ([`GeneratorControl::Voltage`]) or injects a fixed reactive power
//! ([`GeneratorControl::Power`]). Only voltage-controlled units can hold the
//! slack role. The subtransient reactance and grounding are ignored by the
//! power flow and read only by the fault analyzer.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

/// How a generator participates in the power-flow equations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum GeneratorControl {
    /// Holds the bus voltage magnitude at `vm_pu`.
    Voltage { vm_pu: f64 },
    /// Injects a fixed reactive power (MVAr).
    Power {
        #[serde(default)]
        q_mvar: f64,
    },
}

impl Default for GeneratorControl {
    fn default() -> Self {
        GeneratorControl::Voltage { vm_pu: 1.0 }
    }
}

/// Neutral grounding of a machine.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Grounding {
    #[default]
    Solid,
    /// Grounded through a resistance (p.u. on the system base).
    Resistance { r_pu: f64 },
    Ungrounded,
}

impl Grounding {
    /// Whether a machine with this grounding feeds a symmetric fault.
    pub fn contributes_fault_current(&self) -> bool {
        !matches!(self, Grounding::Ungrounded)
    }
}

/// Parameters of a generator as supplied to the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorParams {
    /// Active power setpoint (MW).
    pub p_mw: f64,
    #[serde(default)]
    pub control: GeneratorControl,
    /// Subtransient reactance X″ (p.u. on `sn_mva`).
    #[serde(default = "default_xdpp")]
    pub xdpp_pu: f64,
    /// Machine rating (MVA). Defaults to the system base.
    #[serde(default)]
    pub sn_mva: Option<f64>,
    #[serde(default)]
    pub grounding: Grounding,
}

fn default_xdpp() -> f64 {
    0.2
}

impl GeneratorParams {
    pub fn voltage_controlled(p_mw: f64, vm_pu: f64) -> Self {
        Self {
            p_mw,
            control: GeneratorControl::Voltage { vm_pu },
            xdpp_pu: default_xdpp(),
            sn_mva: None,
            grounding: Grounding::Solid,
        }
    }

    pub fn fixed_power(p_mw: f64, q_mvar: f64) -> Self {
        Self {
            control: GeneratorControl::Power { q_mvar },
            ..Self::voltage_controlled(p_mw, 1.0)
        }
    }

    pub fn with_subtransient(mut self, xdpp_pu: f64, sn_mva: Option<f64>) -> Self {
        self.xdpp_pu = xdpp_pu;
        self.sn_mva = sn_mva;
        self
    }

    pub fn with_grounding(mut self, grounding: Grounding) -> Self {
        self.grounding = grounding;
        self
    }
}

/// A generator attached to a bus of a finalized network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generator {
    pub name: String,
    pub bus: String,
    pub params: GeneratorParams,
}

impl Generator {
    pub fn voltage_setpoint(&self) -> Option<f64> {
        match self.params.control {
            GeneratorControl::Voltage { vm_pu } => Some(vm_pu),
            GeneratorControl::Power { .. } => None,
        }
    }

    /// Reactive setpoint; zero for voltage-controlled units.
    pub fn q_mvar(&self) -> f64 {
        match self.params.control {
            GeneratorControl::Voltage { .. } => 0.0,
            GeneratorControl::Power { q_mvar } => q_mvar,
        }
    }

    /// X″ converted to the system base.
    pub fn xdpp_system_pu(&self, s_base_mva: f64) -> f64 {
        let sn = self.params.sn_mva.unwrap_or(s_base_mva);
        self.params.xdpp_pu * s_base_mva / sn
    }

    /// Admittance the machine adds to its bus diagonal during a fault, if any.
    pub fn subtransient_admittance(&self, s_base_mva: f64) -> Option<Complex64> {
        if !self.params.grounding.contributes_fault_current() {
            return None;
        }
        let x = self.xdpp_system_pu(s_base_mva);
        Some(Complex64::new(0.0, x).inv())
    }
}

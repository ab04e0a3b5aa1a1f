use num_complex::Complex64;
use serde::{Deserialize, Serialize};

/// Classification fixing which of (magnitude, angle) the power flow solves for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BusType {
    /// Reference bus: magnitude and angle are fixed.
    Slack,
    /// Voltage-controlled bus: magnitude fixed, angle solved.
    PV,
    /// Load bus: magnitude and angle solved.
    #[default]
    PQ,
}

impl BusType {
    pub fn solves_angle(self) -> bool {
        !matches!(self, BusType::Slack)
    }

    pub fn solves_magnitude(self) -> bool {
        matches!(self, BusType::PQ)
    }
}

/// A network node with its declared operating point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bus {
    pub name: String,
    /// Base voltage (kV).
    pub vn_kv: f64,
    /// Voltage magnitude (p.u.).
    pub vm_pu: f64,
    /// Voltage angle (rad).
    pub va_rad: f64,
    pub bus_type: BusType,
}

impl Bus {
    pub fn new(name: impl Into<String>, vn_kv: f64) -> Self {
        Self {
            name: name.into(),
            vn_kv,
            vm_pu: 1.0,
            va_rad: 0.0,
            bus_type: BusType::PQ,
        }
    }

    pub fn voltage(&self) -> Complex64 {
        Complex64::from_polar(self.vm_pu, self.va_rad)
    }
}

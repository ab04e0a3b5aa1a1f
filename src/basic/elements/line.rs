use std::f64::consts::PI;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::basic::{
    error::{PfError, PfResult},
    system::admittance::BranchPrimitive,
};

/// Electrical data of an overhead line or cable, per unit length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineParams {
    pub r_ohm_per_km: f64,
    pub x_ohm_per_km: f64,
    #[serde(default)]
    pub g_us_per_km: f64,
    #[serde(default)]
    pub c_nf_per_km: f64,
    pub length_km: f64,
    #[serde(default = "one")]
    pub parallel: i32,
}

fn one() -> i32 {
    1
}

impl LineParams {
    /// Series impedance of the whole line in ohm.
    pub fn z_ohm(&self) -> Complex64 {
        Complex64::new(self.r_ohm_per_km, self.x_ohm_per_km) * self.length_km
            / self.parallel as f64
    }

    /// Total shunt admittance in siemens.
    pub fn y_shunt_siemens(&self, f_hz: f64) -> Complex64 {
        let g = self.g_us_per_km * 1e-6;
        let b = 2.0 * PI * f_hz * self.c_nf_per_km * 1e-9;
        Complex64::new(g, b) * self.length_km * self.parallel as f64
    }

    /// Pi-model primitive in p.u. on `s_base_mva` and the line's base voltage.
    pub fn primitive(
        &self,
        from: &str,
        to: &str,
        vn_kv: f64,
        s_base_mva: f64,
        f_hz: f64,
    ) -> PfResult<BranchPrimitive> {
        if self.parallel < 1 || self.length_km <= 0.0 {
            return Err(PfError::domain(format!(
                "line {from}-{to}: length {} km with {} parallel systems",
                self.length_km, self.parallel
            )));
        }
        if vn_kv <= 0.0 {
            return Err(PfError::domain(format!(
                "line {from}-{to}: base voltage {vn_kv} kV"
            )));
        }
        let z_base = vn_kv * vn_kv / s_base_mva;
        BranchPrimitive::pi(
            from,
            to,
            self.z_ohm() / z_base,
            self.y_shunt_siemens(f_hz) * z_base,
        )
    }
}

const KM_PER_MILE: f64 = 1.60934;
const EPSILON_0: f64 = 8.854e-12;

/// Stranded conductor data as found in manufacturer tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conductor {
    pub name: String,
    /// Outside diameter (in).
    pub diameter_in: f64,
    /// Geometric mean radius (ft).
    pub gmr_ft: f64,
    /// AC resistance (ohm/mi).
    pub r_ohm_per_mile: f64,
}

/// Identical conductors on the corners of a regular polygon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    pub conductor: Conductor,
    pub count: u32,
    /// Distance between neighbouring subconductors (ft).
    pub spacing_ft: f64,
}

impl Bundle {
    /// Geometric mean of `radius` with the distances to the other
    /// subconductors.
    fn equivalent_radius(&self, radius: f64) -> f64 {
        let n = self.count as f64;
        if self.count == 1 {
            return radius;
        }
        let circumradius = self.spacing_ft / (2.0 * (PI / n).sin());
        (n * radius * circumradius.powf(n - 1.0)).powf(1.0 / n)
    }

    /// Bundle GMR used for the series inductance (ft).
    pub fn dsl(&self) -> f64 {
        self.equivalent_radius(self.conductor.gmr_ft)
    }

    /// Bundle radius used for the shunt capacitance (ft).
    pub fn dsc(&self) -> f64 {
        self.equivalent_radius(self.conductor.diameter_in / 24.0)
    }
}

/// Phase conductor positions (ft) of a transposed three-phase line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseGeometry {
    pub a: (f64, f64),
    pub b: (f64, f64),
    pub c: (f64, f64),
}

impl PhaseGeometry {
    /// Horizontal arrangement with equal spacing between neighbours.
    pub fn flat(spacing_ft: f64) -> Self {
        Self {
            a: (0.0, 0.0),
            b: (spacing_ft, 0.0),
            c: (2.0 * spacing_ft, 0.0),
        }
    }

    /// Equivalent spacing `Deq = (Dab·Dbc·Dca)^(1/3)`.
    pub fn deq(&self) -> f64 {
        let d = |p: (f64, f64), q: (f64, f64)| (p.0 - q.0).hypot(p.1 - q.1);
        (d(self.a, self.b) * d(self.b, self.c) * d(self.c, self.a)).cbrt()
    }
}

impl LineParams {
    /// Per-km parameters of a transposed line from its bundle and phase
    /// geometry at `f_hz`.
    pub fn from_geometry(
        bundle: &Bundle,
        geometry: &PhaseGeometry,
        f_hz: f64,
        length_km: f64,
    ) -> PfResult<Self> {
        let c = &bundle.conductor;
        if bundle.count == 0
            || !(c.diameter_in > 0.0 && c.gmr_ft > 0.0 && c.r_ohm_per_mile >= 0.0)
            || !(bundle.count == 1 || bundle.spacing_ft > 0.0)
        {
            return Err(PfError::domain(format!(
                "bundle of {} x {}: invalid conductor or spacing",
                bundle.count, c.name
            )));
        }
        let (deq, dsl, dsc) = (geometry.deq(), bundle.dsl(), bundle.dsc());
        if !(deq > dsl && deq > dsc) {
            return Err(PfError::domain(format!(
                "phase spacing {deq} ft does not exceed bundle radius of {}",
                c.name
            )));
        }
        let omega = 2.0 * PI * f_hz;
        Ok(Self {
            r_ohm_per_km: c.r_ohm_per_mile / bundle.count as f64 / KM_PER_MILE,
            x_ohm_per_km: omega * 2e-7 * 1e3 * (deq / dsl).ln(),
            g_us_per_km: 0.0,
            c_nf_per_km: 2.0 * PI * EPSILON_0 / (deq / dsc).ln() * 1e3 * 1e9,
            length_km,
            parallel: 1,
        })
    }
}

//! Symmetric (three-phase) fault analysis on the bus impedance matrix.
//!
//! Machines whose grounding lets them feed a fault add their subtransient
//! admittance to the diagonal of their bus. The augmented Ybus is inverted
//! once; every fault is then evaluated from a single Zbus column.

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::error::{PfError, PfResult};
use super::newtonpf::PowerFlowResult;
use super::solver::PIVOT_TOLERANCE;
use super::system::{BusIndex, Network, YBus};

/// Voltage profile assumed before the fault.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Prefault {
    /// Uniform `vm_pu`∠0 on every bus.
    Flat {
        #[serde(default = "unity")]
        vm_pu: f64,
    },
    /// Voltages of a converged power flow.
    FromPowerFlow,
}

fn unity() -> f64 {
    1.0
}

impl Default for Prefault {
    fn default() -> Self {
        Prefault::Flat { vm_pu: 1.0 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultConfig {
    pub prefault: Prefault,
    /// Fault impedance `(re, im)` in p.u.; zero for a bolted fault.
    pub fault_impedance: (f64, f64),
}

impl FaultConfig {
    pub fn z_fault(&self) -> Complex64 {
        Complex64::new(self.fault_impedance.0, self.fault_impedance.1)
    }
}

/// Current a machine feeds into a fault.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorContribution {
    pub name: String,
    pub bus: String,
    pub current_pu: Complex64,
}

/// Result of one fault.
#[derive(Debug, Clone, PartialEq)]
pub struct FaultReport {
    pub bus: String,
    pub bus_index: usize,
    pub current_pu: Complex64,
    /// Fault current magnitude on the base voltage of the faulted bus.
    pub current_ka: f64,
    /// Post-fault voltage of every bus (p.u.).
    pub voltages: DVector<Complex64>,
    pub contributions: Vec<GeneratorContribution>,
}

impl FaultReport {
    pub fn current_magnitude(&self) -> f64 {
        self.current_pu.norm()
    }

    pub fn current_angle(&self) -> f64 {
        self.current_pu.arg()
    }
}

#[derive(Debug, Clone)]
struct Machine {
    name: String,
    bus: usize,
    y_subtransient: Complex64,
}

/// Inverts a complex matrix, failing when a pivot drops below the relative
/// tolerance or the inverse is not finite.
pub fn invert(matrix: &DMatrix<Complex64>, what: &str) -> PfResult<DMatrix<Complex64>> {
    if !matrix.is_square() {
        return Err(PfError::singular(format!("{what} is not square")));
    }
    if matrix.is_empty() {
        return Ok(matrix.clone());
    }
    let lu = matrix.clone().lu();
    let u = lu.u();
    let scale = u.iter().map(|x| x.norm()).fold(0.0, f64::max);
    for row in 0..u.nrows() {
        let pivot = u[(row, row)].norm();
        if !(pivot > PIVOT_TOLERANCE * scale) {
            return Err(PfError::singular(format!(
                "{what} has pivot {pivot:.3e} at row {row}"
            )));
        }
    }
    let inverse = lu
        .try_inverse()
        .ok_or_else(|| PfError::singular(format!("{what} is not invertible")))?;
    if inverse.iter().any(|z| !z.is_finite()) {
        return Err(PfError::singular(format!("{what} inverse is not finite")));
    }
    Ok(inverse)
}

/// Zbus-based symmetric fault solver for one network snapshot.
#[derive(Debug, Clone)]
pub struct FaultAnalyzer {
    index: BusIndex,
    vn_kv: Vec<f64>,
    s_base_mva: f64,
    machines: Vec<Machine>,
    zbus: DMatrix<Complex64>,
    prefault: DVector<Complex64>,
    z_fault: Complex64,
}

impl FaultAnalyzer {
    /// Ybus with subtransient admittances of fault-feeding machines added.
    pub fn augmented_ybus(network: &Network) -> PfResult<YBus> {
        let mut ybus = network.y_bus()?;
        for machine in Self::machines(network) {
            ybus[(machine.bus, machine.bus)] += machine.y_subtransient;
        }
        Ok(ybus)
    }

    fn machines(network: &Network) -> impl Iterator<Item = Machine> + '_ {
        let s_base = network.s_base_mva();
        network.generators().iter().filter_map(move |g| {
            let bus = network.bus_index().get(&g.bus)?;
            let y = g.subtransient_admittance(s_base)?;
            Some(Machine {
                name: g.name.clone(),
                bus,
                y_subtransient: y,
            })
        })
    }

    /// Prepares Zbus and the prefault voltages. `power_flow` is required
    /// when the prefault profile is taken from a power-flow solution.
    pub fn new(
        network: &Network,
        config: &FaultConfig,
        power_flow: Option<&PowerFlowResult>,
    ) -> PfResult<Self> {
        let n = network.bus_index().len();
        let prefault = match &config.prefault {
            Prefault::Flat { vm_pu } => DVector::from_element(n, Complex64::new(*vm_pu, 0.0)),
            Prefault::FromPowerFlow => {
                let pf = power_flow.ok_or_else(|| {
                    PfError::config("prefault from power flow requested without a solution")
                })?;
                if !pf.converged() {
                    return Err(PfError::config(format!(
                        "prefault power flow did not converge ({:?})",
                        pf.status
                    )));
                }
                let v = pf.voltages();
                if v.len() != n {
                    return Err(PfError::config(format!(
                        "power flow has {} buses, network has {n}",
                        v.len()
                    )));
                }
                v
            }
        };

        let ybus = Self::augmented_ybus(network)?;
        let zbus = invert(&ybus, "augmented Ybus").inspect_err(|err| {
            warn!(network = network.name(), %err, "cannot build Zbus");
        })?;
        let machines: Vec<_> = Self::machines(network).collect();
        debug!(
            network = network.name(),
            machines = machines.len(),
            "Zbus ready"
        );

        Ok(Self {
            index: network.bus_index().clone(),
            vn_kv: network.buses().iter().map(|b| b.vn_kv).collect(),
            s_base_mva: network.s_base_mva(),
            machines,
            zbus,
            prefault,
            z_fault: config.z_fault(),
        })
    }

    pub fn zbus(&self) -> &DMatrix<Complex64> {
        &self.zbus
    }

    pub fn prefault(&self) -> &DVector<Complex64> {
        &self.prefault
    }

    /// Buses hosting at least one fault-feeding machine.
    pub fn contributing_buses(&self) -> Vec<usize> {
        let mut buses: Vec<_> = self.machines.iter().map(|m| m.bus).collect();
        buses.sort_unstable();
        buses.dedup();
        buses
    }

    pub fn analyze(&self, bus: &str) -> PfResult<FaultReport> {
        let f = self.index.require(bus)?;
        self.analyze_index(f)
    }

    pub fn analyze_index(&self, f: usize) -> PfResult<FaultReport> {
        if f >= self.index.len() {
            return Err(PfError::config(format!("bus position {f} out of range")));
        }
        let z_ff = self.zbus[(f, f)] + self.z_fault;
        if !(z_ff.norm() > 0.0) {
            return Err(PfError::singular(format!(
                "zero fault path impedance at bus '{}'",
                self.index.name(f)
            )));
        }
        let current = self.prefault[f] / z_ff;
        let voltages = DVector::from_fn(self.index.len(), |k, _| {
            self.prefault[k] - self.zbus[(k, f)] * current
        });
        let contributions = self
            .machines
            .iter()
            .map(|m| GeneratorContribution {
                name: m.name.clone(),
                bus: self.index.name(m.bus).to_string(),
                current_pu: self.zbus[(m.bus, f)] * current * m.y_subtransient,
            })
            .collect();
        let i_base_ka = self.s_base_mva / (3f64.sqrt() * self.vn_kv[f]);
        let report = FaultReport {
            bus: self.index.name(f).to_string(),
            bus_index: f,
            current_pu: current,
            current_ka: current.norm() * i_base_ka,
            voltages,
            contributions,
        };
        info!(
            bus = %report.bus,
            current_pu = report.current_magnitude(),
            angle_deg = report.current_angle().to_degrees(),
            current_ka = report.current_ka,
            "three-phase fault"
        );
        Ok(report)
    }

    /// Faults every bus in turn.
    pub fn analyze_all(&self) -> PfResult<Vec<FaultReport>> {
        (0..self.index.len()).map(|f| self.analyze_index(f)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::elements::{GeneratorParams, Grounding};
    use crate::basic::newtonpf::{PowerFlowConfig, PowerFlowSolver};
    use crate::basic::system::{BranchPrimitive, NetworkBuilder};
    use crate::testcases::seven_bus;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn single_machine(grounding: Grounding) -> Network {
        let mut b = NetworkBuilder::new("one", 100.0);
        b.add_bus("A", 20.0).unwrap();
        b.add_generator(
            "G",
            "A",
            GeneratorParams::voltage_controlled(0.0, 1.0)
                .with_subtransient(0.1, None)
                .with_grounding(grounding),
        )
        .unwrap();
        b.set_slack_bus("A").unwrap();
        b.build().unwrap()
    }

    fn assert_identity(m: &DMatrix<Complex64>, eps: f64) {
        for i in 0..m.nrows() {
            for j in 0..m.ncols() {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!(
                    (m[(i, j)] - Complex64::new(expected, 0.0)).norm() < eps,
                    "entry ({i}, {j}) = {}",
                    m[(i, j)]
                );
            }
        }
    }

    #[test]
    fn bolted_fault_behind_subtransient_reactance() {
        let network = single_machine(Grounding::Solid);
        let fa = FaultAnalyzer::new(&network, &FaultConfig::default(), None).unwrap();
        assert_relative_eq!(fa.zbus()[(0, 0)].im, 0.1, epsilon = 1e-12);
        let report = fa.analyze("A").unwrap();
        assert_relative_eq!(report.current_magnitude(), 10.0, epsilon = 1e-9);
        assert_relative_eq!(report.current_angle().to_degrees(), -90.0, epsilon = 1e-9);
        assert!(report.voltages[0].norm() < 1e-12);
        assert_relative_eq!(report.current_ka, 10.0 * 100.0 / (3f64.sqrt() * 20.0), epsilon = 1e-9);
        assert_eq!(report.contributions.len(), 1);
        assert!((report.contributions[0].current_pu - report.current_pu).norm() < 1e-9);
    }

    #[test]
    fn resistance_grounded_machine_still_feeds_symmetric_fault() {
        let network = single_machine(Grounding::Resistance { r_pu: 0.5 });
        let fa = FaultAnalyzer::new(&network, &FaultConfig::default(), None).unwrap();
        assert_eq!(fa.contributing_buses(), vec![0]);
        assert_relative_eq!(fa.analyze_index(0).unwrap().current_magnitude(), 10.0, epsilon = 1e-9);
    }

    #[test]
    fn ungrounded_network_without_shunts_is_singular() {
        let network = single_machine(Grounding::Ungrounded);
        let err = FaultAnalyzer::new(&network, &FaultConfig::default(), None).unwrap_err();
        assert!(matches!(err, PfError::SingularSystem { .. }));
    }

    #[test]
    fn floating_series_network_is_singular() {
        let mut b = NetworkBuilder::new("float", 100.0);
        b.add_bus("A", 20.0).unwrap();
        b.add_bus("B", 20.0).unwrap();
        b.add_branch(
            "AB",
            BranchPrimitive::series("A", "B", Complex64::new(0.01, 0.1)).unwrap(),
        )
        .unwrap();
        b.add_generator(
            "G",
            "A",
            GeneratorParams::voltage_controlled(0.0, 1.0).with_grounding(Grounding::Ungrounded),
        )
        .unwrap();
        b.set_slack_bus("A").unwrap();
        let network = b.build().unwrap();
        let ybus = FaultAnalyzer::augmented_ybus(&network).unwrap();
        assert!(matches!(
            invert(&ybus, "Ybus").unwrap_err(),
            PfError::SingularSystem { .. }
        ));
    }

    #[test]
    fn zbus_inverts_augmented_ybus() {
        let network = seven_bus().unwrap();
        let ybus = FaultAnalyzer::augmented_ybus(&network).unwrap();
        let fa = FaultAnalyzer::new(&network, &FaultConfig::default(), None).unwrap();
        assert_identity(&(fa.zbus() * &ybus), 1e-9);
        assert_eq!(fa.contributing_buses(), vec![0, 6]);
    }

    #[test]
    fn seven_bus_fault_levels() {
        let network = seven_bus().unwrap();
        let fa = FaultAnalyzer::new(&network, &FaultConfig::default(), None).unwrap();
        let reports = fa.analyze_all().unwrap();
        assert_eq!(reports.len(), 7);
        assert_relative_eq!(reports[0].current_magnitude(), 11.9416, epsilon = 1e-3);
        assert_relative_eq!(reports[0].current_ka, 34.472, epsilon = 1e-2);
        assert_relative_eq!(reports[2].current_magnitude(), 9.1531, epsilon = 1e-3);
        for report in &reports {
            assert!(report.voltages[report.bus_index].norm() < 1e-9);
            assert!(report.current_angle() < 0.0);
            // the remainder flows through line charging
            let fed: Complex64 = report.contributions.iter().map(|c| c.current_pu).sum();
            assert!((fed - report.current_pu).norm() < 0.05 * report.current_magnitude());
        }
    }

    #[test]
    fn fault_impedance_limits_current() {
        let network = single_machine(Grounding::Solid);
        let config = FaultConfig {
            fault_impedance: (0.0, 0.1),
            ..Default::default()
        };
        let report = FaultAnalyzer::new(&network, &config, None)
            .unwrap()
            .analyze("A")
            .unwrap();
        assert_relative_eq!(report.current_magnitude(), 5.0, epsilon = 1e-9);
        assert_relative_eq!(report.voltages[0].norm(), 0.5, epsilon = 1e-9);
    }

    #[test]
    fn prefault_from_power_flow() {
        let network = seven_bus().unwrap();
        let config = FaultConfig {
            prefault: Prefault::FromPowerFlow,
            ..Default::default()
        };
        assert!(matches!(
            FaultAnalyzer::new(&network, &config, None).unwrap_err(),
            PfError::Configuration { .. }
        ));
        let pf = PowerFlowSolver::new(PowerFlowConfig::default())
            .solve(&network)
            .unwrap();
        let fa = FaultAnalyzer::new(&network, &config, Some(&pf)).unwrap();
        let report = fa.analyze("Bus3").unwrap();
        let expected = pf.voltages()[2] / fa.zbus()[(2, 2)];
        assert!((report.current_pu - expected).norm() < 1e-12);
        // unfaulted buses keep part of their prefault voltage
        assert!(report.voltages[0].norm() > 0.1);
    }

    #[test]
    fn unknown_bus_is_rejected() {
        let network = single_machine(Grounding::Solid);
        let fa = FaultAnalyzer::new(&network, &FaultConfig::default(), None).unwrap();
        assert!(matches!(
            fa.analyze("Z").unwrap_err(),
            PfError::Configuration { .. }
        ));
    }

    #[test]
    fn config_deserializes() {
        let cfg: FaultConfig =
            serde_json::from_str(r#"{"prefault": {"kind": "flat", "vm_pu": 1.05}}"#).unwrap();
        assert_eq!(cfg.prefault, Prefault::Flat { vm_pu: 1.05 });
        assert_eq!(cfg.z_fault(), Complex64::new(0.0, 0.0));
    }

    proptest! {
        #[test]
        fn zbus_times_ybus_is_identity(
            lines in prop::collection::vec((0.005f64..0.1, 0.02f64..0.5), 1..6),
            shunt in 0.01f64..0.5,
        ) {
            let mut b = NetworkBuilder::new("radial", 100.0);
            b.add_bus("b0", 20.0).unwrap();
            for (k, (r, x)) in lines.iter().enumerate() {
                let from = format!("b{k}");
                let to = format!("b{}", k + 1);
                b.add_bus(to.clone(), 20.0).unwrap();
                b.add_branch(
                    format!("l{k}"),
                    BranchPrimitive::pi(&from, &to, Complex64::new(*r, *x), Complex64::new(0.0, 0.02)).unwrap(),
                )
                .unwrap();
            }
            b.add_branch("sh", BranchPrimitive::shunt(format!("b{}", lines.len()), Complex64::new(shunt, 0.0)))
                .unwrap();
            b.add_generator("G", "b0", GeneratorParams::voltage_controlled(0.0, 1.0)).unwrap();
            b.set_slack_bus("b0").unwrap();
            let network = b.build().unwrap();
            let ybus = FaultAnalyzer::augmented_ybus(&network).unwrap();
            let zbus = invert(&ybus, "Ybus").unwrap();
            let product = &zbus * &ybus;
            for i in 0..product.nrows() {
                for j in 0..product.ncols() {
                    let expected = if i == j { 1.0 } else { 0.0 };
                    prop_assert!((product[(i, j)] - Complex64::new(expected, 0.0)).norm() < 1e-9);
                }
            }
        }
    }
}

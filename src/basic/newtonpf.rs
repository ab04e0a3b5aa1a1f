//! Newton-Raphson power flow.
//!
//! The solver drives `[ΔP non-slack] ++ [ΔQ PQ]`, with Δ = specified −
//! calculated, below the configured tolerance. Each step solves
//! `J · Δx = mismatch` and **adds** `Δx` to the unknown angles and
//! magnitudes.

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::error::{PfError, PfResult};
use super::jacobian::{BusOrdering, JacobianForm, build_jacobian};
use super::solver::{DefaultSolver, Solve};
use super::system::Network;

/// Options of a power-flow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerFlowConfig {
    /// Mismatch evaluations allowed before giving up.
    pub max_it: usize,
    /// Convergence threshold on the largest absolute mismatch (p.u.).
    pub tol: f64,
    pub jacobian: JacobianForm,
    /// Start PQ buses from 1.0∠0 instead of their declared values.
    pub flat_start: bool,
}

impl Default for PowerFlowConfig {
    fn default() -> Self {
        Self {
            max_it: 20,
            tol: 1e-6,
            jacobian: JacobianForm::Polar,
            flat_start: false,
        }
    }
}

/// Lifecycle of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolveStatus {
    Initialized,
    Iterating,
    Converged,
    DivergedMaxIterations,
    SingularJacobian,
}

impl SolveStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SolveStatus::Converged | SolveStatus::DivergedMaxIterations | SolveStatus::SingularJacobian
        )
    }
}

/// Per-bus voltage state updated in place by the solver.
#[derive(Debug, Clone, PartialEq)]
pub struct PowerFlowState {
    pub vm: DVector<f64>,
    pub va: DVector<f64>,
    pub status: SolveStatus,
}

impl PowerFlowState {
    /// Declared voltages of the network.
    pub fn from_network(network: &Network) -> Self {
        let buses = network.buses();
        Self {
            vm: DVector::from_iterator(buses.len(), buses.iter().map(|b| b.vm_pu)),
            va: DVector::from_iterator(buses.len(), buses.iter().map(|b| b.va_rad)),
            status: SolveStatus::Initialized,
        }
    }

    /// 1.0∠0 on PQ buses; PV and slack keep their magnitude, the slack its angle.
    pub fn flat(network: &Network) -> Self {
        let mut state = Self::from_network(network);
        for (i, bus) in network.buses().iter().enumerate() {
            if bus.bus_type.solves_magnitude() {
                state.vm[i] = 1.0;
            }
            if bus.bus_type.solves_angle() {
                state.va[i] = 0.0;
            }
        }
        state
    }

    pub fn voltages(&self) -> DVector<Complex64> {
        polar_voltages(&self.vm, &self.va)
    }
}

/// Complex bus voltages from magnitudes and angles (rad).
pub fn polar_voltages(vm: &DVector<f64>, va: &DVector<f64>) -> DVector<Complex64> {
    DVector::from_iterator(
        vm.len(),
        vm.iter().zip(va.iter()).map(|(m, a)| Complex64::from_polar(*m, *a)),
    )
}

/// Complex injections `S = V · conj(Ybus · V)` in p.u.
pub fn calc_injections(ybus: &DMatrix<Complex64>, v: &DVector<Complex64>) -> DVector<Complex64> {
    v.component_mul(&(ybus * v).conjugate())
}

/// Outcome of a power-flow run.
#[derive(Debug, Clone)]
pub struct PowerFlowResult {
    pub status: SolveStatus,
    /// Number of mismatch evaluations.
    pub iterations: usize,
    /// Last mismatch vector in Newton order.
    pub mismatch: DVector<f64>,
    pub max_mismatch: f64,
    pub state: PowerFlowState,
    /// Calculated injections at the final state (p.u.).
    pub s_calc: DVector<Complex64>,
    pub s_base_mva: f64,
}

impl PowerFlowResult {
    pub fn converged(&self) -> bool {
        self.status == SolveStatus::Converged
    }

    pub fn voltages(&self) -> DVector<Complex64> {
        self.state.voltages()
    }

    /// Calculated bus injections in MW / MVAr.
    pub fn injections_mva(&self) -> DVector<Complex64> {
        self.s_calc.map(|s| s * self.s_base_mva)
    }

    /// Maps non-converged outcomes to an error.
    pub fn into_result(self) -> PfResult<Self> {
        match self.status {
            SolveStatus::Converged => Ok(self),
            SolveStatus::SingularJacobian => Err(PfError::singular(format!(
                "Jacobian is singular at iteration {} (max mismatch {:.3e})",
                self.iterations, self.max_mismatch
            ))),
            _ => Err(PfError::ConvergenceFailure {
                iterations: self.iterations,
                max_mismatch: self.max_mismatch,
                mismatch: self.mismatch.iter().copied().collect(),
            }),
        }
    }
}

/// Newton-Raphson driver parameterized over the linear solver.
#[derive(Debug, Clone, Default)]
pub struct PowerFlowSolver<S: Solve = DefaultSolver> {
    pub config: PowerFlowConfig,
    solver: S,
}

impl PowerFlowSolver<DefaultSolver> {
    pub fn new(config: PowerFlowConfig) -> Self {
        Self {
            config,
            solver: DefaultSolver::default(),
        }
    }
}

impl<S: Solve> PowerFlowSolver<S> {
    pub fn with_solver(config: PowerFlowConfig, solver: S) -> Self {
        Self { config, solver }
    }

    /// Solves from the initial state selected by the configuration.
    pub fn solve(&mut self, network: &Network) -> PfResult<PowerFlowResult> {
        let mut state = if self.config.flat_start {
            PowerFlowState::flat(network)
        } else {
            PowerFlowState::from_network(network)
        };
        self.solve_with(network, &mut state)
    }

    /// Runs the iteration on a caller-owned state, which holds the last
    /// iterate when this returns, converged or not.
    ///
    /// Only Ybus assembly can fail here; numerical outcomes are reported
    /// through [`PowerFlowResult::status`].
    pub fn solve_with(
        &mut self,
        network: &Network,
        state: &mut PowerFlowState,
    ) -> PfResult<PowerFlowResult> {
        let n = network.bus_index().len();
        if state.vm.len() != n || state.va.len() != n {
            return Err(PfError::config(format!(
                "state has {} buses, network '{}' has {n}",
                state.vm.len(),
                network.name()
            )));
        }
        let ybus = network.y_bus()?;
        let s_spec = network.specified_injections();
        let ordering = BusOrdering::new(&network.bus_types());
        let max_it = self.config.max_it.max(1);
        let n_a = ordering.n_angle();

        self.solver.reset();
        state.status = SolveStatus::Iterating;
        let mut iterations = 0;
        let (mismatch, max_mismatch, s_calc) = loop {
            let s_calc = calc_injections(&ybus, &state.voltages());
            let mismatch = ordering.mismatch(&(&s_spec - &s_calc));
            iterations += 1;
            // `amax` skips NaN entries
            let finite = mismatch.iter().all(|x| x.is_finite());
            let max_mismatch = if !finite {
                f64::NAN
            } else if mismatch.is_empty() {
                0.0
            } else {
                mismatch.amax()
            };
            debug!(iteration = iterations, max_mismatch, "newton iteration");

            if finite && max_mismatch < self.config.tol {
                state.status = SolveStatus::Converged;
                info!(
                    network = network.name(),
                    iterations, max_mismatch, "power flow converged"
                );
                break (mismatch, max_mismatch, s_calc);
            }
            if iterations >= max_it || !finite {
                state.status = SolveStatus::DivergedMaxIterations;
                warn!(
                    network = network.name(),
                    iterations, max_mismatch, "power flow did not converge"
                );
                break (mismatch, max_mismatch, s_calc);
            }

            let jac = build_jacobian(self.config.jacobian, &ybus, &state.vm, &state.va, &ordering);
            let mut dx = mismatch.clone();
            if let Err(err) = self.solver.solve(&jac, &mut dx) {
                state.status = SolveStatus::SingularJacobian;
                warn!(
                    network = network.name(),
                    iterations, %err, "singular Jacobian"
                );
                break (mismatch, max_mismatch, s_calc);
            }
            for (k, &i) in ordering.angle.iter().enumerate() {
                state.va[i] += dx[k];
            }
            for (k, &i) in ordering.magnitude.iter().enumerate() {
                state.vm[i] += dx[n_a + k];
            }
        };

        Ok(PowerFlowResult {
            status: state.status,
            iterations,
            mismatch,
            max_mismatch,
            state: state.clone(),
            s_calc,
            s_base_mva: network.s_base_mva(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::elements::GeneratorParams;
    use crate::basic::system::{BranchPrimitive, NetworkBuilder};
    use crate::testcases::{seven_bus, two_bus};
    use approx::assert_relative_eq;

    #[test]
    fn two_bus_flat_start_converges() {
        let network = two_bus().unwrap();
        let mut pf = PowerFlowSolver::new(PowerFlowConfig {
            flat_start: true,
            ..Default::default()
        });
        let res = pf.solve(&network).unwrap();
        assert_eq!(res.status, SolveStatus::Converged);
        assert!(res.iterations <= 10);
        assert!(res.max_mismatch < 1e-6);
        let vm = res.state.vm[1];
        let va = res.state.va[1];
        assert!((0.90..0.98).contains(&vm));
        assert_relative_eq!(vm, 0.972_582, epsilon = 1e-5);
        assert!(va < 0.0);
        assert_relative_eq!(va, -0.037_023, epsilon = 1e-5);
    }

    #[test]
    fn both_jacobian_forms_reach_same_state() {
        let network = seven_bus().unwrap();
        let polar = PowerFlowSolver::new(PowerFlowConfig::default())
            .solve(&network)
            .unwrap();
        let complex = PowerFlowSolver::new(PowerFlowConfig {
            jacobian: JacobianForm::ComplexMatrix,
            ..Default::default()
        })
        .solve(&network)
        .unwrap();
        assert!(polar.converged() && complex.converged());
        for i in 0..network.buses().len() {
            assert_relative_eq!(polar.state.vm[i], complex.state.vm[i], epsilon = 1e-8);
            assert_relative_eq!(polar.state.va[i], complex.state.va[i], epsilon = 1e-8);
        }
    }

    #[test]
    fn balanced_start_converges_in_one_iteration() {
        let mut b = NetworkBuilder::new("idle", 100.0);
        b.add_bus("A", 20.0).unwrap();
        b.add_bus("B", 20.0).unwrap();
        b.add_branch(
            "AB",
            BranchPrimitive::series("A", "B", Complex64::new(0.01, 0.1)).unwrap(),
        )
        .unwrap();
        b.add_generator("G", "A", GeneratorParams::voltage_controlled(0.0, 1.0))
            .unwrap();
        b.set_slack_bus("A").unwrap();
        let network = b.build().unwrap();
        let res = PowerFlowSolver::new(PowerFlowConfig::default())
            .solve(&network)
            .unwrap();
        assert_eq!(res.status, SolveStatus::Converged);
        assert_eq!(res.iterations, 1);
        assert_eq!(res.max_mismatch, 0.0);
    }

    #[test]
    fn islanded_bus_gives_singular_jacobian() {
        let mut b = NetworkBuilder::new("island", 100.0);
        b.add_bus("A", 20.0).unwrap();
        b.add_bus("B", 20.0).unwrap();
        b.add_generator("G", "A", GeneratorParams::voltage_controlled(0.0, 1.0))
            .unwrap();
        b.add_load("L", "B", 10.0, 5.0).unwrap();
        b.set_slack_bus("A").unwrap();
        let network = b.build().unwrap();
        let res = PowerFlowSolver::new(PowerFlowConfig::default())
            .solve(&network)
            .unwrap();
        assert_eq!(res.status, SolveStatus::SingularJacobian);
        assert_eq!(res.iterations, 1);
        assert!(matches!(
            res.into_result().unwrap_err(),
            PfError::SingularSystem { .. }
        ));
    }

    #[test]
    fn infeasible_load_exhausts_iterations() {
        let mut b = NetworkBuilder::new("heavy", 100.0);
        b.add_bus("A", 20.0).unwrap();
        b.add_bus("B", 20.0).unwrap();
        b.add_branch(
            "AB",
            BranchPrimitive::series("A", "B", Complex64::new(0.1, 0.5)).unwrap(),
        )
        .unwrap();
        b.add_generator("G", "A", GeneratorParams::voltage_controlled(0.0, 1.0))
            .unwrap();
        b.add_load("L", "B", 1000.0, 800.0).unwrap();
        b.set_slack_bus("A").unwrap();
        let network = b.build().unwrap();
        let mut state = PowerFlowState::from_network(&network);
        let res = PowerFlowSolver::new(PowerFlowConfig {
            max_it: 8,
            ..Default::default()
        })
        .solve_with(&network, &mut state)
        .unwrap();
        assert_eq!(res.status, SolveStatus::DivergedMaxIterations);
        assert_eq!(res.iterations, 8);
        assert_eq!(state.status, res.status);
        assert!(res.max_mismatch >= PowerFlowConfig::default().tol);

        let last = res.mismatch.clone();
        let max_mismatch = res.max_mismatch;
        match res.into_result().unwrap_err() {
            PfError::ConvergenceFailure {
                iterations,
                max_mismatch: reported,
                mismatch,
            } => {
                assert_eq!(iterations, 8);
                assert_eq!(mismatch.len(), 2);
                assert_eq!(mismatch, last.iter().copied().collect::<Vec<_>>());
                assert_eq!(reported.to_bits(), max_mismatch.to_bits());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn non_finite_mismatch_never_converges() {
        let network = two_bus().unwrap();
        let mut state = PowerFlowState::from_network(&network);
        state.vm[1] = f64::NAN;
        let res = PowerFlowSolver::new(PowerFlowConfig::default())
            .solve_with(&network, &mut state)
            .unwrap();
        assert_eq!(res.status, SolveStatus::DivergedMaxIterations);
        assert_eq!(res.iterations, 1);
        assert!(res.max_mismatch.is_nan());
        assert!(res.mismatch.iter().any(|x| x.is_nan()));
        assert!(matches!(
            res.into_result().unwrap_err(),
            PfError::ConvergenceFailure { .. }
        ));
    }

    #[test]
    fn mismatched_state_is_rejected() {
        let network = two_bus().unwrap();
        let mut state = PowerFlowState::from_network(&network);
        state.vm = DVector::from_element(5, 1.0);
        let err = PowerFlowSolver::new(PowerFlowConfig::default())
            .solve_with(&network, &mut state)
            .unwrap_err();
        assert!(matches!(err, PfError::Configuration { .. }));
    }

    #[test]
    fn seven_bus_balances_power() {
        let network = seven_bus().unwrap();
        let res = PowerFlowSolver::new(PowerFlowConfig::default())
            .solve(&network)
            .unwrap()
            .into_result()
            .unwrap();
        let s = res.injections_mva();
        let idx = network.bus_index();
        // PQ and PV injections hit their setpoints
        assert_relative_eq!(s[idx.require("Bus3").unwrap()].re, -110.0, epsilon = 1e-3);
        assert_relative_eq!(s[idx.require("Bus4").unwrap()].im, -70.0, epsilon = 1e-3);
        assert_relative_eq!(s[idx.require("Bus7").unwrap()].re, 200.0, epsilon = 1e-3);
        // slack covers load plus losses
        let slack_p = s[idx.require("Bus1").unwrap()].re;
        assert!(slack_p > 110.0 && slack_p < 130.0);
        for i in 0..network.buses().len() {
            assert!(res.state.vm[i] > 0.9 && res.state.vm[i] < 1.1);
        }
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let cfg: PowerFlowConfig = serde_json::from_str(r#"{"tol": 1e-8}"#).unwrap();
        assert_eq!(cfg.max_it, 20);
        assert_eq!(cfg.tol, 1e-8);
        assert_eq!(cfg.jacobian, JacobianForm::Polar);
    }
}

//! Network registry and the finalized network snapshot.
//!
//! [`NetworkBuilder`] collects buses, branches, generators and loads by name
//! and validates references as they are added. [`NetworkBuilder::build`]
//! converts every branch element into a [`BranchPrimitive`], checks the slack
//! assignment and freezes the bus order into a [`BusIndex`] that every solver
//! component reuses.

use std::collections::{HashMap, HashSet};

use nalgebra::DVector;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::admittance::{BranchPrimitive, Terminal};
use super::ybus::{YBus, assemble_ybus};
use crate::basic::elements::*;
use crate::basic::error::{PfError, PfResult};

/// Fixed mapping between bus names and matrix positions.
///
/// Built once per network snapshot, in bus registration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BusIndex {
    /// position → bus name
    names: Vec<String>,
    /// bus name → position
    lookup: HashMap<String, usize>,
}

impl BusIndex {
    pub fn new<I, S>(names: I) -> PfResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut index = BusIndex::default();
        for name in names {
            let name = name.into();
            if index.lookup.contains_key(&name) {
                return Err(PfError::config(format!("Bus '{name}' already exists.")));
            }
            index.lookup.insert(name.clone(), index.names.len());
            index.names.push(name);
        }
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<usize> {
        self.lookup.get(name).copied()
    }

    /// Position of `name`, or a configuration error naming the missing bus.
    pub fn require(&self, name: &str) -> PfResult<usize> {
        self.get(name)
            .ok_or_else(|| PfError::config(format!("Bus '{name}' does not exist in the network.")))
    }

    pub fn name(&self, idx: usize) -> &str {
        &self.names[idx]
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Position of a terminal; `None` for ground.
    pub fn terminal(&self, terminal: &Terminal) -> PfResult<Option<usize>> {
        match terminal {
            Terminal::Bus(name) => self.require(name).map(Some),
            Terminal::Ground => Ok(None),
        }
    }
}

/// A branch of a finalized network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub name: String,
    pub primitive: BranchPrimitive,
}

#[derive(Debug, Clone)]
enum BranchElement {
    Primitive(BranchPrimitive),
    Line {
        from: String,
        to: String,
        params: LineParams,
    },
    Transformer {
        hv: String,
        lv: String,
        params: TransformerParams,
    },
    Shunt {
        bus: String,
        params: ShuntParams,
    },
}

/// Registry used to assemble a [`Network`].
#[derive(Debug, Clone)]
pub struct NetworkBuilder {
    name: String,
    s_base_mva: f64,
    f_hz: f64,
    buses: Vec<Bus>,
    bus_lookup: HashMap<String, usize>,
    branches: Vec<(String, BranchElement)>,
    branch_names: HashSet<String>,
    generators: Vec<Generator>,
    loads: Vec<Load>,
}

impl NetworkBuilder {
    pub fn new(name: impl Into<String>, s_base_mva: f64) -> Self {
        Self {
            name: name.into(),
            s_base_mva,
            f_hz: 60.0,
            buses: Vec::new(),
            bus_lookup: HashMap::new(),
            branches: Vec::new(),
            branch_names: HashSet::new(),
            generators: Vec::new(),
            loads: Vec::new(),
        }
    }

    pub fn with_frequency(mut self, f_hz: f64) -> Self {
        self.f_hz = f_hz;
        self
    }

    fn bus_mut(&mut self, name: &str) -> PfResult<&mut Bus> {
        let idx = *self
            .bus_lookup
            .get(name)
            .ok_or_else(|| PfError::config(format!("Bus '{name}' does not exist in the network.")))?;
        Ok(&mut self.buses[idx])
    }

    fn ensure_bus(&self, name: &str) -> PfResult<()> {
        if self.bus_lookup.contains_key(name) {
            Ok(())
        } else {
            Err(PfError::config(format!(
                "Bus '{name}' does not exist in the network."
            )))
        }
    }

    fn ensure_finite(owner: &str, field: &str, value: f64) -> PfResult<()> {
        if value.is_finite() {
            Ok(())
        } else {
            Err(PfError::config(format!("{owner} has non-finite {field} {value}.")))
        }
    }

    fn claim_branch_name(&mut self, name: &str) -> PfResult<()> {
        if !self.branch_names.insert(name.to_string()) {
            return Err(PfError::config(format!("Branch '{name}' already exists.")));
        }
        Ok(())
    }

    pub fn add_bus(&mut self, name: impl Into<String>, vn_kv: f64) -> PfResult<&mut Self> {
        let name = name.into();
        if self.bus_lookup.contains_key(&name) {
            return Err(PfError::config(format!("Bus '{name}' already exists.")));
        }
        if !(vn_kv.is_finite() && vn_kv > 0.0) {
            return Err(PfError::config(format!(
                "Bus '{name}' has invalid base voltage {vn_kv} kV."
            )));
        }
        self.bus_lookup.insert(name.clone(), self.buses.len());
        self.buses.push(Bus::new(name, vn_kv));
        Ok(self)
    }

    /// Overrides the declared initial voltage of a bus.
    pub fn set_bus_voltage(&mut self, name: &str, vm_pu: f64, va_rad: f64) -> PfResult<&mut Self> {
        let owner = format!("Bus '{name}'");
        Self::ensure_finite(&owner, "vm_pu", vm_pu)?;
        Self::ensure_finite(&owner, "va_rad", va_rad)?;
        let bus = self.bus_mut(name)?;
        bus.vm_pu = vm_pu;
        bus.va_rad = va_rad;
        Ok(self)
    }

    /// Adds a branch whose primitive admittance is already known.
    pub fn add_branch(
        &mut self,
        name: impl Into<String>,
        primitive: BranchPrimitive,
    ) -> PfResult<&mut Self> {
        let name = name.into();
        for terminal in primitive.port.terminals() {
            if let Some(bus) = terminal.bus_name() {
                self.ensure_bus(bus)?;
            }
        }
        self.claim_branch_name(&name)?;
        self.branches
            .push((name, BranchElement::Primitive(primitive)));
        Ok(self)
    }

    pub fn add_line(
        &mut self,
        name: impl Into<String>,
        from: &str,
        to: &str,
        params: LineParams,
    ) -> PfResult<&mut Self> {
        let name = name.into();
        self.ensure_bus(from)?;
        self.ensure_bus(to)?;
        self.claim_branch_name(&name)?;
        self.branches.push((
            name,
            BranchElement::Line {
                from: from.to_string(),
                to: to.to_string(),
                params,
            },
        ));
        Ok(self)
    }

    pub fn add_transformer(
        &mut self,
        name: impl Into<String>,
        hv: &str,
        lv: &str,
        params: TransformerParams,
    ) -> PfResult<&mut Self> {
        let name = name.into();
        self.ensure_bus(hv)?;
        self.ensure_bus(lv)?;
        self.claim_branch_name(&name)?;
        self.branches.push((
            name,
            BranchElement::Transformer {
                hv: hv.to_string(),
                lv: lv.to_string(),
                params,
            },
        ));
        Ok(self)
    }

    pub fn add_shunt(
        &mut self,
        name: impl Into<String>,
        bus: &str,
        params: ShuntParams,
    ) -> PfResult<&mut Self> {
        let name = name.into();
        self.ensure_bus(bus)?;
        self.claim_branch_name(&name)?;
        self.branches.push((
            name,
            BranchElement::Shunt {
                bus: bus.to_string(),
                params,
            },
        ));
        Ok(self)
    }

    /// Adds a generator. A voltage-controlled unit promotes a PQ bus to PV and
    /// fixes the bus magnitude at its setpoint; it never takes the slack role.
    pub fn add_generator(
        &mut self,
        name: impl Into<String>,
        bus: &str,
        params: GeneratorParams,
    ) -> PfResult<&mut Self> {
        let name = name.into();
        if self.generators.iter().any(|g| g.name == name) {
            return Err(PfError::config(format!("Generator '{name}' already exists.")));
        }
        if !(params.xdpp_pu.is_finite() && params.xdpp_pu > 0.0) {
            return Err(PfError::config(format!(
                "Generator '{name}' has invalid subtransient reactance {}.",
                params.xdpp_pu
            )));
        }
        if let Some(sn) = params.sn_mva {
            if !(sn.is_finite() && sn > 0.0) {
                return Err(PfError::config(format!(
                    "Generator '{name}' has invalid rating {sn} MVA."
                )));
            }
        }
        let owner = format!("Generator '{name}'");
        Self::ensure_finite(&owner, "p_mw", params.p_mw)?;
        match params.control {
            GeneratorControl::Voltage { vm_pu } => Self::ensure_finite(&owner, "vm_pu", vm_pu)?,
            GeneratorControl::Power { q_mvar } => Self::ensure_finite(&owner, "q_mvar", q_mvar)?,
        }
        let existing_setpoint = self
            .generators
            .iter()
            .filter(|g| g.bus == bus)
            .find_map(Generator::voltage_setpoint);
        let target = self.bus_mut(bus)?;
        if let GeneratorControl::Voltage { vm_pu } = params.control {
            if let Some(v) = existing_setpoint {
                if (v - vm_pu).abs() > 1e-9 {
                    return Err(PfError::config(format!(
                        "Generator '{name}' voltage setpoint {vm_pu} conflicts with {v} at bus '{bus}'."
                    )));
                }
            }
            if target.bus_type == BusType::PQ {
                target.bus_type = BusType::PV;
            }
            target.vm_pu = vm_pu;
        }
        self.generators.push(Generator {
            name,
            bus: bus.to_string(),
            params,
        });
        Ok(self)
    }

    pub fn add_load(
        &mut self,
        name: impl Into<String>,
        bus: &str,
        p_mw: f64,
        q_mvar: f64,
    ) -> PfResult<&mut Self> {
        let name = name.into();
        self.ensure_bus(bus)?;
        if self.loads.iter().any(|l| l.name == name) {
            return Err(PfError::config(format!("Load '{name}' already exists.")));
        }
        let owner = format!("Load '{name}'");
        Self::ensure_finite(&owner, "p_mw", p_mw)?;
        Self::ensure_finite(&owner, "q_mvar", q_mvar)?;
        self.loads.push(Load {
            name,
            bus: bus.to_string(),
            p_mw,
            q_mvar,
        });
        Ok(self)
    }

    /// Makes `name` the slack bus. The bus must host a voltage-controlled
    /// generator; the previous slack bus is demoted to PV.
    pub fn set_slack_bus(&mut self, name: &str) -> PfResult<&mut Self> {
        self.ensure_bus(name)?;
        let regulated = self
            .generators
            .iter()
            .any(|g| g.bus == name && g.voltage_setpoint().is_some());
        if !regulated {
            return Err(PfError::config(format!(
                "Bus '{name}' hosts no voltage-controlled generator and cannot be the slack bus."
            )));
        }
        for bus in self.buses.iter_mut() {
            if bus.bus_type == BusType::Slack {
                bus.bus_type = BusType::PV;
            }
        }
        self.bus_mut(name)?.bus_type = BusType::Slack;
        Ok(self)
    }

    /// Validates the registry and freezes it into a [`Network`].
    pub fn build(&self) -> PfResult<Network> {
        if !(self.s_base_mva.is_finite() && self.s_base_mva > 0.0) {
            return Err(PfError::config(format!(
                "Invalid system base {} MVA.",
                self.s_base_mva
            )));
        }
        let slack: Vec<_> = self
            .buses
            .iter()
            .filter(|b| b.bus_type == BusType::Slack)
            .map(|b| b.name.as_str())
            .collect();
        match slack.len() {
            0 => return Err(PfError::config("No slack bus has been assigned.")),
            1 => {}
            _ => {
                return Err(PfError::config(format!(
                    "More than one slack bus: {}",
                    slack.join(", ")
                )));
            }
        }

        let index = BusIndex::new(self.buses.iter().map(|b| b.name.clone()))?;
        let vn_kv = |bus: &str| -> PfResult<f64> { Ok(self.buses[index.require(bus)?].vn_kv) };

        let mut branches = Vec::with_capacity(self.branches.len());
        for (name, element) in &self.branches {
            let primitive = match element {
                BranchElement::Primitive(p) => Ok(p.clone()),
                BranchElement::Line { from, to, params } => {
                    params.primitive(from, to, vn_kv(from)?, self.s_base_mva, self.f_hz)
                }
                BranchElement::Transformer { hv, lv, params } => {
                    params.primitive(hv, lv, self.s_base_mva)
                }
                BranchElement::Shunt { bus, params } => params.primitive(bus, self.s_base_mva),
            }
            .map_err(|e| match e {
                PfError::NumericalDomain { what } => {
                    PfError::config(format!("Branch '{name}': {what}"))
                }
                other => other,
            })?;
            if !primitive.is_finite() {
                return Err(PfError::config(format!(
                    "Branch '{name}' has a non-finite primitive admittance."
                )));
            }
            for terminal in primitive.port.terminals() {
                index.terminal(terminal)?;
            }
            branches.push(Branch {
                name: name.clone(),
                primitive,
            });
        }

        debug!(
            network = %self.name,
            buses = self.buses.len(),
            branches = branches.len(),
            generators = self.generators.len(),
            loads = self.loads.len(),
            "network finalized"
        );

        Ok(Network {
            name: self.name.clone(),
            s_base_mva: self.s_base_mva,
            f_hz: self.f_hz,
            buses: self.buses.clone(),
            index,
            branches,
            generators: self.generators.clone(),
            loads: self.loads.clone(),
        })
    }
}

/// Immutable, validated network snapshot.
#[derive(Debug, Clone)]
pub struct Network {
    name: String,
    s_base_mva: f64,
    f_hz: f64,
    buses: Vec<Bus>,
    index: BusIndex,
    branches: Vec<Branch>,
    generators: Vec<Generator>,
    loads: Vec<Load>,
}

impl Network {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn s_base_mva(&self) -> f64 {
        self.s_base_mva
    }

    pub fn f_hz(&self) -> f64 {
        self.f_hz
    }

    pub fn bus_index(&self) -> &BusIndex {
        &self.index
    }

    pub fn buses(&self) -> &[Bus] {
        &self.buses
    }

    pub fn bus(&self, name: &str) -> Option<&Bus> {
        self.index.get(name).map(|i| &self.buses[i])
    }

    pub fn bus_types(&self) -> Vec<BusType> {
        self.buses.iter().map(|b| b.bus_type).collect()
    }

    pub fn slack_bus(&self) -> usize {
        self.buses
            .iter()
            .position(|b| b.bus_type == BusType::Slack)
            .unwrap_or_default()
    }

    pub fn branches(&self) -> &[Branch] {
        &self.branches
    }

    pub fn primitives(&self) -> impl Iterator<Item = &BranchPrimitive> {
        self.branches.iter().map(|b| &b.primitive)
    }

    pub fn generators(&self) -> &[Generator] {
        &self.generators
    }

    pub fn loads(&self) -> &[Load] {
        &self.loads
    }

    /// Assembles the bus admittance matrix of this snapshot.
    pub fn y_bus(&self) -> PfResult<YBus> {
        assemble_ybus(&self.index, self.primitives())
    }

    /// Specified complex injection per bus in p.u.: generation minus demand.
    pub fn specified_injections(&self) -> DVector<Complex64> {
        let mut s_bus = DVector::zeros(self.index.len());
        let divider = 1.0 / self.s_base_mva;
        for unit in &self.generators {
            if let Some(idx) = self.index.get(&unit.bus) {
                s_bus[idx] += Complex64::new(unit.params.p_mw, unit.q_mvar());
            }
        }
        for load in &self.loads {
            if let Some(idx) = self.index.get(&load.bus) {
                s_bus[idx] -= Complex64::new(load.p_mw, load.q_mvar);
            }
        }
        s_bus.apply(|x| (*x) *= divider);
        s_bus
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_bus() -> NetworkBuilder {
        let mut b = NetworkBuilder::new("two", 100.0);
        b.add_bus("Bus1", 230.0).unwrap();
        b.add_bus("Bus2", 230.0).unwrap();
        b.add_branch(
            "L1",
            BranchPrimitive::series("Bus1", "Bus2", Complex64::new(0.02, 0.08)).unwrap(),
        )
        .unwrap();
        b.add_generator("G1", "Bus1", GeneratorParams::voltage_controlled(0.0, 1.0))
            .unwrap();
        b
    }

    #[test]
    fn duplicate_bus_is_rejected() {
        let mut b = two_bus();
        let err = b.add_bus("Bus1", 20.0).unwrap_err();
        assert!(matches!(err, PfError::Configuration { .. }));
    }

    #[test]
    fn unknown_bus_reference_is_rejected() {
        let mut b = two_bus();
        assert!(b.add_load("L1", "Bus9", 10.0, 5.0).is_err());
        let br = BranchPrimitive::series("Bus1", "Bus9", Complex64::new(0.0, 0.1)).unwrap();
        assert!(b.add_branch("X", br).is_err());
        assert!(
            b.add_generator("G9", "Bus9", GeneratorParams::voltage_controlled(1.0, 1.0))
                .is_err()
        );
    }

    #[test]
    fn duplicate_branch_name_is_rejected() {
        let mut b = two_bus();
        let br = BranchPrimitive::series("Bus1", "Bus2", Complex64::new(0.0, 0.1)).unwrap();
        let err = b.add_branch("L1", br).unwrap_err();
        assert!(format!("{err}").contains("L1"));
    }

    #[test]
    fn build_requires_a_slack_bus() {
        let err = two_bus().build().unwrap_err();
        assert!(format!("{err}").contains("slack"));
    }

    #[test]
    fn slack_requires_regulating_generator() {
        let mut b = two_bus();
        assert!(b.set_slack_bus("Bus2").is_err());
        b.set_slack_bus("Bus1").unwrap();
        let net = b.build().unwrap();
        assert_eq!(net.slack_bus(), 0);
        assert_eq!(net.bus_types(), vec![BusType::Slack, BusType::PQ]);
    }

    #[test]
    fn reassigning_slack_demotes_previous_to_pv() {
        let mut b = two_bus();
        b.add_generator("G2", "Bus2", GeneratorParams::voltage_controlled(20.0, 1.02))
            .unwrap();
        b.set_slack_bus("Bus1").unwrap();
        b.set_slack_bus("Bus2").unwrap();
        let net = b.build().unwrap();
        assert_eq!(net.bus_types(), vec![BusType::PV, BusType::Slack]);
        assert_eq!(net.bus("Bus2").unwrap().voltage(), Complex64::new(1.02, 0.0));
    }

    #[test]
    fn fixed_power_generator_keeps_pq_bus() {
        let mut b = two_bus();
        b.add_generator("G2", "Bus2", GeneratorParams::fixed_power(30.0, 10.0))
            .unwrap();
        b.add_load("Ld", "Bus2", 50.0, 20.0).unwrap();
        b.set_slack_bus("Bus1").unwrap();
        let net = b.build().unwrap();
        assert_eq!(net.bus("Bus2").unwrap().bus_type, BusType::PQ);
        let s = net.specified_injections();
        assert!((s[1] - Complex64::new(-0.2, -0.1)).norm() < 1e-12);
    }

    #[test]
    fn conflicting_voltage_setpoints_are_rejected() {
        let mut b = two_bus();
        let err = b
            .add_generator("G1b", "Bus1", GeneratorParams::voltage_controlled(0.0, 1.05))
            .unwrap_err();
        assert!(matches!(err, PfError::Configuration { .. }));
    }

    fn is_config<T>(res: PfResult<T>) -> bool {
        matches!(res, Err(PfError::Configuration { .. }))
    }

    #[test]
    fn non_finite_setpoints_are_rejected() {
        let mut b = two_bus();
        assert!(is_config(b.add_load("L1", "Bus2", f64::NAN, 0.0)));
        assert!(is_config(b.add_load("L2", "Bus2", 10.0, f64::INFINITY)));
        assert!(is_config(b.add_generator(
            "G2",
            "Bus2",
            GeneratorParams::fixed_power(f64::NAN, 0.0)
        )));
        assert!(is_config(b.add_generator(
            "G3",
            "Bus2",
            GeneratorParams::fixed_power(10.0, f64::NEG_INFINITY)
        )));
        assert!(is_config(b.add_generator(
            "G4",
            "Bus2",
            GeneratorParams::voltage_controlled(10.0, f64::NAN)
        )));
        assert!(is_config(b.set_bus_voltage("Bus2", f64::NAN, 0.0)));
        assert!(is_config(b.set_bus_voltage("Bus2", 1.0, f64::INFINITY)));

        b.set_slack_bus("Bus1").unwrap();
        let net = b.build().unwrap();
        assert!(net.loads().is_empty());
        assert_eq!(net.generators().len(), 1);
        assert_eq!(net.bus_types()[1], BusType::PQ);
    }

    #[test]
    fn generator_rating_must_be_positive() {
        let mut b = two_bus();
        for sn in [0.0, -50.0, f64::NAN] {
            let err = b
                .add_generator(
                    "G2",
                    "Bus2",
                    GeneratorParams::fixed_power(10.0, 0.0).with_subtransient(0.1, Some(sn)),
                )
                .unwrap_err();
            assert!(matches!(err, PfError::Configuration { .. }));
            assert!(format!("{err}").contains("rating"));
        }
        b.add_generator(
            "G2",
            "Bus2",
            GeneratorParams::fixed_power(10.0, 0.0).with_subtransient(0.1, Some(50.0)),
        )
        .unwrap();
    }

    #[test]
    fn degenerate_element_surfaces_as_configuration_error() {
        let mut b = two_bus();
        b.add_transformer(
            "T1",
            "Bus1",
            "Bus2",
            TransformerParams::from_impedance_percent(0.0, 10.0, 10.0),
        )
        .unwrap();
        b.set_slack_bus("Bus1").unwrap();
        let err = b.build().unwrap_err();
        assert!(matches!(err, PfError::Configuration { .. }));
        assert!(format!("{err}").contains("T1"));
    }

    #[test]
    fn non_finite_primitive_is_rejected() {
        let mut b = two_bus();
        b.add_branch(
            "bad",
            BranchPrimitive::shunt("Bus2", Complex64::new(f64::NAN, 0.0)),
        )
        .unwrap();
        b.set_slack_bus("Bus1").unwrap();
        assert!(matches!(
            b.build().unwrap_err(),
            PfError::Configuration { .. }
        ));
    }

    #[test]
    fn bus_index_follows_registration_order() {
        let mut b = two_bus();
        b.add_bus("Bus0", 20.0).unwrap();
        b.set_slack_bus("Bus1").unwrap();
        let net = b.build().unwrap();
        let index = net.bus_index();
        assert_eq!(index.names(), &["Bus1", "Bus2", "Bus0"]);
        assert_eq!(index.get("Bus0"), Some(2));
        assert!(index.require("nope").is_err());
    }
}

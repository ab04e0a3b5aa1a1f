//! JSON case files.
//!
//! A case lists buses, branch elements, generators and loads by name,
//! names the slack bus and optionally carries solver settings:
//!
//! ```json
//! {
//!   "name": "two_bus",
//!   "s_base_mva": 100.0,
//!   "bus": [{"name": "Bus1", "vn_kv": 230.0}, {"name": "Bus2", "vn_kv": 230.0}],
//!   "branch": [{"name": "Line1", "from_bus": "Bus1", "to_bus": "Bus2", "r_pu": 0.02, "x_pu": 0.08}],
//!   "gen": [{"name": "G1", "bus": "Bus1", "p_mw": 0.0, "control": {"mode": "voltage", "vm_pu": 1.0}}],
//!   "load": [{"name": "Load2", "bus": "Bus2", "p_mw": 50.0, "q_mvar": 20.0}],
//!   "slack": "Bus1"
//! }
//! ```

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::basic::elements::{GeneratorParams, LineParams, ShuntParams, TransformerParams};
use crate::basic::error::{PfError, PfResult};
use crate::basic::fault::FaultConfig;
use crate::basic::newtonpf::PowerFlowConfig;
use crate::basic::system::{BranchPrimitive, Network, NetworkBuilder};

fn sixty() -> f64 {
    60.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusRecord {
    pub name: String,
    pub vn_kv: f64,
    #[serde(default)]
    pub vm_pu: Option<f64>,
    #[serde(default)]
    pub va_degree: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineRecord {
    pub name: String,
    pub from_bus: String,
    pub to_bus: String,
    #[serde(flatten)]
    pub params: LineParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafoRecord {
    pub name: String,
    pub hv_bus: String,
    pub lv_bus: String,
    #[serde(flatten)]
    pub params: TransformerParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShuntRecord {
    pub name: String,
    pub bus: String,
    #[serde(flatten)]
    pub params: ShuntParams,
}

/// Raw per-unit pi branch. Without `to_bus`, the series impedance (if any)
/// and `b_pu` connect `from_bus` to ground.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchRecord {
    pub name: String,
    pub from_bus: String,
    #[serde(default)]
    pub to_bus: Option<String>,
    #[serde(default)]
    pub r_pu: f64,
    #[serde(default)]
    pub x_pu: f64,
    /// Total charging susceptance (p.u.).
    #[serde(default)]
    pub b_pu: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenRecord {
    pub name: String,
    pub bus: String,
    #[serde(flatten)]
    pub params: GeneratorParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadRecord {
    pub name: String,
    pub bus: String,
    pub p_mw: f64,
    #[serde(default)]
    pub q_mvar: f64,
}

/// On-disk layout of a case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseFile {
    pub name: String,
    pub s_base_mva: f64,
    #[serde(default = "sixty")]
    pub f_hz: f64,
    #[serde(default)]
    pub bus: Vec<BusRecord>,
    #[serde(default)]
    pub line: Vec<LineRecord>,
    #[serde(default)]
    pub trafo: Vec<TrafoRecord>,
    #[serde(default)]
    pub shunt: Vec<ShuntRecord>,
    #[serde(default)]
    pub branch: Vec<BranchRecord>,
    #[serde(default, rename = "gen")]
    pub generator: Vec<GenRecord>,
    #[serde(default)]
    pub load: Vec<LoadRecord>,
    pub slack: String,
    #[serde(default)]
    pub power_flow: PowerFlowConfig,
    #[serde(default)]
    pub fault: FaultConfig,
}

impl CaseFile {
    /// Registers every record, in file order, on a fresh builder.
    pub fn to_builder(&self) -> PfResult<NetworkBuilder> {
        let mut builder = NetworkBuilder::new(&self.name, self.s_base_mva).with_frequency(self.f_hz);
        for bus in &self.bus {
            builder.add_bus(&bus.name, bus.vn_kv)?;
            if bus.vm_pu.is_some() || bus.va_degree.is_some() {
                builder.set_bus_voltage(
                    &bus.name,
                    bus.vm_pu.unwrap_or(1.0),
                    bus.va_degree.unwrap_or(0.0).to_radians(),
                )?;
            }
        }
        for br in &self.branch {
            let primitive = match &br.to_bus {
                Some(to) => BranchPrimitive::pi(
                    &br.from_bus,
                    to,
                    Complex64::new(br.r_pu, br.x_pu),
                    Complex64::new(0.0, br.b_pu),
                ),
                None => {
                    let z = Complex64::new(br.r_pu, br.x_pu);
                    let y_series = if z.norm() > 0.0 { z.inv() } else { Complex64::new(0.0, 0.0) };
                    Ok(BranchPrimitive::shunt(
                        &br.from_bus,
                        y_series + Complex64::new(0.0, br.b_pu),
                    ))
                }
            }
            .map_err(|e| PfError::config(format!("Branch '{}': {e}", br.name)))?;
            builder.add_branch(&br.name, primitive)?;
        }
        for line in &self.line {
            builder.add_line(&line.name, &line.from_bus, &line.to_bus, line.params.clone())?;
        }
        for trafo in &self.trafo {
            builder.add_transformer(&trafo.name, &trafo.hv_bus, &trafo.lv_bus, trafo.params.clone())?;
        }
        for shunt in &self.shunt {
            builder.add_shunt(&shunt.name, &shunt.bus, shunt.params.clone())?;
        }
        for unit in &self.generator {
            builder.add_generator(&unit.name, &unit.bus, unit.params.clone())?;
        }
        for load in &self.load {
            builder.add_load(&load.name, &load.bus, load.p_mw, load.q_mvar)?;
        }
        builder.set_slack_bus(&self.slack)?;
        Ok(builder)
    }
}

/// A validated network with the solver settings it was stored with.
#[derive(Debug, Clone)]
pub struct Case {
    pub network: Network,
    pub power_flow: PowerFlowConfig,
    pub fault: FaultConfig,
}

impl TryFrom<CaseFile> for Case {
    type Error = PfError;

    fn try_from(file: CaseFile) -> PfResult<Self> {
        let network = file.to_builder()?.build()?;
        Ok(Case {
            network,
            power_flow: file.power_flow,
            fault: file.fault,
        })
    }
}

pub fn parse_case(json: &str) -> PfResult<Case> {
    let file: CaseFile = serde_json::from_str(json)?;
    Case::try_from(file)
}

pub fn load_case(path: impl AsRef<Path>) -> PfResult<Case> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);
    let file: CaseFile = serde_json::from_reader(reader)?;
    debug!(path = %path.display(), case = %file.name, "case file read");
    Case::try_from(file)
}

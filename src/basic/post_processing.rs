//! Result extraction and markdown tables for power-flow and fault results.

use nalgebra::Vector2;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use tabled::{Table, settings::Style};

mod res_display;
use res_display::*;

use super::fault::FaultReport;
use super::newtonpf::PowerFlowResult;
use super::system::Network;

/// Solved operating point of a bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusResult {
    pub name: String,
    pub vm_pu: f64,
    pub va_degree: f64,
    /// Net injection (MW), generation positive.
    pub p_mw: f64,
    pub q_mvar: f64,
}

/// Power flow through a branch, measured at both terminals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BranchFlow {
    pub name: String,
    pub from: String,
    pub to: String,
    pub p_from_mw: f64,
    pub q_from_mvar: f64,
    pub p_to_mw: f64,
    pub q_to_mvar: f64,
    pub pl_mw: f64,
    pub ql_mvar: f64,
    pub i_from_ka: f64,
    pub i_to_ka: f64,
}

/// Per-bus voltages and injections.
pub fn bus_results(network: &Network, res: &PowerFlowResult) -> Vec<BusResult> {
    let s = res.injections_mva();
    network
        .buses()
        .iter()
        .enumerate()
        .map(|(i, bus)| BusResult {
            name: bus.name.clone(),
            vm_pu: res.state.vm[i],
            va_degree: res.state.va[i].to_degrees(),
            p_mw: s[i].re,
            q_mvar: s[i].im,
        })
        .collect()
}

/// Terminal flows of every branch, from `I = Y_prim · [V_from, V_to]`.
/// A ground terminal is held at zero voltage.
pub fn branch_flows(network: &Network, res: &PowerFlowResult) -> Vec<BranchFlow> {
    let v = res.voltages();
    let index = network.bus_index();
    let s_base = network.s_base_mva();
    let kv = |pos: Option<usize>| pos.map_or(0.0, |i| network.buses()[i].vn_kv);
    network
        .branches()
        .iter()
        .map(|branch| {
            let port = &branch.primitive.port;
            let ends = [
                port.from.bus_name().and_then(|b| index.get(b)),
                port.to.bus_name().and_then(|b| index.get(b)),
            ];
            let vt = Vector2::new(
                ends[0].map_or(Complex64::new(0.0, 0.0), |i| v[i]),
                ends[1].map_or(Complex64::new(0.0, 0.0), |i| v[i]),
            );
            let it = branch.primitive.y * vt;
            let s_from = vt[0] * it[0].conj() * s_base;
            let s_to = vt[1] * it[1].conj() * s_base;
            let i_ka = |i: Complex64, vn: f64| {
                if vn > 0.0 {
                    i.norm() * s_base / (3f64.sqrt() * vn)
                } else {
                    0.0
                }
            };
            BranchFlow {
                name: branch.name.clone(),
                from: port.from.bus_name().unwrap_or("ground").to_string(),
                to: port.to.bus_name().unwrap_or("ground").to_string(),
                p_from_mw: s_from.re,
                q_from_mvar: s_from.im,
                p_to_mw: s_to.re,
                q_to_mvar: s_to.im,
                pl_mw: s_from.re + s_to.re,
                ql_mvar: s_from.im + s_to.im,
                i_from_ka: i_ka(it[0], kv(ends[0])),
                i_to_ka: i_ka(it[1], kv(ends[1])),
            }
        })
        .collect()
}

/// Markdown rendering of solver and fault results.
pub trait PostProcessing {
    /// Bus voltages and injections as a markdown table.
    fn res_bus_table(&self, network: &Network) -> String;

    /// Branch flows as a markdown table.
    fn res_line_table(&self, network: &Network) -> String;

    fn print_res_bus(&self, network: &Network) {
        println!("{}", self.res_bus_table(network));
    }

    fn print_res_line(&self, network: &Network) {
        println!("{}", self.res_line_table(network));
    }
}

impl PostProcessing for PowerFlowResult {
    fn res_bus_table(&self, network: &Network) -> String {
        let rows = bus_results(network, self)
            .into_iter()
            .zip(network.buses())
            .map(|(r, bus)| BusResTable {
                bus: r.name,
                kind: format!("{:?}", bus.bus_type),
                vm_pu: r.vm_pu.into(),
                va_degree: r.va_degree.into(),
                p_mw: r.p_mw.into(),
                q_mvar: r.q_mvar.into(),
            });
        Table::new(rows).with(Style::markdown()).to_string()
    }

    fn res_line_table(&self, network: &Network) -> String {
        let rows = branch_flows(network, self).into_iter().map(|f| LineResTable {
            name: f.name,
            from: f.from,
            to: f.to,
            p_from_mw: f.p_from_mw.into(),
            q_from_mvar: f.q_from_mvar.into(),
            p_to_mw: f.p_to_mw.into(),
            q_to_mvar: f.q_to_mvar.into(),
            pl_mw: f.pl_mw.into(),
            ql_mvar: f.ql_mvar.into(),
            i_from_ka: f.i_from_ka.into(),
            i_to_ka: f.i_to_ka.into(),
        });
        Table::new(rows).with(Style::markdown()).to_string()
    }
}

/// One row per fault: current in p.u. and kA, and the deepest voltage dip
/// outside the faulted bus.
pub fn fault_summary_table(reports: &[FaultReport]) -> String {
    let rows = reports.iter().map(|r| {
        let vmin = r
            .voltages
            .iter()
            .enumerate()
            .filter(|(k, _)| *k != r.bus_index)
            .map(|(_, v)| v.norm())
            .fold(f64::INFINITY, f64::min);
        FaultResTable {
            bus: r.bus.clone(),
            ik_pu: r.current_magnitude().into(),
            angle_degree: r.current_angle().to_degrees().into(),
            ik_ka: r.current_ka.into(),
            vmin_pu: (if vmin.is_finite() { vmin } else { 0.0 }).into(),
        }
    });
    Table::new(rows).with(Style::markdown()).to_string()
}

/// Post-fault voltage profile of a single fault.
pub fn fault_voltage_table(network: &Network, report: &FaultReport) -> String {
    let rows = network
        .buses()
        .iter()
        .zip(report.voltages.iter())
        .map(|(bus, v)| FaultVoltageTable {
            bus: bus.name.clone(),
            vm_pu: v.norm().into(),
            va_degree: v.arg().to_degrees().into(),
        });
    Table::new(rows).with(Style::markdown()).to_string()
}

pub fn print_fault_report(network: &Network, reports: &[FaultReport]) {
    println!("{}", fault_summary_table(reports));
    for report in reports {
        println!("\nFault at {}:", report.bus);
        println!("{}", fault_voltage_table(network, report));
    }
}

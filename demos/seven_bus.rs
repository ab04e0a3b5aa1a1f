//! Solves the seven-bus reference system (or a JSON case given as the first
//! argument), prints the bus and branch tables and faults every bus.
//!
//! ```text
//! RUST_LOG=debug cargo run --example seven_bus [case.json]
//! ```

use rustpf::prelude::*;
use rustpf::testcases::seven_bus;

fn main() -> PfResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let case = match std::env::args().nth(1) {
        Some(path) => load_case(path)?,
        None => Case {
            network: seven_bus()?,
            power_flow: PowerFlowConfig::default(),
            fault: FaultConfig::default(),
        },
    };
    let network = &case.network;

    let mut pf = PowerFlowSolver::new(case.power_flow.clone());
    let res = pf.solve(network)?.into_result()?;
    println!(
        "{}: converged in {} iterations (max mismatch {:.3e})\n",
        network.name(),
        res.iterations,
        res.max_mismatch
    );
    res.print_res_bus(network);
    println!();
    res.print_res_line(network);
    println!();

    let analyzer = FaultAnalyzer::new(network, &case.fault, Some(&res))?;
    let reports = analyzer.analyze_all()?;
    print_fault_report(network, &reports);
    Ok(())
}

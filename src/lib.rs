mod basic;
pub mod io;
pub mod testcases;
pub mod prelude {
    use crate::basic;
    pub use crate::io::case::{Case, CaseFile, load_case, parse_case};
    pub use basic::*;

    pub use basic::elements::*;
    pub use basic::error::{PfError, PfResult};
    pub use basic::fault::{FaultAnalyzer, FaultConfig, FaultReport, GeneratorContribution, Prefault};
    pub use basic::jacobian::{BusOrdering, JacobianForm};
    pub use basic::newtonpf::{calc_injections, polar_voltages};
    pub use basic::post_processing::{
        BranchFlow, BusResult, PostProcessing, branch_flows, bus_results, print_fault_report,
    };
    pub use basic::solver::{DefaultSolver, DenseLuSolver, Solve, SolveError};
    #[cfg(feature = "rsparse")]
    pub use basic::solver::RSparseSolver;
    pub use basic::system::{
        Admittance, Branch, BranchPrimitive, BusIndex, Network, NetworkBuilder, Port2, Terminal,
        YBus,
    };
}

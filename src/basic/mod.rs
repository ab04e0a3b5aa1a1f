pub(crate) mod dsbus_dv;
pub mod elements;
pub mod error;
pub mod fault;
pub mod jacobian;
pub mod newtonpf;
pub mod post_processing;
pub mod solver;
pub mod system;

pub use newtonpf::{PowerFlowConfig, PowerFlowResult, PowerFlowSolver, PowerFlowState, SolveStatus};

pub mod admittance;
pub mod network;
pub mod ybus;

pub use admittance::{Admittance, BranchPrimitive, Port2, Terminal};
pub use network::{Branch, BusIndex, Network, NetworkBuilder};
pub use ybus::{YBus, assemble_ybus};

//! Plain data for the network elements and the collaborators that turn
//! physical parameters into primitive admittances.
pub mod bus;
pub mod generator;
pub mod line;
pub mod load;
pub mod shunt;
pub mod trans;

pub use bus::{Bus, BusType};
pub use generator::{Generator, GeneratorControl, GeneratorParams, Grounding};
pub use line::{Bundle, Conductor, LineParams, PhaseGeometry};
pub use load::Load;
pub use shunt::ShuntParams;
pub use trans::{TapChanger, TransformerParams};

use serde::{Deserialize, Serialize};

/// Constant-power demand at a bus (load convention: positive = consumption).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Load {
    pub name: String,
    pub bus: String,
    pub p_mw: f64,
    pub q_mvar: f64,
}

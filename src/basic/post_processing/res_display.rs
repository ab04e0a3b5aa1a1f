use std::fmt;

use derive_more::From;
use tabled::Tabled;

/// Table cell printing a float with `D` decimals.
#[derive(Clone, Copy, Default, PartialEq, PartialOrd, From)]
pub(crate) struct Fixed<const D: usize>(pub(crate) f64);

impl<const D: usize> fmt::Display for Fixed<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.*}", D, self.0)
    }
}

impl<const D: usize> fmt::Debug for Fixed<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Table row for bus results.
#[derive(Debug, Tabled)]
pub(crate) struct BusResTable {
    pub(crate) bus: String,
    pub(crate) kind: String,
    pub(crate) vm_pu: Fixed<4>,
    pub(crate) va_degree: Fixed<3>,
    pub(crate) p_mw: Fixed<3>,
    pub(crate) q_mvar: Fixed<3>,
}

/// Table row for branch flows.
#[derive(Debug, Default, Tabled)]
pub(crate) struct LineResTable {
    pub(crate) name: String,
    pub(crate) from: String,
    pub(crate) to: String,
    pub(crate) p_from_mw: Fixed<3>,
    pub(crate) q_from_mvar: Fixed<3>,
    pub(crate) p_to_mw: Fixed<3>,
    pub(crate) q_to_mvar: Fixed<3>,
    pub(crate) pl_mw: Fixed<3>,
    pub(crate) ql_mvar: Fixed<3>,
    pub(crate) i_from_ka: Fixed<3>,
    pub(crate) i_to_ka: Fixed<3>,
}

/// Table row for a fault summary.
#[derive(Debug, Tabled)]
pub(crate) struct FaultResTable {
    pub(crate) bus: String,
    pub(crate) ik_pu: Fixed<4>,
    pub(crate) angle_degree: Fixed<2>,
    pub(crate) ik_ka: Fixed<3>,
    pub(crate) vmin_pu: Fixed<4>,
}

/// Table row for post-fault bus voltages.
#[derive(Debug, Tabled)]
pub(crate) struct FaultVoltageTable {
    pub(crate) bus: String,
    pub(crate) vm_pu: Fixed<4>,
    pub(crate) va_degree: Fixed<2>,
}

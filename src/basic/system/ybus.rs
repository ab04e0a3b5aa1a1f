use nalgebra::DMatrix;
use nalgebra_sparse::CooMatrix;
use num_complex::Complex64;
use tracing::trace;

use super::admittance::BranchPrimitive;
use super::network::BusIndex;
use crate::basic::error::{PfError, PfResult};

/// Dense bus admittance matrix in p.u., indexed by [`BusIndex`] positions.
pub type YBus = DMatrix<Complex64>;

/// Assembles the nodal admittance matrix (Ybus) from branch primitives.
///
/// Every primitive entry addressing two bus terminals is stamped at the
/// corresponding (row, column) pair; entries touching a ground terminal are
/// dropped. Duplicate coordinates are summed when the triplets are densified.
///
/// # Arguments
///
/// * `index` - Bus name to matrix position mapping.
/// * `branches` - Primitive admittances of all branches, in p.u.
///
/// # Returns
///
/// The N×N Ybus, or a configuration error if a branch references an unknown
/// bus or carries a non-finite admittance.
pub fn assemble_ybus<'a, I>(index: &BusIndex, branches: I) -> PfResult<YBus>
where
    I: IntoIterator<Item = &'a BranchPrimitive>,
{
    let nodes = index.len();
    let mut triplets = CooMatrix::new(nodes, nodes);
    for branch in branches {
        if !branch.is_finite() {
            return Err(PfError::config(format!(
                "non-finite primitive admittance between {:?} and {:?}",
                branch.port.from, branch.port.to
            )));
        }
        let ends = [
            index.terminal(&branch.port.from)?,
            index.terminal(&branch.port.to)?,
        ];
        for (a, row) in ends.iter().enumerate() {
            let Some(row) = row else { continue };
            for (b, col) in ends.iter().enumerate() {
                let Some(col) = col else { continue };
                triplets.push(*row, *col, branch.y[(a, b)]);
            }
        }
    }
    trace!(nodes, entries = triplets.nnz(), "ybus assembled");
    Ok(DMatrix::from(&triplets))
}

use crate::error::LopfError;
use crate::lp::{LinearProgram, LpSolution};

/// Backend able to solve a [`LinearProgram`].
///
/// Non-optimal outcomes (infeasible, unbounded, numerical trouble) are
/// reported through the solution status. `Err` is reserved for failures to
/// run the backend at all.
pub trait LpSolver {
    fn name(&self) -> &str;

    fn supports_duals(&self) -> bool;

    fn solve(&self, lp: &LinearProgram, duals: bool) -> Result<LpSolution, LopfError>;
}

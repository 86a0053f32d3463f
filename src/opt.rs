use crate::solver::DEFAULT_SOLVER;
use std::path::PathBuf;

/// Options of a linear optimal power flow run.
#[derive(Debug, Clone, PartialEq)]
pub struct LopfOptions {
    /// LP backend, see [`crate::solver::available_solvers`].
    pub solver_name: String,

    /// Request shadow prices of the balance and thermal-limit constraints.
    pub duals: bool,

    /// Voltage angles are bounded to [-angle_bound, angle_bound] radians,
    /// the validity range of the linearization. Default value is 1.
    pub angle_bound: f64,

    /// Directory receiving the solver transcript, if any.
    pub keep_files: Option<PathBuf>,
}

impl Default for LopfOptions {
    fn default() -> Self {
        Self {
            solver_name: DEFAULT_SOLVER.to_string(),
            duals: false,
            angle_bound: 1.0,
            keep_files: None,
        }
    }
}

impl LopfOptions {
    pub fn solver<S: Into<String>>(mut self, name: S) -> Self {
        self.solver_name = name.into();
        self
    }

    pub fn duals(mut self, duals: bool) -> Self {
        self.duals = duals;
        self
    }

    pub fn angle_bound(mut self, bound: f64) -> Self {
        self.angle_bound = bound;
        self
    }

    pub fn keep_files<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.keep_files = Some(dir.into());
        self
    }
}

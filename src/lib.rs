mod error;
mod io;
mod lopf;
mod network;
mod opt;
mod topology;
mod traits;

pub mod debug;
pub mod lp;
pub mod solver;

#[cfg(test)]
mod tests;

pub use error::*;
pub use io::*;
pub use lopf::*;
pub use network::*;
pub use opt::*;
pub use solver::{available_solvers, solver_by_name, DEFAULT_SOLVER};
pub use topology::*;
pub use traits::*;

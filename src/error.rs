use thiserror::Error;

/// Errors raised while building, solving or applying a linear optimal power flow.
#[derive(Debug, Error)]
pub enum LopfError {
    /// Malformed network or options, detected before any model construction.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The requested solver backend is unknown or was not compiled in.
    #[error("solver unavailable: {0}")]
    SolverUnavailable(String),

    #[error("linear program is infeasible")]
    Infeasible,

    #[error("linear program is unbounded")]
    Unbounded,

    /// Solver crashed or returned output that does not match the model.
    #[error("numeric failure: {0}")]
    NumericFailure(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl LopfError {
    pub(crate) fn config<S: Into<String>>(msg: S) -> Self {
        LopfError::Configuration(msg.into())
    }
}

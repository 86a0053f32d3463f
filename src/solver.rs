//! LP solver backends built on `good_lp`.

use crate::debug::{format_f64, format_named};
use crate::error::LopfError;
use crate::lp::{LinExpr, LinearProgram, LpSolution, LpStatus, Sense};
use crate::traits::LpSolver;
use good_lp::constraint::ConstraintReference;
use good_lp::solvers::ResolutionError;
use good_lp::variable::UnsolvedProblem;
use good_lp::{constraint, variable, Expression, ProblemVariables, Solution, SolverModel};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Name of the backend used when none is configured.
pub const DEFAULT_SOLVER: &str = "clarabel";

/// Returns the backend registered under `name` (case insensitive).
pub fn solver_by_name(name: &str) -> Result<Box<dyn LpSolver>, LopfError> {
    match name.to_ascii_lowercase().as_str() {
        #[cfg(feature = "clarabel")]
        "clarabel" => Ok(Box::new(ClarabelSolver)),
        #[cfg(feature = "minilp")]
        "minilp" => Ok(Box::new(MiniLpSolver)),
        _ => Err(LopfError::SolverUnavailable(format!(
            "{:?} (available: {})",
            name,
            available_solvers().join(", ")
        ))),
    }
}

/// Names of the backends compiled into this build.
pub fn available_solvers() -> Vec<&'static str> {
    let mut names = Vec::new();
    if cfg!(feature = "clarabel") {
        names.push("clarabel");
    }
    if cfg!(feature = "minilp") {
        names.push("minilp");
    }
    names
}

fn to_expression(expr: &LinExpr, columns: &[good_lp::Variable]) -> Expression {
    let mut e = Expression::from_other_affine(expr.constant_term());
    for &(v, c) in expr.terms() {
        e += c * columns[v.index()];
    }
    e
}

/// Declares variables, objective and rows of `lp` on a good_lp model.
fn formulate<M, F>(
    lp: &LinearProgram,
    make: F,
) -> (M, Vec<good_lp::Variable>, Vec<ConstraintReference>)
where
    M: SolverModel,
    F: FnOnce(UnsolvedProblem) -> M,
{
    let mut vars = ProblemVariables::new();
    let columns: Vec<good_lp::Variable> = lp
        .variables()
        .iter()
        .map(|v| {
            let mut def = variable();
            if v.lower.is_finite() {
                def = def.min(v.lower);
            }
            if v.upper.is_finite() {
                def = def.max(v.upper);
            }
            vars.add(def)
        })
        .collect();

    let objective = to_expression(lp.objective(), &columns);
    let mut model = make(vars.minimise(objective));

    let rows = lp
        .constraints()
        .iter()
        .map(|c| {
            let lhs = to_expression(&c.expr, &columns);
            let rhs = c.rhs;
            let row = match c.sense {
                Sense::Le => constraint!(lhs <= rhs),
                Sense::Ge => constraint!(lhs >= rhs),
                Sense::Eq => constraint!(lhs == rhs),
            };
            model.add_constraint(row)
        })
        .collect();

    (model, columns, rows)
}

fn resolution_failure(err: ResolutionError) -> LpSolution {
    match err {
        ResolutionError::Infeasible => LpSolution::failed(LpStatus::Infeasible, None),
        ResolutionError::Unbounded => LpSolution::failed(LpStatus::Unbounded, None),
        other => LpSolution::failed(LpStatus::Error, Some(other.to_string())),
    }
}

/// good_lp hands rows to the backend as `lhs - rhs <= 0` (`rhs - lhs <= 0`
/// for `>=`, `lhs - rhs == 0` for `=`) and reports the multiplier of that
/// form. Converts it to the objective change per unit increase of `rhs`.
#[cfg(feature = "clarabel")]
fn rhs_sensitivity(sense: Sense, raw: f64) -> f64 {
    match sense {
        Sense::Ge => raw,
        Sense::Le | Sense::Eq => -raw,
    }
}

fn optimal(lp: &LinearProgram, primal: Vec<f64>, dual: Option<Vec<f64>>) -> LpSolution {
    LpSolution {
        status: LpStatus::Optimal,
        objective: lp.objective().eval(&primal),
        primal,
        dual,
        message: None,
    }
}

/// Clarabel interior-point backend. Pure Rust, reports duals.
#[cfg(feature = "clarabel")]
#[derive(Debug, Default, Clone, Copy)]
pub struct ClarabelSolver;

#[cfg(feature = "clarabel")]
impl LpSolver for ClarabelSolver {
    fn name(&self) -> &str {
        "clarabel"
    }

    fn supports_duals(&self) -> bool {
        true
    }

    fn solve(&self, lp: &LinearProgram, duals: bool) -> Result<LpSolution, LopfError> {
        use good_lp::solvers::clarabel::clarabel;
        use good_lp::solvers::{DualValues, SolutionWithDual};

        let (model, columns, rows) = formulate(lp, clarabel);
        let mut solution = match model.solve() {
            Ok(solution) => solution,
            Err(err) => return Ok(resolution_failure(err)),
        };

        let primal: Vec<f64> = columns.iter().map(|&c| solution.value(c)).collect();
        let dual = if duals {
            let values = solution.compute_dual();
            Some(
                rows.iter()
                    .zip(lp.constraints())
                    .map(|(r, c)| rhs_sensitivity(c.sense, values.dual(r.clone())))
                    .collect(),
            )
        } else {
            None
        };
        Ok(optimal(lp, primal, dual))
    }
}

/// Simplex backend (good_lp's `microlp`, the maintained minilp fork).
/// Pure Rust, primal values only.
#[cfg(feature = "minilp")]
#[derive(Debug, Default, Clone, Copy)]
pub struct MiniLpSolver;

#[cfg(feature = "minilp")]
impl LpSolver for MiniLpSolver {
    fn name(&self) -> &str {
        "minilp"
    }

    fn supports_duals(&self) -> bool {
        false
    }

    fn solve(&self, lp: &LinearProgram, duals: bool) -> Result<LpSolution, LopfError> {
        use good_lp::solvers::microlp::microlp;

        if duals {
            log::warn!("minilp does not report dual values, solving for primal values only");
        }
        let (model, columns, _) = formulate(lp, microlp);
        let solution = match model.solve() {
            Ok(solution) => solution,
            Err(err) => return Ok(resolution_failure(err)),
        };

        let primal: Vec<f64> = columns.iter().map(|&c| solution.value(c)).collect();
        Ok(optimal(lp, primal, None))
    }
}

/// Writes the model (`<name>.lp`) and the solver outcome (`<name>.sol`)
/// to `dir` for later inspection.
pub fn write_transcript(
    dir: &Path,
    lp: &LinearProgram,
    solver: &str,
    solution: &LpSolution,
) -> Result<(), LopfError> {
    fs::create_dir_all(dir)?;

    let lp_path = dir.join(format!("{}.lp", lp.name));
    let mut w = BufWriter::new(File::create(&lp_path)?);
    lp.write_lp(&mut w)?;
    w.flush()?;

    let sol_path = dir.join(format!("{}.sol", lp.name));
    let mut w = BufWriter::new(File::create(&sol_path)?);
    writeln!(w, "solver: {}", solver)?;
    writeln!(w, "status: {:?}", solution.status)?;
    if let Some(msg) = &solution.message {
        writeln!(w, "message: {}", msg)?;
    }
    writeln!(w, "objective: {}", format_f64(solution.objective))?;
    if solution.is_optimal() {
        let names: Vec<&str> = lp.variables().iter().map(|v| v.name.as_str()).collect();
        writeln!(w, "\nprimal:\n{}", format_named(&names, &solution.primal))?;
        if let Some(dual) = &solution.dual {
            let names: Vec<&str> = lp.constraints().iter().map(|c| c.name.as_str()).collect();
            writeln!(w, "\ndual:\n{}", format_named(&names, dual))?;
        }
    }
    w.flush()?;

    log::info!(
        "solver transcript written to {} and {}",
        lp_path.display(),
        sol_path.display()
    );
    Ok(())
}

//! Solver-agnostic linear program.
//!
//! The optimal power flow formulation is expressed against this model only.
//! Backends in [`crate::solver`] translate it into a concrete solver's API.

use crate::debug::format_f64;
use std::collections::HashSet;
use std::io::{self, Write};

/// Handle of a decision variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(usize);

impl VarId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Handle of a constraint row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConstraintId(usize);

impl ConstraintId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Affine expression `Σ coef·var + constant`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinExpr {
    terms: Vec<(VarId, f64)>,
    constant: f64,
}

impl LinExpr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn constant(c: f64) -> Self {
        Self {
            terms: Vec::new(),
            constant: c,
        }
    }

    pub fn term(var: VarId, coef: f64) -> Self {
        Self {
            terms: vec![(var, coef)],
            constant: 0.0,
        }
    }

    pub fn add_term(&mut self, var: VarId, coef: f64) {
        self.terms.push((var, coef));
    }

    pub fn add_constant(&mut self, c: f64) {
        self.constant += c;
    }

    /// Adds `scale × other` to `self`.
    pub fn add_scaled(&mut self, other: &LinExpr, scale: f64) {
        self.terms
            .extend(other.terms.iter().map(|&(v, c)| (v, c * scale)));
        self.constant += other.constant * scale;
    }

    pub fn terms(&self) -> &[(VarId, f64)] {
        &self.terms
    }

    pub fn constant_term(&self) -> f64 {
        self.constant
    }

    /// Merges repeated variables and drops zero coefficients.
    pub fn simplified(&self) -> LinExpr {
        let mut terms: Vec<(VarId, f64)> = Vec::with_capacity(self.terms.len());
        let mut sorted = self.terms.clone();
        sorted.sort_by_key(|&(v, _)| v);
        for (v, c) in sorted {
            match terms.last_mut() {
                Some((last, acc)) if *last == v => *acc += c,
                _ => terms.push((v, c)),
            }
        }
        terms.retain(|&(_, c)| c != 0.0);
        LinExpr {
            terms,
            constant: self.constant,
        }
    }

    /// Evaluates the expression at the given variable values.
    pub fn eval(&self, values: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|&(v, c)| c * values[v.index()])
            .sum::<f64>()
            + self.constant
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    /// `expr <= rhs`
    Le,
    /// `expr >= rhs`
    Ge,
    /// `expr == rhs`
    Eq,
}

impl Sense {
    fn symbol(self) -> &'static str {
        match self {
            Sense::Le => "<=",
            Sense::Ge => ">=",
            Sense::Eq => "=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub lower: f64,
    pub upper: f64,
}

/// A row `expr sense rhs`. Constants of the expression are folded into `rhs`.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub name: String,
    pub expr: LinExpr,
    pub sense: Sense,
    pub rhs: f64,
}

/// Minimization problem over bounded real variables.
#[derive(Debug, Clone, Default)]
pub struct LinearProgram {
    pub name: String,
    variables: Vec<Variable>,
    constraints: Vec<Constraint>,
    objective: LinExpr,
}

impl LinearProgram {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn add_variable<S: Into<String>>(&mut self, name: S, lower: f64, upper: f64) -> VarId {
        self.variables.push(Variable {
            name: name.into(),
            lower,
            upper,
        });
        VarId(self.variables.len() - 1)
    }

    pub fn add_constraint<S: Into<String>>(
        &mut self,
        name: S,
        expr: LinExpr,
        sense: Sense,
        rhs: f64,
    ) -> ConstraintId {
        let expr = expr.simplified();
        let rhs = rhs - expr.constant;
        self.constraints.push(Constraint {
            name: name.into(),
            expr: LinExpr {
                terms: expr.terms,
                constant: 0.0,
            },
            sense,
            rhs,
        });
        ConstraintId(self.constraints.len() - 1)
    }

    /// Sets the expression to be minimized.
    pub fn set_objective(&mut self, objective: LinExpr) {
        self.objective = objective.simplified();
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn objective(&self) -> &LinExpr {
        &self.objective
    }

    pub fn variable(&self, id: VarId) -> &Variable {
        &self.variables[id.index()]
    }

    pub fn constraint(&self, id: ConstraintId) -> &Constraint {
        &self.constraints[id.index()]
    }

    /// Writes the problem in CPLEX LP format.
    pub fn write_lp<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let columns = lp_names(self.variables.iter().map(|v| v.name.as_str()));
        let rows = lp_names(self.constraints.iter().map(|c| c.name.as_str()));

        writeln!(w, "\\ {}", self.name)?;
        writeln!(w, "minimize")?;
        write!(w, " obj:")?;
        write_terms(w, &self.objective, &columns)?;
        if self.objective.constant != 0.0 {
            write!(w, " + {}", format_f64(self.objective.constant))?;
        }
        writeln!(w)?;

        writeln!(w, "subject to")?;
        for (c, row) in self.constraints.iter().zip(&rows) {
            write!(w, " {}:", row)?;
            write_terms(w, &c.expr, &columns)?;
            writeln!(w, " {} {}", c.sense.symbol(), format_f64(c.rhs))?;
        }

        writeln!(w, "bounds")?;
        for (v, name) in self.variables.iter().zip(&columns) {
            match (v.lower.is_finite(), v.upper.is_finite()) {
                (true, true) => writeln!(
                    w,
                    " {} <= {} <= {}",
                    format_f64(v.lower),
                    name,
                    format_f64(v.upper)
                )?,
                (true, false) => writeln!(w, " {} >= {}", name, format_f64(v.lower))?,
                (false, true) => writeln!(w, " -inf <= {} <= {}", name, format_f64(v.upper))?,
                (false, false) => writeln!(w, " {} free", name)?,
            }
        }
        writeln!(w, "end")
    }
}

fn write_terms<W: Write>(w: &mut W, expr: &LinExpr, columns: &[String]) -> io::Result<()> {
    if expr.terms.is_empty() {
        return write!(w, " 0");
    }
    for &(v, c) in &expr.terms {
        let sign = if c < 0.0 { "-" } else { "+" };
        write!(w, " {} {} {}", sign, format_f64(c.abs()), columns[v.index()])?;
    }
    Ok(())
}

/// LP-format identifiers may not contain whitespace or operators.
fn lp_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '.' | '(' | ')' | ',' => c,
            _ => '_',
        })
        .collect()
}

/// Sanitized names, suffixed with their position where two collide.
fn lp_names<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .enumerate()
        .map(|(i, name)| {
            let mut id = lp_name(name);
            while !seen.insert(id.clone()) {
                id = format!("{}_{}", id, i);
            }
            id
        })
        .collect()
}

/// Outcome reported by a solver backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LpStatus {
    Optimal,
    Infeasible,
    Unbounded,
    Error,
}

#[derive(Debug, Clone)]
pub struct LpSolution {
    pub status: LpStatus,

    /// Objective value at `primal`, `NaN` when not optimal.
    pub objective: f64,

    /// One value per variable, empty when not optimal.
    pub primal: Vec<f64>,

    /// One value per constraint, when requested and supported: the change
    /// of the optimal objective per unit increase of the row's `rhs`.
    pub dual: Option<Vec<f64>>,

    /// Solver diagnostic for non-optimal outcomes.
    pub message: Option<String>,
}

impl LpSolution {
    /// Solution without values for a non-optimal outcome.
    pub fn failed(status: LpStatus, message: Option<String>) -> Self {
        Self {
            status,
            objective: f64::NAN,
            primal: Vec::new(),
            dual: None,
            message,
        }
    }

    pub fn is_optimal(&self) -> bool {
        self.status == LpStatus::Optimal
    }

    pub fn value(&self, var: VarId) -> f64 {
        self.primal[var.index()]
    }

    pub fn dual(&self, row: ConstraintId) -> Option<f64> {
        self.dual.as_ref().map(|d| d[row.index()])
    }

    pub fn eval(&self, expr: &LinExpr) -> f64 {
        expr.eval(&self.primal)
    }
}

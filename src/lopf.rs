//! Linear (DC) optimal power flow.
//!
//! For every snapshot in scope the model holds one dispatch variable per
//! generator, one flow variable per transport link and one voltage angle per
//! bus. Branch flows follow the linearized law
//!
//! ```text
//! flow = (angle(bus0) - angle(bus1)) / x_pu
//! ```
//!
//! and are limited to [-s_nom, s_nom]. At every bus the signed sum of
//! generator dispatch, load set-points, transport link flows and branch flows
//! must vanish. The objective is the total marginal cost of dispatch.
//! Snapshots are independent apart from sharing the objective.

use crate::debug::format_f64_vec;
use crate::error::LopfError;
use crate::lp::{ConstraintId, LinExpr, LinearProgram, LpSolution, LpStatus, Sense, VarId};
use crate::network::{BranchId, BusId, Network, SubNetworkId};
use crate::opt::LopfOptions;
use crate::solver::{solver_by_name, write_transcript};
use crate::topology::{calculate_x_pu, find_slack_bus};
use crate::traits::LpSolver;
use log::{debug, info};
use std::collections::HashSet;

/// Outcome of a solve that was applied to the network.
#[derive(Debug, Clone, PartialEq)]
pub struct LopfResult {
    pub status: LpStatus,
    /// Total marginal cost over all snapshots.
    pub objective: f64,
    pub solver: String,
    pub snapshots: Vec<String>,
}

/// Solves the linear optimal power flow for `snapshots` (default: the
/// current snapshot) with the backend named in `options` and writes the
/// solution onto the network.
pub fn network_lopf(
    network: &mut Network,
    snapshots: Option<&[String]>,
    options: &LopfOptions,
) -> Result<LopfResult, LopfError> {
    let solver = solver_by_name(&options.solver_name)?;
    network_lopf_with(network, snapshots, options, solver.as_ref())
}

/// Same as [`network_lopf`] with an explicit backend.
pub fn network_lopf_with(
    network: &mut Network,
    snapshots: Option<&[String]>,
    options: &LopfOptions,
    solver: &dyn LpSolver,
) -> Result<LopfResult, LopfError> {
    let snapshots = resolve_snapshots(network, snapshots)?;

    prepare_sub_networks(network)?;

    let ctx = LopfContext::build(network, snapshots, options)?;
    let solution = ctx.solve(solver, options)?;
    ctx.apply(network, &solution)?;

    Ok(LopfResult {
        status: solution.status,
        objective: solution.objective,
        solver: solver.name().to_string(),
        snapshots: ctx.snapshots,
    })
}

fn resolve_snapshots(
    network: &Network,
    snapshots: Option<&[String]>,
) -> Result<Vec<String>, LopfError> {
    let snapshots = match snapshots {
        Some(s) => s.to_vec(),
        None => vec![network.now().to_string()],
    };
    if snapshots.is_empty() {
        return Err(LopfError::config("snapshot sequence must not be empty"));
    }
    let mut seen = HashSet::new();
    for s in &snapshots {
        if !network.has_snapshot(s) {
            return Err(LopfError::config(format!("unknown snapshot {:?}", s)));
        }
        if !seen.insert(s.as_str()) {
            return Err(LopfError::config(format!("duplicate snapshot {:?}", s)));
        }
    }
    Ok(snapshots)
}

/// Runs the per sub-network preprocessing: per-unit reactance and slack bus.
fn prepare_sub_networks(network: &mut Network) -> Result<(), LopfError> {
    if let Some(bus) = network.buses().iter().find(|b| b.sub_network.is_none()) {
        return Err(LopfError::config(format!(
            "bus {:?} belongs to no sub-network, determine the network topology first",
            bus.name
        )));
    }
    if let Some(br) = network.branches().iter().find(|br| br.sub_network.is_none()) {
        return Err(LopfError::config(format!(
            "branch {:?} belongs to no sub-network, determine the network topology first",
            br.name
        )));
    }
    for i in 0..network.sub_networks().len() {
        let sn = SubNetworkId::from(i);
        calculate_x_pu(network, sn);
        find_slack_bus(network, sn)?;
    }
    Ok(())
}

/// Rejects inputs that cannot form a well-posed linear program.
fn validate(network: &Network, snapshots: &[String], options: &LopfOptions) -> Result<(), LopfError> {
    if !(options.angle_bound.is_finite() && options.angle_bound > 0.0) {
        return Err(LopfError::config(format!(
            "angle bound must be positive and finite: {}",
            options.angle_bound
        )));
    }
    for sn in network.sub_networks() {
        if sn.slack_bus.is_none() {
            return Err(LopfError::config(format!(
                "sub-network {:?} has no slack bus",
                sn.name
            )));
        }
    }
    for br in network.branches() {
        if !br.x_pu.is_finite() || br.x_pu == 0.0 {
            return Err(LopfError::config(format!(
                "branch {:?} has invalid per-unit reactance {}",
                br.name, br.x_pu
            )));
        }
        if br.s_nom.is_nan() || br.s_nom < 0.0 {
            return Err(LopfError::config(format!(
                "branch {:?} has invalid s_nom {}",
                br.name, br.s_nom
            )));
        }
    }
    for tl in network.transport_links() {
        if tl.p_min.is_nan() || tl.p_max.is_nan() || tl.p_min > tl.p_max {
            return Err(LopfError::config(format!(
                "transport link {:?} has inverted bounds [{}, {}]",
                tl.name, tl.p_min, tl.p_max
            )));
        }
    }
    for gen in network.generators() {
        if !gen.marginal_cost.is_finite() {
            return Err(LopfError::config(format!(
                "generator {:?} has invalid marginal cost {}",
                gen.name, gen.marginal_cost
            )));
        }
        for s in snapshots {
            let (p_min, p_max) = (gen.p_min.get(s), gen.p_max.get(s));
            if p_min.is_nan() || p_max.is_nan() || p_min > p_max {
                return Err(LopfError::config(format!(
                    "generator {:?} has inverted bounds [{}, {}] at snapshot {:?}",
                    gen.name, p_min, p_max, s
                )));
            }
        }
    }
    for load in network.loads() {
        for s in snapshots {
            if !load.p_set.get(s).is_finite() {
                return Err(LopfError::config(format!(
                    "load {:?} has invalid p_set at snapshot {:?}",
                    load.name, s
                )));
            }
        }
    }
    Ok(())
}

/// Signed contributions to the nodal power balance, per bus and snapshot.
///
/// Filled from all asset classes before any balance row is added to the
/// linear program.
struct BalanceAccumulator {
    exprs: Vec<Vec<LinExpr>>,
}

impl BalanceAccumulator {
    fn new(n_bus: usize, n_snapshot: usize) -> Self {
        Self {
            exprs: vec![vec![LinExpr::new(); n_snapshot]; n_bus],
        }
    }

    fn add_var(&mut self, bus: BusId, s: usize, var: VarId, coef: f64) {
        self.exprs[bus.index()][s].add_term(var, coef);
    }

    fn add_constant(&mut self, bus: BusId, s: usize, c: f64) {
        self.exprs[bus.index()][s].add_constant(c);
    }

    fn add_expr(&mut self, bus: BusId, s: usize, expr: &LinExpr, scale: f64) {
        self.exprs[bus.index()][s].add_scaled(expr, scale);
    }
}

/// Optimization model of one solve. Built fresh for every call, it only
/// refers to the network through handles.
pub struct LopfContext {
    lp: LinearProgram,
    snapshots: Vec<String>,

    generator_p: Vec<Vec<VarId>>,
    transport_link_p: Vec<Vec<VarId>>,
    voltage_angles: Vec<Vec<VarId>>,

    slack_angle: Vec<Vec<ConstraintId>>,
    flows: Vec<Vec<LinExpr>>,
    flow_upper: Vec<Vec<ConstraintId>>,
    flow_lower: Vec<Vec<ConstraintId>>,
    power_balance: Vec<Vec<ConstraintId>>,
}

impl LopfContext {
    /// Validates the network and declares variables, constraints and
    /// objective. Expects sub-networks with per-unit reactances and slack
    /// buses.
    pub fn build(
        network: &Network,
        snapshots: Vec<String>,
        options: &LopfOptions,
    ) -> Result<Self, LopfError> {
        if snapshots.is_empty() {
            return Err(LopfError::config("snapshot sequence must not be empty"));
        }
        validate(network, &snapshots, options)?;

        let mut ctx = Self {
            lp: LinearProgram::new("lopf"),
            snapshots,
            generator_p: Vec::new(),
            transport_link_p: Vec::new(),
            voltage_angles: Vec::new(),
            slack_angle: Vec::new(),
            flows: Vec::new(),
            flow_upper: Vec::new(),
            flow_lower: Vec::new(),
            power_balance: Vec::new(),
        };
        ctx.build_variables(network, options.angle_bound);
        ctx.build_constraints(network);
        ctx.build_objective(network);

        info!(
            "linear optimal power flow over {} snapshots: {} variables, {} constraints",
            ctx.snapshots.len(),
            ctx.lp.variables().len(),
            ctx.lp.constraints().len()
        );
        Ok(ctx)
    }

    pub fn lp(&self) -> &LinearProgram {
        &self.lp
    }

    pub fn snapshots(&self) -> &[String] {
        &self.snapshots
    }

    /// Flow expression of a branch at snapshot position `s`, shared by the
    /// thermal limits and the power balance.
    pub fn flow(&self, branch: BranchId, s: usize) -> &LinExpr {
        &self.flows[branch.index()][s]
    }

    fn build_variables(&mut self, network: &Network, angle_bound: f64) {
        let lp = &mut self.lp;
        let snapshots = &self.snapshots;

        self.generator_p = network
            .generators()
            .iter()
            .map(|gen| {
                snapshots
                    .iter()
                    .map(|s| {
                        lp.add_variable(
                            format!("generator_p[{},{}]", gen.name, s),
                            gen.p_min.get(s),
                            gen.p_max.get(s),
                        )
                    })
                    .collect()
            })
            .collect();

        self.transport_link_p = network
            .transport_links()
            .iter()
            .map(|tl| {
                snapshots
                    .iter()
                    .map(|s| {
                        lp.add_variable(
                            format!("transport_link_p[{},{}]", tl.name, s),
                            tl.p_min,
                            tl.p_max,
                        )
                    })
                    .collect()
            })
            .collect();

        self.voltage_angles = network
            .buses()
            .iter()
            .map(|bus| {
                snapshots
                    .iter()
                    .map(|s| {
                        lp.add_variable(
                            format!("voltage_angles[{},{}]", bus.name, s),
                            -angle_bound,
                            angle_bound,
                        )
                    })
                    .collect()
            })
            .collect();
    }

    fn build_constraints(&mut self, network: &Network) {
        let n_snapshot = self.snapshots.len();

        // Slack angle.
        for sn in network.sub_networks() {
            let mut rows = Vec::with_capacity(n_snapshot);
            if let Some(slack) = sn.slack_bus {
                for (s, snapshot) in self.snapshots.iter().enumerate() {
                    rows.push(self.lp.add_constraint(
                        format!("slack_angle[{},{}]", sn.name, snapshot),
                        LinExpr::term(self.voltage_angles[slack.index()][s], 1.0),
                        Sense::Eq,
                        0.0,
                    ));
                }
            }
            self.slack_angle.push(rows);
        }

        // Branch flow limits.
        let n_branch = network.branches().len();
        self.flows = vec![Vec::new(); n_branch];
        self.flow_upper = vec![Vec::new(); n_branch];
        self.flow_lower = vec![Vec::new(); n_branch];
        for sn in network.sub_networks() {
            for &br_id in &sn.branches {
                let br = network.branch(br_id);
                let b = 1.0 / br.x_pu;
                for (s, snapshot) in self.snapshots.iter().enumerate() {
                    let mut flow = LinExpr::term(self.voltage_angles[br.bus0.index()][s], b);
                    flow.add_term(self.voltage_angles[br.bus1.index()][s], -b);

                    let upper = self.lp.add_constraint(
                        format!("flow_upper[{},{}]", br.name, snapshot),
                        flow.clone(),
                        Sense::Le,
                        br.s_nom,
                    );
                    let lower = self.lp.add_constraint(
                        format!("flow_lower[{},{}]", br.name, snapshot),
                        flow.clone(),
                        Sense::Ge,
                        -br.s_nom,
                    );
                    self.flows[br_id.index()].push(flow);
                    self.flow_upper[br_id.index()].push(upper);
                    self.flow_lower[br_id.index()].push(lower);
                }
            }
        }

        // Nodal power balance.
        let mut balance = BalanceAccumulator::new(network.buses().len(), n_snapshot);
        for (g, gen) in network.generators().iter().enumerate() {
            for s in 0..n_snapshot {
                balance.add_var(gen.bus, s, self.generator_p[g][s], gen.sign);
            }
        }
        for load in network.loads() {
            for (s, snapshot) in self.snapshots.iter().enumerate() {
                balance.add_constant(load.bus, s, load.sign * load.p_set.get(snapshot));
            }
        }
        for (t, tl) in network.transport_links().iter().enumerate() {
            for s in 0..n_snapshot {
                balance.add_var(tl.bus0, s, self.transport_link_p[t][s], -1.0);
                balance.add_var(tl.bus1, s, self.transport_link_p[t][s], 1.0);
            }
        }
        for sn in network.sub_networks() {
            for &br_id in &sn.branches {
                let br = network.branch(br_id);
                for s in 0..n_snapshot {
                    let flow = &self.flows[br_id.index()][s];
                    balance.add_expr(br.bus0, s, flow, -1.0);
                    balance.add_expr(br.bus1, s, flow, 1.0);
                }
            }
        }

        self.power_balance = balance
            .exprs
            .into_iter()
            .zip(network.buses())
            .map(|(exprs, bus)| {
                exprs
                    .into_iter()
                    .zip(&self.snapshots)
                    .map(|(expr, snapshot)| {
                        self.lp.add_constraint(
                            format!("power_balance[{},{}]", bus.name, snapshot),
                            expr,
                            Sense::Eq,
                            0.0,
                        )
                    })
                    .collect()
            })
            .collect();
    }

    fn build_objective(&mut self, network: &Network) {
        let mut objective = LinExpr::new();
        for (g, gen) in network.generators().iter().enumerate() {
            for &p in &self.generator_p[g] {
                objective.add_term(p, gen.marginal_cost);
            }
        }
        self.lp.set_objective(objective);
    }

    /// Hands the model to `solver`. Non-optimal outcomes are returned as a
    /// solution status. Writes the transcript if `keep_files` is set.
    pub fn solve(
        &self,
        solver: &dyn LpSolver,
        options: &LopfOptions,
    ) -> Result<LpSolution, LopfError> {
        info!("solving with {}", solver.name());
        let solution = solver.solve(&self.lp, options.duals)?;

        if let Some(dir) = &options.keep_files {
            write_transcript(dir, &self.lp, solver.name(), &solution)?;
        }

        if solution.is_optimal() {
            let n_var = self.lp.variables().len();
            if solution.primal.len() != n_var {
                return Err(LopfError::NumericFailure(format!(
                    "solver returned {} primal values for {} variables",
                    solution.primal.len(),
                    n_var
                )));
            }
            if let Some(v) = solution.primal.iter().find(|v| !v.is_finite()) {
                return Err(LopfError::NumericFailure(format!(
                    "solver returned non-finite primal value {}",
                    v
                )));
            }
            if let Some(dual) = &solution.dual {
                if dual.len() != self.lp.constraints().len() {
                    return Err(LopfError::NumericFailure(format!(
                        "solver returned {} dual values for {} constraints",
                        dual.len(),
                        self.lp.constraints().len()
                    )));
                }
            }
            info!("optimal objective {}", solution.objective);
        } else {
            info!("solver finished with status {:?}", solution.status);
        }
        Ok(solution)
    }

    /// Writes the solution onto the network. Refuses anything but an optimal
    /// solution, leaving the network untouched.
    pub fn apply(&self, network: &mut Network, solution: &LpSolution) -> Result<(), LopfError> {
        match solution.status {
            LpStatus::Optimal => {}
            LpStatus::Infeasible => return Err(LopfError::Infeasible),
            LpStatus::Unbounded => return Err(LopfError::Unbounded),
            LpStatus::Error => {
                return Err(LopfError::NumericFailure(
                    solution
                        .message
                        .clone()
                        .unwrap_or_else(|| "solver error".to_string()),
                ))
            }
        }

        for (s, snapshot) in self.snapshots.iter().enumerate() {
            for (g, gen) in network.generators_mut().iter_mut().enumerate() {
                gen.p.set(snapshot, solution.value(self.generator_p[g][s]));
            }

            for load in network.loads_mut() {
                let p_set = load.p_set.get(snapshot);
                load.p.set(snapshot, p_set);
            }

            for (b, bus) in network.buses_mut().iter_mut().enumerate() {
                bus.v_ang
                    .set(snapshot, solution.value(self.voltage_angles[b][s]));
            }

            let mut p_bus = vec![0.0; network.buses().len()];
            for gen in network.generators() {
                p_bus[gen.bus.index()] += gen.sign * gen.p.get(snapshot);
            }
            for load in network.loads() {
                p_bus[load.bus.index()] += load.sign * load.p.get(snapshot);
            }
            for (bus, p) in network.buses_mut().iter_mut().zip(&p_bus) {
                bus.p.set(snapshot, *p);
            }

            let mut link_ends = Vec::with_capacity(network.transport_links().len());
            for (t, tl) in network.transport_links_mut().iter_mut().enumerate() {
                let p1 = solution.value(self.transport_link_p[t][s]);
                tl.p1.set(snapshot, p1);
                tl.p0.set(snapshot, -p1);
                link_ends.push((tl.bus0, -p1, tl.bus1, p1));
            }
            let buses = network.buses_mut();
            for (bus0, p0, bus1, p1) in link_ends {
                buses[bus0.index()].p.add(snapshot, p0);
                buses[bus1.index()].p.add(snapshot, p1);
            }

            let v_ang: Vec<f64> = network
                .buses()
                .iter()
                .map(|b| b.v_ang.get(snapshot))
                .collect();
            let members: Vec<_> = network
                .sub_networks()
                .iter()
                .flat_map(|sn| sn.branches.iter().copied())
                .collect();
            let branches = network.branches_mut();
            for br_id in members {
                let br = &mut branches[br_id.index()];
                let p1 = (v_ang[br.bus0.index()] - v_ang[br.bus1.index()]) / br.x_pu;
                br.p1.set(snapshot, p1);
                br.p0.set(snapshot, -p1);
            }

            if solution.dual.is_some() {
                self.apply_duals(network, solution, s, snapshot);
            }

            debug!(
                "{}: generator dispatch {}, voltage angles {}",
                snapshot,
                format_f64_vec(
                    &network
                        .generators()
                        .iter()
                        .map(|g| g.p.get(snapshot))
                        .collect::<Vec<f64>>()
                ),
                format_f64_vec(&v_ang)
            );
        }
        Ok(())
    }

    /// Bus marginal prices are the cost of serving one more unit of load at
    /// the bus. Branch `mu_upper` / `mu_lower` are the cost saved per unit of
    /// extra thermal capacity in either direction, hence non-negative.
    fn apply_duals(&self, network: &mut Network, solution: &LpSolution, s: usize, snapshot: &str) {
        for (b, bus) in network.buses_mut().iter_mut().enumerate() {
            if let Some(price) = solution.dual(self.power_balance[b][s]) {
                bus.marginal_price.set(snapshot, price);
            }
        }
        for (i, br) in network.branches_mut().iter_mut().enumerate() {
            if self.flow_upper[i].is_empty() {
                continue;
            }
            // Raising s_nom raises the rhs of the upper row.
            if let Some(mu) = solution.dual(self.flow_upper[i][s]) {
                br.mu_upper.set(snapshot, -mu);
            }
            // Raising s_nom lowers the rhs of the lower row.
            if let Some(mu) = solution.dual(self.flow_lower[i][s]) {
                br.mu_lower.set(snapshot, mu);
            }
        }
    }
}

use super::cases::*;
use crate::error::LopfError;
use crate::lopf::{network_lopf, network_lopf_with, LopfContext};
use crate::lp::{LinearProgram, LpSolution, LpStatus};
use crate::network::{GeneratorBuilder, Network, SubNetworkId, TimeSeries};
use crate::opt::LopfOptions;
use crate::topology::{calculate_x_pu, find_slack_bus};
use crate::traits::LpSolver;
use anyhow::{format_err, Result};

fn now(net: &Network) -> Vec<String> {
    vec![net.now().to_string()]
}

#[test]
fn test_two_bus_dispatch() -> Result<()> {
    let mut net = two_bus()?;
    let options = LopfOptions::default().angle_bound(10.0);

    let result = network_lopf(&mut net, None, &options)?;
    assert_eq!(result.status, LpStatus::Optimal);
    assert_eq!(result.snapshots, now(&net));
    expect_close("objective", result.objective, 500.0)?;

    let s = net.now().to_string();
    let gen = net.generator_id("gen a").ok_or_else(|| format_err!("gen a"))?;
    let br = net.branch_id("a-b").ok_or_else(|| format_err!("a-b"))?;
    let b = net.bus_id("b").ok_or_else(|| format_err!("b"))?;

    expect_close("dispatch", net.generator(gen).p.get(&s), 50.0)?;
    expect_close("flow", net.branch(br).p1.get(&s), 50.0)?;
    expect_close("angle b", net.bus(b).v_ang.get(&s), -5.0)?;

    let load = net.load_id("load b").ok_or_else(|| format_err!("load b"))?;
    assert_eq!(net.load(load).p.get(&s), 50.0);
    expect_close("bus b injection", net.bus(b).p.get(&s), -50.0)?;

    check_invariants(&net, &now(&net))
}

#[test]
fn test_two_bus_default_angle_bound_infeasible() -> Result<()> {
    // A flow of 50 over x_pu = 0.1 needs an angle difference of 5 rad.
    let mut net = two_bus()?;
    let result = network_lopf(&mut net, None, &LopfOptions::default().solver("minilp"));
    match result {
        Err(LopfError::Infeasible) => Ok(()),
        other => Err(format_err!("expected infeasible, got {:?}", other)),
    }
}

#[test]
fn test_merit_order() -> Result<()> {
    for solver in ["clarabel", "minilp"] {
        let mut net = merit_order(50.0)?;
        let result = network_lopf(&mut net, None, &LopfOptions::default().solver(solver))?;
        expect_close("objective", result.objective, 600.0)?;

        let s = net.now().to_string();
        let cheap = net.generator_id("cheap").ok_or_else(|| format_err!("cheap"))?;
        let expensive = net
            .generator_id("expensive")
            .ok_or_else(|| format_err!("expensive"))?;
        expect_close("cheap", net.generator(cheap).p.get(&s), 40.0)?;
        expect_close("expensive", net.generator(expensive).p.get(&s), 10.0)?;

        check_invariants(&net, &now(&net))?;
    }
    Ok(())
}

#[test]
fn test_infeasible_leaves_network_untouched() -> Result<()> {
    for solver in ["clarabel", "minilp"] {
        let mut net = merit_order(100.0)?;
        let result = network_lopf(&mut net, None, &LopfOptions::default().solver(solver));
        if !matches!(result, Err(LopfError::Infeasible)) {
            return Err(format_err!("{}: expected infeasible, got {:?}", solver, result));
        }

        for g in net.generators() {
            assert!(g.p.is_empty(), "generator {:?} was written", g.name);
        }
        for l in net.loads() {
            assert!(l.p.is_empty(), "load {:?} was written", l.name);
        }
        for b in net.buses() {
            assert!(b.v_ang.is_empty() && b.p.is_empty(), "bus {:?} was written", b.name);
        }
    }
    Ok(())
}

#[test]
fn test_thermal_limit_binds() -> Result<()> {
    let mut net = congested(30.0)?;
    let result = network_lopf(&mut net, None, &LopfOptions::default())?;

    let s = net.now().to_string();
    let br = net.branch_id("a-b").ok_or_else(|| format_err!("a-b"))?;
    let cheap = net.generator_id("cheap").ok_or_else(|| format_err!("cheap"))?;
    let expensive = net
        .generator_id("expensive")
        .ok_or_else(|| format_err!("expensive"))?;

    expect_close("flow", net.branch(br).p1.get(&s), 30.0)?;
    expect_close("cheap", net.generator(cheap).p.get(&s), 30.0)?;
    expect_close("expensive", net.generator(expensive).p.get(&s), 20.0)?;
    expect_close("objective", result.objective, 700.0)?;

    check_invariants(&net, &now(&net))
}

#[test]
fn test_unconstrained_line_carries_all() -> Result<()> {
    let mut net = congested(200.0)?;
    let result = network_lopf(&mut net, None, &LopfOptions::default().solver("minilp"))?;
    expect_close("objective", result.objective, 500.0)?;

    let s = net.now().to_string();
    let br = net.branch_id("a-b").ok_or_else(|| format_err!("a-b"))?;
    expect_close("flow", net.branch(br).p1.get(&s), 50.0)?;
    check_invariants(&net, &now(&net))
}

#[test]
fn test_duals() -> Result<()> {
    let mut net = congested(30.0)?;
    network_lopf(&mut net, None, &LopfOptions::default().duals(true))?;

    let s = net.now().to_string();
    let a = net.bus_id("a").ok_or_else(|| format_err!("a"))?;
    let b = net.bus_id("b").ok_or_else(|| format_err!("b"))?;
    let br = net.branch_id("a-b").ok_or_else(|| format_err!("a-b"))?;

    // Each bus is priced at its marginal generator, the congested line at
    // the difference.
    expect_close("price a", net.bus(a).marginal_price.get(&s), 10.0)?;
    expect_close("price b", net.bus(b).marginal_price.get(&s), 20.0)?;
    expect_close("mu upper", net.branch(br).mu_upper.get(&s), 10.0)?;
    expect_close("mu lower", net.branch(br).mu_lower.get(&s), 0.0)?;
    Ok(())
}

#[test]
fn test_duals_reverse_congestion() -> Result<()> {
    // Cheap generation at "b" pushes against the lower limit of a-b.
    let mut net = congested(30.0)?;
    let a = net.bus_id("a").ok_or_else(|| format_err!("a"))?;
    let b = net.bus_id("b").ok_or_else(|| format_err!("b"))?;
    let cheap = net.generator_id("cheap").ok_or_else(|| format_err!("cheap"))?;
    let expensive = net
        .generator_id("expensive")
        .ok_or_else(|| format_err!("expensive"))?;
    let load = net.load_id("load").ok_or_else(|| format_err!("load"))?;
    net.generators_mut()[cheap.index()].marginal_cost = 30.0;
    net.generators_mut()[expensive.index()].marginal_cost = 5.0;
    net.loads_mut()[load.index()].bus = a;

    network_lopf(&mut net, None, &LopfOptions::default().duals(true))?;

    let s = net.now().to_string();
    let br = net.branch_id("a-b").ok_or_else(|| format_err!("a-b"))?;
    expect_close("flow", net.branch(br).p1.get(&s), -30.0)?;
    expect_close("price a", net.bus(a).marginal_price.get(&s), 30.0)?;
    expect_close("price b", net.bus(b).marginal_price.get(&s), 5.0)?;
    expect_close("mu upper", net.branch(br).mu_upper.get(&s), 0.0)?;
    expect_close("mu lower", net.branch(br).mu_lower.get(&s), 25.0)?;
    Ok(())
}

#[test]
fn test_duals_not_written_without_request() -> Result<()> {
    let mut net = congested(30.0)?;
    network_lopf(&mut net, None, &LopfOptions::default())?;
    for b in net.buses() {
        assert!(b.marginal_price.is_empty());
    }
    Ok(())
}

#[test]
fn test_transport_link_between_islands() -> Result<()> {
    let mut net = linked_islands()?;
    assert_eq!(net.sub_networks().len(), 2);

    let result = network_lopf(&mut net, None, &LopfOptions::default().solver("minilp"))?;
    expect_close("objective", result.objective, 20.0 * 10.0 + 20.0 * 50.0)?;

    let s = net.now().to_string();
    let tl = net
        .transport_link_id("hvdc")
        .ok_or_else(|| format_err!("hvdc"))?;
    expect_close("link p1", net.transport_link(tl).p1.get(&s), 20.0)?;
    assert_eq!(
        net.transport_link(tl).p0.get(&s),
        -net.transport_link(tl).p1.get(&s)
    );
    for bus in net.buses() {
        expect_close(&bus.name, bus.p.get(&s), 0.0)?;
    }
    check_invariants(&net, &now(&net))
}

#[test]
fn test_multiple_snapshots() -> Result<()> {
    let mut net = merit_order(0.0)?;
    net.set_snapshots(["t0", "t1", "t2"])?;

    let load = net.load_id("load").ok_or_else(|| format_err!("load"))?;
    let cheap = net.generator_id("cheap").ok_or_else(|| format_err!("cheap"))?;
    let expensive = net
        .generator_id("expensive")
        .ok_or_else(|| format_err!("expensive"))?;
    net.loads_mut()[load.index()].p_set = TimeSeries::new(30.0)
        .with("t1", 50.0)
        .with("t2", 70.0);
    net.generators_mut()[cheap.index()].p_max = TimeSeries::new(40.0).with("t2", 35.0);

    let snapshots: Vec<String> = net.snapshots().to_vec();
    let result = network_lopf(
        &mut net,
        Some(&snapshots),
        &LopfOptions::default().solver("minilp"),
    )?;
    // 300 + (400 + 200) + (350 + 700)
    expect_close("objective", result.objective, 1950.0)?;

    let expected = [("t0", 30.0, 0.0), ("t1", 40.0, 10.0), ("t2", 35.0, 35.0)];
    for (s, p_cheap, p_expensive) in expected {
        expect_close(s, net.generator(cheap).p.get(s), p_cheap)?;
        expect_close(s, net.generator(expensive).p.get(s), p_expensive)?;
    }
    check_invariants(&net, &snapshots)
}

#[test]
fn test_subset_of_snapshots() -> Result<()> {
    let mut net = merit_order(50.0)?;
    net.set_snapshots(["t0", "t1"])?;

    let subset = vec!["t1".to_string()];
    network_lopf(&mut net, Some(&subset), &LopfOptions::default().solver("minilp"))?;

    let cheap = net.generator_id("cheap").ok_or_else(|| format_err!("cheap"))?;
    assert!(net.generator(cheap).p.contains("t1"));
    assert!(!net.generator(cheap).p.contains("t0"));
    Ok(())
}

#[test]
fn test_configuration_errors() -> Result<()> {
    // Inverted generator bounds at one snapshot.
    let mut net = merit_order(50.0)?;
    let cheap = net.generator_id("cheap").ok_or_else(|| format_err!("cheap"))?;
    net.generators_mut()[cheap.index()].p_min = TimeSeries::new(50.0);
    assert!(matches!(
        network_lopf(&mut net, None, &LopfOptions::default()),
        Err(LopfError::Configuration(_))
    ));

    // Empty and unknown snapshots.
    let mut net = merit_order(50.0)?;
    let none: Vec<String> = Vec::new();
    assert!(matches!(
        network_lopf(&mut net, Some(&none), &LopfOptions::default()),
        Err(LopfError::Configuration(_))
    ));
    let unknown = vec!["later".to_string()];
    assert!(matches!(
        network_lopf(&mut net, Some(&unknown), &LopfOptions::default()),
        Err(LopfError::Configuration(_))
    ));

    // Topology not determined for a bus added afterwards.
    let mut net = merit_order(50.0)?;
    net.add_bus(crate::network::BusBuilder::default().name("new").build()?)?;
    assert!(matches!(
        network_lopf(&mut net, None, &LopfOptions::default()),
        Err(LopfError::Configuration(_))
    ));

    // Zero reactance.
    let mut net = two_bus()?;
    let br = net.branch_id("a-b").ok_or_else(|| format_err!("a-b"))?;
    net.branches_mut()[br.index()].x = 0.0;
    assert!(matches!(
        network_lopf(&mut net, None, &LopfOptions::default()),
        Err(LopfError::Configuration(_))
    ));

    // Bad angle bound.
    let mut net = merit_order(50.0)?;
    assert!(matches!(
        network_lopf(&mut net, None, &LopfOptions::default().angle_bound(f64::NAN)),
        Err(LopfError::Configuration(_))
    ));
    Ok(())
}

#[test]
fn test_unknown_solver() -> Result<()> {
    let mut net = merit_order(50.0)?;
    let result = network_lopf(&mut net, None, &LopfOptions::default().solver("glpk"));
    assert!(matches!(result, Err(LopfError::SolverUnavailable(_))));
    Ok(())
}

#[test]
fn test_context_structure() -> Result<()> {
    let mut net = congested(30.0)?;
    let b = net.bus_id("b").ok_or_else(|| format_err!("b"))?;
    net.add_generator(
        GeneratorBuilder::default()
            .name("peaker")
            .bus(b)
            .p_max(10.0)
            .marginal_cost(100.0)
            .build()?,
    )?;
    net.set_snapshots(["t0", "t1"])?;
    let sn = SubNetworkId::from(0);
    calculate_x_pu(&mut net, sn);
    find_slack_bus(&mut net, sn)?;

    let ctx = LopfContext::build(&net, net.snapshots().to_vec(), &LopfOptions::default())?;
    let lp = ctx.lp();

    // 3 generators + 2 angles, per snapshot.
    assert_eq!(lp.variables().len(), 2 * (3 + 2));
    // 1 slack + 2 flow limits + 2 balances, per snapshot.
    assert_eq!(lp.constraints().len(), 2 * (1 + 2 + 2));

    let br = net.branch_id("a-b").ok_or_else(|| format_err!("a-b"))?;
    let flow = ctx.flow(br, 1);
    assert_eq!(flow.terms().len(), 2);
    assert!((flow.terms()[0].1 - 100.0).abs() < 1e-9);
    assert!((flow.terms()[1].1 + 100.0).abs() < 1e-9);

    // The thermal limits carry exactly the shared flow expression.
    let limits: Vec<_> = lp
        .constraints()
        .iter()
        .filter(|c| c.name.starts_with("flow_") && c.name.ends_with(",t1]"))
        .collect();
    assert_eq!(limits.len(), 2);
    for c in limits {
        assert_eq!(c.expr, flow.simplified());
    }
    assert_eq!(lp.objective().eval(&vec![1.0; lp.variables().len()]), 2.0 * 130.0);
    Ok(())
}

#[test]
fn test_explicit_solver_and_transcript() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut net = merit_order(50.0)?;
    let options = LopfOptions::default().keep_files(dir.path());
    let solver = crate::solver::solver_by_name("minilp")?;

    let result = network_lopf_with(&mut net, None, &options, solver.as_ref())?;
    assert_eq!(result.solver, "minilp");

    let model = std::fs::read_to_string(dir.path().join("lopf.lp"))?;
    assert!(model.contains("power_balance_a,now_"));
    let report = std::fs::read_to_string(dir.path().join("lopf.sol"))?;
    assert!(report.contains("status: Optimal"));
    Ok(())
}

/// Backend replaying a fixed outcome, sized against the model it is given.
struct ScriptedSolver {
    outcome: fn(&LinearProgram) -> LpSolution,
}

impl LpSolver for ScriptedSolver {
    fn name(&self) -> &str {
        "scripted"
    }

    fn supports_duals(&self) -> bool {
        true
    }

    fn solve(&self, lp: &LinearProgram, _duals: bool) -> Result<LpSolution, LopfError> {
        Ok((self.outcome)(lp))
    }
}

fn optimal_with(primal: Vec<f64>, dual: Option<Vec<f64>>) -> LpSolution {
    LpSolution {
        status: LpStatus::Optimal,
        objective: 0.0,
        primal,
        dual,
        message: None,
    }
}

fn assert_untouched(net: &Network) {
    for g in net.generators() {
        assert!(g.p.is_empty(), "generator {:?} was written", g.name);
    }
    for l in net.loads() {
        assert!(l.p.is_empty(), "load {:?} was written", l.name);
    }
    for b in net.buses() {
        assert!(
            b.v_ang.is_empty() && b.p.is_empty() && b.marginal_price.is_empty(),
            "bus {:?} was written",
            b.name
        );
    }
    for br in net.branches() {
        assert!(
            br.p0.is_empty() && br.p1.is_empty() && br.mu_upper.is_empty(),
            "branch {:?} was written",
            br.name
        );
    }
}

#[test]
fn test_solver_failures_leave_network_untouched() -> Result<()> {
    let cases: [(&str, fn(&LinearProgram) -> LpSolution); 6] = [
        ("short primal", |lp| {
            optimal_with(vec![0.0; lp.variables().len() - 1], None)
        }),
        ("nan primal", |lp| {
            optimal_with(vec![f64::NAN; lp.variables().len()], None)
        }),
        ("short dual", |lp| {
            optimal_with(vec![0.0; lp.variables().len()], Some(Vec::new()))
        }),
        ("unbounded", |_| LpSolution::failed(LpStatus::Unbounded, None)),
        ("infeasible", |_| LpSolution::failed(LpStatus::Infeasible, None)),
        ("error", |_| {
            LpSolution::failed(LpStatus::Error, Some("factorization failed".to_string()))
        }),
    ];

    for (what, outcome) in cases {
        let mut net = congested(30.0)?;
        let solver = ScriptedSolver { outcome };
        let result = network_lopf_with(
            &mut net,
            None,
            &LopfOptions::default().duals(true),
            &solver,
        );
        let expected = match what {
            "unbounded" => matches!(result, Err(LopfError::Unbounded)),
            "infeasible" => matches!(result, Err(LopfError::Infeasible)),
            "error" => {
                matches!(&result, Err(LopfError::NumericFailure(msg)) if msg == "factorization failed")
            }
            _ => matches!(result, Err(LopfError::NumericFailure(_))),
        };
        if !expected {
            return Err(format_err!("{}: unexpected outcome {:?}", what, result));
        }
        assert_untouched(&net);
    }
    Ok(())
}

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use lopf::{
    calculate_x_pu, find_slack_bus, load_network, network_lopf, write_results, LopfOptions,
    SubNetworkId,
};
use std::path::PathBuf;

/// Linear optimal power flow.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Linear Optimal Power Flow
    #[clap(name = "lopf")]
    Lopf(LopfArgs),

    /// Sub-networks and slack buses
    Topology(TopologyArgs),
}

#[derive(Args)]
struct LopfArgs {
    /// The input network folder
    #[arg(required = true)]
    input: PathBuf,

    /// Output folder for the solved time series
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// LP solver backend.
    #[arg(long)]
    pub solver: Option<String>,

    /// Comma separated snapshots to solve (default: the current snapshot).
    #[arg(long, value_delimiter = ',')]
    pub snapshots: Option<Vec<String>>,

    /// Write shadow prices of the balance and thermal-limit constraints.
    #[arg(long, default_value_t = false)]
    pub duals: bool,

    /// Folder receiving the solver transcript.
    #[arg(long)]
    pub keep_files: Option<PathBuf>,

    /// Bound on voltage angles (radians).
    #[arg(long)]
    pub angle_bound: Option<f64>,
}

#[derive(Args)]
struct TopologyArgs {
    /// The input network folder
    #[arg(required = true)]
    input: PathBuf,
}

fn main() {
    env_logger::Builder::from_default_env()
        .format_level(false)
        .format_target(false)
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();

    match execute(&cli) {
        Ok(_) => {
            std::process::exit(0);
        }
        Err(err) => {
            eprintln!("error: {}", err);
            std::process::exit(2);
        }
    }
}

fn execute(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Lopf(args) => run_lopf(args),
        Commands::Topology(args) => print_topology(args),
    }
}

fn run_lopf(args: &LopfArgs) -> Result<()> {
    let mut network = load_network(&args.input)?;

    let mut options = LopfOptions::default().duals(args.duals);
    if let Some(solver) = &args.solver {
        options = options.solver(solver.as_str());
    }
    if let Some(dir) = &args.keep_files {
        options = options.keep_files(dir);
    }
    if let Some(bound) = args.angle_bound {
        options = options.angle_bound(bound);
    }

    let result = network_lopf(&mut network, args.snapshots.as_deref(), &options)?;

    println!(
        "{}: objective {} over {} snapshot(s) [{}]",
        result.solver,
        result.objective,
        result.snapshots.len(),
        result.snapshots.join(", ")
    );

    if let Some(out_path) = &args.output {
        write_results(&network, out_path)?;
    }

    Ok(())
}

fn print_topology(args: &TopologyArgs) -> Result<()> {
    let mut network = load_network(&args.input)?;

    for i in 0..network.sub_networks().len() {
        let sn = SubNetworkId::from(i);
        calculate_x_pu(&mut network, sn);
        let slack = find_slack_bus(&mut network, sn)?;
        let sub = network.sub_network(sn);
        println!(
            "sub-network {}: {} buses, {} branches, slack bus {}",
            sub.name,
            sub.buses.len(),
            sub.branches.len(),
            network.bus(slack).name
        );
    }

    Ok(())
}

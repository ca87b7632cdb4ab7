use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use staking_core::{run_simulation, side_chain_id_from_text, Params, SimulationConfig};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "staking-sim")]
#[command(about = "Staking/slashing state machine with a seeded simulation harness")]
#[command(version = "1.0.0")]
struct Cli {
    /// Log at debug level regardless of RUST_LOG
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a randomized simulation and print its report
    Simulate {
        /// Simulation config (JSON); flags below override its fields
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Staking/slashing parameters (JSON)
        #[arg(short, long)]
        params: Option<PathBuf>,

        #[arg(short, long)]
        seed: Option<u64>,

        #[arg(long)]
        steps: Option<u64>,

        #[arg(long)]
        accounts: Option<usize>,

        /// Probability that a bonded validator misses a block
        #[arg(long)]
        miss_rate: Option<f64>,

        /// Print every event, not just the tallies
        #[arg(long)]
        events: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Resolve a side-chain name to its numeric id
    SideChainId {
        name: String,
    },

    /// Print the effective parameters as JSON
    Params {
        #[arg(short, long)]
        params: Option<PathBuf>,
    },
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Simulate {
            config,
            params,
            seed,
            steps,
            accounts,
            miss_rate,
            events,
            json,
        } => handle_simulate(config, params, seed, steps, accounts, miss_rate, events, json),
        Commands::SideChainId { name } => handle_side_chain_id(&name),
        Commands::Params { params } => handle_params(params),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn load_params(path: Option<PathBuf>) -> Result<Option<Params>> {
    path.map(|p| {
        Params::from_json_file(&p).with_context(|| format!("loading params from {}", p.display()))
    })
    .transpose()
}

#[allow(clippy::too_many_arguments)]
fn handle_simulate(
    config_path: Option<PathBuf>,
    params_path: Option<PathBuf>,
    seed: Option<u64>,
    steps: Option<u64>,
    accounts: Option<usize>,
    miss_rate: Option<f64>,
    print_events: bool,
    json: bool,
) -> Result<()> {
    let mut config = match config_path {
        Some(p) => SimulationConfig::from_json_file(&p)
            .with_context(|| format!("loading simulation config from {}", p.display()))?,
        None => SimulationConfig::default(),
    };
    if let Some(params) = load_params(params_path)? {
        config.params = params;
    }
    if let Some(seed) = seed {
        config.seed = seed;
    }
    if let Some(steps) = steps {
        config.steps = steps;
    }
    if let Some(accounts) = accounts {
        config.num_accounts = accounts;
    }
    if let Some(rate) = miss_rate {
        config.miss_rate = rate;
    }

    let report = run_simulation(config).context("simulation aborted")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    if print_events {
        for event in &report.events {
            println!("{:>6}  {}", event.step, event);
        }
        println!();
    }
    for (key, count) in &report.tallies {
        println!("{:<48} {}", key, count);
    }
    println!();
    println!("Final height:      {}", report.final_height);
    println!("Total supply:      {}", report.total_supply);
    println!("Downtime jailings: {}", report.downtime_jailings);
    println!("Released tokens:   {}", report.released_tokens);
    println!("Invariant checks:  {}", report.invariant_checks);
    println!("State root:        {}", report.state_root);
    Ok(())
}

fn handle_side_chain_id(name: &str) -> Result<()> {
    let id = side_chain_id_from_text(name)?;
    println!("{}", id);
    Ok(())
}

fn handle_params(path: Option<PathBuf>) -> Result<()> {
    let params = load_params(path)?.unwrap_or_default();
    println!("{}", serde_json::to_string_pretty(&params)?);
    Ok(())
}

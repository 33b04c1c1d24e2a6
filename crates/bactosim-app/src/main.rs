mod report;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use bactosim_core::{
    ComputeBackend, LocalCompute, Simulation, SimulationConfig, TraitCategory, TraitId,
};
use bactosim_offload::RemoteCompute;
use clap::{Args, Parser, Subcommand, ValueEnum};
use owo_colors::OwoColorize;
use tracing::{info, warn};

use crate::report::RunReport;

#[derive(Parser, Debug)]
#[command(
    name = "bactosim",
    version,
    about = "Headless evolutionary bacteria simulation"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the simulation for a fixed number of ticks and print a report.
    Run(RunArgs),
    /// List the trait pool.
    Traits {
        /// Only show traits of this category.
        #[arg(long, value_enum)]
        category: Option<CategoryArg>,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Number of ticks to simulate.
    #[arg(long, default_value_t = 3_000)]
    ticks: u64,
    /// Time delta per tick.
    #[arg(long, default_value_t = 1.0)]
    dt: f64,
    /// RNG seed for a reproducible run.
    #[arg(long, env = "BACTOSIM_SEED")]
    seed: Option<u64>,
    /// Initial population size (raises the cap if needed).
    #[arg(long)]
    population: Option<usize>,
    /// Trigger a selection event every N ticks; 0 disables selection.
    #[arg(long, default_value_t = 600)]
    selection_every: u64,
    /// Trait index tested by selection events; random when omitted.
    #[arg(long)]
    selection_trait: Option<usize>,
    /// Base URL of a remote compute service.
    #[arg(long, env = "BACTOSIM_OFFLOAD_URL")]
    offload_url: Option<String>,
    /// Per-request timeout for the remote compute service, in milliseconds.
    #[arg(long, default_value_t = 5_000)]
    offload_timeout_ms: u64,
    /// Log a progress line every N ticks; 0 disables progress logging.
    #[arg(long, default_value_t = 300)]
    report_every: u64,
    /// JSON file with a (partial) simulation configuration.
    #[arg(long, env = "BACTOSIM_CONFIG")]
    config: Option<PathBuf>,
    /// Print the final report as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CategoryArg {
    Resistance,
    Metabolic,
    Behavioral,
    Survival,
    Genetic,
    Reproductive,
}

impl From<CategoryArg> for TraitCategory {
    fn from(arg: CategoryArg) -> Self {
        match arg {
            CategoryArg::Resistance => Self::Resistance,
            CategoryArg::Metabolic => Self::Metabolic,
            CategoryArg::Behavioral => Self::Behavioral,
            CategoryArg::Survival => Self::Survival,
            CategoryArg::Genetic => Self::Genetic,
            CategoryArg::Reproductive => Self::Reproductive,
        }
    }
}

const CATEGORIES: [TraitCategory; 6] = [
    TraitCategory::Resistance,
    TraitCategory::Metabolic,
    TraitCategory::Behavioral,
    TraitCategory::Survival,
    TraitCategory::Genetic,
    TraitCategory::Reproductive,
];

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run(&args),
        Command::Traits { category } => {
            print_traits(category.map(Into::into));
            Ok(())
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn run(args: &RunArgs) -> Result<()> {
    ensure!(
        args.dt.is_finite() && args.dt > 0.0,
        "--dt must be a positive number"
    );
    let selection_trait = args
        .selection_trait
        .map(|index| TraitId::new(index).with_context(|| format!("no trait at index {index}")))
        .transpose()?;
    let config = build_config(args)?;
    let local = LocalCompute::new(config.genetics.kmeans_iterations, config.traits_per_agent);
    let backend = match &args.offload_url {
        Some(url) => {
            let remote =
                RemoteCompute::new(url.clone(), Duration::from_millis(args.offload_timeout_ms))
                    .context("failed to build offload client")?;
            ComputeBackend::with_remote(Box::new(remote), local)
        }
        None => ComputeBackend::local(local),
    };
    let mut sim =
        Simulation::with_backend(config, backend).context("failed to start simulation")?;
    info!(
        population = sim.population().live_count(),
        compute = ?sim.compute_status(),
        ticks = args.ticks,
        "simulation started"
    );

    let mut report = RunReport::new(sim.compute_status());
    for _ in 0..args.ticks {
        let events = sim.step(args.dt).context("simulation step failed")?;
        report.record(&events);
        let tick = events.tick.0;
        if sim.population().is_empty() && !sim.selection_in_progress() {
            warn!(tick, "population extinct; stopping run");
            break;
        }
        if args.selection_every > 0
            && tick % args.selection_every == 0
            && !sim.selection_in_progress()
        {
            match sim.trigger_selection_event(selection_trait) {
                Ok(outcome) => report.record_selection(&outcome),
                Err(err) => warn!(tick, error = %err, "selection event skipped"),
            }
        }
        if args.report_every > 0 && tick % args.report_every == 0 {
            info!(
                tick,
                generation = sim.generation().0,
                population = sim.population().live_count(),
                food = sim.ecosystem().food().len(),
                hazards = sim.ecosystem().hazards().len(),
                compute = ?sim.compute_status(),
                "progress"
            );
        }
    }

    report.finish(&sim);
    if args.json {
        let encoded = serde_json::to_string_pretty(&report).context("failed to encode report")?;
        println!("{encoded}");
    } else {
        print!("{}", report.render());
    }
    Ok(())
}

fn build_config(args: &RunArgs) -> Result<SimulationConfig> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => SimulationConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.rng_seed = Some(seed);
    }
    if let Some(population) = args.population {
        config.initial_population = population;
        config.max_population = config.max_population.max(population);
    }
    Ok(config)
}

fn load_config(path: &Path) -> Result<SimulationConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse config {}", path.display()))
}

fn print_traits(filter: Option<TraitCategory>) {
    for category in CATEGORIES {
        if filter.is_some_and(|wanted| wanted != category) {
            continue;
        }
        println!("{}", category.label().to_uppercase().bold());
        for id in TraitId::in_category(category) {
            let info = id.info();
            let [r, g, b] = info.color;
            println!(
                "  {:>2}  {:<24} {}",
                id.index(),
                info.name.truecolor(r, g, b),
                info.description.dimmed()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn run_args(extra: &[&str]) -> RunArgs {
        let mut argv = vec!["bactosim", "run"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).expect("parse").command {
            Command::Run(args) => args,
            Command::Traits { .. } => panic!("expected run"),
        }
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_override_config() {
        let args = run_args(&["--seed", "9", "--population", "400"]);
        let config = build_config(&args).expect("config");
        assert_eq!(config.rng_seed, Some(9));
        assert_eq!(config.initial_population, 400);
        assert_eq!(config.max_population, 400);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_config_file_is_reported() {
        let args = run_args(&["--config", "/nonexistent/bactosim.json"]);
        let err = build_config(&args).unwrap_err();
        assert!(err.to_string().contains("failed to read config"));
    }

    #[test]
    fn traits_accepts_category_filter() {
        let cli = Cli::try_parse_from(["bactosim", "traits", "--category", "genetic"])
            .expect("parse");
        assert!(matches!(
            cli.command,
            Command::Traits {
                category: Some(CategoryArg::Genetic)
            }
        ));
    }
}

//! Lightcone - command line runner
//!
//! Generates a universe (or loads a saved one), runs it for a number of
//! steps with its configured AI, and saves it.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use lightcone_sim::core::config::RuntimeOptions;
use lightcone_sim::persistence::UniverseStore;
use lightcone_sim::universe::{CommandBatch, GenerationMethod, GenerationParams};
use lightcone_sim::{Registry, Result, Universe, UniverseSettings};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Placement {
    Random,
    Line,
}

impl From<Placement> for GenerationMethod {
    fn from(placement: Placement) -> Self {
        match placement {
            Placement::Random => GenerationMethod::Random,
            Placement::Line => GenerationMethod::Line,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "lightcone")]
#[command(about = "Step a universe where commands travel at the speed of light")]
struct Args {
    /// Universe settings (TOML); defaults are used when omitted
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Resume the saved universe with this name instead of generating one
    #[arg(long)]
    load: Option<String>,

    /// Reseed all random streams after loading
    #[arg(long)]
    randomize_seed: bool,

    /// Override the random seed of a generated universe
    #[arg(long)]
    seed: Option<u64>,

    /// Override the AI collection of a generated universe
    #[arg(long)]
    ai: Option<String>,

    /// Number of agents to generate
    #[arg(long, default_value_t = 20)]
    agents: usize,

    /// Starting placement of generated agents
    #[arg(long, value_enum, default_value = "random")]
    placement: Placement,

    /// Steps to run
    #[arg(long, short = 'n', default_value_t = 10)]
    steps: u32,

    /// Save every N steps (0 = only at the end)
    #[arg(long, default_value_t = 0)]
    save_every: u32,

    /// Save after every step, writing only the newest artifacts
    #[arg(long, conflicts_with = "save_every")]
    incremental: bool,

    /// Directory holding saved universes
    #[arg(long, default_value = "saves")]
    save_root: PathBuf,

    /// Worker threads for per-cell work (0 = one per core)
    #[arg(long, default_value_t = 0)]
    threads: usize,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lightcone_sim=info".into()),
        )
        .init();

    let args = Args::parse();
    let registry = Registry::with_builtins();
    let options = RuntimeOptions {
        worker_threads: args.threads,
        save_root: args.save_root.clone(),
    };
    let store = UniverseStore::new(&options.save_root);

    let mut universe = match &args.load {
        Some(name) => Universe::load(&store, name, &registry, &options, args.randomize_seed)?,
        None => {
            let mut settings = match &args.settings {
                Some(path) => UniverseSettings::load(path)?,
                None => UniverseSettings::default(),
            };
            if let Some(seed) = args.seed {
                settings.random_seed = seed;
            }
            if let Some(ai) = &args.ai {
                settings.ai_collection = ai.clone();
            }
            let params = GenerationParams {
                agent_count: args.agents,
                method: args.placement.into(),
                ..GenerationParams::default()
            };
            let universe = Universe::generate(settings, &params, &registry, &options)?;
            universe.save_all(&store)?;
            universe
        }
    };

    for step in 1..=args.steps {
        let report = universe.step(CommandBatch::new())?;
        tracing::info!(
            time = universe.time(),
            agents = report.post.commit.agents,
            delivered = report.pre.executed().count() + report.post.executed().count(),
            rejected = report.pre.rejections.len() + report.post.rejections.len(),
            in_flight = universe.pending_commands(),
            "step"
        );
        if args.incremental {
            universe.save_latest(&store)?;
        } else if args.save_every > 0 && step % args.save_every == 0 {
            universe.save_all(&store)?;
        }
    }

    universe.save_all(&store)?;

    let census = universe.global();
    println!("Universe '{}' at t={}", universe.settings().universe_name, universe.time());
    println!("  live agents:      {}", universe.agents().count());
    println!("  commands queued:  {}", universe.pending_commands());
    println!(
        "  last census (t={}): {} agents, {:.1} resources, {:.1} population",
        census.time, census.agent_count, census.total_resources, census.total_population
    );
    println!("Saved to {}", store.universe_dir(&universe.settings().universe_name).display());
    Ok(())
}

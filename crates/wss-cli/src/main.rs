mod config;
mod prepare;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use wss_agent::{
    AgentSpec, CallLog, GeminiLlm, LoggedLlm, OpenAiLlm, ReasoningKind, RetryPolicy,
};
use wss_core::{Embedder, HashingEmbedder, InteractionTool, Llm, MemoryKind, ScriptedLlm};
use wss_sim::{
    load_groundtruth, load_tasks, run_ablation, InMemoryDataset, Metric, Simulator, TaskOutcome,
};
use wss_store::DatasetStore;

use crate::config::Config;

#[derive(Parser)]
#[command(
    name = "wss",
    version,
    about = "Web society simulator - LLM agents that write Yelp reviews"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Dataset and execution options shared by `run` and `ablate`.
#[derive(clap::Args)]
struct RunArgs {
    /// Prepared dataset directory (item.json, review.json, user.json)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Directory of task_<n>.json files
    #[arg(long)]
    tasks: Option<PathBuf>,

    /// Directory of groundtruth_<n>.json files
    #[arg(long)]
    groundtruth: Option<PathBuf>,

    /// Worker threads
    #[arg(short, long)]
    workers: Option<usize>,

    /// Run tasks one after another
    #[arg(long)]
    sequential: bool,

    /// Serve the dataset from SQLite instead of loading it into memory
    #[arg(long)]
    cache: bool,

    /// Reasoning strategy
    #[arg(short, long)]
    reasoning: Option<CliReasoning>,

    /// JSON Lines log of every LLM call
    #[arg(long)]
    call_log: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Filter the raw Yelp dataset into simulator input files
    Prepare {
        /// Directory holding the yelp_academic_dataset_*.json files
        #[arg(long)]
        input_dir: PathBuf,

        /// Where item.json, review.json and user.json are written
        #[arg(long)]
        output_dir: PathBuf,

        /// Cities to keep (repeatable)
        #[arg(long, default_value = prepare::DEFAULT_CITY)]
        city: Vec<String>,
    },

    /// Simulate tasks and print the evaluation
    Run {
        #[command(flatten)]
        args: RunArgs,

        /// Number of tasks (default: all)
        #[arg(short = 'n', long)]
        count: Option<usize>,

        /// Memory variant
        #[arg(short, long)]
        memory: Option<CliMemory>,

        /// Write per-task outputs to this JSON file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Score a saved outputs file against ground truth
    Evaluate {
        /// Outputs file written by `run --output`
        #[arg(long)]
        outputs: PathBuf,

        /// Directory of groundtruth_<n>.json files
        #[arg(long)]
        groundtruth: PathBuf,
    },

    /// Compare memory variants on the same tasks
    Ablate {
        #[command(flatten)]
        args: RunArgs,

        /// Memory variants (comma-separated)
        #[arg(
            short,
            long,
            value_delimiter = ',',
            default_value = "dilu,generative,tp,voyager"
        )]
        memory: Vec<CliMemory>,

        /// Number of tasks per variant
        #[arg(short = 'n', long, default_value = "5")]
        count: usize,

        /// Check an ordering claim, e.g. "voyager > generative > tp > dilu"
        #[arg(long)]
        claim: Option<String>,
    },

    /// Show the active configuration
    Config,
}

#[derive(Clone, Copy, ValueEnum)]
enum CliReasoning {
    Io,
    Cot,
    Cotsc,
    Tot,
    Dilu,
    SelfRefine,
    Stepback,
}

impl From<CliReasoning> for ReasoningKind {
    fn from(val: CliReasoning) -> Self {
        match val {
            CliReasoning::Io => ReasoningKind::Io,
            CliReasoning::Cot => ReasoningKind::Cot,
            CliReasoning::Cotsc => ReasoningKind::CotSc,
            CliReasoning::Tot => ReasoningKind::Tot,
            CliReasoning::Dilu => ReasoningKind::Dilu,
            CliReasoning::SelfRefine => ReasoningKind::SelfRefine,
            CliReasoning::Stepback => ReasoningKind::StepBack,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum CliMemory {
    Dilu,
    Generative,
    Tp,
    Voyager,
    None,
}

impl From<CliMemory> for Option<MemoryKind> {
    fn from(val: CliMemory) -> Self {
        match val {
            CliMemory::Dilu => Some(MemoryKind::Dilu),
            CliMemory::Generative => Some(MemoryKind::Generative),
            CliMemory::Tp => Some(MemoryKind::Tp),
            CliMemory::Voyager => Some(MemoryKind::Voyager),
            CliMemory::None => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

fn default_cache_db() -> PathBuf {
    directories::ProjectDirs::from("dev", "wss", "wss")
        .map(|dirs| dirs.data_dir().join("dataset.db"))
        .unwrap_or_else(|| PathBuf::from("dataset.db"))
}

fn open_call_log(path: Option<PathBuf>) -> Result<Arc<CallLog>> {
    match path {
        Some(p) => Ok(Arc::new(
            CallLog::open(&p).with_context(|| format!("opening call log {}", p.display()))?,
        )),
        None => Ok(Arc::new(CallLog::disabled())),
    }
}

fn logged<L: Llm + 'static>(llm: L, log: &Arc<CallLog>) -> Arc<dyn Llm> {
    Arc::new(LoggedLlm::new(llm, log.clone()))
}

fn init_llm(config: &Config, log: &Arc<CallLog>) -> Result<Arc<dyn Llm>> {
    let cfg = &config.llm;
    let retry = RetryPolicy {
        max_attempts: cfg.max_attempts,
        ..RetryPolicy::default()
    };
    let timeout = Duration::from_secs(cfg.timeout_secs);

    match cfg.provider.as_str() {
        "gemini" => {
            let key = std::env::var(&cfg.api_key_env)
                .with_context(|| format!("{} is not set", cfg.api_key_env))?;
            let mut llm = GeminiLlm::new(key, &cfg.model)
                .with_retry(retry)
                .with_timeout(timeout);
            if let Some(url) = &cfg.base_url {
                llm = llm.with_base_url(url);
            }
            Ok(logged(llm, log))
        }
        "openai" => {
            let key = std::env::var(&cfg.api_key_env).ok();
            let mut llm = OpenAiLlm::new(key, &cfg.model)
                .with_retry(retry)
                .with_timeout(timeout);
            if let Some(url) = &cfg.base_url {
                llm = llm.with_base_url(url);
            }
            Ok(logged(llm, log))
        }
        "scripted" => {
            if cfg.responses.is_empty() {
                bail!("provider \"scripted\" needs [llm] responses");
            }
            Ok(logged(ScriptedLlm::new(cfg.responses.clone()), log))
        }
        other => bail!("unknown LLM provider: {other} (expected gemini, openai or scripted)"),
    }
}

#[cfg(feature = "embeddings")]
fn fastembed() -> Result<Arc<dyn Embedder>> {
    Ok(Arc::new(wss_core::FastEmbedder::new()))
}

#[cfg(not(feature = "embeddings"))]
fn fastembed() -> Result<Arc<dyn Embedder>> {
    bail!("embeddings feature not enabled; rebuild with `--features embeddings` or use backend = \"hashing\"")
}

fn init_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    match config.embedding.backend.as_str() {
        "fastembed" => fastembed(),
        "hashing" => Ok(Arc::new(HashingEmbedder::new(config.embedding.dimensions))),
        other => bail!("unknown embedding backend: {other} (expected fastembed or hashing)"),
    }
}

fn init_tool(config: &Config, data_dir: &Path, cache: bool) -> Result<Arc<dyn InteractionTool>> {
    if cache {
        let db = config
            .simulation
            .cache_db
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(default_cache_db);
        let store = DatasetStore::open(&db).context("failed to open dataset cache")?;
        let stats = store
            .import_dir(data_dir)
            .with_context(|| format!("importing {}", data_dir.display()))?;
        tracing::debug!(?stats, "dataset cache ready");
        Ok(Arc::new(store))
    } else {
        let ds = InMemoryDataset::load(data_dir)
            .with_context(|| format!("loading dataset from {}", data_dir.display()))?;
        Ok(Arc::new(ds))
    }
}

fn parse_reasoning(config: &Config, flag: Option<CliReasoning>) -> Result<ReasoningKind> {
    match flag {
        Some(r) => Ok(r.into()),
        None => config
            .agent
            .reasoning
            .parse::<ReasoningKind>()
            .map_err(|e: String| anyhow::anyhow!(e)),
    }
}

fn parse_memory(config: &Config, flag: Option<CliMemory>) -> Result<Option<MemoryKind>> {
    match flag {
        Some(m) => Ok(m.into()),
        None if config.agent.memory.eq_ignore_ascii_case("none") => Ok(None),
        None => config
            .agent
            .memory
            .parse::<MemoryKind>()
            .map(Some)
            .map_err(|e: String| anyhow::anyhow!(e)),
    }
}

/// Simulator with tasks loaded, plus the thread settings to run it with.
struct Prepared {
    sim: Simulator,
    threading: bool,
    workers: usize,
}

fn build_simulator(config: &Config, args: RunArgs, spec: AgentSpec) -> Result<Prepared> {
    let sim_cfg = &config.simulation;
    let data_dir = args
        .data_dir
        .unwrap_or_else(|| PathBuf::from(&sim_cfg.data_dir));
    let task_dir = args.tasks.unwrap_or_else(|| PathBuf::from(&sim_cfg.task_dir));
    let gt_dir = args
        .groundtruth
        .unwrap_or_else(|| PathBuf::from(&sim_cfg.groundtruth_dir));
    let call_log = args
        .call_log
        .or_else(|| config.log.call_log.as_ref().map(PathBuf::from));

    let log = open_call_log(call_log)?;
    let llm = init_llm(config, &log)?;
    let embedder = init_embedder(config)?;
    let tool = init_tool(config, &data_dir, args.cache || sim_cfg.cache)?;
    let (tasks, groundtruth) = load_tasks(&task_dir, &gt_dir).context("failed to load tasks")?;

    let mut sim = Simulator::new(tool, llm, embedder, spec).with_call_log(log);
    if let Some(root) = &sim_cfg.db_dir {
        sim = sim.with_db_root(PathBuf::from(root));
    }
    sim.set_tasks(tasks, groundtruth);

    Ok(Prepared {
        sim,
        threading: sim_cfg.threading && !args.sequential,
        workers: args.workers.unwrap_or(sim_cfg.max_workers),
    })
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::WARN.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Prepare {
            input_dir,
            output_dir,
            city,
        } => cmd_prepare(&input_dir, &output_dir, &city),
        Commands::Run {
            args,
            count,
            memory,
            output,
        } => {
            let config = config::load_config()?;
            cmd_run(&config, args, count, memory, output)
        }
        Commands::Evaluate {
            outputs,
            groundtruth,
        } => {
            let config = config::load_config()?;
            cmd_evaluate(&config, &outputs, &groundtruth)
        }
        Commands::Ablate {
            args,
            memory,
            count,
            claim,
        } => {
            let config = config::load_config()?;
            cmd_ablate(&config, args, &memory, count, claim.as_deref())
        }
        Commands::Config => cmd_config(),
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_prepare(input_dir: &Path, output_dir: &Path, cities: &[String]) -> Result<()> {
    let stats = prepare::prepare_yelp(input_dir, output_dir, cities)?;
    println!(
        "Prepared {} items, {} reviews, {} users in {}",
        stats.items,
        stats.reviews,
        stats.users,
        output_dir.display()
    );
    if stats.skipped > 0 {
        println!("Skipped {} malformed lines", stats.skipped);
    }
    Ok(())
}

fn cmd_run(
    config: &Config,
    args: RunArgs,
    count: Option<usize>,
    memory: Option<CliMemory>,
    output: Option<PathBuf>,
) -> Result<()> {
    let spec = AgentSpec {
        reasoning: parse_reasoning(config, args.reasoning)?,
        memory: parse_memory(config, memory)?,
    };
    let Prepared {
        mut sim,
        threading,
        workers,
    } = build_simulator(config, args, spec)?;

    let outcomes = sim.run(count, threading, workers)?;
    if let Some(path) = output {
        let json = serde_json::to_string_pretty(outcomes)?;
        std::fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
        eprintln!("Wrote {} outputs to {}", outcomes.len(), path.display());
    }

    let report = sim.evaluate()?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn cmd_evaluate(config: &Config, outputs: &Path, groundtruth: &Path) -> Result<()> {
    let content = std::fs::read_to_string(outputs)
        .with_context(|| format!("reading {}", outputs.display()))?;
    let outcomes: Vec<TaskOutcome> =
        serde_json::from_str(&content).with_context(|| format!("parsing {}", outputs.display()))?;
    let groundtruth = load_groundtruth(groundtruth).context("failed to load ground truth")?;
    let embedder = init_embedder(config)?;

    let outputs: Vec<_> = outcomes.iter().map(TaskOutcome::scored_output).collect();
    let report = wss_sim::evaluate(embedder.as_ref(), &outputs, &groundtruth)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn cmd_ablate(
    config: &Config,
    args: RunArgs,
    memory: &[CliMemory],
    count: usize,
    claim: Option<&str>,
) -> Result<()> {
    let reasoning = parse_reasoning(config, args.reasoning)?;
    let specs: Vec<AgentSpec> = memory
        .iter()
        .map(|m| AgentSpec {
            reasoning,
            memory: (*m).into(),
        })
        .collect();
    let Some(first) = specs.first().copied() else {
        bail!("no memory variants given");
    };
    let Prepared {
        mut sim,
        threading,
        workers,
    } = build_simulator(config, args, first)?;

    let report = run_ablation(&mut sim, &specs, Some(count), threading, workers)?;
    println!("{}", report.to_markdown());

    if let Some(claim) = claim {
        let check = report.check_ordering(claim, Metric::Overall)?;
        if check.holds {
            println!("Claim holds: {claim}");
        } else {
            println!("Claim does not hold: {claim}");
            for v in &check.violations {
                println!("  - {v}");
            }
        }
    }
    Ok(())
}

fn cmd_config() -> Result<()> {
    let config = config::load_config()?;
    println!("Config: {}", config::show_config_path());
    println!();
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

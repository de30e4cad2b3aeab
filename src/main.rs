// src/main.rs
//
// Thin harness around the SmartPacer library.
// - train:    run a training sweep described by a YAML spec
// - play:     play a trained value table greedily for one athlete / workout
// - simulate: fixed-action demo session (no learning, no table)

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use smartpacer::rl::{demo_script, find_table, play_greedy, play_script, SessionSummary};
use smartpacer::{
    load_athletes, load_workouts, nearest_profile_label, resolve_effective_threads, run_sweep,
    AthleteProfile, EventSink, FileSink, GreedyPolicy, LookupMissPolicy, NoopSink, PacingEnv,
    PacingEnvConfig, SweepInputs, SweepSpec, TerrainSequence, ValueTable,
};

#[derive(Parser, Debug)]
#[command(name = "smartpacer", version, about = "Runner pacing simulator and Q-learning trainer")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train every athlete x workout x hyperparameter combination of a sweep.
    Train {
        /// Sweep spec (YAML).
        #[arg(long)]
        spec: PathBuf,
        /// Worker threads (overrides SMARTPACER_THREADS and the sweep file).
        #[arg(long)]
        threads: Option<usize>,
        /// Override the sweep file's episode count.
        #[arg(long)]
        episodes: Option<u32>,
        /// Override the sweep file's output directory.
        #[arg(long)]
        out_dir: Option<PathBuf>,
        /// Override the sweep file's base seed.
        #[arg(long)]
        base_seed: Option<u64>,
    },
    /// Play a trained value table greedily.
    Play {
        #[command(flatten)]
        session: SessionArgs,
        /// Value table to play.
        #[arg(long, conflicts_with = "q_dir")]
        q_table: Option<PathBuf>,
        /// Directory of sweep tables; the table of the nearest base profile is used.
        #[arg(long)]
        q_dir: Option<PathBuf>,
        /// Fallback for unseen states.
        #[arg(long, default_value = "keep-going", value_parser = parse_miss_policy)]
        on_miss: LookupMissPolicy,
    },
    /// Run the fixed-action demo session.
    Simulate {
        #[command(flatten)]
        session: SessionArgs,
    },
}

#[derive(Args, Debug)]
struct SessionArgs {
    /// Athletes file (JSON).
    #[arg(long)]
    athletes: PathBuf,
    /// Workouts file (JSON).
    #[arg(long)]
    workouts: PathBuf,
    /// Workout label.
    #[arg(long)]
    workout: String,
    /// Athlete label from the athletes file.
    #[arg(long, conflicts_with = "profile")]
    athlete: Option<String>,
    /// Custom profile as HR_rest,HR_max,FTP,weight_kg.
    #[arg(long)]
    profile: Option<String>,
    /// Terrain file (JSON list of points with a `slope` field).
    #[arg(long)]
    terrain: Option<PathBuf>,
    /// JSONL session log.
    #[arg(long)]
    log: Option<PathBuf>,
    /// Noise seed.
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Disable fatigue and reward noise.
    #[arg(long)]
    deterministic: bool,
}

fn parse_miss_policy(s: &str) -> std::result::Result<LookupMissPolicy, String> {
    LookupMissPolicy::parse(s).ok_or_else(|| format!("expected keep-going or explore, got '{s}'"))
}

fn parse_profile(s: &str) -> Result<AthleteProfile> {
    let values = s
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("invalid --profile '{s}'"))?;
    let &[hr_rest, hr_max, ftp, weight_kg] = values.as_slice() else {
        bail!("--profile expects 4 values (HR_rest,HR_max,FTP,weight_kg), got {}", values.len());
    };
    Ok(AthleteProfile::new(hr_rest, hr_max, ftp, weight_kg)?)
}

/// Build the session sink as a trait object so we can choose between
/// FileSink and NoopSink at runtime.
fn build_sink(log: Option<&Path>) -> Result<Box<dyn EventSink>> {
    match log {
        Some(path) => Ok(Box::new(FileSink::create(path)?)),
        None => Ok(Box::new(NoopSink)),
    }
}

struct Session {
    env: PacingEnv,
    /// Base profile label closest to the session athlete.
    base_label: Option<String>,
    workout: String,
}

fn build_session(args: &SessionArgs) -> Result<Session> {
    let athletes = load_athletes(&args.athletes)?;
    let workouts = load_workouts(&args.workouts)?;

    let athlete = match (&args.athlete, &args.profile) {
        (Some(label), _) => athletes
            .get(label)
            .cloned()
            .ok_or_else(|| anyhow!("athlete '{label}' not found in {}", args.athletes.display()))?,
        (None, Some(profile)) => parse_profile(profile)?,
        (None, None) => bail!("one of --athlete or --profile is required"),
    };
    let base_label = match &args.athlete {
        Some(label) => Some(label.clone()),
        None => nearest_profile_label(&athlete, &athletes).map(str::to_string),
    };
    tracing::info!(
        level = athlete.level().as_str(),
        ftp_per_kg = athlete.ftp_per_kg(),
        base_profile = ?base_label,
        "athlete resolved"
    );

    let plan = workouts
        .get(&args.workout)
        .ok_or_else(|| anyhow!("workout '{}' not found in {}", args.workout, args.workouts.display()))?;
    let terrain = match &args.terrain {
        Some(path) => TerrainSequence::load(path)?,
        None => TerrainSequence::flat(),
    };
    let config = if args.deterministic {
        PacingEnvConfig::deterministic()
    } else {
        PacingEnvConfig::default()
    }
    .with_seed(args.seed);

    Ok(Session {
        env: PacingEnv::new(athlete, plan, terrain, config)?,
        base_label,
        workout: args.workout.clone(),
    })
}

fn print_summary(summary: &SessionSummary) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(summary)?);
    Ok(())
}

fn cmd_train(
    spec_path: &Path,
    threads: Option<usize>,
    episodes: Option<u32>,
    out_dir: Option<PathBuf>,
    base_seed: Option<u64>,
) -> Result<()> {
    let mut spec = SweepSpec::from_yaml_file(spec_path)
        .with_context(|| format!("loading sweep spec {}", spec_path.display()))?;
    if let Some(n) = episodes {
        spec.episodes = n;
    }
    if let Some(dir) = out_dir {
        spec.out_dir = dir;
    }
    if let Some(seed) = base_seed {
        spec.base_seed = seed;
    }
    spec.validate()?;

    let effective = resolve_effective_threads(threads, spec.threads);
    effective.log_startup();

    let inputs = SweepInputs::load(&spec)?;
    let cancel = AtomicBool::new(false);
    let summary = run_sweep(&spec, &inputs, effective.threads, &cancel)?;

    println!(
        "sweep {}: {} runs, {} completed, {} failed -> {}",
        summary.sweep_id,
        summary.total_runs,
        summary.completed,
        summary.failed,
        spec.out_dir.display()
    );
    if summary.failed > 0 {
        for run in summary.runs.iter().filter(|r| r.error.is_some()) {
            eprintln!("  FAILED {}: {}", run.label, run.error.as_deref().unwrap_or(""));
        }
    }
    Ok(())
}

fn cmd_play(
    args: &SessionArgs,
    q_table: Option<&Path>,
    q_dir: Option<&Path>,
    on_miss: LookupMissPolicy,
) -> Result<()> {
    let mut session = build_session(args)?;
    let table_path = match (q_table, q_dir) {
        (Some(path), _) => path.to_path_buf(),
        (None, Some(dir)) => {
            let base = session
                .base_label
                .as_deref()
                .ok_or_else(|| anyhow!("no base profile available to pick a table"))?;
            find_table(dir, base, &session.workout)?
        }
        (None, None) => bail!("one of --q-table or --q-dir is required"),
    };
    tracing::info!(path = %table_path.display(), "loading value table");
    let table = ValueTable::load(&table_path)?;

    let mut policy = GreedyPolicy::new(table, on_miss, args.seed);
    let mut sink = build_sink(args.log.as_deref())?;
    let summary = play_greedy(&mut session.env, &mut policy, sink.as_mut())?;
    print_summary(&summary)
}

fn cmd_simulate(args: &SessionArgs) -> Result<()> {
    let mut session = build_session(args)?;
    let mut sink = build_sink(args.log.as_deref())?;
    let summary = play_script(&mut session.env, &demo_script(), sink.as_mut())?;
    print_summary(&summary)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Train {
            spec,
            threads,
            episodes,
            out_dir,
            base_seed,
        } => cmd_train(&spec, threads, episodes, out_dir, base_seed),
        Command::Play {
            session,
            q_table,
            q_dir,
            on_miss,
        } => cmd_play(&session, q_table.as_deref(), q_dir.as_deref(), on_miss),
        Command::Simulate { session } => cmd_simulate(&session),
    }
}

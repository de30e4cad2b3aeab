// src/sweep.rs
//
// Training sweep orchestration.
//
// Enumerates athletes x workouts x hyperparameter sets, trains every
// combination as an independent run on a rayon pool, and writes per-run
// artifacts plus a sweep summary:
//
//   <out_dir>/q-tables/q_<label>.json   value table
//   <out_dir>/rewards/<label>.json      per-episode total reward
//   <out_dir>/sweep_summary.json        one entry per run, in plan order
//
// Each run's seed is derived from its label, so results do not depend on the
// worker count or on the order in which runs are scheduled.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::athlete::{load_athlete_records, AthleteProfile};
use crate::config::{Hyperparams, SweepSpec};
use crate::error::{PacerError, Result};
use crate::io::{ensure_dir, write_json_atomic};
use crate::plan::{load_workout_records, WorkoutPlan};
use crate::rl::learner::LookupMissPolicy;
use crate::rl::runner::{train, RunConfig, RunOutcome, TerminationReason};
use crate::rl::sim_env::{PacingEnv, PacingEnvConfig};
use crate::terrain::TerrainSequence;

pub const Q_TABLE_DIR: &str = "q-tables";
pub const REWARDS_DIR: &str = "rewards";
pub const SUMMARY_FILE: &str = "sweep_summary.json";

/// Episodes averaged for the summary's trailing reward.
pub const TRAILING_WINDOW: usize = 100;

/// 64-bit FNV-1a.
pub fn fnv1a64(s: &str) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;
    let mut h = FNV_OFFSET;
    for b in s.as_bytes() {
        h ^= *b as u64;
        h = h.wrapping_mul(FNV_PRIME);
    }
    h
}

/// `{athlete}_{workout}_{hyperparameter suffix}`.
pub fn run_label(athlete: &str, workout: &str, params: &Hyperparams) -> String {
    format!("{athlete}_{workout}_{}", params.label_suffix())
}

/// One planned training run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunPlan {
    pub label: String,
    pub athlete: String,
    pub workout: String,
    pub params: Hyperparams,
    pub seed: u64,
}

/// Parsed inputs shared read-only by every run.
///
/// Records that failed validation are kept with their error rather than
/// dropped: they still take part in planning, and every run that uses one is
/// reported as failed without touching its siblings.
#[derive(Debug, Default)]
pub struct SweepInputs {
    pub athletes: BTreeMap<String, AthleteProfile>,
    pub workouts: BTreeMap<String, WorkoutPlan>,
    pub rejected_athletes: BTreeMap<String, PacerError>,
    pub rejected_workouts: BTreeMap<String, PacerError>,
    pub terrain: TerrainSequence,
}

fn partition<T>(
    kind: &str,
    records: BTreeMap<String, Result<T>>,
) -> (BTreeMap<String, T>, BTreeMap<String, PacerError>) {
    let mut valid = BTreeMap::new();
    let mut rejected = BTreeMap::new();
    for (label, record) in records {
        match record {
            Ok(v) => {
                valid.insert(label, v);
            }
            Err(e) => {
                tracing::warn!(kind, label = %label, error = %e, "invalid record, its runs will fail");
                rejected.insert(label, e);
            }
        }
    }
    (valid, rejected)
}

impl SweepInputs {
    /// Load the sweep's input files. Only file-level problems (unreadable,
    /// not a JSON object, bad terrain) are errors here.
    pub fn load(spec: &SweepSpec) -> Result<Self> {
        let (athletes, rejected_athletes) =
            partition("athlete", load_athlete_records(&spec.athletes)?);
        let (workouts, rejected_workouts) =
            partition("workout", load_workout_records(&spec.workouts)?);
        let terrain = match &spec.terrain {
            Some(path) => TerrainSequence::load(path)?,
            None => TerrainSequence::flat(),
        };
        Ok(Self {
            athletes,
            workouts,
            rejected_athletes,
            rejected_workouts,
            terrain,
        })
    }

    pub fn athlete_labels(&self) -> BTreeSet<&str> {
        labels(&self.athletes, &self.rejected_athletes)
    }

    pub fn workout_labels(&self) -> BTreeSet<&str> {
        labels(&self.workouts, &self.rejected_workouts)
    }

    /// Validation error recorded for one of the plan's inputs, if any.
    pub fn rejection(&self, plan: &RunPlan) -> Option<&PacerError> {
        self.rejected_athletes
            .get(&plan.athlete)
            .or_else(|| self.rejected_workouts.get(&plan.workout))
    }
}

fn labels<'a, T>(
    valid: &'a BTreeMap<String, T>,
    rejected: &'a BTreeMap<String, PacerError>,
) -> BTreeSet<&'a str> {
    valid
        .keys()
        .chain(rejected.keys())
        .map(String::as_str)
        .collect()
}

fn select<'a>(
    field: &str,
    known: &BTreeSet<&'a str>,
    filter: Option<&Vec<String>>,
) -> Result<Vec<&'a str>> {
    match filter {
        None => Ok(known.iter().copied().collect()),
        Some(labels) => labels
            .iter()
            .map(|l| {
                known
                    .get(l.as_str())
                    .copied()
                    .ok_or_else(|| PacerError::config(field, format!("unknown label '{l}'")))
            })
            .collect(),
    }
}

/// Expand a sweep into its runs. Hyperparameter sets are the outer loop,
/// then athletes, then workouts.
pub fn plan_runs(spec: &SweepSpec, inputs: &SweepInputs) -> Result<Vec<RunPlan>> {
    let athlete_labels = inputs.athlete_labels();
    let workout_labels = inputs.workout_labels();
    let athletes = select("athlete_filter", &athlete_labels, spec.athlete_filter.as_ref())?;
    let workouts = select("workout_filter", &workout_labels, spec.workout_filter.as_ref())?;

    let mut seen = BTreeSet::new();
    let mut runs = Vec::new();
    for set in &spec.hyperparams {
        for athlete in athletes.iter().filter(|a| set.applies_to(a)) {
            for workout in &workouts {
                let label = run_label(athlete, workout, &set.params);
                if !seen.insert(label.clone()) {
                    return Err(PacerError::config(
                        "hyperparams",
                        format!("duplicate run label '{label}'"),
                    ));
                }
                runs.push(RunPlan {
                    seed: spec.base_seed ^ fnv1a64(&label),
                    label,
                    athlete: athlete.to_string(),
                    workout: workout.to_string(),
                    params: set.params,
                });
            }
        }
    }
    if runs.is_empty() {
        return Err(PacerError::config(
            "hyperparams",
            "sweep expands to zero runs",
        ));
    }
    Ok(runs)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Cancelled,
    Failed,
}

/// Summary entry for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub label: String,
    pub athlete: String,
    pub workout: String,
    pub params: Hyperparams,
    pub seed: u64,
    pub status: RunStatus,
    pub episodes_completed: usize,
    pub final_epsilon: Option<f64>,
    pub eval_reward: Option<f64>,
    pub mean_reward_last_100: Option<f64>,
    pub visited_states: usize,
    pub table_sha256: Option<String>,
    /// Artifact paths relative to the sweep's output directory.
    pub q_table_path: Option<String>,
    pub rewards_path: Option<String>,
    pub error: Option<String>,
}

impl RunSummary {
    fn failed(plan: &RunPlan, error: &PacerError) -> Self {
        Self {
            label: plan.label.clone(),
            athlete: plan.athlete.clone(),
            workout: plan.workout.clone(),
            params: plan.params,
            seed: plan.seed,
            status: RunStatus::Failed,
            episodes_completed: 0,
            final_epsilon: None,
            eval_reward: None,
            mean_reward_last_100: None,
            visited_states: 0,
            table_sha256: None,
            q_table_path: None,
            rewards_path: None,
            error: Some(error.to_string()),
        }
    }
}

/// Whole-sweep summary (`sweep_summary.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepSummary {
    pub sweep_id: String,
    pub episodes: u32,
    pub base_seed: u64,
    pub total_runs: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub failed: usize,
    pub runs: Vec<RunSummary>,
}

impl SweepSummary {
    fn new(spec: &SweepSpec, runs: Vec<RunSummary>) -> Self {
        let count = |s: RunStatus| runs.iter().filter(|r| r.status == s).count();
        Self {
            sweep_id: spec.sweep_id.clone(),
            episodes: spec.episodes,
            base_seed: spec.base_seed,
            total_runs: runs.len(),
            completed: count(RunStatus::Completed),
            cancelled: count(RunStatus::Cancelled),
            failed: count(RunStatus::Failed),
            runs,
        }
    }
}

fn q_table_rel(label: &str) -> String {
    format!("{Q_TABLE_DIR}/q_{label}.json")
}

fn rewards_rel(label: &str) -> String {
    format!("{REWARDS_DIR}/{label}.json")
}

fn persist(out_dir: &Path, outcome: &RunOutcome) -> Result<()> {
    outcome
        .table
        .save(&out_dir.join(q_table_rel(&outcome.label)))?;
    write_json_atomic(
        &out_dir.join(rewards_rel(&outcome.label)),
        &outcome.episode_rewards,
    )
}

fn execute_run(
    plan: &RunPlan,
    spec: &SweepSpec,
    inputs: &SweepInputs,
    cancel: &AtomicBool,
) -> RunSummary {
    if let Some(e) = inputs.rejection(plan) {
        tracing::error!(label = %plan.label, error = %e, "run failed: invalid input record");
        return RunSummary::failed(plan, e);
    }
    match try_execute_run(plan, spec, inputs, cancel) {
        Ok(summary) => summary,
        Err(e) => {
            tracing::error!(label = %plan.label, error = %e, "run failed");
            RunSummary::failed(plan, &e)
        }
    }
}

fn try_execute_run(
    plan: &RunPlan,
    spec: &SweepSpec,
    inputs: &SweepInputs,
    cancel: &AtomicBool,
) -> Result<RunSummary> {
    let athlete = inputs.athletes.get(&plan.athlete).ok_or_else(|| {
        PacerError::config("athletes", format!("unknown athlete '{}'", plan.athlete))
    })?;
    let workout = inputs.workouts.get(&plan.workout).ok_or_else(|| {
        PacerError::config("workouts", format!("unknown workout '{}'", plan.workout))
    })?;

    let mut env = PacingEnv::new(
        athlete.clone(),
        workout,
        inputs.terrain.clone(),
        PacingEnvConfig::default().with_seed(plan.seed),
    )?;

    tracing::info!(label = %plan.label, seed = plan.seed, episodes = spec.episodes, "run started");
    let cfg = RunConfig {
        label: plan.label.clone(),
        episodes: spec.episodes,
        params: plan.params,
        seed: plan.seed,
        eval_on_miss: LookupMissPolicy::KeepGoing,
    };
    let outcome = train(&mut env, &cfg, cancel);

    let mut summary = RunSummary {
        label: plan.label.clone(),
        athlete: plan.athlete.clone(),
        workout: plan.workout.clone(),
        params: plan.params,
        seed: plan.seed,
        status: RunStatus::Cancelled,
        episodes_completed: outcome.episodes_completed(),
        final_epsilon: Some(outcome.final_epsilon),
        eval_reward: outcome.eval_reward,
        mean_reward_last_100: outcome.trailing_mean(TRAILING_WINDOW),
        visited_states: outcome.table.len(),
        table_sha256: None,
        q_table_path: None,
        rewards_path: None,
        error: None,
    };

    if outcome.termination == TerminationReason::Completed {
        persist(&spec.out_dir, &outcome)?;
        summary.status = RunStatus::Completed;
        summary.table_sha256 = Some(outcome.table.checksum()?);
        summary.q_table_path = Some(q_table_rel(&plan.label));
        summary.rewards_path = Some(rewards_rel(&plan.label));
        tracing::info!(
            label = %plan.label,
            eval_reward = ?outcome.eval_reward,
            visited_states = summary.visited_states,
            "run finished"
        );
    }
    Ok(summary)
}

/// Execute every run of the sweep on `threads` workers and write the summary.
///
/// Per-run failures are recorded in the summary and never abort siblings.
/// Errors returned here are sweep-level: unusable output directory, thread
/// pool construction, summary write.
pub fn run_sweep(
    spec: &SweepSpec,
    inputs: &SweepInputs,
    threads: usize,
    cancel: &AtomicBool,
) -> Result<SweepSummary> {
    let plans = plan_runs(spec, inputs)?;

    ensure_dir(&spec.out_dir.join(Q_TABLE_DIR))?;
    ensure_dir(&spec.out_dir.join(REWARDS_DIR))?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .build()
        .map_err(|e| PacerError::config("threads", e.to_string()))?;

    tracing::info!(
        sweep_id = %spec.sweep_id,
        runs = plans.len(),
        threads = threads.max(1),
        out_dir = %spec.out_dir.display(),
        "sweep started"
    );

    // Indexed collect keeps plan order regardless of scheduling.
    let runs: Vec<RunSummary> = pool.install(|| {
        plans
            .par_iter()
            .map(|plan| execute_run(plan, spec, inputs, cancel))
            .collect()
    });

    let summary = SweepSummary::new(spec, runs);
    write_json_atomic(&summary_path(&spec.out_dir), &summary)?;

    tracing::info!(
        sweep_id = %spec.sweep_id,
        completed = summary.completed,
        cancelled = summary.cancelled,
        failed = summary.failed,
        "sweep finished"
    );
    Ok(summary)
}

pub fn summary_path(out_dir: &Path) -> PathBuf {
    out_dir.join(SUMMARY_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HyperparamSet;
    use crate::plan::Segment;
    use crate::types::{Phase, Zone};

    fn inputs() -> SweepInputs {
        let mut athletes = BTreeMap::new();
        athletes.insert("elite".to_string(), AthleteProfile::new(42.0, 190.0, 320.0, 68.0).unwrap());
        athletes.insert("runner".to_string(), AthleteProfile::new(50.0, 180.0, 280.0, 72.0).unwrap());
        let mut workouts = BTreeMap::new();
        for name in ["fartlek", "recovery"] {
            workouts.insert(
                name.to_string(),
                WorkoutPlan::new(name, 0.5, vec![Segment::new(0.5, Phase::Push, Zone::Z3, Zone::Z3)]),
            );
        }
        SweepInputs {
            athletes,
            workouts,
            ..SweepInputs::default()
        }
    }

    fn spec(hyperparams: Vec<HyperparamSet>) -> SweepSpec {
        SweepSpec {
            sweep_id: "unit".into(),
            athletes: "athletes.json".into(),
            workouts: "workouts.json".into(),
            terrain: None,
            athlete_filter: None,
            workout_filter: None,
            hyperparams,
            episodes: 3,
            threads: 1,
            base_seed: 99,
            out_dir: "unused".into(),
        }
    }

    fn set(params: Hyperparams, athletes: Option<Vec<&str>>) -> HyperparamSet {
        HyperparamSet {
            params,
            athletes: athletes.map(|v| v.into_iter().map(String::from).collect()),
        }
    }

    #[test]
    fn fnv_reference_values() {
        assert_eq!(fnv1a64(""), 0xcbf29ce484222325);
        assert_eq!(fnv1a64("a"), 0xaf63dc4c8601ec8c);
    }

    #[test]
    fn cartesian_product_with_athlete_restriction() {
        let other = Hyperparams {
            gamma: 0.97,
            ..Hyperparams::default()
        };
        let s = spec(vec![
            set(Hyperparams::default(), None),
            set(other, Some(vec!["runner"])),
        ]);
        let runs = plan_runs(&s, &inputs()).unwrap();
        // 2 athletes x 2 workouts + 1 athlete x 2 workouts
        assert_eq!(runs.len(), 6);
        assert_eq!(runs[0].label, "elite_fartlek_a10_g95_e20_m10_d990");
        assert_eq!(runs[5].label, "runner_recovery_a10_g97_e20_m10_d990");
        assert_eq!(runs[0].seed, 99 ^ fnv1a64("elite_fartlek_a10_g95_e20_m10_d990"));
        let labels: BTreeSet<_> = runs.iter().map(|r| r.label.clone()).collect();
        assert_eq!(labels.len(), runs.len());
    }

    #[test]
    fn duplicate_labels_rejected() {
        let s = spec(vec![
            set(Hyperparams::default(), None),
            set(Hyperparams::default(), None),
        ]);
        let err = plan_runs(&s, &inputs()).unwrap_err();
        assert!(err.to_string().contains("duplicate run label"));
    }

    #[test]
    fn sets_differing_only_in_min_epsilon_are_distinct_runs() {
        let s = spec(vec![
            set(Hyperparams::default(), None),
            set(Hyperparams { min_epsilon: 0.05, ..Hyperparams::default() }, None),
        ]);
        let runs = plan_runs(&s, &inputs()).unwrap();
        assert_eq!(runs.len(), 8);
        assert_eq!(runs[0].label, "elite_fartlek_a10_g95_e20_m10_d990");
        assert_eq!(runs[4].label, "elite_fartlek_a10_g95_e20_m50_d990");
        assert_ne!(runs[0].seed, runs[4].seed);
    }

    #[test]
    fn rejected_records_are_planned_and_reported() {
        let mut inputs = inputs();
        inputs.rejected_athletes.insert(
            "bad".to_string(),
            PacerError::config("athletes.bad.FTP", "missing required field"),
        );
        let s = spec(vec![set(Hyperparams::default(), None)]);
        let runs = plan_runs(&s, &inputs).unwrap();
        // bad, elite, runner x 2 workouts
        assert_eq!(runs.len(), 6);
        assert_eq!(runs[0].athlete, "bad");
        assert!(inputs.rejection(&runs[0]).is_some());
        assert!(inputs.rejection(&runs[2]).is_none());
    }

    #[test]
    fn unknown_filter_label_rejected() {
        let mut s = spec(vec![set(Hyperparams::default(), None)]);
        s.workout_filter = Some(vec!["tempo".into()]);
        assert!(plan_runs(&s, &inputs()).unwrap_err().is_configuration());
    }

    #[test]
    fn restriction_matching_nobody_is_an_error() {
        let s = spec(vec![set(Hyperparams::default(), Some(vec!["amateur"]))]);
        assert!(plan_runs(&s, &inputs()).is_err());
    }
}

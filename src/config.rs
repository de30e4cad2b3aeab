// src/config.rs
//
// Training configuration.
//
// - Hyperparams: one immutable learning configuration (alpha, gamma, epsilon schedule)
// - HyperparamSet: Hyperparams plus an optional athlete restriction, as listed in a sweep
// - SweepSpec: YAML description of a full training sweep
// - Worker-count resolution: CLI > SMARTPACER_THREADS > spec > available parallelism

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PacerError, Result};

/// Environment variable overriding the sweep worker count.
pub const THREADS_ENV_VAR: &str = "SMARTPACER_THREADS";

/// Episodes per run when a sweep does not say otherwise.
pub const DEFAULT_EPISODES: u32 = 2000;

/// Tabular Q-learning hyperparameters.
///
/// Immutable for the life of a run; only the learner's working epsilon evolves.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hyperparams {
    /// Learning rate in (0, 1].
    pub alpha: f64,
    /// Discount factor in [0, 1].
    pub gamma: f64,
    pub initial_epsilon: f64,
    /// Exploration floor; must not exceed `initial_epsilon`.
    pub min_epsilon: f64,
    /// Per-episode multiplicative decay in (0, 1].
    pub decay_rate: f64,
}

impl Default for Hyperparams {
    fn default() -> Self {
        Self {
            alpha: 0.1,
            gamma: 0.95,
            initial_epsilon: 0.2,
            min_epsilon: 0.01,
            decay_rate: 0.99,
        }
    }
}

impl Hyperparams {
    pub fn validate(&self) -> Result<()> {
        let in_range = |field: &str, v: f64, lo: f64, hi: f64, lo_open: bool| {
            let ok = v.is_finite() && v <= hi && if lo_open { v > lo } else { v >= lo };
            if ok {
                Ok(())
            } else {
                let lb = if lo_open { "(" } else { "[" };
                Err(PacerError::config(
                    field,
                    format!("must be in {lb}{lo}, {hi}], got {v}"),
                ))
            }
        };
        in_range("alpha", self.alpha, 0.0, 1.0, true)?;
        in_range("gamma", self.gamma, 0.0, 1.0, false)?;
        in_range("initial_epsilon", self.initial_epsilon, 0.0, 1.0, false)?;
        in_range("min_epsilon", self.min_epsilon, 0.0, 1.0, false)?;
        in_range("decay_rate", self.decay_rate, 0.0, 1.0, true)?;
        if self.min_epsilon > self.initial_epsilon {
            return Err(PacerError::config(
                "min_epsilon",
                format!(
                    "must not exceed initial_epsilon ({} > {})",
                    self.min_epsilon, self.initial_epsilon
                ),
            ));
        }
        Ok(())
    }

    /// Run-label suffix, e.g. `a10_g95_e20_m10_d990`. Every field appears, so
    /// two sets differing in any one of them get different labels.
    pub fn label_suffix(&self) -> String {
        let pct = |v: f64| (v * 100.0).round() as i64;
        let permille = |v: f64| (v * 1000.0).round() as i64;
        format!(
            "a{:02}_g{:02}_e{:02}_m{:02}_d{:03}",
            pct(self.alpha),
            pct(self.gamma),
            pct(self.initial_epsilon),
            permille(self.min_epsilon),
            permille(self.decay_rate)
        )
    }
}

/// One entry of a sweep's hyperparameter list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HyperparamSet {
    #[serde(flatten)]
    pub params: Hyperparams,
    /// Only pair this set with these athlete labels (all athletes when absent).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub athletes: Option<Vec<String>>,
}

impl HyperparamSet {
    pub fn applies_to(&self, athlete: &str) -> bool {
        self.athletes
            .as_ref()
            .map_or(true, |only| only.iter().any(|a| a == athlete))
    }
}

fn default_episodes() -> u32 {
    DEFAULT_EPISODES
}

fn default_out_dir() -> PathBuf {
    PathBuf::from("runs")
}

/// Training sweep description (YAML).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepSpec {
    pub sweep_id: String,
    /// Athletes JSON file.
    pub athletes: PathBuf,
    /// Workouts JSON file.
    pub workouts: PathBuf,
    /// Optional terrain JSON file shared by every run.
    #[serde(default)]
    pub terrain: Option<PathBuf>,
    /// Athlete labels to train (all when absent).
    #[serde(default)]
    pub athlete_filter: Option<Vec<String>>,
    /// Workout labels to train (all when absent).
    #[serde(default)]
    pub workout_filter: Option<Vec<String>>,
    pub hyperparams: Vec<HyperparamSet>,
    #[serde(default = "default_episodes")]
    pub episodes: u32,
    /// Worker threads; 0 means available parallelism.
    #[serde(default)]
    pub threads: usize,
    #[serde(default)]
    pub base_seed: u64,
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,
}

impl SweepSpec {
    /// Load a sweep from a YAML file. Relative paths inside the file are
    /// resolved against its directory.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| PacerError::io(path, e))?;
        let spec = Self::from_yaml_str(&contents)?;
        let base = path.parent().unwrap_or(Path::new("."));
        Ok(spec.with_base_dir(base))
    }

    /// Parse a sweep from a YAML string.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let spec: SweepSpec =
            serde_yaml::from_str(yaml).map_err(|e| PacerError::config("sweep", e.to_string()))?;
        spec.validate()?;
        Ok(spec)
    }

    /// Prefix every relative path with `base`.
    pub fn with_base_dir(mut self, base: &Path) -> Self {
        let join = |p: &PathBuf| {
            if p.is_relative() {
                base.join(p)
            } else {
                p.clone()
            }
        };
        self.athletes = join(&self.athletes);
        self.workouts = join(&self.workouts);
        self.terrain = self.terrain.as_ref().map(join);
        self.out_dir = join(&self.out_dir);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.sweep_id.trim().is_empty() {
            return Err(PacerError::config("sweep_id", "sweep_id cannot be empty"));
        }
        if self.episodes == 0 {
            return Err(PacerError::config("episodes", "episodes must be >= 1"));
        }
        if self.hyperparams.is_empty() {
            return Err(PacerError::config(
                "hyperparams",
                "hyperparams list cannot be empty",
            ));
        }
        for (i, set) in self.hyperparams.iter().enumerate() {
            set.params.validate().map_err(|e| match e {
                PacerError::Configuration { field, message } => {
                    PacerError::config(format!("hyperparams[{i}].{field}"), message)
                }
                other => other,
            })?;
            if matches!(&set.athletes, Some(a) if a.is_empty()) {
                return Err(PacerError::config(
                    format!("hyperparams[{i}].athletes"),
                    "athlete restriction cannot be empty",
                ));
            }
        }
        for (field, filter) in [
            ("athlete_filter", &self.athlete_filter),
            ("workout_filter", &self.workout_filter),
        ] {
            if matches!(filter, Some(f) if f.is_empty()) {
                return Err(PacerError::config(field, "filter cannot be empty"));
            }
        }
        Ok(())
    }
}

/// Where the effective worker count came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadsSource {
    Cli,
    Env,
    Spec,
    Default,
}

impl ThreadsSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreadsSource::Cli => "cli",
            ThreadsSource::Env => "env",
            ThreadsSource::Spec => "spec",
            ThreadsSource::Default => "default",
        }
    }
}

/// Resolved worker count with its source for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveThreads {
    pub threads: usize,
    pub source: ThreadsSource,
}

impl EffectiveThreads {
    pub fn log_startup(&self) {
        tracing::info!(
            effective_threads = self.threads,
            source = self.source.as_str(),
            "resolved sweep worker count"
        );
    }
}

fn available_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Resolve the worker count with precedence CLI > env > spec > available.
///
/// Zero at any level means "not set". An unparseable env value is ignored
/// with a warning.
pub fn resolve_threads(cli: Option<usize>, env_value: Option<&str>, spec: usize) -> EffectiveThreads {
    if let Some(n) = cli.filter(|n| *n > 0) {
        return EffectiveThreads {
            threads: n,
            source: ThreadsSource::Cli,
        };
    }
    if let Some(raw) = env_value.map(str::trim).filter(|s| !s.is_empty()) {
        match raw.parse::<usize>() {
            Ok(n) if n > 0 => {
                return EffectiveThreads {
                    threads: n,
                    source: ThreadsSource::Env,
                }
            }
            Ok(_) => {}
            Err(_) => tracing::warn!(value = raw, "invalid {THREADS_ENV_VAR}; ignoring"),
        }
    }
    if spec > 0 {
        return EffectiveThreads {
            threads: spec,
            source: ThreadsSource::Spec,
        };
    }
    EffectiveThreads {
        threads: available_threads(),
        source: ThreadsSource::Default,
    }
}

/// `resolve_threads` reading the env override from the process environment.
pub fn resolve_effective_threads(cli: Option<usize>, spec: usize) -> EffectiveThreads {
    let env_value = std::env::var(THREADS_ENV_VAR).ok();
    resolve_threads(cli, env_value.as_deref(), spec)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SWEEP: &str = r#"
sweep_id: runners_v1
athletes: data/athletes.json
workouts: data/workouts.json
terrain: data/terrain/acquedotti.json
workout_filter: [fartlek, endurance]
hyperparams:
  - { alpha: 0.1, gamma: 0.95, initial_epsilon: 0.2, min_epsilon: 0.01, decay_rate: 0.99, athletes: [runner] }
  - { alpha: 0.05, gamma: 0.9, initial_epsilon: 0.1, min_epsilon: 0.01, decay_rate: 0.98 }
episodes: 50
base_seed: 7
"#;

    #[test]
    fn parse_sweep_with_defaults() {
        let spec = SweepSpec::from_yaml_str(SWEEP).unwrap();
        assert_eq!(spec.sweep_id, "runners_v1");
        assert_eq!(spec.episodes, 50);
        assert_eq!(spec.threads, 0);
        assert_eq!(spec.out_dir, PathBuf::from("runs"));
        assert!(spec.hyperparams[0].applies_to("runner"));
        assert!(!spec.hyperparams[0].applies_to("elite"));
        assert!(spec.hyperparams[1].applies_to("elite"));
    }

    #[test]
    fn relative_paths_follow_spec_location() {
        let spec = SweepSpec::from_yaml_str(SWEEP)
            .unwrap()
            .with_base_dir(Path::new("/srv/pacer"));
        assert_eq!(spec.athletes, PathBuf::from("/srv/pacer/data/athletes.json"));
        assert_eq!(spec.out_dir, PathBuf::from("/srv/pacer/runs"));
    }

    #[test]
    fn invalid_hyperparams_name_the_field() {
        let yaml = SWEEP.replace("min_epsilon: 0.01, decay_rate: 0.98", "min_epsilon: 0.5, decay_rate: 0.98");
        let err = SweepSpec::from_yaml_str(&yaml).unwrap_err();
        assert!(err.to_string().contains("hyperparams[1].min_epsilon"));

        let yaml = SWEEP.replace("episodes: 50", "episodes: 0");
        assert!(SweepSpec::from_yaml_str(&yaml).is_err());
    }

    #[test]
    fn label_suffix_format() {
        assert_eq!(Hyperparams::default().label_suffix(), "a10_g95_e20_m10_d990");
        let p = Hyperparams {
            alpha: 0.05,
            gamma: 0.97,
            initial_epsilon: 0.05,
            min_epsilon: 0.01,
            decay_rate: 0.985,
        };
        assert_eq!(p.label_suffix(), "a05_g97_e05_m10_d985");

        let floor = Hyperparams {
            min_epsilon: 0.05,
            ..Hyperparams::default()
        };
        assert_eq!(floor.label_suffix(), "a10_g95_e20_m50_d990");
        assert_ne!(floor.label_suffix(), Hyperparams::default().label_suffix());
    }

    #[test]
    fn thread_precedence() {
        assert_eq!(resolve_threads(Some(3), Some("8"), 2).source, ThreadsSource::Cli);
        let env = resolve_threads(None, Some("8"), 2);
        assert_eq!((env.threads, env.source), (8, ThreadsSource::Env));
        let bad_env = resolve_threads(None, Some("many"), 2);
        assert_eq!((bad_env.threads, bad_env.source), (2, ThreadsSource::Spec));
        let default = resolve_threads(Some(0), None, 0);
        assert_eq!(default.source, ThreadsSource::Default);
        assert!(default.threads >= 1);
    }
}

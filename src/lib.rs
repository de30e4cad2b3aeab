//! SmartPacer core library.
//!
//! A per-second simulation of a runner's physiological response to pacing
//! decisions during a structured workout, plus a tabular Q-learning trainer
//! and a parallel sweep orchestrator. The binary (`src/main.rs`) is a thin
//! harness around these components.

pub mod athlete;
pub mod config;
pub mod error;
pub mod io;
pub mod logging;
pub mod physiology;
pub mod plan;
pub mod rl;
pub mod sweep;
pub mod terrain;
pub mod types;

// --- Re-exports for ergonomic external use ---------------------------------

pub use athlete::{
    load_athlete_records, load_athletes, nearest_profile_label, parse_athlete_records,
    parse_athletes_json, AthleteLevel, AthleteProfile,
};

pub use config::{resolve_effective_threads, HyperparamSet, Hyperparams, SweepSpec};

pub use error::{PacerError, Result};

pub use logging::{EventSink, FileSink, NoopSink, SessionRecord, VecSink};

pub use plan::{
    load_workout_records, load_workouts, parse_workout_records, parse_workouts_json, ExpandedPlan,
    PlanTarget, Segment, SubSegment, WorkoutPlan,
};

pub use rl::{
    EpisodeState, GreedyPolicy, LookupMissPolicy, PacingEnv, PacingEnvConfig, QLearner,
    RewardComponents, RewardWeights, StateKey, StepResult, ValueTable,
};

pub use sweep::{run_sweep, RunStatus, RunSummary, SweepInputs, SweepSummary};

pub use terrain::TerrainSequence;

pub use types::{zone_of, Action, FatigueLevel, Phase, SlopeLevel, WorkoutType, Zone};

// src/rl/mod.rs
//
// Pacing environment and tabular learning.
//
// Key components:
// - EpisodeState / StateKey: full simulation state and its discretized projection
// - RewardComponents / RewardWeights: shaped reward breakdown
// - PacingEnv: Gym-style environment (reset, step)
// - ValueTable: dense action-value store with tuple-text persistence
// - QLearner / GreedyPolicy: epsilon-greedy training and greedy lookup
// - train: one complete, cancellable training run
// - play_greedy / play_script: session playback into an EventSink

pub mod learner;
pub mod observation;
pub mod playback;
pub mod q_table;
pub mod reward;
pub mod runner;
pub mod sim_env;

// Re-exports for convenience
pub use learner::{GreedyPolicy, LookupMissPolicy, QLearner};
pub use observation::{EpisodeState, StateKey, STATE_SLOT_COUNT};
pub use playback::{demo_script, find_table, play_greedy, play_script, SessionSummary};
pub use q_table::{ActionValues, ValueTable};
pub use reward::{RewardComponents, RewardWeights};
pub use runner::{train, RunConfig, RunOutcome, TerminationReason};
pub use sim_env::{PacingEnv, PacingEnvConfig, StepResult};

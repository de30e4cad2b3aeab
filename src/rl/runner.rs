// src/rl/runner.rs
//
// Episode loops.
//
// - run_training_episode: one epsilon-greedy episode with updates
// - run_greedy_episode:   one evaluation episode, no learning
// - train:                a complete training run (episodes + final greedy
//                         evaluation), cancellable between episodes
//
// A run is single-threaded and owns its environment, learner and RNG streams.
// Parallelism lives one level up, across runs (see `sweep`).

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::config::Hyperparams;
use crate::types::Action;

use super::learner::{GreedyPolicy, LookupMissPolicy, QLearner};
use super::q_table::ValueTable;
use super::sim_env::PacingEnv;

/// Salt for the learner's RNG stream, so it differs from the environment's.
const LEARNER_STREAM: u64 = 0x9E37_79B9_7F4A_7C15;
/// Salt for the evaluation episode's environment noise.
const EVAL_STREAM: u64 = 0xD1B5_4A32_D192_ED03;

/// How a training run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// All requested episodes ran.
    Completed,
    /// The cancel flag was observed between episodes.
    Cancelled,
}

/// Parameters of one training run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub label: String,
    pub episodes: u32,
    pub params: Hyperparams,
    /// Root of every RNG stream used by the run.
    pub seed: u64,
    /// Miss policy of the final greedy evaluation.
    pub eval_on_miss: LookupMissPolicy,
}

/// Everything a training run produces.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub label: String,
    /// Total reward of each completed episode, in order.
    pub episode_rewards: Vec<f64>,
    pub table: ValueTable,
    pub final_epsilon: f64,
    /// Total reward of the greedy evaluation episode; None when cancelled.
    pub eval_reward: Option<f64>,
    pub termination: TerminationReason,
}

impl RunOutcome {
    pub fn episodes_completed(&self) -> usize {
        self.episode_rewards.len()
    }

    /// Mean over the last `n` episodes (fewer if the run is shorter).
    pub fn trailing_mean(&self, n: usize) -> Option<f64> {
        let len = self.episode_rewards.len();
        if len == 0 || n == 0 {
            return None;
        }
        let tail = &self.episode_rewards[len.saturating_sub(n)..];
        Some(tail.iter().sum::<f64>() / tail.len() as f64)
    }
}

/// One epsilon-greedy training episode. Returns the episode's total reward.
pub fn run_training_episode(env: &mut PacingEnv, learner: &mut QLearner) -> f64 {
    let mut key = env.reset().key();
    let mut total = 0.0;
    loop {
        let action = learner.select_action(&key);
        let step = env.step(action);
        let next_key = step.state.key();
        learner.update(&key, action, step.reward, &next_key);
        total += step.reward;
        key = next_key;
        if step.done {
            return total;
        }
    }
}

/// One greedy episode with no learning. Returns the episode's total reward.
pub fn run_greedy_episode(env: &mut PacingEnv, mut choose: impl FnMut(&PacingEnv) -> Action) -> f64 {
    env.reset();
    let mut total = 0.0;
    loop {
        let action = choose(&*env);
        let step = env.step(action);
        total += step.reward;
        if step.done {
            return total;
        }
    }
}

/// Run a full training loop, then a greedy evaluation episode.
///
/// `cancel` is checked before every episode; a cancelled run returns what it
/// has with `TerminationReason::Cancelled` and skips evaluation.
pub fn train(env: &mut PacingEnv, cfg: &RunConfig, cancel: &AtomicBool) -> RunOutcome {
    let mut learner = QLearner::new(cfg.params, cfg.seed ^ LEARNER_STREAM);
    env.reset_with_seed(cfg.seed);

    let mut rewards = Vec::with_capacity(cfg.episodes as usize);
    let mut termination = TerminationReason::Completed;

    for episode in 0..cfg.episodes {
        if cancel.load(Ordering::Relaxed) {
            tracing::warn!(label = %cfg.label, episode, "run cancelled");
            termination = TerminationReason::Cancelled;
            break;
        }
        let total = run_training_episode(env, &mut learner);
        rewards.push(total);
        learner.decay_epsilon();

        if (episode + 1) % 500 == 0 {
            tracing::debug!(
                label = %cfg.label,
                episode = episode + 1,
                epsilon = learner.epsilon(),
                reward = total,
                "training progress"
            );
        }
    }

    let final_epsilon = learner.epsilon();
    let table = learner.into_table();

    let eval_reward = match termination {
        TerminationReason::Completed => {
            env.reset_with_seed(cfg.seed ^ EVAL_STREAM);
            let mut policy = GreedyPolicy::new(table.clone(), cfg.eval_on_miss, cfg.seed ^ EVAL_STREAM);
            Some(run_greedy_episode(env, |e| policy.act(&e.state().key())))
        }
        TerminationReason::Cancelled => None,
    };

    RunOutcome {
        label: cfg.label.clone(),
        episode_rewards: rewards,
        table,
        final_epsilon,
        eval_reward,
        termination,
    }
}

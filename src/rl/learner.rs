// src/rl/learner.rs
//
// Tabular Q-learning.
//
// - QLearner: epsilon-greedy selection, one-step update, per-episode decay
// - GreedyPolicy: read-only greedy action lookup over a trained table
// - LookupMissPolicy: what a greedy lookup does for a key it has never seen
//
// Greedy ties go to the first action in `Action::ALL` order.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::config::Hyperparams;
use crate::types::Action;

use super::observation::StateKey;
use super::q_table::{ActionValues, ValueTable};

/// Fallback for a greedy lookup of an unseen state key. Not an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LookupMissPolicy {
    /// Hold the current pace.
    #[default]
    KeepGoing,
    /// Pick a uniformly random action.
    Explore,
}

impl LookupMissPolicy {
    pub fn parse(s: &str) -> Option<LookupMissPolicy> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keep-going" | "keep going" | "keep_going" => Some(LookupMissPolicy::KeepGoing),
            "explore" => Some(LookupMissPolicy::Explore),
            _ => None,
        }
    }
}

/// Index of the largest value; first index wins ties.
pub fn argmax(values: &ActionValues) -> Action {
    let mut best = 0;
    for i in 1..values.len() {
        if values[i] > values[best] {
            best = i;
        }
    }
    Action::ALL[best]
}

pub fn max_value(values: &ActionValues) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

fn random_action(rng: &mut ChaCha8Rng) -> Action {
    Action::ALL[rng.gen_range(0..Action::COUNT)]
}

/// Epsilon-greedy tabular learner owning its table and RNG stream.
pub struct QLearner {
    params: Hyperparams,
    epsilon: f64,
    table: ValueTable,
    rng: ChaCha8Rng,
}

impl QLearner {
    pub fn new(params: Hyperparams, seed: u64) -> Self {
        Self::with_table(ValueTable::new(), params, seed)
    }

    /// Continue learning from an existing table.
    pub fn with_table(table: ValueTable, params: Hyperparams, seed: u64) -> Self {
        Self {
            epsilon: params.initial_epsilon,
            params,
            table,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Training-time selection. Marks `key` visited.
    pub fn select_action(&mut self, key: &StateKey) -> Action {
        self.table.ensure(key);
        if self.rng.gen::<f64>() < self.epsilon {
            return random_action(&mut self.rng);
        }
        match self.table.get(key) {
            Some(values) => argmax(values),
            None => Action::ALL[0],
        }
    }

    /// Q(s,a) += alpha * (r + gamma * max_a' Q(s',a') - Q(s,a)).
    pub fn update(&mut self, key: &StateKey, action: Action, reward: f64, next_key: &StateKey) {
        let best_next = max_value(self.table.entry(next_key));
        let alpha = self.params.alpha;
        let target = reward + self.params.gamma * best_next;
        let q = &mut self.table.entry(key)[action.index()];
        *q += alpha * (target - *q);
    }

    /// Called once after each full episode. Never increases epsilon.
    pub fn decay_epsilon(&mut self) {
        self.epsilon = (self.epsilon * self.params.decay_rate).max(self.params.min_epsilon);
    }

    /// Greedy action without touching the table.
    pub fn greedy_action(&mut self, key: &StateKey, on_miss: LookupMissPolicy) -> Action {
        greedy_lookup(&self.table, key, on_miss, &mut self.rng).0
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn params(&self) -> &Hyperparams {
        &self.params
    }

    pub fn table(&self) -> &ValueTable {
        &self.table
    }

    pub fn into_table(self) -> ValueTable {
        self.table
    }
}

/// Returns the action and whether the key was missing.
fn greedy_lookup(
    table: &ValueTable,
    key: &StateKey,
    on_miss: LookupMissPolicy,
    rng: &mut ChaCha8Rng,
) -> (Action, bool) {
    match table.get(key) {
        Some(values) => (argmax(values), false),
        None => {
            let action = match on_miss {
                LookupMissPolicy::KeepGoing => Action::KeepGoing,
                LookupMissPolicy::Explore => random_action(rng),
            };
            (action, true)
        }
    }
}

/// Read-only greedy policy over a trained table.
pub struct GreedyPolicy {
    table: ValueTable,
    on_miss: LookupMissPolicy,
    rng: ChaCha8Rng,
    misses: u64,
}

impl GreedyPolicy {
    pub fn new(table: ValueTable, on_miss: LookupMissPolicy, seed: u64) -> Self {
        Self {
            table,
            on_miss,
            rng: ChaCha8Rng::seed_from_u64(seed),
            misses: 0,
        }
    }

    pub fn act(&mut self, key: &StateKey) -> Action {
        let (action, missed) = greedy_lookup(&self.table, key, self.on_miss, &mut self.rng);
        if missed {
            self.misses += 1;
            tracing::debug!(key = %key, fallback = %action, "state lookup miss");
        }
        action
    }

    /// Lookups that fell back to the miss policy so far.
    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn table(&self) -> &ValueTable {
        &self.table
    }
}

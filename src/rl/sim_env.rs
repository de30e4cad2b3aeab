// src/rl/sim_env.rs
//
// Gym-style pacing environment.
//
// - PacingEnv: one athlete running one workout plan over an optional terrain
// - reset() -> EpisodeState, step(action) -> StepResult
// - Deterministic given the seed; PacingEnvConfig::deterministic() removes
//   both noise terms entirely.
//
// One step is one simulated second:
//   power zone -> HR tracking -> dwell counter -> fatigue -> advance second
//   -> reward -> termination.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::athlete::{AthleteLevel, AthleteProfile};
use crate::error::{PacerError, Result};
use crate::physiology::{
    self, efficiency_factor, fatigue_level, hr_zone_of, next_high_zone_streak, next_hr_value,
    next_power_zone, FatigueInput, FATIGUE_NOISE,
};
use crate::plan::{ExpandedPlan, PlanTarget, WorkoutPlan};
use crate::terrain::TerrainSequence;
use crate::types::{Action, FatigueLevel, WorkoutType, Zone};

use super::observation::EpisodeState;
use super::reward::{self, RewardComponents, RewardWeights, REWARD_NOISE};

/// Result of a single environment step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// State after the action (owned copy).
    pub state: EpisodeState,
    pub reward: f64,
    pub done: bool,
    pub components: RewardComponents,
}

/// Configuration for the pacing environment.
#[derive(Debug, Clone)]
pub struct PacingEnvConfig {
    pub reward_weights: RewardWeights,
    /// Add uniform noise to each fatigue gain.
    pub fatigue_noise: bool,
    /// Add uniform noise to each reward.
    pub reward_noise: bool,
    /// Seed of the noise stream.
    pub seed: u64,
}

impl Default for PacingEnvConfig {
    fn default() -> Self {
        Self {
            reward_weights: RewardWeights::default(),
            fatigue_noise: true,
            reward_noise: true,
            seed: 0,
        }
    }
}

impl PacingEnvConfig {
    /// No noise at all (for deterministic tests).
    pub fn deterministic() -> Self {
        Self {
            fatigue_noise: false,
            reward_noise: false,
            ..Self::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Pacing simulation environment.
///
/// Owns its episode state exclusively; callers only ever receive copies.
pub struct PacingEnv {
    athlete: AthleteProfile,
    level: AthleteLevel,
    ftp_per_kg: f64,
    efficiency: f64,
    plan_name: String,
    workout: WorkoutType,
    duration_seconds: u64,
    expanded: ExpandedPlan,
    terrain: TerrainSequence,
    config: PacingEnvConfig,
    rng: ChaCha8Rng,
    state: EpisodeState,
    /// Whether the previous state was inside the funnel band.
    in_band: bool,
    done: bool,
}

impl PacingEnv {
    /// Build an environment. Fails fast on an invalid profile, an invalid plan,
    /// or a plan that expands to zero seconds.
    pub fn new(
        athlete: AthleteProfile,
        plan: &WorkoutPlan,
        terrain: TerrainSequence,
        config: PacingEnvConfig,
    ) -> Result<Self> {
        athlete.validate()?;
        plan.validate()?;

        let expanded = plan.expand();
        let first = *expanded.first().ok_or_else(|| {
            PacerError::config(
                "segments",
                format!("workout '{}' expands to an empty plan", plan.name),
            )
        })?;

        let duration_seconds = plan.duration_seconds();
        if (expanded.len() as u64) < duration_seconds {
            tracing::warn!(
                workout = %plan.name,
                expanded = expanded.len(),
                duration_seconds,
                "plan shorter than workout duration; last target is held"
            );
        }

        let ftp_per_kg = athlete.ftp_per_kg();
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        let state = initial_state(&first, &terrain);

        let mut env = Self {
            level: athlete.level(),
            efficiency: efficiency_factor(ftp_per_kg),
            ftp_per_kg,
            athlete,
            plan_name: plan.name.clone(),
            workout: plan.workout_type(),
            duration_seconds,
            expanded,
            terrain,
            config,
            rng,
            state,
            in_band: false,
            done: false,
        };
        env.in_band = env.in_funnel_band(&env.state);
        Ok(env)
    }

    /// Start a new episode. Leaves the noise stream where it is, so
    /// consecutive episodes see different noise.
    pub fn reset(&mut self) -> EpisodeState {
        // `new` guarantees a non-empty expansion.
        let first = self.target_at(0);
        self.state = initial_state(&first, &self.terrain);
        self.in_band = self.in_funnel_band(&self.state);
        self.done = false;
        self.state.clone()
    }

    /// Reset and re-seed the noise stream.
    pub fn reset_with_seed(&mut self, seed: u64) -> EpisodeState {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
        self.reset()
    }

    /// Advance one simulated second.
    pub fn step(&mut self, action: Action) -> StepResult {
        let power_before = self.state.power_zone;

        let s = &mut self.state;
        s.power_zone = next_power_zone(power_before, action);
        s.hr_value = next_hr_value(s.hr_value, s.power_zone);
        s.hr_zone = hr_zone_of(s.hr_value);
        s.high_zone_streak = next_high_zone_streak(s.high_zone_streak, s.hr_zone);

        // Fatigue follows the phase of the second being run.
        let noise = if self.config.fatigue_noise && !s.phase_label.is_recovery() {
            self.rng.gen_range(-FATIGUE_NOISE..=FATIGUE_NOISE)
        } else {
            0.0
        };
        s.fatigue_score = physiology::update_fatigue(&FatigueInput {
            score: s.fatigue_score,
            hr_zone: s.hr_zone,
            power_zone: s.power_zone,
            phase: s.phase_label,
            action,
            high_zone_streak: s.high_zone_streak,
            level: self.level,
            ftp_per_kg: self.ftp_per_kg,
            workout: self.workout,
            noise,
        });
        s.fatigue_level = fatigue_level(s.fatigue_score, self.level);

        self.advance_second();

        let components = self.reward_components(action, power_before);
        let reward = components.compute_reward(&self.config.reward_weights);
        self.done = self.state.second >= self.duration_seconds;

        tracing::trace!(
            second = self.state.second,
            action = %action,
            hr = %self.state.hr_zone,
            power = %self.state.power_zone,
            fatigue = self.state.fatigue_score,
            reward,
            done = self.done,
            "step"
        );

        StepResult {
            state: self.state.clone(),
            reward,
            done: self.done,
            components,
        }
    }

    /// Step with a textual action label; unknown labels are rejected.
    pub fn step_named(&mut self, action: &str) -> Result<StepResult> {
        let action = Action::parse(action)?;
        Ok(self.step(action))
    }

    fn advance_second(&mut self) {
        let second = self.state.second + 1;
        let target = self.target_at(second);
        let s = &mut self.state;
        s.second = second;
        s.segment_index = second;
        s.phase_label = target.phase;
        s.target_hr_zone = target.target_hr_zone;
        s.target_power_zone = target.target_power_zone;
        s.slope_level = self.terrain.slope_at(second);
    }

    /// Target for `second`, holding the last entry past the end of the plan.
    fn target_at(&self, second: u64) -> PlanTarget {
        let slice = self.expanded.as_slice();
        let idx = usize::try_from(second)
            .unwrap_or(usize::MAX)
            .min(slice.len().saturating_sub(1));
        slice[idx]
    }

    fn in_funnel_band(&self, s: &EpisodeState) -> bool {
        let tol = reward::funnel_tolerance(s.second, self.duration_seconds);
        s.hr_zone.distance(s.target_hr_zone) <= tol
            && s.power_zone.distance(s.target_power_zone) <= tol
    }

    fn reward_components(&mut self, action: Action, power_before: Zone) -> RewardComponents {
        let s = &self.state;
        let in_band = self.in_funnel_band(s);
        let mut c = RewardComponents {
            hr_zone: reward::zone_tier_reward(s.hr_zone.distance(s.target_hr_zone)),
            power_zone: reward::zone_tier_reward(s.power_zone.distance(s.target_power_zone)),
            fatigue: reward::fatigue_penalty(s.fatigue_score, self.level.fatigue_thresholds()),
            coherence: reward::coherence_reward(s.hr_zone, s.power_zone, self.level),
            phase: reward::phase_reward(s.phase_label, action, power_before, s.target_power_zone),
            terrain: reward::terrain_reward(action, s.slope_level),
            capacity: reward::capacity_penalty(s.hr_zone, self.efficiency),
            funnel: reward::funnel_bonus(self.in_band, in_band),
            damping: reward::damping_factor(s.fatigue_score),
            noise: 0.0,
        };
        self.in_band = in_band;
        if self.config.reward_noise {
            c.noise = self.rng.gen_range(-REWARD_NOISE..=REWARD_NOISE);
        }
        c
    }

    pub fn state(&self) -> &EpisodeState {
        &self.state
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn athlete(&self) -> &AthleteProfile {
        &self.athlete
    }

    pub fn level(&self) -> AthleteLevel {
        self.level
    }

    pub fn plan_name(&self) -> &str {
        &self.plan_name
    }

    /// Episode length in seconds.
    pub fn duration_seconds(&self) -> u64 {
        self.duration_seconds
    }

    pub fn expanded_plan(&self) -> &ExpandedPlan {
        &self.expanded
    }

    pub fn config(&self) -> &PacingEnvConfig {
        &self.config
    }
}

fn initial_state(first: &PlanTarget, terrain: &TerrainSequence) -> EpisodeState {
    EpisodeState {
        second: 0,
        fatigue_score: 0.0,
        hr_value: physiology::HR_MIN,
        hr_zone: Zone::Z1,
        power_zone: Zone::Z1,
        fatigue_level: FatigueLevel::Low,
        segment_index: 0,
        phase_label: first.phase,
        target_hr_zone: first.target_hr_zone,
        target_power_zone: first.target_power_zone,
        slope_level: terrain.slope_at(0),
        high_zone_streak: 0,
    }
}

// src/rl/reward.rs
//
// Shaped per-second reward.
//
// r_t = ( w_hr   * tier(|HR - target_HR|)
//       + w_pow  * tier(|power - target_power|)
//       + w_fat  * fatigue_penalty(score)
//       + w_coh  * coherence(|HR - power|)
//       + w_ph   * phase_term(action, pre-action power)
//       + w_ter  * terrain_term(action, slope)
//       + w_cap  * capacity_penalty(HR)
//       + w_fun  * funnel_bonus )
//       * 1 / (1 + 0.1 * fatigue_score)
//       + noise
//
// Components are kept separately in RewardComponents so per-step telemetry
// can show where a reward came from.

use serde::{Deserialize, Serialize};

use crate::athlete::{AthleteLevel, FatigueThresholds};
use crate::types::{Action, Phase, SlopeLevel, Zone};

/// Half-width of the uniform noise added to the total reward.
pub const REWARD_NOISE: f64 = 0.05;
pub const CAPACITY_COEFF: f64 = 0.05;
pub const DAMPING_PER_FATIGUE: f64 = 0.1;
pub const FUNNEL_ENTRY_BONUS: f64 = 1.0;
pub const FUNNEL_STAY_BONUS: f64 = 0.2;

/// Zone-matching reward by absolute zone distance.
pub fn zone_tier_reward(distance: u8) -> f64 {
    match distance {
        0 => 2.0,
        1 => 0.5,
        2 => -1.0,
        3 => -2.5,
        _ => -4.0,
    }
}

/// Zero up to `low`, `-(score - low)` up to `medium`, `-2 * (score - medium)`
/// beyond. Not continuous at `medium`: the steep branch restarts from zero.
pub fn fatigue_penalty(score: f64, t: FatigueThresholds) -> f64 {
    if score <= t.low {
        0.0
    } else if score <= t.medium {
        -(score - t.low)
    } else {
        -2.0 * (score - t.medium)
    }
}

/// HR/power coherence: bonus while the zones diverge no more than the level expects.
pub fn coherence_reward(hr_zone: Zone, power_zone: Zone, level: AthleteLevel) -> f64 {
    let divergence = hr_zone.distance(power_zone) as f64;
    let expected = level.expected_divergence();
    if divergence <= expected {
        0.5
    } else {
        -0.5 * (divergence - expected)
    }
}

/// Phase-appropriate action shaping. `power_before` is the power zone the
/// action was taken from.
pub fn phase_reward(phase: Phase, action: Action, power_before: Zone, target_power: Zone) -> f64 {
    let below = power_before < target_power;
    match (phase, action) {
        (Phase::Recover | Phase::Cooldown, Action::SlowDown) => 0.5,
        (Phase::Recover | Phase::Cooldown, Action::Accelerate) => -1.0,
        (Phase::Cooldown, Action::KeepGoing) if power_before > target_power => -0.5,
        (Phase::Push, Action::Accelerate) if below => 0.5,
        (Phase::Push, Action::SlowDown) if below => -0.5,
        (Phase::Push | Phase::Warmup, Action::Accelerate) if !below => -0.5,
        _ => 0.0,
    }
}

/// Discourage accelerating uphill and braking downhill.
pub fn terrain_reward(action: Action, slope: SlopeLevel) -> f64 {
    match (action, slope) {
        (Action::Accelerate, SlopeLevel::Uphill) => -0.5,
        (Action::Accelerate, SlopeLevel::SteepUphill) => -1.0,
        (Action::SlowDown, SlopeLevel::Downhill) => -0.5,
        (Action::SlowDown, SlopeLevel::SteepDown) => -1.0,
        _ => 0.0,
    }
}

/// Grows with HR zone squared, attenuated by the efficiency factor.
pub fn capacity_penalty(hr_zone: Zone, efficiency: f64) -> f64 {
    let hr = hr_zone.level() as f64;
    -CAPACITY_COEFF * hr * hr / efficiency
}

/// Zone tolerance of the funnel band: ±1 before the midpoint, exact after.
pub fn funnel_tolerance(second: u64, duration_seconds: u64) -> u8 {
    if second.saturating_mul(2) < duration_seconds {
        1
    } else {
        0
    }
}

pub fn funnel_bonus(was_in_band: bool, in_band: bool) -> f64 {
    match (was_in_band, in_band) {
        (false, true) => FUNNEL_ENTRY_BONUS,
        (true, true) => FUNNEL_STAY_BONUS,
        _ => 0.0,
    }
}

/// Multiplier that shrinks the reward magnitude as fatigue rises.
pub fn damping_factor(fatigue_score: f64) -> f64 {
    1.0 / (1.0 + DAMPING_PER_FATIGUE * fatigue_score)
}

/// Weights for the weighted sum of reward components.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardWeights {
    pub hr_zone: f64,
    pub power_zone: f64,
    pub fatigue: f64,
    pub coherence: f64,
    pub phase: f64,
    pub terrain: f64,
    pub capacity: f64,
    pub funnel: f64,
}

impl Default for RewardWeights {
    fn default() -> Self {
        Self {
            hr_zone: 1.0,
            power_zone: 1.0,
            fatigue: 1.0,
            coherence: 0.5,
            phase: 1.0,
            terrain: 1.0,
            capacity: 1.0,
            funnel: 1.0,
        }
    }
}

/// Reward breakdown for a single step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RewardComponents {
    pub hr_zone: f64,
    pub power_zone: f64,
    pub fatigue: f64,
    pub coherence: f64,
    pub phase: f64,
    pub terrain: f64,
    pub capacity: f64,
    pub funnel: f64,
    pub damping: f64,
    pub noise: f64,
}

impl RewardComponents {
    /// Weighted sum before damping and noise.
    pub fn shaped(&self, w: &RewardWeights) -> f64 {
        w.hr_zone * self.hr_zone
            + w.power_zone * self.power_zone
            + w.fatigue * self.fatigue
            + w.coherence * self.coherence
            + w.phase * self.phase
            + w.terrain * self.terrain
            + w.capacity * self.capacity
            + w.funnel * self.funnel
    }

    /// Scalar reward.
    pub fn compute_reward(&self, weights: &RewardWeights) -> f64 {
        self.shaped(weights) * self.damping + self.noise
    }
}

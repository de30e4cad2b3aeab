// src/physiology.rs
//
// Zone and fatigue model.
//
// Pure functions mapping pacing decisions to power zone, heart-rate tracking
// value, high-zone dwell, and the bounded 0..10 fatigue score. Nothing here
// holds state or draws random numbers: the per-call noise sample is an input,
// so callers control the only stochastic term.

use crate::athlete::AthleteLevel;
use crate::types::{Action, FatigueLevel, Phase, WorkoutType, Zone};

/// First-order smoothing factor of HR toward the power zone.
pub const HR_SMOOTHING: f64 = 0.2;
pub const HR_MIN: f64 = 1.0;
pub const HR_MAX: f64 = 5.0;

pub const FATIGUE_MIN: f64 = 0.0;
pub const FATIGUE_MAX: f64 = 10.0;

/// Half-width of the uniform noise added to each fatigue gain.
pub const FATIGUE_NOISE: f64 = 0.02;

pub const PUSH_PHASE_MULT: f64 = 1.2;
/// Gain removed when slowing down from HR zone 1 or 2.
pub const LOW_ZONE_SLOWDOWN_RELIEF: f64 = 0.1;
/// Dwell counter saturates here (seconds).
pub const HIGH_ZONE_STREAK_CAP: u32 = 30;
pub const STREAK_ESCALATION_PER_SECOND: f64 = 0.02;
/// Extra multiplier when HR and power are both in Z4 or above.
pub const DUAL_HIGH_ZONE_MULT: f64 = 1.25;
/// FTP/kg that maps to an efficiency factor of 1.0.
pub const REFERENCE_FTP_PER_KG: f64 = 3.5;

pub const SIGMOID_RELIEF: f64 = 0.05;
pub const SIGMOID_CENTER: f64 = 5.0;

/// Power zone after an action: ±1, clamped to Z1..Z5.
pub fn next_power_zone(current: Zone, action: Action) -> Zone {
    let level = current.level() as i32;
    match action {
        Action::Accelerate => Zone::clamped(level + 1),
        Action::SlowDown => Zone::clamped(level - 1),
        Action::KeepGoing => current,
    }
}

/// HR tracking value after one second of pursuing the power zone.
pub fn next_hr_value(hr_value: f64, power_zone: Zone) -> f64 {
    let target = power_zone.level() as f64;
    (hr_value + HR_SMOOTHING * (target - hr_value)).clamp(HR_MIN, HR_MAX)
}

/// Discrete HR zone of a tracking value (rounded).
pub fn hr_zone_of(hr_value: f64) -> Zone {
    Zone::clamped(hr_value.round() as i32)
}

/// Consecutive seconds spent with HR in Z4 or above, saturating.
pub fn next_high_zone_streak(streak: u32, hr_zone: Zone) -> u32 {
    if hr_zone.level() >= 4 {
        (streak + 1).min(HIGH_ZONE_STREAK_CAP)
    } else {
        0
    }
}

/// Base fatigue gain per second, keyed by HR zone.
pub fn base_fatigue_gain(hr_zone: Zone) -> f64 {
    match hr_zone {
        Zone::Z1 => 0.01,
        Zone::Z2 => 0.05,
        Zone::Z3 => 0.12,
        Zone::Z4 => 0.3,
        Zone::Z5 => 0.5,
    }
}

/// FTP/kg relative to the reference, clamped to [0.5, 1.5]. Divides fatigue
/// gain and the capacity penalty.
pub fn efficiency_factor(ftp_per_kg: f64) -> f64 {
    (ftp_per_kg / REFERENCE_FTP_PER_KG).clamp(0.5, 1.5)
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Everything the fatigue update reads.
#[derive(Debug, Clone, Copy)]
pub struct FatigueInput {
    pub score: f64,
    pub hr_zone: Zone,
    pub power_zone: Zone,
    pub phase: Phase,
    pub action: Action,
    /// Dwell counter already updated for this second.
    pub high_zone_streak: u32,
    pub level: AthleteLevel,
    pub ftp_per_kg: f64,
    pub workout: WorkoutType,
    /// Sample in [-FATIGUE_NOISE, FATIGUE_NOISE]; 0.0 for deterministic runs.
    pub noise: f64,
}

/// Fatigue gain for one second of a warmup / push phase (may be negative).
pub fn fatigue_gain(input: &FatigueInput) -> f64 {
    let mut gain = base_fatigue_gain(input.hr_zone);

    if input.phase == Phase::Push {
        gain *= PUSH_PHASE_MULT;
    }
    if input.hr_zone.level() <= 2 && input.action == Action::SlowDown {
        gain -= LOW_ZONE_SLOWDOWN_RELIEF;
    }

    let streak = input.high_zone_streak.min(HIGH_ZONE_STREAK_CAP) as f64;
    gain *= 1.0 + STREAK_ESCALATION_PER_SECOND * streak;

    if input.hr_zone.level() >= 4 && input.power_zone.level() >= 4 {
        gain *= DUAL_HIGH_ZONE_MULT;
    }

    gain /= efficiency_factor(input.ftp_per_kg);
    gain *= input.workout.fatigue_modifier();
    gain += input.noise;
    gain * input.level.fitness_factor()
}

/// Recovery step for recover / cooldown phases.
///
/// Exponential decay toward the level floor plus a sigmoid relief centred at
/// a score of 5. Never pushes the score below the floor, and never raises a
/// score that is already below it.
pub fn recover_fatigue(score: f64, level: AthleteLevel) -> f64 {
    let floor = level.recovery_floor();
    if score <= floor {
        return score.clamp(FATIGUE_MIN, FATIGUE_MAX);
    }
    let decayed = floor + (score - floor) * (1.0 - level.recovery_rate());
    let relief = SIGMOID_RELIEF * sigmoid(score - SIGMOID_CENTER);
    (decayed - relief).max(floor).clamp(FATIGUE_MIN, FATIGUE_MAX)
}

/// Fatigue score after one second, clamped to [0, 10].
pub fn update_fatigue(input: &FatigueInput) -> f64 {
    if input.phase.is_recovery() {
        recover_fatigue(input.score, input.level)
    } else {
        (input.score + fatigue_gain(input)).clamp(FATIGUE_MIN, FATIGUE_MAX)
    }
}

/// Discretize a fatigue score with the athlete level's thresholds.
pub fn fatigue_level(score: f64, level: AthleteLevel) -> FatigueLevel {
    let t = level.fatigue_thresholds();
    if score <= t.low {
        FatigueLevel::Low
    } else if score <= t.medium {
        FatigueLevel::Medium
    } else {
        FatigueLevel::High
    }
}

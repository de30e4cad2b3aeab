// src/types.rs
//
// Shared discrete labels for the pacing simulator: zones, actions, phases,
// slopes and fatigue levels. All of them are closed enumerations with a stable
// textual label (used in input files, value-table keys and telemetry).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::PacerError;

/// Ordinal intensity bucket Z1..Z5 (heart rate or power).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Zone {
    Z1,
    Z2,
    Z3,
    Z4,
    Z5,
}

impl Zone {
    pub const ALL: [Zone; 5] = [Zone::Z1, Zone::Z2, Zone::Z3, Zone::Z4, Zone::Z5];

    /// Numeric level in 1..=5.
    pub fn level(self) -> u8 {
        self as u8 + 1
    }

    /// Zero-based index, used by the dense value-table encoding.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Zone for a numeric level; None outside 1..=5.
    pub fn from_level(level: u8) -> Option<Zone> {
        match level {
            1..=5 => Some(Zone::ALL[(level - 1) as usize]),
            _ => None,
        }
    }

    /// Zone for an arbitrary level, clamped into 1..=5.
    pub fn clamped(level: i32) -> Zone {
        Zone::ALL[(level.clamp(1, 5) - 1) as usize]
    }

    /// Absolute distance in zones.
    pub fn distance(self, other: Zone) -> u8 {
        (self.level() as i16 - other.level() as i16).unsigned_abs() as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Zone::Z1 => "Z1",
            Zone::Z2 => "Z2",
            Zone::Z3 => "Z3",
            Zone::Z4 => "Z4",
            Zone::Z5 => "Z5",
        }
    }

    /// Parse a "Z1".."Z5" label (case-insensitive).
    pub fn parse(s: &str) -> Option<Zone> {
        match s.trim().to_ascii_uppercase().as_str() {
            "Z1" => Some(Zone::Z1),
            "Z2" => Some(Zone::Z2),
            "Z3" => Some(Zone::Z3),
            "Z4" => Some(Zone::Z4),
            "Z5" => Some(Zone::Z5),
            _ => None,
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a zone label to its level (Z1..Z5 ↔ 1..5).
pub fn zone_of(label: &str) -> Result<u8, PacerError> {
    Zone::parse(label)
        .map(Zone::level)
        .ok_or_else(|| PacerError::config("zone", format!("unknown zone label '{label}'")))
}

/// Pacing decision taken once per simulated second.
///
/// Declaration order is the tie-break order for greedy selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    #[serde(rename = "slow down")]
    SlowDown,
    #[serde(rename = "keep going")]
    KeepGoing,
    #[serde(rename = "accelerate")]
    Accelerate,
}

impl Action {
    pub const ALL: [Action; 3] = [Action::SlowDown, Action::KeepGoing, Action::Accelerate];
    pub const COUNT: usize = 3;

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Action> {
        Action::ALL.get(index).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Action::SlowDown => "slow down",
            Action::KeepGoing => "keep going",
            Action::Accelerate => "accelerate",
        }
    }

    /// Parse an action label. Unknown labels are rejected, never defaulted.
    pub fn parse(s: &str) -> Result<Action, PacerError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "slow down" | "slow_down" => Ok(Action::SlowDown),
            "keep going" | "keep_going" => Ok(Action::KeepGoing),
            "accelerate" => Ok(Action::Accelerate),
            _ => Err(PacerError::InvalidAction(s.to_string())),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Workout segment role; governs fatigue dynamics and reward shaping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Warmup,
    Push,
    Recover,
    Cooldown,
}

impl Phase {
    pub const ALL: [Phase; 4] = [Phase::Warmup, Phase::Push, Phase::Recover, Phase::Cooldown];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Warmup => "warmup",
            Phase::Push => "push",
            Phase::Recover => "recover",
            Phase::Cooldown => "cooldown",
        }
    }

    pub fn parse(s: &str) -> Option<Phase> {
        match s.trim().to_ascii_lowercase().as_str() {
            "warmup" => Some(Phase::Warmup),
            "push" => Some(Phase::Push),
            "recover" => Some(Phase::Recover),
            "cooldown" => Some(Phase::Cooldown),
            _ => None,
        }
    }

    /// Recover and cooldown phases decay fatigue instead of accumulating it.
    pub fn is_recovery(self) -> bool {
        matches!(self, Phase::Recover | Phase::Cooldown)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terrain slope class for one second of the course.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlopeLevel {
    #[default]
    Flat,
    Uphill,
    SteepUphill,
    Downhill,
    SteepDown,
}

impl SlopeLevel {
    pub const ALL: [SlopeLevel; 5] = [
        SlopeLevel::Flat,
        SlopeLevel::Uphill,
        SlopeLevel::SteepUphill,
        SlopeLevel::Downhill,
        SlopeLevel::SteepDown,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SlopeLevel::Flat => "flat",
            SlopeLevel::Uphill => "uphill",
            SlopeLevel::SteepUphill => "steep_uphill",
            SlopeLevel::Downhill => "downhill",
            SlopeLevel::SteepDown => "steep_down",
        }
    }

    pub fn parse(s: &str) -> Option<SlopeLevel> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flat" => Some(SlopeLevel::Flat),
            "uphill" => Some(SlopeLevel::Uphill),
            "steep_uphill" => Some(SlopeLevel::SteepUphill),
            "downhill" => Some(SlopeLevel::Downhill),
            "steep_down" => Some(SlopeLevel::SteepDown),
            _ => None,
        }
    }
}

impl fmt::Display for SlopeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discretized fatigue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FatigueLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl FatigueLevel {
    pub const ALL: [FatigueLevel; 3] = [FatigueLevel::Low, FatigueLevel::Medium, FatigueLevel::High];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FatigueLevel::Low => "low",
            FatigueLevel::Medium => "medium",
            FatigueLevel::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<FatigueLevel> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Some(FatigueLevel::Low),
            "medium" => Some(FatigueLevel::Medium),
            "high" => Some(FatigueLevel::High),
            _ => None,
        }
    }
}

impl fmt::Display for FatigueLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Workout family, derived from the plan name. Drives the fatigue modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkoutType {
    Fartlek,
    Interval,
    Progressions,
    Endurance,
    Recovery,
    Other,
}

impl WorkoutType {
    /// Classify a plan name (case-insensitive). Unknown names map to `Other`.
    pub fn from_name(name: &str) -> WorkoutType {
        match name.trim().to_ascii_lowercase().as_str() {
            "fartlek" => WorkoutType::Fartlek,
            "interval" | "intervals" => WorkoutType::Interval,
            "progressions" | "progression" => WorkoutType::Progressions,
            "endurance" => WorkoutType::Endurance,
            "recovery" => WorkoutType::Recovery,
            _ => WorkoutType::Other,
        }
    }

    /// Fatigue gain multiplier: fartlek > interval > progressions > endurance > recovery.
    pub fn fatigue_modifier(self) -> f64 {
        match self {
            WorkoutType::Fartlek => 1.1,
            WorkoutType::Interval => 1.0,
            WorkoutType::Progressions => 0.9,
            WorkoutType::Endurance => 0.8,
            WorkoutType::Recovery => 0.7,
            WorkoutType::Other => 1.0,
        }
    }
}

// src/rl/observation.rs
//
// Episode state and its discretized projection.
//
// EpisodeState is the full per-episode record owned by the environment and
// handed out by value on every step. StateKey is the 7-tuple the learner sees;
// everything else (second, continuous fatigue score, HR tracking value, dwell
// counter) is dropped at this boundary.
//
// StateKey has two encodings:
// - dense index in 0..STATE_SLOT_COUNT, for the value-table arena;
// - legacy tuple text `('Z1', 'Z2', 'low', 'push', 'Z3', 'Z3', 'flat')`, for
//   persisted tables.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PacerError;
use crate::types::{FatigueLevel, Phase, SlopeLevel, Zone};

/// Full environment state for one episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeState {
    /// Elapsed simulated seconds.
    pub second: u64,
    /// Continuous fatigue score in [0, 10].
    pub fatigue_score: f64,
    /// Continuous HR tracking value in [1, 5].
    pub hr_value: f64,
    #[serde(rename = "HR_zone")]
    pub hr_zone: Zone,
    pub power_zone: Zone,
    pub fatigue_level: FatigueLevel,
    /// Index into the expanded plan; equals `second` and keeps growing past its end.
    pub segment_index: u64,
    pub phase_label: Phase,
    pub target_hr_zone: Zone,
    pub target_power_zone: Zone,
    pub slope_level: SlopeLevel,
    /// Consecutive seconds with HR in Z4 or above.
    pub high_zone_streak: u32,
}

impl EpisodeState {
    pub fn key(&self) -> StateKey {
        StateKey {
            hr_zone: self.hr_zone,
            power_zone: self.power_zone,
            fatigue_level: self.fatigue_level,
            phase: self.phase_label,
            target_hr_zone: self.target_hr_zone,
            target_power_zone: self.target_power_zone,
            slope: self.slope_level,
        }
    }
}

const ZONES: usize = 5;
const FATIGUE_LEVELS: usize = 3;
const PHASES: usize = 4;
const SLOPES: usize = 5;

/// Number of distinct state keys.
pub const STATE_SLOT_COUNT: usize =
    ZONES * ZONES * FATIGUE_LEVELS * PHASES * ZONES * ZONES * SLOPES;

/// Discretized state used to index the value table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateKey {
    pub hr_zone: Zone,
    pub power_zone: Zone,
    pub fatigue_level: FatigueLevel,
    pub phase: Phase,
    pub target_hr_zone: Zone,
    pub target_power_zone: Zone,
    pub slope: SlopeLevel,
}

impl StateKey {
    /// Mixed-radix index in `0..STATE_SLOT_COUNT`.
    pub fn encode(&self) -> usize {
        let mut i = self.hr_zone.index();
        i = i * ZONES + self.power_zone.index();
        i = i * FATIGUE_LEVELS + self.fatigue_level.index();
        i = i * PHASES + self.phase.index();
        i = i * ZONES + self.target_hr_zone.index();
        i = i * ZONES + self.target_power_zone.index();
        i * SLOPES + self.slope.index()
    }

    /// Inverse of [`encode`](Self::encode); None when out of range.
    pub fn decode(index: usize) -> Option<StateKey> {
        if index >= STATE_SLOT_COUNT {
            return None;
        }
        let mut rest = index;
        let mut take = |radix: usize| {
            let digit = rest % radix;
            rest /= radix;
            digit
        };
        let slope = SlopeLevel::ALL[take(SLOPES)];
        let target_power_zone = Zone::ALL[take(ZONES)];
        let target_hr_zone = Zone::ALL[take(ZONES)];
        let phase = Phase::ALL[take(PHASES)];
        let fatigue_level = FatigueLevel::ALL[take(FATIGUE_LEVELS)];
        let power_zone = Zone::ALL[take(ZONES)];
        let hr_zone = Zone::ALL[take(ZONES)];
        Some(StateKey {
            hr_zone,
            power_zone,
            fatigue_level,
            phase,
            target_hr_zone,
            target_power_zone,
            slope,
        })
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "('{}', '{}', '{}', '{}', '{}', '{}', '{}')",
            self.hr_zone,
            self.power_zone,
            self.fatigue_level,
            self.phase,
            self.target_hr_zone,
            self.target_power_zone,
            self.slope
        )
    }
}

fn key_error(text: &str, message: impl Into<String>) -> PacerError {
    PacerError::persistence(format!("state key {text}"), message)
}

/// Strip one pair of matching single or double quotes.
fn unquote(field: &str) -> Option<&str> {
    let f = field.trim();
    let inner = f
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .or_else(|| f.strip_prefix('"').and_then(|s| s.strip_suffix('"')))?;
    if inner.contains(['\'', '"']) {
        return None;
    }
    Some(inner)
}

impl FromStr for StateKey {
    type Err = PacerError;

    /// Strict parser for tuple text. Exactly seven quoted labels, each from
    /// its closed enumeration; anything else is rejected.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let body = text
            .trim()
            .strip_prefix('(')
            .and_then(|s| s.strip_suffix(')'))
            .ok_or_else(|| key_error(text, "expected a parenthesised tuple"))?;

        let fields: Vec<&str> = body.split(',').collect();
        if fields.len() != 7 {
            return Err(key_error(
                text,
                format!("expected 7 fields, found {}", fields.len()),
            ));
        }
        let mut labels = Vec::with_capacity(7);
        for (i, field) in fields.iter().enumerate() {
            let label = unquote(field)
                .ok_or_else(|| key_error(text, format!("field {i} is not a quoted label")))?;
            labels.push(label);
        }

        let zone = |i: usize| {
            Zone::parse(labels[i])
                .ok_or_else(|| key_error(text, format!("unknown zone '{}'", labels[i])))
        };
        Ok(StateKey {
            hr_zone: zone(0)?,
            power_zone: zone(1)?,
            fatigue_level: FatigueLevel::parse(labels[2])
                .ok_or_else(|| key_error(text, format!("unknown fatigue level '{}'", labels[2])))?,
            phase: Phase::parse(labels[3])
                .ok_or_else(|| key_error(text, format!("unknown phase '{}'", labels[3])))?,
            target_hr_zone: zone(4)?,
            target_power_zone: zone(5)?,
            slope: SlopeLevel::parse(labels[6])
                .ok_or_else(|| key_error(text, format!("unknown slope '{}'", labels[6])))?,
        })
    }
}

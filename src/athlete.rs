// src/athlete.rs
//
// Athlete profiles and the athlete-level classification.
//
// The level (elite / runner / amateur) is derived from FTP per kilogram and
// drives every athlete-specific constant of the physiology and reward models:
// fitness factor, fatigue thresholds, expected HR/power divergence, recovery
// floor and recovery rate.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PacerError, Result};

/// FTP/kg at or above which an athlete is classified elite.
pub const ELITE_FTP_PER_KG: f64 = 4.0;
/// FTP/kg at or above which an athlete is classified runner.
pub const RUNNER_FTP_PER_KG: f64 = 3.0;

/// Coarse athlete classification derived from FTP per kilogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AthleteLevel {
    Elite,
    Runner,
    Amateur,
}

/// Fatigue-score breakpoints (0..10 scale) for one athlete level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FatigueThresholds {
    pub low: f64,
    pub medium: f64,
}

impl AthleteLevel {
    /// Classify from FTP per kilogram.
    pub fn from_ftp_per_kg(ftp_per_kg: f64) -> AthleteLevel {
        if ftp_per_kg >= ELITE_FTP_PER_KG {
            AthleteLevel::Elite
        } else if ftp_per_kg >= RUNNER_FTP_PER_KG {
            AthleteLevel::Runner
        } else {
            AthleteLevel::Amateur
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AthleteLevel::Elite => "elite",
            AthleteLevel::Runner => "runner",
            AthleteLevel::Amateur => "amateur",
        }
    }

    /// Multiplier applied to every fatigue gain.
    pub fn fitness_factor(&self) -> f64 {
        match self {
            AthleteLevel::Elite => 0.8,
            AthleteLevel::Runner => 1.0,
            AthleteLevel::Amateur => 1.2,
        }
    }

    /// Low / medium breakpoints shared by fatigue discretization and the fatigue penalty.
    pub fn fatigue_thresholds(&self) -> FatigueThresholds {
        match self {
            AthleteLevel::Elite => FatigueThresholds {
                low: 5.0,
                medium: 7.0,
            },
            AthleteLevel::Runner => FatigueThresholds {
                low: 4.0,
                medium: 6.0,
            },
            AthleteLevel::Amateur => FatigueThresholds {
                low: 3.0,
                medium: 5.0,
            },
        }
    }

    /// Tolerated |HR zone - power zone| before the coherence term turns negative.
    pub fn expected_divergence(&self) -> f64 {
        match self {
            AthleteLevel::Elite => 0.5,
            AthleteLevel::Runner => 1.0,
            AthleteLevel::Amateur => 1.5,
        }
    }

    /// Fatigue never decays below this score during recover / cooldown.
    pub fn recovery_floor(&self) -> f64 {
        match self {
            AthleteLevel::Elite => 0.5,
            AthleteLevel::Runner => 0.8,
            AthleteLevel::Amateur => 1.0,
        }
    }

    /// Per-second exponential decay rate toward the recovery floor.
    pub fn recovery_rate(&self) -> f64 {
        match self {
            AthleteLevel::Elite => 0.030,
            AthleteLevel::Runner => 0.020,
            AthleteLevel::Amateur => 0.015,
        }
    }
}

/// Immutable athlete record used read-only by the environment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AthleteProfile {
    #[serde(rename = "HR_rest")]
    pub hr_rest: f64,
    #[serde(rename = "HR_max")]
    pub hr_max: f64,
    #[serde(rename = "FTP")]
    pub ftp: f64,
    pub weight_kg: f64,
}

/// Wire form with every field optional, so a missing field produces a
/// configuration error naming it instead of a generic parse failure.
#[derive(Debug, Deserialize)]
struct RawAthleteProfile {
    #[serde(rename = "HR_rest")]
    hr_rest: Option<f64>,
    #[serde(rename = "HR_max")]
    hr_max: Option<f64>,
    #[serde(rename = "FTP")]
    ftp: Option<f64>,
    weight_kg: Option<f64>,
}

impl AthleteProfile {
    /// Build a validated profile.
    pub fn new(hr_rest: f64, hr_max: f64, ftp: f64, weight_kg: f64) -> Result<Self> {
        let profile = Self {
            hr_rest,
            hr_max,
            ftp,
            weight_kg,
        };
        profile.validate()?;
        Ok(profile)
    }

    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("HR_rest", self.hr_rest),
            ("HR_max", self.hr_max),
            ("FTP", self.ftp),
            ("weight_kg", self.weight_kg),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value <= 0.0 {
                return Err(PacerError::config(
                    name,
                    format!("must be a positive number, got {value}"),
                ));
            }
        }
        if self.hr_max <= self.hr_rest {
            return Err(PacerError::config(
                "HR_max",
                format!(
                    "must be greater than HR_rest ({} <= {})",
                    self.hr_max, self.hr_rest
                ),
            ));
        }
        Ok(())
    }

    /// Functional threshold power per kilogram of body mass.
    pub fn ftp_per_kg(&self) -> f64 {
        self.ftp / self.weight_kg
    }

    pub fn level(&self) -> AthleteLevel {
        AthleteLevel::from_ftp_per_kg(self.ftp_per_kg())
    }

    pub fn fitness_factor(&self) -> f64 {
        self.level().fitness_factor()
    }

    /// Parse one profile from a JSON value (as found in an athletes file).
    pub fn from_json_value(label: &str, value: serde_json::Value) -> Result<Self> {
        let raw: RawAthleteProfile = serde_json::from_value(value).map_err(|e| {
            PacerError::config(format!("athletes.{label}"), e.to_string())
        })?;
        let require = |field: &str, v: Option<f64>| {
            v.ok_or_else(|| {
                PacerError::config(
                    format!("athletes.{label}.{field}"),
                    "missing required field",
                )
            })
        };
        let profile = Self {
            hr_rest: require("HR_rest", raw.hr_rest)?,
            hr_max: require("HR_max", raw.hr_max)?,
            ftp: require("FTP", raw.ftp)?,
            weight_kg: require("weight_kg", raw.weight_kg)?,
        };
        profile.validate().map_err(|e| match e {
            PacerError::Configuration { field, message } => {
                PacerError::config(format!("athletes.{label}.{field}"), message)
            }
            other => other,
        })?;
        Ok(profile)
    }
}

/// Parse an athletes file record by record. The outer error covers a file
/// that is not a JSON object; each label carries its own profile result.
pub fn parse_athlete_records(json: &str) -> Result<BTreeMap<String, Result<AthleteProfile>>> {
    let raw: BTreeMap<String, serde_json::Value> =
        serde_json::from_str(json).map_err(|e| PacerError::config("athletes", e.to_string()))?;
    Ok(raw
        .into_iter()
        .map(|(label, value)| {
            let profile = AthleteProfile::from_json_value(&label, value);
            (label, profile)
        })
        .collect())
}

/// Parse an athletes file: a JSON object mapping label -> profile. Any
/// invalid record fails the whole file.
pub fn parse_athletes_json(json: &str) -> Result<BTreeMap<String, AthleteProfile>> {
    parse_athlete_records(json)?
        .into_iter()
        .map(|(label, profile)| Ok((label, profile?)))
        .collect()
}

/// Load an athletes file from disk, record by record.
pub fn load_athlete_records<P: AsRef<Path>>(
    path: P,
) -> Result<BTreeMap<String, Result<AthleteProfile>>> {
    let contents =
        fs::read_to_string(path.as_ref()).map_err(|e| PacerError::io(path.as_ref(), e))?;
    parse_athlete_records(&contents)
}

/// Load an athletes file from disk.
pub fn load_athletes<P: AsRef<Path>>(path: P) -> Result<BTreeMap<String, AthleteProfile>> {
    let contents =
        fs::read_to_string(path.as_ref()).map_err(|e| PacerError::io(path.as_ref(), e))?;
    parse_athletes_json(&contents)
}

/// Label of the base profile closest to `athlete` (Euclidean distance over the
/// four numeric fields). Used to pick which trained table to play back for an
/// athlete that has no table of their own. None when `base` is empty.
pub fn nearest_profile_label<'a>(
    athlete: &AthleteProfile,
    base: &'a BTreeMap<String, AthleteProfile>,
) -> Option<&'a str> {
    let distance = |p: &AthleteProfile| {
        ((athlete.hr_rest - p.hr_rest).powi(2)
            + (athlete.hr_max - p.hr_max).powi(2)
            + (athlete.ftp - p.ftp).powi(2)
            + (athlete.weight_kg - p.weight_kg).powi(2))
        .sqrt()
    };
    base.iter()
        .min_by(|(_, a), (_, b)| {
            distance(a)
                .partial_cmp(&distance(b))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|(label, _)| label.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner() -> AthleteProfile {
        AthleteProfile::new(50.0, 180.0, 280.0, 72.0).unwrap()
    }

    #[test]
    fn level_is_pure_function_of_ftp_per_kg() {
        let a = runner();
        // 280 / 72 = 3.89 W/kg
        assert_eq!(a.level(), AthleteLevel::Runner);
        for _ in 0..10 {
            assert_eq!(a.level(), AthleteLevel::Runner);
        }
        let elite = AthleteProfile::new(42.0, 190.0, 300.0, 70.0).unwrap();
        assert_eq!(elite.level(), AthleteLevel::Elite);
        let amateur = AthleteProfile::new(65.0, 175.0, 200.0, 80.0).unwrap();
        assert_eq!(amateur.level(), AthleteLevel::Amateur);
    }

    #[test]
    fn classification_boundaries_are_inclusive() {
        assert_eq!(AthleteLevel::from_ftp_per_kg(4.0), AthleteLevel::Elite);
        assert_eq!(AthleteLevel::from_ftp_per_kg(3.0), AthleteLevel::Runner);
        assert_eq!(AthleteLevel::from_ftp_per_kg(2.99), AthleteLevel::Amateur);
    }

    #[test]
    fn elite_tolerates_more_fatigue() {
        let e = AthleteLevel::Elite.fatigue_thresholds();
        let r = AthleteLevel::Runner.fatigue_thresholds();
        let a = AthleteLevel::Amateur.fatigue_thresholds();
        assert!(e.low > r.low && r.low > a.low);
        assert!(e.medium > r.medium && r.medium > a.medium);
    }

    #[test]
    fn missing_field_is_configuration_error() {
        let json = r#"{"runner": {"HR_rest": 50, "HR_max": 180, "weight_kg": 72}}"#;
        let err = parse_athletes_json(json).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("athletes.runner.FTP"));
    }

    #[test]
    fn records_keep_valid_profiles_next_to_invalid_ones() {
        let json = r#"{
            "bad": {"HR_rest": 50, "HR_max": 180, "weight_kg": 72},
            "runner": {"HR_rest": 50, "HR_max": 180, "FTP": 280, "weight_kg": 72}
        }"#;
        let records = parse_athlete_records(json).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records["runner"].as_ref().unwrap(), &runner());
        let err = records["bad"].as_ref().unwrap_err();
        assert!(err.to_string().contains("athletes.bad.FTP"));

        assert!(parse_athlete_records("[1, 2]").is_err());
    }

    #[test]
    fn legacy_fitness_factor_field_is_ignored() {
        let json = r#"{"runner": {"HR_rest": 50, "HR_max": 180, "FTP": 280, "weight_kg": 72, "fitness_factor": 0.97}}"#;
        let athletes = parse_athletes_json(json).unwrap();
        assert_eq!(athletes["runner"], runner());
    }

    #[test]
    fn invalid_heart_rates_rejected() {
        assert!(AthleteProfile::new(180.0, 170.0, 250.0, 70.0).is_err());
        assert!(AthleteProfile::new(50.0, 180.0, 250.0, 0.0).is_err());
    }

    #[test]
    fn nearest_profile_picks_closest_base() {
        let mut base = BTreeMap::new();
        base.insert("elite".to_string(), AthleteProfile::new(42.0, 190.0, 320.0, 68.0).unwrap());
        base.insert("runner".to_string(), runner());
        base.insert("amateur".to_string(), AthleteProfile::new(65.0, 175.0, 190.0, 82.0).unwrap());

        let me = AthleteProfile::new(52.0, 182.0, 275.0, 70.0).unwrap();
        assert_eq!(nearest_profile_label(&me, &base), Some("runner"));
        assert_eq!(nearest_profile_label(&me, &BTreeMap::new()), None);
    }
}

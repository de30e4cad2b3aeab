// src/plan.rs
//
// Workout plans and their per-second expansion.
//
// A plan is a named, ordered list of segments. Each segment either carries a
// flat duration or a list of sub-segments, and may be repeated. Expansion
// flattens all of this into one target record per simulated second; index `i`
// of the expanded plan is the authoritative target for second `i`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PacerError, Result};
use crate::types::{Phase, WorkoutType, Zone};

/// Whole seconds in `minutes`, rounded to the nearest second so that values
/// like 0.1 min map to exactly 6 s.
pub fn seconds_of(minutes: f64) -> u64 {
    (minutes * 60.0).round().max(0.0) as u64
}

fn default_repeat() -> u32 {
    1
}

/// One entry of a segment's sub-segment list. Phase and targets fall back to
/// the parent segment's when omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubSegment {
    pub duration_min: f64,
    #[serde(default)]
    pub phase: Option<Phase>,
    #[serde(default)]
    pub target_hr_zone: Option<Zone>,
    #[serde(default)]
    pub target_power_zone: Option<Zone>,
}

/// One workout segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Flat duration; required unless `sub_segments` is present, ignored otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_min: Option<f64>,
    pub phase: Phase,
    pub target_hr_zone: Zone,
    pub target_power_zone: Zone,
    #[serde(default = "default_repeat")]
    pub repeat: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_segments: Option<Vec<SubSegment>>,
}

impl Segment {
    pub fn new(duration_min: f64, phase: Phase, target_hr_zone: Zone, target_power_zone: Zone) -> Self {
        Self {
            duration_min: Some(duration_min),
            phase,
            target_hr_zone,
            target_power_zone,
            repeat: 1,
            sub_segments: None,
        }
    }

    pub fn with_repeat(mut self, repeat: u32) -> Self {
        self.repeat = repeat;
        self
    }

    pub fn with_sub_segments(mut self, subs: Vec<SubSegment>) -> Self {
        self.sub_segments = Some(subs);
        self
    }

    fn target(&self) -> PlanTarget {
        PlanTarget {
            phase: self.phase,
            target_hr_zone: self.target_hr_zone,
            target_power_zone: self.target_power_zone,
        }
    }

    fn sub_target(&self, sub: &SubSegment) -> PlanTarget {
        PlanTarget {
            phase: sub.phase.unwrap_or(self.phase),
            target_hr_zone: sub.target_hr_zone.unwrap_or(self.target_hr_zone),
            target_power_zone: sub.target_power_zone.unwrap_or(self.target_power_zone),
        }
    }
}

/// A named workout: total duration in minutes plus ordered segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutPlan {
    pub name: String,
    /// Total duration in minutes; the episode ends at `duration * 60` seconds.
    pub duration: f64,
    pub segments: Vec<Segment>,
}

impl WorkoutPlan {
    pub fn new(name: impl Into<String>, duration: f64, segments: Vec<Segment>) -> Self {
        Self {
            name: name.into(),
            duration,
            segments,
        }
    }

    /// Episode length in seconds.
    pub fn duration_seconds(&self) -> u64 {
        seconds_of(self.duration)
    }

    pub fn workout_type(&self) -> WorkoutType {
        WorkoutType::from_name(&self.name)
    }

    /// Structural validation. An empty segment list is accepted here and
    /// rejected by the environment, which owns the "non-empty expansion" rule.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(PacerError::config("name", "workout name cannot be empty"));
        }
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return Err(PacerError::config(
                "duration",
                format!("must be > 0 minutes, got {}", self.duration),
            ));
        }
        for (i, seg) in self.segments.iter().enumerate() {
            if seg.repeat == 0 {
                return Err(PacerError::config(
                    format!("segments[{i}].repeat"),
                    "repeat must be >= 1",
                ));
            }
            match &seg.sub_segments {
                Some(subs) => {
                    for (j, sub) in subs.iter().enumerate() {
                        if !sub.duration_min.is_finite() || sub.duration_min < 0.0 {
                            return Err(PacerError::config(
                                format!("segments[{i}].sub_segments[{j}].duration_min"),
                                "must be a non-negative number",
                            ));
                        }
                    }
                }
                None => match seg.duration_min {
                    None => {
                        return Err(PacerError::config(
                            format!("segments[{i}].duration_min"),
                            "missing required field (segment has no sub_segments)",
                        ));
                    }
                    Some(d) if !d.is_finite() || d < 0.0 => {
                        return Err(PacerError::config(
                            format!("segments[{i}].duration_min"),
                            "must be a non-negative number",
                        ));
                    }
                    Some(_) => {}
                },
            }
        }
        Ok(())
    }

    pub fn expand(&self) -> ExpandedPlan {
        expand_segments(&self.segments)
    }
}

/// Target record for one simulated second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanTarget {
    pub phase: Phase,
    pub target_hr_zone: Zone,
    pub target_power_zone: Zone,
}

/// Flat per-second target sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpandedPlan {
    targets: Vec<PlanTarget>,
}

impl ExpandedPlan {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn get(&self, second: usize) -> Option<&PlanTarget> {
        self.targets.get(second)
    }

    pub fn first(&self) -> Option<&PlanTarget> {
        self.targets.first()
    }

    pub fn as_slice(&self) -> &[PlanTarget] {
        &self.targets
    }
}

/// Expand segments to second granularity.
///
/// With sub-segments: the sub-segment list repeated `repeat` times, each
/// sub-segment contributing `duration_min * 60` entries. Without: the segment
/// itself, `duration_min * 60` entries, `repeat` times over.
pub fn expand_segments(segments: &[Segment]) -> ExpandedPlan {
    let mut targets = Vec::new();
    for seg in segments {
        match &seg.sub_segments {
            Some(subs) => {
                for _ in 0..seg.repeat {
                    for sub in subs {
                        let t = seg.sub_target(sub);
                        let n = seconds_of(sub.duration_min) as usize;
                        targets.extend(std::iter::repeat(t).take(n));
                    }
                }
            }
            None => {
                let t = seg.target();
                let n = seg.duration_min.map_or(0, seconds_of) as usize;
                for _ in 0..seg.repeat {
                    targets.extend(std::iter::repeat(t).take(n));
                }
            }
        }
    }
    ExpandedPlan { targets }
}

fn parse_plan(label: &str, value: serde_json::Value) -> Result<WorkoutPlan> {
    let plan: WorkoutPlan = serde_json::from_value(value)
        .map_err(|e| PacerError::config(format!("workouts.{label}"), e.to_string()))?;
    plan.validate().map_err(|e| match e {
        PacerError::Configuration { field, message } => {
            PacerError::config(format!("workouts.{label}.{field}"), message)
        }
        other => other,
    })?;
    Ok(plan)
}

/// Parse a workouts file record by record; each label carries its own result.
pub fn parse_workout_records(json: &str) -> Result<BTreeMap<String, Result<WorkoutPlan>>> {
    let raw: BTreeMap<String, serde_json::Value> =
        serde_json::from_str(json).map_err(|e| PacerError::config("workouts", e.to_string()))?;
    Ok(raw
        .into_iter()
        .map(|(label, value)| {
            let plan = parse_plan(&label, value);
            (label, plan)
        })
        .collect())
}

/// Parse a workouts file: a JSON object mapping label -> plan. Any invalid
/// record fails the whole file.
pub fn parse_workouts_json(json: &str) -> Result<BTreeMap<String, WorkoutPlan>> {
    parse_workout_records(json)?
        .into_iter()
        .map(|(label, plan)| Ok((label, plan?)))
        .collect()
}

pub fn load_workout_records<P: AsRef<Path>>(
    path: P,
) -> Result<BTreeMap<String, Result<WorkoutPlan>>> {
    let contents =
        fs::read_to_string(path.as_ref()).map_err(|e| PacerError::io(path.as_ref(), e))?;
    parse_workout_records(&contents)
}

/// Load a workouts file from disk.
pub fn load_workouts<P: AsRef<Path>>(path: P) -> Result<BTreeMap<String, WorkoutPlan>> {
    let contents =
        fs::read_to_string(path.as_ref()).map_err(|e| PacerError::io(path.as_ref(), e))?;
    parse_workouts_json(&contents)
}

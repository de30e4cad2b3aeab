// src/terrain.rs
//
// Optional per-second terrain slope sequence.
//
// The sequence is supplied externally (a list of track points exposing a
// `slope` field) and indexed by elapsed seconds. Seconds beyond the end of the
// sequence, or points without a slope, read as flat.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{PacerError, Result};
use crate::types::SlopeLevel;

/// Elevation change (m) between consecutive points above which a point is uphill.
pub const UPHILL_DELTA_M: f64 = 0.5;
/// Elevation change (m) above which a point is steep uphill.
pub const STEEP_DELTA_M: f64 = 2.0;

/// Classify an elevation delta between two consecutive track points.
pub fn slope_from_elevation_delta(delta_m: f64) -> SlopeLevel {
    if delta_m > STEEP_DELTA_M {
        SlopeLevel::SteepUphill
    } else if delta_m > UPHILL_DELTA_M {
        SlopeLevel::Uphill
    } else if delta_m < -STEEP_DELTA_M {
        SlopeLevel::SteepDown
    } else if delta_m < -UPHILL_DELTA_M {
        SlopeLevel::Downhill
    } else {
        SlopeLevel::Flat
    }
}

#[derive(Debug, Deserialize)]
struct TrackPoint {
    #[serde(default)]
    slope: Option<String>,
}

/// Read-only slope labels, one per elapsed second.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TerrainSequence {
    slopes: Vec<SlopeLevel>,
}

impl TerrainSequence {
    pub fn new(slopes: Vec<SlopeLevel>) -> Self {
        Self { slopes }
    }

    /// Flat course of unbounded length.
    pub fn flat() -> Self {
        Self::default()
    }

    /// Label an elevation profile sampled once per second. The first point is flat.
    pub fn from_elevations(elevations: &[f64]) -> Self {
        let mut slopes = Vec::with_capacity(elevations.len());
        if !elevations.is_empty() {
            slopes.push(SlopeLevel::Flat);
        }
        slopes.extend(
            elevations
                .windows(2)
                .map(|w| slope_from_elevation_delta(w[1] - w[0])),
        );
        Self { slopes }
    }

    /// Slope at `second`; flat past the end of the sequence.
    pub fn slope_at(&self, second: u64) -> SlopeLevel {
        usize::try_from(second)
            .ok()
            .and_then(|i| self.slopes.get(i))
            .copied()
            .unwrap_or(SlopeLevel::Flat)
    }

    pub fn len(&self) -> usize {
        self.slopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slopes.is_empty()
    }

    /// Parse a JSON list of track points. Points without a `slope` read as
    /// flat; an unknown slope label is a configuration error.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let points: Vec<TrackPoint> =
            serde_json::from_str(json).map_err(|e| PacerError::config("terrain", e.to_string()))?;
        let slopes = points
            .into_iter()
            .enumerate()
            .map(|(i, p)| match p.slope {
                None => Ok(SlopeLevel::Flat),
                Some(label) => SlopeLevel::parse(&label).ok_or_else(|| {
                    PacerError::config(
                        format!("terrain[{i}].slope"),
                        format!("unknown slope label '{label}'"),
                    )
                }),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { slopes })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents =
            fs::read_to_string(path.as_ref()).map_err(|e| PacerError::io(path.as_ref(), e))?;
        Self::from_json_str(&contents)
    }
}

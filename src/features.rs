use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::categorize::{CategorizedDay, DayRecord};
use crate::errors::PipelineError;
use crate::frame::SensorId;

/// Number of ordinal categories, and therefore the fixed feature width the
/// downstream classifier expects.
pub const FEATURE_WIDTH: usize = 4;

/// The two independent feature spaces. A sensor's temperature profile and
/// radiation profile are never mixed; each feeds its own inference call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Temperature,
    Radiation,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Temperature => "temperature",
            Mode::Radiation => "radiation",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed-width per-sensor feature vector: mean device value per reference
/// category, with unobserved categories filled as 0. Created here, consumed
/// once by cluster inference, never mutated afterward.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector(pub [f64; FEATURE_WIDTH]);

impl FeatureVector {
    pub fn values(&self) -> &[f64] {
        &self.0
    }
}

/// Outcome of joining device daily values with categorized reference days:
/// the sensor-intrinsic 4-wide profile plus the month-aware reference
/// profile kept for diagnostics.
#[derive(Debug, Clone)]
pub struct FeatureProfile {
    pub features: FeatureVector,
    /// Mean reference value per (category, month) cell, up to 4x12 entries.
    pub reference_profile: BTreeMap<(u8, u32), f64>,
}

/// Join a device's daily-extracted values with the categorized reference
/// series on date and reduce to the fixed-width category profile.
///
/// The join is an outer join: days present in only one source keep a null on
/// the other side and are ignored by the averaging rather than dropped. If
/// no day carries both a device value and a reference category, the sensor
/// has nothing to cluster on and this fails with `InsufficientData`.
pub fn build_feature_profile(
    device_days: &[DayRecord],
    reference_days: &[CategorizedDay],
    sensor: &SensorId,
    mode: Mode,
) -> Result<FeatureProfile, PipelineError> {
    let mut joined: BTreeMap<chrono::NaiveDate, (Option<f64>, Option<u8>)> = BTreeMap::new();
    for day in device_days {
        joined.entry(day.date).or_default().0 = Some(day.value);
    }
    for day in reference_days {
        joined.entry(day.date).or_default().1 = Some(day.category);
    }

    let mut sums = [(0.0f64, 0usize); FEATURE_WIDTH];
    let mut matched = 0usize;
    for (value, category) in joined
        .values()
        .filter_map(|(v, c)| Some(((*v)?, (*c)?)))
    {
        let (sum, count) = &mut sums[(category as usize).min(FEATURE_WIDTH - 1)];
        *sum += value;
        *count += 1;
        matched += 1;
    }
    if matched == 0 {
        return Err(PipelineError::InsufficientData {
            sensor: sensor.full().to_string(),
            mode: mode.to_string(),
        });
    }

    let mut features = [0.0f64; FEATURE_WIDTH];
    for (slot, (sum, count)) in features.iter_mut().zip(sums) {
        if count > 0 {
            *slot = sum / count as f64;
        }
    }
    debug!(sensor = %sensor, %mode, days = matched, "built feature vector");

    Ok(FeatureProfile {
        features: FeatureVector(features),
        reference_profile: reference_profile(reference_days),
    })
}

/// Mean reference value per (category, month) group.
pub fn reference_profile(reference_days: &[CategorizedDay]) -> BTreeMap<(u8, u32), f64> {
    let mut sums: BTreeMap<(u8, u32), (f64, usize)> = BTreeMap::new();
    for day in reference_days {
        let entry = sums.entry((day.category, day.month)).or_default();
        entry.0 += day.value;
        entry.1 += 1;
    }
    sums.into_iter()
        .map(|(key, (sum, count))| (key, sum / count as f64))
        .collect()
}

/// Per-mode table of sensor rows, in the order the sensors were processed.
/// Sensor order is not semantically significant but stays deterministic so
/// runs are reproducible.
#[derive(Debug, Clone)]
pub struct FeatureTable {
    pub mode: Mode,
    pub rows: Vec<(SensorId, FeatureVector)>,
}

impl FeatureTable {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, sensor: SensorId, features: FeatureVector) {
        self.rows.push((sensor, features));
    }
}

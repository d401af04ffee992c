use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::categorize::{PeakWindow, ThresholdTable};
use crate::correct::CalibrationParams;

/// Deployment configuration for one pipeline run. Injected explicitly
/// instead of living in module-level globals; the defaults are the values
/// the pre-trained model was deployed with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Grid spacing for raw telemetry alignment, seconds.
    pub telemetry_resolution_secs: f64,
    /// Bucket width for corrected data, seconds.
    pub corrected_resolution_secs: f64,
    pub peak_window: PeakWindow,
    pub calibration: CalibrationParams,
    pub temperature_thresholds: ThresholdTable,
    pub radiation_thresholds: ThresholdTable,
}

/// Month-by-month temperature breakpoints (degrees C), January first.
const TEMPERATURE_THRESHOLDS: [[f64; 3]; 12] = [
    [-2.0, 0.0, 3.0],
    [-2.0, 1.0, 4.0],
    [1.0, 5.0, 9.0],
    [4.0, 9.0, 13.0],
    [9.0, 13.0, 17.0],
    [12.0, 16.0, 20.0],
    [14.0, 18.0, 22.0],
    [14.0, 18.0, 22.0],
    [10.0, 14.0, 17.0],
    [5.0, 9.0, 13.0],
    [0.0, 4.0, 7.0],
    [-1.0, 0.0, 3.0],
];

/// Month-by-month direct-normal-irradiance breakpoints (W/m2).
const RADIATION_THRESHOLDS: [[f64; 3]; 12] = [
    [0.0, 43.0, 191.0],
    [0.0, 77.0, 278.0],
    [0.0, 126.0, 364.0],
    [0.0, 166.0, 414.0],
    [0.0, 201.0, 412.0],
    [0.0, 220.0, 442.0],
    [0.0, 226.0, 456.0],
    [0.0, 195.0, 423.0],
    [0.0, 140.0, 358.0],
    [0.0, 87.0, 278.0],
    [0.0, 49.0, 210.0],
    [0.0, 34.0, 190.0],
];

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            telemetry_resolution_secs: 600.0,
            corrected_resolution_secs: 1800.0,
            peak_window: PeakWindow {
                start_hour: 11,
                end_hour: 16,
            },
            calibration: CalibrationParams {
                slope: 0.775,
                intercept: 2.748,
                clip_threshold: 5.0,
            },
            temperature_thresholds: ThresholdTable::new(TEMPERATURE_THRESHOLDS)
                .unwrap_or_else(|_| unreachable!("builtin thresholds are ascending")),
            radiation_thresholds: ThresholdTable::new(RADIATION_THRESHOLDS)
                .unwrap_or_else(|_| unreachable!("builtin thresholds are ascending")),
        }
    }
}

impl PipelineConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
    }
}

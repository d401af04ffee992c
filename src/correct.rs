use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::PipelineError;
use crate::frame::SensorFrame;
use crate::resample::Resolution;

/// Linear calibration for one physical quantity, plus the saturation cutoff
/// for the paired solar-voltage channel. Applied once per channel, never
/// mutated after construction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CalibrationParams {
    pub slope: f64,
    pub intercept: f64,
    pub clip_threshold: f64,
}

/// Temperature channels and their matching solar-voltage channels, discovered
/// by name. Fails with `Schema` when the pairing is incomplete.
pub fn channel_pairs(frame: &SensorFrame) -> Result<Vec<(String, String)>, PipelineError> {
    let temperature: Vec<String> = frame
        .column_names()
        .filter(|n| n.starts_with("temperature_boum"))
        .map(str::to_string)
        .collect();
    if temperature.is_empty() {
        return Err(PipelineError::Schema(
            "no temperature_boum channels in telemetry".to_string(),
        ));
    }
    let mut pairs = Vec::with_capacity(temperature.len());
    for temp in temperature {
        let voltage = temp.replace("temperature", "solarVoltage");
        if frame.column(&voltage).is_none() {
            return Err(PipelineError::Schema(format!(
                "channel '{temp}' has no matching '{voltage}' channel"
            )));
        }
        pairs.push((temp, voltage));
    }
    Ok(pairs)
}

/// Calibrate and de-noise raw telemetry, then downsample to bucket means.
///
/// Per channel pair: voltage readings above the clip threshold are discarded
/// (sensor saturation), temperature readings get the linear calibration,
/// and any cell whose rounded two-decimal first difference from the previous
/// sample is exactly zero is masked as missing (consecutive identical
/// readings are a stuck-sensor signature, not a true plateau). Finally the
/// series is reduced to means over fixed time buckets; buckets where every
/// selected column is missing are dropped instead of being kept as all-null
/// rows.
pub fn correct(
    frame: &SensorFrame,
    calibration: &CalibrationParams,
    bucket: Resolution,
) -> Result<SensorFrame, PipelineError> {
    let pairs = channel_pairs(frame)?;

    let mut cleaned = SensorFrame::new(frame.index().to_vec());
    for (temp_name, volt_name) in &pairs {
        let temp = frame.require_column(temp_name)?;
        let volt = frame.require_column(volt_name)?;

        let calibrated: Vec<Option<f64>> = temp
            .values
            .iter()
            .map(|v| v.map(|x| calibration.slope * x + calibration.intercept))
            .collect();
        let clipped: Vec<Option<f64>> = volt
            .values
            .iter()
            .map(|v| v.filter(|&x| x <= calibration.clip_threshold))
            .collect();

        cleaned.push_column(temp_name.clone(), mask_flatlines(&calibrated))?;
        cleaned.push_column(volt_name.clone(), mask_flatlines(&clipped))?;
    }

    let bucketed = bucket_means(&cleaned, bucket);
    debug!(
        rows_in = frame.height(),
        rows_out = bucketed.height(),
        "signal correction complete"
    );
    Ok(bucketed)
}

/// Mask cells whose rounded first difference from the previous sample is
/// exactly zero. Differences are taken against the raw previous value, so a
/// run of identical readings keeps only its first element.
pub fn mask_flatlines(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut out = values.to_vec();
    for i in 1..values.len() {
        if let (Some(prev), Some(cur)) = (values[i - 1], values[i]) {
            if ((cur - prev) * 100.0).round() == 0.0 {
                out[i] = None;
            }
        }
    }
    out
}

/// Mean per fixed time bucket (bucket start as the label), dropping buckets
/// where all columns are missing.
fn bucket_means(frame: &SensorFrame, bucket: Resolution) -> SensorFrame {
    let width = bucket.secs();
    let mut starts: Vec<f64> = Vec::new();
    let mut row_buckets: Vec<usize> = Vec::with_capacity(frame.height());
    for &t in frame.index() {
        let start = (t / width).floor() * width;
        match starts.last() {
            Some(&last) if last == start => {}
            _ => starts.push(start),
        }
        row_buckets.push(starts.len() - 1);
    }

    let names: Vec<String> = frame.column_names().map(str::to_string).collect();
    let mut means: Vec<Vec<Option<f64>>> = Vec::with_capacity(names.len());
    for name in &names {
        let column = frame.column(name).map(|c| c.values.as_slice()).unwrap_or(&[]);
        let mut sums = vec![(0.0f64, 0usize); starts.len()];
        for (row, v) in column.iter().enumerate() {
            if let Some(v) = *v {
                let (sum, count) = &mut sums[row_buckets[row]];
                *sum += v;
                *count += 1;
            }
        }
        means.push(
            sums.into_iter()
                .map(|(sum, count)| (count > 0).then(|| sum / count as f64))
                .collect(),
        );
    }

    let keep: Vec<usize> = (0..starts.len())
        .filter(|&b| means.iter().any(|col| col[b].is_some()))
        .collect();

    let mut out = SensorFrame::new(keep.iter().map(|&b| starts[b]).collect());
    for (name, col) in names.into_iter().zip(means) {
        let values = keep.iter().map(|&b| col[b]).collect();
        // Lengths match by construction.
        let _ = out.push_column(name, values);
    }
    out
}

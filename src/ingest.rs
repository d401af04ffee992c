use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDateTime};
use tracing::debug;

use crate::errors::PipelineError;
use crate::frame::{SensorFrame, SensorId};
use crate::pipeline::DeviceInput;

/// Accept RFC 3339 (with or without an offset) and the common naive layouts.
/// Timezone-aware stamps are stripped to naive local time before epoch
/// conversion so that mixed sources bucket consistently.
fn parse_timestamp(raw: &str) -> Option<f64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local().and_utc().timestamp() as f64);
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt.and_utc().timestamp() as f64);
        }
    }
    None
}

/// Read a timestamp-keyed CSV table into a [`SensorFrame`].
///
/// Every non-timestamp header becomes a channel; unparsable cells coerce to
/// missing rather than failing the row. Rows whose timestamp cannot be
/// parsed are skipped. The result is sorted by timestamp.
pub fn load_frame_csv(path: &Path) -> Result<SensorFrame> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening csv file {}", path.display()))?;
    let headers = reader
        .headers()
        .with_context(|| format!("reading csv headers in {}", path.display()))?
        .clone();
    let Some(ts_col) = headers.iter().position(|h| h == "timestamp") else {
        bail!("csv file {} has no 'timestamp' column", path.display());
    };

    let names: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != ts_col)
        .map(|(i, h)| (i, h.to_string()))
        .collect();

    let mut index = Vec::new();
    let mut columns: Vec<Vec<Option<f64>>> = vec![Vec::new(); names.len()];
    let mut skipped = 0usize;
    for record in reader.records() {
        let record = record.with_context(|| format!("reading csv row in {}", path.display()))?;
        let Some(ts) = record.get(ts_col).and_then(parse_timestamp) else {
            skipped += 1;
            continue;
        };
        index.push(ts);
        for (slot, (i, _)) in columns.iter_mut().zip(&names) {
            slot.push(record.get(*i).and_then(|v| v.trim().parse::<f64>().ok()));
        }
    }
    if skipped > 0 {
        debug!(file = %path.display(), skipped, "skipped rows with unparsable timestamps");
    }

    let mut frame = SensorFrame::new(index);
    for ((_, name), values) in names.into_iter().zip(columns) {
        frame.push_column(name, values)?;
    }
    Ok(frame.sort_by_index())
}

/// Split a merged telemetry table into one [`DeviceInput`] per device.
///
/// Devices are discovered from `temperature_boum_<id>` headers; each keeps
/// its temperature/voltage channel pair on the shared timestamp index. The
/// header suffix may carry the full device id; per-device channel names are
/// normalized to the shortened id form the pipeline addresses channels by.
/// A temperature channel without its voltage counterpart is a `Schema`
/// error.
pub fn split_devices(telemetry: &SensorFrame) -> Result<Vec<DeviceInput>, PipelineError> {
    let prefix = "temperature_boum_";
    let ids: Vec<String> = telemetry
        .column_names()
        .filter_map(|n| n.strip_prefix(prefix))
        .map(str::to_string)
        .collect();
    if ids.is_empty() {
        return Err(PipelineError::Schema(
            "telemetry has no temperature_boum_<device> channels".to_string(),
        ));
    }

    let mut devices = Vec::with_capacity(ids.len());
    for id in ids {
        let temp_name = format!("temperature_boum_{id}");
        let volt_name = format!("solarVoltage_boum_{id}");
        let temp = telemetry.require_column(&temp_name)?;
        let volt = telemetry.column(&volt_name).ok_or_else(|| {
            PipelineError::Schema(format!(
                "channel '{temp_name}' has no matching '{volt_name}' channel"
            ))
        })?;

        let sensor = SensorId::new(id);
        let mut frame = SensorFrame::new(telemetry.index().to_vec());
        frame.push_column(
            format!("temperature_boum_{}", sensor.short()),
            temp.values.clone(),
        )?;
        frame.push_column(
            format!("solarVoltage_boum_{}", sensor.short()),
            volt.values.clone(),
        )?;
        devices.push(DeviceInput {
            sensor,
            telemetry: frame,
        });
    }
    Ok(devices)
}

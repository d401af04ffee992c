use chrono::{DateTime, Datelike, NaiveDate, Timelike};
use serde::{Deserialize, Serialize};

use crate::errors::PipelineError;
use crate::frame::SensorFrame;

/// Month-indexed breakpoints binning a continuous daily aggregate into four
/// ordinal categories. Row `m - 1` holds the ascending (low, mid, high)
/// triple for month `m`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "[[f64; 3]; 12]", into = "[[f64; 3]; 12]")]
pub struct ThresholdTable {
    rows: [[f64; 3]; 12],
}

impl ThresholdTable {
    pub fn new(rows: [[f64; 3]; 12]) -> Result<Self, PipelineError> {
        for (i, row) in rows.iter().enumerate() {
            if row[0] > row[1] || row[1] > row[2] {
                return Err(PipelineError::Config(format!(
                    "threshold breakpoints for month {} are not non-decreasing: {row:?}",
                    i + 1
                )));
            }
        }
        Ok(Self { rows })
    }

    /// Breakpoints for `month` (1-12). A month outside that range is a
    /// `Config` error rather than a silent clamp to a neighboring row.
    pub fn breakpoints(&self, month: u32) -> Result<[f64; 3], PipelineError> {
        if !(1..=12).contains(&month) {
            return Err(PipelineError::Config(format!(
                "month must be between 1 and 12, got {month}"
            )));
        }
        Ok(self.rows[month as usize - 1])
    }
}

impl TryFrom<[[f64; 3]; 12]> for ThresholdTable {
    type Error = PipelineError;

    fn try_from(rows: [[f64; 3]; 12]) -> Result<Self, Self::Error> {
        Self::new(rows)
    }
}

impl From<ThresholdTable> for [[f64; 3]; 12] {
    fn from(table: ThresholdTable) -> Self {
        table.rows
    }
}

/// Place `value` into one of four ordinal categories using the breakpoints
/// of its source month. Bucketing is closed on the right: a value exactly
/// equal to a breakpoint falls into the lower-indexed bucket, values above
/// the highest breakpoint fall into bucket 3.
pub fn categorize(value: f64, month: u32, table: &ThresholdTable) -> Result<u8, PipelineError> {
    let breakpoints = table.breakpoints(month)?;
    Ok(breakpoints.iter().position(|&b| value <= b).unwrap_or(3) as u8)
}

/// Daytime hours used to extract a representative daily sensor value,
/// chosen to maximize contrast between sensor placements. Bounds inclusive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PeakWindow {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl PeakWindow {
    fn contains(&self, hour: u32) -> bool {
        (self.start_hour..=self.end_hour).contains(&hour)
    }
}

/// One daily aggregate, tagged with its calendar month so threshold lookups
/// stay month-correct across multi-month datasets.
#[derive(Debug, Clone, PartialEq)]
pub struct DayRecord {
    pub date: NaiveDate,
    pub month: u32,
    pub value: f64,
}

/// A daily aggregate with its assigned ordinal category.
#[derive(Debug, Clone, PartialEq)]
pub struct CategorizedDay {
    pub date: NaiveDate,
    pub month: u32,
    pub value: f64,
    pub category: u8,
}

fn date_of(epoch_secs: f64) -> Option<NaiveDate> {
    DateTime::from_timestamp(epoch_secs as i64, 0).map(|dt| dt.date_naive())
}

fn group_by_day(
    frame: &SensorFrame,
    column: &str,
    filter: impl Fn(f64) -> bool,
) -> Result<Vec<(NaiveDate, Vec<f64>)>, PipelineError> {
    let values = &frame.require_column(column)?.values;
    let mut days: Vec<(NaiveDate, Vec<f64>)> = Vec::new();
    for (&t, v) in frame.index().iter().zip(values) {
        let (Some(date), Some(v)) = (date_of(t), *v) else {
            continue;
        };
        if !filter(t) {
            continue;
        }
        match days.last_mut() {
            Some((d, vs)) if *d == date => vs.push(v),
            _ => days.push((date, vec![v])),
        }
    }
    Ok(days)
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        values[mid]
    } else {
        (values[mid - 1] + values[mid]) / 2.0
    }
}

/// Daily median of `column`, restricted to the peak divergence window; the
/// restriction suppresses nighttime noise that would otherwise dominate
/// borderline categorization.
pub fn daily_peak_median(
    frame: &SensorFrame,
    column: &str,
    window: PeakWindow,
) -> Result<Vec<DayRecord>, PipelineError> {
    let in_window = |t: f64| {
        DateTime::from_timestamp(t as i64, 0)
            .map(|dt| window.contains(dt.hour()))
            .unwrap_or(false)
    };
    let days = group_by_day(frame, column, in_window)?;
    Ok(days
        .into_iter()
        .map(|(date, mut vs)| DayRecord {
            date,
            month: date.month(),
            value: median(&mut vs),
        })
        .collect())
}

/// Full-day mean of `column`, the aggregate used for the reference
/// weather-station series.
pub fn daily_mean(frame: &SensorFrame, column: &str) -> Result<Vec<DayRecord>, PipelineError> {
    let days = group_by_day(frame, column, |_| true)?;
    Ok(days
        .into_iter()
        .map(|(date, vs)| DayRecord {
            date,
            month: date.month(),
            value: vs.iter().sum::<f64>() / vs.len() as f64,
        })
        .collect())
}

/// Bin each daily aggregate with the breakpoints of its own month.
pub fn categorize_days(
    days: &[DayRecord],
    table: &ThresholdTable,
) -> Result<Vec<CategorizedDay>, PipelineError> {
    days.iter()
        .map(|d| {
            Ok(CategorizedDay {
                date: d.date,
                month: d.month,
                value: d.value,
                category: categorize(d.value, d.month, table)?,
            })
        })
        .collect()
}

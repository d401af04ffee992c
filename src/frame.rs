use crate::errors::PipelineError;

/// A named, ordered table of sensor channels sharing one timestamp index.
///
/// The index holds epoch seconds as `f64` so that resampling arithmetic can
/// work on plain numeric values. Cells are `Option<f64>`; a missing cell is
/// data that was masked or never observed, never a parse failure (parse
/// failures are coerced to `None` at the ingest boundary).
#[derive(Debug, Clone, Default)]
pub struct SensorFrame {
    index: Vec<f64>,
    columns: Vec<Column>,
}

#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

impl SensorFrame {
    pub fn new(index: Vec<f64>) -> Self {
        Self {
            index,
            columns: Vec::new(),
        }
    }

    /// Add a channel. The column length must match the index length.
    pub fn push_column(
        &mut self,
        name: impl Into<String>,
        values: Vec<Option<f64>>,
    ) -> Result<(), PipelineError> {
        let name = name.into();
        if values.len() != self.index.len() {
            return Err(PipelineError::Schema(format!(
                "column '{}' has {} rows but the index has {}",
                name,
                values.len(),
                self.index.len()
            )));
        }
        self.columns.push(Column { name, values });
        Ok(())
    }

    pub fn index(&self) -> &[f64] {
        &self.index
    }

    pub fn height(&self) -> usize {
        self.index.len()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Column names in insertion order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Like [`SensorFrame::column`] but failing with `MissingColumn`.
    pub fn require_column(&self, name: &str) -> Result<&Column, PipelineError> {
        self.column(name)
            .ok_or_else(|| PipelineError::MissingColumn(name.to_string()))
    }

    /// Drop duplicate timestamps, keeping the first occurrence per group.
    /// Duplicate indices are a documented edge case of raw telemetry, not an
    /// error. Assumes the index is sorted non-decreasing.
    pub fn dedup_first(&self) -> SensorFrame {
        let mut keep = Vec::with_capacity(self.index.len());
        let mut last: Option<f64> = None;
        for (i, &t) in self.index.iter().enumerate() {
            if last != Some(t) {
                keep.push(i);
                last = Some(t);
            }
        }
        self.take_rows(&keep)
    }

    /// Stable sort of all rows by timestamp.
    pub fn sort_by_index(&self) -> SensorFrame {
        let mut order: Vec<usize> = (0..self.index.len()).collect();
        order.sort_by(|&a, &b| self.index[a].total_cmp(&self.index[b]));
        self.take_rows(&order)
    }

    fn take_rows(&self, rows: &[usize]) -> SensorFrame {
        SensorFrame {
            index: rows.iter().map(|&i| self.index[i]).collect(),
            columns: self
                .columns
                .iter()
                .map(|c| Column {
                    name: c.name.clone(),
                    values: rows.iter().map(|&i| c.values[i]).collect(),
                })
                .collect(),
        }
    }
}

/// Identity of one telemetry device.
///
/// Carries both the full identifier and the shortened display form used in
/// channel names, instead of slicing the id positionally at call sites.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SensorId {
    full: String,
    short: String,
}

impl SensorId {
    pub fn new(full: impl Into<String>) -> Self {
        let full = full.into();
        let short: String = full.chars().take(8).collect();
        Self { full, short }
    }

    pub fn full(&self) -> &str {
        &self.full
    }

    /// First eight characters of the id, the form embedded in channel names.
    pub fn short(&self) -> &str {
        &self.short
    }
}

impl std::fmt::Display for SensorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.short)
    }
}

use crate::errors::PipelineError;
use crate::frame::SensorFrame;

/// Positive spacing of an output grid, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution(f64);

impl Resolution {
    pub fn from_secs(secs: f64) -> Result<Self, PipelineError> {
        if !secs.is_finite() || secs <= 0.0 {
            return Err(PipelineError::Config(format!(
                "resolution must be a positive number of seconds, got {secs}"
            )));
        }
        Ok(Self(secs))
    }

    pub fn secs(&self) -> f64 {
        self.0
    }

    /// Boundary tolerance, relative to the resolution magnitude rather than
    /// a fixed constant so that very small or very large resolutions do not
    /// misclassify grid boundaries.
    pub fn epsilon(&self) -> f64 {
        self.0 * 1e-9
    }
}

/// Interpolation rule used when reindexing onto the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpMethod {
    /// Piecewise-linear by index value.
    Linear,
}

fn round_partial(value: f64, resolution: f64) -> f64 {
    (value / resolution).round() * resolution
}

/// Evenly spaced timestamps covering `[t_min, t_max]`, never narrower.
///
/// Start and end are rounded to the nearest resolution multiple and widened
/// by one step whenever rounding moved them inside the source span by more
/// than the tolerance.
pub fn build_grid(t_min: f64, t_max: f64, resolution: Resolution) -> Vec<f64> {
    let res = resolution.secs();
    let eps = resolution.epsilon();

    let mut start = round_partial(t_min, res);
    if start - eps > t_min {
        start -= res;
    }
    let mut end = round_partial(t_max, res);
    if end + eps < t_max {
        end += res;
    }

    // Generated from multiples of the resolution rather than by repeated
    // addition, so the last grid point cannot be lost to float drift.
    let mut grid = Vec::new();
    let mut step = 0u64;
    loop {
        let t = start + step as f64 * res;
        if t > end + eps {
            break;
        }
        grid.push(t);
        step += 1;
    }
    grid
}

/// Linear interpolation of `(ts, vs)` at `at`, with nearest-known-value
/// propagation beyond the extremes (backward before the first sample,
/// forward after the last). `ts` must be strictly increasing and non-empty.
fn interp_at(at: f64, ts: &[f64], vs: &[f64], eps: f64) -> f64 {
    match ts.binary_search_by(|t| t.total_cmp(&at)) {
        Ok(i) => vs[i],
        Err(0) => vs[0],
        Err(i) if i == ts.len() => vs[ts.len() - 1],
        Err(i) => {
            let (t0, t1) = (ts[i - 1], ts[i]);
            if (at - t0).abs() <= eps {
                return vs[i - 1];
            }
            if (t1 - at).abs() <= eps {
                return vs[i];
            }
            let w = (at - t0) / (t1 - t0);
            vs[i - 1] + w * (vs[i] - vs[i - 1])
        }
    }
}

/// Convert an irregular series onto an evenly spaced grid.
///
/// The output index is exactly the grid from [`build_grid`] over the input
/// span: duplicates in the input are dropped (first kept), the requested
/// columns are interpolated with `method`, and grid points outside the range
/// of known samples take the nearest known value. A column that is entirely
/// empty stays entirely empty; this is the documented degenerate case, not a
/// failure. Referencing a channel that does not exist fails with
/// `MissingColumn`.
pub fn resample_to_grid(
    frame: &SensorFrame,
    resolution: Resolution,
    columns: &[String],
    method: InterpMethod,
) -> Result<SensorFrame, PipelineError> {
    for name in columns {
        frame.require_column(name)?;
    }

    if frame.height() == 0 {
        let mut out = SensorFrame::new(Vec::new());
        for name in columns {
            out.push_column(name.clone(), Vec::new())?;
        }
        return Ok(out);
    }

    let deduped = frame.dedup_first();
    let index = deduped.index();
    let grid = build_grid(index[0], index[index.len() - 1], resolution);
    let eps = resolution.epsilon();

    let mut out = SensorFrame::new(grid.clone());
    for name in columns {
        let column = deduped.require_column(name)?;
        let mut known_ts = Vec::new();
        let mut known_vs = Vec::new();
        for (&t, v) in index.iter().zip(&column.values) {
            if let Some(v) = *v {
                known_ts.push(t);
                known_vs.push(v);
            }
        }
        let values = if known_ts.is_empty() {
            vec![None; grid.len()]
        } else {
            match method {
                InterpMethod::Linear => grid
                    .iter()
                    .map(|&g| Some(interp_at(g, &known_ts, &known_vs, eps)))
                    .collect(),
            }
        };
        out.push_column(name.clone(), values)?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn frame(index: Vec<f64>, values: Vec<Option<f64>>) -> SensorFrame {
        let mut f = SensorFrame::new(index);
        f.push_column("ch", values).unwrap();
        f
    }

    fn resample(frame: &SensorFrame, res: f64) -> SensorFrame {
        resample_to_grid(
            frame,
            Resolution::from_secs(res).unwrap(),
            &["ch".to_string()],
            InterpMethod::Linear,
        )
        .unwrap()
    }

    #[test]
    fn grid_is_congruent_and_brackets_the_input() {
        let f = frame(
            vec![95.0, 310.0, 712.0],
            vec![Some(1.0), Some(2.0), Some(3.0)],
        );
        let out = resample(&f, 100.0);
        for &t in out.index() {
            assert_relative_eq!((t / 100.0).round() * 100.0, t, epsilon = 1e-6);
        }
        assert!(out.index()[0] <= 95.0);
        assert!(*out.index().last().unwrap() >= 712.0);
    }

    #[test]
    fn regular_series_is_unchanged_at_its_own_resolution() {
        let f = frame(
            vec![0.0, 600.0, 1200.0],
            vec![Some(10.0), Some(11.0), Some(12.0)],
        );
        let out = resample(&f, 600.0);
        assert_eq!(out.index(), &[0.0, 600.0, 1200.0]);
        let got = &out.column("ch").unwrap().values;
        assert_eq!(got, &vec![Some(10.0), Some(11.0), Some(12.0)]);
    }

    #[test]
    fn three_readings_at_ten_minute_spacing_resample_cleanly() {
        // The end-to-end alignment scenario: 10-minute data onto a 600 s grid.
        let f = frame(
            vec![600.0, 1200.0, 1800.0],
            vec![Some(20.0), Some(21.0), Some(22.0)],
        );
        let out = resample(&f, 600.0);
        assert_eq!(out.height(), 3);
        assert!(out.column("ch").unwrap().values.iter().all(Option::is_some));
    }

    #[test]
    fn interpolates_between_known_samples() {
        let f = frame(vec![0.0, 200.0], vec![Some(0.0), Some(20.0)]);
        let out = resample(&f, 100.0);
        assert_eq!(out.index(), &[0.0, 100.0, 200.0]);
        assert_relative_eq!(out.column("ch").unwrap().values[1].unwrap(), 10.0);
    }

    #[test]
    fn extremes_take_nearest_known_value() {
        // First sample missing: the widened leading grid point backfills.
        let f = frame(vec![50.0, 150.0], vec![Some(5.0), Some(7.0)]);
        let out = resample(&f, 100.0);
        assert_eq!(out.index()[0], 0.0);
        assert_eq!(out.column("ch").unwrap().values[0], Some(5.0));
        assert_eq!(*out.index().last().unwrap(), 200.0);
        assert_eq!(*out.column("ch").unwrap().values.last().unwrap(), Some(7.0));
    }

    #[test]
    fn duplicate_timestamps_keep_first() {
        let mut f = SensorFrame::new(vec![0.0, 100.0, 100.0, 200.0]);
        f.push_column("ch", vec![Some(1.0), Some(2.0), Some(9.0), Some(3.0)])
            .unwrap();
        let out = resample(&f, 100.0);
        assert_eq!(out.column("ch").unwrap().values[1], Some(2.0));
    }

    #[test]
    fn empty_column_stays_empty() {
        let f = frame(vec![0.0, 100.0], vec![None, None]);
        let out = resample(&f, 100.0);
        assert!(out.column("ch").unwrap().values.iter().all(Option::is_none));
    }

    #[test]
    fn missing_column_is_reported_by_name() {
        let f = frame(vec![0.0], vec![Some(1.0)]);
        let err = resample_to_grid(
            &f,
            Resolution::from_secs(100.0).unwrap(),
            &["absent".to_string()],
            InterpMethod::Linear,
        )
        .unwrap_err();
        match err {
            PipelineError::MissingColumn(name) => assert_eq!(name, "absent"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn non_positive_resolution_is_rejected() {
        assert!(Resolution::from_secs(0.0).is_err());
        assert!(Resolution::from_secs(-600.0).is_err());
    }

    #[test]
    fn grid_end_boundary_is_not_dropped() {
        // 0.1 s resolution is a classic float-accumulation trap.
        let grid = build_grid(0.0, 1.0, Resolution::from_secs(0.1).unwrap());
        assert_eq!(grid.len(), 11);
        assert_relative_eq!(*grid.last().unwrap(), 1.0, epsilon = 1e-9);
    }
}

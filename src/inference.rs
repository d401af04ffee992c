use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::PipelineError;
use crate::features::{Mode, FEATURE_WIDTH};

/// Temperature regime assigned to a sensor placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureCluster {
    Cool,
    Warm,
    Hot,
    Unknown,
}

/// Radiation regime assigned to a sensor placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RadiationCluster {
    Dark,
    MediumDark,
    MediumBright,
    Bright,
    Unknown,
}

/// Final cluster assignment for one mode. This is the pipeline's terminal
/// output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterLabel {
    Temperature(TemperatureCluster),
    Radiation(RadiationCluster),
}

impl TemperatureCluster {
    /// Deployment convention: the integer labels the pre-fitted model emits
    /// are mapped by a fixed table, not learned.
    fn from_model_label(label: usize) -> Self {
        match label {
            0 => Self::Cool,
            2 => Self::Warm,
            1 => Self::Hot,
            _ => Self::Unknown,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Cool => "Cool cluster: average 18.6 C, range 7 C to 32 C, peak 1-2 PM",
            Self::Warm => "Warm cluster: average 20.2 C, range 8 C to 45 C, peak 2-3 PM",
            Self::Hot => "Hot cluster: average 19.1 C, range 5 C to 44 C, peak 1-2 PM",
            Self::Unknown => "Temperature cluster: information unknown",
        }
    }
}

impl RadiationCluster {
    fn from_model_label(label: usize) -> Self {
        match label {
            3 => Self::Dark,
            1 => Self::MediumDark,
            0 => Self::MediumBright,
            2 => Self::Bright,
            _ => Self::Unknown,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Dark => "Dark cluster: average 2.8 V, peak 8-9 AM",
            Self::MediumDark => "Medium dark cluster: average 2.9 V, peak 10-11 AM",
            Self::MediumBright => "Medium bright cluster: average 3.4 V, peak 11 AM-noon",
            Self::Bright => "Bright cluster: average 3.4 V, peak 11 AM-noon",
            Self::Unknown => "Radiation cluster: information unknown",
        }
    }
}

impl std::fmt::Display for TemperatureCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Cool => "cool",
            Self::Warm => "warm",
            Self::Hot => "hot",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

impl std::fmt::Display for RadiationCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Dark => "dark",
            Self::MediumDark => "medium-dark",
            Self::MediumBright => "medium-bright",
            Self::Bright => "bright",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

impl std::fmt::Display for ClusterLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Temperature(c) => c.fmt(f),
            Self::Radiation(c) => c.fmt(f),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScalerParams {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PcaParams {
    mean: Vec<f64>,
    /// One row per retained component, `FEATURE_WIDTH` columns each.
    components: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ClusterParams {
    /// One row per cluster, in the reduced space.
    centroids: Vec<Vec<f64>>,
}

/// Pre-fitted scaler, dimensionality reduction and cluster centroids for one
/// mode. Opaque to the pipeline: loaded once, never refitted.
#[derive(Debug, Clone)]
pub struct ModelBundle {
    scaler_mean: Array1<f64>,
    scaler_scale: Array1<f64>,
    pca_mean: Array1<f64>,
    pca_components: Array2<f64>,
    centroids: Array2<f64>,
}

fn read_artifact<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, PipelineError> {
    let file = File::open(path).map_err(|source| match source.kind() {
        std::io::ErrorKind::NotFound => PipelineError::ModelNotFound {
            path: path.to_path_buf(),
        },
        _ => PipelineError::ModelIo {
            path: path.to_path_buf(),
            source,
        },
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| {
        PipelineError::MalformedModel {
            path: path.to_path_buf(),
            source,
        }
    })
}

fn to_matrix(rows: Vec<Vec<f64>>, what: &str) -> Result<Array2<f64>, PipelineError> {
    let n_rows = rows.len();
    let n_cols = rows.first().map(Vec::len).unwrap_or(0);
    if rows.iter().any(|r| r.len() != n_cols) {
        return Err(PipelineError::Config(format!("ragged {what} matrix")));
    }
    let flat: Vec<f64> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec((n_rows, n_cols), flat)
        .map_err(|e| PipelineError::Config(format!("bad {what} shape: {e}")))
}

impl ModelBundle {
    /// Load the three artifacts for `mode` from a model directory laid out as
    /// `scaler_<mode>.json`, `pca_<mode>.json`, `<mode>_clusters.json`.
    pub fn load(dir: &Path, mode: Mode) -> Result<Self, PipelineError> {
        let scaler: ScalerParams = read_artifact(&dir.join(format!("scaler_{mode}.json")))?;
        let pca: PcaParams = read_artifact(&dir.join(format!("pca_{mode}.json")))?;
        let clusters: ClusterParams = read_artifact(&dir.join(format!("{mode}_clusters.json")))?;
        Self::from_params(
            scaler.mean,
            scaler.scale,
            pca.mean,
            pca.components,
            clusters.centroids,
        )
    }

    /// Assemble a bundle from already-loaded parameters, validating that the
    /// transform chain is dimensionally consistent.
    pub fn from_params(
        scaler_mean: Vec<f64>,
        scaler_scale: Vec<f64>,
        pca_mean: Vec<f64>,
        pca_components: Vec<Vec<f64>>,
        centroids: Vec<Vec<f64>>,
    ) -> Result<Self, PipelineError> {
        let pca_components = to_matrix(pca_components, "pca components")?;
        let centroids = to_matrix(centroids, "centroid")?;

        for (len, what) in [
            (scaler_mean.len(), "scaler mean"),
            (scaler_scale.len(), "scaler scale"),
            (pca_mean.len(), "pca mean"),
            (pca_components.ncols(), "pca components"),
        ] {
            if len != FEATURE_WIDTH {
                debug!(what, len, "artifact width mismatch");
                return Err(PipelineError::ShapeMismatch {
                    expected: FEATURE_WIDTH,
                    actual: len,
                });
            }
        }
        if centroids.ncols() != pca_components.nrows() {
            return Err(PipelineError::ShapeMismatch {
                expected: pca_components.nrows(),
                actual: centroids.ncols(),
            });
        }

        Ok(Self {
            scaler_mean: Array1::from_vec(scaler_mean),
            scaler_scale: Array1::from_vec(scaler_scale),
            pca_mean: Array1::from_vec(pca_mean),
            pca_components,
            centroids,
        })
    }
}

/// Reindex a raw feature row to the model's fixed schema and repair missing
/// cells: forward-interpolate along the row, then backfill leading gaps so a
/// sensor missing its first category borrows the next available value
/// instead of pushing a gap into the scaler.
pub fn repair_row(row: &[f64]) -> Result<[f64; FEATURE_WIDTH], PipelineError> {
    if row.len() > FEATURE_WIDTH {
        return Err(PipelineError::ShapeMismatch {
            expected: FEATURE_WIDTH,
            actual: row.len(),
        });
    }
    let mut cells = [f64::NAN; FEATURE_WIDTH];
    cells[..row.len()].copy_from_slice(row);

    let known: Vec<usize> = (0..FEATURE_WIDTH).filter(|&i| cells[i].is_finite()).collect();
    if known.is_empty() {
        return Err(PipelineError::ShapeMismatch {
            expected: FEATURE_WIDTH,
            actual: 0,
        });
    }
    for i in 0..FEATURE_WIDTH {
        if cells[i].is_finite() {
            continue;
        }
        let next = known.iter().copied().find(|&k| k > i);
        let prev = known.iter().copied().rev().find(|&k| k < i);
        cells[i] = match (prev, next) {
            // Positional linear interpolation between the surrounding cells.
            (Some(p), Some(n)) => {
                let w = (i - p) as f64 / (n - p) as f64;
                cells[p] + w * (cells[n] - cells[p])
            }
            // Trailing gap: carry the last known value forward.
            (Some(p), None) => cells[p],
            // Leading gap: borrow the next known value.
            (None, Some(n)) => cells[n],
            (None, None) => unreachable!("known is non-empty"),
        };
    }
    Ok(cells)
}

/// Apply the pre-fitted transform chain to a feature row and name the
/// resulting cluster. Scaling and projection run in that fixed order; the
/// integer label is mapped through the static per-mode table, and any label
/// outside the table maps to unknown.
pub fn predict(row: &[f64], mode: Mode, bundle: &ModelBundle) -> Result<ClusterLabel, PipelineError> {
    let repaired = repair_row(row)?;
    let x = Array1::from_vec(repaired.to_vec());

    let scaled = (&x - &bundle.scaler_mean) / &bundle.scaler_scale;
    let reduced = bundle.pca_components.dot(&(&scaled - &bundle.pca_mean));

    let mut best = 0usize;
    let mut best_dist = f64::INFINITY;
    for (i, centroid) in bundle.centroids.outer_iter().enumerate() {
        let dist: f64 = reduced
            .iter()
            .zip(centroid.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum();
        // Strict comparison keeps ties on the lowest index, deterministically.
        if dist < best_dist {
            best = i;
            best_dist = dist;
        }
    }
    debug!(%mode, label = best, "cluster assigned");

    Ok(match mode {
        Mode::Temperature => ClusterLabel::Temperature(TemperatureCluster::from_model_label(best)),
        Mode::Radiation => ClusterLabel::Radiation(RadiationCluster::from_model_label(best)),
    })
}

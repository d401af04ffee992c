use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::categorize::{categorize_days, daily_mean, daily_peak_median, CategorizedDay};
use crate::config::PipelineConfig;
use crate::correct::correct;
use crate::errors::PipelineError;
use crate::features::{build_feature_profile, FeatureTable, FeatureVector, Mode};
use crate::frame::{SensorFrame, SensorId};
use crate::inference::{predict, ClusterLabel, ModelBundle};
use crate::resample::{resample_to_grid, InterpMethod, Resolution};

/// Weather reference channel names, one geographic coordinate, hourly.
pub const WEATHER_TEMPERATURE: &str = "temperature_2m";
pub const WEATHER_IRRADIANCE: &str = "direct_normal_irradiance";

/// Raw telemetry for one device, as delivered by the external fetchers.
#[derive(Debug, Clone)]
pub struct DeviceInput {
    pub sensor: SensorId,
    pub telemetry: SensorFrame,
}

/// Terminal pipeline output for one device: the two regime labels plus the
/// intermediate feature vectors for diagnostics.
#[derive(Debug, Clone)]
pub struct SensorReport {
    pub sensor: SensorId,
    pub temperature: ClusterLabel,
    pub radiation: ClusterLabel,
    pub temperature_features: FeatureVector,
    pub radiation_features: FeatureVector,
}

/// End-to-end micro-climate classification: raw series through resampling,
/// correction, categorization and feature aggregation into the pre-fitted
/// cluster models. Holds no mutable state; every run works on its own
/// inputs.
pub struct MicroclimatePipeline {
    config: PipelineConfig,
    temperature_model: ModelBundle,
    radiation_model: ModelBundle,
}

/// Concatenate the per-sensor feature rows of the successful reports into
/// the two independent per-mode tables. Feature spaces are never mixed; row
/// order follows the input device order.
pub fn feature_tables(
    results: &[(SensorId, Result<SensorReport, PipelineError>)],
) -> (FeatureTable, FeatureTable) {
    let mut temperature = FeatureTable::new(Mode::Temperature);
    let mut radiation = FeatureTable::new(Mode::Radiation);
    for (sensor, result) in results {
        if let Ok(report) = result {
            temperature.push(sensor.clone(), report.temperature_features.clone());
            radiation.push(sensor.clone(), report.radiation_features.clone());
        }
    }
    (temperature, radiation)
}

struct WeatherReference {
    temperature_days: Vec<CategorizedDay>,
    radiation_days: Vec<CategorizedDay>,
}

impl MicroclimatePipeline {
    pub fn new(
        config: PipelineConfig,
        temperature_model: ModelBundle,
        radiation_model: ModelBundle,
    ) -> Self {
        Self {
            config,
            temperature_model,
            radiation_model,
        }
    }

    /// Classify every device against the shared weather reference for
    /// `target_month`. One device's malformed data must not abort the batch,
    /// so per-device failures are returned alongside the successes; device
    /// ordering is preserved for reproducibility.
    pub fn run(
        &self,
        devices: &[DeviceInput],
        weather: &SensorFrame,
        target_month: u32,
    ) -> Result<Vec<(SensorId, Result<SensorReport, PipelineError>)>, PipelineError> {
        if !(1..=12).contains(&target_month) {
            return Err(PipelineError::Config(format!(
                "target month must be 1-12, got {target_month}"
            )));
        }
        let reference = self.build_weather_reference(weather, target_month)?;
        info!(
            devices = devices.len(),
            target_month,
            reference_days = reference.temperature_days.len(),
            "starting micro-climate classification"
        );

        let start = Instant::now();
        let results: Vec<_> = devices
            .par_iter()
            .map(|device| {
                let report = self.process_device(device, &reference);
                if let Err(e) = &report {
                    warn!(sensor = %device.sensor, "device failed: {e}");
                }
                (device.sensor.clone(), report)
            })
            .collect();

        let succeeded = results.iter().filter(|(_, r)| r.is_ok()).count();
        info!(
            succeeded,
            failed = results.len() - succeeded,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "classification complete"
        );
        Ok(results)
    }

    /// Daily full-day means of the reference series for the requested month,
    /// categorized with the month-correct breakpoints. The weather station
    /// is the ground truth the sensor placements are characterized against.
    fn build_weather_reference(
        &self,
        weather: &SensorFrame,
        target_month: u32,
    ) -> Result<WeatherReference, PipelineError> {
        let mut temperature = daily_mean(weather, WEATHER_TEMPERATURE)?;
        let mut radiation = daily_mean(weather, WEATHER_IRRADIANCE)?;
        temperature.retain(|d| d.month == target_month);
        radiation.retain(|d| d.month == target_month);

        Ok(WeatherReference {
            temperature_days: categorize_days(&temperature, &self.config.temperature_thresholds)?,
            radiation_days: categorize_days(&radiation, &self.config.radiation_thresholds)?,
        })
    }

    fn process_device(
        &self,
        device: &DeviceInput,
        reference: &WeatherReference,
    ) -> Result<SensorReport, PipelineError> {
        let telemetry_resolution = Resolution::from_secs(self.config.telemetry_resolution_secs)?;
        let corrected_resolution = Resolution::from_secs(self.config.corrected_resolution_secs)?;

        let channels: Vec<String> = device.telemetry.column_names().map(str::to_string).collect();
        let aligned = resample_to_grid(
            &device.telemetry,
            telemetry_resolution,
            &channels,
            InterpMethod::Linear,
        )?;
        let corrected = correct(&aligned, &self.config.calibration, corrected_resolution)?;

        let temp_channel = format!("temperature_boum_{}", device.sensor.short());
        let volt_channel = format!("solarVoltage_boum_{}", device.sensor.short());
        let temp_days =
            daily_peak_median(&corrected, &temp_channel, self.config.peak_window)?;
        let volt_days =
            daily_peak_median(&corrected, &volt_channel, self.config.peak_window)?;

        let temp_profile = build_feature_profile(
            &temp_days,
            &reference.temperature_days,
            &device.sensor,
            Mode::Temperature,
        )?;
        let rad_profile = build_feature_profile(
            &volt_days,
            &reference.radiation_days,
            &device.sensor,
            Mode::Radiation,
        )?;
        debug!(
            sensor = %device.sensor,
            reference_cells = temp_profile.reference_profile.len(),
            "feature profiles ready"
        );

        let temperature = predict(
            temp_profile.features.values(),
            Mode::Temperature,
            &self.temperature_model,
        )?;
        let radiation = predict(
            rad_profile.features.values(),
            Mode::Radiation,
            &self.radiation_model,
        )?;

        Ok(SensorReport {
            sensor: device.sensor.clone(),
            temperature,
            radiation,
            temperature_features: temp_profile.features,
            radiation_features: rad_profile.features,
        })
    }
}

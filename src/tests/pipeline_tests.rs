use chrono::NaiveDate;

use crate::config::PipelineConfig;
use crate::errors::PipelineError;
use crate::features::Mode;
use crate::frame::{SensorFrame, SensorId};
use crate::inference::{ClusterLabel, ModelBundle, RadiationCluster, TemperatureCluster};
use crate::pipeline::{DeviceInput, MicroclimatePipeline, WEATHER_IRRADIANCE, WEATHER_TEMPERATURE};

fn epoch(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> f64 {
    NaiveDate::from_ymd_opt(year, month, day)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
        .and_utc()
        .timestamp() as f64
}

/// Two July days of 10-minute telemetry for one device. Values drift
/// monotonically so flatline masking never fires.
fn telemetry(device: &str) -> DeviceInput {
    let mut index = Vec::new();
    let mut temp = Vec::new();
    let mut volt = Vec::new();
    for day in 1..=2u32 {
        for step in 0..(24 * 6) {
            let secs_into_day = step as f64 * 600.0;
            index.push(epoch(2023, 7, day, 0, 0) + secs_into_day);
            temp.push(Some(10.0 + secs_into_day / 3600.0 * 0.5));
            volt.push(Some(1.0 + secs_into_day / 3600.0 * 0.1));
        }
    }
    let sensor = SensorId::new(device);
    let mut frame = SensorFrame::new(index);
    frame
        .push_column(format!("temperature_boum_{}", sensor.short()), temp)
        .unwrap();
    frame
        .push_column(format!("solarVoltage_boum_{}", sensor.short()), volt)
        .unwrap();
    DeviceInput {
        sensor,
        telemetry: frame,
    }
}

/// Hourly July weather for the same two days.
fn weather() -> SensorFrame {
    let mut index = Vec::new();
    let mut temp = Vec::new();
    let mut dni = Vec::new();
    for day in 1..=2u32 {
        for hour in 0..24 {
            index.push(epoch(2023, 7, day, hour, 0));
            temp.push(Some(16.0 + hour as f64 * 0.1));
            dni.push(Some(hour as f64 * 30.0));
        }
    }
    let mut frame = SensorFrame::new(index);
    frame.push_column(WEATHER_TEMPERATURE, temp).unwrap();
    frame.push_column(WEATHER_IRRADIANCE, dni).unwrap();
    frame
}

/// Single-centroid bundles: every input lands on model label 0, which the
/// static tables name "cool" and "medium-bright".
fn single_centroid_bundle() -> ModelBundle {
    ModelBundle::from_params(
        vec![0.0; 4],
        vec![1.0; 4],
        vec![0.0; 4],
        vec![vec![1.0, 0.0, 0.0, 0.0], vec![0.0, 1.0, 0.0, 0.0]],
        vec![vec![0.0, 0.0]],
    )
    .unwrap()
}

fn pipeline() -> MicroclimatePipeline {
    MicroclimatePipeline::new(
        PipelineConfig::default(),
        single_centroid_bundle(),
        single_centroid_bundle(),
    )
}

#[test]
fn end_to_end_classification_produces_both_labels() {
    let device = telemetry("aabbccddeeff0011");
    let results = pipeline().run(&[device], &weather(), 7).unwrap();
    assert_eq!(results.len(), 1);

    let report = results[0].1.as_ref().unwrap();
    assert_eq!(
        report.temperature,
        ClusterLabel::Temperature(TemperatureCluster::Cool)
    );
    assert_eq!(
        report.radiation,
        ClusterLabel::Radiation(RadiationCluster::MediumBright)
    );
    assert_eq!(report.temperature_features.values().len(), 4);
    assert!(report
        .temperature_features
        .values()
        .iter()
        .all(|v| v.is_finite()));
}

#[test]
fn full_length_csv_headers_classify_end_to_end() {
    // Merged telemetry whose headers carry the full device id, as the raw
    // export writes them before any shortening.
    let source = telemetry("aabbccddeeff0011");
    let mut merged = SensorFrame::new(source.telemetry.index().to_vec());
    merged
        .push_column(
            "temperature_boum_aabbccddeeff0011",
            source
                .telemetry
                .column("temperature_boum_aabbccdd")
                .unwrap()
                .values
                .clone(),
        )
        .unwrap();
    merged
        .push_column(
            "solarVoltage_boum_aabbccddeeff0011",
            source
                .telemetry
                .column("solarVoltage_boum_aabbccdd")
                .unwrap()
                .values
                .clone(),
        )
        .unwrap();

    let devices = crate::ingest::split_devices(&merged).unwrap();
    let results = pipeline().run(&devices, &weather(), 7).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].0.short(), "aabbccdd");
    assert!(results[0].1.is_ok(), "device failed: {:?}", results[0].1);
}

#[test]
fn repeated_runs_are_deterministic() {
    let devices = vec![telemetry("aabbccddeeff0011"), telemetry("1122334455667788")];
    let p = pipeline();
    let first = p.run(&devices, &weather(), 7).unwrap();
    let second = p.run(&devices, &weather(), 7).unwrap();
    for ((id_a, a), (id_b, b)) in first.iter().zip(&second) {
        assert_eq!(id_a, id_b);
        let (a, b) = (a.as_ref().unwrap(), b.as_ref().unwrap());
        assert_eq!(a.temperature, b.temperature);
        assert_eq!(a.radiation, b.radiation);
        assert_eq!(a.temperature_features, b.temperature_features);
    }
}

#[test]
fn one_failing_device_does_not_abort_the_batch() {
    let healthy = telemetry("aabbccddeeff0011");
    let sensor = SensorId::new("deaddead00000000");
    let mut empty = SensorFrame::new(Vec::new());
    empty
        .push_column(format!("temperature_boum_{}", sensor.short()), Vec::new())
        .unwrap();
    empty
        .push_column(format!("solarVoltage_boum_{}", sensor.short()), Vec::new())
        .unwrap();
    let broken = DeviceInput {
        sensor,
        telemetry: empty,
    };

    let results = pipeline()
        .run(&[broken, healthy], &weather(), 7)
        .unwrap();
    assert_eq!(results.len(), 2);
    assert!(matches!(
        results[0].1,
        Err(PipelineError::InsufficientData { .. })
    ));
    assert!(results[1].1.is_ok());
}

#[test]
fn feature_tables_keep_device_order_and_skip_failures() {
    let sensor = SensorId::new("deaddead00000000");
    let mut empty = SensorFrame::new(Vec::new());
    empty
        .push_column(format!("temperature_boum_{}", sensor.short()), Vec::new())
        .unwrap();
    empty
        .push_column(format!("solarVoltage_boum_{}", sensor.short()), Vec::new())
        .unwrap();
    let broken = DeviceInput {
        sensor,
        telemetry: empty,
    };
    let devices = vec![telemetry("aabbccddeeff0011"), broken, telemetry("1122334455667788")];

    let results = pipeline().run(&devices, &weather(), 7).unwrap();
    let (temperature, radiation) = crate::pipeline::feature_tables(&results);
    let order: Vec<&str> = temperature.rows.iter().map(|(s, _)| s.short()).collect();
    assert_eq!(order, vec!["aabbccdd", "11223344"]);
    assert_eq!(radiation.rows.len(), 2);
}

#[test]
fn weather_outside_the_target_month_is_excluded() {
    // Only July weather exists; asking for August leaves no reference days.
    let device = telemetry("aabbccddeeff0011");
    let results = pipeline().run(&[device], &weather(), 8).unwrap();
    assert!(matches!(
        results[0].1,
        Err(PipelineError::InsufficientData { .. })
    ));
}

#[test]
fn missing_weather_channel_fails_the_run() {
    let device = telemetry("aabbccddeeff0011");
    let mut bare = SensorFrame::new(vec![epoch(2023, 7, 1, 0, 0)]);
    bare.push_column(WEATHER_TEMPERATURE, vec![Some(16.0)]).unwrap();
    let err = pipeline().run(&[device], &bare, 7).unwrap_err();
    match err {
        PipelineError::MissingColumn(name) => assert_eq!(name, WEATHER_IRRADIANCE),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn invalid_target_month_is_rejected() {
    let err = pipeline().run(&[], &weather(), 13).unwrap_err();
    assert!(matches!(err, PipelineError::Config(_)));
}

#[test]
fn model_bundle_loads_from_a_model_directory() {
    let dir = tempfile::tempdir().unwrap();
    for mode in [Mode::Temperature, Mode::Radiation] {
        std::fs::write(
            dir.path().join(format!("scaler_{mode}.json")),
            r#"{"mean": [0.0, 0.0, 0.0, 0.0], "scale": [1.0, 1.0, 1.0, 1.0]}"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join(format!("pca_{mode}.json")),
            r#"{"mean": [0.0, 0.0, 0.0, 0.0], "components": [[1.0, 0.0, 0.0, 0.0], [0.0, 1.0, 0.0, 0.0]]}"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join(format!("{mode}_clusters.json")),
            r#"{"centroids": [[0.0, 0.0], [5.0, 5.0]]}"#,
        )
        .unwrap();
    }
    let bundle = ModelBundle::load(dir.path(), Mode::Temperature).unwrap();
    let label = crate::inference::predict(&[0.0; 4], Mode::Temperature, &bundle).unwrap();
    assert_eq!(label, ClusterLabel::Temperature(TemperatureCluster::Cool));
}

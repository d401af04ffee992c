use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use microclimate_pipeline::config::PipelineConfig;
use microclimate_pipeline::features::Mode;
use microclimate_pipeline::inference::{ClusterLabel, ModelBundle};
use microclimate_pipeline::ingest::{load_frame_csv, split_devices};
use microclimate_pipeline::pipeline::{feature_tables, MicroclimatePipeline};

#[derive(Parser, Debug)]
#[command(name = "microclimate_pipeline")]
#[command(about = "Assign micro-climate cluster labels to sensor telemetry", long_about = None)]
struct Args {
    /// Telemetry CSV: timestamp plus temperature_boum_<id>/solarVoltage_boum_<id> columns
    #[arg(long)]
    telemetry: PathBuf,

    /// Weather CSV: timestamp plus temperature_2m and direct_normal_irradiance columns
    #[arg(long)]
    weather: PathBuf,

    /// Directory holding the pre-fitted model artifacts
    #[arg(long, env = "MODEL_DIR")]
    model_dir: PathBuf,

    /// Month (1-12) to characterize the sensors against
    #[arg(long)]
    month: u32,

    /// Optional JSON config overriding the deployment defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the intermediate feature vectors alongside the labels
    #[arg(long)]
    show_features: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("microclimate_pipeline=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };

    let temperature_model = ModelBundle::load(&args.model_dir, Mode::Temperature)
        .context("loading temperature model bundle")?;
    let radiation_model = ModelBundle::load(&args.model_dir, Mode::Radiation)
        .context("loading radiation model bundle")?;

    let telemetry = load_frame_csv(&args.telemetry)?;
    let weather = load_frame_csv(&args.weather)?;
    let devices = split_devices(&telemetry)?;
    info!(
        devices = devices.len(),
        telemetry_rows = telemetry.height(),
        weather_rows = weather.height(),
        "inputs loaded"
    );

    let pipeline = MicroclimatePipeline::new(config, temperature_model, radiation_model);
    let results = pipeline.run(&devices, &weather, args.month)?;

    for (sensor, result) in &results {
        match result {
            Ok(report) => {
                println!(
                    "{sensor}: temperature={}, radiation={}",
                    report.temperature, report.radiation
                );
                if let ClusterLabel::Temperature(c) = report.temperature {
                    println!("  {}", c.description());
                }
                if let ClusterLabel::Radiation(c) = report.radiation {
                    println!("  {}", c.description());
                }
            }
            Err(e) => println!("{sensor}: failed ({e})"),
        }
    }

    if args.show_features {
        let (temperature, radiation) = feature_tables(&results);
        for table in [&temperature, &radiation] {
            println!("{} features:", table.mode);
            for (sensor, features) in &table.rows {
                println!("  {sensor}: {:?}", features.values());
            }
        }
    }
    Ok(())
}

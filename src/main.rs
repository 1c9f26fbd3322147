use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;

use sevas::analysis::{ChangeAnalysis, ChangeReport, CloudReport};
use sevas::{
    build_standard_pipeline, ChangeDetector, CloudDetector, DetectorConfig, Image,
    ImagePreprocessor, SceneData, SpectralIndexCalculator,
};

#[derive(Parser)]
#[command(name = "sevas")]
#[command(about = "Screen aerial imagery for clouds, vegetation, water and change")]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print reports as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Edge length images are resized to before analysis
    #[arg(long, value_name = "PIXELS", global = true)]
    target_size: Option<u32>,

    /// Byte-scale level all channels must exceed to count as cloud
    #[arg(long, global = true)]
    brightness_threshold: Option<f32>,

    /// Cloud percentage at which a scene becomes unusable
    #[arg(long, global = true)]
    cloud_threshold: Option<f64>,

    /// Byte-scale mean difference a pixel must exceed to count as changed
    #[arg(long, global = true)]
    change_threshold: Option<f32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Estimate cloud cover
    Clouds {
        #[arg(value_name = "IMAGE")]
        image: PathBuf,
    },
    /// Compute simulated NDVI and NDWI
    Indices {
        #[arg(value_name = "IMAGE")]
        image: PathBuf,
    },
    /// Compare two acquisitions of the same area
    Change {
        #[arg(value_name = "BEFORE")]
        before: PathBuf,
        #[arg(value_name = "AFTER")]
        after: PathBuf,
    },
    /// Run the full scene pipeline
    Analyze {
        #[arg(value_name = "IMAGE")]
        image: PathBuf,

        /// Earlier image of the same area, enables change detection
        #[arg(long, value_name = "IMAGE")]
        before: Option<PathBuf>,
    },
}

impl Cli {
    fn detector_config(&self) -> DetectorConfig {
        let mut config = DetectorConfig::default();
        if let Some(size) = self.target_size {
            config.preprocess.target_size = size;
        }
        if let Some(threshold) = self.brightness_threshold {
            config.cloud.brightness_threshold = threshold;
        }
        if let Some(threshold) = self.cloud_threshold {
            config.cloud.cloud_threshold_percent = threshold;
        }
        if let Some(threshold) = self.change_threshold {
            config.change.change_threshold = threshold;
        }
        config
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn load(preprocessor: &ImagePreprocessor, path: &Path) -> anyhow::Result<Image> {
    preprocessor
        .preprocess(path)
        .with_context(|| format!("Failed to prepare {}", path.display()))
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    init_tracing(args.verbose);

    let config = args.detector_config();
    let preprocessor = ImagePreprocessor::from_config(config.preprocess)?;

    match &args.command {
        Command::Clouds { image } => {
            let image = load(&preprocessor, image)?;
            let report = CloudDetector::from_config(config.cloud).detect(&image)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_cloud_report(&report);
            }
        }
        Command::Indices { image } => {
            let image = load(&preprocessor, image)?;
            let calculator = SpectralIndexCalculator::new();
            let ndvi = calculator.summarize_ndvi(&calculator.ndvi(&image, None)?);
            let ndwi = calculator.summarize_ndwi(&calculator.ndwi(&image)?);
            if args.json {
                println!("{}", serde_json::to_string_pretty(&json!({ "ndvi": ndvi, "ndwi": ndwi }))?);
            } else {
                println!("\n=== Spectral Indices ===");
                println!(
                    "NDVI: mean {:.3} (min {:.3}, max {:.3}) - {}",
                    ndvi.mean, ndvi.min, ndvi.max, ndvi.class.description()
                );
                println!(
                    "NDWI: mean {:.3} (min {:.3}, max {:.3}) - {}",
                    ndwi.mean, ndwi.min, ndwi.max, ndwi.class.description()
                );
            }
        }
        Command::Change { before, after } => {
            let before = load(&preprocessor, before)?;
            let after = load(&preprocessor, after)?;
            let detector = ChangeDetector::from_config(config.change);
            let report = detector.detect_changes(&before, &after)?;
            let analysis = detector.analyze_change_type(&before, &after, &report.mask)?;
            if args.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({ "changes": report, "analysis": analysis }))?
                );
            } else {
                print_change_report(&report, &analysis);
            }
        }
        Command::Analyze { image, before } => {
            let mut scene = SceneData::new(image.display().to_string(), load(&preprocessor, image)?);
            if let Some(before) = before {
                scene = scene.with_reference(load(&preprocessor, before)?);
            }

            let pipeline = build_standard_pipeline(&config).with_verbose(args.verbose);
            let results = pipeline.run(vec![scene])?;

            for scene in &results {
                let metadata: BTreeMap<_, _> = scene.metadata.iter().collect();
                if args.json {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&json!({ "scene": scene.label, "results": metadata }))?
                    );
                } else {
                    println!("\n=== {} ===", scene.label);
                    if !scene.is_usable() {
                        println!("Scene too cloudy, analysis skipped.");
                    }
                    for (key, value) in metadata {
                        println!("  {}: {}", key, serde_json::to_string(value)?);
                    }
                }
            }
        }
    }

    Ok(())
}

fn print_cloud_report(report: &CloudReport) {
    println!("\n=== Cloud Detection ===");
    println!(
        "Cloud cover: {:.2}% ({} of {} pixels)",
        report.cloud_percentage, report.cloud_pixels, report.total_pixels
    );
    println!("Status: {}", report.status.as_str());
    println!("Usable: {}", if report.usable { "yes" } else { "no" });
}

fn print_change_report(report: &ChangeReport, analysis: &ChangeAnalysis) {
    println!("\n=== Change Detection ===");
    println!(
        "Changed: {:.2}% ({} of {} pixels) - {}",
        report.change_percentage,
        report.changed_pixels,
        report.total_pixels,
        report.magnitude.as_str()
    );
    println!(
        "Difference: max {:.1}, mean {:.1}",
        report.max_difference, report.mean_difference
    );
    println!("Type: {} - {}", analysis.change_type.as_str(), analysis.description);
    if let (Some(green), Some(brightness)) = (analysis.green_delta, analysis.brightness_delta) {
        println!("Green shift: {:+.1}, brightness shift: {:+.1}", green, brightness);
    }
}

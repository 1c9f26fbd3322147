pub mod change;
pub mod cloud;
pub mod preprocessing;
pub mod spectral;
pub mod steps;

pub use change::{ChangeAnalysis, ChangeDetector, ChangeMagnitude, ChangeReport, ChangeType};
pub use cloud::{CloudDetector, CloudReport, CloudStatus};
pub use preprocessing::{BatchFailure, ImagePreprocessor, PreprocessedBatch, ResizeMethod};
pub use spectral::{IndexSummary, SpectralIndexCalculator, VegetationClass, WaterClass};

use crate::config::DetectorConfig;
use crate::pipeline::Pipeline;
use steps::{ChangeDetectionStep, CloudGateStep, SpectralIndexStep};

/// Cloud gate, then spectral indices, then change detection.
///
/// Cloudy scenes stay in the output, marked unusable, so callers can report
/// why they were skipped.
pub fn build_standard_pipeline(config: &DetectorConfig) -> Pipeline {
    Pipeline::new()
        .add_step_boxed(Box::new(CloudGateStep {
            detector: CloudDetector::from_config(config.cloud),
            drop_unusable: false,
        }))
        .add_step_boxed(Box::new(SpectralIndexStep {
            calculator: SpectralIndexCalculator::new(),
        }))
        .add_step_boxed(Box::new(ChangeDetectionStep {
            detector: ChangeDetector::from_config(config.change),
        }))
}

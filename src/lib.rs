pub mod analysis;
pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;

pub use analysis::{
    build_standard_pipeline, ChangeDetector, CloudDetector, ImagePreprocessor,
    SpectralIndexCalculator,
};
pub use config::{ChangeConfig, CloudConfig, DetectorConfig, PreprocessConfig};
pub use error::{Error, Result};
pub use models::{BinaryMask, ChangeMask, CloudMask, DifferenceMap, Image, SpectralIndex, ValueRange};
pub use pipeline::{MetadataValue, Pipeline, PipelineContext, PipelineStep, SceneData};

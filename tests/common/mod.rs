mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from sevas for tests
pub use sevas::{
    ChangeDetector, CloudDetector, DetectorConfig, Error, Image, ImagePreprocessor, SceneData,
    SpectralIndexCalculator, ValueRange,
};

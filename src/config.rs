use serde::{Deserialize, Serialize};

/// Settings for [`ImagePreprocessor`](crate::analysis::ImagePreprocessor).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Edge length of the square output, in pixels.
    pub target_size: u32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self { target_size: 256 }
    }
}

/// Settings for [`CloudDetector`](crate::analysis::CloudDetector).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    /// Byte-scale level every channel must exceed for a pixel to be cloud.
    pub brightness_threshold: f32,
    /// Scenes at or above this cloud percentage are unusable.
    pub cloud_threshold_percent: f64,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            brightness_threshold: 200.0,
            cloud_threshold_percent: 30.0,
        }
    }
}

/// Settings for [`ChangeDetector`](crate::analysis::ChangeDetector).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangeConfig {
    /// Byte-scale mean difference a pixel must exceed to count as changed.
    pub change_threshold: f32,
}

impl Default for ChangeConfig {
    fn default() -> Self {
        Self {
            change_threshold: 50.0,
        }
    }
}

/// All detector settings in one place, for callers that build the
/// standard pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub preprocess: PreprocessConfig,
    pub cloud: CloudConfig,
    pub change: ChangeConfig,
}

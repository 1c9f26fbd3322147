use image::{Luma, Rgb};
use imageproc::map::map_colors;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::CloudConfig;
use crate::error::Result;
use crate::models::{BinaryMask, CloudMask, Image, ValueRange};

/// Cloud percentage below which a scene is considered clear.
pub const CLEAR_SKY_PERCENT: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloudStatus {
    Clear,
    Acceptable,
    TooCloudy,
}

impl CloudStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloudStatus::Clear => "clear",
            CloudStatus::Acceptable => "acceptable",
            CloudStatus::TooCloudy => "too_cloudy",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CloudReport {
    pub cloud_percentage: f64,
    pub cloud_pixels: usize,
    pub total_pixels: usize,
    pub status: CloudStatus,
    pub usable: bool,
    #[serde(skip)]
    pub mask: CloudMask,
}

/// Scores cloud contamination from per-channel brightness.
#[derive(Debug, Clone, Default)]
pub struct CloudDetector {
    config: CloudConfig,
}

impl CloudDetector {
    pub fn new(brightness_threshold: f32, cloud_threshold_percent: f64) -> Self {
        Self::from_config(CloudConfig {
            brightness_threshold,
            cloud_threshold_percent,
        })
    }

    pub fn from_config(config: CloudConfig) -> Self {
        debug!(
            brightness_threshold = config.brightness_threshold,
            cloud_threshold_percent = config.cloud_threshold_percent,
            "cloud detector initialized"
        );
        Self { config }
    }

    pub fn config(&self) -> &CloudConfig {
        &self.config
    }

    /// Classify every pixel and report the cloud share of the image.
    ///
    /// A pixel is cloud only when all three channels are strictly brighter
    /// than the threshold; one or two bright channels never count.
    pub fn detect(&self, image: &Image) -> Result<CloudReport> {
        image.require_channels(3)?;
        let bytes = image.to_range(ValueRange::Byte);
        let threshold = self.config.brightness_threshold;

        let mask = BinaryMask::from_gray(map_colors(&bytes.to_bgr_buffer()?, |Rgb(bgr)| {
            Luma([u8::from(bgr.iter().all(|v| *v > threshold))])
        }));

        let cloud_pixels = mask.count();
        let total_pixels = mask.total_pixels();
        let cloud_percentage = mask.percentage();
        let status = self.status(cloud_percentage);
        debug!(cloud_pixels, total_pixels, "cloud pixels counted");
        info!(cloud_percentage, status = status.as_str(), "cloud coverage");

        Ok(CloudReport {
            cloud_percentage,
            cloud_pixels,
            total_pixels,
            status,
            usable: self.is_usable(cloud_percentage),
            mask,
        })
    }

    pub fn is_usable(&self, cloud_percentage: f64) -> bool {
        cloud_percentage < self.config.cloud_threshold_percent
    }

    pub fn status(&self, cloud_percentage: f64) -> CloudStatus {
        if cloud_percentage < CLEAR_SKY_PERCENT {
            CloudStatus::Clear
        } else if cloud_percentage < self.config.cloud_threshold_percent {
            CloudStatus::Acceptable
        } else {
            CloudStatus::TooCloudy
        }
    }
}

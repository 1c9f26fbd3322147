use std::borrow::Cow;

use image::{Luma, Rgb};
use imageproc::map::{map_colors, map_colors2};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::analysis::preprocessing::resample;
use crate::config::ChangeConfig;
use crate::error::{Error, Result};
use crate::models::{BinaryMask, ChangeMask, DifferenceMap, Image, ValueRange};

/// Below this share of changed pixels the change is minimal.
pub const MINIMAL_CHANGE_PERCENT: f64 = 5.0;
/// At or above this share of changed pixels the change is significant.
pub const SIGNIFICANT_CHANGE_PERCENT: f64 = 20.0;
/// Byte-scale mean shift that makes a colour or brightness change meaningful.
pub const CHANNEL_DELTA_THRESHOLD: f32 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeMagnitude {
    Minimal,
    Moderate,
    Significant,
}

impl ChangeMagnitude {
    pub fn from_percentage(change_percentage: f64) -> Self {
        if change_percentage < MINIMAL_CHANGE_PERCENT {
            ChangeMagnitude::Minimal
        } else if change_percentage < SIGNIFICANT_CHANGE_PERCENT {
            ChangeMagnitude::Moderate
        } else {
            ChangeMagnitude::Significant
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeMagnitude::Minimal => "minimal",
            ChangeMagnitude::Moderate => "moderate",
            ChangeMagnitude::Significant => "significant",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangeReport {
    pub change_percentage: f64,
    pub changed_pixels: usize,
    pub total_pixels: usize,
    pub max_difference: f32,
    pub mean_difference: f32,
    pub magnitude: ChangeMagnitude,
    #[serde(skip)]
    pub mask: ChangeMask,
    #[serde(skip)]
    pub difference: DifferenceMap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    None,
    VegetationLoss,
    Construction,
    WaterIncrease,
    GeneralChange,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::None => "none",
            ChangeType::VegetationLoss => "vegetation_loss",
            ChangeType::Construction => "construction",
            ChangeType::WaterIncrease => "water_increase",
            ChangeType::GeneralChange => "general_change",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ChangeType::None => "No significant changes detected",
            ChangeType::VegetationLoss => "Possible deforestation or land clearing",
            ChangeType::Construction => "Possible new construction or excavation",
            ChangeType::WaterIncrease => "Possible flooding or water accumulation",
            ChangeType::GeneralChange => "Land use change detected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeAnalysis {
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    pub description: &'static str,
    pub changed_pixels: usize,
    /// Mean green shift over changed pixels (after minus before).
    pub green_delta: Option<f32>,
    /// Mean all-channel shift over changed pixels (after minus before).
    pub brightness_delta: Option<f32>,
}

/// Mean colour shift over the changed pixels of an image pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChangeSignal {
    pub green_delta: f32,
    pub brightness_delta: f32,
}

fn vegetation_loss(signal: &ChangeSignal) -> bool {
    signal.green_delta < -CHANNEL_DELTA_THRESHOLD
}

fn construction(signal: &ChangeSignal) -> bool {
    signal.brightness_delta > CHANNEL_DELTA_THRESHOLD
}

fn water_increase(signal: &ChangeSignal) -> bool {
    signal.brightness_delta < -CHANNEL_DELTA_THRESHOLD
}

/// Checked in order, first match wins. Vegetation loss comes first because
/// its chromatic signal is more specific than the brightness-only rules.
const CHANGE_RULES: [(ChangeType, fn(&ChangeSignal) -> bool); 3] = [
    (ChangeType::VegetationLoss, vegetation_loss),
    (ChangeType::Construction, construction),
    (ChangeType::WaterIncrease, water_increase),
];

impl ChangeSignal {
    pub fn classify(&self) -> ChangeType {
        CHANGE_RULES
            .iter()
            .find(|(_, matches)| matches(self))
            .map(|(change_type, _)| *change_type)
            .unwrap_or(ChangeType::GeneralChange)
    }
}

/// Compares two acquisitions of the same area.
#[derive(Debug, Clone, Default)]
pub struct ChangeDetector {
    config: ChangeConfig,
}

impl ChangeDetector {
    pub fn new(change_threshold: f32) -> Self {
        Self::from_config(ChangeConfig { change_threshold })
    }

    pub fn from_config(config: ChangeConfig) -> Self {
        debug!(change_threshold = config.change_threshold, "change detector initialized");
        Self { config }
    }

    pub fn config(&self) -> &ChangeConfig {
        &self.config
    }

    /// Per-pixel change between `before` and `after`.
    ///
    /// `before` is the reference frame: if the sizes differ, `after` is
    /// resampled to match it. Colour pixels use the unweighted mean of the
    /// per-channel absolute differences.
    pub fn detect_changes(&self, before: &Image, after: &Image) -> Result<ChangeReport> {
        let before = before.to_range(ValueRange::Byte);
        let after = align(&before, after)?;

        let plane = if before.channels() == 3 {
            map_colors2(
                &before.to_bgr_buffer()?,
                &after.to_bgr_buffer()?,
                |Rgb(a), Rgb(b)| {
                    let total: f32 = a.iter().zip(b.iter()).map(|(a, b)| (a - b).abs()).sum();
                    Luma([total / 3.0])
                },
            )
        } else {
            map_colors2(
                &before.to_plane_buffer()?,
                &after.to_plane_buffer()?,
                |Luma([a]), Luma([b])| Luma([(a - b).abs()]),
            )
        };

        let threshold = self.config.change_threshold;
        let mask = BinaryMask::from_gray(map_colors(&plane, |Luma([d])| {
            Luma([u8::from(d > threshold)])
        }));
        let difference = DifferenceMap::from_plane(plane);

        let changed_pixels = mask.count();
        let total_pixels = mask.total_pixels();
        let change_percentage = mask.percentage();
        let magnitude = ChangeMagnitude::from_percentage(change_percentage);
        debug!(
            changed_pixels,
            total_pixels,
            max_difference = difference.max(),
            mean_difference = difference.mean(),
            "change statistics"
        );
        info!(change_percentage, magnitude = magnitude.as_str(), "change detected");

        Ok(ChangeReport {
            change_percentage,
            changed_pixels,
            total_pixels,
            max_difference: difference.max(),
            mean_difference: difference.mean(),
            magnitude,
            mask,
            difference,
        })
    }

    /// Guess what kind of change the masked pixels underwent.
    pub fn analyze_change_type(
        &self,
        before: &Image,
        after: &Image,
        change_mask: &ChangeMask,
    ) -> Result<ChangeAnalysis> {
        before.require_channels(3)?;
        after.require_channels(3)?;
        let before = before.to_range(ValueRange::Byte);
        let after = align(&before, after)?;
        if change_mask.dimensions() != before.dimensions() {
            return Err(Error::Shape {
                expected: before.shape(),
                actual: (change_mask.height(), change_mask.width(), 1),
            });
        }

        let mut sum_before = [0.0f64; 3];
        let mut sum_after = [0.0f64; 3];
        let mut changed_pixels = 0usize;
        let pixels = before
            .as_slice()
            .chunks_exact(3)
            .zip(after.as_slice().chunks_exact(3))
            .zip(change_mask.as_gray().as_raw());
        for ((b, a), flag) in pixels {
            if *flag != 1 {
                continue;
            }
            changed_pixels += 1;
            for c in 0..3 {
                sum_before[c] += b[c] as f64;
                sum_after[c] += a[c] as f64;
            }
        }

        if changed_pixels == 0 {
            info!("no significant changes to classify");
            return Ok(ChangeAnalysis {
                change_type: ChangeType::None,
                description: ChangeType::None.description(),
                changed_pixels,
                green_delta: None,
                brightness_delta: None,
            });
        }

        let count = changed_pixels as f64;
        let mean_before = sum_before.map(|s| s / count);
        let mean_after = sum_after.map(|s| s / count);
        let signal = ChangeSignal {
            green_delta: (mean_after[Image::GREEN] - mean_before[Image::GREEN]) as f32,
            brightness_delta: (mean_after.iter().sum::<f64>() / 3.0
                - mean_before.iter().sum::<f64>() / 3.0) as f32,
        };
        let change_type = signal.classify();
        info!(
            change_type = change_type.as_str(),
            green_delta = signal.green_delta,
            brightness_delta = signal.brightness_delta,
            "change classified"
        );

        Ok(ChangeAnalysis {
            change_type,
            description: change_type.description(),
            changed_pixels,
            green_delta: Some(signal.green_delta),
            brightness_delta: Some(signal.brightness_delta),
        })
    }
}

/// `after` in byte range with `before`'s dimensions.
fn align<'a>(before: &Image, after: &'a Image) -> Result<Cow<'a, Image>> {
    if before.channels() != after.channels() {
        return Err(Error::Shape {
            expected: before.shape(),
            actual: after.shape(),
        });
    }
    let after = after.to_range(ValueRange::Byte);
    if after.dimensions() == before.dimensions() {
        return Ok(after);
    }
    warn!(
        before_width = before.width(),
        before_height = before.height(),
        after_width = after.width(),
        after_height = after.height(),
        "image sizes differ, resizing 'after' to match 'before'"
    );
    Ok(Cow::Owned(resample(&after, before.width(), before.height())?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use image::RgbImage;
    use rstest::rstest;

    fn flat(width: u32, height: u32, rgb: [u8; 3]) -> Image {
        Image::from_rgb8(&RgbImage::from_pixel(width, height, Rgb(rgb)))
    }

    #[test]
    fn identical_images_have_no_change() {
        let img = Image::from_rgb8(&RgbImage::from_fn(40, 30, |x, y| {
            Rgb([(x * 6) as u8, (y * 8) as u8, ((x + y) * 3) as u8])
        }));
        let report = ChangeDetector::default().detect_changes(&img, &img).unwrap();
        assert_eq!(report.change_percentage, 0.0);
        assert_eq!(report.mask.count(), 0);
        assert_eq!(report.max_difference, 0.0);
        assert_eq!(report.magnitude, ChangeMagnitude::Minimal);
    }

    #[test]
    fn threshold_is_strict() {
        let before = flat(4, 4, [100, 100, 100]);
        let at = flat(4, 4, [150, 150, 150]);
        let above = flat(4, 4, [151, 151, 151]);
        let detector = ChangeDetector::default();
        assert_eq!(detector.detect_changes(&before, &at).unwrap().changed_pixels, 0);
        assert_eq!(detector.detect_changes(&before, &above).unwrap().changed_pixels, 16);
    }

    #[test]
    fn channels_are_weighted_equally() {
        // Only blue moves by 120: mean difference is 40, under the threshold.
        let before = flat(2, 2, [0, 0, 0]);
        let after = flat(2, 2, [0, 0, 120]);
        let report = ChangeDetector::default().detect_changes(&before, &after).unwrap();
        assert_abs_diff_eq!(report.difference.get(0, 0), 40.0);
        assert_eq!(report.changed_pixels, 0);
    }

    #[test]
    fn grayscale_uses_direct_difference() {
        let before = Image::new(2, 1, 1, ValueRange::Byte, vec![10.0, 10.0]).unwrap();
        let after = Image::new(2, 1, 1, ValueRange::Byte, vec![70.0, 50.0]).unwrap();
        let report = ChangeDetector::default().detect_changes(&before, &after).unwrap();
        assert_eq!(report.difference.as_slice(), &[60.0, 40.0]);
        assert!(report.mask.get(0, 0));
        assert!(!report.mask.get(1, 0));
    }

    #[test]
    fn after_is_resized_to_before() {
        let before = flat(40, 20, [90, 90, 90]);
        let after = flat(80, 40, [90, 90, 90]);
        let report = ChangeDetector::default().detect_changes(&before, &after).unwrap();
        assert_eq!(report.mask.dimensions(), (40, 20));
        assert_eq!(report.changed_pixels, 0);
    }

    #[rstest]
    #[case(97, 61)]
    #[case(33, 17)]
    #[case(150, 151)]
    fn resized_after_at_threshold_is_unchanged(#[case] width: u32, #[case] height: u32) {
        let before = flat(40, 20, [100, 100, 100]);
        let after = flat(width, height, [150, 150, 150]);
        let report = ChangeDetector::default().detect_changes(&before, &after).unwrap();
        assert_eq!(report.max_difference, 50.0);
        assert_eq!(report.changed_pixels, 0);
    }

    #[test]
    fn mixed_ranges_are_compared_in_byte_scale() {
        let before = flat(5, 5, [128, 128, 128]);
        let after = flat(5, 5, [128, 128, 128]).into_range(ValueRange::Unit);
        let report = ChangeDetector::default().detect_changes(&before, &after).unwrap();
        assert_eq!(report.change_percentage, 0.0);
    }

    #[test]
    fn channel_mismatch_is_a_shape_error() {
        let gray = Image::new(2, 2, 1, ValueRange::Byte, vec![0.0; 4]).unwrap();
        let color = flat(2, 2, [0, 0, 0]);
        assert!(matches!(
            ChangeDetector::default().detect_changes(&color, &gray),
            Err(Error::Shape { .. })
        ));
    }

    #[test]
    fn vegetation_loss_wins_over_construction() {
        // green drops by 40 while overall brightness rises by 40
        let before = flat(6, 6, [100, 100, 100]);
        let after = flat(6, 6, [180, 60, 180]);
        let mask = BinaryMask::from_fn(6, 6, |_, _| true);
        let analysis = ChangeDetector::default()
            .analyze_change_type(&before, &after, &mask)
            .unwrap();
        assert_abs_diff_eq!(analysis.green_delta.unwrap(), -40.0, epsilon = 1e-4);
        assert_abs_diff_eq!(analysis.brightness_delta.unwrap(), 40.0, epsilon = 1e-4);
        assert_eq!(analysis.change_type, ChangeType::VegetationLoss);
    }

    #[rstest]
    #[case([100, 100, 100], [140, 140, 140], ChangeType::Construction)]
    #[case([100, 100, 100], [50, 80, 50], ChangeType::WaterIncrease)]
    #[case([100, 100, 100], [120, 110, 90], ChangeType::GeneralChange)]
    #[case([100, 100, 100], [100, 69, 100], ChangeType::VegetationLoss)]
    fn change_types(#[case] before: [u8; 3], #[case] after: [u8; 3], #[case] expected: ChangeType) {
        let mask = BinaryMask::from_fn(3, 3, |_, _| true);
        let analysis = ChangeDetector::default()
            .analyze_change_type(&flat(3, 3, before), &flat(3, 3, after), &mask)
            .unwrap();
        assert_eq!(analysis.change_type, expected);
        assert_eq!(analysis.description, expected.description());
    }

    #[test]
    fn only_masked_pixels_are_classified() {
        let before = flat(4, 4, [100, 100, 100]);
        let after = Image::from_rgb8(&RgbImage::from_fn(4, 4, |x, _| {
            if x == 0 { Rgb([200, 200, 200]) } else { Rgb([0, 0, 0]) }
        }));
        let mask = BinaryMask::from_fn(4, 4, |x, _| x == 0);
        let analysis = ChangeDetector::default()
            .analyze_change_type(&before, &after, &mask)
            .unwrap();
        assert_eq!(analysis.changed_pixels, 4);
        assert_eq!(analysis.change_type, ChangeType::Construction);
    }

    #[test]
    fn empty_mask_means_no_change() {
        let img = flat(4, 4, [10, 20, 30]);
        let analysis = ChangeDetector::default()
            .analyze_change_type(&img, &img, &BinaryMask::zeros(4, 4))
            .unwrap();
        assert_eq!(analysis.change_type, ChangeType::None);
        assert_eq!(analysis.green_delta, None);
    }

    #[test]
    fn mask_must_match_before() {
        let img = flat(4, 4, [10, 20, 30]);
        assert!(matches!(
            ChangeDetector::default().analyze_change_type(&img, &img, &BinaryMask::zeros(3, 4)),
            Err(Error::Shape { .. })
        ));
    }

    #[rstest]
    #[case(4.99, ChangeMagnitude::Minimal)]
    #[case(5.0, ChangeMagnitude::Moderate)]
    #[case(19.99, ChangeMagnitude::Moderate)]
    #[case(20.0, ChangeMagnitude::Significant)]
    fn magnitude_bands(#[case] percentage: f64, #[case] expected: ChangeMagnitude) {
        assert_eq!(ChangeMagnitude::from_percentage(percentage), expected);
    }
}

use std::borrow::Cow;

use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Three-channel `f32` buffer. Samples keep the crate's BGR order even
/// though the container pixel type is `Rgb`.
pub(crate) type BgrBuffer = ImageBuffer<Rgb<f32>, Vec<f32>>;

/// Single-channel `f32` buffer.
pub(crate) type PlaneBuffer = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Numeric range an [`Image`]'s samples are expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueRange {
    /// Integer-like samples in [0, 255].
    Byte,
    /// Floating point samples in [0.0, 1.0].
    Unit,
}

impl ValueRange {
    pub fn max_value(self) -> f32 {
        match self {
            ValueRange::Byte => 255.0,
            ValueRange::Unit => 1.0,
        }
    }

    /// Guess the range of untagged samples: a maximum of at most 1.0 means
    /// unit range.
    ///
    /// This cannot tell an all-black (or very dark) byte image from a unit
    /// image. Such data is reported as `Unit`; callers that know better
    /// should construct an [`Image`] with an explicit range instead.
    pub fn infer(samples: &[f32]) -> Self {
        let max = samples.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        if max <= 1.0 {
            ValueRange::Unit
        } else {
            ValueRange::Byte
        }
    }

    fn convert(self, target: ValueRange, value: f32) -> f32 {
        match (self, target) {
            (ValueRange::Unit, ValueRange::Byte) => (value * 255.0).round(),
            (ValueRange::Byte, ValueRange::Unit) => value / 255.0,
            _ => value,
        }
    }
}

/// An image held as interleaved `f32` samples, tagged with its value range.
///
/// Channel order is fixed for the whole crate: channel 0 is blue, 1 is
/// green and 2 is red. Single-channel (grayscale) images are also allowed.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    width: u32,
    height: u32,
    channels: usize,
    range: ValueRange,
    data: Vec<f32>,
}

impl Image {
    pub const BLUE: usize = 0;
    pub const GREEN: usize = 1;
    pub const RED: usize = 2;

    /// Build an image from raw samples, validating shape and range.
    pub fn new(
        width: u32,
        height: u32,
        channels: usize,
        range: ValueRange,
        data: Vec<f32>,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidFormat(format!(
                "image must not be empty, got {}x{}",
                width, height
            )));
        }
        if channels != 1 && channels != 3 {
            return Err(Error::InvalidFormat(format!(
                "expected 1 or 3 channels, got {}",
                channels
            )));
        }
        let expected = width as usize * height as usize * channels;
        if data.len() != expected {
            return Err(Error::InvalidFormat(format!(
                "expected {} samples for {}x{}x{}, got {}",
                expected,
                height,
                width,
                channels,
                data.len()
            )));
        }
        let max = range.max_value();
        if let Some(bad) = data.iter().find(|v| !v.is_finite() || **v < 0.0 || **v > max) {
            return Err(Error::InvalidFormat(format!(
                "sample {} is outside the {:?} range [0, {}]",
                bad, range, max
            )));
        }

        Ok(Self {
            width,
            height,
            channels,
            range,
            data,
        })
    }

    /// Build an image from untagged samples, inferring the range with
    /// [`ValueRange::infer`].
    pub fn from_raw_inferred(width: u32, height: u32, channels: usize, data: Vec<f32>) -> Result<Self> {
        let range = ValueRange::infer(&data);
        Self::new(width, height, channels, range, data)
    }

    /// Convert a decoded RGB image into a byte-range BGR image.
    pub fn from_rgb8(img: &RgbImage) -> Self {
        let data = img
            .pixels()
            .flat_map(|Rgb([r, g, b])| [*b as f32, *g as f32, *r as f32])
            .collect();
        Self {
            width: img.width(),
            height: img.height(),
            channels: 3,
            range: ValueRange::Byte,
            data,
        }
    }

    /// Convert an 8-bit grayscale image into a byte-range single-channel image.
    pub fn from_luma8(img: &GrayImage) -> Self {
        Self {
            width: img.width(),
            height: img.height(),
            channels: 1,
            range: ValueRange::Byte,
            data: img.as_raw().iter().map(|v| *v as f32).collect(),
        }
    }

    /// Hand the image to an 8-bit consumer (renderers, encoders) in RGB order.
    pub fn to_rgb8(&self) -> Result<RgbImage> {
        self.require_channels(3)?;
        let bytes = self.to_range(ValueRange::Byte);
        let raw = bytes
            .data
            .chunks_exact(3)
            .flat_map(|bgr| [bgr[2], bgr[1], bgr[0]])
            .map(|v| v.round().clamp(0.0, 255.0) as u8)
            .collect();
        RgbImage::from_raw(self.width, self.height, raw)
            .ok_or_else(|| Error::InvalidFormat("sample buffer does not match dimensions".into()))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn range(&self) -> ValueRange {
        self.range
    }

    /// (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// (height, width, channels), the conventional array shape.
    pub fn shape(&self) -> (u32, u32, usize) {
        (self.height, self.width, self.channels)
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Samples of the pixel at column `x`, row `y`.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is outside the image.
    pub fn pixel(&self, x: u32, y: u32) -> &[f32] {
        let start = (y as usize * self.width as usize + x as usize) * self.channels;
        &self.data[start..start + self.channels]
    }

    /// Copy of a single channel as a row-major plane.
    pub fn channel(&self, index: usize) -> Result<Vec<f32>> {
        if index >= self.channels {
            return Err(Error::InvalidFormat(format!(
                "channel {} requested from a {}-channel image",
                index, self.channels
            )));
        }
        Ok(self
            .data
            .iter()
            .skip(index)
            .step_by(self.channels)
            .copied()
            .collect())
    }

    /// This image expressed in `range`, borrowing when no conversion is needed.
    pub fn to_range(&self, range: ValueRange) -> Cow<'_, Image> {
        if self.range == range {
            return Cow::Borrowed(self);
        }
        let from = self.range;
        Cow::Owned(Image {
            data: self.data.iter().map(|v| from.convert(range, *v)).collect(),
            range,
            ..*self
        })
    }

    pub fn into_range(self, range: ValueRange) -> Image {
        if self.range == range {
            return self;
        }
        self.to_range(range).into_owned()
    }

    pub(crate) fn require_channels(&self, channels: usize) -> Result<()> {
        if self.channels != channels {
            return Err(Error::InvalidFormat(format!(
                "expected a {}-channel image, got {} channels",
                channels, self.channels
            )));
        }
        Ok(())
    }

    pub(crate) fn to_bgr_buffer(&self) -> Result<BgrBuffer> {
        self.require_channels(3)?;
        ImageBuffer::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| Error::InvalidFormat("sample buffer does not match dimensions".into()))
    }

    pub(crate) fn to_plane_buffer(&self) -> Result<PlaneBuffer> {
        self.require_channels(1)?;
        ImageBuffer::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| Error::InvalidFormat("sample buffer does not match dimensions".into()))
    }

    /// Rebuild an image from resampled samples that are already known to be
    /// in `range`. Values are clamped to absorb floating point overshoot,
    /// and byte-range samples are rounded back to whole levels.
    pub(crate) fn from_resampled(
        width: u32,
        height: u32,
        channels: usize,
        range: ValueRange,
        data: Vec<f32>,
    ) -> Result<Self> {
        let max = range.max_value();
        let data = data
            .into_iter()
            .map(|v| {
                let v = v.clamp(0.0, max);
                match range {
                    ValueRange::Byte => v.round(),
                    ValueRange::Unit => v,
                }
            })
            .collect();
        Self::new(width, height, channels, range, data)
    }
}

/// A per-pixel 0/1 mask. Used for both change masks and cloud masks.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryMask {
    inner: GrayImage,
}

/// Pixels whose intensity changed beyond the detector threshold.
pub type ChangeMask = BinaryMask;

/// Pixels classified as cloud.
pub type CloudMask = BinaryMask;

impl BinaryMask {
    /// Wrap a grayscale buffer whose pixels are 0 or 1.
    pub(crate) fn from_gray(inner: GrayImage) -> Self {
        Self { inner }
    }

    pub fn zeros(width: u32, height: u32) -> Self {
        Self {
            inner: GrayImage::new(width, height),
        }
    }

    /// Build a mask from a predicate over pixel coordinates.
    pub fn from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> bool) -> Self {
        Self {
            inner: GrayImage::from_fn(width, height, |x, y| Luma([u8::from(f(x, y))])),
        }
    }

    pub fn width(&self) -> u32 {
        self.inner.width()
    }

    pub fn height(&self) -> u32 {
        self.inner.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.inner.dimensions()
    }

    /// # Panics
    ///
    /// Panics if `(x, y)` is outside the mask.
    pub fn get(&self, x: u32, y: u32) -> bool {
        self.inner.get_pixel(x, y)[0] == 1
    }

    /// Number of set pixels.
    pub fn count(&self) -> usize {
        self.inner.as_raw().iter().filter(|v| **v == 1).count()
    }

    pub fn total_pixels(&self) -> usize {
        self.inner.as_raw().len()
    }

    /// Share of set pixels, in percent.
    pub fn percentage(&self) -> f64 {
        let total = self.total_pixels();
        if total == 0 {
            return 0.0;
        }
        100.0 * self.count() as f64 / total as f64
    }

    pub fn as_gray(&self) -> &GrayImage {
        &self.inner
    }

    /// Mask scaled to 0/255 for display.
    pub fn to_gray_image(&self) -> GrayImage {
        GrayImage::from_fn(self.width(), self.height(), |x, y| {
            Luma([if self.get(x, y) { 255 } else { 0 }])
        })
    }
}

/// Channel-averaged absolute difference between two images, byte scale.
#[derive(Debug, Clone, PartialEq)]
pub struct DifferenceMap {
    inner: PlaneBuffer,
}

impl DifferenceMap {
    pub(crate) fn from_plane(inner: PlaneBuffer) -> Self {
        Self { inner }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.inner.dimensions()
    }

    /// # Panics
    ///
    /// Panics if `(x, y)` is outside the raster.
    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.inner.get_pixel(x, y)[0]
    }

    pub fn as_slice(&self) -> &[f32] {
        self.inner.as_raw()
    }

    pub fn max(&self) -> f32 {
        self.inner.as_raw().iter().copied().fold(0.0, f32::max)
    }

    pub fn mean(&self) -> f32 {
        mean(self.inner.as_raw())
    }
}

/// A per-pixel band-ratio index with values in [-1, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralIndex {
    inner: PlaneBuffer,
    min: f32,
    max: f32,
    mean: f32,
}

impl SpectralIndex {
    /// Clip `values` to [-1, 1] and freeze them with their statistics.
    pub(crate) fn from_values(width: u32, height: u32, values: Vec<f32>) -> Result<Self> {
        let values: Vec<f32> = values.into_iter().map(|v| v.clamp(-1.0, 1.0)).collect();
        let min = values.iter().copied().fold(f32::INFINITY, f32::min);
        let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mean = mean(&values);
        let inner = ImageBuffer::from_raw(width, height, values)
            .ok_or_else(|| Error::InvalidFormat("index buffer does not match dimensions".into()))?;
        Ok(Self {
            inner,
            min,
            max,
            mean,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.inner.dimensions()
    }

    /// # Panics
    ///
    /// Panics if `(x, y)` is outside the raster.
    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.inner.get_pixel(x, y)[0]
    }

    pub fn values(&self) -> &[f32] {
        self.inner.as_raw()
    }

    pub fn min(&self) -> f32 {
        self.min
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    pub fn mean(&self) -> f32 {
        self.mean
    }
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let sum: f64 = values.iter().map(|v| *v as f64).sum();
    (sum / values.len() as f64) as f32
}

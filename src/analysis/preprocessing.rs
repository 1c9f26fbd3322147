use std::path::{Path, PathBuf};

use image::ImageReader;
use image::imageops::{self, FilterType};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::PreprocessConfig;
use crate::error::{Error, Result};
use crate::models::{Image, ValueRange};

/// How an image is resampled to a new size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeMethod {
    /// Area averaging; used whenever the source is larger than the target in
    /// either dimension, so downsampling never aliases.
    Area,
    /// Catmull-Rom cubic interpolation; used when enlarging.
    Cubic,
}

impl ResizeMethod {
    pub fn select(from: (u32, u32), to: (u32, u32)) -> Self {
        if from.0 > to.0 || from.1 > to.1 {
            ResizeMethod::Area
        } else {
            ResizeMethod::Cubic
        }
    }
}

/// Loads image files and brings them into the canonical square, unit-range
/// form the detectors consume.
#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    config: PreprocessConfig,
}

impl ImagePreprocessor {
    pub fn new(target_size: u32) -> Result<Self> {
        Self::from_config(PreprocessConfig { target_size })
    }

    pub fn from_config(config: PreprocessConfig) -> Result<Self> {
        if config.target_size == 0 {
            return Err(Error::InvalidFormat("target size must be positive".into()));
        }
        debug!(target_size = config.target_size, "image preprocessor initialized");
        Ok(Self { config })
    }

    pub fn target_size(&self) -> u32 {
        self.config.target_size
    }

    /// Read an image file as a byte-range, 3-channel BGR image.
    ///
    /// The format is sniffed from the file contents, so a misnamed file
    /// still decodes.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<Image> {
        let path = path.as_ref();
        let not_found = || Error::NotFound {
            path: path.to_path_buf(),
        };

        if !path.is_file() {
            return Err(not_found());
        }
        let reader = ImageReader::open(path)
            .and_then(|reader| reader.with_guessed_format())
            .map_err(|_| not_found())?;
        let decoded = reader.decode().map_err(|source| Error::Decode {
            path: path.to_path_buf(),
            source,
        })?;

        let image = Image::from_rgb8(&decoded.to_rgb8());
        debug!(
            path = %path.display(),
            width = image.width(),
            height = image.height(),
            "image loaded"
        );
        Ok(image)
    }

    /// Scale to `target_size x target_size`, keeping channel count and range.
    pub fn resize(&self, image: &Image) -> Result<Image> {
        let size = self.config.target_size;
        resample(image, size, size)
    }

    /// Map a byte-range image to unit range.
    ///
    /// Unit-range input is rejected rather than divided again.
    pub fn normalize(&self, image: Image) -> Result<Image> {
        if image.range() == ValueRange::Unit {
            return Err(Error::AlreadyNormalized);
        }
        Ok(image.into_range(ValueRange::Unit))
    }

    /// load, resize and normalize, stopping at the first failure.
    pub fn preprocess(&self, path: impl AsRef<Path>) -> Result<Image> {
        let loaded = self.load(path)?;
        let resized = self.resize(&loaded)?;
        self.normalize(resized)
    }

    /// Preprocess every path in parallel.
    ///
    /// Paths that fail are recorded and skipped. The batch only fails when no
    /// path could be preprocessed.
    pub fn preprocess_batch<P>(&self, paths: &[P]) -> Result<PreprocessedBatch>
    where
        P: AsRef<Path> + Sync,
    {
        let results: Vec<(PathBuf, Result<Image>)> = paths
            .par_iter()
            .map(|path| (path.as_ref().to_path_buf(), self.preprocess(path)))
            .collect();

        let mut batch = PreprocessedBatch::default();
        for (path, result) in results {
            match result {
                Ok(image) => batch.images.push((path, image)),
                Err(error) => {
                    warn!(path = %path.display(), %error, "skipping image");
                    batch.failures.push(BatchFailure { path, error });
                }
            }
        }

        if batch.images.is_empty() {
            return Err(Error::EmptyBatch {
                failed: batch.failures.len(),
            });
        }

        info!(
            processed = batch.images.len(),
            skipped = batch.skipped(),
            "batch preprocessed"
        );
        Ok(batch)
    }
}

/// Outcome of [`ImagePreprocessor::preprocess_batch`], in input order.
#[derive(Debug, Default)]
pub struct PreprocessedBatch {
    pub images: Vec<(PathBuf, Image)>,
    pub failures: Vec<BatchFailure>,
}

impl PreprocessedBatch {
    pub fn skipped(&self) -> usize {
        self.failures.len()
    }

    pub fn into_images(self) -> Vec<Image> {
        self.images.into_iter().map(|(_, image)| image).collect()
    }
}

#[derive(Debug)]
pub struct BatchFailure {
    pub path: PathBuf,
    pub error: Error,
}

/// Resample `image` to `width x height` with the method [`ResizeMethod::select`]
/// picks for the pair of sizes.
pub(crate) fn resample(image: &Image, width: u32, height: u32) -> Result<Image> {
    if image.dimensions() == (width, height) {
        return Ok(image.clone());
    }

    let method = ResizeMethod::select(image.dimensions(), (width, height));
    debug!(
        from_width = image.width(),
        from_height = image.height(),
        width,
        height,
        ?method,
        "resampling"
    );
    let data = match method {
        ResizeMethod::Area => area_resample(image, width, height),
        ResizeMethod::Cubic => cubic_resample(image, width, height)?,
    };
    Image::from_resampled(width, height, image.channels(), image.range(), data)
}

/// Source pixels and weights covering each destination pixel along one axis.
fn area_taps(src: u32, dst: u32) -> Vec<Vec<(usize, f32)>> {
    let scale = src as f64 / dst as f64;
    (0..dst)
        .map(|i| {
            let start = i as f64 * scale;
            let end = (start + scale).min(src as f64);
            let span = end - start;
            let first = start.floor() as usize;
            let last = (end.ceil() as usize).min(src as usize);
            (first..last)
                .filter_map(|s| {
                    let overlap = end.min(s as f64 + 1.0) - start.max(s as f64);
                    (overlap > 0.0).then_some((s, (overlap / span) as f32))
                })
                .collect()
        })
        .collect()
}

fn area_resample(image: &Image, width: u32, height: u32) -> Vec<f32> {
    let channels = image.channels();
    let src = image.as_slice();
    let src_row = image.width() as usize * channels;
    let dst_row = width as usize * channels;
    let x_taps = area_taps(image.width(), width);
    let y_taps = area_taps(image.height(), height);

    // Horizontal pass: every source row shrunk to the new width.
    let mut rows = vec![0.0f32; image.height() as usize * dst_row];
    for (src_line, dst_line) in src.chunks_exact(src_row).zip(rows.chunks_exact_mut(dst_row)) {
        for (out, taps) in dst_line.chunks_exact_mut(channels).zip(&x_taps) {
            for &(sx, weight) in taps {
                let px = &src_line[sx * channels..(sx + 1) * channels];
                for (o, p) in out.iter_mut().zip(px) {
                    *o += p * weight;
                }
            }
        }
    }

    let mut out = vec![0.0f32; height as usize * dst_row];
    for (dst_line, taps) in out.chunks_exact_mut(dst_row).zip(&y_taps) {
        for &(sy, weight) in taps {
            let line = &rows[sy * dst_row..(sy + 1) * dst_row];
            for (o, p) in dst_line.iter_mut().zip(line) {
                *o += p * weight;
            }
        }
    }
    out
}

fn cubic_resample(image: &Image, width: u32, height: u32) -> Result<Vec<f32>> {
    // The f32 resampler clamps to [0, 1], so work in unit range.
    let unit = image.to_range(ValueRange::Unit);
    let resized = match image.channels() {
        3 => imageops::resize(&unit.to_bgr_buffer()?, width, height, FilterType::CatmullRom)
            .into_raw(),
        _ => imageops::resize(&unit.to_plane_buffer()?, width, height, FilterType::CatmullRom)
            .into_raw(),
    };
    let scale = image.range().max_value();
    Ok(resized.into_iter().map(|v| v * scale).collect())
}

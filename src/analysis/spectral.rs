//! Band-ratio indices computed from RGB imagery.
//!
//! True NDVI and NDWI need a near-infrared band. For plain RGB input the NIR
//! band is simulated: NDVI substitutes the green channel and NDWI the red
//! channel. The results are useful as relative signals only.

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::{Image, SpectralIndex, ValueRange};

/// Added to every denominator so black pixels produce 0 instead of NaN.
pub const EPSILON: f32 = 1e-10;

/// Reading of a mean NDVI value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VegetationClass {
    DenseVegetation,
    Moderate,
    BareSoil,
    WaterCloudSnow,
}

impl VegetationClass {
    pub fn from_mean(mean: f32) -> Self {
        if mean > 0.6 {
            VegetationClass::DenseVegetation
        } else if mean > 0.2 {
            VegetationClass::Moderate
        } else if mean > -0.1 {
            VegetationClass::BareSoil
        } else {
            VegetationClass::WaterCloudSnow
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            VegetationClass::DenseVegetation => "Dense vegetation",
            VegetationClass::Moderate => "Moderate vegetation",
            VegetationClass::BareSoil => "Bare soil or sparse vegetation",
            VegetationClass::WaterCloudSnow => "Water, clouds or snow",
        }
    }
}

/// Reading of a mean NDWI value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WaterClass {
    Water,
    Land,
    DryBare,
}

impl WaterClass {
    pub fn from_mean(mean: f32) -> Self {
        if mean > 0.3 {
            WaterClass::Water
        } else if mean > -0.3 {
            WaterClass::Land
        } else {
            WaterClass::DryBare
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            WaterClass::Water => "Water bodies present",
            WaterClass::Land => "Vegetation or land",
            WaterClass::DryBare => "Dry or bare land",
        }
    }
}

/// Statistics of an index raster plus its interpretation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IndexSummary<C> {
    pub min: f32,
    pub max: f32,
    pub mean: f32,
    pub class: C,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SpectralIndexCalculator;

impl SpectralIndexCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Split a colour image into byte-scale `(red, green, blue)` planes.
    pub fn extract_bands(&self, image: &Image) -> Result<(Vec<f32>, Vec<f32>, Vec<f32>)> {
        image.require_channels(3)?;
        let bytes = image.to_range(ValueRange::Byte);
        Ok((
            bytes.channel(Image::RED)?,
            bytes.channel(Image::GREEN)?,
            bytes.channel(Image::BLUE)?,
        ))
    }

    /// `(nir - red) / (nir + red)`, clipped to [-1, 1].
    ///
    /// `nir_band` must be a single-channel image with the same dimensions as
    /// `image`. Without it the green channel stands in for NIR.
    pub fn ndvi(&self, image: &Image, nir_band: Option<&Image>) -> Result<SpectralIndex> {
        let (red, green, _) = self.extract_bands(image)?;
        let nir = match nir_band {
            Some(band) => {
                if band.channels() != 1 || band.dimensions() != image.dimensions() {
                    return Err(Error::InvalidFormat(format!(
                        "NIR band must be {}x{}x1, got {}x{}x{}",
                        image.height(),
                        image.width(),
                        band.height(),
                        band.width(),
                        band.channels()
                    )));
                }
                debug!("using supplied NIR band");
                band.to_range(ValueRange::Byte).channel(0)?
            }
            None => {
                debug!("simulating NIR with the green channel");
                green
            }
        };

        let ndvi = normalized_difference(image.dimensions(), &nir, &red)?;
        info!(
            min = ndvi.min(),
            max = ndvi.max(),
            mean = ndvi.mean(),
            class = VegetationClass::from_mean(ndvi.mean()).description(),
            "NDVI"
        );
        Ok(ndvi)
    }

    /// `(green - nir) / (green + nir)` with the red channel standing in for
    /// NIR, clipped to [-1, 1].
    pub fn ndwi(&self, image: &Image) -> Result<SpectralIndex> {
        let (red, green, _) = self.extract_bands(image)?;
        debug!("simulating NIR with the red channel");

        let ndwi = normalized_difference(image.dimensions(), &green, &red)?;
        info!(
            min = ndwi.min(),
            max = ndwi.max(),
            mean = ndwi.mean(),
            class = WaterClass::from_mean(ndwi.mean()).description(),
            "NDWI"
        );
        Ok(ndwi)
    }

    pub fn summarize_ndvi(&self, ndvi: &SpectralIndex) -> IndexSummary<VegetationClass> {
        IndexSummary {
            min: ndvi.min(),
            max: ndvi.max(),
            mean: ndvi.mean(),
            class: VegetationClass::from_mean(ndvi.mean()),
        }
    }

    pub fn summarize_ndwi(&self, ndwi: &SpectralIndex) -> IndexSummary<WaterClass> {
        IndexSummary {
            min: ndwi.min(),
            max: ndwi.max(),
            mean: ndwi.mean(),
            class: WaterClass::from_mean(ndwi.mean()),
        }
    }
}

fn normalized_difference((width, height): (u32, u32), a: &[f32], b: &[f32]) -> Result<SpectralIndex> {
    let values = a
        .iter()
        .zip(b)
        .map(|(a, b)| (a - b) / (a + b + EPSILON))
        .collect();
    SpectralIndex::from_values(width, height, values)
}

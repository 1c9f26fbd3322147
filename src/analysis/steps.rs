use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::analysis::{ChangeDetector, CloudDetector, SpectralIndexCalculator};
use crate::pipeline::{keys, MetadataValue, PipelineContext, PipelineStep, SceneData};

/// Score cloud cover and mark (or drop) scenes that are too cloudy
pub struct CloudGateStep {
    pub detector: CloudDetector,
    pub drop_unusable: bool,
}

impl PipelineStep for CloudGateStep {
    fn process(&self, data: Vec<SceneData>, _context: &PipelineContext) -> Result<Vec<SceneData>> {
        let mut result = Vec::new();

        for mut scene in data {
            if !scene.is_usable() {
                result.push(scene);
                continue;
            }

            let report = self
                .detector
                .detect(&scene.image)
                .with_context(|| format!("cloud detection failed for {}", scene.label))?;

            scene.insert(keys::CLOUD_PERCENTAGE, MetadataValue::Float(report.cloud_percentage));
            scene.insert(keys::CLOUD_STATUS, MetadataValue::String(report.status.as_str().to_string()));
            scene.insert(keys::USABLE, MetadataValue::Bool(report.usable));

            if !report.usable {
                warn!(
                    scene = %scene.label,
                    cloud_percentage = report.cloud_percentage,
                    "too cloudy for analysis"
                );
                if self.drop_unusable {
                    continue;
                }
            }
            result.push(scene);
        }

        Ok(result)
    }

    fn name(&self) -> &str {
        "Cloud Gate"
    }
}

/// Summarize NDVI and NDWI for each usable scene
pub struct SpectralIndexStep {
    pub calculator: SpectralIndexCalculator,
}

impl PipelineStep for SpectralIndexStep {
    fn process(&self, data: Vec<SceneData>, _context: &PipelineContext) -> Result<Vec<SceneData>> {
        let mut result = Vec::new();

        for mut scene in data {
            if scene.is_usable() {
                let ndvi = self
                    .calculator
                    .ndvi(&scene.image, None)
                    .with_context(|| format!("NDVI failed for {}", scene.label))?;
                let ndwi = self
                    .calculator
                    .ndwi(&scene.image)
                    .with_context(|| format!("NDWI failed for {}", scene.label))?;
                let ndvi = self.calculator.summarize_ndvi(&ndvi);
                let ndwi = self.calculator.summarize_ndwi(&ndwi);

                scene.insert(keys::NDVI_MEAN, MetadataValue::Float(ndvi.mean as f64));
                scene.insert(keys::NDVI_CLASS, MetadataValue::String(ndvi.class.description().to_string()));
                scene.insert(keys::NDWI_MEAN, MetadataValue::Float(ndwi.mean as f64));
                scene.insert(keys::NDWI_CLASS, MetadataValue::String(ndwi.class.description().to_string()));
            }
            result.push(scene);
        }

        Ok(result)
    }

    fn name(&self) -> &str {
        "Spectral Indices"
    }
}

/// Compare each usable scene against its reference image
pub struct ChangeDetectionStep {
    pub detector: ChangeDetector,
}

impl PipelineStep for ChangeDetectionStep {
    fn process(&self, data: Vec<SceneData>, _context: &PipelineContext) -> Result<Vec<SceneData>> {
        let mut result = Vec::new();

        for mut scene in data {
            let reference = match scene.reference.clone() {
                Some(reference) if scene.is_usable() => reference,
                _ => {
                    debug!(scene = %scene.label, "no change detection");
                    result.push(scene);
                    continue;
                }
            };

            let report = self
                .detector
                .detect_changes(&reference, &scene.image)
                .with_context(|| format!("change detection failed for {}", scene.label))?;
            let analysis = self
                .detector
                .analyze_change_type(&reference, &scene.image, &report.mask)
                .with_context(|| format!("change classification failed for {}", scene.label))?;

            scene.insert(keys::CHANGE_PERCENTAGE, MetadataValue::Float(report.change_percentage));
            scene.insert(keys::CHANGE_MAGNITUDE, MetadataValue::String(report.magnitude.as_str().to_string()));
            scene.insert(keys::CHANGED_PIXELS, MetadataValue::Int(report.changed_pixels as i64));
            scene.insert(keys::CHANGE_TYPE, MetadataValue::String(analysis.change_type.as_str().to_string()));
            scene.insert(keys::CHANGE_DESCRIPTION, MetadataValue::String(analysis.description.to_string()));
            if let Some(delta) = analysis.green_delta {
                scene.insert(keys::GREEN_DELTA, MetadataValue::Float(delta as f64));
            }
            if let Some(delta) = analysis.brightness_delta {
                scene.insert(keys::BRIGHTNESS_DELTA, MetadataValue::Float(delta as f64));
            }
            result.push(scene);
        }

        Ok(result)
    }

    fn name(&self) -> &str {
        "Change Detection"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Image;
    use image::{Rgb, RgbImage};

    fn flat(rgb: [u8; 3]) -> Image {
        Image::from_rgb8(&RgbImage::from_pixel(10, 10, Rgb(rgb)))
    }

    fn gate(drop_unusable: bool) -> CloudGateStep {
        CloudGateStep {
            detector: CloudDetector::default(),
            drop_unusable,
        }
    }

    #[test]
    fn cloud_gate_marks_cloudy_scenes() {
        let scenes = vec![
            SceneData::new("clear", flat([40, 120, 40])),
            SceneData::new("cloudy", flat([250, 250, 250])),
        ];
        let out = gate(false).process(scenes, &PipelineContext::default()).unwrap();
        assert_eq!(out.len(), 2);
        assert!(out[0].is_usable());
        assert_eq!(out[0].get_string(keys::CLOUD_STATUS), Some("clear"));
        assert!(!out[1].is_usable());
        assert_eq!(out[1].get_float(keys::CLOUD_PERCENTAGE), Some(100.0));
    }

    #[test]
    fn cloud_gate_can_drop_cloudy_scenes() {
        let scenes = vec![
            SceneData::new("clear", flat([40, 120, 40])),
            SceneData::new("cloudy", flat([250, 250, 250])),
        ];
        let out = gate(true).process(scenes, &PipelineContext::default()).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].label, "clear");
    }

    #[test]
    fn unusable_scenes_are_skipped() {
        let scene = SceneData::new("cloudy", flat([250, 250, 250]))
            .with_metadata(keys::USABLE, MetadataValue::Bool(false))
            .with_reference(flat([0, 0, 0]));
        let step = ChangeDetectionStep {
            detector: ChangeDetector::default(),
        };
        let out = step.process(vec![scene], &PipelineContext::default()).unwrap();
        assert_eq!(out[0].get_string(keys::CHANGE_TYPE), None);
    }

    #[test]
    fn change_step_needs_a_reference() {
        let step = ChangeDetectionStep {
            detector: ChangeDetector::default(),
        };
        let out = step
            .process(vec![SceneData::new("solo", flat([1, 2, 3]))], &PipelineContext::default())
            .unwrap();
        assert!(out[0].metadata.is_empty());
    }

    #[test]
    fn change_step_records_classification() {
        let scene = SceneData::new("after", flat([140, 140, 140])).with_reference(flat([100, 100, 100]));
        let step = ChangeDetectionStep {
            detector: ChangeDetector::new(30.0),
        };
        let out = step.process(vec![scene], &PipelineContext::default()).unwrap();
        assert_eq!(out[0].get_float(keys::CHANGE_PERCENTAGE), Some(100.0));
        assert_eq!(out[0].get_string(keys::CHANGE_TYPE), Some("construction"));
        assert_eq!(out[0].get_int(keys::CHANGED_PIXELS), Some(100));
    }

    #[test]
    fn spectral_step_records_indices() {
        let step = SpectralIndexStep {
            calculator: SpectralIndexCalculator::new(),
        };
        let out = step
            .process(vec![SceneData::new("veg", flat([50, 200, 10]))], &PipelineContext::default())
            .unwrap();
        let mean = out[0].get_float(keys::NDVI_MEAN).unwrap();
        assert!((mean - 0.6).abs() < 1e-6);
        assert_eq!(out[0].get_string(keys::NDVI_CLASS), Some("Moderate vegetation"));
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info};

use crate::models::Image;

/// Data that flows through the pipeline.
/// Each SceneData is one acquisition plus whatever the steps learned about it.
#[derive(Debug, Clone)]
pub struct SceneData {
    /// Human-readable name, usually the source path
    pub label: String,

    /// The scene under analysis (the "after" image for change detection)
    pub image: Image,

    /// Earlier acquisition of the same area, shared via Arc
    pub reference: Option<Arc<Image>>,

    /// Results recorded by steps (e.g. "cloud_percentage", "ndvi_mean")
    pub metadata: HashMap<String, MetadataValue>,
}

/// Metadata value types
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Float(f64),
    String(String),
    Int(i64),
}

/// Metadata keys written by the built-in steps.
pub mod keys {
    pub const USABLE: &str = "usable";
    pub const CLOUD_PERCENTAGE: &str = "cloud_percentage";
    pub const CLOUD_STATUS: &str = "cloud_status";
    pub const NDVI_MEAN: &str = "ndvi_mean";
    pub const NDVI_CLASS: &str = "ndvi_class";
    pub const NDWI_MEAN: &str = "ndwi_mean";
    pub const NDWI_CLASS: &str = "ndwi_class";
    pub const CHANGE_PERCENTAGE: &str = "change_percentage";
    pub const CHANGE_MAGNITUDE: &str = "change_magnitude";
    pub const CHANGED_PIXELS: &str = "changed_pixels";
    pub const CHANGE_TYPE: &str = "change_type";
    pub const CHANGE_DESCRIPTION: &str = "change_description";
    pub const GREEN_DELTA: &str = "green_delta";
    pub const BRIGHTNESS_DELTA: &str = "brightness_delta";
}

impl SceneData {
    pub fn new(label: impl Into<String>, image: Image) -> Self {
        Self {
            label: label.into(),
            image,
            reference: None,
            metadata: HashMap::new(),
        }
    }

    /// Attach the earlier acquisition used for change detection
    pub fn with_reference(mut self, reference: impl Into<Arc<Image>>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    /// Add metadata
    pub fn with_metadata(mut self, key: impl Into<String>, value: MetadataValue) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn insert(&mut self, key: &str, value: MetadataValue) {
        self.metadata.insert(key.to_string(), value);
    }

    /// Get metadata as bool
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.metadata.get(key) {
            Some(MetadataValue::Bool(v)) => Some(*v),
            _ => None,
        }
    }

    /// Get metadata as float
    pub fn get_float(&self, key: &str) -> Option<f64> {
        match self.metadata.get(key) {
            Some(MetadataValue::Float(v)) => Some(*v),
            _ => None,
        }
    }

    /// Get metadata as string
    pub fn get_string(&self, key: &str) -> Option<&str> {
        match self.metadata.get(key) {
            Some(MetadataValue::String(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Get metadata as integer
    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.metadata.get(key) {
            Some(MetadataValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    /// Scenes count as usable until a step says otherwise
    pub fn is_usable(&self) -> bool {
        self.get_bool(keys::USABLE).unwrap_or(true)
    }
}

/// Context available to all pipeline steps
#[derive(Debug, Clone, Default)]
pub struct PipelineContext {
    pub verbose: bool,
}

/// Trait that all pipeline steps must implement
pub trait PipelineStep: Send + Sync {
    /// Process scenes and return the transformed set.
    /// Steps can annotate scenes or filter them out.
    fn process(&self, data: Vec<SceneData>, context: &PipelineContext) -> Result<Vec<SceneData>>;

    /// Human-readable name for this step (used in verbose output)
    fn name(&self) -> &str;
}

/// Composable pipeline builder
pub struct Pipeline {
    steps: Vec<Arc<dyn PipelineStep>>,
    context: PipelineContext,
}

impl Pipeline {
    /// Create a new empty pipeline
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            context: PipelineContext::default(),
        }
    }

    /// Enable verbose output
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.context.verbose = verbose;
        self
    }

    /// Add a processing step to the pipeline
    pub fn add_step(mut self, step: Arc<dyn PipelineStep>) -> Self {
        self.steps.push(step);
        self
    }

    /// Helper method to add a step from a Box (for convenience)
    pub fn add_step_boxed(mut self, step: Box<dyn PipelineStep>) -> Self {
        self.steps.push(Arc::from(step));
        self
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.name()).collect()
    }

    /// Run every step in order over the given scenes
    pub fn run(&self, scenes: Vec<SceneData>) -> Result<Vec<SceneData>> {
        let mut data = scenes;

        for step in &self.steps {
            if self.context.verbose {
                info!(step = step.name(), scenes = data.len(), "running step");
            } else {
                debug!(step = step.name(), scenes = data.len(), "running step");
            }

            data = step.process(data, &self.context)?;

            debug!(step = step.name(), remaining = data.len(), "step finished");
        }

        Ok(data)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ValueRange;

    struct DropEverySecond;

    impl PipelineStep for DropEverySecond {
        fn process(&self, data: Vec<SceneData>, _context: &PipelineContext) -> Result<Vec<SceneData>> {
            Ok(data.into_iter().step_by(2).collect())
        }

        fn name(&self) -> &str {
            "Drop Every Second"
        }
    }

    struct Tag(&'static str);

    impl PipelineStep for Tag {
        fn process(&self, data: Vec<SceneData>, _context: &PipelineContext) -> Result<Vec<SceneData>> {
            Ok(data
                .into_iter()
                .map(|scene| scene.with_metadata(self.0, MetadataValue::Bool(true)))
                .collect())
        }

        fn name(&self) -> &str {
            self.0
        }
    }

    fn scene(label: &str) -> SceneData {
        let image = Image::new(1, 1, 1, ValueRange::Byte, vec![0.0]).unwrap();
        SceneData::new(label, image)
    }

    #[test]
    fn steps_run_in_order() {
        let pipeline = Pipeline::new()
            .add_step_boxed(Box::new(DropEverySecond))
            .add_step(Arc::new(Tag("seen")));
        assert_eq!(pipeline.step_names(), vec!["Drop Every Second", "seen"]);

        let out = pipeline
            .run(vec![scene("a"), scene("b"), scene("c")])
            .unwrap();
        let labels: Vec<_> = out.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["a", "c"]);
        assert!(out.iter().all(|s| s.get_bool("seen") == Some(true)));
    }

    #[test]
    fn empty_pipeline_is_identity() {
        let out = Pipeline::default().run(vec![scene("only")]).unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0].metadata.is_empty());
    }

    #[test]
    fn typed_getters_ignore_other_variants() {
        let s = scene("x")
            .with_metadata("f", MetadataValue::Float(1.5))
            .with_metadata("n", MetadataValue::Int(3));
        assert_eq!(s.get_float("f"), Some(1.5));
        assert_eq!(s.get_int("n"), Some(3));
        assert_eq!(s.get_bool("f"), None);
        assert_eq!(s.get_string("missing"), None);
        assert!(s.is_usable());
    }
}

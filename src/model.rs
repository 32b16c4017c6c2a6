//! Differentiable model interface over a frozen network.
//!
//! The core never reimplements or modifies the classification network; it
//! consumes anything satisfying [`InspectableModel`]: forward evaluation over
//! an image tensor, plus instrumentation of named layers via taps.
//!
//! [`LayeredModel`] is the provided implementation: an ordered pipeline of
//! named [`candle_nn::Module`] stages registered once at construction — a
//! typed lookup table, not runtime reflection. Unknown layer names fail
//! `attach` with [`VizError::LayerNotFound`] before any iteration runs.
//!
//! Freezing is structural: stages are expected to hold plain [`Tensor`]
//! weights rather than `Var`s, and candle only accumulates gradients into
//! `Var`s. A model built from constant tensors cannot receive weight updates
//! no matter what the optimizer does.

use candle_core::Tensor;
use candle_nn::Module;

use crate::error::{Result, VizError};
use crate::tap::{TapHandle, TapRegistry};

/// Capability contract for a frozen, instrumentable network.
///
/// `forward` evaluates the network on an image batch and, as a documented
/// side effect, publishes every instrumented layer's output to its attached
/// tap. `attach` resolves a layer name to a [`TapHandle`] or fails fast.
pub trait InspectableModel {
    /// Run a forward pass. Attached taps observe their layer's output.
    ///
    /// # Errors
    ///
    /// Returns an error if any stage's forward computation fails.
    fn forward(&self, image: &Tensor) -> Result<Tensor>;

    /// Attach instrumentation to the named layer.
    ///
    /// # Errors
    ///
    /// Returns [`VizError::LayerNotFound`] if the name does not resolve to a
    /// registered layer.
    fn attach(&self, layer: &str) -> Result<TapHandle>;

    /// Names of all instrumentable layers, in forward order.
    fn layer_names(&self) -> Vec<&str>;
}

struct Stage {
    name: String,
    module: Box<dyn Module>,
}

/// A frozen network as an ordered pipeline of named stages.
///
/// # Example
///
/// ```
/// use candle_core::{DType, Device, Tensor};
/// use candle_nn::Linear;
/// use featviz_rs::{InspectableModel, LayeredModel};
///
/// # fn main() -> featviz_rs::Result<()> {
/// let device = Device::Cpu;
/// // Constant-tensor weights: the layer is frozen by construction.
/// let weight = Tensor::ones((2, 3), DType::F32, &device)?;
/// let model = LayeredModel::new().push("fc", Box::new(Linear::new(weight, None)))?;
///
/// assert_eq!(model.layer_names(), vec!["fc"]);
/// assert!(model.attach("missing").is_err());
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct LayeredModel {
    stages: Vec<Stage>,
    taps: TapRegistry,
}

impl LayeredModel {
    /// Create an empty model.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            taps: TapRegistry::new(),
        }
    }

    /// Append a named stage.
    ///
    /// # Errors
    ///
    /// Returns [`VizError::Model`] if a stage with the same name is already
    /// registered (layer names must resolve to exactly one site).
    pub fn push(mut self, name: impl Into<String>, module: Box<dyn Module>) -> Result<Self> {
        let name = name.into();
        if self.stages.iter().any(|stage| stage.name == name) {
            return Err(VizError::Model(format!(
                "duplicate layer name `{name}`: layer names must be unique"
            )));
        }
        self.stages.push(Stage { name, module });
        Ok(self)
    }

    /// Number of registered stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether the model has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl InspectableModel for LayeredModel {
    fn forward(&self, image: &Tensor) -> Result<Tensor> {
        let mut xs = image.clone();
        for stage in &self.stages {
            xs = stage.module.forward(&xs)?;
            self.taps.record(&stage.name, &xs);
        }
        Ok(xs)
    }

    fn attach(&self, layer: &str) -> Result<TapHandle> {
        if !self.stages.iter().any(|stage| stage.name == layer) {
            return Err(VizError::LayerNotFound(layer.to_string()));
        }
        Ok(TapHandle::new(layer.to_string(), self.taps.register(layer)))
    }

    fn layer_names(&self) -> Vec<&str> {
        self.stages.iter().map(|stage| stage.name.as_str()).collect()
    }
}

/// ReLU activation stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct Relu;

impl Module for Relu {
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        xs.relu()
    }
}

/// Flattens everything after the batch dimension, turning a convolutional
/// activation `(N, C, H, W)` into a fully-connected input `(N, C*H*W)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Flatten;

impl Module for Flatten {
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        xs.flatten_from(1)
    }
}

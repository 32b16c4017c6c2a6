//! The activation-maximization loop.
//!
//! Drives repeated forward/backward passes through a frozen model, reading
//! the tapped activation through a [`ChannelObjective`] and ascending the
//! image pixels with Adam. The image is the only `Var` the optimizer ever
//! sees: gradients computed on the stochastically transformed copy flow back
//! through the differentiable pipeline into the original pixel buffer, and
//! the transformed copy itself is never updated.

use std::sync::atomic::{AtomicBool, Ordering};

use candle_core::{Tensor, Var};
use candle_nn::{AdamW, Optimizer, ParamsAdamW};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::MaximizeConfig;
use crate::error::{Result, VizError};
use crate::model::InspectableModel;
use crate::objective::ChannelObjective;
use crate::transform::TransformPipeline;

/// Synthesize an image that maximally activates one channel of one layer.
///
/// Mutates `image` in place across iterations and returns the final pixel
/// tensor. The output shape always equals the input shape. Pixel values are
/// unconstrained reals during optimization; clamping to a display range is a
/// presentation concern.
///
/// Pass [`TransformPipeline::identity`] for the no-transform variant — it is
/// fully supported and simply produces noisier, higher-frequency results.
///
/// # Example
///
/// ```no_run
/// use candle_core::{Device, Tensor, Var};
/// use featviz_rs::{maximize, LayeredModel, MaximizeConfig, TransformPipeline};
///
/// # fn main() -> featviz_rs::Result<()> {
/// # let model = LayeredModel::new();
/// let device = Device::Cpu;
/// let seed = Tensor::randn(0.5f32, 0.1, (1, 3, 224, 224), &device)?;
/// let image = Var::from_tensor(&seed)?;
///
/// let pipeline = TransformPipeline::standard(8, 45.0, (0.9, 1.2));
/// let config = MaximizeConfig::default().with_iterations(100).with_seed(0);
/// let result = maximize(&model, &image, "mixed4a", 11, &pipeline, &config)?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// - [`VizError::Config`] for an invalid configuration;
/// - [`VizError::LayerNotFound`] before any iteration if `layer` does not
///   resolve;
/// - [`VizError::ChannelIndexOutOfRange`] on the first objective evaluation;
/// - [`VizError::NonFiniteLoss`] if the objective goes NaN or infinite;
/// - [`VizError::Candle`] for tensor-op failures.
///
/// On every exit path, success or failure, the instrumentation tap is
/// released before returning.
pub fn maximize<M: InspectableModel>(
    model: &M,
    image: &Var,
    layer: &str,
    channel: usize,
    pipeline: &TransformPipeline,
    config: &MaximizeConfig,
) -> Result<Tensor> {
    let cancel = AtomicBool::new(false);
    maximize_with_cancel(model, image, layer, channel, pipeline, config, &cancel)
}

/// [`maximize`] with cooperative cancellation.
///
/// `cancel` is checked between iterations; each iteration is a full
/// forward+backward pass and can be costly. Cancellation is a clean early
/// stop, not a failure: the image as mutated so far is returned.
///
/// # Errors
///
/// Same as [`maximize`].
#[allow(clippy::too_many_arguments)]
pub fn maximize_with_cancel<M: InspectableModel>(
    model: &M,
    image: &Var,
    layer: &str,
    channel: usize,
    pipeline: &TransformPipeline,
    config: &MaximizeConfig,
    cancel: &AtomicBool,
) -> Result<Tensor> {
    config.validate()?;

    // Attach once per run, before any iteration; unknown layers fail here.
    // The handle drops on every exit path below, releasing the tap.
    let tap = model.attach(layer)?;
    let objective = ChannelObjective::new(layer, channel);

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    // The optimizer owns exactly one Var: the original pixel buffer. Model
    // weights are plain tensors and structurally unreachable.
    let params = ParamsAdamW {
        lr: config.learning_rate,
        beta1: config.beta1,
        beta2: config.beta2,
        eps: config.eps,
        weight_decay: 0.0,
    };
    let mut optimizer = AdamW::new(vec![image.clone()], params)?;

    tracing::info!(
        layer,
        channel,
        iterations = config.iterations,
        transformed = !pipeline.is_identity(),
        "starting visualization run"
    );

    for iteration in 0..config.iterations {
        if cancel.load(Ordering::Relaxed) {
            tracing::info!(iteration, "visualization run cancelled");
            break;
        }

        let transformed = pipeline.apply(image.as_tensor(), &mut rng)?;
        // Side effect: populates the tap with this pass's activation.
        let _prediction = model.forward(&transformed)?;

        let loss = objective.evaluate(&tap)?;
        let value = loss.to_scalar::<f32>()?;
        if !value.is_finite() {
            return Err(VizError::NonFiniteLoss { iteration, value });
        }

        // backward_step builds a fresh gradient store each call; nothing
        // accumulates across iterations.
        optimizer.backward_step(&loss)?;
        tracing::debug!(iteration, loss = value, "ascent step");
    }

    tracing::info!(layer, channel, "visualization run complete");
    Ok(image.as_tensor().clone())
}

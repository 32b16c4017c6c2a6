//! # featviz-rs
//!
//! Feature visualization for frozen [candle](https://github.com/huggingface/candle)
//! models: synthesize an image that maximally activates a chosen channel of
//! a hidden layer (or an output-class neuron) by gradient ascent on the
//! pixels, with stochastic geometric robustness transforms.
//!
//! The network under inspection is treated as an opaque, frozen,
//! differentiable function. The crate instruments one named layer with an
//! activation tap, derives a scalar objective from one channel of the tapped
//! output, and repeatedly updates a pixel buffer so that channel's mean
//! activation grows — revealing what the unit "detects".
//!
//! ## Features
//!
//! - **Activation taps** — attach/release instrumentation on any named layer;
//!   taps detach on drop, so no hook can leak into later forward passes
//! - **Channel objectives** — rank-2 (fully-connected) and rank-4
//!   (convolutional) activations, projected to a scalar by channel mean
//! - **Robustness transforms** — composable jitter, rotation, and scale,
//!   all gradient-passthrough, applied before every forward pass
//! - **Adam ascent** — the optimizer owns only the pixel buffer; model
//!   weights are plain tensors and cannot be updated
//!
//! ## Quick Start
//!
//! ```
//! use candle_core::{DType, Device, Tensor, Var};
//! use candle_nn::Linear;
//! use featviz_rs::{maximize, LayeredModel, MaximizeConfig, TransformPipeline};
//!
//! # fn main() -> featviz_rs::Result<()> {
//! let device = Device::Cpu;
//!
//! // A frozen single-layer "network": constant-tensor weights, 4 -> 3.
//! let weight = Tensor::rand(-0.5f32, 0.5, (3, 4), &device)?;
//! let model = LayeredModel::new().push("fc", Box::new(Linear::new(weight, None)))?;
//!
//! // Seed image (here a rank-2 feature vector; CNNs use (1, C, H, W)).
//! let image = Var::from_tensor(&Tensor::zeros((1, 4), DType::F32, &device)?)?;
//!
//! let config = MaximizeConfig::default().with_iterations(5).with_seed(0);
//! let result = maximize(
//!     &model,
//!     &image,
//!     "fc",
//!     1,
//!     &TransformPipeline::identity(),
//!     &config,
//! )?;
//! assert_eq!(result.dims(), &[1, 4]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: run configuration (iterations, learning rate, seed)
//! - [`error`]: error types and result alias
//! - [`model`]: the frozen-model capability contract and layered wrapper
//! - [`tap`]: run-scoped activation instrumentation
//! - [`objective`]: channel-to-scalar objectives
//! - [`transform`]: stochastic geometric robustness transforms
//! - [`maximizer`]: the gradient-ascent loop
//!
//! ## Concurrency
//!
//! One visualization run owns one tap scope; handles are `Rc`-based and not
//! `Send`. Run concurrent visualizations against separate model wrappers.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod maximizer;
pub mod model;
pub mod objective;
pub mod tap;
pub mod transform;

pub use config::MaximizeConfig;
pub use error::{Result, VizError};
pub use maximizer::{maximize, maximize_with_cancel};
pub use model::{Flatten, InspectableModel, LayeredModel, Relu};
pub use objective::ChannelObjective;
pub use tap::TapHandle;
pub use transform::{ImageTransform, Jitter, Rotation, Scale, TransformPipeline};

//! Error types for featviz-rs.
//!
//! All errors are fatal to the current visualization run: there is nothing
//! transient to retry against. Instrumentation taps detach on every exit path
//! because [`TapHandle`](crate::tap::TapHandle) releases on drop.

use thiserror::Error;

/// Result type alias for featviz-rs operations.
pub type Result<T> = std::result::Result<T, VizError>;

/// Errors that can occur during a visualization run.
///
/// # Example
///
/// ```rust
/// use featviz_rs::VizError;
///
/// let err = VizError::LayerNotFound("conv9".to_string());
/// assert!(err.to_string().contains("conv9"));
/// ```
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum VizError {
    /// The requested layer name does not resolve to a registered stage.
    ///
    /// Surfaced by `attach` before any iteration begins.
    #[error("layer not found: no layer named `{0}` is registered on this model")]
    LayerNotFound(String),

    /// The channel index exceeds the layer's channel count.
    ///
    /// Only detectable after the first forward pass reveals the activation
    /// shape, so it surfaces on the first objective evaluation.
    #[error("channel index {channel} out of range for layer `{layer}` ({width} channels)")]
    ChannelIndexOutOfRange {
        /// The requested channel index.
        channel: usize,
        /// The layer's actual channel count.
        width: usize,
        /// The instrumented layer.
        layer: String,
    },

    /// A tap was read before any forward pass populated it.
    ///
    /// Not reachable through correct use of [`maximize`](crate::maximize);
    /// exists as a defensive invariant check on the loop ordering.
    #[error("no activation recorded for layer `{0}`: run a forward pass before reading the tap")]
    NoActivationRecorded(String),

    /// The objective became NaN or infinite.
    ///
    /// Signals a learning-rate or transform misconfiguration; the run aborts
    /// instead of silently writing garbage pixels.
    #[error("non-finite loss {value} at iteration {iteration}: check learning rate and transform ranges")]
    NonFiniteLoss {
        /// Iteration at which the loss went non-finite.
        iteration: usize,
        /// The offending loss value.
        value: f32,
    },

    /// Invalid run configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Model construction or capability error.
    #[error("model error: {0}")]
    Model(String),

    /// Tensor operation failure.
    #[error("candle error: {0}")]
    Candle(#[from] candle_core::Error),
}

//! Channel objectives: the scalar quantity a run maximizes.
//!
//! The objective reads the tapped activation and projects one channel to a
//! scalar. It is framed as a loss (negative mean) so a stock gradient-descent
//! optimizer minimizes it unmodified; maximizing the activation and
//! minimizing this loss are the same thing.

use candle_core::Tensor;

use crate::error::{Result, VizError};
use crate::tap::TapHandle;

/// Scalar objective over one channel of one instrumented layer.
///
/// Channel projection rule:
/// - rank-2 activation `(batch, features)`: the selected column, averaged
///   over the batch;
/// - rank-4 activation `(batch, channels, height, width)`: the selected
///   channel, averaged over batch and all spatial positions.
///
/// [`evaluate`](Self::evaluate) returns the *negative* of that mean.
#[derive(Debug, Clone)]
pub struct ChannelObjective {
    layer: String,
    channel: usize,
}

impl ChannelObjective {
    /// Create an objective for `channel` of the layer named `layer`.
    pub fn new(layer: impl Into<String>, channel: usize) -> Self {
        Self {
            layer: layer.into(),
            channel,
        }
    }

    /// The instrumented layer this objective reads.
    #[must_use]
    pub fn layer(&self) -> &str {
        &self.layer
    }

    /// The selected channel index.
    #[must_use]
    pub const fn channel(&self) -> usize {
        self.channel
    }

    /// Evaluate the loss (negative channel mean) from the tap's latest
    /// activation.
    ///
    /// The returned rank-0 tensor stays on the forward graph: backpropagating
    /// through it reaches the input pixels.
    ///
    /// # Errors
    ///
    /// - [`VizError::NoActivationRecorded`] if no forward pass has populated
    ///   the tap;
    /// - [`VizError::ChannelIndexOutOfRange`] if the channel exceeds the
    ///   activation's channel count (detectable only once the shape is known,
    ///   so this surfaces here, not at attach time);
    /// - [`VizError::Model`] if the activation rank is neither 2 nor 4.
    pub fn evaluate(&self, tap: &TapHandle) -> Result<Tensor> {
        let activation = tap.latest()?;

        let rank = activation.rank();
        if rank != 2 && rank != 4 {
            return Err(VizError::Model(format!(
                "activation for layer `{}` has rank {rank}; expected 2 (batch, features) or 4 (batch, channels, height, width)",
                self.layer
            )));
        }

        let width = activation.dim(1)?;
        if self.channel >= width {
            return Err(VizError::ChannelIndexOutOfRange {
                channel: self.channel,
                width,
                layer: self.layer.clone(),
            });
        }

        // Mean over batch (and spatial positions for rank 4), then negate so
        // downstream minimization machinery maximizes the activation.
        let mean = activation.narrow(1, self.channel, 1)?.mean_all()?;
        Ok(mean.affine(-1.0, 0.0)?)
    }
}

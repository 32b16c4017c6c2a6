//! Run configuration for the activation maximizer.
//!
//! Seeding and hyperparameters are the caller's concern; the loop itself
//! imposes no convergence criteria beyond the fixed iteration count.

use serde::{Deserialize, Serialize};

use crate::error::{Result, VizError};

/// Configuration for one [`maximize`](crate::maximize) run.
///
/// # Example
///
/// ```
/// use featviz_rs::MaximizeConfig;
///
/// let config = MaximizeConfig::default()
///     .with_iterations(50)
///     .with_learning_rate(0.02)
///     .with_seed(42);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaximizeConfig {
    /// Number of gradient-ascent iterations. Fixed count, no early stopping.
    pub iterations: usize,

    /// Adam learning rate applied to the pixel buffer.
    pub learning_rate: f64,

    /// Adam first-moment decay.
    pub beta1: f64,

    /// Adam second-moment decay.
    pub beta2: f64,

    /// Adam epsilon for numerical stability.
    pub eps: f64,

    /// Seed for the transform pipeline's random source. `None` seeds from
    /// OS entropy; runs are reproducible only when set.
    pub seed: Option<u64>,
}

impl Default for MaximizeConfig {
    fn default() -> Self {
        Self {
            iterations: 20,
            learning_rate: 0.05,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            seed: None,
        }
    }
}

impl MaximizeConfig {
    /// Set the iteration count.
    #[must_use]
    pub const fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Set the learning rate.
    #[must_use]
    pub const fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// Set the random seed for the transform pipeline.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`VizError::Config`] if the iteration count is zero, the
    /// learning rate is non-positive or non-finite, or the Adam moments are
    /// outside `[0, 1)`.
    pub fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(VizError::Config(
                "iterations must be at least 1".to_string(),
            ));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(VizError::Config(format!(
                "learning rate must be positive and finite, got {}",
                self.learning_rate
            )));
        }
        for (name, beta) in [("beta1", self.beta1), ("beta2", self.beta2)] {
            if !(0.0..1.0).contains(&beta) {
                return Err(VizError::Config(format!(
                    "{name} must be in [0, 1), got {beta}"
                )));
            }
        }
        Ok(())
    }
}

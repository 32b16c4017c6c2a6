//! Stochastic geometric transforms applied before each forward pass.
//!
//! Jittering, rotating, and rescaling the image between gradient steps
//! suppresses the high-frequency adversarial-style artifacts that plain
//! pixel-space ascent produces: a pattern that survives random geometric
//! perturbation has to be spatially coherent.
//!
//! Every transform is gradient-passthrough. Jitter is built from
//! `pad_with_zeros` and `narrow`; rotation and scale resample through a
//! precomputed nearest-neighbor index map and `index_select`, whose backward
//! scatter-adds gradients into the sampled source pixels. The optimization
//! loop relies on this: gradients computed on the transformed image must
//! reach the original pixel buffer.
//!
//! Each step redraws its own random parameters on every call from the
//! caller-seeded RNG; there is no shared per-step seed state.

use candle_core::Tensor;
use rand::rngs::StdRng;
use rand::Rng;

use crate::error::Result;

/// A stochastic image-to-image perturbation.
pub trait ImageTransform {
    /// Apply the transform to an `(N, C, H, W)` image, redrawing random
    /// parameters from `rng`. Output shape always equals input shape.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying tensor operations fail (for
    /// example on a non-rank-4 input).
    fn apply(&self, image: &Tensor, rng: &mut StdRng) -> Result<Tensor>;
}

/// Resample the spatial grid through a nearest-neighbor index map.
///
/// `map[i]` is the flattened source index for flattened output position `i`.
/// `index_select` keeps the result on the autograd graph.
fn remap_spatial(image: &Tensor, map: Vec<u32>) -> Result<Tensor> {
    let (n, c, h, w) = image.dims4()?;
    let flat = image.reshape((n, c, h * w))?;
    let indexes = Tensor::from_vec(map, h * w, image.device())?;
    let remapped = flat.index_select(&indexes, 2)?;
    Ok(remapped.reshape((n, c, h, w))?)
}

/// Clamp a continuous source coordinate to the grid (edge replication).
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn clamp_to_grid(coord: f64, len: usize) -> usize {
    #[allow(clippy::cast_precision_loss)]
    let max = (len - 1) as f64;
    coord.round().clamp(0.0, max) as usize
}

/// Random translation: pad the image, then crop back at a random offset.
///
/// Pads `max_pad` zeros on every spatial side and crops an `(H, W)` window at
/// offsets drawn uniformly from `[0, 2*max_pad]` per axis, translating
/// content by up to `max_pad` pixels in either direction. Exposed border
/// pixels are zero-filled.
#[derive(Debug, Clone, Copy)]
pub struct Jitter {
    max_pad: usize,
}

impl Jitter {
    /// Create a jitter transform with the given maximum displacement.
    #[must_use]
    pub const fn new(max_pad: usize) -> Self {
        Self { max_pad }
    }
}

impl ImageTransform for Jitter {
    fn apply(&self, image: &Tensor, rng: &mut StdRng) -> Result<Tensor> {
        if self.max_pad == 0 {
            return Ok(image.clone());
        }
        let (_n, _c, h, w) = image.dims4()?;
        let padded = image
            .pad_with_zeros(2, self.max_pad, self.max_pad)?
            .pad_with_zeros(3, self.max_pad, self.max_pad)?;
        let off_y = rng.gen_range(0..=2 * self.max_pad);
        let off_x = rng.gen_range(0..=2 * self.max_pad);
        Ok(padded.narrow(2, off_y, h)?.narrow(3, off_x, w)?)
    }
}

/// Random rotation about the image center.
///
/// The angle is drawn uniformly from `[-max_degrees, +max_degrees]`. Output
/// pixels are resampled from the inverse-rotated grid with nearest-neighbor
/// interpolation; sources falling outside the image clamp to the nearest
/// edge pixel (edge replication fill).
#[derive(Debug, Clone, Copy)]
pub struct Rotation {
    max_degrees: f64,
}

impl Rotation {
    /// Create a rotation transform with a symmetric angle range.
    #[must_use]
    pub const fn new(max_degrees: f64) -> Self {
        Self { max_degrees }
    }
}

impl ImageTransform for Rotation {
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    fn apply(&self, image: &Tensor, rng: &mut StdRng) -> Result<Tensor> {
        if self.max_degrees == 0.0 {
            return Ok(image.clone());
        }
        let (_n, _c, h, w) = image.dims4()?;
        let angle = rng
            .gen_range(-self.max_degrees..=self.max_degrees)
            .to_radians();
        let (sin, cos) = angle.sin_cos();
        let cy = (h as f64 - 1.0) / 2.0;
        let cx = (w as f64 - 1.0) / 2.0;

        let mut map = Vec::with_capacity(h * w);
        for y in 0..h {
            let dy = y as f64 - cy;
            for x in 0..w {
                let dx = x as f64 - cx;
                // Inverse rotation: where each output pixel samples from.
                let src_x = cx + dx * cos + dy * sin;
                let src_y = cy - dx * sin + dy * cos;
                let sy = clamp_to_grid(src_y, h);
                let sx = clamp_to_grid(src_x, w);
                map.push((sy * w + sx) as u32);
            }
        }
        remap_spatial(image, map)
    }
}

/// Random rescaling with fixed aspect ratio.
///
/// A scale factor is drawn uniformly from `[min_scale, max_scale]`. Factors
/// above 1 resample a centered sub-region back up to the original size
/// (zoom in); factors below 1 zoom out, with out-of-bounds sources clamping
/// to the nearest edge pixel. Nearest-neighbor interpolation throughout.
#[derive(Debug, Clone, Copy)]
pub struct Scale {
    min_scale: f64,
    max_scale: f64,
}

impl Scale {
    /// Create a scale transform drawing factors from `[min_scale, max_scale]`.
    ///
    /// The bounds are normalized so an inverted range cannot panic the
    /// sampler; both should be positive.
    #[must_use]
    pub fn new(min_scale: f64, max_scale: f64) -> Self {
        Self {
            min_scale: min_scale.min(max_scale),
            max_scale: max_scale.max(min_scale),
        }
    }
}

impl ImageTransform for Scale {
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    fn apply(&self, image: &Tensor, rng: &mut StdRng) -> Result<Tensor> {
        let factor = if (self.max_scale - self.min_scale).abs() < f64::EPSILON {
            self.min_scale
        } else {
            rng.gen_range(self.min_scale..=self.max_scale)
        };
        if (factor - 1.0).abs() < f64::EPSILON {
            return Ok(image.clone());
        }
        let (_n, _c, h, w) = image.dims4()?;
        let cy = (h as f64 - 1.0) / 2.0;
        let cx = (w as f64 - 1.0) / 2.0;

        let mut map = Vec::with_capacity(h * w);
        for y in 0..h {
            let src_y = cy + (y as f64 - cy) / factor;
            let sy = clamp_to_grid(src_y, h);
            for x in 0..w {
                let src_x = cx + (x as f64 - cx) / factor;
                let sx = clamp_to_grid(src_x, w);
                map.push((sy * w + sx) as u32);
            }
        }
        remap_spatial(image, map)
    }
}

/// An ordered chain of stochastic transforms.
///
/// Steps run in declared order: downstream steps see the output of upstream
/// ones. The empty pipeline is the identity and is fully supported — it
/// simply yields the noisier, higher-frequency visualizations expected of
/// unregularized ascent.
///
/// # Example
///
/// ```
/// use featviz_rs::TransformPipeline;
///
/// let pipeline = TransformPipeline::standard(4, 45.0, (0.9, 1.2));
/// assert_eq!(pipeline.len(), 3);
/// assert!(TransformPipeline::identity().is_identity());
/// ```
#[derive(Default)]
pub struct TransformPipeline {
    steps: Vec<Box<dyn ImageTransform>>,
}

impl TransformPipeline {
    /// Create an empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The identity pipeline: no perturbation before forward passes.
    #[must_use]
    pub fn identity() -> Self {
        Self::default()
    }

    /// The canonical jitter → rotation → scale chain.
    #[must_use]
    pub fn standard(max_pad: usize, max_degrees: f64, scale: (f64, f64)) -> Self {
        Self::new()
            .then(Jitter::new(max_pad))
            .then(Rotation::new(max_degrees))
            .then(Scale::new(scale.0, scale.1))
    }

    /// Append a transform step.
    #[must_use]
    pub fn then(mut self, step: impl ImageTransform + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether this is the identity pipeline.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run the image through every step in order.
    ///
    /// # Errors
    ///
    /// Propagates the first step failure.
    pub fn apply(&self, image: &Tensor, rng: &mut StdRng) -> Result<Tensor> {
        let mut xs = image.clone();
        for step in &self.steps {
            xs = step.apply(&xs, rng)?;
        }
        Ok(xs)
    }
}

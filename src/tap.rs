//! Activation taps: run-scoped instrumentation of intermediate layers.
//!
//! A tap captures the most recent output of one named layer during a forward
//! pass. [`TapHandle`] is the caller-facing accessor; the registry inside the
//! model only holds a [`Weak`] reference to the handle's slot, so dropping
//! the handle detaches the tap on every exit path — there is no way to leak
//! instrumentation that keeps writing during unrelated forward passes.
//!
//! The stored tensor is the live forward-graph node, never a detached copy.
//! Every [`TapHandle::latest`] read is therefore backprop-capable by
//! construction; the classic "image silently never updates because the
//! intermediate was not gradient-tracked" failure cannot be expressed.
//!
//! Handles are [`Rc`]-based and deliberately `!Send`: one visualization run
//! owns one registry scope, matching the single-writer, single-reader nature
//! of a run. Concurrent runs must use separate model wrappers.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use candle_core::Tensor;

use crate::error::{Result, VizError};

/// Shared slot holding the latest activation for one tapped layer.
pub(crate) type TapSlot = Rc<RefCell<Option<Tensor>>>;

/// Maps layer names to the tap slots currently attached to them.
///
/// Owned by the model wrapper; entries are created by `attach` and die with
/// their handles. Only the latest activation per layer is retained —
/// [`TapRegistry::record`] overwrites.
#[derive(Default)]
pub(crate) struct TapRegistry {
    slots: RefCell<HashMap<String, Weak<RefCell<Option<Tensor>>>>>,
}

impl TapRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Create a fresh slot for `layer`, replacing any previous attachment.
    pub(crate) fn register(&self, layer: &str) -> TapSlot {
        let slot: TapSlot = Rc::new(RefCell::new(None));
        self.slots
            .borrow_mut()
            .insert(layer.to_string(), Rc::downgrade(&slot));
        slot
    }

    /// Store `activation` for `layer` if a live tap is attached.
    ///
    /// The un-detached graph tensor is stored (cheap clone, shared storage).
    /// Dead entries left behind by released handles are pruned here, so a
    /// forward pass after release records nothing.
    pub(crate) fn record(&self, layer: &str, activation: &Tensor) {
        let mut slots = self.slots.borrow_mut();
        if let Some(weak) = slots.get(layer) {
            if let Some(slot) = weak.upgrade() {
                *slot.borrow_mut() = Some(activation.clone());
            } else {
                slots.remove(layer);
            }
        }
    }

    /// Whether a live tap is attached to `layer`.
    #[cfg(test)]
    pub(crate) fn is_attached(&self, layer: &str) -> bool {
        self.slots
            .borrow()
            .get(layer)
            .is_some_and(|weak| weak.strong_count() > 0)
    }
}

/// Accessor for one attached tap.
///
/// Obtained from [`InspectableModel::attach`](crate::InspectableModel::attach).
/// While the handle lives, every forward pass through the model overwrites
/// its slot with that layer's latest output. Dropping the handle detaches
/// the tap.
#[derive(Debug)]
pub struct TapHandle {
    layer: String,
    slot: TapSlot,
}

impl TapHandle {
    pub(crate) fn new(layer: String, slot: TapSlot) -> Self {
        Self { layer, slot }
    }

    /// Name of the tapped layer.
    #[must_use]
    pub fn layer(&self) -> &str {
        &self.layer
    }

    /// The most recent activation recorded for this tap's layer.
    ///
    /// The returned tensor stays connected to the forward graph, so a
    /// backward pass through it reaches the input pixels.
    ///
    /// # Errors
    ///
    /// Returns [`VizError::NoActivationRecorded`] if no forward pass has run
    /// since the tap was attached.
    pub fn latest(&self) -> Result<Tensor> {
        self.slot
            .borrow()
            .as_ref()
            .cloned()
            .ok_or_else(|| VizError::NoActivationRecorded(self.layer.clone()))
    }

    /// Explicitly detach the tap. Equivalent to dropping the handle.
    pub fn release(self) {}
}

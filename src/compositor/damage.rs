//! Damage tracking.
//!
//! Models the server's region-accumulation semantics: damage reports
//! accumulate per handle until claimed. `subtract_and_fetch` claims and
//! clears atomically, so a report arriving after a claim is never lost; it
//! lands in the next claim. A handle that has never seen a report answers
//! its first fetch with the full client bounds (first repair is a full
//! repair; this is the no-pixmap bootstrap case).

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::compositor::backend::Backend;
use crate::error::Result;
use crate::shared::{DamageId, Geometry, WindowId};

#[derive(Debug)]
struct Accumulator {
    window: WindowId,
    rects: Vec<Geometry>,
    fetched_once: bool,
}

/// Per-client accumulated damage regions, keyed by native damage handle.
#[derive(Debug, Default)]
pub struct DamageTracker {
    accumulators: HashMap<DamageId, Accumulator>,
}

impl DamageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Establish damage reporting for `window`. Reports are edge-triggered
    /// (NON_EMPTY): the server notifies when an empty region becomes dirty.
    pub fn create<B: Backend>(&mut self, backend: &mut B, window: WindowId) -> Result<DamageId> {
        let handle = backend.create_damage(window)?;
        debug!("Created damage {} for window {}", handle, window);
        self.accumulators.insert(
            handle,
            Accumulator { window, rects: Vec::new(), fetched_once: false },
        );
        Ok(handle)
    }

    /// Accumulate a damage report delivered by the server.
    pub fn record(&mut self, handle: DamageId, rect: Geometry) {
        match self.accumulators.get_mut(&handle) {
            Some(accumulator) => accumulator.rects.push(rect),
            None => warn!("Damage report for unknown handle {}, dropped", handle),
        }
    }

    /// Atomically claim all accumulated damage and clear the accumulator.
    /// The first fetch on a handle with no reports returns `bounds` whole.
    pub fn subtract_and_fetch<B: Backend>(
        &mut self,
        backend: &mut B,
        handle: DamageId,
        bounds: Geometry,
    ) -> Vec<Geometry> {
        // Subtract on the server first; anything reported from here on
        // belongs to the next repair.
        backend.subtract_damage(handle);

        let Some(accumulator) = self.accumulators.get_mut(&handle) else {
            warn!("subtract_and_fetch on unknown handle {}", handle);
            return Vec::new();
        };

        if !accumulator.fetched_once && accumulator.rects.is_empty() {
            accumulator.fetched_once = true;
            return vec![bounds];
        }
        accumulator.fetched_once = true;
        std::mem::take(&mut accumulator.rects)
    }

    /// Release the native damage object. Exactly once per handle; a second
    /// destroy is a contract violation.
    pub fn destroy<B: Backend>(&mut self, backend: &mut B, handle: DamageId) {
        let removed = self.accumulators.remove(&handle);
        debug_assert!(removed.is_some(), "damage handle {handle} destroyed twice");
        if let Some(accumulator) = removed {
            debug!("Destroyed damage {} for window {}", handle, accumulator.window);
            backend.destroy_damage(handle);
        } else {
            warn!("Double destroy of damage handle {}, ignored", handle);
        }
    }

    pub fn window_of(&self, handle: DamageId) -> Option<WindowId> {
        self.accumulators.get(&handle).map(|a| a.window)
    }
}

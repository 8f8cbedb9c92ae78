//! Stacking list.
//!
//! A doubly linked total order over managed windows, bottom to top. Links are
//! kept in a map keyed by window id so insertion relative to a known neighbor
//! and removal are both O(1).
//!
//! All operations are total. A violated invariant (double insert, unknown
//! neighbor) is a programming-contract violation: it asserts in debug builds
//! and degrades to a logged no-op in release builds.

use std::collections::HashMap;

use tracing::warn;

use crate::shared::WindowId;
use crate::wm::client::ClientTypeFlags;

#[derive(Debug, Clone, Copy, Default)]
struct Links {
    above: Option<WindowId>,
    below: Option<WindowId>,
}

/// Total stacking order of all managed windows.
#[derive(Debug, Default)]
pub struct StackList {
    links: HashMap<WindowId, Links>,
    top: Option<WindowId>,
    bottom: Option<WindowId>,
}

impl StackList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn contains(&self, window: WindowId) -> bool {
        self.links.contains_key(&window)
    }

    pub fn top(&self) -> Option<WindowId> {
        self.top
    }

    pub fn bottom(&self) -> Option<WindowId> {
        self.bottom
    }

    /// Insert `window` immediately above `below`; `None` means new bottom.
    /// If `below` was the top, `window` becomes the new top.
    pub fn insert_above(&mut self, window: WindowId, below: Option<WindowId>) {
        if self.links.contains_key(&window) {
            debug_assert!(false, "window {window} inserted twice into the stack");
            warn!("Stacking: window {} already stacked, ignoring insert", window);
            return;
        }
        if let Some(b) = below {
            if !self.links.contains_key(&b) {
                debug_assert!(false, "insert_above relative to unknown window {b}");
                warn!("Stacking: neighbor {} not stacked, ignoring insert of {}", b, window);
                return;
            }
        }

        match below {
            None => {
                // New bottom; the old bottom (if any) sits directly above.
                let old_bottom = self.bottom;
                self.links.insert(
                    window,
                    Links { above: old_bottom, below: None },
                );
                if let Some(ob) = old_bottom {
                    self.links.get_mut(&ob).unwrap().below = Some(window);
                } else {
                    self.top = Some(window);
                }
                self.bottom = Some(window);
            }
            Some(b) => {
                let b_above = self.links[&b].above;
                self.links.insert(window, Links { above: b_above, below: Some(b) });
                self.links.get_mut(&b).unwrap().above = Some(window);
                match b_above {
                    Some(a) => self.links.get_mut(&a).unwrap().below = Some(window),
                    None => self.top = Some(window),
                }
            }
        }
    }

    /// Insert `window` as the new top of the stack.
    pub fn append_top(&mut self, window: WindowId) {
        let top = self.top;
        self.insert_above(window, top);
    }

    /// Unlink `window`. Silent no-op when absent.
    pub fn remove(&mut self, window: WindowId) {
        let Some(links) = self.links.remove(&window) else {
            return;
        };
        match links.below {
            Some(b) => self.links.get_mut(&b).unwrap().above = links.above,
            None => self.bottom = links.above,
        }
        match links.above {
            Some(a) => self.links.get_mut(&a).unwrap().below = links.below,
            None => self.top = links.below,
        }
    }

    /// Remove then re-insert at the top. Used to promote dialogs, desktops
    /// and menus to the top of the display stack.
    pub fn move_top(&mut self, window: WindowId) {
        if !self.links.contains_key(&window) {
            return;
        }
        self.remove(window);
        self.append_top(window);
    }

    /// Place `window` directly above the highest entry whose type matches
    /// `mask`, or at the very bottom if none match. `type_of` resolves the
    /// type of each stacked entry.
    pub fn move_above_type<F>(&mut self, window: WindowId, mask: ClientTypeFlags, type_of: F)
    where
        F: Fn(WindowId) -> ClientTypeFlags,
    {
        if !self.links.contains_key(&window) {
            return;
        }
        self.remove(window);

        let mut highest_match = None;
        for w in self.bottom_to_top() {
            if type_of(w).intersects(mask) {
                highest_match = Some(w);
            }
        }
        self.insert_above(window, highest_match);
    }

    /// Snapshot of the order, bottom first. Taken at call time; later
    /// mutations do not affect a snapshot already produced.
    pub fn bottom_to_top(&self) -> Vec<WindowId> {
        let mut order = Vec::with_capacity(self.links.len());
        let mut cursor = self.bottom;
        while let Some(w) = cursor {
            order.push(w);
            cursor = self.links[&w].above;
        }
        debug_assert_eq!(order.len(), self.links.len(), "stack links corrupted");
        order
    }

    /// Snapshot of the order, top first.
    pub fn top_to_bottom(&self) -> Vec<WindowId> {
        let mut order = Vec::with_capacity(self.links.len());
        let mut cursor = self.top;
        while let Some(w) = cursor {
            order.push(w);
            cursor = self.links[&w].below;
        }
        debug_assert_eq!(order.len(), self.links.len(), "stack links corrupted");
        order
    }

    /// Find the entry after the current extremity among windows matching
    /// `mask`, wrapping. Forward means "the next one down from the current
    /// highest match"; `reverse` starts from the lowest match and walks up.
    pub fn cycle_by_type<F>(
        &self,
        mask: ClientTypeFlags,
        reverse: bool,
        type_of: F,
    ) -> Option<WindowId>
    where
        F: Fn(WindowId) -> ClientTypeFlags,
    {
        let matches: Vec<WindowId> = self
            .bottom_to_top()
            .into_iter()
            .filter(|&w| type_of(w).intersects(mask))
            .collect();
        if matches.is_empty() {
            return None;
        }
        let len = matches.len();
        let next = if reverse {
            // Current is the lowest match; the next one is above it.
            matches[1 % len]
        } else {
            // Current is the highest match; the next one is below it.
            matches[(2 * len - 2) % len]
        };
        Some(next)
    }
}

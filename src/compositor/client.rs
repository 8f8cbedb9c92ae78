//! Compositor client: one per managed window once compositing is enabled.
//!
//! Keeps an off-screen actor in sync with the on-screen window's pixel
//! content and geometry. The actor and damage handle are created lazily on
//! the first map notification; the pixmap binding is dropped on configure
//! and refetched whole by the next repair, which batches resize storms into
//! a single refetch.

use bitflags::bitflags;
use tracing::{debug, warn};

use crate::compositor::backend::{Backend, PixmapInfo};
use crate::compositor::damage::DamageTracker;
use crate::compositor::shadow::{self, CLEAR_TILE};
use crate::shared::{ActorId, DamageId, Geometry, WindowId};

bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct CompClientFlags: u8 {
        /// At least one map notification has been processed.
        const MAPPED         = 1 << 0;
        /// Texture updates suppressed (an effect owns the frozen content).
        const DONT_UPDATE    = 1 << 1;
        /// A terminal (unmap or minimize) effect has been armed; duplicates
        /// run nothing.
        const DONE           = 1 << 2;
        /// An effect is in flight; it owns actor visibility until it ends.
        const EFFECT_RUNNING = 1 << 3;
    }
}

#[derive(Debug)]
pub struct CompositorClient {
    pub window: WindowId,
    pub actor: Option<ActorId>,
    pub pixmap: Option<PixmapInfo>,
    pub damage: Option<DamageId>,
    pub flags: CompClientFlags,
    /// Set when unregistration arrived while an effect was running; final
    /// teardown happens when the effect completes.
    pub pending_destroy: bool,
}

impl CompositorClient {
    pub fn new(window: WindowId) -> Self {
        Self {
            window,
            actor: None,
            pixmap: None,
            damage: None,
            flags: CompClientFlags::empty(),
            pending_destroy: false,
        }
    }

    pub fn effect_running(&self) -> bool {
        self.flags.contains(CompClientFlags::EFFECT_RUNNING)
    }

    /// Make the actor visible and schedule a full repaint. No-op until the
    /// window has mapped through the compositor's view (no actor yet).
    pub fn show<B: Backend>(
        &mut self,
        backend: &mut B,
        tracker: &mut DamageTracker,
        coverage: Geometry,
    ) {
        let Some(actor) = self.actor else {
            return;
        };
        if self.damage.is_none() {
            match tracker.create(backend, self.window) {
                Ok(handle) => self.damage = Some(handle),
                Err(e) => warn!("Damage tracking unavailable for window {}: {}", self.window, e),
            }
        }
        // Everything is stale after a show; repair repaints the full extent.
        if self.pixmap.is_some() {
            if let Some(damage) = self.damage {
                tracker.record(
                    damage,
                    Geometry::new(0, 0, coverage.width, coverage.height),
                );
            }
        }
        self.flags.remove(CompClientFlags::DONT_UPDATE);
        backend.show_actor(actor);
    }

    /// Hide the actor, unless an in-flight effect owns visibility.
    pub fn hide<B: Backend>(&mut self, backend: &mut B) {
        if self.effect_running() {
            return;
        }
        if let Some(actor) = self.actor {
            backend.hide_actor(actor);
        }
    }

    /// The window's backing surface became invalid. Free the binding now;
    /// the next repair detects the missing pixmap and refetches once.
    pub fn configure<B: Backend>(&mut self, backend: &mut B) {
        if self.pixmap.is_none() {
            return;
        }
        if let Some(actor) = self.actor {
            backend.free_window_pixmap(actor);
        }
        self.pixmap = None;
        debug!("Window {}: pixmap invalidated by configure", self.window);
    }

    /// Bring the texture up to date: a full fetch when no pixmap is bound,
    /// otherwise only the claimed damage rectangles.
    pub fn repair<B: Backend>(
        &mut self,
        backend: &mut B,
        tracker: &mut DamageTracker,
        coverage: Geometry,
        shaped: bool,
        argb: bool,
    ) {
        if self.flags.contains(CompClientFlags::DONT_UPDATE) {
            return;
        }
        let Some(actor) = self.actor else {
            return;
        };

        if self.pixmap.is_none() {
            // Claim accumulated damage first so nothing reported during the
            // full fetch is lost to a stale accumulator.
            if let Some(damage) = self.damage {
                let _ = tracker.subtract_and_fetch(backend, damage, coverage);
            }
            self.fetch_full_texture(backend, coverage, shaped, argb);
            return;
        }

        if let Some(damage) = self.damage {
            let rects = tracker.subtract_and_fetch(backend, damage, coverage);
            if !rects.is_empty() {
                backend.update_texture(actor, &rects);
            }
        }
    }

    /// Rebind the native pixmap and resize the actor to the provider's
    /// coverage (a decorated window's visible extent includes its frame).
    pub fn fetch_full_texture<B: Backend>(
        &mut self,
        backend: &mut B,
        coverage: Geometry,
        shaped: bool,
        argb: bool,
    ) {
        let Some(actor) = self.actor else {
            return;
        };
        let info = match backend.bind_window_pixmap(actor, self.window) {
            Ok(info) => info,
            Err(e) => {
                // Degrade: no visual representation this frame, repaired on
                // the next damage event.
                warn!("Window {}: pixmap bind failed: {}", self.window, e);
                return;
            }
        };
        self.pixmap = Some(info);
        backend.move_resize_actor(actor, coverage);

        if shaped && !argb {
            let bounds = Geometry::new(0, 0, info.width as u32, info.height as u32);
            match backend.window_visible_region(self.window) {
                Ok(visible) => {
                    let tiles = shadow::occlusion_tiles(bounds, &visible, CLEAR_TILE);
                    if !tiles.is_empty() {
                        backend.clear_texture_area(actor, &tiles);
                    }
                }
                Err(e) => warn!("Window {}: shape query failed: {}", self.window, e),
            }
        }

        backend.update_texture(actor, &[Geometry::new(0, 0, info.width as u32, info.height as u32)]);
        debug!(
            "Window {}: full texture fetch {}x{} depth {}",
            self.window, info.width, info.height, info.depth
        );
    }

    /// Release all native resources: actor (with its pixmap binding), then
    /// damage handle. Each release is null-checked; calling twice is safe.
    pub fn release<B: Backend>(&mut self, backend: &mut B, tracker: &mut DamageTracker) {
        if let Some(actor) = self.actor.take() {
            backend.destroy_actor(actor);
        }
        self.pixmap = None;
        if let Some(damage) = self.damage.take() {
            tracker.destroy(backend, damage);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::testing::RecordingBackend;

    const COVERAGE: Geometry = Geometry { x: 10, y: 10, width: 200, height: 100 };

    fn mapped_client(backend: &mut RecordingBackend, tracker: &mut DamageTracker) -> CompositorClient {
        let mut client = CompositorClient::new(1);
        client.actor = Some(backend.create_actor(1).unwrap());
        client.flags.insert(CompClientFlags::MAPPED);
        client.show(backend, tracker, COVERAGE);
        client
    }

    #[test]
    fn show_without_actor_is_noop() {
        let mut backend = RecordingBackend::new();
        let mut tracker = DamageTracker::new();
        let mut client = CompositorClient::new(1);
        client.show(&mut backend, &mut tracker, COVERAGE);
        assert!(client.damage.is_none());
        assert_eq!(backend.live_damage_count(), 0);
    }

    #[test]
    fn show_creates_damage_once_and_clears_dont_update() {
        let mut backend = RecordingBackend::new();
        let mut tracker = DamageTracker::new();
        let mut client = mapped_client(&mut backend, &mut tracker);
        assert!(client.damage.is_some());
        assert!(backend.actor_visible(client.actor.unwrap()));

        client.flags.insert(CompClientFlags::DONT_UPDATE);
        client.show(&mut backend, &mut tracker, COVERAGE);
        assert!(!client.flags.contains(CompClientFlags::DONT_UPDATE));
        assert_eq!(backend.live_damage_count(), 1);
    }

    #[test]
    fn first_repair_is_one_full_fetch() {
        let mut backend = RecordingBackend::new();
        let mut tracker = DamageTracker::new();
        let mut client = mapped_client(&mut backend, &mut tracker);

        client.repair(&mut backend, &mut tracker, COVERAGE, false, false);
        assert!(client.pixmap.is_some());
        assert_eq!(backend.pixmap_bind_count(), 1);
    }

    #[test]
    fn full_fetch_uses_the_window_pixmap_extent() {
        let mut backend = RecordingBackend::new();
        let mut tracker = DamageTracker::new();
        backend.set_window_geometry(1, Geometry::new(0, 0, 320, 240));
        let mut client = mapped_client(&mut backend, &mut tracker);

        client.repair(&mut backend, &mut tracker, COVERAGE, false, false);
        let info = client.pixmap.unwrap();
        assert_eq!((info.width, info.height), (320, 240));
        assert_eq!(
            backend.last_texture_update(client.actor.unwrap()),
            Some(vec![Geometry::new(0, 0, 320, 240)])
        );
    }

    #[test]
    fn configure_storm_costs_one_refetch() {
        let mut backend = RecordingBackend::new();
        let mut tracker = DamageTracker::new();
        let mut client = mapped_client(&mut backend, &mut tracker);
        client.repair(&mut backend, &mut tracker, COVERAGE, false, false);
        assert_eq!(backend.pixmap_bind_count(), 1);

        for _ in 0..5 {
            client.configure(&mut backend);
        }
        assert!(client.pixmap.is_none());

        client.repair(&mut backend, &mut tracker, COVERAGE, false, false);
        assert!(client.pixmap.is_some());
        // One bind for the bootstrap, exactly one more for the whole storm.
        assert_eq!(backend.pixmap_bind_count(), 2);
    }

    #[test]
    fn repair_pushes_only_claimed_rects() {
        let mut backend = RecordingBackend::new();
        let mut tracker = DamageTracker::new();
        let mut client = mapped_client(&mut backend, &mut tracker);
        client.repair(&mut backend, &mut tracker, COVERAGE, false, false);

        let dirty = Geometry::new(5, 5, 30, 20);
        tracker.record(client.damage.unwrap(), dirty);
        client.repair(&mut backend, &mut tracker, COVERAGE, false, false);
        assert_eq!(backend.last_texture_update(client.actor.unwrap()), Some(vec![dirty]));
    }

    #[test]
    fn shaped_non_argb_window_gets_cleared_tiles() {
        let mut backend = RecordingBackend::new();
        let mut tracker = DamageTracker::new();
        let mut client = mapped_client(&mut backend, &mut tracker);
        backend.set_visible_region(1, vec![Geometry::new(0, 0, 100, 100)]);

        client.repair(&mut backend, &mut tracker, COVERAGE, true, false);
        assert!(backend.cleared_area(client.actor.unwrap()) > 0);
    }

    #[test]
    fn shaped_argb_window_is_not_cleared() {
        let mut backend = RecordingBackend::new();
        let mut tracker = DamageTracker::new();
        let mut client = mapped_client(&mut backend, &mut tracker);

        client.repair(&mut backend, &mut tracker, COVERAGE, true, true);
        assert_eq!(backend.cleared_area(client.actor.unwrap()), 0);
    }

    #[test]
    fn hide_skipped_while_effect_running() {
        let mut backend = RecordingBackend::new();
        let mut tracker = DamageTracker::new();
        let mut client = mapped_client(&mut backend, &mut tracker);

        client.flags.insert(CompClientFlags::EFFECT_RUNNING);
        client.hide(&mut backend);
        assert!(backend.actor_visible(client.actor.unwrap()));

        client.flags.remove(CompClientFlags::EFFECT_RUNNING);
        client.hide(&mut backend);
        assert!(!backend.actor_visible(client.actor.unwrap()));
    }

    #[test]
    fn release_is_balanced_and_idempotent() {
        let mut backend = RecordingBackend::new();
        let mut tracker = DamageTracker::new();
        let mut client = mapped_client(&mut backend, &mut tracker);
        client.repair(&mut backend, &mut tracker, COVERAGE, false, false);

        client.release(&mut backend, &mut tracker);
        client.release(&mut backend, &mut tracker);
        assert!(backend.all_released());
    }
}

//! Compositing layer.
//!
//! Bridges window-manager lifecycle events to per-client compositing state
//! (actors, pixmaps, damage) and keeps the presentation order in sync with
//! the stacking list. All per-client operations are no-ops while compositing
//! is disabled; enabling is idempotent and failure to enable (a missing
//! extension) leaves plain window management running.

pub mod backend;
pub mod client;
pub mod damage;
pub mod effects;
pub mod shadow;
#[cfg(test)]
pub mod testing;

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::error::{CompositorError, Result};
use crate::shared::{Geometry, Rgba, WindowId};
use crate::wm::client::ClientTypeFlags;

use backend::{Backend, ShadowSpec};
use client::{CompClientFlags, CompositorClient};
use damage::DamageTracker;
use effects::{EffectEngine, EffectEvent, EffectSpec};
use shadow::ShadowKind;

/// Geometry and topology queries answered by the window-manager core.
pub trait GeometryProvider {
    /// Visible screen-space rectangle of a window, frame included.
    fn get_coverage(&self, window: WindowId) -> Geometry;
    /// Virtual-desktop layer the window belongs to (0 when absent).
    fn get_desktop_index(&self, window: WindowId) -> u32;
    /// Direct transient children of a window.
    fn get_transients(&self, window: WindowId) -> Vec<WindowId>;
    fn client_type(&self, window: WindowId) -> ClientTypeFlags;
    /// Resolve a damage/configure event target (frame or client window) to
    /// the managed client window, if any.
    fn resolve_event_target(&self, window: WindowId) -> Option<WindowId>;
}

/// Theme and per-window policy queries.
pub trait ThemeProvider {
    /// Shadow decoration for a window, `None` for no shadow.
    fn shadow_type(&self, window: WindowId) -> Option<ShadowKind>;
    fn shadow_color(&self) -> Rgba;
    fn shadow_radius(&self) -> u8;
    fn shadow_offset(&self) -> (i32, i32);
    fn is_client_shaped(&self, window: WindowId) -> bool;
    fn is_client_argb(&self, window: WindowId) -> bool;
    /// Per-event animation bindings for a window. Empty means the window
    /// shows and hides immediately.
    fn client_effects(&self, window: WindowId) -> Vec<EffectSpec>;
}

/// Native damage event payload, already decoded from the wire.
#[derive(Debug, Clone, Copy)]
pub struct DamageEvent {
    /// The drawable the server reported damage on (frame or client).
    pub drawable: WindowId,
    /// Dirty-rectangle hint, drawable-local.
    pub area: Geometry,
    /// More reports for the same drawable are already queued; repair can
    /// wait for the last one.
    pub more: bool,
}

/// Orchestrates compositor clients in response to window-manager lifecycle
/// events and drives stacking-order synchronization to the backend.
pub struct CompositorManager<B: Backend> {
    backend: B,
    clients: HashMap<WindowId, CompositorClient>,
    damage: DamageTracker,
    effects: EffectEngine,
    enabled: bool,
}

impl<B: Backend> CompositorManager<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            clients: HashMap::new(),
            damage: DamageTracker::new(),
            effects: EffectEngine::new(),
            enabled: false,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// True for the overlay/presentation surfaces; these must never be
    /// managed as client windows.
    pub fn is_my_window(&self, window: WindowId) -> bool {
        self.backend.is_backend_window(window)
    }

    /// Enable compositing and replay registration for every pre-existing
    /// mapped window (their resources were never created while disabled).
    /// Idempotent.
    pub fn turn_on<W>(&mut self, wm: &W, windows: &[WindowId], now: Instant) -> Result<()>
    where
        W: GeometryProvider + ThemeProvider,
    {
        if self.enabled {
            return Ok(());
        }
        self.backend.enable()?;
        self.enabled = true;
        info!("Compositing enabled");

        for &window in windows {
            self.register(window);
            self.map_notify(wm, window, now);
        }
        Ok(())
    }

    /// Disable compositing, releasing every client's native resources and
    /// the overlay surface. Idempotent.
    pub fn turn_off(&mut self) {
        if !self.enabled {
            return;
        }
        // Compositing is going away; in-flight effects cannot defer
        // teardown any longer.
        self.effects = EffectEngine::new();
        let windows: Vec<WindowId> = self.clients.keys().copied().collect();
        for window in windows {
            if let Some(mut client) = self.clients.remove(&window) {
                client.release(&mut self.backend, &mut self.damage);
            }
        }
        self.backend.disable();
        self.enabled = false;
        info!("Compositing disabled");
    }

    /// Create compositing state for a newly managed window. Idempotent.
    pub fn register(&mut self, window: WindowId) {
        if !self.enabled {
            return;
        }
        if self.clients.contains_key(&window) {
            return;
        }
        debug!("Compositor: registering window {}", window);
        self.clients.insert(window, CompositorClient::new(window));
    }

    /// Release a window's compositing state. When an effect is mid-flight
    /// the teardown is deferred until the effect completes, then happens
    /// exactly once.
    pub fn unregister(&mut self, window: WindowId) {
        let Some(client) = self.clients.get_mut(&window) else {
            return;
        };
        if client.effect_running() {
            debug!("Compositor: deferring teardown of {} until effect completes", window);
            client.pending_destroy = true;
            return;
        }
        let mut client = self.clients.remove(&window).unwrap();
        client.release(&mut self.backend, &mut self.damage);
        debug!("Compositor: unregistered window {}", window);
    }

    /// First-map bootstrap: create the actor, attach the per-type shadow,
    /// and show. Re-deliveries (child windows also generate map events) are
    /// no-ops for the creation path.
    pub fn map_notify<W>(&mut self, wm: &W, window: WindowId, now: Instant)
    where
        W: GeometryProvider + ThemeProvider,
    {
        if !self.enabled {
            return;
        }
        let Some(client) = self.clients.get_mut(&window) else {
            debug!("map_notify for unregistered window {}, ignored", window);
            return;
        };

        let first_map = !client.flags.contains(CompClientFlags::MAPPED);
        if first_map {
            match self.backend.create_actor(window) {
                Ok(actor) => {
                    client.actor = Some(actor);
                    client.flags.insert(CompClientFlags::MAPPED);
                    let shadow = wm.shadow_type(window).map(|kind| ShadowSpec {
                        kind,
                        color: wm.shadow_color(),
                        radius: wm.shadow_radius(),
                        offset: wm.shadow_offset(),
                    });
                    if shadow.is_some() {
                        self.backend.set_actor_shadow(actor, shadow);
                    }
                }
                Err(e) => {
                    // Degrade: the window stays manageable without an actor.
                    warn!("Actor creation failed for window {}: {}", window, e);
                    return;
                }
            }
        }
        // A remap re-arms the terminal-effect suppression.
        client.flags.remove(CompClientFlags::DONE);
        let coverage = wm.get_coverage(window);
        client.show(&mut self.backend, &mut self.damage, coverage);

        if first_map {
            if let Some(spec) = self.effect_for(wm, window, EffectEvent::Map) {
                self.effects
                    .begin(&mut self.backend, &mut self.clients, window, spec, coverage, now);
            }
        }
    }

    /// Run the unmap transition if one applies; hiding is deferred to the
    /// effect's completion when an effect ran, else immediate.
    pub fn unmap_notify<W>(&mut self, wm: &W, window: WindowId, now: Instant)
    where
        W: GeometryProvider + ThemeProvider,
    {
        if !self.enabled {
            return;
        }
        if !self.clients.contains_key(&window) {
            return;
        }
        let coverage = wm.get_coverage(window);
        let started = match self.effect_for(wm, window, EffectEvent::Unmap) {
            Some(spec) => {
                self.effects
                    .begin(&mut self.backend, &mut self.clients, window, spec, coverage, now)
            }
            None => false,
        };
        if !started {
            if let Some(client) = self.clients.get_mut(&window) {
                client.hide(&mut self.backend);
            }
        }
    }

    /// Minimize is visually an unmap with a scale-down instead of a fade.
    pub fn minimize_notify<W>(&mut self, wm: &W, window: WindowId, now: Instant)
    where
        W: GeometryProvider + ThemeProvider,
    {
        if !self.enabled {
            return;
        }
        if !self.clients.contains_key(&window) {
            return;
        }
        let coverage = wm.get_coverage(window);
        let started = match self.effect_for(wm, window, EffectEvent::Minimize) {
            Some(spec) => {
                self.effects
                    .begin(&mut self.backend, &mut self.clients, window, spec, coverage, now)
            }
            None => false,
        };
        if !started {
            if let Some(client) = self.clients.get_mut(&window) {
                client.hide(&mut self.backend);
            }
        }
    }

    /// The window's backing surface is invalid; drop the pixmap binding and
    /// let the next repair refetch once.
    pub fn configure_notify(&mut self, window: WindowId) {
        if !self.enabled {
            return;
        }
        if let Some(client) = self.clients.get_mut(&window) {
            client.configure(&mut self.backend);
        }
    }

    /// Route a native damage event to the owning client's accumulator, and
    /// repair unless more reports are already queued. Returns whether the
    /// event was consumed.
    pub fn handle_damage_event<W>(&mut self, wm: &W, event: DamageEvent) -> bool
    where
        W: GeometryProvider + ThemeProvider,
    {
        if !self.enabled {
            return false;
        }
        let Some(window) = wm.resolve_event_target(event.drawable) else {
            debug!("{}, event dropped", CompositorError::UnresolvableTarget(event.drawable));
            return false;
        };
        let Some(client) = self.clients.get(&window) else {
            debug!("Damage event for uncomposited window {}, dropped", window);
            return false;
        };
        if let Some(damage) = client.damage {
            self.damage.record(damage, event.area);
        }
        if !event.more {
            self.repair(wm, window);
        }
        true
    }

    /// Bring one client's texture up to date.
    pub fn repair<W>(&mut self, wm: &W, window: WindowId)
    where
        W: GeometryProvider + ThemeProvider,
    {
        let Some(client) = self.clients.get_mut(&window) else {
            return;
        };
        let coverage = wm.get_coverage(window);
        let shaped = wm.is_client_shaped(window);
        let argb = wm.is_client_argb(window);
        client.repair(&mut self.backend, &mut self.damage, coverage, shaped, argb);
    }

    /// Cross-fade the incoming top application (and its transients,
    /// recursively) over the outgoing one.
    pub fn transition<W>(&mut self, wm: &W, incoming: WindowId, outgoing: WindowId, now: Instant)
    where
        W: GeometryProvider + ThemeProvider,
    {
        if !self.enabled || incoming == outgoing {
            return;
        }
        let Some(spec) = self.effect_for(wm, incoming, EffectEvent::Transition) else {
            return;
        };
        let transients = collect_transients(wm, incoming);
        self.effects.begin_crossfade(
            &mut self.backend,
            &mut self.clients,
            incoming,
            &transients,
            outgoing,
            spec.duration,
            now,
        );
    }

    /// Mirror the stacking list to the presentation order: bottom to top,
    /// grouped by virtual-desktop layer, skipping clients with no actor
    /// yet. Idempotent.
    pub fn restack<W>(&mut self, wm: &W, stack_bottom_to_top: &[WindowId])
    where
        W: GeometryProvider + ThemeProvider,
    {
        if !self.enabled {
            return;
        }
        let mut layers: BTreeMap<u32, Vec<u64>> = BTreeMap::new();
        for &window in stack_bottom_to_top {
            let Some(actor) = self.clients.get(&window).and_then(|c| c.actor) else {
                continue;
            };
            layers.entry(wm.get_desktop_index(window)).or_default().push(actor);
        }
        let order: Vec<u64> = layers.into_values().flatten().collect();
        self.backend.restack_actors(&order);
    }

    /// Advance in-flight effects and finalize any teardown that was waiting
    /// on them.
    pub fn tick_effects(&mut self, now: Instant) {
        if !self.enabled {
            return;
        }
        let releasable = self.effects.tick(&mut self.backend, &mut self.clients, now);
        for window in releasable {
            if let Some(mut client) = self.clients.remove(&window) {
                client.release(&mut self.backend, &mut self.damage);
                debug!("Compositor: finished deferred teardown of {}", window);
            }
        }
    }

    /// Earliest instant an in-flight effect needs the next tick.
    pub fn next_effect_deadline(&self) -> Option<Instant> {
        self.effects.next_deadline()
    }

    pub fn has_running_effects(&self) -> bool {
        self.effects.has_running()
    }

    /// Paint one frame.
    pub fn present(&mut self) {
        if !self.enabled {
            return;
        }
        if let Err(e) = self.backend.present() {
            warn!("Frame presentation failed: {}", e);
        }
    }

    fn effect_for<W>(&self, wm: &W, window: WindowId, event: EffectEvent) -> Option<EffectSpec>
    where
        W: GeometryProvider + ThemeProvider,
    {
        wm.client_effects(window).into_iter().find(|s| s.event == event)
    }

    #[cfg(test)]
    pub(crate) fn backend(&self) -> &B {
        &self.backend
    }

    #[cfg(test)]
    pub(crate) fn client(&self, window: WindowId) -> Option<&CompositorClient> {
        self.clients.get(&window)
    }
}

/// Transitive transient children of `window`, depth first.
fn collect_transients<W: GeometryProvider>(wm: &W, window: WindowId) -> Vec<WindowId> {
    let mut out = Vec::new();
    let mut queue = wm.get_transients(window);
    while let Some(w) = queue.pop() {
        if out.contains(&w) || w == window {
            continue;
        }
        queue.extend(wm.get_transients(w));
        out.push(w);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use super::effects::EffectKind;
    use super::testing::RecordingBackend;

    #[derive(Default)]
    struct StubWm {
        coverages: HashMap<WindowId, Geometry>,
        types: HashMap<WindowId, ClientTypeFlags>,
        desktops: HashMap<WindowId, u32>,
        transients: HashMap<WindowId, Vec<WindowId>>,
        frames: HashMap<WindowId, WindowId>,
        shadows: bool,
        animate_apps: bool,
    }

    impl StubWm {
        fn with_windows(windows: &[WindowId]) -> Self {
            let mut stub = Self { animate_apps: true, ..Self::default() };
            for &w in windows {
                stub.coverages.insert(w, Geometry::new(0, 0, 100, 100));
                stub.types.insert(w, ClientTypeFlags::APP);
            }
            stub
        }
    }

    impl GeometryProvider for StubWm {
        fn get_coverage(&self, window: WindowId) -> Geometry {
            self.coverages.get(&window).copied().unwrap_or_default()
        }
        fn get_desktop_index(&self, window: WindowId) -> u32 {
            self.desktops.get(&window).copied().unwrap_or(0)
        }
        fn get_transients(&self, window: WindowId) -> Vec<WindowId> {
            self.transients.get(&window).cloned().unwrap_or_default()
        }
        fn client_type(&self, window: WindowId) -> ClientTypeFlags {
            self.types.get(&window).copied().unwrap_or(ClientTypeFlags::APP)
        }
        fn resolve_event_target(&self, window: WindowId) -> Option<WindowId> {
            if let Some(&client) = self.frames.get(&window) {
                return Some(client);
            }
            self.coverages.contains_key(&window).then_some(window)
        }
    }

    impl ThemeProvider for StubWm {
        fn shadow_type(&self, _window: WindowId) -> Option<ShadowKind> {
            self.shadows.then_some(ShadowKind::Gaussian)
        }
        fn shadow_color(&self) -> Rgba {
            Rgba::new(0.0, 0.0, 0.0, 0.6)
        }
        fn shadow_radius(&self) -> u8 {
            8
        }
        fn shadow_offset(&self) -> (i32, i32) {
            (4, 4)
        }
        fn is_client_shaped(&self, _window: WindowId) -> bool {
            false
        }
        fn is_client_argb(&self, _window: WindowId) -> bool {
            false
        }
        fn client_effects(&self, window: WindowId) -> Vec<EffectSpec> {
            if !self.animate_apps || !self.client_type(window).contains(ClientTypeFlags::APP) {
                return Vec::new();
            }
            vec![
                EffectSpec {
                    event: EffectEvent::Map,
                    kind: EffectKind::SlideIn,
                    duration: Duration::from_millis(100),
                },
                EffectSpec {
                    event: EffectEvent::Unmap,
                    kind: EffectKind::Fade,
                    duration: Duration::from_millis(100),
                },
                EffectSpec {
                    event: EffectEvent::Minimize,
                    kind: EffectKind::Scale,
                    duration: Duration::from_millis(100),
                },
                EffectSpec {
                    event: EffectEvent::Transition,
                    kind: EffectKind::CrossFade,
                    duration: Duration::from_millis(100),
                },
            ]
        }
    }

    fn enabled_manager(
        wm: &StubWm,
        windows: &[WindowId],
    ) -> CompositorManager<RecordingBackend> {
        let mut manager = CompositorManager::new(RecordingBackend::new());
        manager.turn_on(wm, &[], Instant::now()).unwrap();
        for &w in windows {
            manager.register(w);
        }
        manager
    }

    #[test]
    fn basic_show_scenario() {
        let mut wm = StubWm::with_windows(&[1]);
        wm.animate_apps = false;
        let mut manager = enabled_manager(&wm, &[1]);
        let now = Instant::now();

        manager.map_notify(&wm, 1, now);
        let actor = manager.client(1).unwrap().actor.unwrap();
        assert!(manager.backend().actor_visible(actor));
        assert!(!manager.client(1).unwrap().flags.contains(CompClientFlags::DONT_UPDATE));
        assert_eq!(manager.backend().actor_creates, 1);

        // A child-window map event re-delivers map_notify; no second actor.
        manager.map_notify(&wm, 1, now);
        assert_eq!(manager.backend().actor_creates, 1);
        assert_eq!(manager.client(1).unwrap().actor, Some(actor));
    }

    #[test]
    fn register_is_idempotent() {
        let wm = StubWm::with_windows(&[1]);
        let mut manager = enabled_manager(&wm, &[1]);
        manager.register(1);
        manager.register(1);
        assert_eq!(manager.backend().actor_creates, 0);
        manager.map_notify(&wm, 1, Instant::now());
        assert_eq!(manager.backend().actor_creates, 1);
    }

    #[test]
    fn operations_are_noops_while_disabled() {
        let wm = StubWm::with_windows(&[1]);
        let mut manager = CompositorManager::new(RecordingBackend::new());
        manager.register(1);
        manager.map_notify(&wm, 1, Instant::now());
        assert!(manager.client(1).is_none());
        assert!(!manager.handle_damage_event(
            &wm,
            DamageEvent { drawable: 1, area: Geometry::new(0, 0, 1, 1), more: false },
        ));
    }

    #[test]
    fn damage_event_routes_through_frame() {
        let mut wm = StubWm::with_windows(&[1]);
        wm.animate_apps = false;
        wm.frames.insert(100, 1);
        let mut manager = enabled_manager(&wm, &[1]);
        manager.map_notify(&wm, 1, Instant::now());

        let consumed = manager.handle_damage_event(
            &wm,
            DamageEvent { drawable: 100, area: Geometry::new(0, 0, 5, 5), more: false },
        );
        assert!(consumed);
        // The bootstrap repair bound a pixmap.
        assert_eq!(manager.backend().pixmap_bind_count(), 1);
    }

    #[test]
    fn unresolvable_damage_event_is_dropped() {
        let wm = StubWm::with_windows(&[1]);
        let mut manager = enabled_manager(&wm, &[1]);
        let consumed = manager.handle_damage_event(
            &wm,
            DamageEvent { drawable: 999, area: Geometry::new(0, 0, 5, 5), more: false },
        );
        assert!(!consumed);
    }

    #[test]
    fn coalesced_damage_defers_repair_until_last_report() {
        let mut wm = StubWm::with_windows(&[1]);
        wm.animate_apps = false;
        let mut manager = enabled_manager(&wm, &[1]);
        manager.map_notify(&wm, 1, Instant::now());

        manager.handle_damage_event(
            &wm,
            DamageEvent { drawable: 1, area: Geometry::new(0, 0, 5, 5), more: true },
        );
        assert_eq!(manager.backend().pixmap_bind_count(), 0);
        manager.handle_damage_event(
            &wm,
            DamageEvent { drawable: 1, area: Geometry::new(5, 5, 5, 5), more: false },
        );
        assert_eq!(manager.backend().pixmap_bind_count(), 1);
    }

    #[test]
    fn restack_is_idempotent_and_skips_actorless() {
        let mut wm = StubWm::with_windows(&[1, 2, 3]);
        wm.animate_apps = false;
        let mut manager = enabled_manager(&wm, &[1, 2, 3]);
        let now = Instant::now();
        manager.map_notify(&wm, 1, now);
        manager.map_notify(&wm, 3, now);
        // Window 2 is registered but never mapped: no actor, skipped.

        manager.restack(&wm, &[2, 3, 1]);
        let first = manager.backend().actor_order();
        manager.restack(&wm, &[2, 3, 1]);
        assert_eq!(manager.backend().actor_order(), first);

        let actor1 = manager.client(1).unwrap().actor.unwrap();
        let actor3 = manager.client(3).unwrap().actor.unwrap();
        assert_eq!(first, vec![actor3, actor1]);
    }

    #[test]
    fn restack_groups_by_desktop_layer() {
        let mut wm = StubWm::with_windows(&[1, 2]);
        wm.animate_apps = false;
        // Window 2 lives on a lower desktop layer than window 1.
        wm.desktops.insert(1, 1);
        wm.desktops.insert(2, 0);
        let mut manager = enabled_manager(&wm, &[1, 2]);
        let now = Instant::now();
        manager.map_notify(&wm, 1, now);
        manager.map_notify(&wm, 2, now);

        // Stack says 1 below 2, but layers override: layer 0 paints first.
        manager.restack(&wm, &[1, 2]);
        let actor1 = manager.client(1).unwrap().actor.unwrap();
        let actor2 = manager.client(2).unwrap().actor.unwrap();
        assert_eq!(manager.backend().actor_order(), vec![actor2, actor1]);
    }

    #[test]
    fn unmap_without_effect_hides_immediately() {
        let mut wm = StubWm::with_windows(&[1]);
        wm.animate_apps = false;
        let mut manager = enabled_manager(&wm, &[1]);
        let now = Instant::now();
        manager.map_notify(&wm, 1, now);
        let actor = manager.client(1).unwrap().actor.unwrap();

        manager.unmap_notify(&wm, 1, now);
        assert!(!manager.backend().actor_visible(actor));
    }

    #[test]
    fn unmap_effect_defers_hide_to_completion() {
        let wm = StubWm::with_windows(&[1]);
        let mut manager = enabled_manager(&wm, &[1]);
        let t0 = Instant::now();
        manager.map_notify(&wm, 1, t0);
        manager.tick_effects(t0 + Duration::from_millis(200));
        let actor = manager.client(1).unwrap().actor.unwrap();

        manager.unmap_notify(&wm, 1, t0 + Duration::from_millis(300));
        assert!(manager.backend().actor_visible(actor));

        manager.tick_effects(t0 + Duration::from_millis(450));
        assert!(!manager.backend().actor_visible(actor));
    }

    #[test]
    fn minimize_effect_defers_hide_and_absorbs_the_withdrawal() {
        let wm = StubWm::with_windows(&[1]);
        let mut manager = enabled_manager(&wm, &[1]);
        let t0 = Instant::now();
        manager.map_notify(&wm, 1, t0);
        manager.tick_effects(t0 + Duration::from_millis(200));
        let actor = manager.client(1).unwrap().actor.unwrap();

        manager.minimize_notify(&wm, 1, t0 + Duration::from_millis(300));
        assert!(manager.backend().actor_visible(actor));
        // Iconification withdraws the window; the resulting unmap starts no
        // second effect and hides nothing while the scale runs.
        manager.unmap_notify(&wm, 1, t0 + Duration::from_millis(310));
        assert!(manager.backend().actor_visible(actor));

        manager.tick_effects(t0 + Duration::from_millis(450));
        assert!(!manager.backend().actor_visible(actor));
        assert_eq!(manager.backend().actor_scale(actor), (1.0, 1.0));
    }

    #[test]
    fn unregister_during_effect_defers_teardown_exactly_once() {
        let wm = StubWm::with_windows(&[1]);
        let mut manager = enabled_manager(&wm, &[1]);
        let t0 = Instant::now();
        manager.map_notify(&wm, 1, t0);
        manager.tick_effects(t0 + Duration::from_millis(200));
        manager.repair(&wm, 1);

        manager.unmap_notify(&wm, 1, t0 + Duration::from_millis(300));
        manager.unregister(1);
        // Teardown deferred: the effect still owns the client.
        assert!(manager.client(1).is_some());
        assert_eq!(manager.backend().actor_destroys, 0);

        manager.tick_effects(t0 + Duration::from_millis(500));
        assert!(manager.client(1).is_none());
        assert!(manager.backend().all_released());
    }

    #[test]
    fn unregister_without_effect_is_immediate_and_balanced() {
        let mut wm = StubWm::with_windows(&[1]);
        wm.animate_apps = false;
        let mut manager = enabled_manager(&wm, &[1]);
        manager.map_notify(&wm, 1, Instant::now());
        manager.repair(&wm, 1);

        manager.unregister(1);
        manager.unregister(1);
        assert!(manager.backend().all_released());
    }

    #[test]
    fn turn_off_and_on_scenario() {
        let mut wm = StubWm::with_windows(&[1, 2, 3]);
        wm.animate_apps = false;
        let mut manager = enabled_manager(&wm, &[1, 2, 3]);
        let now = Instant::now();
        for w in [1, 2, 3] {
            manager.map_notify(&wm, w, now);
            manager.repair(&wm, w);
        }
        assert_eq!(manager.backend().live_actor_count(), 3);
        assert_eq!(manager.backend().live_pixmap_count(), 3);
        assert_eq!(manager.backend().live_damage_count(), 3);

        manager.turn_off();
        assert!(!manager.enabled());
        assert!(manager.backend().all_released());

        manager.turn_on(&wm, &[1, 2, 3], now).unwrap();
        assert!(manager.enabled());
        assert_eq!(manager.backend().live_actor_count(), 3);
        assert_eq!(manager.backend().live_damage_count(), 3);

        // turn_on is idempotent.
        manager.turn_on(&wm, &[1, 2, 3], now).unwrap();
        assert_eq!(manager.backend().live_actor_count(), 3);
    }

    #[test]
    fn transition_crossfades_incoming_and_transients() {
        let mut wm = StubWm::with_windows(&[1, 2, 3]);
        wm.transients.insert(1, vec![3]);
        let mut manager = enabled_manager(&wm, &[1, 2, 3]);
        let t0 = Instant::now();
        for w in [1, 2, 3] {
            manager.map_notify(&wm, w, t0);
        }
        manager.tick_effects(t0 + Duration::from_millis(200));

        manager.transition(&wm, 1, 2, t0 + Duration::from_millis(300));
        let incoming = manager.client(1).unwrap().actor.unwrap();
        let transient = manager.client(3).unwrap().actor.unwrap();
        let outgoing = manager.client(2).unwrap().actor.unwrap();
        assert_eq!(manager.backend().actor_opacity(incoming), 0.0);
        assert_eq!(manager.backend().actor_opacity(transient), 0.0);
        assert_eq!(manager.backend().actor_opacity(outgoing), 1.0);

        manager.tick_effects(t0 + Duration::from_millis(500));
        assert_eq!(manager.backend().actor_opacity(incoming), 1.0);
        assert_eq!(manager.backend().actor_opacity(outgoing), 1.0);
    }

    #[test]
    fn shadow_attached_on_first_map() {
        let mut wm = StubWm::with_windows(&[1]);
        wm.shadows = true;
        wm.animate_apps = false;
        let mut manager = enabled_manager(&wm, &[1]);
        manager.map_notify(&wm, 1, Instant::now());
        let actor = manager.client(1).unwrap().actor.unwrap();
        let shadow = manager.backend().actor_shadow(actor).unwrap();
        assert_eq!(shadow.kind, ShadowKind::Gaussian);
        assert_eq!(shadow.radius, 8);
    }

    #[test]
    fn actor_creation_failure_degrades_gracefully() {
        let wm = StubWm::with_windows(&[1]);
        let mut manager = enabled_manager(&wm, &[1]);
        // Simulate bind failure on the bootstrap repair.
        manager.map_notify(&wm, 1, Instant::now());
        manager.backend.fail_next_bind = true;
        manager.repair(&wm, 1);
        assert!(manager.client(1).unwrap().pixmap.is_none());
        // Next repair recovers.
        manager.repair(&wm, 1);
        assert!(manager.client(1).unwrap().pixmap.is_some());
    }
}

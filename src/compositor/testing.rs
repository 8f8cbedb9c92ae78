//! Recording backend for tests.
//!
//! Implements [`Backend`] entirely in memory, counting every native acquire
//! and release independently (actors, pixmaps, damage objects) and recording
//! actor state, so resource-balance and ordering properties are assertable
//! without an X server.

use std::collections::HashMap;

use crate::compositor::backend::{Backend, PixmapInfo, ShadowSpec};
use crate::error::{CompositorError, Result};
use crate::shared::{ActorId, DamageId, Geometry, WindowId};

const OVERLAY: WindowId = 0xffff_0001;

#[derive(Debug, Default)]
struct MockActor {
    window: WindowId,
    geometry: Geometry,
    visible: bool,
    opacity: f64,
    scale: (f64, f64),
    offset: (i32, i32),
    pixmap: Option<PixmapInfo>,
    shadow: Option<ShadowSpec>,
    last_update: Option<Vec<Geometry>>,
    cleared: Vec<Geometry>,
}

#[derive(Debug, Default)]
pub struct RecordingBackend {
    enabled: bool,
    actors: HashMap<ActorId, MockActor>,
    order: Vec<ActorId>,
    next_actor: ActorId,
    next_damage: DamageId,
    next_pixmap: u32,

    live_damage: HashMap<DamageId, WindowId>,
    subtract_counts: HashMap<DamageId, usize>,
    visible_regions: HashMap<WindowId, Vec<Geometry>>,
    window_geometries: HashMap<WindowId, Geometry>,

    pub actor_creates: usize,
    pub actor_destroys: usize,
    pub pixmap_binds: usize,
    pub pixmap_frees: usize,
    pub damage_creates: usize,
    pub damage_destroys: usize,
    pub presents: usize,
    /// Fail the next pixmap bind, simulating upstream resource exhaustion.
    pub fail_next_bind: bool,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self { next_actor: 1, next_damage: 1, next_pixmap: 1, ..Self::default() }
    }

    pub fn set_visible_region(&mut self, window: WindowId, rects: Vec<Geometry>) {
        self.visible_regions.insert(window, rects);
    }

    pub fn set_window_geometry(&mut self, window: WindowId, geometry: Geometry) {
        self.window_geometries.insert(window, geometry);
    }

    fn actor(&self, actor: ActorId) -> &MockActor {
        self.actors.get(&actor).expect("unknown actor")
    }

    pub fn actor_visible(&self, actor: ActorId) -> bool {
        self.actor(actor).visible
    }

    pub fn actor_opacity(&self, actor: ActorId) -> f64 {
        self.actor(actor).opacity
    }

    pub fn actor_offset(&self, actor: ActorId) -> (i32, i32) {
        self.actor(actor).offset
    }

    pub fn actor_scale(&self, actor: ActorId) -> (f64, f64) {
        self.actor(actor).scale
    }

    pub fn actor_geometry(&self, actor: ActorId) -> Geometry {
        self.actor(actor).geometry
    }

    pub fn actor_shadow(&self, actor: ActorId) -> Option<ShadowSpec> {
        self.actor(actor).shadow
    }

    pub fn last_texture_update(&self, actor: ActorId) -> Option<Vec<Geometry>> {
        self.actor(actor).last_update.clone()
    }

    pub fn cleared_area(&self, actor: ActorId) -> u64 {
        self.actor(actor)
            .cleared
            .iter()
            .map(|r| r.width as u64 * r.height as u64)
            .sum()
    }

    pub fn live_actor_count(&self) -> usize {
        self.actors.len()
    }

    pub fn live_damage_count(&self) -> usize {
        self.live_damage.len()
    }

    pub fn live_pixmap_count(&self) -> usize {
        self.actors.values().filter(|a| a.pixmap.is_some()).count()
    }

    pub fn pixmap_bind_count(&self) -> usize {
        self.pixmap_binds
    }

    pub fn damage_subtract_count(&self, damage: DamageId) -> usize {
        self.subtract_counts.get(&damage).copied().unwrap_or(0)
    }

    /// Every acquire has a matching release and nothing is live.
    pub fn all_released(&self) -> bool {
        self.actors.is_empty()
            && self.live_damage.is_empty()
            && self.actor_creates == self.actor_destroys
            && self.pixmap_binds == self.pixmap_frees
            && self.damage_creates == self.damage_destroys
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Backend for RecordingBackend {
    fn enable(&mut self) -> Result<()> {
        self.enabled = true;
        Ok(())
    }

    fn disable(&mut self) {
        self.enabled = false;
    }

    fn is_backend_window(&self, window: WindowId) -> bool {
        self.enabled && window == OVERLAY
    }

    fn create_actor(&mut self, window: WindowId) -> Result<ActorId> {
        let id = self.next_actor;
        self.next_actor += 1;
        self.actors.insert(
            id,
            MockActor { window, opacity: 1.0, scale: (1.0, 1.0), ..MockActor::default() },
        );
        self.order.push(id);
        self.actor_creates += 1;
        Ok(id)
    }

    fn destroy_actor(&mut self, actor: ActorId) {
        self.free_window_pixmap(actor);
        if self.actors.remove(&actor).is_some() {
            self.order.retain(|&a| a != actor);
            self.actor_destroys += 1;
        }
    }

    fn show_actor(&mut self, actor: ActorId) {
        if let Some(a) = self.actors.get_mut(&actor) {
            a.visible = true;
        }
    }

    fn hide_actor(&mut self, actor: ActorId) {
        if let Some(a) = self.actors.get_mut(&actor) {
            a.visible = false;
        }
    }

    fn move_resize_actor(&mut self, actor: ActorId, geometry: Geometry) {
        if let Some(a) = self.actors.get_mut(&actor) {
            a.geometry = geometry;
        }
    }

    fn set_actor_opacity(&mut self, actor: ActorId, opacity: f64) {
        if let Some(a) = self.actors.get_mut(&actor) {
            a.opacity = opacity.clamp(0.0, 1.0);
        }
    }

    fn set_actor_scale(&mut self, actor: ActorId, sx: f64, sy: f64) {
        if let Some(a) = self.actors.get_mut(&actor) {
            a.scale = (sx, sy);
        }
    }

    fn set_actor_offset(&mut self, actor: ActorId, dx: i32, dy: i32) {
        if let Some(a) = self.actors.get_mut(&actor) {
            a.offset = (dx, dy);
        }
    }

    fn set_actor_shadow(&mut self, actor: ActorId, shadow: Option<ShadowSpec>) {
        if let Some(a) = self.actors.get_mut(&actor) {
            a.shadow = shadow;
        }
    }

    fn bind_window_pixmap(&mut self, actor: ActorId, window: WindowId) -> Result<PixmapInfo> {
        if self.fail_next_bind {
            self.fail_next_bind = false;
            return Err(CompositorError::ResourceExhaustion("simulated bind failure"));
        }
        let geometry = self
            .window_geometries
            .get(&window)
            .copied()
            .unwrap_or_else(|| Geometry::new(0, 0, 640, 480));
        let info = PixmapInfo {
            pixmap: self.next_pixmap,
            width: geometry.width as u16,
            height: geometry.height as u16,
            depth: 24,
        };
        self.next_pixmap += 1;
        self.free_window_pixmap(actor);
        let Some(a) = self.actors.get_mut(&actor) else {
            return Err(CompositorError::ResourceExhaustion("actor gone"));
        };
        a.pixmap = Some(info);
        self.pixmap_binds += 1;
        Ok(info)
    }

    fn free_window_pixmap(&mut self, actor: ActorId) {
        if let Some(a) = self.actors.get_mut(&actor) {
            if a.pixmap.take().is_some() {
                self.pixmap_frees += 1;
            }
        }
    }

    fn update_texture(&mut self, actor: ActorId, rects: &[Geometry]) {
        if let Some(a) = self.actors.get_mut(&actor) {
            a.last_update = Some(rects.to_vec());
        }
    }

    fn clear_texture_area(&mut self, actor: ActorId, tiles: &[Geometry]) {
        if let Some(a) = self.actors.get_mut(&actor) {
            a.cleared.extend_from_slice(tiles);
        }
    }

    fn create_damage(&mut self, window: WindowId) -> Result<DamageId> {
        let id = self.next_damage;
        self.next_damage += 1;
        self.live_damage.insert(id, window);
        self.damage_creates += 1;
        Ok(id)
    }

    fn destroy_damage(&mut self, damage: DamageId) {
        if self.live_damage.remove(&damage).is_some() {
            self.damage_destroys += 1;
        }
    }

    fn subtract_damage(&mut self, damage: DamageId) {
        *self.subtract_counts.entry(damage).or_insert(0) += 1;
    }

    fn window_visible_region(&self, window: WindowId) -> Result<Vec<Geometry>> {
        Ok(self.visible_regions.get(&window).cloned().unwrap_or_default())
    }

    fn restack_actors(&mut self, bottom_to_top: &[ActorId]) {
        let mut order: Vec<ActorId> = self
            .order
            .iter()
            .copied()
            .filter(|a| !bottom_to_top.contains(a))
            .collect();
        order.extend_from_slice(bottom_to_top);
        self.order = order;
    }

    fn actor_order(&self) -> Vec<ActorId> {
        self.order.clone()
    }

    fn present(&mut self) -> Result<()> {
        self.presents += 1;
        Ok(())
    }
}

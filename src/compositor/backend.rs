//! Compositing backend.
//!
//! The [`Backend`] trait is the seam between the compositor core and the X
//! server: actors (off-screen visual proxies), window pixmaps, damage
//! objects, and frame presentation. [`X11Backend`] is the production
//! implementation, an XRender compositor: every redirected window is bound
//! to a named pixmap, wrapped in a Render picture, and painted onto the
//! composite overlay window in stack order each frame. Tests use the
//! recording backend in `testing`.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, trace, warn};
use x11rb::connection::{Connection, RequestConnection};
use x11rb::protocol::composite::{self, ConnectionExt as _};
use x11rb::protocol::damage::{self, ConnectionExt as _};
use x11rb::protocol::render::{self, ConnectionExt as _};
use x11rb::protocol::shape::{self, ConnectionExt as _};
use x11rb::protocol::xfixes::{self, ConnectionExt as _};
use x11rb::protocol::xproto::{self, ConnectionExt as _};
use x11rb::rust_connection::RustConnection;

use crate::compositor::shadow::{self, ShadowKind};
use crate::error::{CompositorError, Result};
use crate::shared::{ActorId, DamageId, Geometry, Rgba, WindowId};

/// Native backing-store binding for a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixmapInfo {
    pub pixmap: u32,
    pub width: u16,
    pub height: u16,
    pub depth: u8,
}

/// Drop-shadow decoration attached to an actor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowSpec {
    pub kind: ShadowKind,
    pub color: Rgba,
    pub radius: u8,
    pub offset: (i32, i32),
}

/// The compositor core talks to the server exclusively through this trait.
///
/// Mutation methods that can only fail for already-dead resources absorb the
/// error and log; fallible acquisition returns `Result` so callers can
/// degrade to "no visual representation this frame".
pub trait Backend {
    /// Acquire global compositing resources (redirection, overlay).
    fn enable(&mut self) -> Result<()>;
    /// Release global compositing resources. Idempotent.
    fn disable(&mut self);
    /// True for the overlay and presentation surfaces; the window manager
    /// must never manage these.
    fn is_backend_window(&self, window: WindowId) -> bool;

    fn create_actor(&mut self, window: WindowId) -> Result<ActorId>;
    fn destroy_actor(&mut self, actor: ActorId);
    fn show_actor(&mut self, actor: ActorId);
    fn hide_actor(&mut self, actor: ActorId);
    fn move_resize_actor(&mut self, actor: ActorId, geometry: Geometry);
    fn set_actor_opacity(&mut self, actor: ActorId, opacity: f64);
    fn set_actor_scale(&mut self, actor: ActorId, sx: f64, sy: f64);
    fn set_actor_offset(&mut self, actor: ActorId, dx: i32, dy: i32);
    fn set_actor_shadow(&mut self, actor: ActorId, shadow: Option<ShadowSpec>);

    /// Bind the window's redirected backing pixmap to the actor's texture.
    fn bind_window_pixmap(&mut self, actor: ActorId, window: WindowId) -> Result<PixmapInfo>;
    /// Release the actor's pixmap binding. Idempotent.
    fn free_window_pixmap(&mut self, actor: ActorId);
    /// Push the given window-local rectangles from the pixmap into the
    /// presented texture.
    fn update_texture(&mut self, actor: ActorId, rects: &[Geometry]);
    /// Make the given window-local rectangles transparent in the presented
    /// texture (shaped-window clearing).
    fn clear_texture_area(&mut self, actor: ActorId, tiles: &[Geometry]);

    fn create_damage(&mut self, window: WindowId) -> Result<DamageId>;
    fn destroy_damage(&mut self, damage: DamageId);
    fn subtract_damage(&mut self, damage: DamageId);

    /// Bounding-shape rectangles of a shaped window, window-local.
    fn window_visible_region(&self, window: WindowId) -> Result<Vec<Geometry>>;

    /// Set the presentation order of actors, bottom to top. Actors not
    /// listed keep their relative order below the listed ones.
    fn restack_actors(&mut self, bottom_to_top: &[ActorId]);
    /// Current presentation order, bottom to top.
    fn actor_order(&self) -> Vec<ActorId>;

    /// Paint one frame.
    fn present(&mut self) -> Result<()>;
}

#[derive(Debug)]
struct Actor {
    window: WindowId,
    geometry: Geometry,
    visible: bool,
    opacity: f64,
    scale: (f64, f64),
    offset: (i32, i32),
    pixmap: Option<PixmapInfo>,
    picture: Option<render::Picture>,
    shadow: Option<ShadowSpec>,
}

impl Actor {
    fn new(window: WindowId) -> Self {
        Self {
            window,
            geometry: Geometry::default(),
            visible: false,
            opacity: 1.0,
            scale: (1.0, 1.0),
            offset: (0, 0),
            pixmap: None,
            picture: None,
            shadow: None,
        }
    }
}

/// XRender-based compositing backend.
pub struct X11Backend {
    conn: Arc<RustConnection>,
    root: WindowId,
    root_depth: u8,
    root_visual: xproto::Visualid,
    screen_size: (u16, u16),

    overlay: Option<WindowId>,
    overlay_picture: Option<render::Picture>,
    buffer: Option<(xproto::Pixmap, render::Picture)>,

    /// Visual id to picture format, filled at enable().
    formats: HashMap<xproto::Visualid, render::Pictformat>,
    /// Fallback formats by depth for visuals with no direct mapping.
    depth_formats: HashMap<u8, render::Pictformat>,
    alpha_format: Option<render::Pictformat>,

    actors: HashMap<ActorId, Actor>,
    order: Vec<ActorId>,
    next_actor: ActorId,

    /// Shared shadow alpha textures keyed by (width, height, radius), built
    /// lazily once per size and reused across actors.
    shadow_cache: HashMap<(u16, u16, u8), (xproto::Pixmap, render::Picture)>,

    dirty: bool,
}

impl X11Backend {
    /// Check required extensions and negotiate versions. Failure here is
    /// fatal to compositing only; the window manager keeps running.
    pub fn new(conn: Arc<RustConnection>, screen_num: usize) -> Result<Self> {
        let screen = &conn.setup().roots[screen_num];
        let root = screen.root;
        let root_depth = screen.root_depth;
        let root_visual = screen.root_visual;
        let screen_size = (screen.width_in_pixels, screen.height_in_pixels);

        conn.extension_information(composite::X11_EXTENSION_NAME)?
            .ok_or(CompositorError::ExtensionUnavailable("Composite"))?;
        let composite_version = conn.composite_query_version(0, 4)?.reply()?;
        info!(
            "Composite extension {}.{}",
            composite_version.major_version, composite_version.minor_version
        );

        conn.extension_information(damage::X11_EXTENSION_NAME)?
            .ok_or(CompositorError::ExtensionUnavailable("Damage"))?;
        let damage_version = conn.damage_query_version(1, 1)?.reply()?;
        info!(
            "Damage extension {}.{}",
            damage_version.major_version, damage_version.minor_version
        );

        conn.extension_information(xfixes::X11_EXTENSION_NAME)?
            .ok_or(CompositorError::ExtensionUnavailable("XFixes"))?;
        conn.xfixes_query_version(5, 0)?.reply()?;

        conn.extension_information(render::X11_EXTENSION_NAME)?
            .ok_or(CompositorError::ExtensionUnavailable("Render"))?;
        let render_version = conn.render_query_version(0, 11)?.reply()?;
        info!(
            "Render extension {}.{}",
            render_version.major_version, render_version.minor_version
        );

        Ok(Self {
            conn,
            root,
            root_depth,
            root_visual,
            screen_size,
            overlay: None,
            overlay_picture: None,
            buffer: None,
            formats: HashMap::new(),
            depth_formats: HashMap::new(),
            alpha_format: None,
            actors: HashMap::new(),
            order: Vec::new(),
            next_actor: 1,
            shadow_cache: HashMap::new(),
            dirty: true,
        })
    }

    fn load_formats(&mut self) -> Result<()> {
        let reply = self.conn.render_query_pict_formats()?.reply()?;

        for format in &reply.formats {
            if format.type_ == render::PictType::DIRECT {
                self.depth_formats.entry(format.depth).or_insert(format.id);
                if format.depth == 8 && format.direct.alpha_mask == 0xff {
                    self.alpha_format = Some(format.id);
                }
            }
        }
        for screen in &reply.screens {
            for depth in &screen.depths {
                for visual in &depth.visuals {
                    self.formats.insert(visual.visual, visual.format);
                }
            }
        }
        Ok(())
    }

    fn format_for_window(&self, window: WindowId, depth: u8) -> Option<render::Pictformat> {
        let visual = self
            .conn
            .get_window_attributes(window)
            .ok()
            .and_then(|c| c.reply().ok())
            .map(|attrs| attrs.visual);
        visual
            .and_then(|v| self.formats.get(&v).copied())
            .or_else(|| self.depth_formats.get(&depth).copied())
    }

    fn to_rectangles(rects: &[Geometry]) -> Vec<xproto::Rectangle> {
        rects
            .iter()
            .map(|r| xproto::Rectangle {
                x: r.x as i16,
                y: r.y as i16,
                width: r.width as u16,
                height: r.height as u16,
            })
            .collect()
    }

    /// Fetch (or lazily build) the shared shadow alpha texture for a given
    /// extent.
    fn shadow_picture(
        &mut self,
        width: u16,
        height: u16,
        spec: &ShadowSpec,
    ) -> Result<render::Picture> {
        let key = (width, height, spec.radius);
        if let Some((_, picture)) = self.shadow_cache.get(&key) {
            return Ok(*picture);
        }
        let Some(alpha_format) = self.alpha_format else {
            return Err(CompositorError::ExtensionUnavailable("Render A8 format"));
        };

        let image = match spec.kind {
            ShadowKind::Gaussian => shadow::gaussian_shadow_image(width, height, spec.radius),
            ShadowKind::Simple => shadow::simple_shadow_image(width, height),
        };

        let pixmap = self.conn.generate_id()?;
        self.conn
            .create_pixmap(8, pixmap, self.root, image.width, image.height)?;
        let gc = self.conn.generate_id()?;
        self.conn.create_gc(gc, pixmap, &xproto::CreateGCAux::new())?;
        self.conn.put_image(
            xproto::ImageFormat::Z_PIXMAP,
            pixmap,
            gc,
            image.width,
            image.height,
            0,
            0,
            0,
            8,
            &image.data,
        )?;
        self.conn.free_gc(gc)?;

        let picture = self.conn.generate_id()?;
        self.conn.render_create_picture(
            picture,
            pixmap,
            alpha_format,
            &render::CreatePictureAux::new(),
        )?;

        debug!("Built shadow texture {}x{} r{}", image.width, image.height, spec.radius);
        self.shadow_cache.insert(key, (pixmap, picture));
        Ok(picture)
    }

    fn solid_fill(&self, color: Rgba) -> Result<render::Picture> {
        let picture = self.conn.generate_id()?;
        self.conn.render_create_solid_fill(
            picture,
            render::Color {
                red: (color.r * color.a * 65535.0) as u16,
                green: (color.g * color.a * 65535.0) as u16,
                blue: (color.b * color.a * 65535.0) as u16,
                alpha: (color.a * 65535.0) as u16,
            },
        )?;
        Ok(picture)
    }

    fn paint_actor(&self, actor: &Actor, target: render::Picture) -> Result<()> {
        let Some(picture) = actor.picture else {
            return Ok(());
        };
        let (sx, sy) = actor.scale;
        if sx <= 0.0 || sy <= 0.0 {
            return Ok(());
        }
        let geometry = actor.geometry.offset(actor.offset.0, actor.offset.1);
        let width = (geometry.width as f64 * sx).round() as u16;
        let height = (geometry.height as f64 * sy).round() as u16;
        if width == 0 || height == 0 {
            return Ok(());
        }
        // Anchor scaling at the actor center.
        let dst_x = geometry.x + ((geometry.width as f64 * (1.0 - sx)) / 2.0) as i32;
        let dst_y = geometry.y + ((geometry.height as f64 * (1.0 - sy)) / 2.0) as i32;

        if (sx - 1.0).abs() > f64::EPSILON || (sy - 1.0).abs() > f64::EPSILON {
            let fixed = |v: f64| (v * 65536.0) as render::Fixed;
            self.conn.render_set_picture_transform(
                picture,
                render::Transform {
                    matrix11: fixed(1.0 / sx),
                    matrix12: 0,
                    matrix13: 0,
                    matrix21: 0,
                    matrix22: fixed(1.0 / sy),
                    matrix23: 0,
                    matrix31: 0,
                    matrix32: 0,
                    matrix33: fixed(1.0),
                },
            )?;
        }

        let mask = if actor.opacity < 1.0 {
            Some(self.solid_fill(Rgba::new(1.0, 1.0, 1.0, actor.opacity as f32))?)
        } else {
            None
        };

        self.conn.render_composite(
            render::PictOp::OVER,
            picture,
            mask.unwrap_or(x11rb::NONE),
            target,
            0,
            0,
            0,
            0,
            dst_x as i16,
            dst_y as i16,
            width,
            height,
        )?;

        if let Some(mask) = mask {
            self.conn.render_free_picture(mask)?;
        }
        if (sx - 1.0).abs() > f64::EPSILON || (sy - 1.0).abs() > f64::EPSILON {
            // Reset the transform so damage repairs composite unscaled.
            let fixed = |v: f64| (v * 65536.0) as render::Fixed;
            self.conn.render_set_picture_transform(
                picture,
                render::Transform {
                    matrix11: fixed(1.0),
                    matrix12: 0,
                    matrix13: 0,
                    matrix21: 0,
                    matrix22: fixed(1.0),
                    matrix23: 0,
                    matrix31: 0,
                    matrix32: 0,
                    matrix33: fixed(1.0),
                },
            )?;
        }
        Ok(())
    }

    fn paint_shadow(&mut self, actor_id: ActorId, target: render::Picture) -> Result<()> {
        let Some(actor) = self.actors.get(&actor_id) else {
            return Ok(());
        };
        let Some(spec) = actor.shadow else {
            return Ok(());
        };
        if actor.opacity < 1.0 || actor.scale != (1.0, 1.0) {
            // No shadow while a fade or scale effect is distorting the actor.
            return Ok(());
        }
        let geometry = actor.geometry.offset(actor.offset.0, actor.offset.1);
        let width = geometry.width as u16;
        let height = geometry.height as u16;
        let shadow = self.shadow_picture(width, height, &spec)?;
        let fill = self.solid_fill(spec.color)?;
        let pad = match spec.kind {
            ShadowKind::Gaussian => spec.radius as i32,
            ShadowKind::Simple => 0,
        };
        self.conn.render_composite(
            render::PictOp::OVER,
            fill,
            shadow,
            target,
            0,
            0,
            0,
            0,
            (geometry.x + spec.offset.0 - pad) as i16,
            (geometry.y + spec.offset.1 - pad) as i16,
            width + 2 * pad as u16,
            height + 2 * pad as u16,
        )?;
        self.conn.render_free_picture(fill)?;
        Ok(())
    }
}

impl Backend for X11Backend {
    fn enable(&mut self) -> Result<()> {
        if self.overlay.is_some() {
            return Ok(());
        }
        self.load_formats()?;

        self.conn
            .composite_redirect_subwindows(self.root, composite::Redirect::MANUAL)?;
        let overlay = self
            .conn
            .composite_get_overlay_window(self.root)?
            .reply()?
            .overlay_win;
        info!("Using composite overlay window {}", overlay);

        // Input passes through the overlay to the windows underneath.
        self.conn.shape_rectangles(
            shape::SO::SET,
            shape::SK::INPUT,
            xproto::ClipOrdering::UNSORTED,
            overlay,
            0,
            0,
            &[],
        )?;

        let root_format = self
            .formats
            .get(&self.root_visual)
            .copied()
            .ok_or(CompositorError::ExtensionUnavailable("Render root visual format"))?;

        let overlay_picture = self.conn.generate_id()?;
        self.conn.render_create_picture(
            overlay_picture,
            overlay,
            root_format,
            &render::CreatePictureAux::new()
                .subwindowmode(xproto::SubwindowMode::INCLUDE_INFERIORS),
        )?;

        let buffer_pixmap = self.conn.generate_id()?;
        self.conn.create_pixmap(
            self.root_depth,
            buffer_pixmap,
            self.root,
            self.screen_size.0,
            self.screen_size.1,
        )?;
        let buffer_picture = self.conn.generate_id()?;
        self.conn.render_create_picture(
            buffer_picture,
            buffer_pixmap,
            root_format,
            &render::CreatePictureAux::new(),
        )?;

        self.overlay = Some(overlay);
        self.overlay_picture = Some(overlay_picture);
        self.buffer = Some((buffer_pixmap, buffer_picture));
        self.dirty = true;
        self.conn.flush()?;
        Ok(())
    }

    fn disable(&mut self) {
        if self.overlay.is_none() {
            return;
        }
        for (_, (pixmap, picture)) in self.shadow_cache.drain() {
            let _ = self.conn.render_free_picture(picture);
            let _ = self.conn.free_pixmap(pixmap);
        }
        if let Some(picture) = self.overlay_picture.take() {
            let _ = self.conn.render_free_picture(picture);
        }
        if let Some((pixmap, picture)) = self.buffer.take() {
            let _ = self.conn.render_free_picture(picture);
            let _ = self.conn.free_pixmap(pixmap);
        }
        let _ = self.conn.composite_release_overlay_window(self.root);
        let _ = self
            .conn
            .composite_unredirect_subwindows(self.root, composite::Redirect::MANUAL);
        let _ = self.conn.flush();
        self.overlay = None;
        info!("Compositing backend disabled");
    }

    fn is_backend_window(&self, window: WindowId) -> bool {
        self.overlay == Some(window)
    }

    fn create_actor(&mut self, window: WindowId) -> Result<ActorId> {
        let id = self.next_actor;
        self.next_actor += 1;
        self.actors.insert(id, Actor::new(window));
        self.order.push(id);
        debug!("Created actor {} for window {}", id, window);
        Ok(id)
    }

    fn destroy_actor(&mut self, actor: ActorId) {
        self.free_window_pixmap(actor);
        if self.actors.remove(&actor).is_some() {
            self.order.retain(|&a| a != actor);
            self.dirty = true;
            debug!("Destroyed actor {}", actor);
        }
    }

    fn show_actor(&mut self, actor: ActorId) {
        if let Some(a) = self.actors.get_mut(&actor) {
            a.visible = true;
            self.dirty = true;
        }
    }

    fn hide_actor(&mut self, actor: ActorId) {
        if let Some(a) = self.actors.get_mut(&actor) {
            a.visible = false;
            self.dirty = true;
        }
    }

    fn move_resize_actor(&mut self, actor: ActorId, geometry: Geometry) {
        if let Some(a) = self.actors.get_mut(&actor) {
            a.geometry = geometry;
            self.dirty = true;
        }
    }

    fn set_actor_opacity(&mut self, actor: ActorId, opacity: f64) {
        if let Some(a) = self.actors.get_mut(&actor) {
            a.opacity = opacity.clamp(0.0, 1.0);
            self.dirty = true;
        }
    }

    fn set_actor_scale(&mut self, actor: ActorId, sx: f64, sy: f64) {
        if let Some(a) = self.actors.get_mut(&actor) {
            a.scale = (sx.max(0.0), sy.max(0.0));
            self.dirty = true;
        }
    }

    fn set_actor_offset(&mut self, actor: ActorId, dx: i32, dy: i32) {
        if let Some(a) = self.actors.get_mut(&actor) {
            a.offset = (dx, dy);
            self.dirty = true;
        }
    }

    fn set_actor_shadow(&mut self, actor: ActorId, shadow: Option<ShadowSpec>) {
        if let Some(a) = self.actors.get_mut(&actor) {
            a.shadow = shadow;
            self.dirty = true;
        }
    }

    fn bind_window_pixmap(&mut self, actor: ActorId, window: WindowId) -> Result<PixmapInfo> {
        let pixmap = self.conn.generate_id()?;
        self.conn
            .composite_name_window_pixmap(window, pixmap)?
            .check()?;

        let geometry = match self.conn.get_geometry(pixmap)?.reply() {
            Ok(g) => g,
            Err(e) => {
                let _ = self.conn.free_pixmap(pixmap);
                return Err(e.into());
            }
        };
        if geometry.width == 0 || geometry.height == 0 {
            let _ = self.conn.free_pixmap(pixmap);
            return Err(CompositorError::ResourceExhaustion("empty window pixmap"));
        }

        let info = PixmapInfo {
            pixmap,
            width: geometry.width,
            height: geometry.height,
            depth: geometry.depth,
        };

        let Some(format) = self.format_for_window(window, geometry.depth) else {
            let _ = self.conn.free_pixmap(pixmap);
            return Err(CompositorError::ResourceExhaustion("no picture format"));
        };

        let picture = self.conn.generate_id()?;
        self.conn
            .render_create_picture(picture, pixmap, format, &render::CreatePictureAux::new())?;

        // Drop any previous binding before adopting the new one.
        self.free_window_pixmap(actor);
        if let Some(a) = self.actors.get_mut(&actor) {
            a.pixmap = Some(info);
            a.picture = Some(picture);
            self.dirty = true;
            Ok(info)
        } else {
            let _ = self.conn.render_free_picture(picture);
            let _ = self.conn.free_pixmap(pixmap);
            Err(CompositorError::ResourceExhaustion("actor gone"))
        }
    }

    fn free_window_pixmap(&mut self, actor: ActorId) {
        if let Some(a) = self.actors.get_mut(&actor) {
            if let Some(picture) = a.picture.take() {
                let _ = self.conn.render_free_picture(picture);
            }
            if let Some(info) = a.pixmap.take() {
                let _ = self.conn.free_pixmap(info.pixmap);
                self.dirty = true;
            }
        }
    }

    fn update_texture(&mut self, _actor: ActorId, rects: &[Geometry]) {
        // The picture reads the live pixmap; a repair only needs to schedule
        // a repaint of the dirtied frame.
        if !rects.is_empty() {
            self.dirty = true;
        }
    }

    fn clear_texture_area(&mut self, actor: ActorId, tiles: &[Geometry]) {
        let Some(a) = self.actors.get(&actor) else {
            return;
        };
        let Some(picture) = a.picture else {
            return;
        };
        let Some(info) = a.pixmap else {
            return;
        };
        let clear = || -> Result<()> {
            let full = self.conn.generate_id()?;
            self.conn.xfixes_create_region(
                full,
                &[xproto::Rectangle { x: 0, y: 0, width: info.width, height: info.height }],
            )?;
            let holes = self.conn.generate_id()?;
            self.conn
                .xfixes_create_region(holes, &Self::to_rectangles(tiles))?;
            self.conn.xfixes_subtract_region(full, holes, full)?;
            self.conn.xfixes_set_picture_clip_region(picture, full, 0, 0)?;
            self.conn.xfixes_destroy_region(holes)?;
            self.conn.xfixes_destroy_region(full)?;
            Ok(())
        };
        if let Err(e) = clear() {
            warn!("Failed to clear shaped texture area: {}", e);
        }
        self.dirty = true;
    }

    fn create_damage(&mut self, window: WindowId) -> Result<DamageId> {
        let id = self.conn.generate_id()?;
        self.conn
            .damage_create(id, window, damage::ReportLevel::NON_EMPTY)?
            .check()?;
        Ok(id)
    }

    fn destroy_damage(&mut self, damage: DamageId) {
        // BadDamage is expected when the tracked window already died.
        if let Err(e) = self.conn.damage_destroy(damage) {
            trace!("damage_destroy({}): {:?}", damage, e);
        }
    }

    fn subtract_damage(&mut self, damage: DamageId) {
        if let Err(e) = self.conn.damage_subtract(damage, x11rb::NONE, x11rb::NONE) {
            trace!("damage_subtract({}): {:?}", damage, e);
        }
    }

    fn window_visible_region(&self, window: WindowId) -> Result<Vec<Geometry>> {
        let reply = self
            .conn
            .shape_get_rectangles(window, shape::SK::BOUNDING)?
            .reply()?;
        Ok(reply
            .rectangles
            .iter()
            .map(|r| Geometry::new(r.x as i32, r.y as i32, r.width as u32, r.height as u32))
            .collect())
    }

    fn restack_actors(&mut self, bottom_to_top: &[ActorId]) {
        let mut order: Vec<ActorId> = self
            .order
            .iter()
            .copied()
            .filter(|a| !bottom_to_top.contains(a))
            .collect();
        order.extend_from_slice(bottom_to_top);
        if order != self.order {
            self.order = order;
            self.dirty = true;
        }
    }

    fn actor_order(&self) -> Vec<ActorId> {
        self.order.clone()
    }

    fn present(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let (Some(overlay_picture), Some((_, buffer_picture))) =
            (self.overlay_picture, self.buffer)
        else {
            return Ok(());
        };

        self.conn.render_fill_rectangles(
            render::PictOp::SRC,
            buffer_picture,
            render::Color { red: 0x2626, green: 0x2626, blue: 0x2a2a, alpha: 0xffff },
            &[xproto::Rectangle {
                x: 0,
                y: 0,
                width: self.screen_size.0,
                height: self.screen_size.1,
            }],
        )?;

        for actor_id in self.order.clone() {
            let visible = self
                .actors
                .get(&actor_id)
                .map(|a| a.visible && a.picture.is_some())
                .unwrap_or(false);
            if !visible {
                continue;
            }
            self.paint_shadow(actor_id, buffer_picture)?;
            if let Some(actor) = self.actors.get(&actor_id) {
                self.paint_actor(actor, buffer_picture)?;
            }
        }

        self.conn.render_composite(
            render::PictOp::SRC,
            buffer_picture,
            x11rb::NONE,
            overlay_picture,
            0,
            0,
            0,
            0,
            0,
            0,
            self.screen_size.0,
            self.screen_size.1,
        )?;
        self.conn.flush()?;
        self.dirty = false;
        Ok(())
    }
}

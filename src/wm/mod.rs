//! Window manager core.
//!
//! [`WmState`] owns the managed-client table and the stacking order, and
//! answers the compositor's geometry/theme queries. [`Wm`] wires X11 events
//! into state changes and forwards lifecycle notifications to the
//! compositing layer when one is running.

pub mod client;
pub mod hints;
pub mod stack;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info, trace, warn};
use x11rb::connection::{Connection, RequestConnection};
use x11rb::protocol::damage::NotifyEvent as DamageNotifyEvent;
use x11rb::protocol::shape::{self, ConnectionExt as _};
use x11rb::protocol::xproto::{
    ChangeWindowAttributesAux, ConfigureWindowAux, ConnectionExt as _, EventMask, MapState,
};
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;

use crate::compositor::backend::X11Backend;
use crate::compositor::effects::{EffectEvent, EffectKind, EffectSpec};
use crate::compositor::shadow::ShadowKind;
use crate::compositor::{CompositorManager, DamageEvent, GeometryProvider, ThemeProvider};
use crate::config::Config;
use crate::shared::{Geometry, Rgba, WindowId};
use client::{Client, ClientTypeFlags};
use stack::StackList;

/// Managed clients, stacking order, and policy configuration.
pub struct WmState {
    clients: HashMap<WindowId, Client>,
    /// Frame window to client window, for event-target resolution.
    frames: HashMap<WindowId, WindowId>,
    pub stack: StackList,
    pub config: Config,
    /// The application window currently considered "on top", for switch
    /// transitions.
    top_app: Option<WindowId>,
}

impl WmState {
    pub fn new(config: Config) -> Self {
        Self {
            clients: HashMap::new(),
            frames: HashMap::new(),
            stack: StackList::new(),
            config,
            top_app: None,
        }
    }

    pub fn client(&self, window: WindowId) -> Option<&Client> {
        self.clients.get(&window)
    }

    pub fn client_mut(&mut self, window: WindowId) -> Option<&mut Client> {
        self.clients.get_mut(&window)
    }

    pub fn is_managed(&self, window: WindowId) -> bool {
        self.clients.contains_key(&window)
    }

    /// Windows currently mapped, bottom to top.
    pub fn mapped_windows(&self) -> Vec<WindowId> {
        self.stack
            .bottom_to_top()
            .into_iter()
            .filter(|w| self.clients.get(w).map(|c| c.mapped).unwrap_or(false))
            .collect()
    }

    /// Take ownership of a new client and place it in the stack: desktops
    /// go to the bottom, everything else on top.
    pub fn manage(&mut self, client: Client) {
        let window = client.window;
        if self.clients.contains_key(&window) {
            warn!("Window {} already managed", window);
            return;
        }
        if client.client_type.contains(ClientTypeFlags::DESKTOP) {
            self.stack.insert_above(window, None);
        } else {
            self.stack.append_top(window);
        }
        if let Some(frame) = client.frame {
            self.frames.insert(frame, window);
        }
        self.clients.insert(window, client);
    }

    pub fn unmanage(&mut self, window: WindowId) -> Option<Client> {
        let client = self.clients.remove(&window)?;
        if let Some(frame) = client.frame {
            self.frames.remove(&frame);
        }
        self.stack.remove(window);
        if self.top_app == Some(window) {
            self.top_app = self.topmost_app();
        }
        Some(client)
    }

    /// Raise a window to the top of the stack. Returns the previous top
    /// application if the raise changed which application is on top.
    pub fn raise(&mut self, window: WindowId) -> Option<WindowId> {
        if !self.stack.contains(window) {
            return None;
        }
        self.stack.move_top(window);
        let is_app = self
            .clients
            .get(&window)
            .map(|c| c.client_type.contains(ClientTypeFlags::APP))
            .unwrap_or(false);
        if !is_app {
            return None;
        }
        let previous = self.top_app;
        self.top_app = Some(window);
        previous.filter(|&p| p != window)
    }

    /// Next application window in stack order, for app cycling.
    pub fn cycle_app(&self, reverse: bool) -> Option<WindowId> {
        let clients = &self.clients;
        self.stack.cycle_by_type(ClientTypeFlags::APP, reverse, |w| {
            clients
                .get(&w)
                .map(|c| c.client_type)
                .unwrap_or(ClientTypeFlags::empty())
        })
    }

    fn topmost_app(&self) -> Option<WindowId> {
        self.stack.top_to_bottom().into_iter().find(|w| {
            self.clients
                .get(w)
                .map(|c| c.mapped && c.client_type.contains(ClientTypeFlags::APP))
                .unwrap_or(false)
        })
    }

    fn type_animates(&self, flags: ClientTypeFlags) -> bool {
        let names = &self.config.effects.animated_types;
        let matches = |name: &str, flag: ClientTypeFlags| {
            flags.contains(flag) && names.iter().any(|n| n == name)
        };
        matches("app", ClientTypeFlags::APP)
            || matches("dialog", ClientTypeFlags::DIALOG)
            || matches("menu", ClientTypeFlags::MENU)
            || matches("notification", ClientTypeFlags::NOTIFICATION)
    }
}

impl GeometryProvider for WmState {
    fn get_coverage(&self, window: WindowId) -> Geometry {
        self.clients
            .get(&window)
            .map(|c| c.coverage())
            .unwrap_or_default()
    }

    fn get_desktop_index(&self, window: WindowId) -> u32 {
        self.clients.get(&window).map(|c| c.desktop).unwrap_or(0)
    }

    fn get_transients(&self, window: WindowId) -> Vec<WindowId> {
        self.clients
            .values()
            .filter(|c| c.transient_for == Some(window))
            .map(|c| c.window)
            .collect()
    }

    fn client_type(&self, window: WindowId) -> ClientTypeFlags {
        self.clients
            .get(&window)
            .map(|c| c.client_type)
            .unwrap_or(ClientTypeFlags::empty())
    }

    fn resolve_event_target(&self, window: WindowId) -> Option<WindowId> {
        if self.clients.contains_key(&window) {
            return Some(window);
        }
        self.frames.get(&window).copied()
    }
}

impl ThemeProvider for WmState {
    fn shadow_type(&self, window: WindowId) -> Option<ShadowKind> {
        let client = self.clients.get(&window)?;
        // ARGB windows draw their own decoration; desktops and panels sit
        // flush with the screen.
        if client.argb
            || client
                .client_type
                .intersects(ClientTypeFlags::DESKTOP | ClientTypeFlags::PANEL)
        {
            return None;
        }
        ShadowKind::from_mode(&self.config.compositor.shadow_mode)
    }

    fn shadow_color(&self) -> Rgba {
        let [r, g, b, a] = self.config.compositor.shadow_color;
        Rgba::new(r, g, b, a)
    }

    fn shadow_radius(&self) -> u8 {
        self.config.compositor.shadow_radius
    }

    fn shadow_offset(&self) -> (i32, i32) {
        let [x, y] = self.config.compositor.shadow_offset;
        (x, y)
    }

    fn is_client_shaped(&self, window: WindowId) -> bool {
        self.clients.get(&window).map(|c| c.shaped).unwrap_or(false)
    }

    fn is_client_argb(&self, window: WindowId) -> bool {
        self.clients.get(&window).map(|c| c.argb).unwrap_or(false)
    }

    fn client_effects(&self, window: WindowId) -> Vec<EffectSpec> {
        let effects = &self.config.effects;
        if !effects.enabled {
            return Vec::new();
        }
        let Some(client) = self.clients.get(&window) else {
            return Vec::new();
        };
        if !self.type_animates(client.client_type) {
            return Vec::new();
        }
        let bindings = [
            (EffectEvent::Map, EffectKind::SlideIn, effects.map_duration_ms),
            (EffectEvent::Unmap, EffectKind::Fade, effects.unmap_duration_ms),
            (EffectEvent::Minimize, EffectKind::Scale, effects.minimize_duration_ms),
            (EffectEvent::Transition, EffectKind::CrossFade, effects.transition_duration_ms),
        ];
        bindings
            .into_iter()
            .filter(|(_, _, ms)| *ms > 0)
            .map(|(event, kind, ms)| EffectSpec {
                event,
                kind,
                duration: Duration::from_millis(ms),
            })
            .collect()
    }
}

/// The running window manager: an X connection, the managed-client state,
/// and the optional compositing layer.
pub struct Wm {
    conn: Arc<RustConnection>,
    root: WindowId,
    atoms: hints::Atoms,
    shape_supported: bool,
    pub state: WmState,
    pub compositor: Option<CompositorManager<X11Backend>>,
}

impl Wm {
    /// Claim substructure redirection on the root and set up the optional
    /// compositing backend. A missing compositing extension degrades to
    /// plain window management.
    pub fn new(conn: Arc<RustConnection>, screen_num: usize, config: Config) -> Result<Self> {
        let root = conn.setup().roots[screen_num].root;

        conn.change_window_attributes(
            root,
            &ChangeWindowAttributesAux::new().event_mask(
                EventMask::SUBSTRUCTURE_REDIRECT
                    | EventMask::SUBSTRUCTURE_NOTIFY
                    | EventMask::STRUCTURE_NOTIFY
                    | EventMask::PROPERTY_CHANGE,
            ),
        )?
        .check()
        .context("Another window manager is already running")?;

        let atoms = hints::Atoms::new(conn.as_ref())?;
        let shape_supported = conn
            .extension_information(shape::X11_EXTENSION_NAME)?
            .is_some();

        let compositor = if config.compositor.enabled {
            match X11Backend::new(conn.clone(), screen_num) {
                Ok(backend) => Some(CompositorManager::new(backend)),
                Err(e) => {
                    warn!("Compositing unavailable: {}", e);
                    None
                }
            }
        } else {
            info!("Compositing disabled by configuration");
            None
        };

        Ok(Self {
            conn,
            root,
            atoms,
            shape_supported,
            state: WmState::new(config),
            compositor,
        })
    }

    /// Adopt pre-existing windows and, if configured, enable compositing
    /// for them.
    pub fn startup(&mut self, now: Instant) -> Result<()> {
        let tree = self.conn.query_tree(self.root)?.reply()?;
        for window in tree.children {
            let attrs = match self.conn.get_window_attributes(window)?.reply() {
                Ok(attrs) => attrs,
                Err(_) => continue,
            };
            if attrs.override_redirect || attrs.map_state != MapState::VIEWABLE {
                continue;
            }
            if let Err(e) = self.manage_window(window, true) {
                debug!("Skipping existing window {}: {}", window, e);
            }
        }

        if let Some(comp) = self.compositor.as_mut() {
            let mapped = self.state.mapped_windows();
            if let Err(e) = comp.turn_on(&self.state, &mapped, now) {
                warn!("Failed to enable compositing: {}", e);
                self.compositor = None;
            }
        }
        self.conn.flush()?;
        Ok(())
    }

    /// Toggle compositing at runtime.
    pub fn toggle_compositing(&mut self, now: Instant) {
        let Some(comp) = self.compositor.as_mut() else {
            return;
        };
        if comp.enabled() {
            comp.turn_off();
        } else {
            let mapped = self.state.mapped_windows();
            if let Err(e) = comp.turn_on(&self.state, &mapped, now) {
                warn!("Failed to re-enable compositing: {}", e);
            }
        }
    }

    fn manage_window(&mut self, window: WindowId, already_mapped: bool) -> Result<()> {
        if self.state.is_managed(window) {
            return Ok(());
        }
        if let Some(comp) = &self.compositor {
            if comp.is_my_window(window) {
                return Ok(());
            }
        }

        let geometry = self.conn.get_geometry(window)?.reply()?;
        let transient = hints::transient_for(self.conn.as_ref(), window);
        let client_type = self
            .atoms
            .window_type(self.conn.as_ref(), window, transient);

        let mut client = Client::new(
            window,
            Geometry::new(
                geometry.x as i32,
                geometry.y as i32,
                geometry.width as u32,
                geometry.height as u32,
            ),
            client_type,
        );
        client.transient_for = transient;
        client.desktop = self.atoms.window_desktop(self.conn.as_ref(), window);
        client.argb = geometry.depth == 32;
        client.mapped = already_mapped;

        if self.shape_supported {
            self.conn.shape_select_input(window, true)?;
            if let Ok(extents) = self.conn.shape_query_extents(window)?.reply() {
                client.shaped = extents.bounding_shaped;
            }
        }
        self.conn.change_window_attributes(
            window,
            &ChangeWindowAttributesAux::new()
                .event_mask(EventMask::PROPERTY_CHANGE | EventMask::STRUCTURE_NOTIFY),
        )?;

        debug!("Managing window {} ({:?})", window, client.client_type);
        self.state.manage(client);
        if let Some(comp) = self.compositor.as_mut() {
            comp.register(window);
        }
        Ok(())
    }

    /// Route one X event. Returns true when the event changed state that
    /// warrants a restack/present pass.
    pub fn handle_event(&mut self, event: &Event, now: Instant) -> bool {
        match event {
            Event::MapRequest(e) => {
                if let Err(err) = self.manage_window(e.window, false) {
                    warn!("Failed to manage window {}: {}", e.window, err);
                }
                if let Err(err) = self.conn.map_window(e.window) {
                    warn!("map_window({}) failed: {}", e.window, err);
                }
                false
            }
            Event::MapNotify(e) => {
                if e.override_redirect || !self.state.is_managed(e.window) {
                    return false;
                }
                if let Some(client) = self.state.client_mut(e.window) {
                    client.mapped = true;
                }
                if let Some(comp) = self.compositor.as_mut() {
                    comp.map_notify(&self.state, e.window, now);
                }
                // A newly mapped application takes the top spot.
                if self
                    .state
                    .client_type(e.window)
                    .contains(ClientTypeFlags::APP)
                {
                    self.activate(e.window, now);
                }
                true
            }
            Event::UnmapNotify(e) => {
                if !self.state.is_managed(e.window) {
                    return false;
                }
                if let Some(comp) = self.compositor.as_mut() {
                    comp.unmap_notify(&self.state, e.window, now);
                }
                if let Some(client) = self.state.client_mut(e.window) {
                    client.mapped = false;
                }
                true
            }
            Event::ClientMessage(e) => {
                // ICCCM iconify request: play the minimize effect, then
                // withdraw the window.
                if e.type_ != self.atoms.wm_change_state || e.format != 32 {
                    return false;
                }
                if e.data.as_data32()[0] != hints::ICONIC_STATE {
                    return false;
                }
                self.minimize(e.window, now)
            }
            Event::DestroyNotify(e) => {
                if let Some(comp) = self.compositor.as_mut() {
                    comp.unregister(e.window);
                }
                self.state.unmanage(e.window).is_some()
            }
            Event::ConfigureRequest(e) => {
                let aux = ConfigureWindowAux::from_configure_request(e);
                if let Err(err) = self.conn.configure_window(e.window, &aux) {
                    warn!("configure_window({}) failed: {}", e.window, err);
                }
                false
            }
            Event::ConfigureNotify(e) => {
                let Some(window) = self.state.resolve_event_target(e.window) else {
                    return false;
                };
                if let Some(client) = self.state.client_mut(window) {
                    client.geometry =
                        Geometry::new(e.x as i32, e.y as i32, e.width as u32, e.height as u32);
                }
                if let Some(comp) = self.compositor.as_mut() {
                    comp.configure_notify(window);
                }
                true
            }
            Event::DamageNotify(e) => self.handle_damage(e),
            Event::ShapeNotify(e) => {
                if e.shape_kind != shape::SK::BOUNDING {
                    return false;
                }
                let Some(window) = self.state.resolve_event_target(e.affected_window) else {
                    return false;
                };
                if let Some(client) = self.state.client_mut(window) {
                    client.shaped = e.shaped;
                }
                // Refetch so the cleared area matches the new shape.
                if let Some(comp) = self.compositor.as_mut() {
                    comp.configure_notify(window);
                    comp.repair(&self.state, window);
                }
                true
            }
            Event::Error(e) => {
                trace!("X11 error: {:?}", e);
                false
            }
            _ => false,
        }
    }

    fn handle_damage(&mut self, e: &DamageNotifyEvent) -> bool {
        let Some(comp) = self.compositor.as_mut() else {
            return false;
        };
        // Bit 7 of the report level flags more queued reports for this
        // drawable; repair can wait for the last one.
        let more = (u8::from(e.level) & 0x80) != 0;
        comp.handle_damage_event(
            &self.state,
            DamageEvent {
                drawable: e.drawable,
                area: Geometry::new(
                    e.area.x as i32,
                    e.area.y as i32,
                    e.area.width as u32,
                    e.area.height as u32,
                ),
                more,
            },
        )
    }

    /// Raise a window and run the top-application switch transition when
    /// the raise changed which application is on top.
    pub fn activate(&mut self, window: WindowId, now: Instant) {
        let previous = self.state.raise(window);
        if let (Some(comp), Some(outgoing)) = (self.compositor.as_mut(), previous) {
            comp.transition(&self.state, window, outgoing, now);
        }
    }

    /// Iconify a window: run the scale-down effect and withdraw it. The
    /// following unmap notification hides nothing extra; the effect owns
    /// visibility until it completes.
    pub fn minimize(&mut self, window: WindowId, now: Instant) -> bool {
        if !self.state.is_managed(window) {
            return false;
        }
        if let Some(comp) = self.compositor.as_mut() {
            comp.minimize_notify(&self.state, window, now);
        }
        if let Err(e) = self.conn.unmap_window(window) {
            warn!("unmap_window({}) failed: {}", window, e);
        }
        true
    }

    /// Cycle to the next (or previous) application window. No key bindings
    /// exist in the library; callers wire this to whatever input they own.
    pub fn cycle(&mut self, reverse: bool, now: Instant) {
        if let Some(next) = self.state.cycle_app(reverse) {
            self.activate(next, now);
            if let Err(e) = self.conn.map_window(next) {
                warn!("map_window({}) failed: {}", next, e);
            }
        }
    }

    /// Sync the presentation order to the stacking list and paint.
    pub fn sync_and_present(&mut self) {
        if let Some(comp) = self.compositor.as_mut() {
            let order = self.state.stack.bottom_to_top();
            comp.restack(&self.state, &order);
            comp.present();
        }
        if let Err(e) = self.conn.flush() {
            warn!("Flush failed: {}", e);
        }
    }

    pub fn tick_effects(&mut self, now: Instant) {
        if let Some(comp) = self.compositor.as_mut() {
            comp.tick_effects(now);
        }
    }

    pub fn next_effect_deadline(&self) -> Option<Instant> {
        self.compositor.as_ref().and_then(|c| c.next_effect_deadline())
    }
}

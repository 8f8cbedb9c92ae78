//! Managed-window state.
//!
//! One `Client` per top-level window the manager has decided to manage. The
//! compositor holds only the window id; everything it needs about the window
//! (coverage, type, transients, desktop) is answered by [`crate::wm::WmState`].

use bitflags::bitflags;

use crate::shared::{Geometry, WindowId};

bitflags! {
    /// Coarse window-type classification, usable as a mask for stacking and
    /// effect policy queries.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClientTypeFlags: u32 {
        const APP          = 1 << 0;
        const DIALOG       = 1 << 1;
        const DESKTOP      = 1 << 2;
        const PANEL        = 1 << 3;
        const MENU         = 1 << 4;
        const NOTIFICATION = 1 << 5;
        const OVERRIDE     = 1 << 6;
    }
}

bitflags! {
    /// Layout hints consumed by the geometry/coverage provider.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct LayoutHints: u32 {
        const FULLSCREEN = 1 << 0;
    }
}

/// A window being managed by the window manager.
#[derive(Debug)]
pub struct Client {
    /// X11 window id of the client window.
    pub window: WindowId,

    /// Reparenting frame, if the window is decorated.
    pub frame: Option<WindowId>,

    /// Last known client geometry (excluding the frame).
    pub geometry: Geometry,

    /// Frame border sizes: left, right, top, bottom. All zero when unframed.
    pub frame_extents: [u32; 4],

    pub client_type: ClientTypeFlags,
    pub hints: LayoutHints,

    /// Transient parent, if any (dialogs transient for their application).
    pub transient_for: Option<WindowId>,

    /// Virtual-desktop layer the window belongs to.
    pub desktop: u32,

    /// Is the window currently mapped?
    pub mapped: bool,

    /// Does the window carry a non-rectangular bounding shape?
    pub shaped: bool,

    /// Does the window have an alpha channel (32-bit visual)?
    pub argb: bool,
}

impl Client {
    pub fn new(window: WindowId, geometry: Geometry, client_type: ClientTypeFlags) -> Self {
        Self {
            window,
            frame: None,
            geometry,
            frame_extents: [0; 4],
            client_type,
            hints: LayoutHints::empty(),
            transient_for: None,
            desktop: 0,
            mapped: false,
            shaped: false,
            argb: false,
        }
    }

    /// The visible screen-space extent of the window, frame included. This is
    /// the rectangle the compositor sizes its actor to.
    pub fn coverage(&self) -> Geometry {
        let [left, right, top, bottom] = self.frame_extents;
        if self.frame.is_none() || self.hints.contains(LayoutHints::FULLSCREEN) {
            return self.geometry;
        }
        Geometry {
            x: self.geometry.x - left as i32,
            y: self.geometry.y - top as i32,
            width: self.geometry.width + left + right,
            height: self.geometry.height + top + bottom,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coverage_includes_frame_extents() {
        let mut client = Client::new(7, Geometry::new(100, 100, 400, 300), ClientTypeFlags::APP);
        client.frame = Some(8);
        client.frame_extents = [2, 2, 24, 2];
        assert_eq!(client.coverage(), Geometry::new(98, 76, 404, 326));
    }

    #[test]
    fn fullscreen_coverage_is_client_geometry() {
        let mut client = Client::new(7, Geometry::new(0, 0, 1920, 1080), ClientTypeFlags::APP);
        client.frame = Some(8);
        client.frame_extents = [2, 2, 24, 2];
        client.hints |= LayoutHints::FULLSCREEN;
        assert_eq!(client.coverage(), client.geometry);
    }
}

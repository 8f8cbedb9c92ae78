//! ICCCM/EWMH property reading.
//!
//! Interns the atoms the manager needs and classifies windows from
//! `_NET_WM_WINDOW_TYPE`, falling back to `WM_TRANSIENT_FOR` for dialogs the
//! way older toolkits expect.

use anyhow::Result;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{Atom, AtomEnum, ConnectionExt as _};

use crate::shared::WindowId;
use crate::wm::client::ClientTypeFlags;

/// Interned atoms used for client classification.
#[derive(Debug, Clone, Copy)]
pub struct Atoms {
    pub net_wm_window_type: Atom,
    pub net_wm_window_type_normal: Atom,
    pub net_wm_window_type_desktop: Atom,
    pub net_wm_window_type_dock: Atom,
    pub net_wm_window_type_dialog: Atom,
    pub net_wm_window_type_menu: Atom,
    pub net_wm_window_type_dropdown_menu: Atom,
    pub net_wm_window_type_popup_menu: Atom,
    pub net_wm_window_type_notification: Atom,
    pub net_wm_desktop: Atom,
    pub wm_change_state: Atom,
}

impl Atoms {
    pub fn new<C: Connection>(conn: &C) -> Result<Self> {
        let intern = |name: &str| -> Result<Atom> {
            Ok(conn.intern_atom(false, name.as_bytes())?.reply()?.atom)
        };

        Ok(Self {
            net_wm_window_type: intern("_NET_WM_WINDOW_TYPE")?,
            net_wm_window_type_normal: intern("_NET_WM_WINDOW_TYPE_NORMAL")?,
            net_wm_window_type_desktop: intern("_NET_WM_WINDOW_TYPE_DESKTOP")?,
            net_wm_window_type_dock: intern("_NET_WM_WINDOW_TYPE_DOCK")?,
            net_wm_window_type_dialog: intern("_NET_WM_WINDOW_TYPE_DIALOG")?,
            net_wm_window_type_dropdown_menu: intern("_NET_WM_WINDOW_TYPE_DROPDOWN_MENU")?,
            net_wm_window_type_popup_menu: intern("_NET_WM_WINDOW_TYPE_POPUP_MENU")?,
            net_wm_window_type_menu: intern("_NET_WM_WINDOW_TYPE_MENU")?,
            net_wm_window_type_notification: intern("_NET_WM_WINDOW_TYPE_NOTIFICATION")?,
            net_wm_desktop: intern("_NET_WM_DESKTOP")?,
            wm_change_state: intern("WM_CHANGE_STATE")?,
        })
    }

    /// Classify a window from its `_NET_WM_WINDOW_TYPE`. Windows that set no
    /// type are applications, unless they are transient for another window
    /// (then they are dialogs, per EWMH's fallback rule).
    pub fn window_type<C: Connection>(
        &self,
        conn: &C,
        window: WindowId,
        transient_for: Option<WindowId>,
    ) -> ClientTypeFlags {
        let reply = conn
            .get_property(false, window, self.net_wm_window_type, AtomEnum::ATOM, 0, 32)
            .ok()
            .and_then(|c| c.reply().ok());

        if let Some(reply) = reply {
            if let Some(mut atoms) = reply.value32() {
                if let Some(ty) = atoms.next() {
                    return self.classify(ty, transient_for);
                }
            }
        }
        if transient_for.is_some() {
            ClientTypeFlags::DIALOG
        } else {
            ClientTypeFlags::APP
        }
    }

    fn classify(&self, ty: Atom, transient_for: Option<WindowId>) -> ClientTypeFlags {
        if ty == self.net_wm_window_type_desktop {
            ClientTypeFlags::DESKTOP
        } else if ty == self.net_wm_window_type_dock {
            ClientTypeFlags::PANEL
        } else if ty == self.net_wm_window_type_dialog {
            ClientTypeFlags::DIALOG
        } else if ty == self.net_wm_window_type_menu
            || ty == self.net_wm_window_type_dropdown_menu
            || ty == self.net_wm_window_type_popup_menu
        {
            ClientTypeFlags::MENU
        } else if ty == self.net_wm_window_type_notification {
            ClientTypeFlags::NOTIFICATION
        } else if transient_for.is_some() {
            ClientTypeFlags::DIALOG
        } else {
            ClientTypeFlags::APP
        }
    }

    /// `_NET_WM_DESKTOP`, or 0 when unset.
    pub fn window_desktop<C: Connection>(&self, conn: &C, window: WindowId) -> u32 {
        conn.get_property(false, window, self.net_wm_desktop, AtomEnum::CARDINAL, 0, 1)
            .ok()
            .and_then(|c| c.reply().ok())
            .and_then(|r| r.value32().and_then(|mut v| v.next()))
            .unwrap_or(0)
    }
}

/// ICCCM `WM_CHANGE_STATE` argument requesting iconification.
pub const ICONIC_STATE: u32 = 3;

/// `WM_TRANSIENT_FOR`, if set and non-zero.
pub fn transient_for<C: Connection>(conn: &C, window: WindowId) -> Option<WindowId> {
    let reply = conn
        .get_property(false, window, AtomEnum::WM_TRANSIENT_FOR, AtomEnum::WINDOW, 0, 1)
        .ok()?
        .reply()
        .ok()?;
    let parent = reply.value32()?.next()?;
    (parent != 0).then_some(parent)
}

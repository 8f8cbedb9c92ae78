//! slate: a lightweight X11 window manager with optional compositing.
//!
//! The window manager core ([`wm`]) owns clients and the stacking order;
//! the compositing layer ([`compositor`]) mirrors managed windows into
//! off-screen actors and paints them through the composite overlay, with
//! damage-driven repairs and animated map/unmap/switch transitions.

pub mod compositor;
pub mod config;
pub mod error;
pub mod events;
pub mod shared;
pub mod wm;

pub use compositor::CompositorManager;
pub use config::Config;
pub use wm::Wm;

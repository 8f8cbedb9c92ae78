//! Error taxonomy for the compositing subsystem.
//!
//! Failures inside repair/show/hide are absorbed and logged by the callers;
//! only initialization-time failures (a missing extension) propagate, and
//! those are fatal to compositing alone, never to window management.

use thiserror::Error;

use crate::shared::WindowId;

#[derive(Debug, Error)]
pub enum CompositorError {
    /// A required X extension is missing. Compositing cannot start; the
    /// window manager keeps running un-composited.
    #[error("required X extension `{0}` is unavailable")]
    ExtensionUnavailable(&'static str),

    #[error("X connection error: {0}")]
    Connection(#[from] x11rb::errors::ConnectionError),

    #[error("X request failed: {0}")]
    Reply(#[from] x11rb::errors::ReplyError),

    #[error("X id allocation failed: {0}")]
    Id(#[from] x11rb::errors::ReplyOrIdError),

    /// A native pixmap or actor allocation failed. The requesting operation
    /// degrades to "no visual representation this frame".
    #[error("native resource allocation failed: {0}")]
    ResourceExhaustion(&'static str),

    /// A damage/configure event targeted a window with no compositor
    /// client. Dropped by the caller, never fatal.
    #[error("no compositor client for window {0}")]
    UnresolvableTarget(WindowId),
}

pub type Result<T> = std::result::Result<T, CompositorError>;

//! Shared primitive types used by both the window manager and the compositor.

/// X11 window id.
pub type WindowId = u32;

/// Backend-assigned handle for an off-screen visual proxy.
pub type ActorId = u64;

/// Native damage object id.
pub type DamageId = u32;

/// Window geometry in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Geometry {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Intersection of two rectangles, or `None` when they do not overlap.
    pub fn intersection(&self, other: &Geometry) -> Option<Geometry> {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width as i32).min(other.x + other.width as i32);
        let y2 = (self.y + self.height as i32).min(other.y + other.height as i32);
        if x2 > x1 && y2 > y1 {
            Some(Geometry::new(x1, y1, (x2 - x1) as u32, (y2 - y1) as u32))
        } else {
            None
        }
    }

    /// Translate by an offset.
    pub fn offset(&self, dx: i32, dy: i32) -> Geometry {
        Geometry::new(self.x + dx, self.y + dy, self.width, self.height)
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Geometry::new(0, 0, 1, 1)
    }
}

/// RGBA color, components in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }
}

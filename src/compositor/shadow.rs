//! Shadow textures and shaped-window clearing.
//!
//! Self-contained image utilities: a Gaussian soft-shadow alpha map shared
//! across actors of the same extent, and the tiling of a shaped window's
//! non-visible area into small transparent blocks.

use serde::Deserialize;

use crate::shared::Geometry;

/// Drop-shadow style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShadowKind {
    Simple,
    Gaussian,
}

impl ShadowKind {
    /// Parse the configured shadow mode; `None` disables shadows.
    pub fn from_mode(mode: &str) -> Option<ShadowKind> {
        match mode {
            "simple" => Some(ShadowKind::Simple),
            "gaussian" => Some(ShadowKind::Gaussian),
            _ => None,
        }
    }
}

/// 8-bit alpha image, rows padded to the X scanline unit (4 bytes).
#[derive(Debug)]
pub struct AlphaImage {
    pub width: u16,
    pub height: u16,
    pub data: Vec<u8>,
}

impl AlphaImage {
    fn new(width: u16, height: u16) -> Self {
        let stride = Self::stride(width);
        Self { width, height, data: vec![0; stride * height as usize] }
    }

    fn stride(width: u16) -> usize {
        (width as usize + 3) & !3
    }

    fn set(&mut self, x: u16, y: u16, alpha: u8) {
        let stride = Self::stride(self.width);
        self.data[y as usize * stride + x as usize] = alpha;
    }

    pub fn get(&self, x: u16, y: u16) -> u8 {
        let stride = Self::stride(self.width);
        self.data[y as usize * stride + x as usize]
    }
}

/// Normalized 1D Gaussian kernel of length `2 * radius + 1`.
pub fn gaussian_kernel(radius: u8) -> Vec<f64> {
    let r = radius as i32;
    let sigma = (radius as f64 / 2.0).max(0.5);
    let mut kernel: Vec<f64> = (-r..=r)
        .map(|d| (-((d * d) as f64) / (2.0 * sigma * sigma)).exp())
        .collect();
    let sum: f64 = kernel.iter().sum();
    for w in &mut kernel {
        *w /= sum;
    }
    kernel
}

/// Fraction of the kernel centered at `pos` that lands inside `0..size`.
fn profile(kernel: &[f64], pos: i32, size: i32) -> f64 {
    let r = (kernel.len() as i32 - 1) / 2;
    let mut coverage = 0.0;
    for (i, w) in kernel.iter().enumerate() {
        let sample = pos + i as i32 - r;
        if sample >= 0 && sample < size {
            coverage += w;
        }
    }
    coverage
}

/// Blurred-rectangle alpha map for a `width` x `height` window: the shadow
/// extends `radius` pixels beyond each edge, full-opacity in the interior,
/// falling off smoothly outside. The rectangle blur is separable, so the
/// image is the product of two 1D profiles.
pub fn gaussian_shadow_image(width: u16, height: u16, radius: u8) -> AlphaImage {
    let kernel = gaussian_kernel(radius);
    let r = radius as i32;
    let out_w = width + 2 * radius as u16;
    let out_h = height + 2 * radius as u16;
    let mut image = AlphaImage::new(out_w, out_h);

    let x_profile: Vec<f64> = (0..out_w as i32)
        .map(|x| profile(&kernel, x - r, width as i32))
        .collect();
    for y in 0..out_h as i32 {
        let fy = profile(&kernel, y - r, height as i32);
        for x in 0..out_w as i32 {
            let alpha = (255.0 * x_profile[x as usize] * fy).round() as u8;
            image.set(x as u16, y as u16, alpha);
        }
    }
    image
}

/// Hard-edged rectangular shadow covering exactly the window extent.
pub fn simple_shadow_image(width: u16, height: u16) -> AlphaImage {
    let mut image = AlphaImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            image.set(x, y, 255);
        }
    }
    image
}

/// Subtract `hole` from `rect`, yielding up to four fragments.
fn subtract_rect(rect: Geometry, hole: &Geometry) -> Vec<Geometry> {
    let Some(overlap) = rect.intersection(hole) else {
        return vec![rect];
    };
    let mut out = Vec::new();
    let rect_right = rect.x + rect.width as i32;
    let rect_bottom = rect.y + rect.height as i32;
    let overlap_right = overlap.x + overlap.width as i32;
    let overlap_bottom = overlap.y + overlap.height as i32;

    if overlap.y > rect.y {
        out.push(Geometry::new(rect.x, rect.y, rect.width, (overlap.y - rect.y) as u32));
    }
    if overlap_bottom < rect_bottom {
        out.push(Geometry::new(
            rect.x,
            overlap_bottom,
            rect.width,
            (rect_bottom - overlap_bottom) as u32,
        ));
    }
    if overlap.x > rect.x {
        out.push(Geometry::new(
            rect.x,
            overlap.y,
            (overlap.x - rect.x) as u32,
            overlap.height,
        ));
    }
    if overlap_right < rect_right {
        out.push(Geometry::new(
            overlap_right,
            overlap.y,
            (rect_right - overlap_right) as u32,
            overlap.height,
        ));
    }
    out
}

/// Default clearing block size.
pub const CLEAR_TILE: u32 = 4;

/// Tile the non-visible part of a shaped window into transparent blocks:
/// `bounds` minus the union of `visible`, cut into `tile`-sized blocks and
/// clipped exactly against the visible region. Block size is a bandwidth
/// trade-off only; correctness does not depend on it.
pub fn occlusion_tiles(bounds: Geometry, visible: &[Geometry], tile: u32) -> Vec<Geometry> {
    debug_assert!(tile > 0);
    let mut out = Vec::new();
    let mut y = bounds.y;
    while y < bounds.y + bounds.height as i32 {
        let th = tile.min((bounds.y + bounds.height as i32 - y) as u32);
        let mut x = bounds.x;
        while x < bounds.x + bounds.width as i32 {
            let tw = tile.min((bounds.x + bounds.width as i32 - x) as u32);
            let mut fragments = vec![Geometry::new(x, y, tw, th)];
            for hole in visible {
                fragments = fragments
                    .into_iter()
                    .flat_map(|f| subtract_rect(f, hole))
                    .collect();
                if fragments.is_empty() {
                    break;
                }
            }
            out.extend(fragments);
            x += tile as i32;
        }
        y += tile as i32;
    }
    out
}

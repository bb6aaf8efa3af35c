//! Integer layer/content geometry and tiling grid math.
//!
//! Everything here is plain value types: sizes and rects in layer or content
//! pixels, a disjoint-rect `Region`, and the `TilingData` grid that maps
//! content coordinates to tile indices for one contents scale.

use serde::{Deserialize, Serialize};

mod region;
mod tiling_data;

pub use region::Region;
pub use tiling_data::{TileIndex, TileMask, TileRange, TilingData};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn area(&self) -> i64 {
        if self.is_empty() {
            return 0;
        }
        self.width as i64 * self.height as i64
    }

    pub fn set_to_min(&mut self, other: Size) {
        self.width = self.width.min(other.width);
        self.height = self.height.min(other.height);
    }

    /// Scales both dimensions and rounds each one up.
    pub fn scale_to_ceiled(self, scale: f32) -> Size {
        Size {
            width: (self.width as f32 * scale).ceil() as i32,
            height: (self.height as f32 * scale).ceil() as i32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub const fn from_size(size: Size) -> Self {
        Self::new(0, 0, size.width, size.height)
    }

    pub fn from_ltrb(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self::new(left, top, (right - left).max(0), (bottom - top).max(0))
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn area(&self) -> i64 {
        self.size().area()
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn contains_rect(&self, other: Rect) -> bool {
        !other.is_empty()
            && other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    pub fn intersects(&self, other: Rect) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    /// Returns the overlap, or an empty rect at the origin when there is none.
    pub fn intersect(&self, other: Rect) -> Rect {
        if !self.intersects(other) {
            return Rect::default();
        }
        Rect::from_ltrb(
            self.x.max(other.x),
            self.y.max(other.y),
            self.right().min(other.right()),
            self.bottom().min(other.bottom()),
        )
    }

    /// Bounding box of both rects; empty inputs are ignored.
    pub fn union(&self, other: Rect) -> Rect {
        if self.is_empty() {
            return other;
        }
        if other.is_empty() {
            return *self;
        }
        Rect::from_ltrb(
            self.x.min(other.x),
            self.y.min(other.y),
            self.right().max(other.right()),
            self.bottom().max(other.bottom()),
        )
    }

    /// Moves each edge inward by the given amounts (negative values grow the rect).
    pub fn inset(&self, left: i32, top: i32, right: i32, bottom: i32) -> Rect {
        Rect::new(
            self.x.saturating_add(left),
            self.y.saturating_add(top),
            self.width.saturating_sub(left).saturating_sub(right).max(0),
            self.height.saturating_sub(top).saturating_sub(bottom).max(0),
        )
    }

    pub fn offset(&self, delta_x: i32, delta_y: i32) -> Rect {
        Rect::new(self.x + delta_x, self.y + delta_y, self.width, self.height)
    }

    /// Sum of the horizontal and vertical gaps between the two rects, zero when
    /// they overlap.
    pub fn manhattan_internal_distance(&self, other: Rect) -> i32 {
        let bounds = self.union(other);
        let gap_x = (bounds.width - self.width - other.width + 1).max(0);
        let gap_y = (bounds.height - self.height - other.height + 1).max(0);
        gap_x + gap_y
    }

    /// Smallest integer rect enclosing this rect scaled by `scale`.
    pub fn scale_to_enclosing(&self, scale: f32) -> Rect {
        if self.is_empty() {
            return Rect::default();
        }
        Rect::from_ltrb(
            (self.x as f32 * scale).floor() as i32,
            (self.y as f32 * scale).floor() as i32,
            (self.right() as f32 * scale).ceil() as i32,
            (self.bottom() as f32 * scale).ceil() as i32,
        )
    }

    pub fn to_rect_f(&self) -> RectF {
        RectF::new(
            self.x as f32,
            self.y as f32,
            self.width as f32,
            self.height as f32,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RectF {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl RectF {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    pub fn scale(&self, scale: f32) -> RectF {
        RectF::new(
            self.x * scale,
            self.y * scale,
            self.width * scale,
            self.height * scale,
        )
    }

    pub fn to_enclosing_rect(&self) -> Rect {
        Rect::from_ltrb(
            self.x.floor() as i32,
            self.y.floor() as i32,
            self.right().ceil() as i32,
            self.bottom().ceil() as i32,
        )
    }
}

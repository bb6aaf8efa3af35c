use bitvec::prelude::{BitVec, Lsb0};

use crate::{Rect, Size};

/// Grid coordinate of a tile: `i` is the column, `j` the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileIndex {
    pub i: i32,
    pub j: i32,
}

impl TileIndex {
    pub const fn new(i: i32, j: i32) -> Self {
        Self { i, j }
    }
}

/// Inclusive range of tile indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRange {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl TileRange {
    pub fn contains(&self, index: TileIndex) -> bool {
        index.i >= self.left && index.i <= self.right && index.j >= self.top && index.j <= self.bottom
    }

    /// Row-major walk over the range.
    pub fn iter(self) -> impl Iterator<Item = TileIndex> {
        (self.top..=self.bottom)
            .flat_map(move |j| (self.left..=self.right).map(move |i| TileIndex::new(i, j)))
    }
}

/// Uniform tile grid over the content bounds of one tiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilingData {
    tile_size: Size,
    tiling_size: Size,
    num_tiles_x: i32,
    num_tiles_y: i32,
}

impl TilingData {
    /// An empty tile size yields a grid without tiles.
    pub fn new(tile_size: Size, tiling_size: Size) -> Self {
        let (num_tiles_x, num_tiles_y) = if tile_size.is_empty() || tiling_size.is_empty() {
            (0, 0)
        } else {
            (
                div_ceil(tiling_size.width, tile_size.width),
                div_ceil(tiling_size.height, tile_size.height),
            )
        };
        Self {
            tile_size,
            tiling_size,
            num_tiles_x,
            num_tiles_y,
        }
    }

    pub fn tile_size(&self) -> Size {
        self.tile_size
    }

    pub fn tiling_size(&self) -> Size {
        self.tiling_size
    }

    pub fn tiling_rect(&self) -> Rect {
        Rect::from_size(self.tiling_size)
    }

    pub fn num_tiles_x(&self) -> i32 {
        self.num_tiles_x
    }

    pub fn num_tiles_y(&self) -> i32 {
        self.num_tiles_y
    }

    pub fn tile_count(&self) -> usize {
        self.num_tiles_x as usize * self.num_tiles_y as usize
    }

    pub fn contains_index(&self, index: TileIndex) -> bool {
        index.i >= 0 && index.j >= 0 && index.i < self.num_tiles_x && index.j < self.num_tiles_y
    }

    /// Content-space rect of a tile, clipped to the tiling bounds.
    pub fn tile_bounds(&self, index: TileIndex) -> Rect {
        assert!(
            self.contains_index(index),
            "tile index {index:?} outside {}x{} grid",
            self.num_tiles_x,
            self.num_tiles_y
        );
        Rect::new(
            index.i * self.tile_size.width,
            index.j * self.tile_size.height,
            self.tile_size.width,
            self.tile_size.height,
        )
        .intersect(self.tiling_rect())
    }

    /// Tiles touching `rect`, or `None` when it misses the tiling.
    pub fn tile_range(&self, rect: Rect) -> Option<TileRange> {
        if self.tile_count() == 0 {
            return None;
        }
        let clipped = rect.intersect(self.tiling_rect());
        if clipped.is_empty() {
            return None;
        }
        Some(TileRange {
            left: clipped.x / self.tile_size.width,
            top: clipped.y / self.tile_size.height,
            right: (clipped.right() - 1) / self.tile_size.width,
            bottom: (clipped.bottom() - 1) / self.tile_size.height,
        })
    }

    fn flat_index(&self, index: TileIndex) -> usize {
        index.j as usize * self.num_tiles_x as usize + index.i as usize
    }
}

fn div_ceil(value: i32, divisor: i32) -> i32 {
    (value + divisor - 1) / divisor
}

/// One bit per tile of a `TilingData` grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileMask {
    data: TilingData,
    bits: BitVec<usize, Lsb0>,
    set_count: usize,
}

impl TileMask {
    pub fn new(data: TilingData) -> Self {
        Self {
            data,
            bits: BitVec::repeat(false, data.tile_count()),
            set_count: 0,
        }
    }

    /// Sets the bit and reports whether it was previously clear.
    pub fn insert(&mut self, index: TileIndex) -> bool {
        if !self.data.contains_index(index) {
            return false;
        }
        let flat = self.data.flat_index(index);
        if self.bits[flat] {
            return false;
        }
        self.bits.set(flat, true);
        self.set_count += 1;
        true
    }

    pub fn contains(&self, index: TileIndex) -> bool {
        self.data.contains_index(index) && self.bits[self.data.flat_index(index)]
    }

    pub fn len(&self) -> usize {
        self.set_count
    }

    pub fn is_empty(&self) -> bool {
        self.set_count == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = TileIndex> + '_ {
        let columns = self.data.num_tiles_x as usize;
        self.bits.iter_ones().map(move |flat| {
            TileIndex::new((flat % columns) as i32, (flat / columns) as i32)
        })
    }
}

use smallvec::SmallVec;

use crate::Rect;

/// Set of pixels stored as pairwise disjoint, non-empty rects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Region {
    rects: SmallVec<[Rect; 4]>,
}

impl Region {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rect(rect: Rect) -> Self {
        let mut region = Self::new();
        region.union_rect(rect);
        region
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }

    pub fn clear(&mut self) {
        self.rects.clear();
    }

    pub fn area(&self) -> i64 {
        self.rects.iter().map(Rect::area).sum()
    }

    pub fn bounds(&self) -> Rect {
        self.rects
            .iter()
            .fold(Rect::default(), |bounds, rect| bounds.union(*rect))
    }

    pub fn union_rect(&mut self, rect: Rect) {
        if rect.is_empty() {
            return;
        }
        let mut pieces: SmallVec<[Rect; 4]> = SmallVec::new();
        pieces.push(rect);
        for existing in &self.rects {
            let mut remaining = SmallVec::new();
            for piece in &pieces {
                subtract_into(*piece, *existing, &mut remaining);
            }
            pieces = remaining;
            if pieces.is_empty() {
                return;
            }
        }
        self.rects.extend(pieces);
    }

    pub fn union(&mut self, other: &Region) {
        for rect in &other.rects {
            self.union_rect(*rect);
        }
    }

    pub fn subtract_rect(&mut self, rect: Rect) {
        if rect.is_empty() || self.is_empty() {
            return;
        }
        let mut remaining = SmallVec::new();
        for existing in &self.rects {
            subtract_into(*existing, rect, &mut remaining);
        }
        self.rects = remaining;
    }

    pub fn subtract(&mut self, other: &Region) {
        for rect in &other.rects {
            self.subtract_rect(*rect);
        }
    }

    pub fn intersect_rect(&self, rect: Rect) -> Region {
        let mut out = Region::new();
        for existing in &self.rects {
            let clipped = existing.intersect(rect);
            if !clipped.is_empty() {
                out.rects.push(clipped);
            }
        }
        out
    }

    pub fn intersects_rect(&self, rect: Rect) -> bool {
        self.rects.iter().any(|existing| existing.intersects(rect))
    }

    /// True when every pixel of `rect` is inside the region.
    pub fn contains_rect(&self, rect: Rect) -> bool {
        if rect.is_empty() {
            return false;
        }
        let covered: i64 = self
            .rects
            .iter()
            .map(|existing| existing.intersect(rect).area())
            .sum();
        covered == rect.area()
    }
}

impl From<Rect> for Region {
    fn from(rect: Rect) -> Self {
        Region::from_rect(rect)
    }
}

/// Pushes the parts of `rect` outside `hole` as up to four disjoint rects.
fn subtract_into(rect: Rect, hole: Rect, out: &mut SmallVec<[Rect; 4]>) {
    if !rect.intersects(hole) {
        out.push(rect);
        return;
    }
    let top = hole.y.max(rect.y);
    let bottom = hole.bottom().min(rect.bottom());
    let above = Rect::from_ltrb(rect.x, rect.y, rect.right(), top);
    let below = Rect::from_ltrb(rect.x, bottom, rect.right(), rect.bottom());
    let left = Rect::from_ltrb(rect.x, top, hole.x.max(rect.x), bottom);
    let right = Rect::from_ltrb(hole.right().min(rect.right()), top, rect.right(), bottom);
    for piece in [above, below, left, right] {
        if !piece.is_empty() {
            out.push(piece);
        }
    }
}

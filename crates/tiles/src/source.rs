use std::fmt;

use model::{Rect, Region};

/// Recorded drawing commands for one layer, as seen by tile management.
pub trait ContentSource: fmt::Debug + Send + Sync {
    /// Whether `content_rect` at `contents_scale` is covered by recordings.
    fn can_raster(&self, content_rect: Rect, contents_scale: f32) -> bool;

    /// The single color of the whole layer, when it is uniform.
    fn solid_color(&self) -> Option<u32>;

    fn has_text(&self) -> bool;

    fn has_recordings(&self) -> bool;

    /// Mask layers are drawn from a single untiled texture.
    fn is_mask(&self) -> bool {
        false
    }

    fn is_solid_color(&self) -> bool {
        self.solid_color().is_some()
    }
}

/// Layer-space area hidden behind opaque content drawn above the layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Occlusion {
    occluded: Region,
}

impl Occlusion {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn from_region(occluded: Region) -> Self {
        Self { occluded }
    }

    pub fn is_occluded(&self, layer_rect: Rect) -> bool {
        self.occluded.contains_rect(layer_rect)
    }
}

//! Scale selection and tiling management for picture layers.
//!
//! Each layer of each tree generation owns a `LayerTileCoordinator`. It
//! decides which contents scales to raster at, keeps the tiling set in sync
//! with the twin layer of the sibling tree, and gates activation on the tiles
//! the pending tree needs. The two priority iterators expose a layer's tiles
//! to the raster scheduler and to the evictor.

mod context;
mod coordinator;
mod eviction_iterator;
mod raster_iterator;
mod settings;

pub use context::{DrawProperties, TreeContext, TreeGeneration};
pub use coordinator::{
    CleanUpOutcome, DrawCoverage, DrawEntry, LayerTileCoordinator, ScaleComponents, TilingPlan,
    plan_tilings_for_raster_scale,
};
pub use eviction_iterator::{EVICTION_STEPS, EvictionPriorityIterator};
pub use raster_iterator::RasterPriorityIterator;
pub use settings::{LayerTreeSettings, SettingsError};

#[cfg(test)]
mod tests;

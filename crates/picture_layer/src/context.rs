use model::Rect;
use tiles::WhichTree;
use view::ScreenSpaceTransform;

use crate::settings::LayerTreeSettings;

/// Which generation of the layer tree a layer currently belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TreeGeneration {
    Pending,
    Active,
    Recycle,
}

impl TreeGeneration {
    /// Recycle trees are never drawn and carry no priorities.
    pub fn which_tree(self) -> Option<WhichTree> {
        match self {
            TreeGeneration::Pending => Some(WhichTree::Pending),
            TreeGeneration::Active => Some(WhichTree::Active),
            TreeGeneration::Recycle => None,
        }
    }
}

/// Per-frame state of the tree a layer is updated in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeContext {
    pub generation: TreeGeneration,
    pub settings: LayerTreeSettings,
    pub frame_time_seconds: f64,
    pub begin_frame_interval_seconds: f64,
    pub device_viewport: Rect,
    /// Usually the device viewport; embedders may override it.
    pub viewport_for_tile_priority: Rect,
    pub min_page_scale: f32,
    pub pinch_gesture_active: bool,
    pub use_gpu_rasterization: bool,
    pub source_frame_number: u64,
    pub needs_update_draw_properties: bool,
    pub requires_high_res_to_draw: bool,
}

impl TreeContext {
    pub fn new(generation: TreeGeneration, settings: LayerTreeSettings, device_viewport: Rect) -> Self {
        Self {
            generation,
            settings,
            frame_time_seconds: 0.0,
            begin_frame_interval_seconds: 1.0 / 60.0,
            device_viewport,
            viewport_for_tile_priority: device_viewport,
            min_page_scale: 1.0,
            pinch_gesture_active: false,
            use_gpu_rasterization: false,
            source_frame_number: 0,
            needs_update_draw_properties: false,
            requires_high_res_to_draw: false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.generation == TreeGeneration::Pending
    }

    pub fn is_active(&self) -> bool {
        self.generation == TreeGeneration::Active
    }
}

/// Values derived for a layer by the draw-property pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawProperties {
    pub visible_content_rect: Rect,
    pub screen_space_transform: ScreenSpaceTransform,
    pub screen_space_transform_is_animating: bool,
    /// Largest contents scale a running transform animation reaches, or 0.
    pub maximum_animation_contents_scale: f32,
    pub ideal_contents_scale: f32,
    pub page_scale_factor: f32,
    pub device_scale_factor: f32,
    /// Whether the layer made it into the list of drawn layers this frame.
    pub is_drawn: bool,
}

impl Default for DrawProperties {
    fn default() -> Self {
        Self {
            visible_content_rect: Rect::default(),
            screen_space_transform: ScreenSpaceTransform::identity(),
            screen_space_transform_is_animating: false,
            maximum_animation_contents_scale: 0.0,
            ideal_contents_scale: 1.0,
            page_scale_factor: 1.0,
            device_scale_factor: 1.0,
            is_drawn: false,
        }
    }
}

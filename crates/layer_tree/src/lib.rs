//! Pending, active and recycle generations of a layer tree sharing one tile
//! store.
//!
//! Commits land in the pending tree, which is promoted to active once every
//! tile it requires is ready. Twins are found by layer id in the sibling
//! tree; nothing holds a reference across a commit or an activation.

use std::fmt;

use picture_layer::SettingsError;
use tiles::LayerId;
use view::ViewTransformError;

mod host;
mod tree;

pub use host::{DrawFrame, LayerTreeHost};
pub use tree::{LayerProperties, LayerTree};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerTreeError {
    InvalidSettings(SettingsError),
    InvalidView(ViewTransformError),
    DuplicateLayer { layer_id: LayerId },
    PendingTreeNotActivated { source_frame_number: u64 },
    NoPendingTree,
    ActivationBlocked { layer_id: LayerId },
}

impl fmt::Display for LayerTreeError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerTreeError::InvalidSettings(error) => write!(formatter, "{error}"),
            LayerTreeError::InvalidView(error) => write!(formatter, "invalid view: {error}"),
            LayerTreeError::DuplicateLayer { layer_id } => {
                write!(formatter, "layer {} committed twice", layer_id.0)
            }
            LayerTreeError::PendingTreeNotActivated {
                source_frame_number,
            } => write!(
                formatter,
                "pending tree from frame {source_frame_number} has not been activated"
            ),
            LayerTreeError::NoPendingTree => write!(formatter, "there is no pending tree"),
            LayerTreeError::ActivationBlocked { layer_id } => write!(
                formatter,
                "layer {} still has tiles required for activation that are not ready",
                layer_id.0
            ),
        }
    }
}

impl std::error::Error for LayerTreeError {}

impl From<SettingsError> for LayerTreeError {
    fn from(error: SettingsError) -> Self {
        LayerTreeError::InvalidSettings(error)
    }
}

impl From<ViewTransformError> for LayerTreeError {
    fn from(error: ViewTransformError) -> Self {
        LayerTreeError::InvalidView(error)
    }
}

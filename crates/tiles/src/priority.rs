use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WhichTree {
    Active,
    Pending,
}

impl WhichTree {
    pub(crate) const fn index(self) -> usize {
        match self {
            WhichTree::Active => 0,
            WhichTree::Pending => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TileResolution {
    High,
    Low,
    #[default]
    NonIdeal,
}

/// Urgency bins, most urgent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum PriorityBin {
    Now,
    Soon,
    #[default]
    Eventually,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TilePriority {
    pub resolution: TileResolution,
    pub bin: PriorityBin,
    /// Screen-space pixels between the tile and the visible rect.
    pub distance_to_visible: f32,
    pub required_for_activation: bool,
}

impl Default for TilePriority {
    fn default() -> Self {
        Self {
            resolution: TileResolution::NonIdeal,
            bin: PriorityBin::Eventually,
            distance_to_visible: f32::INFINITY,
            required_for_activation: false,
        }
    }
}

impl TilePriority {
    pub fn new(resolution: TileResolution, bin: PriorityBin, distance_to_visible: f32) -> Self {
        Self {
            resolution,
            bin,
            distance_to_visible,
            required_for_activation: false,
        }
    }

    pub fn is_higher_priority_than(&self, other: &TilePriority) -> bool {
        self.bin < other.bin
            || (self.bin == other.bin && self.distance_to_visible < other.distance_to_visible)
    }

    /// Most urgent view over both trees.
    pub fn combine(active: TilePriority, pending: TilePriority) -> TilePriority {
        let resolution = if active.resolution == TileResolution::High
            || pending.resolution == TileResolution::High
        {
            TileResolution::High
        } else if active.resolution == TileResolution::Low
            || pending.resolution == TileResolution::Low
        {
            TileResolution::Low
        } else {
            TileResolution::NonIdeal
        };
        let closest = if active.is_higher_priority_than(&pending) {
            active
        } else {
            pending
        };
        TilePriority {
            resolution,
            bin: closest.bin,
            distance_to_visible: closest.distance_to_visible,
            required_for_activation: pending.required_for_activation,
        }
    }
}

/// Which tree's view of a tile wins when the scheduler has to pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TreePriority {
    #[default]
    SamePriorityForBothTrees,
    SmoothnessTakesPriority,
    NewContentTakesPriority,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvictionCategory {
    Eventually,
    EventuallyAndRequiredForActivation,
    Soon,
    SoonAndRequiredForActivation,
    Now,
    NowAndRequiredForActivation,
}

/// Eviction order: least valuable category first.
pub const EVICTION_CATEGORIES: [EvictionCategory; 6] = [
    EvictionCategory::Eventually,
    EvictionCategory::EventuallyAndRequiredForActivation,
    EvictionCategory::Soon,
    EvictionCategory::SoonAndRequiredForActivation,
    EvictionCategory::Now,
    EvictionCategory::NowAndRequiredForActivation,
];

impl EvictionCategory {
    pub fn bin(self) -> PriorityBin {
        match self {
            EvictionCategory::Eventually | EvictionCategory::EventuallyAndRequiredForActivation => {
                PriorityBin::Eventually
            }
            EvictionCategory::Soon | EvictionCategory::SoonAndRequiredForActivation => {
                PriorityBin::Soon
            }
            EvictionCategory::Now | EvictionCategory::NowAndRequiredForActivation => {
                PriorityBin::Now
            }
        }
    }

    pub fn required_for_activation(self) -> bool {
        matches!(
            self,
            EvictionCategory::EventuallyAndRequiredForActivation
                | EvictionCategory::SoonAndRequiredForActivation
                | EvictionCategory::NowAndRequiredForActivation
        )
    }

    pub fn of(priority: &TilePriority, required_for_activation: bool) -> EvictionCategory {
        match (priority.bin, required_for_activation) {
            (PriorityBin::Eventually, false) => EvictionCategory::Eventually,
            (PriorityBin::Eventually, true) => EvictionCategory::EventuallyAndRequiredForActivation,
            (PriorityBin::Soon, false) => EvictionCategory::Soon,
            (PriorityBin::Soon, true) => EvictionCategory::SoonAndRequiredForActivation,
            (PriorityBin::Now, false) => EvictionCategory::Now,
            (PriorityBin::Now, true) => EvictionCategory::NowAndRequiredForActivation,
        }
    }

    pub fn position(self) -> usize {
        match self {
            EvictionCategory::Eventually => 0,
            EvictionCategory::EventuallyAndRequiredForActivation => 1,
            EvictionCategory::Soon => 2,
            EvictionCategory::SoonAndRequiredForActivation => 3,
            EvictionCategory::Now => 4,
            EvictionCategory::NowAndRequiredForActivation => 5,
        }
    }
}

//! Sector selection: per-model LOD state trees, level determination,
//! visibility ranking and the budgeted visibility-priority culler.

mod budget;
mod camera;
mod culler;
mod error;
mod level;
mod taken_tree;
mod visibility;
mod wanted;

pub use budget::{SectorBudget, SpentBudget};
pub use camera::CameraState;
pub use culler::{CullInput, TakenSectorMap, VisibilityPriorityCuller};
pub use error::CullError;
pub use level::{determine_level_of_detail, quad_size_threshold};
pub use taken_tree::{LodTransition, TakenSectorTree, TreePlan};
pub use visibility::{DistanceVisibilityRanking, PrioritizedSector, VisibilityRanking};
pub use wanted::{WantedSector, priority_order};

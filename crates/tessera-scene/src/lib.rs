//! Static sector hierarchy of a CAD model: metadata, id lookup, spatial queries and cost model.

mod cost;
mod error;
mod lod;
mod metadata;
mod model;
mod scene;
pub mod synthetic;

pub use cost::{DownloadSizeCost, SectorCostModel, sector_cost};
pub use error::{CostError, SceneError};
pub use lod::LevelOfDetail;
pub use metadata::{SectorDescriptor, SectorId, SectorMetadata};
pub use model::{CadModel, ModelId, ModelSectorKey};
pub use scene::{Ancestors, SectorScene};

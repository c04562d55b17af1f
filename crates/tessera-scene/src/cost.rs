//! Estimated cost of holding a sector at a given level of detail.

use crate::{CostError, LevelOfDetail, SectorMetadata};

/// Maps a sector and level to an estimated cost. The unit is up to the
/// implementation; the default is bytes downloaded.
pub trait SectorCostModel: Send + Sync {
    fn cost(&self, sector: &SectorMetadata, lod: LevelOfDetail) -> Result<f64, CostError>;
}

/// Download size from the sector's cost descriptors.
#[derive(Clone, Copy, Debug, Default)]
pub struct DownloadSizeCost;

impl SectorCostModel for DownloadSizeCost {
    fn cost(&self, sector: &SectorMetadata, lod: LevelOfDetail) -> Result<f64, CostError> {
        sector_cost(sector, lod)
    }
}

/// `detailed_cost` for Detailed, `simple_cost` for Simple, zero for Discarded.
///
/// Fails with [`CostError::NotLoadable`] when the level's descriptor is absent.
pub fn sector_cost(sector: &SectorMetadata, lod: LevelOfDetail) -> Result<f64, CostError> {
    let cost = match lod {
        LevelOfDetail::Discarded => Some(0.0),
        LevelOfDetail::Simple => sector.simple_cost,
        LevelOfDetail::Detailed => sector.detailed_cost,
    };
    cost.ok_or(CostError::NotLoadable {
        sector: sector.id,
        lod,
    })
}

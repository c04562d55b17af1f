use tessera_lod::CullError;
use tessera_scene::{LevelOfDetail, ModelId, SectorId};

/// Boxed error returned by fetch and parse collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failure of one sector's fetch or parse. Cloneable because every waiter
/// on a shared load receives it.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum LoadError {
    #[error("fetching sector {sector} ({lod}) failed: {reason}")]
    FetchFailed {
        sector: SectorId,
        lod: LevelOfDetail,
        reason: String,
    },
    #[error("parsing sector {sector} ({lod}, {byte_len} bytes) failed: {reason}")]
    ParseFailed {
        sector: SectorId,
        lod: LevelOfDetail,
        byte_len: usize,
        reason: String,
    },
}

impl LoadError {
    pub fn sector(&self) -> SectorId {
        match self {
            Self::FetchFailed { sector, .. } | Self::ParseFailed { sector, .. } => *sector,
        }
    }
}

/// Errors from the per-frame streaming driver.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum StreamError {
    #[error("culling pass skipped: {0}")]
    Cull(#[from] CullError),
    #[error("model {0} is not loaded")]
    UnknownModel(ModelId),
    #[error("model {0} is already loaded")]
    DuplicateModel(ModelId),
}

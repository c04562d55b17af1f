//! Scene construction and cost lookup errors.

use crate::{LevelOfDetail, SectorId};

/// Errors raised while linking sector descriptors into a scene.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SceneError {
    /// The descriptor list is empty.
    #[error("scene has no sectors")]
    Empty,
    /// A sector id is outside `0..sector_count`, so ids are not dense.
    #[error("sector id {id} out of range for a scene of {count} sectors")]
    IdOutOfRange { id: SectorId, count: usize },
    /// The same id appears twice.
    #[error("duplicate sector id {0}")]
    DuplicateId(SectorId),
    /// No descriptor without a parent.
    #[error("scene has no root sector")]
    NoRoot,
    /// More than one descriptor without a parent.
    #[error("scene has multiple roots: {first} and {second}")]
    MultipleRoots { first: SectorId, second: SectorId },
    /// A parent reference points at a sector that does not exist (or at itself).
    #[error("sector {sector} references unknown parent {parent}")]
    UnknownParent { sector: SectorId, parent: SectorId },
    /// The sector cannot be reached from the root (its parent chain loops).
    #[error("sector {0} is not reachable from the root")]
    Unreachable(SectorId),
    /// The sector's path does not extend its parent's path.
    #[error("sector {sector} path {path:?} is not prefixed by parent path {parent_path:?}")]
    PathMismatch {
        sector: SectorId,
        path: String,
        parent_path: String,
    },
}

/// The cost descriptor for the requested level is absent.
#[derive(Debug, Clone, Copy, thiserror::Error, PartialEq)]
pub enum CostError {
    #[error("sector {sector} is not loadable at level {lod}")]
    NotLoadable {
        sector: SectorId,
        lod: LevelOfDetail,
    },
}

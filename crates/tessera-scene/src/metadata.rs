use serde::{Deserialize, Serialize};
use tessera_math::Aabb;

/// Dense per-model sector index. The root is not required to be 0, but every
/// id in `0..sector_count` must exist.
pub type SectorId = u32;

/// Flat, serializable description of one sector, as delivered by the model's
/// scene file. [`SectorScene::from_descriptors`](crate::SectorScene::from_descriptors)
/// links these into a tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SectorDescriptor {
    pub id: SectorId,
    /// Hierarchical path, prefixed by the parent's path (`"0/"`, `"0/3/"`, ...).
    pub path: String,
    /// `None` for the root.
    pub parent: Option<SectorId>,
    pub bounds: Aabb,
    /// Download size of the full-resolution geometry.
    #[serde(default)]
    pub detailed_cost: Option<f64>,
    /// Download size of the coarse proxy, absent when the sector has none.
    #[serde(default)]
    pub simple_cost: Option<f64>,
    /// Edge length of the proxy's quads, in model units.
    #[serde(default)]
    pub quad_size: f32,
}

/// A node of the immutable sector tree.
///
/// Parent and children are arena indices into the owning
/// [`SectorScene`](crate::SectorScene); the parent link is a plain back-reference.
#[derive(Clone, Debug, PartialEq)]
pub struct SectorMetadata {
    pub id: SectorId,
    pub path: String,
    /// Distance from the root (root = 0).
    pub depth: u32,
    pub bounds: Aabb,
    pub parent: Option<SectorId>,
    /// Child ids, ascending.
    pub children: Vec<SectorId>,
    pub detailed_cost: Option<f64>,
    pub simple_cost: Option<f64>,
    pub quad_size: f32,
}

impl SectorMetadata {
    /// A sector without a coarse proxy can never be assigned Simple.
    pub fn has_simple_proxy(&self) -> bool {
        self.simple_cost.is_some()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

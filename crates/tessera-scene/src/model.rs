use std::fmt;
use std::sync::Arc;

use glam::Mat4;

use crate::{SectorId, SectorScene};

/// Identifier of a loaded model.
pub type ModelId = u32;

/// Hashable `(model, sector)` pair packed as `model << 32 | sector`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelSectorKey(u64);

impl ModelSectorKey {
    pub fn new(model: ModelId, sector: SectorId) -> Self {
        Self(((model as u64) << 32) | sector as u64)
    }

    pub fn model(self) -> ModelId {
        (self.0 >> 32) as ModelId
    }

    pub fn sector(self) -> SectorId {
        (self.0 & 0xFFFF_FFFF) as SectorId
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ModelSectorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.model(), self.sector())
    }
}

/// A model placed in the world: its sector scene and model-to-world transform.
#[derive(Clone, Debug)]
pub struct CadModel {
    pub id: ModelId,
    pub scene: Arc<SectorScene>,
    pub model_matrix: Mat4,
}

impl CadModel {
    /// A model at the world origin.
    pub fn new(id: ModelId, scene: Arc<SectorScene>) -> Self {
        Self {
            id,
            scene,
            model_matrix: Mat4::IDENTITY,
        }
    }

    pub fn with_model_matrix(mut self, model_matrix: Mat4) -> Self {
        self.model_matrix = model_matrix;
        self
    }

    pub fn key(&self, sector: SectorId) -> ModelSectorKey {
        ModelSectorKey::new(self.id, sector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_packs_model_and_sector() {
        let key = ModelSectorKey::new(3, 0xDEAD_BEEF);
        assert_eq!(key.model(), 3);
        assert_eq!(key.sector(), 0xDEAD_BEEF);
        assert_eq!(key.raw(), (3u64 << 32) | 0xDEAD_BEEF);
        assert_eq!(ModelSectorKey::new(1, 2).to_string(), "1:2");
    }

    #[test]
    fn test_structurally_equal_keys_are_equal() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(ModelSectorKey::new(1, 7));
        assert!(!set.insert(ModelSectorKey::new(1, 7)));
        assert!(set.insert(ModelSectorKey::new(2, 7)));
    }
}

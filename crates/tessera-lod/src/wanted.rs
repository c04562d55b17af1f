use std::cmp::Ordering;

use tessera_scene::{LevelOfDetail, ModelId, ModelSectorKey, SectorId};

/// Target state of one sector in a scheduling snapshot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WantedSector {
    pub model: ModelId,
    pub sector: SectorId,
    pub lod: LevelOfDetail,
    pub priority: f64,
}

impl WantedSector {
    pub fn key(&self) -> ModelSectorKey {
        ModelSectorKey::new(self.model, self.sector)
    }
}

/// Descending priority, ties broken by ascending `(model, sector)`.
pub fn priority_order(a: &WantedSector, b: &WantedSector) -> Ordering {
    b.priority
        .total_cmp(&a.priority)
        .then_with(|| a.key().cmp(&b.key()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wanted(model: ModelId, sector: SectorId, priority: f64) -> WantedSector {
        WantedSector {
            model,
            sector,
            lod: LevelOfDetail::Simple,
            priority,
        }
    }

    /// Higher priority first, infinity ahead of everything.
    #[test]
    fn test_priority_order_descending() {
        let mut list = vec![wanted(0, 1, 0.2), wanted(0, 2, f64::INFINITY), wanted(0, 3, 0.7)];
        list.sort_by(priority_order);
        let ids: Vec<_> = list.iter().map(|w| w.sector).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    /// Equal priorities fall back to model then sector id.
    #[test]
    fn test_priority_ties_by_key() {
        let mut list = vec![wanted(1, 0, 0.5), wanted(0, 9, 0.5), wanted(0, 3, 0.5)];
        list.sort_by(priority_order);
        let keys: Vec<_> = list.iter().map(|w| (w.model, w.sector)).collect();
        assert_eq!(keys, vec![(0, 3), (0, 9), (1, 0)]);
    }
}

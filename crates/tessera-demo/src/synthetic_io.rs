//! Stand-ins for a sector server: a fetcher with simulated latency and a
//! parser for its payload format.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::{self, BoxFuture};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rustc_hash::FxHashMap;
use tessera_loader::{BoxError, ModelConsumer, SectorFetcher, SectorKey, SectorParser};
use tessera_scene::{LevelOfDetail, ModelId, SectorId, SectorScene};

const MAGIC: &[u8; 4] = b"TSEC";
const HEADER_LEN: usize = 12;

/// Decoded payload of one sector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SectorMesh {
    pub sector: SectorId,
    pub lod: LevelOfDetail,
    pub triangle_count: u32,
}

/// Serves `MAGIC | sector | triangles` followed by padding up to the
/// sector's cost in the scene, after a pseudo-random delay.
pub struct SyntheticFetcher {
    scene: Arc<SectorScene>,
    seed: u64,
    max_latency_ms: u64,
}

impl SyntheticFetcher {
    pub fn new(scene: Arc<SectorScene>, seed: u64, max_latency_ms: u64) -> Self {
        Self {
            scene,
            seed,
            max_latency_ms,
        }
    }
}

impl SectorFetcher for SyntheticFetcher {
    fn fetch(&self, key: SectorKey) -> BoxFuture<'static, Result<Vec<u8>, BoxError>> {
        let metadata = self.scene.get_by_id(key.sector);
        let cost = metadata.and_then(|m| match key.lod {
            LevelOfDetail::Detailed => m.detailed_cost,
            LevelOfDetail::Simple => m.simple_cost,
            LevelOfDetail::Discarded => None,
        });
        let detail = u64::from(key.lod == LevelOfDetail::Detailed);
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed ^ ((u64::from(key.sector) << 1) | detail));
        let latency = Duration::from_millis(rng.random_range(0..=self.max_latency_ms));
        let triangles: u32 = rng.random_range(64..4096);

        let Some(cost) = cost else {
            let reason = format!("no {} payload for sector {}", key.lod, key.sector);
            return future::ready(Err(reason.into())).boxed();
        };

        async move {
            std::thread::sleep(latency);
            let mut bytes = Vec::with_capacity(cost as usize);
            bytes.extend_from_slice(MAGIC);
            bytes.extend_from_slice(&key.sector.to_le_bytes());
            bytes.extend_from_slice(&triangles.to_le_bytes());
            bytes.resize((cost as usize).max(HEADER_LEN), 0);
            Ok(bytes)
        }
        .boxed()
    }
}

/// Parses [`SyntheticFetcher`] payloads.
pub struct SyntheticParser;

impl SectorParser<SectorMesh> for SyntheticParser {
    fn parse(&self, key: SectorKey, bytes: Vec<u8>) -> BoxFuture<'static, Result<SectorMesh, BoxError>> {
        async move { decode(key, &bytes) }.boxed()
    }
}

fn decode(key: SectorKey, bytes: &[u8]) -> Result<SectorMesh, BoxError> {
    if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
        return Err("missing sector header".into());
    }
    let word = |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
    let sector = word(4);
    if sector != key.sector {
        return Err(format!("payload is for sector {sector}").into());
    }
    Ok(SectorMesh {
        sector,
        lod: key.lod,
        triangle_count: word(8),
    })
}

/// What the demo "renders": the mesh shown per sector.
#[derive(Default)]
pub struct MeshRegistry {
    shown: FxHashMap<(ModelId, SectorId), Arc<SectorMesh>>,
    pub consumed: u64,
    pub discarded: u64,
}

impl MeshRegistry {
    pub fn shown_count(&self) -> usize {
        self.shown.len()
    }

    pub fn triangle_count(&self) -> u64 {
        self.shown
            .values()
            .map(|m| u64::from(m.triangle_count))
            .sum()
    }
}

impl ModelConsumer<SectorMesh> for MeshRegistry {
    fn consume(&mut self, model: ModelId, sector: SectorId, _lod: LevelOfDetail, mesh: Arc<SectorMesh>) {
        self.shown.insert((model, sector), mesh);
        self.consumed += 1;
    }

    fn discard(&mut self, model: ModelId, sector: SectorId, lod: LevelOfDetail) {
        if self
            .shown
            .get(&(model, sector))
            .is_some_and(|mesh| mesh.lod == lod)
        {
            self.shown.remove(&(model, sector));
            self.discarded += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_scene::synthetic::{OctreeParams, octree};

    fn scene() -> Arc<SectorScene> {
        Arc::new(octree(&OctreeParams {
            depth: 1,
            detailed_cost: 64.0,
            ..Default::default()
        }))
    }

    /// Fetched payloads decode back to the requested sector.
    #[test]
    fn test_fetch_then_parse() {
        let fetcher = SyntheticFetcher::new(scene(), 7, 0);
        let key = SectorKey::new(3, LevelOfDetail::Detailed);
        let bytes = pollster::block_on(fetcher.fetch(key)).unwrap();
        assert_eq!(bytes.len(), 64);
        let mesh = pollster::block_on(SyntheticParser.parse(key, bytes)).unwrap();
        assert_eq!(mesh.sector, 3);
        assert!((64..4096).contains(&mesh.triangle_count));
    }

    /// The same seed gives the same payload.
    #[test]
    fn test_fetch_is_deterministic() {
        let a = SyntheticFetcher::new(scene(), 11, 0);
        let b = SyntheticFetcher::new(scene(), 11, 0);
        let key = SectorKey::new(5, LevelOfDetail::Simple);
        assert_eq!(
            pollster::block_on(a.fetch(key)).unwrap(),
            pollster::block_on(b.fetch(key)).unwrap()
        );
    }

    /// Payloads for another sector or without a header are rejected.
    #[test]
    fn test_parse_rejects_mismatch() {
        let fetcher = SyntheticFetcher::new(scene(), 1, 0);
        let bytes = pollster::block_on(fetcher.fetch(SectorKey::new(2, LevelOfDetail::Detailed))).unwrap();
        assert!(decode(SectorKey::new(4, LevelOfDetail::Detailed), &bytes).is_err());
        assert!(decode(SectorKey::new(2, LevelOfDetail::Detailed), b"TSEC").is_err());
    }

    /// Discarding another level leaves the shown mesh alone.
    #[test]
    fn test_registry_discard_matches_level() {
        let mut registry = MeshRegistry::default();
        let mesh = SectorMesh {
            sector: 1,
            lod: LevelOfDetail::Detailed,
            triangle_count: 10,
        };
        registry.consume(0, 1, LevelOfDetail::Detailed, Arc::new(mesh));
        registry.discard(0, 1, LevelOfDetail::Simple);
        assert_eq!(registry.shown_count(), 1);
        registry.discard(0, 1, LevelOfDetail::Detailed);
        assert_eq!(registry.shown_count(), 0);
    }
}

//! Per-frame driver tying the culler to one pair of activators per model.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use tessera_lod::{
    CameraState, CullInput, SectorBudget, SpentBudget, VisibilityPriorityCuller, VisibilityRanking,
    WantedSector,
};
use tessera_math::Plane;
use tessera_scene::{CadModel, LevelOfDetail, ModelId, SectorCostModel, SectorId};
use tracing::{debug, info};

use crate::{
    LoadWorkers, LoadingState, SectorActivator, SectorConsumer, SectorFetcher, SectorParser,
    SectorRepository, StreamError,
};

/// Receives loaded sectors of every model.
pub trait ModelConsumer<V> {
    fn consume(&mut self, model: ModelId, sector: SectorId, lod: LevelOfDetail, value: Arc<V>);
    fn discard(&mut self, model: ModelId, sector: SectorId, lod: LevelOfDetail);
}

/// Presents a [`ModelConsumer`] to one stream's activator.
struct StreamConsumer<'a, C: ?Sized> {
    model: ModelId,
    lod: LevelOfDetail,
    inner: &'a mut C,
}

impl<V, C: ModelConsumer<V> + ?Sized> SectorConsumer<V> for StreamConsumer<'_, C> {
    fn consume(&mut self, sector: SectorId, value: Arc<V>) {
        self.inner.consume(self.model, sector, self.lod, value);
    }

    fn discard(&mut self, sector: SectorId) {
        self.inner.discard(self.model, sector, self.lod);
    }
}

struct ModelStream<V> {
    repository: Arc<SectorRepository<V>>,
    simple: SectorActivator<V>,
    detailed: SectorActivator<V>,
}

impl<V> ModelStream<V> {
    fn activator_mut(&mut self, lod: LevelOfDetail) -> &mut SectorActivator<V> {
        match lod {
            LevelOfDetail::Detailed => &mut self.detailed,
            _ => &mut self.simple,
        }
    }
}

/// Streams sectors of several models: each [`update`](Self::update) culls
/// and reconciles, each [`tick`](Self::tick) hands one loaded sector over.
pub struct SectorStreamer<V> {
    workers: Arc<LoadWorkers>,
    culler: VisibilityPriorityCuller,
    budget: SectorBudget,
    clip_planes: Vec<Plane>,
    /// Models in insertion order; the culler reads them as a slice.
    models: Vec<CadModel>,
    streams: FxHashMap<ModelId, ModelStream<V>>,
    /// Round-robin position over `2 * models.len()` streams.
    tick_cursor: usize,
}

const STREAM_LODS: [LevelOfDetail; 2] = LevelOfDetail::LOADABLE;

impl<V: Send + Sync + 'static> SectorStreamer<V> {
    pub fn new(workers: Arc<LoadWorkers>, budget: SectorBudget) -> Self {
        Self::with_culler(workers, budget, VisibilityPriorityCuller::default())
    }

    /// Streamer costing sectors with `cost_model`.
    pub fn with_cost_model(
        workers: Arc<LoadWorkers>,
        budget: SectorBudget,
        cost_model: Arc<dyn SectorCostModel>,
    ) -> Self {
        Self::with_culler(workers, budget, VisibilityPriorityCuller::new(cost_model))
    }

    fn with_culler(
        workers: Arc<LoadWorkers>,
        budget: SectorBudget,
        culler: VisibilityPriorityCuller,
    ) -> Self {
        Self {
            workers,
            culler,
            budget,
            clip_planes: Vec::new(),
            models: Vec::new(),
            streams: FxHashMap::default(),
            tick_cursor: 0,
        }
    }

    pub fn add_model(
        &mut self,
        model: CadModel,
        fetcher: Arc<dyn SectorFetcher>,
        parser: Arc<dyn SectorParser<V>>,
    ) -> Result<(), StreamError> {
        if self.streams.contains_key(&model.id) {
            return Err(StreamError::DuplicateModel(model.id));
        }
        let repository = Arc::new(SectorRepository::new(fetcher, parser));
        let stream = ModelStream {
            simple: SectorActivator::new(
                LevelOfDetail::Simple,
                Arc::clone(&repository),
                Arc::clone(&self.workers),
            ),
            detailed: SectorActivator::new(
                LevelOfDetail::Detailed,
                Arc::clone(&repository),
                Arc::clone(&self.workers),
            ),
            repository,
        };
        info!(
            model = model.id,
            sectors = model.scene.sector_count(),
            "model added"
        );
        self.streams.insert(model.id, stream);
        self.models.push(model);
        Ok(())
    }

    /// Discard everything the model has loaded, cancel its loads and drop
    /// its cached results.
    pub fn remove_model<C>(&mut self, id: ModelId, consumer: &mut C) -> Result<(), StreamError>
    where
        C: ModelConsumer<V> + ?Sized,
    {
        let mut stream = self
            .streams
            .remove(&id)
            .ok_or(StreamError::UnknownModel(id))?;
        for lod in STREAM_LODS {
            stream.activator_mut(lod).clear(&mut StreamConsumer {
                model: id,
                lod,
                inner: &mut *consumer,
            });
        }
        stream.repository.clear();
        self.models.retain(|m| m.id != id);
        self.tick_cursor = 0;
        info!(model = id, "model removed");
        Ok(())
    }

    pub fn models(&self) -> &[CadModel] {
        &self.models
    }

    pub fn budget(&self) -> &SectorBudget {
        &self.budget
    }

    pub fn set_budget(&mut self, budget: SectorBudget) {
        self.budget = budget;
    }

    /// World-space planes; sectors entirely behind any plane are never
    /// forced near the camera.
    pub fn set_clip_planes(&mut self, planes: Vec<Plane>) {
        self.clip_planes = planes;
    }

    /// Recompute the wanted set for `camera` and reconcile every stream
    /// against it. Drops of all streams run before any new request.
    /// Returns whether any stream changed.
    pub fn update<C>(
        &mut self,
        camera: &CameraState,
        ranking: &mut dyn VisibilityRanking,
        consumer: &mut C,
    ) -> Result<bool, StreamError>
    where
        C: ModelConsumer<V> + ?Sized,
    {
        let input = CullInput {
            camera,
            models: &self.models,
            budget: &self.budget,
            clip_planes: &self.clip_planes,
        };
        let recomputed = self.culler.determine_sectors(&input, ranking)?;

        let mut wanted: FxHashMap<(ModelId, LevelOfDetail), Vec<SectorId>> = FxHashMap::default();
        for w in self.culler.wanted_sectors() {
            wanted.entry((w.model, w.lod)).or_default().push(w.sector);
        }

        let mut changed = false;
        for model in &self.models {
            let Some(stream) = self.streams.get_mut(&model.id) else {
                continue;
            };
            for lod in STREAM_LODS {
                let ids = wanted.get(&(model.id, lod)).map(Vec::as_slice).unwrap_or(&[]);
                let set: FxHashSet<SectorId> = ids.iter().copied().collect();
                changed |= stream.activator_mut(lod).apply_drops(
                    &set,
                    &mut StreamConsumer {
                        model: model.id,
                        lod,
                        inner: &mut *consumer,
                    },
                );
            }
        }
        for model in &self.models {
            let Some(stream) = self.streams.get_mut(&model.id) else {
                continue;
            };
            for lod in STREAM_LODS {
                let ids = wanted.get(&(model.id, lod)).map(Vec::as_slice).unwrap_or(&[]);
                changed |= stream.activator_mut(lod).issue_requests(ids);
            }
        }

        if recomputed || changed {
            debug!(recomputed, changed, state = %self.loading_state(), "streamer update");
        }
        Ok(changed)
    }

    /// Hand at most one loaded sector to `consumer`, rotating across
    /// streams so no model starves. Returns whether one was consumed.
    pub fn tick<C>(&mut self, consumer: &mut C) -> bool
    where
        C: ModelConsumer<V> + ?Sized,
    {
        let stream_count = self.models.len() * STREAM_LODS.len();
        for step in 0..stream_count {
            let index = (self.tick_cursor + step) % stream_count;
            let model = self.models[index / STREAM_LODS.len()].id;
            let lod = STREAM_LODS[index % STREAM_LODS.len()];
            let Some(stream) = self.streams.get_mut(&model) else {
                continue;
            };
            let consumed = stream.activator_mut(lod).refresh(&mut StreamConsumer {
                model,
                lod,
                inner: &mut *consumer,
            });
            if consumed {
                self.tick_cursor = (index + 1) % stream_count;
                return true;
            }
        }
        false
    }

    pub fn loading_state(&self) -> LoadingState {
        let mut state = LoadingState::default();
        for stream in self.streams.values() {
            state.accumulate(stream.simple.loading_state());
            state.accumulate(stream.detailed.loading_state());
        }
        state
    }

    pub fn spent_budget(&self) -> &SpentBudget {
        self.culler.spent_budget()
    }

    /// Wanted set of the last culling pass.
    pub fn wanted_sectors(&self) -> &[WantedSector] {
        self.culler.wanted_sectors()
    }

    /// The activator streaming `model` at `lod`.
    pub fn activator(&self, model: ModelId, lod: LevelOfDetail) -> Option<&SectorActivator<V>> {
        let stream = self.streams.get(&model)?;
        match lod {
            LevelOfDetail::Simple => Some(&stream.simple),
            LevelOfDetail::Detailed => Some(&stream.detailed),
            LevelOfDetail::Discarded => None,
        }
    }
}

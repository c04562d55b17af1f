//! Reconciles a wanted sector set against what is loaded for one
//! `(model, level)` stream.
//!
//! Every sector is inactive, in flight or active. [`SectorActivator::update`]
//! drops what is no longer wanted and requests what is new; completed loads
//! come back from the workers over a channel and are only accepted if their
//! generation still matches the in-flight entry, so a load that was dropped
//! and re-requested can never deliver its stale result.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::{Receiver, Sender};
use rustc_hash::{FxHashMap, FxHashSet};
use tessera_scene::{LevelOfDetail, SectorId};
use tracing::{debug, trace, warn};

use crate::{LoadError, LoadWorkers, LoadingState, SectorKey, SectorRepository};

/// Receives loaded sectors and releases dropped ones. Called on the
/// scheduling thread; must not block.
pub trait SectorConsumer<V> {
    fn consume(&mut self, sector: SectorId, value: Arc<V>);
    fn discard(&mut self, sector: SectorId);
}

struct InFlight {
    generation: u64,
    cancelled: Arc<AtomicBool>,
}

struct Completion<V> {
    sector: SectorId,
    generation: u64,
    result: Result<Arc<V>, LoadError>,
}

/// Running totals for progress reporting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ActivatorStats {
    pub requested: u64,
    pub loaded: u64,
    pub failed: u64,
    pub stale: u64,
}

pub struct SectorActivator<V> {
    lod: LevelOfDetail,
    repository: Arc<SectorRepository<V>>,
    workers: Arc<LoadWorkers>,
    active: FxHashSet<SectorId>,
    in_flight: FxHashMap<SectorId, InFlight>,
    consume_queue: VecDeque<(SectorId, Arc<V>)>,
    completion_tx: Sender<Completion<V>>,
    completion_rx: Receiver<Completion<V>>,
    next_generation: u64,
    stats: ActivatorStats,
}

impl<V: Send + Sync + 'static> SectorActivator<V> {
    pub fn new(
        lod: LevelOfDetail,
        repository: Arc<SectorRepository<V>>,
        workers: Arc<LoadWorkers>,
    ) -> Self {
        let (completion_tx, completion_rx) = crossbeam_channel::unbounded();
        Self {
            lod,
            repository,
            workers,
            active: FxHashSet::default(),
            in_flight: FxHashMap::default(),
            consume_queue: VecDeque::new(),
            completion_tx,
            completion_rx,
            next_generation: 0,
            stats: ActivatorStats::default(),
        }
    }

    pub fn lod(&self) -> LevelOfDetail {
        self.lod
    }

    /// Move to `wanted` (in request order): drop what is no longer wanted,
    /// then request what is new. Returns whether anything changed.
    pub fn update<C>(&mut self, wanted: &[SectorId], consumer: &mut C) -> bool
    where
        C: SectorConsumer<V> + ?Sized,
    {
        let wanted_set: FxHashSet<SectorId> = wanted.iter().copied().collect();
        let dropped = self.apply_drops(&wanted_set, consumer);
        let issued = self.issue_requests(wanted);
        dropped || issued
    }

    /// Cancel in-flight loads and discard active sectors outside `wanted`.
    pub fn apply_drops<C>(&mut self, wanted: &FxHashSet<SectorId>, consumer: &mut C) -> bool
    where
        C: SectorConsumer<V> + ?Sized,
    {
        self.poll_completions();

        let cancelled: Vec<SectorId> = self
            .in_flight
            .keys()
            .filter(|id| !wanted.contains(*id))
            .copied()
            .collect();
        for id in &cancelled {
            if let Some(entry) = self.in_flight.remove(id) {
                entry.cancelled.store(true, Ordering::Relaxed);
            }
        }

        let mut discarded: Vec<SectorId> = self
            .active
            .iter()
            .filter(|id| !wanted.contains(*id))
            .copied()
            .collect();
        discarded.sort_unstable();
        for &id in &discarded {
            self.active.remove(&id);
            consumer.discard(id);
        }
        if !discarded.is_empty() {
            self.consume_queue
                .retain(|(id, _)| !discarded.contains(id));
        }

        if !cancelled.is_empty() || !discarded.is_empty() {
            debug!(
                lod = %self.lod,
                cancelled = cancelled.len(),
                discarded = discarded.len(),
                "dropped sectors"
            );
        }
        !cancelled.is_empty() || !discarded.is_empty()
    }

    /// Request every sector in `wanted` that is neither active nor in flight.
    pub fn issue_requests(&mut self, wanted: &[SectorId]) -> bool {
        let mut issued = 0;
        for &id in wanted {
            if self.active.contains(&id) || self.in_flight.contains_key(&id) {
                continue;
            }
            if self.issue(id) {
                issued += 1;
            }
        }
        if issued > 0 {
            debug!(lod = %self.lod, issued, "requested sectors");
        }
        issued > 0
    }

    /// Hand the oldest loaded sector to `consumer`. Returns whether one was
    /// consumed.
    pub fn refresh<C>(&mut self, consumer: &mut C) -> bool
    where
        C: SectorConsumer<V> + ?Sized,
    {
        self.poll_completions();
        match self.consume_queue.pop_front() {
            Some((id, value)) => {
                consumer.consume(id, value);
                true
            }
            None => false,
        }
    }

    /// Accept finished loads. Returns the number accepted.
    pub fn poll_completions(&mut self) -> usize {
        let mut accepted = 0;
        while let Ok(completion) = self.completion_rx.try_recv() {
            let current = self
                .in_flight
                .get(&completion.sector)
                .is_some_and(|entry| entry.generation == completion.generation);
            if !current {
                trace!(sector = completion.sector, lod = %self.lod, "stale completion ignored");
                self.stats.stale += 1;
                continue;
            }
            self.in_flight.remove(&completion.sector);
            match completion.result {
                Ok(value) => {
                    self.active.insert(completion.sector);
                    self.consume_queue.push_back((completion.sector, value));
                    self.stats.loaded += 1;
                    accepted += 1;
                }
                Err(error) => {
                    // Back to inactive; the next update retries it.
                    warn!(sector = completion.sector, lod = %self.lod, %error, "sector load failed");
                    self.stats.failed += 1;
                }
            }
        }
        accepted
    }

    /// Cancel everything in flight and discard everything active.
    pub fn clear<C>(&mut self, consumer: &mut C)
    where
        C: SectorConsumer<V> + ?Sized,
    {
        self.apply_drops(&FxHashSet::default(), consumer);
        self.consume_queue.clear();
    }

    pub fn is_active(&self, id: SectorId) -> bool {
        self.active.contains(&id)
    }

    pub fn is_in_flight(&self, id: SectorId) -> bool {
        self.in_flight.contains_key(&id)
    }

    pub fn is_queued(&self, id: SectorId) -> bool {
        self.consume_queue.iter().any(|(queued, _)| *queued == id)
    }

    /// Active sectors in ascending id order.
    pub fn active_ids(&self) -> Vec<SectorId> {
        let mut ids: Vec<_> = self.active.iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn queued_count(&self) -> usize {
        self.consume_queue.len()
    }

    /// Nothing in flight and nothing waiting to be consumed.
    pub fn is_idle(&self) -> bool {
        self.in_flight.is_empty() && self.consume_queue.is_empty()
    }

    pub fn stats(&self) -> ActivatorStats {
        self.stats
    }

    pub fn loading_state(&self) -> LoadingState {
        LoadingState {
            is_loading: !self.is_idle(),
            items_requested: self.active.len() + self.in_flight.len(),
            items_loaded: self.active.len() - self.consume_queue.len(),
        }
    }

    /// Start loading `id` on a worker. Returns false when the pool no longer
    /// accepts jobs; the sector then stays inactive.
    fn issue(&mut self, id: SectorId) -> bool {
        let generation = self.next_generation;
        self.next_generation += 1;
        let cancelled = Arc::new(AtomicBool::new(false));
        self.in_flight.insert(
            id,
            InFlight {
                generation,
                cancelled: Arc::clone(&cancelled),
            },
        );

        let load = self.repository.request(SectorKey::new(id, self.lod));
        let sender = self.completion_tx.clone();
        let spawned = self.workers.spawn(move || {
            if cancelled.load(Ordering::Relaxed) {
                return;
            }
            let result = pollster::block_on(load);
            let _ = sender.send(Completion {
                sector: id,
                generation,
                result,
            });
        });
        if spawned {
            self.stats.requested += 1;
        } else {
            self.in_flight.remove(&id);
        }
        spawned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    use futures::FutureExt;
    use futures::future::BoxFuture;

    use crate::repository::tests::{CountingFetcher, LengthParser};
    use crate::{BoxError, SectorFetcher};

    #[derive(Default)]
    struct RecordingConsumer {
        consumed: Vec<SectorId>,
        discarded: Vec<SectorId>,
    }

    impl SectorConsumer<usize> for RecordingConsumer {
        fn consume(&mut self, sector: SectorId, _value: Arc<usize>) {
            self.consumed.push(sector);
        }

        fn discard(&mut self, sector: SectorId) {
            self.discarded.push(sector);
        }
    }

    /// Fetcher that blocks until `release` is set.
    struct GatedFetcher {
        release: Arc<AtomicBool>,
        calls: Arc<std::sync::atomic::AtomicUsize>,
    }

    impl SectorFetcher for GatedFetcher {
        fn fetch(&self, key: SectorKey) -> BoxFuture<'static, Result<Vec<u8>, BoxError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let release = Arc::clone(&self.release);
            async move {
                while !release.load(Ordering::SeqCst) {
                    std::thread::sleep(Duration::from_millis(1));
                }
                Ok(vec![0; key.sector as usize + 1])
            }
            .boxed()
        }
    }

    fn activator_with(fetcher: Arc<dyn SectorFetcher>) -> SectorActivator<usize> {
        let repository = Arc::new(SectorRepository::new(fetcher, Arc::new(LengthParser)));
        let workers = Arc::new(LoadWorkers::new(2).unwrap());
        SectorActivator::new(LevelOfDetail::Detailed, repository, workers)
    }

    /// Requests that no worker accepts are neither counted nor left in flight.
    #[test]
    fn test_rejected_spawn_is_not_requested() {
        let fetcher = Arc::new(CountingFetcher::default());
        let repository = Arc::new(SectorRepository::new(fetcher, Arc::new(LengthParser)));
        let mut workers = LoadWorkers::new(1).unwrap();
        workers.shutdown();
        let mut activator =
            SectorActivator::new(LevelOfDetail::Detailed, repository, Arc::new(workers));

        assert!(!activator.issue_requests(&[1, 2]));
        assert_eq!(activator.stats().requested, 0);
        assert!(activator.is_idle());
        assert_eq!(activator.loading_state().items_requested, 0);
    }

    /// Poll until `done` holds or ten seconds pass.
    fn wait_until(activator: &mut SectorActivator<usize>, done: impl Fn(&SectorActivator<usize>) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !done(activator) && Instant::now() < deadline {
            activator.poll_completions();
            std::thread::sleep(Duration::from_millis(2));
        }
        assert!(done(activator), "timed out waiting for activator");
    }

    /// A fixed wanted set converges: everything active, queue drained.
    #[test]
    fn test_converges_to_wanted() {
        let fetcher = Arc::new(CountingFetcher::default());
        let mut activator = activator_with(fetcher);
        let mut consumer = RecordingConsumer::default();
        let wanted = [1, 2, 3, 5, 8];

        assert!(activator.update(&wanted, &mut consumer));
        let deadline = Instant::now() + Duration::from_secs(10);
        while consumer.consumed.len() < wanted.len() && Instant::now() < deadline {
            activator.update(&wanted, &mut consumer);
            if !activator.refresh(&mut consumer) {
                std::thread::sleep(Duration::from_millis(2));
            }
        }

        assert_eq!(activator.active_ids(), vec![1, 2, 3, 5, 8]);
        assert!(activator.is_idle());
        consumer.consumed.sort_unstable();
        assert_eq!(consumer.consumed, vec![1, 2, 3, 5, 8]);
        assert!(!activator.update(&wanted, &mut consumer));
    }

    /// refresh() hands over one item per call.
    #[test]
    fn test_refresh_is_one_at_a_time() {
        let mut activator = activator_with(Arc::new(CountingFetcher::default()));
        let mut consumer = RecordingConsumer::default();
        activator.update(&[1, 2], &mut consumer);
        wait_until(&mut activator, |a| a.queued_count() == 2);
        assert!(activator.refresh(&mut consumer));
        assert_eq!(consumer.consumed.len(), 1);
        assert!(activator.refresh(&mut consumer));
        assert!(!activator.refresh(&mut consumer));
    }

    /// A sector dropped after completing but before consumption is
    /// discarded and never consumed.
    #[test]
    fn test_drop_after_complete() {
        let mut activator = activator_with(Arc::new(CountingFetcher::default()));
        let mut consumer = RecordingConsumer::default();
        activator.update(&[1], &mut consumer);
        wait_until(&mut activator, |a| a.is_queued(1));

        assert!(activator.update(&[], &mut consumer));
        assert_eq!(consumer.discarded, vec![1]);
        assert!(!activator.is_queued(1));
        assert!(!activator.is_active(1));
        assert!(!activator.refresh(&mut consumer));
        assert!(consumer.consumed.is_empty());
    }

    /// Dropping and re-wanting a sector mid-flight accepts only the newest
    /// request, and the shared load is fetched once.
    #[test]
    fn test_rerequest_ignores_stale_completion() {
        let release = Arc::new(AtomicBool::new(false));
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let fetcher = Arc::new(GatedFetcher {
            release: Arc::clone(&release),
            calls: Arc::clone(&calls),
        });
        let mut activator = activator_with(fetcher);
        let mut consumer = RecordingConsumer::default();

        activator.update(&[4], &mut consumer);
        activator.update(&[], &mut consumer);
        assert!(!activator.is_in_flight(4));
        activator.update(&[4], &mut consumer);
        assert!(activator.is_in_flight(4));

        release.store(true, Ordering::SeqCst);
        wait_until(&mut activator, |a| a.is_active(4));
        // Let a possible stale completion arrive too.
        std::thread::sleep(Duration::from_millis(50));
        activator.poll_completions();

        assert_eq!(activator.queued_count(), 1);
        assert!(activator.refresh(&mut consumer));
        assert_eq!(consumer.consumed, vec![4]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    /// After a full discard cycle with the cache cleared, re-wanting a
    /// sector fetches it again and it becomes active again.
    #[test]
    fn test_reload_after_discard() {
        let fetcher = Arc::new(CountingFetcher::default());
        let repository = Arc::new(SectorRepository::new(
            Arc::clone(&fetcher) as Arc<dyn SectorFetcher>,
            Arc::new(LengthParser),
        ));
        let workers = Arc::new(LoadWorkers::new(2).unwrap());
        let mut activator =
            SectorActivator::new(LevelOfDetail::Simple, Arc::clone(&repository), workers);
        let mut consumer = RecordingConsumer::default();

        activator.update(&[1], &mut consumer);
        wait_until(&mut activator, |a| a.is_queued(1));
        assert!(activator.refresh(&mut consumer));

        activator.clear(&mut consumer);
        repository.clear();
        assert_eq!(consumer.discarded, vec![1]);

        activator.update(&[1], &mut consumer);
        wait_until(&mut activator, |a| a.is_queued(1));
        assert!(activator.refresh(&mut consumer));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
        assert_eq!(consumer.consumed, vec![1, 1]);
        assert!(activator.is_active(1));
    }

    /// Without a cache clear the repository result is reused.
    #[test]
    fn test_rewanted_sector_reuses_cache() {
        let fetcher = Arc::new(CountingFetcher::default());
        let mut activator = activator_with(Arc::clone(&fetcher) as Arc<dyn SectorFetcher>);
        let mut consumer = RecordingConsumer::default();
        activator.update(&[2], &mut consumer);
        wait_until(&mut activator, |a| a.is_queued(2));
        activator.update(&[], &mut consumer);
        activator.update(&[2], &mut consumer);
        wait_until(&mut activator, |a| a.is_queued(2));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    /// A failed load returns the sector to inactive and the next update
    /// retries it.
    #[test]
    fn test_failed_load_is_retried() {
        let fetcher = Arc::new(CountingFetcher {
            failing: vec![3],
            ..Default::default()
        });
        let mut activator = activator_with(Arc::clone(&fetcher) as Arc<dyn SectorFetcher>);
        let mut consumer = RecordingConsumer::default();

        activator.update(&[3], &mut consumer);
        wait_until(&mut activator, |a| a.stats().failed == 1);
        assert!(!activator.is_in_flight(3));
        assert!(!activator.is_active(3));

        assert!(activator.update(&[3], &mut consumer));
        wait_until(&mut activator, |a| a.stats().failed == 2);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
        assert!(consumer.consumed.is_empty());
    }
}

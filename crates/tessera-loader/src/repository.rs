//! Memoized fetch and parse of sector geometry.
//!
//! [`SectorRepository`] keeps one shared load per `(sector, level)` key, so
//! concurrent and repeated requests for the same key collapse onto a single
//! fetch and parse. Entries live until [`SectorRepository::clear`] except
//! failed ones, which remove themselves so a later request tries again.

use std::sync::Arc;
use std::sync::Weak;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::{BoxFuture, FutureExt, Shared};
use tessera_scene::{LevelOfDetail, SectorId};
use tracing::{debug, trace};

use crate::{BoxError, LoadError};

/// Cache key: a sector at one level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SectorKey {
    pub sector: SectorId,
    pub lod: LevelOfDetail,
}

impl SectorKey {
    pub fn new(sector: SectorId, lod: LevelOfDetail) -> Self {
        Self { sector, lod }
    }
}

/// Retrieves the raw bytes for a sector.
pub trait SectorFetcher: Send + Sync {
    fn fetch(&self, key: SectorKey) -> BoxFuture<'static, Result<Vec<u8>, BoxError>>;
}

/// Decodes fetched bytes into geometry.
pub trait SectorParser<V>: Send + Sync {
    fn parse(&self, key: SectorKey, bytes: Vec<u8>) -> BoxFuture<'static, Result<V, BoxError>>;
}

/// A load that any number of waiters can await.
pub type SharedLoad<V> = Shared<BoxFuture<'static, Result<Arc<V>, LoadError>>>;

struct CacheEntry<V> {
    generation: u64,
    load: SharedLoad<V>,
}

type Entries<V> = DashMap<SectorKey, CacheEntry<V>>;

/// Request cache for one model.
pub struct SectorRepository<V> {
    fetcher: Arc<dyn SectorFetcher>,
    parser: Arc<dyn SectorParser<V>>,
    entries: Arc<Entries<V>>,
    next_generation: AtomicU64,
}

impl<V: Send + Sync + 'static> SectorRepository<V> {
    pub fn new(fetcher: Arc<dyn SectorFetcher>, parser: Arc<dyn SectorParser<V>>) -> Self {
        Self {
            fetcher,
            parser,
            entries: Arc::new(DashMap::new()),
            next_generation: AtomicU64::new(0),
        }
    }

    /// The shared load for `key`, starting one if none is pending or
    /// resolved. Nothing runs until the returned future is polled.
    pub fn request(&self, key: SectorKey) -> SharedLoad<V> {
        match self.entries.entry(key) {
            Entry::Occupied(entry) => {
                trace!(sector = key.sector, lod = %key.lod, "repository hit");
                entry.get().load.clone()
            }
            Entry::Vacant(entry) => {
                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                let load = self.start_load(key, generation);
                entry.insert(CacheEntry {
                    generation,
                    load: load.clone(),
                });
                load
            }
        }
    }

    /// Drop every entry. Loads already handed out still complete.
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &SectorKey) -> bool {
        self.entries.contains_key(key)
    }

    fn start_load(&self, key: SectorKey, generation: u64) -> SharedLoad<V> {
        let fetcher = Arc::clone(&self.fetcher);
        let parser = Arc::clone(&self.parser);
        let entries: Weak<Entries<V>> = Arc::downgrade(&self.entries);

        async move {
            let result = fetch_and_parse(fetcher.as_ref(), parser.as_ref(), key).await;
            if result.is_err() {
                // Only evict the entry this load belongs to; a clear() and
                // re-request may have replaced it.
                if let Some(entries) = entries.upgrade() {
                    entries.remove_if(&key, |_, e| e.generation == generation);
                }
            }
            result
        }
        .boxed()
        .shared()
    }
}

async fn fetch_and_parse<V>(
    fetcher: &dyn SectorFetcher,
    parser: &dyn SectorParser<V>,
    key: SectorKey,
) -> Result<Arc<V>, LoadError> {
    debug!(sector = key.sector, lod = %key.lod, "fetching sector");
    let bytes = fetcher
        .fetch(key)
        .await
        .map_err(|e| LoadError::FetchFailed {
            sector: key.sector,
            lod: key.lod,
            reason: e.to_string(),
        })?;
    let byte_len = bytes.len();
    let value = parser
        .parse(key, bytes)
        .await
        .map_err(|e| LoadError::ParseFailed {
            sector: key.sector,
            lod: key.lod,
            byte_len,
            reason: e.to_string(),
        })?;
    Ok(Arc::new(value))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    use futures::future;

    /// Fetcher returning `sector` repeated `sector + 1` times, counting calls.
    /// Sectors listed in `failing` fail.
    #[derive(Default)]
    pub(crate) struct CountingFetcher {
        pub calls: AtomicUsize,
        pub failing: Vec<SectorId>,
    }

    impl SectorFetcher for CountingFetcher {
        fn fetch(&self, key: SectorKey) -> BoxFuture<'static, Result<Vec<u8>, BoxError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let result = if self.failing.contains(&key.sector) {
                Err("connection reset".into())
            } else {
                Ok(vec![key.sector as u8; key.sector as usize + 1])
            };
            future::ready(result).boxed()
        }
    }

    /// Parser keeping the byte length; zero-length input is malformed.
    pub(crate) struct LengthParser;

    impl SectorParser<usize> for LengthParser {
        fn parse(&self, _key: SectorKey, bytes: Vec<u8>) -> BoxFuture<'static, Result<usize, BoxError>> {
            let result = if bytes.is_empty() {
                Err("empty sector".into())
            } else {
                Ok(bytes.len())
            };
            future::ready(result).boxed()
        }
    }

    fn repository(fetcher: Arc<CountingFetcher>) -> SectorRepository<usize> {
        SectorRepository::new(fetcher, Arc::new(LengthParser))
    }

    /// Two requests for the same key share one fetch.
    #[test]
    fn test_request_fetches_at_most_once() {
        let fetcher = Arc::new(CountingFetcher::default());
        let repo = repository(Arc::clone(&fetcher));
        let key = SectorKey::new(3, LevelOfDetail::Detailed);
        let a = repo.request(key);
        let b = repo.request(key);
        assert_eq!(*pollster::block_on(a).unwrap(), 4);
        assert_eq!(*pollster::block_on(b).unwrap(), 4);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    /// Concurrent requests from several threads still fetch once.
    #[test]
    fn test_concurrent_requests_fetch_once() {
        let fetcher = Arc::new(CountingFetcher::default());
        let repo = Arc::new(repository(Arc::clone(&fetcher)));
        let key = SectorKey::new(5, LevelOfDetail::Simple);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let repo = Arc::clone(&repo);
                thread::spawn(move || *pollster::block_on(repo.request(key)).unwrap())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 6);
        }
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    /// Levels of the same sector are separate entries.
    #[test]
    fn test_levels_are_separate_keys() {
        let fetcher = Arc::new(CountingFetcher::default());
        let repo = repository(Arc::clone(&fetcher));
        let _ = pollster::block_on(repo.request(SectorKey::new(1, LevelOfDetail::Simple)));
        let _ = pollster::block_on(repo.request(SectorKey::new(1, LevelOfDetail::Detailed)));
        assert_eq!(repo.len(), 2);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    /// A failed fetch is reported with the sector and evicted.
    #[test]
    fn test_failed_fetch_is_evicted() {
        let fetcher = Arc::new(CountingFetcher {
            failing: vec![2],
            ..Default::default()
        });
        let repo = repository(Arc::clone(&fetcher));
        let key = SectorKey::new(2, LevelOfDetail::Detailed);
        let err = pollster::block_on(repo.request(key)).unwrap_err();
        assert!(matches!(err, LoadError::FetchFailed { sector: 2, .. }));
        assert!(!repo.contains(&key));

        let _ = pollster::block_on(repo.request(key));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    /// Parse failures carry the byte length.
    #[test]
    fn test_parse_failure_reports_length() {
        struct EmptyFetcher;
        impl SectorFetcher for EmptyFetcher {
            fn fetch(&self, _key: SectorKey) -> BoxFuture<'static, Result<Vec<u8>, BoxError>> {
                future::ready(Ok(Vec::new())).boxed()
            }
        }
        let repo: SectorRepository<usize> =
            SectorRepository::new(Arc::new(EmptyFetcher), Arc::new(LengthParser));
        let err = pollster::block_on(repo.request(SectorKey::new(9, LevelOfDetail::Simple))).unwrap_err();
        assert_eq!(
            err,
            LoadError::ParseFailed {
                sector: 9,
                lod: LevelOfDetail::Simple,
                byte_len: 0,
                reason: "empty sector".to_string(),
            }
        );
    }

    /// After clear() the next request fetches again.
    #[test]
    fn test_clear_forces_refetch() {
        let fetcher = Arc::new(CountingFetcher::default());
        let repo = repository(Arc::clone(&fetcher));
        let key = SectorKey::new(0, LevelOfDetail::Simple);
        let _ = pollster::block_on(repo.request(key));
        repo.clear();
        assert!(repo.is_empty());
        let _ = pollster::block_on(repo.request(key));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    /// A stale failing load does not evict the entry that replaced it.
    #[test]
    fn test_stale_failure_keeps_new_entry() {
        let fetcher = Arc::new(CountingFetcher {
            failing: vec![4],
            ..Default::default()
        });
        let repo = repository(Arc::clone(&fetcher));
        let key = SectorKey::new(4, LevelOfDetail::Detailed);
        let stale = repo.request(key);
        repo.clear();
        let fresh = repo.request(key);
        assert!(pollster::block_on(stale).is_err());
        assert!(repo.contains(&key));
        drop(fresh);
    }
}

//! Sector streaming: memoized fetch/parse, a load worker pool, per-level
//! activators and the per-frame [`SectorStreamer`] driving them.

mod activator;
mod error;
mod loading_state;
mod repository;
mod streamer;
mod workers;

pub use activator::{ActivatorStats, SectorActivator, SectorConsumer};
pub use error::{BoxError, LoadError, StreamError};
pub use loading_state::LoadingState;
pub use repository::{SectorFetcher, SectorKey, SectorParser, SectorRepository, SharedLoad};
pub use streamer::{ModelConsumer, SectorStreamer};
pub use workers::LoadWorkers;

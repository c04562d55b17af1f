//! Streams synthetic CAD models along a scripted camera flight and logs what
//! the budget admits and how loading keeps up.

mod flight;
mod synthetic_io;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use glam::{Mat4, Vec3};
use tessera_config::{CliArgs, Config, default_config_dir};
use tessera_loader::{LoadWorkers, SectorStreamer};
use tessera_lod::DistanceVisibilityRanking;
use tessera_scene::CadModel;
use tessera_scene::synthetic::{OctreeParams, octree};
use tracing::{error, info, warn};

use flight::Flight;
use synthetic_io::{MeshRegistry, SectorMesh, SyntheticFetcher, SyntheticParser};

const MODEL_HALF_EXTENT: f32 = 64.0;
const TICKS_PER_FRAME: usize = 16;
const FRAME_TIME: Duration = Duration::from_millis(4);
const MAX_FETCH_LATENCY_MS: u64 = 3;

fn main() {
    let args = CliArgs::parse();

    let config_dir = args
        .config
        .clone()
        .or_else(default_config_dir)
        .unwrap_or_else(|| PathBuf::from(".tessera"));

    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.join("logs");
    tessera_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    if let Err(e) = config.validate() {
        error!("{e}");
        std::process::exit(2);
    }

    let workers = match LoadWorkers::new(worker_count(&config)) {
        Ok(workers) => Arc::new(workers),
        Err(e) => {
            error!("failed to start load workers: {e}");
            std::process::exit(1);
        }
    };
    info!(threads = workers.thread_count(), "load workers started");

    run_flight(&config, workers);
}

fn worker_count(config: &Config) -> usize {
    match config.loader.worker_threads {
        0 => LoadWorkers::default_thread_count(),
        n => n,
    }
}

fn run_flight(config: &Config, workers: Arc<LoadWorkers>) {
    let mut streamer: SectorStreamer<SectorMesh> =
        SectorStreamer::new(workers, config.streaming.to_budget());

    let scene = Arc::new(octree(&OctreeParams {
        depth: config.demo.tree_depth,
        half_extent: MODEL_HALF_EXTENT,
        ..Default::default()
    }));
    info!(
        sectors = scene.sector_count(),
        depth = scene.max_depth(),
        "synthetic model generated"
    );

    let model_count = config.demo.model_count.max(1);
    let spacing = MODEL_HALF_EXTENT * 2.5;
    let row_center = spacing * (model_count - 1) as f32 * 0.5;
    for index in 0..model_count {
        let offset = Vec3::new(index as f32 * spacing - row_center, 0.0, 0.0);
        let model = CadModel::new(index, Arc::clone(&scene)).with_model_matrix(Mat4::from_translation(offset));
        let fetcher = Arc::new(SyntheticFetcher::new(
            Arc::clone(&scene),
            config.demo.seed.wrapping_add(u64::from(index)),
            MAX_FETCH_LATENCY_MS,
        ));
        if let Err(e) = streamer.add_model(model, fetcher, Arc::new(SyntheticParser)) {
            warn!("{e}");
        }
    }

    let flight = Flight {
        center: Vec3::ZERO,
        radius: row_center + MODEL_HALF_EXTENT * 2.0,
        frames: config.demo.frames,
    };
    let mut ranking = DistanceVisibilityRanking;
    let mut registry = MeshRegistry::default();
    let started = Instant::now();

    for frame in 0..config.demo.frames {
        let camera = flight.camera_at(frame);
        if let Err(e) = streamer.update(&camera, &mut ranking, &mut registry) {
            warn!(frame, "update skipped: {e}");
        }
        for _ in 0..TICKS_PER_FRAME {
            if !streamer.tick(&mut registry) {
                break;
            }
        }
        if frame % 30 == 0 {
            info!(
                frame,
                shown = registry.shown_count(),
                triangles = registry.triangle_count(),
                "{} | {}",
                streamer.loading_state(),
                streamer.spent_budget()
            );
        }
        std::thread::sleep(FRAME_TIME);
    }

    let settle_deadline = Instant::now() + Duration::from_secs(5);
    while streamer.loading_state().is_loading && Instant::now() < settle_deadline {
        if !streamer.tick(&mut registry) {
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        consumed = registry.consumed,
        discarded = registry.discarded,
        shown = registry.shown_count(),
        "flight finished: {} | {}",
        streamer.loading_state(),
        streamer.spent_budget()
    );
}

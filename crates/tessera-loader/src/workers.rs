//! Worker threads that run fetch and parse jobs off the scheduling thread.

use std::io;
use std::thread::JoinHandle;

use crossbeam_channel::Sender;
use tracing::{debug, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A fixed pool of named OS threads pulling boxed jobs from a channel.
pub struct LoadWorkers {
    /// Dropped on shutdown to let the workers exit.
    job_sender: Option<Sender<Job>>,
    worker_handles: Vec<JoinHandle<()>>,
}

impl LoadWorkers {
    /// Spawn `thread_count` workers (at least one).
    pub fn new(thread_count: usize) -> io::Result<Self> {
        let thread_count = thread_count.max(1);
        let (job_tx, job_rx) = crossbeam_channel::unbounded::<Job>();

        let mut handles = Vec::with_capacity(thread_count);
        for index in 0..thread_count {
            let rx = job_rx.clone();
            let handle = std::thread::Builder::new()
                .name(format!("sector-load-{index}"))
                .spawn(move || {
                    while let Ok(job) = rx.recv() {
                        job();
                    }
                })?;
            handles.push(handle);
        }
        debug!(threads = thread_count, "load workers started");

        Ok(Self {
            job_sender: Some(job_tx),
            worker_handles: handles,
        })
    }

    /// One worker per core, leaving one core for the scheduling thread.
    pub fn with_defaults() -> io::Result<Self> {
        Self::new(Self::default_thread_count())
    }

    /// `num_cpus - 1`, at least 1.
    pub fn default_thread_count() -> usize {
        num_cpus::get().saturating_sub(1).max(1)
    }

    pub fn thread_count(&self) -> usize {
        self.worker_handles.len()
    }

    /// Queue a job. Returns `false` once the pool has shut down.
    pub fn spawn<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let Some(sender) = &self.job_sender else {
            return false;
        };
        if sender.send(Box::new(job)).is_err() {
            warn!("load workers are gone, job dropped");
            return false;
        }
        true
    }

    /// Stop accepting jobs, finish the queued ones and join every worker.
    pub fn shutdown(&mut self) {
        self.job_sender.take();
        for handle in self.worker_handles.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for LoadWorkers {
    fn drop(&mut self) {
        self.shutdown();
    }
}

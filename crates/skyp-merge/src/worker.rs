//! Background thread running chat scans.
//!
//! Scans read both databases only, so stopping one midway never leaves
//! anything half-applied.

use crate::diff::{compare_chats, scan_chats, ScanChunk};
use crate::MergeError;
use skyp_core::SkypConfig;
use skyp_storage::{SharedDatabase, SkypeDatabase};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// A pair of databases to scan.
#[derive(Clone)]
pub struct DiffJob {
    pub left: SharedDatabase,
    pub right: SharedDatabase,
}

pub type WorkerEvent = Result<ScanChunk, MergeError>;

type Callback = Box<dyn FnMut(WorkerEvent) + Send>;

/// Jobs are numbered as queued. A scan stops once `stopped` reaches its
/// number and posts nothing once `dropped` does.
#[derive(Default)]
struct Flags {
    queued: AtomicU64,
    stopped: AtomicU64,
    dropped: AtomicU64,
}

impl Flags {
    fn is_stopped(&self, generation: u64) -> bool {
        self.stopped.load(Ordering::SeqCst) >= generation
    }

    fn posting(&self, generation: u64) -> bool {
        !self.is_stopped(generation) && self.dropped.load(Ordering::SeqCst) < generation
    }
}

/// Runs one scan at a time on a dedicated thread, posting partial results
/// through a callback.
pub struct DiffWorker {
    sender: Option<Sender<(u64, DiffJob)>>,
    flags: Arc<Flags>,
    handle: Option<JoinHandle<()>>,
}

impl DiffWorker {
    pub fn new(config: SkypConfig, callback: impl FnMut(WorkerEvent) + Send + 'static) -> Self {
        let (sender, receiver) = mpsc::channel();
        let flags = Arc::new(Flags::default());
        let thread_flags = Arc::clone(&flags);
        let callback: Callback = Box::new(callback);
        let handle = thread::Builder::new()
            .name("skyp-diff".to_string())
            .spawn(move || run(receiver, config, thread_flags, callback))
            .map_err(|err| warn!(event = "worker_spawn_failed", error = %err))
            .ok();
        Self {
            sender: handle.as_ref().map(|_| sender),
            flags,
            handle,
        }
    }

    /// Stops the running scan, if any, and queues `job`.
    pub fn work(&self, job: DiffJob) -> Result<(), MergeError> {
        let sender = self.sender.as_ref().ok_or(MergeError::WorkerStopped)?;
        let generation = self.flags.queued.fetch_add(1, Ordering::SeqCst) + 1;
        self.flags.stopped.fetch_max(generation - 1, Ordering::SeqCst);
        sender
            .send((generation, job))
            .map_err(|_| MergeError::WorkerStopped)
    }

    /// Asks the running scan to stop; with `drop_results` nothing more is
    /// posted for it.
    pub fn stop_work(&self, drop_results: bool) {
        let queued = self.flags.queued.load(Ordering::SeqCst);
        self.flags.stopped.fetch_max(queued, Ordering::SeqCst);
        if drop_results {
            self.flags.dropped.fetch_max(queued, Ordering::SeqCst);
        }
    }

    /// Stops the scan and waits for the thread to exit.
    pub fn stop(&mut self) {
        self.stop_work(true);
        self.sender = None;
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!(event = "worker_panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for DiffWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(
    receiver: Receiver<(u64, DiffJob)>,
    config: SkypConfig,
    flags: Arc<Flags>,
    mut callback: Callback,
) {
    while let Ok(mut queued) = receiver.recv() {
        while let Ok(newer) = receiver.try_recv() {
            queued = newer;
        }
        let (generation, job) = queued;
        debug!(event = "scan_started", generation);

        let result = with_databases(&job, |left, right| {
            let compared = compare_chats(left, right)?;
            scan_chats(
                left,
                right,
                &compared,
                config.diff_results_chunk,
                || flags.is_stopped(generation),
                |chunk| {
                    if flags.posting(generation) {
                        callback(Ok(chunk));
                    }
                },
            )
        });
        match result {
            Ok(_) => {}
            Err(MergeError::WorkerStopped) => debug!(event = "scan_cancelled"),
            Err(err) => {
                warn!(event = "scan_failed", error = %err);
                if flags.posting(generation) {
                    callback(Err(err));
                }
            }
        }
    }
    debug!(event = "worker_exit");
}

fn with_databases<T>(
    job: &DiffJob,
    func: impl FnOnce(&SkypeDatabase, &SkypeDatabase) -> T,
) -> T {
    let left = job.left.lock().unwrap_or_else(PoisonError::into_inner);
    if Arc::ptr_eq(&job.left, &job.right) {
        return func(&left, &left);
    }
    let right = job.right.lock().unwrap_or_else(PoisonError::into_inner);
    func(&left, &right)
}

//! Stream lifecycle management.
//!
//! The engine owns the store and one worker thread per running source. Each
//! worker runs the acquisition loop: open the source, pull one frame per
//! iteration with a bounded timeout, classify the pull, publish the result,
//! sleep the poll interval. Capture failures never terminate a loop; only
//! an explicit stop does.
//!
//! Stop is cooperative: the worker polls a per-spawn stop flag, and `stop`
//! waits on a done channel with a bounded timeout. A worker that exceeds the
//! timeout (stuck inside a blocking pull) is abandoned with a warning; it
//! exits and releases its backend on its own once the pull returns. Because
//! the stop flag belongs to the spawn rather than the slot, an abandoned
//! worker can never be confused with a freshly started one.

use anyhow::{anyhow, Result};
use chrono::Local;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::annotate::annotate_frame;
use crate::capture::{AddressGrabberFactory, CaptureOptions, Grabber, GrabberFactory};
use crate::encode::encode_png;
use crate::placeholder::placeholder_frame;
use crate::store::{StreamSlot, StreamStore};
use crate::{EngineConfig, Frame, Source, Status};

/// Result of a `stop` request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopOutcome {
    /// The worker acknowledged the stop within the timeout.
    Clean,
    /// The worker did not exit in time and was abandoned; its backend
    /// resource is released whenever the blocking pull returns.
    TimedOut,
}

impl StopOutcome {
    pub fn is_clean(self) -> bool {
        matches!(self, StopOutcome::Clean)
    }
}

struct Worker {
    stop: Arc<AtomicBool>,
    done_rx: mpsc::Receiver<()>,
    join: Option<JoinHandle<()>>,
}

/// Multi-stream capture engine: lifecycle manager plus query surface.
pub struct Engine {
    sources: Vec<Source>,
    store: Arc<StreamStore>,
    factory: Arc<dyn GrabberFactory>,
    poll_interval: Duration,
    stop_timeout: Duration,
    workers: Mutex<HashMap<usize, Worker>>,
}

impl Engine {
    pub fn new(sources: Vec<Source>, config: &EngineConfig) -> Self {
        let options = CaptureOptions {
            width: config.capture.width,
            height: config.capture.height,
            // Pull timeout stays well above the poll interval so a healthy
            // backend is never misclassified, while a dead one still
            // unblocks the cooperative stop check promptly.
            pull_timeout: (config.poll_interval * 4).max(Duration::from_millis(500)),
        };
        Self::with_factory(sources, config, Arc::new(AddressGrabberFactory::new(options)))
    }

    /// Build an engine with a custom capture backend factory.
    pub fn with_factory(
        sources: Vec<Source>,
        config: &EngineConfig,
        factory: Arc<dyn GrabberFactory>,
    ) -> Self {
        let store = Arc::new(StreamStore::new(sources.len()));
        Self {
            sources,
            store,
            factory,
            poll_interval: config.poll_interval,
            stop_timeout: config.stop_timeout,
            workers: Mutex::new(HashMap::new()),
        }
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn store(&self) -> &Arc<StreamStore> {
        &self.store
    }

    pub fn frame(&self, index: usize) -> Option<Frame> {
        self.store.frame(index)
    }

    pub fn status(&self, index: usize) -> Status {
        self.store.status(index)
    }

    /// Consistent point-in-time (frame, status) pair for one source.
    pub fn snapshot(&self, index: usize) -> (Option<Frame>, Status) {
        self.store
            .slot(index)
            .map(|slot| slot.snapshot())
            .unwrap_or((None, Status::Unknown))
    }

    pub fn is_running(&self, index: usize) -> bool {
        self.store.is_running(index)
    }

    pub fn running_count(&self) -> usize {
        self.store.running_count()
    }

    pub fn connected_count(&self) -> usize {
        self.store.connected_count()
    }

    /// Encode the latest frame of a source as PNG; `None` when the source
    /// has no frame yet.
    pub fn encoded_frame(&self, index: usize) -> Result<Option<Vec<u8>>> {
        match self.store.frame(index) {
            Some(frame) => Ok(Some(encode_png(&frame)?)),
            None => Ok(None),
        }
    }

    /// Start the acquisition loop for one source. No-op if already running.
    pub fn start(&self, index: usize) -> Result<()> {
        let source = self
            .sources
            .get(index)
            .cloned()
            .ok_or_else(|| anyhow!("unknown source index {}", index))?;
        let slot = self
            .store
            .slot(index)
            .ok_or_else(|| anyhow!("unknown source index {}", index))?;

        let mut workers = lock_workers(&self.workers);
        if workers.contains_key(&index) && slot.is_running() {
            return Ok(());
        }
        // Reap a worker that exited on its own (e.g. after a panic).
        reap_worker(workers.remove(&index), index);

        let stop = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = mpsc::channel();
        let loop_stop = stop.clone();
        let loop_slot = slot.clone();
        let factory = self.factory.clone();
        let poll_interval = self.poll_interval;

        slot.set_running(true);
        let join = std::thread::spawn(move || {
            acquisition_loop(&source, &loop_slot, factory.as_ref(), poll_interval, &loop_stop);
            let _ = done_tx.send(());
        });

        workers.insert(
            index,
            Worker {
                stop,
                done_rx,
                join: Some(join),
            },
        );
        log::info!("source {} started", index);
        Ok(())
    }

    /// Stop the acquisition loop for one source and wait (bounded) for it
    /// to exit. Stopping a source that is not running is a no-op.
    pub fn stop(&self, index: usize) -> StopOutcome {
        let worker = {
            let mut workers = lock_workers(&self.workers);
            workers.remove(&index)
        };
        if let Some(slot) = self.store.slot(index) {
            slot.set_running(false);
        }
        let Some(worker) = worker else {
            return StopOutcome::Clean;
        };
        self.wait_for_exit(index, worker)
    }

    /// Restart one source (the per-camera "refresh" operation).
    pub fn restart(&self, index: usize) -> Result<StopOutcome> {
        let outcome = self.stop(index);
        self.start(index)?;
        Ok(outcome)
    }

    pub fn start_all(&self) -> Result<()> {
        for index in 0..self.sources.len() {
            self.start(index)?;
        }
        Ok(())
    }

    /// Stop every running source. Every stop is issued (flags cleared)
    /// before any bounded wait begins, so slow workers do not delay the
    /// stop signal reaching the others.
    pub fn stop_all(&self) -> Vec<(usize, StopOutcome)> {
        let drained: Vec<(usize, Worker)> = {
            let mut workers = lock_workers(&self.workers);
            workers.drain().collect()
        };
        for (index, worker) in &drained {
            worker.stop.store(true, Ordering::SeqCst);
            if let Some(slot) = self.store.slot(*index) {
                slot.set_running(false);
            }
        }
        drained
            .into_iter()
            .map(|(index, worker)| (index, self.wait_for_exit(index, worker)))
            .collect()
    }

    fn wait_for_exit(&self, index: usize, mut worker: Worker) -> StopOutcome {
        worker.stop.store(true, Ordering::SeqCst);
        match worker.done_rx.recv_timeout(self.stop_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                reap_worker(Some(worker), index);
                log::info!("source {} stopped", index);
                StopOutcome::Clean
            }
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    "source {} did not stop within {:?}; abandoning worker",
                    index,
                    self.stop_timeout
                );
                StopOutcome::TimedOut
            }
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop_all();
    }
}

fn lock_workers(
    workers: &Mutex<HashMap<usize, Worker>>,
) -> std::sync::MutexGuard<'_, HashMap<usize, Worker>> {
    match workers.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn reap_worker(worker: Option<Worker>, index: usize) {
    if let Some(mut worker) = worker {
        worker.stop.store(true, Ordering::SeqCst);
        if let Some(join) = worker.join.take() {
            if join.join().is_err() {
                log::warn!("source {} worker panicked", index);
            }
        }
    }
}

/// One source's pull-classify-store cycle.
///
/// Runs until the stop flag is set, within one iteration of it being set.
/// Capture and open failures are converted to `Status::Disconnected` plus a
/// placeholder frame; the failed grabber is dropped so the next iteration
/// reopens it, which doubles as automatic reconnect.
fn acquisition_loop(
    source: &Source,
    slot: &StreamSlot,
    factory: &dyn GrabberFactory,
    poll_interval: Duration,
    stop: &AtomicBool,
) {
    let label = source.label();
    let placeholder = placeholder_frame(&label);
    let mut grabber: Option<Box<dyn Grabber>> = None;
    let mut last_status = Status::Unknown;

    while !stop.load(Ordering::SeqCst) {
        if grabber.is_none() {
            match factory.open(&source.address) {
                Ok(open) => grabber = Some(open),
                Err(err) => log::debug!("source {} open failed: {}", source.index, err),
            }
        }

        let pulled = match grabber.as_mut() {
            Some(open) => match open.grab() {
                Ok(image) => Some(image),
                Err(err) => {
                    log::debug!("source {} pull failed: {}", source.index, err);
                    // Drop the backend; the next iteration reopens it.
                    grabber = None;
                    None
                }
            },
            None => None,
        };

        let (mut image, status) = match pulled {
            Some(image) => (image, Status::Connected),
            None => (placeholder.clone(), Status::Disconnected),
        };
        if status != last_status {
            log::info!("source {} is now {:?}", source.index, status);
            last_status = status;
        }

        let now = Local::now();
        annotate_frame(&mut image, status, now);
        slot.publish(
            Frame {
                image,
                captured_at: now,
            },
            status,
        );

        std::thread::sleep(poll_interval);
    }
    // Dropping the grabber here releases the capture backend.
}

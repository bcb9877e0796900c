use crate::error::{FrameError, InferError};
use crate::frame::{Frame, FrameSource};
use crate::model::{classify, ModelBackend, Scores};
use crate::preprocess::preprocess;
use std::io;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, trace, warn};

/// A single value cell shared between threads. Publishing replaces any value
/// that has not been taken yet.
pub struct LatestSlot<T> {
    value: Mutex<Option<T>>,
}

impl<T> Default for LatestSlot<T> {
    fn default() -> Self {
        Self {
            value: Mutex::new(None),
        }
    }
}

impl<T: Clone> LatestSlot<T> {
    pub fn publish(&self, value: T) {
        *self.lock() = Some(value);
    }

    pub fn peek(&self) -> Option<T> {
        self.lock().clone()
    }

    pub fn take(&self) -> Option<T> {
        self.lock().take()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<T>> {
        // poisoning is ignored, the slot only ever holds whole values
        self.value.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub sequence: u64,
    pub scores: Scores,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Accepted,
    /// A frame is already pending; this one was dropped.
    Skipped,
    /// The worker has exited.
    Stopped,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AnalyzerStats {
    pub processed: u64,
    pub failed: u64,
    pub skipped: u64,
}

#[derive(Default)]
struct Counters {
    processed: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> AnalyzerStats {
        AnalyzerStats {
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

/// Owns the analysis worker; dropping it also stops the worker.
pub struct Analyzer {
    tx: Option<SyncSender<Frame>>,
    latest: Arc<LatestSlot<Published>>,
    counters: Arc<Counters>,
    worker: Option<JoinHandle<Result<(), InferError>>>,
}

impl Analyzer {
    pub fn start<B>(backend: B) -> io::Result<Self>
    where
        B: ModelBackend + Send + 'static,
    {
        let (tx, rx) = sync_channel(1);
        let latest = Arc::new(LatestSlot::default());
        let counters = Arc::new(Counters::default());
        let worker = {
            let latest = latest.clone();
            let counters = counters.clone();
            std::thread::Builder::new()
                .name("alertcam-analyzer".into())
                .spawn(move || run_worker(backend, rx, &latest, &counters))?
        };
        debug!("analyzer started");
        Ok(Self {
            tx: Some(tx),
            latest,
            counters,
            worker: Some(worker),
        })
    }

    pub fn submit(&self, frame: Frame) -> Submission {
        let Some(tx) = &self.tx else {
            return Submission::Stopped;
        };
        match tx.try_send(frame) {
            Ok(()) => Submission::Accepted,
            Err(TrySendError::Full(_)) => {
                self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                trace!("analyzer busy, frame skipped");
                Submission::Skipped
            }
            Err(TrySendError::Disconnected(_)) => Submission::Stopped,
        }
    }

    pub fn latest(&self) -> Option<Published> {
        self.latest.peek()
    }

    pub fn take_latest(&self) -> Option<Published> {
        self.latest.take()
    }

    pub fn results(&self) -> Arc<LatestSlot<Published>> {
        self.latest.clone()
    }

    pub fn stats(&self) -> AnalyzerStats {
        self.counters.snapshot()
    }

    pub fn stop(mut self) -> Result<AnalyzerStats, InferError> {
        self.shutdown()?;
        Ok(self.counters.snapshot())
    }

    fn shutdown(&mut self) -> Result<(), InferError> {
        self.tx.take();
        match self.worker.take() {
            Some(worker) => match worker.join() {
                Ok(res) => res,
                Err(_) => Err(InferError::WorkerPanicked),
            },
            None => Ok(()),
        }
    }
}

impl Drop for Analyzer {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!("analyzer stopped with error: {e}");
        }
    }
}

/// Consecutive capture failures after which [`feed`] gives up.
pub const MAX_CAPTURE_FAILURES: u32 = 10;
const CAPTURE_BACKOFF: Duration = Duration::from_millis(20);

/// Pulls frames from `source` into the analyzer until `limit` capture
/// attempts have been made, the worker stops, or capture keeps failing.
/// Returns the number of frames captured.
pub fn feed<S, F>(
    source: &mut S,
    analyzer: &Analyzer,
    limit: Option<u64>,
    interval: Duration,
    mut on_result: F,
) -> Result<u64, FrameError>
where
    S: FrameSource + ?Sized,
    F: FnMut(&Published),
{
    let mut attempts = 0u64;
    let mut captured = 0u64;
    let mut failures = 0u32;
    while limit.map_or(true, |n| attempts < n) {
        attempts += 1;
        let frame = match source.next_frame() {
            Ok(f) => f,
            Err(e) => {
                failures += 1;
                if failures >= MAX_CAPTURE_FAILURES {
                    error!(failures, "giving up on frame source");
                    return Err(e);
                }
                warn!("failed to capture frame: {e}");
                std::thread::sleep(CAPTURE_BACKOFF);
                continue;
            }
        };
        failures = 0;
        captured += 1;
        if analyzer.submit(frame) == Submission::Stopped {
            break;
        }
        if let Some(published) = analyzer.take_latest() {
            on_result(&published);
        }
        if !interval.is_zero() {
            std::thread::sleep(interval);
        }
    }
    Ok(captured)
}

fn run_worker<B: ModelBackend>(
    backend: B,
    rx: Receiver<Frame>,
    latest: &LatestSlot<Published>,
    counters: &Counters,
) -> Result<(), InferError> {
    let mut sequence = 0u64;
    for frame in rx {
        let tensor = preprocess(&frame);
        drop(frame);
        match classify(&backend, &tensor) {
            Ok(scores) => {
                sequence += 1;
                counters.processed.fetch_add(1, Ordering::Relaxed);
                trace!(sequence, classes = scores.len(), "result published");
                latest.publish(Published { sequence, scores });
            }
            Err(e) if e.is_fatal() => {
                error!("analysis stopped: {e}");
                return Err(e);
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!("frame dropped: {e}");
            }
        }
    }
    debug!(processed = sequence, "analyzer worker exiting");
    Ok(())
}

//! Pipeline coordinator
//!
//! Runs the decode/validate loop on a background thread:
//!
//! ```text
//! CAN receiver -> FrameQueue -> FrameDecoder -> SignalValidator (history)
//!                                            \-> StateStore (latest + changes)
//! ```
//!
//! The worker blocks only on a dequeue with a short timeout, so cancellation is
//! observed within one poll interval. `stop()` waits (bounded) for the worker
//! to exit and takes back the validator; results can only be read after that,
//! which keeps the validator single-writer for the whole run.

use crate::config::PipelineConfig;
use crate::decoder::FrameDecoder;
use crate::frame::CanFrame;
use crate::rules::RuleSet;
use crate::signals::SignalMap;
use crate::state_store::StateStore;
use crate::types::{Error, Result};
use crate::validator::{SignalValidator, TestResult, TestSummary};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Anything the pipeline can pull raw frames from
pub trait FrameSource: Send {
    /// Wait up to `timeout` for the next frame
    ///
    /// `None` means nothing arrived in time. Transport errors are reported by
    /// the source itself, never through this call.
    fn try_dequeue(&mut self, timeout: Duration) -> Option<CanFrame>;
}

/// Create a bounded frame queue
///
/// The sender half goes to the CAN receiver, the queue half to the pipeline.
pub fn frame_queue(capacity: usize) -> (FrameSender, FrameQueue) {
    let (tx, rx) = mpsc::sync_channel(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    (
        FrameSender {
            tx,
            dropped: dropped.clone(),
        },
        FrameQueue { rx, dropped },
    )
}

/// Producer half of the frame queue
#[derive(Debug, Clone)]
pub struct FrameSender {
    tx: SyncSender<CanFrame>,
    dropped: Arc<AtomicU64>,
}

impl FrameSender {
    /// Enqueue without blocking
    ///
    /// # Returns
    /// * `false` if the frame was dropped (queue full or consumer gone)
    pub fn try_send(&self, frame: CanFrame) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(frame)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                log::warn!(
                    "Frame queue full, dropped CAN ID 0x{:X} ({} dropped so far)",
                    frame.can_id,
                    dropped
                );
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Enqueue, waiting for space
    ///
    /// # Returns
    /// * `false` if the consumer is gone
    pub fn send(&self, frame: CanFrame) -> bool {
        self.tx.send(frame).is_ok()
    }

    /// Frames dropped because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Consumer half of the frame queue
#[derive(Debug)]
pub struct FrameQueue {
    rx: Receiver<CanFrame>,
    dropped: Arc<AtomicU64>,
}

impl FrameQueue {
    /// Frames dropped because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl FrameSource for FrameQueue {
    fn try_dequeue(&mut self, timeout: Duration) -> Option<CanFrame> {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => Some(frame),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                // No producer left; still honour the timeout so the caller
                // does not spin
                thread::sleep(timeout);
                None
            }
        }
    }
}

/// Live counters of a pipeline run
#[derive(Debug, Default)]
pub struct PipelineStats {
    frames: AtomicU64,
    signals: AtomicU64,
    unknown_frames: AtomicU64,
}

impl PipelineStats {
    /// Frames taken off the source
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    /// Decoded signals handed to the validator and store
    pub fn signals(&self) -> u64 {
        self.signals.load(Ordering::Acquire)
    }

    /// Frames whose CAN ID has no definitions
    pub fn unknown_frames(&self) -> u64 {
        self.unknown_frames.load(Ordering::Acquire)
    }
}

struct Worker {
    handle: JoinHandle<()>,
    done: Receiver<SignalValidator>,
}

/// Owner of the background decode/validate loop
pub struct Pipeline {
    cancel: Arc<AtomicBool>,
    stats: Arc<PipelineStats>,
    state_store: Arc<StateStore>,
    worker: Option<Worker>,
    validator: Option<SignalValidator>,
    panicked: bool,
    stop_timeout: Duration,
}

impl Pipeline {
    /// Launch the loop on a background thread
    ///
    /// A fresh validator is created for the run; the signal map and rule set
    /// are shared read-only.
    pub fn start<S>(
        frame_source: S,
        signal_map: Arc<SignalMap>,
        rule_set: Arc<RuleSet>,
        state_store: Arc<StateStore>,
        config: &PipelineConfig,
    ) -> Result<Pipeline>
    where
        S: FrameSource + 'static,
    {
        let cancel = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(PipelineStats::default());
        let (done_tx, done) = mpsc::channel();

        let mut worker_loop = WorkerLoop {
            source: frame_source,
            decoder: FrameDecoder::new(signal_map),
            validator: SignalValidator::new(rule_set),
            state_store: state_store.clone(),
            cancel: cancel.clone(),
            stats: stats.clone(),
            poll_interval: config.poll_interval(),
        };

        let handle = thread::Builder::new()
            .name("can-eol-pipeline".to_string())
            .spawn(move || {
                worker_loop.run();
                // The receiver is gone only if the pipeline was dropped
                let _ = done_tx.send(worker_loop.validator);
            })?;

        log::info!(
            "Pipeline started (poll interval {:?}, stop timeout {:?})",
            config.poll_interval(),
            config.stop_timeout()
        );

        Ok(Pipeline {
            cancel,
            stats,
            state_store,
            worker: Some(Worker { handle, done }),
            validator: None,
            panicked: false,
            stop_timeout: config.stop_timeout(),
        })
    }

    /// Cancel the loop and wait for the worker to exit
    ///
    /// Once this returns `Ok`, no further validator or store updates happen.
    /// Calling it again is a no-op. On `StopTimeout` the pipeline is still
    /// considered running and `stop()` may be retried.
    pub fn stop(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };

        self.cancel.store(true, Ordering::Release);

        match worker.done.recv_timeout(self.stop_timeout) {
            Ok(validator) => {
                if worker.handle.join().is_err() {
                    self.panicked = true;
                    return Err(Error::WorkerPanicked);
                }
                self.validator = Some(validator);
                log::info!(
                    "Pipeline stopped after {} frames, {} signals",
                    self.stats.frames(),
                    self.stats.signals()
                );
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => {
                log::warn!("Pipeline worker did not exit within {:?}", self.stop_timeout);
                self.worker = Some(worker);
                Err(Error::StopTimeout(self.stop_timeout))
            }
            Err(RecvTimeoutError::Disconnected) => {
                // The worker dropped its sender without sending: it panicked
                let _ = worker.handle.join();
                log::error!("Pipeline worker panicked");
                self.panicked = true;
                Err(Error::WorkerPanicked)
            }
        }
    }

    /// True until `stop()` has completed
    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Live counters
    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    /// The store this pipeline writes to
    pub fn state_store(&self) -> &Arc<StateStore> {
        &self.state_store
    }

    /// Evaluate every rule over the finished run
    pub fn test_results(&self) -> Result<Vec<TestResult>> {
        self.finished().map(SignalValidator::validate_all)
    }

    /// Results of the finished run as a summary
    pub fn summary(&self) -> Result<TestSummary> {
        self.test_results().map(TestSummary::new)
    }

    /// Take the validator of the finished run
    pub fn into_validator(mut self) -> Result<SignalValidator> {
        if self.panicked {
            return Err(Error::WorkerPanicked);
        }
        self.validator.take().ok_or(Error::PipelineRunning)
    }

    /// True if the worker died instead of handing back its validator
    pub fn panicked(&self) -> bool {
        self.panicked
    }

    fn finished(&self) -> Result<&SignalValidator> {
        if self.panicked {
            return Err(Error::WorkerPanicked);
        }
        self.validator.as_ref().ok_or(Error::PipelineRunning)
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        // Never block in drop; the worker exits on its next poll
        self.cancel.store(true, Ordering::Release);
    }
}

struct WorkerLoop<S> {
    source: S,
    decoder: FrameDecoder,
    validator: SignalValidator,
    state_store: Arc<StateStore>,
    cancel: Arc<AtomicBool>,
    stats: Arc<PipelineStats>,
    poll_interval: Duration,
}

impl<S: FrameSource> WorkerLoop<S> {
    fn run(&mut self) {
        log::debug!("Pipeline worker running");

        while !self.cancel.load(Ordering::Acquire) {
            let Some(frame) = self.source.try_dequeue(self.poll_interval) else {
                continue;
            };
            if self.cancel.load(Ordering::Acquire) {
                break;
            }
            self.process(frame);
        }

        log::debug!("Pipeline worker exiting");
    }

    fn process(&mut self, frame: CanFrame) {
        self.stats.frames.fetch_add(1, Ordering::AcqRel);

        let decoded = self.decoder.decode(frame.can_id, &frame.data);
        if decoded.is_empty() && !self.decoder.signal_map().contains(frame.can_id) {
            self.stats.unknown_frames.fetch_add(1, Ordering::AcqRel);
            return;
        }

        for (name, value) in decoded {
            self.validator.feed(&name, value.clone());
            self.state_store.update(&name, value);
            self.stats.signals.fetch_add(1, Ordering::AcqRel);
        }
    }
}

//! Process event capture engine
//!
//! `EventEngine` owns the background capture task. Starting it subscribes
//! to the kernel and hands back one `EventStreams` with a queue per event
//! kind plus an error queue; stopping it unsubscribes, releases the socket
//! and closes all four queues.

pub mod capture;
pub mod dispatch;

pub use dispatch::EventStreams;

use crate::config::EngineConfig;
use crate::connector::channel::require_runtime;
use crate::connector::{FrameSource, SubscriptionChannel};
use crate::models::{EngineError, LoopState};
use capture::CaptureLoop;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Handle to a running capture task.
///
/// Dropping the handle without calling [`EventEngine::stop`] still stops
/// the task: the loop treats a vanished stop sender as a stop request.
#[derive(Debug)]
pub struct EventEngine {
    stop: watch::Sender<bool>,
    state: watch::Receiver<LoopState>,
    task: JoinHandle<Result<(), EngineError>>,
}

impl EventEngine {
    /// Subscribe to kernel process events and start capturing.
    ///
    /// Must be called from within a tokio runtime. Requires the privileges
    /// the kernel demands for the process connector (usually root).
    pub fn start(config: &EngineConfig) -> Result<(Self, EventStreams), EngineError> {
        config.validate()?;
        let channel = SubscriptionChannel::open()?;
        log::info!("process event capture started");
        Ok(Self::spawn(channel, config))
    }

    /// Start capturing from an arbitrary frame source.
    ///
    /// Like [`EventEngine::start`], fails with a `Register` socket error
    /// when called outside a tokio runtime.
    pub fn with_source<S: FrameSource>(
        source: S,
        config: &EngineConfig,
    ) -> Result<(Self, EventStreams), EngineError> {
        config.validate()?;
        require_runtime()?;
        Ok(Self::spawn(source, config))
    }

    fn spawn<S: FrameSource>(source: S, config: &EngineConfig) -> (Self, EventStreams) {
        let (dispatcher, streams) = dispatch::queues(config);
        let (stop_tx, stop_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(LoopState::Running);

        let capture = CaptureLoop::new(
            source,
            dispatcher,
            stop_rx,
            state_tx,
            config.receive_buffer_size,
        );
        let task = tokio::spawn(capture.run());

        let engine = Self {
            stop: stop_tx,
            state: state_rx,
            task,
        };
        (engine, streams)
    }

    /// Current state of the capture loop
    pub fn state(&self) -> LoopState {
        *self.state.borrow()
    }

    /// Ask the capture loop to stop and wait until it has finalized.
    ///
    /// Returns the result of unsubscribing and releasing the socket. Events
    /// already queued stay readable; every stream ends with `None`.
    pub async fn stop(self) -> Result<(), EngineError> {
        self.stop.send_replace(true);
        let result = match self.task.await {
            Ok(result) => result,
            Err(e) => Err(EngineError::TaskFailed(e.to_string())),
        };
        log::info!("process event capture stopped");
        result
    }
}

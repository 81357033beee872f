//! Capture loop: receive, decode, dispatch, until stopped
//!
//! The loop owns the frame source and the dispatcher. Stop requests race
//! every receive and every handoff, so shutdown never waits for the kernel
//! to deliver another datagram or for a consumer to read.

use crate::connector::{decode_frame, FrameSource};
use crate::engine::dispatch::Dispatcher;
use crate::models::{EngineError, LoopState, ProcessEvent};
use tokio::sync::watch;

/// The single task draining one frame source
pub struct CaptureLoop<S: FrameSource> {
    source: S,
    dispatcher: Dispatcher,
    stop: watch::Receiver<bool>,
    state: watch::Sender<LoopState>,
    buffer: Vec<u8>,
}

#[derive(Debug, Default)]
struct LoopCounters {
    frames: u64,
    events: u64,
    errors: u64,
}

impl<S: FrameSource> CaptureLoop<S> {
    pub fn new(
        source: S,
        dispatcher: Dispatcher,
        stop: watch::Receiver<bool>,
        state: watch::Sender<LoopState>,
        buffer_size: usize,
    ) -> Self {
        Self {
            source,
            dispatcher,
            stop,
            state,
            buffer: vec![0u8; buffer_size],
        }
    }

    /// Run until a stop is requested (or the stop sender is dropped), then
    /// finalize: close the source, close the queues.
    ///
    /// Returns the result of closing the source.
    pub async fn run(self) -> Result<(), EngineError> {
        let CaptureLoop {
            mut source,
            dispatcher,
            mut stop,
            state,
            mut buffer,
        } = self;

        state.send_replace(LoopState::Running);
        log::debug!("capture loop running");
        let mut counters = LoopCounters::default();

        loop {
            if stop_observed(&stop) {
                break;
            }

            let outcomes = tokio::select! {
                biased;
                _ = stop_requested(&mut stop) => break,
                received = source.receive(&mut buffer) => match received {
                    Ok(frame) => {
                        counters.frames += 1;
                        decode_frame(&frame)
                    }
                    Err(e) => vec![Err(e)],
                },
            };

            let delivered = tokio::select! {
                biased;
                _ = stop_requested(&mut stop) => false,
                _ = dispatch(&dispatcher, outcomes, &mut counters) => true,
            };
            if !delivered {
                break;
            }
        }

        state.send_replace(LoopState::Stopping);
        log::debug!(
            "capture loop stopping after {} frames, {} events, {} errors",
            counters.frames,
            counters.events,
            counters.errors
        );

        let closed = source.close();
        dispatcher.close();

        state.send_replace(LoopState::Stopped);
        log::debug!("capture loop stopped");
        closed
    }
}

async fn dispatch(
    dispatcher: &Dispatcher,
    outcomes: Vec<Result<ProcessEvent, EngineError>>,
    counters: &mut LoopCounters,
) {
    for outcome in outcomes {
        match outcome {
            Ok(event) => {
                log::trace!("dispatching {:?}", event);
                counters.events += 1;
                dispatcher.forward(event).await;
            }
            Err(err) => {
                if err.is_overrun() {
                    log::warn!("kernel dropped process events: {}", err);
                } else {
                    log::debug!("capture error: {}", err);
                }
                counters.errors += 1;
                dispatcher.report(err);
            }
        }
    }
}

fn stop_observed(stop: &watch::Receiver<bool>) -> bool {
    *stop.borrow() || stop.has_changed().is_err()
}

/// Resolves once a stop is requested or the engine handle is gone
async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stopped| *stopped).await;
}

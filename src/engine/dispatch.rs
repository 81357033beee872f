//! Typed output queues shared between the capture loop and consumers
//!
//! The capture loop owns the `Dispatcher` (all senders); consumers own the
//! `EventStreams` (all receivers). Dropping the dispatcher is the only way
//! the queues get closed.

use crate::config::EngineConfig;
use crate::models::{EngineError, ExecEvent, ExitEvent, ForkEvent, ProcessEvent};
use tokio::sync::mpsc::{self, error::TrySendError, Receiver, Sender};

/// Receiving ends of the four output queues
#[derive(Debug)]
pub struct EventStreams {
    pub fork: Receiver<ForkEvent>,
    pub exec: Receiver<ExecEvent>,
    pub exit: Receiver<ExitEvent>,
    pub errors: Receiver<EngineError>,
}

/// Sending ends of the four output queues
#[derive(Debug)]
pub struct Dispatcher {
    fork: Sender<ForkEvent>,
    exec: Sender<ExecEvent>,
    exit: Sender<ExitEvent>,
    errors: Sender<EngineError>,
    rendezvous: bool,
}

/// Build the queues for `config`
pub fn queues(config: &EngineConfig) -> (Dispatcher, EventStreams) {
    // A rendezvous queue is a one-slot queue whose slot must drain
    // before the producer moves on
    let rendezvous = config.queue_capacity == 0;
    let capacity = config.queue_capacity.max(1);

    let (fork_tx, fork_rx) = mpsc::channel(capacity);
    let (exec_tx, exec_rx) = mpsc::channel(capacity);
    let (exit_tx, exit_rx) = mpsc::channel(capacity);
    let (errors_tx, errors_rx) = mpsc::channel(config.error_queue_capacity.max(1));

    let dispatcher = Dispatcher {
        fork: fork_tx,
        exec: exec_tx,
        exit: exit_tx,
        errors: errors_tx,
        rendezvous,
    };
    let streams = EventStreams {
        fork: fork_rx,
        exec: exec_rx,
        exit: exit_rx,
        errors: errors_rx,
    };
    (dispatcher, streams)
}

impl Dispatcher {
    /// Hand `event` to the queue for its kind.
    ///
    /// Waits while the queue is full (or, in rendezvous mode, until the
    /// consumer has taken the event). Returns false if nobody listens on
    /// that queue any more.
    pub async fn forward(&self, event: ProcessEvent) -> bool {
        match event {
            ProcessEvent::Fork(ev) => handoff(&self.fork, ev, self.rendezvous).await,
            ProcessEvent::Exec(ev) => handoff(&self.exec, ev, self.rendezvous).await,
            ProcessEvent::Exit(ev) => handoff(&self.exit, ev, self.rendezvous).await,
        }
    }

    /// Offer an error to the error queue without waiting
    pub fn report(&self, err: EngineError) {
        match self.errors.try_send(err) {
            Ok(()) => {}
            Err(TrySendError::Full(err)) => {
                log::warn!("error queue full, dropping: {}", err);
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }

    /// Close all four queues; consumers drain what is buffered, then see `None`
    pub fn close(self) {
        drop(self);
    }
}

async fn handoff<T: Send>(queue: &Sender<T>, item: T, rendezvous: bool) -> bool {
    if queue.send(item).await.is_err() {
        log::trace!("queue receiver dropped, discarding event");
        return false;
    }
    if rendezvous {
        // The single slot frees up once the consumer has taken the item
        if let Ok(permit) = queue.reserve().await {
            drop(permit);
        }
    }
    true
}

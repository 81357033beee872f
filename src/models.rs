//! Data models module
//!
//! Defines core data structures:
//! - ForkEvent / ExecEvent / ExitEvent: consumer-facing process events
//! - ProcessEvent: the routing sum type over the three events
//! - LoopState: lifecycle of the capture loop
//! - EngineError / ConfigError: error kinds surfaced by the engine

use serde::{Deserialize, Serialize};
use std::fmt;

/// A process called fork(); both pids are thread-group ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForkEvent {
    /// Thread-group id of the forking process
    pub parent_pid: u32,
    /// Thread-group id of the new process
    pub child_pid: u32,
}

/// A process replaced its image with exec()
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecEvent {
    /// Thread-group id of the process that called exec()
    pub pid: u32,
}

/// A process terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExitEvent {
    /// Thread-group id of the process that exited
    pub pid: u32,
}

/// Any decoded process event, in the order the kernel delivered it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum ProcessEvent {
    Fork(ForkEvent),
    Exec(ExecEvent),
    Exit(ExitEvent),
}

impl ProcessEvent {
    /// Short lowercase name of the event kind
    pub fn kind(&self) -> &'static str {
        match self {
            ProcessEvent::Fork(_) => "fork",
            ProcessEvent::Exec(_) => "exec",
            ProcessEvent::Exit(_) => "exit",
        }
    }

    /// Whether any pid carried by this event equals `pid`
    pub fn involves(&self, pid: u32) -> bool {
        match self {
            ProcessEvent::Fork(ev) => ev.parent_pid == pid || ev.child_pid == pid,
            ProcessEvent::Exec(ev) => ev.pid == pid,
            ProcessEvent::Exit(ev) => ev.pid == pid,
        }
    }
}

impl From<ForkEvent> for ProcessEvent {
    fn from(ev: ForkEvent) -> Self {
        ProcessEvent::Fork(ev)
    }
}

impl From<ExecEvent> for ProcessEvent {
    fn from(ev: ExecEvent) -> Self {
        ProcessEvent::Exec(ev)
    }
}

impl From<ExitEvent> for ProcessEvent {
    fn from(ev: ExitEvent) -> Self {
        ProcessEvent::Exit(ev)
    }
}

/// Lifecycle of the capture loop. There is no transition back to `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Stopping,
    Stopped,
}

/// Socket step that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketOp {
    Allocate,
    Bind,
    Register,
    Send,
    Receive,
}

impl fmt::Display for SocketOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SocketOp::Allocate => "allocate",
            SocketOp::Bind => "bind",
            SocketOp::Register => "register",
            SocketOp::Send => "send",
            SocketOp::Receive => "receive",
        };
        f.write_str(name)
    }
}

/// Custom error types for the capture engine
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("socket {op} failed: {source}")]
    Socket {
        op: SocketOp,
        #[source]
        source: std::io::Error,
    },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("capture task failed: {0}")]
    TaskFailed(String),
}

impl EngineError {
    pub fn socket(op: SocketOp, source: impl Into<std::io::Error>) -> Self {
        EngineError::Socket {
            op,
            source: source.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        EngineError::Protocol(message.into())
    }

    /// True when the kernel dropped notifications because the socket
    /// receive buffer was full (`ENOBUFS`)
    pub fn is_overrun(&self) -> bool {
        match self {
            EngineError::Socket { op: SocketOp::Receive, source } => {
                source.raw_os_error() == Some(libc::ENOBUFS)
            }
            _ => false,
        }
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Note: bounds must match the limits in constants.rs
    #[error("Invalid queue capacity: {0}. Must be at most 65536")]
    InvalidQueueCapacity(usize),

    #[error("Invalid error queue capacity: {0}. Must be between 1 and 65536")]
    InvalidErrorQueueCapacity(usize),

    #[error("Invalid receive buffer size: {0}. Must be between 4096 and 1048576 bytes")]
    InvalidReceiveBufferSize(usize),
}

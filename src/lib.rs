//! procevents - Linux process event capture library
//!
//! Subscribes to the kernel's netlink process connector and delivers
//! fork, exec and exit notifications on typed async queues.

pub mod config;
pub mod connector;
pub mod constants;
pub mod engine;
pub mod models;

pub use config::EngineConfig;
pub use engine::{EventEngine, EventStreams};
pub use models::{
    ConfigError, EngineError, ExecEvent, ExitEvent, ForkEvent, LoopState, ProcessEvent, SocketOp,
};

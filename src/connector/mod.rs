//! Kernel process connector plumbing
//!
//! - `codec`: pure encode/decode of the netlink, connector and process event layers
//! - `channel`: the subscribed netlink socket

pub mod channel;
pub mod codec;

pub use channel::SubscriptionChannel;
pub use codec::{decode_frame, encode_control, MulticastOp};

use crate::models::EngineError;
use std::future::Future;
use std::ops::Deref;

/// Bytes received by one receive call; may hold zero or more envelopes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawFrame<'a> {
    bytes: &'a [u8],
}

impl<'a> RawFrame<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }
}

impl Deref for RawFrame<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.bytes
    }
}

/// Source of raw frames driven by the capture loop.
///
/// The loop owns its source exclusively and calls `close` exactly once,
/// during finalization.
pub trait FrameSource: Send + 'static {
    /// Wait for the next datagram and return the filled part of `buf`
    fn receive<'a>(
        &'a mut self,
        buf: &'a mut [u8],
    ) -> impl Future<Output = Result<RawFrame<'a>, EngineError>> + Send + 'a;

    /// Unsubscribe and release the underlying handle
    fn close(self) -> Result<(), EngineError>;
}

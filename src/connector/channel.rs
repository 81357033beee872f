//! Netlink process connector subscription
//!
//! Owns the kernel socket for its whole life: allocate, bind to the
//! process events multicast group, send `listen`, receive datagrams,
//! send `ignore` and release the handle.

use crate::connector::codec::{encode_control, MulticastOp};
use crate::connector::{FrameSource, RawFrame};
use crate::constants::{CN_IDX_PROC, NETLINK_CONNECTOR, NLMSG_HDRLEN};
use crate::models::{EngineError, SocketOp};
use nix::sys::socket::{bind, recv, sendto, MsgFlags, NetlinkAddr};
use std::future::Future;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use tokio::io::unix::AsyncFd;

/// Sequence numbers for outbound control frames: starts at 0 and is
/// advanced before every send, so the first frame carries 1
#[derive(Debug, Default)]
struct ControlSequence(u32);

impl ControlSequence {
    fn advance(&mut self) -> u32 {
        self.0 = self.0.wrapping_add(1);
        self.0
    }
}

/// Subscribed netlink connector socket
pub struct SubscriptionChannel {
    fd: AsyncFd<OwnedFd>,
    addr: NetlinkAddr,
    seq: ControlSequence,
}

impl SubscriptionChannel {
    /// Allocate, bind and subscribe.
    ///
    /// Must be called from within a tokio runtime. On any failure the
    /// socket is released before the error is returned.
    pub fn open() -> Result<Self, EngineError> {
        require_runtime()?;

        let fd = allocate_socket().map_err(|e| EngineError::socket(SocketOp::Allocate, e))?;

        let addr = NetlinkAddr::new(0, CN_IDX_PROC);
        bind(fd.as_raw_fd(), &addr).map_err(|e| EngineError::socket(SocketOp::Bind, e))?;

        let fd = AsyncFd::new(fd).map_err(|e| EngineError::socket(SocketOp::Register, e))?;

        let mut channel = Self {
            fd,
            addr,
            seq: ControlSequence::default(),
        };
        channel.send(MulticastOp::Listen)?;

        log::debug!(
            "subscribed to process connector on fd {}",
            channel.fd.get_ref().as_raw_fd()
        );
        Ok(channel)
    }

    fn send(&mut self, op: MulticastOp) -> Result<(), EngineError> {
        let seq = self.seq.advance();
        let frame = encode_control(op, seq, std::process::id());

        sendto(
            self.fd.get_ref().as_raw_fd(),
            &frame,
            &self.addr,
            MsgFlags::empty(),
        )
        .map_err(|e| EngineError::socket(SocketOp::Send, e))?;

        log::debug!("sent {:?} control frame (seq {})", op, seq);
        Ok(())
    }
}

/// Fail with a `Register` error unless called from within a tokio runtime
pub(crate) fn require_runtime() -> Result<(), EngineError> {
    tokio::runtime::Handle::try_current()
        .map(|_| ())
        .map_err(|e| EngineError::socket(SocketOp::Register, io::Error::new(io::ErrorKind::Other, e)))
}

// nix has no `SockProtocol` for NETLINK_CONNECTOR, so the socket is
// allocated through libc and handed straight to an OwnedFd.
fn allocate_socket() -> io::Result<OwnedFd> {
    let raw = unsafe {
        libc::socket(
            libc::AF_NETLINK,
            libc::SOCK_DGRAM | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
            NETLINK_CONNECTOR,
        )
    };
    if raw < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: `raw` is a freshly created descriptor owned by nothing else
    Ok(unsafe { OwnedFd::from_raw_fd(raw) })
}

impl FrameSource for SubscriptionChannel {
    fn receive<'a>(
        &'a mut self,
        buf: &'a mut [u8],
    ) -> impl Future<Output = Result<RawFrame<'a>, EngineError>> + Send + 'a {
        async move {
            let len = loop {
                let mut guard = self
                    .fd
                    .readable()
                    .await
                    .map_err(|e| EngineError::socket(SocketOp::Receive, e))?;

                match guard.try_io(|inner| {
                    recv(inner.get_ref().as_raw_fd(), &mut buf[..], MsgFlags::empty())
                        .map_err(io::Error::from)
                }) {
                    Ok(result) => {
                        break result.map_err(|e| EngineError::socket(SocketOp::Receive, e))?
                    }
                    Err(_would_block) => continue,
                }
            };

            if len < NLMSG_HDRLEN {
                return Err(EngineError::protocol(format!(
                    "received {} bytes, shorter than the {}-byte envelope header",
                    len, NLMSG_HDRLEN
                )));
            }

            Ok(RawFrame::new(&buf[..len]))
        }
    }

    fn close(mut self) -> Result<(), EngineError> {
        let result = self.send(MulticastOp::Ignore);
        if let Err(ref e) = result {
            log::warn!("failed to unsubscribe from process connector: {}", e);
        }
        // Dropping the AsyncFd deregisters and closes the socket
        drop(self);
        log::debug!("process connector socket released");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_starts_at_one_and_never_repeats() {
        let mut seq = ControlSequence::default();

        assert_eq!(seq.advance(), 1);
        assert_eq!(seq.advance(), 2);
        assert_eq!(seq.advance(), 3);
    }

    #[test]
    fn test_open_outside_runtime_fails_cleanly() {
        let err = SubscriptionChannel::open().err().unwrap();

        assert!(matches!(
            err,
            EngineError::Socket { op: SocketOp::Register, .. }
        ));
    }
}

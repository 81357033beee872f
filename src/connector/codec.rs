//! Wire codec for the netlink process connector.
//!
//! Frame layout (every integer in host byte order, which is the kernel ABI):
//! ```text
//! ┌──────────────────┬────────────────────┬──────────────────┬────────────┐
//! │ nlmsghdr (16B)   │ cn_msg (20B)       │ proc header (16B)│ body       │
//! │ len type flags   │ idx val seq ack    │ what cpu         │ fork  16B  │
//! │ seq pid          │ len flags          │ timestamp_ns     │ exec   8B  │
//! │                  │                    │                  │ exit  16B  │
//! └──────────────────┴────────────────────┴──────────────────┴────────────┘
//! ```
//! One datagram may carry several envelopes, each padded to 4 bytes.
//! Outbound control frames end with a 4-byte multicast op instead of a
//! process event.

use crate::constants::*;
use crate::models::{EngineError, ExecEvent, ExitEvent, ForkEvent, ProcessEvent};

/// Multicast control operation carried by a control frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MulticastOp {
    Listen,
    Ignore,
}

impl MulticastOp {
    pub fn code(self) -> u32 {
        match self {
            MulticastOp::Listen => PROC_CN_MCAST_LISTEN,
            MulticastOp::Ignore => PROC_CN_MCAST_IGNORE,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            PROC_CN_MCAST_LISTEN => Some(MulticastOp::Listen),
            PROC_CN_MCAST_IGNORE => Some(MulticastOp::Ignore),
            _ => None,
        }
    }
}

fn u16_at(buf: &[u8], off: usize) -> Option<u16> {
    Some(u16::from_ne_bytes(buf.get(off..off + 2)?.try_into().ok()?))
}

fn u32_at(buf: &[u8], off: usize) -> Option<u32> {
    Some(u32::from_ne_bytes(buf.get(off..off + 4)?.try_into().ok()?))
}

fn u64_at(buf: &[u8], off: usize) -> Option<u64> {
    Some(u64::from_ne_bytes(buf.get(off..off + 8)?.try_into().ok()?))
}

fn align(len: usize) -> usize {
    (len + NLMSG_ALIGNTO - 1) & !(NLMSG_ALIGNTO - 1)
}

/// `struct nlmsghdr`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetlinkHeader {
    pub len: u32,
    pub msg_type: u16,
    pub flags: u16,
    pub seq: u32,
    pub pid: u32,
}

impl NetlinkHeader {
    pub fn parse(buf: &[u8]) -> Option<Self> {
        Some(Self {
            len: u32_at(buf, 0)?,
            msg_type: u16_at(buf, 4)?,
            flags: u16_at(buf, 6)?,
            seq: u32_at(buf, 8)?,
            pid: u32_at(buf, 12)?,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.len.to_ne_bytes());
        out.extend_from_slice(&self.msg_type.to_ne_bytes());
        out.extend_from_slice(&self.flags.to_ne_bytes());
        out.extend_from_slice(&self.seq.to_ne_bytes());
        out.extend_from_slice(&self.pid.to_ne_bytes());
    }
}

/// `struct cn_msg` without the trailing data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectorHeader {
    pub idx: u32,
    pub val: u32,
    pub seq: u32,
    pub ack: u32,
    pub len: u16,
    pub flags: u16,
}

impl ConnectorHeader {
    pub fn parse(buf: &[u8]) -> Option<Self> {
        Some(Self {
            idx: u32_at(buf, 0)?,
            val: u32_at(buf, 4)?,
            seq: u32_at(buf, 8)?,
            ack: u32_at(buf, 12)?,
            len: u16_at(buf, 16)?,
            flags: u16_at(buf, 18)?,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.idx.to_ne_bytes());
        out.extend_from_slice(&self.val.to_ne_bytes());
        out.extend_from_slice(&self.seq.to_ne_bytes());
        out.extend_from_slice(&self.ack.to_ne_bytes());
        out.extend_from_slice(&self.len.to_ne_bytes());
        out.extend_from_slice(&self.flags.to_ne_bytes());
    }

    /// Whether this message comes from the process events source
    pub fn is_proc_connector(&self) -> bool {
        self.idx == CN_IDX_PROC && self.val == CN_VAL_PROC
    }
}

/// Common head of `struct proc_event`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcEventHeader {
    pub what: u32,
    pub cpu: u32,
    pub timestamp_ns: u64,
}

impl ProcEventHeader {
    pub fn parse(buf: &[u8]) -> Option<Self> {
        Some(Self {
            what: u32_at(buf, 0)?,
            cpu: u32_at(buf, 4)?,
            timestamp_ns: u64_at(buf, 8)?,
        })
    }
}

/// Event-specific part of `struct proc_event`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventBody {
    Fork {
        parent_pid: u32,
        parent_tgid: u32,
        child_pid: u32,
        child_tgid: u32,
    },
    Exec {
        process_pid: u32,
        process_tgid: u32,
    },
    Exit {
        process_pid: u32,
        process_tgid: u32,
        exit_code: u32,
        exit_signal: u32,
    },
    /// A kind this codec does not know; reserved by the kernel for extensions
    Other(u32),
}

/// One fully decoded process connector message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcEventMessage {
    pub header: ProcEventHeader,
    pub body: EventBody,
}

impl ProcEventMessage {
    /// Consumer-facing event, keyed by thread-group ids
    pub fn to_event(&self) -> Option<ProcessEvent> {
        match self.body {
            EventBody::Fork { parent_tgid, child_tgid, .. } => Some(ProcessEvent::Fork(ForkEvent {
                parent_pid: parent_tgid,
                child_pid: child_tgid,
            })),
            EventBody::Exec { process_tgid, .. } => {
                Some(ProcessEvent::Exec(ExecEvent { pid: process_tgid }))
            }
            EventBody::Exit { process_tgid, .. } => {
                Some(ProcessEvent::Exit(ExitEvent { pid: process_tgid }))
            }
            EventBody::Other(_) => None,
        }
    }
}

/// Build a complete control frame for `op`
pub fn encode_control(op: MulticastOp, seq: u32, sender_pid: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(CONTROL_FRAME_LEN);

    NetlinkHeader {
        len: CONTROL_FRAME_LEN as u32,
        msg_type: NLMSG_DONE,
        flags: 0,
        seq,
        pid: sender_pid,
    }
    .write(&mut out);

    ConnectorHeader {
        idx: CN_IDX_PROC,
        val: CN_VAL_PROC,
        seq,
        ack: 0,
        len: 4,
        flags: 0,
    }
    .write(&mut out);

    out.extend_from_slice(&op.code().to_ne_bytes());
    out
}

/// One envelope extracted from a frame
#[derive(Debug, Clone, Copy)]
pub struct Envelope<'a> {
    pub header: NetlinkHeader,
    pub payload: &'a [u8],
}

/// Iterator over the envelopes of a frame.
///
/// Yields an error and stops when an envelope's declared length cannot be
/// trusted, since the next boundary is then unknown.
pub struct Envelopes<'a> {
    rest: &'a [u8],
    started: bool,
    done: bool,
}

pub fn envelopes(frame: &[u8]) -> Envelopes<'_> {
    Envelopes {
        rest: frame,
        started: false,
        done: false,
    }
}

impl<'a> Iterator for Envelopes<'a> {
    type Item = Result<Envelope<'a>, EngineError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let first = !self.started;
        self.started = true;

        if self.rest.len() < NLMSG_HDRLEN {
            self.done = true;
            // Trailing padding after valid envelopes is fine; a frame that
            // never held a header is not.
            return first.then(|| {
                Err(EngineError::protocol(format!(
                    "frame of {} bytes is shorter than the {}-byte envelope header",
                    self.rest.len(),
                    NLMSG_HDRLEN
                )))
            });
        }

        let header = NetlinkHeader::parse(self.rest)?;
        let len = header.len as usize;
        if len < NLMSG_HDRLEN || len > self.rest.len() {
            self.done = true;
            return Some(Err(EngineError::protocol(format!(
                "envelope declares {} bytes but {} remain",
                len,
                self.rest.len()
            ))));
        }

        let rest = self.rest;
        let payload = &rest[NLMSG_HDRLEN..len];
        self.rest = &rest[align(len).min(rest.len())..];

        Some(Ok(Envelope { header, payload }))
    }
}

/// Decode the payload of one `NLMSG_DONE` envelope.
///
/// `Ok(None)` means the message is well-formed but not a process event
/// this codec reports on (foreign connector id).
pub fn decode_payload(payload: &[u8]) -> Result<Option<ProcEventMessage>, EngineError> {
    let cn = ConnectorHeader::parse(payload).ok_or_else(|| {
        EngineError::protocol(format!(
            "connector header needs {} bytes, got {}",
            CN_MSG_LEN,
            payload.len()
        ))
    })?;

    if !cn.is_proc_connector() {
        log::debug!("skipping connector message from id {}:{}", cn.idx, cn.val);
        return Ok(None);
    }

    let data = &payload[CN_MSG_LEN..];
    let data = data.get(..cn.len as usize).ok_or_else(|| {
        EngineError::protocol(format!(
            "connector declares {} data bytes but {} remain",
            cn.len,
            data.len()
        ))
    })?;

    let header = ProcEventHeader::parse(data).ok_or_else(|| {
        EngineError::protocol(format!(
            "process event header needs {} bytes, got {}",
            PROC_EVENT_HDRLEN,
            data.len()
        ))
    })?;

    let body = &data[PROC_EVENT_HDRLEN..];
    let short = |kind: &str, need: usize| {
        EngineError::protocol(format!(
            "{} event body needs {} bytes, got {}",
            kind,
            need,
            body.len()
        ))
    };

    let body = match header.what {
        PROC_EVENT_FORK => {
            let field = |off| u32_at(body, off).ok_or_else(|| short("fork", FORK_BODY_LEN));
            EventBody::Fork {
                parent_pid: field(0)?,
                parent_tgid: field(4)?,
                child_pid: field(8)?,
                child_tgid: field(12)?,
            }
        }
        PROC_EVENT_EXEC => {
            let field = |off| u32_at(body, off).ok_or_else(|| short("exec", EXEC_BODY_LEN));
            EventBody::Exec {
                process_pid: field(0)?,
                process_tgid: field(4)?,
            }
        }
        PROC_EVENT_EXIT => {
            let field = |off| u32_at(body, off).ok_or_else(|| short("exit", EXIT_BODY_LEN));
            EventBody::Exit {
                process_pid: field(0)?,
                process_tgid: field(4)?,
                exit_code: field(8)?,
                exit_signal: field(12)?,
            }
        }
        other => EventBody::Other(other),
    };

    Ok(Some(ProcEventMessage { header, body }))
}

/// Decode every process event in a received frame, in frame order.
///
/// Each item is either an event or the error for the envelope that could
/// not be decoded. Unknown event kinds and non-`NLMSG_DONE` envelopes
/// produce no item.
pub fn decode_frame(frame: &[u8]) -> Vec<Result<ProcessEvent, EngineError>> {
    envelopes(frame)
        .filter_map(|envelope| match envelope {
            Err(e) => Some(Err(e)),
            Ok(env) if env.header.msg_type != NLMSG_DONE => {
                log::debug!("skipping envelope of type {}", env.header.msg_type);
                None
            }
            Ok(env) => match decode_payload(env.payload) {
                Err(e) => Some(Err(e)),
                Ok(None) => None,
                Ok(Some(msg)) => {
                    let event = msg.to_event();
                    if event.is_none() {
                        log::trace!("ignoring process event kind {:#x}", msg.header.what);
                    }
                    event.map(Ok)
                }
            },
        })
        .collect()
}


#[cfg(test)]
mod tests {
    use super::frames::*;
    use super::*;

    fn events(frame: &[u8]) -> Vec<ProcessEvent> {
        decode_frame(frame)
            .into_iter()
            .map(|item| item.expect("unexpected decode error"))
            .collect()
    }

    #[test]
    fn test_control_frame_layout_round_trip() {
        for (op, seq) in [(MulticastOp::Listen, 1u32), (MulticastOp::Ignore, 7u32)] {
            let frame = encode_control(op, seq, 4242);
            assert_eq!(frame.len(), CONTROL_FRAME_LEN);

            let envs: Vec<_> = envelopes(&frame).collect();
            assert_eq!(envs.len(), 1);
            let env = envs[0].as_ref().unwrap();

            assert_eq!(env.header.len as usize, CONTROL_FRAME_LEN);
            assert_eq!(env.header.msg_type, NLMSG_DONE);
            assert_eq!(env.header.seq, seq);
            assert_eq!(env.header.pid, 4242);

            let cn = ConnectorHeader::parse(env.payload).unwrap();
            assert!(cn.is_proc_connector());
            assert_eq!(cn.seq, seq);
            assert_eq!(cn.len, 4);

            let code = u32_at(env.payload, CN_MSG_LEN).unwrap();
            assert_eq!(MulticastOp::from_code(code), Some(op));
        }
    }

    #[test]
    fn test_control_frame_uses_native_byte_order() {
        let frame = encode_control(MulticastOp::Listen, 0x0102_0304, 0x0A0B_0C0D);

        assert_eq!(&frame[0..4], &(CONTROL_FRAME_LEN as u32).to_ne_bytes());
        assert_eq!(&frame[8..12], &0x0102_0304u32.to_ne_bytes());
        assert_eq!(&frame[12..16], &0x0A0B_0C0Du32.to_ne_bytes());
        assert_eq!(&frame[36..40], &PROC_CN_MCAST_LISTEN.to_ne_bytes());
    }

    #[test]
    fn test_fork_reports_thread_group_ids() {
        let decoded = events(&fork(200, 100, 202, 101));
        assert_eq!(
            decoded,
            vec![ProcessEvent::Fork(ForkEvent { parent_pid: 100, child_pid: 101 })]
        );
    }

    #[test]
    fn test_exec_and_exit_report_thread_group_ids() {
        assert_eq!(events(&exec(77, 55)), vec![ProcessEvent::Exec(ExecEvent { pid: 55 })]);
        assert_eq!(
            events(&exit(77, 55, 0, 17)),
            vec![ProcessEvent::Exit(ExitEvent { pid: 55 })]
        );
    }

    #[test]
    fn test_kernel_sized_messages_decode() {
        let fork = kernel_frame(PROC_EVENT_FORK, &[200, 100, 202, 101]);
        let exec = kernel_frame(PROC_EVENT_EXEC, &[77, 55]);
        let exit = kernel_frame(PROC_EVENT_EXIT, &[77, 55, 0, 17]);
        for frame in [&fork, &exec, &exit] {
            assert_eq!(frame.len(), PROC_EVENT_FRAME_LEN);
            let env = envelopes(frame).next().unwrap().unwrap();
            let cn = ConnectorHeader::parse(env.payload).unwrap();
            assert_eq!(cn.len as usize, PROC_EVENT_LEN);
        }

        let mut frame = fork;
        frame.extend(exec);
        frame.extend(exit);
        assert_eq!(
            events(&frame),
            vec![
                ProcessEvent::Fork(ForkEvent { parent_pid: 100, child_pid: 101 }),
                ProcessEvent::Exec(ExecEvent { pid: 55 }),
                ProcessEvent::Exit(ExitEvent { pid: 55 }),
            ]
        );
    }

    #[test]
    fn test_smallest_receive_buffer_holds_a_kernel_message() {
        let mut buffer = vec![0u8; RECEIVE_BUFFER_MIN];
        let frame = kernel_frame(PROC_EVENT_EXEC, &[12, 12]);
        buffer[..frame.len()].copy_from_slice(&frame);

        assert_eq!(
            events(&buffer[..frame.len()]),
            vec![ProcessEvent::Exec(ExecEvent { pid: 12 })]
        );

        // A datagram cut short by a small buffer yields no event
        let cut = &frame[..frame.len() - 12];
        let decoded = decode_frame(cut);
        assert_eq!(decoded.len(), 1);
        assert!(decoded[0].is_err());
    }

    #[test]
    fn test_exit_body_keeps_code_and_signal() {
        let frame = exit(10, 10, 256, 17);
        let env = envelopes(&frame).next().unwrap().unwrap();
        let msg = decode_payload(env.payload).unwrap().unwrap();

        assert_eq!(msg.header.what, PROC_EVENT_EXIT);
        assert_eq!(msg.header.timestamp_ns, 123_456_789);
        assert_eq!(
            msg.body,
            EventBody::Exit {
                process_pid: 10,
                process_tgid: 10,
                exit_code: 256,
                exit_signal: 17,
            }
        );
    }

    #[test]
    fn test_mixed_envelopes_keep_frame_order() {
        let mut frame = fork(1, 1, 2, 2);
        frame.extend(exec(2, 2));
        frame.extend(fork(2, 2, 3, 3));
        frame.extend(exit(2, 2, 0, 0));

        assert_eq!(
            events(&frame),
            vec![
                ProcessEvent::Fork(ForkEvent { parent_pid: 1, child_pid: 2 }),
                ProcessEvent::Exec(ExecEvent { pid: 2 }),
                ProcessEvent::Fork(ForkEvent { parent_pid: 2, child_pid: 3 }),
                ProcessEvent::Exit(ExitEvent { pid: 2 }),
            ]
        );
    }

    #[test]
    fn test_short_frame_is_protocol_error_without_events() {
        for len in [0usize, 1, 8, NLMSG_HDRLEN - 1] {
            let decoded = decode_frame(&vec![0u8; len]);
            assert_eq!(decoded.len(), 1, "len {}", len);
            assert!(matches!(decoded[0], Err(EngineError::Protocol(_))));
        }
    }

    #[test]
    fn test_unknown_kind_is_silently_dropped() {
        let decoded = decode_frame(&event_frame(0x0000_0040, &[1, 1, 0, 0]));
        assert!(decoded.is_empty());

        // Acknowledgement sent in reply to a listen request
        let decoded = decode_frame(&event_frame(0, &[0, 0]));
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_non_done_envelopes_are_skipped() {
        let mut frame = envelope(1, &[]);
        frame.extend(exec(9, 9));

        assert_eq!(events(&frame), vec![ProcessEvent::Exec(ExecEvent { pid: 9 })]);
    }

    #[test]
    fn test_foreign_connector_is_skipped() {
        let mut payload = proc_event_payload(PROC_EVENT_EXEC, &[5, 5]);
        payload[0..4].copy_from_slice(&7u32.to_ne_bytes());

        assert!(decode_frame(&envelope(NLMSG_DONE, &payload)).is_empty());
    }

    #[test]
    fn test_truncated_body_reports_error_and_continues() {
        let mut payload = proc_event_payload(PROC_EVENT_FORK, &[1, 1]);
        // Connector length must agree with the shortened data
        let data_len = (payload.len() - CN_MSG_LEN) as u16;
        payload[16..18].copy_from_slice(&data_len.to_ne_bytes());

        let mut frame = envelope(NLMSG_DONE, &payload);
        frame.extend(exec(3, 3));

        let decoded = decode_frame(&frame);
        assert_eq!(decoded.len(), 2);
        assert!(matches!(&decoded[0], Err(EngineError::Protocol(msg)) if msg.contains("fork")));
        assert_eq!(decoded[1].as_ref().unwrap(), &ProcessEvent::Exec(ExecEvent { pid: 3 }));
    }

    #[test]
    fn test_connector_length_overrun_is_error() {
        let mut payload = proc_event_payload(PROC_EVENT_EXEC, &[5, 5]);
        payload[16..18].copy_from_slice(&500u16.to_ne_bytes());

        let decoded = decode_frame(&envelope(NLMSG_DONE, &payload));
        assert_eq!(decoded.len(), 1);
        assert!(decoded[0].is_err());
    }

    #[test]
    fn test_bad_envelope_length_stops_the_walk() {
        let mut frame = exec(1, 1);
        frame.extend(exec(2, 2));
        // Second envelope claims more bytes than the frame holds
        let second = frame.len() / 2;
        frame[second..second + 4].copy_from_slice(&4096u32.to_ne_bytes());

        let decoded = decode_frame(&frame);
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].as_ref().unwrap(), &ProcessEvent::Exec(ExecEvent { pid: 1 }));
        assert!(decoded[1].is_err());

        let mut tiny = exec(1, 1);
        tiny[0..4].copy_from_slice(&4u32.to_ne_bytes());
        let decoded = decode_frame(&tiny);
        assert_eq!(decoded.len(), 1);
        assert!(decoded[0].is_err());
    }

    #[test]
    fn test_trailing_padding_is_ignored() {
        let mut frame = exec(4, 4);
        frame.extend_from_slice(&[0u8; 8]);

        assert_eq!(events(&frame), vec![ProcessEvent::Exec(ExecEvent { pid: 4 })]);
    }

    #[test]
    fn test_garbage_never_panics() {
        let mut seed = 0x2545_F491u32;
        for len in 0..256usize {
            let frame: Vec<u8> = (0..len)
                .map(|_| {
                    seed ^= seed << 13;
                    seed ^= seed >> 17;
                    seed ^= seed << 5;
                    seed as u8
                })
                .collect();
            let _ = decode_frame(&frame);
        }
    }
}
